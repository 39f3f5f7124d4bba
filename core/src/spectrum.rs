//! Power-spectrum formation.
//!
//! Two flavours are produced from a complex Fourier series: the plain
//! spectrum `P[k] = |z_k|²`, and an interpolated variant that recovers
//! power from signals whose true frequency falls between bin centres.  A
//! tone landing exactly half-way between bins loses up to ~40 % of its
//! power to scalloping; taking `max(|z_k|², (|z_k|² + |z_{k+1}|²)/2)`
//! restores the worst case at the price of correlating adjacent bins by a
//! factor √2, which the thresholding downstream absorbs.

use num_complex::Complex;

/// Forms power spectra from complex Fourier series.
pub struct SpectrumFormer;

impl SpectrumFormer {
    pub fn new() -> Self {
        Self
    }

    /// Plain power spectrum: `power[k] = |spectrum[k]|²`.
    pub fn form(&self, spectrum: &[Complex<f32>], power: &mut [f32]) {
        debug_assert_eq!(spectrum.len(), power.len());
        for (p, z) in power.iter_mut().zip(spectrum.iter()) {
            *p = z.norm_sqr();
        }
    }

    /// Bin-pair interpolated power spectrum:
    /// `power[k] = max(|z_k|², (|z_k|² + |z_{k+1}|²)/2)`.
    ///
    /// The last bin has no right-hand neighbour and keeps its plain power.
    pub fn form_interpolated(&self, spectrum: &[Complex<f32>], power: &mut [f32]) {
        debug_assert_eq!(spectrum.len(), power.len());
        let n = spectrum.len();
        if n == 0 {
            return;
        }
        let mut this = spectrum[0].norm_sqr();
        for k in 0..n - 1 {
            let next = spectrum[k + 1].norm_sqr();
            power[k] = this.max(0.5 * (this + next));
            this = next;
        }
        power[n - 1] = this;
    }
}

impl Default for SpectrumFormer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn plain_power_is_norm_squared() {
        let spec = vec![Complex::new(3.0f32, 4.0), Complex::new(0.0, 2.0)];
        let mut power = vec![0.0f32; 2];
        SpectrumFormer::new().form(&spec, &mut power);
        assert_relative_eq!(power[0], 25.0);
        assert_relative_eq!(power[1], 4.0);
    }

    #[test]
    fn interpolation_lifts_a_straddled_bin() {
        // A weak bin next to a strong one borrows half the difference.
        let spec = vec![
            Complex::new(1.0f32, 0.0),
            Complex::new(3.0, 0.0),
            Complex::new(1.0, 0.0),
        ];
        let mut power = vec![0.0f32; 3];
        SpectrumFormer::new().form_interpolated(&spec, &mut power);
        assert_relative_eq!(power[0], 5.0); // max(1, (1+9)/2)
        assert_relative_eq!(power[1], 9.0); // max(9, (9+1)/2)
        assert_relative_eq!(power[2], 1.0); // no right neighbour
    }

    #[test]
    fn interpolated_never_falls_below_plain() {
        let spec: Vec<Complex<f32>> = (0..64)
            .map(|i| Complex::new((i as f32 * 0.37).sin(), (i as f32 * 0.73).cos()))
            .collect();
        let mut plain = vec![0.0f32; 64];
        let mut interp = vec![0.0f32; 64];
        let former = SpectrumFormer::new();
        former.form(&spec, &mut plain);
        former.form_interpolated(&spec, &mut interp);
        for (p, i) in plain.iter().zip(interp.iter()) {
            assert!(i >= p);
        }
    }
}
