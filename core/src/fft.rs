//! Real↔complex FFT driver.
//!
//! Each worker owns one [`FftPair`] sized to the transform length S: a
//! forward real→complex plan producing S/2+1 bins and an inverse
//! complex→real plan producing S samples.  The plans are built once and
//! reused for every DM and acceleration trial the worker processes.
//!
//! The inverse transform is normalised by 1/S, so a forward–inverse round
//! trip returns the input in its original units and the statistics measured
//! on the dereddened spectrum stay valid for the spectra of resampled
//! copies.

use std::sync::Arc;

use num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

/// Errors raised by the transform layer.  Any of these is fatal to the
/// worker that hits it.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("buffer length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("FFT execution failed: {0}")]
    Execution(#[from] realfft::FftError),
}

/// A matched pair of forward and inverse real-FFT plans of fixed length.
pub struct FftPair {
    len: usize,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
}

impl FftPair {
    /// Plan forward and inverse transforms of length `len`.
    pub fn new(len: usize) -> Self {
        let mut planner = RealFftPlanner::new();
        Self {
            len,
            forward: planner.plan_fft_forward(len),
            inverse: planner.plan_fft_inverse(len),
        }
    }

    /// Transform length S.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of complex bins produced by the forward transform: S/2+1.
    pub fn spectrum_len(&self) -> usize {
        self.len / 2 + 1
    }

    /// Forward real→complex transform.  `input` is used as scratch and is
    /// garbage afterwards.
    pub fn forward(
        &self,
        input: &mut [f32],
        spectrum: &mut [Complex<f32>],
    ) -> Result<(), TransformError> {
        self.check(input.len(), self.len)?;
        self.check(spectrum.len(), self.spectrum_len())?;
        self.forward.process(input, spectrum)?;
        Ok(())
    }

    /// Inverse complex→real transform, scaled by 1/S.  `spectrum` is used
    /// as scratch and is garbage afterwards.
    pub fn inverse(
        &self,
        spectrum: &mut [Complex<f32>],
        output: &mut [f32],
    ) -> Result<(), TransformError> {
        self.check(spectrum.len(), self.spectrum_len())?;
        self.check(output.len(), self.len)?;
        // The DC and Nyquist bins of a real signal's spectrum are purely
        // real; enforce that here so rounding residue left by upstream
        // transforms cannot fail the plan's input validation.
        spectrum[0].im = 0.0;
        if self.len % 2 == 0 {
            let last = spectrum.len() - 1;
            spectrum[last].im = 0.0;
        }
        self.inverse.process(spectrum, output)?;
        let scale = 1.0 / self.len as f32;
        for v in output.iter_mut() {
            *v *= scale;
        }
        Ok(())
    }

    fn check(&self, actual: usize, expected: usize) -> Result<(), TransformError> {
        if actual != expected {
            return Err(TransformError::LengthMismatch { expected, actual });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn round_trip_recovers_input() {
        let n = 256;
        let fft = FftPair::new(n);
        let original: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 7.0 * i as f32 / n as f32).sin() + 0.25)
            .collect();
        let mut tim = original.clone();
        let mut spec = vec![Complex::new(0.0f32, 0.0); fft.spectrum_len()];
        let mut back = vec![0.0f32; n];
        fft.forward(&mut tim, &mut spec).unwrap();
        fft.inverse(&mut spec, &mut back).unwrap();
        for (&a, &b) in original.iter().zip(back.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-4);
        }
    }

    #[test]
    fn sinusoid_concentrates_in_one_bin() {
        let n = 1024;
        let fft = FftPair::new(n);
        let mut tim: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 50.0 * i as f32 / n as f32).cos())
            .collect();
        let mut spec = vec![Complex::new(0.0f32, 0.0); fft.spectrum_len()];
        fft.forward(&mut tim, &mut spec).unwrap();
        let powers: Vec<f32> = spec.iter().map(|z| z.norm_sqr()).collect();
        let peak = powers
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap();
        assert_eq!(peak, 50);
    }

    #[test]
    fn mismatched_buffers_are_rejected() {
        let fft = FftPair::new(64);
        let mut tim = vec![0.0f32; 32];
        let mut spec = vec![Complex::new(0.0f32, 0.0); fft.spectrum_len()];
        assert!(matches!(
            fft.forward(&mut tim, &mut spec),
            Err(TransformError::LengthMismatch { .. })
        ));
    }
}
