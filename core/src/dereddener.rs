//! Running-median red-noise removal.
//!
//! Pulsar power spectra sit on a steep red-noise tail: receiver gain
//! wander and sky emission concentrate power at the lowest Fourier
//! frequencies and would drown any threshold applied to the raw spectrum.
//! The dereddener estimates the local noise floor with a piecewise running
//! median of the *power* spectrum — 5 bins at the lowest frequencies where
//! the floor is steepest, 25 bins in the mid range, 125 bins above — and
//! divides the floor out of the complex spectrum bin by bin.
//!
//! A median, not a mean, so that the narrow features the search is after
//! do not drag their own baseline up.  The median of exponentially
//! distributed noise power sits at ln 2 of its mean, so the estimate is
//! rescaled by 1/ln 2 before division; the flattened spectrum then has
//! unit mean and the usual χ²(2) bin statistics.

use num_complex::Complex;

use crate::stats::running_median;

const WINDOW_NARROW: usize = 5;
const WINDOW_MID: usize = 25;
const WINDOW_WIDE: usize = 125;

/// Piecewise running-median dereddener for one spectrum length.
///
/// Call [`Dereddener::calculate_median`] on the plain power spectrum, then
/// [`Dereddener::deredden`] on the complex spectrum the power came from.
pub struct Dereddener {
    boundary_5_freq: f64,
    boundary_25_freq: f64,
    bin_width: f64,
    median: Vec<f32>,
}

impl Dereddener {
    /// `nbins` is the spectrum length (S/2+1); the boundaries are the
    /// window-switch frequencies in Hz.
    pub fn new(nbins: usize, bin_width: f64, boundary_5_freq: f64, boundary_25_freq: f64) -> Self {
        Self {
            boundary_5_freq,
            boundary_25_freq,
            bin_width,
            median: vec![0.0; nbins],
        }
    }

    /// Estimate the noise floor of `power` with the piecewise running
    /// median.
    pub fn calculate_median(&mut self, power: &[f32]) {
        debug_assert_eq!(power.len(), self.median.len());
        let n = power.len();
        let b5 = ((self.boundary_5_freq / self.bin_width).ceil() as usize).min(n);
        let b25 = ((self.boundary_25_freq / self.bin_width).ceil() as usize).clamp(b5, n);

        self.fill_segment(power, 0, b5, WINDOW_NARROW);
        self.fill_segment(power, b5, b25, WINDOW_MID);
        self.fill_segment(power, b25, n, WINDOW_WIDE);
    }

    fn fill_segment(&mut self, power: &[f32], lo: usize, hi: usize, window: usize) {
        if lo >= hi {
            return;
        }
        let med = running_median(&power[lo..hi], window);
        self.median[lo..hi].copy_from_slice(&med);
    }

    /// The most recent noise-floor estimate.
    pub fn median(&self) -> &[f32] {
        &self.median
    }

    /// Flatten the noise floor of `spectrum` using the estimate from the
    /// last [`Dereddener::calculate_median`] call.  Each complex bin is
    /// divided by the square root of the (mean-rescaled) local floor, so
    /// the plain power of the result has mean ≈ 1.
    pub fn deredden(&self, spectrum: &mut [Complex<f32>]) {
        debug_assert_eq!(spectrum.len(), self.median.len());
        for (z, &m) in spectrum.iter_mut().zip(self.median.iter()) {
            let floor = (m as f64 / std::f64::consts::LN_2).max(f64::MIN_POSITIVE);
            let scale = (1.0 / floor.sqrt()) as f32;
            *z *= scale;
        }
    }
}
