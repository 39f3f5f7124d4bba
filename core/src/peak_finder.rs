//! Threshold peak finding on normalised spectra.
//!
//! By the time a spectrum reaches the peak finder its bins are in units of
//! the noise standard deviation, so a fixed S/N threshold applies
//! directly.  For a 2^h-fold harmonic sum the noise grows by √(2^h), so
//! the raw threshold is scaled up and the reported S/N scaled back down by
//! the same factor.  A bin is a peak if it crosses the threshold and is a
//! local maximum; on a plateau the leftmost bin wins.

use crate::harmonics::HarmonicSums;
use crate::types::{Candidate, CandidateCollection};

/// Identifies the trial a spectrum belongs to, so the peaks it yields can
/// be tagged.
#[derive(Clone, Copy, Debug)]
pub struct TrialInfo {
    pub dm: f64,
    pub dm_trial_idx: usize,
    pub acc: f64,
}

/// Threshold-and-local-maximum candidate finder.
#[derive(Clone, Copy, Debug)]
pub struct PeakFinder {
    min_snr: f64,
    min_freq: f64,
    max_freq: f64,
}

impl PeakFinder {
    /// `min_snr` is the detection threshold in σ; `min_freq`/`max_freq`
    /// bound the Fourier frequencies searched, in Hz.
    pub fn new(min_snr: f64, min_freq: f64, max_freq: f64) -> Self {
        Self {
            min_snr,
            min_freq,
            max_freq,
        }
    }

    /// Search one spectrum and append a [`Candidate`] for every peak.
    ///
    /// `harmonic` follows the candidate convention: 0 for the plain
    /// spectrum, h for the 2^h-fold sum.  Reported frequencies are
    /// fundamental frequencies (`k · bin_width / 2^harmonic`) and reported
    /// S/N is per-√fold.
    pub fn find_peaks(
        &self,
        power: &[f32],
        bin_width: f64,
        harmonic: usize,
        trial: &TrialInfo,
        out: &mut CandidateCollection,
    ) {
        let n = power.len();
        if n < 3 {
            return;
        }
        let fold = 1usize << harmonic;
        let sqrt_fold = (fold as f64).sqrt();
        let thresh = (self.min_snr * sqrt_fold) as f32;

        // The frequency window applies to the raw bin frequency; bins 0
        // and n-1 are excluded so every examined bin has two neighbours.
        let k_lo = ((self.min_freq / bin_width).ceil() as usize).max(1);
        let k_hi = ((self.max_freq / bin_width).floor() as usize).min(n - 2);
        if k_lo > k_hi {
            return;
        }

        for k in k_lo..=k_hi {
            let v = power[k];
            if v >= thresh && v > power[k - 1] && v >= power[k + 1] {
                let freq = k as f64 * bin_width / fold as f64;
                let snr = v as f64 / sqrt_fold;
                out.cands.push(Candidate::new(
                    freq,
                    snr,
                    trial.dm,
                    trial.dm_trial_idx,
                    trial.acc,
                    harmonic,
                ));
            }
        }
    }

    /// Search every harmonic sum in `sums`.
    pub fn find_in_sums(
        &self,
        sums: &HarmonicSums,
        bin_width: f64,
        trial: &TrialInfo,
        out: &mut CandidateCollection,
    ) {
        for h in 0..sums.count() {
            self.find_peaks(sums.sum(h), bin_width, h + 1, trial, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn trial() -> TrialInfo {
        TrialInfo {
            dm: 12.5,
            dm_trial_idx: 3,
            acc: -2.0,
        }
    }

    #[test]
    fn single_delta_yields_exactly_one_candidate() {
        let mut power = vec![0.0f32; 512];
        power[100] = 18.0;
        let finder = PeakFinder::new(9.0, 0.1, 1100.0);
        let mut out = CandidateCollection::new();
        finder.find_peaks(&power, 1.0, 0, &trial(), &mut out);
        assert_eq!(out.len(), 1);
        let c = &out.cands[0];
        assert_relative_eq!(c.freq, 100.0);
        assert_relative_eq!(c.snr, 18.0);
        assert_eq!(c.dm_trial_idx, 3);
        assert_eq!(c.harmonic, 0);
    }

    #[test]
    fn plateau_reports_the_leftmost_bin() {
        let mut power = vec![0.0f32; 256];
        power[40] = 15.0;
        power[41] = 15.0;
        let finder = PeakFinder::new(9.0, 0.0, 1000.0);
        let mut out = CandidateCollection::new();
        finder.find_peaks(&power, 1.0, 0, &trial(), &mut out);
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out.cands[0].freq, 40.0);
    }

    #[test]
    fn frequency_window_excludes_out_of_band_peaks() {
        let mut power = vec![0.0f32; 512];
        power[5] = 30.0;
        power[300] = 30.0;
        let finder = PeakFinder::new(9.0, 10.0, 200.0);
        let mut out = CandidateCollection::new();
        finder.find_peaks(&power, 1.0, 0, &trial(), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn below_threshold_bins_are_ignored() {
        let mut power = vec![0.0f32; 128];
        power[60] = 8.9;
        let finder = PeakFinder::new(9.0, 0.1, 100.0);
        let mut out = CandidateCollection::new();
        finder.find_peaks(&power, 1.0, 0, &trial(), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn harmonic_sum_threshold_and_snr_scale_with_fold() {
        // In a 4-fold sum (harmonic = 2) the threshold doubles and the
        // reported S/N halves.
        let mut power = vec![0.0f32; 256];
        power[80] = 19.0; // above 9 * sqrt(4) = 18
        let finder = PeakFinder::new(9.0, 0.1, 250.0);
        let mut out = CandidateCollection::new();
        finder.find_peaks(&power, 1.0, 2, &trial(), &mut out);
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out.cands[0].snr, 9.5);
        assert_relative_eq!(out.cands[0].freq, 20.0); // 80 / 4
        assert_eq!(out.cands[0].harmonic, 2);

        power[80] = 17.0; // below the scaled threshold
        let mut out = CandidateCollection::new();
        finder.find_peaks(&power, 1.0, 2, &trial(), &mut out);
        assert!(out.is_empty());
    }
}
