//! Physically motivated candidate quality scores.
//!
//! After distillation every survivor is annotated with a handful of
//! metrics a human (or a classifier) can rank on: how wide the DM response
//! should be for this period, how wide it actually came out, what duty
//! cycle the instrument could resolve at this DM, and how the fundamental
//! and harmonic-sum detections compare.  Scoring never removes a
//! candidate.

use log::info;
use rayon::prelude::*;

use crate::types::{Candidate, CandidateScores, ObservationMeta};

/// Dispersion constant: delay in seconds of a 1 pc/cm³ signal across
/// 1 MHz⁻² of inverse-square frequency.
const DISPERSION_CONST: f64 = 4.148_808e3;

/// Computes [`CandidateScores`] from the acquisition parameters of the
/// observation.
#[derive(Clone, Debug)]
pub struct CandidateScorer {
    tsamp: f64,
    cfreq_mhz: f64,
    foff_mhz: f64,
    total_bw_mhz: f64,
}

impl CandidateScorer {
    pub fn new(obs: &ObservationMeta) -> Self {
        Self {
            tsamp: obs.tsamp,
            cfreq_mhz: obs.cfreq_mhz,
            foff_mhz: obs.foff_mhz,
            total_bw_mhz: obs.total_bandwidth_mhz(),
        }
    }

    /// Score every candidate in place.  The candidates are independent, so
    /// the pass is data-parallel.
    pub fn score_all(&self, cands: &mut [Candidate]) {
        cands.par_iter_mut().for_each(|c| {
            c.scores = Some(self.score(c));
        });
        info!("scored {} candidates", cands.len());
    }

    /// Compute the scores for one candidate.
    pub fn score(&self, cand: &Candidate) -> CandidateScores {
        let dm_curve_width = self.dm_curve_width(cand.period);
        CandidateScores {
            dm_curve_width,
            dm_extent_ratio: self.dm_extent_ratio(cand, dm_curve_width),
            expected_duty: self.expected_duty(cand),
            harmonic_consistency: Self::harmonic_consistency(cand),
        }
    }

    /// DM offset at which dispersive smearing across the whole band equals
    /// one spin period.
    fn dm_curve_width(&self, period: f64) -> f64 {
        if self.total_bw_mhz <= 0.0 || self.cfreq_mhz <= 0.0 {
            return f64::INFINITY;
        }
        let f_lo = self.cfreq_mhz - 0.5 * self.total_bw_mhz;
        let f_hi = self.cfreq_mhz + 0.5 * self.total_bw_mhz;
        if f_lo <= 0.0 {
            return f64::INFINITY;
        }
        let span = f_lo.powi(-2) - f_hi.powi(-2);
        period / (DISPERSION_CONST * span)
    }

    /// Spread of the DMs this candidate was detected at, relative to the
    /// expected DM-curve width.
    fn dm_extent_ratio(&self, cand: &Candidate, dm_curve_width: f64) -> f64 {
        if !dm_curve_width.is_finite() || dm_curve_width <= 0.0 {
            return 0.0;
        }
        let mut dms = Vec::with_capacity(1 + cand.nassoc());
        cand.collect_dms(&mut dms);
        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
        for dm in dms {
            lo = lo.min(dm);
            hi = hi.max(dm);
        }
        (hi - lo) / dm_curve_width
    }

    /// Effective instrumental pulse width at the candidate DM over the
    /// spin period.
    fn expected_duty(&self, cand: &Candidate) -> f64 {
        let t_chan = if self.cfreq_mhz > 0.0 {
            8.3e3 * cand.dm * self.foff_mhz.abs() / self.cfreq_mhz.powi(3)
        } else {
            0.0
        };
        (self.tsamp * self.tsamp + t_chan * t_chan).sqrt() / cand.period
    }

    /// Best fundamental-spectrum S/N over the best S/N of any associated
    /// detection (1.0 when nothing was absorbed, or when the fundamental
    /// itself leads).
    fn harmonic_consistency(cand: &Candidate) -> f64 {
        let mut best = 0.0f64;
        let mut best_fundamental = 0.0f64;
        cand.for_each_related(&mut |c: &Candidate| {
            best = best.max(c.snr);
            if c.harmonic == 0 {
                best_fundamental = best_fundamental.max(c.snr);
            }
        });
        if best <= 0.0 || best_fundamental <= 0.0 {
            return 1.0;
        }
        (best_fundamental / best).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn meta() -> ObservationMeta {
        ObservationMeta {
            tsamp: 64e-6,
            cfreq_mhz: 1400.0,
            foff_mhz: -0.39,
            nchans: 1024,
        }
    }

    #[test]
    fn scores_are_attached_and_nothing_is_removed() {
        let scorer = CandidateScorer::new(&meta());
        let mut cands = vec![
            Candidate::new(123.4, 20.0, 30.0, 30, 0.0, 0),
            Candidate::new(7.6, 10.5, 12.0, 11, 4.0, 2),
        ];
        scorer.score_all(&mut cands);
        assert_eq!(cands.len(), 2);
        assert!(cands.iter().all(|c| c.scores.is_some()));
    }

    #[test]
    fn faster_candidates_have_narrower_dm_curves() {
        let scorer = CandidateScorer::new(&meta());
        let fast = scorer.score(&Candidate::new(500.0, 12.0, 30.0, 0, 0.0, 0));
        let slow = scorer.score(&Candidate::new(1.0, 12.0, 30.0, 0, 0.0, 0));
        assert!(fast.dm_curve_width < slow.dm_curve_width);
    }

    #[test]
    fn dm_extent_uses_absorbed_candidates() {
        let scorer = CandidateScorer::new(&meta());
        let mut c = Candidate::new(10.0, 20.0, 30.0, 30, 0.0, 0);
        c.assoc.push(Candidate::new(10.0, 15.0, 28.0, 28, 0.0, 0));
        c.assoc.push(Candidate::new(10.0, 14.0, 33.0, 33, 0.0, 0));
        let scores = scorer.score(&c);
        let lone = scorer.score(&Candidate::new(10.0, 20.0, 30.0, 30, 0.0, 0));
        assert!(scores.dm_extent_ratio > 0.0);
        assert_relative_eq!(lone.dm_extent_ratio, 0.0);
    }

    #[test]
    fn harmonic_consistency_compares_fundamental_to_sums() {
        let mut c = Candidate::new(10.0, 20.0, 30.0, 30, 0.0, 2);
        c.assoc.push(Candidate::new(10.0, 10.0, 30.0, 30, 0.0, 0));
        assert_relative_eq!(CandidateScorer::harmonic_consistency(&c), 0.5);
        // No fundamental detection at all: neutral score.
        let lone = Candidate::new(10.0, 20.0, 30.0, 30, 0.0, 3);
        assert_relative_eq!(CandidateScorer::harmonic_consistency(&lone), 1.0);
    }
}
