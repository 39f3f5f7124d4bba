//! Candidate distillation.
//!
//! A single pulsar rarely produces a single detection.  Its harmonics
//! cross the threshold on their own, neighbouring acceleration trials both
//! pick it up, and the DM response spreads it over many trials.  The
//! distillers collapse each such family to its strongest member, along one
//! axis at a time:
//!
//! - [`HarmonicDistiller`] — candidates whose frequencies sit at an
//!   integer ratio n/m of one another,
//! - [`AccelerationDistiller`] — the same trial DM at different trial
//!   accelerations,
//! - [`DmDistiller`] — the same frequency across trial DMs (acceleration
//!   is deliberately ignored: at the wrong DM the best-fit acceleration
//!   shifts).
//!
//! All three share one engine: sort by descending S/N, then let each
//! surviving candidate absorb every weaker one it is related to.  A
//! distiller never invents a candidate, so the output is always a subset
//! of the input and a second pass changes nothing.  With `keep_related`
//! the absorbed candidates are retained on the survivor's `assoc` list as
//! evidence for the scorer.
//!
//! Reported frequencies are quantised to `bin_width / 2^h`, so detections
//! of one signal in different spectra can disagree by up to a bin.  Every
//! frequency comparison therefore floors its tolerance at one bin width on
//! top of the relative `freq_tol`.

use crate::types::{Candidate, SPEED_OF_LIGHT};

fn distill_by<R>(mut cands: Vec<Candidate>, keep_related: bool, related: R) -> Vec<Candidate>
where
    R: Fn(&Candidate, &Candidate) -> bool,
{
    cands.sort_by(|a, b| b.snr.total_cmp(&a.snr));
    let mut kept: Vec<Candidate> = Vec::with_capacity(cands.len());
    for cand in cands {
        match kept.iter().position(|k| related(k, &cand)) {
            Some(keeper) => {
                if keep_related {
                    kept[keeper].assoc.push(cand);
                }
            }
            None => kept.push(cand),
        }
    }
    kept
}

// ---------------------------------------------------------------------------
// HarmonicDistiller
// ---------------------------------------------------------------------------

/// Merges candidates related by an integer frequency ratio.
#[derive(Clone, Debug)]
pub struct HarmonicDistiller {
    freq_tol: f64,
    max_harm: usize,
    bin_width: f64,
    keep_related: bool,
}

impl HarmonicDistiller {
    pub fn new(freq_tol: f64, max_harm: usize, bin_width: f64, keep_related: bool) -> Self {
        Self {
            freq_tol,
            max_harm,
            bin_width,
            keep_related,
        }
    }

    fn related(&self, keeper: &Candidate, other: &Candidate) -> bool {
        let tol = self.freq_tol * keeper.freq + self.bin_width;
        for n in 1..=self.max_harm {
            let nf = keeper.freq * n as f64;
            for m in 1..=self.max_harm {
                if (other.freq - nf / m as f64).abs() < tol {
                    return true;
                }
            }
        }
        false
    }

    /// Collapse harmonically related candidates to the strongest member.
    pub fn distill(&self, cands: Vec<Candidate>) -> Vec<Candidate> {
        distill_by(cands, self.keep_related, |a, b| self.related(a, b))
    }
}

// ---------------------------------------------------------------------------
// AccelerationDistiller
// ---------------------------------------------------------------------------

/// Merges detections of one signal across neighbouring acceleration
/// trials of the same DM trial.
///
/// An acceleration mismatch δa drags the apparent frequency by up to
/// `f·δa·tobs/(2c)` over the observation, so the matching tolerance widens
/// by that amount on top of the relative `freq_tol`.  `tobs` is the span
/// of the full transform, padding included, matching the frame the
/// resampler works in.
#[derive(Clone, Debug)]
pub struct AccelerationDistiller {
    tobs: f64,
    freq_tol: f64,
    keep_related: bool,
}

impl AccelerationDistiller {
    pub fn new(tobs: f64, freq_tol: f64, keep_related: bool) -> Self {
        Self {
            tobs,
            freq_tol,
            keep_related,
        }
    }

    fn related(&self, keeper: &Candidate, other: &Candidate) -> bool {
        if keeper.dm != other.dm {
            return false;
        }
        let drift = keeper.freq * (keeper.acc - other.acc).abs() * self.tobs
            / (2.0 * SPEED_OF_LIGHT);
        let tol = self.freq_tol * keeper.freq + 1.0 / self.tobs + drift;
        (keeper.freq - other.freq).abs() <= tol
    }

    /// Collapse candidates across the acceleration axis.
    pub fn distill(&self, cands: Vec<Candidate>) -> Vec<Candidate> {
        distill_by(cands, self.keep_related, |a, b| self.related(a, b))
    }
}

// ---------------------------------------------------------------------------
// DmDistiller
// ---------------------------------------------------------------------------

/// Merges detections of one frequency across DM trials.
#[derive(Clone, Debug)]
pub struct DmDistiller {
    freq_tol: f64,
    bin_width: f64,
    keep_related: bool,
}

impl DmDistiller {
    pub fn new(freq_tol: f64, bin_width: f64, keep_related: bool) -> Self {
        Self {
            freq_tol,
            bin_width,
            keep_related,
        }
    }

    fn related(&self, keeper: &Candidate, other: &Candidate) -> bool {
        (keeper.freq - other.freq).abs() <= self.freq_tol * keeper.freq + self.bin_width
    }

    /// Collapse candidates across the DM axis.
    pub fn distill(&self, cands: Vec<Candidate>) -> Vec<Candidate> {
        distill_by(cands, self.keep_related, |a, b| self.related(a, b))
    }
}
