//! The acceleration-search pipeline: work dispensing, per-worker trial
//! processing, and the master driver that fuses worker output.
//!
//! # Execution model
//!
//! The driver starts K long-lived worker threads, K = min(`max_threads`,
//! available cores, number of trials).  Each worker owns a complete
//! compute context — FFT plans and every scratch buffer, former,
//! dereddener, resampler, folder and finder it needs — built once on
//! entry and reused for every trial, so the only shared mutable state in
//! the whole search is the dispenser cursor behind its single mutex.
//!
//! A worker loops: take the next DM index, run the cleaning chain
//! (forward FFT → power spectrum → running-median estimate → deredden →
//! zap → interpolated spectrum → statistics → inverse FFT), then for each
//! planned acceleration resample, transform, normalise, harmonic-sum and
//! peak-find, distilling harmonics within the trial and accelerations
//! across the trial.  Any transform fault is fatal to that worker alone;
//! its candidates from completed trials still join the aggregate.
//!
//! After all workers are joined the master distills across DM, distills
//! harmonics once more, scores the survivors and returns them sorted by
//! descending S/N.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use log::{debug, error, info};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::accel_plan::AccelerationPlan;
use crate::dereddener::Dereddener;
use crate::distiller::{AccelerationDistiller, DmDistiller, HarmonicDistiller};
use crate::fft::{FftPair, TransformError};
use crate::harmonics::{HarmonicFolder, HarmonicSums};
use crate::peak_finder::{PeakFinder, TrialInfo};
use crate::resampler::TimeDomainResampler;
use crate::scorer::CandidateScorer;
use crate::spectrum::SpectrumFormer;
use crate::stats;
use crate::types::{
    Candidate, CandidateCollection, ConfigError, DispersionTrialSet, ObservationMeta,
    SearchConfig,
};
use crate::zapper::{ZapError, Zapper};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A fault inside one worker.  Fatal to that worker only: DM trials are
/// independent, so the partial results remain valid.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("transform failure: {0}")]
    Transform(#[from] TransformError),
}

/// Top-level search failure.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("birdie list error: {0}")]
    Zap(#[from] ZapError),

    #[error("all {failed} workers faulted")]
    AllWorkersFaulted { failed: usize },
}

// ---------------------------------------------------------------------------
// DmDispenser
// ---------------------------------------------------------------------------

/// Metes out DM trial indices to workers under mutual exclusion.
///
/// The cursor is the one piece of shared mutable state in the search.
/// `next` returns each index in `0..count` exactly once across all
/// callers, then `None` forever.
pub struct DmDispenser {
    count: usize,
    progress: bool,
    state: Mutex<DispenserState>,
}

struct DispenserState {
    cursor: usize,
    last_decile: usize,
}

impl DmDispenser {
    pub fn new(count: usize, progress: bool) -> Self {
        Self {
            count,
            progress,
            state: Mutex::new(DispenserState {
                cursor: 0,
                last_decile: 0,
            }),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Take the next trial index, or `None` when the set is exhausted.
    pub fn next(&self) -> Option<usize> {
        // A worker panicking while holding the lock must not wedge the
        // others; the state is a bare cursor, always valid.
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.cursor >= self.count {
            return None;
        }
        let idx = state.cursor;
        state.cursor += 1;
        if self.progress {
            if idx == 0 {
                info!("releasing {} DM trials to workers", self.count);
            }
            let decile = 10 * state.cursor / self.count;
            if decile > state.last_decile {
                state.last_decile = decile;
                info!("dispensed {}/{} DM trials", state.cursor, self.count);
            }
        }
        Some(idx)
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// One search worker, bound to one compute context for its lifetime.
struct Worker<'a> {
    id: usize,
    size: usize,
    trials: &'a DispersionTrialSet,
    dispenser: &'a DmDispenser,
    plan: &'a AccelerationPlan,
    zapper: Option<&'a Zapper>,
    config: &'a SearchConfig,
}

/// The per-worker compute context: FFT plans, scratch buffers and the
/// transform chain, allocated once and reused across every trial.
struct WorkerContext {
    fft: FftPair,
    tim: Vec<f32>,
    tim_clean: Vec<f32>,
    tim_resamp: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    power: Vec<f32>,
    former: SpectrumFormer,
    rednoise: Dereddener,
    resampler: TimeDomainResampler,
    folder: HarmonicFolder,
    sums: HarmonicSums,
    finder: PeakFinder,
    harm_still: HarmonicDistiller,
    acc_still: AccelerationDistiller,
    bin_width: f64,
}

impl WorkerContext {
    fn new(size: usize, tsamp: f64, config: &SearchConfig) -> Self {
        let fft = FftPair::new(size);
        let nbins = fft.spectrum_len();
        let tobs = size as f64 * tsamp;
        let bin_width = 1.0 / tobs;
        Self {
            fft,
            tim: vec![0.0; size],
            tim_clean: vec![0.0; size],
            tim_resamp: vec![0.0; size],
            spectrum: vec![Complex::new(0.0, 0.0); nbins],
            power: vec![0.0; nbins],
            former: SpectrumFormer::new(),
            rednoise: Dereddener::new(
                nbins,
                bin_width,
                config.boundary_5_freq,
                config.boundary_25_freq,
            ),
            resampler: TimeDomainResampler::new(tsamp),
            folder: HarmonicFolder::new(),
            sums: HarmonicSums::new(nbins, config.nharmonics),
            finder: PeakFinder::new(config.min_snr, config.min_freq, config.max_freq),
            harm_still: HarmonicDistiller::new(config.freq_tol, config.max_harm, bin_width, false),
            acc_still: AccelerationDistiller::new(tobs, config.freq_tol, true),
            bin_width,
        }
    }
}

impl Worker<'_> {
    /// Consume trials until the dispenser runs dry.  On a fault the worker
    /// stops early and hands back whatever it finished.
    fn run(&self) -> (CandidateCollection, Option<WorkerError>) {
        debug!("worker {} starting, transform length {}", self.id, self.size);
        let mut ctx = WorkerContext::new(self.size, self.trials.tsamp(), self.config);
        let mut dm_trial_cands = CandidateCollection::new();

        while let Some(idx) = self.dispenser.next() {
            match self.process_trial(idx, &mut ctx) {
                Ok(cands) => dm_trial_cands.append(cands),
                Err(e) => {
                    error!("worker {} faulted on DM trial {}: {}", self.id, idx, e);
                    return (dm_trial_cands, Some(e));
                }
            }
        }
        debug!(
            "worker {} drained, {} candidates accumulated",
            self.id,
            dm_trial_cands.len()
        );
        (dm_trial_cands, None)
    }

    /// Run the full per-DM chain and return the candidates that survive
    /// the within-trial distillation passes.
    fn process_trial(
        &self,
        idx: usize,
        ctx: &mut WorkerContext,
    ) -> Result<Vec<Candidate>, WorkerError> {
        let trial = self.trials.trial(idx);
        debug!(
            "worker {} processing trial {} (DM {})",
            self.id, idx, trial.dm
        );

        // Copy the trial into the transform buffer; pad with the mean when
        // the transform is longer than the data, truncate when shorter.
        let ncopy = self.trials.nsamps().min(self.size);
        for (dst, &src) in ctx.tim[..ncopy].iter_mut().zip(trial.data.iter()) {
            *dst = src;
        }
        if self.size > ncopy {
            let pad = stats::mean(&ctx.tim[..ncopy]) as f32;
            ctx.tim[ncopy..].fill(pad);
        }

        // Cleaning chain: flatten the red-noise floor and excise birdies,
        // then return to the time domain with the noise whitened.
        ctx.fft.forward(&mut ctx.tim, &mut ctx.spectrum)?;
        ctx.former.form(&ctx.spectrum, &mut ctx.power);
        ctx.rednoise.calculate_median(&ctx.power);
        ctx.rednoise.deredden(&mut ctx.spectrum);
        if let Some(zapper) = self.zapper {
            zapper.zap(&mut ctx.spectrum, ctx.bin_width);
        }
        ctx.former.form_interpolated(&ctx.spectrum, &mut ctx.power);
        let (mean, std) = stats::mean_std(&ctx.power);
        ctx.fft.inverse(&mut ctx.spectrum, &mut ctx.tim_clean)?;

        let acc_list = self.plan.generate(trial.dm);
        debug!(
            "worker {} trial {}: {} acceleration trials",
            self.id,
            idx,
            acc_list.len()
        );

        let mut accel_trial_cands: Vec<Candidate> = Vec::new();
        for &acc in &acc_list {
            ctx.resampler
                .resample(&ctx.tim_clean, &mut ctx.tim_resamp, acc);
            ctx.fft.forward(&mut ctx.tim_resamp, &mut ctx.spectrum)?;
            ctx.former.form_interpolated(&ctx.spectrum, &mut ctx.power);
            stats::normalise(&mut ctx.power, mean, std);
            ctx.folder.fold(&ctx.power, &mut ctx.sums);

            let info = TrialInfo {
                dm: trial.dm,
                dm_trial_idx: idx,
                acc,
            };
            let mut found = CandidateCollection::new();
            ctx.finder
                .find_peaks(&ctx.power, ctx.bin_width, 0, &info, &mut found);
            ctx.finder
                .find_in_sums(&ctx.sums, ctx.bin_width, &info, &mut found);

            accel_trial_cands.extend(ctx.harm_still.distill(found.cands));
        }

        Ok(ctx.acc_still.distill(accel_trial_cands))
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Aggregated results of a search run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchOutput {
    /// Distilled, scored candidates, sorted by descending S/N.
    pub candidates: CandidateCollection,

    /// Number of DM trials searched.
    pub n_dm_trials: usize,

    /// Number of worker threads used.
    pub n_workers: usize,

    /// Workers that faulted before the dispenser ran dry.
    pub n_faulted_workers: usize,

    /// Candidates collected from workers before the master distillation
    /// passes.
    pub n_raw_candidates: usize,

    /// Wall-clock processing time, in milliseconds.
    pub processing_time_ms: u64,
}

/// Largest power of two not exceeding `n` (0 for 0).
pub fn prev_power_of_two(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        1 << (usize::BITS - 1 - n.leading_zeros())
    }
}

/// Run a full acceleration search over `trials`.
///
/// An empty candidate list is a normal outcome, not an error.  Faulted
/// workers are logged and their completed trials kept; only the loss of
/// every worker aborts the search.
pub fn run_search(
    trials: &DispersionTrialSet,
    obs: &ObservationMeta,
    config: &SearchConfig,
) -> Result<SearchOutput, SearchError> {
    let started = Instant::now();
    config.validate()?;

    let size = if config.size == 0 {
        prev_power_of_two(trials.nsamps())
    } else {
        config.size
    };
    if size < 16 {
        return Err(ConfigError::BadValue {
            option: "size",
            reason: format!("transform length {size} is too short to search"),
        }
        .into());
    }
    info!("transform length set to {size} points");

    let zapper = match &config.zapfile {
        Some(path) => {
            info!("using birdie list {}", path.display());
            Some(Zapper::from_file(path)?)
        }
        None => None,
    };

    let plan = AccelerationPlan::new(
        config.acc_start,
        config.acc_end,
        config.acc_tol,
        config.acc_pulse_width_us,
        size,
        trials.tsamp(),
        obs.cfreq_mhz,
        obs.foff_mhz,
    );

    let cores = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    let n_workers = config
        .max_threads
        .min(cores)
        .clamp(1, trials.count().max(1));
    info!(
        "searching {} DM trials with {} workers",
        trials.count(),
        n_workers
    );

    let dispenser = DmDispenser::new(trials.count(), config.progress);
    let mut dm_cands = CandidateCollection::new();
    let mut faulted = 0usize;

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(n_workers);
        for id in 0..n_workers {
            let worker = Worker {
                id,
                size,
                trials,
                dispenser: &dispenser,
                plan: &plan,
                zapper: zapper.as_ref(),
                config,
            };
            handles.push(scope.spawn(move || worker.run()));
        }
        for handle in handles {
            match handle.join() {
                Ok((cands, fault)) => {
                    if let Some(e) = fault {
                        faulted += 1;
                        error!("search continuing without faulted worker: {e}");
                    }
                    dm_cands.append(cands);
                }
                Err(_) => {
                    faulted += 1;
                    error!("a worker panicked; search continuing without it");
                }
            }
        }
    });

    if faulted == n_workers && trials.count() > 0 {
        return Err(SearchError::AllWorkersFaulted { failed: faulted });
    }

    let n_raw = dm_cands.len();
    info!("distilling {n_raw} candidates across DM and harmonics");
    let bin_width = 1.0 / (size as f64 * trials.tsamp());
    let mut cands = DmDistiller::new(config.freq_tol, bin_width, true).distill(dm_cands.cands);
    cands =
        HarmonicDistiller::new(config.freq_tol, config.max_harm, bin_width, true).distill(cands);

    CandidateScorer::new(obs).score_all(&mut cands);

    let mut candidates = CandidateCollection { cands };
    candidates.sort_by_snr();

    let processing_time_ms = started.elapsed().as_millis() as u64;
    info!(
        "search complete in {} ms — {} distilled candidates ({} raw)",
        processing_time_ms,
        candidates.len(),
        n_raw
    );

    Ok(SearchOutput {
        candidates,
        n_dm_trials: trials.count(),
        n_workers,
        n_faulted_workers: faulted,
        n_raw_candidates: n_raw,
        processing_time_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[test]
    fn prev_power_of_two_brackets() {
        assert_eq!(prev_power_of_two(0), 0);
        assert_eq!(prev_power_of_two(1), 1);
        assert_eq!(prev_power_of_two(1023), 512);
        assert_eq!(prev_power_of_two(1024), 1024);
        assert_eq!(prev_power_of_two(1025), 1024);
    }

    #[test]
    fn dispenser_is_complete_and_exact_under_contention() {
        let n = 1000;
        let dispenser = DmDispenser::new(n, false);
        let seen = Mutex::new(Vec::new());
        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let mut local = Vec::new();
                    while let Some(idx) = dispenser.next() {
                        local.push(idx);
                    }
                    seen.lock().unwrap().extend(local);
                });
            }
        });
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), n);
        let unique: HashSet<usize> = seen.iter().copied().collect();
        assert_eq!(unique.len(), n);
        assert_eq!(*seen.iter().max().unwrap(), n - 1);
        // Exhausted forever afterwards.
        assert_eq!(dispenser.next(), None);
        assert_eq!(dispenser.next(), None);
    }

    #[test]
    fn empty_dispenser_returns_none_immediately() {
        let dispenser = DmDispenser::new(0, false);
        assert_eq!(dispenser.next(), None);
    }
}
