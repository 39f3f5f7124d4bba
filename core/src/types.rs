//! Common types shared across the acceleration-search pipeline.
//!
//! These structures represent the fundamental data objects in a pulsar
//! acceleration search: the dedispersed trial cube handed over by the
//! dedisperser, observation metadata, search configuration, individual
//! candidate detections, and the collections they accumulate in.

use std::path::PathBuf;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Speed of light in m/s, used wherever an acceleration is converted into a
/// time delay or an apparent frequency drift.
pub const SPEED_OF_LIGHT: f64 = 2.997_924_58e8;

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// A single periodicity candidate detected by the search.
///
/// A candidate records where in the three-dimensional search space
/// (dispersion measure × acceleration × harmonic sum) a spectral peak was
/// found, and how significant it was.  The `harmonic` field records which
/// spectrum the peak came from: `0` for the fundamental power spectrum,
/// `h > 0` for the `2^h`-fold incoherent harmonic sum.  In every case
/// `freq` is the inferred *fundamental* frequency, i.e. the peak bin
/// frequency divided by the summing stretch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Candidate {
    /// Fundamental spin frequency of the detection, in Hz.
    pub freq: f64,

    /// Spin period in seconds (`1 / freq`).
    pub period: f64,

    /// Signal-to-noise ratio of the peak, in units of the local noise
    /// standard deviation of the (summed) spectrum.
    pub snr: f64,

    /// Dispersion measure of the trial the peak was found in, in pc/cm³.
    pub dm: f64,

    /// Trial line-of-sight acceleration the time series was resampled to,
    /// in m/s².
    pub acc: f64,

    /// Which spectrum the peak came from: 0 = fundamental power spectrum,
    /// h = the 2^h-fold harmonic sum.
    pub harmonic: usize,

    /// Index of the originating trial within the [`DispersionTrialSet`].
    pub dm_trial_idx: usize,

    /// Candidates this one absorbed during distillation.  Populated only by
    /// distillers constructed with `keep_related = true`; the scorer mines
    /// this list for DM-curve extent and harmonic consistency.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assoc: Vec<Candidate>,

    /// Quality metrics attached by the scorer after distillation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<CandidateScores>,
}

impl Candidate {
    /// Create a new candidate.  `freq` must be positive.
    pub fn new(
        freq: f64,
        snr: f64,
        dm: f64,
        dm_trial_idx: usize,
        acc: f64,
        harmonic: usize,
    ) -> Self {
        Self {
            freq,
            period: 1.0 / freq,
            snr,
            dm,
            acc,
            harmonic,
            dm_trial_idx,
            assoc: Vec::new(),
            scores: None,
        }
    }

    /// Number of candidates absorbed into this one, across all
    /// distillation passes.
    pub fn nassoc(&self) -> usize {
        self.assoc.len() + self.assoc.iter().map(|c| c.nassoc()).sum::<usize>()
    }

    /// Collect the DMs of this candidate and everything it absorbed.
    pub fn collect_dms(&self, out: &mut Vec<f64>) {
        out.push(self.dm);
        for c in &self.assoc {
            c.collect_dms(out);
        }
    }

    /// Visit this candidate and everything it absorbed.
    pub fn for_each_related<F: FnMut(&Candidate)>(&self, f: &mut F) {
        f(self);
        for c in &self.assoc {
            c.for_each_related(f);
        }
    }
}

// ---------------------------------------------------------------------------
// CandidateScores
// ---------------------------------------------------------------------------

/// Physically motivated quality metrics for a surviving candidate.
///
/// Scores annotate; they never remove a candidate.  See
/// [`crate::scorer::CandidateScorer`] for the definitions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CandidateScores {
    /// DM interval over which dispersive smearing across the full band
    /// equals one spin period, in pc/cm³.  Narrow-period candidates have a
    /// narrow expected DM response.
    pub dm_curve_width: f64,

    /// Observed spread of the DMs of all associated detections, divided by
    /// `dm_curve_width`.  A genuine pulsar traces out a response of order
    /// unity; interference is typically much wider or a single spike.
    pub dm_extent_ratio: f64,

    /// Expected intrinsic duty cycle: effective pulse width (sampling plus
    /// intra-channel dispersion smearing at the candidate DM) over the spin
    /// period.  Values near or above one mean the pulse is unresolved.
    pub expected_duty: f64,

    /// Best fundamental-spectrum SNR over the best harmonic-sum SNR among
    /// all associated detections, in (0, 1].  Narrow pulses concentrate
    /// power in the sums, so low values are expected for short duty cycles.
    pub harmonic_consistency: f64,
}

// ---------------------------------------------------------------------------
// CandidateCollection
// ---------------------------------------------------------------------------

/// An append-only set of candidates.
///
/// Workers accumulate one of these per DM trial loop; the master merges the
/// per-worker collections, distills them, and reports the survivors sorted
/// by descending SNR.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CandidateCollection {
    pub cands: Vec<Candidate>,
}

impl CandidateCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cands.is_empty()
    }

    /// Move all candidates out of `other` into this collection.
    pub fn append(&mut self, other: impl IntoIterator<Item = Candidate>) {
        self.cands.extend(other);
    }

    /// Sort in place by descending SNR.
    pub fn sort_by_snr(&mut self) {
        self.cands.sort_by(|a, b| b.snr.total_cmp(&a.snr));
    }

    /// Serialise the collection to a JSON string for interoperability.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl IntoIterator for CandidateCollection {
    type Item = Candidate;
    type IntoIter = std::vec::IntoIter<Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.cands.into_iter()
    }
}

// ---------------------------------------------------------------------------
// ObservationMeta
// ---------------------------------------------------------------------------

/// Acquisition parameters of the observation the trial cube came from.
///
/// The dedisperser owns the filterbank itself; the search core only needs
/// the handful of quantities that enter the acceleration plan and the
/// candidate scores.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObservationMeta {
    /// Time between successive samples, in seconds.
    pub tsamp: f64,

    /// Centre frequency of the band, in MHz.
    pub cfreq_mhz: f64,

    /// Channel bandwidth in MHz (negative when channels are ordered from
    /// high to low frequency, the common sigproc convention).
    pub foff_mhz: f64,

    /// Number of frequency channels.
    pub nchans: usize,
}

impl ObservationMeta {
    /// Total observation bandwidth in MHz.
    pub fn total_bandwidth_mhz(&self) -> f64 {
        (self.nchans as f64 * self.foff_mhz).abs()
    }
}

// ---------------------------------------------------------------------------
// DispersionTrialSet
// ---------------------------------------------------------------------------

/// The immutable cube of dedispersed time series, one row per DM trial.
///
/// Produced by the external dedisperser, read-only to the search: workers
/// address disjoint rows concurrently through [`DispersionTrialSet::trial`].
/// Every row has the same length and sample spacing.
#[derive(Clone, Debug)]
pub struct DispersionTrialSet {
    data: Array2<f32>,
    dms: Vec<f64>,
    tsamp: f64,
}

/// A borrowed view of one dedispersed time series, tagged with its DM.
#[derive(Clone, Copy, Debug)]
pub struct TimeSeries<'a> {
    pub dm: f64,
    pub data: ArrayView1<'a, f32>,
}

impl DispersionTrialSet {
    /// Wrap a `(ntrials, nsamps)` cube and its DM labels.
    ///
    /// Returns `Err` if the number of DM labels does not match the number
    /// of rows, or if `tsamp` is not positive.
    pub fn new(data: Array2<f32>, dms: Vec<f64>, tsamp: f64) -> Result<Self, ConfigError> {
        if dms.len() != data.nrows() {
            return Err(ConfigError::TrialShape {
                ntrials: data.nrows(),
                ndms: dms.len(),
            });
        }
        if tsamp <= 0.0 {
            return Err(ConfigError::BadValue {
                option: "tsamp",
                reason: "must be positive".into(),
            });
        }
        Ok(Self { data, dms, tsamp })
    }

    /// Number of DM trials.
    pub fn count(&self) -> usize {
        self.data.nrows()
    }

    /// Samples per trial.
    pub fn nsamps(&self) -> usize {
        self.data.ncols()
    }

    /// Sample spacing in seconds.
    pub fn tsamp(&self) -> f64 {
        self.tsamp
    }

    /// DM label of trial `idx`, in pc/cm³.
    pub fn dm(&self, idx: usize) -> f64 {
        self.dms[idx]
    }

    /// Borrow trial `idx` as a [`TimeSeries`].
    pub fn trial(&self, idx: usize) -> TimeSeries<'_> {
        TimeSeries {
            dm: self.dms[idx],
            data: self.data.row(idx),
        }
    }
}

// ---------------------------------------------------------------------------
// SearchConfig
// ---------------------------------------------------------------------------

/// Configuration for a full acceleration search run.
///
/// Field defaults follow long-standing survey practice; construct with
/// `SearchConfig::default()` and override what the observation requires.
/// [`SearchConfig::validate`] is called by the pipeline before any worker
/// starts, so a bad combination is reported up front.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Transform length S.  0 selects the previous power of two ≤ the
    /// number of samples; an explicit value larger than the trial length
    /// pads with the trial mean, a smaller one truncates.
    pub size: usize,

    /// First DM to dedisperse to, in pc/cm³ (consumed by the external
    /// dedisperser when it builds the trial cube).
    pub dm_start: f64,
    /// Last DM to dedisperse to, in pc/cm³.
    pub dm_end: f64,
    /// DM smearing tolerance (1.10 = 10 %).
    pub dm_tol: f64,
    /// Minimum pulse width for which `dm_tol` holds, in microseconds.
    pub dm_pulse_width_us: f64,

    /// First acceleration to resample to, in m/s².
    pub acc_start: f64,
    /// Last acceleration to resample to, in m/s².
    pub acc_end: f64,
    /// Acceleration smearing tolerance (1.10 = 10 %).
    pub acc_tol: f64,
    /// Minimum pulse width for which `acc_tol` holds, in microseconds.
    pub acc_pulse_width_us: f64,

    /// Frequency below which the dereddener uses its 5-bin median window,
    /// in Hz.
    pub boundary_5_freq: f64,
    /// Frequency below which the dereddener uses its 25-bin median window
    /// (and above which the 125-bin window), in Hz.
    pub boundary_25_freq: f64,

    /// Number of harmonic sums to form (sum h is 2^(h+1)-fold).
    pub nharmonics: usize,

    /// Minimum S/N for a spectral peak to become a candidate.
    pub min_snr: f64,

    /// Lowest Fourier frequency to consider, in Hz.
    pub min_freq: f64,
    /// Highest Fourier frequency to consider, in Hz.
    pub max_freq: f64,

    /// Maximum harmonic number when matching related candidates.
    pub max_harm: usize,

    /// Relative frequency tolerance for distilling candidates
    /// (0.0001 = 0.01 %).
    pub freq_tol: f64,

    /// Optional birdie list: `f_low f_high` pairs in Hz, one per line.
    pub zapfile: Option<PathBuf>,

    /// Upper bound on the number of worker threads.
    pub max_threads: usize,

    /// Emit coarse progress reports while DMs are dispensed.
    pub progress: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            size: 0,
            dm_start: 0.0,
            dm_end: 100.0,
            dm_tol: 1.10,
            dm_pulse_width_us: 64.0,
            acc_start: 0.0,
            acc_end: 0.0,
            acc_tol: 1.10,
            acc_pulse_width_us: 64.0,
            boundary_5_freq: 0.05,
            boundary_25_freq: 0.5,
            nharmonics: 4,
            min_snr: 9.0,
            min_freq: 0.1,
            max_freq: 1100.0,
            max_harm: 16,
            freq_tol: 1e-4,
            zapfile: None,
            max_threads: 14,
            progress: false,
        }
    }
}

impl SearchConfig {
    /// Check the configuration for internally inconsistent or physically
    /// meaningless settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn bad(option: &'static str, reason: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::BadValue {
                option,
                reason: reason.into(),
            })
        }

        if self.min_snr <= 0.0 {
            return bad("min_snr", "must be positive");
        }
        if self.min_freq < 0.0 {
            return bad("min_freq", "must be non-negative");
        }
        if self.max_freq <= self.min_freq {
            return bad("max_freq", "must exceed min_freq");
        }
        if self.acc_end < self.acc_start {
            return bad("acc_end", "must be >= acc_start");
        }
        if self.acc_tol <= 1.0 {
            return bad("acc_tol", "must be > 1 (1.10 = 10 % smearing)");
        }
        if self.acc_pulse_width_us <= 0.0 {
            return bad("acc_pulse_width", "must be positive");
        }
        if self.boundary_25_freq < self.boundary_5_freq {
            return bad("boundary_25_freq", "must be >= boundary_5_freq");
        }
        if self.nharmonics > 8 {
            return bad("nharmonics", "more than 8 sums exceeds any usable stretch");
        }
        if self.max_harm == 0 {
            return bad("max_harm", "must be at least 1");
        }
        if self.freq_tol <= 0.0 {
            return bad("freq_tol", "must be positive");
        }
        if self.size == 1 {
            return bad("size", "a one-point transform is meaningless");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while assembling the inputs of a search, before any worker
/// starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for `{option}`: {reason}")]
    BadValue {
        option: &'static str,
        reason: String,
    },

    #[error("trial cube has {ntrials} rows but {ndms} DM labels")]
    TrialShape { ntrials: usize, ndms: usize },
}
