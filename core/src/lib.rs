//! # spindrift-core
//!
//! High-performance pulsar acceleration-search library written in Rust.
//!
//! ## Overview
//!
//! This crate provides the computational core of the **Spindrift**
//! pipeline: given a set of dedispersed time series at trial dispersion
//! measures, it discovers periodic signals whose apparent frequency drifts
//! under a constant line-of-sight acceleration, and fuses the detections
//! across DM, acceleration and harmonic number into a ranked candidate
//! list.
//!
//! | Module          | Purpose                                                |
//! |-----------------|--------------------------------------------------------|
//! | [`pipeline`]    | Worker pool, DM dispenser and the search driver        |
//! | [`fft`]         | Cached real↔complex FFT plans                          |
//! | [`spectrum`]    | Plain and bin-pair interpolated power spectra          |
//! | [`dereddener`]  | Piecewise running-median red-noise removal             |
//! | [`zapper`]      | Birdie (known-interference) excision                   |
//! | [`resampler`]   | Time-domain resampling for trial accelerations         |
//! | [`harmonics`]   | Incoherent harmonic summing                            |
//! | [`peak_finder`] | Thresholding normalised spectra into candidates        |
//! | [`accel_plan`]  | Tolerance-driven acceleration grid generation          |
//! | [`distiller`]   | Harmonic / acceleration / DM candidate distillation    |
//! | [`scorer`]      | Physically motivated candidate quality metrics         |
//! | [`stats`]       | Means, normalisation, running medians                  |
//! | [`types`]       | Shared data structures (trials, candidates, config)    |
//!
//! ## Usage
//!
//! ```no_run
//! use ndarray::Array2;
//! use spindrift_core::{run_search, DispersionTrialSet, ObservationMeta, SearchConfig};
//!
//! // The dedisperser (an external collaborator) provides the trial cube.
//! let cube = Array2::<f32>::zeros((64, 1 << 16));
//! let dms: Vec<f64> = (0..64).map(|i| i as f64 * 0.5).collect();
//! let trials = DispersionTrialSet::new(cube, dms, 64e-6)?;
//!
//! let obs = ObservationMeta {
//!     tsamp: 64e-6,
//!     cfreq_mhz: 1400.0,
//!     foff_mhz: -0.39,
//!     nchans: 1024,
//! };
//! let config = SearchConfig {
//!     acc_end: 50.0,
//!     ..Default::default()
//! };
//!
//! let output = run_search(&trials, &obs, &config)?;
//! for cand in &output.candidates.cands {
//!     println!("{:.6} Hz  S/N {:.1}  DM {:.1}", cand.freq, cand.snr, cand.dm);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod accel_plan;
pub mod dereddener;
pub mod distiller;
pub mod fft;
pub mod harmonics;
pub mod peak_finder;
pub mod pipeline;
pub mod resampler;
pub mod scorer;
pub mod spectrum;
pub mod stats;
pub mod types;
pub mod zapper;

// Re-export the most commonly used items at crate root for convenience.
pub use accel_plan::AccelerationPlan;
pub use distiller::{AccelerationDistiller, DmDistiller, HarmonicDistiller};
pub use pipeline::{run_search, DmDispenser, SearchError, SearchOutput, WorkerError};
pub use scorer::CandidateScorer;
pub use types::{
    Candidate, CandidateCollection, CandidateScores, ConfigError, DispersionTrialSet,
    ObservationMeta, SearchConfig, TimeSeries, SPEED_OF_LIGHT,
};
pub use zapper::{ZapError, Zapper};
