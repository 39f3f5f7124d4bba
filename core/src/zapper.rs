//! Birdie zapping — excision of known narrow-band interference.
//!
//! Terrestrial transmitters (mains hum and its harmonics, radar, on-site
//! electronics) put persistent tones into every power spectrum the
//! telescope produces.  Rather than score and reject them after detection,
//! the pipeline zeroes the affected spectral bins before peak finding,
//! driven by a per-observatory "birdie list" of frequency intervals.
//!
//! The list format is plain text, one `f_low f_high` pair in Hz per line;
//! blank lines and `#` comments are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;
use num_complex::Complex;

/// Errors raised while loading a birdie list.
#[derive(Debug, thiserror::Error)]
pub enum ZapError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad birdie list line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Zeroes out spectrum bins falling inside configured frequency intervals.
#[derive(Clone, Debug)]
pub struct Zapper {
    ranges: Vec<(f64, f64)>,
}

impl Zapper {
    /// Build a zapper from explicit `(f_low, f_high)` intervals in Hz.
    pub fn new(mut ranges: Vec<(f64, f64)>) -> Self {
        ranges.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { ranges }
    }

    /// Load a birdie list from `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ZapError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut ranges = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let text = line.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            let mut fields = text.split_whitespace();
            let lo = parse_field(fields.next(), idx)?;
            let hi = parse_field(fields.next(), idx)?;
            if hi < lo {
                return Err(ZapError::Parse {
                    line: idx + 1,
                    reason: format!("interval [{lo}, {hi}] is reversed"),
                });
            }
            ranges.push((lo, hi));
        }
        debug!("loaded {} birdie intervals", ranges.len());
        Ok(Self::new(ranges))
    }

    /// Number of configured intervals.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Zero every bin of `spectrum` whose frequency `k · bin_width` lies
    /// inside any configured interval.  Idempotent.
    pub fn zap(&self, spectrum: &mut [Complex<f32>], bin_width: f64) {
        let n = spectrum.len();
        if n == 0 {
            return;
        }
        for &(lo, hi) in &self.ranges {
            if hi < 0.0 {
                continue;
            }
            let k_lo = ((lo / bin_width).ceil().max(0.0) as usize).min(n);
            let k_hi = ((hi / bin_width).floor() as usize).min(n - 1);
            if k_lo > k_hi {
                continue;
            }
            for z in &mut spectrum[k_lo..=k_hi] {
                *z = Complex::new(0.0, 0.0);
            }
        }
    }
}

fn parse_field(field: Option<&str>, idx: usize) -> Result<f64, ZapError> {
    let text = field.ok_or_else(|| ZapError::Parse {
        line: idx + 1,
        reason: "expected two frequencies".into(),
    })?;
    text.parse::<f64>().map_err(|e| ZapError::Parse {
        line: idx + 1,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn zaps_only_bins_inside_intervals() {
        let zapper = Zapper::new(vec![(10.0, 12.0)]);
        let mut spec = vec![Complex::new(1.0f32, 1.0); 32];
        zapper.zap(&mut spec, 1.0); // bin k is k Hz
        for (k, z) in spec.iter().enumerate() {
            if (10..=12).contains(&k) {
                assert_eq!(z.norm_sqr(), 0.0, "bin {k} should be zapped");
            } else {
                assert!(z.norm_sqr() > 0.0, "bin {k} should survive");
            }
        }
    }

    #[test]
    fn zapping_is_idempotent() {
        let zapper = Zapper::new(vec![(2.0, 5.0), (20.0, 21.0)]);
        let mut once = vec![Complex::new(0.5f32, -0.5); 64];
        zapper.zap(&mut once, 0.5);
        let mut twice = once.clone();
        zapper.zap(&mut twice, 0.5);
        assert_eq!(once, twice);
    }

    #[test]
    fn parses_birdie_list_with_comments() {
        let dir = std::env::temp_dir();
        let path = dir.join("spindrift_zap_test.txt");
        {
            let mut f = File::create(&path).unwrap();
            writeln!(f, "# mains").unwrap();
            writeln!(f, "49.5 50.5").unwrap();
            writeln!(f).unwrap();
            writeln!(f, "99.5 100.5").unwrap();
        }
        let zapper = Zapper::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(zapper.len(), 2);
    }

    #[test]
    fn reversed_interval_is_an_error() {
        let dir = std::env::temp_dir();
        let path = dir.join("spindrift_zap_bad.txt");
        std::fs::write(&path, "60 59\n").unwrap();
        let err = Zapper::from_file(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, Err(ZapError::Parse { line: 1, .. })));
    }
}
