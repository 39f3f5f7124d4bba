//! Time-domain resampling for a constant line-of-sight acceleration.
//!
//! A pulse train emitted at uniform intervals by a source accelerating
//! along the line of sight arrives at the telescope with a quadratically
//! growing (or shrinking) delay: a sample emitted at time `t` is received
//! at `t' = t + a·t²/(2c)`.  Resampling undoes this for one trial
//! acceleration by reading each output sample from the received-frame
//! index it maps to, restoring a periodic signal to a constant apparent
//! frequency so that its Fourier peak sharpens back up.
//!
//! Times are measured from the midpoint of the transform, which leaves the
//! mid-observation frequency of the signal unchanged across trials.
//! Nearest-neighbour selection is used; at usable grid densities the
//! residual smearing it adds is below the plan's own tolerance.

use crate::types::SPEED_OF_LIGHT;

/// Nearest-neighbour acceleration resampler.
#[derive(Clone, Copy, Debug)]
pub struct TimeDomainResampler {
    tsamp: f64,
}

impl TimeDomainResampler {
    pub fn new(tsamp: f64) -> Self {
        Self { tsamp }
    }

    /// Fill `output` with `input` resampled to trial acceleration `accel`
    /// (m/s²).  Source indices falling outside the buffer clamp to its
    /// ends, which hold the padding mean.
    pub fn resample(&self, input: &[f32], output: &mut [f32], accel: f64) {
        debug_assert_eq!(input.len(), output.len());
        if accel == 0.0 {
            output.copy_from_slice(input);
            return;
        }
        let n = input.len();
        let half = n as f64 / 2.0;
        // Delay in samples at offset tau from mid-observation:
        //   a * (tau*tsamp)^2 / (2 c tsamp)
        let k = 0.5 * accel * self.tsamp / SPEED_OF_LIGHT;
        let last = n - 1;
        for (i, out) in output.iter_mut().enumerate() {
            let tau = i as f64 - half;
            let j = (i as f64 + k * tau * tau).round();
            let j = if j < 0.0 {
                0
            } else if j > last as f64 {
                last
            } else {
                j as usize
            };
            *out = input[j];
        }
    }
}
