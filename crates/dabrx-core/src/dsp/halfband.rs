//! Half-band FIR decimator taking the RF stream from 4096 kHz to 2048 kHz.
//!
//! Classic half-band structure: odd tap count with every even-offset tap
//! (except the center) exactly zero, so the inner loop only touches the odd
//! taps plus the delayed center sample. I and Q run through separate
//! circular histories; each history is stored twice so the filter window is
//! always one contiguous slice.

use thiserror::Error;

/// Tap count of the anti-aliasing filter. Must satisfy `T ≡ 3 (mod 4)` so
/// the nonzero taps pair up symmetrically around the center.
pub const DECIMATOR_TAPS: usize = 43;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("input must hold an even, nonzero number of I/Q pairs ({0} floats given)")]
    UnalignedInput(usize),
    #[error("output buffer too small: need {needed} floats, got {got}")]
    OutputTooSmall { needed: usize, got: usize },
}

/// 2:1 decimator over interleaved I/Q `f32` blocks.
pub struct HalfBandDecimator {
    taps: usize,
    /// Nonzero tap weights: `(taps + 1) / 4` symmetric side coefficients
    /// followed by the center coefficient.
    coefs: Vec<f32>,
    hist_i: Vec<f32>,
    hist_q: Vec<f32>,
    pos: usize,
}

impl HalfBandDecimator {
    pub fn new() -> Self {
        let taps = DECIMATOR_TAPS;
        Self {
            taps,
            coefs: design_halfband(taps),
            hist_i: vec![0.0; 2 * taps],
            hist_q: vec![0.0; 2 * taps],
            pos: 0,
        }
    }

    /// Clears the filter memory. Called on every retune so samples from the
    /// previous channel never bleed into the new one.
    pub fn reset(&mut self) {
        self.hist_i.iter_mut().for_each(|v| *v = 0.0);
        self.hist_q.iter_mut().for_each(|v| *v = 0.0);
        self.pos = 0;
    }

    /// Group delay in output samples (the filter is linear-phase).
    pub fn output_delay(&self) -> usize {
        (self.taps - 1) / 4
    }

    /// Filters and decimates one block. `input` is interleaved I/Q and must
    /// hold an even, nonzero number of complex samples; `output` receives
    /// half as many complex samples (`input.len() / 2` floats). Returns the
    /// block peak power `max(I² + Q²)` over the decimated output.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> Result<f32, FilterError> {
        let complex_in = input.len() / 2;
        if input.len() % 2 != 0 || complex_in == 0 || complex_in % 2 != 0 {
            return Err(FilterError::UnalignedInput(input.len()));
        }
        let needed = input.len() / 2;
        if output.len() < needed {
            return Err(FilterError::OutputTooSmall {
                needed,
                got: output.len(),
            });
        }

        let taps = self.taps;
        let side = (taps + 1) / 4;
        let center = (taps - 1) / 2;
        let mut peak = 0.0f32;
        let mut out_idx = 0usize;

        for k in 0..complex_in {
            let i = input[2 * k];
            let q = input[2 * k + 1];
            // Mirrored write keeps the window contiguous.
            self.hist_i[self.pos] = i;
            self.hist_i[self.pos + taps] = i;
            self.hist_q[self.pos] = q;
            self.hist_q[self.pos + taps] = q;

            if k % 2 == 1 {
                let wi = &self.hist_i[self.pos + 1..self.pos + 1 + taps];
                let wq = &self.hist_q[self.pos + 1..self.pos + 1 + taps];
                let mut acc_i = self.coefs[side] * wi[center];
                let mut acc_q = self.coefs[side] * wq[center];
                for c in 0..side {
                    acc_i += self.coefs[c] * (wi[2 * c] + wi[taps - 1 - 2 * c]);
                    acc_q += self.coefs[c] * (wq[2 * c] + wq[taps - 1 - 2 * c]);
                }
                output[out_idx] = acc_i;
                output[out_idx + 1] = acc_q;
                out_idx += 2;
                let power = acc_i * acc_i + acc_q * acc_q;
                if power > peak {
                    peak = power;
                }
            }

            self.pos = (self.pos + 1) % taps;
        }

        Ok(peak)
    }
}

impl Default for HalfBandDecimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Blackman-windowed ideal half-band lowpass, normalized to unity DC gain.
/// Returns the `(taps + 1) / 4` side coefficients followed by the center.
fn design_halfband(taps: usize) -> Vec<f32> {
    use std::f64::consts::PI;
    debug_assert_eq!(taps % 4, 3);
    let side = (taps + 1) / 4;
    let center = ((taps - 1) / 2) as f64;
    let mut coefs = Vec::with_capacity(side + 1);
    let span = (taps - 1) as f64;
    for c in 0..side {
        let m = (2 * c) as f64;
        let d = center - m;
        let ideal = (PI * d / 2.0).sin() / (PI * d);
        let window = 0.42 - 0.5 * (2.0 * PI * m / span).cos() + 0.08 * (4.0 * PI * m / span).cos();
        coefs.push(ideal * window);
    }
    coefs.push(0.5);
    let dc: f64 = coefs[..side].iter().map(|&c| 2.0 * c as f64).sum::<f64>() + 0.5;
    coefs.into_iter().map(|c| (c as f64 / dc) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_dc_gain() {
        let coefs = design_halfband(DECIMATOR_TAPS);
        let side = (DECIMATOR_TAPS + 1) / 4;
        let dc: f32 = coefs[..side].iter().map(|c| 2.0 * c).sum::<f32>() + coefs[side];
        assert!((dc - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_halves_sample_count_and_tracks_peak() {
        let mut filter = HalfBandDecimator::new();
        // Constant 1 + 0i input settles to 1 + 0i output at unity DC gain.
        let input = vec![1.0f32, 0.0].repeat(512);
        let mut output = vec![0.0f32; input.len() / 2];
        let peak = filter.process(&input, &mut output).unwrap();
        let settled = &output[output.len() - 2..];
        assert!((settled[0] - 1.0).abs() < 1e-3);
        assert!(settled[1].abs() < 1e-6);
        assert!((peak - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_impulse_lands_at_group_delay() {
        let mut filter = HalfBandDecimator::new();
        let mut input = vec![0.0f32; 256];
        input[0] = 1.0; // impulse on I at sample 0 (even input phase)
        let mut output = vec![0.0f32; 128];
        filter.process(&input, &mut output).unwrap();
        // Even-phase impulses only excite the center tap, so the response
        // is a single spike at the group delay.
        let delay = filter.output_delay();
        assert_eq!(delay, 10);
        for k in 0..output.len() / 2 {
            let mag = output[2 * k].abs();
            if k == delay {
                assert!((mag - 0.5).abs() < 1e-2, "center spike was {mag}");
            } else {
                assert!(mag < 1e-6, "leakage at output {k}: {mag}");
            }
        }
    }

    #[test]
    fn test_odd_phase_impulse_spreads_symmetrically() {
        let mut filter = HalfBandDecimator::new();
        let mut input = vec![0.0f32; 256];
        input[2] = 1.0; // impulse on I at sample 1 (odd input phase)
        let mut output = vec![0.0f32; 128];
        filter.process(&input, &mut output).unwrap();
        let taps: Vec<f32> = (0..output.len() / 2).map(|k| output[2 * k]).collect();
        // Linear phase: response is symmetric around its center of mass.
        let nonzero: Vec<usize> = taps
            .iter()
            .enumerate()
            .filter(|(_, v)| v.abs() > 1e-6)
            .map(|(k, _)| k)
            .collect();
        assert!(!nonzero.is_empty());
        let lo = *nonzero.first().unwrap();
        let hi = *nonzero.last().unwrap();
        for off in 0..=(hi - lo) / 2 {
            let a = taps[lo + off];
            let b = taps[hi - off];
            assert!((a - b).abs() < 1e-6, "asymmetry at offset {off}: {a} vs {b}");
        }
    }

    #[test]
    fn test_rejects_bad_block_sizes() {
        let mut filter = HalfBandDecimator::new();
        let mut output = vec![0.0f32; 16];
        assert_eq!(
            filter.process(&[1.0, 0.0], &mut output),
            Err(FilterError::UnalignedInput(2))
        );
        assert_eq!(
            filter.process(&[0.0; 3], &mut output),
            Err(FilterError::UnalignedInput(3))
        );
        let input = [0.0f32; 64];
        let mut small = [0.0f32; 8];
        assert_eq!(
            filter.process(&input, &mut small),
            Err(FilterError::OutputTooSmall { needed: 32, got: 8 })
        );
    }

    #[test]
    fn test_reset_clears_history() {
        let mut filter = HalfBandDecimator::new();
        let input = vec![1.0f32; 128];
        let mut output = vec![0.0f32; 64];
        filter.process(&input, &mut output).unwrap();
        filter.reset();
        let silence = vec![0.0f32; 128];
        let peak = filter.process(&silence, &mut output).unwrap();
        assert_eq!(peak, 0.0);
        assert!(output.iter().all(|v| *v == 0.0));
    }
}
