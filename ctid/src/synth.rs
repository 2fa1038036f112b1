/*!
Synthesizes the waveform a sensor produces while transmitting a bitstream.

The output is a differential Manchester signal sampled at a fixed rate, with
optional additive Gaussian noise. It feeds the waveform decoder in tests and
in the `synth` command of the tool.
*/

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{CtidError, Result};
use crate::waveform::CLK_FREQ;

/// Waveform synthesis parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthParams {
    pub sampling_freq_hz: f64,
    pub clock_freq_hz: f64,
    /// Signal level; the line idles at `-amplitude`
    pub amplitude: f64,
    /// Quiet time before and after the transmission
    pub idle_ms: f64,
    /// Standard deviation of the additive noise, 0 for none
    pub noise_rms: f64,
    pub seed: u64,
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            sampling_freq_hz: 9600.0,
            clock_freq_hz: CLK_FREQ,
            amplitude: 1000.0,
            idle_ms: 50.0,
            noise_rms: 0.0,
            seed: 0,
        }
    }
}

/// One sample of the synthesized waveform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp_us: f64,
    pub value: f64,
}

/// Differential Manchester modulator
pub struct Modulator {
    params: SynthParams,
    noise: Option<(StdRng, Normal<f64>)>,
}

impl Modulator {
    pub fn new(params: SynthParams) -> Result<Self> {
        if !(params.sampling_freq_hz > 0.0 && params.clock_freq_hz > 0.0) {
            return Err(CtidError::config(format!(
                "sampling frequency {} Hz and clock {} Hz must be positive",
                params.sampling_freq_hz, params.clock_freq_hz
            )));
        }
        let noise = if params.noise_rms > 0.0 {
            let normal = Normal::new(0.0, params.noise_rms).map_err(|e| {
                CtidError::config(format!("noise level {}: {e}", params.noise_rms))
            })?;
            Some((StdRng::seed_from_u64(params.seed), normal))
        } else {
            None
        };
        Ok(Self { params, noise })
    }

    pub fn params(&self) -> &SynthParams {
        &self.params
    }

    /// Transition times in μs for `bitstream`, the first bit starting at `t0`.
    ///
    /// Every bit begins with a transition, 1-bits add one halfway through and
    /// a final transition closes the last bit.
    pub fn edges(&self, bitstream: &[u8], t0: f64) -> Vec<f64> {
        let period = 1e6 / self.params.clock_freq_hz;
        let mut edges = Vec::with_capacity(bitstream.len() * 16 + 1);
        let mut t = t0;
        for &byte in bitstream {
            for shift in (0..8).rev() {
                edges.push(t);
                if (byte >> shift) & 1 == 1 {
                    edges.push(t + period / 2.0);
                }
                t += period;
            }
        }
        edges.push(t);
        edges
    }

    /// Sample the waveform of `bitstream`, idle time included.
    pub fn modulate(&mut self, bitstream: &[u8]) -> Vec<Sample> {
        let sample_period = 1e6 / self.params.sampling_freq_hz;
        let idle_us = self.params.idle_ms * 1e3;
        // keep edges half a sample off the sampling grid
        let t0 = ((idle_us / sample_period).ceil() + 0.5) * sample_period;
        let edges = self.edges(bitstream, t0);
        let end = edges.last().copied().unwrap_or(t0) + idle_us;

        let num_samples = (end / sample_period).ceil() as usize + 1;
        let mut samples = Vec::with_capacity(num_samples);
        let mut next_edge = 0;
        for n in 0..num_samples {
            let ts = n as f64 * sample_period;
            while next_edge < edges.len() && edges[next_edge] <= ts {
                next_edge += 1;
            }
            let level = if next_edge % 2 == 0 {
                -self.params.amplitude
            } else {
                self.params.amplitude
            };
            let noise = match &mut self.noise {
                Some((rng, normal)) => normal.sample(rng),
                None => 0.0,
            };
            samples.push(Sample { timestamp_us: ts, value: level + noise });
        }
        samples
    }
}
