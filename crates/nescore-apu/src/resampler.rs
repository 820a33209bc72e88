//! Output filter chain matching the NES's analog audio path.
//!
//! Real NES hardware runs its audio output through three single-pole
//! filters before it ever reaches a speaker: two high-pass stages (removing
//! DC offset and shaping the low end) and one low-pass stage (anti-aliasing).
//! [`FilterChain`] reproduces that, so emulated audio doesn't carry a raw DC
//! bias and ringing a real console wouldn't have.

use core::f32::consts::PI;

const HIGHPASS_1_HZ: f32 = 90.0;
const HIGHPASS_2_HZ: f32 = 440.0;
const LOWPASS_HZ: f32 = 14_000.0;

/// A single-pole IIR filter: `y[n] = b0*x[n] + b1*x[n-1] - a1*y[n-1]`.
#[derive(Debug, Clone, Copy)]
struct FirstOrderFilter {
    b0: f32,
    b1: f32,
    a1: f32,
    prev_x: f32,
    prev_y: f32,
}

impl FirstOrderFilter {
    fn low_pass(sample_rate: f32, cutoff_hz: f32) -> Self {
        let c = sample_rate / (PI * cutoff_hz);
        let a0i = 1.0 / (1.0 + c);
        Self {
            b0: a0i,
            b1: a0i,
            a1: (1.0 - c) * a0i,
            prev_x: 0.0,
            prev_y: 0.0,
        }
    }

    fn high_pass(sample_rate: f32, cutoff_hz: f32) -> Self {
        let c = sample_rate / (PI * cutoff_hz);
        let a0i = 1.0 / (1.0 + c);
        Self {
            b0: c * a0i,
            b1: -c * a0i,
            a1: (1.0 - c) * a0i,
            prev_x: 0.0,
            prev_y: 0.0,
        }
    }

    fn step(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.b1 * self.prev_x - self.a1 * self.prev_y;
        self.prev_x = x;
        self.prev_y = y;
        y
    }

    fn reset(&mut self) {
        self.prev_x = 0.0;
        self.prev_y = 0.0;
    }
}

/// The NES's 90 Hz -> 440 Hz -> 14 kHz output filter chain.
///
/// Built for a given output sample rate; samples are fed in one at a time
/// after downsampling from the APU's native per-cycle rate.
#[derive(Debug, Clone, Copy)]
pub struct FilterChain {
    highpass_1: FirstOrderFilter,
    highpass_2: FirstOrderFilter,
    lowpass: FirstOrderFilter,
    sample_rate: u32,
}

impl FilterChain {
    /// Build a filter chain for `sample_rate` (Hz).
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let rate = sample_rate as f32;
        Self {
            highpass_1: FirstOrderFilter::high_pass(rate, HIGHPASS_1_HZ),
            highpass_2: FirstOrderFilter::high_pass(rate, HIGHPASS_2_HZ),
            lowpass: FirstOrderFilter::low_pass(rate, LOWPASS_HZ),
            sample_rate,
        }
    }

    /// Run one sample through all three stages in order.
    pub fn process(&mut self, sample: f32) -> f32 {
        let s = self.highpass_1.step(sample);
        let s = self.highpass_2.step(s);
        self.lowpass.step(s)
    }

    /// Reset all filter state (e.g. on console reset) without rebuilding
    /// the coefficients.
    pub fn reset(&mut self) {
        self.highpass_1.reset();
        self.highpass_2.reset();
        self.lowpass.reset();
    }

    /// The sample rate this chain was built for.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
