/*!
Streaming decoder for the CTid carrier waveform.

A sensor answers a CTid request by modulating its output with a differential
Manchester signal: every bit starts with a level transition and a 1-bit has a
second transition in the middle. Transmissions begin with the start symbol
0xFF (16 transitions), followed by the bit-stuffed table.

The [`Decoder`] consumes equidistant samples one at a time. While seeking it
looks for a start symbol at the end of a moving window of samples; once it
finds one it is locked and turns zero crossings into bits until the signal
goes quiet.
*/

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bitstuff::Destuffer;
use crate::error::{CtidError, Result};

/// Zero crossings in a start symbol
pub const START_SYM_ZC_COUNT: usize = 16;

/// Nominal carrier clock frequency in Hz
pub const CLK_FREQ: f64 = 480.0;

/// Carrier clock tolerance in percent
pub const CLK_TOLERANCE_PCT: f64 = 50.0;

/// Largest sample window the decoder allocates
pub const MAX_WINDOW_LEN: usize = 1 << 20;

/// Tunable decoder timing parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderParams {
    /// Nominal carrier clock in Hz
    pub clock_freq_hz: f64,
    /// Accepted deviation from the nominal clock in percent
    pub clock_tolerance_pct: f64,
    /// Bit periods without an edge after which lock is lost
    pub lock_loss_periods: f64,
}

impl Default for DecoderParams {
    fn default() -> Self {
        Self {
            clock_freq_hz: CLK_FREQ,
            clock_tolerance_pct: CLK_TOLERANCE_PCT,
            lock_loss_periods: 4.0,
        }
    }
}

impl DecoderParams {
    /// Shortest accepted bit period in μs
    pub fn min_period(&self) -> f64 {
        let max_freq = (self.clock_freq_hz * (1.0 + self.clock_tolerance_pct / 100.0)).ceil();
        1e6 / max_freq
    }

    /// Longest accepted bit period in μs
    pub fn max_period(&self) -> f64 {
        let min_freq = (self.clock_freq_hz * (1.0 - self.clock_tolerance_pct / 100.0)).floor();
        1e6 / min_freq
    }

    /// Longest possible start symbol in μs
    pub fn max_start_symbol_duration(&self) -> f64 {
        (START_SYM_ZC_COUNT / 2) as f64 * self.max_period()
    }

    /// Check that the parameters describe a usable decoder for samples taken
    /// at `sampling_freq` Hz.
    pub fn validate(&self, sampling_freq: f64) -> Result<()> {
        if !(sampling_freq.is_finite() && sampling_freq > 0.0) {
            return Err(CtidError::config(format!(
                "sampling frequency {sampling_freq} Hz must be positive"
            )));
        }
        if !(self.clock_freq_hz.is_finite() && self.clock_freq_hz > 0.0) {
            return Err(CtidError::config(format!(
                "clock frequency {} Hz must be positive",
                self.clock_freq_hz
            )));
        }
        if !(0.0..100.0).contains(&self.clock_tolerance_pct) {
            return Err(CtidError::config(format!(
                "clock tolerance {}% must be at least 0 and below 100",
                self.clock_tolerance_pct
            )));
        }
        if !(self.lock_loss_periods.is_finite() && self.lock_loss_periods > 0.0) {
            return Err(CtidError::config(format!(
                "lock loss after {} bit periods must be positive",
                self.lock_loss_periods
            )));
        }
        // the slowest accepted clock rounds down to whole hertz
        if !self.max_period().is_finite() {
            return Err(CtidError::config(format!(
                "clock {} Hz with {}% tolerance allows a clock below 1 Hz",
                self.clock_freq_hz, self.clock_tolerance_pct
            )));
        }
        let window = 2.0 * (self.max_start_symbol_duration() * sampling_freq / 1e6).ceil();
        if window > MAX_WINDOW_LEN as f64 {
            return Err(CtidError::config(format!(
                "sampling at {sampling_freq} Hz needs a window of {window} samples, \
                 more than {MAX_WINDOW_LEN}"
            )));
        }
        Ok(())
    }
}

/// Result of feeding one sample to the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeEvent {
    /// A start symbol was detected and the decoder locked
    StartSymbol,
    /// Nothing completed
    Idle,
    /// A byte is available through [`Decoder::get_byte`]
    ByteReady,
}

impl DecodeEvent {
    /// Numeric form: -1, 0 or 1
    pub fn code(self) -> i32 {
        match self {
            Self::StartSymbol => -1,
            Self::Idle => 0,
            Self::ByteReady => 1,
        }
    }
}

fn is_zero_crossing(curr: f64, prev: f64, mean: f64) -> bool {
    (prev < mean) != (curr < mean)
}

/// Circular sample buffer with a running mean.
#[derive(Debug, Clone)]
struct Window {
    params: DecoderParams,
    sample_period: f64,
    avg_len: usize,
    tolerance: f64,
    /// Number of valid samples
    count: usize,
    /// Number of samples in `sum`
    avg_count: usize,
    sum: f64,
    mean: f64,
    /// Index of the next sample to be written
    wr: usize,
    prev_polarity: bool,
    ts: Vec<f64>,
    val: Vec<f64>,
}

impl Window {
    fn new(sampling_freq: f64, params: DecoderParams) -> Self {
        let sample_period = 1e6 / sampling_freq;
        let avg_len = ((params.max_start_symbol_duration() / sample_period).ceil() as usize).max(1);
        let len = 2 * avg_len;
        Self {
            params,
            sample_period,
            avg_len,
            tolerance: 0.0,
            count: 0,
            avg_count: 0,
            sum: 0.0,
            mean: 0.0,
            wr: 0,
            prev_polarity: false,
            ts: vec![0.0; len],
            val: vec![0.0; len],
        }
    }

    fn len(&self) -> usize {
        self.val.len()
    }

    fn prev_index(&self, idx: usize) -> usize {
        (idx + self.len() - 1) % self.len()
    }

    fn enter_sample(&mut self, ts: f64, val: f64) {
        if self.avg_count < self.avg_len {
            self.avg_count += 1;
        } else {
            let idx = (self.wr + self.avg_len) % self.len();
            self.sum -= self.val[idx];
        }
        if self.count < self.len() {
            self.count += 1;
        }
        self.sum += val;
        self.val[self.wr] = val;
        self.ts[self.wr] = ts;
        self.wr = (self.wr + 1) % self.len();
        self.mean = self.sum / self.avg_count as f64;
    }

    /// Whether the newest sample changed polarity relative to the mean
    fn at_zero_crossing(&mut self) -> bool {
        let curr = self.val[self.prev_index(self.wr)];
        let polarity = curr >= self.mean;
        let crossed = polarity != self.prev_polarity;
        self.prev_polarity = polarity;
        crossed
    }

    /// Check whether the newest samples end in a start symbol.
    ///
    /// On success the window adopts the mean of the start symbol and the bit
    /// period in μs is returned.
    fn at_start_symbol(&mut self) -> Option<f64> {
        if self.count < 1 {
            return None;
        }
        let max_duration = self.params.max_start_symbol_duration();
        let max_period = self.params.max_period();

        let mut curr = self.prev_index(self.wr);
        let mut prev_val = self.val[curr];
        self.prev_polarity = prev_val >= self.mean;
        let end_ts = self.ts[curr];
        let start_ts = end_ts - max_duration;
        let mut total = 0.0;
        let mut avg_count = 0usize;

        // find 16 crossings within the longest start symbol
        let mut zc_ts = [0.0f64; START_SYM_ZC_COUNT];
        let mut zc_count = 0;
        let mut i = 1;
        while i < self.count {
            curr = self.prev_index(curr);
            let curr_ts = self.ts[curr];
            let curr_val = self.val[curr];

            if start_ts - curr_ts > max_period {
                return None;
            }
            total += curr_val;
            avg_count += 1;

            if is_zero_crossing(curr_val, prev_val, self.mean) {
                prev_val = curr_val;
                zc_ts[zc_count] = curr_ts;
                zc_count += 1;
                if zc_count >= START_SYM_ZC_COUNT {
                    break;
                }
            }
            i += 1;
        }
        if zc_count < START_SYM_ZC_COUNT {
            return None;
        }
        let first_ts = zc_ts[START_SYM_ZC_COUNT - 1];
        let mean = total / avg_count as f64;

        // the line must be quiet before the first edge
        for _ in (i + 1)..self.count {
            curr = self.prev_index(curr);
            let curr_ts = self.ts[curr];
            let curr_val = self.val[curr];

            if is_zero_crossing(curr_val, prev_val, mean) {
                return None;
            }
            if first_ts - curr_ts >= max_duration {
                break;
            }
            prev_val = curr_val;
        }

        // 16 crossings span 7 full bit times, clock may be asymmetric
        let half_periods = (START_SYM_ZC_COUNT / 2 - 1) as f64;
        let period = (zc_ts[1] - zc_ts[START_SYM_ZC_COUNT - 1]) / half_periods;
        if period < self.params.min_period() || period > max_period {
            return None;
        }

        let tolerance = (period / 4.0).max(1.2 * self.sample_period);

        let mut curr_ts = end_ts;
        for pair in (0..START_SYM_ZC_COUNT).step_by(2) {
            let dt = curr_ts - zc_ts[pair + 1];
            if (dt - period).abs() > tolerance {
                return None;
            }
            curr_ts = zc_ts[pair + 1];
        }

        self.tolerance = tolerance;
        self.sum = total;
        self.avg_count = avg_count;
        self.mean = mean;
        Some(period)
    }
}

/// Turns locked zero crossings into de-stuffed bytes.
#[derive(Debug, Clone, Default)]
struct ByteDecoder {
    edge_count: u32,
    start_ts: Option<f64>,
    destuffer: Destuffer,
    decoded_byte: Option<u8>,
}

impl ByteDecoder {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn timed_out(&self, period: f64, lock_loss_periods: f64, now: f64) -> bool {
        match self.start_ts {
            Some(start) => now - start > lock_loss_periods * period,
            None => false,
        }
    }

    /// Account for an edge at `ts`; returns true when a byte completed.
    fn update(&mut self, period: f64, tolerance: f64, ts: f64) -> bool {
        let Some(start) = self.start_ts else {
            self.start_ts = Some(ts);
            return false;
        };

        if ts - (start + period - tolerance) < 0.0 {
            // mid-bit edge
            self.edge_count += 1;
            return false;
        }

        let bit = self.edge_count & 1 == 1;
        debug!(bit, ts, edge_count = self.edge_count, start, "bit decoded");
        self.edge_count = 0;
        self.start_ts = Some(ts);

        match self.destuffer.push(bit) {
            Some(byte) => {
                self.decoded_byte = Some(byte);
                true
            }
            None => false,
        }
    }
}

/// Sample-by-sample CTid waveform decoder
#[derive(Debug, Clone)]
pub struct Decoder {
    window: Window,
    bytes: ByteDecoder,
    /// Bit period of the current transmission while locked
    period: Option<f64>,
}

impl Decoder {
    /// Create a decoder for samples taken at `sampling_freq` Hz.
    pub fn new(sampling_freq: f64) -> Result<Self> {
        Self::with_params(sampling_freq, DecoderParams::default())
    }

    /// Create a decoder with custom timing, failing on unusable settings.
    pub fn with_params(sampling_freq: f64, params: DecoderParams) -> Result<Self> {
        params.validate(sampling_freq)?;
        Ok(Self {
            window: Window::new(sampling_freq, params),
            bytes: ByteDecoder::default(),
            period: None,
        })
    }

    /// Whether a start symbol has been seen and the transmission is ongoing
    pub fn is_locked(&self) -> bool {
        self.period.is_some()
    }

    /// Bit period of the locked transmission in μs
    pub fn period(&self) -> Option<f64> {
        self.period
    }

    /// Most recently decoded byte
    pub fn get_byte(&self) -> Option<u8> {
        self.bytes.decoded_byte
    }

    /// Feed the sample `value` taken at `timestamp` (μs).
    pub fn add_sample(&mut self, timestamp: f64, value: f64) -> DecodeEvent {
        self.window.enter_sample(timestamp, value);

        let Some(period) = self.period else {
            return match self.window.at_start_symbol() {
                Some(period) => {
                    debug!(period, timestamp, "start symbol");
                    self.period = Some(period);
                    self.bytes.reset();
                    DecodeEvent::StartSymbol
                }
                None => DecodeEvent::Idle,
            };
        };

        let tolerance = self.window.tolerance;
        if self
            .bytes
            .timed_out(period, self.window.params.lock_loss_periods, timestamp)
        {
            // the implied final edge may complete a byte
            let done = self.bytes.update(period, tolerance, timestamp);
            debug!(timestamp, "lock lost");
            self.period = None;
            return if done { DecodeEvent::ByteReady } else { DecodeEvent::Idle };
        }

        if !self.window.at_zero_crossing() {
            return DecodeEvent::Idle;
        }
        debug!(timestamp, mean = self.window.mean, "zero crossing");
        if self.bytes.update(period, tolerance, timestamp) {
            DecodeEvent::ByteReady
        } else {
            DecodeEvent::Idle
        }
    }
}
