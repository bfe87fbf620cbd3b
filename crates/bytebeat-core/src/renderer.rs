//! Buffered sample renderer with per-sample fault containment.
//!
//! The renderer fills caller-owned buffers one at a time. A formula that
//! fails for some `t` never stops the stream: the failing sample becomes
//! silence and the renderer drops into [`RenderMode::Recovering`] for one
//! buffer before trying [`RenderMode::Normal`] again.
//!
//! ```
//! use bytebeat_core::{Formula, MathEnvironment, RenderConfig, SampleRenderer};
//!
//! let formula = Formula::compile("t & 255").unwrap();
//! let mut renderer = SampleRenderer::new(
//!     Some(formula),
//!     MathEnvironment::default(),
//!     RenderConfig::default(),
//! );
//! let mut buf = [0u8; 10];
//! renderer.render(&mut buf);
//! assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
//! ```

use crate::error::{ConfigurationError, EvalError};
use crate::formula::{Formula, Variables, to_int32};
use crate::math::MathEnvironment;

/// Default sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 8000;

/// Default render buffer length in samples.
pub const DEFAULT_BUFFER_SIZE: usize = 16384;

/// An output sample representation.
pub trait Sample: Copy + Send + std::fmt::Debug + 'static {
    /// Zero-signal level.
    const SILENCE: Self;

    /// Converts a finite formula result.
    fn from_value(value: f64) -> Self;

    /// Converts a formula result, rejecting NaN and infinities.
    #[inline]
    fn quantize(value: f64) -> Result<Self, EvalError> {
        if value.is_finite() {
            Ok(Self::from_value(value))
        } else {
            Err(EvalError::NonFinite(value))
        }
    }
}

/// Unsigned 8-bit PCM: low 8 bits of the ToInt32 conversion.
impl Sample for u8 {
    const SILENCE: Self = 128;

    #[inline]
    fn from_value(value: f64) -> Self {
        (to_int32(value) & 0xFF) as u8
    }
}

/// Float PCM: the raw result, narrowed.
impl Sample for f32 {
    const SILENCE: Self = 0.0;

    #[inline]
    fn from_value(value: f64) -> Self {
        value as f32
    }

    /// Also rejects finite results beyond `f32::MAX`, which narrow to infinity.
    #[inline]
    fn quantize(value: f64) -> Result<Self, EvalError> {
        let narrowed = Self::from_value(value);
        if narrowed.is_finite() {
            Ok(narrowed)
        } else {
            Err(EvalError::NonFinite(value))
        }
    }
}

/// Evaluation decimation factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Undersample {
    /// Evaluate every sample.
    #[default]
    X1,
    /// Evaluate every 2nd sample.
    X2,
    /// Evaluate every 4th sample.
    X4,
    /// Evaluate every 8th sample.
    X8,
}

impl Undersample {
    /// Number of output samples per evaluation.
    pub fn factor(self) -> u32 {
        match self {
            Undersample::X1 => 1,
            Undersample::X2 => 2,
            Undersample::X4 => 4,
            Undersample::X8 => 8,
        }
    }
}

impl TryFrom<u32> for Undersample {
    type Error = ConfigurationError;

    fn try_from(k: u32) -> Result<Self, Self::Error> {
        match k {
            1 => Ok(Undersample::X1),
            2 => Ok(Undersample::X2),
            4 => Ok(Undersample::X4),
            8 => Ok(Undersample::X8),
            other => Err(ConfigurationError::InvalidUndersample(other)),
        }
    }
}

/// What the formula sees as `t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeDomain {
    /// Raw sample index.
    #[default]
    Samples,
    /// Sample index divided by the sample rate.
    Seconds,
}

/// Renderer settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per buffer.
    pub buffer_size: usize,
    /// Evaluation decimation.
    pub undersample: Undersample,
    /// Input convention for `t`.
    pub time_domain: TimeDomain,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            undersample: Undersample::X1,
            time_domain: TimeDomain::Samples,
        }
    }
}

impl RenderConfig {
    /// Checks the settings against each other.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let factor = self.undersample.factor();
        if self.sample_rate == 0 {
            return Err(ConfigurationError::InvalidSampleRate);
        }
        if self.sample_rate % factor != 0 {
            return Err(ConfigurationError::SampleRateNotDivisible {
                sample_rate: self.sample_rate,
                factor,
            });
        }
        if self.buffer_size == 0 || self.buffer_size % factor as usize != 0 {
            return Err(ConfigurationError::InvalidBufferSize {
                size: self.buffer_size,
                factor,
            });
        }
        Ok(())
    }

    /// Samples covering `secs` seconds, rounded down.
    pub fn samples_for(&self, secs: f64) -> usize {
        (secs.max(0.0) * f64::from(self.sample_rate)) as usize
    }
}

/// Fault-handling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// No recent faults.
    #[default]
    Normal,
    /// The previous buffer faulted; this one is rendered with isolation.
    Recovering,
}

/// Mutable state carried between buffers.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    t: u64,
    mode: RenderMode,
    last_error: Option<String>,
}

impl RunState {
    /// Index of the next sample to render.
    pub fn t(&self) -> u64 {
        self.t
    }

    /// Current fault-handling mode.
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Message of the most recently logged evaluation error.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

/// Outcome of rendering one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferReport {
    /// `t` of the first sample in the buffer.
    pub start: u64,
    /// Samples written.
    pub samples: usize,
    /// Evaluations that failed and were replaced with silence.
    pub faults: usize,
    /// Mode the buffer started in.
    pub mode: RenderMode,
}

/// Turns a formula into a stream of samples.
#[derive(Debug)]
pub struct SampleRenderer {
    formula: Option<Formula>,
    vars: Variables,
    math: MathEnvironment,
    config: RenderConfig,
    state: RunState,
}

impl SampleRenderer {
    /// Creates a renderer. With no formula it renders silence until one is swapped in.
    pub fn new(formula: Option<Formula>, math: MathEnvironment, config: RenderConfig) -> Self {
        let vars = formula.as_ref().map(Formula::variables).unwrap_or_default();
        Self {
            formula,
            vars,
            math,
            config,
            state: RunState::default(),
        }
    }

    /// Replaces the active formula. Variables and error deduplication reset.
    pub fn swap_formula(&mut self, formula: Formula) {
        tracing::info!(length = formula.len(), t = self.state.t, "formula activated");
        self.vars = formula.variables();
        self.formula = Some(formula);
        self.state.last_error = None;
    }

    /// The active formula, if any.
    pub fn formula(&self) -> Option<&Formula> {
        self.formula.as_ref()
    }

    /// Whether a formula is active.
    pub fn has_formula(&self) -> bool {
        self.formula.is_some()
    }

    /// Index of the next sample to render.
    pub fn t(&self) -> u64 {
        self.state.t
    }

    /// Current fault-handling mode.
    pub fn mode(&self) -> RenderMode {
        self.state.mode
    }

    /// Carried run state.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Renderer settings.
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// The math capabilities in use.
    pub fn math(&self) -> &MathEnvironment {
        &self.math
    }

    /// Current user variable values.
    pub fn variables(&self) -> &Variables {
        &self.vars
    }

    /// Fills `buf` with the next `buf.len()` samples and advances `t`.
    pub fn render<S: Sample>(&mut self, buf: &mut [S]) -> BufferReport {
        let start = self.state.t;
        let mode = self.state.mode;

        if self.formula.is_none() {
            buf.fill(S::SILENCE);
            self.state.t += buf.len() as u64;
            return BufferReport {
                start,
                samples: buf.len(),
                faults: 0,
                mode,
            };
        }

        let faults = match mode {
            RenderMode::Normal => {
                let done = self.fill_until_fault(buf);
                if done == buf.len() {
                    0
                } else {
                    // The block at `done` faulted and is already silent.
                    let block = self.block_len(buf.len() - done);
                    1 + self.fill_isolated(&mut buf[done + block..])
                }
            }
            RenderMode::Recovering => self.fill_isolated(buf),
        };

        self.state.mode = match mode {
            RenderMode::Recovering => RenderMode::Normal,
            RenderMode::Normal if faults > 0 => RenderMode::Recovering,
            RenderMode::Normal => RenderMode::Normal,
        };
        if faults > 0 {
            tracing::debug!(start, faults, next = ?self.state.mode, "buffer rendered with faults");
        }

        BufferReport {
            start,
            samples: buf.len(),
            faults,
            mode,
        }
    }

    fn block_len(&self, remaining: usize) -> usize {
        (self.config.undersample.factor() as usize).min(remaining)
    }

    /// Renders blocks until one fails. Returns the offset of the failing
    /// block (silenced, `t` advanced past it) or `buf.len()`.
    fn fill_until_fault<S: Sample>(&mut self, buf: &mut [S]) -> usize {
        let mut pos = 0;
        while pos < buf.len() {
            let block = self.block_len(buf.len() - pos);
            match self.evaluate::<S>() {
                Ok(sample) => buf[pos..pos + block].fill(sample),
                Err(err) => {
                    buf[pos..pos + block].fill(S::SILENCE);
                    self.report(&err);
                    self.state.t += block as u64;
                    return pos;
                }
            }
            self.state.t += block as u64;
            pos += block;
        }
        pos
    }

    /// Renders every block, silencing failures individually. Returns the fault count.
    fn fill_isolated<S: Sample>(&mut self, buf: &mut [S]) -> usize {
        let mut faults = 0;
        let mut pos = 0;
        while pos < buf.len() {
            let block = self.block_len(buf.len() - pos);
            let sample = self.evaluate::<S>().unwrap_or_else(|err| {
                faults += 1;
                self.report(&err);
                S::SILENCE
            });
            buf[pos..pos + block].fill(sample);
            self.state.t += block as u64;
            pos += block;
        }
        faults
    }

    #[inline]
    fn evaluate<S: Sample>(&mut self) -> Result<S, EvalError> {
        let Some(formula) = &self.formula else {
            return Ok(S::SILENCE);
        };
        let t = match self.config.time_domain {
            TimeDomain::Samples => self.state.t as f64,
            TimeDomain::Seconds => self.state.t as f64 / f64::from(self.config.sample_rate),
        };
        let value = formula.evaluate(t, &mut self.math, &mut self.vars)?;
        S::quantize(value)
    }

    /// Logs an evaluation error unless it repeats the previous message.
    fn report(&mut self, err: &EvalError) {
        let message = err.to_string();
        if self.state.last_error.as_deref() != Some(message.as_str()) {
            tracing::warn!(t = self.state.t, "formula evaluation failed: {message}");
            self.state.last_error = Some(message);
        }
    }
}
