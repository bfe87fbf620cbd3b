//! Bytebeat Core - formula-driven sample synthesis
//!
//! This crate turns a short user formula into an endless stream of audio
//! samples. It owns the whole render path: compiling formula text, the math
//! capabilities formulas call, the buffered renderer with fault containment,
//! and hot reload of the formula file.
//!
//! # Core Abstractions
//!
//! ## Formulas
//!
//! - [`Formula`] - Compiled, immutable formula (sandboxed interpreter, no host code)
//! - [`strip_comments`] - Removes blank and comment-only lines
//! - [`Variables`] - Per-formula variable storage that persists across samples
//!
//! ## Math
//!
//! - [`MathFunctions`] - Capability set a formula is evaluated against
//! - [`MathEnvironment`] - Precise or fast variant, chosen once at startup
//! - [`FastMath`] - Lookup-table trigonometry, pow2 cache, xorshift32
//!
//! ## Rendering
//!
//! - [`SampleRenderer`] - Buffered loop with the `Normal`/`Recovering` state machine
//! - [`Sample`] - Output representation (`u8` PCM or `f32`)
//! - [`RenderConfig`] - Sample rate, buffer size, undersampling, time domain
//!
//! ## Reload
//!
//! - [`ReloadWatcher`] - Polled between buffers for a replacement formula
//! - [`MtimeWatcher`], [`SentinelWatcher`], [`BackgroundWatcher`], [`NeverReload`]
//!
//! # Example
//!
//! ```rust
//! use bytebeat_core::{Formula, MathEnvironment, RenderConfig, SampleRenderer};
//!
//! let formula = Formula::compile("t * (t >> 5 | t >> 8)").unwrap();
//! let mut renderer = SampleRenderer::new(
//!     Some(formula),
//!     MathEnvironment::default(),
//!     RenderConfig::default(),
//! );
//!
//! let mut buffer = vec![0u8; 4096];
//! let report = renderer.render(&mut buffer);
//! assert_eq!(report.faults, 0);
//! assert_eq!(renderer.t(), 4096);
//! ```
//!
//! # Design Principles
//!
//! - **Never stop the stream**: evaluation faults become silence, compile
//!   failures keep the previous formula
//! - **No allocation per sample**: buffers are caller-owned and reused
//! - **Swaps at buffer boundaries**: a buffer is never split across formulas

pub mod error;
pub mod formula;
pub mod math;
pub mod reload;
pub mod renderer;

pub use error::{CompileError, ConfigurationError, EvalError, LoadError};
pub use formula::{Formula, Variables, strip_comments, to_int32, to_uint32};
pub use math::{
    Builtin, DEFAULT_TABLE_SIZE, FastMath, MathEnvironment, MathFunctions, PreciseMath,
    PrecisionMode, Xorshift32,
};
pub use reload::{
    BackgroundWatcher, MtimeWatcher, NeverReload, PollInterval, ReloadOutcome, ReloadWatcher,
    SentinelWatcher, check_and_reload, default_sentinel_path,
};
pub use renderer::{
    BufferReport, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, RenderConfig, RenderMode, RunState,
    Sample, SampleRenderer, TimeDomain, Undersample,
};
