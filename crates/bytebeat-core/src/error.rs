//! Error types for formula compilation, evaluation, and engine setup.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while turning formula text into a [`Formula`](crate::Formula).
///
/// These only occur at (re)load time. The render loop never sees them.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    /// Nothing left after stripping blank and comment-only lines.
    #[error("no code found in formula")]
    EmptyFormula,

    /// Malformed syntax.
    #[error("syntax error at position {pos}: {message}")]
    Syntax {
        /// Byte position in the stripped formula text.
        pos: usize,
        /// Description.
        message: String,
    },

    /// An identifier that is neither a capability, a constant, nor an assigned variable.
    #[error("unknown identifier '{name}' at position {pos}")]
    UnknownIdentifier {
        /// The identifier as written.
        name: String,
        /// Byte position in the stripped formula text.
        pos: usize,
    },

    /// A capability or user function called with the wrong number of arguments.
    #[error("{name}() takes {expected} argument(s), found {found}")]
    ArityMismatch {
        /// Function name.
        name: String,
        /// Arguments the call needed.
        expected: usize,
        /// Arguments supplied.
        found: usize,
    },

    /// Expression nesting exceeds the evaluator's depth limit.
    #[error("expression nested too deeply at position {pos}")]
    TooDeep {
        /// Byte position where the limit was hit.
        pos: usize,
    },
}

impl CompileError {
    pub(crate) fn syntax(pos: usize, message: impl Into<String>) -> Self {
        CompileError::Syntax {
            pos,
            message: message.into(),
        }
    }
}

/// Per-sample evaluation failures.
///
/// The renderer substitutes silence for the failing sample; nothing here is fatal.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    /// The formula produced NaN or an infinity.
    #[error("formula produced a non-finite value ({0})")]
    NonFinite(f64),

    /// A variable was read before any assignment to it ran.
    #[error("variable '{0}' is not defined")]
    Undefined(Arc<str>),
}

/// Errors from reading and compiling a formula file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("failed to read formula '{path}': {source}")]
    Read {
        /// Formula file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file was read but did not compile.
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Invalid engine settings. Only raised at startup, before any audio is produced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Undersample factor outside {1, 2, 4, 8}.
    #[error("undersample factor must be 1, 2, 4 or 8 (got {0})")]
    InvalidUndersample(u32),

    /// Sample rate is not a multiple of the undersample factor.
    #[error("sample rate {sample_rate} is not divisible by undersample factor {factor}")]
    SampleRateNotDivisible {
        /// Configured sample rate.
        sample_rate: u32,
        /// Configured undersample factor.
        factor: u32,
    },

    /// Buffer size is zero or not a multiple of the undersample factor.
    #[error("buffer size {size} must be non-zero and a multiple of {factor}")]
    InvalidBufferSize {
        /// Configured buffer size.
        size: usize,
        /// Configured undersample factor.
        factor: u32,
    },

    /// Fast-math table size is not a power of two of at least 16.
    #[error("trig table size must be a power of two >= 16 (got {0})")]
    InvalidTableSize(usize),

    /// Sample rate of zero.
    #[error("sample rate must be non-zero")]
    InvalidSampleRate,
}
