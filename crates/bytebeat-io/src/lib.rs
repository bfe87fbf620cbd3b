//! Output layer for the bytebeat engine.
//!
//! This crate provides:
//!
//! - **Sinks**: [`OutputSink`] with [`StreamSink`] for raw PCM on any writer
//!   and [`OfflineBuffer`] for whole renders held in memory
//! - **WAV export**: [`write_wav`] for 8-bit unsigned or 32-bit float mono files
//! - **Engines**: [`StreamEngine`] for the endless render/write/reload loop and
//!   [`render_offline`] for fixed-length renders
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bytebeat_core::{Formula, MathEnvironment, RenderConfig, SampleRenderer};
//! use bytebeat_io::{render_offline, write_wav};
//!
//! let formula = Formula::load("beat.js")?;
//! let mut renderer = SampleRenderer::new(
//!     Some(formula),
//!     MathEnvironment::default(),
//!     RenderConfig::default(),
//! );
//!
//! // 30 seconds at 8 kHz, 8-bit
//! let (buffer, summary) = render_offline::<u8>(&mut renderer, 240_000, |_| {});
//! write_wav("beat.wav", &buffer)?;
//! println!("{} faults", summary.faults);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod engine;
mod offline;
mod sink;
mod wav;

pub use engine::{RunSummary, StreamEngine, render_offline};
pub use offline::{FLUSH_CHUNK_SIZE, OfflineBuffer};
pub use sink::{OutputSink, PcmSample, StreamSink};
pub use wav::{WavFormat, WavInfo, read_wav_info, write_wav};

/// Error types for output operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV file write error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the consumer closed the output pipe.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe)
    }
}

/// Convenience result type for output operations.
pub type Result<T> = std::result::Result<T, Error>;
