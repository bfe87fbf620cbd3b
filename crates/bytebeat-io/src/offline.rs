//! In-memory render target.

use crate::Result;
use crate::sink::{OutputSink, PcmSample};
use bytebeat_core::Sample;
use std::io::Write;

/// Samples per write when flushing an offline buffer.
pub const FLUSH_CHUNK_SIZE: usize = 65536;

/// A whole render held in memory, flushed once at the end.
#[derive(Debug, Clone)]
pub struct OfflineBuffer<S> {
    samples: Vec<S>,
    sample_rate: u32,
}

impl<S: Sample> OfflineBuffer<S> {
    /// Creates an empty buffer with room for `capacity` samples.
    pub fn with_capacity(sample_rate: u32, capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            sample_rate,
        }
    }

    /// Creates a buffer of `len` silent samples, ready to be rendered into.
    pub fn silent(sample_rate: u32, len: usize) -> Self {
        Self {
            samples: vec![S::SILENCE; len],
            sample_rate,
        }
    }

    /// Wraps existing samples.
    pub fn from_samples(sample_rate: u32, samples: Vec<S>) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Number of samples held.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// The samples.
    pub fn samples(&self) -> &[S] {
        &self.samples
    }

    /// Mutable access for rendering in place.
    pub fn samples_mut(&mut self) -> &mut [S] {
        &mut self.samples
    }

    /// Takes the samples out.
    pub fn into_samples(self) -> Vec<S> {
        self.samples
    }
}

impl<S: PcmSample> OfflineBuffer<S> {
    /// Writes the samples as raw PCM in [`FLUSH_CHUNK_SIZE`] chunks.
    pub fn flush_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut scratch = Vec::with_capacity(FLUSH_CHUNK_SIZE * S::BYTES);
        for chunk in self.samples.chunks(FLUSH_CHUNK_SIZE) {
            scratch.clear();
            S::encode_le(chunk, &mut scratch);
            writer.write_all(&scratch)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl<S: Sample> OutputSink<S> for OfflineBuffer<S> {
    fn write(&mut self, samples: &[S]) -> Result<()> {
        self.samples.extend_from_slice(samples);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn samples_written(&self) -> u64 {
        self.samples.len() as u64
    }
}
