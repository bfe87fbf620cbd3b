//! Output sinks.

use crate::Result;
use bytebeat_core::Sample;
use hound::{SampleFormat, WavWriter};
use std::io::{Seek, Write};

/// A sample type that can be serialized as raw PCM and WAV.
pub trait PcmSample: Sample {
    /// Bytes per sample in raw little-endian output.
    const BYTES: usize;

    /// WAV encoding for this representation.
    const WAV_FORMAT: SampleFormat;

    /// Appends the little-endian encoding of `samples` to `out`.
    fn encode_le(samples: &[Self], out: &mut Vec<u8>);

    /// Writes one sample through a WAV writer.
    fn write_wav<W: Write + Seek>(self, writer: &mut WavWriter<W>) -> hound::Result<()>;
}

impl PcmSample for u8 {
    const BYTES: usize = 1;
    const WAV_FORMAT: SampleFormat = SampleFormat::Int;

    fn encode_le(samples: &[Self], out: &mut Vec<u8>) {
        out.extend_from_slice(samples);
    }

    fn write_wav<W: Write + Seek>(self, writer: &mut WavWriter<W>) -> hound::Result<()> {
        // 8-bit WAV is unsigned on disk; hound takes it as signed and re-biases.
        writer.write_sample((self ^ 0x80) as i8)
    }
}

impl PcmSample for f32 {
    const BYTES: usize = 4;
    const WAV_FORMAT: SampleFormat = SampleFormat::Float;

    fn encode_le(samples: &[Self], out: &mut Vec<u8>) {
        out.reserve(samples.len() * Self::BYTES);
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
    }

    fn write_wav<W: Write + Seek>(self, writer: &mut WavWriter<W>) -> hound::Result<()> {
        writer.write_sample(self)
    }
}

/// Destination for rendered buffers.
pub trait OutputSink<S: Sample> {
    /// Appends samples. Called once per rendered buffer.
    fn write(&mut self, samples: &[S]) -> Result<()>;

    /// Flushes anything buffered downstream.
    fn flush(&mut self) -> Result<()>;

    /// Total samples accepted so far.
    fn samples_written(&self) -> u64;
}

impl<S: Sample, T: OutputSink<S> + ?Sized> OutputSink<S> for &mut T {
    fn write(&mut self, samples: &[S]) -> Result<()> {
        (**self).write(samples)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn samples_written(&self) -> u64 {
        (**self).samples_written()
    }
}

/// Headerless PCM written to any [`Write`], such as stdout.
#[derive(Debug)]
pub struct StreamSink<W: Write> {
    writer: W,
    scratch: Vec<u8>,
    written: u64,
}

impl<W: Write> StreamSink<W> {
    /// Wraps a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            scratch: Vec::new(),
            written: 0,
        }
    }

    /// Borrow the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Unwraps the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<S: PcmSample, W: Write> OutputSink<S> for StreamSink<W> {
    fn write(&mut self, samples: &[S]) -> Result<()> {
        self.scratch.clear();
        S::encode_le(samples, &mut self.scratch);
        self.writer.write_all(&self.scratch)?;
        self.written += samples.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn samples_written(&self) -> u64 {
        self.written
    }
}
