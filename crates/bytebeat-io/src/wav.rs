//! WAV file export.

use crate::Result;
use crate::offline::OfflineBuffer;
use crate::sink::PcmSample;
use hound::{SampleFormat, WavReader, WavWriter};
use std::path::Path;

/// WAV audio encoding format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavFormat {
    /// Linear PCM (integer samples).
    Pcm,
    /// IEEE 754 floating-point samples.
    IeeeFloat,
}

/// WAV file metadata read from the header.
#[derive(Debug, Clone)]
pub struct WavInfo {
    /// Number of audio channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bit depth per sample.
    pub bits_per_sample: u16,
    /// Total number of sample frames.
    pub num_frames: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Audio encoding format.
    pub format: WavFormat,
}

/// Reads WAV metadata without loading sample data.
pub fn read_wav_info<P: AsRef<Path>>(path: P) -> Result<WavInfo> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let num_frames = u64::from(reader.duration());
    let duration_secs = num_frames as f64 / f64::from(spec.sample_rate);

    let format = match spec.sample_format {
        SampleFormat::Float => WavFormat::IeeeFloat,
        SampleFormat::Int => WavFormat::Pcm,
    };

    Ok(WavInfo {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        num_frames,
        duration_secs,
        format,
    })
}

/// Writes an offline render as a mono WAV file.
///
/// `u8` buffers become 8-bit unsigned PCM with a 44-byte header; `f32`
/// buffers become 32-bit IEEE float.
pub fn write_wav<S: PcmSample, P: AsRef<Path>>(path: P, buffer: &OfflineBuffer<S>) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: (S::BYTES * 8) as u16,
        sample_format: S::WAV_FORMAT,
    };
    let mut writer = WavWriter::create(path.as_ref(), spec)?;
    for &sample in buffer.samples() {
        sample.write_wav(&mut writer)?;
    }
    writer.finalize()?;
    tracing::debug!(
        path = %path.as_ref().display(),
        samples = buffer.sample_count(),
        sample_rate = buffer.sample_rate(),
        "wrote WAV"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn u8_wav_has_44_byte_header_and_raw_bytes() {
        let buffer = OfflineBuffer::from_samples(8000, vec![0u8, 1, 128, 255]);
        let file = NamedTempFile::new().unwrap();
        write_wav(file.path(), &buffer).unwrap();

        let bytes = std::fs::read(file.path()).unwrap();
        assert_eq!(bytes.len(), 44 + 4);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]), 4);
        assert_eq!(&bytes[44..], &[0, 1, 128, 255]);
    }

    #[test]
    fn info_reports_format() {
        let buffer = OfflineBuffer::from_samples(22050, vec![0.5f32; 22050]);
        let file = NamedTempFile::new().unwrap();
        write_wav(file.path(), &buffer).unwrap();

        let info = read_wav_info(file.path()).unwrap();
        assert_eq!(info.channels, 1);
        assert_eq!(info.sample_rate, 22050);
        assert_eq!(info.bits_per_sample, 32);
        assert_eq!(info.format, WavFormat::IeeeFloat);
        assert_eq!(info.num_frames, 22050);
        assert!((info.duration_secs - 1.0).abs() < 1e-9);
    }
}
