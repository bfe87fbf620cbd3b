//! Shared CLI helpers used across multiple commands.

use bytebeat_config::EngineConfig;
use bytebeat_core::{Formula, LoadError, SampleRenderer};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

/// Engine flags shared by every subcommand. Each one overrides the config file.
#[derive(Args)]
pub struct EngineArgs {
    /// Config file (TOML) [default: user config, if present]
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Samples per render buffer
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Use lookup-table math
    #[arg(long)]
    fast: bool,

    /// Entries per fast-math trig table (power of two)
    #[arg(long)]
    table_size: Option<usize>,

    /// Evaluate once per 1, 2, 4 or 8 samples
    #[arg(long)]
    undersample: Option<u32>,

    /// Emit 32-bit float samples instead of 8-bit PCM
    #[arg(long)]
    float: bool,

    /// Present t to the formula in seconds
    #[arg(long)]
    continuous_time: bool,
}

impl EngineArgs {
    /// Loads the config file and applies the command-line overrides.
    pub fn load_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = EngineConfig::load_or_default(self.config.as_deref())?;

        if let Some(rate) = self.sample_rate {
            config.sample_rate = rate;
        }
        if let Some(size) = self.buffer_size {
            config.buffer_size = size;
        }
        if let Some(size) = self.table_size {
            config.table_size = size;
        }
        if let Some(factor) = self.undersample {
            config.undersample = factor;
        }
        config.fast_math |= self.fast;
        config.float_output |= self.float;
        config.continuous_time |= self.continuous_time;

        config.validate()?;
        Ok(config)
    }
}

/// Longest offline render accepted, in samples. Renders are buffered whole
/// before they are written, and 2^28 float samples already take 1 GiB.
pub const MAX_RENDER_SAMPLES: usize = 1 << 28;

/// Length of an offline render.
#[derive(Args)]
pub struct LengthArgs {
    /// Length in seconds [default: from config]
    #[arg(short, long, conflicts_with = "samples")]
    duration: Option<f64>,

    /// Length in samples
    #[arg(short = 'n', long)]
    samples: Option<usize>,
}

impl LengthArgs {
    /// Total samples to render, at most [`MAX_RENDER_SAMPLES`].
    pub fn total_samples(&self, config: &EngineConfig) -> anyhow::Result<usize> {
        let samples = match self.samples {
            Some(samples) => samples,
            None => {
                let secs = self.duration.unwrap_or(config.duration_secs);
                if !secs.is_finite() || secs < 0.0 {
                    anyhow::bail!(
                        "Invalid duration: {secs} (expected a non-negative number of seconds)"
                    );
                }
                let exact = secs * f64::from(config.sample_rate);
                if exact > MAX_RENDER_SAMPLES as f64 {
                    anyhow::bail!(
                        "Render too long: {secs} s at {} Hz exceeds {MAX_RENDER_SAMPLES} samples",
                        config.sample_rate
                    );
                }
                exact as usize
            }
        };
        if samples > MAX_RENDER_SAMPLES {
            anyhow::bail!("Render too long: {samples} samples exceeds {MAX_RENDER_SAMPLES}");
        }
        Ok(samples)
    }
}

/// Builds a renderer from validated settings.
pub fn build_renderer(
    formula: Option<Formula>,
    config: &EngineConfig,
) -> anyhow::Result<SampleRenderer> {
    let render = config.to_render_config()?;
    let math = config.math_environment()?;
    Ok(SampleRenderer::new(formula, math, render))
}

/// Loads the startup formula for live playback.
///
/// A formula that does not compile is reported and replaced by silence; an
/// unreadable file is fatal.
pub fn load_startup_formula(path: &Path) -> anyhow::Result<Option<Formula>> {
    match Formula::load(path) {
        Ok(formula) => Ok(Some(formula)),
        Err(LoadError::Compile(e)) => {
            tracing::warn!(
                path = %path.display(),
                "formula does not compile, starting silent: {e}"
            );
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Progress bar on stderr for offline renders.
pub fn progress_bar(total: u64) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

/// Rendered audio seconds per wall-clock second.
pub fn realtime_ratio(audio_secs: f64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        audio_secs / elapsed_secs
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn length(duration: Option<f64>, samples: Option<usize>) -> LengthArgs {
        LengthArgs { duration, samples }
    }

    #[test]
    fn length_from_duration_or_samples() {
        let config = EngineConfig::default();
        let rate = config.sample_rate as usize;
        assert_eq!(length(Some(2.0), None).total_samples(&config).unwrap(), 2 * rate);
        assert_eq!(length(None, Some(123)).total_samples(&config).unwrap(), 123);
    }

    #[test]
    fn oversized_render_is_rejected() {
        let config = EngineConfig::default();
        assert!(length(None, Some(MAX_RENDER_SAMPLES)).total_samples(&config).is_ok());
        for args in [
            length(None, Some(MAX_RENDER_SAMPLES + 1)),
            length(None, Some(usize::MAX)),
            length(Some(1e12), None),
            length(Some(f64::MAX), None),
        ] {
            let err = args.total_samples(&config).unwrap_err();
            assert!(err.to_string().starts_with("Render too long"), "{err}");
        }
        assert!(length(Some(f64::INFINITY), None).total_samples(&config).is_err());
        assert!(length(Some(-1.0), None).total_samples(&config).is_err());
    }
}
