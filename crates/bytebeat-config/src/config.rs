//! Engine configuration file format.

use bytebeat_core::{
    ConfigurationError, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, DEFAULT_TABLE_SIZE,
    MathEnvironment, PrecisionMode, RenderConfig, TimeDomain, Undersample, default_sentinel_path,
};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;
use crate::paths;

/// How the formula file is watched for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadStrategy {
    /// Compare the file's modification time between buffers.
    #[default]
    Mtime,
    /// Reload when a sentinel file appears.
    Sentinel,
    /// Modification-time polling on a worker thread.
    Background,
    /// Never reload.
    Off,
}

impl ReloadStrategy {
    /// All strategies, in declaration order.
    pub const ALL: [ReloadStrategy; 4] = [
        ReloadStrategy::Mtime,
        ReloadStrategy::Sentinel,
        ReloadStrategy::Background,
        ReloadStrategy::Off,
    ];

    /// Name as written in config files and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            ReloadStrategy::Mtime => "mtime",
            ReloadStrategy::Sentinel => "sentinel",
            ReloadStrategy::Background => "background",
            ReloadStrategy::Off => "off",
        }
    }
}

impl fmt::Display for ReloadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReloadStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReloadStrategy::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "unknown reload strategy '{s}' (expected mtime, sentinel, background or off)"
                )
            })
    }
}

/// `[reload]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReloadConfig {
    /// Watch strategy.
    pub strategy: ReloadStrategy,
    /// Samples between checks. Defaults to one buffer.
    pub check_interval: Option<usize>,
    /// Sentinel file for the `sentinel` strategy.
    pub sentinel_path: Option<PathBuf>,
    /// Wall-clock poll period of the `background` strategy, in milliseconds.
    pub period_ms: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            strategy: ReloadStrategy::Mtime,
            check_interval: None,
            sentinel_path: None,
            period_ms: 100,
        }
    }
}

/// Engine settings, as read from `config.toml`.
///
/// Every field is optional in the file.
///
/// # TOML Format
///
/// ```toml
/// sample_rate = 8000
/// buffer_size = 16384
/// undersample = 1
/// fast_math = false
/// table_size = 1024
/// float_output = false
/// continuous_time = false
/// duration_secs = 30.0
///
/// [reload]
/// strategy = "mtime"
/// period_ms = 100
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per render buffer.
    pub buffer_size: usize,
    /// Evaluation decimation factor: 1, 2, 4 or 8.
    pub undersample: u32,
    /// Lookup-table math instead of full precision.
    pub fast_math: bool,
    /// Entries per fast-math trig table.
    pub table_size: usize,
    /// Emit 32-bit float samples instead of 8-bit PCM.
    pub float_output: bool,
    /// Present `t` to the formula in seconds.
    pub continuous_time: bool,
    /// Length of offline renders.
    pub duration_secs: f64,
    /// Hot reload settings.
    pub reload: ReloadConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            undersample: 1,
            fast_math: false,
            table_size: DEFAULT_TABLE_SIZE,
            float_output: false,
            continuous_time: false,
            duration_secs: 30.0,
            reload: ReloadConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Loads `explicit` if given, else the user config file if it exists,
    /// else the defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let user = paths::user_config_file();
        if user.is_file() {
            Self::load(&user)
        } else {
            Ok(Self::default())
        }
    }

    /// Validated renderer settings.
    pub fn to_render_config(&self) -> Result<RenderConfig, ConfigError> {
        let config = RenderConfig {
            sample_rate: self.sample_rate,
            buffer_size: self.buffer_size,
            undersample: Undersample::try_from(self.undersample)?,
            time_domain: if self.continuous_time {
                TimeDomain::Seconds
            } else {
                TimeDomain::Samples
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Precision mode selected by `fast_math`.
    pub fn precision_mode(&self) -> PrecisionMode {
        if self.fast_math {
            PrecisionMode::Fast
        } else {
            PrecisionMode::Precise
        }
    }

    /// Builds the math environment. Fails on a bad table size in fast mode.
    pub fn math_environment(&self) -> Result<MathEnvironment, ConfigError> {
        Ok(MathEnvironment::build(self.precision_mode(), self.table_size)?)
    }

    /// Checks every setting without building anything expensive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_render_config()?;
        if self.fast_math
            && (self.table_size < bytebeat_core::math::MIN_TABLE_SIZE
                || !self.table_size.is_power_of_two())
        {
            return Err(ConfigurationError::InvalidTableSize(self.table_size).into());
        }
        Ok(())
    }

    /// Samples between reload checks.
    pub fn check_interval(&self) -> usize {
        self.reload.check_interval.unwrap_or(self.buffer_size).max(1)
    }

    /// Sentinel file path, defaulting to `<tmp>/bytebeat.reload`.
    pub fn sentinel_path(&self) -> PathBuf {
        self.reload
            .sentinel_path
            .clone()
            .unwrap_or_else(default_sentinel_path)
    }

    /// Samples in an offline render of `duration_secs`.
    pub fn duration_samples(&self) -> usize {
        (self.duration_secs.max(0.0) * f64::from(self.sample_rate)) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(EngineConfig::from_toml("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            sample_rate = 44100
            fast_math = true

            [reload]
            strategy = "sentinel"
            "#,
        )
        .unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert!(config.fast_math);
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.reload.strategy, ReloadStrategy::Sentinel);
        assert_eq!(config.reload.period_ms, 100);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            EngineConfig::from_toml("sampel_rate = 8000"),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn render_config_is_validated() {
        let config = EngineConfig {
            undersample: 3,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.to_render_config(),
            Err(ConfigError::Invalid(ConfigurationError::InvalidUndersample(3)))
        ));

        let config = EngineConfig {
            sample_rate: 11025,
            undersample: 2,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.to_render_config(),
            Err(ConfigError::Invalid(
                ConfigurationError::SampleRateNotDivisible {
                    sample_rate: 11025,
                    factor: 2
                }
            ))
        ));

        let divisible = EngineConfig {
            sample_rate: 44100,
            undersample: 4,
            ..EngineConfig::default()
        };
        assert!(divisible.to_render_config().is_ok());
    }

    #[test]
    fn continuous_time_maps_to_seconds() {
        let config = EngineConfig {
            continuous_time: true,
            ..EngineConfig::default()
        };
        assert_eq!(
            config.to_render_config().unwrap().time_domain,
            TimeDomain::Seconds
        );
    }

    #[test]
    fn table_size_checked_only_in_fast_mode() {
        let config = EngineConfig {
            table_size: 1000,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_ok());
        let fast = EngineConfig {
            fast_math: true,
            ..config
        };
        assert!(fast.validate().is_err());
        assert!(fast.math_environment().is_err());
    }

    #[test]
    fn derived_values() {
        let config = EngineConfig::default();
        assert_eq!(config.check_interval(), DEFAULT_BUFFER_SIZE);
        assert_eq!(config.duration_samples(), 240_000);
        assert_eq!(config.sentinel_path(), default_sentinel_path());
    }

    #[test]
    fn strategy_parses_from_str() {
        assert_eq!("Background".parse::<ReloadStrategy>(), Ok(ReloadStrategy::Background));
        assert!("inotify".parse::<ReloadStrategy>().is_err());
        assert_eq!(ReloadStrategy::Off.to_string(), "off");
    }
}
