//! Configuration for the bytebeat engine.
//!
//! Settings come from a TOML file; anything the file leaves out takes its
//! default. Command-line flags are layered on top by the binary.
//!
//! # Features
//!
//! - **Config file**: [`EngineConfig`] loaded with serde from TOML
//! - **Validation**: [`EngineConfig::to_render_config`] rejects settings the engine cannot run with
//! - **Paths**: platform-specific location of the user config file
//!
//! # Example
//!
//! ```rust,no_run
//! use bytebeat_config::EngineConfig;
//!
//! // Explicit file, else ~/.config/bytebeat/config.toml, else defaults
//! let config = EngineConfig::load_or_default(None).unwrap();
//! let render = config.to_render_config().unwrap();
//! println!("{} Hz, {} samples per buffer", render.sample_rate, render.buffer_size);
//! ```

mod config;
mod error;

/// Platform-specific configuration paths.
pub mod paths;

pub use config::{EngineConfig, ReloadConfig, ReloadStrategy};
pub use error::ConfigError;
pub use paths::{user_config_dir, user_config_file};
