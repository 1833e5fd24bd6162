//! Configuration for the `abcmidi` command.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `~/.config/abcmidi/config.toml` (user, honours `XDG_CONFIG_HOME`)
//! 2. `./abcmidi.toml` (local override)
//! 3. The path given with `--config`
//! 4. Environment variables (`ABCMIDI_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [midi]
//! ticks_per_quarter = 960
//!
//! [output]
//! directory = "~/midi/out"
//!
//! [telemetry]
//! log_level = "abcmidi=debug"
//! ```

pub mod loader;

pub use loader::ConfigSources;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CliConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiConfig {
    /// SMF division; must fit in 15 bits
    pub ticks_per_quarter: u16,
}

impl Default for MidiConfig {
    fn default() -> Self {
        MidiConfig {
            ticks_per_quarter: 480,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// Where `compile` writes when no `-o` is given; beside the input if unset
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `tracing_subscriber::EnvFilter` directive
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            log_level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load configuration and report which sources contributed.
    ///
    /// An explicit `config_path` must exist; discovered files are optional.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = CliConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::load_from_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources, |key| std::env::var(key).ok());

        Ok((config, sources))
    }

    pub fn midi_params(&self) -> abcmidi::MidiParams {
        abcmidi::MidiParams {
            ticks_per_quarter: self.midi.ticks_per_quarter,
        }
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# abcmidi configuration\n\n");

        output.push_str("[midi]\n");
        output.push_str(&format!(
            "ticks_per_quarter = {}\n",
            self.midi.ticks_per_quarter
        ));

        output.push_str("\n[output]\n");
        if let Some(dir) = &self.output.directory {
            output.push_str(&format!("directory = \"{}\"\n", dir.display()));
        }

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        output
    }
}
