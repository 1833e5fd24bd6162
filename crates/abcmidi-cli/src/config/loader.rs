//! Config file discovery, loading, and environment variable overlay.

use super::{CliConfig, ConfigError};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Largest division a format 1 header can express in ticks per quarter
const MAX_TICKS_PER_QUARTER: i64 = 0x7FFF;

/// Config files to load, in load order.
///
/// Discovered files are only returned when they exist. The CLI path is
/// always returned so a typo surfaces as a read error.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("abcmidi/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // Local override (current directory)
    let local = PathBuf::from("abcmidi.toml");
    if local.exists() {
        files.push(local);
    }

    if let Some(path) = cli_path {
        files.push(path.to_path_buf());
    }

    files
}

/// Load a TOML file on top of `config`.
pub fn load_from_file(config: &mut CliConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Apply the keys present in a TOML document, leaving the rest untouched.
pub fn apply_toml(config: &mut CliConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(midi) = table.get("midi").and_then(|v| v.as_table()) {
        if let Some(v) = midi.get("ticks_per_quarter") {
            let ticks = v
                .as_integer()
                .filter(|t| (1..=MAX_TICKS_PER_QUARTER).contains(t))
                .ok_or_else(|| ConfigError::Parse {
                    path: path.to_path_buf(),
                    message: format!(
                        "midi.ticks_per_quarter must be an integer between 1 and {}",
                        MAX_TICKS_PER_QUARTER
                    ),
                })?;
            config.midi.ticks_per_quarter = ticks as u16;
        }
    }

    if let Some(output) = table.get("output").and_then(|v| v.as_table()) {
        if let Some(v) = output.get("directory").and_then(|v| v.as_str()) {
            config.output.directory = Some(expand_path(v));
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    Ok(())
}

/// Apply environment variable overrides to config.
///
/// `lookup` is `std::env::var` in production.
pub fn apply_env_overrides(
    config: &mut CliConfig,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("ABCMIDI_TICKS_PER_QUARTER") {
        match v.parse::<u16>() {
            Ok(ticks) if ticks >= 1 && i64::from(ticks) <= MAX_TICKS_PER_QUARTER => {
                config.midi.ticks_per_quarter = ticks;
                sources
                    .env_overrides
                    .push("ABCMIDI_TICKS_PER_QUARTER".to_string());
            }
            _ => tracing::warn!(value = %v, "ignoring invalid ABCMIDI_TICKS_PER_QUARTER"),
        }
    }
    if let Some(v) = lookup("ABCMIDI_OUTPUT_DIR") {
        config.output.directory = Some(expand_path(&v));
        sources.env_overrides.push("ABCMIDI_OUTPUT_DIR".to_string());
    }

    if let Some(v) = lookup("ABCMIDI_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("ABCMIDI_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        return match directories::BaseDirs::new() {
            Some(dirs) => dirs.home_dir().join(rest),
            None => PathBuf::from(path),
        };
    }

    if let Some(var) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        let (name, rest) = match var.split_once('/') {
            Some((name, rest)) => (name, Some(rest)),
            None => (var, None),
        };
        return match (env::var(name), rest) {
            (Ok(value), Some(rest)) => PathBuf::from(value).join(rest),
            (Ok(value), None) => PathBuf::from(value),
            (Err(_), _) => PathBuf::from(path),
        };
    }

    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_discover_includes_cli_path() {
        let files = discover_config_files_with_override(Some(Path::new("/explicit/abcmidi.toml")));
        assert_eq!(files.last(), Some(&PathBuf::from("/explicit/abcmidi.toml")));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let mut config = CliConfig::default();
        apply_toml(
            &mut config,
            "[midi]\nticks_per_quarter = 960\n",
            Path::new("test.toml"),
        )
        .unwrap();
        assert_eq!(config.midi.ticks_per_quarter, 960);
        // Other values should be defaults
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.output.directory, None);
    }

    #[test]
    fn test_later_file_wins_per_key() {
        let mut config = CliConfig::default();
        apply_toml(
            &mut config,
            "[midi]\nticks_per_quarter = 960\n[telemetry]\nlog_level = \"debug\"\n",
            Path::new("user.toml"),
        )
        .unwrap();
        apply_toml(
            &mut config,
            "[telemetry]\nlog_level = \"warn\"\n",
            Path::new("local.toml"),
        )
        .unwrap();

        assert_eq!(config.midi.ticks_per_quarter, 960);
        assert_eq!(config.telemetry.log_level, "warn");
    }

    #[test]
    fn test_invalid_toml() {
        let mut config = CliConfig::default();
        let err = apply_toml(&mut config, "[midi\n", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_ticks_out_of_range() {
        let mut config = CliConfig::default();
        for bad in ["0", "40000", "\"fast\""] {
            let text = format!("[midi]\nticks_per_quarter = {}\n", bad);
            let err = apply_toml(&mut config, &text, Path::new("bad.toml")).unwrap_err();
            assert!(err.to_string().contains("ticks_per_quarter"), "{}", bad);
        }
        assert_eq!(config.midi.ticks_per_quarter, 480);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = CliConfig::default();
        let mut sources = ConfigSources::default();
        apply_env_overrides(
            &mut config,
            &mut sources,
            env_from(&[
                ("ABCMIDI_TICKS_PER_QUARTER", "192"),
                ("ABCMIDI_OUTPUT_DIR", "/tmp/out"),
                ("ABCMIDI_LOG_LEVEL", "debug"),
            ]),
        );

        assert_eq!(config.midi.ticks_per_quarter, 192);
        assert_eq!(config.output.directory, Some(PathBuf::from("/tmp/out")));
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(sources.env_overrides.len(), 3);
    }

    #[test]
    fn test_rust_log_beats_abcmidi_log_level() {
        let mut config = CliConfig::default();
        let mut sources = ConfigSources::default();
        apply_env_overrides(
            &mut config,
            &mut sources,
            env_from(&[("ABCMIDI_LOG_LEVEL", "debug"), ("RUST_LOG", "trace")]),
        );
        assert_eq!(config.telemetry.log_level, "trace");
    }

    #[test]
    fn test_invalid_env_ticks_ignored() {
        let mut config = CliConfig::default();
        let mut sources = ConfigSources::default();
        apply_env_overrides(
            &mut config,
            &mut sources,
            env_from(&[("ABCMIDI_TICKS_PER_QUARTER", "lots")]),
        );
        assert_eq!(config.midi.ticks_per_quarter, 480);
        assert!(sources.env_overrides.is_empty());
    }
}
