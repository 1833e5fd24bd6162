//! abcmidi - compile ABC notation to multi-voice MIDI
//!
//! Subcommands:
//! - `abcmidi compile <input.abc>` - Write a Standard MIDI File
//! - `abcmidi check <input.abc>` - Parse only and report diagnostics
//! - `abcmidi tracks <input.abc>` - Print the generated tracks as JSON
//! - `abcmidi config` - Print the effective configuration

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;
mod config;

use config::CliConfig;

#[derive(Parser)]
#[command(name = "abcmidi")]
#[command(about = "Compile ABC music notation to multi-voice MIDI")]
#[command(version)]
struct Cli {
    /// Config file, loaded after ~/.config/abcmidi/config.toml and ./abcmidi.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (e.g. "debug", "abcmidi=trace"); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an ABC file to a .mid file
    Compile {
        /// ABC source file
        input: PathBuf,

        /// Output path (default: input name with .mid)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Ticks per quarter note
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..=0x7FFF))]
        ticks_per_quarter: Option<u16>,
    },

    /// Parse an ABC file and report diagnostics
    Check {
        /// ABC source file
        input: PathBuf,

        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the generated MIDI tracks as JSON
    Tracks {
        /// ABC source file
        input: PathBuf,
    },

    /// Print the effective configuration and where it came from
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (config, sources) = CliConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    let filter = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.telemetry.log_level);
    init_logging(filter);

    tracing::debug!(
        files = ?sources.files,
        env = ?sources.env_overrides,
        "loaded configuration"
    );

    match cli.command {
        Commands::Compile {
            input,
            output,
            ticks_per_quarter,
        } => commands::compile(&config, &input, output.as_deref(), ticks_per_quarter),
        Commands::Check { input, json } => commands::check(&input, json),
        Commands::Tracks { input } => commands::tracks(&config, &input),
        Commands::Config => commands::show_config(&config, &sources),
    }
}

/// Logs go to stderr so stdout stays clean for JSON output.
fn init_logging(filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
