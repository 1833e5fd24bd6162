//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use abcmidi::{Feedback, FeedbackLevel};
use anyhow::{Context, Result};

use crate::config::{CliConfig, ConfigSources};

pub fn compile(
    config: &CliConfig,
    input: &Path,
    output: Option<&Path>,
    ticks_per_quarter: Option<u16>,
) -> Result<ExitCode> {
    let mut params = config.midi_params();
    if let Some(ticks) = ticks_per_quarter {
        params.ticks_per_quarter = ticks;
    }

    let compiled = abcmidi::compile_file(input, &params)
        .with_context(|| format!("Failed to compile {}", input.display()))?;
    print_feedback(&compiled.feedback);

    if !compiled.is_playable() {
        tracing::warn!(input = %input.display(), "tune has no notes; writing an empty file");
    }

    let out_path = match output {
        Some(path) => path.to_path_buf(),
        None => default_output_path(input, config.output.directory.as_deref()),
    };
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }

    compiled
        .export(&out_path)
        .with_context(|| format!("Failed to write {}", out_path.display()))?;

    println!(
        "Wrote {} ({} tracks, {} ticks/quarter)",
        out_path.display(),
        compiled.tracks.len(),
        params.ticks_per_quarter
    );
    Ok(ExitCode::SUCCESS)
}

pub fn check(input: &Path, json: bool) -> Result<ExitCode> {
    let result = abcmidi::parse_file(input)
        .with_context(|| format!("Failed to check {}", input.display()))?;

    if json {
        let text = serde_json::to_string_pretty(&result.feedback)
            .context("Failed to serialize diagnostics")?;
        println!("{}", text);
    } else {
        print_feedback(&result.feedback);
        println!(
            "{}: {} errors, {} warnings, {} voices, {} features",
            input.display(),
            result.errors().count(),
            result.warnings().count(),
            result.value.voices.len(),
            result.value.features.len()
        );
        for voice in result.value.voices.values() {
            println!(
                "  V:{} {} ({})",
                voice.id,
                voice.name,
                abcmidi::instruments::name(voice.instrument)
            );
        }
    }

    Ok(if result.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

pub fn tracks(config: &CliConfig, input: &Path) -> Result<ExitCode> {
    let compiled = abcmidi::compile_file(input, &config.midi_params())
        .with_context(|| format!("Failed to compile {}", input.display()))?;
    print_feedback(&compiled.feedback);

    let text = serde_json::to_string_pretty(&compiled.tracks).context("Failed to serialize tracks")?;
    println!("{}", text);
    Ok(ExitCode::SUCCESS)
}

pub fn show_config(config: &CliConfig, sources: &ConfigSources) -> Result<ExitCode> {
    for file in &sources.files {
        println!("# loaded {}", file.display());
    }
    for var in &sources.env_overrides {
        println!("# overridden by ${}", var);
    }
    print!("{}", config.to_toml());
    Ok(ExitCode::SUCCESS)
}

fn print_feedback(feedback: &[Feedback]) {
    for entry in feedback.iter().filter(|f| f.level != FeedbackLevel::Info) {
        eprintln!("{}", entry);
    }
}

/// `<stem>.mid` in the output directory, or beside the input.
fn default_output_path(input: &Path, directory: Option<&Path>) -> PathBuf {
    let with_ext = input.with_extension("mid");
    match (directory, with_ext.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => with_ext,
    }
}
