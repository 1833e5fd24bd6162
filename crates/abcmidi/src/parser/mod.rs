//! ABC notation parser.
//!
//! The parser is generous: it never stops on bad input. Every problem is
//! collected as feedback and parsing carries on with the next element or line.

mod body;
pub mod chord;
mod header;
pub mod key;
pub mod note;
pub mod voice;

use std::path::Path;

use crate::error::{Error, Result};
use crate::feedback::{FeedbackCollector, ParseResult};
use crate::instruments;
use crate::model::AbcTune;

pub use key::parse_key_signature;
pub use voice::{apply_voice_attributes, Timeline, VoiceManager};

use header::HeaderState;

/// Everything one parse run mutates
#[derive(Debug)]
pub(crate) struct ParseContext {
    pub tune: AbcTune,
    pub voices: VoiceManager,
    pub timeline: Timeline,
    pub collector: FeedbackCollector,
}

impl ParseContext {
    pub fn new() -> Self {
        ParseContext {
            tune: AbcTune::default(),
            voices: VoiceManager::new(),
            timeline: Timeline::new(),
            collector: FeedbackCollector::new(),
        }
    }
}

/// Parse ABC notation into a tune.
pub fn parse(input: &str) -> ParseResult<AbcTune> {
    let mut ctx = ParseContext::new();
    let mut header = HeaderState::default();

    for (idx, raw) in input.lines().enumerate() {
        ctx.collector.set_line(idx + 1);

        if let Some(directive) = raw.trim_start().strip_prefix("%%") {
            parse_directive(&mut ctx, directive);
            continue;
        }

        let line = strip_comment(raw);
        if line.trim().is_empty() {
            continue;
        }

        let field = split_field(line.trim());

        if !header.is_finished() {
            if let Some((letter, value)) = field {
                header::parse_header_field(&mut ctx, &mut header, letter, value);
                continue;
            }
            ctx.collector.warning_with_suggestion(
                "Music found before K: field",
                "Add a K: field before the music (e.g., K:C for C major)",
            );
            header::end_header(&mut ctx, &mut header);
        }

        match field {
            Some((letter, value)) if body::BODY_FIELDS.contains(&letter) => {
                body::parse_body_field(&mut ctx, letter, value)
            }
            _ => body::parse_body_line(&mut ctx, line),
        }
    }

    if !header.is_finished() {
        ctx.collector.warning_with_suggestion(
            "Missing K: field, assuming K:C",
            "Add a K: field to specify the key signature",
        );
        header::end_header(&mut ctx, &mut header);
    }

    tracing::debug!(
        voices = ctx.tune.voices.len(),
        features = ctx.tune.features.len(),
        "parsed tune"
    );

    ParseResult::new(ctx.tune, ctx.collector.into_feedback())
}

/// Read and parse an ABC file.
pub fn parse_file(path: impl AsRef<Path>) -> Result<ParseResult<AbcTune>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| Error::FileOpen {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse(&text))
}

/// `%%` directives. Only `%%MIDI program` affects the output.
fn parse_directive(ctx: &mut ParseContext, directive: &str) {
    let mut words = directive.split_whitespace();
    if words.next() != Some("MIDI") {
        return;
    }

    match words.next() {
        Some("program") => {
            let args: Vec<&str> = words.collect();
            // `%%MIDI program [channel] n`
            let value = match args.as_slice() {
                [channel, program] if channel.parse::<u8>().is_ok() => program.to_string(),
                _ => args.join(" "),
            };

            let Some(program) = instruments::lookup(&value) else {
                ctx.collector.warning_with_suggestion(
                    format!("Unknown instrument '{}' in %%MIDI program", value),
                    "Use a General MIDI program number (0-127) or name",
                );
                return;
            };

            let target = ctx.voices.directive_target();
            match target.and_then(|id| ctx.tune.voices.get_mut(&id)) {
                Some(voice) => voice.instrument = program,
                None => ctx.tune.default_instrument = program,
            }
        }
        other => ctx.collector.info(format!(
            "Ignoring %%MIDI {} directive",
            other.unwrap_or_default()
        )),
    }
}

/// Drop a `%` comment, leaving escaped `\%` alone
fn strip_comment(line: &str) -> &str {
    let mut prev = None;
    for (idx, c) in line.char_indices() {
        if c == '%' && prev != Some('\\') {
            return &line[..idx];
        }
        prev = Some(c);
    }
    line
}

/// Split a `Letter:value` field line
fn split_field(line: &str) -> Option<(char, &str)> {
    let mut chars = line.chars();
    let field = chars.next().filter(|c| c.is_ascii_alphabetic())?;
    if chars.next() != Some(':') {
        return None;
    }
    Some((field, chars.as_str().trim()))
}
