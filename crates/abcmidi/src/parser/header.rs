//! Header field parsing for ABC notation.
//!
//! The header is a run of `Letter:value` lines ending with `K:`. Each line
//! updates the tune-level defaults or defines a voice.

use crate::feedback::FeedbackCollector;
use crate::fraction::Fraction;
use crate::model::{InfoField, Tempo, TimeSignature};

use super::key::parse_key_signature;
use super::ParseContext;

/// What the header has seen so far
#[derive(Debug, Default)]
pub(crate) struct HeaderState {
    found_reference: bool,
    found_meter: bool,
    found_unit_length: bool,
    finished: bool,
}

impl HeaderState {
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Handle one header field. Returns `true` once `K:` has closed the header.
pub(crate) fn parse_header_field(
    ctx: &mut ParseContext,
    state: &mut HeaderState,
    field: char,
    value: &str,
) -> bool {
    let collector = &mut ctx.collector;
    let tune = &mut ctx.tune;

    match field {
        'X' => {
            state.found_reference = true;
            tune.header.reference = value.parse().unwrap_or_else(|_| {
                collector.warning(format!("Invalid X: value '{}', using 1", value));
                1
            });
        }
        'T' => {
            if tune.header.title.is_empty() {
                tune.header.title = value.to_string();
            } else {
                tune.header.titles.push(value.to_string());
            }
        }
        'C' => tune.header.composer = Some(value.to_string()),
        'O' => tune.header.origin = Some(value.to_string()),
        'P' => tune.header.parts = Some(value.to_string()),
        'L' => match parse_unit_length(value) {
            Some(length) => {
                state.found_unit_length = true;
                tune.default_unit_length = length;
            }
            None => collector.error(format!("Invalid unit length '{}'", value)),
        },
        'M' => {
            state.found_meter = true;
            tune.default_time_signature = parse_meter(value, collector);
        }
        'Q' => tune.default_tempo = parse_tempo(value, collector),
        'V' => {
            ctx.voices.define_voice(value, tune, collector);
        }
        'K' => {
            tune.default_key = parse_key_signature(value, collector);
            end_header(ctx, state);
            return true;
        }
        _ => {
            collector.warning(format!("Unsupported header field '{}:', keeping it as text", field));
            tune.header.other_fields.push(InfoField {
                field_type: field,
                value: value.to_string(),
            });
        }
    }

    false
}

/// Close the header: infer the unit length and sync header voices to the
/// final tune defaults.
pub(crate) fn end_header(ctx: &mut ParseContext, state: &mut HeaderState) {
    if state.finished {
        return;
    }
    state.finished = true;

    let tune = &mut ctx.tune;
    let collector = &mut ctx.collector;

    if !state.found_reference {
        collector.warning_with_suggestion(
            "Missing X: field, assuming X:1",
            "Add X:1 at the start of the tune",
        );
    }

    if !state.found_unit_length && state.found_meter {
        let inferred = infer_unit_length(&tune.default_time_signature);
        collector.info(format!("No L: field, inferring L:{}", inferred));
        tune.default_unit_length = inferred;
    }

    let key = tune.default_key.clone();
    let time_signature = tune.default_time_signature;
    let unit_length = tune.default_unit_length;
    for voice in tune.voices.values_mut() {
        voice.key = key.clone();
        voice.time_signature = time_signature;
        voice.unit_length = unit_length;
    }
}

/// Parse a fraction like "4/4" or "1/8"
fn parse_fraction(s: &str) -> Option<(i64, i64)> {
    let (num, den) = s.split_once('/')?;
    let num = num.trim().parse().ok()?;
    let den = den.trim().parse().ok()?;
    Some((num, den))
}

/// Parse an L: value. `None` when malformed or not positive.
pub(crate) fn parse_unit_length(value: &str) -> Option<Fraction> {
    let (num, den) = parse_fraction(value.trim())?;
    Fraction::try_new(num, den).filter(Fraction::is_positive)
}

/// Parse an M: value (`4/4`, `C`, `C|`, `none`). Malformed meters are
/// reported as errors and replaced by 4/4.
pub(crate) fn parse_meter(value: &str, collector: &mut FeedbackCollector) -> TimeSignature {
    let trimmed = value.trim();

    match trimmed {
        "C" => TimeSignature::new(4, 4),
        "C|" => TimeSignature::new(2, 2),
        "none" | "free" => {
            collector.info("Free meter, using 4/4 for MIDI output");
            TimeSignature::default()
        }
        _ => {
            let parsed = parse_fraction(trimmed).and_then(|(num, den)| {
                let num = u8::try_from(num).ok().filter(|n| *n > 0)?;
                let den = u8::try_from(den).ok().filter(|d| d.is_power_of_two())?;
                Some(TimeSignature::new(num, den))
            });
            parsed.unwrap_or_else(|| {
                collector.error(format!("Invalid meter '{}', assuming 4/4", trimmed));
                TimeSignature::default()
            })
        }
    }
}

/// Parse a Q: value (`1/4=120`, `120`, `"Allegro" 3/8=80`). Malformed
/// tempos are reported as errors and replaced by 120 bpm.
pub(crate) fn parse_tempo(value: &str, collector: &mut FeedbackCollector) -> Tempo {
    let trimmed = value.trim();

    // Leading text in quotes
    let (text, rest) = match trimmed.strip_prefix('"').and_then(|s| s.split_once('"')) {
        Some((text, rest)) => (Some(text.to_string()), rest.trim()),
        None => (None, trimmed),
    };

    let parsed = if let Some((beat, bpm)) = rest.split_once('=') {
        let note_value = parse_fraction(beat.trim())
            .and_then(|(num, den)| Fraction::try_new(num, den))
            .filter(Fraction::is_positive);
        let bpm = bpm.trim().parse::<u32>().ok().filter(|b| *b > 0);
        note_value.zip(bpm)
    } else if rest.is_empty() && text.is_some() {
        // Text-only tempo marking
        Some((Fraction::new(1, 4), 120))
    } else {
        rest.parse::<u32>()
            .ok()
            .filter(|b| *b > 0)
            .map(|bpm| (Fraction::new(1, 4), bpm))
    };

    let (note_value, bpm) = parsed.unwrap_or_else(|| {
        collector.error(format!("Invalid tempo '{}', assuming 120 BPM", trimmed));
        (Fraction::new(1, 4), 120)
    });

    Tempo {
        note_value,
        bpm,
        text,
    }
}

/// Default unit length for a meter: 1/16 below 3/4, otherwise 1/8
fn infer_unit_length(meter: &TimeSignature) -> Fraction {
    if meter.bar_length() < Fraction::new(3, 4) {
        Fraction::new(1, 16)
    } else {
        Fraction::new(1, 8)
    }
}
