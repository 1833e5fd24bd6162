//! Music body parsing for ABC notation.
//!
//! Each body line is scanned once, left to right. Notes, rests and chords
//! advance the current voice's cursor; everything else is stamped at the
//! cursor without moving it.

use winnow::prelude::*;

use crate::fraction::Fraction;
use crate::model::{
    BarLine, Chord, Feature, FeatureKind, Rest, VoiceId, CHORD_VELOCITY, CHORD_VOICE_INSTRUMENT,
    CHORD_VOICE_OFFSET,
};

use super::chord::parse_guitar_chord;
use super::header::{parse_meter, parse_tempo, parse_unit_length};
use super::key::{parse_key_signature, split_key_and_attributes};
use super::note::{parse_length, parse_note, parse_quoted, parse_rest, Length, NoteToken};
use super::voice::apply_voice_attributes;
use super::ParseContext;

/// Field letters recognised on their own line inside the body
pub(crate) const BODY_FIELDS: &[char] = &[
    'V', 'M', 'L', 'Q', 'K', 'T', 'P', 'W', 'w', 'N', 'R', 'I', 'H', 'S', 'O', 'X',
];

/// Bar line spellings, longest first
const BAR_LINES: &[(&str, BarLine)] = &[
    (":|:", BarLine::RepeatBoth),
    ("::", BarLine::RepeatBoth),
    (":|", BarLine::RepeatEnd),
    ("||", BarLine::Double),
    ("|]", BarLine::End),
    ("|:", BarLine::RepeatStart),
    ("[|", BarLine::Start),
    ("|", BarLine::Single),
];

/// Annotation prefixes: `"^text"` and friends are placed text, not chords
const ANNOTATION_PREFIXES: [char; 5] = ['^', '_', '<', '>', '@'];

/// Parse one line of music.
pub(crate) fn parse_body_line(ctx: &mut ParseContext, line: &str) {
    let mut scanner = LineScanner::new(ctx);
    scanner.scan(line);
    scanner.finish();
}

/// Handle a full-line field (`V:2`, `M:3/4`, `T:Part two`) inside the body.
pub(crate) fn parse_body_field(ctx: &mut ParseContext, field: char, value: &str) {
    let mut scanner = LineScanner::new(ctx);
    scanner.apply_field(field, value.trim());
    scanner.finish();
}

/// Cursor state while walking a single line
struct LineScanner<'a> {
    ctx: &'a mut ParseContext,
    /// Resolved on first use so a leading voice switch never creates a stray default voice
    voice: Option<VoiceId>,
    now: Fraction,
    line: usize,
}

impl<'a> LineScanner<'a> {
    fn new(ctx: &'a mut ParseContext) -> Self {
        let line = ctx.collector.line();
        LineScanner {
            ctx,
            voice: None,
            now: Fraction::ZERO,
            line,
        }
    }

    fn finish(self) {
        if let Some(voice) = self.voice {
            self.ctx.timeline.save_current_time(voice, self.now);
        }
    }

    fn voice(&mut self) -> VoiceId {
        match self.voice {
            Some(voice) => voice,
            None => {
                let voice = self.ctx.voices.ensure_current(&mut self.ctx.tune);
                self.now = self.ctx.timeline.restore_voice_time(voice);
                self.voice = Some(voice);
                voice
            }
        }
    }

    /// Unit length and pitch offset of the current voice
    fn voice_settings(&mut self) -> (Fraction, i16) {
        let id = self.voice();
        let tune = &self.ctx.tune;
        tune.voices
            .get(&id)
            .map(|v| (v.unit_length, v.pitch_offset()))
            .unwrap_or((tune.default_unit_length, 0))
    }

    fn push(&mut self, kind: FeatureKind) {
        let voice = self.voice();
        self.push_on(voice, kind);
    }

    fn push_on(&mut self, voice_id: VoiceId, kind: FeatureKind) {
        self.ctx.tune.features.push(Feature {
            voice_id,
            timestamp: self.now,
            line_number: self.line,
            kind,
        });
    }

    fn scan(&mut self, line: &str) {
        let mut input = line;

        while let Some(c) = input.chars().next() {
            self.ctx.collector.set_column(line.len() - input.len() + 1);

            if self.try_parse_element(&mut input) {
                continue;
            }

            input = &input[c.len_utf8()..];
            if !is_ignorable(c) {
                self.ctx
                    .collector
                    .warning(format!("Skipping unknown character '{}'", c));
            }
        }
    }

    /// Try each element kind in priority order. Returns `false` if nothing
    /// matched and the caller should skip a character.
    fn try_parse_element(&mut self, input: &mut &str) -> bool {
        if is_inline_field(input) {
            self.inline_field(input);
            return true;
        }

        if input.starts_with('"') {
            match parse_quoted.parse_next(input) {
                Ok(text) => self.quoted(&text, *input),
                Err(_) => {
                    self.ctx
                        .collector
                        .warning("Unterminated quoted string, skipping rest of line");
                    *input = "";
                }
            }
            return true;
        }

        if let Some((bar, ending)) = try_parse_bar(input) {
            self.push(FeatureKind::BarLine(bar));
            if let Some(n) = ending {
                self.push(FeatureKind::BarLine(BarLine::Ending(n)));
            }
            return true;
        }

        if input.starts_with('[') {
            match try_parse_chord(input) {
                Some((notes, length)) => self.chord(notes, length),
                None => {
                    self.ctx.collector.warning("Malformed chord, skipping '['");
                    *input = &input[1..];
                }
            }
            return true;
        }

        if input.starts_with(['z', 'Z', 'x']) {
            if let Ok((invisible, length)) = parse_rest.parse_next(input) {
                let (unit, _) = self.voice_settings();
                let duration = self.duration(unit, length);
                self.push(FeatureKind::Rest(Rest {
                    duration,
                    invisible,
                }));
                self.advance(duration);
                return true;
            }
        }

        // A failed note parse may have consumed an accidental
        let mut peek = *input;
        if let Ok(token) = parse_note.parse_next(&mut peek) {
            *input = peek;
            let (unit, offset) = self.voice_settings();
            let duration = self.duration(unit, token.length);
            self.push(FeatureKind::Note(token.into_note(duration, offset)));
            self.advance(duration);
            return true;
        }

        match input.chars().next() {
            Some(open @ ('!' | '+')) => {
                self.skip_group(input, open, open, "decoration");
                true
            }
            Some('{') => {
                if self.skip_group(input, '{', '}', "grace note group") {
                    self.ctx.collector.info("Grace notes are not played");
                }
                true
            }
            _ => false,
        }
    }

    /// Skip a delimited group. Unterminated groups swallow the rest of the line.
    fn skip_group(&mut self, input: &mut &str, open: char, close: char, what: &str) -> bool {
        let body = &input[open.len_utf8()..];
        match body.find(close) {
            Some(end) => {
                *input = &body[end + close.len_utf8()..];
                true
            }
            None => {
                self.ctx
                    .collector
                    .warning(format!("Unterminated {}, skipping rest of line", what));
                *input = "";
                false
            }
        }
    }

    fn inline_field(&mut self, input: &mut &str) {
        let body = &input[1..];
        let Some(end) = body.find(']') else {
            self.ctx
                .collector
                .warning("Unterminated inline field, skipping rest of line");
            *input = "";
            return;
        };

        let content = &body[..end];
        *input = &body[end + 1..];

        let mut chars = content.chars();
        if let Some(field) = chars.next() {
            // Skip the ':'
            chars.next();
            self.apply_field(field, chars.as_str().trim());
        }
    }

    /// Apply a field that appears in the body, inline or on its own line.
    fn apply_field(&mut self, field: char, value: &str) {
        match field {
            'V' => self.switch_voice(value),
            'M' => {
                let time_signature = parse_meter(value, &mut self.ctx.collector);
                let id = self.voice();
                if let Some(voice) = self.ctx.tune.voices.get_mut(&id) {
                    voice.time_signature = time_signature;
                }
                self.push(FeatureKind::TimeSignature(time_signature));
            }
            'L' => match parse_unit_length(value) {
                Some(length) => {
                    let id = self.voice();
                    if let Some(voice) = self.ctx.tune.voices.get_mut(&id) {
                        voice.unit_length = length;
                    }
                }
                None => self
                    .ctx
                    .collector
                    .error(format!("Invalid unit length '{}'", value)),
            },
            'Q' => {
                let tempo = parse_tempo(value, &mut self.ctx.collector);
                self.push(FeatureKind::Tempo(tempo));
            }
            'K' => self.key_change(value),
            'T' | 'P' => self.push(FeatureKind::Text(value.to_string())),
            // Lyrics are not rendered
            'W' | 'w' => {}
            _ => self
                .ctx
                .collector
                .info(format!("Ignoring {}: field in tune body", field)),
        }
    }

    fn switch_voice(&mut self, value: &str) {
        if let Some(previous) = self.voice {
            self.ctx.timeline.save_current_time(previous, self.now);
        }

        let id = self
            .ctx
            .voices
            .switch_to_voice(value, &mut self.ctx.tune, &mut self.ctx.collector);
        self.voice = Some(id);
        self.now = self.ctx.timeline.restore_voice_time(id);
        self.push(FeatureKind::VoiceChange { voice_id: id });
    }

    fn key_change(&mut self, value: &str) {
        let (key_part, attributes) = split_key_and_attributes(value);
        let id = self.voice();

        // `K:clef=bass` changes the clef but keeps the key
        let key = if key_part.is_empty() {
            None
        } else {
            Some(parse_key_signature(key_part, &mut self.ctx.collector))
        };

        if let Some(voice) = self.ctx.tune.voices.get_mut(&id) {
            if let Some(key) = &key {
                voice.key = key.clone();
            }
            apply_voice_attributes(voice, attributes, &mut self.ctx.collector);
        }

        if let Some(key) = key {
            self.push(FeatureKind::KeySignature(key));
        }
    }

    /// A quoted string: annotation text or a guitar chord
    fn quoted(&mut self, text: &str, following: &str) {
        if let Some(annotation) = text.strip_prefix(ANNOTATION_PREFIXES) {
            self.push(FeatureKind::Text(annotation.to_string()));
            return;
        }

        let duration = self.following_duration(following);
        match parse_guitar_chord(text, duration) {
            Some(chord) => {
                let chord_voice = self.chord_voice();
                self.push_on(chord_voice, FeatureKind::GuitarChord(chord));
            }
            None => {
                self.ctx.collector.warning(format!(
                    "Unrecognised chord symbol '{}', keeping it as text",
                    text
                ));
                self.push(FeatureKind::Text(text.to_string()));
            }
        }
    }

    /// Duration of the note or chord right after a chord symbol, else one unit
    fn following_duration(&mut self, following: &str) -> Fraction {
        let (unit, _) = self.voice_settings();
        let mut peek = following.trim_start();

        let length = match parse_note.parse_next(&mut peek) {
            Ok(token) => Some(token.length),
            Err(_) => try_parse_chord(&mut peek).map(|(_, length)| length),
        };
        // An unrepresentable length is reported when the note itself is read
        length
            .and_then(|length| unit.checked_mul(length.multiplier))
            .unwrap_or(unit)
    }

    /// `unit * length`, warning when the written length had to be cut short.
    ///
    /// A length that still does not fit falls back to one unit.
    fn duration(&mut self, unit: Fraction, length: Length) -> Fraction {
        if length.clipped {
            self.ctx
                .collector
                .warning("Note length out of range, ignoring the extra dots or slashes");
        }
        match unit.checked_mul(length.multiplier) {
            Some(duration) => duration,
            None => {
                self.ctx
                    .collector
                    .warning("Note length out of range, using the unit length");
                unit
            }
        }
    }

    /// Move the cursor past a note, rest or chord.
    ///
    /// A duration the timeline cannot represent is reported and leaves the
    /// cursor where it is.
    fn advance(&mut self, duration: Fraction) {
        match self.now.checked_add(duration) {
            Some(next) => self.now = next,
            None => self.ctx.collector.warning(format!(
                "Duration {} cannot be added to position {}, not advancing",
                duration, self.now
            )),
        }
    }

    /// Backing voice for the current voice's chord symbols, created on demand.
    ///
    /// When the backing id is out of range or already taken by a voice of
    /// its own, the chords play on the current voice.
    fn chord_voice(&mut self) -> VoiceId {
        let base = self.voice();
        if let Some(id) = self.ctx.voices.backing_voice(base) {
            return id;
        }

        let free = base
            .checked_add(CHORD_VOICE_OFFSET)
            .filter(|id| !self.ctx.tune.voices.contains_key(id));
        let Some(id) = free else {
            self.ctx.collector.warning(format!(
                "No free voice id for the chords of voice {}, playing them on the voice itself",
                base
            ));
            self.ctx.voices.set_backing_voice(base, base);
            return base;
        };

        let base_voice = self.ctx.tune.voices.get(&base);
        let mut voice = base_voice
            .cloned()
            .unwrap_or_else(|| self.ctx.tune.new_voice(base));
        voice.id = id;
        voice.name = format!("{} chords", voice.name);
        voice.short_name = None;
        voice.transpose = 0;
        voice.octave = 0;
        voice.muted = false;
        voice.instrument = CHORD_VOICE_INSTRUMENT;
        voice.velocity = CHORD_VELOCITY;

        self.ctx.voices.register_external_voice(&voice.name, id);
        self.ctx.voices.set_backing_voice(base, id);
        tracing::debug!(voice = id, base, "created chord backing voice");
        self.ctx.tune.voices.insert(id, voice);
        id
    }

    fn chord(&mut self, tokens: Vec<NoteToken>, length: Length) {
        let (unit, offset) = self.voice_settings();
        let duration = self.duration(unit, length);
        let notes = tokens
            .into_iter()
            .map(|token| token.into_note(duration, offset))
            .collect();

        self.push(FeatureKind::Chord(Chord { notes, duration }));
        self.advance(duration);
    }
}

/// `[X:` where X is a field letter
fn is_inline_field(input: &str) -> bool {
    let mut chars = input.chars();
    chars.next() == Some('[')
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.next() == Some(':')
}

/// Try to parse a bar line and an optional ending number (`|1`, `:|2`, `[2`)
fn try_parse_bar(input: &mut &str) -> Option<(BarLine, Option<u8>)> {
    // `[1` on its own is an ending marker
    if let Some(mut rest) = input.strip_prefix('[') {
        if rest.starts_with(|c: char| c.is_ascii_digit()) {
            if let Some(n) = take_ending_number(&mut rest) {
                *input = rest;
                return Some((BarLine::Ending(n), None));
            }
        }
    }

    let (text, bar) = BAR_LINES.iter().find(|(text, _)| input.starts_with(text))?;
    *input = &input[text.len()..];
    let ending = take_ending_number(input);
    Some((*bar, ending))
}

fn take_ending_number(input: &mut &str) -> Option<u8> {
    let digits = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    if digits == 0 {
        return None;
    }
    let n = input[..digits].parse().ok();
    *input = &input[digits..];
    n
}

/// Parse `[CEG]2`: notes between brackets, then one length for the whole chord.
///
/// Leaves the input untouched on failure.
fn try_parse_chord(input: &mut &str) -> Option<(Vec<NoteToken>, Length)> {
    let mut peek: &str = *input;
    peek = peek.strip_prefix('[')?;
    let mut notes = Vec::new();

    loop {
        // Ties and spacing inside the brackets carry no timing
        peek = peek.trim_start_matches([' ', '\t', '-']);
        if let Some(after) = peek.strip_prefix(']') {
            peek = after;
            break;
        }
        notes.push(parse_note.parse_next(&mut peek).ok()?);
    }

    if notes.is_empty() {
        return None;
    }

    let length = parse_length.parse_next(&mut peek).ok()?;
    *input = peek;
    Some((notes, length))
}

/// Characters skipped without comment: spacing, ties, slurs and roll marks
fn is_ignorable(c: char) -> bool {
    c.is_whitespace() || matches!(c, '\\' | '`' | '-' | '(' | ')' | '~')
}
