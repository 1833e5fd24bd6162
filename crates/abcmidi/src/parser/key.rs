//! Key signature parsing for ABC notation.

use crate::feedback::FeedbackCollector;
use crate::model::KeySignature;

/// Major keys and their sharp (+) / flat (-) counts
const MAJOR_KEYS: &[(&str, i8)] = &[
    ("C", 0),
    ("G", 1),
    ("D", 2),
    ("A", 3),
    ("E", 4),
    ("B", 5),
    ("F#", 6),
    ("C#", 7),
    ("F", -1),
    ("Bb", -2),
    ("Eb", -3),
    ("Ab", -4),
    ("Db", -5),
    ("Gb", -6),
    ("Cb", -7),
];

/// Minor keys, keyed by tonic
const MINOR_KEYS: &[(&str, i8)] = &[
    ("A", 0),
    ("E", 1),
    ("B", 2),
    ("F#", 3),
    ("C#", 4),
    ("G#", 5),
    ("D#", 6),
    ("A#", 7),
    ("D", -1),
    ("G", -2),
    ("C", -3),
    ("F", -4),
    ("Bb", -5),
    ("Eb", -6),
    ("Ab", -7),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Major,
    Minor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
}

impl Mode {
    /// Accepts full names and the usual three-letter abbreviations
    fn parse(s: &str) -> Option<Mode> {
        let s = s.to_lowercase();
        if s.is_empty() {
            return Some(Mode::Major);
        }
        if s == "m" {
            return Some(Mode::Minor);
        }
        let prefix: String = s.chars().take(3).collect();
        match prefix.as_str() {
            "maj" | "ion" => Some(Mode::Major),
            "min" | "aeo" => Some(Mode::Minor),
            "dor" => Some(Mode::Dorian),
            "phr" => Some(Mode::Phrygian),
            "lyd" => Some(Mode::Lydian),
            "mix" => Some(Mode::Mixolydian),
            "loc" => Some(Mode::Locrian),
            _ => None,
        }
    }

    /// Shift from the tonic's major-key signature
    fn sharps_offset(&self) -> i8 {
        match self {
            Mode::Major => 0,
            Mode::Minor => -3,
            Mode::Dorian => -2,
            Mode::Phrygian => -4,
            Mode::Lydian => 1,
            Mode::Mixolydian => -1,
            Mode::Locrian => -5,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Mode::Major => "",
            Mode::Minor => "m",
            Mode::Dorian => " dorian",
            Mode::Phrygian => " phrygian",
            Mode::Lydian => " lydian",
            Mode::Mixolydian => " mixolydian",
            Mode::Locrian => " locrian",
        }
    }
}

/// Split a K: value into the key itself and any trailing `attr=value` tokens.
pub fn split_key_and_attributes(value: &str) -> (&str, &str) {
    let trimmed = value.trim();
    let mut end = 0;
    let mut words = 0;
    for (idx, word) in word_spans(trimmed) {
        // Key is at most "root" or "root mode"
        if word.contains('=') || words == 2 {
            break;
        }
        if words == 1 && Mode::parse(word).is_none() {
            break;
        }
        end = idx + word.len();
        words += 1;
    }
    (trimmed[..end].trim(), trimmed[end..].trim())
}

fn word_spans(s: &str) -> impl Iterator<Item = (usize, &str)> {
    s.split_whitespace()
        .map(move |w| (w.as_ptr() as usize - s.as_ptr() as usize, w))
}

/// Parse a K: field value (e.g. "G", "Am", "F#m", "Bb", "D dorian").
///
/// Unknown keys produce one warning and fall back to C major.
pub fn parse_key_signature(value: &str, collector: &mut FeedbackCollector) -> KeySignature {
    let (key, _) = split_key_and_attributes(value);

    if key.is_empty() || key.eq_ignore_ascii_case("none") {
        return KeySignature::default();
    }

    match lookup_key(key) {
        Some(sig) => sig,
        None => {
            collector.warning_with_suggestion(
                format!("Unknown key '{}', assuming C major", key),
                "Use a key like K:G, K:Bb, K:F#m or K:D dorian",
            );
            KeySignature::default()
        }
    }
}

fn lookup_key(key: &str) -> Option<KeySignature> {
    let mut chars = key.chars();
    let root = chars.next()?.to_ascii_uppercase();
    if !('A'..='G').contains(&root) {
        return None;
    }
    let rest = chars.as_str();

    let (accidental, rest) = match rest.chars().next() {
        Some('#') => ("#", &rest[1..]),
        // No mode name starts with 'b', so it is always a flat here
        Some('b') => ("b", &rest[1..]),
        _ => ("", rest),
    };

    let mode = Mode::parse(rest.trim())?;
    let tonic = format!("{}{}", root, accidental);

    let sharps = if mode == Mode::Minor {
        table_lookup(MINOR_KEYS, &tonic)?
    } else {
        table_lookup(MAJOR_KEYS, &tonic)? + mode.sharps_offset()
    };

    if !(-7..=7).contains(&sharps) {
        return None;
    }

    Some(KeySignature::new(
        format!("{}{}", tonic, mode.label()),
        sharps,
        mode == Mode::Minor,
    ))
}

fn table_lookup(table: &[(&str, i8)], tonic: &str) -> Option<i8> {
    table
        .iter()
        .find(|(name, _)| *name == tonic)
        .map(|(_, sharps)| *sharps)
}
