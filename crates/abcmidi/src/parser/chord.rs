//! Guitar chord symbols (`"Am7"`, `"F#"`, `"G/B"`) realised as backing notes.

use crate::fraction::Fraction;
use crate::model::{ChordType, GuitarChord};

/// Lowest and highest MIDI notes a chord voicing may use
const VOICING_RANGE: (u8, u8) = (36, 72);

/// MIDI number of the C one octave below middle C
const CHORD_ROOT_BASE: i16 = 48;

impl ChordType {
    /// Map the quality part of a symbol (everything after the root) to a chord type.
    ///
    /// Exact spellings first, then prefixes so `min7`, `dim7` or `maj9` still
    /// land on the closest supported type. Anything else is a major triad.
    pub fn from_quality(quality: &str) -> ChordType {
        match quality {
            "" | "maj" | "M" => return ChordType::Major,
            "m" | "min" | "-" => return ChordType::Minor,
            "7" => return ChordType::Dominant7,
            "maj7" | "M7" => return ChordType::Major7,
            "m7" | "min7" | "-7" => return ChordType::Minor7,
            "dim" | "o" | "°" => return ChordType::Diminished,
            "aug" | "+" => return ChordType::Augmented,
            _ => {}
        }

        const PREFIXES: &[(&str, ChordType)] = &[
            ("maj7", ChordType::Major7),
            ("M7", ChordType::Major7),
            ("maj", ChordType::Major),
            ("min7", ChordType::Minor7),
            ("m7", ChordType::Minor7),
            ("dim", ChordType::Diminished),
            ("o", ChordType::Diminished),
            ("aug", ChordType::Augmented),
            ("+", ChordType::Augmented),
            ("min", ChordType::Minor),
            ("m", ChordType::Minor),
            ("-", ChordType::Minor),
            ("7", ChordType::Dominant7),
        ];

        PREFIXES
            .iter()
            .find(|(prefix, _)| quality.starts_with(prefix))
            .map(|(_, chord_type)| *chord_type)
            .unwrap_or(ChordType::Major)
    }
}

/// Resolve a chord symbol into backing notes.
///
/// Returns `None` when the symbol does not start with a pitch letter. The
/// duration is supplied by the caller (borrowed from the following note).
pub fn parse_guitar_chord(symbol: &str, duration: Fraction) -> Option<GuitarChord> {
    let symbol = symbol.trim();
    let mut chars = symbol.chars();
    let pitch_class: i16 = match chars.next()? {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest = chars.as_str();
    let (accidental, quality) = match rest.chars().next() {
        Some('#') => (1, &rest[1..]),
        Some('b') => (-1, &rest[1..]),
        _ => (0, rest),
    };

    // Slash bass notes are not voiced
    let quality = quality.split('/').next().unwrap_or("");
    let chord_type = ChordType::from_quality(quality);

    let root = (CHORD_ROOT_BASE + pitch_class + accidental) as u8;
    let notes = chord_type
        .intervals()
        .iter()
        .map(|interval| wrap_into_range(root + interval))
        .collect();

    Some(GuitarChord {
        symbol: symbol.to_string(),
        root,
        chord_type,
        notes,
        duration,
    })
}

fn wrap_into_range(mut note: u8) -> u8 {
    let (low, high) = VOICING_RANGE;
    while note > high {
        note -= 12;
    }
    while note < low {
        note += 12;
    }
    note
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chord(symbol: &str) -> GuitarChord {
        parse_guitar_chord(symbol, Fraction::new(1, 4)).unwrap()
    }

    #[test]
    fn test_major_and_minor() {
        let c = chord("C");
        assert_eq!(c.root, 48);
        assert_eq!(c.chord_type, ChordType::Major);
        assert_eq!(c.notes, vec![48, 52, 55]);

        let am = chord("Am");
        assert_eq!(am.root, 57);
        assert_eq!(am.notes, vec![57, 60, 64]);
    }

    #[test]
    fn test_accidentals_shift_root() {
        assert_eq!(chord("F#").root, 54);
        assert_eq!(chord("Bb").root, 58);
        assert_eq!(chord("Bbm").chord_type, ChordType::Minor);
    }

    #[test]
    fn test_sevenths() {
        assert_eq!(chord("G7").notes, vec![55, 59, 62, 65]);
        assert_eq!(chord("Cmaj7").chord_type, ChordType::Major7);
        assert_eq!(chord("CM7").chord_type, ChordType::Major7);
        assert_eq!(chord("Dm7").chord_type, ChordType::Minor7);
        assert_eq!(chord("Dmin7").chord_type, ChordType::Minor7);
    }

    #[test]
    fn test_diminished_and_augmented() {
        assert_eq!(chord("Bdim").chord_type, ChordType::Diminished);
        assert_eq!(chord("Bo").chord_type, ChordType::Diminished);
        assert_eq!(chord("Bdim7").chord_type, ChordType::Diminished);
        assert_eq!(chord("Caug").chord_type, ChordType::Augmented);
        assert_eq!(chord("C+").chord_type, ChordType::Augmented);
    }

    #[test]
    fn test_notes_wrap_into_range() {
        assert_eq!(wrap_into_range(76), 64);
        assert_eq!(wrap_into_range(30), 42);
        assert_eq!(wrap_into_range(72), 72);

        let b7 = chord("B7");
        assert!(b7.notes.iter().all(|n| (36..=72).contains(n)));
        assert_eq!(b7.notes, vec![59, 63, 66, 69]);

        let bbmaj7 = chord("Bbmaj7");
        assert_eq!(bbmaj7.notes, vec![58, 62, 65, 69]);

        let b_aug = chord("Baug");
        assert_eq!(b_aug.notes, vec![59, 63, 67]);
    }

    #[test]
    fn test_slash_bass_ignored() {
        let g_over_b = chord("G/B");
        assert_eq!(g_over_b.chord_type, ChordType::Major);
        assert_eq!(g_over_b.root, 55);
        assert_eq!(g_over_b.symbol, "G/B");
    }

    #[test]
    fn test_unknown_quality_is_major() {
        assert_eq!(chord("Csus4").chord_type, ChordType::Major);
        assert_eq!(chord("Cm6").chord_type, ChordType::Minor);
    }

    #[test]
    fn test_not_a_chord() {
        assert!(parse_guitar_chord("fine", Fraction::new(1, 8)).is_none());
        assert!(parse_guitar_chord("", Fraction::new(1, 8)).is_none());
        assert!(parse_guitar_chord("H7", Fraction::new(1, 8)).is_none());
    }
}
