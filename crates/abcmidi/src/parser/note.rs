//! Note, rest and length parsing using winnow combinators.

use winnow::combinator::{alt, fail, opt, repeat};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use crate::fraction::Fraction;
use crate::model::{Accidental, Note, NoteName};

type PResult<T> = winnow::ModalResult<T>;

/// A note as written, before the voice's unit length and transposition apply
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteToken {
    pub pitch: NoteName,
    pub octave: i8,
    pub accidental: Option<Accidental>,
    pub length: Length,
}

/// A length as written: a multiple of the voice's unit length
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length {
    pub multiplier: Fraction,
    /// Some dots or slashes were left out because the exact value would overflow
    pub clipped: bool,
}

impl NoteToken {
    /// Resolve with an already computed duration and the voice's pitch offset.
    pub fn into_note(self, duration: Fraction, pitch_offset: i16) -> Note {
        let mut note = Note {
            pitch: self.pitch,
            octave: self.octave,
            accidental: self.accidental,
            duration,
            midi_note: 0,
        };
        note.midi_note = note.midi_number(pitch_offset);
        note
    }
}

/// Parse a pitch letter. Uppercase = octave 0, lowercase = octave 1.
pub fn parse_pitch(input: &mut &str) -> PResult<(NoteName, i8)> {
    one_of(|c: char| c.is_ascii_alphabetic())
        .verify_map(|c: char| {
            let octave = if c.is_ascii_lowercase() { 1 } else { 0 };
            NoteName::from_char(c).map(|name| (name, octave))
        })
        .parse_next(input)
}

/// Parse an accidental: `^ ^^ _ __ = #`, or `b` directly before an uppercase pitch.
pub fn parse_accidental(input: &mut &str) -> PResult<Accidental> {
    alt((
        "^^".value(Accidental::DoubleSharp),
        "^".value(Accidental::Sharp),
        "#".value(Accidental::Sharp),
        "__".value(Accidental::DoubleFlat),
        "_".value(Accidental::Flat),
        "=".value(Accidental::Natural),
        flat_b,
    ))
    .parse_next(input)
}

/// `b` doubles as a pitch letter, so it only counts as a flat before `A`-`G`
fn flat_b(input: &mut &str) -> PResult<Accidental> {
    let next_is_pitch = input
        .strip_prefix('b')
        .is_some_and(|rest| rest.starts_with(|c: char| ('A'..='G').contains(&c)));
    if next_is_pitch {
        'b'.value(Accidental::Flat).parse_next(input)
    } else {
        fail.parse_next(input)
    }
}

/// Parse octave marks: each `'` raises an octave, each `,` lowers one.
pub fn parse_octave_marks(input: &mut &str) -> PResult<i8> {
    let marks: Vec<char> = repeat(0.., one_of(['\'', ','])).parse_next(input)?;
    Ok(marks
        .iter()
        .fold(0i8, |octave, &c| {
            if c == '\'' {
                octave.saturating_add(1)
            } else {
                octave.saturating_sub(1)
            }
        }))
}

/// Parse a length multiplier: `2`, `3/2`, `/2`, `/`, `//`, followed by dots.
///
/// Each trailing `.` multiplies the length by 3/2. Dots and extra slashes that
/// would push the value out of range are consumed but not applied.
pub fn parse_length(input: &mut &str) -> PResult<Length> {
    let num_str: &str = take_while(0.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    let num: i64 = if num_str.is_empty() {
        1
    } else {
        num_str.parse().unwrap_or(1)
    };

    let mut length = Fraction::from_int(num);
    let mut clipped = false;

    if let Some(den) = opt(parse_divisor).parse_next(input)? {
        length = Fraction::try_new(num, den).unwrap_or(length);
        // ABC shorthand: every further slash halves again
        let extra: Vec<char> = repeat(0.., '/').parse_next(input)?;
        for _ in extra {
            match length.checked_div_int(2) {
                Some(halved) if !clipped => length = halved,
                _ => clipped = true,
            }
        }
    }

    let dots: Vec<char> = repeat(0.., '.').parse_next(input)?;
    for _ in dots {
        match length.checked_mul(Fraction::new(3, 2)) {
            Some(dotted) if !clipped => length = dotted,
            _ => clipped = true,
        }
    }

    Ok(Length {
        multiplier: length,
        clipped,
    })
}

/// Parse `/n` or a bare `/` (which means `/2`)
fn parse_divisor(input: &mut &str) -> PResult<i64> {
    '/'.parse_next(input)?;
    let den_str: &str = take_while(0.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    if den_str.is_empty() {
        Ok(2)
    } else {
        Ok(den_str.parse().unwrap_or(2))
    }
}

/// Parse a complete note: accidental, pitch, octave marks, length.
pub fn parse_note(input: &mut &str) -> PResult<NoteToken> {
    let accidental = opt(parse_accidental).parse_next(input)?;
    let (pitch, base_octave) = parse_pitch(input)?;
    let marks = parse_octave_marks(input)?;
    let length = parse_length(input)?;

    Ok(NoteToken {
        pitch,
        octave: base_octave.saturating_add(marks),
        accidental,
        length,
    })
}

/// Parse a rest (`z`, `Z`, or invisible `x`). Returns `(invisible, length)`.
pub fn parse_rest(input: &mut &str) -> PResult<(bool, Length)> {
    let c = one_of(['z', 'Z', 'x']).parse_next(input)?;
    let length = parse_length(input)?;
    Ok((c == 'x', length))
}

/// Parse a quoted chord symbol or annotation `"G"`, `"Am7"`, `"^fine"`.
pub fn parse_quoted(input: &mut &str) -> PResult<String> {
    '"'.parse_next(input)?;
    let text: &str = take_while(0.., |c: char| c != '"').parse_next(input)?;
    '"'.parse_next(input)?;
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn length(s: &str) -> Fraction {
        let mut input = s;
        let length = parse_length(&mut input).unwrap();
        assert!(!length.clipped, "{} should fit", s);
        length.multiplier
    }

    #[test]
    fn test_parse_pitch() {
        let mut input = "C";
        assert_eq!(parse_pitch(&mut input).unwrap(), (NoteName::C, 0));

        let mut input = "c";
        assert_eq!(parse_pitch(&mut input).unwrap(), (NoteName::C, 1));

        let mut input = "H";
        assert!(parse_pitch(&mut input).is_err());
    }

    #[test]
    fn test_parse_accidental() {
        let mut input = "^^";
        assert_eq!(parse_accidental(&mut input).unwrap(), Accidental::DoubleSharp);

        let mut input = "#";
        assert_eq!(parse_accidental(&mut input).unwrap(), Accidental::Sharp);

        let mut input = "__";
        assert_eq!(parse_accidental(&mut input).unwrap(), Accidental::DoubleFlat);

        let mut input = "=";
        assert_eq!(parse_accidental(&mut input).unwrap(), Accidental::Natural);

        let mut input = "bB";
        assert_eq!(parse_accidental(&mut input).unwrap(), Accidental::Flat);
        assert_eq!(input, "B");
    }

    #[test]
    fn test_lowercase_b_is_a_note_before_lowercase() {
        let mut input = "bc";
        assert!(parse_accidental(&mut input).is_err());
        assert_eq!(input, "bc");

        let note = parse_note(&mut input).unwrap();
        assert_eq!(note.pitch, NoteName::B);
        assert_eq!(note.octave, 1);
        assert_eq!(input, "c");
    }

    #[test]
    fn test_parse_octave_marks() {
        let mut input = "''";
        assert_eq!(parse_octave_marks(&mut input).unwrap(), 2);

        let mut input = ",,";
        assert_eq!(parse_octave_marks(&mut input).unwrap(), -2);

        let mut input = "";
        assert_eq!(parse_octave_marks(&mut input).unwrap(), 0);
    }

    #[test]
    fn test_parse_length() {
        assert_eq!(length(""), Fraction::new(1, 1));
        assert_eq!(length("2"), Fraction::new(2, 1));
        assert_eq!(length("/2"), Fraction::new(1, 2));
        assert_eq!(length("/"), Fraction::new(1, 2));
        assert_eq!(length("//"), Fraction::new(1, 4));
        assert_eq!(length("3/2"), Fraction::new(3, 2));
        assert_eq!(length("."), Fraction::new(3, 2));
        assert_eq!(length("2.."), Fraction::new(9, 2));
    }

    #[test]
    fn test_parse_length_stops_before_overflow() {
        let mut input = "........................................C";
        let dotted = parse_length(&mut input).unwrap();
        assert!(dotted.clipped);
        assert_eq!(input, "C");
        // 39 dots fit in i64 terms, the 40th does not
        assert_eq!(
            dotted.multiplier,
            Fraction::new(3i64.pow(39), 2i64.pow(39))
        );

        let slashes = "/".repeat(70);
        let mut input = slashes.as_str();
        let halved = parse_length(&mut input).unwrap();
        assert!(halved.clipped);
        assert_eq!(input, "");
        assert_eq!(halved.multiplier, Fraction::new(1, 1 << 62));
    }

    #[test]
    fn test_octave_marks_saturate() {
        let marks = "'".repeat(300);
        let mut input = marks.as_str();
        assert_eq!(parse_octave_marks(&mut input).unwrap(), i8::MAX);

        let note = format!("c{}", marks);
        let mut input = note.as_str();
        let token = parse_note(&mut input).unwrap();
        assert_eq!(token.octave, i8::MAX);
        assert_eq!(token.into_note(Fraction::new(1, 8), 0).midi_note, 127);
    }

    #[test]
    fn test_parse_note() {
        let mut input = "^c'2";
        let note = parse_note(&mut input).unwrap();
        assert_eq!(note.pitch, NoteName::C);
        assert_eq!(note.octave, 2);
        assert_eq!(note.accidental, Some(Accidental::Sharp));
        assert_eq!(note.length.multiplier, Fraction::new(2, 1));

        let resolved = note.into_note(Fraction::new(1, 4), 0);
        assert_eq!(resolved.duration, Fraction::new(1, 4));
        assert_eq!(resolved.midi_note, 85);
    }

    #[test]
    fn test_dotted_note_duration() {
        let mut input = "C.";
        let note = parse_note(&mut input).unwrap();
        assert_eq!(note.length.multiplier, Fraction::new(3, 2));
        assert_eq!(Fraction::new(1, 8) * note.length.multiplier, Fraction::new(3, 16));
    }

    #[test]
    fn test_parse_rest() {
        let rest = |s: &str| {
            let mut input = s;
            let (invisible, length) = parse_rest(&mut input).unwrap();
            (invisible, length.multiplier)
        };
        assert_eq!(rest("z2"), (false, Fraction::new(2, 1)));
        assert_eq!(rest("x/"), (true, Fraction::new(1, 2)));
        assert_eq!(rest("Z"), (false, Fraction::new(1, 1)));
    }

    #[test]
    fn test_parse_quoted() {
        let mut input = "\"Am7\"B";
        assert_eq!(parse_quoted(&mut input).unwrap(), "Am7");
        assert_eq!(input, "B");

        let mut input = "\"unterminated";
        assert!(parse_quoted(&mut input).is_err());
    }
}
