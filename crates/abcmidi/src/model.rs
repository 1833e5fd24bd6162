//! Data model for parsed ABC tunes.
//!
//! The parser produces one [`AbcTune`]: header metadata, tune-level defaults,
//! the voice registry and a flat, time-stamped list of [`Feature`]s. The MIDI
//! generator reads it without modifying it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fraction::Fraction;

/// Numeric voice identifier. Named voices are assigned sequential ids.
pub type VoiceId = u32;

/// Guitar-chord backing for voice `n` is played on voice `n + CHORD_VOICE_OFFSET`.
pub const CHORD_VOICE_OFFSET: VoiceId = 100;

/// General MIDI "String Ensemble 1", used for synthesised chord voices.
pub const CHORD_VOICE_INSTRUMENT: u8 = 48;

pub const DEFAULT_VELOCITY: u8 = 80;
pub const CHORD_VELOCITY: u8 = 50;

/// A complete parsed tune
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbcTune {
    pub header: TuneHeader,
    pub default_key: KeySignature,
    pub default_time_signature: TimeSignature,
    pub default_unit_length: Fraction,
    pub default_tempo: Tempo,
    /// Program for voices created before any `V:` or `%%MIDI program` says otherwise
    pub default_instrument: u8,
    pub voices: BTreeMap<VoiceId, VoiceContext>,
    pub features: Vec<Feature>,
}

impl Default for AbcTune {
    fn default() -> Self {
        AbcTune {
            header: TuneHeader::default(),
            default_key: KeySignature::default(),
            default_time_signature: TimeSignature::default(),
            default_unit_length: Fraction::new(1, 8),
            default_tempo: Tempo::default(),
            default_instrument: 0,
            voices: BTreeMap::new(),
            features: Vec::new(),
        }
    }
}

impl AbcTune {
    /// Features belonging to one voice, in parse order.
    pub fn features_for(&self, voice_id: VoiceId) -> impl Iterator<Item = &Feature> {
        self.features.iter().filter(move |f| f.voice_id == voice_id)
    }

    /// Build a fresh voice carrying the tune-level defaults.
    pub fn new_voice(&self, id: VoiceId) -> VoiceContext {
        VoiceContext {
            id,
            name: id.to_string(),
            short_name: None,
            clef: Clef::Treble,
            key: self.default_key.clone(),
            time_signature: self.default_time_signature,
            unit_length: self.default_unit_length,
            transpose: 0,
            octave: 0,
            instrument: self.default_instrument,
            channel: None,
            velocity: DEFAULT_VELOCITY,
            muted: false,
        }
    }
}

/// Tune metadata from the header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneHeader {
    pub reference: u32,
    pub title: String,
    pub titles: Vec<String>,
    pub composer: Option<String>,
    pub origin: Option<String>,
    pub parts: Option<String>,
    pub other_fields: Vec<InfoField>,
}

impl Default for TuneHeader {
    fn default() -> Self {
        TuneHeader {
            reference: 1,
            title: String::new(),
            titles: Vec::new(),
            composer: None,
            origin: None,
            parts: None,
            other_fields: Vec::new(),
        }
    }
}

/// Generic info field kept verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoField {
    pub field_type: char,
    pub value: String,
}

/// Key signature as written in the MIDI key-signature meta event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySignature {
    pub name: String,
    /// Positive = sharps, negative = flats
    pub sharps: i8,
    pub minor: bool,
}

impl KeySignature {
    pub fn new(name: impl Into<String>, sharps: i8, minor: bool) -> Self {
        KeySignature {
            name: name.into(),
            sharps,
            minor,
        }
    }
}

impl Default for KeySignature {
    fn default() -> Self {
        KeySignature::new("C", 0, false)
    }
}

/// Meter (M: field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub fn new(numerator: u8, denominator: u8) -> Self {
        TimeSignature {
            numerator,
            denominator,
        }
    }

    /// Length of one bar in whole notes
    pub fn bar_length(&self) -> Fraction {
        Fraction::new(self.numerator as i64, self.denominator.max(1) as i64)
    }

    /// Denominator as a power of two, as MIDI stores it
    pub fn denominator_log2(&self) -> u8 {
        let mut d = self.denominator.max(1);
        let mut log = 0;
        while d > 1 {
            d >>= 1;
            log += 1;
        }
        log
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature::new(4, 4)
    }
}

/// Tempo (Q: field)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    /// The note value that gets the beat, in whole notes
    pub note_value: Fraction,
    pub bpm: u32,
    pub text: Option<String>,
}

impl Tempo {
    pub fn new(note_value: Fraction, bpm: u32) -> Self {
        Tempo {
            note_value,
            bpm,
            text: None,
        }
    }

    /// Seconds taken by `beats` whole notes at this tempo.
    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        (beats / self.note_value.to_f64()) * (60.0 / self.bpm.max(1) as f64)
    }

    /// Microseconds per quarter note, as stored in a Set-Tempo meta event.
    pub fn micros_per_quarter(&self) -> u32 {
        let micros = self.beats_to_seconds(0.25) * 1_000_000.0;
        micros.round().clamp(1.0, 0x00FF_FFFF as f64) as u32
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Tempo::new(Fraction::new(1, 4), 120)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Clef {
    #[default]
    Treble,
    Bass,
    Alto,
    Tenor,
    Percussion,
    None,
}

impl Clef {
    pub fn parse(s: &str) -> Option<Clef> {
        match s.to_lowercase().as_str() {
            "treble" | "g" | "g2" | "treble-8" | "treble+8" => Some(Clef::Treble),
            "bass" | "f" | "f4" | "bass-8" | "bass+8" => Some(Clef::Bass),
            "alto" | "c" | "c3" => Some(Clef::Alto),
            "tenor" | "c4" => Some(Clef::Tenor),
            "perc" | "percussion" | "drum" | "drums" => Some(Clef::Percussion),
            "none" => Some(Clef::None),
            _ => None,
        }
    }
}

/// Per-voice state shared by the header, the body parser and the generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceContext {
    pub id: VoiceId,
    /// Display name; defaults to the identifier used to declare the voice
    pub name: String,
    pub short_name: Option<String>,
    pub clef: Clef,
    pub key: KeySignature,
    pub time_signature: TimeSignature,
    pub unit_length: Fraction,
    /// Semitones
    pub transpose: i8,
    /// Whole octaves
    pub octave: i8,
    /// General MIDI program (0-127)
    pub instrument: u8,
    /// Assigned by the generator; `None` until then
    pub channel: Option<u8>,
    pub velocity: u8,
    pub muted: bool,
}

impl VoiceContext {
    /// Combined pitch offset in semitones
    pub fn pitch_offset(&self) -> i16 {
        self.transpose as i16 + self.octave as i16 * 12
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteName {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl NoteName {
    /// Semitone offset from C (0-11)
    pub fn to_semitone(&self) -> i8 {
        match self {
            NoteName::C => 0,
            NoteName::D => 2,
            NoteName::E => 4,
            NoteName::F => 5,
            NoteName::G => 7,
            NoteName::A => 9,
            NoteName::B => 11,
        }
    }

    /// Case-insensitive letter lookup
    pub fn from_char(c: char) -> Option<NoteName> {
        match c.to_ascii_uppercase() {
            'C' => Some(NoteName::C),
            'D' => Some(NoteName::D),
            'E' => Some(NoteName::E),
            'F' => Some(NoteName::F),
            'G' => Some(NoteName::G),
            'A' => Some(NoteName::A),
            'B' => Some(NoteName::B),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Accidental {
    DoubleSharp,
    Sharp,
    Natural,
    Flat,
    DoubleFlat,
}

impl Accidental {
    pub fn to_semitone_offset(&self) -> i8 {
        match self {
            Accidental::DoubleSharp => 2,
            Accidental::Sharp => 1,
            Accidental::Natural => 0,
            Accidental::Flat => -1,
            Accidental::DoubleFlat => -2,
        }
    }
}

/// A single melody note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: NoteName,
    /// 0 = `C`-`B`, 1 = `c`-`b`, shifted by `'` and `,` marks
    pub octave: i8,
    pub accidental: Option<Accidental>,
    /// Whole-note fraction
    pub duration: Fraction,
    /// Resolved MIDI number, including the voice's transposition
    pub midi_note: u8,
}

impl Note {
    pub fn new(pitch: NoteName, octave: i8, accidental: Option<Accidental>) -> Self {
        let mut note = Note {
            pitch,
            octave,
            accidental,
            duration: Fraction::new(1, 8),
            midi_note: 0,
        };
        note.midi_note = note.midi_number(0);
        note
    }

    /// MIDI number for this pitch with an extra semitone offset, clamped to 0-127.
    ///
    /// Uppercase letters sit in octave 4 (`C` = 60), lowercase in octave 5.
    pub fn midi_number(&self, offset: i16) -> u8 {
        let base_octave = 4 + self.octave as i16;
        let acc = self.accidental.map(|a| a.to_semitone_offset()).unwrap_or(0) as i16;
        ((base_octave + 1) * 12 + self.pitch.to_semitone() as i16 + acc + offset).clamp(0, 127)
            as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rest {
    pub duration: Fraction,
    /// `x` rests take time but are not printed
    pub invisible: bool,
}

/// Bracketed chord `[CEG]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chord {
    pub notes: Vec<Note>,
    pub duration: Fraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChordType {
    Major,
    Minor,
    Dominant7,
    Major7,
    Minor7,
    Diminished,
    Augmented,
}

impl ChordType {
    /// Semitone intervals above the root
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            ChordType::Major => &[0, 4, 7],
            ChordType::Minor => &[0, 3, 7],
            ChordType::Dominant7 => &[0, 4, 7, 10],
            ChordType::Major7 => &[0, 4, 7, 11],
            ChordType::Minor7 => &[0, 3, 7, 10],
            ChordType::Diminished => &[0, 3, 6],
            ChordType::Augmented => &[0, 4, 8],
        }
    }
}

/// Guitar chord symbol realised as backing notes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuitarChord {
    pub symbol: String,
    /// Bass note (root one octave below middle C)
    pub root: u8,
    pub chord_type: ChordType,
    pub notes: Vec<u8>,
    /// Borrowed from the melody note that follows the symbol
    pub duration: Fraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarLine {
    Single,      // |
    Double,      // ||
    RepeatStart, // |:
    RepeatEnd,   // :|
    RepeatBoth,  // :|: or ::
    End,         // |]
    Start,       // [|
    Ending(u8),  // |1 :|2 [1
}

/// What happened at a point on a voice's timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureKind {
    Note(Note),
    Rest(Rest),
    Chord(Chord),
    GuitarChord(GuitarChord),
    BarLine(BarLine),
    VoiceChange { voice_id: VoiceId },
    Tempo(Tempo),
    TimeSignature(TimeSignature),
    KeySignature(KeySignature),
    Text(String),
}

/// A time-stamped musical event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub voice_id: VoiceId,
    /// Start position in whole notes on the voice's timeline
    pub timestamp: Fraction,
    pub line_number: usize,
    pub kind: FeatureKind,
}

impl Feature {
    /// How far this feature advances its voice's cursor
    pub fn duration(&self) -> Fraction {
        match &self.kind {
            FeatureKind::Note(n) => n.duration,
            FeatureKind::Rest(r) => r.duration,
            FeatureKind::Chord(c) => c.duration,
            _ => Fraction::ZERO,
        }
    }
}
