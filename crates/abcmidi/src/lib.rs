//! ABC notation parser and multi-voice MIDI compiler.
//!
//! Parses ABC music notation into a time-stamped [`AbcTune`], compiles it into
//! one MIDI track per voice plus a tempo/meta track, and serializes the result
//! as a format 1 Standard MIDI File.
//!
//! # Example
//!
//! ```
//! use abcmidi::{compile, MidiParams};
//!
//! let abc = r#"
//! X:1
//! T:Test Tune
//! M:4/4
//! L:1/8
//! K:G
//! "G"GABc dedB|"D7"cBAG D2D2|
//! "#;
//!
//! let compiled = compile(abc, &MidiParams::default()).unwrap();
//! assert!(compiled.is_playable());
//!
//! // Melody track plus the guitar-chord backing track, after the meta track
//! assert_eq!(compiled.tracks.len(), 3);
//! let midi_bytes = compiled.to_smf();
//! assert_eq!(&midi_bytes[0..4], b"MThd");
//! ```

pub mod error;
pub mod feedback;
pub mod fraction;
pub mod instruments;
pub mod midi;
pub mod model;
pub mod parser;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use error::{Error, Result};
pub use feedback::{Feedback, FeedbackLevel, ParseResult};
pub use fraction::Fraction;
pub use midi::writer::{export_midi, write_smf};
pub use midi::{generate, MetaEvent, MidiEvent, MidiEventKind, MidiTrack};
pub use model::*;
pub use parser::{parse, parse_file, parse_key_signature};

/// Parameters for MIDI serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiParams {
    /// Ticks per quarter note (SMF division)
    pub ticks_per_quarter: u16,
}

impl Default for MidiParams {
    fn default() -> Self {
        MidiParams {
            ticks_per_quarter: 480,
        }
    }
}

/// A tune taken through the whole pipeline
#[derive(Debug, Clone)]
pub struct Compiled {
    pub tune: AbcTune,
    pub tracks: Vec<MidiTrack>,
    /// Diagnostics from parsing, then from generation
    pub feedback: Vec<Feedback>,
    pub params: MidiParams,
}

impl Compiled {
    /// Whether there is anything to play.
    pub fn is_playable(&self) -> bool {
        !self.tune.voices.is_empty() && !self.tune.features.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.feedback
            .iter()
            .any(|f| f.level == FeedbackLevel::Error)
    }

    pub fn to_smf(&self) -> Vec<u8> {
        write_smf(&self.tracks, self.params.ticks_per_quarter)
    }

    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        export_midi(&self.tracks, self.params.ticks_per_quarter, path)
    }
}

/// Parse and generate in one step.
///
/// Parse problems never fail the call; they are returned in
/// [`Compiled::feedback`].
pub fn compile(input: &str, params: &MidiParams) -> Result<Compiled> {
    build(parse(input), params)
}

/// Read, parse and generate an ABC file.
pub fn compile_file(path: impl AsRef<Path>, params: &MidiParams) -> Result<Compiled> {
    build(parse_file(path)?, params)
}

fn build(result: ParseResult<AbcTune>, params: &MidiParams) -> Result<Compiled> {
    let ParseResult {
        value: mut tune,
        mut feedback,
    } = result;

    let generated = generate(&tune)?;
    feedback.extend(generated.feedback);

    // Voices record the channel they were given
    for track in &generated.value {
        if let (Some(id), Some(channel)) = (track.voice_number, track.channel) {
            if let Some(voice) = tune.voices.get_mut(&id) {
                voice.channel = Some(channel);
            }
        }
    }

    Ok(Compiled {
        tune,
        tracks: generated.value,
        feedback,
        params: params.clone(),
    })
}
