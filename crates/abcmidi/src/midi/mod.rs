//! MIDI generation from a parsed tune.
//!
//! Produces one meta track (tempo, meter, key, title) followed by one track
//! per voice. Event times stay in whole-note fractions until the writer
//! converts them to ticks.

pub mod channels;
pub mod writer;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::feedback::{Feedback, FeedbackLevel, ParseResult};
use crate::fraction::Fraction;
use crate::model::{AbcTune, Clef, FeatureKind, VoiceContext, VoiceId};

use channels::ChannelManager;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetaEvent {
    /// Set Tempo (0x51)
    Tempo { micros_per_quarter: u32 },
    /// Time Signature (0x58); clocks-per-click and 32nds-per-quarter are fixed at 24 and 8
    TimeSignature { numerator: u8, denominator_log2: u8 },
    /// Key Signature (0x59)
    KeySignature { sharps: i8, minor: bool },
    /// Text (0x01)
    Text(String),
    /// Track Name (0x03)
    TrackName(String),
    /// End of Track (0x2F)
    EndOfTrack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MidiEventKind {
    NoteOn { key: u8, velocity: u8 },
    NoteOff { key: u8 },
    ProgramChange { program: u8 },
    Meta(MetaEvent),
}

/// One event on a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiEvent {
    /// Position in whole notes from the start of the tune
    pub timestamp: Fraction,
    /// Ignored for meta events
    pub channel: u8,
    pub kind: MidiEventKind,
}

impl MidiEvent {
    pub fn meta(timestamp: Fraction, meta: MetaEvent) -> Self {
        MidiEvent {
            timestamp,
            channel: 0,
            kind: MidiEventKind::Meta(meta),
        }
    }

    pub fn note_on(timestamp: Fraction, channel: u8, key: u8, velocity: u8) -> Self {
        MidiEvent {
            timestamp,
            channel,
            kind: MidiEventKind::NoteOn { key, velocity },
        }
    }

    pub fn note_off(timestamp: Fraction, channel: u8, key: u8) -> Self {
        MidiEvent {
            timestamp,
            channel,
            kind: MidiEventKind::NoteOff { key },
        }
    }

    /// Absolute position in ticks
    pub fn ticks(&self, ticks_per_quarter: u16) -> u64 {
        self.timestamp.to_ticks(ticks_per_quarter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiTrack {
    pub track_number: usize,
    /// `None` for the meta track
    pub voice_number: Option<VoiceId>,
    pub channel: Option<u8>,
    pub name: String,
    pub events: Vec<MidiEvent>,
}

/// Compile a tune into MIDI tracks: the meta track first, then one per voice
/// in voice-id order.
///
/// Voices left sharing a channel once all melodic channels are taken come
/// back as warnings alongside the tracks.
pub fn generate(tune: &AbcTune) -> Result<ParseResult<Vec<MidiTrack>>> {
    if let Some(feature) = tune
        .features
        .iter()
        .find(|f| !tune.voices.contains_key(&f.voice_id))
    {
        return Err(Error::UnknownVoice(feature.voice_id));
    }

    let channels = assign_channels(tune);

    let mut tracks = Vec::with_capacity(tune.voices.len() + 1);
    tracks.push(generate_meta_track(tune));

    for (idx, voice) in tune.voices.values().enumerate() {
        let channel = channels
            .channel_for(voice.id)
            .unwrap_or(channels::FALLBACK_CHANNEL);
        tracks.push(MidiTrack {
            track_number: idx + 1,
            voice_number: Some(voice.id),
            channel: Some(channel),
            name: voice.name.clone(),
            events: generate_track_events(tune, voice, channel),
        });
    }

    let feedback = channels
        .shared_voices()
        .iter()
        .filter_map(|id| tune.voices.get(id))
        .map(|voice| {
            Feedback::new(
                FeedbackLevel::Warning,
                format!(
                    "No free MIDI channel for voice '{}', sharing channel {}",
                    voice.name,
                    channels::FALLBACK_CHANNEL
                ),
                0,
            )
            .with_suggestion("Use at most 15 melodic voices")
        })
        .collect();

    tracing::debug!(tracks = tracks.len(), "generated MIDI tracks");
    Ok(ParseResult::new(tracks, feedback))
}

/// Give every voice a channel: percussion clefs get channel 9, everything
/// else is allocated first-fit in voice-id order.
pub fn assign_channels(tune: &AbcTune) -> ChannelManager {
    let mut channels = ChannelManager::new();
    for voice in tune.voices.values() {
        if voice.clef == Clef::Percussion {
            channels.assign_percussion(voice.id);
        } else {
            channels.assign(voice.id);
        }
    }
    channels
}

/// Tempo, meter and key: the tune defaults at time zero, then every change
/// found in the body, whichever voice it appeared in.
fn generate_meta_track(tune: &AbcTune) -> MidiTrack {
    let mut events = Vec::new();

    if !tune.header.title.is_empty() {
        events.push(MidiEvent::meta(
            Fraction::ZERO,
            MetaEvent::TrackName(tune.header.title.clone()),
        ));
    }

    events.push(MidiEvent::meta(
        Fraction::ZERO,
        MetaEvent::Tempo {
            micros_per_quarter: tune.default_tempo.micros_per_quarter(),
        },
    ));
    events.push(MidiEvent::meta(
        Fraction::ZERO,
        MetaEvent::TimeSignature {
            numerator: tune.default_time_signature.numerator,
            denominator_log2: tune.default_time_signature.denominator_log2(),
        },
    ));
    events.push(MidiEvent::meta(
        Fraction::ZERO,
        MetaEvent::KeySignature {
            sharps: tune.default_key.sharps,
            minor: tune.default_key.minor,
        },
    ));

    for feature in &tune.features {
        let meta = match &feature.kind {
            FeatureKind::Tempo(tempo) => MetaEvent::Tempo {
                micros_per_quarter: tempo.micros_per_quarter(),
            },
            FeatureKind::TimeSignature(ts) => MetaEvent::TimeSignature {
                numerator: ts.numerator,
                denominator_log2: ts.denominator_log2(),
            },
            FeatureKind::KeySignature(key) => MetaEvent::KeySignature {
                sharps: key.sharps,
                minor: key.minor,
            },
            _ => continue,
        };
        events.push(MidiEvent::meta(feature.timestamp, meta));
    }

    // Voices interleave, so changes arrive out of order
    events.sort_by_key(|e| e.timestamp);
    let end = events.last().map(|e| e.timestamp).unwrap_or(Fraction::ZERO);
    events.push(MidiEvent::meta(end, MetaEvent::EndOfTrack));

    MidiTrack {
        track_number: 0,
        voice_number: None,
        channel: None,
        name: tune.header.title.clone(),
        events,
    }
}

/// Notes still sounding, keyed by the time they stop
type ActiveNotes = BTreeMap<Fraction, Vec<u8>>;

/// Build one voice's events in a single pass over its features.
///
/// Before anything is emitted at time `t`, every note ending at or before `t`
/// is turned off, so chord releases always precede the next note-on.
pub fn generate_track_events(tune: &AbcTune, voice: &VoiceContext, channel: u8) -> Vec<MidiEvent> {
    let mut events = vec![
        MidiEvent::meta(Fraction::ZERO, MetaEvent::TrackName(voice.name.clone())),
        MidiEvent {
            timestamp: Fraction::ZERO,
            channel,
            kind: MidiEventKind::ProgramChange {
                program: voice.instrument & 0x7F,
            },
        },
    ];

    if voice.muted {
        events.push(MidiEvent::meta(Fraction::ZERO, MetaEvent::EndOfTrack));
        return events;
    }

    let mut active = ActiveNotes::new();
    let velocity = voice.velocity.min(127);

    for feature in tune.features_for(voice.id) {
        let now = feature.timestamp;
        release_notes(&mut active, Some(now), channel, &mut events);

        let mut start = |key: u8, duration: Fraction, events: &mut Vec<MidiEvent>| {
            events.push(MidiEvent::note_on(now, channel, key, velocity));
            active.entry(now + duration).or_default().push(key);
        };

        match &feature.kind {
            FeatureKind::Note(note) => start(note.midi_note, note.duration, &mut events),
            FeatureKind::Chord(chord) => {
                for note in &chord.notes {
                    start(note.midi_note, chord.duration, &mut events);
                }
            }
            FeatureKind::GuitarChord(chord) => {
                for &key in &chord.notes {
                    start(key, chord.duration, &mut events);
                }
            }
            FeatureKind::Text(text) => {
                events.push(MidiEvent::meta(now, MetaEvent::Text(text.clone())));
            }
            FeatureKind::Rest(_)
            | FeatureKind::BarLine(_)
            | FeatureKind::VoiceChange { .. }
            | FeatureKind::Tempo(_)
            | FeatureKind::TimeSignature(_)
            | FeatureKind::KeySignature(_) => {}
        }
    }

    release_notes(&mut active, None, channel, &mut events);

    let end = events
        .last()
        .map(|e| e.timestamp)
        .unwrap_or(Fraction::ZERO);
    events.push(MidiEvent::meta(end, MetaEvent::EndOfTrack));
    events
}

/// Emit note-offs for notes ending at or before `until` (all of them if `None`).
fn release_notes(
    active: &mut ActiveNotes,
    until: Option<Fraction>,
    channel: u8,
    events: &mut Vec<MidiEvent>,
) {
    while let Some(entry) = active.first_entry() {
        if until.is_some_and(|limit| *entry.key() > limit) {
            break;
        }
        let (end, keys) = entry.remove_entry();
        for key in keys {
            events.push(MidiEvent::note_off(end, channel, key));
        }
    }
}
