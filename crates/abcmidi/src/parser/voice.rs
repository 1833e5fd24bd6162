//! Voice identity and per-voice timelines.
//!
//! [`VoiceManager`] is the single place voices are created and resolved, for
//! both header `V:` lines and inline `[V:..]` switches. [`Timeline`] holds one
//! time cursor per voice so interleaved voice sections each keep their own
//! position on the shared whole-note timeline.

use std::collections::{BTreeMap, HashMap};

use crate::feedback::FeedbackCollector;
use crate::fraction::Fraction;
use crate::instruments;
use crate::model::{AbcTune, Clef, VoiceContext, VoiceId};

/// Per-voice time cursors
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    cursors: BTreeMap<VoiceId, Fraction>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember where `voice` stopped.
    pub fn save_current_time(&mut self, voice: VoiceId, time: Fraction) {
        self.cursors.insert(voice, time);
    }

    /// Where `voice` should resume; zero if it has not been seen yet.
    pub fn restore_voice_time(&self, voice: VoiceId) -> Fraction {
        self.cursors.get(&voice).copied().unwrap_or(Fraction::ZERO)
    }
}

/// Voice registry: maps identifiers to numeric ids and tracks the current voice
#[derive(Debug, Clone)]
pub struct VoiceManager {
    name_to_id: HashMap<String, VoiceId>,
    next_id: VoiceId,
    current: Option<VoiceId>,
    first_defined: Option<VoiceId>,
    last_defined: Option<VoiceId>,
    /// Voice that plays each voice's guitar chords
    backing: HashMap<VoiceId, VoiceId>,
}

impl Default for VoiceManager {
    fn default() -> Self {
        VoiceManager {
            name_to_id: HashMap::new(),
            next_id: 1,
            current: None,
            first_defined: None,
            last_defined: None,
            backing: HashMap::new(),
        }
    }
}

impl VoiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_voice(&self) -> Option<VoiceId> {
        self.current
    }

    /// Voice that `%%MIDI` style directives should target.
    pub fn directive_target(&self) -> Option<VoiceId> {
        self.current.or(self.last_defined)
    }

    /// Handle a `V:` definition: `id [attr=value ...]`.
    ///
    /// Creates the voice with the tune defaults if it is new, then applies the
    /// attributes. Does not change the current voice.
    pub fn define_voice(
        &mut self,
        declaration: &str,
        tune: &mut AbcTune,
        collector: &mut FeedbackCollector,
    ) -> VoiceId {
        let (identifier, attributes) = split_identifier(declaration);
        if identifier.is_empty() {
            collector.warning("Empty voice definition, ignoring");
            return self.ensure_current(tune);
        }

        let Some(id) = self.resolve(identifier, tune) else {
            collector.warning(format!(
                "No voice ids left for '{}', using the current voice",
                identifier
            ));
            return self.ensure_current(tune);
        };
        if let Some(voice) = tune.voices.get_mut(&id) {
            apply_voice_attributes(voice, attributes, collector);
        }
        self.first_defined.get_or_insert(id);
        self.last_defined = Some(id);
        id
    }

    /// Handle an inline `[V:id]` or a body `V:` line and make it current.
    pub fn switch_to_voice(
        &mut self,
        declaration: &str,
        tune: &mut AbcTune,
        collector: &mut FeedbackCollector,
    ) -> VoiceId {
        let (identifier, attributes) = split_identifier(declaration);
        if identifier.is_empty() {
            collector.warning("Voice switch without an identifier, staying on current voice");
            return self.ensure_current(tune);
        }

        let Some(id) = self.resolve(identifier, tune) else {
            collector.warning(format!(
                "No voice ids left for '{}', staying on current voice",
                identifier
            ));
            return self.ensure_current(tune);
        };
        if let Some(voice) = tune.voices.get_mut(&id) {
            apply_voice_attributes(voice, attributes, collector);
        }
        self.first_defined.get_or_insert(id);
        self.current = Some(id);
        id
    }

    /// Record a voice that was created outside the manager.
    ///
    /// Keeps the name lookup in step and moves the id generator past `id`.
    pub fn register_external_voice(&mut self, name: &str, id: VoiceId) {
        self.name_to_id.insert(name.to_string(), id);
        self.bump_past(id);
    }

    /// Voice already chosen to play `base`'s guitar chords
    pub fn backing_voice(&self, base: VoiceId) -> Option<VoiceId> {
        self.backing.get(&base).copied()
    }

    pub fn set_backing_voice(&mut self, base: VoiceId, id: VoiceId) {
        self.backing.insert(base, id);
    }

    /// Current voice, falling back to the first defined voice, then to a new voice 1.
    pub fn ensure_current(&mut self, tune: &mut AbcTune) -> VoiceId {
        if let Some(id) = self.current.filter(|id| tune.voices.contains_key(id)) {
            return id;
        }
        let id = match self.first_defined.filter(|id| tune.voices.contains_key(id)) {
            Some(id) => id,
            None => self.numbered(1, "1", tune),
        };
        self.current = Some(id);
        id
    }

    /// Resolve an identifier to an id, creating the voice if nothing matches.
    ///
    /// Order: numeric id, an existing voice's name or short name, the
    /// identifier map, then a fresh sequential id. `None` when a new voice is
    /// needed but every id is taken.
    fn resolve(&mut self, identifier: &str, tune: &mut AbcTune) -> Option<VoiceId> {
        if let Ok(id) = identifier.parse::<VoiceId>() {
            return Some(self.numbered(id, identifier, tune));
        }

        let by_name = tune
            .voices
            .values()
            .find(|v| v.name == identifier || v.short_name.as_deref() == Some(identifier))
            .map(|v| v.id);
        if by_name.is_some() {
            return by_name;
        }

        if let Some(&id) = self.name_to_id.get(identifier) {
            if tune.voices.contains_key(&id) {
                return Some(id);
            }
        }

        let id = self.unused_id(tune)?;
        self.create(identifier, id, tune);
        Some(id)
    }

    /// An explicitly numbered voice, created on first use
    fn numbered(&mut self, id: VoiceId, identifier: &str, tune: &mut AbcTune) -> VoiceId {
        if !tune.voices.contains_key(&id) {
            self.create(identifier, id, tune);
        }
        self.bump_past(id);
        id
    }

    /// First id from the counter up that no voice holds, wrapping to 1 past
    /// the top of the range
    fn unused_id(&mut self, tune: &AbcTune) -> Option<VoiceId> {
        let id = (self.next_id..=VoiceId::MAX)
            .chain(1..self.next_id)
            .find(|id| !tune.voices.contains_key(id))?;
        self.bump_past(id);
        Some(id)
    }

    /// Keep auto ids above `id`. At the top of the range the counter stays put.
    fn bump_past(&mut self, id: VoiceId) {
        if let Some(next) = id.checked_add(1) {
            self.next_id = self.next_id.max(next);
        }
    }

    fn create(&mut self, identifier: &str, id: VoiceId, tune: &mut AbcTune) {
        let mut voice = tune.new_voice(id);
        voice.name = identifier.to_string();
        tune.voices.insert(id, voice);
        self.name_to_id.insert(identifier.to_string(), id);
        tracing::debug!(voice = id, name = identifier, "created voice");
    }
}

/// Split `"Bass clef=bass"` into `("Bass", "clef=bass")`.
fn split_identifier(declaration: &str) -> (&str, &str) {
    let declaration = declaration.trim();
    match declaration.find(char::is_whitespace) {
        Some(idx) => (&declaration[..idx], declaration[idx..].trim_start()),
        None => (declaration, ""),
    }
}

/// One `key=value` pair or bare word from a voice attribute list
#[derive(Debug, Clone, PartialEq)]
struct Attribute {
    key: String,
    value: Option<String>,
}

/// Tokenize an attribute list, keeping quoted values with spaces together.
///
/// An unterminated quote takes the rest of the line and produces a warning.
fn tokenize_attributes(input: &str, collector: &mut FeedbackCollector) -> Vec<Attribute> {
    let mut attributes = Vec::new();
    let mut rest = input.trim_start();

    while !rest.is_empty() {
        let key_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let key = &rest[..key_end];
        rest = &rest[key_end..];

        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            if let Some(quoted) = after_eq.strip_prefix('"') {
                match quoted.find('"') {
                    Some(end) => {
                        rest = &quoted[end + 1..];
                        Some(quoted[..end].to_string())
                    }
                    None => {
                        collector.warning(format!(
                            "Unterminated quote in voice attribute '{}'",
                            key
                        ));
                        rest = "";
                        Some(quoted.to_string())
                    }
                }
            } else {
                let end = after_eq
                    .find(char::is_whitespace)
                    .unwrap_or(after_eq.len());
                rest = &after_eq[end..];
                Some(after_eq[..end].to_string())
            }
        } else {
            None
        };

        if !key.is_empty() {
            attributes.push(Attribute {
                key: key.to_string(),
                value,
            });
        }
        rest = rest.trim_start();
    }

    attributes
}

/// Apply `attr=value` settings to a voice.
///
/// Shared by header `V:` lines, inline voice switches and `K:` attributes.
pub fn apply_voice_attributes(
    voice: &mut VoiceContext,
    attributes: &str,
    collector: &mut FeedbackCollector,
) {
    for Attribute { key, value } in tokenize_attributes(attributes, collector) {
        let lower = key.to_ascii_lowercase();
        let Some(value) = value else {
            apply_bare_word(voice, &lower, collector);
            continue;
        };

        match lower.as_str() {
            "name" | "nm" => voice.name = value,
            "sname" | "snm" | "subname" => voice.short_name = Some(value),
            "clef" => match Clef::parse(&value) {
                Some(clef) => voice.clef = clef,
                None => collector.warning(format!("Unknown clef '{}'", value)),
            },
            "transpose" | "t" => match value.parse::<i8>() {
                Ok(semitones) => voice.transpose = semitones,
                Err(_) => collector.warning(format!("Invalid transpose value '{}'", value)),
            },
            "octave" => match value.parse::<i8>() {
                Ok(octaves) => voice.octave = octaves,
                Err(_) => collector.warning(format!("Invalid octave value '{}'", value)),
            },
            "instrument" | "program" => match instruments::lookup(&value) {
                Some(program) => voice.instrument = program,
                None => collector.warning_with_suggestion(
                    format!("Unknown instrument '{}'", value),
                    "Use a General MIDI program number (0-127) or name",
                ),
            },
            "velocity" | "vel" => match value.parse::<u8>() {
                Ok(velocity) => voice.velocity = velocity.min(127),
                Err(_) => collector.warning(format!("Invalid velocity '{}'", value)),
            },
            "mute" => match value.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => voice.muted = true,
                "false" | "no" | "0" | "off" => voice.muted = false,
                _ => collector.warning(format!("Invalid mute value '{}'", value)),
            },
            _ => collector.info(format!("Ignoring voice attribute '{}'", key)),
        }
    }
}

fn apply_bare_word(voice: &mut VoiceContext, word: &str, collector: &mut FeedbackCollector) {
    if word == "mute" {
        voice.muted = true;
    } else if let Some(clef) = Clef::parse(word) {
        voice.clef = clef;
    } else {
        collector.info(format!("Ignoring voice attribute '{}'", word));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (VoiceManager, AbcTune, FeedbackCollector) {
        (VoiceManager::new(), AbcTune::default(), FeedbackCollector::new())
    }

    #[test]
    fn test_numeric_and_named_ids() {
        let (mut voices, mut tune, mut collector) = setup();

        assert_eq!(voices.define_voice("1", &mut tune, &mut collector), 1);
        assert_eq!(voices.define_voice("Bass", &mut tune, &mut collector), 2);
        assert_eq!(voices.define_voice("Tenor", &mut tune, &mut collector), 3);
        assert_eq!(tune.voices[&2].name, "Bass");

        // Redefinition updates in place
        assert_eq!(
            voices.define_voice("Bass clef=bass", &mut tune, &mut collector),
            2
        );
        assert_eq!(tune.voices[&2].clef, Clef::Bass);
        assert_eq!(tune.voices.len(), 3);
    }

    #[test]
    fn test_numeric_id_advances_generator() {
        let (mut voices, mut tune, mut collector) = setup();
        voices.define_voice("5", &mut tune, &mut collector);
        assert_eq!(voices.define_voice("Melody", &mut tune, &mut collector), 6);
    }

    #[test]
    fn test_explicit_id_after_auto_ids_aliases_existing_voice() {
        let (mut voices, mut tune, mut collector) = setup();
        assert_eq!(voices.define_voice("Melody", &mut tune, &mut collector), 1);
        assert_eq!(voices.define_voice("Bass", &mut tune, &mut collector), 2);

        // "2" was handed out to Bass; an explicit V:2 lands on the same voice
        assert_eq!(voices.define_voice("2 octave=-1", &mut tune, &mut collector), 2);
        assert_eq!(tune.voices.len(), 2);
        assert_eq!(tune.voices[&2].name, "Bass");
        assert_eq!(tune.voices[&2].octave, -1);
    }

    #[test]
    fn test_switch_resolution_order() {
        let (mut voices, mut tune, mut collector) = setup();
        voices.define_voice("Lead name=\"Lead Violin\" sname=Vln", &mut tune, &mut collector);

        // Renamed voice is still found through the identifier map
        assert_eq!(voices.switch_to_voice("Lead", &mut tune, &mut collector), 1);
        // Display name and short name also resolve
        assert_eq!(voices.switch_to_voice("Vln", &mut tune, &mut collector), 1);
        // Unknown names create new voices
        assert_eq!(voices.switch_to_voice("Drums", &mut tune, &mut collector), 2);
        assert_eq!(voices.current_voice(), Some(2));
    }

    #[test]
    fn test_register_external_voice() {
        let (mut voices, mut tune, mut collector) = setup();
        voices.register_external_voice("backing", 10);
        assert_eq!(voices.define_voice("Next", &mut tune, &mut collector), 11);
    }

    #[test]
    fn test_named_voice_after_highest_id_does_not_collide() {
        let (mut voices, mut tune, mut collector) = setup();
        let top = voices.define_voice("4294967295", &mut tune, &mut collector);
        assert_eq!(top, VoiceId::MAX);

        let melody = voices.define_voice("Melody", &mut tune, &mut collector);
        assert_eq!(melody, 1);
        assert_eq!(tune.voices[&VoiceId::MAX].name, "4294967295");
        assert_eq!(tune.voices[&1].name, "Melody");
        assert!(collector.feedback().is_empty());
    }

    #[test]
    fn test_auto_ids_wrap_past_taken_ids() {
        let (mut voices, mut tune, mut collector) = setup();
        voices.define_voice("4294967294", &mut tune, &mut collector);
        voices.define_voice("4294967295", &mut tune, &mut collector);
        voices.define_voice("1", &mut tune, &mut collector);

        assert_eq!(voices.define_voice("Tenor", &mut tune, &mut collector), 2);
        assert_eq!(voices.switch_to_voice("Bass", &mut tune, &mut collector), 3);
        assert_eq!(tune.voices.len(), 5);
    }

    #[test]
    fn test_ensure_current_prefers_first_defined() {
        let (mut voices, mut tune, mut collector) = setup();
        voices.define_voice("3", &mut tune, &mut collector);
        voices.define_voice("1", &mut tune, &mut collector);
        assert_eq!(voices.ensure_current(&mut tune), 3);

        let (mut voices, mut tune, _) = setup();
        assert_eq!(voices.ensure_current(&mut tune), 1);
        assert!(tune.voices.contains_key(&1));
    }

    #[test]
    fn test_timeline_cursors_are_independent() {
        let mut timeline = Timeline::new();
        timeline.save_current_time(1, Fraction::new(1, 4));
        timeline.save_current_time(2, Fraction::new(3, 8));

        assert_eq!(timeline.restore_voice_time(1), Fraction::new(1, 4));
        assert_eq!(timeline.restore_voice_time(2), Fraction::new(3, 8));
        assert_eq!(timeline.restore_voice_time(7), Fraction::ZERO);
    }

    #[test]
    fn test_attributes_with_quoted_spaces() {
        let mut voice = AbcTune::default().new_voice(1);
        let mut collector = FeedbackCollector::new();

        apply_voice_attributes(
            &mut voice,
            "name=\"Lead Violin\" clef=bass transpose=-2 octave=1 instrument=violin vel=100",
            &mut collector,
        );

        assert_eq!(voice.name, "Lead Violin");
        assert_eq!(voice.clef, Clef::Bass);
        assert_eq!(voice.transpose, -2);
        assert_eq!(voice.octave, 1);
        assert_eq!(voice.instrument, 40);
        assert_eq!(voice.velocity, 100);
        assert!(collector.feedback().is_empty());
    }

    #[test]
    fn test_unterminated_quote_consumes_rest() {
        let mut voice = AbcTune::default().new_voice(1);
        let mut collector = FeedbackCollector::new();

        apply_voice_attributes(&mut voice, "name=\"Lead Violin clef=bass", &mut collector);

        assert_eq!(voice.name, "Lead Violin clef=bass");
        assert_eq!(voice.clef, Clef::Treble);
        assert_eq!(collector.feedback().len(), 1);
    }

    #[test]
    fn test_bare_words_and_bad_values() {
        let mut voice = AbcTune::default().new_voice(1);
        let mut collector = FeedbackCollector::new();

        apply_voice_attributes(&mut voice, "perc mute clef=weird program=theremin", &mut collector);

        assert_eq!(voice.clef, Clef::Percussion);
        assert!(voice.muted);
        assert_eq!(voice.instrument, 0);
        assert_eq!(collector.feedback().len(), 2);
        assert!(!collector.has_errors());
    }
}
