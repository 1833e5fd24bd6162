//! General MIDI program names.

/// General MIDI level 1 program names, indexed by program number.
pub const GM_PROGRAMS: [&str; 128] = [
    "Acoustic Grand Piano",
    "Bright Acoustic Piano",
    "Electric Grand Piano",
    "Honky-tonk Piano",
    "Electric Piano 1",
    "Electric Piano 2",
    "Harpsichord",
    "Clavinet",
    "Celesta",
    "Glockenspiel",
    "Music Box",
    "Vibraphone",
    "Marimba",
    "Xylophone",
    "Tubular Bells",
    "Dulcimer",
    "Drawbar Organ",
    "Percussive Organ",
    "Rock Organ",
    "Church Organ",
    "Reed Organ",
    "Accordion",
    "Harmonica",
    "Tango Accordion",
    "Acoustic Guitar (nylon)",
    "Acoustic Guitar (steel)",
    "Electric Guitar (jazz)",
    "Electric Guitar (clean)",
    "Electric Guitar (muted)",
    "Overdriven Guitar",
    "Distortion Guitar",
    "Guitar Harmonics",
    "Acoustic Bass",
    "Electric Bass (finger)",
    "Electric Bass (pick)",
    "Fretless Bass",
    "Slap Bass 1",
    "Slap Bass 2",
    "Synth Bass 1",
    "Synth Bass 2",
    "Violin",
    "Viola",
    "Cello",
    "Contrabass",
    "Tremolo Strings",
    "Pizzicato Strings",
    "Orchestral Harp",
    "Timpani",
    "String Ensemble 1",
    "String Ensemble 2",
    "Synth Strings 1",
    "Synth Strings 2",
    "Choir Aahs",
    "Voice Oohs",
    "Synth Voice",
    "Orchestra Hit",
    "Trumpet",
    "Trombone",
    "Tuba",
    "Muted Trumpet",
    "French Horn",
    "Brass Section",
    "Synth Brass 1",
    "Synth Brass 2",
    "Soprano Sax",
    "Alto Sax",
    "Tenor Sax",
    "Baritone Sax",
    "Oboe",
    "English Horn",
    "Bassoon",
    "Clarinet",
    "Piccolo",
    "Flute",
    "Recorder",
    "Pan Flute",
    "Blown Bottle",
    "Shakuhachi",
    "Whistle",
    "Ocarina",
    "Lead 1 (square)",
    "Lead 2 (sawtooth)",
    "Lead 3 (calliope)",
    "Lead 4 (chiff)",
    "Lead 5 (charang)",
    "Lead 6 (voice)",
    "Lead 7 (fifths)",
    "Lead 8 (bass + lead)",
    "Pad 1 (new age)",
    "Pad 2 (warm)",
    "Pad 3 (polysynth)",
    "Pad 4 (choir)",
    "Pad 5 (bowed)",
    "Pad 6 (metallic)",
    "Pad 7 (halo)",
    "Pad 8 (sweep)",
    "FX 1 (rain)",
    "FX 2 (soundtrack)",
    "FX 3 (crystal)",
    "FX 4 (atmosphere)",
    "FX 5 (brightness)",
    "FX 6 (goblins)",
    "FX 7 (echoes)",
    "FX 8 (sci-fi)",
    "Sitar",
    "Banjo",
    "Shamisen",
    "Koto",
    "Kalimba",
    "Bagpipe",
    "Fiddle",
    "Shanai",
    "Tinkle Bell",
    "Agogo",
    "Steel Drums",
    "Woodblock",
    "Taiko Drum",
    "Melodic Tom",
    "Synth Drum",
    "Reverse Cymbal",
    "Guitar Fret Noise",
    "Breath Noise",
    "Seashore",
    "Bird Tweet",
    "Telephone Ring",
    "Helicopter",
    "Applause",
    "Gunshot",
];

/// Short names people actually type in `V:` lines
const ALIASES: &[(&str, u8)] = &[
    ("piano", 0),
    ("organ", 19),
    ("guitar", 24),
    ("bass", 32),
    ("strings", 48),
    ("choir", 52),
    ("sax", 65),
    ("horn", 60),
];

/// Resolve a program number or instrument name.
///
/// Names match case-insensitively, ignoring spaces, hyphens, underscores and
/// parentheses, so `acoustic_grand_piano` and `Acoustic Grand Piano` agree.
pub fn lookup(value: &str) -> Option<u8> {
    let value = value.trim();
    if let Ok(n) = value.parse::<u8>() {
        return (n < 128).then_some(n);
    }

    let wanted = normalize(value);
    if wanted.is_empty() {
        return None;
    }

    GM_PROGRAMS
        .iter()
        .position(|name| normalize(name) == wanted)
        .map(|idx| idx as u8)
        .or_else(|| {
            ALIASES
                .iter()
                .find(|(alias, _)| *alias == wanted)
                .map(|(_, program)| *program)
        })
}

/// Display name for a program number
pub fn name(program: u8) -> &'static str {
    GM_PROGRAMS[(program & 0x7F) as usize]
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '+')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_number() {
        assert_eq!(lookup("0"), Some(0));
        assert_eq!(lookup("73"), Some(73));
        assert_eq!(lookup("128"), None);
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(lookup("Violin"), Some(40));
        assert_eq!(lookup("string ensemble 1"), Some(48));
        assert_eq!(lookup("acoustic_grand_piano"), Some(0));
        assert_eq!(lookup("Acoustic Guitar (nylon)"), Some(24));
        assert_eq!(lookup("flute"), Some(73));
        assert_eq!(lookup("piano"), Some(0));
        assert_eq!(lookup("theremin"), None);
    }

    #[test]
    fn test_name() {
        assert_eq!(name(48), "String Ensemble 1");
        assert_eq!(name(127), "Gunshot");
    }
}
