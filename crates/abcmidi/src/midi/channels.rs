//! MIDI channel allocation.

use std::collections::BTreeMap;

use crate::model::VoiceId;

/// General MIDI percussion channel (channel 10 in 1-based numbering)
pub const PERCUSSION_CHANNEL: u8 = 9;

/// Channel that voices share once every melodic channel is taken
pub const FALLBACK_CHANNEL: u8 = 0;

/// First-fit allocator over the 15 melodic channels.
///
/// Lives for one generation run. Channel 9 is only ever handed out through
/// [`ChannelManager::assign_percussion`].
#[derive(Debug, Default)]
pub struct ChannelManager {
    assigned: BTreeMap<VoiceId, u8>,
    in_use: [bool; 16],
    /// Voices that got [`FALLBACK_CHANNEL`] because nothing was free
    shared: Vec<VoiceId>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel for a melodic voice. Repeated calls for one voice agree.
    ///
    /// When all 15 melodic channels are taken the voice shares channel 0.
    pub fn assign(&mut self, voice: VoiceId) -> u8 {
        if let Some(&channel) = self.assigned.get(&voice) {
            return channel;
        }

        let free = (0..16u8)
            .filter(|&c| c != PERCUSSION_CHANNEL)
            .find(|&c| !self.in_use[c as usize]);

        let channel = match free {
            Some(channel) => {
                self.in_use[channel as usize] = true;
                channel
            }
            None => {
                tracing::warn!(
                    voice,
                    "all melodic MIDI channels in use, sharing channel {}",
                    FALLBACK_CHANNEL
                );
                self.shared.push(voice);
                FALLBACK_CHANNEL
            }
        };

        self.assigned.insert(voice, channel);
        channel
    }

    /// Percussion voices all play on channel 9.
    pub fn assign_percussion(&mut self, voice: VoiceId) -> u8 {
        self.assigned.insert(voice, PERCUSSION_CHANNEL);
        PERCUSSION_CHANNEL
    }

    pub fn channel_for(&self, voice: VoiceId) -> Option<u8> {
        self.assigned.get(&voice).copied()
    }

    /// Voices sharing the fallback channel, in assignment order
    pub fn shared_voices(&self) -> &[VoiceId] {
        &self.shared
    }
}
