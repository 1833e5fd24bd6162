//! Standard MIDI File (format 1) serialization.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

use super::{MetaEvent, MidiEvent, MidiEventKind, MidiTrack};

/// Largest delta a variable-length quantity can carry
const MAX_DELTA: u64 = 0x0FFF_FFFF;

/// Empty Text events that may bridge one gap; anything longer is cut short
const MAX_SPACERS: u64 = 256;

/// Serialize tracks as a format 1 SMF.
///
/// Events within a track are ordered by tick, keeping generation order for
/// ties, and every track is terminated with exactly one End-of-Track.
pub fn write_smf(tracks: &[MidiTrack], ticks_per_quarter: u16) -> Vec<u8> {
    let mut buf = Vec::new();

    buf.extend_from_slice(b"MThd");
    buf.extend_from_slice(&6u32.to_be_bytes());
    buf.extend_from_slice(&1u16.to_be_bytes()); // format 1
    buf.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    buf.extend_from_slice(&ticks_per_quarter.to_be_bytes());

    for track in tracks {
        let data = encode_track(track, ticks_per_quarter);
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&data);
    }

    buf
}

/// Write tracks to a `.mid` file.
pub fn export_midi(tracks: &[MidiTrack], ticks_per_quarter: u16, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let bytes = write_smf(tracks, ticks_per_quarter);

    let mut file = File::create(path).map_err(|source| Error::FileCreate {
        path: path.to_path_buf(),
        source,
    })?;
    file.write_all(&bytes)
        .and_then(|()| file.flush())
        .map_err(|source| Error::FileWrite {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote MIDI file");
    Ok(())
}

fn encode_track(track: &MidiTrack, ticks_per_quarter: u16) -> Vec<u8> {
    let mut events: Vec<(u64, &MidiEvent)> = track
        .events
        .iter()
        .map(|e| (e.ticks(ticks_per_quarter), e))
        .collect();
    // sort_by_key is stable, so simultaneous events keep their order
    events.sort_by_key(|(tick, _)| *tick);

    let mut data = Vec::new();
    let mut last_tick = 0u64;
    let mut end_tick = 0u64;
    let mut running_status = 0u8;

    for (tick, event) in events {
        if matches!(event.kind, MidiEventKind::Meta(MetaEvent::EndOfTrack)) {
            end_tick = end_tick.max(tick);
            continue;
        }
        write_delta(&mut data, tick - last_tick, &mut running_status);
        last_tick = tick;
        encode_event(&mut data, event, &mut running_status);
    }

    write_delta(&mut data, end_tick.saturating_sub(last_tick), &mut running_status);
    data.extend_from_slice(&[0xFF, 0x2F, 0x00]);

    data
}

/// Write a delta time. Gaps longer than one VLQ are bridged with empty Text
/// events so later events keep their absolute tick.
fn write_delta(data: &mut Vec<u8>, delta: u64, running_status: &mut u8) {
    let limit = MAX_DELTA * (MAX_SPACERS + 1);
    let mut delta = if delta > limit {
        tracing::warn!(
            ticks = delta,
            kept = limit,
            "gap too long for a MIDI file, later events move earlier"
        );
        limit
    } else {
        delta
    };

    if delta > MAX_DELTA {
        tracing::debug!(ticks = delta, "bridging long gap with spacer events");
    }
    while delta > MAX_DELTA {
        write_vlq(data, MAX_DELTA as u32);
        data.extend_from_slice(&[0xFF, 0x01, 0x00]);
        *running_status = 0;
        delta -= MAX_DELTA;
    }
    write_vlq(data, delta as u32);
}

fn encode_event(data: &mut Vec<u8>, event: &MidiEvent, running_status: &mut u8) {
    let channel = event.channel & 0x0F;
    match &event.kind {
        MidiEventKind::NoteOn { key, velocity } => {
            channel_message(data, 0x90 | channel, &[key & 0x7F, velocity & 0x7F], running_status)
        }
        MidiEventKind::NoteOff { key } => {
            channel_message(data, 0x80 | channel, &[key & 0x7F, 0], running_status)
        }
        MidiEventKind::ProgramChange { program } => {
            channel_message(data, 0xC0 | channel, &[program & 0x7F], running_status)
        }
        MidiEventKind::Meta(meta) => {
            // Running status does not survive a meta event
            *running_status = 0;
            let (event_type, payload) = meta_payload(meta);
            data.push(0xFF);
            data.push(event_type);
            write_vlq(data, payload.len() as u32);
            data.extend_from_slice(&payload);
        }
    }
}

/// Status byte is omitted when it repeats the previous channel message's
fn channel_message(data: &mut Vec<u8>, status: u8, params: &[u8], running_status: &mut u8) {
    if status != *running_status {
        data.push(status);
        *running_status = status;
    }
    data.extend_from_slice(params);
}

fn meta_payload(meta: &MetaEvent) -> (u8, Vec<u8>) {
    match meta {
        MetaEvent::Text(text) => (0x01, text.as_bytes().to_vec()),
        MetaEvent::TrackName(name) => (0x03, name.as_bytes().to_vec()),
        MetaEvent::EndOfTrack => (0x2F, Vec::new()),
        MetaEvent::Tempo { micros_per_quarter } => {
            let usec = (*micros_per_quarter).min(0x00FF_FFFF);
            (0x51, vec![(usec >> 16) as u8, (usec >> 8) as u8, usec as u8])
        }
        MetaEvent::TimeSignature {
            numerator,
            denominator_log2,
        } => (0x58, vec![*numerator, *denominator_log2, 0x18, 0x08]),
        MetaEvent::KeySignature { sharps, minor } => (0x59, vec![*sharps as u8, u8::from(*minor)]),
    }
}

fn write_vlq(buf: &mut Vec<u8>, mut value: u32) {
    if value == 0 {
        buf.push(0);
        return;
    }

    let mut bytes = Vec::new();
    bytes.push((value & 0x7F) as u8);
    value >>= 7;

    while value > 0 {
        bytes.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }

    bytes.reverse();
    buf.extend_from_slice(&bytes);
}
