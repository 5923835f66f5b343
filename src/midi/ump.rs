//! MIDI 2.0 Clip output in a ktmidi-style container.
//!
//! Container layout: 16-byte magic, a 32-bit tick resolution (ticks per
//! quarter), a 32-bit track count, then one `SMF2CLIP` packet stream per
//! track.  Notes travel as MIDI 1.0 Channel Voice UMPs with Delta
//! Clockstamps; tempo and time signature as Flex Data; metadata as SysEx8;
//! each clip is bracketed by Start/End of Clip stream messages.

use crate::params::GeneratorParams;
use crate::pitch::transpose_pitch;
use crate::types::{
    Key, NoteEvent, NoteSource, Song, Tick, Track, TrackRole, MICROSECONDS_PER_MINUTE,
    TICKS_PER_BEAT,
};
use crate::midi::writer::{channel_for, program_for, METADATA_PREFIX};

/// Container magic: 16 bytes.
pub const CONTAINER_MAGIC: &[u8; 16] = b"AAAAAAAAEEEEEEEE";
/// Per-track clip magic: 8 bytes.
pub const CLIP_MAGIC: &[u8; 8] = b"SMF2CLIP";

/// UMP message types (high nibble of the first word).
const MT_UTILITY: u32 = 0x0;
const MT_MIDI1_CHANNEL_VOICE: u32 = 0x2;
const MT_SYSEX8: u32 = 0x5;
const MT_FLEX_DATA: u32 = 0xD;
const MT_STREAM: u32 = 0xF;

/// Stream message statuses.
const STREAM_DCTPQ: u32 = 0x00;
const STREAM_START_OF_CLIP: u32 = 0x20;
const STREAM_END_OF_CLIP: u32 = 0x21;

pub fn write_u32_be(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// `[MT=2][group][0x9][channel][note][velocity]`
pub fn make_note_on(group: u8, channel: u8, note: u8, velocity: u8) -> u32 {
    (MT_MIDI1_CHANNEL_VOICE << 28)
        | ((group as u32 & 0x0F) << 24)
        | (0x9 << 20)
        | ((channel as u32 & 0x0F) << 16)
        | ((note as u32 & 0x7F) << 8)
        | (velocity as u32 & 0x7F)
}

/// `[MT=2][group][0x8][channel][note][velocity]`
pub fn make_note_off(group: u8, channel: u8, note: u8, velocity: u8) -> u32 {
    (MT_MIDI1_CHANNEL_VOICE << 28)
        | ((group as u32 & 0x0F) << 24)
        | (0x8 << 20)
        | ((channel as u32 & 0x0F) << 16)
        | ((note as u32 & 0x7F) << 8)
        | (velocity as u32 & 0x7F)
}

/// `[MT=2][group][0xC][channel][program][0]`
pub fn make_program_change(group: u8, channel: u8, program: u8) -> u32 {
    (MT_MIDI1_CHANNEL_VOICE << 28)
        | ((group as u32 & 0x0F) << 24)
        | (0xC << 20)
        | ((channel as u32 & 0x0F) << 16)
        | ((program as u32 & 0x7F) << 8)
}

/// Delta Clockstamp: `[MT=0][group][status=4][ticks:16]`.
pub fn make_delta_clockstamp(group: u8, ticks: u16) -> u32 {
    (MT_UTILITY << 28) | ((group as u32 & 0x0F) << 24) | (0x4 << 20) | ticks as u32
}

/// Write a delta, splitting anything above 16 bits across multiple DCS
/// messages.  A zero delta still writes one DCS.
pub fn write_delta_clockstamp(buf: &mut Vec<u8>, group: u8, mut ticks: u32) {
    while ticks > 0xFFFF {
        write_u32_be(buf, make_delta_clockstamp(group, 0xFFFF));
        ticks -= 0xFFFF;
    }
    write_u32_be(buf, make_delta_clockstamp(group, ticks as u16));
}

/// DCTPQ stream message (128-bit): ticks per quarter in word 1.
pub fn write_dctpq(buf: &mut Vec<u8>, ticks_per_quarter: u16) {
    write_u32_be(buf, (MT_STREAM << 28) | (STREAM_DCTPQ << 16));
    write_u32_be(buf, (ticks_per_quarter as u32) << 16);
    write_u32_be(buf, 0);
    write_u32_be(buf, 0);
}

pub fn write_start_of_clip(buf: &mut Vec<u8>) {
    write_u32_be(buf, (MT_STREAM << 28) | (STREAM_START_OF_CLIP << 16));
    write_u32_be(buf, 0);
    write_u32_be(buf, 0);
    write_u32_be(buf, 0);
}

pub fn write_end_of_clip(buf: &mut Vec<u8>) {
    write_u32_be(buf, (MT_STREAM << 28) | (STREAM_END_OF_CLIP << 16));
    write_u32_be(buf, 0);
    write_u32_be(buf, 0);
    write_u32_be(buf, 0);
}

/// Flex Data Set Tempo (status bank 0, status 0): word 1 carries the tempo
/// as 10-nanosecond units per quarter note.
pub fn write_tempo(buf: &mut Vec<u8>, group: u8, micros_per_quarter: u32) {
    write_u32_be(
        buf,
        (MT_FLEX_DATA << 28) | ((group as u32 & 0x0F) << 24) | 0x10_00_00,
    );
    write_u32_be(buf, micros_per_quarter.saturating_mul(100));
    write_u32_be(buf, 0);
    write_u32_be(buf, 0);
}

/// Flex Data Set Time Signature (status bank 0, status 1).
pub fn write_time_signature(buf: &mut Vec<u8>, group: u8, numerator: u8, denominator: u8) {
    write_u32_be(
        buf,
        (MT_FLEX_DATA << 28) | ((group as u32 & 0x0F) << 24) | 0x10_00_01,
    );
    write_u32_be(buf, ((numerator as u32) << 24) | ((denominator as u32) << 16));
    write_u32_be(buf, 0);
    write_u32_be(buf, 0);
}

/// Metadata text as a SysEx8 packet run: 13 payload bytes per 128-bit
/// packet, with start/continue/end framing (or a single complete packet).
pub fn write_metadata_text(buf: &mut Vec<u8>, group: u8, text: &str) {
    let bytes = text.as_bytes();
    let chunks: Vec<&[u8]> = bytes.chunks(13).collect();
    let total = chunks.len();
    for (i, chunk) in chunks.iter().enumerate() {
        // Status: 0 complete, 1 start, 2 continue, 3 end.
        let status: u32 = if total == 1 {
            0
        } else if i == 0 {
            1
        } else if i + 1 == total {
            3
        } else {
            2
        };
        let mut words = [0u32; 4];
        // Word 0: type, group, status, byte count (incl. stream id),
        // stream id 0, and the first payload byte.
        words[0] = (MT_SYSEX8 << 28)
            | ((group as u32 & 0x0F) << 24)
            | (status << 20)
            | (((chunk.len() as u32) + 1) << 16);
        for (k, &b) in chunk.iter().enumerate() {
            if k == 0 {
                words[0] |= b as u32;
            } else {
                let idx = k - 1;
                let word = 1 + idx / 4;
                let shift = 24 - (idx % 4) * 8;
                words[word] |= (b as u32) << shift;
            }
        }
        for word in words {
            write_u32_be(buf, word);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Clip assembly
// ═══════════════════════════════════════════════════════════════════════

fn write_clip_config(buf: &mut Vec<u8>, bpm: u16) {
    write_delta_clockstamp(buf, 0, 0);
    write_dctpq(buf, TICKS_PER_BEAT as u16);
    if bpm > 0 {
        write_delta_clockstamp(buf, 0, 0);
        write_tempo(buf, 0, MICROSECONDS_PER_MINUTE / bpm as u32);
    }
    write_delta_clockstamp(buf, 0, 0);
    write_time_signature(buf, 0, 4, 4);
    write_delta_clockstamp(buf, 0, 0);
    write_start_of_clip(buf);
}

fn write_track_clip(
    buf: &mut Vec<u8>,
    track: &Track,
    bpm: u16,
    key: Key,
    mod_tick: Tick,
    mod_amount: i8,
    metadata: Option<&str>,
) {
    buf.extend_from_slice(CLIP_MAGIC);
    write_clip_config(buf, bpm);

    let role = track.role();
    let channel = channel_for(role);
    let group = 0u8;

    if let Some(meta) = metadata {
        write_delta_clockstamp(buf, group, 0);
        write_metadata_text(buf, group, &format!("{METADATA_PREFIX}{meta}"));
    }

    if channel != 9 {
        write_delta_clockstamp(buf, group, 0);
        write_u32_be(buf, make_program_change(group, channel, program_for(role)));
    }

    // Flatten notes to on/off events; offs sort before ons at equal time
    // so same-pitch re-attacks close cleanly.
    struct Event {
        time: Tick,
        on: bool,
        pitch: u8,
        velocity: u8,
    }
    let mut events: Vec<Event> = Vec::with_capacity(track.len() * 2);
    for note in track.notes() {
        let mut pitch = note.pitch;
        if channel != 9 {
            pitch = transpose_pitch(pitch, key);
            if mod_tick > 0 && note.start_tick >= mod_tick && mod_amount != 0 {
                pitch = (pitch as i32 + mod_amount as i32).clamp(0, 127) as u8;
            }
        }
        events.push(Event {
            time: note.start_tick,
            on: true,
            pitch,
            velocity: note.velocity,
        });
        events.push(Event {
            time: note.end_tick(),
            on: false,
            pitch,
            velocity: 0,
        });
    }
    events.sort_by_key(|e| (e.time, e.on));

    let mut prev_time: Tick = 0;
    for event in &events {
        write_delta_clockstamp(buf, group, event.time - prev_time);
        prev_time = event.time;
        let word = if event.on {
            make_note_on(group, channel, event.pitch, event.velocity)
        } else {
            make_note_off(group, channel, event.pitch, event.velocity)
        };
        write_u32_be(buf, word);
    }

    write_delta_clockstamp(buf, group, 0);
    write_end_of_clip(buf);
}

/// Write the full song as a MIDI 2.0 container.
pub fn write_song_midi2(song: &Song, params: &GeneratorParams) -> Vec<u8> {
    let metadata = serde_json::json!({
        "seed": song.seed(),
        "bpm": song.bpm(),
        "chord_id": params.chord_id,
        "key": params.key,
    })
    .to_string();

    let tracks: Vec<&Track> = [
        song.vocal(),
        song.chord(),
        song.bass(),
        song.motif(),
        song.arpeggio(),
        song.aux(),
        song.drums(),
    ]
    .into_iter()
    .filter(|t| !t.is_empty())
    .collect();

    let mut buf = Vec::new();
    buf.extend_from_slice(CONTAINER_MAGIC);
    write_u32_be(&mut buf, TICKS_PER_BEAT);
    write_u32_be(&mut buf, tracks.len() as u32);

    for (i, track) in tracks.iter().enumerate() {
        let metadata = if i == 0 { Some(metadata.as_str()) } else { None };
        write_track_clip(
            &mut buf,
            track,
            song.bpm(),
            params.key,
            song.modulation_tick(),
            song.modulation_amount(),
            metadata,
        );
    }
    buf
}

// ═══════════════════════════════════════════════════════════════════════
// Reader
// ═══════════════════════════════════════════════════════════════════════

/// Notes recovered from one clip.
#[derive(Debug, Clone, Default)]
pub struct ParsedClip {
    pub channel: u8,
    pub program: u8,
    pub notes: Vec<NoteEvent>,
}

/// Parse a container written by `write_song_midi2` back into note lists.
/// Unknown packet types are skipped by their declared length.
pub fn read_song_midi2(data: &[u8]) -> Option<Vec<ParsedClip>> {
    if data.len() < 24 || &data[..16] != CONTAINER_MAGIC {
        return None;
    }
    let num_tracks = u32::from_be_bytes([data[20], data[21], data[22], data[23]]) as usize;
    let mut clips = Vec::with_capacity(num_tracks);

    let mut offset = 24usize;
    for _ in 0..num_tracks {
        if offset + 8 > data.len() || &data[offset..offset + 8] != CLIP_MAGIC {
            return None;
        }
        offset += 8;

        let mut clip = ParsedClip::default();
        let mut current_tick: Tick = 0;
        let mut active: std::collections::BTreeMap<u8, (Tick, u8)> = Default::default();

        loop {
            if offset + 4 > data.len() {
                break;
            }
            let word = u32::from_be_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ]);
            let mt = word >> 28;
            let words = match mt {
                0x0..=0x2 | 0x6..=0x7 => 1,
                0x3 | 0x8..=0xA => 2,
                0x4 => 2,
                _ => 4,
            };
            let packet_len = words * 4;
            if offset + packet_len > data.len() {
                break;
            }

            match mt {
                MT_UTILITY => {
                    if (word >> 20) & 0xF == 0x4 {
                        current_tick += word & 0xFFFF;
                    }
                }
                MT_MIDI1_CHANNEL_VOICE => {
                    let status = (word >> 20) & 0xF;
                    let channel = ((word >> 16) & 0xF) as u8;
                    let pitch = ((word >> 8) & 0x7F) as u8;
                    let velocity = (word & 0x7F) as u8;
                    clip.channel = channel;
                    match status {
                        0x9 if velocity > 0 => {
                            active.insert(pitch, (current_tick, velocity));
                        }
                        0x8 | 0x9 => {
                            if let Some((start, vel)) = active.remove(&pitch) {
                                clip.notes.push(NoteEvent {
                                    start_tick: start,
                                    duration: (current_tick - start).max(1),
                                    pitch,
                                    velocity: vel,
                                    source: NoteSource::Unknown,
                                    original_pitch: pitch,
                                    chord_degree: -1,
                                    lookup_tick: start,
                                });
                            }
                        }
                        0xC => clip.program = pitch,
                        _ => {}
                    }
                }
                MT_STREAM => {
                    let status = (word >> 16) & 0x3FF;
                    if status == STREAM_END_OF_CLIP {
                        offset += packet_len;
                        break;
                    }
                }
                _ => {}
            }
            offset += packet_len;
        }

        clip.notes.sort_by_key(|n| (n.start_tick, n.pitch));
        clips.push(clip);
    }

    Some(clips)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmony::HarmonyContext;
    use crate::note::create_note;

    #[test]
    fn delta_clockstamp_splits_large_values() {
        let mut buf = Vec::new();
        write_delta_clockstamp(&mut buf, 0, 70_000);
        // 70000 = 65535 + 4465: two DCS words.
        assert_eq!(buf.len(), 8);
        let first = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let second = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        assert_eq!(first & 0xFFFF, 0xFFFF);
        assert_eq!(second & 0xFFFF, 70_000 - 0xFFFF);
    }

    #[test]
    fn note_on_word_layout() {
        let word = make_note_on(0, 2, 60, 100);
        assert_eq!(word >> 28, 0x2);
        assert_eq!((word >> 20) & 0xF, 0x9);
        assert_eq!((word >> 16) & 0xF, 2);
        assert_eq!((word >> 8) & 0x7F, 60);
        assert_eq!(word & 0x7F, 100);
    }

    #[test]
    fn container_round_trip() {
        let mut song = Song::new();
        let harmony = HarmonyContext::new();
        song.bass_mut()
            .add_note(create_note(&harmony, 0, 480, 48, 90, NoteSource::BassPattern));
        song.bass_mut()
            .add_note(create_note(&harmony, 480, 480, 55, 85, NoteSource::BassPattern));
        let params = GeneratorParams::default();

        let bytes = write_song_midi2(&song, &params);
        assert_eq!(&bytes[..16], CONTAINER_MAGIC);

        let clips = read_song_midi2(&bytes).expect("parse container");
        assert_eq!(clips.len(), 1);
        let notes = &clips[0].notes;
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].pitch, 48);
        assert_eq!(notes[0].duration, 480);
        assert_eq!(notes[1].start_tick, 480);
        assert_eq!(notes[1].velocity, 85);
    }

    #[test]
    fn long_gap_round_trip() {
        let mut song = Song::new();
        let harmony = HarmonyContext::new();
        // Start beyond the 16-bit DCS limit to force a split.
        song.vocal_mut()
            .add_note(create_note(&harmony, 100_000, 480, 72, 90, NoteSource::MelodyPhrase));
        let params = GeneratorParams::default();
        let bytes = write_song_midi2(&song, &params);
        let clips = read_song_midi2(&bytes).expect("parse container");
        assert_eq!(clips[0].notes[0].start_tick, 100_000);
    }
}
