//! Standard MIDI File (SMF Type 1) generation from a Song.
//!
//! Produces raw bytes.  Track 0 is the conductor/SE track carrying tempo,
//! time signature, section markers, and the embedded `MIDISKETCH:` JSON
//! metadata.  Key transposition and modulation are applied here, at
//! emission time only — internal pitches stay in C major.
//!
//! Each track is assembled through a `TrackChunk`: events are collected in
//! absolute time and delta-encoded when the chunk renders, so generators
//! never think about running deltas.

use crate::params::GeneratorParams;
use crate::pitch::transpose_pitch;
use crate::types::{
    Key, Song, Tick, Track, TrackRole, MICROSECONDS_PER_MINUTE, TICKS_PER_BEAT,
};

/// Text-event prefix that marks the embedded metadata.
pub const METADATA_PREFIX: &str = "MIDISKETCH:";

/// Channel assignment per track role.
pub fn channel_for(role: TrackRole) -> u8 {
    match role {
        TrackRole::Vocal => 0,
        TrackRole::Chord => 1,
        TrackRole::Bass => 2,
        TrackRole::Motif => 3,
        TrackRole::Arpeggio => 4,
        TrackRole::Aux => 5,
        TrackRole::Drums => 9,
        TrackRole::Se => 0,
    }
}

/// GM program per track role.
pub fn program_for(role: TrackRole) -> u8 {
    match role {
        TrackRole::Vocal => 0,      // Acoustic Grand Piano
        TrackRole::Chord => 4,      // Electric Piano 1
        TrackRole::Bass => 33,      // Electric Bass (finger)
        TrackRole::Motif => 81,     // Synth Lead (sawtooth)
        TrackRole::Arpeggio => 81,  // Synth Lead (sawtooth)
        TrackRole::Aux => 89,       // Pad 2 (warm)
        TrackRole::Drums => 0,      // Standard kit (ignored on channel 9)
        TrackRole::Se => 0,
    }
}

/// Append a variable-length quantity: big-endian 7-bit groups, with the
/// continuation bit set on every group except the last.  Emits the groups
/// top-down, skipping leading zero groups.
pub fn push_vlq(out: &mut Vec<u8>, value: u32) {
    let mut shift = 28u32;
    while shift > 0 && (value >> shift) & 0x7F == 0 {
        shift -= 7;
    }
    while shift > 0 {
        out.push((((value >> shift) & 0x7F) as u8) | 0x80);
        shift -= 7;
    }
    out.push((value & 0x7F) as u8);
}

/// A complete meta event: 0xFF, type, VLQ length, payload.
fn meta_bytes(kind: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0xFF, kind];
    push_vlq(&mut bytes, payload.len() as u32);
    bytes.extend_from_slice(payload);
    bytes
}

/// One MTrk chunk under construction.
///
/// Events carry an absolute tick plus a tiebreak rank for equal ticks
/// (note-offs and meta events at rank 0 precede note-ons at rank 1, so a
/// same-pitch re-attack closes the old note first).  `render` sorts,
/// delta-encodes against a running cursor, and closes the chunk.
struct TrackChunk {
    name: String,
    events: Vec<(Tick, u8, Vec<u8>)>,
}

impl TrackChunk {
    fn new(name: &str) -> TrackChunk {
        TrackChunk {
            name: name.to_string(),
            events: Vec::new(),
        }
    }

    fn at(&mut self, tick: Tick, rank: u8, bytes: Vec<u8>) {
        self.events.push((tick, rank, bytes));
    }

    fn render(mut self) -> Vec<u8> {
        self.events.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut chunk = Vec::with_capacity(self.events.len() * 5 + 32);

        // The chunk opens with its name at delta zero.
        chunk.push(0);
        chunk.extend(meta_bytes(0x03, self.name.as_bytes()));

        let mut cursor: Tick = 0;
        for (tick, _, bytes) in &self.events {
            push_vlq(&mut chunk, tick.saturating_sub(cursor));
            cursor = *tick;
            chunk.extend_from_slice(bytes);
        }

        // End-of-track is itself a meta event at delta zero.
        chunk.push(0);
        chunk.extend(meta_bytes(0x2F, &[]));
        chunk
    }
}

/// Wrap rendered chunks into a format-1 file: the MThd header followed by
/// one length-prefixed MTrk per chunk.
fn assemble_file(chunks: Vec<Vec<u8>>) -> Vec<u8> {
    let total: usize = chunks.iter().map(|c| c.len() + 8).sum();
    let mut file = Vec::with_capacity(14 + total);

    file.extend_from_slice(b"MThd");
    file.extend_from_slice(&6u32.to_be_bytes());
    for field in [1u16, chunks.len() as u16, TICKS_PER_BEAT as u16] {
        file.extend_from_slice(&field.to_be_bytes());
    }

    for chunk in chunks {
        file.extend_from_slice(b"MTrk");
        file.extend_from_slice(&(chunk.len() as u32).to_be_bytes());
        file.extend(chunk);
    }
    file
}

/// Conductor track: tempo, 4/4 time signature, metadata, section markers.
fn conductor_chunk(song: &Song, metadata: &str) -> Vec<u8> {
    let mut chunk = TrackChunk::new("SE");

    // Tempo is the low three bytes of microseconds-per-quarter.
    let uspq = MICROSECONDS_PER_MINUTE / song.bpm().max(1) as u32;
    chunk.at(0, 0, meta_bytes(0x51, &uspq.to_be_bytes()[1..]));

    // 4/4, metronome every beat, 8 32nds per quarter.
    chunk.at(0, 0, meta_bytes(0x58, &[4, 2, 24, 8]));

    chunk.at(
        0,
        0,
        meta_bytes(0x01, format!("{METADATA_PREFIX}{metadata}").as_bytes()),
    );

    for marker in song.se().text_events() {
        chunk.at(marker.tick, 0, meta_bytes(0x01, marker.text.as_bytes()));
    }

    chunk.render()
}

/// Emission pitch: key transposition plus modulation for notes at or past
/// the modulation tick.  Drums pass through untouched.
fn emitted_pitch(pitch: u8, role: TrackRole, key: Key, mod_tick: Tick, mod_amount: i8, start: Tick) -> u8 {
    if role == TrackRole::Drums {
        return pitch;
    }
    let mut p = transpose_pitch(pitch, key);
    if mod_tick > 0 && start >= mod_tick && mod_amount != 0 {
        p = (p as i32 + mod_amount as i32).clamp(0, 127) as u8;
    }
    p
}

/// Encode one instrument track.
fn instrument_chunk(track: &Track, key: Key, mod_tick: Tick, mod_amount: i8) -> Vec<u8> {
    let role = track.role();
    let channel = channel_for(role);
    let mut chunk = TrackChunk::new(role.name());

    if channel != 9 {
        chunk.at(0, 0, vec![0xC0 | channel, program_for(role)]);
    }

    for note in track.notes() {
        let pitch = emitted_pitch(note.pitch, role, key, mod_tick, mod_amount, note.start_tick);
        chunk.at(note.start_tick, 1, vec![0x90 | channel, pitch, note.velocity.max(1)]);
        chunk.at(note.end_tick(), 0, vec![0x80 | channel, pitch, 0]);
    }

    chunk.render()
}

/// Write a complete song to SMF Type 1 bytes.
///
/// Tracks are emitted in a fixed order (SE, Vocal, Chord, Bass, Motif,
/// Arpeggio, Aux, Drums); empty instrument tracks are skipped.
pub fn write_song(song: &Song, params: &GeneratorParams) -> Vec<u8> {
    let metadata = serde_json::json!({
        "seed": song.seed(),
        "bpm": song.bpm(),
        "chord_id": params.chord_id,
        "key": params.key,
        "mood": params.mood,
        "modulation_tick": song.modulation_tick(),
        "modulation_amount": song.modulation_amount(),
    })
    .to_string();

    let mod_tick = song.modulation_tick();
    let mod_amount = song.modulation_amount();

    let mut chunks: Vec<Vec<u8>> = Vec::new();
    chunks.push(conductor_chunk(song, &metadata));
    for track in [
        song.vocal(),
        song.chord(),
        song.bass(),
        song.motif(),
        song.arpeggio(),
        song.aux(),
        song.drums(),
    ] {
        if track.is_empty() {
            continue;
        }
        chunks.push(instrument_chunk(track, params.key, mod_tick, mod_amount));
    }

    assemble_file(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::create_note;
    use crate::harmony::HarmonyContext;
    use crate::midi::reader::read_vlq;
    use crate::types::{NoteSource, TICKS_PER_BAR, TICKS_PER_BEAT, TICK_HALF};

    #[test]
    fn vlq_handles_song_scale_deltas() {
        // Deltas that actually separate events in a generated song: a beat,
        // a half-bar chord split, a bar, and the silence across an 8-bar
        // instrumental section.  All must round-trip through the reader.
        for delta in [TICKS_PER_BEAT, TICK_HALF, TICKS_PER_BAR, 8 * TICKS_PER_BAR] {
            let mut encoded = Vec::new();
            push_vlq(&mut encoded, delta);
            assert!(encoded.len() >= 2, "delta {delta} needs a continuation");
            // Every byte but the last carries the continuation bit.
            for &byte in &encoded[..encoded.len() - 1] {
                assert!(byte & 0x80 != 0);
            }
            assert!(encoded[encoded.len() - 1] & 0x80 == 0);
            let mut offset = 0;
            assert_eq!(read_vlq(&encoded, &mut offset), delta);
            assert_eq!(offset, encoded.len());
        }

        // Sub-128 deltas (adjacent voices of one chord hit, a 32nd step)
        // stay single-byte so dense bars do not bloat the file.
        for delta in [0u32, 30, 60, 127] {
            let mut encoded = Vec::new();
            push_vlq(&mut encoded, delta);
            assert_eq!(encoded, vec![delta as u8]);
        }
    }

    #[test]
    fn chunk_orders_offs_before_ons_at_equal_ticks() {
        let mut chunk = TrackChunk::new("T");
        chunk.at(480, 1, vec![0x90, 60, 80]);
        chunk.at(480, 0, vec![0x80, 60, 0]);
        let bytes = chunk.render();
        let off = bytes.windows(3).position(|w| w == [0x80, 60, 0]);
        let on = bytes.windows(3).position(|w| w == [0x90, 60, 80]);
        assert!(off.unwrap() < on.unwrap());
    }

    #[test]
    fn smf_header_valid() {
        let song = Song::new();
        let params = GeneratorParams::default();
        let smf = write_song(&song, &params);
        assert_eq!(&smf[0..4], b"MThd");
        assert_eq!(&smf[8..10], &1u16.to_be_bytes());
        assert_eq!(&smf[12..14], &(TICKS_PER_BEAT as u16).to_be_bytes());
        assert!(smf.windows(4).any(|w| w == b"MTrk"));
    }

    #[test]
    fn metadata_text_event_embedded() {
        let song = Song::new();
        let params = GeneratorParams::default();
        let smf = write_song(&song, &params);
        let needle = METADATA_PREFIX.as_bytes();
        assert!(
            smf.windows(needle.len()).any(|w| w == needle),
            "metadata prefix missing"
        );
    }

    #[test]
    fn modulation_applied_at_emission() {
        let mut song = Song::new();
        let harmony = HarmonyContext::new();
        song.set_modulation(960, 2);
        song.vocal_mut()
            .add_note(create_note(&harmony, 0, 480, 60, 90, NoteSource::MelodyPhrase));
        song.vocal_mut()
            .add_note(create_note(&harmony, 960, 480, 60, 90, NoteSource::MelodyPhrase));
        let params = GeneratorParams::default();
        let smf = write_song(&song, &params);

        let parsed = crate::midi::reader::read_smf(&smf).unwrap();
        let vocal = parsed.get_track("Vocal").unwrap();
        assert_eq!(vocal.notes[0].pitch, 60);
        assert_eq!(vocal.notes[1].pitch, 62);
    }

    #[test]
    fn drums_exempt_from_transposition() {
        let mut song = Song::new();
        let harmony = HarmonyContext::new();
        song.drums_mut()
            .add_note(create_note(&harmony, 0, 120, 36, 100, NoteSource::Drums));
        let params = GeneratorParams {
            key: crate::types::Key::E,
            ..Default::default()
        };
        let smf = write_song(&song, &params);
        let parsed = crate::midi::reader::read_smf(&smf).unwrap();
        let drums = parsed.get_track("Drums").unwrap();
        assert_eq!(drums.notes[0].pitch, 36);
        assert_eq!(drums.channel, 9);
    }
}
