//! Integration tests for MIDI output: SMF validity, byte-level
//! determinism, round-trip parsing, modulation at emission, and the
//! MIDI 2.0 container.

use pretty_assertions::assert_eq;

use songsketch::midi::{detect_format, ump, DetectedFormat};
use songsketch::params::{ModulationTiming, StructurePattern};
use songsketch::types::{Key, Mood, TrackRole};
use songsketch::{
    generate_song, read_smf, write_song, write_song_midi2, GeneratorParams, MidiReadError,
};

fn params(seed: u32) -> GeneratorParams {
    GeneratorParams {
        structure: StructurePattern::ShortForm,
        mood: Mood::StraightPop,
        seed,
        ..Default::default()
    }
}

#[test]
fn smf_output_is_structurally_valid() {
    let p = params(42);
    let song = generate_song(&p);
    let bytes = write_song(&song, &p);

    assert_eq!(&bytes[0..4], b"MThd");
    assert_eq!(u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 6);
    assert_eq!(u16::from_be_bytes([bytes[8], bytes[9]]), 1, "format 1");
    let track_count = u16::from_be_bytes([bytes[10], bytes[11]]);
    assert_eq!(u16::from_be_bytes([bytes[12], bytes[13]]), 480, "division");

    let mtrk_count = bytes.windows(4).filter(|w| *w == b"MTrk").count();
    assert_eq!(mtrk_count, track_count as usize);
    println!("✓ SMF: {} bytes, {} tracks", bytes.len(), track_count);
}

#[test]
fn determinism_at_the_byte_level() {
    let p = params(1234);
    let a = write_song(&generate_song(&p), &p);
    let b = write_song(&generate_song(&p), &p);
    assert_eq!(a, b, "same params + seed must be bitwise identical");
}

#[test]
fn round_trip_preserves_note_onsets() {
    let p = params(7);
    let song = generate_song(&p);
    let bytes = write_song(&song, &p);
    let parsed = read_smf(&bytes).expect("parse own output");

    assert_eq!(parsed.division, 480);
    assert_eq!(parsed.bpm, song.bpm());

    // Key C, no modulation: pitches should round-trip exactly.  Durations
    // of overlapping same-pitch notes may be truncated at re-attack, so
    // compare (start, pitch, velocity) multisets.
    for role in [TrackRole::Vocal, TrackRole::Bass, TrackRole::Chord] {
        let original = match role {
            TrackRole::Vocal => song.vocal(),
            TrackRole::Bass => song.bass(),
            _ => song.chord(),
        };
        let track = parsed
            .get_track(role.name())
            .unwrap_or_else(|| panic!("missing {} track", role.name()));

        let mut expected: Vec<(u32, u8, u8)> = original
            .notes()
            .iter()
            .map(|n| (n.start_tick, n.pitch, n.velocity))
            .collect();
        let mut actual: Vec<(u32, u8, u8)> = track
            .notes
            .iter()
            .map(|n| (n.start_tick, n.pitch, n.velocity))
            .collect();
        expected.sort_unstable();
        actual.sort_unstable();
        assert_eq!(expected, actual, "{} round trip", role.name());
    }
    println!("✓ round trip over {} parsed tracks", parsed.tracks.len());
}

#[test]
fn key_transposition_applied_at_emission_only() {
    let mut p = params(7);
    p.key = Key::D;
    let song = generate_song(&p);
    let bytes = write_song(&song, &p);
    let parsed = read_smf(&bytes).expect("parse");

    let bass = parsed.get_track("Bass").unwrap();
    // Internal bass pitches are C-major; emitted ones sit 2 semitones up.
    let internal_first = song.bass().notes()[0];
    let emitted_first = bass
        .notes
        .iter()
        .find(|n| n.start_tick == internal_first.start_tick)
        .unwrap();
    assert_eq!(emitted_first.pitch, internal_first.pitch + 2);

    // Drums are exempt: every internal hit appears untransposed.
    let drums = parsed.get_track("Drums").unwrap();
    let internal_drum = song.drums().notes()[0];
    assert!(drums
        .notes
        .iter()
        .any(|n| n.start_tick == internal_drum.start_tick && n.pitch == internal_drum.pitch));
}

#[test]
fn modulation_transposes_only_after_the_boundary() {
    let mut p = params(11);
    p.structure = StructurePattern::StandardPop;
    p.modulation_timing = ModulationTiming::LastChorus;
    p.modulation_semitones = 2;
    let song = generate_song(&p);
    let mod_tick = song.modulation_tick();
    assert!(mod_tick > 0);

    let bytes = write_song(&song, &p);
    let parsed = read_smf(&bytes).expect("parse");

    for (internal, name) in [(song.vocal(), "Vocal"), (song.bass(), "Bass")] {
        let emitted = parsed.get_track(name).unwrap();
        for note in internal.notes() {
            let expected = if note.start_tick >= mod_tick {
                note.pitch + 2
            } else {
                note.pitch
            };
            assert!(
                emitted
                    .notes
                    .iter()
                    .any(|n| n.start_tick == note.start_tick && n.pitch == expected),
                "{name} note at {} not transposed to {expected}",
                note.start_tick
            );
        }
    }
    println!("✓ modulation boundary at tick {mod_tick}");
}

#[test]
fn metadata_survives_round_trip() {
    let p = params(3);
    let song = generate_song(&p);
    let bytes = write_song(&song, &p);
    let parsed = read_smf(&bytes).expect("parse");

    assert!(!parsed.metadata.is_empty(), "metadata missing");
    let value: serde_json::Value =
        serde_json::from_str(&parsed.metadata).expect("metadata is JSON");
    assert_eq!(value["seed"], song.seed());
    assert_eq!(value["bpm"], song.bpm());
}

#[test]
fn reader_rejects_malformed_input() {
    assert!(matches!(read_smf(b"MThd"), Err(MidiReadError::TooSmall)));
    assert!(matches!(
        read_smf(b"RIFFxxxxxxxxxxxxxxxx"),
        Err(MidiReadError::BadMagic)
    ));

    // Corrupt a valid file's first track magic.
    let p = params(3);
    let song = generate_song(&p);
    let mut bytes = write_song(&song, &p);
    bytes[14] = b'X';
    assert!(matches!(
        read_smf(&bytes),
        Err(MidiReadError::BadTrackChunk(14))
    ));
}

#[test]
fn midi2_container_round_trip() {
    let p = params(9);
    let song = generate_song(&p);
    let bytes = write_song_midi2(&song, &p);

    assert_eq!(detect_format(&bytes), DetectedFormat::Midi2Container);
    let clips = ump::read_song_midi2(&bytes).expect("parse container");
    assert!(!clips.is_empty());

    // The first non-empty song track is the vocal; its onsets round-trip.
    let vocal_clip = &clips[0];
    let mut expected: Vec<(u32, u8)> = song
        .vocal()
        .notes()
        .iter()
        .map(|n| (n.start_tick, n.pitch))
        .collect();
    let mut actual: Vec<(u32, u8)> = vocal_clip
        .notes
        .iter()
        .map(|n| (n.start_tick, n.pitch))
        .collect();
    expected.sort_unstable();
    actual.sort_unstable();
    assert_eq!(expected, actual);
    println!("✓ MIDI 2.0 container: {} clips", clips.len());
}

#[test]
fn smf_and_midi2_carry_the_same_notes() {
    let p = params(21);
    let song = generate_song(&p);

    let smf = read_smf(&write_song(&song, &p)).expect("smf");
    let clips = ump::read_song_midi2(&write_song_midi2(&song, &p)).expect("ump");

    let smf_bass = smf.get_track("Bass").unwrap();
    let ump_bass = clips
        .iter()
        .find(|c| c.channel == 2)
        .expect("bass clip on channel 2");
    let onsets = |notes: &[songsketch::NoteEvent]| {
        let mut v: Vec<(u32, u8)> = notes.iter().map(|n| (n.start_tick, n.pitch)).collect();
        v.sort_unstable();
        v
    };
    assert_eq!(onsets(&smf_bass.notes), onsets(&ump_bass.notes));
}
