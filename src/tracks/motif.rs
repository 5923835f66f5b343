//! Background motif track.
//!
//! For the BackgroundMotif composition style a short instrumental figure is
//! generated first, before chord and bass, and registered with the harmony
//! context so later voicings avoid doubling or rubbing against it.  The
//! figure repeats through the song, re-snapped to each bar's chord, with a
//! guard against monotonous same-pitch runs.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::harmony::HarmonyContext;
use crate::note::create_note;
use crate::types::{
    Mood, NoteSource, Song, Tick, Track, TrackRole, TICKS_PER_BAR, TICK_EIGHTH, TICK_QUARTER,
};
use crate::velocity::calculate_velocity;

/// Motif register: around C5, clear of bass and chord centers.
const MOTIF_LOW: u8 = 67;
const MOTIF_HIGH: u8 = 88;

/// Consecutive same pitches tolerated before forcing a different tone.
const MAX_CONSECUTIVE_SAME: usize = 3;

/// One cell of the motif figure: onset offset within the phrase, duration,
/// and the chord-tone index it prefers.
#[derive(Debug, Clone, Copy)]
struct MotifCell {
    offset: Tick,
    duration: Tick,
    tone_index: usize,
    octave_up: bool,
}

/// Build the 2-bar motif figure: a rhythm of eighths and quarters over
/// chord-tone indices, chosen once and reused for the whole song.
fn design_motif(rng: &mut ChaCha8Rng) -> Vec<MotifCell> {
    let mut cells = Vec::new();
    let mut offset: Tick = 0;
    let phrase_len = 2 * TICKS_PER_BAR;

    while offset < phrase_len {
        let duration = if rng.gen::<f32>() < 0.6 {
            TICK_EIGHTH
        } else {
            TICK_QUARTER
        };
        // Rests keep the figure airy.
        if rng.gen::<f32>() < 0.75 {
            cells.push(MotifCell {
                offset,
                duration: duration - 20,
                tone_index: rng.gen_range(0..3),
                octave_up: rng.gen::<f32>() < 0.2,
            });
        }
        offset += duration;
    }
    cells
}

/// Resolve a cell against the chord sounding at its tick.
fn resolve_cell_pitch(
    harmony: &HarmonyContext,
    tick: Tick,
    cell: &MotifCell,
    last_pitch: Option<u8>,
    consecutive: usize,
) -> u8 {
    let tones = harmony.chord_tones_at(tick);
    let mut tone_index = cell.tone_index;
    let pc = if tones.is_empty() {
        0
    } else {
        tones[tone_index % tones.len()]
    };

    let place = |pc: i32, octave_up: bool| -> u8 {
        let mut pitch = if octave_up { 72 + pc } else { 60 + pc };
        while pitch < MOTIF_LOW as i32 {
            pitch += 12;
        }
        while pitch > MOTIF_HIGH as i32 {
            pitch -= 12;
        }
        pitch as u8
    };

    let mut pitch = place(pc, cell.octave_up);

    // Monotony guard: after three identical pitches, move to the next
    // chord tone.
    if Some(pitch) == last_pitch && consecutive >= MAX_CONSECUTIVE_SAME && !tones.is_empty() {
        tone_index = (tone_index + 1) % tones.len();
        pitch = place(tones[tone_index], cell.octave_up);
    }
    pitch
}

/// Generate the motif track and register it.
pub fn generate_motif_track(
    track: &mut Track,
    song: &Song,
    mood: Mood,
    rng: &mut ChaCha8Rng,
    harmony: &mut HarmonyContext,
) {
    let figure = design_motif(rng);
    if figure.is_empty() {
        return;
    }
    let phrase_len = 2 * TICKS_PER_BAR;

    let mut last_pitch: Option<u8> = None;
    let mut consecutive = 0usize;

    for section in song.arrangement().sections() {
        let vel = (calculate_velocity(section.section_type, 1, mood) as f32 * 0.85) as u8;
        let section_end = section.end_tick();

        let mut phrase_start = section.start_tick;
        while phrase_start < section_end {
            for cell in &figure {
                let start = phrase_start + cell.offset;
                if start + cell.duration > section_end {
                    continue;
                }
                let pitch = resolve_cell_pitch(harmony, start, cell, last_pitch, consecutive);
                if Some(pitch) == last_pitch {
                    consecutive += 1;
                } else {
                    consecutive = 1;
                    last_pitch = Some(pitch);
                }

                let note = create_note(harmony, start, cell.duration, pitch, vel, NoteSource::Motif);
                harmony.register_note(start, cell.duration, pitch, TrackRole::Motif);
                track.add_note(note);
            }
            phrase_start += phrase_len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    use crate::arrange::make_section;
    use crate::theory::chord_progression;
    use crate::types::{Arrangement, SectionType};

    fn generate(seed: u64) -> (Track, HarmonyContext) {
        let mut song = Song::new();
        song.set_arrangement(Arrangement::new(vec![
            make_section(SectionType::A, 0, 8),
        ]));
        let mut harmony = HarmonyContext::new();
        harmony.initialize(song.arrangement(), chord_progression(0), Mood::Synthwave);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut track = Track::new(TrackRole::Motif);
        generate_motif_track(&mut track, &song, Mood::Synthwave, &mut rng, &mut harmony);
        (track, harmony)
    }

    #[test]
    fn motif_notes_are_chord_tones_in_register() {
        let (track, harmony) = generate(11);
        assert!(!track.is_empty());
        for note in track.notes() {
            assert!((MOTIF_LOW..=MOTIF_HIGH).contains(&note.pitch));
            let tones = harmony.chord_tones_at(note.start_tick);
            assert!(tones.contains(&((note.pitch % 12) as i32)));
        }
    }

    #[test]
    fn motif_registers_its_notes() {
        let (track, harmony) = generate(11);
        let first = track.notes()[0];
        let pcs = harmony.pitch_classes_from_track_at(first.start_tick, TrackRole::Motif);
        assert!(pcs.contains(&((first.pitch % 12) as i32)));
    }

    #[test]
    fn no_long_same_pitch_runs() {
        let (track, _) = generate(23);
        let mut run = 1;
        for pair in track.notes().windows(2) {
            if pair[0].pitch == pair[1].pitch {
                run += 1;
                assert!(run <= MAX_CONSECUTIVE_SAME + 1, "monotonous run");
            } else {
                run = 1;
            }
        }
    }

    #[test]
    fn figure_repeats_across_phrases() {
        let (track, _) = generate(7);
        // Offsets within each 2-bar phrase window repeat.
        let phrase_len = 2 * TICKS_PER_BAR;
        let first_phrase: Vec<Tick> = track
            .notes()
            .iter()
            .filter(|n| n.start_tick < phrase_len)
            .map(|n| n.start_tick)
            .collect();
        let second_phrase: Vec<Tick> = track
            .notes()
            .iter()
            .filter(|n| n.start_tick >= phrase_len && n.start_tick < 2 * phrase_len)
            .map(|n| n.start_tick - phrase_len)
            .collect();
        assert_eq!(first_phrase, second_phrase);
    }
}
