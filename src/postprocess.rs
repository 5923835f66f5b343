//! Post-processing: groove timing, overlap cleanup, tied-note merging,
//! transition dynamics, and humanization.
//!
//! These passes rewrite notes in place after generation.  Order matters:
//! groove shifts come before overlap removal, humanization is last.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::params::VocalGrooveFeel;
use crate::types::{
    NoteEvent, Song, Tick, TICKS_PER_BAR, TICKS_PER_BEAT, TICK_32ND,
};

const TICK_8TH: i64 = (TICKS_PER_BEAT / 2) as i64;
const TICK_16TH: i64 = (TICKS_PER_BEAT / 4) as i64;

/// Groove shift for one note, in ticks (negative = earlier).
fn groove_shift(note: &NoteEvent, groove: VocalGrooveFeel) -> i64 {
    let beat_pos = (note.start_tick % TICKS_PER_BEAT) as i64;

    match groove {
        VocalGrooveFeel::OffBeat => {
            // Push on-beat notes slightly late, emphasizing the off-beats.
            if beat_pos < TICK_16TH {
                return TICK_16TH / 2;
            }
        }
        VocalGrooveFeel::Swing => {
            // Delay the second 8th of each beat pair.
            if beat_pos >= TICK_8TH - TICK_16TH && beat_pos < TICK_8TH + TICK_16TH {
                return TICK_16TH / 2;
            }
        }
        VocalGrooveFeel::Syncopated => {
            // Anticipate beats 2 and 4.
            let bar_pos = (note.start_tick % TICKS_PER_BAR) as i64;
            let beat = TICKS_PER_BEAT as i64;
            if (bar_pos >= beat - TICK_16TH && bar_pos < beat + TICK_16TH)
                || (bar_pos >= 3 * beat - TICK_16TH && bar_pos < 3 * beat + TICK_16TH)
            {
                return -TICK_16TH / 2;
            }
        }
        VocalGrooveFeel::Driving16th => {
            // Slight rush on 16th positions for urgency.
            if beat_pos % TICK_16TH < TICK_16TH / 4 {
                return -TICK_16TH / 4;
            }
        }
        VocalGrooveFeel::Bouncy8th => {
            // Delay the second 8th; the first 8th is shortened separately.
            if beat_pos >= TICK_8TH {
                return TICK_16TH / 3;
            }
        }
        VocalGrooveFeel::Straight => {}
    }
    0
}

/// Apply a groove feel to a note list.  Anticipating notes first trim the
/// previous note's duration to preserve a 10-tick gap.
pub fn apply_groove_feel(notes: &mut [NoteEvent], groove: VocalGrooveFeel) {
    if groove == VocalGrooveFeel::Straight || notes.is_empty() {
        return;
    }

    notes.sort_by_key(|n| n.start_tick);

    const MIN_GAP: Tick = 10;
    const MIN_DURATION: Tick = TICK_32ND;

    // Pass 1: shift amounts (and the Bouncy8th duration trim).
    let mut shifts: Vec<i64> = Vec::with_capacity(notes.len());
    for note in notes.iter_mut() {
        shifts.push(groove_shift(note, groove));
        if groove == VocalGrooveFeel::Bouncy8th {
            let beat_pos = (note.start_tick % TICKS_PER_BEAT) as i64;
            if beat_pos < TICK_8TH && note.duration as i64 > TICK_8TH {
                note.duration = note.duration * 85 / 100;
            }
        }
    }

    // Pass 2: apply shifts, trimming the previous note ahead of any
    // anticipation.
    for i in 0..notes.len() {
        let shift = shifts[i];
        if shift < 0 && i > 0 {
            let new_start = (notes[i].start_tick as i64 + shift).max(0) as Tick;
            let max_prev_end = new_start.saturating_sub(MIN_GAP);
            let prev_end = notes[i - 1].end_tick();
            if prev_end > max_prev_end {
                if max_prev_end > notes[i - 1].start_tick {
                    notes[i - 1].duration =
                        (max_prev_end - notes[i - 1].start_tick).max(MIN_DURATION);
                } else {
                    notes[i - 1].duration = MIN_DURATION;
                }
            }
        }
        if shift != 0 {
            notes[i].start_tick = (notes[i].start_tick as i64 + shift).max(0) as Tick;
        }
    }

    // Safety net: no overlaps remain.
    for i in 0..notes.len().saturating_sub(1) {
        let end = notes[i].end_tick();
        if end > notes[i + 1].start_tick {
            if notes[i + 1].start_tick > notes[i].start_tick {
                notes[i].duration = notes[i + 1].start_tick - notes[i].start_tick;
            } else {
                notes[i].duration = MIN_DURATION;
            }
        }
    }
}

/// Remove overlaps in a monophonic line: enforce a minimum duration where
/// space allows, then truncate into the next onset.
pub fn remove_overlaps(notes: &mut Vec<NoteEvent>, min_duration: Tick) {
    if notes.len() < 2 {
        return;
    }
    notes.sort_by_key(|n| n.start_tick);

    for i in 0..notes.len() {
        if notes[i].duration < min_duration {
            let mut max_safe = min_duration;
            if i + 1 < notes.len() && notes[i + 1].start_tick > notes[i].start_tick {
                let space = notes[i + 1].start_tick - notes[i].start_tick;
                if space < min_duration {
                    max_safe = space;
                }
            }
            notes[i].duration = notes[i].duration.max(max_safe);
        }
    }

    for i in 0..notes.len() - 1 {
        let end = notes[i].end_tick();
        let next_start = notes[i + 1].start_tick;
        if end > next_start {
            if next_start > notes[i].start_tick {
                notes[i].duration = next_start - notes[i].start_tick;
            } else {
                notes[i + 1].start_tick = notes[i].end_tick();
            }
        }
    }

    notes.sort_by_key(|n| n.start_tick);
    for i in 0..notes.len() - 1 {
        let end = notes[i].end_tick();
        if end > notes[i + 1].start_tick {
            if notes[i + 1].start_tick > notes[i].start_tick {
                notes[i].duration = notes[i + 1].start_tick - notes[i].start_tick;
            } else {
                notes[i].duration = 1;
            }
        }
    }
}

/// Merge same-pitch notes separated by at most `max_gap` ticks into one
/// (ties in notation).  The louder velocity wins.
pub fn merge_same_pitch_notes(notes: &mut Vec<NoteEvent>, max_gap: Tick) {
    if notes.len() < 2 {
        return;
    }
    notes.sort_by_key(|n| n.start_tick);

    let mut merged: Vec<NoteEvent> = Vec::with_capacity(notes.len());
    let mut i = 0;
    while i < notes.len() {
        let mut current = notes[i];
        while i + 1 < notes.len() {
            let next = &notes[i + 1];
            let current_end = current.end_tick();
            let gap = next.start_tick.saturating_sub(current_end);
            if next.pitch == current.pitch && gap <= max_gap {
                current.duration = next.end_tick() - current.start_tick;
                current.velocity = current.velocity.max(next.velocity);
                i += 1;
            } else {
                break;
            }
        }
        merged.push(current);
        i += 1;
    }

    for i in 0..merged.len().saturating_sub(1) {
        let end = merged[i].end_tick();
        if end > merged[i + 1].start_tick && merged[i + 1].start_tick > merged[i].start_tick {
            merged[i].duration = merged[i + 1].start_tick - merged[i].start_tick;
        }
    }

    *notes = merged;
}

/// Scale velocities by a factor, clamped to the MIDI range.
pub fn apply_velocity_balance(notes: &mut [NoteEvent], scale: f32) {
    for note in notes.iter_mut() {
        let vel = (note.velocity as f32 * scale) as i32;
        note.velocity = vel.clamp(1, 127) as u8;
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Song-wide passes
// ═══════════════════════════════════════════════════════════════════════

/// Linear velocity ramp across each section seam: the last bar of a section
/// blends toward the first bar of the next.
pub fn apply_transition_dynamics(song: &mut Song) {
    let sections = song.arrangement().sections().to_vec();
    if sections.len() < 2 {
        return;
    }

    let seams: Vec<(Tick, f32, f32)> = sections
        .windows(2)
        .map(|pair| {
            let from = crate::arrange::section_properties(pair[0].section_type).velocity_multiplier;
            let to = crate::arrange::section_properties(pair[1].section_type).velocity_multiplier;
            (pair[1].start_tick, from, to)
        })
        .collect();

    let mut ramp = |notes: &mut Vec<NoteEvent>| {
        for note in notes.iter_mut() {
            for &(seam, from, to) in &seams {
                let ramp_start = seam.saturating_sub(TICKS_PER_BAR);
                let ramp_end = seam + TICKS_PER_BAR;
                if note.start_tick >= ramp_start && note.start_tick < ramp_end {
                    let progress =
                        (note.start_tick - ramp_start) as f32 / (ramp_end - ramp_start) as f32;
                    let factor = (from + (to - from) * progress) / from.max(0.01);
                    let vel = (note.velocity as f32 * factor.clamp(0.5, 1.5)) as i32;
                    note.velocity = vel.clamp(1, 127) as u8;
                    break;
                }
            }
        }
    };

    ramp(song.vocal_mut().notes_mut());
    ramp(song.chord_mut().notes_mut());
    ramp(song.bass_mut().notes_mut());
    ramp(song.aux_mut().notes_mut());
    ramp(song.motif_mut().notes_mut());
    ramp(song.arpeggio_mut().notes_mut());
}

/// Timing and velocity jitter of up to ±5 per note, drums included.  Notes
/// never move before tick 0.
pub fn apply_humanization(song: &mut Song, rng: &mut ChaCha8Rng) {
    let mut humanize = |notes: &mut Vec<NoteEvent>| {
        for note in notes.iter_mut() {
            let tick_jitter = rng.gen_range(-5i64..=5);
            let vel_jitter = rng.gen_range(-5i32..=5);
            note.start_tick = (note.start_tick as i64 + tick_jitter).max(0) as Tick;
            note.velocity = (note.velocity as i32 + vel_jitter).clamp(1, 127) as u8;
        }
    };
    humanize(song.vocal_mut().notes_mut());
    humanize(song.chord_mut().notes_mut());
    humanize(song.bass_mut().notes_mut());
    humanize(song.aux_mut().notes_mut());
    humanize(song.motif_mut().notes_mut());
    humanize(song.arpeggio_mut().notes_mut());
    humanize(song.drums_mut().notes_mut());
}
