//! Phrase variation for repeated sections, and cadence detection.
//!
//! Repeats of a cached phrase stay exact early (the hook has to be learned
//! before it can be varied) and loosen with each occurrence.  Only the safe
//! variation set is used; anything that rewrites the body of the phrase
//! destroys recognizability.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::theory::SCALE;
use crate::types::{CadenceType, NoteEvent, Tick, TICKS_PER_BAR, TICKS_PER_BEAT};

/// Variation applied to a reused phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseVariation {
    Exact,
    /// Shift the last note by one or two scale degrees.
    LastNoteShift,
    /// Extend the last note by half its length.
    LastNoteLong,
    /// Shorten the last note to insert a breath.
    BreathRestInsert,
    /// Velocity emphasis on the ending.
    DynamicAccent,
    /// Delay the first onset by a 16th (anticipation rest).
    LateOnset,
    /// Echo the last note, softer and shorter.
    EchoRepeat,
}

/// Repeats beyond this many lean into variation.
const MAX_EXACT_REUSE: i32 = 2;

/// Choose a variation for a phrase reuse.
///
/// The exact-repeat probability decays with the occurrence number of the
/// section (1 → 80%, 2 → 60%, 3+ → 30%); the first rendition is always
/// exact.
pub fn select_phrase_variation(
    reuse_count: i32,
    occurrence: i32,
    rng: &mut ChaCha8Rng,
) -> PhraseVariation {
    if reuse_count == 0 {
        return PhraseVariation::Exact;
    }

    let exact_probability = if occurrence >= 3 {
        0.3
    } else if occurrence == 2 {
        0.6
    } else {
        0.8
    };

    if reuse_count <= MAX_EXACT_REUSE && rng.gen::<f32>() < exact_probability {
        return PhraseVariation::Exact;
    }

    const SAFE: [PhraseVariation; 6] = [
        PhraseVariation::LastNoteShift,
        PhraseVariation::LastNoteLong,
        PhraseVariation::BreathRestInsert,
        PhraseVariation::DynamicAccent,
        PhraseVariation::LateOnset,
        PhraseVariation::EchoRepeat,
    ];
    SAFE[rng.gen_range(0..SAFE.len())]
}

/// Apply a variation in place.
pub fn apply_phrase_variation(
    notes: &mut Vec<NoteEvent>,
    variation: PhraseVariation,
    rng: &mut ChaCha8Rng,
) {
    if notes.is_empty() || variation == PhraseVariation::Exact {
        return;
    }

    match variation {
        PhraseVariation::Exact => {}

        PhraseVariation::LastNoteShift => {
            let last = notes.last_mut().expect("non-empty");
            let mut shift = rng.gen_range(-2..=2);
            if shift == 0 {
                shift = 1;
            }
            // Shift by scale degrees, not semitones.
            let pc = (last.pitch % 12) as i32;
            let mut octave = last.pitch as i32 / 12;
            let mut scale_idx = 0i32;
            for i in 0..7 {
                if SCALE[i] == pc || (SCALE[i] < pc && (i == 6 || SCALE[i + 1] > pc)) {
                    scale_idx = i as i32;
                    break;
                }
            }
            let mut new_idx = scale_idx + shift;
            while new_idx < 0 {
                new_idx += 7;
                octave -= 1;
            }
            while new_idx >= 7 {
                new_idx -= 7;
                octave += 1;
            }
            let new_pitch = octave * 12 + SCALE[new_idx as usize];
            last.pitch = new_pitch.clamp(0, 127) as u8;
        }

        PhraseVariation::LastNoteLong => {
            let last = notes.last_mut().expect("non-empty");
            last.duration = (last.duration as f32 * 1.5) as Tick;
        }

        PhraseVariation::BreathRestInsert => {
            if notes.len() >= 2 {
                let last = notes.last_mut().expect("non-empty");
                let rest: Tick = rng.gen_range(60..=120);
                if last.duration > rest + 60 {
                    last.duration -= rest;
                }
            }
        }

        PhraseVariation::DynamicAccent => {
            let last = notes.last_mut().expect("non-empty");
            last.velocity = ((last.velocity as i32) + 20).min(127) as u8;
        }

        PhraseVariation::LateOnset => {
            const ONSET_DELAY: Tick = 120;
            let first = notes.first_mut().expect("non-empty");
            first.start_tick += ONSET_DELAY;
            if first.duration > ONSET_DELAY {
                first.duration -= ONSET_DELAY;
            }
        }

        PhraseVariation::EchoRepeat => {
            let last = *notes.last().expect("non-empty");
            let echo_duration = (last.duration / 2).max(60);
            let echo_velocity = ((last.velocity as i32) - 20).max(30) as u8;
            notes.push(NoteEvent {
                start_tick: last.end_tick(),
                duration: echo_duration,
                velocity: echo_velocity,
                lookup_tick: last.end_tick(),
                ..last
            });
        }
    }
}

/// Classify how a phrase concluded.
///
/// Strong: tonic chord-tone on a strong beat held at least a quarter.
/// Deceptive: the vi root over vi.  Floating: a scale tension (2nd, 4th,
/// 7th).  Weak: anything else.
pub fn detect_cadence_type(notes: &[NoteEvent], chord_degree: i8) -> CadenceType {
    let last = match notes.last() {
        Some(n) => n,
        None => return CadenceType::None,
    };
    let pitch_class = last.pitch % 12;

    let is_tonic_tone = matches!(pitch_class, 0 | 4 | 7);

    let beat_pos = last.start_tick % TICKS_PER_BAR;
    let is_strong_beat = beat_pos < TICKS_PER_BEAT / 4
        || (beat_pos >= TICKS_PER_BEAT * 2 - TICKS_PER_BEAT / 4
            && beat_pos < TICKS_PER_BEAT * 2 + TICKS_PER_BEAT / 4);

    let is_long = last.duration >= TICKS_PER_BEAT;

    if chord_degree == 5 && pitch_class == 9 {
        return CadenceType::Deceptive;
    }
    if is_tonic_tone && is_strong_beat && is_long {
        return CadenceType::Strong;
    }
    if matches!(pitch_class, 2 | 5 | 11) {
        return CadenceType::Floating;
    }
    CadenceType::Weak
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NoteSource;
    use rand::SeedableRng;

    fn note(start: Tick, duration: Tick, pitch: u8) -> NoteEvent {
        NoteEvent {
            start_tick: start,
            duration,
            pitch,
            velocity: 90,
            source: NoteSource::MelodyPhrase,
            original_pitch: pitch,
            chord_degree: 0,
            lookup_tick: start,
        }
    }

    #[test]
    fn first_rendition_is_always_exact() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for occurrence in 1..4 {
            assert_eq!(
                select_phrase_variation(0, occurrence, &mut rng),
                PhraseVariation::Exact
            );
        }
    }

    #[test]
    fn last_note_shift_stays_on_scale() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..20 {
            let mut notes = vec![note(0, 480, 60), note(480, 480, 64)];
            apply_phrase_variation(&mut notes, PhraseVariation::LastNoteShift, &mut rng);
            let pc = (notes.last().unwrap().pitch % 12) as i32;
            assert!(SCALE.contains(&pc), "pc {pc} off scale");
        }
    }

    #[test]
    fn echo_repeat_appends_softer_note() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut notes = vec![note(0, 480, 67)];
        apply_phrase_variation(&mut notes, PhraseVariation::EchoRepeat, &mut rng);
        assert_eq!(notes.len(), 2);
        let echo = notes[1];
        assert_eq!(echo.pitch, 67);
        assert_eq!(echo.start_tick, 480);
        assert!(echo.velocity < 90);
        assert!(echo.duration <= 240);
    }

    #[test]
    fn late_onset_delays_first_note() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut notes = vec![note(0, 480, 60), note(480, 480, 62)];
        apply_phrase_variation(&mut notes, PhraseVariation::LateOnset, &mut rng);
        assert_eq!(notes[0].start_tick, 120);
        assert_eq!(notes[0].duration, 360);
        assert_eq!(notes[1].start_tick, 480);
    }

    #[test]
    fn cadence_classification() {
        // Tonic tone, strong beat, long: strong cadence.
        let strong = vec![note(0, 960, 72)];
        assert_eq!(detect_cadence_type(&strong, 0), CadenceType::Strong);
        // A over vi: deceptive.
        let deceptive = vec![note(0, 960, 69)];
        assert_eq!(detect_cadence_type(&deceptive, 5), CadenceType::Deceptive);
        // D (scale 2nd): floating.
        let floating = vec![note(0, 960, 62)];
        assert_eq!(detect_cadence_type(&floating, 0), CadenceType::Floating);
        // Chord tone off the strong beat and short: weak.
        let weak = vec![note(TICKS_PER_BEAT, 120, 64)];
        assert_eq!(detect_cadence_type(&weak, 0), CadenceType::Weak);
        assert_eq!(detect_cadence_type(&[], 0), CadenceType::None);
    }
}
