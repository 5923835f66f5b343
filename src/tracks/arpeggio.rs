//! Arpeggio track generation.
//!
//! Chord-following ladders with genre-specific speed, swing, and gate.
//! Bars resolve their chords from the timeline, so subdivided and split
//! bars re-synchronize the pattern mid-bar exactly where the chord track
//! changes.

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::harmony::HarmonyContext;
use crate::note::create_note;
use crate::params::{ArpeggioParams, ArpeggioPattern, ArpeggioSpeed, GeneratorParams};
use crate::theory::{chord_notes, degree_to_root};
use crate::types::{
    BackingDensity, Mood, NoteSource, PeakLevel, Song, Tick, Track, TrackMask, TrackRole,
    TICKS_PER_BAR, TICKS_PER_BEAT, TICK_HALF,
};
use crate::velocity::calculate_velocity;

/// Genre-flavoured arpeggio behaviour.
#[derive(Debug, Clone, Copy)]
pub struct ArpeggioStyle {
    pub speed: ArpeggioSpeed,
    pub octave_offset: i32,
    pub swing_amount: f32,
    pub gate: f32,
    pub gm_program: u8,
}

/// Style table by mood.
pub fn arpeggio_style_for_mood(mood: Mood) -> ArpeggioStyle {
    match mood {
        Mood::CityPop => ArpeggioStyle {
            speed: ArpeggioSpeed::Triplet,
            octave_offset: 0,
            swing_amount: 0.5,
            gate: 0.75,
            gm_program: 5, // Electric Piano 1
        },
        Mood::IdolPop | Mood::Yoasobi => ArpeggioStyle {
            speed: ArpeggioSpeed::Sixteenth,
            octave_offset: 0,
            swing_amount: 0.2,
            gate: 0.7,
            gm_program: 81, // Saw Lead
        },
        Mood::Ballad | Mood::Sentimental => ArpeggioStyle {
            speed: ArpeggioSpeed::Eighth,
            octave_offset: 0,
            swing_amount: 0.0,
            gate: 0.9,
            gm_program: 5,
        },
        Mood::LightRock | Mood::Anthem => ArpeggioStyle {
            speed: ArpeggioSpeed::Eighth,
            octave_offset: -12,
            swing_amount: 0.0,
            gate: 0.85,
            gm_program: 30, // Distortion Guitar
        },
        Mood::EnergeticDance | Mood::FutureBass | Mood::Synthwave => ArpeggioStyle {
            speed: ArpeggioSpeed::Sixteenth,
            octave_offset: 0,
            swing_amount: 0.0,
            gate: if mood == Mood::Synthwave { 0.75 } else { 0.6 },
            gm_program: 81,
        },
        Mood::Chill => ArpeggioStyle {
            speed: ArpeggioSpeed::Triplet,
            octave_offset: 0,
            swing_amount: 0.3,
            gate: 0.85,
            gm_program: 89, // Warm Pad
        },
        _ => ArpeggioStyle {
            speed: ArpeggioSpeed::Sixteenth,
            octave_offset: 0,
            swing_amount: 0.3,
            gate: 0.8,
            gm_program: 81,
        },
    }
}

fn step_duration(speed: ArpeggioSpeed) -> Tick {
    match speed {
        ArpeggioSpeed::Eighth => TICKS_PER_BEAT / 2,
        ArpeggioSpeed::Sixteenth => TICKS_PER_BEAT / 4,
        ArpeggioSpeed::Triplet => TICKS_PER_BEAT / 3,
    }
}

/// Stack chord tones across the octave range above the root.
fn build_chord_notes(root: u8, degree: i8, octave_range: u8) -> Vec<u8> {
    let chord = chord_notes(degree);
    let mut notes = Vec::new();
    for octave in 0..octave_range {
        for interval in chord.active_intervals() {
            let pitch = root as i32 + interval as i32 + octave as i32 * 12;
            if (0..=127).contains(&pitch) {
                notes.push(pitch as u8);
            }
        }
    }
    notes
}

fn arrange_by_pattern(
    mut notes: Vec<u8>,
    pattern: ArpeggioPattern,
    rng: &mut ChaCha8Rng,
) -> Vec<u8> {
    match pattern {
        ArpeggioPattern::Up => notes.sort_unstable(),
        ArpeggioPattern::Down => notes.sort_unstable_by(|a, b| b.cmp(a)),
        ArpeggioPattern::UpDown => {
            notes.sort_unstable();
            let down: Vec<u8> = notes[1..notes.len().saturating_sub(1)]
                .iter()
                .rev()
                .copied()
                .collect();
            notes.extend(down);
        }
        ArpeggioPattern::Random => notes.shuffle(rng),
    }
    notes
}

/// Root placed inside the base octave window.
fn place_root(degree: i8, base_octave: i32) -> u8 {
    let mut root = degree_to_root(degree) as i32;
    while root < base_octave {
        root += 12;
    }
    while root >= base_octave + 12 {
        root -= 12;
    }
    root.clamp(0, 127) as u8
}

fn density_threshold(backing: BackingDensity) -> u8 {
    match backing {
        BackingDensity::Thin => 70,
        BackingDensity::Normal => 80,
        BackingDensity::Thick => 90,
    }
}

/// Generate the arpeggio track.
pub fn generate_arpeggio_track(
    track: &mut Track,
    song: &Song,
    params: &GeneratorParams,
    rng: &mut ChaCha8Rng,
    harmony: &mut HarmonyContext,
) {
    let arp: &ArpeggioParams = &params.arpeggio;
    let style = arpeggio_style_for_mood(params.mood);

    // User overrides win over the style table when explicitly set.
    let effective_speed = if arp.speed != ArpeggioSpeed::Sixteenth {
        arp.speed
    } else {
        style.speed
    };
    let effective_gate = if (arp.gate - 0.8).abs() > f32::EPSILON {
        arp.gate
    } else {
        style.gate
    };

    // Base octave C5, shifted by style, clamped to [C2, C7].
    let base_octave = (72 + style.octave_offset).clamp(36, 96);

    let mut persistent_notes: Vec<u8> = Vec::new();
    let mut persistent_index: usize = 0;

    for section in song.arrangement().sections() {
        if !section.track_mask.contains(TrackMask::ARPEGGIO) {
            continue;
        }

        let mut octave_range = arp.octave_range;
        if section.peak_level == PeakLevel::Max {
            octave_range = (octave_range + 1).min(3);
        }

        // High-density sections promote eighths to sixteenths unless the
        // user or style pinned a speed.
        let mut section_speed = effective_speed;
        let user_set_speed = arp.speed != ArpeggioSpeed::Sixteenth;
        let style_special = style.speed != ArpeggioSpeed::Sixteenth;
        if section.density_percent > 90
            && section_speed == ArpeggioSpeed::Eighth
            && !user_set_speed
            && !style_special
        {
            section_speed = ArpeggioSpeed::Sixteenth;
        }

        let note_duration = step_duration(section_speed);
        let gated_duration = (note_duration as f32 * effective_gate) as Tick;
        let section_end = section.end_tick();
        let threshold = density_threshold(section.backing_density);

        // Without chord sync the pattern is built once per section and
        // free-runs across bars.
        if !arp.sync_chord {
            let degree = harmony.chord_degree_at(section.start_tick);
            let root = place_root(degree, base_octave);
            let notes = build_chord_notes(root, degree, octave_range);
            persistent_notes = arrange_by_pattern(notes, arp.pattern, rng);
            persistent_index = 0;
        }

        for bar in 0..section.bars as u32 {
            let bar_start = section.start_tick + bar * TICKS_PER_BAR;
            let half_tick = bar_start + TICK_HALF;

            let (first_notes, second_notes, mut pattern_index) = if arp.sync_chord {
                let first_degree = harmony.chord_degree_at(bar_start);
                let second_degree = harmony.chord_degree_at(half_tick);
                let first_root = place_root(first_degree, base_octave);
                let first = arrange_by_pattern(
                    build_chord_notes(first_root, first_degree, octave_range),
                    arp.pattern,
                    rng,
                );
                let second = if second_degree != first_degree {
                    let second_root = place_root(second_degree, base_octave);
                    Some(arrange_by_pattern(
                        build_chord_notes(second_root, second_degree, octave_range),
                        arp.pattern,
                        rng,
                    ))
                } else {
                    None
                };
                (first, second, 0usize)
            } else {
                (persistent_notes.clone(), None, persistent_index)
            };

            if first_notes.is_empty() {
                continue;
            }

            let mut pos = bar_start;
            while pos < bar_start + TICKS_PER_BAR && pos < section_end {
                let current = match (&second_notes, pos >= half_tick) {
                    (Some(second), true) => second,
                    _ => &first_notes,
                };
                let pitch = current[pattern_index % current.len()];
                let velocity = calculate_velocity(section.section_type, 0, params.mood)
                    .min(arp.base_velocity.saturating_add(20));
                let velocity = if pattern_index % current.len() == 0 {
                    ((velocity as f32 * 1.1) as u8).min(127)
                } else {
                    velocity
                };

                // Density roll: sparse sections thin the stream.
                let keep = section.density_percent >= threshold
                    || rng.gen_range(0.0..100.0) <= section.density_percent as f32;

                if keep {
                    // Swing pushes upbeat steps late.
                    let mut note_pos = pos;
                    if style.swing_amount > 0.0 && pattern_index % 2 == 1 {
                        note_pos += (note_duration as f32 * style.swing_amount) as Tick;
                    }

                    // Clamp the sounding length short of the next chord
                    // change so the tail never rubs the new chord.
                    let mut duration = gated_duration;
                    let next_change = harmony.next_chord_change_tick(note_pos);
                    if next_change > note_pos && note_pos + duration > next_change {
                        const CHORD_GAP: Tick = 30;
                        let max_duration = next_change - note_pos;
                        if max_duration > CHORD_GAP {
                            duration = max_duration - CHORD_GAP;
                        }
                    }

                    let note = create_note(
                        harmony,
                        note_pos,
                        duration,
                        pitch,
                        velocity,
                        NoteSource::Arpeggio,
                    );
                    harmony.register_note(note_pos, duration, pitch, TrackRole::Arpeggio);
                    track.add_note(note);
                }

                pos += note_duration;
                pattern_index += 1;
            }

            if !arp.sync_chord {
                persistent_index = pattern_index;
            }
        }
    }
}

/// BGM-only post pass: rewrite any arpeggio pitch that still clashes with
/// the finished chord track.
pub fn resolve_arpeggio_chord_clashes(track: &mut Track, harmony: &mut HarmonyContext) {
    harmony.clear_notes_for_role(TrackRole::Arpeggio);
    for note in track.notes_mut().iter_mut() {
        if !harmony.is_pitch_safe(note.pitch, note.start_tick, note.duration, TrackRole::Arpeggio) {
            let safe = harmony.get_safe_pitch(
                note.pitch,
                note.start_tick,
                note.duration,
                TrackRole::Arpeggio,
                36,
                96,
            );
            if safe != note.pitch {
                note.pitch = safe;
                note.source = NoteSource::CollisionAvoid;
            }
        }
        harmony.register_note(note.start_tick, note.duration, note.pitch, TrackRole::Arpeggio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    use crate::arrange::build_structure;
    use crate::params::StructurePattern;
    use crate::theory::chord_progression;

    fn generate(mood: Mood, seed: u64) -> (Track, HarmonyContext) {
        let mut song = Song::new();
        song.set_arrangement(build_structure(StructurePattern::ShortForm));
        let params = GeneratorParams {
            mood,
            arpeggio_enabled: true,
            ..Default::default()
        };
        let mut harmony = HarmonyContext::new();
        harmony.initialize(song.arrangement(), chord_progression(0), mood);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut track = Track::new(TrackRole::Arpeggio);
        generate_arpeggio_track(&mut track, &song, &params, &mut rng, &mut harmony);
        (track, harmony)
    }

    #[test]
    fn arpeggio_tones_follow_the_chord() {
        let (track, harmony) = generate(Mood::Synthwave, 5);
        assert!(!track.is_empty());
        for note in track.notes() {
            let tones = harmony.chord_tones_at(note.start_tick);
            assert!(
                tones.contains(&((note.pitch % 12) as i32)),
                "arpeggio pitch {} at {} not in chord",
                note.pitch,
                note.start_tick
            );
        }
    }

    #[test]
    fn notes_never_cross_chord_changes() {
        let (track, harmony) = generate(Mood::Synthwave, 5);
        for note in track.notes() {
            let change = harmony.next_chord_change_tick(note.start_tick);
            if change > note.start_tick {
                assert!(
                    note.end_tick() <= change,
                    "note at {} sustains across change at {}",
                    note.start_tick,
                    change
                );
            }
        }
    }

    #[test]
    fn sixteenth_speed_spacing() {
        let (track, _) = generate(Mood::Synthwave, 8);
        // Synthwave style is straight sixteenths: onsets land on 120-tick
        // multiples.
        for note in track.notes() {
            assert_eq!(note.start_tick % (TICKS_PER_BEAT / 4), 0);
        }
    }

    #[test]
    fn rock_style_sits_an_octave_lower() {
        let (rock, _) = generate(Mood::LightRock, 3);
        let (synth, _) = generate(Mood::Synthwave, 3);
        let avg = |t: &Track| {
            t.notes().iter().map(|n| n.pitch as u32).sum::<u32>() / t.len().max(1) as u32
        };
        assert!(avg(&rock) + 6 < avg(&synth));
    }

    #[test]
    fn clash_resolution_rewrites_unsafe_pitches() {
        let (mut track, mut harmony) = generate(Mood::Synthwave, 5);
        // Poison: register a chord cluster a semitone over every arpeggio note.
        let first = track.notes()[0];
        harmony.register_note(first.start_tick, first.duration, first.pitch + 1, TrackRole::Chord);
        resolve_arpeggio_chord_clashes(&mut track, &mut harmony);
        let fixed = track.notes()[0];
        assert_ne!(fixed.pitch, first.pitch);
    }
}
