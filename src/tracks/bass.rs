//! Bass track generation.
//!
//! Harmonic anchor and rhythmic foundation.  Pattern-based bars with
//! approach notes at chord boundaries; every root is read from the chord
//! timeline, so planned dominants and split bars land here automatically.
//! The vocal-first variant shapes register and motion against the melody.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::harmony::HarmonyContext;
use crate::note::create_note;
use crate::params::GeneratorParams;
use crate::pitch::is_dissonant_interval;
use crate::theory::{degree_to_root, SCALE};
use crate::tracks::vocal_analysis::VocalAnalysis;
use crate::types::{
    clamp_bass, BackingDensity, Mood, NoteSource, SectionType, Song, Tick, Track, TrackRole,
    BASS_HIGH, BASS_LOW, TICKS_PER_BAR, TICK_EIGHTH, TICK_HALF, TICK_QUARTER,
};
use crate::velocity::calculate_velocity;

/// Rhythmic skeleton for a bar of bass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BassPattern {
    /// Sustained roots for stability.
    WholeNote,
    /// Root-fifth alternation (classic pop/rock).
    RootFifth,
    /// Off-beat accents for groove.
    Syncopated,
    /// Eighth-note pulse for energy.
    Driving,
    /// Bass drives the rhythm when drums are off.
    RhythmicDrive,
    /// Quarter-note scale walk (jazz influence).
    Walking,
}

/// How the bass moves relative to the vocal line (vocal-first flow).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MotionType {
    Contrary,
    Similar,
    Parallel,
    Oblique,
}

/// Natural minor scale intervals, used for walking lines over minor chords.
const MINOR_SCALE: [i32; 7] = [0, 2, 3, 5, 7, 8, 10];

/// Root pitch for a degree in the bass register: one octave below the C4
/// root, clamped into the playable range (so A3 lands on the register
/// ceiling rather than dropping a full octave).
fn bass_root(degree: i8) -> u8 {
    clamp_bass(degree_to_root(degree) as i32 - 12)
}

fn fifth_of(root: u8) -> u8 {
    clamp_bass(root as i32 + 7)
}

/// Octave above the root, or the root itself when out of range.
fn octave_of(root: u8) -> u8 {
    let octave = root as i32 + 12;
    if octave > BASS_HIGH as i32 {
        root
    } else {
        octave as u8
    }
}

/// Scale tone above the root (1-indexed degree), major or natural minor.
fn scale_tone(root: u8, scale_degree: i32, is_minor: bool) -> u8 {
    let degree = scale_degree.max(1);
    let normalized = ((degree - 1) % 7) as usize;
    let octave_offset = (degree - 1) / 7 * 12;
    let interval = if is_minor {
        MINOR_SCALE[normalized]
    } else {
        SCALE[normalized]
    } + octave_offset;
    clamp_bass(root as i32 + interval)
}

/// All plausible chord tones over a target root (both 3rds, 5th, 6th, both
/// 7ths), for conservative approach-note clash checking.
fn all_possible_chord_tones(root: u8) -> [i32; 7] {
    let pc = (root % 12) as i32;
    [
        pc,
        (pc + 3) % 12,
        (pc + 4) % 12,
        (pc + 7) % 12,
        (pc + 9) % 12,
        (pc + 10) % 12,
        (pc + 11) % 12,
    ]
}

/// Approach note into the next root: fifth below (V-I motion) when it
/// cannot rub any target chord tone, else root an octave below, else the
/// root itself.
fn approach_note(current_root: u8, next_root: u8) -> u8 {
    if next_root == current_root {
        return current_root;
    }
    let chord_tones = all_possible_chord_tones(next_root);

    let mut approach = next_root as i32 - 7;
    if approach < BASS_LOW as i32 {
        approach = next_root as i32 + 5; // fourth above: same pitch class
    }
    let approach_pc = approach.rem_euclid(12);
    let clashes = chord_tones
        .iter()
        .any(|&tone| is_dissonant_interval(approach_pc, tone));
    if !clashes {
        return clamp_bass(approach);
    }

    let octave_below = next_root as i32 - 12;
    if octave_below >= BASS_LOW as i32 {
        return clamp_bass(octave_below);
    }
    clamp_bass(next_root as i32)
}

fn adjust_sparser(pattern: BassPattern) -> BassPattern {
    match pattern {
        BassPattern::Driving => BassPattern::Syncopated,
        BassPattern::Syncopated => BassPattern::RootFifth,
        BassPattern::RhythmicDrive => BassPattern::Syncopated,
        BassPattern::RootFifth => BassPattern::WholeNote,
        BassPattern::WholeNote => BassPattern::WholeNote,
        BassPattern::Walking => BassPattern::RootFifth,
    }
}

fn adjust_denser(pattern: BassPattern) -> BassPattern {
    match pattern {
        BassPattern::WholeNote => BassPattern::RootFifth,
        BassPattern::RootFifth => BassPattern::Syncopated,
        BassPattern::Syncopated => BassPattern::Driving,
        other => other,
    }
}

/// Pattern choice per section with weighted variation.  With drums off the
/// bass takes rhythmic responsibility.
fn select_pattern(
    section: SectionType,
    drums_enabled: bool,
    mood: Mood,
    backing_density: BackingDensity,
    rng: &mut ChaCha8Rng,
) -> BassPattern {
    use BassPattern::*;

    if !drums_enabled {
        if matches!(
            section,
            SectionType::Intro | SectionType::Interlude | SectionType::Outro
        ) {
            return RootFifth;
        }
        return RhythmicDrive;
    }

    let is_ballad = mood.is_ballad();
    let is_dance = mood.is_dance_oriented();
    let is_jazz = mood.is_jazz_influenced();

    let allowed: &[BassPattern] = match section {
        SectionType::Intro | SectionType::Interlude => &[WholeNote, RootFifth],
        SectionType::Outro => {
            if is_ballad {
                &[WholeNote, RootFifth]
            } else {
                &[RootFifth, WholeNote]
            }
        }
        SectionType::A => {
            if is_ballad {
                &[WholeNote, RootFifth]
            } else if is_jazz {
                &[Walking, RootFifth, Syncopated]
            } else {
                &[RootFifth, WholeNote, Syncopated]
            }
        }
        SectionType::B => {
            if is_ballad {
                &[RootFifth, WholeNote]
            } else if is_jazz {
                &[Walking, Syncopated, RootFifth]
            } else {
                &[Syncopated, RootFifth, Driving]
            }
        }
        SectionType::Chorus => {
            if is_ballad {
                &[RootFifth, Syncopated]
            } else if is_dance {
                &[Driving, Syncopated]
            } else {
                &[Syncopated, Driving, RootFifth]
            }
        }
        SectionType::Bridge => {
            if is_ballad {
                &[WholeNote, RootFifth]
            } else {
                &[RootFifth, WholeNote, Syncopated]
            }
        }
        SectionType::Chant => &[WholeNote],
        SectionType::MixBreak | SectionType::Drop => {
            if is_dance {
                &[Driving, Syncopated]
            } else {
                &[Syncopated, Driving]
            }
        }
    };

    // 60% primary, 30% secondary, 10% third when it exists.
    let selected = if allowed.len() == 1 {
        allowed[0]
    } else {
        let roll = rng.gen::<f32>();
        if roll < 0.60 {
            allowed[0]
        } else if roll < 0.90 || allowed.len() == 2 {
            allowed[1]
        } else {
            allowed[allowed.len().min(3) - 1]
        }
    };

    match backing_density {
        BackingDensity::Thin => adjust_sparser(selected),
        BackingDensity::Thick => adjust_denser(selected),
        BackingDensity::Normal => selected,
    }
}

/// Pattern choice from the vocal's busyness (rhythmic complementation):
/// dense vocal → sparse bass, sparse vocal → active bass.
fn select_pattern_for_vocal_density(
    vocal_density: f32,
    section: SectionType,
    mood: Mood,
    rng: &mut ChaCha8Rng,
) -> BassPattern {
    if matches!(
        section,
        SectionType::Chant | SectionType::Intro | SectionType::Outro
    ) {
        return BassPattern::WholeNote;
    }
    if vocal_density > 0.6 {
        return BassPattern::WholeNote;
    }
    if vocal_density < 0.3 {
        return if mood.is_jazz_influenced() {
            BassPattern::Walking
        } else {
            BassPattern::Driving
        };
    }
    select_pattern(section, true, mood, BackingDensity::Normal, rng)
}

// ═══════════════════════════════════════════════════════════════════════
// Note emission
// ═══════════════════════════════════════════════════════════════════════

/// Add a required bass note: keep the desired pitch when safe (including
/// the full-duration tritone check against the chord), otherwise divert
/// through the harmony context's safe-pitch search.
fn add_required(
    track: &mut Track,
    harmony: &mut HarmonyContext,
    start: Tick,
    duration: Tick,
    pitch: u8,
    velocity: u8,
) {
    let safe = harmony.is_pitch_safe(pitch, start, duration, TrackRole::Bass)
        && !harmony.has_tritone_with_chord_in_duration(pitch, start, duration);
    let resolved = if safe {
        pitch
    } else {
        harmony.get_safe_pitch(pitch, start, duration, TrackRole::Bass, BASS_LOW, BASS_HIGH)
    };
    let mut note = create_note(harmony, start, duration, resolved, velocity, NoteSource::BassPattern);
    note.original_pitch = pitch;
    harmony.register_note(start, duration, resolved, TrackRole::Bass);
    track.add_note(note);
}

/// Add an ornamental bass note only when safe; fall back to the root.
fn add_or_root(
    track: &mut Track,
    harmony: &mut HarmonyContext,
    start: Tick,
    duration: Tick,
    pitch: u8,
    root: u8,
    velocity: u8,
) {
    let safe = harmony.is_pitch_safe(pitch, start, duration, TrackRole::Bass)
        && !harmony.has_tritone_with_chord_in_duration(pitch, start, duration);
    if safe {
        let note = create_note(harmony, start, duration, pitch, velocity, NoteSource::BassPattern);
        harmony.register_note(start, duration, pitch, TrackRole::Bass);
        track.add_note(note);
    } else {
        add_required(track, harmony, start, duration, root, velocity);
    }
}

/// One bar of a bass pattern.
#[allow(clippy::too_many_arguments)]
fn generate_bass_bar(
    track: &mut Track,
    harmony: &mut HarmonyContext,
    bar_start: Tick,
    root: u8,
    next_root: u8,
    pattern: BassPattern,
    section: SectionType,
    mood: Mood,
    is_last_bar: bool,
) {
    let vel = calculate_velocity(section, 0, mood);
    let vel_weak = (vel as f32 * 0.85) as u8;
    let fifth = fifth_of(root);
    let octave = octave_of(root);
    const Q: Tick = TICK_QUARTER;
    const E: Tick = TICK_EIGHTH;

    match pattern {
        BassPattern::WholeNote => {
            add_required(track, harmony, bar_start, TICK_HALF, root, vel);
            add_required(track, harmony, bar_start + TICK_HALF, TICK_HALF, root, vel_weak);
        }

        BassPattern::RootFifth => {
            add_required(track, harmony, bar_start, Q, root, vel);
            add_required(track, harmony, bar_start + Q, Q, root, vel_weak);
            add_or_root(track, harmony, bar_start + 2 * Q, Q, fifth, root, vel);
            add_required(track, harmony, bar_start + 3 * Q, Q, root, vel_weak);
        }

        BassPattern::Syncopated => {
            add_required(track, harmony, bar_start, Q, root, vel);
            add_or_root(track, harmony, bar_start + Q, E, fifth, root, vel_weak);
            add_required(track, harmony, bar_start + Q + E, E, root, vel_weak);
            add_required(track, harmony, bar_start + 2 * Q, Q, root, vel);
            if is_last_bar || next_root != root {
                let approach = approach_note(root, next_root);
                add_or_root(track, harmony, bar_start + 3 * Q + E, E, approach, fifth, vel_weak);
            } else {
                add_or_root(track, harmony, bar_start + 3 * Q, Q, fifth, root, vel_weak);
            }
        }

        BassPattern::Driving => {
            for beat in 0..4u32 {
                let beat_tick = bar_start + beat * Q;
                let beat_vel = if beat % 2 == 0 { vel } else { vel_weak };
                add_required(track, harmony, beat_tick, E, root, beat_vel);
                let second = match beat {
                    0 => octave,
                    2 => fifth,
                    _ => root,
                };
                add_or_root(track, harmony, beat_tick + E, E, second, root, vel_weak);
            }
        }

        BassPattern::RhythmicDrive => {
            let accent_vel = ((vel as i32) + 10).min(127) as u8;
            for eighth in 0..8u32 {
                let tick = bar_start + eighth * E;
                match eighth {
                    0 => add_required(track, harmony, tick, E, root, accent_vel),
                    3 => add_or_root(track, harmony, tick, E, fifth, root, vel_weak),
                    4 => add_required(track, harmony, tick, E, root, vel),
                    7 => {
                        let pitch = if next_root != root {
                            approach_note(root, next_root)
                        } else {
                            octave
                        };
                        add_or_root(track, harmony, tick, E, pitch, root, vel_weak);
                    }
                    _ => add_required(track, harmony, tick, E, root, vel_weak),
                }
            }
        }

        BassPattern::Walking => {
            // Minor scale walk for ii/iii/vi chords.
            let root_pc = root % 12;
            let is_minor = matches!(root_pc, 2 | 4 | 9);
            let approach = if next_root != root {
                approach_note(root, next_root)
            } else {
                scale_tone(root, 5, is_minor)
            };

            add_required(track, harmony, bar_start, Q, root, vel);
            add_or_root(track, harmony, bar_start + Q, Q, scale_tone(root, 2, is_minor), root, vel_weak);
            add_or_root(track, harmony, bar_start + 2 * Q, Q, scale_tone(root, 3, is_minor), root, vel);
            add_or_root(track, harmony, bar_start + 3 * Q, Q, approach, fifth_of(root), vel_weak);
        }
    }
}

/// Half-bar of bass for split bars: roots with a light fifth on the first
/// half, accented roots on the second (dominant emphasis).
fn generate_bass_half_bar(
    track: &mut Track,
    harmony: &mut HarmonyContext,
    half_start: Tick,
    root: u8,
    section: SectionType,
    mood: Mood,
    is_first_half: bool,
) {
    let vel = calculate_velocity(section, 0, mood);
    let vel_weak = (vel as f32 * 0.85) as u8;
    const Q: Tick = TICK_QUARTER;

    if is_first_half {
        add_required(track, harmony, half_start, Q, root, vel);
        add_or_root(track, harmony, half_start + Q, Q, fifth_of(root), root, vel_weak);
    } else {
        let accent = ((vel as i32) + 5).min(127) as u8;
        add_required(track, harmony, half_start, Q, root, accent);
        add_required(track, harmony, half_start + Q, Q, root, vel_weak);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Vocal-aware adjustments
// ═══════════════════════════════════════════════════════════════════════

fn is_diatonic(pitch: i32) -> bool {
    SCALE.contains(&pitch.rem_euclid(12))
}

fn clashes_with_vocal(bass_pitch: i32, vocal_pitch: i32) -> bool {
    if vocal_pitch <= 0 {
        return false;
    }
    let mut interval = ((bass_pitch % 12) - (vocal_pitch % 12)).abs();
    if interval > 6 {
        interval = 12 - interval;
    }
    interval == 1
}

/// Weighted motion choice from the vocal's direction.  Oblique when the
/// vocal is static.
fn select_motion_type(vocal_direction: i8, rng: &mut ChaCha8Rng) -> MotionType {
    if vocal_direction == 0 {
        return MotionType::Oblique;
    }
    let roll = rng.gen::<f32>();
    if roll < 0.40 {
        MotionType::Contrary
    } else if roll < 0.70 {
        MotionType::Oblique
    } else if roll < 0.90 {
        MotionType::Similar
    } else {
        MotionType::Parallel
    }
}

/// Adjust the bar's root for the chosen motion against the vocal.
///
/// Pitch-class doubling within two octaves of the vocal drops an octave;
/// motion adjustments apply only when the result stays diatonic and clear
/// of a minor 2nd with the vocal; a residual clash resolves by whole-step
/// or octave movement (vocal priority: the bass yields).
fn adjust_pitch_for_motion(
    base_pitch: u8,
    motion: MotionType,
    vocal_direction: i8,
    vocal_pitch: u8,
) -> u8 {
    const MIN_OCTAVE_SEPARATION: i32 = 24;
    let mut bass = base_pitch as i32;
    let vocal = vocal_pitch as i32;

    if vocal > 0 {
        let separation = (bass - vocal).abs();
        if bass % 12 == vocal % 12 && separation < MIN_OCTAVE_SEPARATION {
            if bass - 12 >= BASS_LOW as i32 {
                bass -= 12;
            } else if bass + 12 <= BASS_HIGH as i32 {
                bass += 12;
            }
        }
    }

    let proposed = match motion {
        MotionType::Contrary => {
            if vocal_direction > 0 && bass - 2 >= BASS_LOW as i32 {
                bass - 2
            } else if vocal_direction < 0 && bass + 2 <= BASS_HIGH as i32 {
                bass + 2
            } else {
                bass
            }
        }
        MotionType::Similar => {
            if vocal_direction > 0 && bass + 1 <= BASS_HIGH as i32 {
                bass + 1
            } else if vocal_direction < 0 && bass - 1 >= BASS_LOW as i32 {
                bass - 1
            } else {
                bass
            }
        }
        MotionType::Parallel | MotionType::Oblique => bass,
    };

    if proposed != bass && is_diatonic(proposed) && !clashes_with_vocal(proposed, vocal) {
        bass = proposed;
    }

    if clashes_with_vocal(bass, vocal) {
        if bass - 2 >= BASS_LOW as i32 && is_diatonic(bass - 2) && !clashes_with_vocal(bass - 2, vocal)
        {
            bass -= 2;
        } else if bass + 2 <= BASS_HIGH as i32
            && is_diatonic(bass + 2)
            && !clashes_with_vocal(bass + 2, vocal)
        {
            bass += 2;
        } else if bass - 12 >= BASS_LOW as i32 {
            bass -= 12;
        }
    }

    clamp_bass(bass)
}

// ═══════════════════════════════════════════════════════════════════════
// Track generation
// ═══════════════════════════════════════════════════════════════════════

/// Standard flow: bass generated first, pattern from section/mood tables.
pub fn generate_bass_track(
    track: &mut Track,
    song: &Song,
    params: &GeneratorParams,
    rng: &mut ChaCha8Rng,
    harmony: &mut HarmonyContext,
) {
    generate_impl(track, song, params, rng, harmony, None);
}

/// Vocal-first flow: pattern from vocal density, roots adjusted for motion
/// against the melody.
pub fn generate_bass_track_with_vocal(
    track: &mut Track,
    song: &Song,
    params: &GeneratorParams,
    rng: &mut ChaCha8Rng,
    vocal: &VocalAnalysis,
    harmony: &mut HarmonyContext,
) {
    generate_impl(track, song, params, rng, harmony, Some(vocal));
}

fn generate_impl(
    track: &mut Track,
    song: &Song,
    params: &GeneratorParams,
    rng: &mut ChaCha8Rng,
    harmony: &mut HarmonyContext,
    vocal: Option<&VocalAnalysis>,
) {
    let total_ticks = song.arrangement().total_ticks();

    for section in song.arrangement().sections().iter() {
        let pattern = match vocal {
            Some(analysis) => {
                let density = analysis.density_for_section(section);
                select_pattern_for_vocal_density(density, section.section_type, params.mood, rng)
            }
            None => select_pattern(
                section.section_type,
                params.drums_enabled,
                params.mood,
                section.backing_density,
                rng,
            ),
        };

        for bar in 0..section.bars as u32 {
            let bar_start = section.start_tick + bar * TICKS_PER_BAR;
            let half_start = bar_start + TICK_HALF;
            let is_last_bar = bar + 1 == section.bars as u32;

            let first_degree = harmony.chord_degree_at(bar_start);
            let second_degree = harmony.chord_degree_at(half_start);

            let mut root = bass_root(first_degree);

            // Next root: the next bar's first chord (wrap to self at the end).
            let next_bar_start = bar_start + TICKS_PER_BAR;
            let next_degree = if next_bar_start < total_ticks {
                harmony.chord_degree_at(next_bar_start)
            } else {
                first_degree
            };
            let next_root = bass_root(next_degree);

            if let Some(analysis) = vocal {
                let vocal_direction = analysis.direction_at(bar_start);
                let vocal_pitch = analysis.pitch_at(bar_start);
                let motion = select_motion_type(vocal_direction, rng);
                root = adjust_pitch_for_motion(root, motion, vocal_direction, vocal_pitch);
            }

            if first_degree != second_degree {
                // Split bar: mirror the chord track's half-bar change.
                let second_root = bass_root(second_degree);
                generate_bass_half_bar(
                    track,
                    harmony,
                    bar_start,
                    root,
                    section.section_type,
                    params.mood,
                    true,
                );
                generate_bass_half_bar(
                    track,
                    harmony,
                    half_start,
                    second_root,
                    section.section_type,
                    params.mood,
                    false,
                );
                continue;
            }

            generate_bass_bar(
                track,
                harmony,
                bar_start,
                root,
                next_root,
                pattern,
                section.section_type,
                params.mood,
                is_last_bar,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    use crate::arrange::build_structure;
    use crate::params::StructurePattern;
    use crate::theory::chord_progression;

    fn generate(mood: Mood, chord_id: u8, seed: u64) -> Track {
        let mut song = Song::new();
        song.set_arrangement(build_structure(StructurePattern::ShortForm));
        let params = GeneratorParams {
            mood,
            chord_id,
            ..Default::default()
        };
        let mut harmony = HarmonyContext::new();
        harmony.initialize(song.arrangement(), chord_progression(chord_id), mood);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut track = Track::new(TrackRole::Bass);
        generate_bass_track(&mut track, &song, &params, &mut rng, &mut harmony);
        track
    }

    #[test]
    fn bass_root_octave_placement() {
        assert_eq!(bass_root(0), 48); // C3
        assert_eq!(bass_root(4), 55); // G3
        assert_eq!(bass_root(5), 55); // A3 clamps to the register ceiling
        assert_eq!(bass_root(3), 53); // F3
    }

    #[test]
    fn all_notes_in_bass_register() {
        let track = generate(Mood::StraightPop, 0, 42);
        assert!(!track.is_empty());
        for note in track.notes() {
            assert!(
                (BASS_LOW..=BASS_HIGH).contains(&note.pitch),
                "pitch {}",
                note.pitch
            );
        }
    }

    #[test]
    fn canon_roots_on_bar_downbeats() {
        // A section of ShortForm starts at bar 2; Canon cycle I V vi IV.
        let track = generate(Mood::StraightPop, 0, 42);
        let a_start = 2 * TICKS_PER_BAR;
        let expected = [48u8, 55, 55, 53];
        for (bar, &root) in expected.iter().enumerate() {
            let bar_tick = a_start + bar as Tick * TICKS_PER_BAR;
            let downbeat = track
                .notes()
                .iter()
                .find(|n| n.start_tick == bar_tick)
                .unwrap_or_else(|| panic!("no note at bar {bar}"));
            assert_eq!(downbeat.pitch, root, "bar {bar}");
        }
    }

    #[test]
    fn approach_note_avoids_clash_with_target() {
        // Into C (48): fifth below is G (43), consonant with C chord tones.
        assert_eq!(approach_note(53, 48), 43);
        // Same root: no approach movement.
        assert_eq!(approach_note(48, 48), 48);
    }

    #[test]
    fn motion_adjustment_respects_diatonic_and_vocal() {
        // Vocal on E5 (76), bass root E3 (52): same pitch class within two
        // octaves drops an octave.
        let adjusted = adjust_pitch_for_motion(52, MotionType::Oblique, 0, 76);
        assert_eq!(adjusted, 40);
        // Contrary motion against a rising vocal moves down a whole step
        // when diatonic.
        let adjusted = adjust_pitch_for_motion(48, MotionType::Contrary, 1, 72);
        assert!(adjusted == 46 || adjusted == 48); // Bb non-diatonic -> kept
        assert_eq!(adjusted, 48);
    }

    #[test]
    fn deterministic_per_seed() {
        let a = generate(Mood::CityPop, 19, 9);
        let b = generate(Mood::CityPop, 19, 9);
        assert_eq!(a.notes(), b.notes());
    }

    #[test]
    fn walking_pattern_emits_quarter_notes() {
        // CityPop verses favour walking bass; check quarter-note spacing in
        // some A-section bar.
        let track = generate(Mood::CityPop, 0, 4);
        let a_start = 2 * TICKS_PER_BAR;
        let bar_notes: Vec<_> = track
            .notes()
            .iter()
            .filter(|n| n.start_tick >= a_start && n.start_tick < a_start + TICKS_PER_BAR)
            .collect();
        assert!(bar_notes.len() >= 2);
    }
}
