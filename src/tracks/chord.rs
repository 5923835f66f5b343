//! Chord track generation.
//!
//! Voicings follow the chord timeline (which already carries subdivision,
//! phrase-end splits, and every planned dominant), lead smoothly from bar
//! to bar, and yield to the bass, vocal, aux, and motif registers.  Rhythm
//! patterns express section energy; extensions add color with a guaranteed
//! sus resolution.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::harmony::HarmonyContext;
use crate::note::create_note;
use crate::params::{ArrangementGrowth, ChordExtensionParams, GeneratorParams};
use crate::theory::{degree_to_root, extended_chord, ChordExtension};
use crate::tracks::vocal_analysis::VocalAnalysis;
use crate::tracks::voicing::{
    clashes_with_bass, fallback_voicing, filter_against_bass, generate_voicings, select_open_subtype,
    select_voicing, select_voicing_type, VoicedChord, VoicingType,
};
use crate::types::{
    BackingDensity, Mood, NoteSource, SectionType, Song, Tick, Track, TrackRole, CHORD_HIGH,
    CHORD_LOW, TICKS_PER_BAR, TICK_EIGHTH, TICK_HALF, TICK_QUARTER, TICK_WHOLE,
};
use crate::velocity::calculate_velocity;

/// Strumming pattern for a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChordRhythm {
    Whole,
    Half,
    Quarter,
    Eighth,
}

fn adjust_sparser(rhythm: ChordRhythm) -> ChordRhythm {
    match rhythm {
        ChordRhythm::Eighth => ChordRhythm::Quarter,
        ChordRhythm::Quarter => ChordRhythm::Half,
        _ => ChordRhythm::Whole,
    }
}

fn adjust_denser(rhythm: ChordRhythm) -> ChordRhythm {
    match rhythm {
        ChordRhythm::Whole => ChordRhythm::Half,
        ChordRhythm::Half => ChordRhythm::Quarter,
        _ => ChordRhythm::Eighth,
    }
}

/// Weighted rhythm choice per section.  Energy is expressed through voicing
/// spread more than rhythm density, so even choruses stay relaxed enough to
/// give the vocal room.
fn select_rhythm(
    section: SectionType,
    mood: Mood,
    backing_density: BackingDensity,
    rng: &mut ChaCha8Rng,
) -> ChordRhythm {
    use ChordRhythm::*;
    let is_ballad = mood.is_ballad();
    let is_energetic = mood.is_dance_oriented() || mood == Mood::BrightUpbeat;

    let (allowed, weights): (&[ChordRhythm], [f32; 3]) = match section {
        SectionType::Intro | SectionType::Interlude => (&[Whole, Half], [0.70, 0.30, 0.0]),
        SectionType::Outro => (&[Half, Whole], [0.50, 0.50, 0.0]),
        SectionType::A => {
            if is_ballad {
                (&[Whole, Half], [0.60, 0.40, 0.0])
            } else {
                (&[Whole, Half, Quarter], [0.40, 0.50, 0.10])
            }
        }
        SectionType::B => {
            if is_ballad {
                (&[Half, Quarter], [0.70, 0.30, 0.0])
            } else {
                (&[Half, Quarter, Eighth], [0.50, 0.40, 0.10])
            }
        }
        SectionType::Chorus => {
            if is_ballad {
                (&[Half, Quarter], [0.65, 0.35, 0.0])
            } else if is_energetic {
                (&[Quarter, Half, Eighth], [0.50, 0.35, 0.15])
            } else {
                (&[Half, Quarter, Eighth], [0.45, 0.45, 0.10])
            }
        }
        SectionType::Bridge => {
            if is_ballad {
                (&[Whole, Half], [0.60, 0.40, 0.0])
            } else {
                (&[Whole, Half, Quarter], [0.40, 0.50, 0.10])
            }
        }
        SectionType::Chant => (&[Whole], [1.0, 0.0, 0.0]),
        SectionType::MixBreak | SectionType::Drop => {
            if is_energetic {
                (&[Eighth, Quarter], [0.60, 0.40, 0.0])
            } else {
                (&[Quarter, Eighth], [0.60, 0.40, 0.0])
            }
        }
    };

    let mut selected = allowed[0];
    if allowed.len() > 1 {
        let roll = rng.gen::<f32>();
        let mut cumulative = 0.0;
        for (i, &rhythm) in allowed.iter().enumerate() {
            cumulative += weights[i];
            if roll < cumulative {
                selected = rhythm;
                break;
            }
        }
    }

    match backing_density {
        BackingDensity::Thin => adjust_sparser(selected),
        BackingDensity::Thick => adjust_denser(selected),
        BackingDensity::Normal => selected,
    }
}

/// Extension choice by bar position and chord quality.  Sus chords favour
/// section openings and pre-cadence bars on major chords; 7ths favour B and
/// Chorus and always the dominant; 9ths favour choruses.
fn select_extension(
    degree: i8,
    section: SectionType,
    bar_in_section: u32,
    section_bars: u32,
    ext: &ChordExtensionParams,
    rng: &mut ChaCha8Rng,
) -> ChordExtension {
    if !ext.enable_sus && !ext.enable_7th && !ext.enable_9th {
        return ChordExtension::None;
    }

    let roll = rng.gen::<f32>();
    let is_minor = matches!(degree, 1 | 2 | 5);
    let is_dominant = degree == 4;
    let is_tonic = degree == 0;

    if ext.enable_sus {
        let is_sus_context =
            bar_in_section == 0 || (section_bars >= 2 && bar_in_section == section_bars - 2);
        if is_sus_context && !is_minor && roll < ext.sus_probability {
            return if rng.gen::<f32>() < 0.7 {
                ChordExtension::Sus4
            } else {
                ChordExtension::Sus2
            };
        }
    }

    if ext.enable_7th {
        let is_seventh_context =
            matches!(section, SectionType::B | SectionType::Chorus) || is_dominant;
        let mut probability = ext.seventh_probability;
        if is_dominant {
            probability *= 2.0;
        }
        if is_seventh_context && roll < probability {
            return if is_dominant {
                ChordExtension::Dom7
            } else if is_minor {
                ChordExtension::Min7
            } else {
                ChordExtension::Maj7
            };
        }
    }

    if ext.enable_9th {
        let is_ninth_context =
            section == SectionType::Chorus || (section == SectionType::B && is_dominant);
        if is_ninth_context && rng.gen::<f32>() < ext.ninth_probability {
            return if is_dominant {
                ChordExtension::Dom9
            } else if is_minor {
                ChordExtension::Min9
            } else if is_tonic {
                ChordExtension::Maj9
            } else {
                ChordExtension::Add9
            };
        }
    }

    ChordExtension::None
}

/// Anticipation stabs are only idiomatic in forward-driving sections.
fn allows_anticipation(section: SectionType) -> bool {
    matches!(
        section,
        SectionType::B
            | SectionType::Chorus
            | SectionType::MixBreak
            | SectionType::Drop
            | SectionType::A
            | SectionType::Bridge
    )
}

/// Strip voicings that double the vocal pitch class or rub (minor 2nd)
/// against bass, aux, or motif.  Clashing voices are removed when at least
/// two survive; vocal doubling is the last fallback tier before giving the
/// originals back.
fn filter_for_context(
    candidates: Vec<VoicedChord>,
    vocal_pc: i32,
    aux_pc: i32,
    bass_pc: i32,
    motif_pcs: &[i32],
) -> Vec<VoicedChord> {
    let pc_clash = |pc: i32, other: i32| -> bool { other >= 0 && clashes_with_bass(pc, other) };
    let motif_clash =
        |pc: i32| -> bool { motif_pcs.iter().any(|&m| clashes_with_bass(pc, m)) };

    let mut clean = Vec::new();
    let mut vocal_doubling_only = Vec::new();

    for v in &candidates {
        let mut doubles_vocal = false;
        let mut has_clash = false;
        for &p in v.pitches() {
            let pc = (p % 12) as i32;
            if vocal_pc >= 0 && pc == vocal_pc {
                doubles_vocal = true;
            }
            if pc_clash(pc, bass_pc) || pc_clash(pc, aux_pc) || motif_clash(pc) {
                has_clash = true;
            }
        }

        if !doubles_vocal && !has_clash {
            clean.push(*v);
        } else if !doubles_vocal {
            let mut stripped = VoicedChord {
                pitches: [0; 5],
                count: 0,
                voicing_type: v.voicing_type,
            };
            for &p in v.pitches() {
                let pc = (p % 12) as i32;
                if pc_clash(pc, bass_pc) || pc_clash(pc, aux_pc) || motif_clash(pc) {
                    continue;
                }
                stripped.pitches[stripped.count as usize] = p;
                stripped.count += 1;
            }
            if stripped.count >= 2 {
                clean.push(stripped);
            }
        } else {
            vocal_doubling_only.push(*v);
        }
    }

    if clean.is_empty() {
        if vocal_doubling_only.is_empty() {
            candidates
        } else {
            vocal_doubling_only
        }
    } else {
        clean
    }
}

/// Emit one rhythmic hit of a voicing, with per-pitch safety checks.
///
/// When collision filtering would leave fewer than two voices, voices are
/// forced back in to preserve functional harmony — the minimum-voices
/// guarantee.  Forced voices still prefer pitches consonant with the
/// sounding bass, so the bass-chord invariant survives the override.
fn emit_voicing_hit(
    track: &mut Track,
    harmony: &mut HarmonyContext,
    voicing: &VoicedChord,
    start: Tick,
    duration: Tick,
    velocity: u8,
) {
    let safe: Vec<u8> = voicing
        .pitches()
        .iter()
        .copied()
        .filter(|&p| harmony.is_pitch_safe(p, start, duration, TrackRole::Chord))
        .collect();

    let min_voices = (voicing.count as usize).min(2);
    let chosen: Vec<u8> = if safe.len() >= min_voices {
        safe
    } else {
        let degree = harmony.chord_degree_at(start);
        let bass_pcs = harmony.pitch_classes_from_track_in_range(start, start + duration, TrackRole::Bass);
        let bass_ok = |pitch: u8| -> bool {
            bass_pcs.iter().all(|&bass_pc| {
                !crate::pitch::is_dissonant_interval_with_context(
                    (pitch % 12) as i32,
                    bass_pc,
                    degree,
                )
            })
        };
        let mut ordered = safe;
        for &p in voicing.pitches() {
            if ordered.len() >= min_voices {
                break;
            }
            if !ordered.contains(&p) && bass_ok(p) {
                ordered.push(p);
            }
        }
        for &p in voicing.pitches() {
            if ordered.len() >= min_voices {
                break;
            }
            if !ordered.contains(&p) {
                ordered.push(p);
            }
        }
        ordered
    };

    for pitch in chosen {
        let note = create_note(harmony, start, duration, pitch, velocity, NoteSource::ChordVoicing);
        harmony.register_note(start, duration, pitch, TrackRole::Chord);
        track.add_note(note);
    }
}

/// Play one span (whole bar or half bar) of a voicing in the given rhythm.
fn emit_span(
    track: &mut Track,
    harmony: &mut HarmonyContext,
    voicing: &VoicedChord,
    span_start: Tick,
    span_len: Tick,
    rhythm: ChordRhythm,
    vel: u8,
) {
    let vel_weak = (vel as f32 * 0.8) as u8;
    match rhythm {
        ChordRhythm::Whole => {
            emit_voicing_hit(track, harmony, voicing, span_start, span_len, vel);
        }
        ChordRhythm::Half => {
            let half = span_len / 2;
            emit_voicing_hit(track, harmony, voicing, span_start, half, vel);
            emit_voicing_hit(track, harmony, voicing, span_start + half, half, vel_weak);
        }
        ChordRhythm::Quarter => {
            let beats = (span_len / TICK_QUARTER).max(1);
            for beat in 0..beats {
                let tick = span_start + beat * TICK_QUARTER;
                let beat_vel = if beat % 2 == 0 { vel } else { vel_weak };
                emit_voicing_hit(track, harmony, voicing, tick, TICK_QUARTER, beat_vel);
            }
        }
        ChordRhythm::Eighth => {
            let eighths = (span_len / TICK_EIGHTH).max(1);
            for eighth in 0..eighths {
                let tick = span_start + eighth * TICK_EIGHTH;
                let beat_vel = match eighth % 8 {
                    0 | 4 => vel,
                    3 | 7 => (vel as f32 * 0.7) as u8,
                    _ => (vel as f32 * 0.6) as u8,
                };
                emit_voicing_hit(track, harmony, voicing, tick, TICK_EIGHTH, beat_vel);
            }
        }
    }
}

/// Generate the full chord track.
///
/// The vocal analysis is present in the melody-lead flow; the BGM styles
/// pass `None` and rely on bass/motif context alone.
pub fn generate_chord_track(
    track: &mut Track,
    song: &Song,
    params: &GeneratorParams,
    rng: &mut ChaCha8Rng,
    harmony: &mut HarmonyContext,
    vocal: Option<&VocalAnalysis>,
) {
    let progression = crate::theory::chord_progression(params.chord_id);
    let prog_len = progression.length as u32;

    let mut prev_voicing: Option<VoicedChord> = None;
    let mut consecutive_same: i32 = 0;
    let mut prev_extension = ChordExtension::None;

    for section in song.arrangement().sections().iter() {
        let rhythm = select_rhythm(section.section_type, params.mood, section.backing_density, rng);
        let vel = calculate_velocity(section.section_type, 0, params.mood);

        for bar in 0..section.bars as u32 {
            let bar_start = section.start_tick + bar * TICKS_PER_BAR;
            let half_start = bar_start + TICK_HALF;

            let first_degree = harmony.chord_degree_at(bar_start);
            let second_degree = harmony.chord_degree_at(half_start);
            let is_split = first_degree != second_degree;

            // Context pitch classes for this bar.
            let vocal_pc = vocal.map_or(-1, |v| v.pitch_class_at(bar_start));
            let bass_pc = harmony
                .pitch_classes_from_track_at(bar_start, TrackRole::Bass)
                .first()
                .copied()
                .unwrap_or(-1);
            let aux_pc = harmony
                .pitch_classes_from_track_at(bar_start, TrackRole::Aux)
                .first()
                .copied()
                .unwrap_or(-1);
            let motif_pcs = harmony.pitch_classes_from_track_at(bar_start, TrackRole::Motif);

            // Extension for the bar's first chord, with sus resolution.
            let mut extension = select_extension(
                first_degree,
                section.section_type,
                bar,
                section.bars as u32,
                &params.chord_extension,
                rng,
            );
            if prev_extension.is_sus() && extension.is_sus() {
                extension = ChordExtension::None;
            }
            prev_extension = extension;

            let chord = extended_chord(first_degree, extension);
            let root = degree_to_root(first_degree);

            let voicing_type = select_voicing_type(section.section_type, params.mood, rng);
            let open_subtype = select_open_subtype(section.section_type, params.mood, &chord, rng);

            let candidates = generate_voicings(root, &chord, voicing_type, bass_pc, open_subtype);
            let candidates = filter_against_bass(candidates, bass_pc);
            let candidates = filter_for_context(candidates, vocal_pc, aux_pc, bass_pc, &motif_pcs);

            let voicing = select_voicing(
                &candidates,
                prev_voicing.as_ref(),
                voicing_type,
                params.mood,
                consecutive_same,
                rng,
            )
            .unwrap_or_else(|| fallback_voicing(root, &chord, bass_pc));

            if prev_voicing == Some(voicing) {
                consecutive_same += 1;
            } else {
                consecutive_same = 1;
            }

            if is_split {
                // Split bar: first half current chord, second half whatever
                // the timeline says (subdivision, anticipation, or a
                // planned dominant).
                emit_span(track, harmony, &voicing, bar_start, TICK_HALF, ChordRhythm::Half, vel);

                // A degree that departs from the plain cycle is a planned
                // dominant; give it its 7th when extensions allow.
                let cycle_degree = progression.at(((bar * 2 + 1) % prog_len.max(1)) as usize);
                let is_planned_dominant = second_degree != cycle_degree
                    && second_degree != progression.at(((bar + 1) % prog_len.max(1)) as usize);
                let second_ext = if is_planned_dominant && params.chord_extension.enable_7th {
                    ChordExtension::Dom7
                } else {
                    ChordExtension::None
                };
                let second_chord = extended_chord(second_degree, second_ext);
                let second_root = degree_to_root(second_degree);
                let second_candidates =
                    generate_voicings(second_root, &second_chord, voicing_type, bass_pc, open_subtype);
                let second_candidates = filter_against_bass(second_candidates, bass_pc);
                let second_voicing = select_voicing(
                    &second_candidates,
                    Some(&voicing),
                    voicing_type,
                    params.mood,
                    0,
                    rng,
                )
                .unwrap_or_else(|| fallback_voicing(second_root, &second_chord, bass_pc));

                let accent = ((vel as i32) + 5).min(127) as u8;
                emit_span(
                    track,
                    harmony,
                    &second_voicing,
                    half_start,
                    TICK_HALF,
                    ChordRhythm::Half,
                    accent,
                );
                prev_voicing = Some(second_voicing);
            } else {
                emit_span(track, harmony, &voicing, bar_start, TICK_WHOLE, rhythm, vel);

                // RegisterAdd growth: whole-bar lower-octave doubling in
                // choruses for intensity buildup.
                if params.arrangement_growth == ArrangementGrowth::RegisterAdd
                    && section.section_type == SectionType::Chorus
                {
                    let octave_vel = (vel as f32 * 0.8) as u8;
                    for &pitch in voicing.pitches() {
                        let lower = pitch as i32 - 12;
                        if lower >= CHORD_LOW as i32 && lower <= CHORD_HIGH as i32 {
                            let note = create_note(
                                harmony,
                                bar_start,
                                TICK_WHOLE,
                                lower as u8,
                                octave_vel,
                                NoteSource::ChordVoicing,
                            );
                            harmony.register_note(bar_start, TICK_WHOLE, lower as u8, TrackRole::Chord);
                            track.add_note(note);
                        }
                    }
                }

                prev_voicing = Some(voicing);
            }

            // Anticipation: an eighth-note stab of the next bar's chord on
            // odd, non-final bars of forward-driving sections.
            let is_not_last_bar = bar + 1 < section.bars as u32;
            if is_not_last_bar
                && bar % 2 == 1
                && allows_anticipation(section.section_type)
                && !matches!(section.section_type, SectionType::A | SectionType::Bridge)
            {
                let next_bar_start = bar_start + TICKS_PER_BAR;
                let next_degree = harmony.chord_degree_at(next_bar_start);
                let current_end_degree = harmony.chord_degree_at(next_bar_start - 1);
                if next_degree != current_end_degree {
                    let next_root = degree_to_root(next_degree);
                    let next_chord = extended_chord(next_degree, ChordExtension::None);
                    let ant_tick = bar_start + TICK_WHOLE - TICK_EIGHTH;
                    let ant_vel = (vel as f32 * 0.85) as u8;
                    for interval in next_chord.active_intervals().take(4) {
                        let mut pitch = 60 + (next_root as i32 % 12) + interval as i32;
                        if pitch > 72 {
                            pitch -= 12;
                        }
                        let pitch = pitch as u8;
                        if !harmony.is_pitch_safe(pitch, ant_tick, TICK_EIGHTH, TrackRole::Chord) {
                            continue;
                        }
                        let note = create_note(
                            harmony,
                            ant_tick,
                            TICK_EIGHTH,
                            pitch,
                            ant_vel,
                            NoteSource::ChordVoicing,
                        );
                        harmony.register_note(ant_tick, TICK_EIGHTH, pitch, TrackRole::Chord);
                        track.add_note(note);
                    }
                }
            }
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
    use crate::types::Mood;

    fn generate(mood: Mood, chord_id: u8, seed: u64) -> (Track, HarmonyContext) {
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
        let mut track = Track::new(TrackRole::Chord);
        generate_chord_track(&mut track, &song, &params, &mut rng, &mut harmony, None);
        (track, harmony)
    }

    #[test]
    fn chord_notes_stay_in_register() {
        let (track, _) = generate(Mood::StraightPop, 0, 42);
        assert!(!track.is_empty());
        for note in track.notes() {
            assert!(
                (CHORD_LOW..=CHORD_HIGH).contains(&note.pitch),
                "pitch {} out of chord register",
                note.pitch
            );
        }
    }

    #[test]
    fn every_hit_has_at_least_two_voices() {
        let (track, _) = generate(Mood::StraightPop, 0, 7);
        use std::collections::BTreeMap;
        let mut by_start: BTreeMap<Tick, usize> = BTreeMap::new();
        for note in track.notes() {
            *by_start.entry(note.start_tick).or_default() += 1;
        }
        for (tick, count) in by_start {
            assert!(count >= 2, "only {count} voices at tick {tick}");
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let (a, _) = generate(Mood::IdolPop, 3, 99);
        let (b, _) = generate(Mood::IdolPop, 3, 99);
        assert_eq!(a.notes(), b.notes());
    }

    #[test]
    fn split_bars_change_pitch_class_set_mid_bar() {
        // IdolPop chorus over Pop2 produces phrase-end splits; the split
        // bar's two halves must sound different chords.
        let (track, harmony) = generate(Mood::IdolPop, 3, 5);
        let mut found_split = false;
        for span in harmony.spans().windows(2) {
            if span[0].end == span[1].start
                && span[0].end % TICKS_PER_BAR == TICK_HALF
                && span[0].degree != span[1].degree
            {
                let bar_start = span[0].start;
                let first: Vec<u8> = track
                    .notes()
                    .iter()
                    .filter(|n| n.start_tick >= bar_start && n.start_tick < span[0].end)
                    .map(|n| n.pitch % 12)
                    .collect();
                let second: Vec<u8> = track
                    .notes()
                    .iter()
                    .filter(|n| n.start_tick >= span[0].end && n.start_tick < span[1].end)
                    .map(|n| n.pitch % 12)
                    .collect();
                if !first.is_empty() && !second.is_empty() && first != second {
                    found_split = true;
                    break;
                }
            }
        }
        assert!(found_split, "expected at least one sounding split bar");
    }
}
