//! Vocal melody track generation.
//!
//! Phrase-based: each vocal section generates (or reuses from the phrase
//! cache) a melody, keyed by `(section type, bars, opening chord)` so
//! repeated sections are recognizably the same tune with controlled
//! variation.  The finished line then runs the vocal-wide constraint
//! pipeline: collision avoidance with the melodic interval cap, chord
//! boundary clipping, groove feel, overlap cleanup, tie merging, velocity
//! balance, and a final interval pass.

use std::collections::HashMap;

use rand_chacha::ChaCha8Rng;

use crate::harmony::HarmonyContext;
use crate::note::modify_note;
use crate::params::{CompositionStyle, GeneratorParams, HookIntensity, StyleMelodyParams};
use crate::pitch::{
    calculate_tessitura, nearest_chord_tone_within_interval, snap_to_nearest_scale_tone,
    MAX_MELODIC_INTERVAL,
};
use crate::postprocess::{apply_groove_feel, apply_velocity_balance, merge_same_pitch_notes, remove_overlaps};
use crate::theory::{chord_progression, chord_tone_pitch_classes};
use crate::tracks::melody::{template_for, MelodyDesigner, SectionContext, extract_global_motif};
use crate::tracks::variation::{
    apply_phrase_variation, detect_cadence_type, select_phrase_variation,
};
use crate::types::{
    NoteEvent, NoteSource, PhraseBoundary, SectionType, Song, Tick, Track, TrackRole,
    TICKS_PER_BEAT, TICK_SIXTEENTH,
};

/// Cached phrase with section-relative timing.
#[derive(Debug, Clone)]
struct CachedPhrase {
    notes: Vec<NoteEvent>,
    vocal_low: u8,
    vocal_high: u8,
    reuse_count: i32,
}

type PhraseCacheKey = (SectionType, u8, i8);

/// Sections that carry a vocal at all.
pub fn section_has_vocals(section_type: SectionType) -> bool {
    !matches!(
        section_type,
        SectionType::Intro
            | SectionType::Interlude
            | SectionType::Outro
            | SectionType::Chant
            | SectionType::MixBreak
            | SectionType::Drop
    )
}

/// Register shift for a section, with a progressive lift on later verses
/// and choruses (occurrence 2 adds +2, 3+ caps at +4).
fn register_shift(section_type: SectionType, params: &StyleMelodyParams, occurrence: i32) -> i8 {
    let mut shift = match section_type {
        SectionType::A => params.verse_register_shift,
        SectionType::B => params.prechorus_register_shift,
        SectionType::Chorus => params.chorus_register_shift,
        SectionType::Bridge => params.bridge_register_shift,
        _ => 0,
    };
    if matches!(section_type, SectionType::Chorus | SectionType::A) {
        if occurrence == 2 {
            shift = shift.saturating_add(2);
        } else if occurrence >= 3 {
            shift = shift.saturating_add(occurrence.min(4) as i8);
        }
    }
    shift
}

fn density_modifier(section_type: SectionType, params: &StyleMelodyParams) -> f32 {
    match section_type {
        SectionType::A => params.verse_density_modifier,
        SectionType::B => params.prechorus_density_modifier,
        SectionType::Chorus => params.chorus_density_modifier,
        SectionType::Bridge => params.bridge_density_modifier,
        _ => 1.0,
    }
}

/// Hook sections lean on pitch repetition for catchiness.
fn consecutive_same_note_prob(section_type: SectionType, params: &StyleMelodyParams) -> f32 {
    match section_type {
        SectionType::Chorus => 0.75,
        SectionType::B => 0.65,
        _ => params.consecutive_same_note_prob,
    }
}

fn shift_timing(notes: &[NoteEvent], offset: Tick) -> Vec<NoteEvent> {
    notes
        .iter()
        .map(|n| NoteEvent {
            start_tick: n.start_tick + offset,
            lookup_tick: n.lookup_tick + offset,
            ..*n
        })
        .collect()
}

fn to_relative_timing(notes: &[NoteEvent], section_start: Tick) -> Vec<NoteEvent> {
    notes
        .iter()
        .map(|n| NoteEvent {
            start_tick: n.start_tick - section_start,
            lookup_tick: n.lookup_tick.saturating_sub(section_start),
            ..*n
        })
        .collect()
}

/// Shift cached notes into a different range by the center offset, snapping
/// back to the scale.
fn adjust_pitch_range(
    notes: &[NoteEvent],
    orig_low: u8,
    orig_high: u8,
    new_low: u8,
    new_high: u8,
) -> Vec<NoteEvent> {
    if orig_low == new_low && orig_high == new_high {
        return notes.to_vec();
    }
    let orig_center = (orig_low as i32 + orig_high as i32) / 2;
    let new_center = (new_low as i32 + new_high as i32) / 2;
    let shift = new_center - orig_center;

    notes
        .iter()
        .map(|n| {
            let mut pitch = n.pitch as i32 + shift;
            pitch = snap_to_nearest_scale_tone(pitch, 0);
            pitch = pitch.clamp(new_low as i32, new_high as i32);
            NoteEvent {
                pitch: pitch as u8,
                ..*n
            }
        })
        .collect()
}

/// Collision avoidance with the interval constraint and chord-boundary
/// clipping, per note in order.
fn apply_collision_avoidance(
    notes: &mut [NoteEvent],
    harmony: &HarmonyContext,
    vocal_low: u8,
    vocal_high: u8,
) {
    const CHORD_CHANGE_GAP: Tick = 10;

    for i in 0..notes.len() {
        let note = notes[i];
        let chord_degree = harmony.chord_degree_at(note.start_tick);

        // Divert to a safe pitch, then anchor on a chord tone and the scale.
        let safe = harmony.get_safe_pitch(
            note.pitch,
            note.start_tick,
            note.duration,
            TrackRole::Vocal,
            vocal_low,
            vocal_high,
        );
        let mut snapped = crate::pitch::nearest_chord_tone_pitch(safe as i32, chord_degree);
        snapped = snapped.clamp(vocal_low as i32, vocal_high as i32);
        snapped = snap_to_nearest_scale_tone(snapped, 0).clamp(vocal_low as i32, vocal_high as i32);
        if snapped as u8 != note.pitch {
            notes[i] = modify_note(&note, snapped as u8, NoteSource::CollisionAvoid);
        }

        // Do not sustain into a chord where the pitch stops being a chord
        // tone; trim to just before the change, keeping at least a 16th.
        let chord_change = harmony.next_chord_change_tick(notes[i].start_tick);
        if chord_change > notes[i].start_tick && notes[i].end_tick() > chord_change {
            let next_degree = harmony.chord_degree_at(chord_change);
            let pitch_class = (notes[i].pitch % 12) as i32;
            let still_tone = chord_tone_pitch_classes(next_degree).contains(&pitch_class);
            if !still_tone {
                let time_to_chord = chord_change - notes[i].start_tick;
                if time_to_chord > CHORD_CHANGE_GAP {
                    let new_duration = time_to_chord - CHORD_CHANGE_GAP;
                    if new_duration >= TICK_SIXTEENTH {
                        notes[i].duration = new_duration;
                    }
                }
            }
        }

        // Safe-pitch search may have widened the leap; re-enforce the cap.
        if i > 0 {
            let prev_pitch = notes[i - 1].pitch as i32;
            let interval = (notes[i].pitch as i32 - prev_pitch).abs();
            if interval > MAX_MELODIC_INTERVAL {
                let fixed = nearest_chord_tone_within_interval(
                    notes[i].pitch as i32,
                    prev_pitch,
                    chord_degree,
                    MAX_MELODIC_INTERVAL,
                    vocal_low,
                    vocal_high,
                );
                let current = notes[i];
                notes[i] = modify_note(&current, fixed as u8, NoteSource::CollisionAvoid);
            }
        }
    }
}

/// Lengthen and push the first notes of hook sections.
fn apply_hook_intensity(
    notes: &mut [NoteEvent],
    section_type: SectionType,
    intensity: HookIntensity,
    section_start: Tick,
) {
    if intensity == HookIntensity::Off || notes.is_empty() {
        return;
    }
    let is_hook_section = matches!(section_type, SectionType::Chorus | SectionType::B);
    if !is_hook_section && intensity != HookIntensity::Strong {
        return;
    }

    let hook_window = TICKS_PER_BEAT * 2;
    let (duration_mult, velocity_boost, max_notes) = match intensity {
        HookIntensity::Light => (1.3, 5, 1),
        HookIntensity::Normal => (1.5, 10, 2),
        HookIntensity::Strong => (2.0, 15, 3),
        HookIntensity::Off => unreachable!(),
    };

    let mut applied = 0usize;
    for note in notes.iter_mut() {
        if applied >= max_notes {
            break;
        }
        if note.start_tick >= section_start && note.start_tick < section_start + hook_window {
            note.duration = (note.duration as f32 * duration_mult) as Tick;
            note.velocity = ((note.velocity as i32) + velocity_boost).clamp(1, 127) as u8;
            applied += 1;
        }
    }
}

/// Generate the vocal track and the song's phrase boundaries.
pub fn generate_vocal_track(
    track: &mut Track,
    song: &mut Song,
    params: &GeneratorParams,
    rng: &mut ChaCha8Rng,
    harmony: &HarmonyContext,
) {
    // Effective range: shrink the top so post-modulation pitches stay
    // inside the configured ceiling, keeping at least an octave of room.
    let mut effective_low = params.vocal_low;
    let mut effective_high = params.vocal_high;
    let mod_amount = song.modulation_amount();
    if mod_amount > 0 {
        let adjusted = params.vocal_high as i32 - mod_amount as i32;
        let min_high = effective_low as i32 + 12;
        effective_high = adjusted.max(min_high) as u8;
    }

    // Stay clear of a registered motif's register.
    if !song.motif().is_empty() {
        let (motif_low, motif_high) = song.motif().analyze_range();
        if motif_high > 72 {
            effective_high = effective_high.min(72);
            if effective_high.saturating_sub(effective_low) < 12 {
                effective_low = effective_high.saturating_sub(12).max(48);
            }
        } else if motif_low < 60 {
            effective_low = effective_low.max(65);
            if effective_high.saturating_sub(effective_low) < 12 {
                effective_high = (effective_low + 12).min(96);
            }
        }
    }

    let progression = chord_progression(params.chord_id);
    let velocity_scale = match params.composition_style {
        CompositionStyle::BackgroundMotif => 0.7,
        CompositionStyle::SynthDriven => 0.75,
        CompositionStyle::MelodyLead => 1.0,
    };

    let mut designer = MelodyDesigner::new();
    let mut phrase_cache: HashMap<PhraseCacheKey, CachedPhrase> = HashMap::new();
    let mut occurrences: HashMap<SectionType, i32> = HashMap::new();
    let mut all_notes: Vec<NoteEvent> = Vec::new();

    song.clear_phrase_boundaries();
    let sections = song.arrangement().sections().to_vec();

    for section in &sections {
        if !section_has_vocals(section.section_type) {
            continue;
        }
        let occurrence = {
            let counter = occurrences.entry(section.section_type).or_insert(0);
            *counter += 1;
            *counter
        };

        let tmpl = template_for(params.vocal_style, section.section_type);
        let section_start = section.start_tick;
        let section_end = section.end_tick();
        let chord_degree =
            progression.at(section.start_bar() as usize % progression.length as usize);

        // Section register: shifted but never outside the effective range.
        let shift = register_shift(section.section_type, &params.melody, occurrence) as i32;
        let section_low = (effective_low as i32 + shift)
            .clamp(effective_low as i32, effective_high as i32 - 6) as u8;
        let section_high = (effective_high as i32 + shift)
            .clamp(effective_low as i32 + 6, effective_high as i32) as u8;

        let cache_key: PhraseCacheKey = (section.section_type, section.bars, chord_degree);
        let mut section_notes: Vec<NoteEvent>;

        if let Some(cached) = phrase_cache.get_mut(&cache_key) {
            let variation = select_phrase_variation(cached.reuse_count, occurrence, rng);
            cached.reuse_count += 1;

            section_notes = shift_timing(&cached.notes, section_start);
            apply_phrase_variation(&mut section_notes, variation, rng);
            section_notes = adjust_pitch_range(
                &section_notes,
                cached.vocal_low,
                cached.vocal_high,
                section_low,
                section_high,
            );
            // Chord context at the new position may differ; re-check.
            apply_collision_avoidance(&mut section_notes, harmony, section_low, section_high);
        } else {
            let ctx = SectionContext {
                section_type: section.section_type,
                section_start,
                section_end,
                bars: section.bars,
                mood: params.mood,
                vocal_low: section_low,
                vocal_high: section_high,
                tessitura: calculate_tessitura(section_low, section_high),
                density_modifier: density_modifier(section.section_type, &params.melody),
                thirtysecond_ratio: params.melody.thirtysecond_note_ratio,
                consecutive_same_note_prob: consecutive_same_note_prob(
                    section.section_type,
                    &params.melody,
                ),
                attitude: params.vocal_attitude,
                disable_singability: params.melody.disable_singability,
            };

            let candidate_count =
                MelodyDesigner::candidate_count_for_section(section.section_type);
            section_notes =
                designer.generate_section_with_evaluation(&tmpl, &ctx, harmony, rng, candidate_count);

            apply_collision_avoidance(&mut section_notes, harmony, section_low, section_high);

            // The first chorus donates the song's global motif; later
            // sections score higher for echoing its contour.
            if section.section_type == SectionType::Chorus && designer.global_motif().is_none() {
                designer.set_global_motif(extract_global_motif(&section_notes));
            }

            apply_hook_intensity(
                &mut section_notes,
                section.section_type,
                params.hook_intensity,
                section_start,
            );

            phrase_cache.insert(
                cache_key,
                CachedPhrase {
                    notes: to_relative_timing(&section_notes, section_start),
                    vocal_low: section_low,
                    vocal_high: section_high,
                    reuse_count: 0,
                },
            );
        }

        // Phrase boundary with cadence classification at every section end.
        if !section_notes.is_empty() {
            let cadence = detect_cadence_type(&section_notes, chord_degree);
            song.add_phrase_boundary(PhraseBoundary {
                tick: section_end,
                is_breath: true,
                is_section_end: true,
                cadence,
            });
        }

        // Seam constraint: the first note of this section must be
        // reachable from the previous section's last note.
        let seam = match (all_notes.last(), section_notes.first()) {
            (Some(prev), Some(first)) => Some((prev.pitch as i32, *first)),
            _ => None,
        };
        if let Some((prev_pitch, first)) = seam {
            let interval = (first.pitch as i32 - prev_pitch).abs();
            if interval > MAX_MELODIC_INTERVAL {
                let degree = harmony.chord_degree_at(first.start_tick);
                let fixed = nearest_chord_tone_within_interval(
                    first.pitch as i32,
                    prev_pitch,
                    degree,
                    MAX_MELODIC_INTERVAL,
                    section_low,
                    section_high,
                );
                section_notes[0] = modify_note(&first, fixed as u8, NoteSource::CollisionAvoid);
            }
        }

        // Absolute constraint: every vocal pitch on scale and in range.
        for note in &mut section_notes {
            let snapped = snap_to_nearest_scale_tone(note.pitch as i32, 0)
                .clamp(section_low as i32, section_high as i32);
            note.pitch = snapped as u8;
            all_notes.push(*note);
        }
    }

    // Vocal-wide post pipeline, in order.
    apply_groove_feel(&mut all_notes, params.vocal_groove);
    remove_overlaps(&mut all_notes, 60);
    merge_same_pitch_notes(&mut all_notes, 30);
    apply_velocity_balance(&mut all_notes, velocity_scale);

    // Final interval enforcement: catch anything the passes above widened.
    for i in 1..all_notes.len() {
        let prev_pitch = all_notes[i - 1].pitch as i32;
        let interval = (all_notes[i].pitch as i32 - prev_pitch).abs();
        if interval > MAX_MELODIC_INTERVAL {
            let degree = harmony.chord_degree_at(all_notes[i].start_tick);
            let fixed = nearest_chord_tone_within_interval(
                all_notes[i].pitch as i32,
                prev_pitch,
                degree,
                MAX_MELODIC_INTERVAL,
                params.vocal_low,
                params.vocal_high,
            );
            let current = all_notes[i];
            all_notes[i] = modify_note(&current, fixed as u8, NoteSource::CollisionAvoid);
        }
    }

    for note in all_notes {
        track.add_note(note);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    use crate::arrange::build_structure;
    use crate::params::StructurePattern;
    use crate::types::{Mood, TICKS_PER_BAR};

    fn generate(params: GeneratorParams, seed: u64) -> (Track, Song) {
        let mut song = Song::new();
        song.set_arrangement(build_structure(StructurePattern::StandardPop));
        let mut harmony = HarmonyContext::new();
        harmony.initialize(
            song.arrangement(),
            chord_progression(params.chord_id),
            params.mood,
        );
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut track = Track::new(TrackRole::Vocal);
        generate_vocal_track(&mut track, &mut song, &params, &mut rng, &harmony);
        (track, song)
    }

    fn default_params() -> GeneratorParams {
        GeneratorParams {
            mood: Mood::StraightPop,
            chord_id: 0,
            vocal_low: 60,
            vocal_high: 84,
            ..Default::default()
        }
    }

    #[test]
    fn vocal_stays_in_range_and_on_scale() {
        let (track, _) = generate(default_params(), 42);
        assert!(!track.is_empty());
        for note in track.notes() {
            assert!((60..=84).contains(&note.pitch), "pitch {}", note.pitch);
            assert!(
                crate::theory::is_scale_tone((note.pitch % 12) as i32, 0),
                "off-scale pitch {}",
                note.pitch
            );
        }
    }

    #[test]
    fn no_same_pitch_overlaps_after_postprocess() {
        let (track, _) = generate(default_params(), 7);
        let notes = track.notes();
        for pair in notes.windows(2) {
            assert!(
                pair[0].end_tick() <= pair[1].start_tick,
                "overlap at tick {}",
                pair[1].start_tick
            );
        }
    }

    #[test]
    fn interval_cap_holds_across_whole_track() {
        let (track, _) = generate(default_params(), 13);
        for pair in track.notes().windows(2) {
            let interval = (pair[1].pitch as i32 - pair[0].pitch as i32).abs();
            assert!(interval <= MAX_MELODIC_INTERVAL, "leap of {interval}");
        }
    }

    #[test]
    fn phrase_boundaries_at_vocal_section_ends() {
        let (_, song) = generate(default_params(), 3);
        assert!(!song.phrase_boundaries().is_empty());
        for boundary in song.phrase_boundaries() {
            assert!(boundary.is_section_end);
            assert_eq!(boundary.tick % TICKS_PER_BAR, 0);
        }
    }

    #[test]
    fn repeated_sections_reuse_cached_phrases() {
        // FullPop's two verse blocks share a cache key (same type, bars,
        // and opening chord), so the second rendition reuses the phrase.
        let mut song = Song::new();
        song.set_arrangement(build_structure(StructurePattern::FullPop));
        let params = default_params();
        let mut harmony = HarmonyContext::new();
        harmony.initialize(song.arrangement(), chord_progression(0), params.mood);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut track = Track::new(TrackRole::Vocal);
        generate_vocal_track(&mut track, &mut song, &params, &mut rng, &harmony);

        let a_sections: Vec<_> = song
            .arrangement()
            .sections()
            .iter()
            .filter(|s| s.section_type == SectionType::A)
            .copied()
            .collect();
        assert_eq!(a_sections.len(), 2);
        let onsets = |start: Tick, end: Tick| -> Vec<Tick> {
            track
                .notes()
                .iter()
                .filter(|n| n.start_tick >= start && n.start_tick < end)
                .map(|n| n.start_tick - start)
                .collect()
        };
        let first = onsets(a_sections[0].start_tick, a_sections[0].end_tick());
        let second = onsets(a_sections[1].start_tick, a_sections[1].end_tick());
        assert!(first.len() > 4);
        // The reused phrase keeps the rhythm recognizable: nearly every
        // onset of the first rendition recurs in the second (the named
        // variations only touch phrase edges, merging may absorb one note).
        let shared = first.iter().filter(|t| second.contains(t)).count();
        assert!(
            shared * 10 >= first.len() * 8,
            "only {shared}/{} onsets shared",
            first.len()
        );
    }

    #[test]
    fn modulation_shrinks_effective_range() {
        let params = default_params();
        let mut song = Song::new();
        song.set_arrangement(build_structure(StructurePattern::StandardPop));
        song.set_modulation(8 * TICKS_PER_BAR, 2);
        let mut harmony = HarmonyContext::new();
        harmony.initialize(song.arrangement(), chord_progression(0), params.mood);
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let mut track = Track::new(TrackRole::Vocal);
        generate_vocal_track(&mut track, &mut song, &params, &mut rng, &harmony);
        for note in track.notes() {
            assert!(note.pitch <= 82, "pre-modulation pitch {} too high", note.pitch);
        }
    }
}
