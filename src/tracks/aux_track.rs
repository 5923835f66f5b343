//! Aux track: sub-melodies and accent patterns behind the lead vocal.
//!
//! Nine functions: PulseLoop, TargetHint, GrooveAccent, PhraseTail,
//! EmotionalPad, Unison, Harmony (3rd above/below), MelodicHook, and
//! MotifCounter.  All pitches clear the harmony context before landing;
//! notes that would sustain into a chord where they stop being chord tones
//! are clipped short of the boundary.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::harmony::HarmonyContext;
use crate::note::{PitchFallback, SafeNote};
use crate::pitch::{calculate_tessitura, snap_to_nearest_scale_tone, TessituraRange};
use crate::theory::chord_tone_pitch_classes;
use crate::tracks::vocal_analysis::VocalAnalysis;
use crate::types::{
    Mood, NoteEvent, NoteSource, PhraseBoundary, SectionType, Song, Tick, Track, TrackRole,
    TICKS_PER_BAR, TICKS_PER_BEAT, TICK_EIGHTH, TICK_QUARTER, TICK_SIXTEENTH,
};
use crate::velocity::calculate_velocity;

/// What the aux track does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxFunction {
    /// Hypnotic chord-tone pulse.
    PulseLoop,
    /// Anticipates the next section's harmony at phrase ends.
    TargetHint,
    /// Root/fifth emphasis on off-beats.
    GrooveAccent,
    /// Fills the gap after vocal phrases (call and response).
    PhraseTail,
    /// Sustained chord tones for atmosphere.
    EmotionalPad,
    /// Doubles the melody.
    Unison,
    /// Parallel 3rds against the melody.
    Harmony,
    /// Iconic riff in instrumental sections.
    MelodicHook,
    /// Counter-melody in contrary/oblique motion.
    MotifCounter,
}

/// Third above or below for the Harmony function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmonyMode {
    ThirdAbove,
    ThirdBelow,
}

/// Default aux character per mood.
pub fn aux_function_for_mood(mood: Mood) -> AuxFunction {
    if mood.is_ballad() {
        AuxFunction::EmotionalPad
    } else if mood.is_dance_oriented() {
        AuxFunction::PulseLoop
    } else if mood.is_jazz_influenced() {
        AuxFunction::GrooveAccent
    } else if mood.is_synth_oriented() {
        AuxFunction::MotifCounter
    } else {
        AuxFunction::Harmony
    }
}

/// Working range for aux material: above the vocal's comfortable center so
/// the two lines do not fight for the same register.
fn aux_range(tessitura: &TessituraRange) -> (u8, u8) {
    let low = (tessitura.center as i32 + 4).clamp(55, 90) as u8;
    let high = (low as i32 + 16).clamp(low as i32 + 4, 96) as u8;
    (low, high)
}

/// Clip a duration so the note does not sustain into a chord where its
/// pitch stops being a chord tone.  Keeps at least a sixteenth.
fn clip_to_chord_boundary(
    harmony: &HarmonyContext,
    pitch: u8,
    start: Tick,
    duration: Tick,
) -> Tick {
    const GAP: Tick = 20;
    let change = harmony.next_chord_change_tick(start);
    if change <= start || start + duration <= change {
        return duration;
    }
    let pitch_class = (pitch % 12) as i32;
    let next_degree = harmony.chord_degree_at(change);
    if chord_tone_pitch_classes(next_degree).contains(&pitch_class) {
        return duration;
    }
    let clipped = change.saturating_sub(start).saturating_sub(GAP);
    if clipped >= TICK_SIXTEENTH {
        clipped
    } else {
        duration
    }
}

/// Nearest chord tone at the tick inside the range, starting from a
/// preferred pitch.
fn chord_tone_near(
    harmony: &HarmonyContext,
    tick: Tick,
    preferred: i32,
    low: u8,
    high: u8,
) -> Option<u8> {
    let mut best: i32 = -1;
    let mut best_dist = i32::MAX;
    for pc in harmony.chord_tones_at(tick) {
        for octave in 3..=7 {
            let candidate = octave * 12 + pc;
            if candidate < low as i32 || candidate > high as i32 {
                continue;
            }
            let dist = (candidate - preferred).abs();
            if dist < best_dist {
                best_dist = dist;
                best = candidate;
            }
        }
    }
    (best >= 0).then(|| best as u8)
}

/// Everything an aux generator needs for one section.
struct AuxContext<'a> {
    section_start: Tick,
    section_end: Tick,
    section_type: SectionType,
    mood: Mood,
    low: u8,
    high: u8,
    vocal_notes: &'a [NoteEvent],
    vocal: &'a VocalAnalysis,
    boundaries: &'a [PhraseBoundary],
}

fn emit(
    track: &mut Track,
    harmony: &mut HarmonyContext,
    ctx: &AuxContext,
    start: Tick,
    duration: Tick,
    pitch: u8,
    velocity: u8,
) -> bool {
    let duration = clip_to_chord_boundary(harmony, pitch, start, duration);
    SafeNote::at(start, duration)
        .pitch(pitch)
        .velocity(velocity)
        .role(TrackRole::Aux)
        .source(NoteSource::Aux)
        .fallback(PitchFallback::ChordTone(ctx.low, ctx.high))
        .add_to(track, harmony)
}

// ═══════════════════════════════════════════════════════════════════════
// Function generators
// ═══════════════════════════════════════════════════════════════════════

fn generate_pulse_loop(
    track: &mut Track,
    harmony: &mut HarmonyContext,
    ctx: &AuxContext,
    rng: &mut ChaCha8Rng,
) {
    let vel = (calculate_velocity(ctx.section_type, 1, ctx.mood) as f32 * 0.8) as u8;
    let mut tick = ctx.section_start;
    while tick < ctx.section_end {
        if rng.gen::<f32>() < 0.85 {
            let root_pc = harmony.chord_tones_at(tick).first().copied().unwrap_or(0);
            let preferred = ctx.low as i32 + (ctx.high - ctx.low) as i32 / 2;
            let base = chord_tone_near(harmony, tick, preferred, ctx.low, ctx.high)
                .unwrap_or(((preferred / 12) * 12 + root_pc) as u8);
            emit(track, harmony, ctx, tick, TICK_EIGHTH - 20, base, vel);
        }
        tick += TICK_EIGHTH;
    }
}

fn generate_target_hint(
    track: &mut Track,
    harmony: &mut HarmonyContext,
    ctx: &AuxContext,
) {
    let vel = (calculate_velocity(ctx.section_type, 1, ctx.mood) as f32 * 0.75) as u8;
    for boundary in ctx.boundaries {
        if boundary.tick <= ctx.section_start || boundary.tick > ctx.section_end {
            continue;
        }
        // One soft note an eighth before the boundary, voicing where the
        // music is going.
        let start = boundary.tick - TICK_EIGHTH;
        let preferred = ctx.low as i32 + 7;
        if let Some(pitch) = chord_tone_near(harmony, boundary.tick, preferred, ctx.low, ctx.high) {
            emit(track, harmony, ctx, start, TICK_EIGHTH, pitch, vel);
        }
    }
}

fn generate_groove_accent(
    track: &mut Track,
    harmony: &mut HarmonyContext,
    ctx: &AuxContext,
) {
    let vel = (calculate_velocity(ctx.section_type, 1, ctx.mood) as f32 * 0.85) as u8;
    let mut bar_start = ctx.section_start;
    while bar_start < ctx.section_end {
        // Off-beats of 2 and 4.
        for beat in [1u32, 3] {
            let tick = bar_start + beat * TICKS_PER_BEAT + TICK_EIGHTH;
            if tick >= ctx.section_end {
                continue;
            }
            let tones = harmony.chord_tones_at(tick);
            let pc = if beat == 1 {
                tones.first().copied().unwrap_or(0)
            } else {
                tones.get(2).copied().unwrap_or(7)
            };
            let preferred = ctx.low as i32 + pc;
            if let Some(pitch) = chord_tone_near(harmony, tick, preferred, ctx.low, ctx.high) {
                emit(track, harmony, ctx, tick, TICK_EIGHTH, pitch, vel);
            }
        }
        bar_start += TICKS_PER_BAR;
    }
}

fn generate_phrase_tail(
    track: &mut Track,
    harmony: &mut HarmonyContext,
    ctx: &AuxContext,
) {
    let vel = (calculate_velocity(ctx.section_type, 1, ctx.mood) as f32 * 0.7) as u8;
    for boundary in ctx.boundaries {
        if !boundary.is_breath || boundary.tick <= ctx.section_start || boundary.tick >= ctx.section_end
        {
            continue;
        }
        // Echo the last vocal pitch a third lower after the breath.
        let last_vocal = ctx
            .vocal_notes
            .iter()
            .rev()
            .find(|n| n.end_tick() <= boundary.tick);
        if let Some(vocal_note) = last_vocal {
            let preferred = vocal_note.pitch as i32 - 4;
            if let Some(pitch) = chord_tone_near(harmony, boundary.tick, preferred, ctx.low, ctx.high)
            {
                emit(track, harmony, ctx, boundary.tick, TICK_QUARTER, pitch, vel);
                emit(
                    track,
                    harmony,
                    ctx,
                    boundary.tick + TICK_QUARTER,
                    TICK_QUARTER,
                    pitch,
                    (vel as f32 * 0.85) as u8,
                );
            }
        }
    }
}

fn generate_emotional_pad(
    track: &mut Track,
    harmony: &mut HarmonyContext,
    ctx: &AuxContext,
) {
    let vel = (calculate_velocity(ctx.section_type, 1, ctx.mood) as f32 * 0.65) as u8;
    // One sustained tone per chord span; never a second onset inside a
    // span that is already sounding.
    let spans: Vec<(Tick, Tick)> = harmony
        .spans()
        .iter()
        .filter(|s| s.start >= ctx.section_start && s.start < ctx.section_end)
        .map(|s| (s.start, s.end.min(ctx.section_end)))
        .collect();
    let preferred = ctx.low as i32 + (ctx.high - ctx.low) as i32 / 2;
    for (start, end) in spans {
        if let Some(pitch) = chord_tone_near(harmony, start, preferred, ctx.low, ctx.high) {
            emit(track, harmony, ctx, start, end - start, pitch, vel);
        }
    }
}

fn generate_unison(track: &mut Track, harmony: &mut HarmonyContext, ctx: &AuxContext) {
    for note in ctx.vocal_notes {
        if note.start_tick < ctx.section_start || note.start_tick >= ctx.section_end {
            continue;
        }
        let vel = (note.velocity as f32 * 0.7) as u8;
        emit(
            track,
            harmony,
            ctx,
            note.start_tick,
            note.duration,
            note.pitch,
            vel,
        );
    }
}

fn generate_harmony_line(
    track: &mut Track,
    harmony: &mut HarmonyContext,
    ctx: &AuxContext,
    mode: HarmonyMode,
) {
    for note in ctx.vocal_notes {
        if note.start_tick < ctx.section_start || note.start_tick >= ctx.section_end {
            continue;
        }
        // Diatonic third: four semitones then snapped to scale.
        let offset = match mode {
            HarmonyMode::ThirdAbove => 4,
            HarmonyMode::ThirdBelow => -4,
        };
        let shifted = snap_to_nearest_scale_tone(note.pitch as i32 + offset, 0);
        if shifted < ctx.low as i32 || shifted > ctx.high as i32 {
            continue;
        }
        let vel = (note.velocity as f32 * 0.65) as u8;
        SafeNote::at(note.start_tick, note.duration)
            .pitch(shifted as u8)
            .velocity(vel)
            .role(TrackRole::Aux)
            .source(NoteSource::Aux)
            .fallback(PitchFallback::Skip)
            .add_to(track, harmony);
    }
}

fn generate_melodic_hook(
    track: &mut Track,
    harmony: &mut HarmonyContext,
    ctx: &AuxContext,
    rng: &mut ChaCha8Rng,
) {
    // A two-bar riff at the section opening: up the chord, down a step.
    let vel = calculate_velocity(ctx.section_type, 0, ctx.mood);
    let pattern = [0usize, 1, 2, 1];
    let mut tick = ctx.section_start;
    let hook_end = (ctx.section_start + 2 * TICKS_PER_BAR).min(ctx.section_end);
    let mut step = 0usize;
    while tick < hook_end {
        let tones = harmony.chord_tones_at(tick);
        if tones.is_empty() {
            break;
        }
        let pc = tones[pattern[step % pattern.len()] % tones.len()];
        let preferred = ctx.low as i32 + pc;
        if let Some(pitch) = chord_tone_near(harmony, tick, preferred, ctx.low, ctx.high) {
            let accent = if step % 4 == 0 { vel } else { (vel as f32 * 0.8) as u8 };
            emit(track, harmony, ctx, tick, TICK_EIGHTH, pitch, accent);
        }
        step += 1;
        tick += if rng.gen::<f32>() < 0.25 {
            TICK_QUARTER
        } else {
            TICK_EIGHTH
        };
    }
}

fn generate_motif_counter(
    track: &mut Track,
    harmony: &mut HarmonyContext,
    ctx: &AuxContext,
) {
    let vel = (calculate_velocity(ctx.section_type, 1, ctx.mood) as f32 * 0.8) as u8;
    let mut tick = ctx.section_start + TICK_EIGHTH;
    let mut prev_pitch: i32 = -1;
    while tick < ctx.section_end {
        let vocal_direction = ctx.vocal.direction_at(tick);

        // Prefer contrary (or oblique) motion against the lead.
        let preferred = if prev_pitch < 0 {
            ctx.low as i32 + (ctx.high - ctx.low) as i32 / 2
        } else if vocal_direction > 0 {
            prev_pitch - 3
        } else if vocal_direction < 0 {
            prev_pitch + 3
        } else {
            prev_pitch
        };

        if let Some(pitch) = chord_tone_near(harmony, tick, preferred, ctx.low, ctx.high) {
            // The safety check inside `emit` rejects minor 2nds and
            // tritones against vocal, bass, and chord at this tick.
            if emit(track, harmony, ctx, tick, TICK_QUARTER - 30, pitch, vel) {
                prev_pitch = pitch as i32;
            }
        }
        tick += TICK_QUARTER;
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Track generation
// ═══════════════════════════════════════════════════════════════════════

/// Generate the aux track across all sections where backing plays.
pub fn generate_aux_track(
    track: &mut Track,
    song: &Song,
    mood: Mood,
    function: AuxFunction,
    vocal: &VocalAnalysis,
    rng: &mut ChaCha8Rng,
    harmony: &mut HarmonyContext,
) {
    let vocal_notes = song.vocal().notes().to_vec();
    let boundaries = song.phrase_boundaries().to_vec();
    let (vocal_low, vocal_high) = if song.vocal().is_empty() {
        (60, 84)
    } else {
        song.vocal().analyze_range()
    };
    let tessitura = calculate_tessitura(vocal_low, vocal_high);
    let (low, high) = aux_range(&tessitura);

    for section in song.arrangement().sections() {
        // Aux only plays under an active vocal or in designated
        // instrumental moments.
        let instrumental = matches!(
            section.section_type,
            SectionType::Intro | SectionType::Interlude
        );
        let has_vocal = crate::tracks::vocal::section_has_vocals(section.section_type);
        if !has_vocal && !instrumental {
            continue;
        }

        let ctx = AuxContext {
            section_start: section.start_tick,
            section_end: section.end_tick(),
            section_type: section.section_type,
            mood,
            low,
            high,
            vocal_notes: &vocal_notes,
            vocal,
            boundaries: &boundaries,
        };

        if instrumental {
            generate_melodic_hook(track, harmony, &ctx, rng);
            continue;
        }

        match function {
            AuxFunction::PulseLoop => generate_pulse_loop(track, harmony, &ctx, rng),
            AuxFunction::TargetHint => generate_target_hint(track, harmony, &ctx),
            AuxFunction::GrooveAccent => generate_groove_accent(track, harmony, &ctx),
            AuxFunction::PhraseTail => generate_phrase_tail(track, harmony, &ctx),
            AuxFunction::EmotionalPad => generate_emotional_pad(track, harmony, &ctx),
            AuxFunction::Unison => generate_unison(track, harmony, &ctx),
            AuxFunction::Harmony => {
                generate_harmony_line(track, harmony, &ctx, HarmonyMode::ThirdAbove)
            }
            AuxFunction::MelodicHook => generate_melodic_hook(track, harmony, &ctx, rng),
            AuxFunction::MotifCounter => generate_motif_counter(track, harmony, &ctx),
        }
    }
}
