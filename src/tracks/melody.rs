//! Melody design: phrase rhythm generation, pitch choice, and candidate
//! evaluation for the vocal track.
//!
//! A section is built from 2-bar phrases.  Rhythm comes first (strong-beat
//! anchors, hold-then-burst density, syncopation), then each slot picks a
//! pitch by contour choice under the vocal attitude's candidate pool.
//! Several candidate phrases are scored and the best survives; the first
//! chorus donates a global motif that later sections score against.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::harmony::HarmonyContext;
use crate::note::create_note;
use crate::params::{VocalAttitude, VocalStyle};
use crate::pitch::{
    calculate_tessitura, comfort_score, is_in_passaggio, nearest_chord_tone_pitch, TessituraRange,
    MAX_MELODIC_INTERVAL,
};
use crate::theory::{chord_tone_pitch_classes, is_scale_tone};
use crate::types::{
    Mood, NoteEvent, NoteSource, SectionType, Tick, TICKS_PER_BAR, TICKS_PER_BEAT,
};
use crate::velocity::calculate_velocity;

/// Rhythm-shaping parameters for a melody family.
#[derive(Debug, Clone, Copy)]
pub struct MelodyTemplate {
    /// Rhythm interest over long lines; allows 16ths on strong beats.
    pub rhythm_driven: bool,
    /// Probability of a 16th on weak beats.
    pub sixteenth_density: f32,
    /// Probability of a half note.
    pub long_note_ratio: f32,
    /// Base probability of shifting a strong-beat onset to the off-beat.
    pub syncopation_weight: f32,
}

/// Template per vocal style and section.  Verses breathe, choruses push.
pub fn template_for(style: VocalStyle, section: SectionType) -> MelodyTemplate {
    let base = match style {
        VocalStyle::Standard => MelodyTemplate {
            rhythm_driven: false,
            sixteenth_density: 0.25,
            long_note_ratio: 0.20,
            syncopation_weight: 0.10,
        },
        VocalStyle::Emotional => MelodyTemplate {
            rhythm_driven: false,
            sixteenth_density: 0.15,
            long_note_ratio: 0.35,
            syncopation_weight: 0.05,
        },
        VocalStyle::RhythmDriven => MelodyTemplate {
            rhythm_driven: true,
            sixteenth_density: 0.45,
            long_note_ratio: 0.10,
            syncopation_weight: 0.25,
        },
        VocalStyle::UltraVocaloid => MelodyTemplate {
            rhythm_driven: true,
            sixteenth_density: 0.60,
            long_note_ratio: 0.05,
            syncopation_weight: 0.0,
        },
    };
    match section {
        SectionType::Chorus => MelodyTemplate {
            long_note_ratio: base.long_note_ratio + 0.10,
            ..base
        },
        SectionType::Bridge => MelodyTemplate {
            sixteenth_density: base.sixteenth_density * 0.7,
            ..base
        },
        _ => base,
    }
}

/// One slot of a generated phrase rhythm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RhythmNote {
    /// Onset in beats from the phrase start.
    pub beat: f32,
    /// Duration in eighth notes (0.25 = 32nd).
    pub eighths: f32,
    /// On a strong beat.
    pub strong: bool,
}

/// Context-aware syncopation weight: stronger late in the phrase and on
/// beats 2/4, suppressed in verses.
fn contextual_syncopation_weight(
    base: f32,
    phrase_progress: f32,
    beat_in_bar: u32,
    section_type: SectionType,
) -> f32 {
    let mut weight = base;
    weight *= 0.7 + 0.6 * phrase_progress;
    if beat_in_bar == 1 || beat_in_bar == 3 {
        weight *= 1.3;
    }
    if section_type == SectionType::A {
        weight *= 0.6;
    }
    weight.min(0.9)
}

/// Generate a phrase rhythm.
///
/// Reserves a phrase-ending long note on a strong beat, forces at least a
/// quarter on strong beats (unless rhythm-driven or machine-gun mode),
/// boosts density 1.3x after a half note (hold then burst), and caps
/// consecutive short notes at 3 (32 in machine-gun mode).
pub fn generate_phrase_rhythm(
    tmpl: &MelodyTemplate,
    phrase_beats: u32,
    density_modifier: f32,
    thirtysecond_ratio: f32,
    rng: &mut ChaCha8Rng,
    section_type: SectionType,
) -> Vec<RhythmNote> {
    let mut rhythm = Vec::new();
    let end_beat = phrase_beats as f32;
    let machine_gun = thirtysecond_ratio >= 0.8;

    let effective_sixteenth = (tmpl.sixteenth_density * density_modifier).min(0.95);
    let phrase_body_end = if machine_gun { end_beat - 0.5 } else { end_beat - 1.0 };

    let mut consecutive_short = 0;
    let max_consecutive_short = if machine_gun { 32 } else { 3 };

    let mut prev_eighths = 0.0f32;
    const LONG_NOTE_THRESHOLD: f32 = 4.0;
    const POST_LONG_BOOST: f32 = 1.3;

    // Machine-gun phrases vary their opening: immediate burst, an accent
    // first, or a gradual acceleration.
    let ultra_start_pattern = if machine_gun {
        let r = rng.gen::<f32>();
        if r < 0.5 {
            0
        } else if r < 0.8 {
            1
        } else {
            2
        }
    } else {
        0
    };

    let mut current_beat = 0.0f32;
    while current_beat < phrase_body_end {
        let frac = current_beat - current_beat.floor();
        let mut is_on_beat = frac < 0.01;

        // Syncopation: shift a strong-beat onset to the off-beat, but never
        // past the phrase body.  RNG is consumed only when a shift is
        // actually possible so the default stream is unchanged.
        if is_on_beat && tmpl.syncopation_weight > 0.0 && current_beat + 0.5 < phrase_body_end {
            let progress = current_beat / end_beat;
            let beat_in_bar = (current_beat as u32) % 4;
            let weight = contextual_syncopation_weight(
                tmpl.syncopation_weight,
                progress,
                beat_in_bar,
                section_type,
            );
            if rng.gen::<f32>() < weight {
                current_beat += 0.5;
                is_on_beat = false;
            }
        }

        let force_long_on_beat = is_on_beat && !tmpl.rhythm_driven && !machine_gun;

        // Machine-gun phrase boundary: a quarter note of breathing room at
        // the end of each phrase.
        let ultra_phrase_boundary = machine_gun && {
            let remaining = phrase_body_end - current_beat;
            remaining <= 1.0 && remaining > 0.1
        };
        let ultra_start_zone = machine_gun && current_beat < 2.0;

        let eighths: f32;
        if ultra_phrase_boundary {
            eighths = 2.0;
            consecutive_short = 0;
        } else if ultra_start_zone && ultra_start_pattern > 0 {
            eighths = if ultra_start_pattern == 1 {
                if current_beat < 0.01 {
                    2.0
                } else {
                    0.25
                }
            } else if current_beat < 0.5 {
                2.0
            } else if current_beat < 1.0 {
                1.0
            } else if current_beat < 1.5 {
                0.5
            } else {
                0.25
            };
        } else if force_long_on_beat {
            eighths = if rng.gen::<f32>() < tmpl.long_note_ratio * 2.0 {
                4.0
            } else {
                2.0
            };
            consecutive_short = 0;
        } else {
            let boost = if prev_eighths >= LONG_NOTE_THRESHOLD {
                POST_LONG_BOOST
            } else {
                1.0
            };
            if thirtysecond_ratio > 0.0 && rng.gen::<f32>() < thirtysecond_ratio * boost {
                eighths = 0.25;
            } else if tmpl.rhythm_driven && rng.gen::<f32>() < effective_sixteenth * boost {
                eighths = 1.0;
            } else if rng.gen::<f32>() < tmpl.long_note_ratio / boost {
                eighths = 4.0;
            } else {
                eighths = 2.0;
            }
        }

        // Breath guard: cap runs of short notes.
        let eighths = if eighths <= 1.0 {
            consecutive_short += 1;
            if consecutive_short >= max_consecutive_short {
                consecutive_short = 0;
                2.0
            } else {
                eighths
            }
        } else {
            consecutive_short = 0;
            eighths
        };

        let strong = (current_beat as u32) % 2 == 0;
        rhythm.push(RhythmNote {
            beat: current_beat,
            eighths,
            strong,
        });
        prev_eighths = eighths;

        current_beat += eighths * 0.5;

        // Quantize the next onset: 32nd grid in machine-gun mode, 16th for
        // rhythm-driven templates, 8th otherwise.
        if ultra_phrase_boundary {
            current_beat = phrase_body_end;
        } else if machine_gun {
            current_beat = (current_beat * 8.0).ceil() / 8.0;
        } else if tmpl.rhythm_driven {
            current_beat = (current_beat * 4.0).ceil() / 4.0;
        } else {
            current_beat = (current_beat * 2.0).ceil() / 2.0;
        }
    }

    // Phrase-ending long note on a strong beat.
    if phrase_beats >= 2 {
        let mut final_beat = current_beat.ceil();
        if final_beat >= end_beat {
            final_beat = end_beat - 1.0;
        }
        let final_eighths = ((end_beat - final_beat) * 2.0).max(2.0);
        rhythm.push(RhythmNote {
            beat: final_beat,
            eighths: final_eighths,
            strong: true,
        });
    }

    rhythm
}

// ═══════════════════════════════════════════════════════════════════════
// Pitch choice
// ═══════════════════════════════════════════════════════════════════════

/// Contour decision for one rhythm slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitchChoice {
    Same,
    StepUp,
    StepDown,
    TargetStep,
}

fn candidate_pool(
    attitude: VocalAttitude,
    chord_degree: i8,
    note_eighths: f32,
) -> Vec<i32> {
    // Short notes downgrade to chord tones for stability.
    let effective = if note_eighths < 1.0 {
        VocalAttitude::Clean
    } else {
        attitude
    };
    let chord_tones = chord_tone_pitch_classes(chord_degree);
    match effective {
        VocalAttitude::Clean => chord_tones,
        VocalAttitude::Expressive => {
            let mut pcs = chord_tones.clone();
            let root = chord_tones.first().copied().unwrap_or(0);
            pcs.push((root + 11) % 12);
            pcs.push((root + 2) % 12);
            pcs.push((root + 5) % 12);
            pcs
        }
        VocalAttitude::Raw => vec![0, 2, 4, 5, 7, 9, 11],
    }
}

/// Resolve one pitch choice into an absolute pitch.
///
/// Step motion prefers a scale-tone whole step, then a chord tone within a
/// major 3rd, then any chord tone in direction, then the nearest chord
/// tone.  The melodic interval cap (major 6th) applies unless singability
/// is disabled.
#[allow(clippy::too_many_arguments)]
pub fn apply_pitch_choice(
    choice: PitchChoice,
    current_pitch: i32,
    target_pitch: i32,
    chord_degree: i8,
    vocal_low: u8,
    vocal_high: u8,
    attitude: VocalAttitude,
    disable_singability: bool,
    note_eighths: f32,
) -> i32 {
    let mut candidates: Vec<i32> = Vec::new();
    for pc in candidate_pool(attitude, chord_degree, note_eighths) {
        if !is_scale_tone(pc, 0) {
            continue;
        }
        for octave in 3..=7 {
            let candidate = octave * 12 + pc;
            if candidate >= vocal_low as i32 && candidate <= vocal_high as i32 {
                candidates.push(candidate);
            }
        }
    }
    candidates.sort_unstable();
    candidates.dedup();

    if candidates.is_empty() {
        return nearest_chord_tone_pitch(current_pitch, chord_degree)
            .clamp(vocal_low as i32, vocal_high as i32);
    }

    let enforce_interval = |pitch: i32| -> i32 {
        if disable_singability || (pitch - current_pitch).abs() <= MAX_MELODIC_INTERVAL {
            return pitch;
        }
        let mut closest = -1;
        let mut closest_dist = 127;
        for &c in &candidates {
            let dist = (c - current_pitch).abs();
            if dist <= MAX_MELODIC_INTERVAL && dist < closest_dist {
                closest_dist = dist;
                closest = c;
            }
        }
        if closest >= 0 {
            closest
        } else {
            nearest_chord_tone_pitch(current_pitch, chord_degree)
        }
    };

    let new_pitch = match choice {
        PitchChoice::Same => nearest_chord_tone_pitch(current_pitch, chord_degree),

        PitchChoice::StepUp => {
            let mut best = -1;
            if disable_singability {
                best = candidates.iter().copied().find(|&c| c > current_pitch).unwrap_or(-1);
            } else {
                for step in [2, 1] {
                    let candidate = current_pitch + step;
                    if candidate <= vocal_high as i32 && is_scale_tone(candidate % 12, 0) {
                        best = candidate;
                        break;
                    }
                }
                if best < 0 {
                    best = candidates
                        .iter()
                        .copied()
                        .find(|&c| c > current_pitch && c - current_pitch <= 4)
                        .unwrap_or(-1);
                }
                if best < 0 {
                    best = candidates.iter().copied().find(|&c| c > current_pitch).unwrap_or(-1);
                }
            }
            if best < 0 {
                best = nearest_chord_tone_pitch(current_pitch, chord_degree);
            }
            enforce_interval(best)
        }

        PitchChoice::StepDown => {
            let mut best = -1;
            if disable_singability {
                best = candidates
                    .iter()
                    .rev()
                    .copied()
                    .find(|&c| c < current_pitch)
                    .unwrap_or(-1);
            } else {
                for step in [2, 1] {
                    let candidate = current_pitch - step;
                    if candidate >= vocal_low as i32 && is_scale_tone(candidate.rem_euclid(12), 0) {
                        best = candidate;
                        break;
                    }
                }
                if best < 0 {
                    best = candidates
                        .iter()
                        .rev()
                        .copied()
                        .find(|&c| c < current_pitch && current_pitch - c <= 4)
                        .unwrap_or(-1);
                }
                if best < 0 {
                    best = candidates
                        .iter()
                        .rev()
                        .copied()
                        .find(|&c| c < current_pitch)
                        .unwrap_or(-1);
                }
            }
            if best < 0 {
                best = nearest_chord_tone_pitch(current_pitch, chord_degree);
            }
            enforce_interval(best)
        }

        PitchChoice::TargetStep => {
            let mut new_pitch = current_pitch;
            if target_pitch > current_pitch {
                new_pitch = candidates
                    .iter()
                    .copied()
                    .find(|&c| c > current_pitch && c <= target_pitch)
                    .or_else(|| candidates.iter().copied().find(|&c| c > current_pitch))
                    .unwrap_or(current_pitch);
            } else if target_pitch < current_pitch {
                new_pitch = candidates
                    .iter()
                    .rev()
                    .copied()
                    .find(|&c| c < current_pitch && c >= target_pitch)
                    .or_else(|| candidates.iter().rev().copied().find(|&c| c < current_pitch))
                    .unwrap_or(current_pitch);
            } else {
                new_pitch = nearest_chord_tone_pitch(new_pitch, chord_degree);
            }
            enforce_interval(new_pitch)
        }
    };

    new_pitch.clamp(vocal_low as i32, vocal_high as i32)
}

/// Phrase target: the chord tone nearest the upper tessitura at the
/// section start.
pub fn calculate_target_pitch(
    tessitura: &TessituraRange,
    vocal_low: u8,
    vocal_high: u8,
    section_start: Tick,
    harmony: &HarmonyContext,
) -> i32 {
    let chord_tones = harmony.chord_tones_at(section_start);
    if chord_tones.is_empty() {
        return tessitura.center as i32;
    }
    let target_area = tessitura.center as i32 + (tessitura.high - tessitura.low) as i32 / 2;
    let mut best = target_area;
    let mut best_dist = 100;
    for pc in chord_tones {
        for octave in 4..=6 {
            let candidate = octave * 12 + pc;
            if candidate < vocal_low as i32 || candidate > vocal_high as i32 {
                continue;
            }
            let dist = (candidate - target_area).abs();
            if dist < best_dist {
                best_dist = dist;
                best = candidate;
            }
        }
    }
    best
}

// ═══════════════════════════════════════════════════════════════════════
// Global motif and evaluation
// ═══════════════════════════════════════════════════════════════════════

/// Contour and interval signature of the song's hook, extracted from the
/// first chorus.
#[derive(Debug, Clone, Default)]
pub struct GlobalMotif {
    pub contour: Vec<i8>,
    pub intervals: Vec<i8>,
}

impl GlobalMotif {
    pub fn is_valid(&self) -> bool {
        self.contour.len() >= 3
    }
}

/// Extract the motif signature from the first notes of a phrase.
pub fn extract_global_motif(notes: &[NoteEvent]) -> GlobalMotif {
    let mut motif = GlobalMotif::default();
    for pair in notes.windows(2).take(8) {
        let diff = pair[1].pitch as i32 - pair[0].pitch as i32;
        motif.contour.push(diff.signum() as i8);
        motif.intervals.push(diff.clamp(-12, 12) as i8);
    }
    motif
}

fn contour_similarity(notes: &[NoteEvent], motif: &GlobalMotif) -> f32 {
    if notes.len() < 2 || motif.contour.is_empty() {
        return 0.0;
    }
    let mut matches = 0;
    let mut compared = 0;
    for (i, pair) in notes.windows(2).enumerate() {
        if i >= motif.contour.len() {
            break;
        }
        let diff = pair[1].pitch as i32 - pair[0].pitch as i32;
        if diff.signum() as i8 == motif.contour[i] {
            matches += 1;
        }
        compared += 1;
    }
    if compared == 0 {
        0.0
    } else {
        matches as f32 / compared as f32
    }
}

/// Singing effort per bar: sustained high notes, large leaps, and dense
/// passages all cost.
pub fn singing_effort(notes: &[NoteEvent]) -> f32 {
    if notes.is_empty() {
        return 0.0;
    }
    const MEDIUM: f32 = 0.5;
    let mut effort = 0.0;
    for (i, note) in notes.iter().enumerate() {
        if is_in_passaggio(note.pitch) || note.pitch > crate::pitch::PASSAGGIO_HIGH {
            effort += MEDIUM * note.duration as f32 / TICKS_PER_BEAT as f32;
        }
        if i > 0 {
            let interval = (note.pitch as i32 - notes[i - 1].pitch as i32).abs();
            if interval >= 7 {
                effort += MEDIUM;
            }
        }
    }
    let span = notes.last().unwrap().end_tick() - notes[0].start_tick;
    if span > 0 {
        let notes_per_beat = notes.len() as f32 * TICKS_PER_BEAT as f32 / span as f32;
        if notes_per_beat > 2.0 {
            effort += (notes_per_beat - 2.0) * MEDIUM;
        }
        let bars = span as f32 / TICKS_PER_BAR as f32;
        if bars > 0.0 {
            effort /= bars;
        }
    }
    effort
}

/// Context for generating one section of melody.
#[derive(Debug, Clone, Copy)]
pub struct SectionContext {
    pub section_type: SectionType,
    pub section_start: Tick,
    pub section_end: Tick,
    pub bars: u8,
    pub mood: Mood,
    pub vocal_low: u8,
    pub vocal_high: u8,
    pub tessitura: TessituraRange,
    pub density_modifier: f32,
    pub thirtysecond_ratio: f32,
    pub consecutive_same_note_prob: f32,
    pub attitude: VocalAttitude,
    pub disable_singability: bool,
}

impl SectionContext {
    pub fn for_range(
        section_type: SectionType,
        section_start: Tick,
        bars: u8,
        mood: Mood,
        vocal_low: u8,
        vocal_high: u8,
    ) -> SectionContext {
        SectionContext {
            section_type,
            section_start,
            section_end: section_start + bars as Tick * TICKS_PER_BAR,
            bars,
            mood,
            vocal_low,
            vocal_high,
            tessitura: calculate_tessitura(vocal_low, vocal_high),
            density_modifier: 1.0,
            thirtysecond_ratio: 0.0,
            consecutive_same_note_prob: 0.4,
            attitude: VocalAttitude::Clean,
            disable_singability: false,
        }
    }
}

/// Melody generator with the cached global motif.
#[derive(Debug, Default)]
pub struct MelodyDesigner {
    global_motif: Option<GlobalMotif>,
}

impl MelodyDesigner {
    pub fn new() -> MelodyDesigner {
        MelodyDesigner::default()
    }

    pub fn global_motif(&self) -> Option<&GlobalMotif> {
        self.global_motif.as_ref()
    }

    pub fn set_global_motif(&mut self, motif: GlobalMotif) {
        if motif.is_valid() {
            self.global_motif = Some(motif);
        }
    }

    /// Candidate count by section importance: the hook sections deserve the
    /// widest search.
    pub fn candidate_count_for_section(section: SectionType) -> usize {
        match section {
            SectionType::Chorus => 5,
            SectionType::B => 4,
            SectionType::A => 3,
            _ => 2,
        }
    }

    /// Generate `candidate_count` phrases for the section and keep the one
    /// with the best composite score.
    pub fn generate_section_with_evaluation(
        &self,
        tmpl: &MelodyTemplate,
        ctx: &SectionContext,
        harmony: &HarmonyContext,
        rng: &mut ChaCha8Rng,
        candidate_count: usize,
    ) -> Vec<NoteEvent> {
        let mut best: Vec<NoteEvent> = Vec::new();
        let mut best_score = f32::MIN;
        for _ in 0..candidate_count.max(1) {
            let candidate = self.generate_candidate(tmpl, ctx, harmony, rng);
            let score = self.evaluate(&candidate, ctx, harmony);
            if score > best_score {
                best_score = score;
                best = candidate;
            }
        }
        best
    }

    /// One candidate: 2-bar phrases of generated rhythm, each slot pitched
    /// by a contour choice.
    fn generate_candidate(
        &self,
        tmpl: &MelodyTemplate,
        ctx: &SectionContext,
        harmony: &HarmonyContext,
        rng: &mut ChaCha8Rng,
    ) -> Vec<NoteEvent> {
        let mut notes = Vec::new();
        let phrase_bars = 2u32;
        let phrase_beats = phrase_bars * 4;
        let bars = ctx.bars as u32;

        let target = calculate_target_pitch(
            &ctx.tessitura,
            ctx.vocal_low,
            ctx.vocal_high,
            ctx.section_start,
            harmony,
        );
        let mut current_pitch = ctx.tessitura.center as i32;

        let mut phrase_start_bar = 0u32;
        while phrase_start_bar < bars {
            let this_phrase_bars = phrase_bars.min(bars - phrase_start_bar);
            let this_phrase_beats = this_phrase_bars * 4;
            let phrase_start_tick =
                ctx.section_start + phrase_start_bar * TICKS_PER_BAR;

            let rhythm = generate_phrase_rhythm(
                tmpl,
                this_phrase_beats.max(2),
                ctx.density_modifier,
                ctx.thirtysecond_ratio,
                rng,
                ctx.section_type,
            );

            for (slot_idx, slot) in rhythm.iter().enumerate() {
                let start = phrase_start_tick + (slot.beat * TICKS_PER_BEAT as f32) as Tick;
                let duration =
                    ((slot.eighths * (TICKS_PER_BEAT / 2) as f32) as Tick).max(60);
                if start + duration > ctx.section_end {
                    continue;
                }
                let chord_degree = harmony.chord_degree_at(start);

                let is_last_slot = slot_idx + 1 == rhythm.len();
                let choice = if is_last_slot {
                    PitchChoice::TargetStep
                } else if rng.gen::<f32>() < ctx.consecutive_same_note_prob {
                    PitchChoice::Same
                } else if current_pitch < ctx.tessitura.low as i32 {
                    PitchChoice::StepUp
                } else if current_pitch > ctx.tessitura.high as i32 {
                    PitchChoice::StepDown
                } else if rng.gen::<bool>() {
                    PitchChoice::StepUp
                } else {
                    PitchChoice::StepDown
                };

                let pitch = apply_pitch_choice(
                    choice,
                    current_pitch,
                    target,
                    chord_degree,
                    ctx.vocal_low,
                    ctx.vocal_high,
                    ctx.attitude,
                    ctx.disable_singability,
                    slot.eighths,
                );
                current_pitch = pitch;

                let beat_in_bar = ((start % TICKS_PER_BAR) / TICKS_PER_BEAT) as u8;
                let velocity = calculate_velocity(ctx.section_type, beat_in_bar, ctx.mood);
                let mut note = create_note(
                    harmony,
                    start,
                    duration,
                    pitch as u8,
                    velocity,
                    NoteSource::MelodyPhrase,
                );
                if slot.strong {
                    note.velocity = ((note.velocity as i32) + 4).min(127) as u8;
                }
                notes.push(note);
            }

            phrase_start_bar += this_phrase_bars;
        }

        notes
    }

    /// Composite musical score: downbeat chord-tone ratio, motif contour
    /// similarity, repetition penalty, register comfort, singability.
    fn evaluate(&self, notes: &[NoteEvent], ctx: &SectionContext, harmony: &HarmonyContext) -> f32 {
        if notes.is_empty() {
            return f32::MIN;
        }

        // Chord-tone ratio on downbeats.
        let mut downbeats = 0;
        let mut chord_tone_downbeats = 0;
        for note in notes {
            if note.start_tick % TICKS_PER_BEAT == 0 {
                downbeats += 1;
                let tones = harmony.chord_tones_at(note.start_tick);
                if tones.contains(&((note.pitch % 12) as i32)) {
                    chord_tone_downbeats += 1;
                }
            }
        }
        let chord_tone_ratio = if downbeats == 0 {
            0.5
        } else {
            chord_tone_downbeats as f32 / downbeats as f32
        };

        // Motif similarity (only meaningful once the hook exists).
        let motif_bonus = self
            .global_motif
            .as_ref()
            .map_or(0.0, |m| contour_similarity(notes, m));

        // Monotony penalty: long runs of one pitch.
        let mut max_run = 1;
        let mut run = 1;
        for pair in notes.windows(2) {
            if pair[0].pitch == pair[1].pitch {
                run += 1;
                max_run = max_run.max(run);
            } else {
                run = 1;
            }
        }
        let repetition_penalty = if max_run > 4 {
            0.1 * (max_run - 4) as f32
        } else {
            0.0
        };

        // Register comfort averaged across notes.
        let comfort: f32 = notes
            .iter()
            .map(|n| comfort_score(n.pitch, &ctx.tessitura, ctx.vocal_low))
            .sum::<f32>()
            / notes.len() as f32;

        let effort = singing_effort(notes);

        chord_tone_ratio * 2.0 + motif_bonus * 1.5 + comfort - repetition_penalty - effort * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    use crate::arrange::make_section;
    use crate::theory::chord_progression;
    use crate::types::Arrangement;

    fn harmony() -> HarmonyContext {
        let arrangement = Arrangement::new(vec![make_section(SectionType::A, 0, 8)]);
        let mut ctx = HarmonyContext::new();
        ctx.initialize(&arrangement, chord_progression(0), Mood::StraightPop);
        ctx
    }

    #[test]
    fn rhythm_ends_with_long_strong_note() {
        let tmpl = template_for(VocalStyle::Standard, SectionType::A);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let rhythm = generate_phrase_rhythm(&tmpl, 8, 1.0, 0.0, &mut rng, SectionType::A);
        let last = rhythm.last().unwrap();
        assert!(last.strong);
        assert!(last.eighths >= 2.0); // at least a quarter
    }

    #[test]
    fn standard_rhythm_caps_consecutive_short_notes() {
        let tmpl = template_for(VocalStyle::RhythmDriven, SectionType::Chorus);
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let rhythm = generate_phrase_rhythm(&tmpl, 8, 1.0, 0.0, &mut rng, SectionType::Chorus);
        let mut consecutive = 0;
        for slot in &rhythm {
            if slot.eighths <= 1.0 {
                consecutive += 1;
                assert!(consecutive < 4, "uncapped short-note run");
            } else {
                consecutive = 0;
            }
        }
    }

    #[test]
    fn machine_gun_mode_produces_32nd_runs() {
        let tmpl = template_for(VocalStyle::UltraVocaloid, SectionType::Chorus);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let rhythm = generate_phrase_rhythm(&tmpl, 8, 1.0, 1.0, &mut rng, SectionType::Chorus);
        let shorts = rhythm.iter().filter(|r| r.eighths <= 0.5).count();
        assert!(shorts >= 8, "expected a machine-gun burst, got {shorts}");
    }

    #[test]
    fn pitch_choice_respects_interval_cap() {
        let pitch = apply_pitch_choice(
            PitchChoice::StepUp,
            60,
            84,
            0,
            55,
            84,
            VocalAttitude::Clean,
            false,
            2.0,
        );
        assert!((pitch - 60).abs() <= MAX_MELODIC_INTERVAL);
    }

    #[test]
    fn clean_attitude_short_notes_land_on_chord_tones() {
        for choice in [PitchChoice::StepUp, PitchChoice::StepDown, PitchChoice::Same] {
            let pitch = apply_pitch_choice(
                choice,
                64,
                60,
                0,
                48,
                84,
                VocalAttitude::Expressive,
                false,
                0.5, // short: forces Clean pool
            );
            // Step motion may pass through scale tones; Same always snaps.
            if choice == PitchChoice::Same {
                let tones = chord_tone_pitch_classes(0);
                assert!(tones.contains(&(pitch.rem_euclid(12))));
            }
            assert!((48..=84).contains(&pitch));
        }
    }

    #[test]
    fn designer_produces_notes_in_range() {
        let harmony = harmony();
        let designer = MelodyDesigner::new();
        let ctx = SectionContext::for_range(SectionType::A, 0, 8, Mood::StraightPop, 60, 84);
        let tmpl = template_for(VocalStyle::Standard, SectionType::A);
        let mut rng = ChaCha8Rng::seed_from_u64(77);
        let notes = designer.generate_section_with_evaluation(&tmpl, &ctx, &harmony, &mut rng, 3);
        assert!(!notes.is_empty());
        for note in &notes {
            assert!((60..=84).contains(&note.pitch));
            assert!(note.end_tick() <= ctx.section_end);
        }
    }

    #[test]
    fn motif_extraction_and_similarity() {
        let harmony = harmony();
        let mk = |start: Tick, pitch: u8| create_note(&harmony, start, 240, pitch, 90, NoteSource::MelodyPhrase);
        let notes = vec![mk(0, 60), mk(240, 64), mk(480, 62), mk(720, 65)];
        let motif = extract_global_motif(&notes);
        assert!(motif.is_valid());
        assert_eq!(motif.contour, vec![1, -1, 1]);
        // The same line is perfectly similar to its own motif.
        assert!((contour_similarity(&notes, &motif) - 1.0).abs() < f32::EPSILON);
    }
}
