//! Harmony context: the shared, tick-indexed source of truth for the chord
//! timeline and the notes other tracks have already committed.
//!
//! Generators query it for the active chord, for collision safety, and for
//! safe-pitch search; they register every note they emit so later tracks
//! (and later notes within the same track pass) see them.  The note list is
//! append-only during generation.

use crate::rhythm::{bar_harmony, BarHarmony};
use crate::theory::{chord_tone_pitch_classes, ChordProgression};
use crate::types::{
    Arrangement, Mood, Tick, Track, TrackRole, TICKS_PER_BAR, TICK_HALF, TICK_QUARTER_TRIPLET,
};
use crate::pitch::{interval_class, is_dissonant_interval_with_context};

/// One chord span on the timeline, half-open `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChordSpan {
    pub start: Tick,
    pub end: Tick,
    pub degree: i8,
}

#[derive(Debug, Clone, Copy)]
struct RegisteredNote {
    start: Tick,
    end: Tick,
    pitch: u8,
    role: TrackRole,
}

/// Below middle C, stricter low-register collision rules apply.
pub const LOW_REGISTER_THRESHOLD: u8 = 60;

/// Authoritative harmonic query surface for coordinated track generation.
#[derive(Debug, Clone, Default)]
pub struct HarmonyContext {
    chords: Vec<ChordSpan>,
    notes: Vec<RegisteredNote>,
}

impl HarmonyContext {
    pub fn new() -> HarmonyContext {
        HarmonyContext::default()
    }

    /// Build the chord timeline from the arrangement and progression.
    ///
    /// Each bar resolves its chords through the shared `bar_harmony`
    /// decision, so subdivided and phrase-split bars land on the timeline
    /// exactly as the generators will play them.
    pub fn initialize(
        &mut self,
        arrangement: &Arrangement,
        progression: &ChordProgression,
        mood: Mood,
    ) {
        self.chords.clear();
        self.notes.clear();

        let prog_len = progression.length as u32;
        for section in arrangement.sections() {
            for bar in 0..section.bars as u32 {
                let bar_start = section.start_tick + bar * TICKS_PER_BAR;
                match bar_harmony(bar, section.bars as u32, prog_len, section.section_type, mood) {
                    BarHarmony::Whole(idx) => {
                        self.chords.push(ChordSpan {
                            start: bar_start,
                            end: bar_start + TICKS_PER_BAR,
                            degree: progression.at(idx),
                        });
                    }
                    BarHarmony::Split(first, second) => {
                        self.chords.push(ChordSpan {
                            start: bar_start,
                            end: bar_start + TICK_HALF,
                            degree: progression.at(first),
                        });
                        self.chords.push(ChordSpan {
                            start: bar_start + TICK_HALF,
                            end: bar_start + TICKS_PER_BAR,
                            degree: progression.at(second),
                        });
                    }
                }
            }
        }
    }

    pub fn spans(&self) -> &[ChordSpan] {
        &self.chords
    }

    /// Chord degree at a tick.  Falls back to I when the timeline is empty
    /// or the tick is out of range.
    pub fn chord_degree_at(&self, tick: Tick) -> i8 {
        if self.chords.is_empty() {
            return 0;
        }
        // Binary search: last span whose start <= tick.
        let idx = self.chords.partition_point(|c| c.start <= tick);
        if idx > 0 {
            let span = &self.chords[idx - 1];
            if tick >= span.start && tick < span.end {
                return span.degree;
            }
        }
        0
    }

    /// First tick strictly after `after` where the degree changes; 0 when
    /// no further change exists.
    pub fn next_chord_change_tick(&self, after: Tick) -> Tick {
        for (i, span) in self.chords.iter().enumerate() {
            if after >= span.start && after < span.end {
                for later in &self.chords[i + 1..] {
                    if later.degree != span.degree {
                        return later.start;
                    }
                }
                break;
            }
        }
        0
    }

    /// Chord tone pitch classes at a tick.
    pub fn chord_tones_at(&self, tick: Tick) -> Vec<i32> {
        chord_tone_pitch_classes(self.chord_degree_at(tick))
    }

    /// Splice a planned secondary dominant into the timeline, overriding
    /// whatever spans overlap `[start, end)`.
    pub fn register_secondary_dominant(&mut self, start: Tick, end: Tick, degree: i8) {
        if end <= start {
            return;
        }
        let mut result: Vec<ChordSpan> = Vec::with_capacity(self.chords.len() + 2);
        for span in &self.chords {
            if span.end <= start || span.start >= end {
                result.push(*span);
                continue;
            }
            if span.start < start {
                result.push(ChordSpan {
                    start: span.start,
                    end: start,
                    degree: span.degree,
                });
            }
            if span.end > end {
                result.push(ChordSpan {
                    start: end,
                    end: span.end,
                    degree: span.degree,
                });
            }
        }
        result.push(ChordSpan { start, end, degree });
        result.sort_by_key(|s| s.start);
        self.chords = result;
    }

    // ═══════════════════════════════════════════════════════════════════
    // Note registration and collision queries
    // ═══════════════════════════════════════════════════════════════════

    pub fn register_note(&mut self, start: Tick, duration: Tick, pitch: u8, role: TrackRole) {
        self.notes.push(RegisteredNote {
            start,
            end: start + duration,
            pitch,
            role,
        });
    }

    pub fn register_track(&mut self, track: &Track, role: TrackRole) {
        for note in track.notes() {
            self.register_note(note.start_tick, note.duration, note.pitch, role);
        }
    }

    pub fn clear_notes_for_role(&mut self, role: TrackRole) {
        self.notes.retain(|n| n.role != role);
    }

    /// True when `pitch` does not form a dissonant interval (in the current
    /// chord context) with any registered note from another role sounding
    /// during `[start, start+duration)`.
    pub fn is_pitch_safe(&self, pitch: u8, start: Tick, duration: Tick, exclude: TrackRole) -> bool {
        let pc = (pitch % 12) as i32;
        let end = start + duration;
        let chord_degree = self.chord_degree_at(start);
        for note in &self.notes {
            if note.role == exclude {
                continue;
            }
            if note.start < end && note.end > start {
                let other_pc = (note.pitch % 12) as i32;
                if is_dissonant_interval_with_context(pc, other_pc, chord_degree) {
                    return false;
                }
            }
        }
        true
    }

    /// Find a safe pitch near `desired` within `[low, high]`.
    ///
    /// Strategy order: keep the desired pitch; double a sounding tone from
    /// another track; nearest chord tone in any octave; ordered semitone
    /// adjustments; exhaustive outward search; give up and return the
    /// desired pitch.
    pub fn get_safe_pitch(
        &self,
        desired: u8,
        start: Tick,
        duration: Tick,
        role: TrackRole,
        low: u8,
        high: u8,
    ) -> u8 {
        if self.is_pitch_safe(desired, start, duration, role) {
            return desired;
        }

        let octave = desired as i32 / 12;
        let end = start + duration;
        let mut best: i32 = -1;
        let mut best_dist = 100;

        // Strategy 1: double a tone another track is actually sounding.
        // Matching the real voicing beats matching theoretical chord tones.
        for note in &self.notes {
            if note.role == role || note.role == TrackRole::Drums || note.role == TrackRole::Se {
                continue;
            }
            if note.start < end && note.end > start {
                let pc = (note.pitch % 12) as i32;
                for oct_offset in -2..=2 {
                    let candidate = (octave + oct_offset) * 12 + pc;
                    if candidate < low as i32 || candidate > high as i32 {
                        continue;
                    }
                    if !self.is_pitch_safe(candidate as u8, start, duration, role) {
                        continue;
                    }
                    let dist = (candidate - desired as i32).abs();
                    if dist < best_dist {
                        best_dist = dist;
                        best = candidate;
                    }
                }
            }
        }
        if best >= 0 {
            return best as u8;
        }

        // Strategy 2: theoretical chord tones in nearby octaves.
        for pc in self.chord_tones_at(start) {
            for oct_offset in -2..=2 {
                let candidate = (octave + oct_offset) * 12 + pc;
                if candidate < low as i32 || candidate > high as i32 {
                    continue;
                }
                if !self.is_pitch_safe(candidate as u8, start, duration, role) {
                    continue;
                }
                let dist = (candidate - desired as i32).abs();
                if dist < best_dist {
                    best_dist = dist;
                    best = candidate;
                }
            }
        }
        if best >= 0 {
            return best as u8;
        }

        // Strategy 3: small adjustments, consonant intervals first.
        const ADJUSTMENTS: [i32; 14] = [3, -3, 4, -4, 5, -5, 7, -7, 12, -12, 2, -2, 1, -1];
        for adj in ADJUSTMENTS {
            let candidate = desired as i32 + adj;
            if candidate < low as i32 || candidate > high as i32 {
                continue;
            }
            if self.is_pitch_safe(candidate as u8, start, duration, role) {
                return candidate as u8;
            }
        }

        // Strategy 4: exhaustive outward search.
        for dist in 1..=24 {
            for sign in [-1, 1] {
                let candidate = desired as i32 + sign * dist;
                if candidate < low as i32 || candidate > high as i32 {
                    continue;
                }
                if self.is_pitch_safe(candidate as u8, start, duration, role) {
                    return candidate as u8;
                }
            }
        }

        // Last resort: a clash beats an out-of-range pitch.
        desired
    }

    /// Low-register collision against the bass.  Below C4, close intervals
    /// and octave doublings within one octave sound muddy: reject when
    /// `interval <= threshold` or when the interval is a positive multiple
    /// of 12 within one octave.
    pub fn has_bass_collision(&self, pitch: u8, start: Tick, duration: Tick, threshold: i32) -> bool {
        if pitch >= LOW_REGISTER_THRESHOLD {
            return false;
        }
        let end = start + duration;
        for note in &self.notes {
            if note.role != TrackRole::Bass {
                continue;
            }
            if note.start < end && note.end > start {
                let interval = (pitch as i32 - note.pitch as i32).abs();
                if interval <= threshold {
                    return true;
                }
                if interval > 0 && interval <= 12 && interval % 12 == 0 {
                    return true;
                }
            }
        }
        false
    }

    /// Pitch classes a track is sounding at a tick.
    pub fn pitch_classes_from_track_at(&self, tick: Tick, role: TrackRole) -> Vec<i32> {
        let mut result = Vec::new();
        for note in &self.notes {
            if note.role != role {
                continue;
            }
            if note.start <= tick && note.end > tick {
                let pc = (note.pitch % 12) as i32;
                if !result.contains(&pc) {
                    result.push(pc);
                }
            }
        }
        result
    }

    /// Pitch classes a track sounds anywhere within `[start, end)`.
    pub fn pitch_classes_from_track_in_range(
        &self,
        start: Tick,
        end: Tick,
        role: TrackRole,
    ) -> Vec<i32> {
        let mut result = Vec::new();
        for note in &self.notes {
            if note.role != role {
                continue;
            }
            if note.start < end && note.end > start {
                let pc = (note.pitch % 12) as i32;
                if !result.contains(&pc) {
                    result.push(pc);
                }
            }
        }
        result
    }

    /// True when `pitch` forms a tritone with any chord-track pitch class
    /// sounding during the note, extended by a swing margin (swing can push
    /// chord notes by up to a triplet eighth) and queried from one tick
    /// early to catch boundary-extended chord notes.
    pub fn has_tritone_with_chord_in_duration(
        &self,
        pitch: u8,
        start: Tick,
        duration: Tick,
    ) -> bool {
        let end = start + duration + TICK_QUARTER_TRIPLET;
        let query_start = start.saturating_sub(1);
        let chord_pcs = self.pitch_classes_from_track_in_range(query_start, end, TrackRole::Chord);
        let pc = (pitch % 12) as i32;
        chord_pcs.iter().any(|&other| interval_class(pc, other) == 6)
    }
}
