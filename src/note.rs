//! Note creation with mandatory harmony awareness.
//!
//! All generated notes go through this module so chord-degree provenance is
//! recorded and collision handling is uniform.  `SafeNote` is the chainable
//! entry point: set timing, pitch, role, and a fallback strategy, then
//! `add_to` a track — which also registers the note with the harmony
//! context so later notes see it (idempotent, order-independent collision
//! detection).

use crate::harmony::HarmonyContext;
use crate::theory::chord_tone_pitch_classes;
use crate::types::{NoteEvent, NoteSource, Tick, Track, TrackRole};

/// Create a note with provenance looked up from the harmony context.
pub fn create_note(
    harmony: &HarmonyContext,
    start: Tick,
    duration: Tick,
    pitch: u8,
    velocity: u8,
    source: NoteSource,
) -> NoteEvent {
    NoteEvent {
        start_tick: start,
        duration,
        pitch,
        velocity,
        source,
        original_pitch: pitch,
        chord_degree: harmony.chord_degree_at(start),
        lookup_tick: start,
    }
}

/// Rewrite a note's pitch, updating the source but preserving the original
/// pitch for provenance.
pub fn modify_note(original: &NoteEvent, new_pitch: u8, new_source: NoteSource) -> NoteEvent {
    NoteEvent {
        pitch: new_pitch,
        source: new_source,
        ..*original
    }
}

/// What to do when the desired pitch is unsafe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitchFallback {
    /// Drop the note entirely.
    Skip,
    /// Fall back to the chord root.
    Root(u8),
    /// Nearest safe chord tone within a range.
    ChordTone(u8, u8),
    /// Same pitch in another octave within a range.
    Octave(u8, u8),
}

/// Fluent builder for harmony-safe notes.
#[derive(Debug, Clone, Copy)]
pub struct SafeNote {
    start: Tick,
    duration: Tick,
    pitch: u8,
    velocity: u8,
    role: TrackRole,
    source: NoteSource,
    fallback: PitchFallback,
}

impl SafeNote {
    pub fn at(start: Tick, duration: Tick) -> SafeNote {
        SafeNote {
            start,
            duration,
            pitch: 60,
            velocity: 100,
            role: TrackRole::Vocal,
            source: NoteSource::Unknown,
            fallback: PitchFallback::Skip,
        }
    }

    pub fn pitch(mut self, pitch: u8) -> SafeNote {
        self.pitch = pitch;
        self
    }

    pub fn velocity(mut self, velocity: u8) -> SafeNote {
        self.velocity = velocity;
        self
    }

    pub fn role(mut self, role: TrackRole) -> SafeNote {
        self.role = role;
        self
    }

    pub fn source(mut self, source: NoteSource) -> SafeNote {
        self.source = source;
        self
    }

    pub fn fallback(mut self, fallback: PitchFallback) -> SafeNote {
        self.fallback = fallback;
        self
    }

    fn is_safe(&self, harmony: &HarmonyContext, pitch: u8) -> bool {
        if !harmony.is_pitch_safe(pitch, self.start, self.duration, self.role) {
            return false;
        }
        // Bass carries an extra tritone check against the chord track over
        // the full note duration; the overlap-based check can miss notes
        // whose spans only touch.
        if self.role == TrackRole::Bass
            && harmony.has_tritone_with_chord_in_duration(pitch, self.start, self.duration)
        {
            return false;
        }
        true
    }

    fn find_safe_pitch(&self, harmony: &HarmonyContext) -> Option<u8> {
        if self.is_safe(harmony, self.pitch) {
            return Some(self.pitch);
        }

        match self.fallback {
            PitchFallback::Skip => None,

            PitchFallback::Root(root) => {
                let octave = self.pitch as i32 / 12;
                let root_pc = (root % 12) as i32;
                for oct_offset in [0, -1, 1] {
                    let candidate = (octave + oct_offset) * 12 + root_pc;
                    if !(0..=127).contains(&candidate) {
                        continue;
                    }
                    if self.is_safe(harmony, candidate as u8) {
                        return Some(candidate as u8);
                    }
                }
                if self.is_safe(harmony, root) {
                    return Some(root);
                }
                None
            }

            PitchFallback::ChordTone(low, high) => {
                let degree = harmony.chord_degree_at(self.start);
                let octave = self.pitch as i32 / 12;
                let mut best: i32 = -1;
                let mut best_dist = 1000;
                for pc in chord_tone_pitch_classes(degree) {
                    for oct_offset in -2..=2 {
                        let candidate = (octave + oct_offset) * 12 + pc;
                        if candidate < low as i32 || candidate > high as i32 {
                            continue;
                        }
                        if !(0..=127).contains(&candidate) {
                            continue;
                        }
                        if !self.is_safe(harmony, candidate as u8) {
                            continue;
                        }
                        let dist = (candidate - self.pitch as i32).abs();
                        if dist < best_dist {
                            best_dist = dist;
                            best = candidate;
                        }
                    }
                }
                (best >= 0).then(|| best as u8)
            }

            PitchFallback::Octave(low, high) => {
                for oct_offset in [-1, 1, -2, 2] {
                    let candidate = self.pitch as i32 + oct_offset * 12;
                    if candidate < low as i32 || candidate > high as i32 {
                        continue;
                    }
                    if self.is_safe(harmony, candidate as u8) {
                        return Some(candidate as u8);
                    }
                }
                None
            }
        }
    }

    /// Resolve a safe pitch and build the note, without registering it.
    pub fn build(&self, harmony: &HarmonyContext) -> Option<NoteEvent> {
        let pitch = self.find_safe_pitch(harmony)?;
        let mut note = create_note(
            harmony,
            self.start,
            self.duration,
            pitch,
            self.velocity,
            self.source,
        );
        note.original_pitch = self.pitch;
        Some(note)
    }

    /// Build, register with the harmony context, and append to the track.
    /// Returns false when the note was skipped.
    pub fn add_to(&self, track: &mut Track, harmony: &mut HarmonyContext) -> bool {
        match self.build(harmony) {
            Some(note) => {
                harmony.register_note(note.start_tick, note.duration, note.pitch, self.role);
                track.add_note(note);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrange::make_section;
    use crate::theory::chord_progression;
    use crate::types::{Arrangement, Mood, SectionType, BASS_HIGH, BASS_LOW};

    fn harmony() -> HarmonyContext {
        let arrangement = Arrangement::new(vec![make_section(SectionType::A, 0, 8)]);
        let mut ctx = HarmonyContext::new();
        ctx.initialize(&arrangement, chord_progression(0), Mood::StraightPop);
        ctx
    }

    #[test]
    fn create_records_provenance() {
        let ctx = harmony();
        let note = create_note(&ctx, 1920, 480, 67, 90, NoteSource::BassPattern);
        assert_eq!(note.chord_degree, 4); // bar 1 of Canon is V
        assert_eq!(note.lookup_tick, 1920);
        assert_eq!(note.original_pitch, 67);
    }

    #[test]
    fn modify_preserves_original_pitch() {
        let ctx = harmony();
        let note = create_note(&ctx, 0, 480, 67, 90, NoteSource::MelodyPhrase);
        let moved = modify_note(&note, 64, NoteSource::CollisionAvoid);
        assert_eq!(moved.pitch, 64);
        assert_eq!(moved.original_pitch, 67);
        assert_eq!(moved.source, NoteSource::CollisionAvoid);
    }

    #[test]
    fn skip_fallback_drops_unsafe_note() {
        let mut ctx = harmony();
        let mut track = Track::new(TrackRole::Aux);
        ctx.register_note(0, 960, 60, TrackRole::Chord);
        let added = SafeNote::at(0, 480)
            .pitch(61)
            .role(TrackRole::Aux)
            .source(NoteSource::Aux)
            .add_to(&mut track, &mut ctx);
        assert!(!added);
        assert!(track.is_empty());
    }

    #[test]
    fn root_fallback_recovers() {
        let mut ctx = harmony();
        let mut track = Track::new(TrackRole::Bass);
        ctx.register_note(0, 960, 56, TrackRole::Chord); // Ab3 blocks G
        let added = SafeNote::at(0, 480)
            .pitch(55) // G2, minor 2nd against Ab
            .role(TrackRole::Bass)
            .source(NoteSource::BassPattern)
            .fallback(PitchFallback::Root(48))
            .add_to(&mut track, &mut ctx);
        assert!(added);
        assert_eq!(track.notes()[0].pitch % 12, 0);
        assert_eq!(track.notes()[0].original_pitch, 55);
    }

    #[test]
    fn added_note_registers_for_later_collisions() {
        let mut ctx = harmony();
        let mut track = Track::new(TrackRole::Chord);
        assert!(SafeNote::at(0, 960)
            .pitch(64)
            .role(TrackRole::Chord)
            .source(NoteSource::ChordVoicing)
            .add_to(&mut track, &mut ctx));
        // A minor 2nd against the freshly registered note is now unsafe.
        assert!(!ctx.is_pitch_safe(65, 0, 480, TrackRole::Vocal));
    }

    #[test]
    fn bass_rejects_tritone_against_chord_duration() {
        let mut ctx = harmony();
        let mut track = Track::new(TrackRole::Bass);
        // Chord holds B (pc 11) across bar 0 (tonic bar: tritone vs F stands).
        ctx.register_note(0, 1920, 71, TrackRole::Chord);
        let added = SafeNote::at(0, 480)
            .pitch(41) // F2
            .role(TrackRole::Bass)
            .source(NoteSource::BassPattern)
            .fallback(PitchFallback::ChordTone(BASS_LOW, BASS_HIGH))
            .add_to(&mut track, &mut ctx);
        assert!(added);
        assert_ne!(track.notes()[0].pitch % 12, 5);
    }
}
