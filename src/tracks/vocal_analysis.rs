//! Read-only analysis of a finished vocal track.
//!
//! The vocal-first flow generates the melody before bass and chords; this
//! snapshot answers the questions those generators ask: what pitch is
//! sounding at a tick, which way is the line moving, and how busy is each
//! section.

use crate::types::{NoteEvent, Section, Tick, Track};

/// Snapshot of vocal pitches for bass/chord coordination.
#[derive(Debug, Clone, Default)]
pub struct VocalAnalysis {
    notes: Vec<NoteEvent>,
}

impl VocalAnalysis {
    pub fn analyze(track: &Track) -> VocalAnalysis {
        let mut notes = track.notes().to_vec();
        notes.sort_by_key(|n| n.start_tick);
        VocalAnalysis { notes }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Pitch sounding at `tick`, or 0 when the vocal is silent there.
    pub fn pitch_at(&self, tick: Tick) -> u8 {
        for note in &self.notes {
            if note.start_tick <= tick && note.end_tick() > tick {
                return note.pitch;
            }
            if note.start_tick > tick {
                break;
            }
        }
        0
    }

    /// Pitch class sounding at `tick`, or -1 when silent.
    pub fn pitch_class_at(&self, tick: Tick) -> i32 {
        match self.pitch_at(tick) {
            0 => -1,
            p => (p % 12) as i32,
        }
    }

    /// Melodic direction around `tick`: +1 rising, -1 falling, 0 static or
    /// silent.  Compares the note at/before the tick with the next one.
    pub fn direction_at(&self, tick: Tick) -> i8 {
        let idx = self.notes.partition_point(|n| n.start_tick <= tick);
        if idx == 0 || idx >= self.notes.len() {
            return 0;
        }
        let current = self.notes[idx - 1].pitch as i32;
        let next = self.notes[idx].pitch as i32;
        match next.cmp(&current) {
            std::cmp::Ordering::Greater => 1,
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
        }
    }

    /// Fraction of the section the vocal is actually sounding (0.0-1.0).
    pub fn density_for_section(&self, section: &Section) -> f32 {
        let start = section.start_tick;
        let end = section.end_tick();
        if end <= start {
            return 0.0;
        }
        let mut sounding: Tick = 0;
        for note in &self.notes {
            if note.start_tick >= end {
                break;
            }
            let overlap_start = note.start_tick.max(start);
            let overlap_end = note.end_tick().min(end);
            if overlap_end > overlap_start {
                sounding += overlap_end - overlap_start;
            }
        }
        (sounding as f32 / (end - start) as f32).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrange::make_section;
    use crate::types::{NoteSource, SectionType, TrackRole, TICKS_PER_BAR};

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
    fn pitch_and_direction_queries() {
        let mut track = Track::new(TrackRole::Vocal);
        track.add_note(note(0, 480, 60));
        track.add_note(note(480, 480, 64));
        track.add_note(note(960, 480, 62));
        let analysis = VocalAnalysis::analyze(&track);

        assert_eq!(analysis.pitch_at(100), 60);
        assert_eq!(analysis.pitch_at(500), 64);
        assert_eq!(analysis.pitch_at(1500), 0); // silence after last note ends
        assert_eq!(analysis.direction_at(100), 1); // 60 -> 64
        assert_eq!(analysis.direction_at(500), -1); // 64 -> 62
    }

    #[test]
    fn section_density_is_coverage_fraction() {
        let mut track = Track::new(TrackRole::Vocal);
        // One bar of sound in a 4-bar section.
        track.add_note(note(0, TICKS_PER_BAR, 60));
        let analysis = VocalAnalysis::analyze(&track);
        let section = make_section(SectionType::A, 0, 4);
        let density = analysis.density_for_section(&section);
        assert!((density - 0.25).abs() < 0.01);
    }
}
