//! Scale, chord, and progression primitives.
//!
//! Internal processing is always in C major; transposition to the target
//! key happens only at MIDI emission.  Degrees are 0-6 for the diatonic
//! chords (I..vii) plus borrowed degrees 8=bVI, 10=bVII, 11=bIII, 12=iv,
//! 13=bII, 14=#IVdim.

use serde::{Deserialize, Serialize};

/// C major scale as semitone offsets from the tonic.
pub const SCALE: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Note names for display and reports.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// True when `pitch_class` is diatonic to the major scale on `key_offset`.
pub fn is_scale_tone(pitch_class: i32, key_offset: i32) -> bool {
    let pc = (pitch_class - key_offset).rem_euclid(12);
    SCALE.contains(&pc)
}

/// Semitone offset from the tonic for a chord degree, handling borrowed
/// chords from the parallel minor.
pub fn degree_to_semitone(degree: i8) -> i32 {
    match degree {
        8 => 8,   // bVI
        10 => 10, // bVII
        11 => 3,  // bIII
        12 => 5,  // iv (minor subdominant shares the IV root)
        13 => 1,  // bII (Neapolitan)
        14 => 6,  // #IVdim
        d => SCALE[((d % 7) + 7) as usize % 7],
    }
}

/// Root pitch class (0-11) for a chord degree.
pub fn root_pitch_class(degree: i8) -> i32 {
    degree_to_semitone(degree).rem_euclid(12)
}

/// Root pitch in the C4 octave (60-71) for a chord degree.
pub fn degree_to_root(degree: i8) -> u8 {
    (60 + root_pitch_class(degree)) as u8
}

// ═══════════════════════════════════════════════════════════════════════
// Chord qualities
// ═══════════════════════════════════════════════════════════════════════

/// Intervals of a chord above its root.  Unused slots are -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chord {
    pub intervals: [i8; 5],
    pub note_count: u8,
    pub is_diminished: bool,
}

impl Chord {
    fn triad(intervals: [i8; 3]) -> Chord {
        Chord {
            intervals: [intervals[0], intervals[1], intervals[2], -1, -1],
            note_count: 3,
            is_diminished: false,
        }
    }

    pub fn active_intervals(&self) -> impl Iterator<Item = i8> + '_ {
        self.intervals
            .iter()
            .take(self.note_count as usize)
            .copied()
            .filter(|&i| i >= 0)
    }
}

/// Build the basic triad for a scale degree.
///
/// ii, iii, vi, and iv are minor; vii and #IVdim are diminished; everything
/// else (including the borrowed bVI/bVII/bIII/bII) is major.
pub fn chord_notes(degree: i8) -> Chord {
    if degree == 6 || degree == 14 {
        return Chord {
            intervals: [0, 3, 6, -1, -1],
            note_count: 3,
            is_diminished: true,
        };
    }
    let is_minor = matches!(degree, 1 | 2 | 5 | 12);
    if is_minor {
        Chord::triad([0, 3, 7])
    } else {
        Chord::triad([0, 4, 7])
    }
}

/// Extension applied to a bar's chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChordExtension {
    None,
    Sus2,
    Sus4,
    Maj7,
    Min7,
    Dom7,
    Add9,
    Maj9,
    Min9,
    Dom9,
}

impl ChordExtension {
    pub fn is_sus(self) -> bool {
        matches!(self, ChordExtension::Sus2 | ChordExtension::Sus4)
    }
}

/// Build a chord with an extension applied.  Extensions never apply to
/// diminished chords.
pub fn extended_chord(degree: i8, extension: ChordExtension) -> Chord {
    let base = chord_notes(degree);
    if base.is_diminished {
        return base;
    }
    let make = |intervals: &[i8]| {
        let mut c = Chord {
            intervals: [-1; 5],
            note_count: intervals.len() as u8,
            is_diminished: false,
        };
        c.intervals[..intervals.len()].copy_from_slice(intervals);
        c
    };
    match extension {
        ChordExtension::None => base,
        ChordExtension::Sus2 => make(&[0, 2, 7]),
        ChordExtension::Sus4 => make(&[0, 5, 7]),
        ChordExtension::Maj7 => make(&[0, 4, 7, 11]),
        ChordExtension::Min7 => make(&[0, 3, 7, 10]),
        ChordExtension::Dom7 => make(&[0, 4, 7, 10]),
        ChordExtension::Add9 => make(&[0, 4, 7, 14]),
        ChordExtension::Maj9 => make(&[0, 4, 7, 11, 14]),
        ChordExtension::Min9 => make(&[0, 3, 7, 10, 14]),
        ChordExtension::Dom9 => make(&[0, 4, 7, 10, 14]),
    }
}

/// Chord tone pitch classes (0-11) for a degree's basic triad.
pub fn chord_tone_pitch_classes(degree: i8) -> Vec<i32> {
    let root = root_pitch_class(degree);
    chord_notes(degree)
        .active_intervals()
        .map(|i| (root + i as i32) % 12)
        .collect()
}

/// Guide tones (3rd and 7th) for a degree.  Triads infer the diatonic 7th:
/// major 7th on I and IV, minor 7th elsewhere.
pub fn guide_tone_pitch_classes(degree: i8) -> Vec<i32> {
    let root = root_pitch_class(degree);
    let chord = chord_notes(degree);
    let mut guides = Vec::with_capacity(2);
    guides.push((root + chord.intervals[1] as i32) % 12);
    let normalized = ((degree % 7) + 7) % 7;
    let seventh = match normalized {
        0 | 3 => 11,
        _ => 10,
    };
    guides.push((root + seventh) % 12);
    guides
}

// ═══════════════════════════════════════════════════════════════════════
// Available tensions
// ═══════════════════════════════════════════════════════════════════════

/// Non-chord tones that sound consonant for a chord quality.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvailableTensions {
    pub ninth: Option<i32>,
    pub eleventh: Option<i32>,
    pub thirteenth: Option<i32>,
}

/// Tension table by degree quality: major chords take 9/13 (no 11, which
/// clashes with the major 3rd), minor chords take 9/11, the diminished vii
/// takes none.
pub fn available_tensions(degree: i8) -> AvailableTensions {
    let normalized = ((degree % 7) + 7) % 7;
    let root = SCALE[normalized as usize];
    let pc = |offset: i32| (root + offset).rem_euclid(12);
    match normalized {
        0 | 3 | 4 => AvailableTensions {
            ninth: Some(pc(2)),
            eleventh: None,
            thirteenth: Some(pc(9)),
        },
        1 => AvailableTensions {
            ninth: Some(pc(2)),
            eleventh: Some(pc(5)),
            thirteenth: Some(pc(9)),
        },
        2 => AvailableTensions {
            ninth: None,
            eleventh: Some(pc(5)),
            thirteenth: Some(pc(8)),
        },
        5 => AvailableTensions {
            ninth: Some(pc(2)),
            eleventh: Some(pc(5)),
            thirteenth: None,
        },
        _ => AvailableTensions::default(),
    }
}

/// True when `pitch_class` is an available tension for the degree.
pub fn is_available_tension(pitch_class: i32, degree: i8) -> bool {
    let t = available_tensions(degree);
    t.ninth == Some(pitch_class)
        || t.eleventh == Some(pitch_class)
        || t.thirteenth == Some(pitch_class)
}

/// True when `pitch_class` is a chord tone of the degree, optionally
/// counting the diatonic 7th and 9th when those extensions are enabled.
pub fn is_chord_tone_with_extensions(
    pitch_class: i32,
    degree: i8,
    enable_7th: bool,
    enable_9th: bool,
) -> bool {
    if chord_tone_pitch_classes(degree).contains(&pitch_class) {
        return true;
    }
    let normalized = ((degree % 7) + 7) % 7;
    let root = SCALE[normalized as usize];
    if enable_7th {
        let seventh = match normalized {
            0 | 3 => 11,
            6 => 9,
            _ => 10,
        };
        if (root + seventh) % 12 == pitch_class {
            return true;
        }
    }
    if enable_9th && (root + 2) % 12 == pitch_class {
        return true;
    }
    false
}

// ═══════════════════════════════════════════════════════════════════════
// Secondary dominants
// ═══════════════════════════════════════════════════════════════════════

/// Chord tones of the five common secondary dominants in C major:
/// V/ii=A7, V/iii=B7, V/IV=C7, V/V=D7, V/vi=E7.  Notes in these chords are
/// intentionally non-diatonic and must not be flagged by the analyzer.
pub fn is_secondary_dominant_tone(pitch_class: i32) -> bool {
    const DOMINANTS: [[i32; 4]; 5] = [
        [9, 1, 4, 7],   // A7
        [11, 3, 6, 9],  // B7
        [0, 4, 7, 10],  // C7
        [2, 6, 9, 0],   // D7
        [4, 8, 11, 2],  // E7
    ];
    DOMINANTS.iter().any(|chord| chord.contains(&pitch_class))
}

/// Result of a secondary-dominant applicability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecondaryDominantInfo {
    pub should_insert: bool,
    pub dominant_degree: i8,
}

/// Diatonic degree whose triad functions as V of `target`, when one exists.
/// ii←vi, iii←vii, IV←I, V←ii, vi←iii.
pub fn dominant_of(target: i8) -> Option<i8> {
    match target {
        1 => Some(5),
        2 => Some(6),
        3 => Some(0),
        4 => Some(1),
        5 => Some(2),
        _ => None,
    }
}

/// Decide whether a V/x belongs between `current` and `next`.
///
/// The dominant must exist, differ from the chord already sounding, and the
/// section tension must make the color worth the chromaticism.
pub fn check_secondary_dominant(current: i8, next: i8, tension: f32) -> SecondaryDominantInfo {
    let none = SecondaryDominantInfo {
        should_insert: false,
        dominant_degree: 4,
    };
    if tension < 0.3 || next == current {
        return none;
    }
    match dominant_of(next) {
        Some(dom) if dom != current && dom != next => SecondaryDominantInfo {
            should_insert: true,
            dominant_degree: dom,
        },
        _ => none,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Chord progressions
// ═══════════════════════════════════════════════════════════════════════

/// A fixed chord cycle: 4 or 5 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChordProgression {
    pub degrees: [i8; 8],
    pub length: u8,
    pub name: &'static str,
}

impl ChordProgression {
    pub fn at(&self, index: usize) -> i8 {
        self.degrees[index % self.length as usize]
    }
}

const fn prog4(name: &'static str, a: i8, b: i8, c: i8, d: i8) -> ChordProgression {
    ChordProgression {
        degrees: [a, b, c, d, -1, -1, -1, -1],
        length: 4,
        name,
    }
}

const fn prog5(name: &'static str, a: i8, b: i8, c: i8, d: i8, e: i8) -> ChordProgression {
    ChordProgression {
        degrees: [a, b, c, d, e, -1, -1, -1],
        length: 5,
        name,
    }
}

/// The 22 canonical progressions (20 four-chord + 2 five-chord).
pub const PROGRESSIONS: [ChordProgression; 22] = [
    prog4("Canon", 0, 4, 5, 3),      // I - V - vi - IV
    prog4("Pop1", 0, 5, 3, 4),       // I - vi - IV - V
    prog4("Axis", 5, 3, 0, 4),       // vi - IV - I - V
    prog4("Pop2", 3, 0, 4, 5),       // IV - I - V - vi
    prog4("Classic", 0, 3, 4, 0),    // I - IV - V - I
    prog4("Pop3", 0, 3, 5, 4),       // I - IV - vi - V
    prog4("Oudou", 3, 4, 2, 5),      // IV - V - iii - vi
    prog4("Minor1", 5, 4, 3, 4),     // vi - V - IV - V
    prog4("Minor2", 5, 3, 4, 0),     // vi - IV - V - I
    prog4("Pop4", 0, 4, 2, 3),       // I - V - iii - IV
    prog4("Pop5", 0, 2, 3, 4),       // I - iii - IV - V
    prog4("Rock1", 0, 10, 3, 0),     // I - bVII - IV - I
    prog4("Rock2", 0, 3, 10, 0),     // I - IV - bVII - I
    prog4("Extended4", 0, 4, 5, 2),  // I - V - vi - iii
    prog4("Minor3", 5, 0, 4, 3),     // vi - I - V - IV
    prog4("Komuro", 5, 3, 4, 0),     // vi - IV - V - I
    prog4("Neo1", 5, 2, 3, 0),       // vi - iii - IV - I
    prog4("JazzPop", 1, 4, 0, 5),    // ii - V - I - vi
    prog4("Neo2", 5, 1, 4, 0),       // vi - ii - V - I
    prog4("CityPop", 0, 5, 1, 4),    // I - vi - ii - V
    prog5("Extended5", 0, 4, 5, 2, 3),   // I - V - vi - iii - IV
    prog5("Emotional5", 5, 3, 0, 4, 1),  // vi - IV - I - V - ii
];

/// Look up a progression by id, clamping out-of-range ids to the last entry.
pub fn chord_progression(chord_id: u8) -> &'static ChordProgression {
    &PROGRESSIONS[(chord_id as usize).min(PROGRESSIONS.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canon_progression_degrees() {
        let p = chord_progression(0);
        assert_eq!(p.name, "Canon");
        assert_eq!(&p.degrees[..4], &[0, 4, 5, 3]);
        assert_eq!(p.at(5), 4); // wraps
    }

    #[test]
    fn five_chord_progressions_have_length_five() {
        assert_eq!(chord_progression(20).length, 5);
        assert_eq!(chord_progression(21).length, 5);
    }

    #[test]
    fn all_progression_degrees_in_allowed_set() {
        for p in &PROGRESSIONS {
            for i in 0..p.length as usize {
                let d = p.degrees[i];
                assert!(
                    (0..=6).contains(&d) || d == 8 || d == 10 || d == 11,
                    "{}[{}] = {}",
                    p.name,
                    i,
                    d
                );
            }
        }
    }

    #[test]
    fn triad_qualities() {
        assert_eq!(chord_notes(0).intervals[1], 4); // I major
        assert_eq!(chord_notes(1).intervals[1], 3); // ii minor
        assert!(chord_notes(6).is_diminished); // vii
        assert_eq!(chord_notes(10).intervals[1], 4); // bVII major
    }

    #[test]
    fn borrowed_roots() {
        assert_eq!(root_pitch_class(10), 10); // bVII = Bb
        assert_eq!(root_pitch_class(8), 8); // bVI = Ab
        assert_eq!(root_pitch_class(11), 3); // bIII = Eb
    }

    #[test]
    fn chord_tones_of_v_contain_leading_tone() {
        let tones = chord_tone_pitch_classes(4);
        assert_eq!(tones, vec![7, 11, 2]);
    }

    #[test]
    fn tensions_follow_quality() {
        // I: 9th and 13th, no 11th.
        let t = available_tensions(0);
        assert_eq!(t.ninth, Some(2));
        assert_eq!(t.eleventh, None);
        assert_eq!(t.thirteenth, Some(9));
        // vi: 9th and 11th, no 13th.
        let t = available_tensions(5);
        assert_eq!(t.ninth, Some(11));
        assert_eq!(t.eleventh, Some(2));
        assert_eq!(t.thirteenth, None);
        // vii: none.
        let t = available_tensions(6);
        assert!(t.ninth.is_none() && t.eleventh.is_none() && t.thirteenth.is_none());
    }

    #[test]
    fn sus_chords_replace_the_third() {
        let sus4 = extended_chord(0, ChordExtension::Sus4);
        assert_eq!(&sus4.intervals[..3], &[0, 5, 7]);
        let sus2 = extended_chord(0, ChordExtension::Sus2);
        assert_eq!(&sus2.intervals[..3], &[0, 2, 7]);
    }

    #[test]
    fn dominant_mapping() {
        assert_eq!(dominant_of(1), Some(5)); // V/ii = A (vi degree)
        assert_eq!(dominant_of(5), Some(2)); // V/vi = E (iii degree)
        assert_eq!(dominant_of(3), Some(0)); // V/IV = C (I degree)
        assert_eq!(dominant_of(0), None);
    }

    #[test]
    fn secondary_dominant_check_respects_tension() {
        assert!(!check_secondary_dominant(0, 5, 0.1).should_insert);
        let info = check_secondary_dominant(0, 5, 0.6);
        assert!(info.should_insert);
        assert_eq!(info.dominant_degree, 2); // V/vi = iii (E)
    }

    #[test]
    fn secondary_dominant_tones_cover_e7() {
        for pc in [4, 8, 11, 2] {
            assert!(is_secondary_dominant_tone(pc));
        }
        assert!(!is_secondary_dominant_tone(5)); // F is in no common V/x
    }
}
