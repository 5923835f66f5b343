//! Harmonic rhythm: how often chords change within a section, and the
//! shared phrase-split decision.
//!
//! Every generator that emits per-bar material (chord, bass, arpeggio) and
//! the harmony context itself resolve a bar's chords through `bar_harmony`,
//! so split decisions are identical across tracks by construction.

use crate::types::{Mood, SectionType};

/// How often chords change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmonicDensity {
    /// Every 2 bars (Intro, Interlude, Outro, Chant).
    Slow,
    /// Every bar.
    Normal,
    /// May change mid-bar at phrase ends.
    Dense,
}

/// Density plus the subdivision flags for a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarmonicRhythmInfo {
    pub density: HarmonicDensity,
    /// Add an extra chord change at phrase ends.
    pub double_at_phrase_end: bool,
    /// 1 = whole-bar chords, 2 = half-bar chord changes.
    pub subdivision: u8,
}

impl HarmonicRhythmInfo {
    pub fn for_section(section: SectionType, mood: Mood) -> HarmonicRhythmInfo {
        let is_ballad = mood.is_ballad();
        match section {
            SectionType::Intro
            | SectionType::Interlude
            | SectionType::Outro
            | SectionType::Chant => HarmonicRhythmInfo {
                density: HarmonicDensity::Slow,
                double_at_phrase_end: false,
                subdivision: 1,
            },
            SectionType::A | SectionType::Bridge => HarmonicRhythmInfo {
                density: HarmonicDensity::Normal,
                double_at_phrase_end: false,
                subdivision: 1,
            },
            // Pre-chorus: half-bar chord changes for harmonic acceleration
            SectionType::B => HarmonicRhythmInfo {
                density: HarmonicDensity::Normal,
                double_at_phrase_end: !is_ballad,
                subdivision: if is_ballad { 1 } else { 2 },
            },
            SectionType::Chorus => HarmonicRhythmInfo {
                density: if is_ballad {
                    HarmonicDensity::Normal
                } else {
                    HarmonicDensity::Dense
                },
                double_at_phrase_end: !is_ballad,
                subdivision: 1,
            },
            SectionType::MixBreak | SectionType::Drop => HarmonicRhythmInfo {
                density: HarmonicDensity::Dense,
                double_at_phrase_end: true,
                subdivision: 1,
            },
        }
    }
}

/// Whether this bar gets a phrase-end chord split (first half current
/// chord, second half anticipating the next).
///
/// Requires Dense density.  Fires on phrase-end bars (every 4th bar or the
/// last bar of the chord cycle) that are not the section's final bar, and
/// additionally on even non-zero chorus bars for the four most energetic
/// moods.
pub fn should_split_phrase_end(
    bar: u32,
    section_bars: u32,
    prog_length: u32,
    harmonic: &HarmonicRhythmInfo,
    section_type: SectionType,
    mood: Mood,
) -> bool {
    if harmonic.density != HarmonicDensity::Dense {
        return false;
    }

    let is_4bar_phrase_end = bar % 4 == 3;
    let is_chord_cycle_end = prog_length > 0 && bar % prog_length == prog_length - 1;
    let is_phrase_end = harmonic.double_at_phrase_end
        && (is_4bar_phrase_end || is_chord_cycle_end)
        && bar + 1 < section_bars;

    let is_dense_extra = section_type == SectionType::Chorus
        && bar % 2 == 0
        && bar > 0
        && matches!(
            mood,
            Mood::EnergeticDance | Mood::IdolPop | Mood::Yoasobi | Mood::FutureBass
        );

    is_phrase_end || is_dense_extra
}

/// Chord index for a bar under whole-bar or slow harmonic rhythm.
pub fn chord_index_for_bar(bar: u32, slow: bool, prog_length: u32) -> usize {
    if prog_length == 0 {
        return 0;
    }
    if slow {
        ((bar / 2) % prog_length) as usize
    } else {
        (bar % prog_length) as usize
    }
}

/// Chord index for a half-bar slot when subdivision = 2: the cycle advances
/// at twice the bar rate.
pub fn chord_index_for_subdivided_bar(bar: u32, half: u32, prog_length: u32) -> usize {
    if prog_length == 0 {
        return 0;
    }
    ((bar * 2 + half) % prog_length) as usize
}

/// The chords a bar actually plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarHarmony {
    /// One chord for the whole bar.
    Whole(usize),
    /// Two half-bar chords (subdivision or phrase-end anticipation).
    Split(usize, usize),
}

impl BarHarmony {
    pub fn first(&self) -> usize {
        match *self {
            BarHarmony::Whole(i) | BarHarmony::Split(i, _) => i,
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(self, BarHarmony::Split(..))
    }
}

/// Resolve the chord indices a bar plays.  This is the single split
/// authority: harmony context, chord, bass, arpeggio, and the analyzer all
/// go through it with the same inputs.
pub fn bar_harmony(
    bar: u32,
    section_bars: u32,
    prog_length: u32,
    section_type: SectionType,
    mood: Mood,
) -> BarHarmony {
    let info = HarmonicRhythmInfo::for_section(section_type, mood);

    if info.subdivision == 2 {
        return BarHarmony::Split(
            chord_index_for_subdivided_bar(bar, 0, prog_length),
            chord_index_for_subdivided_bar(bar, 1, prog_length),
        );
    }

    let slow = info.density == HarmonicDensity::Slow;
    let idx = chord_index_for_bar(bar, slow, prog_length);
    if should_split_phrase_end(bar, section_bars, prog_length, &info, section_type, mood) {
        let next = if prog_length == 0 {
            0
        } else {
            (idx + 1) % prog_length as usize
        };
        BarHarmony::Split(idx, next)
    } else {
        BarHarmony::Whole(idx)
    }
}
