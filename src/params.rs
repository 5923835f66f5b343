//! Generation parameters.
//!
//! `GeneratorParams` is the single configuration surface for the pipeline.
//! It deserializes from JSON presets; every field has a default so partial
//! presets work.  Invalid values are clamped, never rejected — generation
//! has no error path.

use serde::{Deserialize, Serialize};

use crate::types::{Key, Mood};

/// Song structure template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum StructurePattern {
    /// Intro / A / B / Chorus twice, Bridge, final Chorus, Outro.
    FullPop,
    /// Two verse-chorus cycles without a bridge.
    #[default]
    StandardPop,
    /// One cycle, for sketches and previews.
    ShortForm,
}

/// High-level generation flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum CompositionStyle {
    /// Vocal first; bass and chords adapt to the melody.
    #[default]
    MelodyLead,
    /// Instrumental BGM driven by a repeating motif; vocal and aux off.
    BackgroundMotif,
    /// Instrumental BGM driven by arpeggios; vocal and aux off.
    SynthDriven,
}

/// Where the key change happens, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum ModulationTiming {
    #[default]
    None,
    /// Up-shift from the start of the final chorus.
    LastChorus,
    /// Up-shift from the bridge onwards.
    Bridge,
}

/// Melody template family, selected per vocal style and section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum VocalStyle {
    #[default]
    Standard,
    Emotional,
    RhythmDriven,
    /// Machine-gun 32nd-note style; relaxes singability constraints.
    UltraVocaloid,
}

/// Non-chord-tone tolerance of the melody.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VocalAttitude {
    /// Chord tones only.
    #[default]
    Clean,
    /// Chord tones plus 7th/9th/11th color.
    Expressive,
    /// Any diatonic scale tone.
    Raw,
}

/// Timing feel applied to the vocal in post-processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VocalGrooveFeel {
    #[default]
    Straight,
    OffBeat,
    Swing,
    Syncopated,
    Driving16th,
    Bouncy8th,
}

/// How strongly hook points (chorus and pre-chorus openings) are emphasized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HookIntensity {
    Off,
    Light,
    #[default]
    Normal,
    Strong,
}

/// How the arrangement thickens towards climaxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArrangementGrowth {
    #[default]
    Static,
    /// Add a lower-octave chord doubling in choruses.
    RegisterAdd,
}

/// Arpeggio note ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArpeggioPattern {
    #[default]
    Up,
    Down,
    UpDown,
    Random,
}

/// Arpeggio subdivision speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArpeggioSpeed {
    Eighth,
    #[default]
    Sixteenth,
    Triplet,
}

/// Chord extension toggles with per-feature probabilities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ChordExtensionParams {
    pub enable_sus: bool,
    pub enable_7th: bool,
    pub enable_9th: bool,
    pub sus_probability: f32,
    pub seventh_probability: f32,
    pub ninth_probability: f32,
}

impl Default for ChordExtensionParams {
    fn default() -> Self {
        ChordExtensionParams {
            enable_sus: true,
            enable_7th: true,
            enable_9th: false,
            sus_probability: 0.25,
            seventh_probability: 0.30,
            ninth_probability: 0.20,
        }
    }
}

/// Arpeggio track configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ArpeggioParams {
    pub pattern: ArpeggioPattern,
    pub speed: ArpeggioSpeed,
    /// Octaves covered above the root (1-3).
    pub octave_range: u8,
    /// Sounding fraction of each step (0.0-1.0).
    pub gate: f32,
    /// Rebuild the pattern on every chord change.
    pub sync_chord: bool,
    pub base_velocity: u8,
}

impl Default for ArpeggioParams {
    fn default() -> Self {
        ArpeggioParams {
            pattern: ArpeggioPattern::Up,
            speed: ArpeggioSpeed::Sixteenth,
            octave_range: 2,
            gate: 0.8,
            sync_chord: true,
            base_velocity: 80,
        }
    }
}

/// Per-section melody shaping knobs for a vocal style.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleMelodyParams {
    pub verse_register_shift: i8,
    pub prechorus_register_shift: i8,
    pub chorus_register_shift: i8,
    pub bridge_register_shift: i8,
    pub verse_density_modifier: f32,
    pub prechorus_density_modifier: f32,
    pub chorus_density_modifier: f32,
    pub bridge_density_modifier: f32,
    /// Fraction of 32nd notes per section; >= 0.8 enables machine-gun mode.
    pub thirtysecond_note_ratio: f32,
    pub consecutive_same_note_prob: f32,
    /// Skip the melodic interval cap (machine-style vocals).
    pub disable_singability: bool,
}

impl Default for StyleMelodyParams {
    fn default() -> Self {
        StyleMelodyParams {
            verse_register_shift: 0,
            prechorus_register_shift: 2,
            chorus_register_shift: 3,
            bridge_register_shift: -2,
            verse_density_modifier: 0.9,
            prechorus_density_modifier: 1.0,
            chorus_density_modifier: 1.1,
            bridge_density_modifier: 0.8,
            thirtysecond_note_ratio: 0.0,
            consecutive_same_note_prob: 0.4,
            disable_singability: false,
        }
    }
}

/// Complete generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorParams {
    pub structure: StructurePattern,
    pub mood: Mood,
    /// Progression index 0-21.
    pub chord_id: u8,
    pub key: Key,
    /// MIDI note range for the vocal, auto-normalized to [36, 96].
    pub vocal_low: u8,
    pub vocal_high: u8,
    /// 0 = default tempo for the mood.
    pub bpm: u16,
    /// 0 = derive from wall clock.
    pub seed: u32,
    pub drums_enabled: bool,
    pub arpeggio_enabled: bool,
    pub humanize: bool,
    pub composition_style: CompositionStyle,
    pub modulation_timing: ModulationTiming,
    pub modulation_semitones: i8,
    pub chord_extension: ChordExtensionParams,
    pub arpeggio: ArpeggioParams,
    pub vocal_style: VocalStyle,
    pub vocal_attitude: VocalAttitude,
    pub vocal_groove: VocalGrooveFeel,
    pub hook_intensity: HookIntensity,
    pub arrangement_growth: ArrangementGrowth,
    pub melody: StyleMelodyParams,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        GeneratorParams {
            structure: StructurePattern::StandardPop,
            mood: Mood::StraightPop,
            chord_id: 0,
            key: Key::C,
            vocal_low: 60,
            vocal_high: 84,
            bpm: 0,
            seed: 1,
            drums_enabled: true,
            arpeggio_enabled: false,
            humanize: false,
            composition_style: CompositionStyle::MelodyLead,
            modulation_timing: ModulationTiming::None,
            modulation_semitones: 0,
            chord_extension: ChordExtensionParams::default(),
            arpeggio: ArpeggioParams::default(),
            vocal_style: VocalStyle::Standard,
            vocal_attitude: VocalAttitude::Clean,
            vocal_groove: VocalGrooveFeel::Straight,
            hook_intensity: HookIntensity::Normal,
            arrangement_growth: ArrangementGrowth::Static,
            melody: StyleMelodyParams::default(),
        }
    }
}

impl GeneratorParams {
    /// Clamp every range-limited field into its valid domain.  Swaps the
    /// vocal range when low > high.
    pub fn normalized(&self) -> GeneratorParams {
        let mut p = self.clone();
        if p.vocal_low > p.vocal_high {
            std::mem::swap(&mut p.vocal_low, &mut p.vocal_high);
        }
        p.vocal_low = p.vocal_low.clamp(36, 96);
        p.vocal_high = p.vocal_high.clamp(36, 96);
        // Guarantee at least an octave of working range.
        if p.vocal_high - p.vocal_low < 12 {
            p.vocal_high = (p.vocal_low + 12).min(96);
            if p.vocal_high - p.vocal_low < 12 {
                p.vocal_low = p.vocal_high - 12;
            }
        }
        p.chord_id = p.chord_id.min(21);
        p.arpeggio.octave_range = p.arpeggio.octave_range.clamp(1, 3);
        p.arpeggio.gate = p.arpeggio.gate.clamp(0.1, 1.0);
        p.arpeggio.base_velocity = p.arpeggio.base_velocity.clamp(1, 127);
        p.modulation_semitones = p.modulation_semitones.clamp(-6, 6);
        if p.vocal_style == VocalStyle::UltraVocaloid
            && p.melody.thirtysecond_note_ratio < 0.8
        {
            p.melody = StyleMelodyParams {
                thirtysecond_note_ratio: 1.0,
                disable_singability: true,
                ..p.melody
            };
        }
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_valid() {
        let p = GeneratorParams::default();
        assert!(p.vocal_low < p.vocal_high);
        assert!(p.chord_id <= 21);
    }

    #[test]
    fn normalized_swaps_inverted_range() {
        let p = GeneratorParams {
            vocal_low: 84,
            vocal_high: 60,
            ..Default::default()
        };
        let n = p.normalized();
        assert_eq!((n.vocal_low, n.vocal_high), (60, 84));
    }

    #[test]
    fn normalized_clamps_out_of_range() {
        let p = GeneratorParams {
            vocal_low: 10,
            vocal_high: 120,
            chord_id: 99,
            ..Default::default()
        };
        let n = p.normalized();
        assert_eq!((n.vocal_low, n.vocal_high), (36, 96));
        assert_eq!(n.chord_id, 21);
    }

    #[test]
    fn normalized_guarantees_an_octave() {
        let p = GeneratorParams {
            vocal_low: 70,
            vocal_high: 72,
            ..Default::default()
        };
        let n = p.normalized();
        assert!(n.vocal_high - n.vocal_low >= 12);
        let p = GeneratorParams {
            vocal_low: 95,
            vocal_high: 96,
            ..Default::default()
        };
        let n = p.normalized();
        assert_eq!((n.vocal_low, n.vocal_high), (84, 96));
    }

    #[test]
    fn partial_preset_deserializes_with_defaults() {
        let p: GeneratorParams =
            serde_json::from_str(r#"{"mood":"IdolPop","chord_id":3}"#).unwrap();
        assert_eq!(p.mood, crate::types::Mood::IdolPop);
        assert_eq!(p.chord_id, 3);
        assert!(p.drums_enabled);
    }

    #[test]
    fn ultra_vocaloid_forces_machine_gun_ratio() {
        let p = GeneratorParams {
            vocal_style: VocalStyle::UltraVocaloid,
            ..Default::default()
        };
        let n = p.normalized();
        assert!(n.melody.thirtysecond_note_ratio >= 0.8);
        assert!(n.melody.disable_singability);
    }
}
