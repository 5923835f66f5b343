//! Section properties and structure building.
//!
//! A structure pattern expands into an ordered list of sections whose
//! densities and flags come from a single per-type property table, so the
//! many section-dependent decisions across the pipeline stay consistent.

use crate::params::StructurePattern;
use crate::types::{
    Arrangement, BackingDensity, PeakLevel, Section, SectionType, Tick, TrackMask, VocalDensity,
    TICKS_PER_BAR,
};

/// Per-type defaults consumed across the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct SectionProperties {
    /// Velocity scaling for dynamics.
    pub velocity_multiplier: f32,
    /// Energy level 1-4.
    pub energy_level: u8,
    pub vocal_density: VocalDensity,
    pub backing_density: BackingDensity,
    /// Allow the raw vocal attitude (Chorus/Bridge only).
    pub allow_deviation: bool,
    /// Probability threshold for secondary-dominant insertion.
    pub secondary_tension: f32,
    /// Allow chord anticipation stabs.
    pub allows_anticipation: bool,
    /// Use ride cymbal instead of hi-hat.
    pub use_ride: bool,
}

/// Property table indexed by `SectionType` discriminant.
const SECTION_PROPERTIES: [SectionProperties; 10] = [
    // Intro: quiet, no vocal, thin backing
    SectionProperties {
        velocity_multiplier: 0.70,
        energy_level: 1,
        vocal_density: VocalDensity::None,
        backing_density: BackingDensity::Thin,
        allow_deviation: false,
        secondary_tension: 0.35,
        allows_anticipation: false,
        use_ride: false,
    },
    // A: subdued verse
    SectionProperties {
        velocity_multiplier: 0.70,
        energy_level: 2,
        vocal_density: VocalDensity::Sparse,
        backing_density: BackingDensity::Normal,
        allow_deviation: false,
        secondary_tension: 0.45,
        allows_anticipation: true,
        use_ride: false,
    },
    // B: building pre-chorus
    SectionProperties {
        velocity_multiplier: 0.85,
        energy_level: 3,
        vocal_density: VocalDensity::Full,
        backing_density: BackingDensity::Normal,
        allow_deviation: false,
        secondary_tension: 0.65,
        allows_anticipation: true,
        use_ride: false,
    },
    // Chorus: full release
    SectionProperties {
        velocity_multiplier: 1.10,
        energy_level: 4,
        vocal_density: VocalDensity::Full,
        backing_density: BackingDensity::Thick,
        allow_deviation: true,
        secondary_tension: 0.75,
        allows_anticipation: true,
        use_ride: true,
    },
    // Bridge: reflective
    SectionProperties {
        velocity_multiplier: 0.65,
        energy_level: 2,
        vocal_density: VocalDensity::Sparse,
        backing_density: BackingDensity::Thin,
        allow_deviation: true,
        secondary_tension: 0.60,
        allows_anticipation: true,
        use_ride: true,
    },
    // Interlude
    SectionProperties {
        velocity_multiplier: 0.70,
        energy_level: 1,
        vocal_density: VocalDensity::None,
        backing_density: BackingDensity::Thin,
        allow_deviation: false,
        secondary_tension: 0.35,
        allows_anticipation: false,
        use_ride: true,
    },
    // Outro
    SectionProperties {
        velocity_multiplier: 0.75,
        energy_level: 2,
        vocal_density: VocalDensity::None,
        backing_density: BackingDensity::Normal,
        allow_deviation: false,
        secondary_tension: 0.25,
        allows_anticipation: false,
        use_ride: false,
    },
    // Chant
    SectionProperties {
        velocity_multiplier: 0.55,
        energy_level: 1,
        vocal_density: VocalDensity::None,
        backing_density: BackingDensity::Thin,
        allow_deviation: false,
        secondary_tension: 0.25,
        allows_anticipation: false,
        use_ride: false,
    },
    // MixBreak
    SectionProperties {
        velocity_multiplier: 1.10,
        energy_level: 1,
        vocal_density: VocalDensity::None,
        backing_density: BackingDensity::Thick,
        allow_deviation: false,
        secondary_tension: 0.55,
        allows_anticipation: true,
        use_ride: true,
    },
    // Drop
    SectionProperties {
        velocity_multiplier: 1.10,
        energy_level: 4,
        vocal_density: VocalDensity::None,
        backing_density: BackingDensity::Thin,
        allow_deviation: false,
        secondary_tension: 0.40,
        allows_anticipation: true,
        use_ride: true,
    },
];

pub fn section_properties(section_type: SectionType) -> &'static SectionProperties {
    &SECTION_PROPERTIES[section_type as usize]
}

// ═══════════════════════════════════════════════════════════════════════
// Structure patterns
// ═══════════════════════════════════════════════════════════════════════

fn pattern_blocks(pattern: StructurePattern) -> &'static [(SectionType, u8)] {
    match pattern {
        StructurePattern::FullPop => &[
            (SectionType::Intro, 4),
            (SectionType::A, 8),
            (SectionType::B, 8),
            (SectionType::Chorus, 8),
            (SectionType::Interlude, 4),
            (SectionType::A, 8),
            (SectionType::B, 8),
            (SectionType::Chorus, 8),
            (SectionType::Bridge, 8),
            (SectionType::Chorus, 8),
            (SectionType::Outro, 4),
        ],
        StructurePattern::StandardPop => &[
            (SectionType::Intro, 4),
            (SectionType::A, 8),
            (SectionType::B, 4),
            (SectionType::Chorus, 8),
            (SectionType::Interlude, 2),
            (SectionType::A, 8),
            (SectionType::B, 4),
            (SectionType::Chorus, 8),
            (SectionType::Outro, 4),
        ],
        StructurePattern::ShortForm => &[
            (SectionType::Intro, 2),
            (SectionType::A, 8),
            (SectionType::B, 4),
            (SectionType::Chorus, 8),
            (SectionType::Outro, 2),
        ],
    }
}

/// Build one section with type-derived defaults.
pub fn make_section(section_type: SectionType, start_tick: Tick, bars: u8) -> Section {
    let props = section_properties(section_type);
    Section {
        section_type,
        start_tick,
        bars,
        density_percent: 80,
        backing_density: props.backing_density,
        vocal_density: props.vocal_density,
        track_mask: TrackMask::ALL,
        peak_level: match props.energy_level {
            4 => PeakLevel::High,
            3 => PeakLevel::Normal,
            2 => PeakLevel::Normal,
            _ => PeakLevel::Low,
        },
    }
}

/// Expand a structure pattern into a contiguous arrangement.  The final
/// chorus is promoted to `PeakLevel::Max` for arrangement growth.
pub fn build_structure(pattern: StructurePattern) -> Arrangement {
    let blocks = pattern_blocks(pattern);
    let mut sections = Vec::with_capacity(blocks.len());
    let mut tick: Tick = 0;
    for &(section_type, bars) in blocks {
        sections.push(make_section(section_type, tick, bars));
        tick += bars as Tick * TICKS_PER_BAR;
    }
    if let Some(last_chorus) = sections
        .iter_mut()
        .rev()
        .find(|s| s.section_type == SectionType::Chorus)
    {
        last_chorus.peak_level = PeakLevel::Max;
    }
    Arrangement::new(sections)
}
