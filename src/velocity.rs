//! Velocity (dynamics) calculation.

use crate::arrange::section_properties;
use crate::types::{Mood, SectionType};

/// Base velocity before section and mood scaling.
const BASE_VELOCITY: f32 = 90.0;

/// Mood intensity multiplier (0.9-1.1).
pub fn mood_velocity_adjustment(mood: Mood) -> f32 {
    match mood {
        Mood::Ballad | Mood::Sentimental | Mood::Chill => 0.90,
        Mood::CityPop | Mood::Synthwave => 0.95,
        Mood::EnergeticDance | Mood::IdolPop | Mood::FutureBass => 1.05,
        Mood::BrightUpbeat | Mood::Anthem | Mood::LightRock => 1.10,
        _ => 1.0,
    }
}

/// Velocity for a note at a beat position (0-3) within the bar.  Beats 1
/// and 3 carry the accent.
pub fn calculate_velocity(section: SectionType, beat: u8, mood: Mood) -> u8 {
    let section_mult = section_properties(section).velocity_multiplier;
    let mood_mult = mood_velocity_adjustment(mood);
    let beat_mult = match beat % 4 {
        0 => 1.0,
        2 => 0.95,
        _ => 0.85,
    };
    let vel = BASE_VELOCITY * section_mult * mood_mult * beat_mult;
    (vel.round() as i32).clamp(30, 120) as u8
}

/// Energy level 1-4 for a section type.
pub fn section_energy(section: SectionType) -> u8 {
    section_properties(section).energy_level
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chorus_louder_than_verse() {
        let chorus = calculate_velocity(SectionType::Chorus, 0, Mood::StraightPop);
        let verse = calculate_velocity(SectionType::A, 0, Mood::StraightPop);
        assert!(chorus > verse);
    }

    #[test]
    fn downbeat_accented() {
        let on = calculate_velocity(SectionType::A, 0, Mood::StraightPop);
        let off = calculate_velocity(SectionType::A, 1, Mood::StraightPop);
        assert!(on > off);
    }

    #[test]
    fn ballad_softer_than_anthem() {
        let ballad = calculate_velocity(SectionType::Chorus, 0, Mood::Ballad);
        let anthem = calculate_velocity(SectionType::Chorus, 0, Mood::Anthem);
        assert!(ballad < anthem);
    }

    #[test]
    fn velocity_always_in_midi_range() {
        for section in [SectionType::Chant, SectionType::Chorus] {
            for beat in 0..4 {
                let v = calculate_velocity(section, beat, Mood::Anthem);
                assert!((1..=127).contains(&v));
            }
        }
    }
}
