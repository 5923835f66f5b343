//! Drum track generation.
//!
//! Pattern tables per mood family: four-on-the-floor for dance, halftime
//! for ballads, a straight backbeat otherwise.  Sections choose ride or
//! hi-hat from the property table; section-final bars get a fill and
//! section downbeats a crash.

use crate::arrange::section_properties;
use crate::harmony::HarmonyContext;
use crate::note::create_note;
use crate::types::{
    Mood, NoteSource, SectionType, Song, Tick, Track, TrackMask, TICKS_PER_BAR, TICKS_PER_BEAT,
    TICK_EIGHTH, TICK_SIXTEENTH,
};
use crate::velocity::calculate_velocity;

/// GM drum map notes.
const KICK: u8 = 36;
const SNARE: u8 = 38;
const HIHAT_CLOSED: u8 = 42;
const HIHAT_OPEN: u8 = 46;
const RIDE: u8 = 51;
const CRASH: u8 = 49;
const TOM_HIGH: u8 = 48;
const TOM_MID: u8 = 45;
const TOM_LOW: u8 = 41;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrumFeel {
    FourOnFloor,
    Backbeat,
    Halftime,
}

fn feel_for_mood(mood: Mood) -> DrumFeel {
    if mood.is_ballad() {
        DrumFeel::Halftime
    } else if mood.is_dance_oriented() || mood.is_synth_oriented() {
        DrumFeel::FourOnFloor
    } else {
        DrumFeel::Backbeat
    }
}

fn hit(
    track: &mut Track,
    harmony: &HarmonyContext,
    tick: Tick,
    pitch: u8,
    velocity: u8,
) {
    let note = create_note(harmony, tick, TICK_SIXTEENTH, pitch, velocity, NoteSource::Drums);
    track.add_note(note);
}

/// One bar of the groove.
fn generate_drum_bar(
    track: &mut Track,
    harmony: &HarmonyContext,
    bar_start: Tick,
    feel: DrumFeel,
    section: SectionType,
    mood: Mood,
    use_ride: bool,
) {
    let vel = calculate_velocity(section, 0, mood);
    let vel_weak = (vel as f32 * 0.75) as u8;
    let cymbal = if use_ride { RIDE } else { HIHAT_CLOSED };

    match feel {
        DrumFeel::FourOnFloor => {
            for beat in 0..4u32 {
                let tick = bar_start + beat * TICKS_PER_BEAT;
                hit(track, harmony, tick, KICK, vel);
                if beat % 2 == 1 {
                    hit(track, harmony, tick, SNARE, vel);
                }
                // Open hat on the off-beats drives the pulse.
                hit(track, harmony, tick + TICK_EIGHTH, HIHAT_OPEN, vel_weak);
                hit(track, harmony, tick, cymbal, vel_weak);
            }
        }
        DrumFeel::Backbeat => {
            for beat in 0..4u32 {
                let tick = bar_start + beat * TICKS_PER_BEAT;
                match beat {
                    0 => hit(track, harmony, tick, KICK, vel),
                    2 => {
                        hit(track, harmony, tick, KICK, vel);
                        // Push into beat 3.
                        hit(track, harmony, tick + TICK_EIGHTH, KICK, vel_weak);
                    }
                    _ => hit(track, harmony, tick, SNARE, vel),
                }
                hit(track, harmony, tick, cymbal, vel_weak);
                hit(track, harmony, tick + TICK_EIGHTH, cymbal, (vel_weak as f32 * 0.8) as u8);
            }
        }
        DrumFeel::Halftime => {
            hit(track, harmony, bar_start, KICK, vel);
            hit(track, harmony, bar_start + 2 * TICKS_PER_BEAT, SNARE, vel);
            for beat in 0..4u32 {
                hit(
                    track,
                    harmony,
                    bar_start + beat * TICKS_PER_BEAT,
                    cymbal,
                    (vel_weak as f32 * 0.8) as u8,
                );
            }
        }
    }
}

/// Simple tom run into the next section.
fn generate_fill(
    track: &mut Track,
    harmony: &HarmonyContext,
    bar_start: Tick,
    section: SectionType,
    mood: Mood,
) {
    let vel = calculate_velocity(section, 0, mood);
    let toms = [TOM_HIGH, TOM_HIGH, TOM_MID, TOM_MID, TOM_LOW, SNARE, TOM_LOW, SNARE];
    let fill_start = bar_start + 2 * TICKS_PER_BEAT;
    for (i, &tom) in toms.iter().enumerate() {
        let tick = fill_start + i as Tick * TICK_EIGHTH;
        let velocity = (vel as f32 * (0.7 + 0.04 * i as f32)) as u8;
        hit(track, harmony, tick, tom, velocity.min(127));
    }
}

/// Generate the drum track.
pub fn generate_drum_track(
    track: &mut Track,
    song: &Song,
    mood: Mood,
    harmony: &HarmonyContext,
) {
    let feel = feel_for_mood(mood);
    let sections = song.arrangement().sections();

    for (sec_idx, section) in sections.iter().enumerate() {
        if !section.track_mask.contains(TrackMask::DRUMS) {
            continue;
        }
        // Intros and chants keep the kit quiet.
        if matches!(section.section_type, SectionType::Chant) {
            continue;
        }
        let use_ride = section_properties(section.section_type).use_ride;
        let next_differs = sections
            .get(sec_idx + 1)
            .map(|next| next.section_type != section.section_type)
            .unwrap_or(false);

        for bar in 0..section.bars as u32 {
            let bar_start = section.start_tick + bar * TICKS_PER_BAR;
            let is_final_bar = bar + 1 == section.bars as u32;

            // Crash on the section downbeat (not the very first bar of the
            // song).
            if bar == 0 && section.start_tick > 0 {
                let vel = calculate_velocity(section.section_type, 0, mood);
                hit(track, harmony, bar_start, CRASH, vel);
            }

            if is_final_bar && next_differs {
                // First half grooves, second half fills.
                generate_drum_bar(
                    track,
                    harmony,
                    bar_start,
                    feel,
                    section.section_type,
                    mood,
                    use_ride,
                );
                generate_fill(track, harmony, bar_start, section.section_type, mood);
            } else {
                generate_drum_bar(
                    track,
                    harmony,
                    bar_start,
                    feel,
                    section.section_type,
                    mood,
                    use_ride,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrange::build_structure;
    use crate::params::StructurePattern;
    use crate::theory::chord_progression;

    fn generate(mood: Mood) -> Track {
        let mut song = Song::new();
        song.set_arrangement(build_structure(StructurePattern::ShortForm));
        let mut harmony = HarmonyContext::new();
        harmony.initialize(song.arrangement(), chord_progression(0), mood);
        let mut track = Track::new(crate::types::TrackRole::Drums);
        generate_drum_track(&mut track, &song, mood, &harmony);
        track
    }

    #[test]
    fn dance_moods_kick_every_beat() {
        let track = generate(Mood::EnergeticDance);
        // First full bar: kicks on all four beats.
        for beat in 0..4u32 {
            let tick = beat * TICKS_PER_BEAT;
            assert!(
                track
                    .notes()
                    .iter()
                    .any(|n| n.start_tick == tick && n.pitch == KICK),
                "no kick at beat {beat}"
            );
        }
    }

    #[test]
    fn backbeat_snares_on_two_and_four() {
        let track = generate(Mood::StraightPop);
        for beat in [1u32, 3] {
            let tick = beat * TICKS_PER_BEAT;
            assert!(
                track
                    .notes()
                    .iter()
                    .any(|n| n.start_tick == tick && n.pitch == SNARE),
                "no snare at beat {beat}"
            );
        }
    }

    #[test]
    fn crash_on_section_changes() {
        let track = generate(Mood::StraightPop);
        // ShortForm: A starts at bar 2.
        let a_start = 2 * TICKS_PER_BAR;
        assert!(track
            .notes()
            .iter()
            .any(|n| n.start_tick == a_start && n.pitch == CRASH));
    }

    #[test]
    fn ballads_use_halftime() {
        let track = generate(Mood::Ballad);
        // No kick on beat 2 of the first bar in halftime.
        let beat2 = TICKS_PER_BEAT;
        assert!(!track
            .notes()
            .iter()
            .any(|n| n.start_tick == beat2 && n.pitch == KICK));
    }
}
