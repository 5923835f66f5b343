//! songsketch — procedural multi-track song generator.
//!
//! Builds a complete pop arrangement (vocal lead, bass, chord comping,
//! arpeggio, counter-melodies, drums) from a compact configuration and
//! writes deterministic Standard MIDI or MIDI 2.0 Clip files.
//!
//! # Example
//! ```
//! use songsketch::{generate_song, write_song, GeneratorParams};
//!
//! let params = GeneratorParams { seed: 42, ..Default::default() };
//! let song = generate_song(&params);
//! let midi_bytes = write_song(&song, &params);
//! assert_eq!(&midi_bytes[0..4], b"MThd");
//! ```

pub mod analysis;
pub mod arrange;
pub mod generator;
pub mod harmony;
pub mod midi;
pub mod note;
pub mod params;
pub mod pitch;
pub mod planner;
pub mod postprocess;
pub mod rhythm;
pub mod theory;
pub mod tracks;
pub mod types;
pub mod velocity;

pub use analysis::{analyze_dissonance, analyze_parsed_midi, DissonanceReport};
pub use generator::{generate_song, Generator};
pub use midi::reader::{read_smf, read_smf_file, MidiReadError, ParsedMidi};
pub use midi::ump::write_song_midi2;
pub use midi::writer::write_song;
pub use params::GeneratorParams;
pub use types::{Key, Mood, NoteEvent, Section, SectionType, Song, Track, TrackRole};

/// Generate a song and return its SMF bytes in one step.
pub fn generate_midi(params: &GeneratorParams) -> Vec<u8> {
    let song = generate_song(params);
    write_song(&song, params)
}

/// Load generation parameters from a JSON preset string.  Missing fields
/// take their defaults.
pub fn params_from_json(json: &str) -> Result<GeneratorParams, String> {
    serde_json::from_str(json).map_err(|e| format!("Invalid preset JSON: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_step_generation_yields_valid_smf() {
        let params = GeneratorParams {
            seed: 5,
            structure: params::StructurePattern::ShortForm,
            ..Default::default()
        };
        let bytes = generate_midi(&params);
        assert_eq!(&bytes[0..4], b"MThd");
    }

    #[test]
    fn preset_json_round_trip() {
        let params = params_from_json(r#"{"seed": 9, "mood": "CityPop"}"#).unwrap();
        assert_eq!(params.seed, 9);
        assert_eq!(params.mood, Mood::CityPop);
        assert!(params_from_json("not json").is_err());
    }
}
