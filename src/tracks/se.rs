//! SE / meta track: section markers.
//!
//! The SE track carries no pitched material of its own; it holds the
//! section-name text events that become the conductor track's markers in
//! the MIDI output (alongside tempo, time signature, and the embedded
//! metadata written by the MIDI writer).

use crate::types::{Song, Track};

/// Populate the SE track with one text marker per section.
pub fn generate_se_track(track: &mut Track, song: &Song) {
    for section in song.arrangement().sections() {
        track.add_text(section.start_tick, section.section_type.name());
    }
}
