//! MIDI input and output.
//!
//! `writer` produces Standard MIDI Files (SMF Type 1) as raw bytes;
//! `reader` parses them back (round-trip is a tested property); `ump`
//! handles the MIDI 2.0 Clip format in a ktmidi-style container.

pub mod reader;
pub mod ump;
pub mod writer;

/// Sniffed container format of a MIDI byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
    Smf1,
    Midi2Container,
    Midi2Clip,
    Unknown,
}

/// Detect the format from the leading magic bytes.
pub fn detect_format(data: &[u8]) -> DetectedFormat {
    if data.len() >= 16 && &data[..16] == ump::CONTAINER_MAGIC {
        return DetectedFormat::Midi2Container;
    }
    if data.len() >= 8 && &data[..8] == ump::CLIP_MAGIC {
        return DetectedFormat::Midi2Clip;
    }
    if data.len() >= 4 && &data[..4] == b"MThd" {
        return DetectedFormat::Smf1;
    }
    DetectedFormat::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_detection() {
        assert_eq!(detect_format(b"MThd\x00\x00\x00\x06"), DetectedFormat::Smf1);
        assert_eq!(
            detect_format(b"AAAAAAAAEEEEEEEE\x00\x00\x01\xe0"),
            DetectedFormat::Midi2Container
        );
        assert_eq!(detect_format(b"SMF2CLIP"), DetectedFormat::Midi2Clip);
        assert_eq!(detect_format(b"RIFF"), DetectedFormat::Unknown);
        assert_eq!(detect_format(b""), DetectedFormat::Unknown);
    }
}
