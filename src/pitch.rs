//! Pitch utilities: scale snapping, tessitura, interval constraints, and
//! the dissonance predicates used by the harmony context and the analyzer.

use crate::theory::{chord_tone_pitch_classes, SCALE};
use crate::types::Key;

/// Largest singable melodic leap: a major 6th.
pub const MAX_MELODIC_INTERVAL: i32 = 9;

/// Vocal passaggio band (register transition), where sustained notes cost
/// extra effort.
pub const PASSAGGIO_LOW: u8 = 64;
pub const PASSAGGIO_HIGH: u8 = 76;

/// Comfortable middle band of a vocal range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TessituraRange {
    pub low: u8,
    pub high: u8,
    pub center: u8,
}

/// Middle portion of the range with ~20% (at least 3 semitone) headroom on
/// both sides for climactic moments.
pub fn calculate_tessitura(vocal_low: u8, vocal_high: u8) -> TessituraRange {
    let range = vocal_high.saturating_sub(vocal_low) as i32;
    let margin = (range / 5).max(3);

    let low = vocal_low as i32 + margin;
    let high = vocal_high as i32 - margin;
    if low >= high {
        return TessituraRange {
            low: vocal_low,
            high: vocal_high,
            center: ((vocal_low as i32 + vocal_high as i32) / 2) as u8,
        };
    }
    TessituraRange {
        low: low as u8,
        high: high as u8,
        center: ((low + high) / 2) as u8,
    }
}

pub fn is_in_tessitura(pitch: u8, tessitura: &TessituraRange) -> bool {
    pitch >= tessitura.low && pitch <= tessitura.high
}

pub fn is_in_passaggio(pitch: u8) -> bool {
    (PASSAGGIO_LOW..=PASSAGGIO_HIGH).contains(&pitch)
}

/// Singing comfort in [0, 1]: 1.0 at the tessitura center, reduced in the
/// passaggio, lowest at the range extremes.
pub fn comfort_score(pitch: u8, tessitura: &TessituraRange, vocal_low: u8) -> f32 {
    if pitch == tessitura.center {
        return 1.0;
    }
    if is_in_tessitura(pitch, tessitura) {
        let dist = (pitch as i32 - tessitura.center as i32).abs();
        let half = (((tessitura.high - tessitura.low) / 2) as i32).max(1);
        return 0.8 + 0.2 * (1.0 - dist as f32 / half as f32);
    }
    if is_in_passaggio(pitch) {
        return 0.4;
    }
    let dist = if pitch < tessitura.low {
        tessitura.low - pitch
    } else {
        pitch - tessitura.high
    };
    let total_margin = (tessitura.low.saturating_sub(vocal_low) as i32).max(1);
    let extremity = dist as f32 / total_margin as f32;
    (0.6 - 0.3 * extremity).max(0.3)
}

/// Constrain the distance between `target` and `prev` to `max_interval`
/// semitones, preserving the intended direction.  At range edges where the
/// direction cannot be honored the previous pitch is kept rather than
/// leaping the other way.
pub fn constrain_interval(
    target: i32,
    prev: i32,
    max_interval: i32,
    range_low: i32,
    range_high: i32,
) -> i32 {
    if prev < 0 {
        return target.clamp(range_low, range_high);
    }
    let interval = target - prev;
    if interval.abs() <= max_interval {
        return target.clamp(range_low, range_high);
    }
    let direction = if interval > 0 { 1 } else { -1 };
    let constrained = (prev + direction * max_interval).clamp(range_low, range_high);
    if direction > 0 && constrained < prev {
        return prev;
    }
    if direction < 0 && constrained > prev {
        return prev;
    }
    constrained
}

// ═══════════════════════════════════════════════════════════════════════
// Dissonance predicates
// ═══════════════════════════════════════════════════════════════════════

/// Interval class (0-6) between two pitch classes.
pub fn interval_class(pc1: i32, pc2: i32) -> i32 {
    let mut interval = (pc1 - pc2).abs() % 12;
    if interval > 6 {
        interval = 12 - interval;
    }
    interval
}

/// Context-free dissonance: minor 2nd (and its major-7th inversion) or
/// tritone.
pub fn is_dissonant_interval(pc1: i32, pc2: i32) -> bool {
    let ic = interval_class(pc1, pc2);
    ic == 1 || ic == 6
}

/// Chord-aware dissonance.  The tritone is part of the chord on V and vii
/// (3rd-7th of V7, root-b5 of vii) and is allowed there; the minor 2nd is
/// always out.
pub fn is_dissonant_interval_with_context(pc1: i32, pc2: i32, chord_degree: i8) -> bool {
    let ic = interval_class(pc1, pc2);
    if ic == 1 {
        return true;
    }
    if ic == 6 {
        let normalized = ((chord_degree % 7) + 7) % 7;
        return normalized != 4 && normalized != 6;
    }
    false
}

/// Dissonance over an actual (register-aware) semitone distance.  Pitches
/// two or more octaves apart never count; otherwise the pitch-class rule
/// with chord context applies.
pub fn is_dissonant_actual_interval(actual_semitones: i32, chord_degree: i8) -> bool {
    if actual_semitones > 24 {
        return false;
    }
    let pc = actual_semitones % 12;
    if pc == 1 || pc == 11 {
        return true;
    }
    if pc == 6 {
        let normalized = ((chord_degree % 7) + 7) % 7;
        return normalized != 4 && normalized != 6;
    }
    false
}

// ═══════════════════════════════════════════════════════════════════════
// Scale and chord-tone snapping
// ═══════════════════════════════════════════════════════════════════════

/// Snap a pitch to the nearest tone of the major scale on `key_offset`.
pub fn snap_to_nearest_scale_tone(pitch: i32, key_offset: i32) -> i32 {
    let pc = (pitch - key_offset).rem_euclid(12);
    let mut best_pc = SCALE[0];
    let mut best_dist = 12;
    for s in SCALE {
        let dist = (pc - s).abs().min(12 - (pc - s).abs());
        if dist < best_dist {
            best_dist = dist;
            best_pc = s;
        }
    }
    let relative = pitch - key_offset;
    let octave = relative.div_euclid(12);
    octave * 12 + best_pc + key_offset
}

/// Nearest chord-tone pitch (any octave) to `pitch` for the degree.
pub fn nearest_chord_tone_pitch(pitch: i32, chord_degree: i8) -> i32 {
    let tones = chord_tone_pitch_classes(chord_degree);
    if tones.is_empty() {
        return pitch;
    }
    let mut best = pitch;
    let mut best_dist = i32::MAX;
    for pc in tones {
        for octave in 0..11 {
            let candidate = octave * 12 + pc;
            let dist = (candidate - pitch).abs();
            if dist < best_dist {
                best_dist = dist;
                best = candidate;
            }
        }
    }
    best
}

/// Nearest chord tone to `target` that stays within `max_interval` of
/// `prev` and inside `[low, high]`.  Falls back to constraining the raw
/// target when no chord tone qualifies.
pub fn nearest_chord_tone_within_interval(
    target: i32,
    prev: i32,
    chord_degree: i8,
    max_interval: i32,
    low: u8,
    high: u8,
) -> i32 {
    let tones = chord_tone_pitch_classes(chord_degree);
    let mut best = -1;
    let mut best_dist = i32::MAX;
    for pc in tones {
        for octave in 0..11 {
            let candidate = octave * 12 + pc;
            if candidate < low as i32 || candidate > high as i32 {
                continue;
            }
            if (candidate - prev).abs() > max_interval {
                continue;
            }
            let dist = (candidate - target).abs();
            if dist < best_dist {
                best_dist = dist;
                best = candidate;
            }
        }
    }
    if best >= 0 {
        best
    } else {
        constrain_interval(target, prev, max_interval, low as i32, high as i32)
    }
}

/// Transpose a pitch by the key offset, clamped to the MIDI range.
pub fn transpose_pitch(pitch: u8, key: Key) -> u8 {
    (pitch as i32 + key.offset()).clamp(0, 127) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_class_folds() {
        assert_eq!(interval_class(0, 11), 1);
        assert_eq!(interval_class(0, 6), 6);
        assert_eq!(interval_class(4, 7), 3);
    }

    #[test]
    fn minor_second_always_dissonant() {
        assert!(is_dissonant_interval(0, 1));
        assert!(is_dissonant_interval_with_context(0, 1, 4));
    }

    #[test]
    fn tritone_allowed_on_dominant_and_diminished() {
        assert!(is_dissonant_interval_with_context(5, 11, 0)); // F-B over I
        assert!(!is_dissonant_interval_with_context(5, 11, 4)); // over V
        assert!(!is_dissonant_interval_with_context(5, 11, 6)); // over vii
    }

    #[test]
    fn wide_separation_never_dissonant() {
        assert!(!is_dissonant_actual_interval(25, 0));
        assert!(is_dissonant_actual_interval(13, 0)); // minor 9th
    }

    #[test]
    fn snap_prefers_nearest_scale_tone() {
        assert_eq!(snap_to_nearest_scale_tone(61, 0), 60); // C# -> C
        assert_eq!(snap_to_nearest_scale_tone(66, 0), 65); // F# -> F
        assert_eq!(snap_to_nearest_scale_tone(64, 0), 64); // E stays
    }

    #[test]
    fn tessitura_has_minimum_margin() {
        let t = calculate_tessitura(60, 72);
        assert!(t.low >= 63);
        assert!(t.high <= 69);
        assert!(t.low < t.center && t.center < t.high);
    }

    #[test]
    fn constrain_interval_preserves_direction() {
        // Leap of an octave up capped to a major 6th.
        assert_eq!(constrain_interval(72, 60, 9, 36, 96), 69);
        // At the top of the range, stay rather than invert.
        assert_eq!(constrain_interval(80, 69, 9, 36, 70), 70);
    }

    #[test]
    fn nearest_chord_tone_respects_interval_cap() {
        // Over I (C E G), target far above prev snaps to a tone within a 6th.
        let p = nearest_chord_tone_within_interval(84, 60, 0, 9, 48, 96);
        assert!((p - 60).abs() <= 9);
        assert!(crate::theory::chord_tone_pitch_classes(0).contains(&(p.rem_euclid(12))));
    }

    #[test]
    fn transpose_applies_key_offset() {
        assert_eq!(transpose_pitch(60, Key::D), 62);
        assert_eq!(transpose_pitch(127, Key::B), 127);
    }
}
