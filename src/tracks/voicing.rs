//! Chord voicing generation and voice-leading selection.
//!
//! Voicing types: Close (warm, verses), Open Drop2/Drop3/Spread (powerful,
//! choruses), Rootless (bass supplies the root, jazz color).  Selection
//! maximizes common tones, minimizes weighted voice movement, and penalizes
//! parallel perfect intervals by mood.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::pitch::interval_class;
use crate::theory::Chord;
use crate::types::{Mood, SectionType, CHORD_HIGH, CHORD_LOW, MIDI_C4};

/// Close (< 1 octave), Open (wider spread), or Rootless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoicingType {
    Close,
    Open,
    Rootless,
}

/// Open voicing variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenVoicingType {
    #[default]
    Drop2,
    Drop3,
    Spread,
}

/// A voiced chord with absolute MIDI pitches in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoicedChord {
    pub pitches: [u8; 5],
    pub count: u8,
    pub voicing_type: Option<VoicingTypeTag>,
}

/// Tag carried on a built voicing (`VoicingType` plus the open subtype).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoicingTypeTag {
    pub voicing: VoicingType,
    pub open_subtype: OpenVoicingType,
}

impl VoicedChord {
    fn tagged(voicing: VoicingType, open_subtype: OpenVoicingType) -> VoicedChord {
        VoicedChord {
            pitches: [0; 5],
            count: 0,
            voicing_type: Some(VoicingTypeTag {
                voicing,
                open_subtype,
            }),
        }
    }

    pub fn pitches(&self) -> &[u8] {
        &self.pitches[..self.count as usize]
    }

    fn push(&mut self, pitch: u8) {
        self.pitches[self.count as usize] = pitch;
        self.count += 1;
    }

    fn sort(&mut self) {
        self.pitches[..self.count as usize].sort_unstable();
    }

    fn in_range(&self) -> bool {
        self.pitches().iter().all(|&p| (CHORD_LOW..=CHORD_HIGH).contains(&p))
    }

    pub fn matches(&self, preferred: VoicingType) -> bool {
        self.voicing_type.map_or(false, |t| t.voicing == preferred)
    }
}

/// Sum of semitone movements between matched voices, with the bass and top
/// voice weighted double.  Lower is smoother.
pub fn voicing_distance(prev: &VoicedChord, next: &VoicedChord) -> i32 {
    let count = prev.count.min(next.count) as usize;
    let mut total = 0;
    for i in 0..count {
        let diff = (next.pitches[i] as i32 - prev.pitches[i] as i32).abs();
        let weight = if i == 0 || i + 1 == count { 2 } else { 1 };
        total += diff * weight;
    }
    total
}

/// Octave-equivalent common tones between two voicings.
pub fn count_common_tones(prev: &VoicedChord, next: &VoicedChord) -> i32 {
    let mut common = 0;
    for &p in prev.pitches() {
        if next.pitches().iter().any(|&n| n % 12 == p % 12) {
            common += 1;
        }
    }
    common
}

/// Parallel perfect fifths/octaves between two voicings.
pub fn has_parallel_perfects(prev: &VoicedChord, next: &VoicedChord) -> bool {
    let count = prev.count.min(next.count) as usize;
    if count < 2 {
        return false;
    }
    for i in 0..count {
        for j in i + 1..count {
            let prev_interval = (prev.pitches[i] as i32 - prev.pitches[j] as i32).abs() % 12;
            let next_interval = (next.pitches[i] as i32 - next.pitches[j] as i32).abs() % 12;
            let prev_perfect = prev_interval == 7 || prev_interval == 0;
            let next_perfect = next_interval == 7 || next_interval == 0;
            if prev_perfect && next_perfect && prev_interval == next_interval {
                let motion_i = next.pitches[i] as i32 - prev.pitches[i] as i32;
                let motion_j = next.pitches[j] as i32 - prev.pitches[j] as i32;
                if motion_i != 0 && motion_j != 0 && (motion_i > 0) == (motion_j > 0) {
                    return true;
                }
            }
        }
    }
    false
}

/// Mood-dependent penalty for parallel perfects.  Ballad-family moods keep
/// strict voice leading; dance styles trade it for power.
pub fn parallel_penalty(mood: Mood) -> i32 {
    match mood {
        Mood::Ballad | Mood::Sentimental => -200,
        Mood::EmotionalPop | Mood::MidPop | Mood::CityPop | Mood::StraightPop => -100,
        Mood::EnergeticDance
        | Mood::IdolPop
        | Mood::ElectroPop
        | Mood::Yoasobi
        | Mood::FutureBass
        | Mood::Synthwave
        | Mood::BrightUpbeat
        | Mood::Anthem => -30,
        _ => -100,
    }
}

/// Minor-2nd clash between a pitch class and the bass pitch class.
pub fn clashes_with_bass(pitch_class: i32, bass_pc: i32) -> bool {
    interval_class(pitch_class, bass_pc) == 1
}

// ═══════════════════════════════════════════════════════════════════════
// Voicing builders
// ═══════════════════════════════════════════════════════════════════════

/// Close voicings: all inversions over each base octave within the chord
/// register.
pub fn generate_close_voicings(root: u8, chord: &Chord) -> Vec<VoicedChord> {
    let mut voicings = Vec::new();
    let note_count = chord.note_count as usize;

    for inversion in 0..note_count {
        let mut base_octave = CHORD_LOW;
        while base_octave + 12 <= CHORD_HIGH {
            let mut v = VoicedChord::tagged(VoicingType::Close, OpenVoicingType::Drop2);
            let mut valid = true;
            for i in 0..note_count {
                let interval = chord.intervals[(i + inversion) % note_count];
                if interval < 0 {
                    break;
                }
                let pc = (root as i32 + interval as i32) % 12;
                let mut pitch = base_octave as i32 + pc;
                if v.count > 0 {
                    while pitch <= v.pitches[v.count as usize - 1] as i32 {
                        pitch += 12;
                    }
                }
                if pitch < CHORD_LOW as i32 || pitch > CHORD_HIGH as i32 {
                    valid = false;
                    break;
                }
                v.push(pitch as u8);
            }
            if valid && v.count >= 3 {
                voicings.push(v);
            }
            base_octave += 12;
        }
    }
    voicings
}

/// Drop-2 open voicings: stack close, then spread the upper voices an
/// octave apart from the bass.
pub fn generate_drop2_voicings(root: u8, chord: &Chord) -> Vec<VoicedChord> {
    let mut voicings = Vec::new();
    let note_count = (chord.note_count as usize).min(4);
    if note_count < 3 {
        return voicings;
    }

    let mut base_octave = CHORD_LOW;
    while base_octave + 24 <= CHORD_HIGH {
        let mut raw = [0i32; 4];
        for i in 0..note_count {
            let interval = chord.intervals[i];
            if interval < 0 {
                break;
            }
            let pc = (root as i32 + interval as i32) % 12;
            raw[i] = base_octave as i32 + pc;
            if i > 0 && raw[i] <= raw[i - 1] {
                raw[i] += 12;
            }
        }

        let mut v = VoicedChord::tagged(VoicingType::Open, OpenVoicingType::Drop2);
        v.push(raw[0].clamp(0, 127) as u8);
        for &p in raw.iter().take(note_count).skip(1) {
            let lifted = p + 12;
            if (0..=127).contains(&lifted) {
                v.push(lifted as u8);
            }
        }
        v.sort();
        if v.count >= 3 && v.in_range() {
            voicings.push(v);
        }
        base_octave += 12;
    }
    voicings
}

/// Drop-3 open voicings: the 3rd voice from the top drops an octave.
/// Requires a 4-note chord.
pub fn generate_drop3_voicings(root: u8, chord: &Chord) -> Vec<VoicedChord> {
    let mut voicings = Vec::new();
    if chord.note_count < 4 {
        return voicings;
    }

    let mut base_octave = CHORD_LOW;
    while base_octave + 24 <= CHORD_HIGH {
        let mut raw = [0i32; 4];
        for i in 0..4 {
            let interval = chord.intervals[i];
            if interval < 0 {
                break;
            }
            let pc = (root as i32 + interval as i32) % 12;
            raw[i] = base_octave as i32 + 12 + pc;
            if i > 0 && raw[i] <= raw[i - 1] {
                raw[i] += 12;
            }
        }

        let mut v = VoicedChord::tagged(VoicingType::Open, OpenVoicingType::Drop3);
        let dropped = raw[1] - 12;
        if dropped >= CHORD_LOW as i32 {
            v.push(dropped as u8);
            v.push(raw[0].clamp(0, 127) as u8);
            v.push(raw[2].clamp(0, 127) as u8);
            v.push(raw[3].clamp(0, 127) as u8);
            v.sort();
            if v.in_range() {
                voicings.push(v);
            }
        }
        base_octave += 12;
    }
    voicings
}

/// Spread voicings: root / fifth up an octave / third up two octaves, with
/// the seventh slotted an octave up when the chord has one.
pub fn generate_spread_voicings(root: u8, chord: &Chord) -> Vec<VoicedChord> {
    let mut voicings = Vec::new();

    let mut base_octave = CHORD_LOW;
    while base_octave + 24 <= CHORD_HIGH {
        let root_pitch = base_octave as i32 + (root as i32 % 12);
        let fifth = root_pitch + 7 + 12;
        let third = root_pitch + chord.intervals[1] as i32 + 24;

        let mut v = VoicedChord::tagged(VoicingType::Open, OpenVoicingType::Spread);
        v.push(root_pitch.clamp(0, 127) as u8);
        v.push(fifth.clamp(0, 127) as u8);
        v.push(third.clamp(0, 127) as u8);
        if chord.note_count >= 4 && chord.intervals[3] >= 0 {
            let seventh = root_pitch + chord.intervals[3] as i32 + 12;
            v.push(seventh.clamp(0, 127) as u8);
        }
        v.sort();
        if v.count >= 3 && v.in_range() {
            voicings.push(v);
        }
        base_octave += 12;
    }
    voicings
}

/// Rootless voicings: 3rd, 5th, 7th, plus an extension chosen to avoid a
/// minor-2nd/major-7th clash with the bass pitch class.
pub fn generate_rootless_voicings(root: u8, chord: &Chord, bass_pc: i32) -> Vec<VoicedChord> {
    let mut voicings = Vec::new();
    let root_pc = (root % 12) as i32;
    let is_minor = chord.note_count >= 2 && chord.intervals[1] == 3;
    let is_dominant =
        chord.note_count >= 4 && chord.intervals[3] == 10 && chord.intervals[1] == 4;

    // Choose intervals by quality, swapping extensions that would rub
    // against the bass.
    let mut intervals: Vec<i32> = if is_dominant {
        vec![4, 7, 10, 14]
    } else if is_minor {
        let mut ext = 14;
        if bass_pc >= 0 && clashes_with_bass((root_pc + 2) % 12, bass_pc) {
            ext = 17; // 11th instead of 9th
        }
        vec![3, 7, 10, ext]
    } else {
        let mut seventh = 9; // 6th is the safe default
        let mut ninth = Some(14);
        if bass_pc >= 0 {
            if !clashes_with_bass((root_pc + 11) % 12, bass_pc) {
                seventh = 11;
            }
            if clashes_with_bass((root_pc + 2) % 12, bass_pc) {
                ninth = None;
            }
        }
        let mut v = vec![4, 7, seventh];
        if let Some(n) = ninth {
            v.push(n);
        }
        v
    };
    intervals.retain(|&i| i >= 0);

    let mut base_octave = CHORD_LOW;
    while base_octave + 12 <= CHORD_HIGH {
        let mut v = VoicedChord::tagged(VoicingType::Rootless, OpenVoicingType::Drop2);
        for &interval in &intervals {
            let octave_offset = if interval >= 12 { 12 } else { 0 };
            let mut pitch = base_octave as i32 + octave_offset + (root_pc + interval) % 12;
            if v.count > 0 && pitch <= v.pitches[v.count as usize - 1] as i32 {
                pitch += 12;
            }
            if pitch < CHORD_LOW as i32 || pitch > CHORD_HIGH as i32 {
                continue;
            }
            if bass_pc >= 0 && clashes_with_bass(pitch % 12, bass_pc) {
                continue;
            }
            v.push(pitch as u8);
        }
        if v.count >= 3 {
            voicings.push(v);
        }
        base_octave += 12;
    }
    voicings
}

/// All candidate voicings for a chord, preferred type first augmented by
/// close fallbacks.
pub fn generate_voicings(
    root: u8,
    chord: &Chord,
    preferred: VoicingType,
    bass_pc: i32,
    open_subtype: OpenVoicingType,
) -> Vec<VoicedChord> {
    let mut voicings = generate_close_voicings(root, chord);
    match preferred {
        VoicingType::Open => {
            let open = match open_subtype {
                OpenVoicingType::Drop2 => generate_drop2_voicings(root, chord),
                OpenVoicingType::Drop3 => {
                    let drop3 = generate_drop3_voicings(root, chord);
                    if drop3.is_empty() {
                        generate_drop2_voicings(root, chord)
                    } else {
                        drop3
                    }
                }
                OpenVoicingType::Spread => {
                    let spread = generate_spread_voicings(root, chord);
                    if spread.is_empty() {
                        generate_drop2_voicings(root, chord)
                    } else {
                        spread
                    }
                }
            };
            voicings.extend(open);
        }
        VoicingType::Rootless => {
            voicings.extend(generate_rootless_voicings(root, chord, bass_pc));
        }
        VoicingType::Close => {}
    }
    voicings
}

// ═══════════════════════════════════════════════════════════════════════
// Selection
// ═══════════════════════════════════════════════════════════════════════

/// Voicing type per section: stable sections stay Close, choruses open up,
/// the rest mix probabilistically.
pub fn select_voicing_type(
    section: SectionType,
    mood: Mood,
    rng: &mut ChaCha8Rng,
) -> VoicingType {
    let is_ballad = mood.is_ballad();
    match section {
        SectionType::Intro
        | SectionType::Interlude
        | SectionType::Outro
        | SectionType::Chant
        | SectionType::A => VoicingType::Close,
        SectionType::MixBreak | SectionType::Drop => VoicingType::Open,
        SectionType::B => {
            if is_ballad || rng.gen::<f32>() >= 0.40 {
                VoicingType::Close
            } else {
                VoicingType::Open
            }
        }
        SectionType::Chorus => {
            if is_ballad || rng.gen::<f32>() < 0.60 {
                VoicingType::Open
            } else {
                VoicingType::Close
            }
        }
        SectionType::Bridge => {
            if is_ballad {
                VoicingType::Close
            } else if rng.gen::<f32>() < 0.50 {
                VoicingType::Open
            } else {
                VoicingType::Close
            }
        }
    }
}

/// Open-voicing subtype by context: spread for atmospheric ballad sections
/// and some mix breaks, drop-3 occasionally on 7th chords, drop-2 default.
pub fn select_open_subtype(
    section: SectionType,
    mood: Mood,
    chord: &Chord,
    rng: &mut ChaCha8Rng,
) -> OpenVoicingType {
    let has_7th = chord.note_count >= 4 && chord.intervals[3] >= 0;
    if mood.is_ballad()
        && matches!(
            section,
            SectionType::Intro | SectionType::Interlude | SectionType::Bridge
        )
    {
        return OpenVoicingType::Spread;
    }
    if has_7th && rng.gen::<f32>() < 0.4 && matches!(mood, Mood::Sentimental | Mood::CityPop) {
        return OpenVoicingType::Drop3;
    }
    if section == SectionType::MixBreak {
        return if rng.gen::<f32>() < 0.3 {
            OpenVoicingType::Spread
        } else {
            OpenVoicingType::Drop2
        };
    }
    OpenVoicingType::Drop2
}

/// Filter against the bass: drop voicings with a minor-2nd against the
/// bass pitch class, or strip the clashing voice when at least two voices
/// survive.  When everything clashes the originals are kept — a thin chord
/// beats silence.
pub fn filter_against_bass(candidates: Vec<VoicedChord>, bass_pc: i32) -> Vec<VoicedChord> {
    if bass_pc < 0 {
        return candidates;
    }
    let mut filtered = Vec::with_capacity(candidates.len());
    for v in &candidates {
        let clash = v
            .pitches()
            .iter()
            .any(|&p| clashes_with_bass((p % 12) as i32, bass_pc));
        if !clash {
            filtered.push(*v);
        } else {
            let mut cleaned = VoicedChord {
                pitches: [0; 5],
                count: 0,
                voicing_type: v.voicing_type,
            };
            for &p in v.pitches() {
                if !clashes_with_bass((p % 12) as i32, bass_pc) {
                    cleaned.push(p);
                }
            }
            if cleaned.count >= 2 {
                filtered.push(cleaned);
            }
        }
    }
    if filtered.is_empty() {
        candidates
    } else {
        filtered
    }
}

/// Score candidates against the previous voicing and pick the best, with
/// ties broken uniformly from the RNG.
///
/// Score = type bonus (+30, or +50 at the first chord) + 100 per common
/// tone − weighted movement − mood parallel penalty − repetition penalty
/// when the same voicing has run three or more times.
#[allow(clippy::too_many_arguments)]
pub fn select_voicing(
    candidates: &[VoicedChord],
    prev: Option<&VoicedChord>,
    preferred: VoicingType,
    mood: Mood,
    consecutive_same: i32,
    rng: &mut ChaCha8Rng,
) -> Option<VoicedChord> {
    if candidates.is_empty() {
        return None;
    }

    let mut tied: Vec<usize> = Vec::new();
    let mut best_score = i32::MIN;
    for (i, candidate) in candidates.iter().enumerate() {
        let score = match prev {
            None => {
                let type_bonus = if candidate.matches(preferred) { 50 } else { 0 };
                let dist = (candidate.pitches[0] as i32 - MIDI_C4 as i32).abs();
                type_bonus - dist
            }
            Some(prev) => {
                let type_bonus = if candidate.matches(preferred) { 30 } else { 0 };
                let common = count_common_tones(prev, candidate);
                let movement = voicing_distance(prev, candidate);
                let parallels = if has_parallel_perfects(prev, candidate) {
                    parallel_penalty(mood)
                } else {
                    0
                };
                let repetition = if candidate == prev && consecutive_same >= 3 {
                    -50 * (consecutive_same - 2)
                } else {
                    0
                };
                type_bonus + common * 100 + parallels + repetition - movement
            }
        };
        if score > best_score {
            best_score = score;
            tied.clear();
            tied.push(i);
        } else if score == best_score {
            tied.push(i);
        }
    }
    let pick = tied[rng.gen_range(0..tied.len())];
    Some(candidates[pick])
}

/// Root-position fallback when no candidate survives filtering: stack the
/// chord directly, skipping bass-clashing pitches.
pub fn fallback_voicing(root: u8, chord: &Chord, bass_pc: i32) -> VoicedChord {
    let mut v = VoicedChord::tagged(VoicingType::Close, OpenVoicingType::Drop2);
    for interval in chord.active_intervals().take(4) {
        let pitch = (root as i32 + interval as i32).clamp(CHORD_LOW as i32, CHORD_HIGH as i32);
        if bass_pc >= 0 && clashes_with_bass(pitch % 12, bass_pc) {
            continue;
        }
        v.push(pitch as u8);
    }
    v.sort();
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theory::chord_notes;
    use rand::SeedableRng;

    #[test]
    fn close_voicings_are_ascending_and_in_range() {
        let chord = chord_notes(0);
        let voicings = generate_close_voicings(60, &chord);
        assert!(!voicings.is_empty());
        for v in &voicings {
            assert!(v.count >= 3);
            for pair in v.pitches().windows(2) {
                assert!(pair[0] < pair[1]);
            }
            assert!(v.in_range());
        }
    }

    #[test]
    fn drop2_spans_wider_than_close() {
        let chord = chord_notes(0);
        let close = &generate_close_voicings(60, &chord)[0];
        let open = generate_drop2_voicings(60, &chord);
        assert!(!open.is_empty());
        let close_span =
            close.pitches[close.count as usize - 1] as i32 - close.pitches[0] as i32;
        let open_span =
            open[0].pitches[open[0].count as usize - 1] as i32 - open[0].pitches[0] as i32;
        assert!(open_span >= close_span);
    }

    #[test]
    fn rootless_omits_root_and_avoids_bass_clash() {
        let chord = crate::theory::extended_chord(0, crate::theory::ChordExtension::Maj7);
        let voicings = generate_rootless_voicings(60, &chord, 0);
        assert!(!voicings.is_empty());
        for v in &voicings {
            for &p in v.pitches() {
                assert!(!clashes_with_bass((p % 12) as i32, 0), "pitch {p}");
            }
        }
    }

    #[test]
    fn common_tone_counting_is_octave_equivalent() {
        let mut a = VoicedChord::tagged(VoicingType::Close, OpenVoicingType::Drop2);
        a.push(60);
        a.push(64);
        a.push(67);
        let mut b = VoicedChord::tagged(VoicingType::Close, OpenVoicingType::Drop2);
        b.push(55);
        b.push(60);
        b.push(76);
        // G and C and E are shared across octaves.
        assert_eq!(count_common_tones(&a, &b), 3);
    }

    #[test]
    fn parallel_fifths_detected() {
        let mut a = VoicedChord::tagged(VoicingType::Close, OpenVoicingType::Drop2);
        a.push(60);
        a.push(67); // C-G fifth
        let mut b = VoicedChord::tagged(VoicingType::Close, OpenVoicingType::Drop2);
        b.push(62);
        b.push(69); // D-A fifth, same direction
        assert!(has_parallel_perfects(&a, &b));
        // Contrary motion is fine.
        let mut c = VoicedChord::tagged(VoicingType::Close, OpenVoicingType::Drop2);
        c.push(58);
        c.push(65);
        assert!(has_parallel_perfects(&a, &c)); // both voices down: still parallel
        let mut d = VoicedChord::tagged(VoicingType::Close, OpenVoicingType::Drop2);
        d.push(59);
        d.push(64); // fifth broken
        assert!(!has_parallel_perfects(&a, &d));
    }

    #[test]
    fn filter_strips_clashing_voice_but_keeps_two() {
        let mut v = VoicedChord::tagged(VoicingType::Close, OpenVoicingType::Drop2);
        v.push(60);
        v.push(64);
        v.push(67);
        // Bass on B (pc 11): C clashes (minor 2nd), E and G survive.
        let filtered = filter_against_bass(vec![v], 11);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].count, 2);
        assert_eq!(filtered[0].pitches(), &[64, 67]);
    }

    #[test]
    fn selection_prefers_common_tones() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let chord = chord_notes(5); // vi = A minor (A C E)
        let candidates = generate_close_voicings(69, &chord);
        let mut prev = VoicedChord::tagged(VoicingType::Close, OpenVoicingType::Drop2);
        prev.push(60);
        prev.push(64);
        prev.push(67); // C major close
        let selected =
            select_voicing(&candidates, Some(&prev), VoicingType::Close, Mood::StraightPop, 0, &mut rng)
                .unwrap();
        // A minor shares C and E with C major; the winner should keep both.
        assert!(count_common_tones(&prev, &selected) >= 2);
    }

    #[test]
    fn fallback_always_produces_notes() {
        let chord = chord_notes(0);
        let v = fallback_voicing(60, &chord, -1);
        assert!(v.count >= 3);
    }
}
