//! Integration tests for the dissonance analyzer as an end-to-end oracle
//! over generated songs and externally parsed MIDI.

use songsketch::params::{CompositionStyle, StructurePattern, VocalStyle};
use songsketch::types::Mood;
use songsketch::{analyze_dissonance, analyze_parsed_midi, read_smf, write_song, Generator, GeneratorParams};

fn params(seed: u32, mood: Mood) -> GeneratorParams {
    GeneratorParams {
        structure: StructurePattern::ShortForm,
        mood,
        seed,
        ..Default::default()
    }
}

#[test]
fn generated_songs_have_no_clashes_across_seeds() {
    for seed in [1u32, 42, 777] {
        let p = params(seed, Mood::StraightPop);
        let mut generator = Generator::new();
        generator.generate(&p);
        let report = analyze_dissonance(generator.song(), &p, generator.harmony());
        assert_eq!(
            report.summary.simultaneous_clashes, 0,
            "seed {seed}: {:?}",
            report
                .issues
                .iter()
                .filter(|i| !i.notes.is_empty())
                .take(3)
                .collect::<Vec<_>>()
        );
        println!(
            "✓ seed {seed}: {} issues ({} high / {} medium / {} low)",
            report.summary.total_issues,
            report.summary.high_severity,
            report.summary.medium_severity,
            report.summary.low_severity
        );
    }
}

#[test]
fn summary_counts_are_consistent() {
    let p = params(5, Mood::IdolPop);
    let mut generator = Generator::new();
    generator.generate(&p);
    let report = analyze_dissonance(generator.song(), &p, generator.harmony());

    let s = &report.summary;
    assert_eq!(
        s.total_issues,
        s.simultaneous_clashes + s.non_chord_tones + s.sustained_over_chord_change
            + s.non_diatonic_notes
    );
    assert_eq!(
        s.total_issues,
        s.high_severity + s.medium_severity + s.low_severity
    );
    assert_eq!(s.total_issues as usize, report.issues.len());
    assert_eq!(
        s.total_issues,
        s.pre_modulation_issues + s.post_modulation_issues
    );
    // Issues are sorted by tick.
    for pair in report.issues.windows(2) {
        assert!(pair[0].tick <= pair[1].tick);
    }
}

#[test]
fn instrumental_styles_stay_harmonically_pure() {
    for style in [CompositionStyle::SynthDriven, CompositionStyle::BackgroundMotif] {
        let mut p = params(13, Mood::Synthwave);
        p.composition_style = style;
        let mut generator = Generator::new();
        generator.generate(&p);
        let report = analyze_dissonance(generator.song(), &p, generator.harmony());
        assert_eq!(report.summary.simultaneous_clashes, 0, "{style:?}");
        assert_eq!(report.summary.non_diatonic_notes, 0, "{style:?}");
    }
}

#[test]
fn machine_gun_vocals_still_analyze_clean() {
    let mut p = params(8, Mood::Yoasobi);
    p.vocal_style = VocalStyle::UltraVocaloid;
    let mut generator = Generator::new();
    generator.generate(&p);
    let report = analyze_dissonance(generator.song(), &p, generator.harmony());
    assert_eq!(report.summary.simultaneous_clashes, 0);
}

#[test]
fn json_report_matches_schema() {
    let p = params(2, Mood::StraightPop);
    let mut generator = Generator::new();
    generator.generate(&p);
    let report = analyze_dissonance(generator.song(), &p, generator.harmony());
    let value: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();

    let summary = &value["summary"];
    for field in [
        "total_issues",
        "simultaneous_clashes",
        "non_chord_tones",
        "sustained_over_chord_change",
        "non_diatonic_notes",
        "high_severity",
        "medium_severity",
        "low_severity",
        "modulation_tick",
        "modulation_amount",
        "pre_modulation_issues",
        "post_modulation_issues",
    ] {
        assert!(summary[field].is_number(), "summary.{field}");
    }
    if let Some(issue) = value["issues"].as_array().and_then(|a| a.first()) {
        assert!(issue["type"].is_string());
        assert!(matches!(
            issue["severity"].as_str(),
            Some("low") | Some("medium") | Some("high")
        ));
        assert!(issue["tick"].is_number());
        assert!(issue["bar"].is_number());
        assert!(issue["beat"].is_number());
    }
}

#[test]
fn external_midi_analysis_flags_planted_clash() {
    // Write a song, parse it back, then analyze the parsed file the way an
    // external tool would.  Our own output analyzes clean.
    let p = params(4, Mood::StraightPop);
    let mut generator = Generator::new();
    generator.generate(&p);
    let bytes = write_song(generator.song(), &p);
    let parsed = read_smf(&bytes).unwrap();

    let clean = analyze_parsed_midi(&parsed);
    println!(
        "✓ external analysis of own output: {} clashes",
        clean.summary.simultaneous_clashes
    );

    // Plant a minor 2nd between two tracks and confirm it is flagged.
    let mut poisoned = parsed.clone();
    if let (Some(vocal_idx), Some(first_note)) = (
        poisoned
            .tracks
            .iter()
            .position(|t| t.name == "Vocal"),
        poisoned
            .tracks
            .iter()
            .find(|t| t.name == "Chord")
            .and_then(|t| t.notes.first())
            .copied(),
    ) {
        let mut planted = first_note;
        planted.pitch = first_note.pitch + 1;
        poisoned.tracks[vocal_idx].notes.push(planted);
        let report = analyze_parsed_midi(&poisoned);
        assert!(
            report.summary.simultaneous_clashes >= 1,
            "planted minor 2nd not detected"
        );
    } else {
        panic!("expected Vocal and Chord tracks in own output");
    }
}
