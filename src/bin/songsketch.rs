//! Command-line front end: generate a song to a MIDI file, optionally with
//! a dissonance report.
//!
//! Exits 0 on success; on preset or I/O failure prints one line to stderr
//! and exits 1.  Generation itself cannot fail.

use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use songsketch::params::{CompositionStyle, ModulationTiming, StructurePattern, VocalStyle};
use songsketch::types::{Key, Mood};
use songsketch::{analyze_dissonance, Generator, GeneratorParams};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Smf1,
    Midi2,
}

#[derive(Parser, Debug)]
#[command(
    name = "songsketch",
    about = "Procedural multi-track song generator",
    version
)]
struct Cli {
    /// Output MIDI file path.
    #[arg(short, long, default_value = "song.mid")]
    output: String,

    /// JSON preset file; command-line flags override its fields.
    #[arg(long)]
    preset: Option<String>,

    /// Song structure pattern.
    #[arg(long)]
    structure: Option<StructurePattern>,

    /// Mood preset.
    #[arg(long)]
    mood: Option<Mood>,

    /// Chord progression id (0-21).
    #[arg(long)]
    chord_id: Option<u8>,

    /// Target key.
    #[arg(long)]
    key: Option<Key>,

    /// RNG seed (0 = derive from the clock).
    #[arg(long)]
    seed: Option<u32>,

    /// Tempo in BPM (0 = mood default).
    #[arg(long)]
    bpm: Option<u16>,

    /// Vocal range low / high (MIDI notes 36-96).
    #[arg(long)]
    vocal_low: Option<u8>,
    #[arg(long)]
    vocal_high: Option<u8>,

    /// Generation flow.
    #[arg(long)]
    style: Option<CompositionStyle>,

    /// Vocal melody family.
    #[arg(long)]
    vocal_style: Option<VocalStyle>,

    /// Key change placement.
    #[arg(long)]
    modulation: Option<ModulationTiming>,

    /// Key change size in semitones.
    #[arg(long)]
    modulation_semitones: Option<i8>,

    #[arg(long)]
    no_drums: bool,

    #[arg(long)]
    arpeggio: bool,

    #[arg(long)]
    humanize: bool,

    /// Emit the dissonance report as JSON: to stdout, or to a file when a
    /// path is given.
    #[arg(long, num_args = 0..=1, default_missing_value = "-")]
    report: Option<String>,

    /// Output container format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Smf1)]
    format: OutputFormat,
}

fn build_params(cli: &Cli) -> Result<GeneratorParams, String> {
    let mut params = match &cli.preset {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read preset '{path}': {e}"))?;
            songsketch::params_from_json(&text)?
        }
        None => GeneratorParams::default(),
    };

    if let Some(v) = cli.structure {
        params.structure = v;
    }
    if let Some(v) = cli.mood {
        params.mood = v;
    }
    if let Some(v) = cli.chord_id {
        params.chord_id = v;
    }
    if let Some(v) = cli.key {
        params.key = v;
    }
    if let Some(v) = cli.seed {
        params.seed = v;
    }
    if let Some(v) = cli.bpm {
        params.bpm = v;
    }
    if let Some(v) = cli.vocal_low {
        params.vocal_low = v;
    }
    if let Some(v) = cli.vocal_high {
        params.vocal_high = v;
    }
    if let Some(v) = cli.style {
        params.composition_style = v;
    }
    if let Some(v) = cli.vocal_style {
        params.vocal_style = v;
    }
    if let Some(v) = cli.modulation {
        params.modulation_timing = v;
    }
    if let Some(v) = cli.modulation_semitones {
        params.modulation_semitones = v;
    }
    if cli.no_drums {
        params.drums_enabled = false;
    }
    if cli.arpeggio {
        params.arpeggio_enabled = true;
    }
    if cli.humanize {
        params.humanize = true;
    }
    Ok(params)
}

fn run(cli: &Cli) -> Result<(), String> {
    let params = build_params(cli)?;

    let mut generator = Generator::new();
    generator.generate(&params);

    let bytes = match cli.format {
        OutputFormat::Smf1 => songsketch::write_song(generator.song(), &params),
        OutputFormat::Midi2 => songsketch::write_song_midi2(generator.song(), &params),
    };
    std::fs::write(&cli.output, &bytes)
        .map_err(|e| format!("Failed to write '{}': {e}", cli.output))?;

    if let Some(report_target) = &cli.report {
        let report = analyze_dissonance(generator.song(), &params, generator.harmony());
        let json = report.to_json();
        if report_target == "-" {
            println!("{json}");
        } else {
            std::fs::write(report_target, json)
                .map_err(|e| format!("Failed to write '{report_target}': {e}"))?;
        }
    }

    eprintln!(
        "Wrote {} ({} bytes, seed {})",
        cli.output,
        bytes.len(),
        generator.song().seed()
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}
