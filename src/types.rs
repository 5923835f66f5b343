//! Core data model for the generation pipeline.
//!
//! All time is measured in ticks at a fixed resolution of 480 per quarter
//! note, 4/4 only.  These structures are shared by every stage: the
//! arrangement builder, the harmony context, the per-track generators,
//! the post-processor, and the MIDI writers.

use serde::{Deserialize, Serialize};

/// Integer time unit: 480 per beat, 1920 per bar.
pub type Tick = u32;

/// Ticks per quarter note.
pub const TICKS_PER_BEAT: Tick = 480;
/// Beats per bar (4/4 only).
pub const BEATS_PER_BAR: Tick = 4;
/// Ticks per bar.
pub const TICKS_PER_BAR: Tick = TICKS_PER_BEAT * BEATS_PER_BAR;

/// Common note durations in ticks.
pub const TICK_WHOLE: Tick = TICKS_PER_BAR;
pub const TICK_HALF: Tick = TICKS_PER_BAR / 2;
pub const TICK_QUARTER: Tick = TICKS_PER_BEAT;
pub const TICK_EIGHTH: Tick = TICKS_PER_BEAT / 2;
pub const TICK_SIXTEENTH: Tick = TICKS_PER_BEAT / 4;
pub const TICK_32ND: Tick = TICKS_PER_BEAT / 8;
/// One third of a beat (swing/triplet unit).
pub const TICK_QUARTER_TRIPLET: Tick = TICKS_PER_BEAT / 3;

/// Microseconds in one minute, for tempo meta events.
pub const MICROSECONDS_PER_MINUTE: u32 = 60_000_000;

/// Pitch range limits per track role.
pub const BASS_LOW: u8 = 36;
pub const BASS_HIGH: u8 = 55;
pub const CHORD_LOW: u8 = 48;
pub const CHORD_HIGH: u8 = 84;
/// Middle C.
pub const MIDI_C4: u8 = 60;

/// Clamp a signed pitch into the bass register.
pub fn clamp_bass(pitch: i32) -> u8 {
    pitch.clamp(BASS_LOW as i32, BASS_HIGH as i32) as u8
}

// ═══════════════════════════════════════════════════════════════════════
// Enums shared across the pipeline
// ═══════════════════════════════════════════════════════════════════════

/// Which track a note belongs to.  Used for collision exclusion and for
/// channel/program assignment at MIDI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackRole {
    Vocal,
    Chord,
    Bass,
    Motif,
    Arpeggio,
    Aux,
    Drums,
    Se,
}

impl TrackRole {
    pub fn name(self) -> &'static str {
        match self {
            TrackRole::Vocal => "Vocal",
            TrackRole::Chord => "Chord",
            TrackRole::Bass => "Bass",
            TrackRole::Motif => "Motif",
            TrackRole::Arpeggio => "Arpeggio",
            TrackRole::Aux => "Aux",
            TrackRole::Drums => "Drums",
            TrackRole::Se => "SE",
        }
    }
}

/// Song section kind.  The discriminant indexes the section-properties
/// table, so the order is load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SectionType {
    Intro = 0,
    A = 1,
    B = 2,
    Chorus = 3,
    Bridge = 4,
    Interlude = 5,
    Outro = 6,
    Chant = 7,
    MixBreak = 8,
    Drop = 9,
}

impl SectionType {
    pub fn name(self) -> &'static str {
        match self {
            SectionType::Intro => "Intro",
            SectionType::A => "A",
            SectionType::B => "B",
            SectionType::Chorus => "Chorus",
            SectionType::Bridge => "Bridge",
            SectionType::Interlude => "Interlude",
            SectionType::Outro => "Outro",
            SectionType::Chant => "Chant",
            SectionType::MixBreak => "MixBreak",
            SectionType::Drop => "Drop",
        }
    }
}

/// Mood preset.  Drives harmonic rhythm, pattern tables, default BPM, and
/// dynamics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum Mood {
    Ballad,
    Sentimental,
    Chill,
    StraightPop,
    MidPop,
    EmotionalPop,
    BrightUpbeat,
    CityPop,
    EnergeticDance,
    IdolPop,
    ElectroPop,
    Yoasobi,
    FutureBass,
    Synthwave,
    LightRock,
    Anthem,
}

impl Mood {
    /// Slow, emotional, sparse family.
    pub fn is_ballad(self) -> bool {
        matches!(self, Mood::Ballad | Mood::Sentimental | Mood::Chill)
    }

    /// High energy, steady pulse family.
    pub fn is_dance_oriented(self) -> bool {
        matches!(self, Mood::EnergeticDance | Mood::IdolPop | Mood::FutureBass)
    }

    /// Extended harmonies, swing feel.
    pub fn is_jazz_influenced(self) -> bool {
        matches!(self, Mood::CityPop)
    }

    /// Electronic textures, arpeggios.
    pub fn is_synth_oriented(self) -> bool {
        matches!(
            self,
            Mood::Yoasobi | Mood::Synthwave | Mood::FutureBass | Mood::ElectroPop
        )
    }

    /// Default tempo when `GeneratorParams::bpm` is 0.
    pub fn default_bpm(self) -> u16 {
        match self {
            Mood::Ballad => 72,
            Mood::Sentimental => 80,
            Mood::Chill => 84,
            Mood::StraightPop => 120,
            Mood::MidPop => 108,
            Mood::EmotionalPop => 112,
            Mood::BrightUpbeat => 128,
            Mood::CityPop => 104,
            Mood::EnergeticDance => 132,
            Mood::IdolPop => 138,
            Mood::ElectroPop => 124,
            Mood::Yoasobi => 140,
            Mood::FutureBass => 144,
            Mood::Synthwave => 112,
            Mood::LightRock => 126,
            Mood::Anthem => 120,
        }
    }
}

/// Transposition target.  Internal processing stays in C major; the key is
/// applied only at MIDI emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[repr(u8)]
pub enum Key {
    C = 0,
    Db = 1,
    D = 2,
    Eb = 3,
    E = 4,
    F = 5,
    Gb = 6,
    G = 7,
    Ab = 8,
    A = 9,
    Bb = 10,
    B = 11,
}

impl Key {
    pub fn offset(self) -> i32 {
        self as u8 as i32
    }
}

/// Vocal presence within a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VocalDensity {
    None,
    Sparse,
    Full,
}

/// Backing instrument density within a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackingDensity {
    Thin,
    Normal,
    Thick,
}

/// Climax level of a section, used for arpeggio widening and dynamics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeakLevel {
    Low,
    Normal,
    High,
    Max,
}

/// Which tracks play in a section, as a bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMask(pub u8);

impl TrackMask {
    pub const VOCAL: u8 = 1 << 0;
    pub const CHORD: u8 = 1 << 1;
    pub const BASS: u8 = 1 << 2;
    pub const MOTIF: u8 = 1 << 3;
    pub const ARPEGGIO: u8 = 1 << 4;
    pub const AUX: u8 = 1 << 5;
    pub const DRUMS: u8 = 1 << 6;

    pub const ALL: TrackMask = TrackMask(0x7F);

    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

impl Default for TrackMask {
    fn default() -> Self {
        TrackMask::ALL
    }
}

/// Generation phase that produced (or last modified) a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteSource {
    Unknown,
    MelodyPhrase,
    Hook,
    BassPattern,
    ChordVoicing,
    Arpeggio,
    Aux,
    Motif,
    Drums,
    Se,
    CollisionAvoid,
    PostProcess,
}

impl NoteSource {
    pub fn name(self) -> &'static str {
        match self {
            NoteSource::Unknown => "unknown",
            NoteSource::MelodyPhrase => "melody_phrase",
            NoteSource::Hook => "hook",
            NoteSource::BassPattern => "bass_pattern",
            NoteSource::ChordVoicing => "chord_voicing",
            NoteSource::Arpeggio => "arpeggio",
            NoteSource::Aux => "aux",
            NoteSource::Motif => "motif",
            NoteSource::Drums => "drums",
            NoteSource::Se => "se",
            NoteSource::CollisionAvoid => "collision_avoid",
            NoteSource::PostProcess => "post_process",
        }
    }
}

/// How a vocal phrase concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CadenceType {
    None,
    Strong,
    Weak,
    Floating,
    Deceptive,
}

// ═══════════════════════════════════════════════════════════════════════
// Notes and tracks
// ═══════════════════════════════════════════════════════════════════════

/// A single note with timing, pitch, velocity, and provenance.
///
/// Provenance records which generation phase created the note, the pitch it
/// wanted before any safety adjustment, and the chord degree looked up at
/// creation time.  The analyzer reports it so a clash can be traced back to
/// the decision that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub start_tick: Tick,
    pub duration: Tick,
    pub pitch: u8,
    pub velocity: u8,
    pub source: NoteSource,
    pub original_pitch: u8,
    pub chord_degree: i8,
    pub lookup_tick: Tick,
}

impl NoteEvent {
    pub fn end_tick(&self) -> Tick {
        self.start_tick + self.duration
    }

    pub fn pitch_class(&self) -> i32 {
        (self.pitch % 12) as i32
    }
}

/// A timed text marker (section names, embedded metadata).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEvent {
    pub tick: Tick,
    pub text: String,
}

/// One instrument track: an ordered set of notes plus optional text events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    role: TrackRole,
    notes: Vec<NoteEvent>,
    text_events: Vec<TextEvent>,
}

impl Track {
    pub fn new(role: TrackRole) -> Track {
        Track {
            role,
            notes: Vec::new(),
            text_events: Vec::new(),
        }
    }

    pub fn role(&self) -> TrackRole {
        self.role
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn notes_mut(&mut self) -> &mut Vec<NoteEvent> {
        &mut self.notes
    }

    pub fn add_note(&mut self, note: NoteEvent) {
        self.notes.push(note);
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn clear(&mut self) {
        self.notes.clear();
        self.text_events.clear();
    }

    pub fn add_text(&mut self, tick: Tick, text: impl Into<String>) {
        self.text_events.push(TextEvent {
            tick,
            text: text.into(),
        });
    }

    pub fn text_events(&self) -> &[TextEvent] {
        &self.text_events
    }

    /// Sort notes by `(start_tick, pitch)`.  Called once after generation;
    /// every downstream consumer relies on this ordering.
    pub fn sort_notes(&mut self) {
        self.notes
            .sort_by(|a, b| (a.start_tick, a.pitch).cmp(&(b.start_tick, b.pitch)));
    }

    /// Lowest and highest pitch in the track, or (0, 0) when empty.
    pub fn analyze_range(&self) -> (u8, u8) {
        if self.notes.is_empty() {
            return (0, 0);
        }
        let mut low = 127u8;
        let mut high = 0u8;
        for note in &self.notes {
            low = low.min(note.pitch);
            high = high.max(note.pitch);
        }
        (low, high)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Sections and arrangement
// ═══════════════════════════════════════════════════════════════════════

/// One song section with its timing and density defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Section {
    pub section_type: SectionType,
    pub start_tick: Tick,
    pub bars: u8,
    pub density_percent: u8,
    pub backing_density: BackingDensity,
    pub vocal_density: VocalDensity,
    pub track_mask: TrackMask,
    pub peak_level: PeakLevel,
}

impl Section {
    pub fn end_tick(&self) -> Tick {
        self.start_tick + self.bars as Tick * TICKS_PER_BAR
    }

    pub fn start_bar(&self) -> u32 {
        self.start_tick / TICKS_PER_BAR
    }
}

/// Ordered, contiguous list of sections.  Built once, read-only afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arrangement {
    sections: Vec<Section>,
}

impl Arrangement {
    pub fn new(sections: Vec<Section>) -> Arrangement {
        Arrangement { sections }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn total_bars(&self) -> u32 {
        self.sections.iter().map(|s| s.bars as u32).sum()
    }

    pub fn total_ticks(&self) -> Tick {
        self.sections.last().map_or(0, |s| s.end_tick())
    }

    pub fn section_at_bar(&self, bar: u32) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| bar >= s.start_bar() && bar < s.start_bar() + s.bars as u32)
    }

    pub fn section_at_tick(&self, tick: Tick) -> Option<&Section> {
        self.section_at_bar(tick / TICKS_PER_BAR)
    }
}

/// Marks the end of a vocal phrase, for breath coordination and cadence
/// reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseBoundary {
    pub tick: Tick,
    pub is_breath: bool,
    pub is_section_end: bool,
    pub cadence: CadenceType,
}

// ═══════════════════════════════════════════════════════════════════════
// Song
// ═══════════════════════════════════════════════════════════════════════

/// A complete generated song: the arrangement, all tracks, tempo, and the
/// modulation plan.  Exclusively owns its tracks; generators receive one
/// track mutably at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    arrangement: Arrangement,
    bpm: u16,
    seed: u32,
    modulation_tick: Tick,
    modulation_amount: i8,
    phrase_boundaries: Vec<PhraseBoundary>,
    vocal: Track,
    chord: Track,
    bass: Track,
    motif: Track,
    arpeggio: Track,
    aux: Track,
    drums: Track,
    se: Track,
}

impl Default for Song {
    fn default() -> Self {
        Song::new()
    }
}

impl Song {
    pub fn new() -> Song {
        Song {
            arrangement: Arrangement::default(),
            bpm: 120,
            seed: 0,
            modulation_tick: 0,
            modulation_amount: 0,
            phrase_boundaries: Vec::new(),
            vocal: Track::new(TrackRole::Vocal),
            chord: Track::new(TrackRole::Chord),
            bass: Track::new(TrackRole::Bass),
            motif: Track::new(TrackRole::Motif),
            arpeggio: Track::new(TrackRole::Arpeggio),
            aux: Track::new(TrackRole::Aux),
            drums: Track::new(TrackRole::Drums),
            se: Track::new(TrackRole::Se),
        }
    }

    pub fn arrangement(&self) -> &Arrangement {
        &self.arrangement
    }

    pub fn set_arrangement(&mut self, arrangement: Arrangement) {
        self.arrangement = arrangement;
    }

    pub fn bpm(&self) -> u16 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: u16) {
        self.bpm = bpm;
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn set_seed(&mut self, seed: u32) {
        self.seed = seed;
    }

    pub fn modulation_tick(&self) -> Tick {
        self.modulation_tick
    }

    pub fn modulation_amount(&self) -> i8 {
        self.modulation_amount
    }

    pub fn set_modulation(&mut self, tick: Tick, amount: i8) {
        self.modulation_tick = tick;
        self.modulation_amount = amount;
    }

    pub fn phrase_boundaries(&self) -> &[PhraseBoundary] {
        &self.phrase_boundaries
    }

    pub fn add_phrase_boundary(&mut self, boundary: PhraseBoundary) {
        self.phrase_boundaries.push(boundary);
    }

    pub fn clear_phrase_boundaries(&mut self) {
        self.phrase_boundaries.clear();
    }

    pub fn vocal(&self) -> &Track {
        &self.vocal
    }
    pub fn vocal_mut(&mut self) -> &mut Track {
        &mut self.vocal
    }
    pub fn chord(&self) -> &Track {
        &self.chord
    }
    pub fn chord_mut(&mut self) -> &mut Track {
        &mut self.chord
    }
    pub fn bass(&self) -> &Track {
        &self.bass
    }
    pub fn bass_mut(&mut self) -> &mut Track {
        &mut self.bass
    }
    pub fn motif(&self) -> &Track {
        &self.motif
    }
    pub fn motif_mut(&mut self) -> &mut Track {
        &mut self.motif
    }
    pub fn arpeggio(&self) -> &Track {
        &self.arpeggio
    }
    pub fn arpeggio_mut(&mut self) -> &mut Track {
        &mut self.arpeggio
    }
    pub fn aux(&self) -> &Track {
        &self.aux
    }
    pub fn aux_mut(&mut self) -> &mut Track {
        &mut self.aux
    }
    pub fn drums(&self) -> &Track {
        &self.drums
    }
    pub fn drums_mut(&mut self) -> &mut Track {
        &mut self.drums
    }
    pub fn se(&self) -> &Track {
        &self.se
    }
    pub fn se_mut(&mut self) -> &mut Track {
        &mut self.se
    }

    /// All pitched (non-drum, non-SE) tracks for analysis.
    pub fn pitched_tracks(&self) -> [&Track; 6] {
        [
            &self.vocal,
            &self.chord,
            &self.bass,
            &self.motif,
            &self.arpeggio,
            &self.aux,
        ]
    }

    /// Every track in emission order.
    pub fn all_tracks(&self) -> [&Track; 8] {
        [
            &self.se,
            &self.vocal,
            &self.chord,
            &self.bass,
            &self.motif,
            &self.arpeggio,
            &self.aux,
            &self.drums,
        ]
    }

    /// Sort every track's notes by `(start_tick, pitch)`.
    pub fn finalize(&mut self) {
        self.vocal.sort_notes();
        self.chord.sort_notes();
        self.bass.sort_notes();
        self.motif.sort_notes();
        self.arpeggio.sort_notes();
        self.aux.sort_notes();
        self.drums.sort_notes();
        self.se.sort_notes();
    }

    pub fn clear_all(&mut self) {
        self.vocal.clear();
        self.chord.clear();
        self.bass.clear();
        self.motif.clear();
        self.arpeggio.clear();
        self.aux.clear();
        self.drums.clear();
        self.se.clear();
        self.phrase_boundaries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_constants_consistent() {
        assert_eq!(TICKS_PER_BAR, 1920);
        assert_eq!(TICK_HALF, 960);
        assert_eq!(TICK_EIGHTH, 240);
        assert_eq!(TICK_32ND, 60);
    }

    #[test]
    fn track_sort_orders_by_start_then_pitch() {
        let mut track = Track::new(TrackRole::Chord);
        let note = |start, pitch| NoteEvent {
            start_tick: start,
            duration: 480,
            pitch,
            velocity: 90,
            source: NoteSource::Unknown,
            original_pitch: pitch,
            chord_degree: 0,
            lookup_tick: start,
        };
        track.add_note(note(480, 64));
        track.add_note(note(0, 67));
        track.add_note(note(0, 60));
        track.sort_notes();
        assert_eq!(track.notes()[0].pitch, 60);
        assert_eq!(track.notes()[1].pitch, 67);
        assert_eq!(track.notes()[2].start_tick, 480);
    }

    #[test]
    fn arrangement_section_lookup() {
        let section = |ty, start, bars| Section {
            section_type: ty,
            start_tick: start,
            bars,
            density_percent: 80,
            backing_density: BackingDensity::Normal,
            vocal_density: VocalDensity::Full,
            track_mask: TrackMask::ALL,
            peak_level: PeakLevel::Normal,
        };
        let arr = Arrangement::new(vec![
            section(SectionType::Intro, 0, 4),
            section(SectionType::A, 4 * TICKS_PER_BAR, 8),
        ]);
        assert_eq!(arr.total_bars(), 12);
        assert_eq!(arr.total_ticks(), 12 * TICKS_PER_BAR);
        assert_eq!(
            arr.section_at_bar(5).unwrap().section_type,
            SectionType::A
        );
        assert!(arr.section_at_bar(12).is_none());
    }
}
