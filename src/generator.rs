//! Song generation pipeline.
//!
//! Single-threaded, deterministic: one seeded RNG threads through every
//! stage in a fixed order (planner first, then the track generators in the
//! order the composition style dictates).  Generation never fails; invalid
//! inputs are clamped and every musical decision has a fallback.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::harmony::HarmonyContext;
use crate::arrange::build_structure;
use crate::params::{CompositionStyle, GeneratorParams, ModulationTiming};
use crate::planner::plan_secondary_dominants;
use crate::theory::chord_progression;
use crate::tracks::arpeggio::{generate_arpeggio_track, resolve_arpeggio_chord_clashes};
use crate::tracks::aux_track::{aux_function_for_mood, generate_aux_track};
use crate::tracks::bass::{generate_bass_track, generate_bass_track_with_vocal};
use crate::tracks::chord::generate_chord_track;
use crate::tracks::drums::generate_drum_track;
use crate::tracks::motif::generate_motif_track;
use crate::tracks::se::generate_se_track;
use crate::tracks::vocal::generate_vocal_track;
use crate::tracks::vocal_analysis::VocalAnalysis;
use crate::postprocess::{apply_humanization, apply_transition_dynamics};
use crate::types::{SectionType, Song, Tick, Track, TrackRole};

/// Orchestrates the full pipeline and owns the resulting song.
#[derive(Debug, Default)]
pub struct Generator {
    song: Song,
    harmony: HarmonyContext,
}

impl Generator {
    pub fn new() -> Generator {
        Generator::default()
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn harmony(&self) -> &HarmonyContext {
        &self.harmony
    }

    /// Seed 0 derives from the wall clock; anything else is used verbatim
    /// for reproducibility.
    fn resolve_seed(seed: u32) -> u32 {
        if seed == 0 {
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.subsec_nanos().wrapping_add(d.as_secs() as u32))
                .unwrap_or(1);
            if nanos == 0 {
                1
            } else {
                nanos
            }
        } else {
            seed
        }
    }

    /// Resolve the modulation plan from the arrangement.  The BGM styles
    /// never modulate.
    fn calculate_modulation(&mut self, params: &GeneratorParams) {
        if matches!(
            params.composition_style,
            CompositionStyle::BackgroundMotif | CompositionStyle::SynthDriven
        ) || params.modulation_semitones == 0
        {
            self.song.set_modulation(0, 0);
            return;
        }

        let tick: Option<Tick> = match params.modulation_timing {
            ModulationTiming::None => None,
            ModulationTiming::LastChorus => self
                .song
                .arrangement()
                .sections()
                .iter()
                .rev()
                .find(|s| s.section_type == SectionType::Chorus)
                .map(|s| s.start_tick),
            ModulationTiming::Bridge => self
                .song
                .arrangement()
                .sections()
                .iter()
                .find(|s| s.section_type == SectionType::Bridge)
                .map(|s| s.start_tick),
        };

        match tick {
            Some(t) if t > 0 => self.song.set_modulation(t, params.modulation_semitones),
            _ => self.song.set_modulation(0, 0),
        }
    }

    /// Run the full pipeline.
    pub fn generate(&mut self, params: &GeneratorParams) -> &Song {
        let params = params.normalized();

        let seed = Self::resolve_seed(params.seed);
        let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);
        self.song = Song::new();
        self.song.set_seed(seed);

        let bpm = if params.bpm == 0 {
            params.mood.default_bpm()
        } else {
            params.bpm
        };
        self.song.set_bpm(bpm);
        self.song.set_arrangement(build_structure(params.structure));

        let progression = chord_progression(params.chord_id);
        self.harmony = HarmonyContext::new();
        self.harmony
            .initialize(self.song.arrangement(), progression, params.mood);

        self.calculate_modulation(&params);

        // Harmonic planning runs before any track and consumes the RNG
        // first; every generator then reads the augmented timeline.
        plan_secondary_dominants(
            self.song.arrangement(),
            progression,
            params.mood,
            &mut rng,
            &mut self.harmony,
        );

        match params.composition_style {
            CompositionStyle::BackgroundMotif => {
                // Motif first so chord voicings avoid its pitch classes;
                // vocal and aux stay silent in this style.
                let mut motif = Track::new(TrackRole::Motif);
                generate_motif_track(&mut motif, &self.song, params.mood, &mut rng, &mut self.harmony);
                *self.song.motif_mut() = motif;

                let mut bass = Track::new(TrackRole::Bass);
                generate_bass_track(&mut bass, &self.song, &params, &mut rng, &mut self.harmony);
                *self.song.bass_mut() = bass;

                let mut chord = Track::new(TrackRole::Chord);
                generate_chord_track(&mut chord, &self.song, &params, &mut rng, &mut self.harmony, None);
                *self.song.chord_mut() = chord;
            }
            CompositionStyle::SynthDriven => {
                let mut bass = Track::new(TrackRole::Bass);
                generate_bass_track(&mut bass, &self.song, &params, &mut rng, &mut self.harmony);
                *self.song.bass_mut() = bass;

                let mut chord = Track::new(TrackRole::Chord);
                generate_chord_track(&mut chord, &self.song, &params, &mut rng, &mut self.harmony, None);
                *self.song.chord_mut() = chord;
            }
            CompositionStyle::MelodyLead => {
                // Vocal first; everything after adapts to it.
                let mut vocal = Track::new(TrackRole::Vocal);
                generate_vocal_track(&mut vocal, &mut self.song, &params, &mut rng, &self.harmony);
                *self.song.vocal_mut() = vocal;
                self.harmony.register_track(self.song.vocal(), TrackRole::Vocal);

                let analysis = VocalAnalysis::analyze(self.song.vocal());

                let mut bass = Track::new(TrackRole::Bass);
                generate_bass_track_with_vocal(
                    &mut bass,
                    &self.song,
                    &params,
                    &mut rng,
                    &analysis,
                    &mut self.harmony,
                );
                *self.song.bass_mut() = bass;

                let mut aux = Track::new(TrackRole::Aux);
                generate_aux_track(
                    &mut aux,
                    &self.song,
                    params.mood,
                    aux_function_for_mood(params.mood),
                    &analysis,
                    &mut rng,
                    &mut self.harmony,
                );
                *self.song.aux_mut() = aux;

                let mut chord = Track::new(TrackRole::Chord);
                generate_chord_track(
                    &mut chord,
                    &self.song,
                    &params,
                    &mut rng,
                    &mut self.harmony,
                    Some(&analysis),
                );
                *self.song.chord_mut() = chord;
            }
        }

        if params.drums_enabled {
            let mut drums = Track::new(TrackRole::Drums);
            generate_drum_track(&mut drums, &self.song, params.mood, &self.harmony);
            *self.song.drums_mut() = drums;
        }

        // SynthDriven implies an arpeggio even when not requested.
        if params.arpeggio_enabled || params.composition_style == CompositionStyle::SynthDriven {
            let mut arpeggio = Track::new(TrackRole::Arpeggio);
            generate_arpeggio_track(&mut arpeggio, &self.song, &params, &mut rng, &mut self.harmony);

            // Instrumental styles demand harmonic purity: rewrite any
            // arpeggio pitch still clashing with the finished chords.
            if matches!(
                params.composition_style,
                CompositionStyle::SynthDriven | CompositionStyle::BackgroundMotif
            ) {
                resolve_arpeggio_chord_clashes(&mut arpeggio, &mut self.harmony);
            }
            *self.song.arpeggio_mut() = arpeggio;
        }

        let mut se = Track::new(TrackRole::Se);
        generate_se_track(&mut se, &self.song);
        *self.song.se_mut() = se;

        apply_transition_dynamics(&mut self.song);

        if params.humanize {
            apply_humanization(&mut self.song, &mut rng);
        }

        self.song.finalize();
        &self.song
    }
}

/// Convenience wrapper: generate a song in one call.
pub fn generate_song(params: &GeneratorParams) -> Song {
    let mut generator = Generator::new();
    generator.generate(params);
    generator.song
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::StructurePattern;
    use crate::types::Mood;

    fn params(seed: u32) -> GeneratorParams {
        GeneratorParams {
            structure: StructurePattern::ShortForm,
            mood: Mood::StraightPop,
            seed,
            ..Default::default()
        }
    }

    #[test]
    fn melody_lead_populates_core_tracks() {
        let song = generate_song(&params(42));
        assert!(!song.vocal().is_empty());
        assert!(!song.bass().is_empty());
        assert!(!song.chord().is_empty());
        assert!(!song.drums().is_empty());
        assert!(song.motif().is_empty());
    }

    #[test]
    fn background_motif_silences_vocal_and_aux() {
        let mut p = params(42);
        p.composition_style = CompositionStyle::BackgroundMotif;
        let song = generate_song(&p);
        assert!(song.vocal().is_empty());
        assert!(song.aux().is_empty());
        assert!(!song.motif().is_empty());
        assert!(!song.chord().is_empty());
    }

    #[test]
    fn synth_driven_forces_arpeggio() {
        let mut p = params(42);
        p.composition_style = CompositionStyle::SynthDriven;
        p.arpeggio_enabled = false;
        let song = generate_song(&p);
        assert!(!song.arpeggio().is_empty());
        assert!(song.vocal().is_empty());
    }

    #[test]
    fn fixed_seed_reproduces_note_for_note() {
        let a = generate_song(&params(1234));
        let b = generate_song(&params(1234));
        for (ta, tb) in a.all_tracks().iter().zip(b.all_tracks().iter()) {
            assert_eq!(ta.notes(), tb.notes());
        }
    }

    #[test]
    fn different_seeds_differ() {
        let a = generate_song(&params(1));
        let b = generate_song(&params(2));
        let same = a
            .all_tracks()
            .iter()
            .zip(b.all_tracks().iter())
            .all(|(ta, tb)| ta.notes() == tb.notes());
        assert!(!same, "seeds 1 and 2 produced identical songs");
    }

    #[test]
    fn tracks_are_sorted_after_finalize() {
        let song = generate_song(&params(7));
        for track in song.all_tracks() {
            for pair in track.notes().windows(2) {
                assert!(
                    (pair[0].start_tick, pair[0].pitch) <= (pair[1].start_tick, pair[1].pitch),
                    "unsorted track {:?}",
                    track.role()
                );
            }
        }
    }

    #[test]
    fn modulation_resolved_for_last_chorus() {
        let mut p = params(5);
        p.structure = StructurePattern::StandardPop;
        p.modulation_timing = ModulationTiming::LastChorus;
        p.modulation_semitones = 2;
        let song = generate_song(&p);
        let last_chorus = song
            .arrangement()
            .sections()
            .iter()
            .rev()
            .find(|s| s.section_type == SectionType::Chorus)
            .unwrap();
        assert_eq!(song.modulation_tick(), last_chorus.start_tick);
        assert_eq!(song.modulation_amount(), 2);
    }

    #[test]
    fn drums_disabled_leaves_track_empty() {
        let mut p = params(3);
        p.drums_enabled = false;
        let song = generate_song(&p);
        assert!(song.drums().is_empty());
        assert!(!song.bass().is_empty());
    }
}
