//! Monophonic Audio-to-MIDI Transcription
//!
//! A deterministic signal-processing pipeline that turns a recording of a
//! single melodic line into quantized note events, a re-synthesized audio
//! rendition, and a Standard MIDI File.
//!
//! The pipeline runs six passes, each a pure function of its inputs:
//! constant-Q transform, spectral thresholding, onset segmentation, tempo
//! estimation, per-segment pitch estimation, and quantization with synthesis.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod midi;
pub mod passes;
pub mod qa;
pub mod spectral;

pub use analysis::{MusicalEvent, NotePitch, PitchEstimate, Transcription};
pub use audio::SampleBuffer;
pub use config::Config;
pub use error::{Result as TranscriptionResult, TranscriptionError};
pub use spectral::SpectralMatrix;

use passes::pass_1::ThresholdedMatrix;
use std::path::Path;

/// Settings that can be changed when re-running from an existing matrix
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TuningOverrides {
    pub threshold_db: Option<f32>,
    pub backtrack: Option<bool>,
    pub pre_post_max: Option<usize>,
}

impl TuningOverrides {
    /// Copy of `config` with every set override applied
    pub fn apply(&self, config: &Config) -> Config {
        let mut tuned = config.clone();
        if let Some(threshold_db) = self.threshold_db {
            tuned.threshold.cqt_threshold_db = threshold_db;
        }
        if let Some(backtrack) = self.backtrack {
            tuned.onset.backtrack = backtrack;
        }
        if let Some(pre_post_max) = self.pre_post_max {
            tuned.onset.pre_post_max = pre_post_max;
        }
        tuned
    }
}

/// Main processing pipeline for monophonic transcription
#[derive(Debug, Clone)]
pub struct Transcriber {
    config: Config,
}

impl Transcriber {
    /// Create a transcriber, rejecting an invalid configuration up front
    pub fn new(config: Config) -> TranscriptionResult<Self> {
        config::validate_config(&config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process an audio file and write the configured outputs
    pub fn process<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_dir: Q,
    ) -> TranscriptionResult<Transcription> {
        let buffer = SampleBuffer::load(input_path)?;
        log::info!(
            "Loaded {:.2} s of audio at {} Hz",
            buffer.duration_sec(),
            buffer.sr
        );

        let matrix = self.analyze(&buffer)?;
        let (transcription, thresholded) = run_passes(&matrix, &self.config)?;

        self.export_results(&transcription, &thresholded, output_dir.as_ref())?;

        Ok(transcription)
    }

    /// Compute the spectral matrix (pass 0) on its own
    pub fn analyze(&self, buffer: &SampleBuffer) -> TranscriptionResult<SpectralMatrix> {
        passes::pass_0::run(buffer, &self.config)
    }

    /// Run the complete pipeline on an in-memory buffer
    pub fn transcribe(&self, buffer: &SampleBuffer) -> TranscriptionResult<Transcription> {
        let matrix = self.analyze(buffer)?;
        self.transcribe_matrix(&matrix)
    }

    /// Run passes 1 to 5 on a precomputed matrix
    pub fn transcribe_matrix(&self, matrix: &SpectralMatrix) -> TranscriptionResult<Transcription> {
        run_passes(matrix, &self.config).map(|(transcription, _)| transcription)
    }

    /// Re-run passes 1 to 5 with different tuning, reusing the transform
    pub fn retune(
        &self,
        matrix: &SpectralMatrix,
        overrides: &TuningOverrides,
    ) -> TranscriptionResult<Transcription> {
        let tuned = overrides.apply(&self.config);
        config::validate_config(&tuned)?;
        run_passes(matrix, &tuned).map(|(transcription, _)| transcription)
    }

    /// Export audio, MIDI, analysis and QA plots as configured
    fn export_results(
        &self,
        transcription: &Transcription,
        thresholded: &ThresholdedMatrix,
        output_dir: &Path,
    ) -> TranscriptionResult<()> {
        let export = &self.config.export;
        std::fs::create_dir_all(output_dir)?;

        if export.write_audio {
            let wav_path = output_dir.join("synthesized.wav");
            audio::write_wav_pcm16(&wav_path, &transcription.audio, transcription.sample_rate)?;
            log::info!("Exported synthesized audio to {}", wav_path.display());
        }
        if export.write_midi {
            midi::export_midi(transcription, output_dir, &self.config)?;
        }
        if export.write_analysis {
            analysis::export_analysis(transcription, output_dir)?;
        }
        if export.write_plots {
            qa::generate_artifacts(
                thresholded,
                &transcription.segmentation,
                &transcription.tempo,
                output_dir,
                export,
            )?;
        }
        Ok(())
    }
}

/// Passes 1 to 5; onsets come from the thresholded matrix, pitch from the raw one
fn run_passes(
    matrix: &SpectralMatrix,
    config: &Config,
) -> TranscriptionResult<(Transcription, ThresholdedMatrix)> {
    let thresholded = passes::pass_1::run(matrix, config);
    let segmentation = passes::pass_2::run(thresholded.as_matrix(), config);
    let tempo = passes::pass_3::run(
        &segmentation.envelope,
        matrix.sr,
        matrix.hop_length,
        config,
    );
    let pitches = passes::pass_4::run(matrix, &segmentation, config);
    let synthesis = passes::pass_5::run(matrix, &segmentation, &pitches, &tempo, config)?;

    let transcription = Transcription {
        tempo,
        segmentation,
        pitches,
        events: synthesis.events,
        dropped: synthesis.dropped,
        audio: synthesis.audio,
        sample_rate: matrix.sr,
    };

    Ok((transcription, thresholded))
}

/// Validate configuration and input files
pub fn validate_input<P: AsRef<Path>>(input_path: P, config: &Config) -> TranscriptionResult<()> {
    audio::validate_audio_file(input_path)?;
    config::validate_config(config)?;
    Ok(())
}
