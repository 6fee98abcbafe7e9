//! End-to-end tests for the full transcription pipeline

use midly::{MidiMessage, Smf, TrackEventKind};
use mono2midi::audio::{write_wav_pcm16, SampleBuffer};
use mono2midi::{Config, NotePitch, Transcriber, TranscriptionError, TuningOverrides};
use std::f32::consts::PI;
use std::path::PathBuf;

const SR: u32 = 22050;

/// Generate consecutive tones with raised-cosine fades of `fade_sec`
fn generate_tones(freqs: &[f32], note_sec: f32, fade_sec: f32, sr: u32) -> Vec<f32> {
    let note_len = (note_sec * sr as f32) as usize;
    let fade = (fade_sec * sr as f32) as usize;
    freqs
        .iter()
        .flat_map(|&f| {
            (0..note_len).map(move |i| {
                let edge = i.min(note_len - 1 - i);
                let gain = if edge < fade {
                    0.5 - 0.5 * (PI * edge as f32 / fade.max(1) as f32).cos()
                } else {
                    1.0
                };
                0.5 * gain * (2.0 * PI * f * i as f32 / sr as f32).sin()
            })
        })
        .collect()
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mono2midi_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_tone_melody() {
        let samples = generate_tones(&[440.0, 880.0], 1.0, 0.02, SR);
        let n_samples = samples.len();
        let transcriber = Transcriber::new(Config::default()).unwrap();

        let result = transcriber
            .transcribe(&SampleBuffer::new(samples, SR))
            .unwrap();

        assert_eq!(
            result.segmentation.n_segments(),
            2,
            "boundaries: {:?}",
            result.segmentation.boundaries
        );
        assert_eq!(result.voiced_count(), 2);
        let notes: Vec<u8> = result
            .events
            .iter()
            .filter_map(|e| e.pitch.midi_note())
            .collect();
        assert_eq!(notes, vec![69, 81]);
        assert!(result.dropped.is_empty());
        assert_eq!(result.audio.len(), n_samples);
        assert_eq!(result.tempo.bpm % 2, 0);
    }

    #[test]
    fn test_two_tone_melody_with_hard_edges() {
        for sr in [22050u32, 44100] {
            let samples = generate_tones(&[440.0, 880.0], 1.0, 0.0, sr);
            let n_samples = samples.len();
            let transcriber = Transcriber::new(Config::default()).unwrap();
            let result = transcriber
                .transcribe(&SampleBuffer::new(samples, sr))
                .unwrap();

            assert_eq!(
                result.segmentation.n_segments(),
                2,
                "{} Hz boundaries: {:?}",
                sr,
                result.segmentation.boundaries
            );
            assert_eq!(result.voiced_count(), 2);
            assert!(result.dropped.is_empty());
            let notes: Vec<u8> = result
                .events
                .iter()
                .filter_map(|e| e.pitch.midi_note())
                .collect();
            assert_eq!(notes, vec![69, 81]);
            assert_eq!(result.audio.len(), n_samples);
        }
    }

    #[test]
    fn test_silence_is_one_rest() {
        let transcriber = Transcriber::new(Config::default()).unwrap();
        let result = transcriber
            .transcribe(&SampleBuffer::new(vec![0.0; SR as usize], SR))
            .unwrap();

        assert_eq!(result.tempo.bpm, 120);
        assert!(result.tempo.is_default);
        assert_eq!(result.segmentation.boundaries, vec![0, 22]);
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].pitch, NotePitch::Rest);
        assert_eq!(result.events[0].velocity, 0);
        assert_eq!(result.audio.len(), SR as usize);
        assert!(result.audio.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_retune_reuses_matrix() {
        let samples = generate_tones(&[330.0, 440.0, 550.0], 0.6, 0.02, SR);
        let n_samples = samples.len();
        let transcriber = Transcriber::new(Config::default()).unwrap();
        let matrix = transcriber
            .analyze(&SampleBuffer::new(samples, SR))
            .unwrap();
        let before = matrix.db.clone();

        let baseline = transcriber.transcribe_matrix(&matrix).unwrap();
        let overrides = TuningOverrides {
            threshold_db: Some(-20.0),
            backtrack: Some(true),
            pre_post_max: None,
        };
        let retuned = transcriber.retune(&matrix, &overrides).unwrap();

        assert_eq!(matrix.db, before);
        assert_eq!(retuned.audio.len(), n_samples);
        assert_eq!(baseline.audio.len(), n_samples);
        let boundaries = &retuned.segmentation.boundaries;
        assert_eq!(boundaries[0], 0);
        assert_eq!(*boundaries.last().unwrap(), matrix.n_frames());
        assert_eq!(
            retuned.events.len() + retuned.dropped.len(),
            retuned.segmentation.n_segments()
        );
        // the transcriber's own settings are untouched
        assert_eq!(transcriber.config().threshold.cqt_threshold_db, -60.0);
    }

    #[test]
    fn test_retune_rejects_invalid_overrides() {
        let transcriber = Transcriber::new(Config::default()).unwrap();
        let matrix = transcriber
            .analyze(&SampleBuffer::new(vec![0.0; 4096], SR))
            .unwrap();
        let overrides = TuningOverrides {
            pre_post_max: Some(0),
            ..Default::default()
        };
        let result = transcriber.retune(&matrix, &overrides);
        assert!(matches!(
            result,
            Err(TranscriptionError::InvalidConfigParameter { .. })
        ));
    }

    #[test]
    fn test_process_writes_outputs() {
        let dir = scratch_dir("process");
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("input.wav");
        let samples = generate_tones(&[440.0, 880.0], 1.0, 0.02, SR);
        write_wav_pcm16(&input, &samples, SR).unwrap();

        let out_dir = dir.join("out");
        let transcriber = Transcriber::new(Config::default()).unwrap();
        let result = transcriber.process(&input, &out_dir).unwrap();

        let wav = hound::WavReader::open(out_dir.join("synthesized.wav")).unwrap();
        assert_eq!(wav.spec().sample_rate, SR);
        assert_eq!(wav.spec().channels, 1);
        assert_eq!(wav.len() as usize, samples.len());

        let bytes = std::fs::read(out_dir.join("transcription.mid")).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        let note_ons = smf.tracks[0]
            .iter()
            .filter(|ev| {
                matches!(
                    ev.kind,
                    TrackEventKind::Midi {
                        message: MidiMessage::NoteOn { .. },
                        ..
                    }
                )
            })
            .count();
        let voiced_events = result.events.iter().filter(|e| !e.pitch.is_rest()).count();
        assert_eq!(note_ons, voiced_events);

        let json = std::fs::read_to_string(out_dir.join("analysis.json")).unwrap();
        let analysis: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(analysis["tempo"]["bpm"], result.tempo.bpm);
        assert_eq!(
            analysis["events"].as_array().map(|a| a.len()),
            Some(result.events.len())
        );

        assert!(!out_dir.join("qa").exists(), "plots are off by default");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_process_renders_plots() {
        let dir = scratch_dir("plots");
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("input.wav");
        write_wav_pcm16(&input, &generate_tones(&[330.0, 660.0], 0.5, 0.02, SR), SR).unwrap();

        let mut config = Config::default();
        config.export.write_plots = true;
        let out_dir = dir.join("out");
        Transcriber::new(config)
            .unwrap()
            .process(&input, &out_dir)
            .unwrap();

        for name in ["cqt_thresholded.png", "onset_envelope.png"] {
            let path = out_dir.join("qa").join(name);
            let size = std::fs::metadata(&path)
                .unwrap_or_else(|e| panic!("{} missing: {}", path.display(), e))
                .len();
            assert!(size > 0, "{} is empty", name);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_process_missing_file() {
        let transcriber = Transcriber::new(Config::default()).unwrap();
        let result = transcriber.process(
            scratch_dir("missing").join("nope.wav"),
            scratch_dir("missing_out"),
        );
        assert!(result.is_err());
    }
}
