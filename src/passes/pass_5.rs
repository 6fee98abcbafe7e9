//! Pass 5: Note Quantization & Synthesis
//!
//! Turns each segment's pitch estimate into a quantized symbolic event and a
//! block of synthesized samples. Segments are rendered independently and
//! concatenated in temporal order.
//!
//! Events are laid end to end on the beat grid: each one starts where the
//! previous quantized duration ended. A segment whose duration quantizes to
//! zero beats has no notation and is left out of the event list (its index
//! goes to `dropped`), but its samples are still rendered. It occupies zero
//! beats, so it does not move the events after it.

use crate::analysis::{
    MusicalEvent, NotePitch, NoteValue, OnsetSegmentation, PitchEstimate, TempoEstimate,
};
use crate::config::{Config, QuantizeConfig};
use crate::error::{Result as TranscriptionResult, TranscriptionError};
use crate::spectral::{hz_to_midi, SpectralMatrix};
use std::f32::consts::PI;

/// Symbolic events plus the synthesized audio they were rendered alongside
#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    pub events: Vec<MusicalEvent>,
    pub dropped: Vec<usize>,
    pub audio: Vec<f32>,
}

/// A single segment after quantization and synthesis
#[derive(Debug, Clone)]
pub struct RenderedSegment {
    /// `None` when the duration is not representable
    pub event: Option<MusicalEvent>,
    pub samples: Vec<f32>,
}

/// Continuous and quantized forms of one duration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizedDuration {
    pub raw_sec: f32,
    pub note_sec: f32,
    pub beats: f32,
}

/// Decibel range used to normalise loudness across the clip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessRange {
    pub min_db: f32,
    pub max_db: f32,
}

impl LoudnessRange {
    pub fn of(matrix: &SpectralMatrix) -> Self {
        LoudnessRange {
            min_db: matrix.min_db(),
            max_db: matrix.max_db(),
        }
    }

    pub fn velocity(&self, energy_db: f32) -> u8 {
        remap(energy_db, self.min_db, self.max_db, 0.0, 127.0)
            .round()
            .clamp(0.0, 127.0) as u8
    }

    pub fn amplitude(&self, energy_db: f32) -> f32 {
        remap(energy_db, self.min_db, self.max_db, 0.0, 1.0).clamp(0.0, 1.0)
    }
}

/// Linear map from `[in_min, in_max]` to `[out_min, out_max]`
///
/// A degenerate input range maps everything to `out_min`.
pub fn remap(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    let span = in_max - in_min;
    if !span.is_finite() || span.abs() < f32::EPSILON || !value.is_finite() {
        return out_min;
    }
    out_min + (value - in_min) * (out_max - out_min) / span
}

/// Snap `beats` to the nearest `1 / subdivisions` of a beat
pub fn snap_beats(beats: f32, subdivisions: u32) -> f32 {
    let grid = subdivisions.max(1) as f32;
    (beats * grid).round() / grid
}

/// Quantize a segment of `frames` frames against `tempo_bpm`
pub fn quantize_duration(
    frames: usize,
    sr: u32,
    hop_length: usize,
    tempo_bpm: f32,
    quantize: &QuantizeConfig,
) -> QuantizedDuration {
    let raw_sec = (frames * hop_length) as f32 / sr as f32;
    let resolution = quantize.note_resolution_sec;
    let note_sec = resolution * (raw_sec * quantize.duration_scale / resolution).round();

    let mut beats = tempo_bpm * note_sec / 60.0;
    if quantize.snap_to_grid {
        beats = snap_beats(beats, quantize.subdivisions_per_beat);
    }

    QuantizedDuration {
        raw_sec,
        note_sec,
        beats,
    }
}

/// Nearest MIDI note to `frequency_hz`
pub fn frequency_to_midi(frequency_hz: f32) -> u8 {
    hz_to_midi(frequency_hz).round().clamp(0.0, 127.0) as u8
}

/// Pure sinusoid starting at zero phase, or silence for `None`
pub fn synthesize(frequency_hz: Option<f32>, amplitude: f32, n_samples: usize, sr: u32) -> Vec<f32> {
    match frequency_hz {
        Some(f) if f > 0.0 && amplitude > 0.0 => {
            let step = 2.0 * PI * f / sr as f32;
            (0..n_samples)
                .map(|n| amplitude * (step * n as f32).sin())
                .collect()
        }
        _ => vec![0.0; n_samples],
    }
}

/// Quantize and synthesize segment `index` spanning frames `[start, end)`,
/// placing its event at `onset_beats`
#[allow(clippy::too_many_arguments)]
pub fn render_segment(
    index: usize,
    pitch: &PitchEstimate,
    start: usize,
    end: usize,
    onset_beats: f32,
    matrix: &SpectralMatrix,
    tempo_bpm: f32,
    loudness: &LoudnessRange,
    quantize: &QuantizeConfig,
) -> RenderedSegment {
    let sr = matrix.sr;
    let hop = matrix.hop_length;

    let start_sample = matrix.frame_to_sample(start).min(matrix.n_samples);
    let end_sample = matrix.frame_to_sample(end).min(matrix.n_samples);
    let n_samples = end_sample.saturating_sub(start_sample);

    let duration = quantize_duration(end.saturating_sub(start), sr, hop, tempo_bpm, quantize);
    let energy_db = pitch.energy_db();
    let velocity = loudness.velocity(energy_db);
    let amplitude = loudness.amplitude(energy_db);
    let frequency_hz = pitch.frequency_hz();

    let samples = synthesize(frequency_hz, amplitude, n_samples, sr);

    if !duration.beats.is_finite() || duration.beats <= 0.0 {
        return RenderedSegment {
            event: None,
            samples,
        };
    }

    let event = MusicalEvent {
        index,
        onset_sec: matrix.frame_to_time(start),
        onset_beats,
        raw_duration_sec: duration.raw_sec,
        note_duration_sec: duration.note_sec,
        duration_beats: duration.beats,
        note_value: NoteValue::from_beats(duration.beats),
        pitch: match frequency_hz {
            Some(f) => NotePitch::Note(frequency_to_midi(f)),
            None => NotePitch::Rest,
        },
        frequency_hz,
        velocity,
        amplitude,
    };

    RenderedSegment {
        event: Some(event),
        samples,
    }
}

pub fn run(
    matrix: &SpectralMatrix,
    segmentation: &OnsetSegmentation,
    pitches: &[PitchEstimate],
    tempo: &TempoEstimate,
    config: &Config,
) -> TranscriptionResult<SynthesisOutput> {
    log::info!("Pass 5: Note Quantization & Synthesis");

    if pitches.len() != segmentation.n_segments() {
        return Err(TranscriptionError::ProcessingPipelineError(format!(
            "{} pitch estimates for {} segments",
            pitches.len(),
            segmentation.n_segments()
        )));
    }

    let loudness = LoudnessRange::of(matrix);
    let tempo_bpm = tempo.bpm as f32;

    let mut events = Vec::with_capacity(pitches.len());
    let mut dropped = Vec::new();
    let mut audio = Vec::with_capacity(matrix.n_samples);
    let mut cursor_beats = 0.0f32;

    for (index, ((start, end), pitch)) in segmentation.segments().zip(pitches).enumerate() {
        let rendered = render_segment(
            index,
            pitch,
            start,
            end,
            cursor_beats,
            matrix,
            tempo_bpm,
            &loudness,
            &config.quantize,
        );
        audio.extend_from_slice(&rendered.samples);

        match rendered.event {
            Some(event) => {
                log::debug!(
                    "  Event {}: {:?} at {:.3} beats for {:.4} beats ({}), velocity {}",
                    index,
                    event.pitch,
                    event.onset_beats,
                    event.duration_beats,
                    event.note_value.map_or("compound", |v| v.name()),
                    event.velocity
                );
                cursor_beats += event.duration_beats;
                events.push(event);
            }
            None => {
                log::warn!(
                    "  Segment {} (frames {}..{}) is too short to notate, dropping its event",
                    index,
                    start,
                    end
                );
                dropped.push(index);
            }
        }
    }

    log::info!(
        "  ✓ {} events ({} rests), {} dropped, {} samples synthesized",
        events.len(),
        events.iter().filter(|e| e.pitch.is_rest()).count(),
        dropped.len(),
        audio.len()
    );

    Ok(SynthesisOutput {
        events,
        dropped,
        audio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn quantize() -> QuantizeConfig {
        QuantizeConfig::default()
    }

    fn matrix(n_frames: usize, hop_length: usize, sr: u32, n_samples: usize) -> SpectralMatrix {
        let mut db = Array2::from_elem((2, n_frames), -80.0);
        db[[0, 0]] = 0.0;
        SpectralMatrix {
            db,
            freqs: vec![440.0, 880.0],
            sr,
            hop_length,
            n_samples,
        }
    }

    #[test]
    fn test_remap() {
        assert_eq!(remap(-40.0, -80.0, 0.0, 0.0, 1.0), 0.5);
        assert_eq!(remap(0.0, -80.0, 0.0, 0.0, 127.0), 127.0);
        assert_eq!(remap(-10.0, -10.0, -10.0, 0.0, 127.0), 0.0);
    }

    #[test]
    fn test_quantize_one_second() {
        // 1 s at 120 BPM: half-duration is 0.5 s = exactly one beat
        let d = quantize_duration(100, 1000, 10, 120.0, &quantize());
        assert!((d.raw_sec - 1.0).abs() < 1e-6);
        assert!((d.note_sec - 0.5).abs() < 1e-6);
        assert!((d.beats - 1.0).abs() < 1e-6);
        assert_eq!(NoteValue::from_beats(d.beats), Some(NoteValue::Quarter));
    }

    #[test]
    fn test_quantize_snaps_to_sixteenths() {
        // 0.46 s at 100 BPM = 0.7667 beats, nearest 1/16 is 0.75
        let d = quantize_duration(92, 1000, 10, 100.0, &quantize());
        assert!((d.note_sec - 0.46).abs() < 1e-5);
        assert!((d.beats - 0.75).abs() < 1e-6, "got {}", d.beats);

        let mut unsnapped = quantize();
        unsnapped.snap_to_grid = false;
        let d = quantize_duration(92, 1000, 10, 100.0, &unsnapped);
        assert!((d.beats - 0.766_666).abs() < 1e-4);
    }

    #[test]
    fn test_frequency_to_midi() {
        assert_eq!(frequency_to_midi(440.0), 69);
        assert_eq!(frequency_to_midi(880.0), 81);
        assert_eq!(frequency_to_midi(452.0), 69); // +46 cents
        assert_eq!(frequency_to_midi(1.0), 0);
        assert_eq!(frequency_to_midi(50_000.0), 127);
    }

    #[test]
    fn test_synthesize() {
        let silent = synthesize(None, 1.0, 10, 8000);
        assert_eq!(silent, vec![0.0; 10]);

        let tone = synthesize(Some(2000.0), 0.5, 4, 8000);
        assert!(tone[0].abs() < 1e-6);
        assert!((tone[1] - 0.5).abs() < 1e-5);
        assert!(tone[2].abs() < 1e-5);
        assert!((tone[3] + 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_short_segment_drops_event_but_keeps_audio() {
        // One frame of 10 samples at 1 kHz is 0.01 s; half of it rounds to 0 s
        let m = matrix(4, 10, 1000, 40);
        let pitch = PitchEstimate::Voiced {
            frequency_hz: 440.0,
            bin: 0,
            energy_db: -40.0,
        };
        let rendered = render_segment(
            1,
            &pitch,
            1,
            2,
            0.0,
            &m,
            120.0,
            &LoudnessRange::of(&m),
            &quantize(),
        );
        assert!(rendered.event.is_none());
        assert_eq!(rendered.samples.len(), 10);
        assert!(rendered.samples.iter().any(|&x| x != 0.0));
    }

    #[test]
    fn test_rest_event() {
        let m = matrix(200, 10, 1000, 1995);
        let pitch = PitchEstimate::Unvoiced { energy_db: -80.0 };
        let rendered = render_segment(
            0,
            &pitch,
            100,
            200,
            2.0,
            &m,
            120.0,
            &LoudnessRange::of(&m),
            &quantize(),
        );
        let event = rendered.event.unwrap();
        assert_eq!(event.pitch, NotePitch::Rest);
        assert_eq!(event.velocity, 0);
        assert_eq!(event.frequency_hz, None);
        assert!((event.onset_beats - 2.0).abs() < 1e-6);
        assert!((event.onset_sec - 1.0).abs() < 1e-6);
        // last segment is cut at the analysed sample count
        assert_eq!(rendered.samples.len(), 995);
        assert!(rendered.samples.iter().all(|&x| x == 0.0));
    }
}
