//! Pipeline data model and analysis export

use serde::{Deserialize, Serialize};

/// Segment boundaries derived from the onset envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnsetSegmentation {
    /// Strictly increasing frame indices; first is 0, last is the frame count
    pub boundaries: Vec<usize>,
    /// `boundaries` converted to seconds
    pub times: Vec<f32>,
    /// Detected onset frames, before the implicit start/end boundaries were added
    pub onset_frames: Vec<usize>,
    /// Raw onset strength per frame
    pub envelope: Vec<f32>,
}

impl OnsetSegmentation {
    /// Half-open frame ranges `[start, end)` in temporal order
    pub fn segments(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.boundaries.windows(2).map(|w| (w[0], w[1]))
    }

    pub fn n_segments(&self) -> usize {
        self.boundaries.len().saturating_sub(1)
    }

    /// Frame range of segment `index`, if it exists
    pub fn segment(&self, index: usize) -> Option<(usize, usize)> {
        let start = *self.boundaries.get(index)?;
        let end = *self.boundaries.get(index + 1)?;
        Some((start, end))
    }
}

/// Global tempo and the beat grid tracked against it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoEstimate {
    /// Even-integer tempo in beats per minute
    pub bpm: u32,
    /// Tempo before rounding
    pub raw_bpm: f32,
    pub beat_frames: Vec<usize>,
    pub beat_times: Vec<f32>,
    /// True when the envelope was degenerate and the prior was used
    pub is_default: bool,
}

/// Outcome of pitch estimation for one segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PitchEstimate {
    Voiced {
        frequency_hz: f32,
        bin: usize,
        /// Mean of per-frame peak energy, used for loudness
        energy_db: f32,
    },
    Unvoiced {
        energy_db: f32,
    },
}

impl PitchEstimate {
    pub fn energy_db(&self) -> f32 {
        match *self {
            PitchEstimate::Voiced { energy_db, .. } | PitchEstimate::Unvoiced { energy_db } => {
                energy_db
            }
        }
    }

    pub fn frequency_hz(&self) -> Option<f32> {
        match *self {
            PitchEstimate::Voiced { frequency_hz, .. } => Some(frequency_hz),
            PitchEstimate::Unvoiced { .. } => None,
        }
    }

    pub fn is_voiced(&self) -> bool {
        matches!(self, PitchEstimate::Voiced { .. })
    }
}

/// Pitch content of a symbolic event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotePitch {
    /// MIDI note number
    Note(u8),
    Rest,
}

impl NotePitch {
    pub fn midi_note(&self) -> Option<u8> {
        match *self {
            NotePitch::Note(n) => Some(n),
            NotePitch::Rest => None,
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, NotePitch::Rest)
    }
}

/// Standard single-glyph note lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteValue {
    Whole,
    DottedHalf,
    Half,
    DottedQuarter,
    Quarter,
    DottedEighth,
    Eighth,
    DottedSixteenth,
    Sixteenth,
    DottedThirtySecond,
    ThirtySecond,
    SixtyFourth,
}

impl NoteValue {
    const ALL: [NoteValue; 12] = [
        NoteValue::Whole,
        NoteValue::DottedHalf,
        NoteValue::Half,
        NoteValue::DottedQuarter,
        NoteValue::Quarter,
        NoteValue::DottedEighth,
        NoteValue::Eighth,
        NoteValue::DottedSixteenth,
        NoteValue::Sixteenth,
        NoteValue::DottedThirtySecond,
        NoteValue::ThirtySecond,
        NoteValue::SixtyFourth,
    ];

    /// Length in quarter-note beats
    pub fn beats(&self) -> f32 {
        match self {
            NoteValue::Whole => 4.0,
            NoteValue::DottedHalf => 3.0,
            NoteValue::Half => 2.0,
            NoteValue::DottedQuarter => 1.5,
            NoteValue::Quarter => 1.0,
            NoteValue::DottedEighth => 0.75,
            NoteValue::Eighth => 0.5,
            NoteValue::DottedSixteenth => 0.375,
            NoteValue::Sixteenth => 0.25,
            NoteValue::DottedThirtySecond => 0.1875,
            NoteValue::ThirtySecond => 0.125,
            NoteValue::SixtyFourth => 0.0625,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NoteValue::Whole => "whole",
            NoteValue::DottedHalf => "dotted half",
            NoteValue::Half => "half",
            NoteValue::DottedQuarter => "dotted quarter",
            NoteValue::Quarter => "quarter",
            NoteValue::DottedEighth => "dotted eighth",
            NoteValue::Eighth => "eighth",
            NoteValue::DottedSixteenth => "dotted 16th",
            NoteValue::Sixteenth => "16th",
            NoteValue::DottedThirtySecond => "dotted 32nd",
            NoteValue::ThirtySecond => "32nd",
            NoteValue::SixtyFourth => "64th",
        }
    }

    /// Exact match only; compound lengths need ties and return `None`
    pub fn from_beats(beats: f32) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| (v.beats() - beats).abs() < 1e-4)
    }
}

/// One quantized symbolic event; one per segment that survived quantization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicalEvent {
    /// Segment index this event came from
    pub index: usize,
    pub onset_sec: f32,
    /// Start in beats: the sum of the preceding events' quantized durations
    pub onset_beats: f32,
    /// Physical segment duration
    pub raw_duration_sec: f32,
    /// Duration after notation-resolution rounding
    pub note_duration_sec: f32,
    pub duration_beats: f32,
    pub note_value: Option<NoteValue>,
    pub pitch: NotePitch,
    /// Estimated continuous frequency, `None` for rests
    pub frequency_hz: Option<f32>,
    pub velocity: u8,
    /// Synthesis amplitude in [0, 1]
    pub amplitude: f32,
}

/// Full result of one transcription run
#[derive(Debug, Clone)]
pub struct Transcription {
    pub tempo: TempoEstimate,
    pub segmentation: OnsetSegmentation,
    pub pitches: Vec<PitchEstimate>,
    pub events: Vec<MusicalEvent>,
    /// Segment indices whose symbolic event could not be represented
    pub dropped: Vec<usize>,
    /// Synthesized mono audio at `sample_rate`
    pub audio: Vec<f32>,
    pub sample_rate: u32,
}

impl Transcription {
    pub fn duration_sec(&self) -> f32 {
        self.audio.len() as f32 / self.sample_rate as f32
    }

    pub fn voiced_count(&self) -> usize {
        self.pitches.iter().filter(|p| p.is_voiced()).count()
    }

    /// Synthesized audio as 16-bit PCM
    pub fn to_pcm16(&self) -> Vec<i16> {
        crate::audio::to_pcm16(&self.audio)
    }
}

/// Export analysis results to JSON
pub fn export_analysis(
    transcription: &Transcription,
    output_dir: &std::path::Path,
) -> crate::TranscriptionResult<()> {
    std::fs::create_dir_all(output_dir)?;

    let analysis_path = output_dir.join("analysis.json");
    let analysis = build_analysis_results(transcription);

    let json = serde_json::to_string_pretty(&analysis)?;
    std::fs::write(&analysis_path, json)?;

    log::info!("Exported analysis results to {}", analysis_path.display());
    Ok(())
}

fn build_analysis_results(transcription: &Transcription) -> AnalysisResults<'_> {
    AnalysisResults {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
            .to_string(),
        audio_info: AudioInfo {
            duration_seconds: transcription.duration_sec(),
            sample_rate: transcription.sample_rate,
            total_samples: transcription.audio.len(),
            channels: 1,
        },
        tempo: &transcription.tempo,
        onset_times: &transcription.segmentation.times,
        segments: transcription
            .segmentation
            .segments()
            .zip(&transcription.pitches)
            .map(|((start_frame, end_frame), pitch)| SegmentSummary {
                start_frame,
                end_frame,
                pitch: *pitch,
            })
            .collect(),
        events: &transcription.events,
        dropped_segments: &transcription.dropped,
    }
}

#[derive(Debug, Serialize)]
struct AnalysisResults<'a> {
    version: String,
    timestamp: String,
    audio_info: AudioInfo,
    tempo: &'a TempoEstimate,
    onset_times: &'a [f32],
    segments: Vec<SegmentSummary>,
    events: &'a [MusicalEvent],
    dropped_segments: &'a [usize],
}

#[derive(Debug, Serialize)]
struct AudioInfo {
    duration_seconds: f32,
    sample_rate: u32,
    total_samples: usize,
    channels: usize,
}

#[derive(Debug, Serialize)]
struct SegmentSummary {
    start_frame: usize,
    end_frame: usize,
    pitch: PitchEstimate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_are_contiguous() {
        let seg = OnsetSegmentation {
            boundaries: vec![0, 5, 9, 20],
            times: vec![],
            onset_frames: vec![5, 9],
            envelope: vec![],
        };
        let ranges: Vec<_> = seg.segments().collect();
        assert_eq!(ranges, vec![(0, 5), (5, 9), (9, 20)]);
        assert_eq!(seg.n_segments(), 3);
        assert_eq!(seg.segment(2), Some((9, 20)));
        assert_eq!(seg.segment(3), None);
    }

    #[test]
    fn test_note_value_lookup() {
        assert_eq!(NoteValue::from_beats(1.0), Some(NoteValue::Quarter));
        assert_eq!(NoteValue::from_beats(0.75), Some(NoteValue::DottedEighth));
        assert_eq!(NoteValue::from_beats(1.0625), None);
        assert_eq!(NoteValue::from_beats(0.0), None);
    }

    #[test]
    fn test_pitch_estimate_accessors() {
        let voiced = PitchEstimate::Voiced {
            frequency_hz: 440.0,
            bin: 45,
            energy_db: -3.0,
        };
        let unvoiced = PitchEstimate::Unvoiced { energy_db: -80.0 };
        assert_eq!(voiced.frequency_hz(), Some(440.0));
        assert_eq!(unvoiced.frequency_hz(), None);
        assert_eq!(unvoiced.energy_db(), -80.0);
        assert!(voiced.is_voiced() && !unvoiced.is_voiced());
    }
}
