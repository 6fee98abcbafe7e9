//! Audio I/O and sample buffer handling

use crate::error::{Result as TranscriptionResult, TranscriptionError};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Decoded mono audio at a fixed sample rate
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    /// Mono samples, nominally in [-1, 1]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sr: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sr: u32) -> Self {
        SampleBuffer { samples, sr }
    }

    /// Load audio file into a mono buffer
    pub fn load<P: AsRef<Path>>(path: P) -> TranscriptionResult<Self> {
        let (samples, sr) = load_audio_file(path)?;
        Ok(SampleBuffer { samples, sr })
    }

    /// Get audio duration in seconds
    pub fn duration_sec(&self) -> f32 {
        if self.sr == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sr as f32
    }

    /// Get number of samples
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Load audio file and return mono samples with sample rate
pub fn load_audio_file<P: AsRef<Path>>(path: P) -> TranscriptionResult<(Vec<f32>, u32)> {
    let path = path.as_ref();

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "wav" | "wave" => load_wav_file(path),
        _ => Err(TranscriptionError::InvalidAudioFormat(format!(
            "Unsupported audio format: {}",
            extension
        ))),
    }
}

/// Load WAV file, averaging all channels to mono
fn load_wav_file<P: AsRef<Path>>(path: P) -> TranscriptionResult<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(TranscriptionError::InvalidAudioFormat(
            "WAV header declares zero channels".to_string(),
        ));
    }

    if spec.bits_per_sample > 32 {
        return Err(TranscriptionError::InvalidAudioFormat(format!(
            "Unsupported bit depth: {}",
            spec.bits_per_sample
        )));
    }

    let sr = spec.sample_rate;
    let mut interleaved: Vec<f32> = Vec::with_capacity(reader.len() as usize);

    match spec.sample_format {
        SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>() {
                interleaved.push(sample? as f32 / max_value);
            }
        }
        SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                interleaved.push(sample?);
            }
        }
    }

    Ok((downmix(&interleaved, spec.channels as usize), sr))
}

/// Average interleaved channels into one
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Validate audio file format and content
pub fn validate_audio_file<P: AsRef<Path>>(path: P) -> TranscriptionResult<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(TranscriptionError::InputValidationError(format!(
            "Audio file does not exist: {}",
            path.display()
        )));
    }

    let (samples, sr) = load_audio_file(path)?;

    if samples.is_empty() {
        return Err(TranscriptionError::InputValidationError(
            "Audio file contains no samples".to_string(),
        ));
    }

    if !(8000..=192000).contains(&sr) {
        return Err(TranscriptionError::UnsupportedSampleRate(sr));
    }

    if rms(&samples) < 1e-6 {
        log::warn!("Audio file appears to be silent; every segment will be a rest");
    }

    let peak = peak(&samples);
    if peak > 0.99 {
        log::warn!("Audio file may be clipped (peak = {:.3})", peak);
    }

    Ok(())
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|&x| x * x).sum::<f32>() / samples.len() as f32).sqrt()
}

pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|&x| x.abs()).fold(0.0, f32::max)
}

/// Convert float samples to 16-bit PCM, clamping out-of-range values
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&x| (x.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Write mono 16-bit PCM WAV file
pub fn write_wav_pcm16<P: AsRef<Path>>(
    path: P,
    samples: &[f32],
    sr: u32,
) -> TranscriptionResult<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: sr,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .map_err(|e| TranscriptionError::AudioExportError(e.to_string()))?;
    for sample in to_pcm16(samples) {
        writer
            .write_sample(sample)
            .map_err(|e| TranscriptionError::AudioExportError(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| TranscriptionError::AudioExportError(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        let interleaved = vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(downmix(&interleaved, 2), vec![0.5, 0.5, 0.0]);
        assert_eq!(downmix(&interleaved, 1), interleaved);
    }

    #[test]
    fn test_to_pcm16_clamps() {
        let pcm = to_pcm16(&[0.0, 1.0, -1.0, 2.0, 0.5]);
        assert_eq!(pcm, vec![0, 32767, -32767, 32767, 16383]);
    }

    #[test]
    fn test_rms_and_peak() {
        let samples = vec![0.5, -0.5, 0.5, -0.5];
        assert!((rms(&samples) - 0.5).abs() < 1e-6);
        assert_eq!(peak(&[0.1, -0.9, 0.3]), 0.9);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_wav_round_trip() {
        let dir = std::env::temp_dir().join(format!("mono2midi-audio-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tone.wav");

        let samples: Vec<f32> = (0..800).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        write_wav_pcm16(&path, &samples, 8000).unwrap();

        let buffer = SampleBuffer::load(&path).unwrap();
        assert_eq!(buffer.sr, 8000);
        assert_eq!(buffer.n_samples(), samples.len());
        for (a, b) in buffer.samples.iter().zip(&samples) {
            assert!((a - b).abs() < 1e-3);
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load_audio_file("clip.mp3").unwrap_err();
        assert!(matches!(err, TranscriptionError::InvalidAudioFormat(_)));
    }
}
