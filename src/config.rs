//! Configuration system for the transcription pipeline

use crate::error::{Result as TranscriptionResult, TranscriptionError};
use serde::{Deserialize, Serialize};

/// Frequency of C1, the lowest constant-Q bin by default
pub const C1_HZ: f32 = 32.703_197;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub cqt: CqtConfig,
    pub threshold: ThresholdConfig,
    pub onset: OnsetConfig,
    pub tempo: TempoConfig,
    pub pitch: PitchConfig,
    pub quantize: QuantizeConfig,
    pub export: ExportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            cqt: CqtConfig::default(),
            threshold: ThresholdConfig::default(),
            onset: OnsetConfig::default(),
            tempo: TempoConfig::default(),
            pitch: PitchConfig::default(),
            quantize: QuantizeConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

/// Edge padding used when a transform frame extends past the signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PadMode {
    Reflect,
    Constant,
}

/// Constant-Q transform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CqtConfig {
    /// Analysis window length; only used to derive the hop
    pub n_fft: usize,
    /// Fraction of `n_fft` shared by consecutive frames
    pub overlap: f32,
    pub n_bins: usize,
    pub bins_per_octave: usize,
    pub fmin_hz: f32,
    pub filter_scale: f32,
    /// Magnitude exponent applied before dB conversion
    pub mag_exp: f32,
    /// Dynamic range kept below the loudest cell; `None` keeps everything
    pub top_db: Option<f32>,
    pub amin: f32,
    /// Kernel coefficients below this fraction of the bin's peak are dropped
    pub sparsity: f32,
    pub pad_mode: PadMode,
}

impl Default for CqtConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            overlap: 0.5,
            n_bins: 72,
            bins_per_octave: 12,
            fmin_hz: C1_HZ,
            filter_scale: 1.0,
            mag_exp: 4.0,
            top_db: Some(80.0),
            amin: 1e-5,
            sparsity: 0.01,
            pad_mode: PadMode::Reflect,
        }
    }
}

impl CqtConfig {
    /// Number of samples between successive frames
    pub fn hop_length(&self) -> usize {
        (self.n_fft as f32 * (1.0 - self.overlap)) as usize
    }
}

/// Spectral threshold configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Cells below this level are clamped to `silence_floor_db`
    pub cqt_threshold_db: f32,
    pub silence_floor_db: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cqt_threshold_db: -60.0,
            silence_floor_db: -120.0,
        }
    }
}

/// Onset detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    /// Frames before and after a candidate that it must dominate
    pub pre_post_max: usize,
    pub backtrack: bool,
    pub lag: usize,
    pub pre_avg_sec: f32,
    pub post_avg_sec: f32,
    pub wait_sec: f32,
    pub delta: f32,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            pre_post_max: 6,
            backtrack: false,
            lag: 1,
            pre_avg_sec: 0.10,
            post_avg_sec: 0.10,
            wait_sec: 0.03,
            delta: 0.07,
        }
    }
}

/// Tempo estimation and beat tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Prior centre, also the fallback for degenerate input
    pub start_bpm: f32,
    /// Prior width in octaves
    pub std_bpm: f32,
    pub tightness: f32,
    pub min_bpm: f32,
    pub max_bpm: f32,
    pub ac_size_sec: f32,
    pub trim: bool,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            start_bpm: 120.0,
            std_bpm: 1.0,
            tightness: 100.0,
            min_bpm: 20.0,
            max_bpm: 320.0,
            ac_size_sec: 8.0,
            trim: true,
        }
    }
}

/// Pitch estimation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    /// Segments whose strongest averaged bin is below this are unvoiced
    pub silence_threshold_db: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            silence_threshold_db: -60.0,
        }
    }
}

/// Duration quantization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizeConfig {
    /// Smallest duration step notation can resolve, in seconds
    pub note_resolution_sec: f32,
    /// Factor applied to the physical duration before rounding
    pub duration_scale: f32,
    pub subdivisions_per_beat: u32,
    pub snap_to_grid: bool,
}

impl Default for QuantizeConfig {
    fn default() -> Self {
        Self {
            note_resolution_sec: 0.02,
            duration_scale: 0.5,
            subdivisions_per_beat: 16,
            snap_to_grid: true,
        }
    }
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub ppq: u16,
    pub midi_channel: u8,
    /// General MIDI program, 30 = overdriven guitar
    pub midi_program: u8,
    pub write_midi: bool,
    pub write_audio: bool,
    pub write_analysis: bool,
    pub write_plots: bool,
    pub plot_note_range: [String; 2],
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            ppq: 960,
            midi_channel: 0,
            midi_program: 30,
            write_midi: true,
            write_audio: true,
            write_analysis: true,
            write_plots: false,
            plot_note_range: ["B2".to_string(), "B6".to_string()],
        }
    }
}

fn require(condition: bool, parameter: &str, constraint: &str) -> TranscriptionResult<()> {
    if condition {
        Ok(())
    } else {
        Err(TranscriptionError::invalid_config(parameter, constraint))
    }
}

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> TranscriptionResult<()> {
    let cqt = &config.cqt;
    require(cqt.n_fft > 0, "cqt.n_fft", "must be > 0")?;
    require(
        (0.0..1.0).contains(&cqt.overlap),
        "cqt.overlap",
        "must be in [0, 1)",
    )?;
    require(
        cqt.hop_length() > 0,
        "cqt.overlap",
        "n_fft * (1 - overlap) must be at least one sample",
    )?;
    require(cqt.n_bins > 0, "cqt.n_bins", "must be > 0")?;
    require(cqt.bins_per_octave > 0, "cqt.bins_per_octave", "must be > 0")?;
    require(
        cqt.fmin_hz.is_finite() && cqt.fmin_hz > 0.0,
        "cqt.fmin_hz",
        "must be a positive frequency",
    )?;
    require(cqt.filter_scale > 0.0, "cqt.filter_scale", "must be > 0")?;
    require(cqt.mag_exp > 0.0, "cqt.mag_exp", "must be > 0")?;
    if let Some(top_db) = cqt.top_db {
        require(top_db > 0.0, "cqt.top_db", "must be > 0 when set")?;
    }
    require(cqt.amin > 0.0, "cqt.amin", "must be > 0")?;
    require(
        (0.0..1.0).contains(&cqt.sparsity),
        "cqt.sparsity",
        "must be in [0, 1)",
    )?;

    let threshold = &config.threshold;
    require(
        threshold.cqt_threshold_db <= 0.0,
        "threshold.cqt_threshold_db",
        "must be <= 0 dB",
    )?;
    require(
        threshold.silence_floor_db < threshold.cqt_threshold_db,
        "threshold.silence_floor_db",
        "must be below threshold.cqt_threshold_db",
    )?;

    let onset = &config.onset;
    require(onset.pre_post_max > 0, "onset.pre_post_max", "must be > 0")?;
    require(onset.lag > 0, "onset.lag", "must be > 0")?;
    require(
        onset.pre_avg_sec >= 0.0 && onset.post_avg_sec >= 0.0 && onset.wait_sec >= 0.0,
        "onset.pre_avg_sec/post_avg_sec/wait_sec",
        "must be >= 0",
    )?;

    let tempo = &config.tempo;
    require(tempo.min_bpm > 0.0, "tempo.min_bpm", "must be > 0")?;
    require(
        tempo.min_bpm <= tempo.start_bpm && tempo.start_bpm <= tempo.max_bpm,
        "tempo.start_bpm",
        "must lie within [tempo.min_bpm, tempo.max_bpm]",
    )?;
    require(
        tempo.max_bpm - tempo.min_bpm >= 2.0,
        "tempo.max_bpm",
        "must leave room for at least one even tempo above tempo.min_bpm",
    )?;
    require(tempo.std_bpm > 0.0, "tempo.std_bpm", "must be > 0")?;
    require(tempo.tightness > 0.0, "tempo.tightness", "must be > 0")?;
    require(tempo.ac_size_sec > 0.0, "tempo.ac_size_sec", "must be > 0")?;

    require(
        config.pitch.silence_threshold_db <= 0.0,
        "pitch.silence_threshold_db",
        "must be <= 0 dB",
    )?;

    let quantize = &config.quantize;
    require(
        quantize.note_resolution_sec > 0.0,
        "quantize.note_resolution_sec",
        "must be > 0",
    )?;
    require(
        quantize.duration_scale > 0.0,
        "quantize.duration_scale",
        "must be > 0",
    )?;
    require(
        quantize.subdivisions_per_beat > 0,
        "quantize.subdivisions_per_beat",
        "must be > 0",
    )?;

    let export = &config.export;
    require(
        (1..=0x7fff).contains(&export.ppq),
        "export.ppq",
        "must be in 1..=32767",
    )?;
    require(export.midi_channel <= 15, "export.midi_channel", "must be <= 15")?;
    require(export.midi_program <= 127, "export.midi_program", "must be <= 127")?;

    Ok(())
}

/// Checks that depend on the input's sample rate
pub fn validate_for_sample_rate(config: &Config, sr: u32) -> TranscriptionResult<()> {
    if sr == 0 {
        return Err(TranscriptionError::UnsupportedSampleRate(sr));
    }
    let cqt = &config.cqt;
    let top_bin = cqt.n_bins.saturating_sub(1) as f32 / cqt.bins_per_octave as f32;
    let f_max = cqt.fmin_hz * 2.0f32.powf(top_bin);
    let nyquist = sr as f32 / 2.0;
    if f_max >= nyquist {
        return Err(TranscriptionError::invalid_config(
            "cqt.n_bins",
            format!(
                "highest bin ({:.1} Hz) must be below Nyquist ({:.1} Hz at {} Hz)",
                f_max, nyquist, sr
            ),
        ));
    }
    Ok(())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
