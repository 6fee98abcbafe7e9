//! Error types for the transcription system

use std::fmt;

/// Custom error type for transcription processing
#[derive(Debug, Clone)]
pub enum TranscriptionError {
    /// E001: Invalid audio format (e.g., unsupported container or bit depth)
    InvalidAudioFormat(String),
    /// E002: Unsupported sample rate
    UnsupportedSampleRate(u32),
    /// E003: Invalid configuration parameter
    InvalidConfigParameter {
        parameter: String,
        constraint: String,
    },
    /// E004: Audio file I/O error
    AudioFileError(String),
    /// E005: Constant-Q transform error
    SpectralProcessingError(String),
    /// E006: Processing pipeline error
    ProcessingPipelineError(String),
    /// E007: MIDI export error
    MidiExportError(String),
    /// E008: Analysis export error
    AnalysisExportError(String),
    /// E009: Synthesized audio export error
    AudioExportError(String),
    /// E010: QA artifact generation error
    QaGenerationError(String),
    /// E011: Input validation error
    InputValidationError(String),
}

impl TranscriptionError {
    /// Shorthand for a configuration error naming the offending parameter
    pub fn invalid_config(parameter: &str, constraint: impl Into<String>) -> Self {
        TranscriptionError::InvalidConfigParameter {
            parameter: parameter.to_string(),
            constraint: constraint.into(),
        }
    }
}

impl fmt::Display for TranscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptionError::InvalidAudioFormat(msg) => {
                write!(f, "E001: Invalid audio format - {}", msg)
            }
            TranscriptionError::UnsupportedSampleRate(sr) => {
                write!(f, "E002: Unsupported sample rate {} Hz", sr)
            }
            TranscriptionError::InvalidConfigParameter {
                parameter,
                constraint,
            } => {
                write!(
                    f,
                    "E003: Invalid configuration parameter `{}` - {}",
                    parameter, constraint
                )
            }
            TranscriptionError::AudioFileError(msg) => {
                write!(f, "E004: Audio file I/O error - {}", msg)
            }
            TranscriptionError::SpectralProcessingError(msg) => {
                write!(f, "E005: Spectral processing error - {}", msg)
            }
            TranscriptionError::ProcessingPipelineError(msg) => {
                write!(f, "E006: Processing pipeline error - {}", msg)
            }
            TranscriptionError::MidiExportError(msg) => {
                write!(f, "E007: MIDI export error - {}", msg)
            }
            TranscriptionError::AnalysisExportError(msg) => {
                write!(f, "E008: Analysis export error - {}", msg)
            }
            TranscriptionError::AudioExportError(msg) => {
                write!(f, "E009: Audio export error - {}", msg)
            }
            TranscriptionError::QaGenerationError(msg) => {
                write!(f, "E010: QA artifact generation error - {}", msg)
            }
            TranscriptionError::InputValidationError(msg) => {
                write!(f, "E011: Input validation error - {}", msg)
            }
        }
    }
}

impl std::error::Error for TranscriptionError {}

impl From<std::io::Error> for TranscriptionError {
    fn from(err: std::io::Error) -> Self {
        TranscriptionError::AudioFileError(format!("File I/O error: {}", err))
    }
}

impl From<hound::Error> for TranscriptionError {
    fn from(err: hound::Error) -> Self {
        TranscriptionError::AudioFileError(format!("WAV error: {}", err))
    }
}

impl From<serde_json::Error> for TranscriptionError {
    fn from(err: serde_json::Error) -> Self {
        TranscriptionError::AnalysisExportError(format!("JSON serialization error: {}", err))
    }
}

impl From<anyhow::Error> for TranscriptionError {
    fn from(err: anyhow::Error) -> Self {
        TranscriptionError::ProcessingPipelineError(format!("Generic error: {}", err))
    }
}

/// Result type alias for transcription operations
pub type Result<T> = std::result::Result<T, TranscriptionError>;
