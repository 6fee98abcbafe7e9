//! Pass 0: Constant-Q Spectral Transform

use crate::audio::SampleBuffer;
use crate::config::{validate_config, validate_for_sample_rate, Config};
use crate::error::Result as TranscriptionResult;
use crate::spectral::{amplitude_to_db, cqt, CqtKernel, SpectralMatrix};

/// Compute the dB-scaled constant-Q matrix of `buffer`
///
/// Magnitudes are raised to `cqt.mag_exp` before the dB conversion, which
/// sharpens peaks at the cost of transient smearing. The result is relative
/// to the loudest cell, so every value is <= 0 dB. Silent or empty input
/// produces a uniform floor rather than an error.
pub fn run(buffer: &SampleBuffer, config: &Config) -> TranscriptionResult<SpectralMatrix> {
    log::info!("Pass 0: Constant-Q Transform");

    validate_config(config)?;
    validate_for_sample_rate(config, buffer.sr)?;

    let cqt_config = &config.cqt;
    let hop_length = cqt_config.hop_length();

    let kernel = CqtKernel::new(
        buffer.sr,
        cqt_config.fmin_hz,
        cqt_config.n_bins,
        cqt_config.bins_per_octave,
        cqt_config.filter_scale,
        cqt_config.sparsity,
    )?;
    log::debug!(
        "  Kernel: {} bins, fft_len {}, longest window {} samples",
        kernel.n_bins(),
        kernel.fft_len,
        kernel.lengths.first().copied().unwrap_or(0)
    );

    let spectrum = cqt(&buffer.samples, hop_length, &kernel, cqt_config.pad_mode);
    let magnitude = spectrum.map(|c| c.norm().powf(cqt_config.mag_exp));
    let db = amplitude_to_db(&magnitude, cqt_config.amin, cqt_config.top_db);

    let matrix = SpectralMatrix {
        db,
        freqs: kernel.freqs.clone(),
        sr: buffer.sr,
        hop_length,
        n_samples: buffer.n_samples(),
    };

    log::info!(
        "  ✓ {} bins x {} frames (hop {} samples)",
        matrix.n_bins(),
        matrix.n_frames(),
        hop_length
    );

    Ok(matrix)
}
