//! Pass 4: Per-Segment Pitch Estimation
//!
//! Operates on the raw (un-thresholded) spectral matrix. Two statistics are
//! taken per segment: the per-bin mean over frames decides voiced vs.
//! unvoiced and picks the dominant bin, while the mean of per-frame peaks
//! carries the loudness used for velocity and amplitude.

use crate::analysis::{OnsetSegmentation, PitchEstimate};
use crate::config::Config;
use crate::spectral::SpectralMatrix;
use ndarray::{s, Axis};

/// Estimate the pitch of frames `[start, end)`
pub fn estimate_pitch(
    matrix: &SpectralMatrix,
    start: usize,
    end: usize,
    silence_threshold_db: f32,
) -> PitchEstimate {
    let end = end.min(matrix.n_frames());
    if start >= end || matrix.n_bins() == 0 {
        return PitchEstimate::Unvoiced {
            energy_db: matrix.min_db(),
        };
    }

    let segment = matrix.db.slice(s![.., start..end]);

    // Loudness: mean over frames of each frame's peak bin
    let frame_peaks = segment.fold_axis(Axis(0), f32::NEG_INFINITY, |&acc, &x| acc.max(x));
    let energy_db = frame_peaks.mean().unwrap_or(matrix.min_db());

    // Voicing: peak of the per-bin mean spectrum
    let Some(bin_means) = segment.mean_axis(Axis(1)) else {
        return PitchEstimate::Unvoiced { energy_db };
    };
    let (bin, peak) = bin_means
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        });

    if peak < silence_threshold_db {
        PitchEstimate::Unvoiced { energy_db }
    } else {
        PitchEstimate::Voiced {
            frequency_hz: matrix.freqs[bin],
            bin,
            energy_db,
        }
    }
}

/// Estimate the pitch of segment `index`, `None` when it does not exist
pub fn estimate_segment(
    matrix: &SpectralMatrix,
    segmentation: &OnsetSegmentation,
    index: usize,
    silence_threshold_db: f32,
) -> Option<PitchEstimate> {
    let (start, end) = segmentation.segment(index)?;
    Some(estimate_pitch(matrix, start, end, silence_threshold_db))
}

/// One estimate per segment, in temporal order
pub fn estimate_all(
    matrix: &SpectralMatrix,
    segmentation: &OnsetSegmentation,
    silence_threshold_db: f32,
) -> Vec<PitchEstimate> {
    segmentation
        .segments()
        .map(|(start, end)| estimate_pitch(matrix, start, end, silence_threshold_db))
        .collect()
}

pub fn run(
    matrix: &SpectralMatrix,
    segmentation: &OnsetSegmentation,
    config: &Config,
) -> Vec<PitchEstimate> {
    log::info!("Pass 4: Per-Segment Pitch Estimation");

    let pitches = estimate_all(matrix, segmentation, config.pitch.silence_threshold_db);

    for (i, pitch) in pitches.iter().enumerate() {
        match pitch {
            PitchEstimate::Voiced {
                frequency_hz,
                bin,
                energy_db,
            } => log::debug!(
                "  Segment {}: {:.2} Hz (bin {}), {:.1} dB",
                i,
                frequency_hz,
                bin,
                energy_db
            ),
            PitchEstimate::Unvoiced { energy_db } => {
                log::debug!("  Segment {}: unvoiced, {:.1} dB", i, energy_db)
            }
        }
    }

    let voiced = pitches.iter().filter(|p| p.is_voiced()).count();
    log::info!(
        "  ✓ {} voiced, {} unvoiced",
        voiced,
        pitches.len() - voiced
    );

    pitches
}
