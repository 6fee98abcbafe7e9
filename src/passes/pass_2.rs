//! Pass 2: Onset Detection & Segmentation

use crate::analysis::OnsetSegmentation;
use crate::config::{Config, OnsetConfig};
use crate::spectral::SpectralMatrix;
use ndarray::Array2;

/// Peak-picking windows expressed in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakPickParams {
    pub pre_max: usize,
    pub post_max: usize,
    pub pre_avg: usize,
    pub post_avg: usize,
    pub wait: usize,
}

impl PeakPickParams {
    /// Convert the second-based settings to frames at the matrix frame rate
    pub fn from_config(onset: &OnsetConfig, sr: u32, hop_length: usize) -> Self {
        let frames_per_sec = sr as f32 / hop_length as f32;
        PeakPickParams {
            pre_max: onset.pre_post_max,
            post_max: onset.pre_post_max,
            pre_avg: (onset.pre_avg_sec * frames_per_sec) as usize,
            post_avg: (onset.post_avg_sec * frames_per_sec) as usize,
            wait: (onset.wait_sec * frames_per_sec) as usize,
        }
    }
}

/// Mean positive spectral difference across frequency, one value per frame
pub fn onset_strength(db: &Array2<f32>, lag: usize) -> Vec<f32> {
    let (n_bins, n_frames) = (db.shape()[0], db.shape()[1]);
    let mut envelope = vec![0.0; n_frames];

    if n_bins == 0 || lag == 0 {
        return envelope;
    }

    for t in lag..n_frames {
        let mut rise = 0.0;
        for f in 0..n_bins {
            let diff = db[[f, t]] - db[[f, t - lag]];
            if diff > 0.0 {
                rise += diff;
            }
        }
        envelope[t] = rise / n_bins as f32;
    }

    envelope
}

/// Pick onset frames from an envelope
///
/// A frame qualifies when it is the maximum of its `[n - pre_max, n + post_max]`
/// neighbourhood, exceeds the local mean over `[n - pre_avg, n + post_avg]` by
/// `delta` (envelope normalised to [0, 1]), and lies more than `wait` frames
/// after the previous onset. The start and end of the signal both count as
/// boundaries already, so frames within `max(wait, 1) + 1` of either edge
/// never qualify; those frames are dominated by the edge padding. A flat
/// envelope has no onsets.
pub fn peak_pick(envelope: &[f32], params: &PeakPickParams, delta: f32) -> Vec<usize> {
    if envelope.is_empty() {
        return Vec::new();
    }

    let min = envelope.iter().copied().fold(f32::INFINITY, f32::min);
    let max = envelope.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !range.is_finite() || range < 1e-10 {
        return Vec::new();
    }

    let normalized: Vec<f32> = envelope.iter().map(|&x| (x - min) / range).collect();
    let n = normalized.len();
    let mut peaks = Vec::new();
    let edge_guard = params.wait.max(1) + 1;
    let mut next_allowed = edge_guard;
    let last_allowed = n.saturating_sub(edge_guard);

    for i in 0..last_allowed {
        let max_start = i.saturating_sub(params.pre_max);
        let max_end = (i + params.post_max + 1).min(n);
        let window_max = normalized[max_start..max_end]
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        if normalized[i] < window_max {
            continue;
        }

        let avg_start = i.saturating_sub(params.pre_avg);
        let avg_end = (i + params.post_avg + 1).min(n);
        let window = &normalized[avg_start..avg_end];
        let mean = window.iter().sum::<f32>() / window.len() as f32;
        if normalized[i] < mean + delta {
            continue;
        }

        if i < next_allowed {
            continue;
        }

        peaks.push(i);
        next_allowed = i + params.wait + 1;
    }

    peaks
}

/// Move each onset back to the latest local minimum of `energy` at or before it
pub fn backtrack(onsets: &[usize], energy: &[f32]) -> Vec<usize> {
    let minima: Vec<usize> = (1..energy.len().saturating_sub(1))
        .filter(|&i| energy[i] <= energy[i - 1] && energy[i] < energy[i + 1])
        .collect();

    let mut shifted: Vec<usize> = onsets
        .iter()
        .map(|&onset| {
            minima
                .iter()
                .rev()
                .find(|&&m| m <= onset)
                .copied()
                .unwrap_or(0)
        })
        .collect();

    shifted.sort_unstable();
    shifted.dedup();
    shifted
}

/// Bracket onsets with the start and end of the signal
///
/// The result is strictly increasing, starts at 0 and ends at `n_frames`.
pub fn build_boundaries(onsets: &[usize], n_frames: usize) -> Vec<usize> {
    let n_frames = n_frames.max(1);
    let mut boundaries = Vec::with_capacity(onsets.len() + 2);
    boundaries.push(0);
    let mut inner: Vec<usize> = onsets
        .iter()
        .copied()
        .filter(|&f| f > 0 && f < n_frames)
        .collect();
    inner.sort_unstable();
    inner.dedup();
    boundaries.extend(inner);
    boundaries.push(n_frames);
    boundaries
}

/// Segment `matrix` at its onsets
pub fn detect(
    matrix: &SpectralMatrix,
    onset: &OnsetConfig,
    pre_post_max: usize,
    use_backtrack: bool,
) -> OnsetSegmentation {
    let envelope = onset_strength(&matrix.db, onset.lag);

    let mut params = PeakPickParams::from_config(onset, matrix.sr, matrix.hop_length);
    params.pre_max = pre_post_max;
    params.post_max = pre_post_max;

    let mut onset_frames = peak_pick(&envelope, &params, onset.delta);
    if use_backtrack {
        onset_frames = backtrack(&onset_frames, &envelope);
    }

    let boundaries = build_boundaries(&onset_frames, matrix.n_frames());
    let times = boundaries
        .iter()
        .map(|&frame| matrix.frame_to_time(frame))
        .collect();

    OnsetSegmentation {
        boundaries,
        times,
        onset_frames,
        envelope,
    }
}

pub fn run(matrix: &SpectralMatrix, config: &Config) -> OnsetSegmentation {
    log::info!("Pass 2: Onset Detection & Segmentation");

    let segmentation = detect(
        matrix,
        &config.onset,
        config.onset.pre_post_max,
        config.onset.backtrack,
    );

    log::debug!("  Onset frames: {:?}", segmentation.onset_frames);
    log::info!(
        "  ✓ {} onsets, {} segments{}",
        segmentation.onset_frames.len(),
        segmentation.n_segments(),
        if config.onset.backtrack {
            " (backtracked)"
        } else {
            ""
        }
    );

    segmentation
}
