//! Pass 3: Tempo Estimation & Beat Tracking
//!
//! Tempo comes from the autocorrelation of the onset envelope, weighted by a
//! log-normal prior around `tempo.start_bpm`. The beat tracker is the dynamic
//! programming method of Ellis (2007): it rewards frames with strong onsets and
//! penalises inter-beat intervals that stray from the tempo period, with
//! `tempo.tightness` scaling the penalty.

use crate::analysis::TempoEstimate;
use crate::config::{Config, TempoConfig};
use crate::spectral::frames_to_time;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

const EPSILON: f32 = 1e-10;

/// Autocorrelation of `signal` via FFT, non-negative lags only
fn compute_autocorrelation_fft(signal: &[f32]) -> Vec<f32> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }

    let fft_size = (2 * n).next_power_of_two();
    let mut buffer: Vec<Complex<f32>> = signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
    buffer.resize(fft_size, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    fft.process(&mut buffer);

    for x in &mut buffer {
        *x = *x * x.conj();
    }

    let ifft = planner.plan_fft_inverse(fft_size);
    ifft.process(&mut buffer);

    let scale = 1.0 / fft_size as f32;
    buffer[..n].iter().map(|x| (x.re * scale).max(0.0)).collect()
}

/// Log-normal tempo prior, in log space
fn tempo_prior(bpm: f32, start_bpm: f32, std_bpm: f32) -> f32 {
    -0.5 * ((bpm.log2() - start_bpm.log2()) / std_bpm).powi(2)
}

/// Estimate a tempo from the onset envelope
///
/// Returns the raw BPM and whether the prior fallback was used.
pub fn estimate_tempo(
    envelope: &[f32],
    sr: u32,
    hop_length: usize,
    tempo: &TempoConfig,
) -> (f32, bool) {
    let frames_per_sec = sr as f32 / hop_length as f32;
    let peak = envelope.iter().copied().fold(0.0f32, f32::max);

    if envelope.len() < 2 || peak < EPSILON {
        return (tempo.start_bpm, true);
    }

    let acf = compute_autocorrelation_fft(envelope);
    if acf[0] < EPSILON {
        return (tempo.start_bpm, true);
    }

    let max_lag = ((tempo.ac_size_sec * frames_per_sec) as usize).min(acf.len() - 1);
    let lag_min = ((60.0 * frames_per_sec / tempo.max_bpm).ceil() as usize).max(1);
    let lag_max = ((60.0 * frames_per_sec / tempo.min_bpm).floor() as usize).min(max_lag);

    if lag_min > lag_max {
        log::debug!(
            "  Envelope too short for lag range [{}, {}], using prior",
            lag_min,
            lag_max
        );
        return (tempo.start_bpm, true);
    }

    let mut best: Option<(f32, f32)> = None;
    for lag in lag_min..=lag_max {
        let bpm = 60.0 * frames_per_sec / lag as f32;
        let strength = (1.0 + 1e6 * acf[lag] / acf[0]).ln();
        let score = strength + tempo_prior(bpm, tempo.start_bpm, tempo.std_bpm);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((bpm, score));
        }
    }

    match best {
        Some((bpm, _)) => (bpm, false),
        None => (tempo.start_bpm, true),
    }
}

/// Round to the nearest even integer inside the configured range
pub fn round_to_even_bpm(bpm: f32, min_bpm: f32, max_bpm: f32) -> u32 {
    let lowest = 2.0 * (min_bpm / 2.0).ceil();
    let highest = 2.0 * (max_bpm / 2.0).floor();
    let even = 2.0 * (bpm / 2.0).round();
    let even = if even.is_finite() { even } else { lowest };
    even.clamp(lowest, highest) as u32
}

/// Dynamic-programming beat tracker, returns beat frames in order
pub fn track_beats(
    envelope: &[f32],
    bpm: f32,
    sr: u32,
    hop_length: usize,
    tightness: f32,
    trim: bool,
) -> Vec<usize> {
    let n = envelope.len();
    let frames_per_sec = sr as f32 / hop_length as f32;
    let period = 60.0 * frames_per_sec / bpm;

    if n < 2 || !period.is_finite() || period < 1.0 {
        return Vec::new();
    }

    let mean = envelope.iter().sum::<f32>() / n as f32;
    let std = (envelope.iter().map(|&x| (x - mean).powi(2)).sum::<f32>() / (n - 1) as f32).sqrt();
    if std < EPSILON {
        return Vec::new();
    }
    let onset: Vec<f32> = envelope.iter().map(|&x| x / std).collect();

    // Smooth with a Gaussian about one period wide
    let half_width = period.round() as isize;
    let window: Vec<f32> = (-half_width..=half_width)
        .map(|k| (-0.5 * (k as f32 * 32.0 / period).powi(2)).exp())
        .collect();
    let local_score: Vec<f32> = (0..n as isize)
        .map(|i| {
            window
                .iter()
                .enumerate()
                .filter_map(|(w, &weight)| {
                    let j = i + w as isize - half_width;
                    (0..n as isize)
                        .contains(&j)
                        .then(|| onset[j as usize] * weight)
                })
                .sum()
        })
        .collect();

    let mut cumscore = vec![0.0f32; n];
    let mut backlink: Vec<Option<usize>> = vec![None; n];
    let search_far = (2.0 * period).round() as usize;
    let search_near = (period / 2.0).round() as usize;

    for i in 0..n {
        let mut best: Option<(usize, f32)> = None;
        if i >= search_near {
            let lo = i.saturating_sub(search_far);
            let hi = i - search_near;
            for j in lo..=hi {
                let interval = (i - j) as f32 / period;
                if interval <= 0.0 {
                    continue;
                }
                let score = cumscore[j] - tightness * interval.ln().powi(2);
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((j, score));
                }
            }
        }
        match best {
            Some((j, score)) => {
                cumscore[i] = local_score[i] + score;
                backlink[i] = Some(j);
            }
            None => cumscore[i] = local_score[i],
        }
    }

    // Last beat: the latest local maximum of the cumulative score that is
    // at least half the median of all local maxima
    let maxima: Vec<usize> = (0..n)
        .filter(|&i| {
            let left = i == 0 || cumscore[i] > cumscore[i - 1];
            let right = i == n - 1 || cumscore[i] >= cumscore[i + 1];
            left && right
        })
        .collect();
    if maxima.is_empty() {
        return Vec::new();
    }
    let mut maxima_values: Vec<f32> = maxima.iter().map(|&i| cumscore[i]).collect();
    maxima_values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = maxima_values[maxima_values.len() / 2];
    let last = maxima
        .iter()
        .rev()
        .find(|&&i| cumscore[i] >= 0.5 * median)
        .copied()
        .unwrap_or(maxima[maxima.len() - 1]);

    let mut beats = vec![last];
    let mut cursor = last;
    while let Some(previous) = backlink[cursor] {
        beats.push(previous);
        cursor = previous;
    }
    beats.reverse();

    if trim {
        trim_weak_beats(&mut beats, &local_score);
    }

    beats
}

/// Drop leading and trailing beats with weak onset support
fn trim_weak_beats(beats: &mut Vec<usize>, local_score: &[f32]) {
    if beats.is_empty() {
        return;
    }
    let rms = (beats.iter().map(|&b| local_score[b].powi(2)).sum::<f32>() / beats.len() as f32)
        .sqrt();
    let threshold = 0.5 * rms;

    while beats.last().is_some_and(|&b| local_score[b] <= threshold) {
        beats.pop();
    }
    let leading = beats
        .iter()
        .take_while(|&&b| local_score[b] <= threshold)
        .count();
    beats.drain(..leading);
}

pub fn run(envelope: &[f32], sr: u32, hop_length: usize, config: &Config) -> TempoEstimate {
    log::info!("Pass 3: Tempo Estimation & Beat Tracking");

    let tempo = &config.tempo;
    let (raw_bpm, is_default) = estimate_tempo(envelope, sr, hop_length, tempo);
    let bpm = round_to_even_bpm(raw_bpm, tempo.min_bpm, tempo.max_bpm);

    if is_default {
        log::warn!(
            "  Onset envelope is degenerate, falling back to {} BPM",
            bpm
        );
    }

    let beat_frames = if is_default {
        Vec::new()
    } else {
        track_beats(
            envelope,
            bpm as f32,
            sr,
            hop_length,
            tempo.tightness,
            tempo.trim,
        )
    };
    let beat_times = beat_frames
        .iter()
        .map(|&f| frames_to_time(f, sr, hop_length))
        .collect();

    log::info!(
        "  ✓ Tempo {} BPM (raw {:.2}), {} beats tracked",
        bpm,
        raw_bpm,
        beat_frames.len()
    );

    TempoEstimate {
        bpm,
        raw_bpm,
        beat_frames,
        beat_times,
        is_default,
    }
}
