//! Spectral processing utilities (constant-Q kernels, dB scaling, pitch helpers)

use crate::config::PadMode;
use crate::error::{Result as TranscriptionResult, TranscriptionError};
use ndarray::Array2;
use rustfft::{num_complex::Complex32, FftPlanner};

/// Time-frequency magnitude matrix on a log-spaced (semitone) axis, in dB
/// relative to the loudest cell of the clip
#[derive(Debug, Clone)]
pub struct SpectralMatrix {
    /// Decibel values, shape (n_bins, n_frames)
    pub db: Array2<f32>,
    /// Centre frequency of each bin in Hz
    pub freqs: Vec<f32>,
    pub sr: u32,
    pub hop_length: usize,
    /// Number of samples the matrix was computed from
    pub n_samples: usize,
}

impl SpectralMatrix {
    pub fn n_bins(&self) -> usize {
        self.db.shape()[0]
    }

    pub fn n_frames(&self) -> usize {
        self.db.shape()[1]
    }

    pub fn min_db(&self) -> f32 {
        self.db.iter().copied().fold(f32::INFINITY, f32::min)
    }

    pub fn max_db(&self) -> f32 {
        self.db.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn frame_to_time(&self, frame: usize) -> f32 {
        frames_to_time(frame, self.sr, self.hop_length)
    }

    pub fn frame_to_sample(&self, frame: usize) -> usize {
        frame * self.hop_length
    }

    /// Same geometry, different cell values
    pub fn with_values(&self, db: Array2<f32>) -> Self {
        SpectralMatrix {
            db,
            freqs: self.freqs.clone(),
            sr: self.sr,
            hop_length: self.hop_length,
            n_samples: self.n_samples,
        }
    }
}

/// Precomputed constant-Q filter bank in the frequency domain
#[derive(Debug, Clone)]
pub struct CqtKernel {
    pub fft_len: usize,
    pub freqs: Vec<f32>,
    /// Time-domain window length per bin
    pub lengths: Vec<usize>,
    /// Sparse conjugated spectral kernels, one per bin
    bins: Vec<Vec<(usize, Complex32)>>,
}

impl CqtKernel {
    /// Build the kernel bank (Brown & Puckette, 1992)
    pub fn new(
        sr: u32,
        fmin_hz: f32,
        n_bins: usize,
        bins_per_octave: usize,
        filter_scale: f32,
        sparsity: f32,
    ) -> TranscriptionResult<Self> {
        if n_bins == 0 || bins_per_octave == 0 {
            return Err(TranscriptionError::SpectralProcessingError(
                "constant-Q kernel needs at least one bin".to_string(),
            ));
        }

        let freqs = cqt_frequencies(n_bins, fmin_hz, bins_per_octave);
        let nyquist = sr as f32 / 2.0;
        if let Some(&f_max) = freqs.last() {
            if f_max >= nyquist {
                return Err(TranscriptionError::SpectralProcessingError(format!(
                    "highest bin {:.1} Hz is above Nyquist {:.1} Hz",
                    f_max, nyquist
                )));
            }
        }

        let q = filter_scale / (2.0f32.powf(1.0 / bins_per_octave as f32) - 1.0);
        let lengths: Vec<usize> = freqs
            .iter()
            .map(|&f| ((q * sr as f32 / f).ceil() as usize).max(1))
            .collect();
        let max_len = lengths.iter().copied().max().unwrap_or(1);
        let fft_len = max_len.next_power_of_two();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_len);
        let mut bins = Vec::with_capacity(n_bins);

        for (&freq, &n_k) in freqs.iter().zip(&lengths) {
            let mut buffer = vec![Complex32::new(0.0, 0.0); fft_len];
            let start = (fft_len - n_k) / 2;
            let centre = n_k as f32 / 2.0;

            for n in 0..n_k {
                // Hann window scaled by 1 / sqrt(n_k)
                let window = hann(n, n_k) / (n_k as f32).sqrt();
                let phase = 2.0 * std::f32::consts::PI * freq * (n as f32 - centre) / sr as f32;
                buffer[start + n] = Complex32::from_polar(window, phase);
            }

            fft.process(&mut buffer);

            let peak = buffer.iter().map(|c| c.norm()).fold(0.0f32, f32::max);
            let cutoff = peak * sparsity;
            let scale = 1.0 / fft_len as f32;
            let sparse: Vec<(usize, Complex32)> = buffer
                .iter()
                .enumerate()
                .filter(|(_, c)| c.norm() >= cutoff && c.norm() > 0.0)
                .map(|(j, c)| (j, c.conj() * scale))
                .collect();
            bins.push(sparse);
        }

        Ok(CqtKernel {
            fft_len,
            freqs,
            lengths,
            bins,
        })
    }

    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }
}

/// Symmetric-offset Hann window value that stays nonzero for tiny windows
fn hann(n: usize, size: usize) -> f32 {
    0.5 - 0.5 * (2.0 * std::f32::consts::PI * (n as f32 + 0.5) / size as f32).cos()
}

/// Number of frames for `n_samples` at the given hop; never zero
pub fn frame_count(n_samples: usize, hop_length: usize) -> usize {
    n_samples.div_ceil(hop_length).max(1)
}

/// Compute the complex constant-Q transform, frames centred at `t * hop_length`
pub fn cqt(
    y: &[f32],
    hop_length: usize,
    kernel: &CqtKernel,
    pad_mode: PadMode,
) -> Array2<Complex32> {
    let n_frames = frame_count(y.len(), hop_length);
    let fft_len = kernel.fft_len;
    let half = (fft_len / 2) as isize;

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_len);
    let mut out = Array2::<Complex32>::zeros((kernel.n_bins(), n_frames));
    let mut frame = vec![Complex32::new(0.0, 0.0); fft_len];

    for t in 0..n_frames {
        let centre = (t * hop_length) as isize;
        for (n, slot) in frame.iter_mut().enumerate() {
            let idx = centre + n as isize - half;
            *slot = Complex32::new(padded_sample(y, idx, pad_mode), 0.0);
        }

        fft.process(&mut frame);

        for (k, sparse) in kernel.bins.iter().enumerate() {
            let mut acc = Complex32::new(0.0, 0.0);
            for &(j, coeff) in sparse {
                acc += frame[j] * coeff;
            }
            out[[k, t]] = acc;
        }
    }

    out
}

/// Read `y[idx]`, padding outside the signal
fn padded_sample(y: &[f32], idx: isize, pad_mode: PadMode) -> f32 {
    let len = y.len() as isize;
    if (0..len).contains(&idx) {
        return y[idx as usize];
    }
    match pad_mode {
        PadMode::Constant => 0.0,
        PadMode::Reflect => {
            if len < 2 {
                return y.first().copied().unwrap_or(0.0);
            }
            let period = 2 * (len - 1);
            let m = idx.rem_euclid(period);
            let m = if m >= len { period - m } else { m };
            y[m as usize]
        }
    }
}

/// Log-spaced bin centre frequencies
pub fn cqt_frequencies(n_bins: usize, fmin_hz: f32, bins_per_octave: usize) -> Vec<f32> {
    (0..n_bins)
        .map(|k| fmin_hz * 2.0f32.powf(k as f32 / bins_per_octave as f32))
        .collect()
}

/// Convert an amplitude matrix to dB relative to its maximum
///
/// Values are clipped to `max - top_db` when `top_db` is set. A matrix whose
/// maximum is below `amin` carries no signal and becomes a uniform floor.
pub fn amplitude_to_db(s: &Array2<f32>, amin: f32, top_db: Option<f32>) -> Array2<f32> {
    let reference = s.iter().copied().fold(0.0f32, f32::max);

    if reference < amin {
        let floor = match top_db {
            Some(range) => -range,
            None => 20.0 * amin.log10(),
        };
        return Array2::from_elem(s.raw_dim(), floor);
    }

    let ref_db = 20.0 * reference.log10();
    let mut db = s.map(|&x| (20.0 * x.max(amin).log10() - ref_db).min(0.0));

    if let Some(range) = top_db {
        db.mapv_inplace(|x| x.max(-range));
    }

    db
}

pub fn frames_to_time(frame: usize, sr: u32, hop_length: usize) -> f32 {
    frame as f32 * hop_length as f32 / sr as f32
}

/// Fractional MIDI note number of a frequency
pub fn hz_to_midi(freq_hz: f32) -> f32 {
    69.0 + 12.0 * (freq_hz / 440.0).log2()
}

pub fn midi_to_hz(note: f32) -> f32 {
    440.0 * 2.0f32.powf((note - 69.0) / 12.0)
}

/// Parse a note name such as "A4", "C#3" or "Bb-1" into a frequency
pub fn note_to_hz(name: &str) -> Option<f32> {
    let mut chars = name.trim().chars().peekable();
    let letter = chars.next()?.to_ascii_uppercase();
    let pitch_class = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let mut offset = 0i32;
    while let Some(&c) = chars.peek() {
        match c {
            '#' | '♯' => offset += 1,
            'b' | '♭' => offset -= 1,
            _ => break,
        }
        chars.next();
    }

    let octave: i32 = chars.collect::<String>().parse().ok()?;
    let midi = (octave + 1) * 12 + pitch_class + offset;
    Some(midi_to_hz(midi as f32))
}
