//! Validation tests for Pass 3: Tempo Estimation & Beat Tracking

use mono2midi::config::{Config, TempoConfig};
use mono2midi::passes::pass_3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SR: u32 = 22050;
const HOP: usize = 512;

/// Generate an onset envelope with a decaying pulse on every beat
fn generate_click_envelope(bpm: f32, duration_sec: f32, sr: u32, hop: usize) -> Vec<f32> {
    let frames_per_sec = sr as f32 / hop as f32;
    let n_frames = (duration_sec * frames_per_sec) as usize;
    let period = 60.0 * frames_per_sec / bpm;
    let mut envelope = vec![0.0; n_frames];

    let mut beat: f32 = 4.0;
    while (beat as usize) < n_frames {
        let start = beat.round() as usize;
        for (k, value) in [1.0, 0.5, 0.2].iter().enumerate() {
            if start + k < n_frames {
                envelope[start + k] += value;
            }
        }
        beat += period;
    }
    envelope
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_track_tempo() {
        let config = Config::default();
        for bpm in [100.0f32, 120.0, 140.0] {
            let envelope = generate_click_envelope(bpm, 20.0, SR, HOP);
            let tempo = pass_3::run(&envelope, SR, HOP, &config);

            assert!(!tempo.is_default);
            assert_eq!(tempo.bpm % 2, 0, "tempo must be even");
            assert!(
                (tempo.bpm as f32 - bpm).abs() <= 4.0,
                "expected about {} BPM, got {} (raw {:.2})",
                bpm,
                tempo.bpm,
                tempo.raw_bpm
            );
        }
    }

    #[test]
    fn test_silent_envelope_returns_prior() {
        let config = Config::default();
        let tempo = pass_3::run(&vec![0.0; 500], SR, HOP, &config);
        assert!(tempo.is_default);
        assert_eq!(tempo.bpm, 120);
        assert!(tempo.beat_frames.is_empty());

        let tempo = pass_3::run(&[], SR, HOP, &config);
        assert!(tempo.is_default);
        assert_eq!(tempo.bpm, 120);
    }

    #[test]
    fn test_prior_follows_config() {
        let mut config = Config::default();
        config.tempo.start_bpm = 90.0;
        let tempo = pass_3::run(&[0.0; 10], SR, HOP, &config);
        assert_eq!(tempo.bpm, 90);

        config.tempo.start_bpm = 91.0;
        let tempo = pass_3::run(&[0.0; 10], SR, HOP, &config);
        assert_eq!(tempo.bpm % 2, 0);
    }

    #[test]
    fn test_random_envelopes_give_even_tempo_in_range() {
        let mut rng = StdRng::seed_from_u64(1234);
        let tempo_config = TempoConfig::default();
        let config = Config::default();

        for _ in 0..20 {
            let n = rng.gen_range(2..800);
            let envelope: Vec<f32> = (0..n).map(|_| rng.gen_range(0.0..1.0)).collect();
            let tempo = pass_3::run(&envelope, SR, HOP, &config);

            assert_eq!(tempo.bpm % 2, 0);
            assert!(tempo.bpm as f32 >= tempo_config.min_bpm);
            assert!(tempo.bpm as f32 <= tempo_config.max_bpm);
        }
    }

    #[test]
    fn test_beats_are_evenly_spaced() {
        let config = Config::default();
        let envelope = generate_click_envelope(120.0, 20.0, SR, HOP);
        let tempo = pass_3::run(&envelope, SR, HOP, &config);

        assert!(tempo.beat_frames.len() > 30, "{} beats", tempo.beat_frames.len());
        assert_eq!(tempo.beat_frames.len(), tempo.beat_times.len());

        let period = 60.0 * SR as f32 / HOP as f32 / 120.0;
        for pair in tempo.beat_frames.windows(2) {
            let gap = (pair[1] - pair[0]) as f32;
            assert!(
                (gap - period).abs() <= 2.0,
                "beat gap {} vs period {:.2}",
                gap,
                period
            );
        }
    }

    #[test]
    fn test_even_rounding_and_clamping() {
        assert_eq!(pass_3::round_to_even_bpm(129.0, 20.0, 320.0), 130);
        assert_eq!(pass_3::round_to_even_bpm(128.9, 20.0, 320.0), 128);
        assert_eq!(pass_3::round_to_even_bpm(10.0, 20.0, 320.0), 20);
        assert_eq!(pass_3::round_to_even_bpm(500.0, 20.0, 319.0), 318);
    }
}
