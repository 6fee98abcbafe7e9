//! Pass 1: Spectral Thresholding

use crate::config::Config;
use crate::spectral::SpectralMatrix;

/// A spectral matrix whose quiet cells have been clamped to a silence floor
///
/// Kept as its own type so it can drive onset detection and plots but can
/// never be handed to pitch estimation, which needs the raw levels.
#[derive(Debug, Clone)]
pub struct ThresholdedMatrix {
    matrix: SpectralMatrix,
    pub threshold_db: f32,
    pub floor_db: f32,
}

impl ThresholdedMatrix {
    pub fn as_matrix(&self) -> &SpectralMatrix {
        &self.matrix
    }

    pub fn into_matrix(self) -> SpectralMatrix {
        self.matrix
    }
}

/// Clamp every cell below `threshold_db` to `floor_db`
pub fn threshold(matrix: &SpectralMatrix, threshold_db: f32, floor_db: f32) -> ThresholdedMatrix {
    let db = matrix
        .db
        .map(|&x| if x < threshold_db { floor_db } else { x });

    ThresholdedMatrix {
        matrix: matrix.with_values(db),
        threshold_db,
        floor_db,
    }
}

pub fn run(matrix: &SpectralMatrix, config: &Config) -> ThresholdedMatrix {
    log::info!("Pass 1: Spectral Thresholding");

    let thresholded = threshold(
        matrix,
        config.threshold.cqt_threshold_db,
        config.threshold.silence_floor_db,
    );

    let suppressed = thresholded
        .as_matrix()
        .db
        .iter()
        .zip(matrix.db.iter())
        .filter(|(new, old)| new != old)
        .count();
    log::info!(
        "  ✓ {} of {} cells below {:.1} dB set to {:.1} dB",
        suppressed,
        matrix.db.len(),
        thresholded.threshold_db,
        thresholded.floor_db
    );

    thresholded
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn matrix(values: Vec<f32>, shape: (usize, usize)) -> SpectralMatrix {
        SpectralMatrix {
            db: Array2::from_shape_vec(shape, values).unwrap(),
            freqs: vec![100.0; shape.0],
            sr: 8000,
            hop_length: 256,
            n_samples: shape.1 * 256,
        }
    }

    #[test]
    fn test_cells_below_threshold_are_floored() {
        let m = matrix(vec![0.0, -10.0, -59.9, -60.0, -60.1, -80.0], (2, 3));
        let t = threshold(&m, -60.0, -120.0);
        let values: Vec<f32> = t.as_matrix().db.iter().copied().collect();
        assert_eq!(values, vec![0.0, -10.0, -59.9, -60.0, -120.0, -120.0]);
    }

    #[test]
    fn test_input_is_untouched() {
        let m = matrix(vec![-70.0, 0.0], (1, 2));
        let _ = threshold(&m, -60.0, -120.0);
        assert_eq!(m.db[[0, 0]], -70.0);
    }
}
