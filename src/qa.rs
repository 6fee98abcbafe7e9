//! QA artifacts generation

use crate::analysis::{OnsetSegmentation, TempoEstimate};
use crate::config::ExportConfig;
use crate::passes::pass_1::ThresholdedMatrix;
use crate::spectral::note_to_hz;
use crate::TranscriptionError;
use plotters::prelude::*;
use std::fs;

/// Render the QA plots into `output_dir/qa`
pub fn generate_artifacts(
    thresholded: &ThresholdedMatrix,
    segmentation: &OnsetSegmentation,
    tempo: &TempoEstimate,
    output_dir: &std::path::Path,
    export: &ExportConfig,
) -> crate::TranscriptionResult<()> {
    let qa_dir = output_dir.join("qa");
    fs::create_dir_all(&qa_dir)?;

    log::info!("Generating QA artifacts...");

    generate_cqt_plot(thresholded, segmentation, &qa_dir, export)?;
    generate_envelope_plot(segmentation, tempo, thresholded, &qa_dir)?;

    log::info!("QA artifacts generated in {}", qa_dir.display());
    Ok(())
}

/// Bin range `[low, high]` covering the named notes
pub fn plot_bin_range(
    freqs: &[f32],
    bins_per_octave: usize,
    low_note: &str,
    high_note: &str,
) -> crate::TranscriptionResult<(usize, usize)> {
    let fmin = *freqs.first().ok_or_else(|| {
        TranscriptionError::QaGenerationError("spectral matrix has no bins".to_string())
    })?;
    let to_bin = |name: &str| -> crate::TranscriptionResult<usize> {
        let hz = note_to_hz(name).ok_or_else(|| {
            TranscriptionError::QaGenerationError(format!("Unknown note name: {}", name))
        })?;
        let bin = (bins_per_octave as f32 * (hz / fmin).log2()).round().max(0.0) as usize;
        Ok(bin.min(freqs.len() - 1))
    };

    let (low, high) = (to_bin(low_note)?, to_bin(high_note)?);
    Ok((low.min(high), low.max(high)))
}

/// Map a level in `[floor_db, 0]` onto a black-red-yellow-white ramp
fn heat_color(db: f32, floor_db: f32) -> RGBColor {
    let t = if floor_db < 0.0 {
        (1.0 - db / floor_db).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let channel = |x: f32| (x.clamp(0.0, 1.0) * 255.0) as u8;
    RGBColor(channel(3.0 * t), channel(3.0 * t - 1.0), channel(3.0 * t - 2.0))
}

/// Thresholded CQT heatmap with segment boundaries
fn generate_cqt_plot(
    thresholded: &ThresholdedMatrix,
    segmentation: &OnsetSegmentation,
    output_dir: &std::path::Path,
    export: &ExportConfig,
) -> crate::TranscriptionResult<()> {
    let matrix = thresholded.as_matrix();
    let bins_per_octave = infer_bins_per_octave(&matrix.freqs);
    let (low, high) = plot_bin_range(
        &matrix.freqs,
        bins_per_octave,
        &export.plot_note_range[0],
        &export.plot_note_range[1],
    )?;
    let n_frames = matrix.n_frames();

    let path = output_dir.join("cqt_thresholded.png");
    let root = BitMapBackend::new(&path, (1200, 800)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| {
        TranscriptionError::QaGenerationError(format!("Failed to fill plot background: {:?}", e))
    })?;

    let caption = format!(
        "Thresholded CQT ({:.0} dB), {} onsets",
        thresholded.threshold_db,
        segmentation.onset_frames.len()
    );
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 30))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0..n_frames, low..high + 1)
        .map_err(|e| {
            TranscriptionError::QaGenerationError(format!("Failed to build chart: {:?}", e))
        })?;

    chart
        .configure_mesh()
        .x_desc("Time (frames)")
        .y_desc("CQT bin")
        .draw()
        .map_err(|e| {
            TranscriptionError::QaGenerationError(format!("Failed to draw mesh: {:?}", e))
        })?;

    let floor_db = thresholded.floor_db;
    chart
        .draw_series((0..n_frames).flat_map(|t| {
            (low..=high).map(move |bin| {
                let color = heat_color(matrix.db[[bin, t]], floor_db);
                Rectangle::new([(t, bin), (t + 1, bin + 1)], color.filled())
            })
        }))
        .map_err(|e| {
            TranscriptionError::QaGenerationError(format!("Failed to draw heatmap: {:?}", e))
        })?;

    chart
        .draw_series(segmentation.boundaries.iter().map(|&frame| {
            PathElement::new(vec![(frame, low), (frame, high + 1)], CYAN.stroke_width(2))
        }))
        .map_err(|e| {
            TranscriptionError::QaGenerationError(format!("Failed to draw onsets: {:?}", e))
        })?;

    root.present().map_err(|e| {
        TranscriptionError::QaGenerationError(format!("Failed to write plot: {:?}", e))
    })?;
    Ok(())
}

/// Onset envelope over time with onsets and tracked beats
fn generate_envelope_plot(
    segmentation: &OnsetSegmentation,
    tempo: &TempoEstimate,
    thresholded: &ThresholdedMatrix,
    output_dir: &std::path::Path,
) -> crate::TranscriptionResult<()> {
    let matrix = thresholded.as_matrix();
    let path = output_dir.join("onset_envelope.png");
    let root = BitMapBackend::new(&path, (1200, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| {
        TranscriptionError::QaGenerationError(format!("Failed to fill plot background: {:?}", e))
    })?;

    let duration_sec = matrix.frame_to_time(matrix.n_frames()).max(1e-3) as f64;
    let max_strength = segmentation
        .envelope
        .iter()
        .copied()
        .fold(0.0f32, f32::max)
        .max(1e-3) as f64;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Onset Envelope ({} BPM)", tempo.bpm), ("sans-serif", 30))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(0.0f64..duration_sec, 0.0f64..max_strength * 1.05)
        .map_err(|e| {
            TranscriptionError::QaGenerationError(format!("Failed to build chart: {:?}", e))
        })?;

    chart
        .configure_mesh()
        .x_desc("Time (seconds)")
        .y_desc("Onset Strength")
        .draw()
        .map_err(|e| {
            TranscriptionError::QaGenerationError(format!("Failed to draw mesh: {:?}", e))
        })?;

    chart
        .draw_series(LineSeries::new(
            segmentation
                .envelope
                .iter()
                .enumerate()
                .map(|(t, &v)| (matrix.frame_to_time(t) as f64, v as f64)),
            &BLUE,
        ))
        .map_err(|e| {
            TranscriptionError::QaGenerationError(format!("Failed to draw envelope: {:?}", e))
        })?;

    chart
        .draw_series(segmentation.onset_frames.iter().map(|&frame| {
            let time = matrix.frame_to_time(frame) as f64;
            PathElement::new(vec![(time, 0.0), (time, max_strength)], RED.stroke_width(1))
        }))
        .map_err(|e| {
            TranscriptionError::QaGenerationError(format!("Failed to draw onsets: {:?}", e))
        })?;

    chart
        .draw_series(
            tempo
                .beat_times
                .iter()
                .map(|&time| Circle::new((time as f64, 0.0), 3, GREEN.filled())),
        )
        .map_err(|e| {
            TranscriptionError::QaGenerationError(format!("Failed to draw beats: {:?}", e))
        })?;

    root.present().map_err(|e| {
        TranscriptionError::QaGenerationError(format!("Failed to write plot: {:?}", e))
    })?;
    Ok(())
}

/// Bins per octave from the spacing of the first two bin frequencies
fn infer_bins_per_octave(freqs: &[f32]) -> usize {
    match freqs {
        [f0, f1, ..] if *f1 > *f0 && *f0 > 0.0 => (1.0 / (f1 / f0).log2()).round().max(1.0) as usize,
        _ => 12,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::C1_HZ;
    use crate::spectral::cqt_frequencies;

    #[test]
    fn test_default_plot_range() {
        let freqs = cqt_frequencies(72, C1_HZ, 12);
        // B2 is 23 semitones above C1, B6 is 71
        assert_eq!(plot_bin_range(&freqs, 12, "B2", "B6").unwrap(), (23, 71));
        assert_eq!(plot_bin_range(&freqs, 12, "B6", "B2").unwrap(), (23, 71));
        assert_eq!(plot_bin_range(&freqs, 12, "A0", "C9").unwrap(), (0, 71));
    }

    #[test]
    fn test_bad_note_name() {
        let freqs = cqt_frequencies(72, C1_HZ, 12);
        assert!(plot_bin_range(&freqs, 12, "H2", "B6").is_err());
        assert!(plot_bin_range(&[], 12, "B2", "B6").is_err());
    }

    #[test]
    fn test_heat_color_ramp() {
        assert_eq!(heat_color(-120.0, -120.0), RGBColor(0, 0, 0));
        assert_eq!(heat_color(0.0, -120.0), RGBColor(255, 255, 255));
        assert_eq!(infer_bins_per_octave(&cqt_frequencies(3, C1_HZ, 24)), 24);
    }
}
