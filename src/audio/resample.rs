//! Box-filter sample-rate conversion.
//!
//! Each output sample is the arithmetic mean of the input window that maps
//! onto it. No anti-alias filtering beyond the averaging itself — for
//! speech-bandwidth voice this trades a little fidelity for latency.
//! Chunks are converted independently; no filter state is carried across
//! chunk boundaries.

/// Resample `input` from `from` Hz to `to` Hz.
///
/// Produces `round(N * to / from)` samples. Output sample `i` averages the
/// input index range `[round(i * from / to), round((i + 1) * from / to))`.
/// When the window is degenerate (upsampling) the nearest single input
/// sample is used. Never reads past the input bounds; the last window may
/// cover fewer samples than a full one.
///
/// If `from == to` the input is returned unchanged.
pub fn resample(input: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to {
        return input.to_vec();
    }
    if input.is_empty() {
        return Vec::new();
    }

    let n = input.len();
    let ratio = from as f64 / to as f64;
    let output_len = (n as f64 / ratio).round() as usize;

    let mut output = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let mut start = ((i as f64 * ratio).round() as usize).min(n - 1);
        let mut end = (((i + 1) as f64 * ratio).round() as usize).min(n);
        if end <= start {
            // Degenerate window: duplicate the nearest sample.
            start = start.min(n - 1);
            end = start + 1;
        }
        let window = &input[start..end];
        let sum: f64 = window.iter().map(|&s| s as f64).sum();
        output.push((sum / window.len() as f64) as f32);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_returns_input_unchanged() {
        let samples = vec![0.1f32, -0.2, 0.3, -0.4, 0.5];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn identity_on_empty_input() {
        assert!(resample(&[], 48000, 16000).is_empty());
        assert!(resample(&[], 16000, 16000).is_empty());
    }

    #[test]
    fn output_length_48k_to_16k() {
        let input = vec![0.0f32; 4800];
        assert_eq!(resample(&input, 48000, 16000).len(), 1600);
    }

    #[test]
    fn output_length_44100_to_16k() {
        let input = vec![0.0f32; 44100];
        // round(44100 * 16000 / 44100) = 16000
        assert_eq!(resample(&input, 44100, 16000).len(), 16000);

        let input = vec![0.0f32; 441];
        // round(441 * 16000 / 44100) = round(160.0) = 160
        assert_eq!(resample(&input, 44100, 16000).len(), 160);
    }

    #[test]
    fn output_length_rounds_for_non_exact_ratio() {
        let input = vec![0.0f32; 1000];
        // 1000 * 16000 / 44100 = 362.8... -> 363
        assert_eq!(resample(&input, 44100, 16000).len(), 363);
    }

    #[test]
    fn downsample_averages_windows() {
        // 3:1 decimation, exact windows of three samples each.
        let input = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let output = resample(&input, 48000, 16000);
        assert_eq!(output.len(), 2);
        assert!((output[0] - 2.0).abs() < 1e-6);
        assert!((output[1] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn last_window_may_be_partial() {
        // 5 samples at 3:1 -> round(5/3) = 2 outputs; second window covers
        // indices [3, 5), only two samples.
        let input = vec![3.0f32, 3.0, 3.0, 6.0, 8.0];
        let output = resample(&input, 48000, 16000);
        assert_eq!(output.len(), 2);
        assert!((output[0] - 3.0).abs() < 1e-6);
        assert!((output[1] - 7.0).abs() < 1e-6);
    }

    #[test]
    fn upsample_duplicates_nearest_sample() {
        let input = vec![1.0f32, -1.0];
        let output = resample(&input, 8000, 16000);
        assert_eq!(output.len(), 4);
        // Every output sample comes from one of the two inputs.
        for s in &output {
            assert!((s.abs() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn preserves_dc_level() {
        let input = vec![0.25f32; 480];
        let output = resample(&input, 48000, 16000);
        assert_eq!(output.len(), 160);
        assert!(output.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn single_sample_input() {
        let output = resample(&[0.5f32], 48000, 16000);
        // round(1/3) = 0 samples — nothing to emit, nothing read out of bounds.
        assert!(output.is_empty());

        let output = resample(&[0.5f32], 16000, 48000);
        assert_eq!(output.len(), 3);
        assert!(output.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }
}
