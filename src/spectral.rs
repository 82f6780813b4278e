//! Component C: Spectral Core. STFT over the rolling window, an HPSS approximation via
//! median filtering, 12-bin chroma folding, spectral centroid (brightness), and flux.

use std::collections::VecDeque;
use std::sync::Arc;

use rustfft::{num_complex::Complex32, Fft, FftPlanner};

const CHROMA_BINS: usize = 12;
const CHROMA_MIN_HZ: f32 = 80.0;
const CHROMA_MAX_HZ: f32 = 5_000.0;
const FREQ_MEDIAN_KERNEL: usize = 31;
const TIME_MEDIAN_HISTORY: usize = 3;
const MASK_EPSILON: f32 = 1e-6;
const FLUX_HISTORY: usize = 20;
const A4_HZ: f32 = 440.0;

/// One analysis frame's worth of spectral output, ready for the feature assembler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralOutput {
    /// Spectral centroid normalized to `[0, 1]` by the Nyquist frequency.
    pub brightness: f32,
    /// Scale-invariant percussive flux, sensitivity-scaled, clipped to `[0, 1]` for emission.
    pub flux_clipped: f32,
    /// The same flux before the `[0, 1]` clip, used by onset detection so a transient
    /// that would saturate the emitted value is not lost to the clip.
    pub flux_unclipped: f32,
    /// Raw summed harmonic energy per pitch class, `[C, C#, D, ... B]` with C anchored so that
    /// index 9 (A) lines up with 440 Hz (`round(12*log2(440/440)) mod 12 == 0`... see
    /// `pitch_class_for_hz`). Un-normalized; the feature assembler owns normalization by
    /// `norm_mode`.
    pub chroma: [f32; CHROMA_BINS],
}

/// Owns the FFT plan and the short history needed for the time-axis median filter.
pub struct SpectralCore {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    sample_rate: f32,
    window: Vec<f32>,
    scratch: Vec<Complex32>,
    magnitude_history: VecDeque<Vec<f32>>,
    prev_percussive: Option<Vec<f32>>,
    flux_history: VecDeque<f32>,
}

impl SpectralCore {
    #[must_use]
    pub fn new(fft_size: usize, sample_rate: f32) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(fft_size),
            fft_size,
            sample_rate,
            window: hann_window(fft_size),
            scratch: vec![Complex32::default(); fft_size],
            magnitude_history: VecDeque::with_capacity(TIME_MEDIAN_HISTORY),
            prev_percussive: None,
            flux_history: VecDeque::with_capacity(FLUX_HISTORY),
        }
    }

    /// Run the spectral chain over the current analysis window.
    ///
    /// `analysis_window` must hold at least `fft_size` samples; only the most recent
    /// `fft_size` are used (zero-padded implicitly if shorter, which should not happen once
    /// the window has filled).
    pub fn process(&mut self, analysis_window: &[f32], flux_sens: f32) -> SpectralOutput {
        let magnitude = self.compute_magnitude_spectrum(analysis_window);

        // 1. HPSS approximation.
        let harmonic = median_filter_1d(&magnitude, FREQ_MEDIAN_KERNEL);
        if self.magnitude_history.len() == TIME_MEDIAN_HISTORY {
            self.magnitude_history.pop_front();
        }
        self.magnitude_history.push_back(magnitude.clone());
        let percussive = median_across_history(&self.magnitude_history);

        let mut h = vec![0.0f32; magnitude.len()];
        let mut p = vec![0.0f32; magnitude.len()];
        for i in 0..magnitude.len() {
            let denom = harmonic[i] + percussive[i] + MASK_EPSILON;
            let h_mask = harmonic[i] / denom;
            let p_mask = percussive[i] / denom;
            h[i] = magnitude[i] * h_mask;
            p[i] = magnitude[i] * p_mask;
        }

        // 2. Chroma from H.
        let chroma = self.fold_chroma(&h);

        // 3. Centroid from full S.
        let brightness = self.spectral_centroid(&magnitude);

        // 4. Flux from P.
        let flux_raw: f32 = match &self.prev_percussive {
            Some(prev) => p
                .iter()
                .zip(prev.iter())
                .map(|(cur, prev)| (cur - prev).max(0.0))
                .sum(),
            None => 0.0,
        };
        self.prev_percussive = Some(p);

        if self.flux_history.len() == FLUX_HISTORY {
            self.flux_history.pop_front();
        }
        self.flux_history.push_back(flux_raw);
        let mean_flux =
            self.flux_history.iter().sum::<f32>() / self.flux_history.len().max(1) as f32;
        let scale_invariant = if mean_flux > MASK_EPSILON {
            flux_raw / mean_flux
        } else {
            0.0
        };
        let flux_unclipped = scale_invariant * flux_sens.max(0.0);

        SpectralOutput {
            brightness,
            flux_clipped: flux_unclipped.clamp(0.0, 1.0),
            flux_unclipped,
            chroma,
        }
    }

    fn compute_magnitude_spectrum(&mut self, analysis_window: &[f32]) -> Vec<f32> {
        let n = self.fft_size;
        let start = analysis_window.len().saturating_sub(n);
        let tail = &analysis_window[start..];

        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = tail.get(i).copied().unwrap_or(0.0);
            let windowed = sample * self.window.get(i).copied().unwrap_or(0.0);
            *slot = Complex32::new(windowed, 0.0);
        }
        self.fft.process(&mut self.scratch);

        self.scratch[..n / 2 + 1].iter().map(|c| c.norm()).collect()
    }

    fn fold_chroma(&self, harmonic: &[f32]) -> [f32; CHROMA_BINS] {
        let mut chroma = [0.0f32; CHROMA_BINS];
        let bin_hz = self.sample_rate / self.fft_size as f32;
        for (bin, &mag) in harmonic.iter().enumerate() {
            let hz = bin as f32 * bin_hz;
            if hz < CHROMA_MIN_HZ || hz > CHROMA_MAX_HZ {
                continue;
            }
            if let Some(class) = pitch_class_for_hz(hz) {
                chroma[class] += mag;
            }
        }
        chroma
    }

    fn spectral_centroid(&self, magnitude: &[f32]) -> f32 {
        let bin_hz = self.sample_rate / self.fft_size as f32;
        let weighted: f32 = magnitude
            .iter()
            .enumerate()
            .map(|(bin, &mag)| bin as f32 * bin_hz * mag)
            .sum();
        let total: f32 = magnitude.iter().sum();
        if total <= MASK_EPSILON {
            return 0.0;
        }
        let centroid_hz = weighted / total;
        let nyquist = self.sample_rate / 2.0;
        (centroid_hz / nyquist).clamp(0.0, 1.0)
    }
}

/// Maps a frequency to one of 12 pitch classes via `round(12*log2(f/440)) mod 12`, anchored
/// so that A4 itself falls in class 9 (standard chroma convention: C=0 ... A=9 ... B=11).
fn pitch_class_for_hz(hz: f32) -> Option<usize> {
    if hz <= 0.0 {
        return None;
    }
    let semitones_from_a4 = 12.0 * (hz / A4_HZ).log2();
    let class = (semitones_from_a4.round() as i64).rem_euclid(12) as usize;
    // semitones_from_a4 == 0 at A4; rotate so index 9 lines up with A.
    Some((class + 9) % CHROMA_BINS)
}

fn hann_window(n: usize) -> Vec<f32> {
    if n <= 1 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| {
            0.5 * (1.0
                - (std::f32::consts::TAU * i as f32 / (n - 1) as f32).cos())
        })
        .collect()
}

/// Median-filter `data` along its own axis with an odd-length `kernel`, edge-clamped.
fn median_filter_1d(data: &[f32], kernel: usize) -> Vec<f32> {
    let half = kernel / 2;
    let mut out = vec![0.0f32; data.len()];
    let mut window = Vec::with_capacity(kernel);
    for i in 0..data.len() {
        window.clear();
        let lo = i.saturating_sub(half);
        let hi = (i + half).min(data.len() - 1);
        window.extend_from_slice(&data[lo..=hi]);
        out[i] = median(&mut window);
    }
    out
}

/// Per-bin median across a short history of spectra (the time-axis component of the HPSS
/// approximation: percussive energy is what stays novel frame-to-frame across bins, harmonic
/// energy is what's stable).
fn median_across_history(history: &VecDeque<Vec<f32>>) -> Vec<f32> {
    if history.is_empty() {
        return Vec::new();
    }
    let n_bins = history[0].len();
    let mut out = vec![0.0f32; n_bins];
    let mut column = Vec::with_capacity(history.len());
    for bin in 0..n_bins {
        column.clear();
        column.extend(history.iter().map(|spectrum| spectrum[bin]));
        out[bin] = median(&mut column);
    }
    out
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(sample_rate: f32, freq: f32, n: usize, amp: f32) -> Vec<f32> {
        (0..n)
            .map(|i| amp * (std::f32::consts::TAU * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn a4_sine_activates_pitch_class_nine() {
        let sr = 48_000.0;
        let fft_size = 2048;
        let mut core = SpectralCore::new(fft_size, sr);
        let window = sine(sr, 440.0, fft_size * 4, 0.5);
        let mut out = core.process(&window, 1.0);
        for _ in 0..5 {
            out = core.process(&window, 1.0);
        }
        let loudest = out
            .chroma
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(loudest, 9, "chroma = {:?}", out.chroma);
    }

    #[test]
    fn brightness_stays_in_unit_interval() {
        let sr = 48_000.0;
        let mut core = SpectralCore::new(2048, sr);
        let window = sine(sr, 3000.0, 2048 * 4, 0.7);
        let out = core.process(&window, 1.0);
        assert!((0.0..=1.0).contains(&out.brightness));
    }

    #[test]
    fn silence_yields_zero_flux_and_brightness() {
        let sr = 48_000.0;
        let mut core = SpectralCore::new(2048, sr);
        let silence = vec![0.0f32; 2048 * 4];
        let out = core.process(&silence, 1.0);
        assert_eq!(out.brightness, 0.0);
        assert_eq!(out.flux_clipped, 0.0);
    }

    #[test]
    fn median_filter_removes_single_bin_spike() {
        let mut data = vec![1.0; 64];
        data[30] = 50.0;
        let filtered = median_filter_1d(&data, 5);
        assert!(filtered[30] < 2.0);
    }

    #[test]
    fn pitch_class_folds_octaves_together() {
        assert_eq!(pitch_class_for_hz(440.0), pitch_class_for_hz(880.0));
        assert_eq!(pitch_class_for_hz(440.0), Some(9));
    }
}
