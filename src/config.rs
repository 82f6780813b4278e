//! Immutable engine configuration.

use std::net::SocketAddr;

/// Band edges, in Hz, separating low/mid/high.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandCutoffs {
    pub low_hz: f32,
    pub mid_hz: f32,
}

impl Default for BandCutoffs {
    fn default() -> Self {
        Self {
            low_hz: 150.0,
            mid_hz: 4000.0,
        }
    }
}

/// Tuning for the AutoGain tracker shared by the band DSP and the note normalizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoGainConfig {
    /// Ring length, in frames, of recent maxima (≈ 15 s worth at the target frame rate).
    pub history_frames: usize,
    /// Percentile target `p` used as the soft ceiling.
    pub percentile: f32,
    /// Attack time constant, seconds.
    pub attack_secs: f32,
    /// Decay time constant, seconds.
    pub decay_secs: f32,
    /// Hard floor `ε`.
    pub floor: f32,
}

impl Default for AutoGainConfig {
    fn default() -> Self {
        Self {
            history_frames: 700, // ~15s at a 21.3ms frame period
            percentile: 0.90,
            attack_secs: 0.1,
            decay_secs: 15.0,
            floor: 1e-4,
        }
    }
}

/// Tuning for onset detection and tempo hedging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetConfig {
    /// Number of recent flux samples (≈ 1s) used for the adaptive threshold.
    pub flux_history_frames: usize,
    /// Standard-deviation multiplier `k` in `mean + k*stddev`.
    pub threshold_k: f32,
    /// Minimum time between declared onsets, seconds.
    pub refractory_secs: f32,
    /// Number of recent inter-onset intervals kept for the tempo histogram.
    pub interval_history: usize,
    /// Histogram bin width for interval-to-tempo inversion, seconds.
    pub histogram_bin_secs: f32,
    /// Inclusive BPM hedge range.
    pub bpm_min: f32,
    pub bpm_max: f32,
    /// Time constant of the single-pole tempo smoother, seconds.
    pub tempo_smooth_secs: f32,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            flux_history_frames: 47, // ~1s at 21.3ms
            threshold_k: 1.5,
            refractory_secs: 0.06,
            interval_history: 30,
            histogram_bin_secs: 0.005,
            bpm_min: 90.0,
            bpm_max: 180.0,
            tempo_smooth_secs: 2.0,
        }
    }
}

/// Top-level, immutable-after-construction engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub chunk_size: usize,
    /// Window chunk count `W`; the analysis window is `window_chunks * chunk_size` samples.
    pub window_chunks: usize,
    pub fft_size: usize,
    pub band_cutoffs: BandCutoffs,
    pub silence_threshold: f32,
    pub autogain: AutoGainConfig,
    pub onset: OnsetConfig,
    pub feature_endpoint: SocketAddr,
    pub parameter_endpoint: SocketAddr,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            chunk_size: 1024,
            window_chunks: 6,
            fft_size: 2048,
            band_cutoffs: BandCutoffs::default(),
            silence_threshold: 0.01, // ~ -40 dBFS amplitude
            autogain: AutoGainConfig::default(),
            onset: OnsetConfig::default(),
            feature_endpoint: "127.0.0.1:5005".parse().unwrap(),
            parameter_endpoint: "127.0.0.1:5006".parse().unwrap(),
        }
    }
}

impl EngineConfig {
    /// Length, in samples, of the rolling analysis window.
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.window_chunks * self.chunk_size
    }

    /// Nyquist frequency in Hz.
    #[must_use]
    pub fn nyquist(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }

    /// Validate the configuration. Returns `Err` describing the first violated constraint.
    ///
    /// # Errors
    /// Returns `crate::error::EngineError::Config` when the sample rate is non-positive,
    /// the FFT size isn't a power of two no smaller than the chunk size, or a band cutoff
    /// is not strictly between 0 Hz and the Nyquist frequency.
    pub fn validate(&self) -> Result<(), crate::error::EngineError> {
        use crate::error::EngineError;

        if self.sample_rate == 0 {
            return Err(EngineError::Config("sample_rate must be > 0".into()));
        }
        if self.chunk_size == 0 {
            return Err(EngineError::Config("chunk_size must be > 0".into()));
        }
        if !self.fft_size.is_power_of_two() || self.fft_size < self.chunk_size {
            return Err(EngineError::Config(
                "fft_size must be a power of two >= chunk_size".into(),
            ));
        }
        let nyquist = self.nyquist();
        if !(0.0 < self.band_cutoffs.low_hz && self.band_cutoffs.low_hz < self.band_cutoffs.mid_hz)
        {
            return Err(EngineError::Config(
                "band cutoffs must satisfy 0 < low < mid".into(),
            ));
        }
        if self.band_cutoffs.mid_hz >= nyquist {
            return Err(EngineError::Config(
                "mid band cutoff must be below the Nyquist frequency".into(),
            ));
        }
        Ok(())
    }
}
