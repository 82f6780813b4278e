//! Component B: Band DSP. Three 4th-order Butterworth sections applied to the latest
//! chunk (not the full window), each producing a smoothed, gain-and-AutoGain-normalized
//! value in `[0, 1]`.

use crate::autogain::AutoGain;
use crate::biquad::FourthOrderFilter;
use crate::config::EngineConfig;

/// Per-band mutable state: filter memory, prior smoothed output, and an AutoGain tracker.
pub struct BandState {
    filter: FourthOrderFilter,
    autogain: AutoGain,
    prev_output: f32,
}

impl BandState {
    fn new(filter: FourthOrderFilter, cfg: &EngineConfig) -> Self {
        Self {
            filter,
            autogain: AutoGain::new(&cfg.autogain),
            prev_output: 0.0,
        }
    }

    /// Process one chunk for this band.
    ///
    /// `user_gain` and the attack/decay smoothing factors come from the live Parameters
    /// snapshot; `dt_secs` is the frame period.
    fn process(
        &mut self,
        chunk: &[f32],
        silence_threshold: f32,
        user_gain: f32,
        attack: f32,
        decay: f32,
        dt_secs: f32,
    ) -> f32 {
        let mut filtered = chunk.to_vec();
        self.filter.process(&mut filtered);

        let rms = (filtered.iter().map(|x| x * x).sum::<f32>() / filtered.len().max(1) as f32)
            .sqrt();

        let target = if rms < silence_threshold {
            0.0
        } else {
            let ceiling = self.autogain.update(rms, dt_secs);
            let normalized = (rms / ceiling).clamp(0.0, 1.0);
            (normalized * user_gain.max(0.0)).clamp(0.0, 1.0)
        };

        let out = if target >= self.prev_output {
            self.prev_output + attack.clamp(0.0, 1.0) * (target - self.prev_output)
        } else {
            self.prev_output + decay.clamp(0.0, 1.0) * (target - self.prev_output)
        };
        self.prev_output = out;
        out
    }
}

/// Live per-band tuning pulled from the Parameters snapshot for one frame.
#[derive(Debug, Clone, Copy)]
pub struct BandTuning {
    pub gain: f32,
    pub attack: f32,
    pub decay: f32,
}

/// The three-band filter bank, owning its own state across frames.
pub struct BandDsp {
    low: BandState,
    mid: BandState,
    high: BandState,
}

/// The three smoothed, normalized band outputs, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandOutputs {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl BandDsp {
    #[must_use]
    pub fn new(cfg: &EngineConfig) -> Self {
        let sr = cfg.sample_rate as f32;
        Self {
            low: BandState::new(FourthOrderFilter::lowpass(sr, cfg.band_cutoffs.low_hz), cfg),
            mid: BandState::new(
                FourthOrderFilter::bandpass(sr, cfg.band_cutoffs.low_hz, cfg.band_cutoffs.mid_hz),
                cfg,
            ),
            high: BandState::new(FourthOrderFilter::highpass(sr, cfg.band_cutoffs.mid_hz), cfg),
        }
    }

    /// Run one chunk through all three bands.
    pub fn process(
        &mut self,
        chunk: &[f32],
        silence_threshold: f32,
        low: BandTuning,
        mid: BandTuning,
        high: BandTuning,
        dt_secs: f32,
    ) -> BandOutputs {
        BandOutputs {
            low: self
                .low
                .process(chunk, silence_threshold, low.gain, low.attack, low.decay, dt_secs),
            mid: self
                .mid
                .process(chunk, silence_threshold, mid.gain, mid.attack, mid.decay, dt_secs),
            high: self.high.process(
                chunk,
                silence_threshold,
                high.gain,
                high.attack,
                high.decay,
                dt_secs,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning(gain: f32) -> BandTuning {
        BandTuning {
            gain,
            attack: 1.0,
            decay: 1.0,
        }
    }

    fn sine(sample_rate: f32, freq: f32, n: usize, amp: f32) -> Vec<f32> {
        (0..n)
            .map(|i| amp * (std::f32::consts::TAU * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn outputs_stay_in_unit_interval() {
        let cfg = EngineConfig::default();
        let mut dsp = BandDsp::new(&cfg);
        let chunk = sine(cfg.sample_rate as f32, 80.0, cfg.chunk_size, 0.9);
        for _ in 0..40 {
            let out = dsp.process(
                &chunk,
                cfg.silence_threshold,
                tuning(10.0),
                tuning(10.0),
                tuning(10.0),
                0.0213,
            );
            assert!((0.0..=1.0).contains(&out.low));
            assert!((0.0..=1.0).contains(&out.mid));
            assert!((0.0..=1.0).contains(&out.high));
        }
    }

    #[test]
    fn zero_gain_forces_zero_output() {
        let cfg = EngineConfig::default();
        let mut dsp = BandDsp::new(&cfg);
        let chunk = sine(cfg.sample_rate as f32, 80.0, cfg.chunk_size, 0.9);
        for _ in 0..20 {
            let out = dsp.process(
                &chunk,
                cfg.silence_threshold,
                tuning(0.0),
                tuning(10.0),
                tuning(10.0),
                0.0213,
            );
            assert_eq!(out.low, 0.0);
        }
    }

    #[test]
    fn silence_gate_emits_zero() {
        let cfg = EngineConfig::default();
        let mut dsp = BandDsp::new(&cfg);
        let silence = vec![0.0; cfg.chunk_size];
        let out = dsp.process(
            &silence,
            cfg.silence_threshold,
            tuning(20.0),
            tuning(20.0),
            tuning(20.0),
            0.0213,
        );
        assert_eq!(out, BandOutputs::default());
    }
}
