//! Component D: Onset/Tempo tracker. Consumes the unclipped percussive flux stream,
//! declares onsets via an adaptive threshold with a refractory interval, and infers a hedged,
//! smoothed BPM from the resulting inter-onset-interval histogram.

use std::collections::VecDeque;

use crate::config::OnsetConfig;

/// Per-frame onset/tempo output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetOutput {
    pub is_beat: bool,
    /// `0.0` before the first onset is observed, otherwise in `[bpm_min, bpm_max]`.
    pub bpm: f32,
}

pub struct OnsetTracker {
    cfg: OnsetConfig,
    flux_history: VecDeque<f32>,
    time_since_last_onset: f32,
    has_onset: bool,
    intervals: VecDeque<f32>,
    smoothed_bpm: f32,
    elapsed: f32,
    last_onset_time: Option<f32>,
}

impl OnsetTracker {
    #[must_use]
    pub fn new(cfg: &OnsetConfig) -> Self {
        Self {
            cfg: *cfg,
            flux_history: VecDeque::with_capacity(cfg.flux_history_frames),
            time_since_last_onset: f32::MAX,
            has_onset: false,
            intervals: VecDeque::with_capacity(cfg.interval_history),
            smoothed_bpm: 0.0,
            elapsed: 0.0,
            last_onset_time: None,
        }
    }

    /// Advance the tracker by one frame. `flux_unclipped` is the pre-clip scale-invariant
    /// percussive flux from the spectral core; `dt_secs` is the frame period.
    pub fn update(&mut self, flux_unclipped: f32, dt_secs: f32) -> OnsetOutput {
        self.elapsed += dt_secs;
        self.time_since_last_onset += dt_secs;

        let (mean, stddev) = mean_stddev(&self.flux_history);
        let threshold = mean + self.cfg.threshold_k * stddev;

        let is_beat = flux_unclipped > threshold
            && self.time_since_last_onset >= self.cfg.refractory_secs;

        if self.flux_history.len() == self.cfg.flux_history_frames {
            self.flux_history.pop_front();
        }
        self.flux_history.push_back(flux_unclipped);

        if is_beat {
            self.time_since_last_onset = 0.0;
            if let Some(prev) = self.last_onset_time {
                let interval = self.elapsed - prev;
                if interval > 0.0 {
                    if self.intervals.len() == self.cfg.interval_history {
                        self.intervals.pop_front();
                    }
                    self.intervals.push_back(interval);
                }
            }
            self.last_onset_time = Some(self.elapsed);
            self.has_onset = true;
        }

        let bpm = if self.has_onset {
            let raw_bpm = self.estimate_bpm_from_intervals();
            let hedged = hedge_bpm(raw_bpm, self.cfg.bpm_min, self.cfg.bpm_max);
            let k = 1.0 - (-dt_secs / self.cfg.tempo_smooth_secs.max(1e-6)).exp();
            if self.smoothed_bpm <= 0.0 {
                self.smoothed_bpm = hedged;
            } else {
                self.smoothed_bpm += (hedged - self.smoothed_bpm) * k;
            }
            self.smoothed_bpm
        } else {
            0.0
        };

        OnsetOutput { is_beat, bpm }
    }

    /// Mode of the inter-onset-interval histogram, inverted to BPM. Falls back to the
    /// most recent interval when too few intervals have accumulated to form a histogram.
    fn estimate_bpm_from_intervals(&self) -> f32 {
        if self.intervals.is_empty() {
            return 0.0;
        }
        let bin_width = self.cfg.histogram_bin_secs.max(1e-6);
        let mut counts: std::collections::HashMap<i64, (u32, f32)> = std::collections::HashMap::new();
        for &interval in &self.intervals {
            let bin = (interval / bin_width).round() as i64;
            let entry = counts.entry(bin).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += interval;
        }
        let (_, (count, sum)) = counts
            .iter()
            .max_by_key(|(_, (count, _))| *count)
            .unwrap();
        let mode_interval = sum / *count as f32;
        if mode_interval <= 0.0 {
            return 0.0;
        }
        60.0 / mode_interval
    }
}

fn mean_stddev(history: &VecDeque<f32>) -> (f32, f32) {
    if history.is_empty() {
        return (0.0, 0.0);
    }
    let n = history.len() as f32;
    let mean = history.iter().sum::<f32>() / n;
    let variance = history.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n;
    (mean, variance.sqrt())
}

/// Double or halve `bpm` until it falls within `[min, max]`.
fn hedge_bpm(bpm: f32, min: f32, max: f32) -> f32 {
    if bpm <= 0.0 {
        return 0.0;
    }
    let mut hedged = bpm;
    let mut guard = 0;
    while hedged < min && guard < 16 {
        hedged *= 2.0;
        guard += 1;
    }
    while hedged > max && guard < 32 {
        hedged /= 2.0;
        guard += 1;
    }
    hedged.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_onset_before_threshold_exceeded() {
        let mut tracker = OnsetTracker::new(&OnsetConfig::default());
        for _ in 0..40 {
            let out = tracker.update(0.0, 0.0213);
            assert!(!out.is_beat);
            assert_eq!(out.bpm, 0.0);
        }
    }

    #[test]
    fn refractory_interval_suppresses_immediate_repeat() {
        let mut tracker = OnsetTracker::new(&OnsetConfig::default());
        for _ in 0..40 {
            tracker.update(0.01, 0.0213);
        }
        let first = tracker.update(5.0, 0.0213);
        assert!(first.is_beat);
        let second = tracker.update(5.0, 0.005);
        assert!(!second.is_beat, "refractory interval should suppress this");
    }

    #[test]
    fn steady_pulse_converges_near_expected_bpm() {
        let cfg = OnsetConfig::default();
        let mut tracker = OnsetTracker::new(&cfg);
        let dt = 0.0213;
        let period = 0.5; // 120 BPM
        let mut t = 0.0f32;
        let mut last_bpm = 0.0;
        for _ in 0..2000 {
            let phase = t % period;
            let flux = if phase < dt { 5.0 } else { 0.01 };
            let out = tracker.update(flux, dt);
            last_bpm = out.bpm;
            t += dt;
        }
        assert!(last_bpm > 0.0);
        assert!((last_bpm - 120.0).abs() < 20.0, "bpm = {}", last_bpm);
    }

    #[test]
    fn hedge_bpm_doubles_and_halves_into_range() {
        assert!((hedge_bpm(45.0, 90.0, 180.0) - 90.0).abs() < 1e-3);
        assert!((hedge_bpm(360.0, 90.0, 180.0) - 180.0).abs() < 1e-3);
        assert_eq!(hedge_bpm(0.0, 90.0, 180.0), 0.0);
    }
}
