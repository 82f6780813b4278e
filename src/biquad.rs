//! Biquad filter sections used to build the 4th-order Butterworth band filters.
//!
//! RBJ cookbook coefficient design, cascaded Direct-Form-II-transposed sections. A 4th-order
//! Butterworth response is built from two 2nd-order sections at the Q values that give a
//! maximally-flat cascade (0.54119610 and 1.30656296).

const BUTTERWORTH_4TH_ORDER_QS: [f32; 2] = [0.541_196_1, 1.306_562_9];

#[derive(Debug, Clone, Copy, Default)]
struct BiquadCoeffs {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

/// A single Direct-Form-II-transposed biquad section: coefficients plus the two state
/// registers that carry memory between calls.
#[derive(Debug, Clone, Copy, Default)]
struct BiquadSection {
    c: BiquadCoeffs,
    z1: f32,
    z2: f32,
}

impl BiquadSection {
    fn lowpass(sample_rate: f32, cutoff_hz: f32, q: f32) -> Self {
        let w0 = std::f32::consts::TAU * (cutoff_hz / sample_rate).min(0.499);
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        let b2 = b0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self {
            c: BiquadCoeffs {
                b0: b0 / a0,
                b1: b1 / a0,
                b2: b2 / a0,
                a1: a1 / a0,
                a2: a2 / a0,
            },
            z1: 0.0,
            z2: 0.0,
        }
    }

    fn highpass(sample_rate: f32, cutoff_hz: f32, q: f32) -> Self {
        let w0 = std::f32::consts::TAU * (cutoff_hz / sample_rate).min(0.499);
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = (1.0 + cos_w0) / 2.0;
        let b1 = -(1.0 + cos_w0);
        let b2 = b0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self {
            c: BiquadCoeffs {
                b0: b0 / a0,
                b1: b1 / a0,
                b2: b2 / a0,
                a1: a1 / a0,
                a2: a2 / a0,
            },
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        let y = self.c.b0 * x + self.z1;
        self.z1 = self.c.b1 * x - self.c.a1 * y + self.z2;
        self.z2 = self.c.b2 * x - self.c.a2 * y;
        y
    }
}

/// A 4th-order Butterworth-style filter, built as a cascade of two biquad sections.
/// Filter memory carries between chunks.
#[derive(Debug, Clone)]
pub struct FourthOrderFilter {
    stages: Vec<BiquadSection>,
}

impl FourthOrderFilter {
    /// Lowpass at `cutoff_hz`.
    #[must_use]
    pub fn lowpass(sample_rate: f32, cutoff_hz: f32) -> Self {
        Self {
            stages: BUTTERWORTH_4TH_ORDER_QS
                .iter()
                .map(|&q| BiquadSection::lowpass(sample_rate, cutoff_hz, q))
                .collect(),
        }
    }

    /// Highpass at `cutoff_hz`.
    #[must_use]
    pub fn highpass(sample_rate: f32, cutoff_hz: f32) -> Self {
        Self {
            stages: BUTTERWORTH_4TH_ORDER_QS
                .iter()
                .map(|&q| BiquadSection::highpass(sample_rate, cutoff_hz, q))
                .collect(),
        }
    }

    /// Bandpass between `low_hz` and `high_hz`, built as a highpass section cascaded with a
    /// lowpass section (each 2nd order), giving an overall 4th-order band-limiting response.
    #[must_use]
    pub fn bandpass(sample_rate: f32, low_hz: f32, high_hz: f32) -> Self {
        let q = std::f32::consts::FRAC_1_SQRT_2;
        Self {
            stages: vec![
                BiquadSection::highpass(sample_rate, low_hz, q),
                BiquadSection::lowpass(sample_rate, high_hz, q),
            ],
        }
    }

    /// Filter one chunk in place, carrying state across calls.
    pub fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            let mut x = *sample;
            for stage in &mut self.stages {
                x = stage.process(x);
            }
            *sample = x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(sample_rate: f32, freq: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (std::f32::consts::TAU * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|x| x * x).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn lowpass_attenuates_above_cutoff() {
        let sr = 48_000.0;
        let mut lp = FourthOrderFilter::lowpass(sr, 150.0);
        let mut high_tone = sine(sr, 8000.0, 4096);
        lp.process(&mut high_tone);
        // discard the first quarter to skip filter ring-up
        let settled = &high_tone[1024..];
        assert!(rms(settled) < 0.1, "rms = {}", rms(settled));
    }

    #[test]
    fn lowpass_passes_below_cutoff() {
        let sr = 48_000.0;
        let mut lp = FourthOrderFilter::lowpass(sr, 4000.0);
        let mut low_tone = sine(sr, 100.0, 4096);
        let input_rms = rms(&low_tone);
        lp.process(&mut low_tone);
        let settled = &low_tone[1024..];
        assert!(rms(settled) > input_rms * 0.7);
    }

    #[test]
    fn highpass_attenuates_below_cutoff() {
        let sr = 48_000.0;
        let mut hp = FourthOrderFilter::highpass(sr, 4000.0);
        let mut low_tone = sine(sr, 100.0, 4096);
        hp.process(&mut low_tone);
        let settled = &low_tone[1024..];
        assert!(rms(settled) < 0.1, "rms = {}", rms(settled));
    }

    #[test]
    fn filter_state_persists_across_chunks() {
        let sr = 48_000.0;
        let mut lp_whole = FourthOrderFilter::lowpass(sr, 150.0);
        let mut whole = sine(sr, 60.0, 2048);
        lp_whole.process(&mut whole);

        let mut lp_chunked = FourthOrderFilter::lowpass(sr, 150.0);
        let mut chunked = sine(sr, 60.0, 2048);
        for chunk in chunked.chunks_mut(512) {
            lp_chunked.process(chunk);
        }

        for (a, b) in whole.iter().zip(chunked.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }
}
