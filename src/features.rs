//! Component E: Feature Assembler. Turns the raw chroma vector from the spectral core
//! into a normalized note vector under one of three `norm_mode`s, and packs the full 19-float
//! `FeatureFrame` for the outbound transport.

use crate::autogain::AutoGain;
use crate::band_dsp::BandOutputs;
use crate::config::AutoGainConfig;
use crate::onset::OnsetOutput;
use crate::params::NormMode;
use crate::spectral::SpectralOutput;

const NOTE_COUNT: usize = 12;
const EPSILON: f32 = 1e-6;
/// `10^(-30/20)`: the noise-floor gate applied after normalization, regardless of mode.
const NOISE_FLOOR_GATE: f32 = 0.031_622_78;

/// The 19-float wire payload, in fixed field order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureFrame {
    pub brightness: f32,
    pub flux: f32,
    pub low: f32,
    pub mid: f32,
    pub high: f32,
    pub bpm: f32,
    pub is_beat: bool,
    pub notes: [f32; NOTE_COUNT],
}

impl FeatureFrame {
    /// Pack into the fixed little-endian 19-float wire order:
    /// `brightness, flux, low, mid, high, bpm, is_beat, notes[0..11]`.
    #[must_use]
    pub fn to_wire_bytes(&self) -> [u8; 19 * 4] {
        let mut out = [0u8; 19 * 4];
        let is_beat = if self.is_beat { 1.0f32 } else { 0.0f32 };
        let values: [f32; 19] = [
            self.brightness,
            self.flux,
            self.low,
            self.mid,
            self.high,
            self.bpm,
            is_beat,
            self.notes[0],
            self.notes[1],
            self.notes[2],
            self.notes[3],
            self.notes[4],
            self.notes[5],
            self.notes[6],
            self.notes[7],
            self.notes[8],
            self.notes[9],
            self.notes[10],
            self.notes[11],
        ];
        for (i, v) in values.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        out
    }
}

/// Owns per-class AutoGain state for the `statistical` mode; the other two modes are
/// stateless.
pub struct FeatureAssembler {
    per_class_autogain: Vec<AutoGain>,
}

impl FeatureAssembler {
    #[must_use]
    pub fn new(autogain_cfg: &AutoGainConfig) -> Self {
        Self {
            per_class_autogain: (0..NOTE_COUNT).map(|_| AutoGain::new(autogain_cfg)).collect(),
        }
    }

    /// Assemble one frame from the outputs of components B, C, and D.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        &mut self,
        bands: BandOutputs,
        spectral: SpectralOutput,
        onset: OnsetOutput,
        window_rms: f32,
        silence_threshold: f32,
        norm_mode: NormMode,
        note_sensitivity: f32,
        dt_secs: f32,
    ) -> FeatureFrame {
        let mut notes = if window_rms < silence_threshold {
            [0.0; NOTE_COUNT]
        } else {
            match norm_mode {
                NormMode::Fixed => normalize_fixed(&spectral.chroma),
                NormMode::Competitive => normalize_competitive(&spectral.chroma, note_sensitivity),
                NormMode::Statistical => {
                    self.normalize_statistical(&spectral.chroma, note_sensitivity, dt_secs)
                }
            }
        };
        for n in &mut notes {
            if *n < NOISE_FLOOR_GATE {
                *n = 0.0;
            }
        }

        FeatureFrame {
            brightness: spectral.brightness,
            flux: spectral.flux_clipped,
            low: bands.low,
            mid: bands.mid,
            high: bands.high,
            bpm: onset.bpm,
            is_beat: onset.is_beat,
            notes,
        }
    }

    fn normalize_statistical(
        &mut self,
        chroma: &[f32; NOTE_COUNT],
        note_sensitivity: f32,
        dt_secs: f32,
    ) -> [f32; NOTE_COUNT] {
        let mut n = [0.0f32; NOTE_COUNT];
        for i in 0..NOTE_COUNT {
            let ceiling = self.per_class_autogain[i].update(chroma[i], dt_secs);
            n[i] = (chroma[i] / ceiling).clamp(0.0, 1.0);
        }
        apply_contrast_curve(&mut n, note_sensitivity);
        n
    }
}

/// `fixed` mode: dBFS-like mapping from [-40 dB, 0 dB] to [0, 1]. The window-RMS silence gate
/// is applied uniformly across all modes by the caller, before dispatch.
fn normalize_fixed(chroma: &[f32; NOTE_COUNT]) -> [f32; NOTE_COUNT] {
    let mut n = [0.0f32; NOTE_COUNT];
    for (i, &c) in chroma.iter().enumerate() {
        let db = 20.0 * c.max(EPSILON).log10();
        n[i] = ((db + 40.0) / 40.0).clamp(0.0, 1.0);
    }
    n
}

/// `competitive` mode: max-normalize then apply the sensitivity-derived contrast curve.
/// The loudest pitch class is always exactly `1.0` once any chroma energy clears silence.
fn normalize_competitive(chroma: &[f32; NOTE_COUNT], note_sensitivity: f32) -> [f32; NOTE_COUNT] {
    let max = chroma.iter().copied().fold(0.0f32, f32::max);
    if max < EPSILON {
        return [0.0; NOTE_COUNT];
    }
    let mut n = [0.0f32; NOTE_COUNT];
    for (i, &c) in chroma.iter().enumerate() {
        n[i] = (c / max).clamp(0.0, 1.0);
    }
    apply_contrast_curve(&mut n, note_sensitivity);
    n
}

/// `n_i ^ gamma` where `gamma = 1 / (1 - sensitivity)`, shared by `competitive` and
/// `statistical`.
fn apply_contrast_curve(n: &mut [f32; NOTE_COUNT], note_sensitivity: f32) {
    let gamma = 1.0 / (1.0 - note_sensitivity.clamp(0.0, 0.999_999));
    for v in n.iter_mut() {
        *v = v.clamp(0.0, 1.0).powf(gamma);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectral_with_chroma(chroma: [f32; NOTE_COUNT]) -> SpectralOutput {
        SpectralOutput {
            brightness: 0.5,
            flux_clipped: 0.1,
            flux_unclipped: 0.1,
            chroma,
        }
    }

    #[test]
    fn competitive_loudest_note_is_exactly_one() {
        let mut chroma = [0.1f32; NOTE_COUNT];
        chroma[9] = 2.0;
        let notes = normalize_competitive(&chroma, 0.8);
        assert_eq!(notes[9], 1.0);
    }

    #[test]
    fn competitive_silence_yields_zero_vector() {
        let chroma = [0.0f32; NOTE_COUNT];
        let notes = normalize_competitive(&chroma, 0.8);
        assert_eq!(notes, [0.0; NOTE_COUNT]);
    }

    #[test]
    fn below_silence_threshold_zeros_notes_in_every_mode() {
        let mut chroma = [0.0f32; NOTE_COUNT];
        chroma[9] = 2.0;
        for mode in [NormMode::Fixed, NormMode::Competitive, NormMode::Statistical] {
            let mut assembler = FeatureAssembler::new(&AutoGainConfig::default());
            let frame = assembler.assemble(
                BandOutputs::default(),
                spectral_with_chroma(chroma),
                OnsetOutput {
                    is_beat: false,
                    bpm: 0.0,
                },
                0.001,
                0.01,
                mode,
                0.8,
                0.0213,
            );
            assert_eq!(frame.notes, [0.0; NOTE_COUNT], "mode = {mode:?}");
        }
    }

    #[test]
    fn noise_floor_gate_collapses_tiny_values() {
        let mut assembler = FeatureAssembler::new(&AutoGainConfig::default());
        let mut chroma = [0.0f32; NOTE_COUNT];
        chroma[0] = 1e-8;
        let frame = assembler.assemble(
            BandOutputs::default(),
            spectral_with_chroma(chroma),
            OnsetOutput {
                is_beat: false,
                bpm: 0.0,
            },
            0.5,
            0.01,
            NormMode::Fixed,
            0.8,
            0.0213,
        );
        assert_eq!(frame.notes[0], 0.0);
    }

    #[test]
    fn wire_packing_round_trips_values() {
        let frame = FeatureFrame {
            brightness: 0.25,
            flux: 0.5,
            low: 0.1,
            mid: 0.2,
            high: 0.3,
            bpm: 128.0,
            is_beat: true,
            notes: [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0, 0.05],
        };
        let bytes = frame.to_wire_bytes();
        assert_eq!(bytes.len(), 76);
        let brightness = f32::from_le_bytes(bytes[0..4].try_into().unwrap());
        assert_eq!(brightness, 0.25);
        let is_beat = f32::from_le_bytes(bytes[24..28].try_into().unwrap());
        assert_eq!(is_beat, 1.0);
        let note_0 = f32::from_le_bytes(bytes[28..32].try_into().unwrap());
        assert_eq!(note_0, 0.0);
    }

    #[test]
    fn statistical_mode_tracks_sustained_class() {
        let mut assembler = FeatureAssembler::new(&AutoGainConfig {
            history_frames: 16,
            percentile: 0.90,
            attack_secs: 0.1,
            decay_secs: 15.0,
            floor: 1e-4,
        });
        let mut chroma = [0.0f32; NOTE_COUNT];
        chroma[9] = 0.8;
        let mut last_notes = [0.0f32; NOTE_COUNT];
        for _ in 0..100 {
            let frame = assembler.assemble(
                BandOutputs::default(),
                spectral_with_chroma(chroma),
                OnsetOutput {
                    is_beat: false,
                    bpm: 0.0,
                },
                0.5,
                0.01,
                NormMode::Statistical,
                0.8,
                0.02,
            );
            last_notes = frame.notes;
        }
        assert!(last_notes[9] > 0.5, "notes[9] = {}", last_notes[9]);
    }
}
