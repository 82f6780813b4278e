//! Component F: Control Plane. The live `Parameters` snapshot and the inbound JSON
//! parameter-update parser/validator.

use std::sync::Mutex;

use serde::Deserialize;

/// Note-normalization mode, selected live via the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormMode {
    Fixed,
    Competitive,
    Statistical,
}

impl NormMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "fixed" => Some(Self::Fixed),
            "competitive" => Some(Self::Competitive),
            "statistical" => Some(Self::Statistical),
            _ => None,
        }
    }
}

/// The live, mutable tuning surface. A reader (the analysis thread) observes
/// a single consistent snapshot per frame; a writer (the control listener) only ever replaces
/// individual validated fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameters {
    pub low_gain: f32,
    pub mid_gain: f32,
    pub high_gain: f32,
    pub flux_sens: f32,
    pub norm_mode: NormMode,
    pub note_sensitivity: f32,
    pub low_attack: f32,
    pub low_decay: f32,
    pub mid_attack: f32,
    pub mid_decay: f32,
    pub high_attack: f32,
    pub high_decay: f32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            low_gain: 10.0,
            mid_gain: 10.0,
            high_gain: 10.0,
            flux_sens: 1.0,
            norm_mode: NormMode::Competitive,
            note_sensitivity: 0.8,
            low_attack: 0.6,
            low_decay: 0.15,
            mid_attack: 0.6,
            mid_decay: 0.15,
            high_attack: 0.6,
            high_decay: 0.15,
        }
    }
}

/// Shared, mutex-guarded parameters handle.
#[derive(Debug)]
pub struct SharedParameters(Mutex<Parameters>);

impl SharedParameters {
    #[must_use]
    pub fn new(initial: Parameters) -> Self {
        Self(Mutex::new(initial))
    }

    /// Take a consistent copy. Held only for the duration of the copy.
    #[must_use]
    pub fn snapshot(&self) -> Parameters {
        *self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Apply a validated update in place. Held only for the duration of the field writes.
    pub fn apply(&self, update: &ParameterUpdate) {
        let mut guard = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        update.apply_to(&mut guard);
    }
}

impl Default for SharedParameters {
    fn default() -> Self {
        Self::new(Parameters::default())
    }
}

/// The wire shape of an inbound parameter datagram: any subset of fields, each
/// independently range-validated before being applied.
#[derive(Debug, Deserialize, Default)]
pub struct ParameterUpdate {
    low_gain: Option<f32>,
    mid_gain: Option<f32>,
    high_gain: Option<f32>,
    flux_sens: Option<f32>,
    norm_mode: Option<String>,
    note_sensitivity: Option<f32>,
    low_attack: Option<f32>,
    low_decay: Option<f32>,
    mid_attack: Option<f32>,
    mid_decay: Option<f32>,
    high_attack: Option<f32>,
    high_decay: Option<f32>,
}

impl ParameterUpdate {
    /// Parse a raw JSON datagram. Returns `None` (logged by the caller) on malformed JSON;
    /// never panics.
    #[must_use]
    pub fn from_json(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    /// Apply only the fields that pass their range check; out-of-range or unparseable
    /// fields are silently ignored, one at a time, so a single bad field in a datagram does
    /// not discard the rest.
    fn apply_to(&self, params: &mut Parameters) {
        apply_range(self.low_gain, 0.0..=100.0, |v| params.low_gain = v);
        apply_range(self.mid_gain, 0.0..=100.0, |v| params.mid_gain = v);
        apply_range(self.high_gain, 0.0..=100.0, |v| params.high_gain = v);
        apply_range(self.flux_sens, 0.0..=10.0, |v| params.flux_sens = v);
        apply_range(self.note_sensitivity, 0.5..=0.98, |v| {
            params.note_sensitivity = v
        });
        apply_range(self.low_attack, 0.0..=1.0, |v| params.low_attack = v);
        apply_range(self.low_decay, 0.0..=1.0, |v| params.low_decay = v);
        apply_range(self.mid_attack, 0.0..=1.0, |v| params.mid_attack = v);
        apply_range(self.mid_decay, 0.0..=1.0, |v| params.mid_decay = v);
        apply_range(self.high_attack, 0.0..=1.0, |v| params.high_attack = v);
        apply_range(self.high_decay, 0.0..=1.0, |v| params.high_decay = v);

        if let Some(mode) = self.norm_mode.as_deref().and_then(NormMode::parse) {
            params.norm_mode = mode;
        }
    }
}

fn apply_range(value: Option<f32>, range: std::ops::RangeInclusive<f32>, set: impl FnOnce(f32)) {
    if let Some(v) = value {
        if range.contains(&v) {
            set(v);
        }
    }
}
