//! Component G: Frame Scheduler. The analysis thread's steady-state loop: pull a chunk
//! from capture, run the full B→C→D→E pipeline against a snapshot of live Parameters, and hand
//! the assembled frame to the outbound transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use log::warn;

use crate::band_dsp::{BandDsp, BandTuning};
use crate::capture::Chunk;
use crate::config::EngineConfig;
use crate::features::FeatureAssembler;
use crate::onset::OnsetTracker;
use crate::params::SharedParameters;
use crate::ring_buffer::RollingWindow;
use crate::spectral::SpectralCore;
use crate::transport::FeatureSender;

/// Consecutive wall-clock overruns before a degraded-performance warning is logged.
const OVERRUN_WARNING_THRESHOLD: u32 = 10;

/// Owns every per-stream DSP stage and runs the steady-state loop on its own thread.
pub struct FrameScheduler {
    config: EngineConfig,
    window: RollingWindow,
    band_dsp: BandDsp,
    spectral: SpectralCore,
    onset: OnsetTracker,
    assembler: FeatureAssembler,
    /// Frames produced from a short capture read or a wall-clock overrun.
    degraded_frames: u64,
    consecutive_overruns: u32,
}

impl FrameScheduler {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.clone(),
            window: RollingWindow::new(config.window_len(), config.chunk_size),
            band_dsp: BandDsp::new(config),
            spectral: SpectralCore::new(config.fft_size, config.sample_rate as f32),
            onset: OnsetTracker::new(&config.onset),
            assembler: FeatureAssembler::new(&config.autogain),
            degraded_frames: 0,
            consecutive_overruns: 0,
        }
    }

    #[must_use]
    pub fn degraded_frame_count(&self) -> u64 {
        self.degraded_frames
    }

    /// Run the steady-state loop until `shutdown` is set. Blocks only on the capture queue,
    /// with a timeout equal to one chunk period so shutdown is still polled promptly.
    pub fn run(
        &mut self,
        capture: &Receiver<Chunk>,
        params: &SharedParameters,
        sender: &FeatureSender,
        shutdown: &AtomicBool,
    ) {
        let dt_secs = self.config.chunk_size as f32 / self.config.sample_rate as f32;
        let budget = Duration::from_secs_f32(dt_secs);

        while !shutdown.load(Ordering::Relaxed) {
            let chunk = match capture.recv_timeout(budget) {
                Ok(chunk) => chunk,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            };

            let started = Instant::now();
            self.process_chunk(&chunk, params, sender, dt_secs);

            let elapsed = started.elapsed();
            if elapsed > budget {
                self.consecutive_overruns += 1;
                if self.consecutive_overruns > OVERRUN_WARNING_THRESHOLD {
                    warn!(
                        "analysis loop degraded: {:?} over a {:?} budget for {} consecutive frames",
                        elapsed, budget, self.consecutive_overruns
                    );
                }
            } else {
                self.consecutive_overruns = 0;
            }
        }
    }

    fn process_chunk(
        &mut self,
        chunk: &[f32],
        params: &SharedParameters,
        sender: &FeatureSender,
        dt_secs: f32,
    ) {
        let degraded = self.window.push(chunk);
        if degraded {
            self.degraded_frames += 1;
        }

        let snapshot = params.snapshot();
        let analysis_window = self.window.view();

        let window_rms = (analysis_window.iter().map(|x| x * x).sum::<f32>()
            / analysis_window.len().max(1) as f32)
            .sqrt();

        let bands = self.band_dsp.process(
            chunk,
            self.config.silence_threshold,
            BandTuning {
                gain: snapshot.low_gain,
                attack: snapshot.low_attack,
                decay: snapshot.low_decay,
            },
            BandTuning {
                gain: snapshot.mid_gain,
                attack: snapshot.mid_attack,
                decay: snapshot.mid_decay,
            },
            BandTuning {
                gain: snapshot.high_gain,
                attack: snapshot.high_attack,
                decay: snapshot.high_decay,
            },
            dt_secs,
        );

        let spectral = self.spectral.process(analysis_window, snapshot.flux_sens);
        let onset = self.onset.update(spectral.flux_unclipped, dt_secs);

        let frame = self.assembler.assemble(
            bands,
            spectral,
            onset,
            window_rms,
            self.config.silence_threshold,
            snapshot.norm_mode,
            snapshot.note_sensitivity,
            dt_secs,
        );

        sender.send(&frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameters;
    use std::net::UdpSocket;

    #[test]
    fn process_chunk_emits_a_frame_without_panicking() {
        let config = EngineConfig::default();
        let mut scheduler = FrameScheduler::new(&config);
        let params = SharedParameters::new(Parameters::default());

        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = receiver.local_addr().unwrap();
        let sender = FeatureSender::connect("127.0.0.1:0".parse().unwrap(), addr).unwrap();

        let chunk = vec![0.1f32; config.chunk_size];
        scheduler.process_chunk(&chunk, &params, &sender, 0.0213);

        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(1)))
            .unwrap();
        let mut buf = [0u8; 128];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(len, 76);
        assert_eq!(scheduler.degraded_frame_count(), 0);
    }

    #[test]
    fn short_read_increments_degraded_counter() {
        let config = EngineConfig::default();
        let mut scheduler = FrameScheduler::new(&config);
        let params = SharedParameters::new(Parameters::default());

        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = receiver.local_addr().unwrap();
        let sender = FeatureSender::connect("127.0.0.1:0".parse().unwrap(), addr).unwrap();

        let short_chunk = vec![0.0f32; config.chunk_size / 2];
        scheduler.process_chunk(&short_chunk, &params, &sender, 0.0213);
        assert_eq!(scheduler.degraded_frame_count(), 1);
    }
}
