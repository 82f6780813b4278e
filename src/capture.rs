//! Capture adapter. A `cpal` input stream feeds a bounded depth-2 SPSC queue with
//! overwrite-on-full semantics; falls back to a synthetic silence generator if no input
//! device is available so the engine is always runnable headless.

use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Stream;
use crossbeam_channel::{Receiver, Sender};
use log::{info, warn};

use crate::error::EngineError;
use crate::ring_buffer::downmix_to_mono;

const QUEUE_DEPTH: usize = 2;

/// A chunk of mono samples produced by the capture thread, each already in `[-1, 1]`.
pub type Chunk = Vec<f32>;

/// Owns whichever capture backend was constructed (a live `cpal::Stream`, or a background
/// thread generating silence) and the consumer end of the bounded queue.
pub enum Capture {
    Device {
        #[allow(dead_code)]
        stream: Stream,
        receiver: Receiver<Chunk>,
    },
    Silence {
        #[allow(dead_code)]
        handle: JoinHandle<()>,
        receiver: Receiver<Chunk>,
    },
}

impl Capture {
    /// Open the default host's default input device at `chunk_size` samples per delivery,
    /// falling back to synthetic silence.
    pub fn start(sample_rate: u32, chunk_size: usize) -> Result<Self, EngineError> {
        match Self::start_device(chunk_size) {
            Ok(capture) => Ok(capture),
            Err(err) => {
                warn!("no audio input device available ({err}); falling back to silence");
                Ok(Self::start_silence(sample_rate, chunk_size))
            }
        }
    }

    fn start_device(chunk_size: usize) -> Result<Self, EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| EngineError::CaptureInit("no default input device".into()))?;
        let config = device
            .default_input_config()
            .map_err(|e| EngineError::CaptureInit(e.to_string()))?;

        info!(
            "capture device: {} ({:?})",
            device.name().unwrap_or_else(|_| "unknown".into()),
            config
        );

        let channels = config.channels() as usize;
        let (sender, receiver): (Sender<Chunk>, Receiver<Chunk>) =
            crossbeam_channel::bounded(QUEUE_DEPTH);

        let mut pending: Vec<f32> = Vec::with_capacity(chunk_size * 2);
        let stream = device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = downmix_to_mono(data, channels);
                    pending.extend_from_slice(&mono);
                    while pending.len() >= chunk_size {
                        let chunk: Chunk = pending.drain(..chunk_size).collect();
                        // overwrite-on-full: drain the stale slot before sending the fresh one
                        let _ = sender.try_recv();
                        if sender.try_send(chunk).is_err() {
                            warn!("capture queue send failed, dropping chunk");
                        }
                    }
                },
                |err| warn!("capture stream error: {err}"),
                None,
            )
            .map_err(|e| EngineError::CaptureInit(e.to_string()))?;
        stream
            .play()
            .map_err(|e| EngineError::CaptureInit(e.to_string()))?;

        Ok(Self::Device { stream, receiver })
    }

    fn start_silence(sample_rate: u32, chunk_size: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(QUEUE_DEPTH);
        let period = Duration::from_secs_f64(chunk_size as f64 / sample_rate.max(1) as f64);
        let handle = std::thread::spawn(move || loop {
            let chunk = vec![0.0f32; chunk_size];
            if sender.send(chunk).is_err() {
                return;
            }
            std::thread::sleep(period);
        });
        Self::Silence { handle, receiver }
    }

    /// The consumer end of the capture queue, shared by the analysis thread.
    #[must_use]
    pub fn receiver(&self) -> &Receiver<Chunk> {
        match self {
            Self::Device { receiver, .. } | Self::Silence { receiver, .. } => receiver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_capture_delivers_zeroed_chunks() {
        let capture = Capture::start_silence(48_000, 256);
        let chunk = capture
            .receiver()
            .recv_timeout(Duration::from_secs(1))
            .expect("silence generator should deliver a chunk");
        assert_eq!(chunk.len(), 256);
        assert!(chunk.iter().all(|&s| s == 0.0));
    }
}
