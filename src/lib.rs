//! Note Dancer: a real-time audio feature-extraction engine for electronic music
//! visualization. Ingests a mono PCM stream, runs a three-band filter bank, a spectral core
//! with an HPSS approximation, and an onset/tempo tracker, and emits a fixed-shape feature
//! frame over UDP once per analysis chunk.

pub mod autogain;
pub mod band_dsp;
pub mod biquad;
pub mod capture;
pub mod config;
pub mod error;
pub mod features;
pub mod onset;
pub mod params;
pub mod ring_buffer;
pub mod scheduler;
pub mod spectral;
pub mod transport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::capture::Capture;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::params::{Parameters, SharedParameters};
use crate::scheduler::FrameScheduler;
use crate::transport::{FeatureSender, ParameterListener};

const THREAD_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Top-level engine handle: owns the three long-lived threads and the shared shutdown
/// flag. Constructed once at startup; `run` blocks until shutdown.
pub struct Engine {
    config: EngineConfig,
    capture: Capture,
    params: Arc<SharedParameters>,
    sender: FeatureSender,
    listener: Option<ParameterListener>,
    shutdown: Arc<AtomicBool>,
}

impl Engine {
    /// Construct the engine: validate configuration, open the capture device (falling back to
    /// silence), bind both UDP sockets, and spawn the control-listener thread. Fatal on bad
    /// configuration or a transport-bind failure; never fails merely
    /// because no input device exists.
    pub fn new(config: EngineConfig, initial_params: Parameters) -> Result<Self, EngineError> {
        config.validate()?;

        let capture = Capture::start(config.sample_rate, config.chunk_size)?;
        let params = Arc::new(SharedParameters::new(initial_params));
        let shutdown = Arc::new(AtomicBool::new(false));

        let sender = FeatureSender::connect(
            local_bind_addr(config.feature_endpoint),
            config.feature_endpoint,
        )?;
        let listener = ParameterListener::spawn(
            config.parameter_endpoint,
            Arc::clone(&params),
            Arc::clone(&shutdown),
        )?;

        Ok(Self {
            config,
            capture,
            params,
            sender,
            listener: Some(listener),
            shutdown,
        })
    }

    /// A clonable handle to the shutdown flag, for an external caller (e.g. a signal handler
    /// installed by the CLI binary) to request a cooperative stop.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// A clonable handle to the live parameters, for anything embedding the engine directly
    /// (rather than driving it purely over the network control plane).
    #[must_use]
    pub fn parameters_handle(&self) -> Arc<SharedParameters> {
        Arc::clone(&self.params)
    }

    /// Run the analysis loop on the current thread until shutdown is requested. Returns once
    /// the capture queue disconnects or the shutdown flag is observed.
    pub fn run(&mut self) {
        info!(
            "note dancer engine running: {} Hz, {}-sample chunks, feature frames to {}",
            self.config.sample_rate, self.config.chunk_size, self.config.feature_endpoint
        );
        let mut scheduler = FrameScheduler::new(&self.config);
        scheduler.run(
            self.capture.receiver(),
            &self.params,
            &self.sender,
            &self.shutdown,
        );
        info!(
            "analysis loop stopped; {} degraded frames over this run",
            scheduler.degraded_frame_count()
        );
    }

    /// Signal shutdown and join the control-listener thread within a bounded timeout.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(listener) = self.listener.take() {
            let (done_tx, done_rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = listener.join();
                let _ = done_tx.send(());
            });
            if done_rx.recv_timeout(THREAD_JOIN_TIMEOUT).is_err() {
                log::warn!("control listener did not join within the shutdown timeout");
            }
        }
    }
}

fn local_bind_addr(remote: std::net::SocketAddr) -> std::net::SocketAddr {
    match remote {
        std::net::SocketAddr::V4(_) => "0.0.0.0:0".parse().unwrap(),
        std::net::SocketAddr::V6(_) => "[::]:0".parse().unwrap(),
    }
}
