//! Transport adapters. An outbound non-blocking UDP sender for feature frames, and a
//! blocking UDP listener thread for inbound parameter datagrams.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use log::{debug, warn};

use crate::error::EngineError;
use crate::features::FeatureFrame;
use crate::params::{ParameterUpdate, SharedParameters};

const RECV_BUFFER_SIZE: usize = 4096;

/// Outbound feature-frame sender. A connected, non-blocking
/// socket: `send` never blocks, and a failure is logged and dropped rather than retried — the
/// assembler never blocks on the transport.
pub struct FeatureSender {
    socket: UdpSocket,
}

impl FeatureSender {
    pub fn connect(local: SocketAddr, remote: SocketAddr) -> Result<Self, EngineError> {
        let socket = UdpSocket::bind(local).map_err(EngineError::TransportBind)?;
        socket.set_nonblocking(true).map_err(EngineError::TransportBind)?;
        socket.connect(remote).map_err(EngineError::TransportBind)?;
        Ok(Self { socket })
    }

    /// Send one frame. Best-effort: a send failure is logged at `warn` and otherwise ignored.
    pub fn send(&self, frame: &FeatureFrame) {
        let bytes = frame.to_wire_bytes();
        if let Err(err) = self.socket.send(&bytes) {
            warn!("failed to send feature datagram: {err}");
        }
    }
}

/// Inbound parameter-update listener. Runs on its own thread, blocking only on
/// `recv_from`; validated updates are applied directly to the shared snapshot.
pub struct ParameterListener {
    handle: JoinHandle<()>,
}

impl ParameterListener {
    pub fn spawn(
        bind_addr: SocketAddr,
        shared: Arc<SharedParameters>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, EngineError> {
        let socket = UdpSocket::bind(bind_addr).map_err(EngineError::TransportBind)?;
        // bounded read timeout so the shutdown flag is still polled even with no traffic.
        socket
            .set_read_timeout(Some(std::time::Duration::from_millis(250)))
            .map_err(EngineError::TransportBind)?;

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; RECV_BUFFER_SIZE];
            while !shutdown.load(Ordering::Relaxed) {
                match socket.recv_from(&mut buf) {
                    Ok((len, _src)) => match ParameterUpdate::from_json(&buf[..len]) {
                        Some(update) => {
                            shared.apply(&update);
                            debug!("applied parameter update");
                        }
                        None => warn!("dropped malformed parameter datagram"),
                    },
                    Err(err)
                        if err.kind() == std::io::ErrorKind::WouldBlock
                            || err.kind() == std::io::ErrorKind::TimedOut => {}
                    Err(err) => warn!("parameter listener read error: {err}"),
                }
            }
        });

        Ok(Self { handle })
    }

    /// Join the listener thread, bounded by the caller's own timeout policy.
    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn frame() -> FeatureFrame {
        FeatureFrame {
            brightness: 0.1,
            flux: 0.2,
            low: 0.3,
            mid: 0.4,
            high: 0.5,
            bpm: 120.0,
            is_beat: false,
            notes: [0.0; 12],
        }
    }

    #[test]
    fn feature_sender_delivers_correct_byte_count() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let receiver_addr = receiver.local_addr().unwrap();
        let sender = FeatureSender::connect("127.0.0.1:0".parse().unwrap(), receiver_addr).unwrap();
        sender.send(&frame());

        let mut buf = [0u8; 128];
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(1)))
            .unwrap();
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(len, 76);
    }

    #[test]
    fn parameter_listener_applies_inbound_update_and_shuts_down() {
        let shared = Arc::new(SharedParameters::default());
        let shutdown = Arc::new(AtomicBool::new(false));
        let listener_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let bound = UdpSocket::bind(listener_addr).unwrap();
        let addr = bound.local_addr().unwrap();
        drop(bound);

        let listener =
            ParameterListener::spawn(addr, Arc::clone(&shared), Arc::clone(&shutdown)).unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(br#"{"low_gain": 33.0}"#, addr)
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(100));
        assert_eq!(shared.snapshot().low_gain, 33.0);

        shutdown.store(true, Ordering::Relaxed);
        listener.join().unwrap();
    }
}
