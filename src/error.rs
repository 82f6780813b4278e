//! Error taxonomy. Configuration and transport-bind failures are fatal at init;
//! everything else inside the steady-state loop is recovered in-line and never reaches here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad sample rate, bad cutoffs relative to Nyquist, or any other construction-time
    /// invariant violation. Fatal: the engine does not start.
    #[error("invalid engine configuration: {0}")]
    Config(String),

    /// A UDP socket failed to bind. Fatal: the engine does not start.
    #[error("failed to bind transport socket: {0}")]
    TransportBind(#[source] std::io::Error),

    /// No capture device was available and no fallback could be constructed.
    #[error("failed to initialize audio capture: {0}")]
    CaptureInit(String),
}
