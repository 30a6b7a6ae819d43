//! Typed error taxonomy for the RTMP core (spec.md §7).
//!
//! Decode-time failures and connection-fatal conditions get their own
//! variants so callers can tell "close the socket" apart from "reply with
//! an `_error` Invoke and keep going." `anyhow` is still used at the task
//! boundary (`server.rs`, `main.rs`), same split the teacher and the wider
//! example pool use: typed errors inside the library, `anyhow` at the edges.

use thiserror::Error;

/// Kind (a): malformed header, missing prior header, AMF decode failure.
/// Always fatal for the connection.
#[derive(Debug, Error)]
pub enum ProtocolDecodeError {
    #[error("chunk header for channel {channel} has no prior header on record and was not sent full-form")]
    MissingPriorHeader { channel: u8 },
    #[error("AMF decode failed: {0}")]
    Amf(String),
    #[error("invalid ping packet: needs at least 6 bytes, got {0}")]
    ShortPing(usize),
}

/// Connection-fatal conditions: decode errors, I/O failures, and the two
/// timeout kinds from spec.md §7 (d, f).
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("protocol decode error: {0}")]
    Decode(#[from] ProtocolDecodeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("handshake did not complete within the configured timeout")]
    HandshakeTimeout,
    #[error("no data received for longer than the keep-alive timeout")]
    KeepAliveTimeout,
    #[error("peer closed the connection")]
    Closed,
}

/// Kinds (b)/(c)/(e): a failure raised by an `Application` hook or invoke
/// handler. Carries an explicit NetConnection-style status code so the
/// `_error` reply doesn't have to fall back to a generic one (spec.md §4.6:
/// "`Status.from_error(e)` uses `e.code` if present"). Application/hook code
/// builds one of these (or any other `anyhow::Error`, which just gets the
/// default code) and returns it as an `anyhow::Result` — `Status::from_handler_error`
/// (in `rtmp/invoke.rs`) does the downcast.
#[derive(Debug, Error)]
#[error("{description}")]
pub struct AppError {
    pub code: String,
    pub description: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        AppError {
            code: code.into(),
            description: description.into(),
        }
    }
}

impl ConnectionError {
    /// True for conditions that are a routine disconnect, not a bug.
    pub fn is_routine(&self) -> bool {
        matches!(
            self,
            ConnectionError::Closed
                | ConnectionError::HandshakeTimeout
                | ConnectionError::KeepAliveTimeout
        ) || matches!(
            self,
            ConnectionError::Io(e) if matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::BrokenPipe
            )
        )
    }
}
