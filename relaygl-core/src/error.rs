//! Domain-specific error types for the readback pipeline.
//!
//! All fallible operations return `Result<T, RelayError>`.
//! Construction-time failures propagate to the caller; steady-state
//! readback failures are classified so the router can degrade instead
//! of aborting.

use thiserror::Error;

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, RelayError>;

/// The canonical error type for surface binding, readback and transport.
#[derive(Debug, Error)]
pub enum RelayError {
    // ── Caller Errors ────────────────────────────────────────────
    /// Non-positive dimensions, missing configuration, or a malformed
    /// request. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The pixel layout offered by a sink cannot be read into.
    #[error("unsupported pixel format: {pixel_size} bytes per pixel")]
    UnsupportedFormat { pixel_size: usize },

    // ── Resource Errors ──────────────────────────────────────────
    /// The platform could not allocate an off-screen resource.
    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    /// The owning window was destroyed externally. Permanent.
    #[error("window has been deleted by the window manager")]
    WindowDeleted,

    // ── Transport Errors ─────────────────────────────────────────
    /// The specialized thin-client channel has no route. Recoverable.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// A sink's sender task went away.
    #[error("channel closed")]
    ChannelClosed,

    // ── Platform Errors ──────────────────────────────────────────
    /// An underlying graphics-platform call reported an error.
    #[error("platform error {code:#06x} while trying to {context}")]
    PlatformError { code: u32, context: &'static str },

    /// The I/O layer reported an error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding of a recorded frame failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl RelayError {
    /// Whether the failure only spoils the current frame.
    pub fn is_degradable(&self) -> bool {
        matches!(self, RelayError::PlatformError { .. })
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for RelayError {
    fn from(s: String) -> Self {
        RelayError::Other(s)
    }
}

impl From<&str> for RelayError {
    fn from(s: &str) -> Self {
        RelayError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for RelayError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        RelayError::ChannelClosed
    }
}

impl From<Box<bincode::ErrorKind>> for RelayError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        RelayError::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = RelayError::WindowDeleted;
        assert!(e.to_string().contains("deleted"));

        let e = RelayError::PlatformError {
            code: 0x0502,
            context: "read pixels",
        };
        assert!(e.to_string().contains("0x0502"));
        assert!(e.to_string().contains("read pixels"));
    }

    #[test]
    fn only_platform_errors_degrade() {
        assert!(
            RelayError::PlatformError {
                code: 1,
                context: "x"
            }
            .is_degradable()
        );
        assert!(!RelayError::WindowDeleted.is_degradable());
        assert!(!RelayError::TransportUnavailable("down".into()).is_degradable());
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: RelayError = io_err.into();
        assert!(matches!(e, RelayError::Io(_)));
    }
}
