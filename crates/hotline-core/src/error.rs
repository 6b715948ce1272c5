//! Error types for the hot-reload session.
//!
//! Diagnosed compile/evaluation problems are not errors: they travel as
//! `EvalResult::diagnostics` and are surfaced through the `ReloadSink`.
//! Nothing in this taxonomy terminates the process; the worst outcome is a
//! session left `Uninitialized` pending a caller retry.

use thiserror::Error;

/// Main error type for the hotline library.
#[derive(Debug, Error)]
pub enum HotlineError {
    /// No candidate endpoint was reachable during discovery.
    ///
    /// Non-fatal: the session stays `Uninitialized` and the caller may run
    /// discovery again later.
    #[error("discovery failed: none of {attempted} candidate endpoint(s) reachable")]
    Discovery { attempted: usize },

    /// Transport-level failure: connect timeout/refusal, or a broken stream
    /// on an established connection.
    #[error("connection error for {endpoint}: {message}")]
    Connection {
        endpoint: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Malformed envelope. Callers drop and log these; the channel stays
    /// open.
    #[error("decode error: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Framing violation on the wire (e.g. a frame exceeding the size cap).
    #[error("frame error: {message}")]
    Frame { message: String },

    /// The evaluation capability faulted instead of returning a diagnosed
    /// result. The cycle is discarded; the session remains usable.
    #[error("evaluation fault: {message}")]
    Evaluation { message: String },

    /// Operation requires a bound session.
    #[error("session is not bound to a host")]
    NotBound,

    // Generic wrappers
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for hotline operations.
pub type Result<T> = std::result::Result<T, HotlineError>;

impl From<std::io::Error> for HotlineError {
    fn from(err: std::io::Error) -> Self {
        HotlineError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for HotlineError {
    fn from(err: serde_json::Error) -> Self {
        HotlineError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl HotlineError {
    /// Connection error with endpoint context.
    pub fn connection(
        endpoint: impl std::fmt::Display,
        err: std::io::Error,
    ) -> Self {
        HotlineError::Connection {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Connection error without an underlying IO cause (e.g. timeout).
    pub fn connection_msg(
        endpoint: impl std::fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        HotlineError::Connection {
            endpoint: endpoint.to_string(),
            message: message.into(),
            source: None,
        }
    }

    /// Decode error wrapping a serde failure.
    pub fn decode(err: serde_json::Error) -> Self {
        HotlineError::Decode {
            message: err.to_string(),
            source: Some(err),
        }
    }
}
