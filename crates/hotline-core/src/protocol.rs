//! Wire protocol: framing, the self-describing envelope, and payload types.
//!
//! The transport is a raw byte stream, so frames are explicit:
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! Each JSON payload carries a `Type` field naming its schema. Field names
//! are PascalCase to match the host side of the protocol.

use crate::config::SessionConfig;
use crate::{HotlineError, Result};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Envelope kind discriminators used on the wire.
pub mod kind {
    pub const EVAL_REQUEST: &str = "EvalRequestMessage";
    pub const ERROR: &str = "ErrorMessage";
    pub const RESET: &str = "ResetMessage";
}

/// Self-describing wire message: a `Type` discriminator plus the payload
/// fields flattened alongside it.
///
/// Unknown kinds decode fine; routing (and dropping) by kind is the
/// dispatcher's job, so one unrecognized message never poisons the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(flatten)]
    pub body: serde_json::Value,
}

impl Envelope {
    /// Wrap a payload under the given kind.
    pub fn new<T: Serialize>(kind: impl Into<String>, payload: &T) -> Result<Self> {
        Ok(Self {
            kind: kind.into(),
            body: serde_json::to_value(payload)?,
        })
    }

    /// Decode an envelope from a frame payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(HotlineError::decode)
    }

    /// Encode to frame payload bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode the body as a typed payload.
    pub fn body_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_value(self.body.clone()).map_err(HotlineError::decode)
    }
}

/// Read a length-prefixed frame from an async reader.
///
/// Returns `None` on clean EOF (peer closed the connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > SessionConfig::MAX_FRAME_SIZE {
        return Err(HotlineError::Frame {
            message: format!(
                "frame size {} exceeds maximum {}",
                len,
                SessionConfig::MAX_FRAME_SIZE
            ),
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

/// Write a length-prefixed frame to an async writer.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// One evaluation request from the host: edited source plus origin metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EvalRequest {
    /// The source code to evaluate.
    pub code: String,
    /// File the edit originated from, when the host knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Opaque host-supplied context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

/// Diagnostic payload of an `ErrorMessage` envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Empty body of a `ResetMessage` envelope (a redeploy request to the host).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResetPayload {}

/// Severity of an evaluation diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A user-visible evaluation message. Diagnostics are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub text: String,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn new(text: impl Into<String>, severity: Severity) -> Self {
        Self {
            text: text.into(),
            severity,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, Severity::Error)
    }
}

/// Opaque handle to a freshly evaluated implementation.
///
/// The core never inspects it; the apply-to-runtime collaborator downcasts
/// to whatever its loading mechanism produced.
#[derive(Clone)]
pub struct ImplementationHandle(Arc<dyn Any + Send + Sync>);

impl ImplementationHandle {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for ImplementationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ImplementationHandle(..)")
    }
}

/// One component replacement found by evaluation. Application order follows
/// `EvalResult::replacements` order.
#[derive(Debug, Clone)]
pub struct Replacement {
    pub component: String,
    pub handle: ImplementationHandle,
}

impl Replacement {
    pub fn new(component: impl Into<String>, handle: ImplementationHandle) -> Self {
        Self {
            component: component.into(),
            handle,
        }
    }
}

/// Outcome of one evaluation cycle, produced and consumed within that cycle.
#[derive(Debug, Clone, Default)]
pub struct EvalResult {
    pub success: bool,
    pub replacements: Vec<Replacement>,
    pub diagnostics: Vec<Diagnostic>,
}

impl EvalResult {
    /// Successful evaluation with the replacements to apply, in order.
    pub fn replaced(replacements: Vec<Replacement>) -> Self {
        Self {
            success: true,
            replacements,
            diagnostics: Vec::new(),
        }
    }

    /// Diagnosed failure (or success with nothing to apply).
    pub fn diagnosed(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            success: false,
            replacements: Vec::new(),
            diagnostics,
        }
    }
}
