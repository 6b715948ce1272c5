//! Hotline Core - device-side hot-reload session.
//!
//! Lets a running application receive source edits from a development host,
//! evaluate them out of process, and apply the resulting type replacements
//! without restarting. This crate owns the session protocol: candidate
//! endpoint resolution, host discovery, the persistent framed TCP
//! connection, envelope dispatch, and the evaluate-and-apply state machine.
//!
//! The compiler/evaluator and the mechanism that swaps live implementations
//! stay outside, behind the [`Evaluator`] and [`ReloadSink`] seams.
//!
//! # Example
//!
//! ```rust,ignore
//! use hotline_core::{CandidateSource, Session};
//! use std::sync::Arc;
//!
//! # async fn run(evaluator: Arc<dyn hotline_core::Evaluator>,
//! #              sink: Arc<dyn hotline_core::ReloadSink>) -> hotline_core::Result<()> {
//! let candidates = CandidateSource::from_resource_text(include_str!("../ide-hosts.txt"));
//! let mut session = Session::new(candidates, evaluator, sink);
//! session.initialize(None).await?;
//! // Session is now bound; eval requests from the host drive reload cycles.
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod endpoints;
pub mod error;
pub mod protocol;
pub mod rewrite;
pub mod session;

// Re-export commonly used types
pub use client::{CommunicatorClient, ConnectionState};
pub use config::SessionConfig;
pub use discovery::DiscoveryService;
pub use dispatch::{Dispatcher, MessageHandler};
pub use endpoints::{CandidateSource, Endpoint};
pub use error::{HotlineError, Result};
pub use protocol::{
    Diagnostic, Envelope, ErrorPayload, EvalRequest, EvalResult, ImplementationHandle,
    Replacement, ResetPayload, Severity,
};
pub use rewrite::rewrite;
pub use session::{Evaluator, ReloadSink, Session, SessionState};
