//! Envelope dispatch by kind.
//!
//! The dispatcher routes each decoded envelope's body to the handler
//! registered for its kind. Unrecognized kinds and handler failures are
//! logged and dropped; neither is an error to the caller, so one bad
//! message never disturbs the channel.

use crate::protocol::Envelope;
use crate::Result;
use std::collections::HashMap;
use tracing::warn;

/// Handler for one envelope kind.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle the body of one envelope of the registered kind.
    async fn handle(&self, body: serde_json::Value) -> Result<()>;
}

/// Kind-keyed handler table.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Box<dyn MessageHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a kind, replacing any previous one.
    pub fn register(&mut self, kind: impl Into<String>, handler: Box<dyn MessageHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    /// Route one envelope. Initiation order is the caller's arrival order;
    /// handlers that need completion ordering must serialize themselves.
    pub async fn dispatch(&self, envelope: &Envelope) {
        match self.handlers.get(&envelope.kind) {
            Some(handler) => {
                if let Err(e) = handler.handle(envelope.body.clone()).await {
                    warn!("handler for {} failed: {e}", envelope.kind);
                }
            }
            None => {
                warn!("dropping envelope with unrecognized kind {:?}", envelope.kind);
            }
        }
    }
}
