//! Session coordinator: the evaluate-and-apply state machine.
//!
//! A `Session` owns one hot-reload connection lifetime. `initialize` runs
//! endpoint discovery once and binds the inbound envelope stream to a
//! dispatcher; from then on every `EvalRequestMessage` runs one
//! evaluate -> apply-replacements cycle against the embedder-supplied
//! capabilities.
//!
//! # Ordering
//!
//! Two worker tasks per session. The dispatch worker consumes inbound
//! envelopes in arrival order; its eval handler only enqueues, so a slow
//! evaluation never blocks unrelated messages. The cycle worker consumes
//! that queue one request at a time, which makes the
//! begin/replace*/end sequence of each cycle atomic with respect to other
//! cycles: back-to-back requests produce complete, non-interleaved
//! sequences in arrival order.

use crate::client::CommunicatorClient;
use crate::config::SessionConfig;
use crate::dispatch::{Dispatcher, MessageHandler};
use crate::discovery::DiscoveryService;
use crate::endpoints::{CandidateSource, Endpoint};
use crate::protocol::{
    kind, Diagnostic, Envelope, ErrorPayload, EvalRequest, EvalResult, ImplementationHandle,
    ResetPayload,
};
use crate::{HotlineError, Result};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// The evaluation capability: turns submitted source into replacement
/// implementations or diagnostics.
#[async_trait::async_trait]
pub trait Evaluator: Send + Sync + 'static {
    /// Evaluate one request.
    ///
    /// Diagnosed compile problems belong in the returned
    /// `EvalResult::diagnostics`; an `Err` is a hard fault and aborts the
    /// cycle without touching the session.
    async fn evaluate(&self, request: &EvalRequest) -> Result<EvalResult>;
}

/// The apply-to-runtime collaborator. Delivery order is the contract:
/// `begin_reload`, each `replace_component` in result order, `end_reload`.
#[async_trait::async_trait]
pub trait ReloadSink: Send + Sync + 'static {
    async fn begin_reload(&self);
    async fn replace_component(&self, component: &str, handle: ImplementationHandle);
    async fn end_reload(&self);
    /// Surfaced evaluation diagnostics and host-reported errors.
    async fn diagnostic(&self, diagnostic: Diagnostic);
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Uninitialized = 0,
    Discovering = 1,
    Bound = 2,
    EvaluatingAndApplying = 3,
    Closing = 4,
    Terminated = 5,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Uninitialized,
            1 => SessionState::Discovering,
            2 => SessionState::Bound,
            3 => SessionState::EvaluatingAndApplying,
            4 => SessionState::Closing,
            _ => SessionState::Terminated,
        }
    }
}

/// State cell shared between the session and its cycle worker.
#[derive(Debug, Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(SessionState::Uninitialized as u8)))
    }

    fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// Device-side hot-reload session.
///
/// Explicitly constructed and owned by the embedder; a process may hold any
/// number of sessions (each with its own connection), and `shutdown` gives
/// the lifecycle a real terminal state.
pub struct Session {
    candidates: CandidateSource,
    evaluator: Arc<dyn Evaluator>,
    sink: Arc<dyn ReloadSink>,
    state: StateCell,
    client: Option<Arc<CommunicatorClient>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    dispatch_task: Option<tokio::task::JoinHandle<()>>,
    cycle_task: Option<tokio::task::JoinHandle<()>>,
}

impl Session {
    pub fn new(
        candidates: CandidateSource,
        evaluator: Arc<dyn Evaluator>,
        sink: Arc<dyn ReloadSink>,
    ) -> Self {
        Self {
            candidates,
            evaluator,
            sink,
            state: StateCell::new(),
            client: None,
            shutdown_tx: None,
            dispatch_task: None,
            cycle_task: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// The endpoint of the live connection, once bound.
    pub fn connected_endpoint(&self) -> Option<&Endpoint> {
        self.client.as_deref().map(CommunicatorClient::endpoint)
    }

    /// Discover a host and bind the session.
    ///
    /// Idempotent: when already `Bound` or beyond this returns `Ok` at once
    /// with no discovery or connection attempt. Discovery failure is
    /// reported to the caller and leaves the session `Uninitialized` and
    /// retriable.
    pub async fn initialize(&mut self, override_endpoint: Option<Endpoint>) -> Result<()> {
        match self.state.get() {
            SessionState::Uninitialized => {}
            _ => return Ok(()),
        }
        self.state.set(SessionState::Discovering);

        let candidates = self.candidates.resolve(override_endpoint);
        let (client, inbound) = match DiscoveryService::find_connection(&candidates).await {
            Ok(connection) => connection,
            Err(e) => {
                self.state.set(SessionState::Uninitialized);
                return Err(e);
            }
        };

        let (eval_tx, eval_rx) = mpsc::channel(SessionConfig::EVAL_QUEUE_DEPTH);

        let mut dispatcher = Dispatcher::new();
        dispatcher.register(kind::EVAL_REQUEST, Box::new(EvalRequestHandler { queue: eval_tx }));
        dispatcher.register(
            kind::ERROR,
            Box::new(ErrorMessageHandler {
                sink: self.sink.clone(),
            }),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.dispatch_task = Some(tokio::spawn(Self::dispatch_loop(
            inbound,
            dispatcher,
            shutdown_rx.clone(),
        )));
        self.cycle_task = Some(tokio::spawn(Self::cycle_loop(
            eval_rx,
            self.evaluator.clone(),
            self.sink.clone(),
            self.state.clone(),
            shutdown_rx,
        )));

        info!("session bound to host {}", client.endpoint());
        self.client = Some(Arc::new(client));
        self.shutdown_tx = Some(shutdown_tx);
        self.state.set(SessionState::Bound);
        Ok(())
    }

    /// Ask the host to redeploy. No local state effect.
    pub async fn request_reset(&self) -> Result<()> {
        let client = self.client.as_ref().ok_or(HotlineError::NotBound)?;
        let envelope = Envelope::new(kind::RESET, &ResetPayload::default())?;
        client.send(&envelope).await
    }

    /// Close the connection and stop both workers.
    ///
    /// An in-flight cycle runs to completion first; there is no mid-cycle
    /// cancellation. After this the session is `Terminated`; start a new
    /// `Session` to reconnect.
    pub async fn shutdown(&mut self) {
        if matches!(self.state.get(), SessionState::Terminated) {
            return;
        }
        self.state.set(SessionState::Closing);

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(task) = self.dispatch_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.cycle_task.take() {
            let _ = task.await;
        }
        if let Some(client) = self.client.take() {
            client.close();
        }

        self.state.set(SessionState::Terminated);
        info!("session terminated");
    }

    async fn dispatch_loop(
        mut inbound: mpsc::Receiver<Envelope>,
        dispatcher: Dispatcher,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                envelope = inbound.recv() => match envelope {
                    Some(envelope) => dispatcher.dispatch(&envelope).await,
                    None => {
                        debug!("inbound stream closed, dispatch worker stopping");
                        break;
                    }
                },
            }
        }
    }

    async fn cycle_loop(
        mut queue: mpsc::Receiver<EvalRequest>,
        evaluator: Arc<dyn Evaluator>,
        sink: Arc<dyn ReloadSink>,
        state: StateCell,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                request = queue.recv() => match request {
                    Some(request) => {
                        Self::run_cycle(&request, evaluator.as_ref(), sink.as_ref(), &state).await;
                    }
                    None => break,
                },
            }
        }
    }

    /// One evaluate -> apply cycle. Always returns the state to `Bound`.
    async fn run_cycle(
        request: &EvalRequest,
        evaluator: &dyn Evaluator,
        sink: &dyn ReloadSink,
        state: &StateCell,
    ) {
        state.set(SessionState::EvaluatingAndApplying);
        debug!(file = ?request.file_name, "handling evaluation request");

        match evaluator.evaluate(request).await {
            Ok(result) if result.success && !result.replacements.is_empty() => {
                info!("applying {} replacement(s)", result.replacements.len());
                sink.begin_reload().await;
                for replacement in result.replacements {
                    sink.replace_component(&replacement.component, replacement.handle)
                        .await;
                }
                sink.end_reload().await;
            }
            Ok(result) => {
                for diagnostic in result.diagnostics {
                    sink.diagnostic(diagnostic).await;
                }
            }
            Err(e) => {
                // Hard fault, not a diagnosed failure: discard the cycle,
                // the session stays usable.
                error!("evaluation fault, cycle discarded: {e}");
            }
        }

        state.set(SessionState::Bound);
    }
}

/// Forwards decoded evaluation requests into the cycle queue.
struct EvalRequestHandler {
    queue: mpsc::Sender<EvalRequest>,
}

#[async_trait::async_trait]
impl MessageHandler for EvalRequestHandler {
    async fn handle(&self, body: serde_json::Value) -> Result<()> {
        let request: EvalRequest = serde_json::from_value(body).map_err(HotlineError::decode)?;
        self.queue
            .send(request)
            .await
            .map_err(|_| HotlineError::NotBound)?;
        Ok(())
    }
}

/// Surfaces host-reported errors as diagnostics.
struct ErrorMessageHandler {
    sink: Arc<dyn ReloadSink>,
}

#[async_trait::async_trait]
impl MessageHandler for ErrorMessageHandler {
    async fn handle(&self, body: serde_json::Value) -> Result<()> {
        let payload: ErrorPayload = serde_json::from_value(body).map_err(HotlineError::decode)?;
        let text = match (payload.title, payload.error) {
            (Some(title), Some(error)) => format!("{title}: {error}"),
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => "host reported an error".to_string(),
        };
        self.sink.diagnostic(Diagnostic::error(text)).await;
        Ok(())
    }
}
