//! TCP communicator client.
//!
//! One instance owns one connection to one endpoint; reconnecting means
//! constructing a new instance. Outbound sends are serialized through a
//! tokio `Mutex`, and a spawned read task decodes inbound frames in arrival
//! order and forwards each envelope into an mpsc channel the session
//! consumes.
//!
//! Malformed inbound envelopes are logged and skipped; they never close the
//! channel.

use crate::config::SessionConfig;
use crate::endpoints::Endpoint;
use crate::protocol::{read_frame, write_frame, Envelope};
use crate::{HotlineError, Result};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Lifecycle of a communicator connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Connected = 1,
    Failed = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Connected,
            2 => ConnectionState::Failed,
            _ => ConnectionState::Closed,
        }
    }
}

/// Shared lock-free state cell, observed by both the client and its read task.
#[derive(Debug, Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new(state: ConnectionState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// Client side of one persistent host connection.
#[derive(Debug)]
pub struct CommunicatorClient {
    endpoint: Endpoint,
    writer: Mutex<OwnedWriteHalf>,
    state: StateCell,
    read_task: tokio::task::JoinHandle<()>,
}

impl CommunicatorClient {
    /// Connect to an endpoint, with `SessionConfig::CONNECT_TIMEOUT` applied.
    ///
    /// On success, returns the client plus the ordered inbound envelope
    /// stream. The stream closes when the peer disconnects or the transport
    /// fails.
    pub async fn connect(
        endpoint: Endpoint,
    ) -> Result<(Self, mpsc::Receiver<Envelope>)> {
        debug!("connecting to host at tcp://{endpoint}");
        let state = StateCell::new(ConnectionState::Connecting);

        let stream = tokio::time::timeout(
            SessionConfig::CONNECT_TIMEOUT,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        .map_err(|_| {
            state.set(ConnectionState::Failed);
            HotlineError::connection_msg(&endpoint, "connect timed out")
        })?
        .map_err(|e| {
            state.set(ConnectionState::Failed);
            HotlineError::connection(&endpoint, e)
        })?;

        info!("connected to host at tcp://{endpoint}");
        state.set(ConnectionState::Connected);

        let (reader, writer) = stream.into_split();
        let (inbound_tx, inbound_rx) = mpsc::channel(SessionConfig::EVAL_QUEUE_DEPTH);

        let read_task = tokio::spawn(Self::read_loop(
            reader,
            inbound_tx,
            state.clone(),
            endpoint.clone(),
        ));

        Ok((
            Self {
                endpoint,
                writer: Mutex::new(writer),
                state,
                read_task,
            },
            inbound_rx,
        ))
    }

    /// The endpoint this client is bound to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Send one envelope to the host.
    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        let payload = envelope.encode()?;
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &payload).await.map_err(|e| {
            self.state.set(ConnectionState::Failed);
            match e {
                HotlineError::Io { source: Some(io), .. } => {
                    HotlineError::connection(&self.endpoint, io)
                }
                other => other,
            }
        })
    }

    /// Close the connection and stop the read task.
    pub fn close(&self) {
        self.state.set(ConnectionState::Closed);
        self.read_task.abort();
    }

    async fn read_loop(
        mut reader: OwnedReadHalf,
        inbound_tx: mpsc::Sender<Envelope>,
        state: StateCell,
        endpoint: Endpoint,
    ) {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(payload)) => match Envelope::decode(&payload) {
                    Ok(envelope) => {
                        if inbound_tx.send(envelope).await.is_err() {
                            // Receiver gone; nobody is listening anymore.
                            state.set(ConnectionState::Closed);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("dropping malformed envelope from {endpoint}: {e}");
                    }
                },
                Ok(None) => {
                    info!("host {endpoint} closed the connection");
                    state.set(ConnectionState::Closed);
                    break;
                }
                Err(e) => {
                    warn!("transport failure on {endpoint}: {e}");
                    state.set(ConnectionState::Failed);
                    break;
                }
            }
        }
    }
}

impl Drop for CommunicatorClient {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}
