//! Centralized configuration for the hot-reload session.
//!
//! Constants for connection establishment, wire framing, and the evaluation
//! queue. There is no runtime configuration file; embedders tune behavior by
//! constructing `CandidateSource` and `Session` values directly.

use std::time::Duration;

/// Session and transport configuration.
pub struct SessionConfig;

impl SessionConfig {
    /// Default host port when a candidate line omits one and no explicit
    /// endpoint override is given.
    pub const DEFAULT_PORT: u16 = 9988;

    /// Per-candidate TCP connect timeout during discovery.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

    /// Upper bound on a single wire frame. Frames claiming more are a
    /// protocol violation, not a large message.
    pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB

    /// Depth of the queue between the dispatcher and the evaluation worker.
    /// Requests beyond this apply backpressure to inbound dispatch.
    pub const EVAL_QUEUE_DEPTH: usize = 32;
}
