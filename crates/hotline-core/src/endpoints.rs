//! Candidate endpoint resolution.
//!
//! The development host ships the device a newline-separated list of
//! `host[:port]` entries (typically embedded in the binary at build time).
//! `CandidateSource` parses that resource and produces the ordered candidate
//! list discovery will probe, with an optional explicit override taking
//! highest priority.

use crate::config::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// A host address the device may attempt to connect to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Ordered source of candidate endpoints.
///
/// Resolution is a pure read: malformed lines are skipped with a warning and
/// an empty or absent resource yields an empty list, which makes discovery
/// trivially fail rather than erroring here.
#[derive(Debug, Clone, Default)]
pub struct CandidateSource {
    resource: Option<String>,
    default_port: u16,
}

impl CandidateSource {
    /// Build from the bundled resource text (newline-separated `host[:port]`
    /// entries).
    pub fn from_resource_text(text: impl Into<String>) -> Self {
        Self {
            resource: Some(text.into()),
            default_port: SessionConfig::DEFAULT_PORT,
        }
    }

    /// A source with no candidates. Useful when the embedder always passes
    /// an explicit override.
    pub fn empty() -> Self {
        Self {
            resource: None,
            default_port: SessionConfig::DEFAULT_PORT,
        }
    }

    /// Override the port applied to lines that omit one.
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Resolve the ordered candidate list.
    ///
    /// An explicit override is prepended with highest priority; resource
    /// entries follow in file order.
    pub fn resolve(&self, override_endpoint: Option<Endpoint>) -> Vec<Endpoint> {
        let mut candidates = Vec::new();
        if let Some(endpoint) = override_endpoint {
            candidates.push(endpoint);
        }

        if let Some(text) = &self.resource {
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_line(line, self.default_port) {
                    Some(endpoint) => candidates.push(endpoint),
                    None => warn!("skipping malformed candidate line: {line:?}"),
                }
            }
        }

        candidates
    }
}

/// Parse one `host[:port]` line. Returns `None` on a malformed entry.
fn parse_line(line: &str, default_port: u16) -> Option<Endpoint> {
    match line.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() {
                return None;
            }
            port.parse::<u16>()
                .ok()
                .map(|port| Endpoint::new(host, port))
        }
        None => Some(Endpoint::new(line, default_port)),
    }
}
