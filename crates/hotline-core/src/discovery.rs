//! Host discovery over an ordered candidate list.
//!
//! Candidates are probed sequentially, each at most once, which makes the
//! outcome contract structural: the connection returned is always to the
//! earliest-listed reachable candidate, never to whichever peer happened to
//! answer fastest. Failure is non-fatal; the caller owns any retry policy.

use crate::client::CommunicatorClient;
use crate::endpoints::Endpoint;
use crate::protocol::Envelope;
use crate::{HotlineError, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Finds the first live host connection among ordered candidates.
pub struct DiscoveryService;

impl DiscoveryService {
    /// Try each candidate in order and return the first established
    /// connection, or `HotlineError::Discovery` if none is reachable.
    pub async fn find_connection(
        candidates: &[Endpoint],
    ) -> Result<(CommunicatorClient, mpsc::Receiver<Envelope>)> {
        for endpoint in candidates {
            match CommunicatorClient::connect(endpoint.clone()).await {
                Ok(connection) => {
                    info!("discovery selected host {endpoint}");
                    return Ok(connection);
                }
                Err(e) => {
                    debug!("candidate {endpoint} unreachable: {e}");
                }
            }
        }

        Err(HotlineError::Discovery {
            attempted: candidates.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn reachable() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, Endpoint::new("127.0.0.1", port))
    }

    async fn unreachable() -> Endpoint {
        let (listener, endpoint) = reachable().await;
        drop(listener);
        endpoint
    }

    #[tokio::test]
    async fn test_earliest_reachable_candidate_wins() {
        let a = unreachable().await;
        let (listener_b, b) = reachable().await;
        let (_listener_c, c) = reachable().await;

        let (client, _inbound) =
            DiscoveryService::find_connection(&[a, b.clone(), c])
                .await
                .unwrap();

        assert_eq!(client.endpoint(), &b);
        // And B actually sees the connection.
        let accepted = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            listener_b.accept(),
        )
        .await;
        assert!(accepted.is_ok());
    }

    #[tokio::test]
    async fn test_all_unreachable_reports_discovery_failure() {
        let a = unreachable().await;
        let b = unreachable().await;

        let result = DiscoveryService::find_connection(&[a, b]).await;
        assert!(matches!(
            result.map(|_| ()),
            Err(HotlineError::Discovery { attempted: 2 })
        ));
    }

    #[tokio::test]
    async fn test_empty_candidate_list_fails() {
        let result = DiscoveryService::find_connection(&[]).await;
        assert!(matches!(
            result.map(|_| ()),
            Err(HotlineError::Discovery { attempted: 0 })
        ));
    }
}
