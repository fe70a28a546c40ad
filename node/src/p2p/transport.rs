//! Peer transport (C1, spec.md §4.1): one call, given a peer, a query
//! string, a POST body and headers, performs the HTTP call and returns
//! response bytes or a `NodeError::Transport` carrying the peer's
//! identity. Retries are explicitly NOT performed at this layer — that is
//! the peer pool's job (C2).

use crate::error::{NodeError, NodeResult};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One upstream peer: a name, a base endpoint, and a small pool of
/// permits standing in for `countConnections` persistent connections
/// (spec.md §4.1, "typically 1-8").
#[derive(Debug)]
pub struct PeerTransport {
    pub name: String,
    endpoint: String,
    client: Client,
    connection_slots: Arc<Semaphore>,
}

impl PeerTransport {
    pub fn new(name: String, endpoint: String, count_connections: usize) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("reqwest client configuration is static and always valid");
        Self {
            name,
            endpoint,
            client,
            connection_slots: Arc::new(Semaphore::new(count_connections.max(1))),
        }
    }

    /// Performs one call against this peer's endpoint. `query` is appended
    /// as-is to the base URL; `body`, when present, is POSTed.
    pub async fn call(&self, query: &str, body: Option<Vec<u8>>) -> NodeResult<Vec<u8>> {
        let _permit = self
            .connection_slots
            .acquire()
            .await
            .expect("semaphore is never closed");

        let url = format!("{}{}", self.endpoint, query);
        let request = match body {
            Some(bytes) => self.client.post(&url).body(bytes),
            None => self.client.get(&url),
        };

        let response = request.send().await.map_err(|e| NodeError::Transport {
            peer: self.name.clone(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(NodeError::Transport {
                peer: self.name.clone(),
                message: format!("http status {}", response.status()),
            });
        }

        response.bytes().await.map(|b| b.to_vec()).map_err(|e| NodeError::Transport {
            peer: self.name.clone(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_does_not_panic() {
        let _ = PeerTransport::new("peer-a".into(), "http://localhost:1".into(), 4);
    }
}
