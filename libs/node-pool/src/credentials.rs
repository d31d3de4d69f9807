//! Node connection parameters.
//!
//! The resource store owns node records; the pool only needs the SSH endpoint and the
//! encrypted private key for a node, fetched on demand.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use hoster_id::NodeId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_SSH_PORT: u16 = 22;

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// SSH endpoint and sealed private key for one remote node.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConnection {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub user: String,
    /// `base64(nonce || ciphertext)`, see [`crate::KeyDecryptor`].
    pub encrypted_private_key: String,
}

impl std::fmt::Debug for NodeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no connection record for node {0}")]
    NotFound(NodeId),

    #[error("credential store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("credential store returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Source of node connection parameters.
#[async_trait]
pub trait NodeCredentialStore: Send + Sync {
    async fn connection(&self, node_id: &NodeId) -> Result<NodeConnection, CredentialError>;
}

/// Fetches connection records from the control plane API.
pub struct HttpCredentialStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCredentialStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CredentialError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NodeCredentialStore for HttpCredentialStore {
    async fn connection(&self, node_id: &NodeId) -> Result<NodeConnection, CredentialError> {
        let url = format!("{}/v1/nodes/{}/connection", self.base_url, node_id);
        debug!(node_id = %node_id, url = %url, "Fetching node connection");

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CredentialError::NotFound(node_id.clone()));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(node_id = %node_id, status = %status, "Credential store request failed");
            return Err(CredentialError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

/// In-memory connection records, for tests and single-host setups.
#[derive(Default)]
pub struct StaticCredentialStore {
    records: RwLock<HashMap<NodeId, NodeConnection>>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, node_id: NodeId, connection: NodeConnection) {
        if let Ok(mut records) = self.records.write() {
            records.insert(node_id, connection);
        }
    }

    pub fn remove(&self, node_id: &NodeId) -> Option<NodeConnection> {
        self.records.write().ok()?.remove(node_id)
    }
}

#[async_trait]
impl NodeCredentialStore for StaticCredentialStore {
    async fn connection(&self, node_id: &NodeId) -> Result<NodeConnection, CredentialError> {
        self.records
            .read()
            .ok()
            .and_then(|records| records.get(node_id).cloned())
            .ok_or_else(|| CredentialError::NotFound(node_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn node(s: &str) -> NodeId {
        NodeId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_http_store_fetches_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/nodes/node_a/connection"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "host": "10.0.0.5",
                "user": "deploy",
                "encrypted_private_key": "c2VhbGVk"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = HttpCredentialStore::new(format!("{}/", server.uri())).unwrap();
        let conn = store.connection(&node("node_a")).await.unwrap();
        assert_eq!(conn.host, "10.0.0.5");
        assert_eq!(conn.port, DEFAULT_SSH_PORT);
        assert_eq!(conn.user, "deploy");
    }

    #[tokio::test]
    async fn test_http_store_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = HttpCredentialStore::new(server.uri()).unwrap();
        let err = store.connection(&node("node_gone")).await.unwrap_err();
        assert!(matches!(err, CredentialError::NotFound(id) if id.as_str() == "node_gone"));
    }

    #[tokio::test]
    async fn test_http_store_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let store = HttpCredentialStore::new(server.uri()).unwrap();
        let err = store.connection(&node("node_a")).await.unwrap_err();
        assert!(matches!(err, CredentialError::Status { status: 500, ref body } if body == "boom"));
    }

    #[tokio::test]
    async fn test_static_store() {
        let store = StaticCredentialStore::new();
        let record = NodeConnection {
            host: "h".into(),
            port: 2222,
            user: "u".into(),
            encrypted_private_key: "k".into(),
        };
        store.insert(node("node_a"), record.clone());
        assert_eq!(store.connection(&node("node_a")).await.unwrap(), record);
        assert!(!format!("{record:?}").contains("encrypted_private_key"));
        store.remove(&node("node_a"));
        assert!(store.connection(&node("node_a")).await.is_err());
    }
}
