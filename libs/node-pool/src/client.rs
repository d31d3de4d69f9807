//! Container runtime client.
//!
//! [`RuntimeClient`] is the uniform interface handed out by the pool. [`HelperClient`]
//! implements it over any [`Transport`] by invoking the node helper and decoding its
//! response envelope.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hoster_id::NodeId;
use hoster_remote_protocol::{
    Command, ContainerCreated, ContainerInfo, ContainerLogs, ContainerLogsRequest,
    ContainerStats, ContainerSummary, CreateContainerRequest, CreateNetworkRequest,
    CreateVolumeRequest, Envelope, ImageExists, ListContainersRequest, NetworkAttachment,
    NetworkCreated, PullImageRequest, RemoveContainerRequest, RemoveVolumeRequest,
    VersionInfo, VolumeCreated, EXIT_USAGE,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::transport::{join_host_port, BoxedStream, Transport};

/// A live connection to one node's container runtime.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    fn node_id(&self) -> &NodeId;

    /// Whether the underlying channel can still carry traffic.
    fn is_alive(&self) -> bool;

    async fn version(&self) -> Result<VersionInfo, ClientError>;
    async fn ping(&self) -> Result<(), ClientError>;

    async fn create_container(
        &self,
        request: &CreateContainerRequest,
    ) -> Result<ContainerCreated, ClientError>;
    async fn start_container(&self, id: &str) -> Result<(), ClientError>;
    async fn stop_container(&self, id: &str, timeout: Option<Duration>)
        -> Result<(), ClientError>;
    async fn remove_container(
        &self,
        id: &str,
        request: &RemoveContainerRequest,
    ) -> Result<(), ClientError>;
    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo, ClientError>;
    async fn list_containers(
        &self,
        request: &ListContainersRequest,
    ) -> Result<Vec<ContainerSummary>, ClientError>;
    async fn container_logs(
        &self,
        id: &str,
        request: &ContainerLogsRequest,
    ) -> Result<ContainerLogs, ClientError>;
    async fn container_stats(&self, id: &str) -> Result<ContainerStats, ClientError>;

    async fn create_network(
        &self,
        request: &CreateNetworkRequest,
    ) -> Result<NetworkCreated, ClientError>;
    async fn remove_network(&self, name: &str) -> Result<(), ClientError>;
    async fn connect_network(&self, request: &NetworkAttachment) -> Result<(), ClientError>;
    async fn disconnect_network(&self, request: &NetworkAttachment) -> Result<(), ClientError>;

    async fn create_volume(&self, request: &CreateVolumeRequest)
        -> Result<VolumeCreated, ClientError>;
    async fn remove_volume(
        &self,
        name: &str,
        request: &RemoveVolumeRequest,
    ) -> Result<(), ClientError>;

    async fn pull_image(&self, request: &PullImageRequest) -> Result<(), ClientError>;
    async fn image_exists(&self, image: &str) -> Result<bool, ClientError>;

    /// Open a byte stream to `port` on the node, for proxying.
    async fn open_stream(&self, port: u16) -> Result<BoxedStream, ClientError>;
}

/// Runs helper commands over a transport.
pub struct HelperClient {
    node_id: NodeId,
    transport: Arc<dyn Transport>,
}

impl HelperClient {
    pub fn new(node_id: NodeId, transport: Arc<dyn Transport>) -> Self {
        Self { node_id, transport }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    async fn call<T: DeserializeOwned>(
        &self,
        command: Command,
        args: Vec<String>,
        body: Option<&(dyn ErasedBody)>,
    ) -> Result<T, ClientError> {
        let envelope = self.invoke(command, args, body).await?;
        Ok(envelope.decode(command.as_str())?)
    }

    async fn call_unit(
        &self,
        command: Command,
        args: Vec<String>,
        body: Option<&(dyn ErasedBody)>,
    ) -> Result<(), ClientError> {
        let envelope = self.invoke(command, args, body).await?;
        envelope.into_result(command.as_str())?;
        Ok(())
    }

    async fn invoke(
        &self,
        command: Command,
        args: Vec<String>,
        body: Option<&(dyn ErasedBody)>,
    ) -> Result<Envelope, ClientError> {
        let name = command.as_str();
        let stdin = body
            .map(|b| b.to_json())
            .transpose()
            .map_err(|e| ClientError::Protocol {
                command: name.to_string(),
                exit_code: None,
                message: format!("failed to encode request: {e}"),
            })?;

        let output = self
            .transport
            .exec(name, &args, stdin)
            .await
            .map_err(|source| ClientError::Transport {
                command: name.to_string(),
                source,
            })?;

        debug!(
            node_id = %self.node_id,
            command = name,
            exit_code = ?output.exit_code,
            "Helper command finished"
        );

        match serde_json::from_slice::<Envelope>(&output.stdout) {
            Ok(envelope) => Ok(envelope),
            Err(e) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(
                    node_id = %self.node_id,
                    command = name,
                    exit_code = ?output.exit_code,
                    stderr = %stderr.trim(),
                    "Unreadable helper output"
                );
                // ssh reports its own failures with exit status 255 and no envelope.
                if output.exit_code == Some(255) || output.exit_code.is_none() {
                    return Err(ClientError::Transport {
                        command: name.to_string(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::ConnectionAborted,
                            stderr.trim().to_string(),
                        ),
                    });
                }
                let message = if output.exit_code == Some(EXIT_USAGE) {
                    format!("usage error: {}", stderr.trim())
                } else {
                    format!("{e}: {}", stderr.trim())
                };
                Err(ClientError::Protocol {
                    command: name.to_string(),
                    exit_code: output.exit_code,
                    message,
                })
            }
        }
    }
}

/// Object-safe view of a serializable request body.
trait ErasedBody: Sync {
    fn to_json(&self) -> serde_json::Result<Vec<u8>>;
}

impl<T: Serialize + Sync> ErasedBody for T {
    fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[async_trait]
impl RuntimeClient for HelperClient {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    async fn version(&self) -> Result<VersionInfo, ClientError> {
        self.call(Command::Version, vec![], None).await
    }

    async fn ping(&self) -> Result<(), ClientError> {
        self.call_unit(Command::Ping, vec![], None).await
    }

    async fn create_container(
        &self,
        request: &CreateContainerRequest,
    ) -> Result<ContainerCreated, ClientError> {
        self.call(Command::CreateContainer, vec![], Some(request))
            .await
    }

    async fn start_container(&self, id: &str) -> Result<(), ClientError> {
        self.call_unit(Command::StartContainer, vec![id.to_string()], None)
            .await
    }

    async fn stop_container(
        &self,
        id: &str,
        timeout: Option<Duration>,
    ) -> Result<(), ClientError> {
        let mut args = vec![id.to_string()];
        if let Some(timeout) = timeout {
            args.push(timeout.as_millis().to_string());
        }
        self.call_unit(Command::StopContainer, args, None).await
    }

    async fn remove_container(
        &self,
        id: &str,
        request: &RemoveContainerRequest,
    ) -> Result<(), ClientError> {
        self.call_unit(Command::RemoveContainer, vec![id.to_string()], Some(request))
            .await
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo, ClientError> {
        self.call(Command::InspectContainer, vec![id.to_string()], None)
            .await
    }

    async fn list_containers(
        &self,
        request: &ListContainersRequest,
    ) -> Result<Vec<ContainerSummary>, ClientError> {
        self.call(Command::ListContainers, vec![], Some(request))
            .await
    }

    async fn container_logs(
        &self,
        id: &str,
        request: &ContainerLogsRequest,
    ) -> Result<ContainerLogs, ClientError> {
        self.call(Command::ContainerLogs, vec![id.to_string()], Some(request))
            .await
    }

    async fn container_stats(&self, id: &str) -> Result<ContainerStats, ClientError> {
        self.call(Command::ContainerStats, vec![id.to_string()], None)
            .await
    }

    async fn create_network(
        &self,
        request: &CreateNetworkRequest,
    ) -> Result<NetworkCreated, ClientError> {
        self.call(Command::CreateNetwork, vec![], Some(request))
            .await
    }

    async fn remove_network(&self, name: &str) -> Result<(), ClientError> {
        self.call_unit(Command::RemoveNetwork, vec![name.to_string()], None)
            .await
    }

    async fn connect_network(&self, request: &NetworkAttachment) -> Result<(), ClientError> {
        self.call_unit(Command::ConnectNetwork, vec![], Some(request))
            .await
    }

    async fn disconnect_network(&self, request: &NetworkAttachment) -> Result<(), ClientError> {
        self.call_unit(Command::DisconnectNetwork, vec![], Some(request))
            .await
    }

    async fn create_volume(
        &self,
        request: &CreateVolumeRequest,
    ) -> Result<VolumeCreated, ClientError> {
        self.call(Command::CreateVolume, vec![], Some(request))
            .await
    }

    async fn remove_volume(
        &self,
        name: &str,
        request: &RemoveVolumeRequest,
    ) -> Result<(), ClientError> {
        self.call_unit(Command::RemoveVolume, vec![name.to_string()], Some(request))
            .await
    }

    async fn pull_image(&self, request: &PullImageRequest) -> Result<(), ClientError> {
        self.call_unit(Command::PullImage, vec![], Some(request))
            .await
    }

    async fn image_exists(&self, image: &str) -> Result<bool, ClientError> {
        let found: ImageExists = self
            .call(Command::ImageExists, vec![image.to_string()], None)
            .await?;
        Ok(found.exists)
    }

    async fn open_stream(&self, port: u16) -> Result<BoxedStream, ClientError> {
        let addr = join_host_port(self.transport.stream_host(), port);
        self.transport
            .open_stream(&addr)
            .await
            .map_err(|source| ClientError::Transport {
                command: format!("stream {addr}"),
                source,
            })
    }
}
