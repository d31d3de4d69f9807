//! Transports carry helper commands and proxied byte streams to a node.

use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hoster_id::NodeId;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::debug;

use crate::credentials::NodeConnection;
use crate::error::PoolError;
use crate::key::PrivateKey;

/// A bidirectional byte stream to a port on a node.
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for T {}

pub type BoxedStream = Box<dyn ByteStream>;

/// Captured result of one helper invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// A channel to one node.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run the helper with `command` and `args`, feeding `stdin` if given.
    async fn exec(
        &self,
        command: &str,
        args: &[String],
        stdin: Option<Vec<u8>>,
    ) -> io::Result<ExecOutput>;

    /// Open a byte stream to `addr` as seen from the node.
    async fn open_stream(&self, addr: &str) -> io::Result<BoxedStream>;

    /// Host that deployment ports on this node are reachable at.
    fn stream_host(&self) -> &str;

    /// Whether the channel can still carry traffic.
    fn is_alive(&self) -> bool;

    async fn close(&self);
}

/// Opens transports to remote nodes.
#[async_trait]
pub trait TunnelDialer: Send + Sync {
    async fn dial(
        &self,
        node_id: &NodeId,
        connection: &NodeConnection,
        key: &PrivateKey,
    ) -> Result<Arc<dyn Transport>, PoolError>;
}

/// Format `host:port`, bracketing IPv6 literals.
pub(crate) fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Spawn `command`, feed it `stdin` and collect its output.
pub(crate) async fn run_to_completion(
    mut command: Command,
    stdin: Option<Vec<u8>>,
) -> io::Result<ExecOutput> {
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;

    if let (Some(body), Some(mut pipe)) = (stdin, child.stdin.take()) {
        match pipe.write_all(&body).await {
            Ok(()) => {}
            // The helper may exit before reading a body it does not need.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Err(e) => return Err(e),
        }
        drop(pipe);
    }

    let output = child.wait_with_output().await?;
    Ok(ExecOutput {
        exit_code: output.status.code(),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Runs the helper directly on this host.
pub struct LocalTransport {
    helper_path: String,
    connect_timeout: Duration,
}

impl LocalTransport {
    pub fn new(helper_path: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            helper_path: helper_path.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn exec(
        &self,
        command: &str,
        args: &[String],
        stdin: Option<Vec<u8>>,
    ) -> io::Result<ExecOutput> {
        debug!(helper = %self.helper_path, command, "Running local helper");
        let mut cmd = Command::new(&self.helper_path);
        cmd.arg(command).args(args);
        run_to_completion(cmd, stdin).await
    }

    async fn open_stream(&self, addr: &str) -> io::Result<BoxedStream> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn stream_host(&self) -> &str {
        "127.0.0.1"
    }

    fn is_alive(&self) -> bool {
        true
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_join_host_port() {
        assert_eq!(join_host_port("10.0.0.1", 80), "10.0.0.1:80");
        assert_eq!(join_host_port("::1", 80), "[::1]:80");
        assert_eq!(join_host_port("[::1]", 80), "[::1]:80");
    }

    #[tokio::test]
    async fn test_local_exec_feeds_stdin() {
        let transport = LocalTransport::new("cat", Duration::from_secs(1));
        // `cat -` echoes stdin back.
        let out = transport
            .exec("-", &[], Some(b"{\"success\":true}".to_vec()))
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout, b"{\"success\":true}");
    }

    #[tokio::test]
    async fn test_local_exec_missing_binary() {
        let transport = LocalTransport::new("/nonexistent/hoster-helper", Duration::from_secs(1));
        assert!(transport.exec("ping", &[], None).await.is_err());
    }

    #[tokio::test]
    async fn test_local_open_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"hi").await.unwrap();
        });

        let transport = LocalTransport::new("hoster-helper", Duration::from_secs(1));
        let mut stream = transport.open_stream(&addr.to_string()).await.unwrap();
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }
}
