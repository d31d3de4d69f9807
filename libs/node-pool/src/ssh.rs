//! SSH tunnels built on an OpenSSH control master.
//!
//! A dial starts `ssh -M -S <socket> -N` against the node and waits until the master
//! answers `-O check`. Helper commands and proxied streams then ride the master's
//! multiplexed connection, so only the dial pays for key exchange.
//!
//! The decrypted private key is written to a 0600 temporary file for the duration of the
//! handshake and removed as soon as the master is up (or the dial is abandoned).

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use hoster_id::NodeId;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::credentials::NodeConnection;
use crate::error::PoolError;
use crate::key::PrivateKey;
use crate::transport::{run_to_completion, BoxedStream, ExecOutput, Transport, TunnelDialer};

const CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Dials SSH control masters with the system `ssh` binary.
#[derive(Debug, Clone)]
pub struct SshDialer {
    ssh_binary: String,
    helper_path: String,
    runtime_dir: PathBuf,
    connect_timeout: Duration,
}

impl SshDialer {
    pub fn new(
        ssh_binary: impl Into<String>,
        helper_path: impl Into<String>,
        runtime_dir: impl Into<PathBuf>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            ssh_binary: ssh_binary.into(),
            helper_path: helper_path.into(),
            runtime_dir: runtime_dir.into(),
            connect_timeout,
        }
    }

    fn socket_path(&self, node_id: &NodeId) -> PathBuf {
        // Unix socket paths are short; node ids are not.
        let digest = hex::encode(Sha256::digest(node_id.as_str().as_bytes()));
        let nonce = rand::rng().next_u32();
        self.runtime_dir
            .join(format!("hoster-{}-{:08x}.sock", &digest[..12], nonce))
    }

    fn write_key_file(&self, key: &PrivateKey) -> io::Result<tempfile::NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("hoster-key-")
            .tempfile_in(&self.runtime_dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(key.as_bytes())?;
        if !key.as_bytes().ends_with(b"\n") {
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(file)
    }
}

#[async_trait]
impl TunnelDialer for SshDialer {
    async fn dial(
        &self,
        node_id: &NodeId,
        connection: &NodeConnection,
        key: &PrivateKey,
    ) -> Result<Arc<dyn Transport>, PoolError> {
        let connectivity = |message: String| PoolError::Connectivity {
            node_id: node_id.clone(),
            message,
        };

        let key_file = self
            .write_key_file(key)
            .map_err(|e| connectivity(format!("failed to stage private key: {e}")))?;
        let socket = self.socket_path(node_id);
        let destination = format!("{}@{}", connection.user, connection.host);

        info!(
            node_id = %node_id,
            host = %connection.host,
            port = connection.port,
            "Dialing SSH control master"
        );

        let mut master = Command::new(&self.ssh_binary)
            .arg("-M")
            .arg("-S")
            .arg(&socket)
            .arg("-N")
            .args(["-o", "BatchMode=yes"])
            .args([
                "-o".to_string(),
                format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            ])
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .args(["-o", "IdentitiesOnly=yes"])
            .args(["-o", "ServerAliveInterval=15"])
            .args(["-o", "ServerAliveCountMax=3"])
            .arg("-i")
            .arg(key_file.path())
            .arg("-p")
            .arg(connection.port.to_string())
            .arg(&destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| connectivity(format!("failed to spawn {}: {e}", self.ssh_binary)))?;

        loop {
            if let Some(status) = master
                .try_wait()
                .map_err(|e| connectivity(format!("failed to poll ssh master: {e}")))?
            {
                let mut stderr = String::new();
                if let Some(mut pipe) = master.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr).await;
                }
                warn!(node_id = %node_id, status = %status, stderr = %stderr.trim(), "SSH master exited");
                return Err(connectivity(format!(
                    "ssh exited with {status}: {}",
                    stderr.trim()
                )));
            }

            if control_check(&self.ssh_binary, &socket, &destination).await {
                break;
            }

            tokio::time::sleep(CHECK_INTERVAL).await;
        }

        // The master holds an authenticated connection; the key is no longer needed on disk.
        drop(key_file);

        info!(node_id = %node_id, socket = %socket.display(), "SSH control master ready");

        Ok(Arc::new(SshTunnel {
            node_id: node_id.clone(),
            host: connection.host.clone(),
            port: connection.port,
            destination,
            socket,
            ssh_binary: self.ssh_binary.clone(),
            helper_path: self.helper_path.clone(),
            master: Mutex::new(Some(master)),
        }))
    }
}

async fn control_check(ssh_binary: &str, socket: &Path, destination: &str) -> bool {
    Command::new(ssh_binary)
        .arg("-S")
        .arg(socket)
        .args(["-O", "check"])
        .arg(destination)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Quote `arg` for the remote login shell.
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_./:=@,+".contains(&b));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// An established control-master session to one node.
pub struct SshTunnel {
    node_id: NodeId,
    host: String,
    port: u16,
    destination: String,
    socket: PathBuf,
    ssh_binary: String,
    helper_path: String,
    master: Mutex<Option<Child>>,
}

impl SshTunnel {
    fn client_command(&self) -> Command {
        let mut cmd = Command::new(&self.ssh_binary);
        cmd.arg("-S")
            .arg(&self.socket)
            .args(["-o", "ControlMaster=no"])
            .args(["-o", "BatchMode=yes"])
            .arg("-p")
            .arg(self.port.to_string());
        cmd
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }
}

#[async_trait]
impl Transport for SshTunnel {
    async fn exec(
        &self,
        command: &str,
        args: &[String],
        stdin: Option<Vec<u8>>,
    ) -> io::Result<ExecOutput> {
        let remote = std::iter::once(self.helper_path.as_str())
            .chain(std::iter::once(command))
            .chain(args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ");

        debug!(node_id = %self.node_id, command, "Running remote helper");

        let mut cmd = self.client_command();
        cmd.arg(&self.destination).arg("--").arg(remote);
        run_to_completion(cmd, stdin).await
    }

    async fn open_stream(&self, addr: &str) -> io::Result<BoxedStream> {
        let mut child = self
            .client_command()
            .arg("-W")
            .arg(addr)
            .arg(&self.destination)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => return Err(io::Error::other("ssh stream pipes unavailable")),
        };

        Ok(Box::new(SshStream {
            stdout,
            stdin,
            child,
        }))
    }

    fn stream_host(&self) -> &str {
        &self.host
    }

    fn is_alive(&self) -> bool {
        let Ok(mut guard) = self.master.lock() else {
            return false;
        };
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)) && self.socket.exists(),
            None => false,
        }
    }

    async fn close(&self) {
        let master = self.master.lock().ok().and_then(|mut guard| guard.take());
        if let Some(mut child) = master {
            if let Err(e) = child.kill().await {
                debug!(node_id = %self.node_id, error = %e, "SSH master already gone");
            }
            info!(node_id = %self.node_id, "SSH control master closed");
        }
        let _ = std::fs::remove_file(&self.socket);
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket);
    }
}

/// `ssh -W` child process viewed as a socket.
///
/// ssh exits non-zero when the channel cannot be opened (e.g. the port is refused on the
/// node); EOF from such a child reads as an error rather than a clean close.
struct SshStream {
    stdout: ChildStdout,
    stdin: ChildStdin,
    child: Child,
}

impl AsyncRead for SshStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.stdout).poll_read(cx, buf))?;

        if buf.filled().len() == before {
            if let Ok(Some(status)) = this.child.try_wait() {
                if !status.success() {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        format!("ssh stream exited with {status}"),
                    )));
                }
            }
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for SshStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stdin).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stdin).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stdin).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("start-container"), "start-container");
        assert_eq!(shell_quote("ctr_01ABC"), "ctr_01ABC");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("$(reboot)"), "'$(reboot)'");
    }

    #[test]
    fn test_socket_path_is_short() {
        let dialer = SshDialer::new("ssh", "hoster-helper", "/tmp", Duration::from_secs(5));
        let long = NodeId::parse(&"n".repeat(128)).unwrap();
        let path = dialer.socket_path(&long);
        assert!(path.to_string_lossy().len() < 64);
    }

    #[test]
    fn test_key_file_is_private_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let dialer = SshDialer::new("ssh", "hoster-helper", dir.path(), Duration::from_secs(5));
        let keys = crate::KeyDecryptor::new(&[3; 32]).unwrap();
        let key = keys.decrypt(&keys.encrypt(b"KEY").unwrap()).unwrap();

        let file = dialer.write_key_file(&key).unwrap();
        let path = file.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"KEY\n");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
        drop(file);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_dial_fails_when_ssh_missing() {
        let dir = tempfile::tempdir().unwrap();
        let dialer = SshDialer::new(
            "/nonexistent/ssh",
            "hoster-helper",
            dir.path(),
            Duration::from_secs(1),
        );
        let keys = crate::KeyDecryptor::new(&[3; 32]).unwrap();
        let key = keys.decrypt(&keys.encrypt(b"KEY").unwrap()).unwrap();
        let conn = NodeConnection {
            host: "127.0.0.1".into(),
            port: 22,
            user: "deploy".into(),
            encrypted_private_key: String::new(),
        };
        let node = NodeId::parse("node_a").unwrap();

        let err = match dialer.dial(&node, &conn, &key).await {
            Ok(_) => panic!("dial should fail"),
            Err(e) => e,
        };
        assert!(matches!(err, PoolError::Connectivity { .. }));
        // Staged key removed on failure.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
