//! # hoster-node-pool
//!
//! Hands out ready-to-use container runtime clients for nodes.
//!
//! ## Overview
//!
//! - The local node sentinel is served by a pre-built client that runs the helper
//!   executable directly.
//! - Remote nodes are reached through an SSH control-master tunnel. Tunnels are dialed on
//!   demand, cached per node and shared by every caller.
//! - Dialing is single-flight per node: concurrent callers for the same node wait on one
//!   dial while callers for other nodes proceed in parallel.
//! - Every dial is bounded by a timeout; failures surface as connectivity errors and never
//!   poison the pool.
//!
//! Node private keys are stored encrypted; the [`KeyDecryptor`] supplied at construction
//! is the only way to recover them.

mod client;
mod config;
mod credentials;
mod error;
mod key;
mod pool;
mod ssh;
mod transport;

pub use client::{HelperClient, RuntimeClient};
pub use config::PoolConfig;
pub use credentials::{
    CredentialError, HttpCredentialStore, NodeConnection, NodeCredentialStore,
    StaticCredentialStore, DEFAULT_SSH_PORT,
};
pub use error::{ClientError, PoolError};
pub use key::{KeyDecryptor, KeyError, PrivateKey};
pub use pool::{ClientProvider, NodePool, PoolStats};
pub use ssh::{SshDialer, SshTunnel};
pub use transport::{BoxedStream, ByteStream, ExecOutput, LocalTransport, Transport, TunnelDialer};
