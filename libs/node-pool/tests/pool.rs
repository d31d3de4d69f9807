//! Connection pool behaviour against a fake dialer.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hoster_id::NodeId;
use hoster_node_pool::{
    BoxedStream, ExecOutput, HelperClient, KeyDecryptor, LocalTransport, NodeConnection,
    NodePool, PoolError, PrivateKey, StaticCredentialStore, Transport, TunnelDialer,
};

struct FakeTunnel {
    alive: AtomicBool,
    closed: AtomicBool,
    /// Makes `is_alive` block, keeping the slot locked on the cached fast path.
    slow_check: AtomicBool,
}

#[async_trait]
impl Transport for FakeTunnel {
    async fn exec(
        &self,
        _command: &str,
        _args: &[String],
        _stdin: Option<Vec<u8>>,
    ) -> io::Result<ExecOutput> {
        Ok(ExecOutput {
            exit_code: Some(0),
            stdout: br#"{"success":true,"data":{"ok":true}}"#.to_vec(),
            stderr: Vec::new(),
        })
    }

    async fn open_stream(&self, _addr: &str) -> io::Result<BoxedStream> {
        Err(io::Error::other("not supported"))
    }

    fn stream_host(&self) -> &str {
        "10.0.0.1"
    }

    fn is_alive(&self) -> bool {
        if self.slow_check.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(300));
        }
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.alive.store(false, Ordering::SeqCst);
    }
}

/// Dialer that counts dials, takes `delay` per dial and can be told to fail.
struct FakeDialer {
    dials: AtomicU64,
    delay: Duration,
    fail: AtomicBool,
    last: std::sync::Mutex<Option<Arc<FakeTunnel>>>,
    last_key: std::sync::Mutex<Vec<u8>>,
}

impl FakeDialer {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            dials: AtomicU64::new(0),
            delay,
            fail: AtomicBool::new(false),
            last: std::sync::Mutex::new(None),
            last_key: std::sync::Mutex::new(Vec::new()),
        })
    }

    fn dials(&self) -> u64 {
        self.dials.load(Ordering::SeqCst)
    }

    fn last_tunnel(&self) -> Arc<FakeTunnel> {
        self.last.lock().unwrap().clone().unwrap()
    }
}

#[async_trait]
impl TunnelDialer for FakeDialer {
    async fn dial(
        &self,
        node_id: &NodeId,
        _connection: &NodeConnection,
        key: &PrivateKey,
    ) -> Result<Arc<dyn Transport>, PoolError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        *self.last_key.lock().unwrap() = key.as_bytes().to_vec();
        tokio::time::sleep(self.delay).await;

        if self.fail.load(Ordering::SeqCst) {
            return Err(PoolError::Connectivity {
                node_id: node_id.clone(),
                message: "connection refused".into(),
            });
        }

        let tunnel = Arc::new(FakeTunnel {
            alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            slow_check: AtomicBool::new(false),
        });
        *self.last.lock().unwrap() = Some(tunnel.clone());
        Ok(tunnel)
    }
}

fn node(s: &str) -> NodeId {
    NodeId::parse(s).unwrap()
}

struct Fixture {
    pool: Arc<NodePool>,
    dialer: Arc<FakeDialer>,
    credentials: Arc<StaticCredentialStore>,
}

fn fixture(delay: Duration, dial_timeout: Duration, nodes: &[&str]) -> Fixture {
    let keys = KeyDecryptor::new(&[42; 32]).unwrap();
    let credentials = Arc::new(StaticCredentialStore::new());
    for id in nodes {
        credentials.insert(
            node(id),
            NodeConnection {
                host: format!("{id}.internal"),
                port: 22,
                user: "deploy".into(),
                encrypted_private_key: keys.encrypt(b"PRIVATE KEY").unwrap(),
            },
        );
    }

    let dialer = FakeDialer::new(delay);
    let local = Arc::new(HelperClient::new(
        NodeId::local(),
        Arc::new(LocalTransport::new("hoster-helper", Duration::from_secs(1))),
    ));
    let pool = Arc::new(NodePool::new(
        local,
        credentials.clone(),
        dialer.clone(),
        keys,
        dial_timeout,
    ));

    Fixture {
        pool,
        dialer,
        credentials,
    }
}

#[tokio::test]
async fn test_local_sentinel_never_dials() {
    let fx = fixture(Duration::ZERO, Duration::from_secs(1), &[]);
    let client = fx.pool.get_client(&NodeId::local()).await.unwrap();
    assert!(client.node_id().is_local());
    assert_eq!(fx.dialer.dials(), 0);
    assert!(fx.pool.cached_nodes().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_callers_share_one_dial() {
    let fx = fixture(Duration::from_millis(50), Duration::from_secs(5), &["node_a"]);

    let mut handles = Vec::new();
    for _ in 0..32 {
        let pool = fx.pool.clone();
        handles.push(tokio::spawn(async move {
            pool.get_client(&node("node_a")).await.map(|c| c.node_id().clone())
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), node("node_a"));
    }

    assert_eq!(fx.dialer.dials(), 1);
    assert_eq!(fx.pool.dial_count(), 1);
    assert_eq!(fx.pool.cached_nodes().await, vec![node("node_a")]);
}

#[tokio::test]
async fn test_different_nodes_dial_in_parallel() {
    let fx = fixture(
        Duration::from_millis(200),
        Duration::from_secs(5),
        &["node_a", "node_b", "node_c"],
    );

    let (node_a, node_b, node_c) = (node("node_a"), node("node_b"), node("node_c"));
    let started = std::time::Instant::now();
    let (a, b, c) = tokio::join!(
        fx.pool.get_client(&node_a),
        fx.pool.get_client(&node_b),
        fx.pool.get_client(&node_c),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(fx.dialer.dials(), 3);
    // Serialized dials would take at least 600ms.
    assert!(started.elapsed() < Duration::from_millis(550));
}

#[tokio::test]
async fn test_key_is_decrypted_before_dial() {
    let fx = fixture(Duration::ZERO, Duration::from_secs(1), &["node_a"]);
    fx.pool.get_client(&node("node_a")).await.unwrap();
    assert_eq!(&*fx.dialer.last_key.lock().unwrap(), b"PRIVATE KEY");
}

#[tokio::test]
async fn test_invalidate_forces_redial() {
    let fx = fixture(Duration::ZERO, Duration::from_secs(1), &["node_a"]);

    fx.pool.get_client(&node("node_a")).await.unwrap();
    let first = fx.dialer.last_tunnel();
    fx.pool.get_client(&node("node_a")).await.unwrap();
    assert_eq!(fx.dialer.dials(), 1);

    fx.pool.invalidate(&node("node_a")).await;
    assert!(first.closed.load(Ordering::SeqCst));
    assert!(fx.pool.cached_nodes().await.is_empty());

    fx.pool.get_client(&node("node_a")).await.unwrap();
    assert_eq!(fx.dialer.dials(), 2);
}

#[tokio::test]
async fn test_dead_tunnel_is_replaced() {
    let fx = fixture(Duration::ZERO, Duration::from_secs(1), &["node_a"]);

    fx.pool.get_client(&node("node_a")).await.unwrap();
    fx.dialer.last_tunnel().alive.store(false, Ordering::SeqCst);

    let client = fx.pool.get_client(&node("node_a")).await.unwrap();
    assert!(client.is_alive());
    assert_eq!(fx.dialer.dials(), 2);
}

#[tokio::test]
async fn test_dial_failure_is_connectivity_and_not_cached() {
    let fx = fixture(Duration::ZERO, Duration::from_secs(1), &["node_a"]);
    fx.dialer.fail.store(true, Ordering::SeqCst);

    let err = match fx.pool.get_client(&node("node_a")).await {
        Ok(_) => panic!("dial should fail"),
        Err(e) => e,
    };
    assert!(matches!(err, PoolError::Connectivity { .. }));
    assert_eq!(fx.pool.stats().await.dial_failures, 1);

    fx.dialer.fail.store(false, Ordering::SeqCst);
    assert!(fx.pool.get_client(&node("node_a")).await.is_ok());
    assert_eq!(fx.dialer.dials(), 2);
}

#[tokio::test]
async fn test_dial_timeout() {
    let fx = fixture(Duration::from_secs(30), Duration::from_millis(50), &["node_slow", "node_a"]);

    let err = match fx.pool.get_client(&node("node_slow")).await {
        Ok(_) => panic!("dial should time out"),
        Err(e) => e,
    };
    assert!(matches!(err, PoolError::Timeout { .. }));
    assert!(err.to_string().contains("node_slow"));
}

#[tokio::test]
async fn test_missing_credentials() {
    let fx = fixture(Duration::ZERO, Duration::from_secs(1), &[]);
    let err = match fx.pool.get_client(&node("node_unknown")).await {
        Ok(_) => panic!("lookup should fail"),
        Err(e) => e,
    };
    assert!(matches!(err, PoolError::Credentials { .. }));
    assert_eq!(fx.dialer.dials(), 0);
}

#[tokio::test]
async fn test_undecryptable_key() {
    let fx = fixture(Duration::ZERO, Duration::from_secs(1), &[]);
    let other = KeyDecryptor::new(&[7; 32]).unwrap();
    fx.credentials.insert(
        node("node_a"),
        NodeConnection {
            host: "h".into(),
            port: 22,
            user: "u".into(),
            encrypted_private_key: other.encrypt(b"KEY").unwrap(),
        },
    );

    let err = match fx.pool.get_client(&node("node_a")).await {
        Ok(_) => panic!("decrypt should fail"),
        Err(e) => e,
    };
    assert!(matches!(err, PoolError::Key { .. }));
    assert_eq!(fx.dialer.dials(), 0);
}

#[tokio::test]
async fn test_remove_during_dial() {
    let fx = fixture(Duration::from_millis(100), Duration::from_secs(5), &["node_a"]);

    let pool = fx.pool.clone();
    let first = tokio::spawn(async move { pool.get_client(&node("node_a")).await.is_ok() });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let pool = fx.pool.clone();
    let waiter = tokio::spawn(async move {
        match pool.get_client(&node("node_a")).await {
            Ok(_) => None,
            Err(e) => Some(e),
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    fx.pool.remove(&node("node_a")).await;

    assert!(first.await.unwrap());
    // The waiter queued before the removal and may still receive the cached client.
    assert!(matches!(
        waiter.await.unwrap(),
        Some(PoolError::NodeRemoved(_)) | None
    ));
    assert!(fx.dialer.last_tunnel().closed.load(Ordering::SeqCst));
    assert!(fx.pool.cached_nodes().await.is_empty());
}

#[tokio::test]
async fn test_client_calls_go_through_cached_tunnel() {
    let fx = fixture(Duration::ZERO, Duration::from_secs(1), &["node_a"]);
    let client = fx.pool.get_client(&node("node_a")).await.unwrap();
    client.ping().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cached_nodes_counts_busy_slots() {
    let fx = fixture(Duration::ZERO, Duration::from_secs(1), &["node_a"]);
    fx.pool.get_client(&node("node_a")).await.unwrap();
    fx.dialer.last_tunnel().slow_check.store(true, Ordering::SeqCst);

    let pool = fx.pool.clone();
    let busy = tokio::spawn(async move { pool.get_client(&node("node_a")).await.is_ok() });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(fx.pool.cached_nodes().await, vec![node("node_a")]);
    assert_eq!(fx.pool.stats().await.cached, 1);
    assert!(busy.await.unwrap());
    assert_eq!(fx.dialer.dials(), 1);
}
