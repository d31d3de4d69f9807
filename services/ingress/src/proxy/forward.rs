//! Full-duplex byte forwarding between the client and its target.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

const COPY_BUFFER_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardOptions {
    /// Abort once neither direction has moved data for this long.
    pub idle_timeout: Option<Duration>,
    /// A target that closes or fails before sending anything is a failure, not a
    /// completed exchange.
    pub expect_response: bool,
}

#[derive(Debug, Error)]
pub enum ForwardError {
    /// The target went away before sending a byte. Nothing has been written to the
    /// client, so it can still be answered.
    #[error("target closed before responding: {0}")]
    NoResponse(io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Last time either direction moved data.
struct Activity {
    start: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.start.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(now, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Relaxed));
        self.start.elapsed().saturating_sub(last)
    }
}

/// Copy bytes both ways until both directions reach EOF.
///
/// EOF on one side half-closes the other. An error (or idle timeout) in either
/// direction aborts both, and the caller drops the streams, closing both ends.
///
/// Byte counts are added to the counters as data moves, so partial transfers are still
/// counted when the connection fails.
pub async fn proxy_bidirectional<A, B>(
    client: &mut A,
    target: &mut B,
    options: ForwardOptions,
    to_target: &AtomicU64,
    from_target: &AtomicU64,
) -> Result<(), ForwardError>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut target_read, mut target_write) = tokio::io::split(target);

    let activity = Activity::new();
    let responded = AtomicBool::new(!options.expect_response);

    let upstream = copy_half(&mut client_read, &mut target_write, &activity, to_target, None);
    let downstream = copy_half(
        &mut target_read,
        &mut client_write,
        &activity,
        from_target,
        Some(&responded),
    );

    let result = tokio::select! {
        result = async { tokio::try_join!(upstream, downstream).map(|_| ()) } => result,
        err = idle_watch(&activity, options.idle_timeout) => Err(err),
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if !responded.load(Ordering::Relaxed) => Err(ForwardError::NoResponse(e)),
        Err(e) => Err(ForwardError::Io(e)),
    }
}

/// `responded`, when given, is set before the first byte is written on. EOF while it
/// is still unset is reported as an error and the writer is left open.
async fn copy_half<R, W>(
    reader: &mut R,
    writer: &mut W,
    activity: &Activity,
    counter: &AtomicU64,
    responded: Option<&AtomicBool>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_BYTES];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            if responded.is_some_and(|r| !r.load(Ordering::Relaxed)) {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed without data",
                ));
            }
            break;
        }
        activity.touch();
        if let Some(responded) = responded {
            responded.store(true, Ordering::Relaxed);
        }
        writer.write_all(&buf[..n]).await?;
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
    writer.shutdown().await
}

async fn idle_watch(activity: &Activity, limit: Option<Duration>) -> io::Error {
    let Some(limit) = limit else {
        return std::future::pending().await;
    };
    loop {
        let idle = activity.idle_for();
        if idle >= limit {
            return io::Error::new(io::ErrorKind::TimedOut, "idle timeout");
        }
        tokio::time::sleep(limit - idle).await;
    }
}
