//! Bidirectional byte relay between a client and its upstream

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const BUF_SIZE: usize = 16 * 1024;

/// Lifecycle of a CONNECT tunnel
///
/// `Dialing` ends in `Rejected` (blacklisted), `Failed` (dial error) or
/// `Open`. An open tunnel moves to `Closing` as soon as either direction
/// stops and to `Closed` once both legs are shut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Dialing,
    Rejected,
    Failed,
    Open,
    Closing,
    Closed,
}

/// Bytes forwarded in each direction over a tunnel's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TunnelStats {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
}

/// Copy `source` into `destination` until end of stream, an I/O error, or
/// `done` is cancelled by the opposite direction
///
/// On the way out `done` is cancelled and `destination` is shut down, so the
/// peer direction stops promptly. Errors end the copy but are not returned:
/// there is nobody left to report them to. Returns the number of bytes copied.
pub async fn relay<R, W>(mut destination: W, mut source: R, done: CancellationToken) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // Cancels on drop, including if this task panics
    let guard = done.clone().drop_guard();
    let mut buf = vec![0u8; BUF_SIZE];
    let mut copied = 0u64;

    loop {
        let n = tokio::select! {
            read = source.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!("Relay read ended: {}", e);
                    break;
                }
            },
            _ = done.cancelled() => break,
        };

        tokio::select! {
            written = destination.write_all(&buf[..n]) => {
                if let Err(e) = written {
                    debug!("Relay write ended: {}", e);
                    break;
                }
            }
            _ = done.cancelled() => break,
        }
        copied += n as u64;
    }

    drop(guard);
    let _ = destination.shutdown().await;
    copied
}

/// An established tunnel between a client stream and an upstream stream
pub struct Tunnel<C, U> {
    client: C,
    upstream: U,
    state: watch::Sender<TunnelState>,
}

impl<C, U> Tunnel<C, U>
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    U: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(client: C, upstream: U) -> Self {
        let (state, _) = watch::channel(TunnelState::Open);
        Self {
            client,
            upstream,
            state,
        }
    }

    /// Watch the tunnel's state transitions
    pub fn subscribe(&self) -> watch::Receiver<TunnelState> {
        self.state.subscribe()
    }

    /// Relay in both directions until either side closes
    ///
    /// Each direction runs on its own task. When the first one finishes the
    /// other is cancelled; both streams are closed by the time this returns.
    pub async fn run(self) -> TunnelStats {
        let done = CancellationToken::new();
        let (client_read, client_write) = tokio::io::split(self.client);
        let (upstream_read, upstream_write) = tokio::io::split(self.upstream);

        let outbound = tokio::spawn(relay(upstream_write, client_read, done.clone()));
        let inbound = tokio::spawn(relay(client_write, upstream_read, done.clone()));

        done.cancelled().await;
        self.state.send_replace(TunnelState::Closing);

        let stats = TunnelStats {
            client_to_upstream: outbound.await.unwrap_or_default(),
            upstream_to_client: inbound.await.unwrap_or_default(),
        };
        self.state.send_replace(TunnelState::Closed);
        stats
    }
}
