//! Per-request CONNECT handling
//!
//! For each request the handler:
//!
//! 1. Logs the request to the access log
//! 2. Refuses anything that is not a `CONNECT`
//! 3. Matches the host against the current blacklist snapshot
//! 4. Dials the destination with a bounded timeout
//! 5. Answers `200` and relays the upgraded client connection to the destination

use super::relay::{Tunnel, TunnelState};
use crate::access_log::AccessLog;
use crate::error::{ProxyError, Result};
use connect_filter::BlacklistStore;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONNECTION, CONTENT_TYPE};
use hyper::upgrade::OnUpgrade;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Decides and sets up the tunnel for each inbound request
#[derive(Clone)]
pub struct TunnelHandler {
    store: Arc<BlacklistStore>,
    connect_timeout: Duration,
    access_log: Option<Arc<AccessLog>>,
}

impl TunnelHandler {
    pub fn new(store: Arc<BlacklistStore>, connect_timeout: Duration) -> Self {
        Self {
            store,
            connect_timeout,
            access_log: None,
        }
    }

    pub fn with_access_log(mut self, access_log: Arc<AccessLog>) -> Self {
        self.access_log = Some(access_log);
        self
    }

    /// Handle one request from `peer`
    ///
    /// Never fails: every outcome is expressed as a response. On `200` the
    /// relay runs on a spawned task once hyper hands over the connection.
    pub async fn handle<B>(&self, mut req: Request<B>, peer: SocketAddr) -> Response<ProxyBody> {
        let host = request_host(&req);

        if let Some(log) = &self.access_log {
            if let Err(e) = log.record(peer, &host).await {
                warn!("{}", e);
            }
        }

        if req.method() != Method::CONNECT {
            debug!("Refusing {} request for {} from {}", req.method(), host, peer);
            return status_response(StatusCode::METHOD_NOT_ALLOWED, "Only CONNECT is supported");
        }

        let target = match connect_target(&req) {
            Ok(target) => target,
            Err(e) => {
                debug!("{} from {}", e, peer);
                return status_response(StatusCode::BAD_REQUEST, &e.to_string());
            }
        };

        // One snapshot decides the whole request even if a reload lands meanwhile
        let blacklist = self.store.get();
        if blacklist.is_blocked(&target) {
            info!("Blocked CONNECT to {} from {}", target, peer);
            debug!(state = ?TunnelState::Rejected, "{}", target);
            return rejected_response(&target);
        }

        let Some(on_upgrade) = req.extensions_mut().remove::<OnUpgrade>() else {
            warn!("{} for {}", ProxyError::HijackUnsupported, target);
            return status_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &ProxyError::HijackUnsupported.to_string(),
            );
        };

        debug!(state = ?TunnelState::Dialing, "{}", target);
        let upstream = match self.dial(&target).await {
            Ok(upstream) => upstream,
            Err(e) => {
                debug!(state = ?TunnelState::Failed, "{}", e);
                return status_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string());
            }
        };

        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    debug!(state = ?TunnelState::Open, "{}", target);
                    let stats = Tunnel::new(TokioIo::new(upgraded), upstream).run().await;
                    debug!(
                        state = ?TunnelState::Closed,
                        "Tunnel to {} closed: {} bytes up, {} bytes down",
                        target,
                        stats.client_to_upstream,
                        stats.upstream_to_client
                    );
                }
                Err(e) => {
                    warn!("{} for {}", ProxyError::Upgrade(e), target);
                }
            }
        });

        empty_response(StatusCode::OK)
    }

    /// Connect to `addr`, giving up after the configured timeout
    pub async fn dial(&self, addr: &str) -> Result<TcpStream> {
        connect_within(addr, self.connect_timeout, TcpStream::connect(addr)).await
    }
}

/// Await `connect`, mapping its failure or a timeout to a dial error for `addr`
async fn connect_within<F>(addr: &str, timeout: Duration, connect: F) -> Result<TcpStream>
where
    F: Future<Output = std::io::Result<TcpStream>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(ProxyError::DialFailed {
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(ProxyError::DialTimeout {
            addr: addr.to_string(),
            timeout,
        }),
    }
}

/// Host the request is addressed to, as sent by the client
fn request_host<B>(req: &Request<B>) -> String {
    req.uri()
        .authority()
        .map(|a| a.to_string())
        .or_else(|| {
            req.headers()
                .get(hyper::header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(String::from)
        })
        .unwrap_or_default()
}

/// Authority from a CONNECT request line
///
/// The port is not checked here: a blacklisted host is refused with or
/// without one, and a missing port surfaces as a dial failure.
fn connect_target<B>(req: &Request<B>) -> Result<String> {
    req.uri()
        .authority()
        .map(|a| a.to_string())
        .ok_or_else(|| ProxyError::InvalidTarget(req.uri().to_string()))
}

fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

fn full_body(content: String) -> ProxyBody {
    Full::new(Bytes::from(content))
        .map_err(|never| match never {})
        .boxed()
}

fn empty_response(status: StatusCode) -> Response<ProxyBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = status;
    response
}

fn status_response(status: StatusCode, message: &str) -> Response<ProxyBody> {
    let mut response = Response::new(full_body(format!("{message}\n")));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

/// 403 that also ends the client connection
fn rejected_response(target: &str) -> Response<ProxyBody> {
    let mut response = status_response(
        StatusCode::FORBIDDEN,
        &format!("Connection to {target} blocked"),
    );
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}
