use super::handler::TunnelHandler;
use crate::access_log::AccessLog;
use crate::error::Result;
use connect_filter::BlacklistStore;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// CONNECT proxy server configuration
#[derive(Clone)]
pub struct ProxyServerConfig {
    /// Address to listen on, e.g. `0.0.0.0:8081`
    pub listen_addr: String,
    /// Published blacklist, kept current by the reloader
    pub store: Arc<BlacklistStore>,
    /// Upper bound on dialing the destination
    pub connect_timeout: Duration,
    /// Request log, if enabled
    pub access_log: Option<Arc<AccessLog>>,
}

/// HTTP CONNECT proxy server
pub struct ProxyServer {
    config: ProxyServerConfig,
    handler: TunnelHandler,
}

impl ProxyServer {
    /// Create a new proxy server with the given configuration
    pub fn new(config: ProxyServerConfig) -> Self {
        let mut handler = TunnelHandler::new(Arc::clone(&config.store), config.connect_timeout);
        if let Some(log) = &config.access_log {
            handler = handler.with_access_log(Arc::clone(log));
        }
        Self { config, handler }
    }

    /// Bind the configured address and serve forever
    pub async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections accepted from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("Proxy listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let handler = self.handler.clone();

            // Spawn a task for each connection
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, peer, handler).await {
                    debug!("Connection from {} ended with error: {}", peer, e);
                }
            });
        }
    }
}

/// Serve HTTP/1.1 on one client connection, allowing CONNECT upgrades
async fn serve_connection(stream: TcpStream, peer: SocketAddr, handler: TunnelHandler) -> Result<()> {
    debug!("Client connected from {}", peer);

    let service = service_fn(move |req| {
        let handler = handler.clone();
        async move { Ok::<_, Infallible>(handler.handle(req, peer).await) }
    });

    http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades()
        .await?;

    Ok(())
}
