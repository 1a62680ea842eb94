//! CONNECT tunnel server

pub mod handler;
pub mod relay;
pub mod server;

pub use handler::{ProxyBody, TunnelHandler};
pub use relay::{relay, Tunnel, TunnelState, TunnelStats};
pub use server::{ProxyServer, ProxyServerConfig};
