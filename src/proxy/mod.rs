//! Proxy server implementation
//!
//! This module provides the hosting proxy the response handlers run inside:
//! - Plain HTTP forwarding with buffered, rewritable responses
//! - CONNECT tunnel for HTTPS (relayed without interception)
//! - Origin connection handling with timeouts

pub mod handler;
pub mod server;
pub mod transport;
pub mod tunnel;

pub use handler::{ProxyHandler, ProxyHandlerConfig};
pub use server::ProxyServer;
pub use transport::OriginTransport;
pub use tunnel::TunnelHandler;
