//! Proxy server implementation using hyper
//!
//! Accepts proxy connections and hands each request to the `ProxyHandler`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::config::ProxyServerConfig;
use crate::error::{Result, RewriteError};
use crate::proxy::handler::{error_response, ProxyHandler, ProxyHandlerConfig};
use crate::rewrite::HandlerRegistry;

/// Proxy server
pub struct ProxyServer {
    config: ProxyServerConfig,
    handler: Arc<ProxyHandler>,
}

impl ProxyServer {
    /// Create a new proxy server dispatching responses through `registry`
    pub fn new(config: ProxyServerConfig, registry: Arc<HandlerRegistry>) -> Self {
        let handler_config = ProxyHandlerConfig {
            connect_timeout: Duration::from_secs(config.connect_timeout),
            request_timeout: Duration::from_secs(config.request_timeout),
        };

        let handler = Arc::new(ProxyHandler::new(registry, handler_config));

        Self { config, handler }
    }

    /// Run the proxy server
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| RewriteError::InvalidConfig(format!("Invalid proxy server address: {}", e)))?;

        let listener = TcpListener::bind(addr).await?;
        info!("Proxy server listening on {}", addr);

        self.serve(listener, shutdown).await
    }

    /// Accept connections on `listener` until shutdown is signalled
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, client_addr)) => {
                            let handler = self.handler.clone();

                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, client_addr, handler).await {
                                    debug!("Connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Proxy server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Handle a single connection
    async fn handle_connection(
        stream: tokio::net::TcpStream,
        client_addr: SocketAddr,
        handler: Arc<ProxyHandler>,
    ) -> Result<()> {
        let io = TokioIo::new(stream);
        let client_ip = client_addr.ip().to_string();

        let service = service_fn(move |req: Request<Incoming>| {
            let handler = handler.clone();
            let client_ip = client_ip.clone();

            async move {
                match handler.handle(req, client_ip).await {
                    Ok(response) => Ok::<_, Infallible>(response),
                    Err(e) => {
                        error!("Request handling error: {}", e);
                        Ok(error_response(e.status_code(), &format!("Error: {}", e)))
                    }
                }
            }
        });

        http1::Builder::new()
            .preserve_header_case(true)
            .title_case_headers(true)
            .serve_connection(io, service)
            .with_upgrades()
            .await
            .map_err(|e| RewriteError::UpstreamFailed(e.to_string()))?;

        Ok(())
    }
}
