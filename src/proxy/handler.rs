//! Proxy request handler
//!
//! Forwards plain HTTP requests to the origin, runs the handler registry on the
//! buffered response and tunnels CONNECT requests untouched.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, CONTENT_LENGTH, HOST};
use http::{HeaderMap, HeaderValue};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::upgrade::OnUpgrade;
use hyper::{Method, Request, Response, StatusCode};
use tracing::{debug, error, info, instrument};

use crate::error::{Result, RewriteError};
use crate::proxy::transport::OriginTransport;
use crate::proxy::tunnel::TunnelHandler;
use crate::rewrite::{
    ContentCoding, Entity, HandlerRegistry, InterceptedRequest, InterceptedResponse,
};

/// Configuration for proxy handler
#[derive(Debug, Clone)]
pub struct ProxyHandlerConfig {
    /// Timeout for origin connections
    pub connect_timeout: Duration,
    /// Timeout for request/response
    pub request_timeout: Duration,
}

impl Default for ProxyHandlerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Proxy request handler
pub struct ProxyHandler {
    registry: Arc<HandlerRegistry>,
    config: ProxyHandlerConfig,
}

impl ProxyHandler {
    pub fn new(registry: Arc<HandlerRegistry>, config: ProxyHandlerConfig) -> Self {
        Self { registry, config }
    }

    /// Handle an incoming proxy request
    #[instrument(skip(self, req), fields(method = %req.method(), uri = %req.uri()))]
    pub async fn handle(
        &self,
        req: Request<Incoming>,
        client_ip: String,
    ) -> Result<Response<Full<Bytes>>> {
        // Handle CONNECT requests (HTTPS tunneling)
        if req.method() == Method::CONNECT {
            return self.handle_connect(req, client_ip).await;
        }

        // Handle regular HTTP requests
        self.handle_http(req, client_ip).await
    }

    /// Handle HTTP CONNECT request (HTTPS tunneling)
    async fn handle_connect(
        &self,
        req: Request<Incoming>,
        client_ip: String,
    ) -> Result<Response<Full<Bytes>>> {
        let uri = req.uri().clone();
        let authority = uri
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_else(|| uri.to_string());

        let (target_host, target_port) = OriginTransport::parse_authority(&authority)?;

        debug!(
            "CONNECT request to {}:{} from {}",
            target_host, target_port, client_ip
        );

        // Don't respond 200 until the origin is reachable
        let server =
            OriginTransport::connect(&target_host, target_port, self.config.connect_timeout)
                .await?;

        info!("CONNECT tunnel established to {}:{}", target_host, target_port);

        let on_upgrade: OnUpgrade = hyper::upgrade::on(req);
        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    if let Err(e) = TunnelHandler::handle_upgraded(upgraded, server).await {
                        debug!("CONNECT tunnel ended with error: {}", e);
                    }
                }
                Err(e) => {
                    debug!("CONNECT upgrade failed: {}", e);
                }
            }
        });

        Ok(Response::new(Full::new(Bytes::new())))
    }

    /// Handle regular HTTP request
    async fn handle_http(
        &self,
        req: Request<Incoming>,
        client_ip: String,
    ) -> Result<Response<Full<Bytes>>> {
        let (target_host, target_port) = OriginTransport::parse_target(req.uri())?;

        debug!(
            "HTTP request to {}:{} from {}",
            target_host, target_port, client_ip
        );

        let (parts, body) = req.into_parts();
        let body_bytes = body
            .collect()
            .await
            .map_err(|e| RewriteError::InvalidRequest(format!("Failed to read request body: {}", e)))?
            .to_bytes();

        let intercepted = intercepted_request(&parts)?;
        let response = self
            .forward_request(&parts, body_bytes, &target_host, target_port)
            .await?;

        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || rewrite_response(&registry, &intercepted, response))
            .await
            .map_err(|e| RewriteError::Internal(format!("Response handler task failed: {}", e)))
    }

    /// Forward HTTP request to the origin and buffer the response
    async fn forward_request(
        &self,
        parts: &http::request::Parts,
        body: Bytes,
        target_host: &str,
        target_port: u16,
    ) -> Result<Response<Bytes>> {
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let stream =
            OriginTransport::connect(target_host, target_port, self.config.connect_timeout)
                .await?;

        // Origin-form request line
        let mut builder = Request::builder().method(parts.method.clone()).uri(path);

        // Copy headers, except hop-by-hop headers
        for (name, value) in &parts.headers {
            if !is_hop_by_hop_header(name.as_str()) && name != ACCEPT_ENCODING {
                builder = builder.header(name, value);
            }
        }

        // Only ask for codings the response handlers can undo
        if let Some(accept) = parts.headers.get(ACCEPT_ENCODING) {
            builder = builder.header(ACCEPT_ENCODING, restrict_accept_encoding(accept));
        }

        if !parts.headers.contains_key(HOST) {
            builder = builder.header(HOST, OriginTransport::host_header(target_host, target_port));
        }

        let request = builder
            .body(Full::new(body))
            .map_err(|e| RewriteError::InvalidRequest(format!("Failed to build request: {}", e)))?;

        // Send request using hyper
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| RewriteError::UpstreamFailed(format!("Handshake failed: {}", e)))?;

        // Spawn connection handler
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Connection ended: {}", e);
            }
        });

        // Send request with timeout
        let response =
            tokio::time::timeout(self.config.request_timeout, sender.send_request(request))
                .await
                .map_err(|_| RewriteError::Timeout)?
                .map_err(|e| RewriteError::UpstreamFailed(format!("Request failed: {}", e)))?;

        // Collect response body
        let (parts, body) = response.into_parts();
        let body_bytes = tokio::time::timeout(self.config.request_timeout, body.collect())
            .await
            .map_err(|_| RewriteError::Timeout)?
            .map_err(|e| RewriteError::UpstreamFailed(format!("Failed to read response: {}", e)))?
            .to_bytes();

        Ok(Response::from_parts(parts, body_bytes))
    }
}

/// Bodiless copy of the client request handed to response handlers
fn intercepted_request(parts: &http::request::Parts) -> Result<InterceptedRequest> {
    let mut request = Request::builder()
        .method(parts.method.clone())
        .uri(parts.uri.clone())
        .version(parts.version)
        .body(())?;
    *request.headers_mut() = parts.headers.clone();
    Ok(request)
}

/// Narrow a client's `Accept-Encoding` to codings that can be rewritten
///
/// `br` and friends are dropped; a wildcard becomes `gzip, deflate`. When
/// nothing usable is left the origin is asked for `identity`.
fn restrict_accept_encoding(accept: &HeaderValue) -> HeaderValue {
    let mut codings: Vec<&'static str> = Vec::new();

    for entry in accept.to_str().unwrap_or_default().split(',') {
        let token = entry.split(';').next().unwrap_or_default().trim();
        let supported = if token == "*" {
            vec![ContentCoding::Gzip, ContentCoding::Deflate]
        } else if token.is_empty() {
            vec![]
        } else {
            ContentCoding::from_str(token).into_iter().collect()
        };

        for coding in supported {
            if !codings.contains(&coding.as_str()) {
                codings.push(coding.as_str());
            }
        }
    }

    if codings.is_empty() {
        return HeaderValue::from_static("identity");
    }
    HeaderValue::from_str(&codings.join(", ")).unwrap_or(HeaderValue::from_static("identity"))
}

/// Whether a response to `method` with `status` carries an entity
fn has_entity(method: &Method, status: StatusCode) -> bool {
    !(method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

/// Run every registered handler over a buffered origin response
///
/// If a handler fails, or the rewritten entity cannot be read back, the
/// origin response is forwarded as received.
pub fn rewrite_response(
    registry: &HandlerRegistry,
    request: &InterceptedRequest,
    response: Response<Bytes>,
) -> Response<Full<Bytes>> {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop_headers(&mut parts.headers);

    let entity_present = has_entity(request.method(), parts.status);
    let original_status = parts.status;
    let original_headers = parts.headers.clone();
    let original_body = body.clone();

    let entity = entity_present.then(|| Entity::from_bytes(body));
    let mut intercepted: InterceptedResponse = Response::from_parts(parts, entity);

    let outcome = registry.invoke_all(request, &mut intercepted).and_then(|()| {
        let (parts, entity) = intercepted.into_parts();
        let bytes = match entity {
            Some(entity) => entity.read_to_bytes()?,
            None => Bytes::new(),
        };
        Ok((parts, bytes))
    });

    match outcome {
        Ok((mut parts, bytes)) => {
            if entity_present {
                // hyper derives the length from the buffered body
                parts.headers.remove(CONTENT_LENGTH);
            }
            Response::from_parts(parts, Full::new(bytes))
        }
        Err(e) => {
            error!(uri = %request.uri(), error = %e, "Forwarding unmodified response");
            let mut response = Response::new(Full::new(original_body));
            *response.status_mut() = original_status;
            *response.headers_mut() = original_headers;
            if entity_present {
                response.headers_mut().remove(CONTENT_LENGTH);
            }
            response
        }
    }
}

/// Create an error response
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(message.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain"),
    );
    response
}

/// Check if a header is a hop-by-hop header that should not be forwarded
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Remove hop-by-hop headers from a header map
fn strip_hop_by_hop_headers(headers: &mut HeaderMap) {
    let hop_by_hop: Vec<_> = headers
        .keys()
        .filter(|name| is_hop_by_hop_header(name.as_str()))
        .cloned()
        .collect();
    for name in hop_by_hop {
        headers.remove(&name);
    }
}
