//! Origin transport
//!
//! Resolves request targets and opens connections to origin servers.

use std::time::Duration;

use hyper::Uri;
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use crate::error::{Result, RewriteError};

/// Connects to origin servers on behalf of proxied requests
pub struct OriginTransport;

impl OriginTransport {
    /// Open a TCP connection to the origin, bounded by `timeout`
    #[instrument(skip(timeout))]
    pub async fn connect(target_host: &str, target_port: u16, timeout: Duration) -> Result<TcpStream> {
        debug!("Connecting to origin {}:{}", target_host, target_port);

        tokio::time::timeout(timeout, TcpStream::connect((target_host, target_port)))
            .await
            .map_err(|_| RewriteError::Timeout)?
            .map_err(|e| RewriteError::UpstreamFailed(format!("TCP connect failed: {}", e)))
    }

    /// Parse host and port from an absolute-form request URI
    pub fn parse_target(uri: &Uri) -> Result<(String, u16)> {
        let host = uri
            .host()
            .ok_or_else(|| RewriteError::InvalidRequest("Missing host in URI".to_string()))?
            .to_string();

        let port = uri.port_u16().unwrap_or_else(|| match uri.scheme_str() {
            Some("https") => 443,
            _ => 80,
        });

        Ok((host, port))
    }

    /// Parse host and port from authority (for CONNECT requests)
    pub fn parse_authority(authority: &str) -> Result<(String, u16)> {
        if let Some((host, port_str)) = authority.rsplit_once(':') {
            let port = port_str
                .parse::<u16>()
                .map_err(|_| RewriteError::InvalidRequest("Invalid port".to_string()))?;
            Ok((host.to_string(), port))
        } else {
            // Default to port 443 for CONNECT (typically HTTPS)
            Ok((authority.to_string(), 443))
        }
    }

    /// `Host` header value for a target
    pub fn host_header(target_host: &str, target_port: u16) -> String {
        if target_port == 80 {
            target_host.to_string()
        } else {
            format!("{}:{}", target_host, target_port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        let uri: Uri = "http://example.com/path".parse().unwrap();
        assert_eq!(
            OriginTransport::parse_target(&uri).unwrap(),
            ("example.com".to_string(), 80)
        );

        let uri: Uri = "http://example.com:8080/".parse().unwrap();
        assert_eq!(
            OriginTransport::parse_target(&uri).unwrap(),
            ("example.com".to_string(), 8080)
        );

        let uri: Uri = "/relative".parse().unwrap();
        assert!(matches!(
            OriginTransport::parse_target(&uri),
            Err(RewriteError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_parse_authority() {
        assert_eq!(
            OriginTransport::parse_authority("example.com:8443").unwrap(),
            ("example.com".to_string(), 8443)
        );
        assert_eq!(
            OriginTransport::parse_authority("example.com").unwrap(),
            ("example.com".to_string(), 443)
        );
        assert!(OriginTransport::parse_authority("example.com:nope").is_err());
    }

    #[test]
    fn test_host_header() {
        assert_eq!(OriginTransport::host_header("example.com", 80), "example.com");
        assert_eq!(
            OriginTransport::host_header("example.com", 8080),
            "example.com:8080"
        );
    }

    #[tokio::test]
    async fn test_connect_refused_is_upstream_failure() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = OriginTransport::connect("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, RewriteError::UpstreamFailed(_)));
    }
}
