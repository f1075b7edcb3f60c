//! CONNECT tunnel implementation for HTTPS proxying
//!
//! TLS is not intercepted: tunneled bytes are relayed without passing through
//! the response handlers.

use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use crate::error::Result;

/// Handles CONNECT tunnel requests
pub struct TunnelHandler;

impl TunnelHandler {
    /// Copy data bidirectionally between two streams
    #[instrument(skip(client, server))]
    pub async fn copy_bidirectional<C, S>(client: C, server: S) -> Result<(u64, u64)>
    where
        C: AsyncRead + AsyncWrite + Unpin + Send,
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (mut client_read, mut client_write) = tokio::io::split(client);
        let (mut server_read, mut server_write) = tokio::io::split(server);

        let client_to_server = async {
            let result = tokio::io::copy(&mut client_read, &mut server_write).await;
            let _ = server_write.shutdown().await;
            result
        };

        let server_to_client = async {
            let result = tokio::io::copy(&mut server_read, &mut client_write).await;
            let _ = client_write.shutdown().await;
            result
        };

        let (client_to_server_result, server_to_client_result) =
            tokio::join!(client_to_server, server_to_client);

        let bytes_sent = client_to_server_result.unwrap_or_else(|e| {
            debug!("Client to server copy ended: {}", e);
            0
        });

        let bytes_received = server_to_client_result.unwrap_or_else(|e| {
            debug!("Server to client copy ended: {}", e);
            0
        });

        debug!(
            bytes_sent = bytes_sent,
            bytes_received = bytes_received,
            "Tunnel closed"
        );

        Ok((bytes_sent, bytes_received))
    }

    /// Relay an upgraded client connection to an already connected origin
    #[instrument(skip(upgraded, server))]
    pub async fn handle_upgraded(upgraded: Upgraded, server: TcpStream) -> Result<(u64, u64)> {
        // Wrap Upgraded with TokioIo to get tokio AsyncRead/AsyncWrite traits
        let client = TokioIo::new(upgraded);

        Self::copy_bidirectional(client, server).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::Duration;

    #[tokio::test]
    async fn test_copy_bidirectional() {
        // Create a pair of duplex streams for testing
        let (client, mut server) = tokio::io::duplex(1024);
        let (mut target_client, target_server) = tokio::io::duplex(1024);

        let copy_handle = tokio::spawn(async move {
            TunnelHandler::copy_bidirectional(client, target_server).await
        });

        server.write_all(b"hello from client").await.unwrap();
        server.shutdown().await.unwrap();

        target_client.write_all(b"hello from server").await.unwrap();
        target_client.shutdown().await.unwrap();

        let mut buf = vec![0u8; 100];
        let n = target_client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello from client");

        let mut buf = vec![0u8; 100];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello from server");

        // Wait for copy to complete (should not hang)
        let result = tokio::time::timeout(Duration::from_secs(1), copy_handle)
            .await
            .expect("copy_bidirectional timed out")
            .unwrap();
        assert!(result.is_ok());
    }
}
