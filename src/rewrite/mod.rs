//! Response rewriting pipeline
//!
//! This module provides the handler side of the proxy:
//! - The `ResponseHandler` capability invoked on every intercepted response
//! - A concurrent registry of active handlers
//! - A content-modifying handler that rewrites bodies through gzip/deflate
//! - A script-adding specialization and a factory building handlers by name

pub mod charset;
pub mod codec;
pub mod factory;
pub mod modifying;
pub mod registry;
pub mod rule;
pub mod script;

pub use charset::Charset;
pub use codec::ContentCoding;
pub use factory::{create_handler, HandlerKind, HandlerParams};
pub use modifying::{ContentModifyingHandler, ContentTypeFilter};
pub use registry::{HandlerId, HandlerRegistration, HandlerRegistry};
pub use rule::{RewriteMode, RewriteRule};
pub use script::ScriptAddingHandler;

use std::fmt;
use std::io::{self, Cursor, Read};

use bytes::Bytes;
use http::{Request, Response};

use crate::error::Result;

/// Request half handed to handlers; the request body has already been forwarded.
pub type InterceptedRequest = Request<()>;

/// Response handed to handlers; `None` means the response carries no entity.
pub type InterceptedResponse = Response<Option<Entity>>;

/// Response body as a blocking byte stream with an optional declared length
pub struct Entity {
    content: Box<dyn Read + Send>,
    content_length: Option<u64>,
}

impl Entity {
    /// Wrap a stream; `content_length` is `None` when the length is unknown.
    pub fn new<R>(content: R, content_length: Option<u64>) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            content: Box::new(content),
            content_length,
        }
    }

    /// Entity over an in-memory buffer with an exact length
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() as u64;
        Self::new(Cursor::new(bytes), Some(len))
    }

    /// Declared length, if known
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Drain the stream into memory. The stream is dropped before returning,
    /// whether or not the read succeeded.
    pub fn read_to_bytes(self) -> io::Result<Bytes> {
        let capacity = self
            .content_length
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(0);
        let mut content = self.content;
        let mut buf = Vec::with_capacity(capacity);
        content.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Post-processing logic applied to every intercepted response
///
/// Implementations are shared across all in-flight responses, so they must
/// not keep per-invocation state in `self`.
pub trait ResponseHandler: Send + Sync {
    /// Inspect and possibly replace the response entity and headers
    fn handle(
        &self,
        request: &InterceptedRequest,
        response: &mut InterceptedResponse,
    ) -> Result<()>;

    /// Handler type name used in logs and the admin API
    fn name(&self) -> &'static str;
}

impl fmt::Debug for dyn ResponseHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    #[test]
    fn test_entity_from_bytes_has_exact_length() {
        let entity = Entity::from_bytes("hello");
        assert_eq!(entity.content_length(), Some(5));
        assert_eq!(entity.read_to_bytes().unwrap(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_entity_unknown_length_still_drains() {
        let entity = Entity::new(Cursor::new(b"streamed".to_vec()), None);
        assert_eq!(entity.content_length(), None);
        assert_eq!(entity.read_to_bytes().unwrap(), Bytes::from_static(b"streamed"));
    }

    #[test]
    fn test_entity_read_error_propagates() {
        let entity = Entity::new(FailingReader, None);
        let err = entity.read_to_bytes().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn test_entity_debug_hides_stream() {
        let debug = format!("{:?}", Entity::from_bytes("abc"));
        assert!(debug.contains("content_length: Some(3)"));
    }
}
