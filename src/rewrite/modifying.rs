//! Content-modifying response handler
//!
//! Rewrites textual response bodies with a [`RewriteRule`], transparently
//! undoing and redoing gzip or raw-deflate compression. The rewrite is all or
//! nothing: if any decode or encode step fails, the original bytes are put
//! back so `Content-Encoding` always describes the body that follows it.

use std::borrow::Cow;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::HeaderValue;
use tracing::{debug, error, info};

use super::{
    Charset, ContentCoding, Entity, InterceptedRequest, InterceptedResponse, ResponseHandler,
    RewriteRule,
};
use crate::error::Result;
use crate::rewrite::factory::HandlerKind;

/// Whitelist of media types a handler processes; empty matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypeFilter {
    media_types: Vec<String>,
}

impl ContentTypeFilter {
    pub fn new<I, S>(media_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            media_types: media_types
                .into_iter()
                .map(|s| s.into().trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Filter accepting every content type
    pub fn any() -> Self {
        Self::default()
    }

    pub fn media_types(&self) -> &[String] {
        &self.media_types
    }

    /// Compare each `;`-separated token of a `Content-Type` value, ignoring case
    pub fn matches(&self, content_type: &str) -> bool {
        if self.media_types.is_empty() {
            return true;
        }

        content_type.split(';').map(str::trim).any(|token| {
            self.media_types
                .iter()
                .any(|accepted| accepted.eq_ignore_ascii_case(token))
        })
    }
}

/// Handler replacing text in matching response bodies
#[derive(Debug, Clone)]
pub struct ContentModifyingHandler {
    rule: RewriteRule,
    filter: ContentTypeFilter,
}

impl ContentModifyingHandler {
    pub fn new(rule: RewriteRule, filter: ContentTypeFilter) -> Self {
        Self { rule, filter }
    }

    pub fn rule(&self) -> &RewriteRule {
        &self.rule
    }

    pub fn filter(&self) -> &ContentTypeFilter {
        &self.filter
    }

    /// Decode, rewrite and re-encode a drained body.
    ///
    /// Returns `None` when the rule matched nothing.
    fn rewrite_body(
        &self,
        raw: &[u8],
        coding: ContentCoding,
        charset: Charset,
        skip_decompression: bool,
    ) -> Result<Option<Vec<u8>>> {
        let decoded = if skip_decompression {
            raw.to_vec()
        } else {
            coding.decode(raw)?
        };

        let text = charset.decode(&decoded)?;
        let rewritten = match self.rule.apply(&text) {
            Cow::Borrowed(_) => return Ok(None),
            Cow::Owned(rewritten) => rewritten,
        };

        let encoded = charset.encode(&rewritten)?;
        coding.encode(&encoded).map(Some)
    }
}

impl ResponseHandler for ContentModifyingHandler {
    fn handle(
        &self,
        _request: &InterceptedRequest,
        response: &mut InterceptedResponse,
    ) -> Result<()> {
        if response.body().is_none() {
            return Ok(());
        }

        let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
        else {
            return Ok(());
        };

        if !self.filter.matches(&content_type) {
            debug!(
                content_type = %content_type,
                "Ignoring content of unprocessed entity type"
            );
            return Ok(());
        }

        let Some(charset) = Charset::resolve(&content_type) else {
            return Ok(());
        };

        let Some(coding) = ContentCoding::from_headers(response.headers()) else {
            debug!(
                content_type = %content_type,
                "Ignoring entity with an unsupported content encoding"
            );
            return Ok(());
        };

        let Some(entity) = response.body_mut().take() else {
            return Ok(());
        };
        let declared_length = entity.content_length();

        // The stream is closed by the time this returns, on success or error.
        let raw = entity.read_to_bytes()?;
        let skip_decompression = declared_length == Some(0) || raw.is_empty();

        info!(
            content_type = %content_type,
            encoding = %coding,
            charset = charset.as_str(),
            "Manipulating response body"
        );

        let body = match self.rewrite_body(&raw, coding, charset, skip_decompression) {
            Ok(Some(bytes)) => Bytes::from(bytes),
            Ok(None) => {
                debug!("Pattern not found, response left unchanged");
                raw
            }
            Err(e) if e.is_recoverable_rewrite_failure() => {
                error!(
                    encoding = %coding,
                    error = %e,
                    "Rewrite aborted, forwarding original body"
                );
                raw
            }
            Err(e) => {
                *response.body_mut() = Some(Entity::from_bytes(raw));
                return Err(e);
            }
        };

        if response.headers().contains_key(CONTENT_LENGTH) {
            response
                .headers_mut()
                .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }
        *response.body_mut() = Some(Entity::from_bytes(body));

        Ok(())
    }

    fn name(&self) -> &'static str {
        HandlerKind::ContentModifying.as_str()
    }
}
