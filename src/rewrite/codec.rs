//! Content-Encoding detection and gzip/deflate transcoding
//!
//! `deflate` bodies are treated as raw DEFLATE (RFC 1951) without the zlib
//! wrapper, which is what most servers actually send under that name.

use std::fmt;
use std::io::{self, Read, Write};

use flate2::read::{DeflateDecoder, GzDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;
use http::header::CONTENT_ENCODING;
use http::HeaderMap;
use tracing::debug;

use crate::error::{Result, RewriteError};

/// Compression applied to a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentCoding {
    #[default]
    Identity,
    Gzip,
    Deflate,
}

impl ContentCoding {
    /// Parse a `Content-Encoding` value
    ///
    /// Returns `None` for schemes that cannot be undone here (`br`, `compress`,
    /// stacked codings), so their bodies are never mistaken for plain text.
    pub fn from_str(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("identity") {
            Some(Self::Identity)
        } else if value.eq_ignore_ascii_case("gzip") || value.eq_ignore_ascii_case("x-gzip") {
            Some(Self::Gzip)
        } else if value.eq_ignore_ascii_case("deflate") {
            Some(Self::Deflate)
        } else {
            None
        }
    }

    /// Detect the coding from the `Content-Encoding` header
    ///
    /// An absent header is `Identity`; an unsupported or unreadable one is `None`.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        match headers.get(CONTENT_ENCODING) {
            None => Some(Self::Identity),
            Some(value) => {
                let coding = value.to_str().ok().and_then(Self::from_str);
                if coding.is_none() {
                    debug!(encoding = ?value, "Unsupported content encoding");
                }
                coding
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, Self::Identity)
    }

    /// Wrap a reader in the matching decompressor
    pub fn decoder<'a, R>(self, reader: R) -> Box<dyn Read + 'a>
    where
        R: Read + 'a,
    {
        match self {
            Self::Identity => Box::new(reader),
            Self::Gzip => Box::new(GzDecoder::new(reader)),
            Self::Deflate => Box::new(DeflateDecoder::new(reader)),
        }
    }

    /// Decompress a complete body
    pub fn decode(self, data: &[u8]) -> Result<Vec<u8>> {
        if !self.is_compressed() {
            return Ok(data.to_vec());
        }

        // Compressed bodies usually expand; start from a larger buffer.
        let mut out = Vec::with_capacity(data.len().saturating_mul(3));
        self.decoder(data)
            .read_to_end(&mut out)
            .map_err(|e| self.failure(e))?;
        Ok(out)
    }

    /// Compress a complete body
    pub fn encode(self, data: &[u8]) -> Result<Vec<u8>> {
        if !self.is_compressed() {
            return Ok(data.to_vec());
        }

        let out = Vec::with_capacity(data.len() / 2);
        let encoded = match self {
            Self::Identity => Ok(out),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(out, Compression::default());
                encoder
                    .write_all(data)
                    .and_then(|_| encoder.finish())
            }
            Self::Deflate => {
                let mut encoder = DeflateEncoder::new(out, Compression::default());
                encoder
                    .write_all(data)
                    .and_then(|_| encoder.finish())
            }
        };
        encoded.map_err(|e| self.failure(e))
    }

    fn failure(self, source: io::Error) -> RewriteError {
        RewriteError::Codec {
            coding: self.as_str(),
            source,
        }
    }
}

impl fmt::Display for ContentCoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
