//! Charset resolution and text transcoding for rewritten bodies

use std::borrow::Cow;
use std::fmt;

use encoding_rs::{Encoding, UTF_8};
use tracing::{info, warn};

use crate::error::{Result, RewriteError};

/// Charset used when a response does not declare one
pub const DEFAULT_CHARSET: Charset = Charset(UTF_8);

/// A text encoding the rewriter decodes bodies from and re-encodes them to
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Charset(&'static Encoding);

impl Charset {
    /// Look up a charset label, e.g. `utf-8`, `windows-1252` or `Shift_JIS`
    ///
    /// Labels are matched per the WHATWG Encoding Standard, so `ISO-8859-1`
    /// and `US-ASCII` resolve to windows-1252.
    pub fn from_label(label: &str) -> Option<Self> {
        let encoding = Encoding::for_label(label.trim().as_bytes())?;
        // UTF-16 and the replacement encoding cannot be written back as-is
        (encoding.output_encoding() == encoding).then_some(Self(encoding))
    }

    /// Resolve the charset for a `Content-Type` value
    ///
    /// Falls back to [`DEFAULT_CHARSET`] when none is declared. Returns `None`
    /// when a charset is declared but cannot be transcoded.
    pub fn resolve(content_type: &str) -> Option<Self> {
        match declared_charset(content_type) {
            Some(label) => {
                let charset = Self::from_label(&label);
                if charset.is_none() {
                    warn!(charset = %label, "Unsupported response charset");
                }
                charset
            }
            None => {
                info!(
                    "Could not detect charset of http response. Assuming {}",
                    DEFAULT_CHARSET
                );
                Some(DEFAULT_CHARSET)
            }
        }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.0
    }

    pub fn as_str(&self) -> &'static str {
        self.0.name()
    }

    /// Decode body bytes into text; malformed input is an error, never replaced
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, str>> {
        self.0
            .decode_without_bom_handling_and_without_replacement(bytes)
            .ok_or_else(|| RewriteError::Charset(format!("body is not valid {}", self.as_str())))
    }

    /// Encode text back into body bytes; unmappable characters are an error
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        let (bytes, _, had_unmappable) = self.0.encode(text);
        if had_unmappable {
            return Err(RewriteError::Charset(format!(
                "rewritten text is not representable in {}",
                self.as_str()
            )));
        }
        Ok(bytes.into_owned())
    }
}

impl fmt::Debug for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Charset").field(&self.as_str()).finish()
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `charset` parameter of a `Content-Type` value, if it parses
fn declared_charset(content_type: &str) -> Option<String> {
    let parsed = content_type.parse::<mime::Mime>().ok()?;
    let charset = parsed.get_param(mime::CHARSET)?;
    let label = charset.as_str().trim();
    (!label.is_empty()).then(|| label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{SHIFT_JIS, WINDOWS_1252};

    #[test]
    fn test_resolve_declared_charset() {
        assert_eq!(Charset::resolve("text/html; charset=utf-8"), Some(DEFAULT_CHARSET));
        assert_eq!(Charset::resolve("text/html;Charset=\"UTF-8\""), Some(DEFAULT_CHARSET));
        assert_eq!(
            Charset::resolve("text/plain; format=flowed; charset=windows-1252")
                .map(|c| c.encoding()),
            Some(WINDOWS_1252)
        );
        assert_eq!(
            Charset::resolve("text/html; charset=Shift_JIS").map(|c| c.encoding()),
            Some(SHIFT_JIS)
        );
        assert_eq!(
            Charset::resolve("text/plain; charset=ISO-8859-1").map(|c| c.encoding()),
            Some(WINDOWS_1252)
        );
    }

    #[test]
    fn test_resolve_falls_back_to_utf8() {
        assert_eq!(Charset::resolve("text/html"), Some(DEFAULT_CHARSET));
        assert_eq!(Charset::resolve("text/html; charset="), Some(DEFAULT_CHARSET));
    }

    #[test]
    fn test_resolve_unsupported_charset() {
        assert_eq!(Charset::resolve("text/html; charset=x-no-such-charset"), None);
        // Decodable, but encoding_rs only writes UTF-16 out as UTF-8
        assert_eq!(Charset::resolve("text/html; charset=utf-16le"), None);
    }

    #[test]
    fn test_utf8_decode_rejects_invalid_bytes() {
        let err = DEFAULT_CHARSET.decode(b"\xff\xfe").unwrap_err();
        assert!(matches!(err, RewriteError::Charset(_)));
    }

    #[test]
    fn test_windows_1252_transcoding() {
        let charset = Charset::from_label("windows-1252").unwrap();
        let bytes = b"caf\xe9 \x80";
        let text = charset.decode(bytes).unwrap();
        assert_eq!(text, "caf\u{e9} \u{20ac}");
        assert_eq!(charset.encode(&text).unwrap(), bytes);

        let err = charset.encode("snow \u{2603}").unwrap_err();
        assert!(matches!(err, RewriteError::Charset(_)));
    }

    #[test]
    fn test_shift_jis_transcoding() {
        let charset = Charset::from_label("Shift_JIS").unwrap();
        let bytes = b"\x93\xfa\x96\x7b";
        let text = charset.decode(bytes).unwrap();
        assert_eq!(text, "\u{65e5}\u{672c}");
        assert_eq!(charset.encode(&text).unwrap(), bytes);
    }
}
