//! Handler construction from a type name and a multi-valued parameter bag

use std::collections::HashMap;

use url::form_urlencoded;

use super::{
    ContentModifyingHandler, ContentTypeFilter, ResponseHandler, RewriteMode, RewriteRule,
    ScriptAddingHandler,
};
use crate::error::{Result, RewriteError};

/// Handler types the factory can build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    ScriptAdding,
    ContentModifying,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 2] = [HandlerKind::ScriptAdding, HandlerKind::ContentModifying];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScriptAdding => "ScriptAddingHttpResponseHandler",
            Self::ContentModifying => "ContentModifyingHttpResponseHandler",
        }
    }
}

/// String-keyed multimap of handler parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerParams {
    values: HashMap<String, Vec<String>>,
}

impl HandlerParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `application/x-www-form-urlencoded` text, e.g. `script=a&script=b`
    pub fn parse(query: &str) -> Self {
        form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.entry(key.into()).or_default().push(value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// All values for `key`, in insertion order
    pub fn get_all(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn exactly_one(&self, kind: HandlerKind, key: &str) -> Result<&str> {
        match self.get_all(key) {
            [value] => Ok(value.as_str()),
            values => Err(RewriteError::InvalidConfiguration(format!(
                "{} needs exactly one argument of type {}, got {}",
                kind.as_str(),
                key,
                values.len()
            ))),
        }
    }

    fn at_most_one(&self, kind: HandlerKind, key: &str) -> Result<Option<&str>> {
        match self.get_all(key) {
            [] => Ok(None),
            [value] => Ok(Some(value.as_str())),
            values => Err(RewriteError::InvalidConfiguration(format!(
                "{} accepts at most one argument of type {}, got {}",
                kind.as_str(),
                key,
                values.len()
            ))),
        }
    }
}

impl From<HashMap<String, Vec<String>>> for HandlerParams {
    fn from(values: HashMap<String, Vec<String>>) -> Self {
        Self { values }
    }
}

impl<K, V> FromIterator<(K, V)> for HandlerParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// Build a handler for `type_name`
///
/// Fails with `InvalidConfiguration` for unknown types or parameters with the
/// wrong cardinality. Nothing is constructed on failure.
pub fn create_handler(type_name: &str, params: &HandlerParams) -> Result<Box<dyn ResponseHandler>> {
    let kind = HandlerKind::from_name(type_name).ok_or_else(|| {
        RewriteError::InvalidConfiguration(format!("Unhandled response handler type {}", type_name))
    })?;

    match kind {
        HandlerKind::ScriptAdding => {
            let script = params.exactly_one(kind, "script")?;
            Ok(Box::new(ScriptAddingHandler::new(script)?))
        }
        HandlerKind::ContentModifying => {
            let pattern = params.exactly_one(kind, "pattern")?;
            let replacement = params.exactly_one(kind, "replacement")?;
            let mode = params
                .at_most_one(kind, "mode")?
                .map(RewriteMode::from_str)
                .transpose()?
                .unwrap_or_default();
            let first_match_only = params
                .at_most_one(kind, "first_match_only")?
                .map(parse_bool)
                .transpose()?
                .unwrap_or(false);

            let rule = RewriteRule::new(pattern, replacement, mode, first_match_only)?;
            let filter = ContentTypeFilter::new(params.get_all("content_type").iter().cloned());
            Ok(Box::new(ContentModifyingHandler::new(rule, filter)))
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    value.trim().to_lowercase().parse().map_err(|_| {
        RewriteError::InvalidConfiguration(format!("expected true or false, got {}", value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_kind_names() {
        for kind in HandlerKind::ALL {
            assert_eq!(HandlerKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(HandlerKind::from_name("scriptaddinghttpresponsehandler"), None);
    }

    #[test]
    fn test_params_parse_multimap() {
        let params = HandlerParams::parse("script=a&script=b%20c&content_type=text%2Fhtml");
        assert_eq!(params.get_all("script"), ["a", "b c"]);
        assert_eq!(params.get_all("content_type"), ["text/html"]);
        assert!(params.get_all("missing").is_empty());
    }

    #[test]
    fn test_create_script_adding_handler() {
        let params = HandlerParams::new().with("script", "alert(1)");
        let handler = create_handler("ScriptAddingHttpResponseHandler", &params).unwrap();
        assert_eq!(handler.name(), "ScriptAddingHttpResponseHandler");
    }

    #[test]
    fn test_script_adding_requires_exactly_one_script() {
        let none = HandlerParams::new();
        let err = create_handler("ScriptAddingHttpResponseHandler", &none).unwrap_err();
        assert!(matches!(err, RewriteError::InvalidConfiguration(_)));

        let two = HandlerParams::new().with("script", "a").with("script", "b");
        let err = create_handler("ScriptAddingHttpResponseHandler", &two).unwrap_err();
        assert!(matches!(err, RewriteError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let params = HandlerParams::new().with("script", "a");
        let err = create_handler("NoSuchHandler", &params).unwrap_err();
        assert!(matches!(err, RewriteError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("NoSuchHandler"));
    }

    #[test]
    fn test_create_content_modifying_handler() {
        let params = HandlerParams::parse(
            "pattern=%3C%2Fbody%3E&replacement=%3Cfooter%2F%3E&mode=append&first_match_only=true&content_type=text/html",
        );
        let handler = create_handler("ContentModifyingHttpResponseHandler", &params).unwrap();
        assert_eq!(handler.name(), "ContentModifyingHttpResponseHandler");
    }

    #[test]
    fn test_content_modifying_validation() {
        let kind = "ContentModifyingHttpResponseHandler";

        let missing_replacement = HandlerParams::new().with("pattern", "a");
        assert!(create_handler(kind, &missing_replacement).is_err());

        let bad_pattern = HandlerParams::new()
            .with("pattern", "(")
            .with("replacement", "x");
        assert!(matches!(
            create_handler(kind, &bad_pattern),
            Err(RewriteError::InvalidConfiguration(_))
        ));

        let bad_mode = HandlerParams::new()
            .with("pattern", "a")
            .with("replacement", "x")
            .with("mode", "prepend");
        assert!(create_handler(kind, &bad_mode).is_err());

        let bad_flag = HandlerParams::new()
            .with("pattern", "a")
            .with("replacement", "x")
            .with("first_match_only", "sometimes");
        assert!(create_handler(kind, &bad_flag).is_err());

        let two_modes = HandlerParams::new()
            .with("pattern", "a")
            .with("replacement", "x")
            .with("mode", "append")
            .with("mode", "replace");
        assert!(create_handler(kind, &two_modes).is_err());
    }
}
