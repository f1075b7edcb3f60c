//! Script injection into HTML pages

use super::{
    ContentModifyingHandler, ContentTypeFilter, InterceptedRequest, InterceptedResponse,
    ResponseHandler, RewriteMode, RewriteRule,
};
use crate::error::Result;
use crate::rewrite::factory::HandlerKind;

const HEAD_TAG: &str = "<head>";
const HTML_CONTENT_TYPE: &str = "text/html";

/// Adds a script tag right after the first `<head>` of `text/html` responses
#[derive(Debug, Clone)]
pub struct ScriptAddingHandler {
    script: String,
    inner: ContentModifyingHandler,
}

impl ScriptAddingHandler {
    pub fn new(script: impl Into<String>) -> Result<Self> {
        let script = script.into();
        let rule = RewriteRule::new(
            HEAD_TAG,
            &format!("<script> {} </script>", script),
            RewriteMode::Append,
            true,
        )?;

        Ok(Self {
            script,
            inner: ContentModifyingHandler::new(rule, ContentTypeFilter::new([HTML_CONTENT_TYPE])),
        })
    }

    /// The injected script payload
    pub fn script(&self) -> &str {
        &self.script
    }
}

impl ResponseHandler for ScriptAddingHandler {
    fn handle(
        &self,
        request: &InterceptedRequest,
        response: &mut InterceptedResponse,
    ) -> Result<()> {
        self.inner.handle(request, response)
    }

    fn name(&self) -> &'static str {
        HandlerKind::ScriptAdding.as_str()
    }
}
