//! Pattern/replacement rules applied to decoded response text

use std::borrow::Cow;

use regex::{NoExpand, Regex};

use crate::error::{Result, RewriteError};

/// How the configured text relates to the matched pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RewriteMode {
    /// The match is replaced by the configured text
    #[default]
    Replace,
    /// The configured text is inserted after the pattern
    Append,
}

impl RewriteMode {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "append" => Ok(Self::Append),
            other => Err(RewriteError::InvalidConfiguration(format!(
                "unknown rewrite mode: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Append => "append",
        }
    }
}

/// Immutable substitution rule
///
/// Append mode is folded into the replacement at construction, so applying a
/// rule is always a plain replace. Replacements are inserted literally; `$`
/// has no special meaning.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    replacement: String,
    first_match_only: bool,
}

impl RewriteRule {
    pub fn new(pattern: &str, text: &str, mode: RewriteMode, first_match_only: bool) -> Result<Self> {
        let regex = Regex::new(pattern)?;

        let replacement = match mode {
            RewriteMode::Replace => text.to_string(),
            RewriteMode::Append => format!("{}{}", pattern, text),
        };

        Ok(Self {
            pattern: regex,
            replacement,
            first_match_only,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    pub fn first_match_only(&self) -> bool {
        self.first_match_only
    }

    /// Rewrite `text`; borrows the input unchanged when nothing matched
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let replacement = NoExpand(self.replacement.as_str());
        if self.first_match_only {
            self.pattern.replacen(text, 1, replacement)
        } else {
            self.pattern.replace_all(text, replacement)
        }
    }
}
