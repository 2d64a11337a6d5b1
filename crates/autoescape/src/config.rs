//! Pipeline configuration.

use crate::action::sentinel;
use crate::escaper::Escaper;
use serde::Deserialize;
use thiserror::Error;

/// Action delimiters recognized by the extractor.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Delimiters {
    pub open: String,
    pub close: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            open: "{{".to_string(),
            close: "}}".to_string(),
        }
    }
}

/// What to do with value-emitting actions inside HTML comments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentPolicy {
    /// Fail with `UnescapableContext`.
    #[default]
    Reject,
    /// Attach the comment escaper.
    Escape,
}

/// Names under which the evaluator exposes each escaper.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EscaperNames {
    pub html: String,
    pub html_attr: String,
    pub url: String,
    pub js_string: String,
    pub comment: String,
}

impl Default for EscaperNames {
    fn default() -> Self {
        Self {
            html: "escape_html".to_string(),
            html_attr: "escape_html_attr".to_string(),
            url: "escape_url".to_string(),
            js_string: "escape_js_string".to_string(),
            comment: "escape_comment".to_string(),
        }
    }
}

impl EscaperNames {
    pub fn name(&self, escaper: Escaper) -> &str {
        match escaper {
            Escaper::Html => &self.html,
            Escaper::HtmlAttr => &self.html_attr,
            Escaper::Url => &self.url,
            Escaper::JsString => &self.js_string,
            Escaper::Comment => &self.comment,
        }
    }
}

const DEFAULT_URL_ATTRIBUTES: &[&str] = &[
    "href",
    "src",
    "action",
    "formaction",
    "cite",
    "poster",
    "background",
    "ping",
    "longdesc",
    "codebase",
    "data",
    "manifest",
];

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EscapeConfig {
    pub delimiters: Delimiters,
    /// Attribute names whose values are URLs. Matched ASCII case-insensitively.
    pub url_attributes: Vec<String>,
    pub comment_policy: CommentPolicy,
    pub escaper_names: EscaperNames,
}

impl Default for EscapeConfig {
    fn default() -> Self {
        Self {
            delimiters: Delimiters::default(),
            url_attributes: DEFAULT_URL_ATTRIBUTES
                .iter()
                .map(|name| name.to_string())
                .collect(),
            comment_policy: CommentPolicy::default(),
            escaper_names: EscaperNames::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("delimiters must be non-empty")]
    EmptyDelimiter,
    #[error("opening and closing delimiters must differ")]
    IdenticalDelimiters,
    #[error("delimiter {0:?} contains a reserved character")]
    ReservedDelimiter(String),
    #[error("escaper name for {0:?} must be non-empty")]
    EmptyEscaperName(Escaper),
}

impl EscapeConfig {
    /// Parse a TOML document; omitted keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EscapeConfig = toml::from_str(text)?;
        config.validated()
    }

    /// Check invariants and normalize attribute names to lowercase.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        let Delimiters { open, close } = &self.delimiters;
        if open.is_empty() || close.is_empty() {
            return Err(ConfigError::EmptyDelimiter);
        }
        if open == close {
            return Err(ConfigError::IdenticalDelimiters);
        }
        for delim in [open, close] {
            if delim.chars().any(sentinel::is_reserved) {
                return Err(ConfigError::ReservedDelimiter(delim.clone()));
            }
        }
        for escaper in Escaper::ALL {
            if self.escaper_names.name(escaper).trim().is_empty() {
                return Err(ConfigError::EmptyEscaperName(escaper));
            }
        }
        for name in &mut self.url_attributes {
            name.make_ascii_lowercase();
        }
        Ok(self)
    }

    pub fn is_url_attribute(&self, name: &str) -> bool {
        self.url_attributes
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(name))
    }
}
