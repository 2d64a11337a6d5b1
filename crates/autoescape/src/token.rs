//! Structural token model.
//!
//! All spans refer to the rewritten (quote-normalized) markup; translate them
//! through `Tokenized::map` and `Extraction::map` to reach the template source.

use crate::action::ActionId;
use crate::span::Span;
use std::fmt;

/// How an attribute value was written before normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quote {
    Double,
    Single,
    Unquoted,
    /// `name=` followed by `>` or `/>`; rewritten as `name=""`.
    Missing,
}

/// Raw-text elements whose content is not markup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawKind {
    Script,
    Style,
}

impl RawKind {
    pub fn tag_name(self) -> &'static str {
        match self {
            RawKind::Script => "script",
            RawKind::Style => "style",
        }
    }
}

/// Lexical position of a sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Site {
    Data,
    RawText(RawKind),
    Rcdata,
    TagName,
    BeforeAttrName,
    AttrName,
    BeforeAttrValue,
    AttrValue,
    Comment,
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Site::Data => f.write_str("data"),
            Site::RawText(kind) => write!(f, "rawtext({})", kind.tag_name()),
            Site::Rcdata => f.write_str("rcdata"),
            Site::TagName => f.write_str("tag-name"),
            Site::BeforeAttrName => f.write_str("before-attr-name"),
            Site::AttrName => f.write_str("attr-name"),
            Site::BeforeAttrValue => f.write_str("before-attr-value"),
            Site::AttrValue => f.write_str("attr-value"),
            Site::Comment => f.write_str("comment"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    /// `<name`; `name` is ASCII-lowercased and may contain sentinels.
    TagOpen { span: Span, name: String },
    /// `>` closing a start tag.
    TagClose { span: Span },
    /// `/>` closing a start tag.
    SelfClose { span: Span },
    /// `</name ...>`.
    EndTag { span: Span, name: String },
    AttrName { span: Span, name: String },
    /// Value between the (normalized) double quotes.
    AttrValue {
        span: Span,
        value: String,
        quote: Quote,
    },
    /// Text run in data, raw text or RCDATA content.
    Text { span: Span },
    /// `<!--...-->` or an opaque declaration passed through verbatim.
    Comment { span: Span, text: String },
    Sentinel {
        action: ActionId,
        span: Span,
        site: Site,
        /// Tag or attribute name read so far at a `TagName`/`AttrName` site;
        /// end tag names carry a leading `/`. Empty at every other site.
        partial: String,
    },
}

impl Token {
    pub fn span(&self) -> Span {
        match self {
            Token::TagOpen { span, .. }
            | Token::TagClose { span }
            | Token::SelfClose { span }
            | Token::EndTag { span, .. }
            | Token::AttrName { span, .. }
            | Token::AttrValue { span, .. }
            | Token::Text { span }
            | Token::Comment { span, .. }
            | Token::Sentinel { span, .. } => *span,
        }
    }
}
