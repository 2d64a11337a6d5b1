//! Tokenizer state machine definitions.

use crate::token::{Quote, RawKind, Site};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TokenizerState {
    Data,
    RawText,
    Rcdata,
    TagOpen,
    EndTagOpen,
    TagName,
    EndTagName,
    BeforeAttrName,
    AttrName,
    AfterAttrName,
    BeforeAttrValue,
    AttrValueDoubleQuoted,
    AttrValueSingleQuoted,
    AttrValueUnquoted,
    SelfClosingStartTag,
    MarkupDeclarationOpen,
    Comment,
    BogusComment,
}

impl TokenizerState {
    pub(crate) fn quote(self) -> Option<Quote> {
        match self {
            TokenizerState::AttrValueDoubleQuoted => Some(Quote::Double),
            TokenizerState::AttrValueSingleQuoted => Some(Quote::Single),
            TokenizerState::AttrValueUnquoted => Some(Quote::Unquoted),
            _ => None,
        }
    }
}

/// Element whose content is lexed as raw text or RCDATA.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TextElement {
    Raw(RawKind),
    Rcdata(&'static str),
}

impl TextElement {
    pub(crate) fn for_tag(name: &str) -> Option<Self> {
        match name {
            "script" => Some(TextElement::Raw(RawKind::Script)),
            "style" => Some(TextElement::Raw(RawKind::Style)),
            "textarea" => Some(TextElement::Rcdata("textarea")),
            "title" => Some(TextElement::Rcdata("title")),
            _ => None,
        }
    }

    pub(crate) fn tag_name(self) -> &'static str {
        match self {
            TextElement::Raw(kind) => kind.tag_name(),
            TextElement::Rcdata(name) => name,
        }
    }

    pub(crate) fn state(self) -> TokenizerState {
        match self {
            TextElement::Raw(_) => TokenizerState::RawText,
            TextElement::Rcdata(_) => TokenizerState::Rcdata,
        }
    }
}

/// Everything that determines how the next byte is lexed.
///
/// Snapshotted at branch openers and restored at `else` so every arm starts
/// from the same place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Lexical {
    pub(crate) state: TokenizerState,
    /// Markup offset of the construct opener (`<`, `<!--`, `<!`).
    pub(crate) opener: usize,
    /// Rewritten offset of the same opener.
    pub(crate) opener_out: usize,
    /// Markup offset just past the opener and tag name; comment content starts here.
    pub(crate) opener_end: usize,
    /// Lowercased tag name, sentinels included verbatim.
    pub(crate) tag_name: String,
    /// End tag name is complete; the rest up to `>` is skipped.
    pub(crate) name_done: bool,
    pub(crate) attr_name: String,
    /// Rewritten offset of the current attribute name.
    pub(crate) attr_name_start: usize,
    /// Rewritten offset of the current attribute value, after its opening quote.
    pub(crate) value_start: usize,
    /// Rewritten offset of the `/` of a pending `/>`.
    pub(crate) slash_out: usize,
    /// Raw text or RCDATA element being lexed, or the one a pending start tag opens.
    pub(crate) element: Option<TextElement>,
}

impl Lexical {
    pub(crate) fn data() -> Self {
        Self {
            state: TokenizerState::Data,
            opener: 0,
            opener_out: 0,
            opener_end: 0,
            tag_name: String::new(),
            name_done: false,
            attr_name: String::new(),
            attr_name_start: 0,
            value_start: 0,
            slash_out: 0,
            element: None,
        }
    }

    /// Tag or attribute name being read, for sentinels at a name site.
    pub(crate) fn partial_name(&self) -> String {
        match self.state {
            TokenizerState::EndTagOpen => "/".to_string(),
            TokenizerState::TagName => self.tag_name.clone(),
            TokenizerState::EndTagName => format!("/{}", self.tag_name),
            TokenizerState::AttrName => self.attr_name.clone(),
            _ => String::new(),
        }
    }

    pub(crate) fn site(&self) -> Site {
        match self.state {
            TokenizerState::Data => Site::Data,
            TokenizerState::RawText => match self.element {
                Some(TextElement::Raw(kind)) => Site::RawText(kind),
                _ => Site::Data,
            },
            TokenizerState::Rcdata => Site::Rcdata,
            TokenizerState::TagOpen
            | TokenizerState::EndTagOpen
            | TokenizerState::TagName
            | TokenizerState::EndTagName => Site::TagName,
            TokenizerState::BeforeAttrName
            | TokenizerState::AfterAttrName
            | TokenizerState::SelfClosingStartTag => Site::BeforeAttrName,
            TokenizerState::AttrName => Site::AttrName,
            TokenizerState::BeforeAttrValue => Site::BeforeAttrValue,
            TokenizerState::AttrValueDoubleQuoted
            | TokenizerState::AttrValueSingleQuoted
            | TokenizerState::AttrValueUnquoted => Site::AttrValue,
            TokenizerState::MarkupDeclarationOpen
            | TokenizerState::Comment
            | TokenizerState::BogusComment => Site::Comment,
        }
    }
}
