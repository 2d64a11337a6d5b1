//! Deterministic token formatting for golden tests and `--report` output.
//!
//! Sentinels embedded in names, values and text render as `{{#N}}` so snapshots
//! stay readable and independent of the private-use encoding.

use crate::action::sentinel;
use crate::span::Span;
use crate::token::{Quote, Token};
use std::fmt::Write;

#[derive(Debug)]
pub enum TokenFmtError {
    InvalidSpan { span: Span },
}

impl std::fmt::Display for TokenFmtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenFmtError::InvalidSpan { span } => write!(f, "invalid span: {span}"),
        }
    }
}

impl std::error::Error for TokenFmtError {}

/// Formatter bound to the rewritten text the token spans refer to.
pub struct TokenFmt<'a> {
    output: &'a str,
}

impl<'a> TokenFmt<'a> {
    pub fn new(output: &'a str) -> Self {
        Self { output }
    }

    pub fn resolve(&self, span: Span) -> Result<&'a str, TokenFmtError> {
        span.slice(self.output)
            .ok_or(TokenFmtError::InvalidSpan { span })
    }

    pub fn format_token(&self, token: &Token) -> Result<String, TokenFmtError> {
        Ok(match token {
            Token::TagOpen { name, .. } => format!("TAG_OPEN name={}", readable(name)),
            Token::TagClose { .. } => "TAG_CLOSE".to_string(),
            Token::SelfClose { .. } => "SELF_CLOSE".to_string(),
            Token::EndTag { name, .. } => format!("END name={}", readable(name)),
            Token::AttrName { name, .. } => format!("ATTR_NAME name={}", readable(name)),
            Token::AttrValue { value, quote, .. } => format!(
                "ATTR_VALUE quote={} value=\"{}\"",
                quote_name(*quote),
                escape_text(&readable(value))
            ),
            Token::Text { span } => format!(
                "TEXT text=\"{}\"",
                escape_text(&readable(self.resolve(*span)?))
            ),
            Token::Comment { text, .. } => {
                format!("COMMENT text=\"{}\"", escape_text(&readable(text)))
            }
            Token::Sentinel { action, site, .. } => {
                format!("ACTION id={} site={site}", action.0)
            }
        })
    }

    /// One formatted line per token.
    pub fn format_all(&self, tokens: &[Token]) -> Result<Vec<String>, TokenFmtError> {
        tokens.iter().map(|token| self.format_token(token)).collect()
    }
}

fn quote_name(quote: Quote) -> &'static str {
    match quote {
        Quote::Double => "double",
        Quote::Single => "single",
        Quote::Unquoted => "unquoted",
        Quote::Missing => "missing",
    }
}

/// Replace sentinels with `{{#N}}`.
pub(crate) fn readable(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find(sentinel::OPEN) {
        out.push_str(&rest[..idx]);
        match sentinel::decode_at(rest, idx) {
            Some(id) => {
                let _ = write!(out, "{{{{#{}}}}}", id.0);
                rest = &rest[idx + sentinel::LEN..];
            }
            None => {
                out.push(sentinel::OPEN);
                rest = &rest[idx + sentinel::OPEN.len_utf8()..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if ch < ' ' || ch == '\u{7f}' => {
                let _ = write!(&mut out, "\\u{{{:02X}}}", ch as u32);
            }
            _ => out.push(ch),
        }
    }
    out
}
