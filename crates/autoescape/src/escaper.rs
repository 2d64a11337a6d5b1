//! Escaper selection and the runtime escapers themselves.
//!
//! The selection table is fixed: a context maps to one chain, or to nothing
//! when no escaper can make a value safe there. The escapers are the functions
//! an evaluator registers under the configured names.

use crate::config::CommentPolicy;
use crate::context::Context;
use std::fmt::{self, Write};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Escaper {
    Html,
    HtmlAttr,
    Url,
    JsString,
    Comment,
}

/// Returned by the URL escaper for schemes outside the allow-list.
pub const UNSAFE_URL: &str = "#ZautoescapeZ";

const SAFE_SCHEMES: &[&str] = &["http", "https", "mailto"];

impl Escaper {
    pub const ALL: [Escaper; 5] = [
        Escaper::Html,
        Escaper::HtmlAttr,
        Escaper::Url,
        Escaper::JsString,
        Escaper::Comment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Escaper::Html => "html",
            Escaper::HtmlAttr => "html-attr",
            Escaper::Url => "url",
            Escaper::JsString => "js-string",
            Escaper::Comment => "comment",
        }
    }

    pub fn write_escaped<W: Write>(self, dest: &mut W, value: &str) -> fmt::Result {
        match self {
            Escaper::Html => write_replacing(dest, value, html_replacement),
            Escaper::HtmlAttr => write_replacing(dest, value, html_attr_replacement),
            Escaper::Url => write_url(dest, value),
            Escaper::JsString => write_js_string(dest, value),
            Escaper::Comment => write_replacing(dest, value, comment_replacement),
        }
    }

    pub fn apply(self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        // Writing into a String cannot fail.
        let _ = self.write_escaped(&mut out, value);
        out
    }

    /// Apply a whole chain, first stage first.
    pub fn apply_chain(chain: &[Escaper], value: &str) -> String {
        chain
            .iter()
            .fold(value.to_string(), |acc, escaper| escaper.apply(&acc))
    }
}

impl fmt::Display for Escaper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Escaper chain for a context; `None` means the context is unescapable.
pub fn chain_for(context: Context, comments: CommentPolicy) -> Option<&'static [Escaper]> {
    match context {
        Context::Text | Context::RcdataText => Some(&[Escaper::Html]),
        Context::AttrValueDoubleQuoted | Context::AttrValueUnquoted => Some(&[Escaper::HtmlAttr]),
        Context::UrlAttrValue => Some(&[Escaper::Url, Escaper::HtmlAttr]),
        Context::JsAttrValue => Some(&[Escaper::JsString, Escaper::HtmlAttr]),
        Context::ScriptText => Some(&[Escaper::JsString]),
        Context::Comment => match comments {
            CommentPolicy::Escape => Some(&[Escaper::Comment]),
            CommentPolicy::Reject => None,
        },
        Context::TagName
        | Context::AttrName
        | Context::BeforeAttrName
        | Context::BeforeAttrValue
        | Context::DynamicAttrName
        | Context::StyleText
        | Context::StyleAttrValue => None,
    }
}

fn html_replacement(ch: char) -> Option<&'static str> {
    Some(match ch {
        '&' => "&amp;",
        '<' => "&lt;",
        '>' => "&gt;",
        '"' => "&#34;",
        '\'' => "&#39;",
        '\0' => "\u{FFFD}",
        _ => return None,
    })
}

fn html_attr_replacement(ch: char) -> Option<&'static str> {
    match ch {
        '`' => Some("&#96;"),
        _ => html_replacement(ch),
    }
}

fn comment_replacement(ch: char) -> Option<&'static str> {
    Some(match ch {
        '-' => "&#45;",
        '!' => "&#33;",
        '<' => "&lt;",
        '>' => "&gt;",
        _ => return None,
    })
}

/// Copy runs of untouched text in one write each.
fn write_replacing<W: Write>(
    dest: &mut W,
    value: &str,
    replacement: fn(char) -> Option<&'static str>,
) -> fmt::Result {
    let mut copied = 0;
    for (idx, ch) in value.char_indices() {
        if let Some(with) = replacement(ch) {
            dest.write_str(&value[copied..idx])?;
            dest.write_str(with)?;
            copied = idx + ch.len_utf8();
        }
    }
    dest.write_str(&value[copied..])
}

/// The scheme, if the value has one before any path, query or fragment.
fn scheme(value: &str) -> Option<&str> {
    let end = value.find([':', '/', '?', '#'])?;
    (value.as_bytes()[end] == b':').then(|| &value[..end])
}

fn is_url_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"-._~:/?#[]@!$&'()*+,;=".contains(&byte)
}

fn write_url<W: Write>(dest: &mut W, value: &str) -> fmt::Result {
    if let Some(scheme) = scheme(value)
        && !SAFE_SCHEMES
            .iter()
            .any(|safe| safe.eq_ignore_ascii_case(scheme.trim()))
    {
        log::trace!(target: "autoescape.escaper", "rejected URL scheme {scheme:?}");
        return dest.write_str(UNSAFE_URL);
    }
    let bytes = value.as_bytes();
    for (idx, &byte) in bytes.iter().enumerate() {
        let keep = is_url_safe(byte)
            || (byte == b'%'
                && bytes.get(idx + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(idx + 2).is_some_and(u8::is_ascii_hexdigit));
        if keep {
            dest.write_char(char::from(byte))?;
        } else {
            write!(dest, "%{byte:02X}")?;
        }
    }
    Ok(())
}

fn write_js_string<W: Write>(dest: &mut W, value: &str) -> fmt::Result {
    for ch in value.chars() {
        match ch {
            '\\' => dest.write_str("\\\\")?,
            '\n' => dest.write_str("\\n")?,
            '\r' => dest.write_str("\\r")?,
            '\t' => dest.write_str("\\t")?,
            '"' | '\'' | '`' | '<' | '>' | '&' | '=' | '\u{2028}' | '\u{2029}' => {
                write!(dest, "\\u{:04x}", u32::from(ch))?
            }
            ch if ch.is_ascii_control() => write!(dest, "\\u{:04x}", u32::from(ch))?,
            ch => dest.write_char(ch)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_escaper() {
        assert_eq!(
            Escaper::Html.apply("<b class=\"x\">Tom & 'Jerry'\0</b>"),
            "&lt;b class=&#34;x&#34;&gt;Tom &amp; &#39;Jerry&#39;\u{FFFD}&lt;/b&gt;"
        );
        assert_eq!(Escaper::Html.apply("plain text é"), "plain text é");
    }

    #[test]
    fn html_attr_escaper_covers_backticks() {
        assert_eq!(Escaper::HtmlAttr.apply("`x` \"y\""), "&#96;x&#96; &#34;y&#34;");
    }

    #[test]
    fn url_escaper_filters_schemes() {
        assert_eq!(Escaper::Url.apply("javascript:alert(1)"), UNSAFE_URL);
        assert_eq!(Escaper::Url.apply(" JavaScript:x"), UNSAFE_URL);
        assert_eq!(Escaper::Url.apply("data:text/html,x"), UNSAFE_URL);
        assert_eq!(
            Escaper::Url.apply("HTTPS://example.com/a?b=1&c=2#top"),
            "HTTPS://example.com/a?b=1&c=2#top"
        );
        assert_eq!(Escaper::Url.apply("mailto:a@b.c"), "mailto:a@b.c");
        assert_eq!(Escaper::Url.apply("/path:with/colon"), "/path:with/colon");
    }

    #[test]
    fn url_escaper_percent_encodes() {
        assert_eq!(
            Escaper::Url.apply("/a b\"<>\\é"),
            "/a%20b%22%3C%3E%5C%C3%A9"
        );
        assert_eq!(Escaper::Url.apply("/%41%zz%"), "/%41%25zz%25");
    }

    #[test]
    fn js_string_escaper() {
        assert_eq!(
            Escaper::JsString.apply("a'b\"c\\d</script>"),
            "a\\u0027b\\u0022c\\\\d\\u003c/script\\u003e"
        );
        assert_eq!(
            Escaper::JsString.apply("x=1&y\n\u{2028}`\u{1}"),
            "x\\u003d1\\u0026y\\n\\u2028\\u0060\\u0001"
        );
    }

    #[test]
    fn comment_escaper() {
        assert_eq!(Escaper::Comment.apply("--><!x"), "&#45;&#45;&gt;&lt;&#33;x");
    }

    #[test]
    fn chains_by_context() {
        let chain = |context| chain_for(context, CommentPolicy::Reject);
        assert_eq!(chain(Context::Text), Some(&[Escaper::Html][..]));
        assert_eq!(chain(Context::RcdataText), Some(&[Escaper::Html][..]));
        assert_eq!(
            chain(Context::UrlAttrValue),
            Some(&[Escaper::Url, Escaper::HtmlAttr][..])
        );
        assert_eq!(
            chain(Context::JsAttrValue),
            Some(&[Escaper::JsString, Escaper::HtmlAttr][..])
        );
        assert_eq!(chain(Context::ScriptText), Some(&[Escaper::JsString][..]));
        for context in [
            Context::TagName,
            Context::AttrName,
            Context::BeforeAttrName,
            Context::BeforeAttrValue,
            Context::DynamicAttrName,
            Context::StyleText,
            Context::StyleAttrValue,
            Context::Comment,
        ] {
            assert_eq!(chain(context), None, "{context}");
        }
        assert_eq!(
            chain_for(Context::Comment, CommentPolicy::Escape),
            Some(&[Escaper::Comment][..])
        );
    }

    #[test]
    fn chains_apply_in_order() {
        assert_eq!(
            Escaper::apply_chain(&[Escaper::Url, Escaper::HtmlAttr], "/a?x=1&y='2'"),
            "/a?x=1&amp;y=&#39;2&#39;"
        );
    }
}
