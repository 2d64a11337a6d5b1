//! Property tests for the escaping pipeline.

use autoescape::{
    Delimiters, EscapeConfig, Escaper, Quote, Token, escape_template, extract, tokenize,
};
use proptest::prelude::*;

fn tag_name() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["p", "div", "span", "a", "em", "li"])
}

fn attr_name() -> impl Strategy<Value = String> {
    "[a-z][a-z-]{0,6}"
}

/// Markup fragments with double-quoted attributes only.
fn quoted_fragment() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 .,!?]{1,12}",
        (
            tag_name(),
            prop::collection::vec((attr_name(), "[a-zA-Z0-9 /.:#-]{0,10}"), 0..3)
        )
            .prop_map(|(tag, attrs)| {
                let attrs: String = attrs
                    .iter()
                    .map(|(name, value)| format!(" {name}=\"{value}\""))
                    .collect();
                format!("<{tag}{attrs}>")
            }),
        tag_name().prop_map(|tag| format!("</{tag}>")),
        "[a-z ]{0,10}".prop_map(|text| format!("<!--{text}-->")),
        Just("<br/>".to_string()),
        Just("<!DOCTYPE html>".to_string()),
    ]
}

/// Fragments mixing markup with actions in text and attribute values.
fn templated_fragment() -> impl Strategy<Value = String> {
    prop_oneof![
        quoted_fragment(),
        prop::sample::select(vec!["{{.A}}", "{{ .B -}}", "{{/* note */}}", "{{$x := .C}}"])
            .prop_map(str::to_string),
        (tag_name(), attr_name(), 0..3usize).prop_map(|(tag, name, quoting)| match quoting {
            0 => format!("<{tag} {name}=\"{{{{.V}}}}\">"),
            1 => format!("<{tag} {name}='x {{{{.V}}}}'>"),
            _ => format!("<{tag} {name}={{{{.V}}}}>"),
        }),
        (tag_name(), attr_name(), "([a-z0-9 =\"/.]|& ){0,6}")
            .prop_map(|(tag, name, value)| format!("<{tag} {name}='{value}'>")),
        (tag_name(), attr_name(), "[a-z0-9/.][a-z0-9/.\"]{0,5}")
            .prop_map(|(tag, name, value)| format!("<{tag} {name}={value}>")),
    ]
}

/// What re-quoting makes of a raw value with only bare `&`.
fn requoted(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('"', "&#34;")
}

fn template(fragment: impl Strategy<Value = String>) -> impl Strategy<Value = String> {
    prop::collection::vec(fragment, 0..12).prop_map(|parts| parts.concat())
}

fn token_kind(token: &Token) -> &'static str {
    match token {
        Token::TagOpen { .. } => "tag-open",
        Token::TagClose { .. } => "tag-close",
        Token::SelfClose { .. } => "self-close",
        Token::EndTag { .. } => "end-tag",
        Token::AttrName { .. } => "attr-name",
        Token::AttrValue { .. } => "attr-value",
        Token::Text { .. } => "text",
        Token::Comment { .. } => "comment",
        Token::Sentinel { .. } => "sentinel",
    }
}

/// Structural skeleton of plain markup: every token kind except text.
fn skeleton(markup: &str) -> Vec<&'static str> {
    let extraction = extract(markup, &Delimiters::default()).expect("no actions to extract");
    let tokenized = tokenize(&extraction).expect("markup must tokenize");
    tokenized
        .tokens
        .iter()
        .map(token_kind)
        .filter(|kind| *kind != "text")
        .collect()
}

/// Characters that matter for injection, minus action delimiters.
const ADVERSARIAL: &str = "[<>\"&'`=/!:;a-zA-Z0-9 \\t\\n\\\\-]{0,32}";

proptest! {
    #[test]
    fn double_quoted_markup_round_trips(source in template(quoted_fragment())) {
        let escaped = escape_template(&source, &EscapeConfig::default()).unwrap();
        prop_assert_eq!(&escaped.text, &source);
        prop_assert!(escaped.actions.is_empty());
    }

    #[test]
    fn values_are_requoted(
        unquoted in "[a-z0-9=/.]{1,8}",
        single in "[a-z0-9 =\"/.]{0,8}",
    ) {
        let source = format!("<p x={unquoted} y='{single}'>");
        let extraction = extract(&source, &Delimiters::default()).unwrap();
        let tokenized = tokenize(&extraction).unwrap();
        let requoted = single.replace('"', "&#34;");
        prop_assert_eq!(
            &tokenized.output,
            &format!("<p x=\"{unquoted}\" y=\"{requoted}\">")
        );
        let values: Vec<(&str, Quote)> = tokenized
            .tokens
            .iter()
            .filter_map(|token| match token {
                Token::AttrValue { value, quote, .. } => Some((value.as_str(), *quote)),
                _ => None,
            })
            .collect();
        prop_assert_eq!(
            values,
            vec![
                (unquoted.as_str(), Quote::Unquoted),
                (requoted.as_str(), Quote::Single),
            ]
        );
    }

    #[test]
    fn token_spans_map_back_to_source(source in template(templated_fragment())) {
        let extraction = extract(&source, &Delimiters::default()).unwrap();
        let tokenized = tokenize(&extraction).unwrap();
        for token in &tokenized.tokens {
            let original = tokenized.source_span(&extraction, token.span());
            match token {
                Token::Sentinel { action, .. } => {
                    prop_assert_eq!(original, extraction.actions[action.index()].span);
                }
                Token::TagOpen { name, .. } => {
                    let text = original.slice(&source).unwrap_or_default();
                    prop_assert_eq!(text.to_ascii_lowercase(), format!("<{name}"));
                }
                Token::AttrName { name, .. } => {
                    prop_assert_eq!(original.slice(&source), Some(name.as_str()));
                }
                Token::AttrValue { value, .. } if !value.contains('\u{E000}') => {
                    let raw = original.slice(&source).unwrap_or_default();
                    prop_assert_eq!(&requoted(raw), value);
                }
                Token::Text { span } | Token::Comment { span, .. } => {
                    prop_assert_eq!(original.slice(&source), span.slice(&tokenized.output));
                }
                _ => {}
            }
        }
    }

    #[test]
    fn classification_is_deterministic(source in template(templated_fragment())) {
        let config = EscapeConfig::default();
        prop_assert_eq!(
            escape_template(&source, &config),
            escape_template(&source, &config)
        );
    }

    #[test]
    fn escaped_values_add_no_boundaries(value in ADVERSARIAL) {
        let html = Escaper::Html.apply(&value);
        prop_assert_eq!(
            skeleton(&format!("<p>{html}</p>")),
            vec!["tag-open", "tag-close", "end-tag"]
        );
        prop_assert_eq!(
            skeleton(&format!("<textarea>{html}</textarea>")),
            vec!["tag-open", "tag-close", "end-tag"]
        );

        let attribute = vec!["tag-open", "attr-name", "attr-value", "tag-close"];
        for (name, chain) in [
            ("title", &[Escaper::HtmlAttr][..]),
            ("href", &[Escaper::Url, Escaper::HtmlAttr][..]),
            ("onclick", &[Escaper::JsString, Escaper::HtmlAttr][..]),
        ] {
            let escaped = Escaper::apply_chain(chain, &value);
            prop_assert_eq!(
                skeleton(&format!("<a {name}=\"{escaped}\">")),
                attribute.clone()
            );
        }

        let js = Escaper::JsString.apply(&value);
        prop_assert_eq!(
            skeleton(&format!("<script>var x = \"{js}\";</script>")),
            vec!["tag-open", "tag-close", "end-tag"]
        );

        let comment = Escaper::Comment.apply(&value);
        prop_assert_eq!(skeleton(&format!("<!--{comment}-->")), vec!["comment"]);
    }
}

#[test]
fn exotic_unquoted_values() {
    let cases = [
        ("<p a=b=c>", "<p a=\"b=c\">"),
        ("<a href=/a/b>", "<a href=\"/a/b\">"),
        ("<br x=y/>", "<br x=\"y\"/>"),
        ("<br x=y/ >", "<br x=\"y/\" >"),
        ("<p a==b>", "<p a=\"=b\">"),
    ];
    for (source, expected) in cases {
        let escaped = escape_template(source, &EscapeConfig::default()).unwrap();
        assert_eq!(escaped.text, expected, "{source}");
    }
}
