use super::{TokenFmt, Tokenized, tokenize};
use crate::action::{Extraction, extract};
use crate::config::Delimiters;
use crate::error::{Construct, EscapeError};
use crate::span::Span;
use crate::token::{Quote, Site, Token};
use crate::tokenizer::token_fmt::readable;

fn run(source: &str) -> (Extraction, Tokenized) {
    let extraction = extract(source, &Delimiters::default()).expect("extraction must succeed");
    let tokenized = tokenize(&extraction).expect("tokenization must succeed");
    (extraction, tokenized)
}

fn lines(source: &str) -> Vec<String> {
    let (_, tokenized) = run(source);
    TokenFmt::new(&tokenized.output)
        .format_all(&tokenized.tokens)
        .expect("token formatting in tests must be deterministic")
}

fn rewritten(source: &str) -> String {
    readable(&run(source).1.output)
}

fn unterminated(source: &str) -> (Span, Construct) {
    let extraction = extract(source, &Delimiters::default()).unwrap();
    match tokenize(&extraction) {
        Err(EscapeError::UnterminatedToken { span, construct }) => (span, construct),
        other => panic!("expected UnterminatedToken for {source:?}, got {other:?}"),
    }
}

#[test]
fn plain_markup_tokens() {
    assert_eq!(
        lines("<div class=\"a\">Hi</div>"),
        vec![
            "TAG_OPEN name=div",
            "ATTR_NAME name=class",
            "ATTR_VALUE quote=double value=\"a\"",
            "TAG_CLOSE",
            "TEXT text=\"Hi\"",
            "END name=div",
        ]
    );
}

#[test]
fn double_quoted_markup_is_untouched() {
    let source = "<P ID=\"x\"><img src=\"a.png\" alt=\"\"/> text &amp; more</P>";
    let (_, tokenized) = run(source);
    assert_eq!(tokenized.output, source);
    assert!(tokenized.map.is_empty());
    assert_eq!(tokenized.stats.rewrites, 0);
    assert!(
        lines(source).contains(&"TAG_OPEN name=p".to_string()),
        "tag names are lowercased"
    );
}

#[test]
fn attribute_values_are_requoted() {
    assert_eq!(
        rewritten("<a title='x\"y' href=/a/b data=a=b>"),
        "<a title=\"x&#34;y\" href=\"/a/b\" data=\"a=b\">"
    );
}

#[test]
fn self_closing_slash_is_not_absorbed() {
    assert_eq!(rewritten("<br x=y/>"), "<br x=\"y\"/>");
    assert_eq!(
        lines("<br x=y/>"),
        vec![
            "TAG_OPEN name=br",
            "ATTR_NAME name=x",
            "ATTR_VALUE quote=unquoted value=\"y\"",
            "SELF_CLOSE",
        ]
    );
    assert_eq!(rewritten("<br x=y/ >"), "<br x=\"y/\" >");
}

#[test]
fn missing_value_becomes_empty_string() {
    assert_eq!(rewritten("<input value=>"), "<input value=\"\">");
    assert_eq!(rewritten("<input value=/>"), "<input value=\"\"/>");
    assert!(
        lines("<input value=>").contains(&"ATTR_VALUE quote=missing value=\"\"".to_string())
    );
}

#[test]
fn bare_ampersands_are_escaped_in_requoted_values() {
    assert_eq!(
        rewritten("<a title='a & b &amp; c' alt=x&y>"),
        "<a title=\"a &amp; b &amp; c\" alt=\"x&amp;y\">"
    );
    assert_eq!(rewritten("<a title=\"a & b\">"), "<a title=\"a & b\">");
}

#[test]
fn boolean_and_odd_attribute_names() {
    assert_eq!(
        lines("<input disabled =x>"),
        vec![
            "TAG_OPEN name=input",
            "ATTR_NAME name=disabled",
            "ATTR_VALUE quote=unquoted value=\"x\"",
            "TAG_CLOSE",
        ]
    );
    assert_eq!(
        lines("<p =a>")[1],
        "ATTR_NAME name==a",
        "a leading `=` belongs to the name"
    );
}

#[test]
fn sentinel_sites() {
    assert_eq!(
        lines("<a href={{.U}}>{{.T}}</a>"),
        vec![
            "TAG_OPEN name=a",
            "ATTR_NAME name=href",
            "ACTION id=0 site=attr-value",
            "ATTR_VALUE quote=unquoted value=\"{{#0}}\"",
            "TAG_CLOSE",
            "ACTION id=1 site=data",
            "END name=a",
        ]
    );
    assert_eq!(rewritten("<a href={{.U}}>"), "<a href=\"{{#0}}\">");
}

#[test]
fn sentinels_in_structural_positions() {
    let sites = |source: &str| -> Vec<Site> {
        run(source)
            .1
            .tokens
            .iter()
            .filter_map(|token| match token {
                Token::Sentinel { site, .. } => Some(*site),
                _ => None,
            })
            .collect()
    };
    assert_eq!(sites("<{{.T}}>"), vec![Site::TagName]);
    assert_eq!(sites("<a {{.A}}=x>"), vec![Site::BeforeAttrName]);
    assert_eq!(sites("<a on{{.E}}=x>"), vec![Site::AttrName]);
    assert_eq!(sites("<a b= {{/* c */}}x>"), vec![Site::BeforeAttrValue]);
    assert_eq!(sites("</{{.T}}>"), vec![Site::TagName]);
}

#[test]
fn sentinels_record_the_name_they_split() {
    let partials = |source: &str| -> Vec<String> {
        run(source)
            .1
            .tokens
            .into_iter()
            .filter_map(|token| match token {
                Token::Sentinel { partial, .. } => Some(partial),
                _ => None,
            })
            .collect()
    };
    assert_eq!(
        partials("<a {{if .C}}onClick{{else}}title{{end}}>"),
        vec!["", "onclick", "title"]
    );
    assert_eq!(
        partials("{{if .C}}</B{{else}}<b{{end}}>"),
        vec!["", "/b", "b"]
    );
    assert_eq!(partials("<p>{{.X}}</p>"), vec![""]);
}

#[test]
fn dynamic_attribute_name_is_lexed_as_a_name() {
    assert_eq!(
        lines("<a {{.A}}=x>")[1..4],
        [
            "ACTION id=0 site=before-attr-name",
            "ATTR_NAME name={{#0}}",
            "ATTR_VALUE quote=unquoted value=\"x\"",
        ]
    );
}

#[test]
fn raw_text_and_rcdata() {
    assert_eq!(
        lines("<script>var x = \"</b>\"; {{.X}}</SCRIPT >"),
        vec![
            "TAG_OPEN name=script",
            "TAG_CLOSE",
            "TEXT text=\"var x = \\\"</b>\\\"; \"",
            "ACTION id=0 site=rawtext(script)",
            "END name=script",
        ]
    );
    assert_eq!(
        lines("<title>a<b>{{.T}}</title>"),
        vec![
            "TAG_OPEN name=title",
            "TAG_CLOSE",
            "TEXT text=\"a<b>\"",
            "ACTION id=0 site=rcdata",
            "END name=title",
        ]
    );
    assert_eq!(
        lines("<style>{{.S}}</style>")[2],
        "ACTION id=0 site=rawtext(style)"
    );
}

#[test]
fn comments_and_declarations() {
    assert_eq!(
        lines("<!-- {{.C}} -->x"),
        vec![
            "ACTION id=0 site=comment",
            "COMMENT text=\" {{#0}} \"",
            "TEXT text=\"x\"",
        ]
    );
    assert_eq!(
        lines("<!DOCTYPE html><p>"),
        vec!["COMMENT text=\"DOCTYPE html\"", "TAG_OPEN name=p", "TAG_CLOSE"]
    );
    assert_eq!(lines("</ x>"), vec!["COMMENT text=\" x\""]);
    assert_eq!(lines("<!---->"), vec!["COMMENT text=\"\""]);
    assert_eq!(lines("<!-->"), vec!["COMMENT text=\"\""]);
}

#[test]
fn literal_less_than_stays_text() {
    assert_eq!(lines("a < b <3"), vec!["TEXT text=\"a < b <3\""]);
    assert_eq!(lines("x<"), vec!["TEXT text=\"x<\""]);
}

#[test]
fn unterminated_constructs_point_at_their_opener() {
    assert_eq!(
        unterminated("<p>ok</p><img src=\"x"),
        (Span::new(9, 13), Construct::Tag)
    );
    assert_eq!(
        unterminated("{{.A}}<img"),
        (Span::new(6, 10), Construct::Tag)
    );
    assert_eq!(unterminated("<!-- x"), (Span::new(0, 4), Construct::Comment));
    assert_eq!(
        unterminated("<script>x"),
        (Span::new(0, 7), Construct::RawText)
    );
    assert_eq!(unterminated("<a href=x").1, Construct::Tag);
}

#[test]
fn branch_arms_start_from_the_same_state() {
    let source = "<a {{if .X}}href=\"{{.U}}\"{{else}}title={{.T}}{{end}}>";
    assert_eq!(
        rewritten(source),
        "<a {{#0}}href=\"{{#1}}\"{{#2}}title=\"{{#3}}\"{{#4}}>"
    );
    let sites: Vec<String> = lines(source)
        .into_iter()
        .filter(|line| line.starts_with("ACTION"))
        .collect();
    assert_eq!(
        sites,
        vec![
            "ACTION id=0 site=before-attr-name",
            "ACTION id=1 site=attr-value",
            "ACTION id=2 site=before-attr-name",
            "ACTION id=3 site=attr-value",
            "ACTION id=4 site=before-attr-name",
        ]
    );
}

#[test]
fn control_actions_close_unquoted_values() {
    assert_eq!(
        rewritten("<a href=x{{if .A}}>{{end}}"),
        "<a href=\"x\"{{#0}}>{{#1}}"
    );
    assert_eq!(
        rewritten("<a href={{if .A}}>{{end}}"),
        "<a href=\"\"{{#0}}>{{#1}}"
    );
}

#[test]
fn silent_actions_do_not_change_state() {
    assert_eq!(
        rewritten("<a href={{/* c */}}x>"),
        "<a href={{#0}}\"x\">"
    );
}

#[test]
fn define_bodies_start_in_data() {
    let source = "<p title=\"{{define \"t\"}}<b>{{.X}}</b>{{end}}x\">";
    let out = lines(source);
    assert!(out.contains(&"ACTION id=1 site=data".to_string()), "{out:?}");
    assert!(out.contains(&"TAG_OPEN name=b".to_string()));
    assert_eq!(out.last().map(String::as_str), Some("TAG_CLOSE"));
}

#[test]
fn rewrites_are_recorded_in_the_map() {
    let (_, tokenized) = run("<a b=c d='e'>");
    assert_eq!(tokenized.output, "<a b=\"c\" d=\"e\">");
    assert_eq!(tokenized.stats.rewrites, 4);
    assert_eq!(tokenized.map.shifts().len(), 4);
    assert!(tokenized.stats.state_transitions > 0);
    assert_eq!(
        tokenized.stats.tokens_emitted as usize,
        tokenized.tokens.len()
    );
}

#[test]
fn token_spans_map_back_to_source() {
    let source = "{{.A}}<a href=x title='{{.B}}'>";
    let (extraction, tokenized) = run(source);
    for token in &tokenized.tokens {
        let original = tokenized.source_span(&extraction, token.span());
        let text = original.slice(source).expect("span on char boundaries");
        match token {
            Token::AttrValue {
                quote: Quote::Unquoted,
                ..
            } => assert_eq!(text, "x"),
            Token::AttrValue {
                quote: Quote::Single,
                ..
            } => assert_eq!(text, "{{.B}}"),
            Token::Sentinel { action, .. } => {
                assert_eq!(original, extraction.actions[action.index()].span);
            }
            Token::TagOpen { .. } => assert_eq!(text, "<a"),
            Token::AttrName { name, .. } => assert_eq!(text, name.as_str()),
            _ => {}
        }
    }
}
