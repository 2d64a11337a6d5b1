//! Position-tracking HTML tokenizer.
//!
//! Lexes the sentinel-bearing markup produced by action extraction into a flat
//! structural token stream. The tokenizer is an explicit state machine driven by
//! `step()`; it also writes the quote-normalized output text as it goes.
//!
//! Invariants:
//! - Every attribute value in the output is double-quoted. Each rewrite that
//!   gets it there (quote insertion, quote replacement, entity escaping) appends
//!   one `Shift` to `Tokenized::map`.
//! - Token spans refer to the output text and lie on char boundaries.
//! - Sentinels are recognized in every state. Content sentinels (value-emitting
//!   actions and template calls) lex like markup characters; the others never
//!   change the lexical state.
//! - Each arm of a conditional or loop starts from the lexical state the
//!   construct was entered in; `define` and `block` bodies start in `Data`.

use crate::action::{Action, ActionId, ActionKind, Control, Extraction, sentinel};
use crate::entities::starts_char_ref;
use crate::error::{Construct, EscapeError};
use crate::position::{ChainedMap, PositionMap};
use crate::span::Span;
use crate::token::{Quote, Site, Token};
use states::{Lexical, TextElement, TokenizerState};

mod emit;
mod input;
mod states;
mod token_fmt;

pub use token_fmt::{TokenFmt, TokenFmtError};

/// Minimal tokenizer instrumentation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenizerStats {
    pub steps: u64,
    pub state_transitions: u64,
    pub tokens_emitted: u64,
    pub rewrites: u64,
}

#[derive(Clone, Debug)]
pub struct Tokenized {
    /// Quote-normalized markup, sentinels still in place.
    pub output: String,
    pub tokens: Vec<Token>,
    /// Output offsets -> markup offsets.
    pub map: PositionMap,
    pub stats: TokenizerStats,
}

impl Tokenized {
    /// Translate an output span all the way back to the template source.
    pub fn source_span(&self, extraction: &Extraction, span: Span) -> Span {
        ChainedMap {
            outer: &self.map,
            inner: &extraction.map,
        }
        .span_to_original(span)
    }
}

/// Tokenize extracted markup.
pub fn tokenize(extraction: &Extraction) -> Result<Tokenized, EscapeError> {
    Tokenizer::new(extraction).run()
}

enum Step {
    Progress,
    Done,
}

#[derive(Debug)]
struct BranchFrame {
    control: Control,
    saved: Lexical,
}

pub(crate) struct Tokenizer<'a> {
    input: &'a str,
    actions: &'a [Action],
    source_map: &'a PositionMap,
    lex: Lexical,
    cursor: usize,
    output: String,
    /// Markup offset up to which `output` is complete.
    copied_to: usize,
    map: PositionMap,
    tokens: Vec<Token>,
    /// Rewritten offset where the current text run started.
    pending_text_start: Option<usize>,
    branches: Vec<BranchFrame>,
    stats: TokenizerStats,
}

impl<'a> Tokenizer<'a> {
    fn new(extraction: &'a Extraction) -> Self {
        Self {
            input: &extraction.markup,
            actions: &extraction.actions,
            source_map: &extraction.map,
            lex: Lexical::data(),
            cursor: 0,
            output: String::with_capacity(extraction.markup.len() + 16),
            copied_to: 0,
            map: PositionMap::new(),
            tokens: Vec::new(),
            pending_text_start: None,
            branches: Vec::new(),
            stats: TokenizerStats::default(),
        }
    }

    fn run(mut self) -> Result<Tokenized, EscapeError> {
        loop {
            self.stats.steps = self.stats.steps.saturating_add(1);
            match self.step()? {
                Step::Progress => {}
                Step::Done => break,
            }
        }
        self.flush_to(self.input.len());
        log::debug!(
            target: "autoescape.tokenizer",
            "tokenized {} bytes: {} tokens, {} rewrites, {} steps",
            self.input.len(),
            self.tokens.len(),
            self.stats.rewrites,
            self.stats.steps
        );
        Ok(Tokenized {
            output: self.output,
            tokens: self.tokens,
            map: self.map,
            stats: self.stats,
        })
    }

    fn transition_to(&mut self, next: TokenizerState) {
        if self.lex.state == next {
            return;
        }
        #[cfg(any(test, feature = "debug-stats"))]
        {
            log::trace!(
                target: "autoescape.tokenizer",
                "state {:?} -> {:?} @{}",
                self.lex.state,
                next,
                self.cursor
            );
        }
        self.lex.state = next;
        self.stats.state_transitions = self.stats.state_transitions.saturating_add(1);
    }

    fn step(&mut self) -> Result<Step, EscapeError> {
        if !self.has_unconsumed_input() {
            self.finish_at_eof()?;
            return Ok(Step::Done);
        }
        debug_assert!(self.input.is_char_boundary(self.cursor));
        if let Some(id) = self.sentinel_at_cursor() {
            self.step_sentinel(id);
            return Ok(Step::Progress);
        }
        match self.lex.state {
            TokenizerState::Data => self.step_data(),
            TokenizerState::RawText | TokenizerState::Rcdata => self.step_text_element(),
            TokenizerState::TagOpen => self.step_tag_open(),
            TokenizerState::EndTagOpen => self.step_end_tag_open(),
            TokenizerState::TagName => self.step_tag_name(),
            TokenizerState::EndTagName => self.step_end_tag_name(),
            TokenizerState::BeforeAttrName => self.step_before_attr_name(),
            TokenizerState::AttrName => self.step_attr_name(),
            TokenizerState::AfterAttrName => self.step_after_attr_name(),
            TokenizerState::BeforeAttrValue => self.step_before_attr_value(),
            TokenizerState::AttrValueDoubleQuoted => self.step_attr_value_double_quoted(),
            TokenizerState::AttrValueSingleQuoted => self.step_attr_value_single_quoted(),
            TokenizerState::AttrValueUnquoted => self.step_attr_value_unquoted(),
            TokenizerState::SelfClosingStartTag => self.step_self_closing_start_tag(),
            TokenizerState::MarkupDeclarationOpen => self.step_markup_declaration_open(),
            TokenizerState::Comment => self.step_comment(),
            TokenizerState::BogusComment => self.step_bogus_comment(),
        }
        Ok(Step::Progress)
    }

    /// Advance over a run of bytes that are neither `stop` nor a possible
    /// sentinel start. Returns whether the cursor now sits on `stop`.
    fn skip_until(&mut self, stop: u8) -> bool {
        let rest = &self.input.as_bytes()[self.cursor..];
        match memchr::memchr2(stop, sentinel::LEAD_BYTE, rest) {
            Some(0) if rest[0] == stop => true,
            Some(0) => {
                // Private-use char that is not a sentinel.
                let _ = self.consume();
                false
            }
            Some(n) => {
                self.cursor += n;
                false
            }
            None => {
                self.cursor = self.input.len();
                false
            }
        }
    }

    fn step_data(&mut self) {
        self.begin_text();
        if self.skip_until(b'<') {
            self.lex.opener = self.cursor;
            self.lex.opener_out = self.out_pos(self.cursor);
            self.cursor += 1;
            self.transition_to(TokenizerState::TagOpen);
        }
    }

    fn step_text_element(&mut self) {
        let Some(element) = self.lex.element else {
            self.transition_to(TokenizerState::Data);
            return;
        };
        self.begin_text();
        if !self.skip_until(b'<') {
            return;
        }
        match self.matching_end_tag(element.tag_name()) {
            Some(len) => {
                self.flush_pending_text();
                let start = self.cursor;
                self.cursor += len;
                let span = self.out_span(start, self.cursor);
                self.emit_token(Token::EndTag {
                    span,
                    name: element.tag_name().to_string(),
                });
                self.lex.element = None;
                self.transition_to(TokenizerState::Data);
            }
            None => self.cursor += 1,
        }
    }

    /// Flush text preceding a confirmed `<` construct.
    fn commit_opener(&mut self) {
        self.flush_pending_text_to(self.lex.opener_out);
    }

    fn step_tag_open(&mut self) {
        match self.peek() {
            Some('!') => {
                self.commit_opener();
                self.cursor += 1;
                self.transition_to(TokenizerState::MarkupDeclarationOpen);
            }
            Some('/') => {
                self.commit_opener();
                self.cursor += 1;
                self.transition_to(TokenizerState::EndTagOpen);
            }
            Some(ch) if ch.is_ascii_alphabetic() => {
                self.commit_opener();
                self.begin_tag();
                self.transition_to(TokenizerState::TagName);
            }
            _ => self.revert_opener_to_text(),
        }
    }

    /// `<` that does not open anything is literal text.
    fn revert_opener_to_text(&mut self) {
        if self.pending_text_start.is_none() {
            self.pending_text_start = Some(self.lex.opener_out);
        }
        self.transition_to(TokenizerState::Data);
    }

    fn begin_tag(&mut self) {
        self.lex.tag_name.clear();
        self.lex.name_done = false;
        self.lex.element = None;
        self.lex.opener_end = self.cursor;
    }

    fn step_end_tag_open(&mut self) {
        match self.peek() {
            Some(ch) if ch.is_ascii_alphabetic() => {
                self.begin_tag();
                self.transition_to(TokenizerState::EndTagName);
            }
            _ => {
                self.lex.opener_end = self.cursor;
                self.transition_to(TokenizerState::BogusComment);
            }
        }
    }

    fn push_tag_name_char(&mut self, ch: char) {
        self.lex.tag_name.push(ch.to_ascii_lowercase());
        self.cursor += ch.len_utf8();
        self.lex.opener_end = self.cursor;
    }

    fn step_tag_name(&mut self) {
        let Some(ch) = self.peek() else {
            return;
        };
        match ch {
            '>' => {
                self.emit_tag_open();
                self.close_start_tag();
            }
            '/' => {
                self.emit_tag_open();
                self.begin_self_closing();
            }
            ch if ch.is_ascii_whitespace() => {
                self.emit_tag_open();
                self.cursor += 1;
                self.transition_to(TokenizerState::BeforeAttrName);
            }
            ch => self.push_tag_name_char(ch),
        }
    }

    fn step_end_tag_name(&mut self) {
        let Some(ch) = self.peek() else {
            return;
        };
        match ch {
            '>' => {
                self.cursor += 1;
                let span = Span::new(self.lex.opener_out, self.out_pos(self.cursor));
                let name = self.lex.tag_name.clone();
                self.emit_token(Token::EndTag { span, name });
                self.transition_to(TokenizerState::Data);
            }
            ch if !self.lex.name_done && !is_tag_name_stop(ch) => self.push_tag_name_char(ch),
            _ => {
                self.lex.name_done = true;
                let _ = self.consume();
            }
        }
    }

    fn emit_tag_open(&mut self) {
        let span = Span::new(self.lex.opener_out, self.out_pos(self.cursor));
        let name = self.lex.tag_name.clone();
        self.lex.element = TextElement::for_tag(&name);
        self.emit_token(Token::TagOpen { span, name });
    }

    /// Consume the `>` of a start tag.
    fn close_start_tag(&mut self) {
        let start = self.cursor;
        self.cursor += 1;
        let span = self.out_span(start, self.cursor);
        self.emit_token(Token::TagClose { span });
        match self.lex.element {
            Some(element) => self.transition_to(element.state()),
            None => self.transition_to(TokenizerState::Data),
        }
    }

    /// Consume a `/` inside a start tag.
    fn begin_self_closing(&mut self) {
        self.lex.slash_out = self.out_pos(self.cursor);
        self.cursor += 1;
        self.transition_to(TokenizerState::SelfClosingStartTag);
    }

    fn step_self_closing_start_tag(&mut self) {
        if self.peek() == Some('>') {
            self.cursor += 1;
            let span = Span::new(self.lex.slash_out, self.out_pos(self.cursor));
            self.emit_token(Token::SelfClose { span });
            self.lex.element = None;
            self.transition_to(TokenizerState::Data);
        } else {
            // A stray slash; reprocess as an attribute boundary.
            self.transition_to(TokenizerState::BeforeAttrName);
        }
    }

    fn begin_attr_name(&mut self) {
        self.lex.attr_name.clear();
        self.lex.attr_name_start = self.out_pos(self.cursor);
    }

    fn emit_attr_name(&mut self) {
        let span = Span::new(self.lex.attr_name_start, self.out_pos(self.cursor));
        let name = self.lex.attr_name.clone();
        self.emit_token(Token::AttrName { span, name });
    }

    fn step_before_attr_name(&mut self) {
        let Some(ch) = self.peek() else {
            return;
        };
        match ch {
            ch if ch.is_ascii_whitespace() => self.cursor += 1,
            '/' => self.begin_self_closing(),
            '>' => self.close_start_tag(),
            '=' => {
                // A leading `=` belongs to the attribute name.
                self.begin_attr_name();
                self.lex.attr_name.push('=');
                self.cursor += 1;
                self.transition_to(TokenizerState::AttrName);
            }
            _ => {
                self.begin_attr_name();
                self.transition_to(TokenizerState::AttrName);
            }
        }
    }

    fn step_attr_name(&mut self) {
        let Some(ch) = self.peek() else {
            return;
        };
        match ch {
            '=' => {
                self.emit_attr_name();
                self.cursor += 1;
                self.transition_to(TokenizerState::BeforeAttrValue);
            }
            '/' => {
                self.emit_attr_name();
                self.begin_self_closing();
            }
            '>' => {
                self.emit_attr_name();
                self.close_start_tag();
            }
            ch if ch.is_ascii_whitespace() => {
                self.emit_attr_name();
                self.cursor += 1;
                self.transition_to(TokenizerState::AfterAttrName);
            }
            ch => {
                self.lex.attr_name.push(ch.to_ascii_lowercase());
                self.cursor += ch.len_utf8();
            }
        }
    }

    fn step_after_attr_name(&mut self) {
        let Some(ch) = self.peek() else {
            return;
        };
        match ch {
            ch if ch.is_ascii_whitespace() => self.cursor += 1,
            '=' => {
                self.cursor += 1;
                self.transition_to(TokenizerState::BeforeAttrValue);
            }
            '/' => self.begin_self_closing(),
            '>' => self.close_start_tag(),
            _ => {
                self.begin_attr_name();
                self.transition_to(TokenizerState::AttrName);
            }
        }
    }

    fn step_before_attr_value(&mut self) {
        let Some(ch) = self.peek() else {
            return;
        };
        match ch {
            ch if ch.is_ascii_whitespace() => self.cursor += 1,
            '"' => {
                self.cursor += 1;
                self.lex.value_start = self.out_pos(self.cursor);
                self.transition_to(TokenizerState::AttrValueDoubleQuoted);
            }
            '\'' => {
                self.rewrite(self.cursor, 1, "\"");
                self.cursor += 1;
                self.lex.value_start = self.output.len();
                self.transition_to(TokenizerState::AttrValueSingleQuoted);
            }
            '>' => self.emit_missing_value(),
            '/' if self.peek_byte_at(1) == Some(b'>') => self.emit_missing_value(),
            _ => self.open_unquoted_value(),
        }
    }

    /// `name=` with no value becomes `name=""`.
    fn emit_missing_value(&mut self) {
        self.rewrite(self.cursor, 0, "\"\"");
        let span = Span::empty(self.output.len() - 1);
        self.emit_token(Token::AttrValue {
            span,
            value: String::new(),
            quote: Quote::Missing,
        });
        self.transition_to(TokenizerState::BeforeAttrName);
    }

    fn open_unquoted_value(&mut self) {
        self.rewrite(self.cursor, 0, "\"");
        self.lex.value_start = self.output.len();
        self.transition_to(TokenizerState::AttrValueUnquoted);
    }

    /// Emit the current value, which ends at the cursor.
    fn emit_attr_value(&mut self) {
        let quote = self.lex.state.quote().unwrap_or(Quote::Double);
        self.flush_to(self.cursor);
        let start = self.lex.value_start.min(self.output.len());
        let span = Span::new(start, self.output.len());
        let value = self.output[start..].to_string();
        self.emit_token(Token::AttrValue { span, value, quote });
    }

    fn close_unquoted_value(&mut self) {
        self.emit_attr_value();
        self.rewrite(self.cursor, 0, "\"");
        self.transition_to(TokenizerState::BeforeAttrName);
    }

    /// Rewrite `"` and bare `&` inside a value that is being re-quoted.
    /// Returns whether the byte at the cursor was handled.
    fn escape_requoted_byte(&mut self) -> bool {
        match self.input.as_bytes()[self.cursor] {
            b'"' => self.rewrite(self.cursor, 1, "&#34;"),
            b'&' if !starts_char_ref(self.input.as_bytes(), self.cursor) => {
                self.rewrite(self.cursor, 1, "&amp;")
            }
            _ => return false,
        }
        self.cursor += 1;
        true
    }

    fn step_attr_value_double_quoted(&mut self) {
        if self.skip_until(b'"') {
            self.emit_attr_value();
            self.cursor += 1;
            self.transition_to(TokenizerState::BeforeAttrName);
        }
    }

    fn step_attr_value_single_quoted(&mut self) {
        if self.peek() == Some('\'') {
            self.emit_attr_value();
            self.rewrite(self.cursor, 1, "\"");
            self.cursor += 1;
            self.transition_to(TokenizerState::BeforeAttrName);
            return;
        }
        if !self.escape_requoted_byte() {
            let _ = self.consume();
        }
    }

    fn step_attr_value_unquoted(&mut self) {
        let Some(ch) = self.peek() else {
            return;
        };
        match ch {
            '>' => self.close_unquoted_value(),
            '/' if self.peek_byte_at(1) == Some(b'>') => self.close_unquoted_value(),
            ch if ch.is_ascii_whitespace() => self.close_unquoted_value(),
            _ => {
                if !self.escape_requoted_byte() {
                    let _ = self.consume();
                }
            }
        }
    }

    fn step_markup_declaration_open(&mut self) {
        if self.lookahead("--") {
            self.cursor += 2;
            self.lex.opener_end = self.cursor;
            self.transition_to(TokenizerState::Comment);
        } else {
            self.lex.opener_end = self.cursor;
            self.transition_to(TokenizerState::BogusComment);
        }
    }

    fn step_comment(&mut self) {
        if self.cursor == self.lex.opener_end {
            // `<!-->` and `<!--->` close immediately.
            for close in [">", "->"] {
                if self.lookahead(close) {
                    self.finish_comment(self.cursor, close.len());
                    return;
                }
            }
        }
        if self.skip_until(b'-') {
            if self.lookahead("-->") {
                self.finish_comment(self.cursor, 3);
            } else {
                self.cursor += 1;
            }
        }
    }

    fn step_bogus_comment(&mut self) {
        if self.skip_until(b'>') {
            self.finish_comment(self.cursor, 1);
        }
    }

    fn finish_comment(&mut self, content_end: usize, close_len: usize) {
        let text = self.input[self.lex.opener_end..content_end].to_string();
        self.cursor = content_end + close_len;
        let span = Span::new(self.lex.opener_out, self.out_pos(self.cursor));
        self.emit_token(Token::Comment { span, text });
        self.transition_to(TokenizerState::Data);
    }

    fn step_sentinel(&mut self, id: ActionId) {
        let kind = self.actions[id.index()].kind;
        if let ActionKind::Control(_) = kind {
            // Branch boundaries never split a re-quoted value.
            match self.lex.state {
                TokenizerState::AttrValueUnquoted => self.close_unquoted_value(),
                TokenizerState::BeforeAttrValue => self.emit_missing_value(),
                _ => {}
            }
        }
        match self.lex.state {
            TokenizerState::Data | TokenizerState::RawText | TokenizerState::Rcdata => {
                self.flush_pending_text();
            }
            TokenizerState::TagOpen | TokenizerState::EndTagOpen => self.commit_opener(),
            _ => {}
        }

        let partial = self.lex.partial_name();
        let mut site = self.lex.site();
        if kind.is_content() {
            self.enter_content_state();
            if site == Site::BeforeAttrValue {
                site = self.lex.site();
            }
        }

        let start = self.cursor;
        let end = start + sentinel::LEN;
        let span = self.out_span(start, end);
        self.emit_token(Token::Sentinel {
            action: id,
            span,
            site,
            partial,
        });
        self.cursor = end;

        if kind.is_content() {
            let text = &self.input[start..end];
            match self.lex.state {
                TokenizerState::TagName | TokenizerState::EndTagName if !self.lex.name_done => {
                    self.lex.tag_name.push_str(text);
                    self.lex.opener_end = end;
                }
                TokenizerState::AttrName => self.lex.attr_name.push_str(text),
                _ => {}
            }
        }
        if let ActionKind::Control(control) = kind {
            self.branch(control);
        }
    }

    /// A content sentinel lexes like the first character of whatever the
    /// current state expects next.
    fn enter_content_state(&mut self) {
        match self.lex.state {
            TokenizerState::TagOpen => {
                self.begin_tag();
                self.transition_to(TokenizerState::TagName);
            }
            TokenizerState::EndTagOpen => {
                self.begin_tag();
                self.transition_to(TokenizerState::EndTagName);
            }
            TokenizerState::BeforeAttrName
            | TokenizerState::AfterAttrName
            | TokenizerState::SelfClosingStartTag => {
                self.begin_attr_name();
                self.transition_to(TokenizerState::AttrName);
            }
            TokenizerState::BeforeAttrValue => self.open_unquoted_value(),
            _ => {}
        }
    }

    fn branch(&mut self, control: Control) {
        match control {
            Control::If | Control::With | Control::Range => {
                self.branches.push(BranchFrame {
                    control,
                    saved: self.lex.clone(),
                });
            }
            Control::Define | Control::Block => {
                let saved = std::mem::replace(&mut self.lex, Lexical::data());
                self.branches.push(BranchFrame { control, saved });
            }
            Control::Else | Control::ElseIf | Control::ElseWith => {
                if let Some(frame) = self.branches.last() {
                    self.lex = frame.saved.clone();
                }
            }
            Control::End => {
                if let Some(frame) = self.branches.pop()
                    && matches!(frame.control, Control::Define | Control::Block)
                {
                    self.lex = frame.saved;
                }
            }
            Control::Break | Control::Continue => {}
        }
        #[cfg(any(test, feature = "debug-stats"))]
        log::trace!(
            target: "autoescape.tokenizer",
            "branch {control:?}: state {:?}, depth {}",
            self.lex.state,
            self.branches.len()
        );
    }

    fn finish_at_eof(&mut self) -> Result<(), EscapeError> {
        let construct = match self.lex.state {
            TokenizerState::Data => None,
            TokenizerState::TagOpen | TokenizerState::EndTagOpen => {
                self.revert_opener_to_text();
                None
            }
            TokenizerState::RawText | TokenizerState::Rcdata => Some(Construct::RawText),
            TokenizerState::MarkupDeclarationOpen
            | TokenizerState::Comment
            | TokenizerState::BogusComment => Some(Construct::Comment),
            _ => Some(Construct::Tag),
        };
        self.flush_pending_text();
        match construct {
            None => Ok(()),
            Some(construct) => {
                let end = self.lex.opener_end.max(self.lex.opener + 1);
                let span = self
                    .source_map
                    .span_to_original(Span::new(self.lex.opener, end));
                log::debug!(
                    target: "autoescape.tokenizer",
                    "unterminated {construct} in state {:?}",
                    self.lex.state
                );
                Err(EscapeError::UnterminatedToken { span, construct })
            }
        }
    }
}

fn is_tag_name_stop(ch: char) -> bool {
    ch.is_ascii_whitespace() || ch == '/' || ch == '>'
}

#[cfg(test)]
mod tests;
