//! Action extraction.
//!
//! Finds every `{{ ... }}` action in a template, replaces each one with a
//! fixed-length sentinel and records where it came from. The resulting markup is
//! plain HTML as far as the tokenizer is concerned.
//!
//! Invariants:
//! - Every action gets exactly one sentinel, in source order, and ids are dense
//!   (`ActionId(n)` is `actions[n]`).
//! - Control constructs are well nested when extraction succeeds.
//! - `Extraction::map` translates markup offsets back to source offsets.

use crate::config::Delimiters;
use crate::error::{EscapeError, MalformedReason};
use crate::position::PositionMap;
use crate::span::Span;
use memchr::memmem;

pub mod sentinel;

/// Dense action identifier; doubles as the index into `Extraction::actions`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(pub u32);

impl ActionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Control keywords of the template language.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    If,
    ElseIf,
    ElseWith,
    Else,
    Range,
    With,
    Define,
    Block,
    Break,
    Continue,
    End,
}

impl Control {
    pub fn opens_construct(self) -> bool {
        matches!(
            self,
            Control::If | Control::Range | Control::With | Control::Define | Control::Block
        )
    }

    pub fn is_else(self) -> bool {
        matches!(self, Control::Else | Control::ElseIf | Control::ElseWith)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    /// Emits a value at render time; needs an escaper chain.
    Output,
    /// Emits nothing (comments, variable declarations and assignments).
    Silent,
    /// `{{template ...}}` call; emits markup produced by another template.
    Template,
    Control(Control),
}

impl ActionKind {
    /// Whether the action produces content where it stands, so that the
    /// tokenizer must treat its sentinel like markup characters.
    pub fn is_content(self) -> bool {
        matches!(self, ActionKind::Output | ActionKind::Template)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Action {
    pub id: ActionId,
    pub kind: ActionKind,
    /// Source span including delimiters and trim markers.
    pub span: Span,
    /// Source span of the trimmed body, excluding trim markers.
    pub body: Span,
    /// Verbatim source text of `span`.
    pub raw: String,
}

impl Action {
    pub fn body_text(&self) -> &str {
        &self.raw[self.body.start - self.span.start..self.body.end - self.span.start]
    }

    /// Offset into `raw` right after the body, where pipeline stages can be
    /// appended without disturbing trim markers or the closing delimiter.
    pub fn body_end_in_raw(&self) -> usize {
        self.body.end - self.span.start
    }
}

#[derive(Clone, Debug)]
pub struct Extraction {
    /// Template text with every action replaced by its sentinel.
    pub markup: String,
    pub actions: Vec<Action>,
    /// Markup offsets -> source offsets.
    pub map: PositionMap,
}

impl Extraction {
    pub fn action(&self, id: ActionId) -> Option<&Action> {
        self.actions.get(id.index())
    }
}

/// Split `source` into sentinel-bearing markup and the action table.
pub fn extract(source: &str, delimiters: &Delimiters) -> Result<Extraction, EscapeError> {
    if let Some((at, ch)) = source.char_indices().find(|(_, ch)| sentinel::is_reserved(*ch)) {
        return Err(EscapeError::ReservedCharacter {
            span: Span::new(at, at + ch.len_utf8()),
            ch,
        });
    }

    let bytes = source.as_bytes();
    let open = memmem::Finder::new(delimiters.open.as_bytes());
    let mut markup = String::with_capacity(source.len());
    let mut actions = Vec::new();
    let mut map = PositionMap::new();
    let mut nesting = Nesting::default();
    let mut cursor = 0usize;

    while let Some(rel) = open.find(&bytes[cursor..]) {
        let open_at = cursor + rel;
        markup.push_str(&source[cursor..open_at]);

        let body_start = open_at + delimiters.open.len();
        let close_at = find_close(source, open_at, body_start, delimiters)?;
        let span = Span::new(open_at, close_at + delimiters.close.len());
        let body = trimmed_body(bytes, body_start, close_at);
        if body.is_empty() {
            return Err(malformed(span, MalformedReason::Empty));
        }
        let kind = classify_body(&source[body.start..body.end])
            .map_err(|reason| malformed(span, reason))?;
        nesting.visit(kind, span)?;

        let id = ActionId(actions.len() as u32);
        log::trace!(target: "autoescape.extract", "action {id:?} {kind:?} at {span}");
        map.record(markup.len(), span.start, span.len(), sentinel::LEN);
        sentinel::push(&mut markup, id);
        actions.push(Action {
            id,
            kind,
            span,
            body,
            raw: source[span.start..span.end].to_string(),
        });
        cursor = span.end;
    }
    markup.push_str(&source[cursor..]);
    nesting.finish()?;

    log::debug!(
        target: "autoescape.extract",
        "extracted {} actions from {} bytes",
        actions.len(),
        source.len()
    );
    Ok(Extraction {
        markup,
        actions,
        map,
    })
}

fn malformed(span: Span, reason: MalformedReason) -> EscapeError {
    EscapeError::MalformedAction { span, reason }
}

/// Find the closing delimiter of the action opened at `open_at`, skipping string
/// literals and comments.
fn find_close(
    source: &str,
    open_at: usize,
    from: usize,
    delimiters: &Delimiters,
) -> Result<usize, EscapeError> {
    let bytes = source.as_bytes();
    let open = delimiters.open.as_bytes();
    let close = delimiters.close.as_bytes();
    let unterminated = || malformed(Span::new(open_at, source.len()), MalformedReason::Unterminated);
    let mut i = from;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'"' | b'\'') => {
                i = skip_interpreted(bytes, i, quote).ok_or_else(unterminated)?;
                continue;
            }
            b'`' => {
                let rel = memchr::memchr(b'`', &bytes[i + 1..]).ok_or_else(unterminated)?;
                i += rel + 2;
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let rel = memmem::find(&bytes[i + 2..], b"*/").ok_or_else(|| {
                    malformed(
                        Span::new(open_at, source.len()),
                        MalformedReason::UnclosedComment,
                    )
                })?;
                i += rel + 4;
                continue;
            }
            _ => {}
        }
        if bytes[i..].starts_with(close) {
            return Ok(i);
        }
        if bytes[i..].starts_with(open) {
            return Err(malformed(
                Span::new(open_at, i + open.len()),
                MalformedReason::Nested,
            ));
        }
        i += 1;
    }
    Err(unterminated())
}

/// Skip a `"..."` string or `'...'` char literal starting at `start`; returns
/// the offset after the closing quote. Newlines terminate the scan.
fn skip_interpreted(bytes: &[u8], start: usize, quote: u8) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return None,
            b if b == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Body span with trim markers (`{{- ` and ` -}}`) and surrounding whitespace
/// removed.
fn trimmed_body(bytes: &[u8], body_start: usize, close_at: usize) -> Span {
    let mut start = body_start;
    let mut end = close_at;
    if end > start + 1 && bytes[start] == b'-' && bytes[start + 1].is_ascii_whitespace() {
        start += 1;
    }
    if end >= start + 2 && bytes[end - 1] == b'-' && bytes[end - 2].is_ascii_whitespace() {
        end -= 1;
    }
    while start < end && bytes[start].is_ascii_whitespace() {
        start += 1;
    }
    while end > start && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    Span::new(start, end)
}

fn first_word(text: &str) -> (&str, &str) {
    match text.find(|ch: char| ch.is_ascii_whitespace()) {
        Some(idx) => (&text[..idx], text[idx..].trim_start()),
        None => (text, ""),
    }
}

fn classify_body(body: &str) -> Result<ActionKind, MalformedReason> {
    if body.starts_with("/*") {
        return if body.len() >= 4 && body.ends_with("*/") {
            Ok(ActionKind::Silent)
        } else {
            Err(MalformedReason::UnclosedComment)
        };
    }
    let (word, rest) = first_word(body);
    let control = match word {
        "if" => Control::If,
        "range" => Control::Range,
        "with" => Control::With,
        "define" => Control::Define,
        "block" => Control::Block,
        "break" => Control::Break,
        "continue" => Control::Continue,
        "end" => Control::End,
        "else" => match first_word(rest).0 {
            "if" => Control::ElseIf,
            "with" => Control::ElseWith,
            _ => Control::Else,
        },
        "template" => return Ok(ActionKind::Template),
        _ if is_declaration(body) => return Ok(ActionKind::Silent),
        _ => return Ok(ActionKind::Output),
    };
    Ok(ActionKind::Control(control))
}

/// `$x := ...` and `$x = ...` produce no output.
fn is_declaration(body: &str) -> bool {
    let Some(rest) = body.strip_prefix('$') else {
        return false;
    };
    let rest = rest
        .trim_start_matches(|ch: char| ch.is_alphanumeric() || ch == '_')
        .trim_start();
    rest.starts_with(":=") || (rest.starts_with('=') && !rest.starts_with("=="))
}

#[derive(Debug)]
struct Frame {
    control: Control,
    span: Span,
    saw_else: bool,
}

/// Control-construct nesting check.
#[derive(Debug, Default)]
struct Nesting {
    frames: Vec<Frame>,
}

impl Nesting {
    fn visit(&mut self, kind: ActionKind, span: Span) -> Result<(), EscapeError> {
        let ActionKind::Control(control) = kind else {
            return Ok(());
        };
        match control {
            Control::If | Control::Range | Control::With | Control::Define | Control::Block => {
                self.frames.push(Frame {
                    control,
                    span,
                    saw_else: false,
                });
            }
            Control::Else | Control::ElseIf | Control::ElseWith => {
                let Some(frame) = self.frames.last_mut() else {
                    return Err(malformed(span, MalformedReason::UnexpectedElse));
                };
                let allowed = match frame.control {
                    Control::If | Control::With => true,
                    Control::Range => control == Control::Else,
                    _ => false,
                };
                if !allowed {
                    return Err(malformed(span, MalformedReason::UnexpectedElse));
                }
                if frame.saw_else {
                    return Err(malformed(span, MalformedReason::ElseAfterElse));
                }
                frame.saw_else = control == Control::Else;
            }
            Control::Break | Control::Continue => {
                let in_range = self
                    .frames
                    .iter()
                    .rev()
                    .take_while(|frame| !matches!(frame.control, Control::Define | Control::Block))
                    .any(|frame| frame.control == Control::Range);
                if !in_range {
                    return Err(malformed(span, MalformedReason::LoopControlOutsideRange));
                }
            }
            Control::End => {
                if self.frames.pop().is_none() {
                    return Err(malformed(span, MalformedReason::UnexpectedEnd));
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<(), EscapeError> {
        match self.frames.last() {
            Some(frame) => Err(malformed(frame.span, MalformedReason::Unclosed)),
            None => Ok(()),
        }
    }
}
