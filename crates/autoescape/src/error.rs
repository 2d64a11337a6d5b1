//! Pipeline errors.
//!
//! Every error is fatal to the run that produced it and carries a span into the
//! original template source.

use crate::context::Context;
use crate::span::{LineCol, Span};
use std::fmt;
use thiserror::Error;

/// Stage of the pipeline that produced an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Extraction,
    Tokenization,
    Classification,
    Reassembly,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extraction => "extraction",
            Stage::Tokenization => "tokenization",
            Stage::Classification => "classification",
            Stage::Reassembly => "reassembly",
        })
    }
}

/// Fieldless error kind, convenient for matching in callers and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedAction,
    ReservedCharacter,
    UnterminatedToken,
    ContextConflict,
    StructuralContextError,
    UnescapableContext,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MalformedReason {
    Unterminated,
    Nested,
    Empty,
    UnclosedComment,
    UnexpectedElse,
    UnexpectedEnd,
    LoopControlOutsideRange,
    ElseAfterElse,
    Unclosed,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MalformedReason::Unterminated => "missing closing delimiter",
            MalformedReason::Nested => "opening delimiter inside an action",
            MalformedReason::Empty => "empty action",
            MalformedReason::UnclosedComment => "unclosed comment",
            MalformedReason::UnexpectedElse => "else outside of if, with or range",
            MalformedReason::UnexpectedEnd => "end without an open construct",
            MalformedReason::LoopControlOutsideRange => "break or continue outside of range",
            MalformedReason::ElseAfterElse => "branch after a final else",
            MalformedReason::Unclosed => "construct is never closed",
        })
    }
}

/// What an unterminated construct was.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Construct {
    Tag,
    Comment,
    RawText,
}

impl fmt::Display for Construct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Construct::Tag => "tag",
            Construct::Comment => "comment",
            Construct::RawText => "raw text element",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EscapeError {
    #[error("malformed action at {span}: {reason}")]
    MalformedAction { span: Span, reason: MalformedReason },

    #[error("reserved character {ch:?} at {span}")]
    ReservedCharacter { span: Span, ch: char },

    #[error("unterminated {construct} at {span}")]
    UnterminatedToken { span: Span, construct: Construct },

    #[error("action at {span} ends up in conflicting contexts: {first} vs {second}")]
    ContextConflict {
        span: Span,
        first: Context,
        second: Context,
    },

    #[error("action at {span} controls markup structure ({context})")]
    StructuralContextError { span: Span, context: Context },

    #[error("no safe escaper for action at {span} in context {context}")]
    UnescapableContext { span: Span, context: Context },
}

impl EscapeError {
    /// Span of the offending construct in the original template source.
    pub fn span(&self) -> Span {
        match self {
            EscapeError::MalformedAction { span, .. }
            | EscapeError::ReservedCharacter { span, .. }
            | EscapeError::UnterminatedToken { span, .. }
            | EscapeError::ContextConflict { span, .. }
            | EscapeError::StructuralContextError { span, .. }
            | EscapeError::UnescapableContext { span, .. } => *span,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EscapeError::MalformedAction { .. } => ErrorKind::MalformedAction,
            EscapeError::ReservedCharacter { .. } => ErrorKind::ReservedCharacter,
            EscapeError::UnterminatedToken { .. } => ErrorKind::UnterminatedToken,
            EscapeError::ContextConflict { .. } => ErrorKind::ContextConflict,
            EscapeError::StructuralContextError { .. } => ErrorKind::StructuralContextError,
            EscapeError::UnescapableContext { .. } => ErrorKind::UnescapableContext,
        }
    }

    pub fn stage(&self) -> Stage {
        match self.kind() {
            ErrorKind::MalformedAction | ErrorKind::ReservedCharacter => Stage::Extraction,
            ErrorKind::UnterminatedToken => Stage::Tokenization,
            ErrorKind::ContextConflict | ErrorKind::StructuralContextError => {
                Stage::Classification
            }
            ErrorKind::UnescapableContext => Stage::Reassembly,
        }
    }

    /// Human-readable diagnostic: stage, location, message and the offending
    /// source snippet.
    pub fn diagnostic(&self, source: &str) -> String {
        let span = self.span();
        let at = LineCol::of(source, span.start);
        let snippet = span.slice(source).unwrap_or("");
        let snippet: String = snippet.chars().take(60).collect();
        format!("{} error at {at}: {self}\n  | {snippet}", self.stage())
    }
}
