//! Contextual auto-escaping for HTML templates.
//!
//! `{{ ... }}` actions embedded in markup are located, the markup around them is
//! tokenized with attribute quoting normalized, every action is assigned the
//! HTML context it renders into, and value-emitting actions get the escaper
//! chain for that context appended as pipeline stages.

pub mod action;
pub mod config;
pub mod context;
pub mod error;
pub mod escaper;
pub mod pipeline;
pub mod position;
pub mod reassemble;
pub mod span;
pub mod token;
pub mod tokenizer;

mod entities;

pub use crate::action::{Action, ActionId, ActionKind, Control, Extraction, extract};
pub use crate::config::{CommentPolicy, ConfigError, Delimiters, EscapeConfig, EscaperNames};
pub use crate::context::{Classification, Context, classify};
pub use crate::error::{Construct, ErrorKind, EscapeError, MalformedReason, Stage};
pub use crate::escaper::{Escaper, chain_for};
pub use crate::pipeline::{Autoescaper, Stages, escape_template};
pub use crate::position::{ChainedMap, PositionMap, Shift};
pub use crate::reassemble::{Escaped, EscapedAction, reassemble};
pub use crate::span::{LineCol, Span};
pub use crate::token::{Quote, RawKind, Site, Token};
pub use crate::tokenizer::{TokenFmt, TokenFmtError, Tokenized, TokenizerStats, tokenize};
