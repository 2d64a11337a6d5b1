//! Escaper selection and reassembly.
//!
//! Every value-emitting action gets the chain for its context appended as
//! pipeline stages; every other action goes back verbatim. The rewritten markup
//! from the tokenizer is kept as is apart from the sentinels.

use crate::action::{ActionId, ActionKind, Extraction, sentinel};
use crate::config::EscapeConfig;
use crate::context::{Classification, Context};
use crate::error::EscapeError;
use crate::escaper::{Escaper, chain_for};
use crate::span::Span;
use crate::tokenizer::Tokenized;
use memchr::memchr;
use std::fmt;

/// What happened to one action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EscapedAction {
    pub id: ActionId,
    pub kind: ActionKind,
    /// Source span of the action.
    pub span: Span,
    pub context: Context,
    /// Empty for actions that are re-emitted verbatim.
    pub chain: &'static [Escaper],
}

impl fmt::Display for EscapedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {:?} [", self.id.0, self.span, self.kind)?;
        for (idx, escaper) in self.chain.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{escaper}")?;
        }
        write!(f, "] in {}", self.context)
    }
}

/// Final template text plus a per-action report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Escaped {
    pub text: String,
    pub actions: Vec<EscapedAction>,
}

impl Escaped {
    pub fn escaped_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|action| !action.chain.is_empty())
            .count()
    }
}

pub fn reassemble(
    extraction: &Extraction,
    tokenized: &Tokenized,
    classification: &Classification,
    config: &EscapeConfig,
) -> Result<Escaped, EscapeError> {
    let mut actions = Vec::with_capacity(extraction.actions.len());
    let mut rendered = Vec::with_capacity(extraction.actions.len());
    for action in &extraction.actions {
        let Some(context) = classification.context(action.id) else {
            return Err(EscapeError::UnescapableContext {
                span: action.span,
                context: Context::Text,
            });
        };
        let unescapable = EscapeError::UnescapableContext {
            span: action.span,
            context,
        };
        let chain: &'static [Escaper] = match action.kind {
            ActionKind::Output => chain_for(context, config.comment_policy).ok_or(unescapable)?,
            ActionKind::Template if context != Context::Text => return Err(unescapable),
            ActionKind::Template | ActionKind::Silent | ActionKind::Control(_) => &[],
        };
        log::trace!(
            target: "autoescape.reassemble",
            "action {} in {context}: {} stage(s)",
            action.id.0,
            chain.len()
        );

        let mut text = action.raw.clone();
        if !chain.is_empty() {
            let mut stages = String::new();
            for escaper in chain {
                stages.push_str(" | ");
                stages.push_str(config.escaper_names.name(*escaper));
            }
            text.insert_str(action.body_end_in_raw(), &stages);
        }
        rendered.push(text);
        actions.push(EscapedAction {
            id: action.id,
            kind: action.kind,
            span: action.span,
            context,
            chain,
        });
    }

    let text = substitute(&tokenized.output, &rendered);
    log::debug!(
        target: "autoescape.reassemble",
        "reassembled {} actions into {} bytes",
        actions.len(),
        text.len()
    );
    Ok(Escaped { text, actions })
}

/// Replace every sentinel in `output` with the rendered action it stands for.
fn substitute(output: &str, rendered: &[String]) -> String {
    let bytes = output.as_bytes();
    let extra: usize = rendered.iter().map(String::len).sum();
    let mut text = String::with_capacity(output.len() + extra);
    let mut copied = 0;
    let mut cursor = 0;
    while let Some(found) = memchr(sentinel::LEAD_BYTE, &bytes[cursor..]) {
        let at = cursor + found;
        match sentinel::decode_at(output, at).and_then(|id| rendered.get(id.index())) {
            Some(action) => {
                text.push_str(&output[copied..at]);
                text.push_str(action);
                copied = at + sentinel::LEN;
                cursor = copied;
            }
            None => cursor = at + 1,
        }
    }
    text.push_str(&output[copied..]);
    text
}
