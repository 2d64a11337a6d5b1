//! Context classification.
//!
//! A single pass over the token stream assigns every action the HTML context
//! its output would land in. Conditionals and loops are checked for
//! convergence: every way through a construct must leave the markup in the
//! same state, otherwise one escaper chain cannot be right for all of them.
//!
//! Invariants:
//! - Classification is a pure function of the token stream, the action table
//!   and the URL attribute list.
//! - Every action receives exactly one `Context`.
//! - Divergence is an error (`ContextConflict`), never a warning.

use crate::action::{Action, ActionId, ActionKind, Control, Extraction};
use crate::config::EscapeConfig;
use crate::error::EscapeError;
use crate::token::{RawKind, Site, Token};
use crate::tokenizer::Tokenized;
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Context {
    Text,
    RcdataText,
    TagName,
    BeforeAttrName,
    AttrName,
    BeforeAttrValue,
    /// Unquoted value; never produced once values are re-quoted.
    AttrValueUnquoted,
    AttrValueDoubleQuoted,
    UrlAttrValue,
    /// Event handler (`on*`) attribute value.
    JsAttrValue,
    /// `style` attribute value.
    StyleAttrValue,
    /// Inside an attribute whose name is itself dynamic.
    DynamicAttrName,
    Comment,
    ScriptText,
    StyleText,
}

impl Context {
    pub fn name(self) -> &'static str {
        match self {
            Context::Text => "text",
            Context::RcdataText => "rcdata-text",
            Context::TagName => "tag-name",
            Context::BeforeAttrName => "before-attr-name",
            Context::AttrName => "attr-name",
            Context::BeforeAttrValue => "before-attr-value",
            Context::AttrValueUnquoted => "attr-value-unquoted",
            Context::AttrValueDoubleQuoted => "attr-value-double-quoted",
            Context::UrlAttrValue => "url-attr-value",
            Context::JsAttrValue => "js-attr-value",
            Context::StyleAttrValue => "style-attr-value",
            Context::DynamicAttrName => "dynamic-attr-name",
            Context::Comment => "comment",
            Context::ScriptText => "script-text",
            Context::StyleText => "style-text",
        }
    }

    /// Contexts where a value would decide markup structure.
    pub fn is_structural(self) -> bool {
        matches!(self, Context::TagName | Context::AttrName)
    }

    fn is_in_tag(self) -> bool {
        matches!(
            self,
            Context::TagName
                | Context::BeforeAttrName
                | Context::AttrName
                | Context::BeforeAttrValue
                | Context::AttrValueUnquoted
                | Context::AttrValueDoubleQuoted
                | Context::UrlAttrValue
                | Context::JsAttrValue
                | Context::StyleAttrValue
                | Context::DynamicAttrName
        )
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an attribute's value means.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttrClass {
    Plain,
    Url,
    Script,
    Style,
    /// The attribute name contains an action.
    Dynamic,
}

impl AttrClass {
    pub fn of(name: &str, config: &EscapeConfig) -> Self {
        if name.contains(crate::action::sentinel::OPEN) {
            AttrClass::Dynamic
        } else if config.is_url_attribute(name) {
            AttrClass::Url
        } else if name.starts_with("on") {
            AttrClass::Script
        } else if name == "style" {
            AttrClass::Style
        } else {
            AttrClass::Plain
        }
    }

    fn value_context(self) -> Context {
        match self {
            AttrClass::Plain => Context::AttrValueDoubleQuoted,
            AttrClass::Url => Context::UrlAttrValue,
            AttrClass::Script => Context::JsAttrValue,
            AttrClass::Style => Context::StyleAttrValue,
            AttrClass::Dynamic => Context::DynamicAttrName,
        }
    }
}

/// Element kinds that change how the content after `>` is lexed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TagKind {
    Normal,
    Script,
    Style,
    Rcdata,
}

impl TagKind {
    fn of(name: &str) -> Self {
        match name {
            "script" => TagKind::Script,
            "style" => TagKind::Style,
            "textarea" | "title" => TagKind::Rcdata,
            _ => TagKind::Normal,
        }
    }

    fn content_context(self) -> Context {
        match self {
            TagKind::Normal => Context::Text,
            TagKind::Script => Context::ScriptText,
            TagKind::Style => Context::StyleText,
            TagKind::Rcdata => Context::RcdataText,
        }
    }
}

/// Classifier state. Two states are interchangeable iff they are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct State<'a> {
    context: Context,
    tag: TagKind,
    attr: AttrClass,
    /// Unfinished tag or attribute name at a control action splitting it.
    name: &'a str,
}

impl<'a> State<'a> {
    fn initial() -> Self {
        Self {
            context: Context::Text,
            tag: TagKind::Normal,
            attr: AttrClass::Plain,
            name: "",
        }
    }

    /// Drop details that cannot influence anything after this point.
    fn normalized(self) -> Self {
        let attr_matters = matches!(
            self.context,
            Context::AttrName
                | Context::BeforeAttrValue
                | Context::AttrValueDoubleQuoted
                | Context::UrlAttrValue
                | Context::JsAttrValue
                | Context::StyleAttrValue
                | Context::DynamicAttrName
        );
        Self {
            context: self.context,
            tag: if self.context.is_in_tag() {
                self.tag
            } else {
                TagKind::Normal
            },
            attr: if attr_matters {
                self.attr
            } else {
                AttrClass::Plain
            },
            name: if self.context.is_structural() {
                self.name
            } else {
                ""
            },
        }
    }
}

/// Result of classification: one context per action, indexed by `ActionId`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    contexts: Vec<Context>,
}

impl Classification {
    pub fn context(&self, id: ActionId) -> Option<Context> {
        self.contexts.get(id.index()).copied()
    }

    pub fn contexts(&self) -> &[Context] {
        &self.contexts
    }
}

#[derive(Debug)]
struct Frame<'a> {
    control: Control,
    /// State at the construct opener.
    start: State<'a>,
    /// End states of finished arms (`if`/`with`) or the loop body (`range`).
    arm_ends: Vec<State<'a>>,
    /// States at `break` actions of a `range`.
    breaks: Vec<State<'a>>,
    has_else: bool,
    arm: usize,
    /// Context of value-emitting actions by body text, with the arm they were in.
    outputs: HashMap<String, (usize, Context)>,
    /// State around a `define`/`block` body.
    outer: State<'a>,
}

impl<'a> Frame<'a> {
    fn new(control: Control, start: State<'a>, outer: State<'a>) -> Self {
        Self {
            control,
            start,
            arm_ends: Vec::new(),
            breaks: Vec::new(),
            has_else: false,
            arm: 0,
            outputs: HashMap::new(),
            outer,
        }
    }
}

/// Assign a context to every action.
pub fn classify(
    extraction: &Extraction,
    tokenized: &Tokenized,
    config: &EscapeConfig,
) -> Result<Classification, EscapeError> {
    let mut classifier = Classifier {
        actions: &extraction.actions,
        config,
        state: State::initial(),
        frames: Vec::new(),
        contexts: vec![None; extraction.actions.len()],
    };
    for token in &tokenized.tokens {
        classifier.step(token)?;
    }
    classifier.finish()
}

struct Classifier<'a> {
    actions: &'a [Action],
    config: &'a EscapeConfig,
    state: State<'a>,
    frames: Vec<Frame<'a>>,
    contexts: Vec<Option<Context>>,
}

impl<'a> Classifier<'a> {
    fn step(&mut self, token: &'a Token) -> Result<(), EscapeError> {
        match token {
            Token::TagOpen { name, .. } => {
                self.state = State {
                    context: Context::BeforeAttrName,
                    tag: TagKind::of(name),
                    ..State::initial()
                };
            }
            Token::AttrName { name, .. } => {
                self.state.context = Context::BeforeAttrValue;
                self.state.attr = AttrClass::of(name, self.config);
            }
            Token::AttrValue { .. } => {
                self.state.context = Context::BeforeAttrName;
                self.state.attr = AttrClass::Plain;
            }
            Token::TagClose { .. } => {
                self.state = State {
                    context: self.state.tag.content_context(),
                    ..State::initial()
                };
            }
            Token::SelfClose { .. } | Token::EndTag { .. } | Token::Comment { .. } => {
                self.state = State::initial();
            }
            Token::Text { .. } => {}
            Token::Sentinel {
                action,
                site,
                partial,
                ..
            } => self.sentinel(*action, *site, partial)?,
        }
        Ok(())
    }

    fn context_at(&self, site: Site, kind: ActionKind) -> Context {
        match site {
            Site::Data => Context::Text,
            Site::Rcdata => Context::RcdataText,
            Site::RawText(RawKind::Script) => Context::ScriptText,
            Site::RawText(RawKind::Style) => Context::StyleText,
            Site::TagName => Context::TagName,
            Site::BeforeAttrName if kind.is_content() => Context::DynamicAttrName,
            Site::BeforeAttrName => Context::BeforeAttrName,
            Site::AttrName => Context::AttrName,
            Site::BeforeAttrValue => Context::BeforeAttrValue,
            Site::AttrValue => self.state.attr.value_context(),
            Site::Comment => Context::Comment,
        }
    }

    fn sentinel(&mut self, id: ActionId, site: Site, partial: &'a str) -> Result<(), EscapeError> {
        let actions = self.actions;
        let Some(action) = actions.get(id.index()) else {
            return Ok(());
        };
        let context = self.context_at(site, action.kind);
        if let Some(slot) = self.contexts.get_mut(id.index()) {
            *slot = Some(context);
        }
        log::trace!(target: "autoescape.classify", "action {} at {site}: {context}", id.0);

        match action.kind {
            ActionKind::Output | ActionKind::Template => self.check_same_body(action, context),
            ActionKind::Silent => Ok(()),
            ActionKind::Control(control) => {
                // Site and unfinished name are the most precise account of
                // where the tokenizer is.
                self.state.context = context;
                self.state.name = partial;
                self.state = self.state.normalized();
                self.control(action, control)
            }
        }
    }

    /// The same expression must not be escaped differently in sibling arms.
    fn check_same_body(&mut self, action: &Action, context: Context) -> Result<(), EscapeError> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        if matches!(frame.control, Control::Define | Control::Block) {
            return Ok(());
        }
        let arm = frame.arm;
        match frame.outputs.get(action.body_text()) {
            Some(&(seen_arm, seen)) if seen_arm != arm && seen != context => {
                Err(conflict(action, seen, context))
            }
            Some(_) => Ok(()),
            None => {
                frame
                    .outputs
                    .insert(action.body_text().to_string(), (arm, context));
                Ok(())
            }
        }
    }

    fn control(&mut self, action: &Action, control: Control) -> Result<(), EscapeError> {
        let here = self.state;
        match control {
            Control::If | Control::With | Control::Range => {
                self.frames.push(Frame::new(control, here, here));
            }
            Control::Define | Control::Block => {
                if control == Control::Block && here.context != Context::Text {
                    return Err(conflict(action, Context::Text, here.context));
                }
                self.frames.push(Frame::new(control, State::initial(), here));
                self.state = State::initial();
            }
            Control::ElseIf | Control::ElseWith | Control::Else => {
                let Some(frame) = self.frames.last_mut() else {
                    return Ok(());
                };
                if frame.control == Control::Range && here != frame.start {
                    // Loop body must be re-enterable.
                    return Err(conflict(action, frame.start.context, here.context));
                }
                frame.arm_ends.push(here);
                frame.has_else |= control == Control::Else;
                frame.arm += 1;
                self.state = frame.start;
            }
            Control::Break => {
                if let Some(frame) = self.innermost_range() {
                    frame.breaks.push(here);
                }
            }
            Control::Continue => {
                if let Some(frame) = self.innermost_range()
                    && here != frame.start
                {
                    let expected = frame.start.context;
                    return Err(conflict(action, expected, here.context));
                }
            }
            Control::End => {
                let Some(frame) = self.frames.pop() else {
                    return Ok(());
                };
                self.state = self.close(action, frame, here)?;
            }
        }
        Ok(())
    }

    fn innermost_range(&mut self) -> Option<&mut Frame<'a>> {
        self.frames
            .iter_mut()
            .rev()
            .take_while(|frame| !matches!(frame.control, Control::Define | Control::Block))
            .find(|frame| frame.control == Control::Range)
    }

    /// Check convergence at `end` and return the state after the construct.
    fn close(
        &self,
        action: &Action,
        frame: Frame<'a>,
        here: State<'a>,
    ) -> Result<State<'a>, EscapeError> {
        let outcomes: Vec<State<'a>> = match frame.control {
            Control::Define | Control::Block => {
                if here != State::initial() {
                    return Err(conflict(action, Context::Text, here.context));
                }
                log::trace!(target: "autoescape.classify", "{:?} body converges", frame.control);
                return Ok(frame.outer);
            }
            Control::Range => {
                if !frame.has_else && here != frame.start {
                    return Err(conflict(action, frame.start.context, here.context));
                }
                let mut outcomes = frame.arm_ends.clone();
                outcomes.extend(frame.breaks.iter().copied());
                outcomes.push(here);
                if !frame.has_else {
                    outcomes.push(frame.start);
                }
                outcomes
            }
            _ => {
                let mut outcomes = frame.arm_ends.clone();
                outcomes.push(here);
                if !frame.has_else {
                    outcomes.push(frame.start);
                }
                outcomes
            }
        };
        let first = outcomes[0];
        if let Some(other) = outcomes.iter().find(|state| **state != first) {
            return Err(conflict(action, first.context, other.context));
        }
        log::trace!(
            target: "autoescape.classify",
            "{:?} converges in {}",
            frame.control,
            first.context
        );
        Ok(here)
    }

    fn finish(self) -> Result<Classification, EscapeError> {
        let mut contexts = Vec::with_capacity(self.contexts.len());
        for (action, context) in self.actions.iter().zip(&self.contexts) {
            let Some(context) = *context else {
                return Err(EscapeError::UnescapableContext {
                    span: action.span,
                    context: self.state.context,
                });
            };
            contexts.push(context);
        }
        if let Some((action, context)) = self
            .actions
            .iter()
            .zip(&contexts)
            .find(|(action, context)| action.kind.is_content() && context.is_structural())
        {
            return Err(EscapeError::StructuralContextError {
                span: action.span,
                context: *context,
            });
        }
        log::debug!(
            target: "autoescape.classify",
            "classified {} actions",
            contexts.len()
        );
        Ok(Classification { contexts })
    }
}

fn conflict(action: &Action, first: Context, second: Context) -> EscapeError {
    EscapeError::ContextConflict {
        span: action.span,
        first,
        second,
    }
}
