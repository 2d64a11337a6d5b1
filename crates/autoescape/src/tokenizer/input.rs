//! Tokenizer input helpers.

use crate::action::{ActionId, sentinel};
use crate::tokenizer::Tokenizer;

impl Tokenizer<'_> {
    pub(super) fn has_unconsumed_input(&self) -> bool {
        self.cursor < self.input.len()
    }

    pub(super) fn peek(&self) -> Option<char> {
        self.input[self.cursor..].chars().next()
    }

    pub(super) fn peek_byte_at(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.cursor + offset).copied()
    }

    pub(super) fn lookahead(&self, prefix: &str) -> bool {
        self.input[self.cursor..].starts_with(prefix)
    }

    /// Consume one char; returns it.
    pub(super) fn consume(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.cursor += ch.len_utf8();
        Some(ch)
    }

    /// Sentinel starting at `offset`, if one does.
    pub(super) fn sentinel_at(&self, offset: usize) -> Option<ActionId> {
        if self.input.as_bytes().get(offset) != Some(&sentinel::LEAD_BYTE) {
            return None;
        }
        sentinel::decode_at(self.input, offset)
            .filter(|id| id.index() < self.actions.len())
    }

    pub(super) fn sentinel_at_cursor(&self) -> Option<ActionId> {
        self.sentinel_at(self.cursor)
    }

    /// Whether `</name` followed by optional ASCII whitespace and `>` starts at
    /// the cursor; returns the length of that end tag.
    pub(super) fn matching_end_tag(&self, name: &str) -> Option<usize> {
        let bytes = &self.input.as_bytes()[self.cursor..];
        let rest = bytes.strip_prefix(b"</")?;
        let candidate = rest.get(..name.len())?;
        if !candidate.eq_ignore_ascii_case(name.as_bytes()) {
            return None;
        }
        let after = &rest[name.len()..];
        let ws = after
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        (after.get(ws) == Some(&b'>')).then_some(2 + name.len() + ws + 1)
    }
}
