//! Token emission and output rewriting helpers.

use crate::span::Span;
use crate::token::Token;
use crate::tokenizer::Tokenizer;

impl Tokenizer<'_> {
    pub(super) fn emit_token(&mut self, token: Token) {
        #[cfg(any(test, feature = "debug-stats"))]
        log::trace!(target: "autoescape.tokenizer", "emit token: {token:?}");
        self.tokens.push(token);
        self.stats.tokens_emitted = self.stats.tokens_emitted.saturating_add(1);
    }

    /// Rewritten offset of markup offset `at`, assuming everything from the
    /// last rewrite up to `at` is copied verbatim.
    pub(super) fn out_pos(&self, at: usize) -> usize {
        debug_assert!(at >= self.copied_to, "offset precedes the last rewrite");
        self.output.len() + (at - self.copied_to)
    }

    pub(super) fn out_span(&self, start: usize, end: usize) -> Span {
        Span::new(self.out_pos(start), self.out_pos(end))
    }

    /// Copy markup verbatim up to `at`.
    pub(super) fn flush_to(&mut self, at: usize) {
        if at > self.copied_to {
            self.output.push_str(&self.input[self.copied_to..at]);
            self.copied_to = at;
        }
    }

    /// Replace `len` markup bytes at `at` with `replacement` and record the shift.
    pub(super) fn rewrite(&mut self, at: usize, len: usize, replacement: &str) {
        self.flush_to(at);
        self.map
            .record(self.output.len(), at, len, replacement.len());
        self.output.push_str(replacement);
        self.copied_to = at + len;
        self.stats.rewrites = self.stats.rewrites.saturating_add(1);
    }

    pub(super) fn begin_text(&mut self) {
        if self.pending_text_start.is_none() {
            self.pending_text_start = Some(self.out_pos(self.cursor));
        }
    }

    pub(super) fn flush_pending_text(&mut self) {
        let end = self.out_pos(self.cursor);
        self.flush_pending_text_to(end);
    }

    /// Emit the pending text run, ending at rewritten offset `end`.
    pub(super) fn flush_pending_text_to(&mut self, end: usize) {
        if let Some(start) = self.pending_text_start.take()
            && start < end
        {
            self.emit_token(Token::Text {
                span: Span::new(start, end),
            });
        }
    }
}
