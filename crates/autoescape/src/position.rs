//! Offset translation between a rewritten text and the text it was derived from.
//!
//! Every rewrite replaces `original_len` bytes at `original` with
//! `rewritten_len` bytes at `rewritten`. Bytes outside rewrites are copied
//! verbatim, so any offset can be walked back through the most recent preceding
//! rewrite.

use crate::span::Span;

/// One rewrite entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shift {
    /// Offset of the replacement in the rewritten text.
    pub rewritten: usize,
    /// Offset of the replaced range in the original text.
    pub original: usize,
    pub original_len: usize,
    pub rewritten_len: usize,
}

impl Shift {
    /// Length change introduced by this rewrite.
    pub fn delta(&self) -> isize {
        self.rewritten_len as isize - self.original_len as isize
    }

    fn rewritten_end(&self) -> usize {
        self.rewritten + self.rewritten_len
    }

    fn original_end(&self) -> usize {
        self.original + self.original_len
    }
}

/// Append-only position map.
///
/// Invariant: entries are ordered with strictly increasing rewritten and
/// original offsets, and consecutive entries never overlap in either text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PositionMap {
    shifts: Vec<Shift>,
}

impl PositionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `original_len` bytes at `original` were replaced by
    /// `rewritten_len` bytes at `rewritten`.
    pub fn record(
        &mut self,
        rewritten: usize,
        original: usize,
        original_len: usize,
        rewritten_len: usize,
    ) {
        debug_assert!(
            original_len > 0 || rewritten_len > 0,
            "empty rewrite must not be recorded"
        );
        if let Some(last) = self.shifts.last() {
            debug_assert!(
                rewritten >= last.rewritten_end() && rewritten > last.rewritten,
                "rewritten offsets must be strictly increasing: {rewritten} after {last:?}"
            );
            debug_assert!(
                original >= last.original_end(),
                "original offsets must not overlap: {original} after {last:?}"
            );
            debug_assert_eq!(
                rewritten as isize - original as isize,
                last.rewritten_end() as isize - last.original_end() as isize,
                "rewrites must be recorded against a verbatim copy"
            );
        } else {
            debug_assert_eq!(rewritten, original, "first rewrite must follow a verbatim copy");
        }
        self.shifts.push(Shift {
            rewritten,
            original,
            original_len,
            rewritten_len,
        });
    }

    pub fn shifts(&self) -> &[Shift] {
        &self.shifts
    }

    pub fn is_empty(&self) -> bool {
        self.shifts.is_empty()
    }

    /// Translate a start-like offset. Offsets inside a replacement map to the
    /// start of the replaced range, clamped to its length.
    pub fn to_original(&self, offset: usize) -> usize {
        match self.preceding(offset) {
            None => offset,
            Some(shift) if offset < shift.rewritten_end() => {
                shift.original + (offset - shift.rewritten).min(shift.original_len)
            }
            Some(shift) => offset - shift.rewritten_end() + shift.original_end(),
        }
    }

    /// Translate an end-like offset. Offsets strictly inside a replacement map
    /// to the end of the replaced range so the translated span covers it.
    pub fn to_original_end(&self, offset: usize) -> usize {
        let idx = self.shifts.partition_point(|shift| shift.rewritten < offset);
        if idx == 0 {
            return offset;
        }
        let shift = &self.shifts[idx - 1];
        if offset <= shift.rewritten_end() {
            shift.original_end()
        } else {
            offset - shift.rewritten_end() + shift.original_end()
        }
    }

    pub fn span_to_original(&self, span: Span) -> Span {
        let start = self.to_original(span.start);
        let end = self.to_original_end(span.end).max(start);
        Span::new(start, end)
    }

    fn preceding(&self, offset: usize) -> Option<&Shift> {
        let idx = self.shifts.partition_point(|shift| shift.rewritten <= offset);
        idx.checked_sub(1).map(|idx| &self.shifts[idx])
    }
}

/// Two maps applied in sequence: `outer` translates rewritten offsets into an
/// intermediate text, `inner` translates that text into the original source.
#[derive(Clone, Copy, Debug)]
pub struct ChainedMap<'m> {
    pub outer: &'m PositionMap,
    pub inner: &'m PositionMap,
}

impl ChainedMap<'_> {
    pub fn span_to_original(&self, span: Span) -> Span {
        self.inner
            .span_to_original(self.outer.span_to_original(span))
    }

    pub fn to_original(&self, offset: usize) -> usize {
        self.inner.to_original(self.outer.to_original(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_map_is_identity() {
        let map = PositionMap::new();
        assert_eq!(map.to_original(17), 17);
        assert_eq!(map.span_to_original(Span::new(3, 9)), Span::new(3, 9));
    }

    #[test]
    fn insertion_shifts_following_offsets() {
        // `a=b` -> `a="b"`: insert at 2 and at 3 (original), 2 and 4 (rewritten).
        let mut map = PositionMap::new();
        map.record(2, 2, 0, 1);
        map.record(4, 3, 0, 1);
        assert_eq!(map.to_original(0), 0);
        assert_eq!(map.to_original(2), 2, "inserted quote maps to the value start");
        assert_eq!(map.to_original(3), 2, "value byte follows the inserted quote");
        assert_eq!(map.to_original(5), 3);
        assert_eq!(map.span_to_original(Span::new(3, 4)), Span::new(2, 3));
    }

    #[test]
    fn replacement_span_covers_replaced_range() {
        // `{{.X}}` (6 bytes) at 4 replaced by 14 bytes.
        let mut map = PositionMap::new();
        map.record(4, 4, 6, 14);
        assert_eq!(map.span_to_original(Span::new(4, 18)), Span::new(4, 10));
        assert_eq!(map.to_original(18), 10);
        assert_eq!(map.to_original(20), 12);
        assert_eq!(map.shifts()[0].delta(), 8);
    }

    #[test]
    fn chained_maps_compose() {
        let mut inner = PositionMap::new();
        inner.record(0, 0, 6, 14);
        let mut outer = PositionMap::new();
        outer.record(20, 20, 1, 5);
        let chain = ChainedMap {
            outer: &outer,
            inner: &inner,
        };
        assert_eq!(chain.span_to_original(Span::new(0, 14)), Span::new(0, 6));
        assert_eq!(chain.to_original(25), 13);
    }
}
