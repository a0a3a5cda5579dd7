use std::ops::{Bound, RangeBounds};

pub fn from<R: RangeBounds<usize>>(range: &R) -> usize {
    match range.start_bound() {
        Bound::Unbounded => 0,
        Bound::Included(x) => *x,
        Bound::Excluded(x) => x + 1,
    }
}

pub fn to<R: RangeBounds<usize>>(range: &R, max: usize) -> usize {
    match range.end_bound() {
        Bound::Unbounded => max,
        Bound::Included(x) => x + 1,
        Bound::Excluded(x) => *x,
    }
}

/// Split a string at the given utf-16 offset. An offset in the middle of a
/// surrogate pair is rounded down to the preceding character boundary.
pub fn split_at_utf16(text: &str, mut index: usize) -> (&str, &str) {
    let mut iter = text.chars();
    while index > 0 {
        let rest = iter.as_str();
        if let Some(c) = iter.next() {
            let l = c.len_utf16();
            if l > index {
                let mid = text.len() - rest.len();
                return text.split_at(mid);
            } else {
                index -= l;
            }
        } else {
            return (text, "");
        }
    }
    let mid = text.len() - iter.as_str().len();
    text.split_at(mid)
}

/// The part of `text` between the utf-16 offsets `from` and `to`.
pub fn slice_utf16(text: &str, from: usize, to: usize) -> &str {
    let (_, rest) = split_at_utf16(text, from);
    split_at_utf16(rest, to.saturating_sub(from)).0
}

/// The utf-16 code units of a string, for unit-wise comparison.
pub fn utf16_units(text: &str) -> Vec<u16> {
    text.encode_utf16().collect()
}
