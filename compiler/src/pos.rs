//! Source positions (spec §3 "Source position").

use std::rc::Rc;

/// A byte offset into a source buffer plus the file it came from.
///
/// Convertible to `(line, column)` on demand by scanning the buffer — we
/// don't track line/column incrementally because most positions are never
/// displayed to a user (only the ones attached to a diagnostic are).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pos {
    pub file: Rc<str>,
    pub offset: usize,
}

impl Pos {
    pub fn new(file: Rc<str>, offset: usize) -> Self {
        Pos { file, offset }
    }

    /// 1-indexed `(line, column)` for display, given the source text this
    /// position was taken from.
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        let mut line = 1;
        let mut col = 1;
        for ch in source[..self.offset.min(source.len())].chars() {
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }
}
