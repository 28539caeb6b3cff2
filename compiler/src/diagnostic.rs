//! Human-readable diagnostic rendering (spec §7): the offending line's text
//! plus a caret under the column, the way every phase's errors are
//! presented to a human reading compiler output.

use crate::pos::Pos;

pub fn render(source: &str, pos: &Pos, message: &str) -> String {
    let (line, col) = pos.line_col(source);
    let line_text = source.lines().nth(line - 1).unwrap_or("");
    let caret = " ".repeat(col.saturating_sub(1)) + "^";
    format!(
        "{}:{}:{}: error: {}\n{}\n{}",
        pos.file, line, col, message, line_text, caret
    )
}
