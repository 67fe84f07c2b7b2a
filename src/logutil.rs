//! Helpers for putting server console lines into our own log output.

use std::fmt::Write;

const MAX_PREVIEW: usize = 200;

/// Render a console line for a single-line log record: the line ending is
/// dropped, remaining control characters are escaped, and long lines are cut
/// with an ellipsis.
pub fn escape_log(line: &str) -> String {
    let line = strip_line_ending(line);
    let mut out = String::with_capacity(line.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in line.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Drop a trailing `\n` or `\r\n`.
pub fn strip_line_ending(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}
