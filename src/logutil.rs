//! Logging helpers for modem text so log records stay single-line.
//! Message bodies and transcripts carry CR/LF and the 0x1A terminator,
//! which would otherwise split or garble log output.

use std::fmt::Write;

const MAX_PREVIEW: usize = 300;

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
/// - 0x1A => `<SUB>`, 0x1B => `<ESC>`
/// - other control chars => `\xNN`
///
/// Strings longer than 300 chars are cut with an ellipsis.
pub fn escape_line(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{1a}' => out.push_str("<SUB>"),
            '\u{1b}' => out.push_str("<ESC>"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Escape each line and join them with ` | `.
pub fn escape_lines(lines: &[String]) -> String {
    lines
        .iter()
        .map(|l| escape_line(l))
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_newlines_and_terminator() {
        assert_eq!(escape_line("Line1\nLine2\r\tEnd"), "Line1\\nLine2\\r\\tEnd");
        assert_eq!(escape_line("Hi\u{1a}"), "Hi<SUB>");
        assert_eq!(escape_line("a\u{7}b"), "a\\x07b");
    }

    #[test]
    fn truncates_long_text() {
        let long = "x".repeat(400);
        let esc = escape_line(&long);
        assert_eq!(esc.chars().count(), MAX_PREVIEW + 1);
        assert!(esc.ends_with('…'));
    }

    #[test]
    fn joins_transcript() {
        let lines = vec!["+CMGS: 3".to_string(), "OK".to_string()];
        assert_eq!(escape_lines(&lines), "+CMGS: 3 | OK");
        assert_eq!(escape_lines(&[]), "");
    }
}
