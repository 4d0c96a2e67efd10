//! Canonical string escaping: produces a backslash-escaped, double-quote-safe
//! representation of a string, safe to embed between double quotes in emitted
//! source text.
//!
//! Escapes: backslash, double quote, `<` (guards against `</script>`
//! premature termination when the output is embedded in an HTML `<script>`
//! context), U+2028/U+2029 (illegal as literal line terminators inside a
//! JS string even though they're valid inside a Rust string), and the C0
//! control range.

/// Escape `s` and return the quoted literal, e.g. `foo"bar` -> `"foo\"bar"`.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    escape_into(s, &mut out);
    out.push('"');
    out
}

/// Escape `s` without surrounding quotes.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    escape_into(s, &mut out);
    out
}

fn escape_into(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '<' => out.push_str("\\x3C"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\x{:02X}", c as u32));
            }
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_backslash_and_quote() {
        assert_eq!(escape(r#"a\b"c"#), r#"a\\b\"c"#);
    }

    #[test]
    fn escapes_angle_bracket_for_script_context() {
        assert_eq!(escape("</script>"), "\\x3C/script>");
    }

    #[test]
    fn escapes_line_separators() {
        assert_eq!(escape("a\u{2028}b\u{2029}c"), "a\\u2028b\\u2029c");
    }

    #[test]
    fn escapes_control_range() {
        assert_eq!(escape("a\u{0001}b"), "a\\x01b");
    }

    #[test]
    fn quote_wraps_in_double_quotes() {
        assert_eq!(quote("hi"), "\"hi\"");
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(escape("hello world"), "hello world");
    }
}
