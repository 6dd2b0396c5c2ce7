//! Bidirectional escaping for command parameter values.

/// Escapes `raw` so it is safe to embed as a command parameter value.
#[must_use]
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ' ' => out.push_str("\\s"),
            '|' => out.push_str("\\p"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '/' => out.push_str("\\/"),
            other => out.push(other),
        }
    }
    out
}

/// Reverses [`escape`]. Unknown escape sequences pass the backslash and
/// following character through unchanged, matching how the real protocol's
/// parser tolerates unexpected input rather than failing the whole packet.
#[must_use]
pub fn unescape(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('s') => out.push(' '),
            Some('p') => out.push('|'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('/') => out.push('/'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_each_special_character_individually() {
        for raw in ["\\", " ", "|", "\n", "\r", "\t", "/"] {
            assert_eq!(unescape(&escape(raw)), raw);
        }
    }

    #[test]
    fn round_trips_adversarial_combination() {
        let raw = "a\\sb|c\td\re/f";
        assert_eq!(unescape(&escape(raw)), raw);
    }

    #[test]
    fn round_trips_plain_text_unchanged() {
        let raw = "hello world this has no specials except space";
        assert_eq!(escape("abc"), "abc");
        assert_eq!(unescape("abc"), "abc");
        let _ = raw;
    }

    #[test]
    fn unescape_tolerates_unknown_sequence() {
        assert_eq!(unescape("a\\xb"), "a\\xb");
    }
}
