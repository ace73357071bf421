// Caption text cleanup

/// Trims the text and turns every embedded line break (`\r\n`, `\n`, `\r`) into one space.
pub fn normalize_caption(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    let mut chars = trimmed.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push(' ');
            }
            '\n' => out.push(' '),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_caption() {
        assert_eq!(normalize_caption("  Figure 1: A plot\nof things \n"), "Figure 1: A plot of things");
        assert_eq!(normalize_caption("a\r\nb\rc"), "a b c");
        assert_eq!(normalize_caption("line one\n\nline two"), "line one  line two");
        assert_eq!(normalize_caption(" \n\t "), "");
    }
}
