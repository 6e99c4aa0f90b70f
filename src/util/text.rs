use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";

/// Remove terminal escape sequences and control characters from a remote title.
///
/// Titles are rendered on a single line, so newlines and tabs are folded into
/// spaces. CSI (`ESC [ ... final`) and OSC (`ESC ] ... BEL|ST`) sequences are
/// dropped whole. Returns `Cow::Borrowed` when nothing needs to change.
pub fn sanitize_title(s: &str) -> Cow<'_, str> {
    if !s.chars().any(char::is_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.peek() {
                Some('[') => {
                    chars.next();
                    // Parameter and intermediate bytes up to the final byte
                    for n in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&n) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(n) = chars.next() {
                        if n == '\x07' {
                            break;
                        }
                        if n == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            },
            '\t' | '\n' | '\r' => out.push(' '),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    Cow::Owned(out)
}

/// Fit `s` into exactly `width` terminal columns.
///
/// Longer strings are cut and end in `...`; shorter strings are padded with
/// spaces. Wide (CJK, emoji) characters count as two columns.
pub fn fit_to_width(s: &str, width: usize) -> String {
    let current = UnicodeWidthStr::width(s);
    if current <= width {
        let mut out = String::with_capacity(s.len() + (width - current));
        out.push_str(s);
        out.extend(std::iter::repeat(' ').take(width - current));
        return out;
    }

    // Too narrow for any text plus ellipsis: plain cut
    let budget = if width > ELLIPSIS.len() {
        width - ELLIPSIS.len()
    } else {
        width
    };

    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    if width > ELLIPSIS.len() {
        out.push_str(ELLIPSIS);
        used += ELLIPSIS.len();
    }
    out.extend(std::iter::repeat(' ').take(width.saturating_sub(used)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_title_is_borrowed() {
        assert!(matches!(sanitize_title("Plain Title"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strips_csi_and_osc_sequences() {
        assert_eq!(sanitize_title("\x1b[31mRed\x1b[0m"), "Red");
        assert_eq!(sanitize_title("a\x1b]0;title\x07b"), "ab");
        assert_eq!(sanitize_title("a\x1b]8;;x\x1b\\b"), "ab");
    }

    #[test]
    fn test_folds_whitespace_controls() {
        assert_eq!(sanitize_title("two\nlines\tand\x00nul"), "two lines andnul");
    }

    #[test]
    fn test_fit_pads_short_text() {
        assert_eq!(fit_to_width("abc", 6), "abc   ");
    }

    #[test]
    fn test_fit_truncates_long_text() {
        assert_eq!(fit_to_width("Hello World", 8), "Hello...");
    }

    #[test]
    fn test_fit_wide_characters() {
        // Each CJK char is two columns: budget 4 fits two of them
        assert_eq!(fit_to_width("日本語チャンネル", 7), "日本...");
    }

    #[test]
    fn test_fit_very_narrow() {
        assert_eq!(fit_to_width("Hello", 2), "He");
        assert_eq!(fit_to_width("Hello", 0), "");
    }
}
