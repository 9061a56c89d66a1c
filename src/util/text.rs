use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Flattens feed text into one terminal-safe line.
///
/// Feed titles and descriptions are untrusted: they may carry newlines,
/// indentation from the XML layout, or escape sequences. Control characters
/// (ESC included) are removed and every run of whitespace becomes a single
/// space; leading and trailing whitespace is dropped.
///
/// # Examples
///
/// ```
/// use feedpull::util::single_line;
///
/// assert_eq!(single_line("\n    Breaking\n    news  "), "Breaking news");
/// assert_eq!(single_line("red\x1b[31m text"), "red[31m text");
/// assert_eq!(single_line("clean"), "clean");
/// ```
pub fn single_line(s: &str) -> Cow<'_, str> {
    let is_clean = !s.starts_with(char::is_whitespace)
        && !s.ends_with(char::is_whitespace)
        && !s.contains(|c: char| c.is_control() || (c.is_whitespace() && c != ' '))
        && !s.contains("  ");
    if is_clean {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
        } else if !c.is_control() {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Truncates a string to fit within `max_width` terminal columns, appending
/// "..." when text was cut.
///
/// Widths are Unicode-aware (CJK and emoji take two columns). When
/// `max_width` is too narrow for any text plus the ellipsis, as many
/// characters as fit are returned without one.
///
/// # Examples
///
/// ```
/// use feedpull::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
/// assert_eq!(truncate_to_width("Test", 2), "Te");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if UnicodeWidthStr::width(s) <= max_width {
        return Cow::Borrowed(s);
    }

    let budget = if max_width > ELLIPSIS_WIDTH {
        max_width - ELLIPSIS_WIDTH
    } else {
        max_width
    };

    let mut used = 0;
    let mut end = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        end = idx + c.len_utf8();
    }

    if max_width > ELLIPSIS_WIDTH {
        Cow::Owned(format!("{}{}", &s[..end], ELLIPSIS))
    } else {
        Cow::Owned(s[..end].to_string())
    }
}
