//! Cleanup of raw model completions.
//!
//! Removes the chatter models wrap around markup: code fences, a wrapping
//! pair of quotes, and prose appended after the closing tag. Never fails;
//! callers apply their own length gate to the result.

/// Below this many characters the cleaned output is discarded in favour of
/// the raw response.
pub const MIN_SANITIZED_CHARS: usize = 20;

/// Trailing text longer than this after the last closing marker is treated
/// as commentary.
pub const MAX_TRAILING_CHARS: usize = 50;

const FENCE: &str = "```";

/// Closing markers checked in order; the first one present wins.
const CLOSING_MARKERS: [&str; 3] = ["</html>", "</body>", "</div>"];

/// Clean a raw completion into displayable markup.
///
/// Returns `raw` unchanged when the cleaned result would be shorter than
/// [`MIN_SANITIZED_CHARS`].
pub fn sanitize(raw: &str) -> String {
    let text = raw.trim();
    let text = strip_leading_fence(text);
    let text = strip_trailing_fence(text);
    let text = strip_wrapping_quotes(text.trim());
    let text = cut_trailing_commentary(text);
    let text = text.trim();

    if text.chars().count() < MIN_SANITIZED_CHARS {
        return raw.to_string();
    }
    text.to_string()
}

/// Remove one opening fence line (three backticks plus an optional language tag).
fn strip_leading_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix(FENCE) else {
        return text;
    };
    let (first_line, remainder) = match rest.find('\n') {
        Some(idx) => (&rest[..idx], &rest[idx + 1..]),
        None => (rest, ""),
    };
    let tag = first_line.trim();
    if tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '+')
    {
        remainder
    } else {
        text
    }
}

/// Remove one closing fence on its own line at the end.
fn strip_trailing_fence(text: &str) -> &str {
    let trimmed = text.trim_end();
    let Some(rest) = trimmed.strip_suffix(FENCE) else {
        return text;
    };
    if rest.is_empty() {
        return rest;
    }
    match rest.rfind('\n') {
        Some(idx) if rest[idx + 1..].trim().is_empty() => &rest[..idx],
        None if rest.trim().is_empty() => "",
        _ => text,
    }
}

/// Remove exactly one matching pair of wrapping quote characters.
fn strip_wrapping_quotes(text: &str) -> &str {
    let mut chars = text.chars();
    let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
        return text;
    };
    if first == last && matches!(first, '"' | '\'' | '`') {
        &text[first.len_utf8()..text.len() - last.len_utf8()]
    } else {
        text
    }
}

/// Truncate at the last closing marker when more than
/// [`MAX_TRAILING_CHARS`] characters follow it.
fn cut_trailing_commentary(text: &str) -> &str {
    let lower = text.to_ascii_lowercase();
    for marker in CLOSING_MARKERS {
        if let Some(idx) = lower.rfind(marker) {
            let end = idx + marker.len();
            if text[end..].trim().chars().count() > MAX_TRAILING_CHARS {
                return &text[..end];
            }
            return text;
        }
    }
    text
}
