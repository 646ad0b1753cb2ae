//! Turning notes markup into speakable sentences.

use crate::domain::html::{collapse_whitespace, Document};

/// Default ceiling on one spoken chunk.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 220;

/// Elements whose text is never read aloud.
const UNSPOKEN_TAGS: [&str; 6] = ["head", "title", "script", "style", "noscript", "template"];

/// Plain text of `markup`, one line per block-level element.
///
/// Lines are whitespace-collapsed and empty lines dropped, so text without
/// terminal punctuation still ends at its paragraph, heading or list item.
pub fn extract_speech_text(markup: &str) -> String {
    let mut doc = Document::parse(markup);
    doc.remove_elements(&UNSPOKEN_TAGS);
    doc.block_text(doc.root())
        .lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split text into sentences, then re-chunk anything over `max_chars`.
///
/// A sentence ends after a run of `.`, `!` or `?` followed by whitespace,
/// or at a line break. Pieces with no letters or digits are dropped.
pub fn split_sentences(text: &str, max_chars: usize) -> Vec<String> {
    text.lines()
        .flat_map(split_line)
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .flat_map(|s| chunk_at_words(&s, max_chars))
        .collect()
}

fn split_line(line: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if !is_terminal(c) {
            continue;
        }
        while let Some(&next) = chars.peek() {
            if !is_terminal(next) {
                break;
            }
            current.push(next);
            chars.next();
        }
        if chars.peek().map_or(true, |next| next.is_whitespace()) {
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
    }
    push_trimmed(&mut sentences, &current);
    sentences
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let trimmed = s.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Break `sentence` into pieces of at most `max_chars`, cutting at the last
/// whitespace before the limit, or hard at the limit when there is none.
pub fn chunk_at_words(sentence: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = sentence.trim();

    while rest.chars().count() > max_chars {
        let limit = rest
            .char_indices()
            .nth(max_chars)
            .map_or(rest.len(), |(idx, _)| idx);
        // Include the char at the limit so a space right after a full chunk counts.
        let window_end = rest[limit..]
            .chars()
            .next()
            .map_or(limit, |c| limit + c.len_utf8());
        let cut = rest[..window_end]
            .char_indices()
            .filter(|(_, c)| c.is_whitespace())
            .map(|(idx, _)| idx)
            .filter(|&idx| idx > 0)
            .last()
            .unwrap_or(limit);

        push_trimmed(&mut chunks, &rest[..cut]);
        rest = rest[cut..].trim_start();
    }
    push_trimmed(&mut chunks, rest);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_without_punctuation_split() {
        let text = extract_speech_text("<p>A</p><p>B</p>");
        assert_eq!(split_sentences(&text, DEFAULT_MAX_CHUNK_CHARS), ["A", "B"]);
    }

    #[test]
    fn test_block_boundaries() {
        let html = "<h2>Cells</h2><ul><li>Nucleus holds DNA</li><li>Ribosomes build protein</li></ul>Line one<br>Line two<table><tr><td>x</td></tr><tr><td>y</td></tr></table>";
        let text = extract_speech_text(html);
        assert_eq!(
            split_sentences(&text, DEFAULT_MAX_CHUNK_CHARS),
            [
                "Cells",
                "Nucleus holds DNA",
                "Ribosomes build protein",
                "Line one",
                "Line two",
                "x",
                "y"
            ]
        );
    }

    #[test]
    fn test_exported_document_reads_body_only() {
        let html = "<html><head><title>Cogni-Flow notes</title><style>p { color: red }</style></head>\
                    <body><script>track(1)</script><p>Cells divide.</p></body></html>";
        let text = extract_speech_text(html);
        assert_eq!(split_sentences(&text, DEFAULT_MAX_CHUNK_CHARS), vec!["Cells divide."]);
    }

    #[test]
    fn test_inline_elements_do_not_split() {
        let text = extract_speech_text("<p>The <strong>mitochondria</strong> is key.</p>");
        assert_eq!(text, "The mitochondria is key.");
    }

    #[test]
    fn test_terminal_punctuation_runs() {
        let sentences = split_sentences("Wait... really?! Yes. Version 2.5 ships.", 220);
        assert_eq!(sentences, ["Wait...", "really?!", "Yes.", "Version 2.5 ships."]);
    }

    #[test]
    fn test_punctuation_only_pieces_dropped() {
        assert!(split_sentences("... !!! ??", 220).is_empty());
        assert!(split_sentences("", 220).is_empty());
    }

    #[test]
    fn test_long_sentence_chunked_at_word_boundary() {
        let sentence = "word ".repeat(100);
        let chunks = split_sentences(&sentence, 22);
        assert!(chunks.iter().all(|c| c.chars().count() <= 22));
        assert!(chunks.iter().all(|c| c.split(' ').all(|w| w == "word")));
        assert_eq!(chunks.join(" "), sentence.trim());
    }

    #[test]
    fn test_chunk_without_spaces_is_hard_split() {
        let chunks = chunk_at_words(&"a".repeat(50), 20);
        assert_eq!(
            chunks.iter().map(|c| c.len()).collect::<Vec<_>>(),
            [20, 20, 10]
        );
    }

    #[test]
    fn test_chunk_exact_fit() {
        assert_eq!(chunk_at_words("abcd efgh", 9), ["abcd efgh"]);
        assert_eq!(chunk_at_words("abcd efgh ijkl", 9), ["abcd efgh", "ijkl"]);
    }
}
