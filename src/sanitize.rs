//! Cleans generated replies before they are spoken.

use crate::constants::SPEECH_CHAR_LIMIT;

/// Everything after this marker is the stress-score block, which is not spoken.
const SCORE_DELIMITER: &str = "---";

/// Stars, markdown emphasis and heading markers, dashes and backticks.
const DECORATIVE_GLYPHS: &[char] = &['⭐', '☆', '*', '#', '-', '—', '_', '`'];

/// Unicode whitespace plus the ASCII file, group, record and unit separators.
fn is_separator(c: char) -> bool {
    c.is_whitespace() || ('\x1c'..='\x1f').contains(&c)
}

/// Strip a reply down to plain speakable ASCII.
pub fn sanitize(text: &str) -> String {
    let text = match text.find(SCORE_DELIMITER) {
        Some(idx) => &text[..idx],
        None => text,
    };

    let stripped: String = text
        .chars()
        .filter(|c| !DECORATIVE_GLYPHS.contains(c) && c.is_ascii())
        .collect();

    stripped
        .split(is_separator)
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sanitized text capped at [`SPEECH_CHAR_LIMIT`], ready for synthesis.
pub fn speech_text(text: &str) -> String {
    sanitize(text).chars().take(SPEECH_CHAR_LIMIT).collect()
}
