//! Word-boundary text chunking for speech synthesis.

use crate::types::TextChunk;

/// Splits `text` into ordered chunks of at most `max_len` characters.
///
/// Text that already fits is returned untouched as a single chunk. Longer
/// text is re-flowed on whitespace, and a word that alone exceeds the limit
/// is cut into fixed-width slices. Lengths are counted in characters.
pub fn split_text(text: &str, max_len: usize) -> Vec<TextChunk> {
    let max_len = max_len.max(1);

    if text.chars().count() <= max_len {
        return vec![TextChunk {
            index: 0,
            text: text.to_string(),
        }];
    }

    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_len {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            pieces.extend(chars.chunks(max_len).map(|slice| slice.iter().collect()));
            continue;
        }

        if current.is_empty() {
            current.push_str(word);
            current_len = word_len;
        } else if current_len + 1 + word_len <= max_len {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
        } else {
            pieces.push(std::mem::replace(&mut current, word.to_string()));
            current_len = word_len;
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextChunk { index, text })
        .collect()
}
