//! Text helpers shared by both adapters.

/// Largest char boundary at or below `byte_index`.
fn floor_char_boundary(s: &str, byte_index: usize) -> usize {
    if byte_index >= s.len() {
        return s.len();
    }
    let mut i = byte_index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Split a message into chunks of at most `max_len` bytes.
///
/// Prefers word boundaries and never splits inside a UTF-8 character.
pub fn split_message(message: &str, max_len: usize) -> Vec<String> {
    if message.len() <= max_len {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        remaining = remaining.trim_start();
        if remaining.is_empty() {
            break;
        }
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let split_at = floor_char_boundary(remaining, max_len);
        if split_at == 0 {
            // max_len is narrower than the first character
            let end = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
            chunks.push(remaining[..end].to_string());
            remaining = &remaining[end..];
            continue;
        }

        let window = &remaining[..split_at];
        match window.rfind(' ') {
            Some(space) if space > 0 => {
                chunks.push(remaining[..space].to_string());
                remaining = &remaining[space + 1..];
            }
            _ => {
                chunks.push(window.to_string());
                remaining = &remaining[split_at..];
            }
        }
    }

    chunks
}

/// Split multi-line text into non-empty lines of at most `max_len` bytes.
pub fn split_lines(text: &str, max_len: usize) -> Vec<String> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .flat_map(|line| split_message(line, max_len))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_untouched() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
    }

    #[test]
    fn test_split_on_word_boundary() {
        let chunks = split_message("hello there general kenobi", 12);
        assert_eq!(chunks, vec!["hello there", "general", "kenobi"]);
        assert!(chunks.iter().all(|c| c.len() <= 12));
    }

    #[test]
    fn test_hard_split_without_spaces() {
        let chunks = split_message("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_never_splits_multibyte_char() {
        // each 'é' is two bytes
        let chunks = split_message("ééééé", 3);
        assert!(chunks.iter().all(|c| c.chars().all(|ch| ch == 'é')));
        assert_eq!(chunks.concat(), "ééééé");
    }

    #[test]
    fn test_split_lines_drops_blank_lines() {
        let lines = split_lines("first\r\n\n  \nsecond", 100);
        assert_eq!(lines, vec!["first", "second"]);
    }
}
