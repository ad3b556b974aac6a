//! Full-text tokenizer and prefix-match rule (§4.7). The index walk itself
//! (seeking into the `text` table, narrowing across tokens within one note)
//! lives in `nostrdb-store`; this module holds the storage-independent parts:
//! splitting content into tokens, and deciding whether a candidate word is
//! close enough to a query token to count as a match.

/// One token produced by [`tokenize`]: its lowercased bytes and its 0-based
/// position within the content (the `i` in `TextKey`'s `word_index`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub word: Vec<u8>,
    pub index: u64,
}

/// A byte counts as part of a word unless it is ASCII whitespace or ASCII
/// punctuation/symbol. Bytes above 0x7F are always word bytes.
fn is_word_byte(b: u8) -> bool {
    if b > 0x7f {
        return true;
    }
    b.is_ascii_alphanumeric()
}

fn ascii_lower(b: u8) -> u8 {
    if b.is_ascii_uppercase() {
        b + 32
    } else {
        b
    }
}

/// Splits `content` into maximal runs of word bytes, lowercasing each token
/// (ASCII-only; bytes above 0x7F pass through unchanged).
pub fn tokenize(content: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = Vec::new();
    let mut index = 0u64;

    let mut flush = |current: &mut Vec<u8>, tokens: &mut Vec<Token>, index: &mut u64| {
        if !current.is_empty() {
            tokens.push(Token {
                word: std::mem::take(current),
                index: *index,
            });
            *index += 1;
        }
    };

    for &b in content {
        if is_word_byte(b) {
            current.push(ascii_lower(b));
        } else {
            flush(&mut current, &mut tokens, &mut index);
        }
    }
    flush(&mut current, &mut tokens, &mut index);
    tokens
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// The prefix-match rule used when walking the text index (§4.7): the first
/// two bytes must match, and the shared prefix must exceed `word_len / 1.5`
/// where `word_len` is the query token's length.
pub fn prefix_matches(query_token: &[u8], candidate_word: &[u8]) -> Option<usize> {
    if query_token.len() < 2 || candidate_word.len() < 2 {
        return None;
    }
    if query_token[..2] != candidate_word[..2] {
        return None;
    }
    let shared = common_prefix_len(query_token, candidate_word);
    if (shared as f64) > (query_token.len() as f64) / 1.5 {
        Some(shared)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_words_and_lowercases() {
        let tokens = tokenize(b"Hello, World! foo-bar 123");
        let words: Vec<&[u8]> = tokens.iter().map(|t| t.word.as_slice()).collect();
        assert_eq!(words, vec![b"hello".as_slice(), b"world", b"foo", b"bar", b"123"]);
        assert_eq!(tokens[0].index, 0);
        assert_eq!(tokens[4].index, 4);
    }

    #[test]
    fn non_ascii_bytes_are_word_bytes() {
        let tokens = tokenize("café".as_bytes());
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].word, "café".as_bytes());
    }

    #[test]
    fn prefix_match_requires_shared_first_two_bytes() {
        // shared prefix "wo" (len 2) vs query len 2 -> 2 > 2/1.5 (=1.33) is true
        assert!(prefix_matches(b"wo", b"word").is_some());
        assert!(prefix_matches(b"word", b"words").is_some());
        assert!(prefix_matches(b"wo", b"xyz").is_none());
    }

    #[test]
    fn prefix_match_on_a_long_word_still_passes_a_short_query() {
        // shared prefix "wo" (len 2) vs query len 2 -> 2 > 2/1.5 (=1.33) is true,
        // regardless of how long the indexed candidate itself is.
        assert!(prefix_matches(b"wo", b"wonderfully").is_some());
    }

    #[test]
    fn prefix_match_rejects_a_long_query_with_only_a_short_shared_prefix() {
        // shared prefix "wo" (len 2) vs query len 11 -> 2 > 11/1.5 (=7.3) is false
        assert!(prefix_matches(b"wonderfully", b"wo").is_none());
    }
}
