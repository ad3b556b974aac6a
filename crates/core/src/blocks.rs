//! Note-blocks: the parsed structural view of a note's content (§3.6).
//!
//! The full block grammar (invoice decoding, bech32-mention resolution) is
//! out of scope; `ContentBlockParser` is the seam `nostrdb-store` hangs its
//! lazy-compute-and-cache path off of. The default parser recognizes text,
//! hashtag, URL and raw-mention (`nostr:...`) segments, which is enough to
//! exercise the caching path without pulling in a bech32/invoice decoder.

use serde::{Deserialize, Serialize};

/// One contiguous segment of a note's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    Text(String),
    Hashtag(String),
    Url(String),
    Mention(String),
}

/// The parsed view of a note's content, as cached under `note_key →
/// blocks_blob`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoteBlocks {
    pub blocks: Vec<Block>,
}

/// Computes [`NoteBlocks`] from raw content. `nostrdb-store` calls this on
/// first read of a note with no cached blocks, and eagerly for kinds 1 and
/// 30023 on write.
pub trait ContentBlockParser {
    fn parse(&self, content: &str) -> NoteBlocks;
}

/// A straightforward whitespace/punctuation-driven segmenter.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBlockParser;

impl ContentBlockParser for DefaultBlockParser {
    fn parse(&self, content: &str) -> NoteBlocks {
        let mut blocks = Vec::new();
        let mut text = String::new();

        for word in split_keeping_runs(content) {
            if let Some(tag) = word.strip_prefix('#') {
                if !tag.is_empty() && tag.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    flush_text(&mut text, &mut blocks);
                    blocks.push(Block::Hashtag(tag.to_string()));
                    continue;
                }
            }
            if word.starts_with("http://") || word.starts_with("https://") {
                flush_text(&mut text, &mut blocks);
                blocks.push(Block::Url(word.to_string()));
                continue;
            }
            if let Some(rest) = word.strip_prefix("nostr:") {
                if !rest.is_empty() {
                    flush_text(&mut text, &mut blocks);
                    blocks.push(Block::Mention(rest.to_string()));
                    continue;
                }
            }
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(word);
        }
        flush_text(&mut text, &mut blocks);

        NoteBlocks { blocks }
    }
}

fn flush_text(text: &mut String, blocks: &mut Vec<Block>) {
    if !text.is_empty() {
        blocks.push(Block::Text(std::mem::take(text)));
    }
}

fn split_keeping_runs(content: &str) -> impl Iterator<Item = &str> {
    content.split_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_hashtags_urls_and_mentions() {
        let parsed = DefaultBlockParser.parse("hello #nostr check https://example.com nostr:npub1x");
        assert_eq!(
            parsed.blocks,
            vec![
                Block::Text("hello".into()),
                Block::Hashtag("nostr".into()),
                Block::Text("check".into()),
                Block::Url("https://example.com".into()),
                Block::Mention("npub1x".into()),
            ]
        );
    }

    #[test]
    fn plain_text_is_a_single_block() {
        let parsed = DefaultBlockParser.parse("just some words");
        assert_eq!(parsed.blocks, vec![Block::Text("just some words".into())]);
    }
}
