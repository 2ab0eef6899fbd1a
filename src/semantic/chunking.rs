//! Token-bounded text chunking.
//!
//! Text over the budget is split on the coarsest separator it contains
//! (paragraph, line, sentence, clause, word), adjacent pieces are greedily
//! merged back up to the budget, and any piece that is still too large is
//! split again with the next finer separator. Fixed-width character windows
//! are the last resort.
//!
//! Separators stay attached to the piece they end, so joining the chunks in
//! order gives back the source text up to whitespace at chunk edges.

use crate::config::ChunkingConfig;

/// Coarse to fine. Character windows follow the last entry.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", "; ", ", ", " "];

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_tokens: usize,
    chars_per_token: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            max_tokens: config.max_tokens.max(1),
            chars_per_token: config.chars_per_token.max(1),
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Cheap token estimate: characters divided by `chars_per_token`.
    pub fn estimate_tokens(&self, text: &str) -> usize {
        self.tokens_for(text.chars().count())
    }

    fn tokens_for(&self, chars: usize) -> usize {
        chars / self.chars_per_token
    }

    fn fits(&self, chars: usize) -> bool {
        self.tokens_for(chars) <= self.max_tokens
    }

    /// Splits `text` into trimmed, non-empty chunks that each fit the
    /// budget. Empty or whitespace-only text yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let mut chunks = vec![];
        self.split(text, SEPARATORS, &mut chunks);
        chunks
    }

    fn emit(piece: &str, out: &mut Vec<String>) {
        let piece = piece.trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
    }

    fn split(&self, text: &str, separators: &[&str], out: &mut Vec<String>) {
        if self.fits(text.chars().count()) {
            Self::emit(text, out);
            return;
        }

        let Some(pos) = separators.iter().position(|sep| text.contains(sep)) else {
            self.split_windows(text, out);
            return;
        };
        let separator = separators[pos];
        let finer = &separators[pos + 1..];

        let mut current = String::new();
        let mut current_chars = 0;

        for part in text.split_inclusive(separator) {
            let part_chars = part.chars().count();

            if self.fits(current_chars + part_chars) {
                current.push_str(part);
                current_chars += part_chars;
                continue;
            }

            Self::emit(&current, out);
            current.clear();
            current_chars = 0;

            if self.fits(part_chars) {
                current.push_str(part);
                current_chars = part_chars;
            } else {
                self.split(part, finer, out);
            }
        }

        Self::emit(&current, out);
    }

    fn split_windows(&self, text: &str, out: &mut Vec<String>) {
        let window = self.max_tokens * self.chars_per_token;
        let chars: Vec<char> = text.chars().collect();
        for piece in chars.chunks(window) {
            Self::emit(&piece.iter().collect::<String>(), out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max_tokens: usize) -> Chunker {
        Chunker::new(ChunkingConfig {
            max_tokens,
            chars_per_token: 4,
        })
    }

    fn squash(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    fn assert_chunk_properties(chunker: &Chunker, text: &str) -> Vec<String> {
        let chunks = chunker.chunk(text);
        assert_eq!(squash(&chunks.concat()), squash(text));
        for chunk in &chunks {
            assert!(
                chunker.estimate_tokens(chunk) <= chunker.max_tokens(),
                "chunk of {} tokens over budget",
                chunker.estimate_tokens(chunk)
            );
            assert!(!chunk.is_empty());
            assert_eq!(chunk.trim(), chunk);
        }
        chunks
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = chunker(6000).chunk("  A short page about Rust.  ");
        assert_eq!(chunks, vec!["A short page about Rust.".to_string()]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunker(10).chunk("").is_empty());
        assert!(chunker(10).chunk(" \n\n \t").is_empty());
    }

    #[test]
    fn test_token_estimate_counts_chars() {
        let c = chunker(10);
        assert_eq!(c.estimate_tokens("abcdefgh"), 2);
        // four multi-byte characters are still one token
        assert_eq!(c.estimate_tokens("ééééé"), 1);
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let para = "word ".repeat(30);
        let text = format!("{para}\n\n{para}\n\n{para}");
        let chunks = assert_chunk_properties(&chunker(50), &text);

        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert_eq!(chunk, para.trim());
        }
    }

    #[test]
    fn test_merges_small_pieces_up_to_budget() {
        let text = "one two.\n".repeat(40);
        let chunks = assert_chunk_properties(&chunker(20), &text);
        // 9 chars per line, 80 chars per chunk: several lines per chunk
        assert!(chunks.len() < 40);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn test_oversized_paragraph_splits_on_sentences() {
        let sentence = "This sentence is exactly long enough. ";
        let big = sentence.repeat(20);
        let text = format!("intro\n\n{big}\n\noutro");
        let chunks = assert_chunk_properties(&chunker(40), &text);

        assert_eq!(chunks.first().map(String::as_str), Some("intro"));
        assert_eq!(chunks.last().map(String::as_str), Some("outro"));
        for chunk in &chunks[1..chunks.len() - 1] {
            assert!(chunk.ends_with('.'));
        }
    }

    #[test]
    fn test_unbroken_text_falls_back_to_windows() {
        let text = "x".repeat(1000);
        let chunks = assert_chunk_properties(&chunker(25), &text);
        assert_eq!(chunks.len(), 10);
        assert!(chunks.iter().all(|c| c.len() == 100));
    }

    #[test]
    fn test_mixed_content_properties() {
        let mut text = String::new();
        for i in 0..200 {
            text.push_str(&format!("Item {i}; detail, more detail! Why? "));
            if i % 7 == 0 {
                text.push('\n');
            }
            if i % 31 == 0 {
                text.push_str("\n\n");
                text.push_str(&"y".repeat(i * 3));
            }
        }

        for budget in [5, 16, 64, 300] {
            assert_chunk_properties(&chunker(budget), &text);
        }
    }
}
