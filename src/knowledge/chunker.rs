//! Sentence-aware splitting of plain text into overlapping chunks.

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    /// Byte offset of the chunk in the source text.
    pub start: usize,
}

pub struct Chunker {
    /// Target chunk size in bytes.
    target_size: usize,
    /// Bytes of the previous chunk repeated at the start of the next.
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            target_size: 1024,
            overlap: 128,
        }
    }
}

impl Chunker {
    pub fn new(target_size: usize, overlap: usize) -> Self {
        Self {
            target_size: target_size.max(1),
            overlap: overlap.min(target_size / 2),
        }
    }

    /// Cuts at the last sentence boundary (`.`, `?`, `!`, newline) before a
    /// chunk would pass the target size. A sentence longer than the target
    /// stays whole.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut spans: Vec<(usize, usize)> = Vec::new();
        let mut chunk_start = 0;
        let mut last_boundary = 0;

        for (i, c) in text.char_indices() {
            if !matches!(c, '.' | '?' | '!' | '\n') {
                continue;
            }
            let end = i + c.len_utf8();
            if end - chunk_start > self.target_size && last_boundary > chunk_start {
                spans.push((chunk_start, last_boundary));
                chunk_start = last_boundary;
            }
            last_boundary = end;
        }
        if chunk_start < text.len() {
            spans.push((chunk_start, text.len()));
        }

        spans
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| {
                let start = if i == 0 { start } else { self.overlap_start(text, start) };
                let span = &text[start..end];
                let body = span.trim_start();
                Chunk {
                    text: body.trim_end().to_string(),
                    start: start + (span.len() - body.len()),
                }
            })
            .filter(|c| !c.text.is_empty())
            .collect()
    }

    /// Steps back `overlap` bytes, then forward to the next word start.
    fn overlap_start(&self, text: &str, start: usize) -> usize {
        if self.overlap == 0 {
            return start;
        }
        let mut pos = start.saturating_sub(self.overlap);
        while !text.is_char_boundary(pos) {
            pos += 1;
        }
        text[pos..start]
            .char_indices()
            .find(|(_, c)| c.is_whitespace())
            .map_or(start, |(i, c)| pos + i + c.len_utf8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = Chunker::default().chunk("Paris is the capital of France.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].text, "Paris is the capital of France.");
    }

    #[test]
    fn splits_on_sentence_boundaries() {
        let text = "One two three. Four five six. Seven eight nine.";
        let chunks = Chunker::new(20, 0).chunk(text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "One two three.");
        assert_eq!(chunks[1].text, "Four five six.");
        assert_eq!(chunks[2].text, "Seven eight nine.");
        assert!(chunks.iter().all(|c| text[c.start..].starts_with(&c.text)));
    }

    #[test]
    fn overlap_repeats_trailing_words() {
        let text = "Alpha beta gamma. Delta epsilon zeta.";
        let chunks = Chunker::new(20, 8).chunk(text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].text.starts_with("gamma."));
        assert!(chunks[1].text.ends_with("zeta."));
    }

    #[test]
    fn overlap_steps_over_multibyte_whitespace() {
        for overlap in [8, 9] {
            let text = "Alpha beta\u{a0}gamma. Delta epsilon zeta.";
            let chunks = Chunker::new(20, overlap).chunk(text);
            assert_eq!(chunks.len(), 2);
            assert!(chunks[1].text.starts_with("gamma."));
            assert!(text[chunks[1].start..].starts_with(&chunks[1].text));
        }

        let text = "Alpha beta\u{3000}gamma. Delta epsilon zeta.";
        let chunks = Chunker::new(20, 9).chunk(text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].text.starts_with("gamma."));
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(Chunker::default().chunk("  \n ").is_empty());
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let text = "¿Qué es el cambio climático? Es un cambio a largo plazo. ".repeat(20);
        let chunks = Chunker::new(64, 16).chunk(&text);
        assert!(chunks.len() > 1);
    }
}
