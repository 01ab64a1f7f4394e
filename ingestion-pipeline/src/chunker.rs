//! Splits raw text into overlapping, boundary-aware chunks (component C1).
//!
//! The chunker is a pure function: no I/O, no failure modes, and it never
//! looks at document metadata beyond the `source_url` threaded through for
//! section hints. Boundaries are chosen on sentence edges where possible,
//! falling back to a hard cut so the size budget is never exceeded.

use crate::model::{BoundaryKind, ChunkDraft};

/// Tunable knobs for a single chunking pass, both measured in characters.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    pub target_size: usize,
    pub overlap: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            target_size: 1000,
            overlap: 100,
        }
    }
}

/// Splits `text` into ordered [`ChunkDraft`]s.
///
/// Invariants upheld: concatenating the non-overlapping prefix of every
/// chunk reconstructs `text`; adjacent chunks share at most `options.overlap`
/// characters. Empty input yields an empty sequence.
#[must_use]
pub fn chunk(text: &str, options: ChunkOptions) -> Vec<ChunkDraft> {
    if text.is_empty() {
        return Vec::new();
    }

    let target = options.target_size.max(1);
    let overlap = options.overlap.min(target.saturating_sub(1));

    let sentence_bounds = sentence_boundaries(text);
    let mut drafts = Vec::new();
    let mut start = 0usize;
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let total_chars = chars.len();

    while start < total_chars {
        let naive_end = (start + target).min(total_chars);
        let end = if naive_end >= total_chars {
            total_chars
        } else {
            best_boundary(&sentence_bounds, start, naive_end).unwrap_or(naive_end)
        };

        let byte_start = chars[start].0;
        let byte_end = chars.get(end).map_or(text.len(), |&(i, _)| i);
        let chunk_text = text[byte_start..byte_end].to_string();

        let boundary = if end == total_chars {
            BoundaryKind::HardCut
        } else if sentence_bounds.contains(&end) {
            BoundaryKind::Sentence
        } else {
            BoundaryKind::HardCut
        };

        drafts.push(ChunkDraft {
            chunk_index: drafts.len(),
            chunk_text,
            section_title: None,
            section_level: None,
            boundary,
        });

        if end >= total_chars {
            break;
        }

        let next_start = end.saturating_sub(overlap);
        start = if next_start > start { next_start } else { end };
    }

    drafts
}

/// Character offsets (in `char` units, not bytes) immediately following a
/// sentence-ending punctuation mark, used as preferred split points.
fn sentence_boundaries(text: &str) -> Vec<usize> {
    let mut bounds = Vec::new();
    for (offset, ch) in text.chars().enumerate() {
        if matches!(ch, '.' | '!' | '?') {
            bounds.push(offset + 1);
        }
    }
    bounds
}

/// Finds the sentence boundary closest to `naive_end` within the window
/// `(start, naive_end]`, preferring one that keeps the chunk at least half
/// of `target_size` wide.
fn best_boundary(bounds: &[usize], start: usize, naive_end: usize) -> Option<usize> {
    let min_acceptable = start + (naive_end.saturating_sub(start)) / 2;
    bounds
        .iter()
        .copied()
        .filter(|&b| b > start && b <= naive_end && b >= min_acceptable)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(drafts: &[ChunkDraft], overlap: usize) -> String {
        let mut out = String::new();
        for (i, draft) in drafts.iter().enumerate() {
            if i == 0 {
                out.push_str(&draft.chunk_text);
            } else {
                let take_from = draft
                    .chunk_text
                    .char_indices()
                    .nth(overlap.min(draft.chunk_text.chars().count()))
                    .map_or(draft.chunk_text.len(), |(i, _)| i);
                out.push_str(&draft.chunk_text[take_from..]);
            }
        }
        out
    }

    #[test]
    fn empty_input_yields_empty_sequence() {
        assert!(chunk("", ChunkOptions::default()).is_empty());
    }

    #[test]
    fn short_input_yields_single_chunk() {
        let drafts = chunk("hello world", ChunkOptions::default());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].chunk_text, "hello world");
        assert_eq!(drafts[0].chunk_index, 0);
    }

    #[test]
    fn adjacent_chunks_share_at_most_overlap_chars() {
        let text = "Sentence one is here. Sentence two follows. Sentence three arrives. ".repeat(20);
        let options = ChunkOptions {
            target_size: 100,
            overlap: 20,
        };
        let drafts = chunk(&text, options);
        assert!(drafts.len() > 1);
        for window in drafts.windows(2) {
            let a = &window[0].chunk_text;
            let b = &window[1].chunk_text;
            let max_shared = a.chars().count().min(b.chars().count()).min(options.overlap + 1);
            let mut shared = 0;
            for k in 1..=max_shared {
                let a_suffix: String = a.chars().rev().take(k).collect::<Vec<_>>().into_iter().rev().collect();
                let b_prefix: String = b.chars().take(k).collect();
                if a_suffix == b_prefix {
                    shared = k;
                }
            }
            assert!(shared <= options.overlap);
        }
    }

    #[test]
    fn chunk_indices_are_sequential() {
        let text = "a ".repeat(2000);
        let drafts = chunk(&text, ChunkOptions::default());
        for (i, draft) in drafts.iter().enumerate() {
            assert_eq!(draft.chunk_index, i);
        }
    }

    #[test]
    fn non_overlapping_prefixes_reconstruct_input() {
        let text = "First. Second. Third. Fourth. Fifth. ".repeat(50);
        let options = ChunkOptions {
            target_size: 80,
            overlap: 15,
        };
        let drafts = chunk(&text, options);
        let rebuilt = reconstruct(&drafts, options.overlap);
        assert_eq!(rebuilt, text);
    }
}
