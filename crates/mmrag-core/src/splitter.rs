//! Recursive character text splitter.
//!
//! Splits text into overlapping windows of at most `chunk_size` characters,
//! preferring the largest structural boundary available before falling back
//! to smaller ones: paragraphs (`\n\n`), lines, sentences (`. `), words, and
//! finally single characters.
//!
//! # Algorithm
//!
//! 1. Pick the first separator that occurs in the text.
//! 2. Split the text after every occurrence of it (the separator stays
//!    attached to the end of the preceding piece).
//! 3. Pieces shorter than `chunk_size` are greedily merged into windows;
//!    when a window would overflow it is emitted, and pieces are dropped
//!    from its front until at most `chunk_overlap` characters remain to
//!    seed the next window.
//! 4. Pieces that are still too long are split recursively with the
//!    remaining, finer separators.
//!
//! Lengths are counted in characters (`char`s), not bytes. Windows are
//! whitespace-trimmed and empty windows are dropped, so empty or
//! whitespace-only input yields no windows at all.
//!
//! # Example
//!
//! ```rust
//! use mmrag_core::splitter::RecursiveSplitter;
//!
//! let splitter = RecursiveSplitter::new(500, 50);
//! let text = "abcdefghi ".repeat(120);
//! assert_eq!(splitter.split(&text).len(), 3);
//! ```

use std::collections::VecDeque;

/// Separators tried in order, coarsest first. The empty separator means
/// "split into characters".
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Greedy recursive splitter with character-count windows and overlap.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    /// Create a splitter with the default separator hierarchy.
    ///
    /// `chunk_overlap` is clamped below `chunk_size`; a zero `chunk_size`
    /// is treated as 1.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into windows. Deterministic for fixed parameters.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut chosen: &str = "";
        let mut finer: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                chosen = "";
                finer = &[];
                break;
            }
            if text.contains(sep.as_str()) {
                chosen = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let pieces: Vec<&str> = if chosen.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split_inclusive(chosen)
                .filter(|p| !p.is_empty())
                .collect()
        };

        let mut windows = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                windows.extend(self.merge(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    windows.push(trimmed.to_string());
                }
            } else {
                windows.extend(self.split_recursive(piece, finer));
            }
        }
        if !fitting.is_empty() {
            windows.extend(self.merge(&fitting));
        }
        windows
    }

    /// Greedily pack pieces into windows, carrying up to `chunk_overlap`
    /// characters of trailing pieces into the next window.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut windows = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                push_window(&mut windows, &current);
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match current.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            current.push_back((piece, len));
            total += len;
        }
        push_window(&mut windows, &current);
        windows
    }
}

fn push_window(windows: &mut Vec<String>, current: &VecDeque<(&str, usize)>) {
    let joined: String = current.iter().map(|(p, _)| *p).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        windows.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
