//! Document splitting.
//!
//! Turns a source file into ordered [`Chunk`]s. PDFs are split page by
//! page so every chunk carries the page it came from.

use std::collections::VecDeque;
use std::path::Path;

use tracing::{debug, warn};

use maid_chunk_store::{Chunk, ChunkMetadata};

use crate::config::SplitterConfig;
use crate::error::{Result, RetrievalError};

/// File extensions the splitter can read.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ".", " "];

/// Check if the file has a supported extension.
pub fn is_supported(path: &Path) -> bool {
    extension(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Anything that can turn a document into chunks.
pub trait DocumentSplitter {
    /// Split a document into chunks in reading order.
    fn split(&self, path: &Path) -> Result<Vec<Chunk>>;
}

/// Recursive character splitter.
///
/// Splits on the first separator that occurs in the text, recursing into
/// pieces that are still too long with the remaining separators and
/// finally falling back to single characters. Neighbouring pieces are then
/// merged back together up to `chunk_size` characters, repeating up to
/// `chunk_overlap` characters of the previous chunk.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the separator list.
    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    /// Split text into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| !sep.is_empty() && text.contains(sep.as_str()));

        let (pieces, remaining): (Vec<&str>, &[String]) = match position {
            Some(i) => (
                text.split_inclusive(separators[i].as_str()).collect(),
                &separators[i + 1..],
            ),
            None => (
                text.char_indices()
                    .map(|(i, c)| &text[i..i + c.len_utf8()])
                    .collect(),
                &[],
            ),
        };

        let mut chunks = Vec::new();
        let mut short: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) <= self.chunk_size {
                short.push(piece);
                continue;
            }

            if !short.is_empty() {
                chunks.extend(self.merge(&short));
                short.clear();
            }
            chunks.extend(self.split_with(piece, remaining));
        }
        if !short.is_empty() {
            chunks.extend(self.merge(&short));
        }
        chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &window);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(dropped) => total -= char_len(dropped),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }
        push_trimmed(&mut chunks, &window);
        chunks
    }
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        let config = SplitterConfig::default();
        Self::new(config.chunk_size, config.chunk_overlap)
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn push_trimmed(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Splits files by extension: PDFs page by page, text and markdown whole.
#[derive(Debug, Clone, Default)]
pub struct FileSplitter {
    text: RecursiveSplitter,
}

impl FileSplitter {
    pub fn new(config: &SplitterConfig) -> Self {
        Self {
            text: RecursiveSplitter::new(config.chunk_size, config.chunk_overlap),
        }
    }

    /// Text of each page with its 1-based number, if paginated.
    fn pages(&self, path: &Path) -> Result<Vec<(Option<u32>, String)>> {
        match extension(path).as_deref() {
            Some("pdf") => pdf_pages(path),
            Some("txt" | "md") => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    RetrievalError::Document(format!("cannot read {}: {e}", path.display()))
                })?;
                Ok(vec![(None, text)])
            }
            _ => Err(RetrievalError::Validation(format!(
                "unsupported document type: {}",
                path.display()
            ))),
        }
    }
}

impl DocumentSplitter for FileSplitter {
    fn split(&self, path: &Path) -> Result<Vec<Chunk>> {
        let pages = self.pages(path)?;
        let total_pages = pages.len();
        let source_path = path.to_string_lossy().into_owned();

        let mut chunks = Vec::new();
        for (page, text) in pages {
            for piece in self.text.split_text(&text) {
                let mut metadata = ChunkMetadata::new(source_path.clone());
                if let Some(page) = page {
                    metadata = metadata
                        .with_page(page)
                        .with_extra("total_pages", total_pages);
                }
                chunks.push(Chunk::new(piece, metadata));
            }
        }

        if chunks.is_empty() {
            warn!("No text extracted from {}", path.display());
        } else {
            debug!("Split {} into {} chunks", path.display(), chunks.len());
        }
        Ok(chunks)
    }
}

fn pdf_pages(path: &Path) -> Result<Vec<(Option<u32>, String)>> {
    let document = lopdf::Document::load(path)
        .map_err(|e| RetrievalError::Document(format!("cannot open {}: {e}", path.display())))?;

    let mut pages = Vec::new();
    for page_number in document.get_pages().into_keys() {
        let text = document.extract_text(&[page_number]).map_err(|e| {
            RetrievalError::Document(format!(
                "cannot extract page {page_number} of {}: {e}",
                path.display()
            ))
        })?;
        pages.push((Some(page_number), text));
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_short_text_is_one_chunk() {
        let splitter = RecursiveSplitter::new(200, 20);
        assert_eq!(
            splitter.split_text("  Alpha method description.  "),
            vec!["Alpha method description."]
        );
        assert!(splitter.split_text(" \n\n ").is_empty());
    }

    #[test]
    fn test_paragraphs_split_before_sentences() {
        let splitter = RecursiveSplitter::new(30, 0);
        let chunks = splitter.split_text("First paragraph here.\n\nSecond paragraph here.");
        assert_eq!(chunks, vec!["First paragraph here.", "Second paragraph here."]);
    }

    #[test]
    fn test_chunks_respect_size_and_keep_text() {
        let splitter = RecursiveSplitter::new(40, 10);
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(10);
        let chunks = splitter.split_text(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 40, "chunk too long: {chunk:?}");
            assert!(!chunk.is_empty());
        }
        assert!(chunks.iter().all(|c| text.contains(c.as_str())));
    }

    #[test]
    fn test_overlap_repeats_tail_of_previous_chunk() {
        let splitter = RecursiveSplitter::new(12, 6);
        let chunks = splitter.split_text("aa bb cc dd ee ff gg");
        assert_eq!(chunks, vec!["aa bb cc dd", "cc dd ee ff", "ee ff gg"]);
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let splitter = RecursiveSplitter::new(10, 0);
        let chunks = splitter.split_text(&"x".repeat(25));
        assert_eq!(chunks, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }

    #[test]
    fn test_custom_separators() {
        let splitter = RecursiveSplitter::new(8, 0).with_separators(vec![";".to_string()]);
        assert_eq!(
            splitter.split_text("one two;three;four five"),
            vec!["one two;", "three;", "four fiv", "e"]
        );
    }

    #[test]
    fn test_multibyte_text() {
        let splitter = RecursiveSplitter::new(4, 0);
        let chunks = splitter.split_text("ééééé");
        assert_eq!(chunks, vec!["éééé", "é"]);
    }

    #[test]
    fn test_file_splitter_text_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.md");
        std::fs::write(&path, "Alpha method description.\n\nBeta results table.").unwrap();

        let splitter = FileSplitter::new(&SplitterConfig {
            chunk_size: 30,
            chunk_overlap: 0,
        });
        let chunks = splitter.split(&path).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Alpha method description.");
        assert_eq!(chunks[0].metadata.source_path, path.to_string_lossy());
        assert_eq!(chunks[0].metadata.page, None);
    }

    #[test]
    fn test_file_splitter_rejects_unknown_and_broken_files() {
        let temp_dir = TempDir::new().unwrap();
        let splitter = FileSplitter::default();

        let docx = temp_dir.path().join("a.docx");
        std::fs::write(&docx, "x").unwrap();
        assert!(matches!(
            splitter.split(&docx),
            Err(RetrievalError::Validation(_))
        ));

        let pdf = temp_dir.path().join("broken.pdf");
        std::fs::write(&pdf, "not a pdf").unwrap();
        assert!(matches!(
            splitter.split(&pdf),
            Err(RetrievalError::Document(_))
        ));
    }

    #[test]
    fn test_is_supported() {
        assert!(is_supported(Path::new("a.pdf")));
        assert!(is_supported(Path::new("A.PDF")));
        assert!(is_supported(Path::new("notes.md")));
        assert!(!is_supported(Path::new("a.docx")));
        assert!(!is_supported(Path::new("README")));
    }
}
