//! Page-level text extraction from PDF files.
//!
//! [`PdfReader`] loads a document with `lopdf` and extracts each page
//! separately so rules can be scoped to pages. When `lopdf` cannot parse
//! the file, `pdf-extract` is tried on the same bytes; its output is split
//! on form feeds. A failure of both is an [`DocumentError`] and the caller
//! skips the document. Nothing is kept open after [`DocumentReader::open`]
//! returns.

use std::panic;
use std::path::Path;

use thiserror::Error;

use crate::models::PageText;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("cannot parse document: {0}")]
    Unreadable(String),
    #[error("document is encrypted")]
    Encrypted,
    #[error("document has no pages")]
    NoPages,
    #[error("file is {size} bytes, above the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opens one document and yields its pages in order.
pub trait DocumentReader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Vec<PageText>, DocumentError>;
}

pub struct PdfReader {
    max_file_bytes: u64,
}

impl PdfReader {
    pub fn new(max_file_bytes: u64) -> Self {
        Self { max_file_bytes }
    }
}

impl DocumentReader for PdfReader {
    fn open(&self, path: &Path) -> Result<Vec<PageText>, DocumentError> {
        let size = std::fs::metadata(path)?.len();
        if size > self.max_file_bytes {
            return Err(DocumentError::TooLarge {
                size,
                limit: self.max_file_bytes,
            });
        }
        let bytes = std::fs::read(path)?;
        read_pdf_bytes(&bytes)
    }
}

/// Extracts pages from an in-memory PDF.
pub fn read_pdf_bytes(bytes: &[u8]) -> Result<Vec<PageText>, DocumentError> {
    match lopdf::Document::load_mem(bytes) {
        Ok(doc) => read_with_lopdf(&doc, bytes),
        Err(e) => {
            log::debug!("lopdf failed ({}), trying pdf-extract", e);
            read_with_pdf_extract(bytes).map_err(|fallback| {
                DocumentError::Unreadable(format!("{}; fallback: {}", e, fallback))
            })
        }
    }
}

fn read_with_lopdf(doc: &lopdf::Document, bytes: &[u8]) -> Result<Vec<PageText>, DocumentError> {
    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return Err(DocumentError::NoPages);
    }

    let mut pages = Vec::with_capacity(page_numbers.len());
    let mut failed = 0usize;
    for (index, number) in page_numbers.iter().enumerate() {
        let text = match doc.extract_text(&[*number]) {
            Ok(text) => text,
            Err(e) => {
                log::debug!("page {}: lopdf text extraction failed: {}", number, e);
                failed += 1;
                String::new()
            }
        };
        pages.push(PageText::new(index, text));
    }

    if failed == pages.len() {
        if doc.is_encrypted() {
            return Err(DocumentError::Encrypted);
        }
        // Every page failed under lopdf; pdf-extract handles more font encodings.
        return read_with_pdf_extract(bytes).map_err(DocumentError::Unreadable);
    }
    Ok(pages)
}

fn read_with_pdf_extract(bytes: &[u8]) -> Result<Vec<PageText>, String> {
    // pdf-extract panics on some malformed inputs.
    let result = panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| "pdf-extract panicked".to_string())?;
    let text = result.map_err(|e| e.to_string())?;

    let pages: Vec<PageText> = text
        .split('\u{c}')
        .enumerate()
        .map(|(i, t)| PageText::new(i, t))
        .collect();
    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err("no text in document".to_string());
    }
    Ok(pages)
}
