// src/pdf/mod.rs

use anyhow::{Context, Result};
use lopdf::Document;
use std::path::Path;
use tracing::warn;

pub mod scan;

/// Number of pages in the PDF at `path`.
pub fn page_count(path: &Path) -> Result<usize> {
    let doc = Document::load(path).with_context(|| format!("opening PDF {:?}", path))?;
    Ok(doc.get_pages().len())
}

/// Like [`page_count`], but logs and returns `fallback` when the PDF can't be read.
pub fn page_count_or(path: &Path, fallback: usize) -> usize {
    match page_count(path) {
        Ok(n) => n,
        Err(e) => {
            warn!(pdf = %path.display(), fallback, "could not count pages: {:#}", e);
            fallback
        }
    }
}

/// Plain text of every page, in page order. Pages whose text can't be
/// extracted come back empty.
pub fn page_texts(path: &Path) -> Result<Vec<String>> {
    let doc = Document::load(path).with_context(|| format!("opening PDF {:?}", path))?;
    let texts = doc
        .get_pages()
        .keys()
        .map(|&num| {
            doc.extract_text(&[num]).unwrap_or_else(|e| {
                warn!(pdf = %path.display(), page = num, "text extraction failed: {}", e);
                String::new()
            })
        })
        .collect();
    Ok(texts)
}
