// src/docx/merge.rs

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, warn};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

use super::write::PAGE_BREAK_XML;
use super::{read_document, read_document_xml, write_document, Block, DOCUMENT_XML};

/// Which merge tier produced the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Every chunk's body appended to the first chunk's package.
    Complete,
    /// Tables and paragraphs re-created cell-by-cell in a fresh document.
    Rebuilt,
    /// Only the first chunk survived.
    FirstChunkOnly,
}

impl MergeOutcome {
    pub fn is_degraded(&self) -> bool {
        *self == MergeOutcome::FirstChunkOnly
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub outcome: MergeOutcome,
    pub chunks: usize,
    /// Tables found in the merged document.
    pub tables: usize,
    /// Sum of the per-chunk table counts.
    pub expected_tables: usize,
}

/// Merge chunk DOCX files, already in page order, into `out`.
///
/// Falls back to rebuilding the document from its tables when the package
/// splice fails, and to copying the first chunk when that fails too.
#[tracing::instrument(level = "info", skip(chunks, out), fields(out = %out.display(), chunks = chunks.len()))]
pub fn merge_chunks(chunks: &[PathBuf], out: &Path) -> Result<MergeReport> {
    let Some(first) = chunks.first() else {
        bail!("no chunks to merge into {:?}", out);
    };

    let expected_tables: usize = chunks
        .iter()
        .map(|p| match read_document(p) {
            Ok(doc) => doc.table_count(),
            Err(e) => {
                warn!(chunk = %p.display(), "could not count chunk tables: {:#}", e);
                0
            }
        })
        .sum();

    let report = |outcome: MergeOutcome| -> Result<MergeReport> {
        let tables = read_document(out)?.table_count();
        if tables != expected_tables && outcome != MergeOutcome::FirstChunkOnly {
            warn!(tables, expected_tables, "merged table count differs from chunk total");
        }
        Ok(MergeReport {
            outcome,
            chunks: chunks.len(),
            tables,
            expected_tables,
        })
    };

    match splice_packages(chunks, out).and_then(|_| report(MergeOutcome::Complete)) {
        Ok(r) => {
            info!(tables = r.tables, "combined {} chunks", chunks.len());
            return Ok(r);
        }
        Err(e) => error!("chunk combination failed: {:#}", e),
    }

    match rebuild(chunks, out).and_then(|_| report(MergeOutcome::Rebuilt)) {
        Ok(r) => {
            warn!(tables = r.tables, "rebuilt merged document from chunk tables");
            return Ok(r);
        }
        Err(e) => error!("rebuild fallback failed: {:#}", e),
    }

    fs::copy(first, out).with_context(|| format!("copying {:?} -> {:?}", first, out))?;
    warn!(chunk = %first.display(), "using first chunk as merged output");
    report(MergeOutcome::FirstChunkOnly)
}

/// Byte range of the inner XML of `<w:body>`.
fn body_span(xml: &str) -> Result<(usize, usize)> {
    let open = xml
        .find("<w:body")
        .ok_or_else(|| anyhow!("document has no <w:body>"))?;
    let start = open
        + xml[open..]
            .find('>')
            .ok_or_else(|| anyhow!("unterminated <w:body>"))?
        + 1;
    let end = xml
        .rfind("</w:body>")
        .ok_or_else(|| anyhow!("document has no </w:body>"))?;
    if end < start {
        bail!("malformed <w:body>");
    }
    Ok((start, end))
}

/// Offset of the body-level `<w:sectPr>`, if the body ends with one.
fn section_props_at(inner: &str) -> Option<usize> {
    let pos = inner.rfind("<w:sectPr")?;
    let last_block = inner
        .rfind("</w:p>")
        .into_iter()
        .chain(inner.rfind("</w:tbl>"))
        .max()
        .unwrap_or(0);
    (pos >= last_block).then_some(pos)
}

/// Body content of a chunk without its section properties.
fn chunk_body(xml: &str) -> Result<&str> {
    let (start, end) = body_span(xml)?;
    let inner = &xml[start..end];
    Ok(match section_props_at(inner) {
        Some(pos) => &inner[..pos],
        None => inner,
    })
}

fn splice_document_xml(base: &str, others: &[String]) -> Result<String> {
    let (start, end) = body_span(base)?;
    let insert_at = start + section_props_at(&base[start..end]).unwrap_or(end - start);

    let mut appended = String::new();
    for xml in others {
        appended.push_str(PAGE_BREAK_XML);
        appended.push_str(chunk_body(xml)?);
    }

    let mut merged = String::with_capacity(base.len() + appended.len());
    merged.push_str(&base[..insert_at]);
    merged.push_str(&appended);
    merged.push_str(&base[insert_at..]);
    Ok(merged)
}

/// Copy the first chunk's package, swapping in a document body that carries
/// every chunk's content.
fn splice_packages(chunks: &[PathBuf], out: &Path) -> Result<()> {
    let base_xml = read_document_xml(&chunks[0])?;
    let others = chunks[1..]
        .iter()
        .map(|p| read_document_xml(p))
        .collect::<Result<Vec<_>>>()?;
    let merged_xml = splice_document_xml(&base_xml, &others)?;

    let base = File::open(&chunks[0]).with_context(|| format!("opening {:?}", chunks[0]))?;
    let mut archive = ZipArchive::new(base)?;
    let tmp_path = out.with_extension("docx.tmp");
    {
        let file = File::create(&tmp_path).with_context(|| format!("creating {:?}", tmp_path))?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let name = entry.name().to_string();
            if entry.is_dir() {
                continue;
            }
            zip.start_file(name.as_str(), options)?;
            if name == DOCUMENT_XML {
                zip.write_all(merged_xml.as_bytes())?;
            } else {
                let mut buf = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut buf)?;
                zip.write_all(&buf)?;
            }
        }
        zip.finish().context("finishing merged package")?;
    }
    fs::rename(&tmp_path, out).with_context(|| format!("renaming {:?} -> {:?}", tmp_path, out))?;
    debug!(out = %out.display(), "spliced {} chunk bodies", chunks.len());
    Ok(())
}

/// Re-create every chunk's paragraphs and tables in a fresh document.
fn rebuild(chunks: &[PathBuf], out: &Path) -> Result<()> {
    let mut blocks = Vec::new();
    for (i, path) in chunks.iter().enumerate() {
        let doc = read_document(path)?;
        if i > 0 {
            blocks.push(Block::PageBreak);
        }
        blocks.extend(doc.blocks);
    }
    write_document(out, &blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::{write_document, Table};
    use tempfile::tempdir;

    fn chunk(dir: &Path, name: &str, tables: &[&str]) -> Result<PathBuf> {
        let path = dir.join(name);
        let mut blocks = vec![Block::Paragraph(format!("{} heading", name))];
        for t in tables {
            blocks.push(Block::Table(Table::new(vec![vec![t.to_string()]])));
        }
        write_document(&path, &blocks)?;
        Ok(path)
    }

    fn table_labels(path: &Path) -> Result<Vec<String>> {
        Ok(read_document(path)?
            .tables()
            .map(|t| t.rows[0][0].clone())
            .collect())
    }

    #[test]
    fn merge_keeps_input_order_and_counts() -> Result<()> {
        let dir = tempdir()?;
        let a = chunk(dir.path(), "a.docx", &["a1", "a2", "a3", "a4"])?;
        let b = chunk(dir.path(), "b.docx", &["b1", "b2"])?;
        let c = chunk(dir.path(), "c.docx", &["c1", "c2", "c3"])?;
        let out = dir.path().join("merged.docx");

        let report = merge_chunks(&[a, b, c], &out)?;
        assert_eq!(report.outcome, MergeOutcome::Complete);
        assert_eq!(report.tables, 9);
        assert_eq!(report.expected_tables, 9);
        assert_eq!(
            table_labels(&out)?,
            vec!["a1", "a2", "a3", "a4", "b1", "b2", "c1", "c2", "c3"]
        );

        let doc = read_document(&out)?;
        let breaks = doc
            .blocks
            .iter()
            .filter(|b| **b == Block::PageBreak)
            .count();
        assert_eq!(breaks, 2);
        Ok(())
    }

    #[test]
    fn single_chunk_merges_to_itself() -> Result<()> {
        let dir = tempdir()?;
        let a = chunk(dir.path(), "a.docx", &["a1"])?;
        let out = dir.path().join("merged.docx");
        let report = merge_chunks(&[a], &out)?;
        assert_eq!(report.outcome, MergeOutcome::Complete);
        assert_eq!(table_labels(&out)?, vec!["a1"]);
        Ok(())
    }

    #[test]
    fn unreadable_later_chunk_degrades_to_first() -> Result<()> {
        let dir = tempdir()?;
        let a = chunk(dir.path(), "a.docx", &["a1", "a2"])?;
        let broken = dir.path().join("broken.docx");
        fs::write(&broken, b"definitely not a zip")?;
        let out = dir.path().join("merged.docx");

        let report = merge_chunks(&[a, broken], &out)?;
        assert_eq!(report.outcome, MergeOutcome::FirstChunkOnly);
        assert!(report.outcome.is_degraded());
        assert_eq!(table_labels(&out)?, vec!["a1", "a2"]);
        Ok(())
    }

    /// A chunk package whose body uses the `x:` prefix for the main namespace.
    fn prefixed_chunk(dir: &Path, name: &str, tables: &[&str]) -> Result<PathBuf> {
        let mut body = String::new();
        for t in tables {
            body.push_str(&format!(
                "<x:tbl><x:tr><x:tc><x:p><x:r><x:t>{}</x:t></x:r></x:p></x:tc></x:tr></x:tbl>",
                t
            ));
        }
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<x:document xmlns:x="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><x:body>{}</x:body></x:document>"#,
            body
        );
        let path = dir.join(name);
        let mut zip = ZipWriter::new(File::create(&path)?);
        zip.start_file(DOCUMENT_XML, SimpleFileOptions::default())?;
        zip.write_all(xml.as_bytes())?;
        zip.finish()?;
        Ok(path)
    }

    #[test]
    fn foreign_prefix_falls_back_to_rebuild() -> Result<()> {
        let dir = tempdir()?;
        let a = chunk(dir.path(), "a.docx", &["a1", "a2"])?;
        let b = prefixed_chunk(dir.path(), "b.docx", &["b1", "b2", "b3"])?;
        let out = dir.path().join("merged.docx");

        let report = merge_chunks(&[a, b], &out)?;
        assert_eq!(report.outcome, MergeOutcome::Rebuilt);
        assert!(!report.outcome.is_degraded());
        assert_eq!(report.expected_tables, 5);
        assert_eq!(report.tables, report.expected_tables);
        assert_eq!(table_labels(&out)?, vec!["a1", "a2", "b1", "b2", "b3"]);
        Ok(())
    }

    #[test]
    fn no_chunks_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(merge_chunks(&[], &dir.path().join("x.docx")).is_err());
    }

    #[test]
    fn body_level_section_props_are_dropped_from_appended_chunks() -> Result<()> {
        let base = r#"<w:document><w:body><w:p/><w:sectPr><w:pgSz/></w:sectPr></w:body></w:document>"#;
        let other = r#"<w:document><w:body><w:tbl></w:tbl><w:sectPr/></w:body></w:document>"#
            .to_string();
        let merged = splice_document_xml(base, &[other])?;
        assert_eq!(merged.matches("<w:sectPr").count(), 1);
        assert!(merged.find("<w:tbl>").unwrap() < merged.find("<w:sectPr").unwrap());
        Ok(())
    }
}
