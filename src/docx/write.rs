// src/docx/write.rs
//
// Minimal WordprocessingML package writer: enough for Word, LibreOffice and
// our own reader to open the result.

use anyhow::{Context, Result};
use quick_xml::escape::escape;
use std::{
    fs::{self, File},
    io::Write,
    path::Path,
};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use super::{Block, Table, DOCUMENT_XML};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#;

const DOCUMENT_TAIL: &str = r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/></w:sectPr></w:body></w:document>"#;

pub(crate) const PAGE_BREAK_XML: &str = r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#;

fn paragraph_xml(out: &mut String, text: &str) {
    out.push_str("<w:p>");
    if !text.is_empty() {
        out.push_str(r#"<w:r><w:t xml:space="preserve">"#);
        out.push_str(&escape(text));
        out.push_str("</w:t></w:r>");
    }
    out.push_str("</w:p>");
}

fn table_xml(out: &mut String, table: &Table) {
    out.push_str(r#"<w:tbl><w:tblPr><w:tblW w:w="0" w:type="auto"/></w:tblPr>"#);
    for row in &table.rows {
        out.push_str("<w:tr>");
        for cell in row {
            out.push_str("<w:tc>");
            // every cell needs at least one paragraph
            let mut lines = cell.split('\n').peekable();
            if lines.peek().is_none() {
                paragraph_xml(out, "");
            }
            for line in lines {
                paragraph_xml(out, line);
            }
            out.push_str("</w:tc>");
        }
        out.push_str("</w:tr>");
    }
    out.push_str("</w:tbl>");
}

/// Serialize `blocks` into the inner XML of `<w:body>`.
pub(crate) fn body_xml(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        match block {
            Block::Paragraph(text) => paragraph_xml(&mut out, text),
            Block::Table(table) => table_xml(&mut out, table),
            Block::PageBreak => out.push_str(PAGE_BREAK_XML),
        }
    }
    out
}

pub(crate) fn document_xml(blocks: &[Block]) -> String {
    format!("{}{}{}", DOCUMENT_HEAD, body_xml(blocks), DOCUMENT_TAIL)
}

/// Write `blocks` as a fresh DOCX at `path`, via a temp file renamed into place.
pub fn write_document(path: &Path, blocks: &[Block]) -> Result<()> {
    let tmp_path = path.with_extension("docx.tmp");
    {
        let file =
            File::create(&tmp_path).with_context(|| format!("creating {:?}", tmp_path))?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(CONTENT_TYPES.as_bytes())?;
        zip.start_file("_rels/.rels", options)?;
        zip.write_all(ROOT_RELS.as_bytes())?;
        zip.start_file(DOCUMENT_XML, options)?;
        zip.write_all(document_xml(blocks).as_bytes())?;
        zip.finish().context("finishing DOCX package")?;
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {:?} -> {:?}", tmp_path, path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::read_document;
    use tempfile::tempdir;

    #[test]
    fn written_document_reads_back() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("out.docx");
        let blocks = vec![
            Block::Paragraph("Title & <subtitle>".into()),
            Block::Table(Table::new(vec![
                vec!["区分".into(), "金額".into()],
                vec!["自己取引計".into(), "two\nlines".into()],
            ])),
            Block::PageBreak,
            Block::Table(Table::new(vec![vec!["x".into()]])),
        ];
        write_document(&path, &blocks)?;

        let doc = read_document(&path)?;
        assert_eq!(doc.blocks, blocks);
        assert!(!dir.path().join("out.docx.tmp").exists());
        Ok(())
    }
}
