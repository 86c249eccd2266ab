// src/docx/mod.rs

use anyhow::{anyhow, Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;
use std::{fs::File, io::Read, path::Path};
use zip::ZipArchive;

pub mod merge;
pub mod write;

pub use merge::{merge_chunks, MergeOutcome, MergeReport};
pub use write::write_document;

pub(crate) const DOCUMENT_XML: &str = "word/document.xml";

/// A DOCX table as a grid of trimmed cell texts. Merged cells repeat their
/// text in every grid column / row they cover.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Widest row; zero for an empty table.
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Top-level body content, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(String),
    Table(Table),
    PageBreak,
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Table(t) => Some(t),
            _ => None,
        })
    }

    pub fn table_count(&self) -> usize {
        self.tables().count()
    }

    /// Non-empty paragraph texts appearing before table `index`, nearest last.
    pub fn paragraphs_before_table(&self, index: usize) -> Vec<&str> {
        let mut seen = 0;
        let mut out = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Table(_) => {
                    if seen == index {
                        break;
                    }
                    seen += 1;
                }
                Block::Paragraph(text) if !text.trim().is_empty() => out.push(text.as_str()),
                _ => {}
            }
        }
        out
    }
}

/// Read `word/document.xml` from a DOCX package.
pub(crate) fn read_document_xml(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("opening DOCX {:?}", path))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("reading DOCX package {:?}", path))?;
    let mut entry = archive
        .by_name(DOCUMENT_XML)
        .with_context(|| format!("{} missing from {:?}", DOCUMENT_XML, path))?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut buf)
        .with_context(|| format!("reading {} from {:?}", DOCUMENT_XML, path))?;
    Ok(String::from_utf8_lossy(&buf).to_string())
}

/// Open a DOCX and return its paragraphs and top-level tables.
#[tracing::instrument(level = "debug", skip(path), fields(path = %path.display()))]
pub fn read_document(path: &Path) -> Result<Document> {
    let xml = read_document_xml(path)?;
    parse_document_xml(&xml).with_context(|| format!("parsing {:?}", path))
}

/// Unescaped value of the attribute named `key` (any prefix).
fn attr(reader: &XmlReader<&[u8]>, e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| {
            a.decode_and_unescape_value(reader)
                .ok()
                .map(|v| v.to_string())
        })
}

#[derive(Default)]
struct CellState {
    text: String,
    span: usize,
    continues: bool,
}

#[derive(Default)]
struct TableState {
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: Option<CellState>,
}

impl TableState {
    fn finish_cell(&mut self) {
        let Some(cell) = self.cell.take() else {
            return;
        };
        let col = self.row.len();
        let text = if cell.continues {
            self.rows
                .last()
                .and_then(|prev| prev.get(col))
                .cloned()
                .unwrap_or_default()
        } else {
            cell.text.trim().to_string()
        };
        for _ in 0..cell.span.max(1) {
            self.row.push(text.clone());
        }
    }

    fn finish_row(&mut self) {
        self.finish_cell();
        if !self.row.is_empty() {
            self.rows.push(std::mem::take(&mut self.row));
        }
    }
}

/// Parse the WordprocessingML body. Nested tables fold their text into the
/// enclosing cell.
pub fn parse_document_xml(xml: &str) -> Result<Document> {
    let mut reader = XmlReader::from_str(xml);
    reader.trim_text(false);

    let mut blocks = Vec::new();
    let mut table: Option<TableState> = None;
    let mut depth = 0usize;
    let mut in_text = false;
    let mut para = String::new();
    let mut para_break = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"tbl" => {
                    depth += 1;
                    if depth == 1 {
                        table = Some(TableState::default());
                    }
                }
                b"tc" if depth == 1 => {
                    if let Some(t) = table.as_mut() {
                        t.finish_cell();
                        t.cell = Some(CellState {
                            span: 1,
                            ..Default::default()
                        });
                    }
                }
                b"p" => {
                    if depth == 0 {
                        para.clear();
                        para_break = false;
                    } else if let Some(cell) = table.as_mut().and_then(|t| t.cell.as_mut()) {
                        if !cell.text.is_empty() && !cell.text.ends_with('\n') {
                            cell.text.push('\n');
                        }
                    }
                }
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"gridSpan" if depth == 1 => {
                    if let Some(cell) = table.as_mut().and_then(|t| t.cell.as_mut()) {
                        cell.span = attr(&reader, e, b"val")
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(1);
                    }
                }
                b"vMerge" if depth == 1 => {
                    if let Some(cell) = table.as_mut().and_then(|t| t.cell.as_mut()) {
                        cell.continues = attr(&reader, e, b"val").as_deref() != Some("restart");
                    }
                }
                b"br" => {
                    if depth == 0 {
                        if attr(&reader, e, b"type").as_deref() == Some("page") {
                            para_break = true;
                        } else {
                            para.push('\n');
                        }
                    } else if let Some(cell) = table.as_mut().and_then(|t| t.cell.as_mut()) {
                        cell.text.push('\n');
                    }
                }
                b"tab" => {
                    if depth == 0 {
                        para.push('\t');
                    } else if let Some(cell) = table.as_mut().and_then(|t| t.cell.as_mut()) {
                        cell.text.push('\t');
                    }
                }
                b"p" if depth == 0 => blocks.push(Block::Paragraph(String::new())),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text {
                    let text = e.unescape()?;
                    if depth == 0 {
                        para.push_str(&text);
                    } else if let Some(cell) = table.as_mut().and_then(|t| t.cell.as_mut()) {
                        cell.text.push_str(&text);
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if depth == 0 => {
                    let text = std::mem::take(&mut para);
                    if para_break && text.trim().is_empty() {
                        blocks.push(Block::PageBreak);
                    } else {
                        blocks.push(Block::Paragraph(text));
                    }
                }
                b"tc" if depth == 1 => {
                    if let Some(t) = table.as_mut() {
                        t.finish_cell();
                    }
                }
                b"tr" if depth == 1 => {
                    if let Some(t) = table.as_mut() {
                        t.finish_row();
                    }
                }
                b"tbl" => {
                    if depth == 1 {
                        if let Some(mut t) = table.take() {
                            t.finish_row();
                            blocks.push(Block::Table(Table::new(t.rows)));
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(anyhow!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    err
                ))
            }
            _ => {}
        }
    }

    Ok(Document { blocks })
}
