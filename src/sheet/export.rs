// src/sheet/export.rs

use anyhow::{bail, Context, Result};
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet};
use std::path::Path;
use tracing::{debug, info};

use super::titles::{PageHeading, TableTitles, MAIN_TITLE};
use super::{page_for_index, pages_for_tables, sheet_name, TableCategory, TABLE_CATEGORIES};
use crate::docx::Table;

const MAX_COLUMN_WIDTH: usize = 30;
const SUMMARY_PAGES_LISTED: usize = 5;

/// Where the metadata goes and where the grid starts.
#[derive(Debug, Clone)]
pub enum Layout {
    /// Source / page / table / row / column metadata; grid from row 7.
    Standard,
    /// Title, subtitle and table title; grid from row 5. One entry per table.
    Titled(Vec<TableTitles>),
    /// Standard metadata, then the table's own title and subtitle at rows
    /// 7 and 8; grid from row 10. One entry per table.
    StandardTitled(Vec<PageHeading>),
}

impl Layout {
    /// 0-based row of the first grid row.
    pub fn grid_row(&self) -> u32 {
        match self {
            Layout::Standard => 6,
            Layout::Titled(_) => 4,
            Layout::StandardTitled(_) => 9,
        }
    }
}

/// Facts shown on the leading `Summary` sheet.
#[derive(Debug, Clone, Default)]
pub struct SummaryInfo {
    pub heading: String,
    pub source_file: String,
    pub source_type: String,
    pub chunk_size: Option<usize>,
    pub workers: Option<usize>,
    pub pages_converted: Option<usize>,
    pub method: String,
}

fn text_width(s: &str) -> usize {
    // CJK glyphs take roughly two columns
    s.chars().map(|c| if c.is_ascii() { 1 } else { 2 }).sum()
}

fn write_summary(ws: &mut Worksheet, info: &SummaryInfo, total_tables: usize) -> Result<()> {
    let heading = Format::new().set_bold().set_font_size(16);
    let bold = Format::new().set_bold();

    ws.set_name("Summary")?;
    if !info.heading.is_empty() {
        ws.write_string_with_format(0, 0, info.heading.as_str(), &heading)?;
    }

    let total_pages = pages_for_tables(total_tables);
    let mut lines = vec![
        format!("Source Type: {}", info.source_type),
        format!("Source File: {}", info.source_file),
        format!("Total Tables: {}", total_tables),
        format!("Total Pages: {}", total_pages),
        format!("Tables per Page: {}", TABLE_CATEGORIES.len()),
    ];
    if let Some(n) = info.pages_converted {
        lines.push(format!("Pages Converted: {}", n));
    }
    if let Some(n) = info.chunk_size {
        lines.push(format!("Chunk Size: {} pages", n));
    }
    if let Some(n) = info.workers {
        lines.push(format!("Max Workers: {}", n));
    }
    lines.push(format!("Processing Method: {}", info.method));

    let mut row = 2u32;
    for line in &lines {
        ws.write_string(row, 0, line.as_str())?;
        row += 1;
    }

    row += 1;
    ws.write_string_with_format(row, 0, "Sheet Structure:", &bold)?;
    row += 1;
    for page in 1..=total_pages.min(SUMMARY_PAGES_LISTED) {
        for category in TABLE_CATEGORIES {
            let name = super::sheet_name_for(page, category);
            ws.write_string(row, 0, format!("├── {}", name).as_str())?;
            row += 1;
        }
    }
    if total_pages > SUMMARY_PAGES_LISTED {
        ws.write_string(
            row,
            0,
            format!("... and {} more pages", total_pages - SUMMARY_PAGES_LISTED).as_str(),
        )?;
    }
    ws.set_column_width(0, 60)?;
    Ok(())
}

fn highlight() -> Format {
    Format::new()
        .set_bold()
        .set_font_size(12)
        .set_background_color(Color::RGB(0xE6F3FF))
}

fn write_standard_lines(
    ws: &mut Worksheet,
    index: usize,
    source_file: &str,
    table: &Table,
) -> Result<()> {
    let bold = Format::new().set_bold();
    let category = TableCategory::for_index(index);
    let lines = [
        format!("Source: {}", source_file),
        format!("Page: {}", page_for_index(index)),
        format!("Table: {}", category.label()),
        format!("Rows: {}", table.row_count()),
        format!("Columns: {}", table.column_count()),
    ];
    for (row, line) in lines.iter().enumerate() {
        ws.write_string_with_format(row as u32, 0, line.as_str(), &bold)?;
    }
    Ok(())
}

fn write_metadata(
    ws: &mut Worksheet,
    layout: &Layout,
    index: usize,
    source_file: &str,
    table: &Table,
) -> Result<()> {
    let bold = Format::new().set_bold();
    match layout {
        Layout::Standard => write_standard_lines(ws, index, source_file, table)?,
        Layout::Titled(titles) => {
            let missing = TableTitles {
                subtitle: "Subtitle Not Found".into(),
                table_title: "Table Title Not Found".into(),
            };
            let t = titles.get(index).unwrap_or(&missing);
            ws.write_string_with_format(
                0,
                0,
                format!("Title: {}", MAIN_TITLE).as_str(),
                &highlight(),
            )?;
            ws.write_string_with_format(1, 0, format!("Subtitle: {}", t.subtitle).as_str(), &bold)?;
            ws.write_string_with_format(
                2,
                0,
                format!("Table Title: {}", t.table_title).as_str(),
                &bold,
            )?;
        }
        Layout::StandardTitled(headings) => {
            write_standard_lines(ws, index, source_file, table)?;
            let heading = headings
                .get(index)
                .cloned()
                .unwrap_or_else(|| PageHeading::fallback(page_for_index(index)));
            let fmt = highlight();
            ws.write_string_with_format(6, 0, format!("Title: {}", heading.title).as_str(), &fmt)?;
            ws.write_string_with_format(
                7,
                0,
                format!("Subtitle: {}", heading.subtitle).as_str(),
                &fmt,
            )?;
        }
    }
    Ok(())
}

fn write_grid(ws: &mut Worksheet, first_row: u32, table: &Table) -> Result<()> {
    let header = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xD3D3D3));
    let mut widths: Vec<usize> = Vec::new();

    for (r, row) in table.rows.iter().enumerate() {
        for (c, text) in row.iter().enumerate() {
            if widths.len() <= c {
                widths.resize(c + 1, 0);
            }
            if text.is_empty() {
                continue;
            }
            let (row_idx, col_idx) = (first_row + r as u32, c as u16);
            if r == 0 {
                ws.write_string_with_format(row_idx, col_idx, text.as_str(), &header)?;
            } else {
                ws.write_string(row_idx, col_idx, text.as_str())?;
            }
            widths[c] = widths[c].max(text_width(text));
        }
    }
    for (c, w) in widths.into_iter().enumerate() {
        ws.set_column_width(c as u16, ((w + 2).min(MAX_COLUMN_WIDTH)) as f64)?;
    }
    Ok(())
}

/// Write a `Summary` sheet and one sheet per table to `out`. Returns the
/// number of table sheets written.
#[tracing::instrument(level = "info", skip_all, fields(out = %out.display(), tables = tables.len()))]
pub fn export_tables(
    tables: &[Table],
    layout: &Layout,
    summary: &SummaryInfo,
    out: &Path,
) -> Result<usize> {
    if tables.is_empty() {
        bail!("no tables to export");
    }

    let mut workbook = Workbook::new();
    write_summary(workbook.add_worksheet(), summary, tables.len())?;

    for (index, table) in tables.iter().enumerate() {
        let ws = workbook.add_worksheet();
        ws.set_name(sheet_name(index))?;
        write_metadata(ws, layout, index, &summary.source_file, table)?;
        write_grid(ws, layout.grid_row(), table)?;

        if (index + 1) % 20 == 0 {
            debug!("processed {}/{} tables", index + 1, tables.len());
        }
    }

    workbook
        .save(out)
        .with_context(|| format!("saving workbook {:?}", out))?;
    info!("saved {} tables", tables.len());
    Ok(tables.len())
}
