// src/sheet/classify.rs
//
// Content checks on exported tables. Each sheet's category comes from its
// position on the page; this module reads the table text to see whether the
// content agrees, parses the trading rows and scores how complete they are.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::{fmt::Write as _, fs, path::Path};
use tracing::{debug, info, warn};

use super::{page_for_index, TableCategory};
use crate::docx::Table;

pub const QUALITY_REPORT_FILE: &str = "extraction_quality_report.txt";

/// Header rows skipped before trading rows are read.
const HEADER_ROWS: usize = 2;
/// Narrower rows cannot hold a category, a side and four figures.
const MIN_ROW_CELLS: usize = 6;
const MIN_FIGURES: usize = 4;

/// What a table of one category looks like.
struct Pattern {
    category: TableCategory,
    japanese_headers: &'static [&'static str],
    english_headers: &'static [&'static str],
    expected_categories: &'static [&'static str],
    expected_rows: usize,
}

static PATTERNS: [Pattern; 4] = [
    Pattern {
        category: TableCategory::MainSummary,
        japanese_headers: &["総計・自己合計・委託合計", "自己取引計", "委託取引計", "自己委託合計"],
        english_headers: &["Total, Proprietary", "Proprietary", "Brokerage", "Total"],
        expected_categories: &["自己取引計", "委託取引計", "自己委託合計"],
        expected_rows: 9,
    },
    Pattern {
        category: TableCategory::BrokerageBreakdown,
        japanese_headers: &["委託内訳", "法人計", "個人計", "海外投資家計", "証券会社"],
        english_headers: &[
            "Breakdown of Brokerage",
            "Institutions",
            "Individuals",
            "Foreigners",
            "Securities Cos",
        ],
        expected_categories: &["法人計", "個人計", "海外投資家計", "証券会社"],
        expected_rows: 12,
    },
    Pattern {
        category: TableCategory::InstitutionsBreakdown,
        japanese_headers: &["法人内訳", "投資信託", "事業法人", "その他法人", "金融機関計"],
        english_headers: &[
            "Breakdown of Institutions",
            "Investment Trusts",
            "Business Cos",
            "Other Institutions",
            "Financial Institutions",
        ],
        expected_categories: &["投資信託", "事業法人", "その他法人", "金融機関計"],
        expected_rows: 12,
    },
    Pattern {
        category: TableCategory::FinancialBreakdown,
        japanese_headers: &["金融機関内訳", "生保・損保", "都銀・地銀等", "信託銀行", "その他金融機関"],
        english_headers: &[
            "Breakdown of Financial Institutions",
            "Insurance Cos",
            "City BKs, Regional BKs",
            "Trust Banks",
            "Other Financial Institutions",
        ],
        expected_categories: &["生保・損保", "都銀・地銀等", "信託銀行", "その他金融機関"],
        expected_rows: 12,
    },
];

const SIDES: [(&str, &str); 3] = [("売り", "Sales"), ("買い", "Purchases"), ("合計", "Total")];

fn pattern_for(category: TableCategory) -> &'static Pattern {
    PATTERNS
        .iter()
        .find(|p| p.category == category)
        .unwrap_or(&PATTERNS[0])
}

/// One parsed trading row. Figures keep their printed form, `▲` included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeRow {
    pub category: String,
    pub side: &'static str,
    pub volume: String,
    pub volume_ratio: Option<String>,
    pub volume_balance: Option<String>,
    pub value: String,
    pub value_ratio: Option<String>,
    pub value_balance: Option<String>,
}

impl TradeRow {
    fn is_complete(&self) -> bool {
        !self.category.is_empty() && !self.volume.is_empty() && !self.value.is_empty()
    }
}

/// Content check of one exported table.
#[derive(Debug, Clone, Serialize)]
pub struct TableQuality {
    pub index: usize,
    pub page: usize,
    /// Category implied by the table's position on the page.
    pub position: TableCategory,
    /// Category recognized from the table text, if any.
    pub detected: Option<TableCategory>,
    pub rows: usize,
    pub expected_rows: usize,
    pub categories_found: Vec<String>,
    pub confidence: f64,
}

impl TableQuality {
    pub fn matches_position(&self) -> bool {
        self.detected.map_or(true, |d| d == self.position)
    }
}

pub struct Classifier {
    number_re: Regex,
}

impl Classifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            number_re: Regex::new(r"▲?[0-9][0-9,]*(?:\.[0-9]+)?")?,
        })
    }

    /// Category whose header words occur most often in the table text.
    /// Ties go to the earlier category; `None` when nothing matches.
    pub fn identify(&self, table: &Table) -> Option<TableCategory> {
        let text = table
            .rows
            .iter()
            .flatten()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let lower = text.to_lowercase();

        let mut best: Option<(usize, TableCategory)> = None;
        for p in &PATTERNS {
            let hits = p.japanese_headers.iter().filter(|h| text.contains(*h)).count()
                + p.english_headers
                    .iter()
                    .filter(|h| lower.contains(&h.to_lowercase()))
                    .count();
            if hits > 0 && best.map_or(true, |(n, _)| hits > n) {
                best = Some((hits, p.category));
            }
        }
        best.map(|(_, c)| c)
    }

    /// Parse a trading row: a known category name, a side and at least four
    /// figures, read left to right.
    pub fn parse_row(&self, cells: &[String], category: TableCategory) -> Option<TradeRow> {
        if cells.len() < MIN_ROW_CELLS {
            return None;
        }
        let name = pattern_for(category)
            .expected_categories
            .iter()
            .find(|name| cells.iter().any(|c| c.contains(*name)))?;
        let &(_, side) = SIDES
            .iter()
            .find(|(jp, en)| cells.iter().any(|c| c.contains(jp) || c.contains(en)))?;

        let figures: Vec<String> = cells
            .iter()
            .flat_map(|c| self.number_re.find_iter(c).map(|m| m.as_str().to_string()))
            .collect();
        if figures.len() < MIN_FIGURES {
            return None;
        }
        let at = |i: usize| figures.get(i).cloned();
        Some(TradeRow {
            category: name.to_string(),
            side,
            volume: figures[0].clone(),
            volume_ratio: at(1),
            volume_balance: at(2),
            value: figures[3].clone(),
            value_ratio: at(4),
            value_balance: at(5),
        })
    }

    pub fn parse_rows(&self, table: &Table, category: TableCategory) -> Vec<TradeRow> {
        table
            .rows
            .iter()
            .skip(HEADER_ROWS)
            .filter_map(|row| self.parse_row(row, category))
            .collect()
    }

    /// Check table `index` of a document against its expected category.
    pub fn assess(&self, index: usize, table: &Table) -> TableQuality {
        let position = TableCategory::for_index(index);
        let detected = self.identify(table);
        let pattern = pattern_for(detected.unwrap_or(position));
        let rows = self.parse_rows(table, pattern.category);

        let mut categories_found: Vec<String> = Vec::new();
        for r in &rows {
            if !categories_found.contains(&r.category) {
                categories_found.push(r.category.clone());
            }
        }
        let confidence = if rows.is_empty() {
            0.0
        } else {
            let row_score = (rows.len() as f64 / pattern.expected_rows as f64).min(1.0);
            let category_score =
                categories_found.len() as f64 / pattern.expected_categories.len() as f64;
            let complete = rows.iter().filter(|r| r.is_complete()).count();
            let completeness = complete as f64 / rows.len() as f64;
            (row_score + category_score + completeness) / 3.0
        };

        TableQuality {
            index,
            page: page_for_index(index),
            position,
            detected,
            rows: rows.len(),
            expected_rows: pattern.expected_rows,
            categories_found,
            confidence,
        }
    }

    /// Assess every table in document order, warning where content and
    /// position disagree.
    pub fn assess_all(&self, tables: &[Table]) -> Vec<TableQuality> {
        let out: Vec<TableQuality> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| self.assess(i, t))
            .collect();
        for q in out.iter().filter(|q| !q.matches_position()) {
            warn!(
                table = q.index,
                page = q.page,
                position = q.position.label(),
                detected = ?q.detected.map(|d| d.label()),
                "table content does not match its position"
            );
        }
        debug!(
            tables = out.len(),
            confidence = average_confidence(&out),
            "assessed tables"
        );
        out
    }
}

pub fn average_confidence(quality: &[TableQuality]) -> f64 {
    if quality.is_empty() {
        return 0.0;
    }
    quality.iter().map(|q| q.confidence).sum::<f64>() / quality.len() as f64
}

/// Category names found anywhere in `quality`, first appearance first.
pub fn categories_found(quality: &[TableQuality]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in quality.iter().flat_map(|q| &q.categories_found) {
        if !out.contains(name) {
            out.push(name.clone());
        }
    }
    out
}

fn render_report(files: &[(&str, &[TableQuality])]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "EXTRACTION QUALITY REPORT");
    let _ = writeln!(out, "{}\n", "=".repeat(50));
    for (name, quality) in files {
        let _ = writeln!(out, "File: {}", name);
        let _ = writeln!(out, "{}", "-".repeat(30));
        let _ = writeln!(out, "  Average confidence: {:.2}", average_confidence(quality));
        for q in quality.iter() {
            let detected = q.detected.map_or("unrecognized", |d| d.label());
            let _ = writeln!(out, "  P{} {}:", q.page, q.position.label());
            let _ = writeln!(
                out,
                "    Content: {}{}",
                detected,
                if q.matches_position() { "" } else { " (differs from position)" }
            );
            let _ = writeln!(out, "    Confidence: {:.2}", q.confidence);
            let _ = writeln!(out, "    Rows: {}/{}", q.rows, q.expected_rows);
            let _ = writeln!(out, "    Categories: {}", q.categories_found.len());
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Write the plain-text quality report for a run, via a temp file.
pub fn write_quality_report(path: &Path, files: &[(&str, &[TableQuality])]) -> Result<()> {
    let tmp = path.with_extension("txt.tmp");
    fs::write(&tmp, render_report(files)).with_context(|| format!("writing {:?}", tmp))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming {:?} -> {:?}", tmp, path))?;
    info!(path = %path.display(), files = files.len(), "quality report saved");
    Ok(())
}
