// src/jgbf/mod.rs
//
// Normalizes the workbooks written by the titled export into one JGBF
// time-series sheet: fixed cells of the main-summary and brokerage tables
// become series keyed by instrument, category, side and measure.

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::{Datelike, Local, NaiveDate};
use glob::{glob, Pattern};
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{error, info, warn};

use crate::chunk::file_stem;
use crate::pipeline::JgbfConfig;

pub mod series;
pub mod taxonomy;

pub use series::{DataPoint, TimeSeriesTable};
pub use taxonomy::{Category, Instrument, Measure, SeriesKey, Side, TableKind};

/// Report weeks named in file names rather than dated.
const WEEK_LABELS: [(&str, &str); 4] = [
    ("MARCH WEEK 1", "2025-09"),
    ("MARCH WEEK 2", "2025-10"),
    ("MARCH WEEK 3", "2025-11"),
    ("MARCH WEEK 4", "2025-12"),
];

const DEFAULT_BUCKET: &str = "2025-01";

/// 0-based row where table data starts under the titled layout.
const FIRST_DATA_ROW: u32 = 5;
const MIN_COLUMNS: usize = 8;

/// `▲` marks a negative number; `""` and `"-"` mean no value.
pub fn normalize_value(raw: &str) -> String {
    let v = raw.trim();
    if v.is_empty() || v == "-" {
        return String::new();
    }
    match v.strip_prefix('▲') {
        Some(rest) => format!("-{}", rest),
        None => v.to_string(),
    }
}

/// Metadata and data rows of one table sheet.
#[derive(Debug, Clone, Default)]
pub struct SheetData {
    pub title: String,
    pub subtitle: String,
    pub table_title: String,
    pub rows: Vec<Vec<String>>,
}

fn cell_text(range: &Range<Data>, row: u32, col: u32) -> String {
    match range.get_value((row, col)) {
        None | Some(Data::Empty) => String::new(),
        Some(d) => d.to_string(),
    }
}

/// Read A1..A3 and every row from row 6 whose column A is filled.
pub fn read_sheet(range: &Range<Data>) -> SheetData {
    let (height, width) = match range.end() {
        Some((r, c)) => (r + 1, c + 1),
        None => return SheetData::default(),
    };
    let a2 = cell_text(range, 1, 0);
    let a3 = cell_text(range, 2, 0);

    let rows = (FIRST_DATA_ROW..height)
        .filter(|&r| !cell_text(range, r, 0).is_empty())
        .map(|r| (0..width).map(|c| cell_text(range, r, c)).collect())
        .collect();

    SheetData {
        title: cell_text(range, 0, 0),
        subtitle: a2.strip_prefix("Subtitle: ").unwrap_or(&a2).to_string(),
        table_title: a3.strip_prefix("Table Title: ").unwrap_or(&a3).to_string(),
        rows,
    }
}

/// Turn the data rows of one table into points. Total rows and rows with
/// unknown labels are skipped.
pub fn parse_rows(
    table: TableKind,
    instrument: Instrument,
    date: &str,
    rows: &[Vec<String>],
) -> Vec<DataPoint> {
    let mut points = Vec::new();
    for row in rows {
        if row.len() < MIN_COLUMNS {
            continue;
        }
        let (label, side_label) = (row[0].trim(), row[1].trim());
        if label.is_empty() || side_label.is_empty() || side_label.contains("合計") {
            continue;
        }
        let (Some(category), Some(side)) = (table.category(label), Side::from_label(side_label))
        else {
            continue;
        };

        for measure in Measure::ALL {
            let value = normalize_value(&row[measure.column()]);
            if value.is_empty() {
                continue;
            }
            points.push(DataPoint {
                key: SeriesKey {
                    instrument,
                    table,
                    category,
                    side,
                    measure,
                },
                date: date.to_string(),
                value,
            });
        }
    }
    points
}

/// Totals for one parser run.
#[derive(Debug, Clone)]
pub struct JgbfSummary {
    pub files: usize,
    pub points: usize,
    pub series: usize,
    pub dates: usize,
    pub output: PathBuf,
}

pub struct JgbfParser {
    config: JgbfConfig,
    date_re: Regex,
}

impl JgbfParser {
    pub fn new(config: JgbfConfig) -> Result<Self> {
        Ok(Self {
            config,
            date_re: Regex::new(r"(\d{8})")?,
        })
    }

    /// Week bucket for a workbook, from the week label or the first
    /// `YYYYMMDD` in its file stem (ISO week-numbering year and week).
    ///
    /// The year is the ISO year, not the calendar year. Older JGBF_DATA files
    /// paired the calendar year with the ISO week, so dates around New Year
    /// differ from them: 2024-12-30 is `2025-01` here and was `2024-01` there.
    pub fn date_bucket(&self, stem: &str) -> String {
        let upper = stem.to_uppercase();
        if let Some((_, bucket)) = WEEK_LABELS.iter().find(|(label, _)| upper.contains(label)) {
            return bucket.to_string();
        }
        let parsed = self
            .date_re
            .captures(stem)
            .and_then(|c| c.get(1))
            .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%Y%m%d").ok());
        match parsed {
            Some(date) => {
                let week = date.iso_week();
                format!("{}-{:02}", week.year(), week.week())
            }
            None => {
                warn!(file = %stem, "no date in file name, using {}", DEFAULT_BUCKET);
                DEFAULT_BUCKET.to_string()
            }
        }
    }

    /// All points of one `*_extracted.xlsx` workbook.
    #[tracing::instrument(level = "info", skip(self, path), fields(file = %path.display()))]
    pub fn parse_workbook(&self, path: &Path) -> Result<Vec<DataPoint>> {
        let date = self.date_bucket(&file_stem(path));
        let mut workbook =
            open_workbook_auto(path).with_context(|| format!("opening {:?}", path))?;

        let mut points = Vec::new();
        for name in workbook.sheet_names().to_owned() {
            if name == "Summary" {
                continue;
            }
            let Some(table) = TableKind::from_sheet_name(&name) else {
                continue;
            };
            let range = match workbook.worksheet_range(&name) {
                Ok(r) => r,
                Err(e) => {
                    error!(sheet = %name, "could not read sheet: {}", e);
                    continue;
                }
            };
            let sheet = read_sheet(&range);
            let Some(instrument) = Instrument::from_subtitle(&sheet.subtitle) else {
                warn!(sheet = %name, subtitle = %sheet.subtitle, "no instrument for subtitle");
                continue;
            };
            let found = parse_rows(table, instrument, &date, &sheet.rows);
            info!(sheet = %name, points = found.len(), "parsed sheet");
            points.extend(found);
        }
        Ok(points)
    }

    /// Parse every workbook in the input folder and write
    /// `JGBF_DATA_{YYYYMMDD}.xlsx` into the output folder.
    #[tracing::instrument(level = "info", skip(self), fields(input = %self.config.input_dir.display()))]
    pub fn run(&self) -> Result<JgbfSummary> {
        let cfg = &self.config;
        if !cfg.input_dir.is_dir() {
            bail!("input folder {:?} does not exist", cfg.input_dir);
        }
        let pattern = format!(
            "{}/*_extracted.xlsx",
            Pattern::escape(&cfg.input_dir.display().to_string())
        );
        let mut files: Vec<PathBuf> = glob(&pattern)?.filter_map(Result::ok).collect();
        files.sort();
        if files.is_empty() {
            bail!("no extracted workbooks found in {:?}", cfg.input_dir);
        }
        info!(files = files.len(), "parsing workbooks");

        let mut table = TimeSeriesTable::default();
        let mut points = 0;
        for file in &files {
            match self.parse_workbook(file) {
                Ok(found) => {
                    points += found.len();
                    found.into_iter().for_each(|p| table.insert(p));
                }
                Err(e) => error!(file = %file.display(), "skipping workbook: {:#}", e),
            }
        }
        if table.is_empty() {
            bail!("no data extracted from {} workbooks", files.len());
        }

        fs::create_dir_all(&cfg.output_dir)
            .with_context(|| format!("creating {:?}", cfg.output_dir))?;
        let output = cfg
            .output_dir
            .join(format!("JGBF_DATA_{}.xlsx", Local::now().format("%Y%m%d")));
        table.write_workbook(&output)?;

        for (i, key) in table.keys().take(10).enumerate() {
            info!("column {}: {}", i + 1, key);
        }
        if table.len() > 10 {
            info!("... and {} more columns", table.len() - 10);
        }

        Ok(JgbfSummary {
            files: files.len(),
            points,
            series: table.len(),
            dates: table.dates().len(),
            output,
        })
    }
}
