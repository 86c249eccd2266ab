// src/jgbf/series.rs

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

use super::taxonomy::SeriesKey;

/// One observation read from a workbook cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPoint {
    pub key: SeriesKey,
    /// Week bucket, `YYYY-WW`.
    pub date: String,
    pub value: String,
}

impl DataPoint {
    pub fn code(&self) -> String {
        self.key.code()
    }

    pub fn description(&self) -> String {
        self.key.description()
    }
}

/// Series keyed in output column order, each mapping date → value.
#[derive(Debug, Default)]
pub struct TimeSeriesTable {
    series: BTreeMap<SeriesKey, BTreeMap<String, String>>,
}

impl TimeSeriesTable {
    /// A later point for the same series and date replaces the earlier one.
    pub fn insert(&mut self, point: DataPoint) {
        self.series
            .entry(point.key)
            .or_default()
            .insert(point.date, point.value);
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &SeriesKey> {
        self.series.keys()
    }

    /// Every date seen in any series, ascending.
    pub fn dates(&self) -> BTreeSet<&str> {
        self.series
            .values()
            .flat_map(|points| points.keys().map(String::as_str))
            .collect()
    }

    pub fn value(&self, key: &SeriesKey, date: &str) -> Option<&str> {
        self.series.get(key)?.get(date).map(String::as_str)
    }

    /// Codes across row 1, descriptions across row 2, one row per date below.
    #[tracing::instrument(level = "info", skip(self), fields(out = %out.display(), series = self.len()))]
    pub fn write_workbook(&self, out: &Path) -> Result<()> {
        let bold = Format::new().set_bold();
        let mut workbook = Workbook::new();
        let ws = workbook.add_worksheet();
        ws.set_name("JGBF_DATA")?;

        ws.write_string_with_format(0, 0, "Date", &bold)?;
        ws.write_string_with_format(1, 0, "Description", &bold)?;
        for (i, key) in self.series.keys().enumerate() {
            let col = (i + 1) as u16;
            ws.write_string_with_format(0, col, key.code().as_str(), &bold)?;
            ws.write_string_with_format(1, col, key.description().as_str(), &bold)?;
        }

        let dates = self.dates();
        for (r, date) in dates.iter().enumerate() {
            let row = (r + 2) as u32;
            ws.write_string(row, 0, *date)?;
            for (i, points) in self.series.values().enumerate() {
                if let Some(v) = points.get(*date) {
                    ws.write_string(row, (i + 1) as u16, v.as_str())?;
                }
            }
        }
        ws.set_column_width(0, 12)?;

        workbook
            .save(out)
            .with_context(|| format!("saving {:?}", out))?;
        info!(dates = dates.len(), "wrote {} series", self.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jgbf::taxonomy::{Category, Instrument, Measure, Side, TableKind};
    use calamine::{open_workbook_auto, Data, Reader};
    use tempfile::tempdir;

    fn point(instrument: Instrument, category: Category, date: &str, value: &str) -> DataPoint {
        DataPoint {
            key: SeriesKey {
                instrument,
                table: TableKind::TotalProprietaryBrokerage,
                category,
                side: Side::Sales,
                measure: Measure::Value,
            },
            date: date.into(),
            value: value.into(),
        }
    }

    #[test]
    fn workbook_has_sorted_columns_and_dates() -> Result<()> {
        let mut table = TimeSeriesTable::default();
        table.insert(point(Instrument::Tona3Month, Category::Total, "2025-11", "5"));
        table.insert(point(Instrument::Jgb10Year, Category::Brokerage, "2025-10", "-3"));
        table.insert(point(Instrument::Jgb10Year, Category::Brokerage, "2025-09", "1"));
        table.insert(point(Instrument::Jgb10Year, Category::Brokerage, "2025-09", "2"));
        assert_eq!(table.len(), 2);

        let dir = tempdir()?;
        let out = dir.path().join("JGBF_DATA_20250101.xlsx");
        table.write_workbook(&out)?;

        let mut wb = open_workbook_auto(&out)?;
        let range = wb.worksheet_range("JGBF_DATA")?;
        let cell = |r: u32, c: u32| {
            range
                .get_value((r, c))
                .map(|d| d.to_string())
                .unwrap_or_default()
        };
        assert_eq!(cell(0, 0), "Date");
        assert_eq!(
            cell(0, 1),
            "JGBF.TOTAL_PROPRIETARY_BROKERAGE.JGB10YEARFUTURES.TRADINGVALUE.BROKERAGE.SALES.VALUE.W"
        );
        assert!(cell(0, 2).contains("3MONTHTONAFUTURES"));
        assert_eq!(cell(1, 0), "Description");
        assert_eq!(cell(2, 0), "2025-09");
        assert_eq!(cell(2, 1), "2");
        assert_eq!(cell(3, 1), "-3");
        assert_eq!(cell(4, 0), "2025-11");
        assert_eq!(cell(4, 2), "5");
        assert!(matches!(range.get_value((2, 2)), None | Some(Data::Empty)));
        Ok(())
    }
}
