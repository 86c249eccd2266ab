// src/jgbf/taxonomy.rs
//
// Fixed lookup tables from report labels to time-series code segments.
// Enum declaration order is the column order of the output sheet.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Instrument {
    Jgb10Year,
    Mini10YearCashSettled,
    Mini20Year,
    Tona3Month,
}

/// Subtitle fragment → instrument; the first fragment found wins.
const INSTRUMENTS: [(&str, Instrument); 4] = [
    ("JGB(10-year) Futures", Instrument::Jgb10Year),
    ("mini-10-year JGB Futures", Instrument::Mini10YearCashSettled),
    ("mini-20-year JGB Futures", Instrument::Mini20Year),
    ("3-Month TONA Futures", Instrument::Tona3Month),
];

impl Instrument {
    pub fn from_subtitle(subtitle: &str) -> Option<Self> {
        let cleaned = subtitle.replace('（', "(").replace('）', ")");
        INSTRUMENTS
            .iter()
            .find(|(fragment, _)| cleaned.contains(fragment))
            .map(|(_, i)| *i)
    }

    pub fn code(&self) -> &'static str {
        match self {
            Instrument::Jgb10Year => "JGB10YEARFUTURES",
            Instrument::Mini10YearCashSettled => "MINI10YEARJGBFUTURESCASHSETTLED",
            Instrument::Mini20Year => "MINI20YEARJGBFUTURES",
            Instrument::Tona3Month => "3MONTHTONAFUTURES",
        }
    }

    /// Display name used in descriptions: the subtitle fragment it matched on.
    pub fn name(&self) -> &'static str {
        INSTRUMENTS
            .iter()
            .find(|(_, i)| i == self)
            .map(|(name, _)| *name)
            .unwrap_or_else(|| self.code())
    }
}

/// The two tables of a page that carry series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TableKind {
    TotalProprietaryBrokerage,
    BrokerageBreakdown,
}

impl TableKind {
    /// Classify a workbook sheet by name; `None` for sheets without series.
    pub fn from_sheet_name(name: &str) -> Option<Self> {
        if name.contains("Table1_Main_Summary") {
            Some(TableKind::TotalProprietaryBrokerage)
        } else if name.contains("Table2_Brokerage_Bre") {
            Some(TableKind::BrokerageBreakdown)
        } else {
            None
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TableKind::TotalProprietaryBrokerage => "TOTAL_PROPRIETARY_BROKERAGE",
            TableKind::BrokerageBreakdown => "BROKERAGE_BREAKDOWN",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TableKind::TotalProprietaryBrokerage => "Total, Proprietary ＆ Brokerage",
            TableKind::BrokerageBreakdown => "Breakdown of Brokerage",
        }
    }

    fn categories(&self) -> &'static [(&'static str, Category)] {
        match self {
            TableKind::TotalProprietaryBrokerage => &[
                ("自己取引計", Category::Proprietary),
                ("委託取引計", Category::Brokerage),
                ("自己委託合計", Category::Total),
            ],
            TableKind::BrokerageBreakdown => &[
                ("法人計", Category::Institutions),
                ("個人計", Category::Individuals),
                ("海外投資家計", Category::Foreigners),
                ("証券会社", Category::SecuritiesCos),
            ],
        }
    }

    /// Category of a row in this table, matched on its column A label.
    pub fn category(&self, label: &str) -> Option<Category> {
        self.categories()
            .iter()
            .find(|(jp, _)| label.contains(jp))
            .map(|(_, c)| *c)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Proprietary,
    Brokerage,
    Total,
    Institutions,
    Individuals,
    Foreigners,
    SecuritiesCos,
}

impl Category {
    pub fn code(&self) -> &'static str {
        match self {
            Category::Proprietary => "PROPRIETARY",
            Category::Brokerage => "BROKERAGE",
            Category::Total => "TOTAL",
            Category::Institutions => "INSTITUTIONS",
            Category::Individuals => "INDIVIDUALS",
            Category::Foreigners => "FOREIGNERS",
            Category::SecuritiesCos => "SECURITIES_COS",
        }
    }
}

/// Sales or purchases row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Side {
    Sales,
    Purchases,
}

impl Side {
    pub fn from_label(label: &str) -> Option<Self> {
        if label.contains("売り") {
            Some(Side::Sales)
        } else if label.contains("買い") {
            Some(Side::Purchases)
        } else {
            None
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Side::Sales => "SALES",
            Side::Purchases => "PURCHASES",
        }
    }
}

/// Which numeric column a series reads: F (value) or H (balance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Measure {
    Value,
    Balance,
}

impl Measure {
    pub const ALL: [Measure; 2] = [Measure::Value, Measure::Balance];

    pub fn column(&self) -> usize {
        match self {
            Measure::Value => 5,
            Measure::Balance => 7,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Measure::Value => "VALUE",
            Measure::Balance => "BALANCE",
        }
    }
}

/// Python-style title casing: a letter after a non-letter is upper-cased,
/// every other letter lower-cased.
fn title_case(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut prev_alpha = false;
    for c in code.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Identity of one output series. Ordering follows the output column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    pub instrument: Instrument,
    pub table: TableKind,
    pub category: Category,
    pub side: Side,
    pub measure: Measure,
}

impl SeriesKey {
    pub fn code(&self) -> String {
        format!(
            "JGBF.{}.{}.TRADINGVALUE.{}.{}.{}.W",
            self.table.code(),
            self.instrument.code(),
            self.category.code(),
            self.side.code(),
            self.measure.code()
        )
    }

    pub fn description(&self) -> String {
        format!(
            "Trading by Type of Investors, {}, {}, Trading Value, {}, {}, {}",
            self.instrument.name(),
            self.table.label(),
            title_case(self.category.code()),
            title_case(self.side.code()),
            title_case(self.measure.code())
        )
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}
