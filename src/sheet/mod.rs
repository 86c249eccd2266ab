// src/sheet/mod.rs

use serde::Serialize;

use crate::chunk::TABLES_PER_PAGE;

pub mod classify;
pub mod export;
pub mod titles;

pub use export::{export_tables, Layout, SummaryInfo};
pub use titles::{PageHeading, TableTitles};

/// Fixed role of a table, decided purely by its position on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TableCategory {
    MainSummary,
    BrokerageBreakdown,
    InstitutionsBreakdown,
    FinancialBreakdown,
}

pub const TABLE_CATEGORIES: [TableCategory; TABLES_PER_PAGE] = [
    TableCategory::MainSummary,
    TableCategory::BrokerageBreakdown,
    TableCategory::InstitutionsBreakdown,
    TableCategory::FinancialBreakdown,
];

impl TableCategory {
    pub fn for_index(index: usize) -> Self {
        TABLE_CATEGORIES[index % TABLES_PER_PAGE]
    }

    pub fn label(&self) -> &'static str {
        match self {
            TableCategory::MainSummary => "Table1_Main_Summary",
            TableCategory::BrokerageBreakdown => "Table2_Brokerage_Breakdown",
            TableCategory::InstitutionsBreakdown => "Table3_Institutions_Breakdown",
            TableCategory::FinancialBreakdown => "Table4_Financial_Breakdown",
        }
    }
}

/// 1-based page a table lands on.
pub fn page_for_index(index: usize) -> usize {
    index / TABLES_PER_PAGE + 1
}

/// Pages needed for `tables` tables, rounding up.
pub fn pages_for_tables(tables: usize) -> usize {
    tables.div_ceil(TABLES_PER_PAGE)
}

/// `P{page}_{label}` with the label cut to 20 characters, keeping sheet
/// names under Excel's 31-character limit.
pub fn sheet_name(index: usize) -> String {
    sheet_name_for(page_for_index(index), TableCategory::for_index(index))
}

pub fn sheet_name_for(page: usize, category: TableCategory) -> String {
    let label: String = category.label().chars().take(20).collect();
    format!("P{}_{}", page, label)
}
