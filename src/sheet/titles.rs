// src/sheet/titles.rs

use crate::chunk::TABLES_PER_PAGE;
use crate::docx::Document;
use crate::pdf::scan::TABLE_SECTIONS;

use super::page_for_index;

/// Heading printed above every report table.
pub const MAIN_TITLE: &str = "Trading by Type of Investors";

/// Subtitle and section title shown above one exported table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTitles {
    pub subtitle: String,
    pub table_title: String,
}

/// What a converted page contributes to the title mapping.
#[derive(Debug, Clone)]
pub struct PageTitles {
    pub subtitle: String,
    pub table_titles: Vec<String>,
    pub table_count: usize,
}

/// Assign titles to tables in document order. Tables of each page take the
/// page subtitle and the section title at their position on the page.
pub fn from_pages(pages: &[PageTitles]) -> Vec<TableTitles> {
    let mut out = Vec::new();
    for page in pages {
        for i in 0..page.table_count {
            let pos = i % TABLES_PER_PAGE;
            let table_title = page
                .table_titles
                .get(pos)
                .cloned()
                .unwrap_or_else(|| format!("Table Title {}", pos + 1));
            out.push(TableTitles {
                subtitle: page.subtitle.clone(),
                table_title,
            });
        }
    }
    out
}

/// Title and subtitle recovered from the text around one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeading {
    pub title: String,
    pub subtitle: String,
}

impl PageHeading {
    /// Used when a table has no heading of its own.
    pub fn fallback(page: usize) -> Self {
        Self {
            title: format!("Trading Data - Page {}", page),
            subtitle: format!("(Page {} Data)", page),
        }
    }
}

const SUBTITLE_KEYWORDS: [&str; 8] = [
    "先物", "Futures", "225", "オプション", "Options", "TOPIX", "マザーズ", "Mothers",
];

/// Market names that mark a subtitle even without parentheses.
const MARKET_KEYWORDS: [&str; 7] = ["日経", "Nikkei", "TOPIX", "マザーズ", "Mothers", "JQ", "東証"];

const TITLE_WINDOW: usize = 10;
const LOOSE_TITLE_WINDOW: usize = 5;
const LOOSE_TITLE_MIN_CHARS: usize = 10;

fn clean(text: &str) -> String {
    text.replace(['\n', '\r'], " ").trim().to_string()
}

/// Up to the last ten paragraphs before table `index`.
fn preceding(doc: &Document, index: usize) -> Vec<&str> {
    let before = doc.paragraphs_before_table(index);
    before[before.len().saturating_sub(TITLE_WINDOW)..].to_vec()
}

/// Nearest paragraph in `window` accepted by `pred`.
fn nearest(window: &[&str], pred: impl Fn(&str) -> bool) -> Option<String> {
    window.iter().rev().find(|t| pred(**t)).map(|t| clean(t))
}

fn infer_subtitle(window: &[&str], page: usize) -> String {
    let parenthesized = |t: &str| {
        t.contains('(') && t.contains(')') && SUBTITLE_KEYWORDS.iter().any(|k| t.contains(k))
    };
    let market = |t: &str| MARKET_KEYWORDS.iter().any(|k| t.contains(k));
    if let Some(s) = nearest(window, parenthesized).or_else(|| nearest(window, market)) {
        return s;
    }

    let joined = window.join(" ");
    if joined.contains("225") || joined.contains("日経") {
        "(日経225関連 / Nikkei 225 Related)".to_string()
    } else if joined.contains("TOPIX") {
        "(TOPIX関連 / TOPIX Related)".to_string()
    } else if joined.contains("マザーズ") || joined.contains("Mothers") {
        "(マザーズ / Mothers Market)".to_string()
    } else {
        format!("(Page {} Data)", page)
    }
}

fn infer_title(window: &[&str], page: usize) -> String {
    let report =
        |t: &str| (t.contains("投資部門") && t.contains("取引")) || t.contains("Trading by Type");
    let trading = |t: &str| t.contains("売買") || t.contains("Trading") || t.contains("取引");
    let sector = |t: &str| t.contains("部門") || t.contains("Sector") || t.contains("Breakdown");
    let substantial = |t: &str| {
        let t = t.trim();
        t.chars().count() > LOOSE_TITLE_MIN_CHARS && !t.chars().all(|c| c.is_ascii_digit())
    };

    nearest(window, report)
        .or_else(|| nearest(window, trading))
        .or_else(|| nearest(window, sector))
        .or_else(|| {
            let tail = &window[window.len().saturating_sub(LOOSE_TITLE_WINDOW)..];
            nearest(tail, substantial)
        })
        .unwrap_or_else(|| PageHeading::fallback(page).title)
}

/// Best-effort titles for a document converted without a page pre-scan,
/// looked up in the paragraphs preceding each table.
pub fn infer_from_document(doc: &Document) -> Vec<TableTitles> {
    (0..doc.table_count())
        .map(|index| {
            let window = preceding(doc, index);
            let table_title = window
                .iter()
                .rev()
                .find_map(|t| {
                    TABLE_SECTIONS
                        .iter()
                        .find(|(kw, _)| t.contains(kw))
                        .map(|(_, title)| title.to_string())
                })
                .unwrap_or_else(|| format!("Table Title {}", index % TABLES_PER_PAGE + 1));

            TableTitles {
                subtitle: infer_subtitle(&window, page_for_index(index)),
                table_title,
            }
        })
        .collect()
}

/// Report title and market subtitle for every table, taken from the
/// paragraphs before it. Strongest match wins, nearest first within a tier.
pub fn headings_from_document(doc: &Document) -> Vec<PageHeading> {
    (0..doc.table_count())
        .map(|index| {
            let window = preceding(doc, index);
            let page = page_for_index(index);
            PageHeading {
                title: infer_title(&window, page),
                subtitle: infer_subtitle(&window, page),
            }
        })
        .collect()
}
