// src/pdf/scan.rs
//
// Page pre-scan for selective conversion: find the pages that carry one of
// the futures subtitles and the table section titles printed on them.

use std::collections::BTreeMap;
use tracing::debug;

/// Subtitles that mark a page worth converting. Checked longest-first.
pub const TARGET_SUBTITLES: [&str; 5] = [
    "長期国債先物（現金決済型ミニ）",
    "JGB(10-year) Futures",
    "mini-10-year JGB Futures (Cash-Settled)",
    "mini-20-year JGB Futures",
    "3-Month TONA Futures",
];

/// Lines mentioning options belong to option pages, never futures pages.
pub const EXCLUSION_KEYWORDS: [&str; 2] = ["Options on", "オプション"];

/// (keyword, full section title), in page order.
pub const TABLE_SECTIONS: [(&str, &str); 4] = [
    (
        "総計・自己合計・委託合計",
        "総計・自己合計・委託合計 Total, Proprietary & Brokerage",
    ),
    ("委託内訳", "委託内訳 Breakdown of Brokerage"),
    ("法人内訳", "法人内訳 Breakdown of Institutions"),
    ("金融機関内訳", "金融機関内訳 Breakdown of Financial Institutions"),
];

fn subtitles_longest_first() -> Vec<&'static str> {
    let mut subs = TARGET_SUBTITLES.to_vec();
    subs.sort_by_key(|s| std::cmp::Reverse(s.chars().count()));
    subs
}

/// Subtitle line captured on `text`, if the page is relevant.
pub fn page_subtitle(text: &str) -> Option<String> {
    let subtitles = subtitles_longest_first();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if EXCLUSION_KEYWORDS.iter().any(|k| line.contains(k)) {
            continue;
        }
        if let Some(hit) = subtitles.iter().find(|s| line.contains(*s)) {
            debug!(keyword = %hit, line = %line.trim(), "subtitle match");
            return Some(line.trim().to_string());
        }
    }
    None
}

/// Map of 0-based page index to the full subtitle line found on it.
pub fn relevant_pages(texts: &[String]) -> BTreeMap<usize, String> {
    texts
        .iter()
        .enumerate()
        .filter_map(|(i, t)| page_subtitle(t).map(|s| (i, s)))
        .collect()
}

/// Section titles present on a page, padded to four entries.
pub fn table_titles(text: &str) -> Vec<String> {
    let mut titles: Vec<String> = TABLE_SECTIONS
        .iter()
        .filter(|(kw, _)| text.contains(kw))
        .map(|(_, title)| title.to_string())
        .collect();
    while titles.len() < TABLE_SECTIONS.len() {
        titles.push(format!("Table Title {} (Not Found)", titles.len() + 1));
    }
    titles
}

/// The canonical four titles, used when a page's text is unavailable.
pub fn default_table_titles() -> Vec<String> {
    TABLE_SECTIONS.iter().map(|(_, t)| t.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_whole_subtitle_line() {
        let page = "投資部門別取引状況\n\n  mini-10-year JGB Futures (Cash-Settled) 長期国債先物  \nmore";
        assert_eq!(
            page_subtitle(page).as_deref(),
            Some("mini-10-year JGB Futures (Cash-Settled) 長期国債先物")
        );
    }

    #[test]
    fn option_lines_are_skipped() {
        let page = "Options on JGB(10-year) Futures\n";
        assert_eq!(page_subtitle(page), None);

        // the exclusion is per line; a later futures line still matches
        let page = "Options on JGB(10-year) Futures\nJGB(10-year) Futures\n";
        assert_eq!(page_subtitle(page).as_deref(), Some("JGB(10-year) Futures"));
    }

    #[test]
    fn relevant_pages_keeps_indices() {
        let texts = vec![
            "cover".to_string(),
            "3-Month TONA Futures".to_string(),
            "nothing".to_string(),
            "mini-20-year JGB Futures".to_string(),
        ];
        let pages = relevant_pages(&texts);
        assert_eq!(pages.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn titles_are_padded() {
        let titles = table_titles("委託内訳 ... 金融機関内訳");
        assert_eq!(titles.len(), 4);
        assert_eq!(titles[0], "委託内訳 Breakdown of Brokerage");
        assert_eq!(
            titles[1],
            "金融機関内訳 Breakdown of Financial Institutions"
        );
        assert_eq!(titles[2], "Table Title 3 (Not Found)");
        assert_eq!(titles[3], "Table Title 4 (Not Found)");
    }
}
