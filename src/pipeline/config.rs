// src/pipeline/config.rs

use clap::ValueEnum;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// How the pages of a PDF are scheduled onto the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One converter call for the whole document.
    Sequential,
    /// Page ranges converted one after the other, then merged.
    Chunked,
    /// Page ranges converted concurrently per PDF, then merged.
    Parallel,
    /// Page ranges of every input PDF share one pool.
    GlobalPool,
    /// Only pages carrying a target subtitle, one page per job.
    Selective,
}

impl Strategy {
    pub fn default_workers(self) -> usize {
        match self {
            Strategy::GlobalPool | Strategy::Selective => 6,
            _ => num_cpus::get().min(4),
        }
    }

    pub fn is_chunked(self) -> bool {
        !matches!(self, Strategy::Sequential)
    }

    /// Method line on the workbook summary sheet.
    pub fn describe(self) -> &'static str {
        match self {
            Strategy::Sequential => "Whole-document conversion",
            Strategy::Chunked => "Sequential chunk processing",
            Strategy::Parallel => "Parallel chunk processing",
            Strategy::GlobalPool => "Global parallel chunk processing",
            Strategy::Selective => "Selective page conversion",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub strategy: Strategy,
    /// Pages per chunk.
    pub chunk_size: usize,
    /// Worker threads in the conversion pool.
    pub workers: usize,
    /// Keep merged DOCX files under `converted_docx/` after export.
    pub keep_docx: bool,
    /// Page count assumed when a PDF can't be inspected.
    pub page_fallback: usize,
}

pub const DEFAULT_CHUNK_SIZE: usize = 6;
pub const DEFAULT_PAGE_FALLBACK: usize = 24;

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_strategy(Strategy::Parallel)
    }
}

impl PipelineConfig {
    pub fn for_strategy(strategy: Strategy) -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("extracted_data"),
            strategy,
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: strategy.default_workers(),
            keep_docx: true,
            page_fallback: DEFAULT_PAGE_FALLBACK,
        }
    }

    pub fn converted_dir(&self) -> PathBuf {
        self.output_dir.join("converted_docx")
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.output_dir.join("temp_chunks")
    }

    pub fn merged_docx(&self, stem: &str) -> PathBuf {
        self.converted_dir().join(format!("{}.docx", stem))
    }

    pub fn workbook_path(&self, stem: &str) -> PathBuf {
        self.output_dir.join(format!("{}_extracted.xlsx", stem))
    }

    pub fn report_path(&self, stem: &str) -> PathBuf {
        self.output_dir.join(format!("{}_report.json", stem))
    }

    pub fn quality_report_path(&self) -> PathBuf {
        self.output_dir.join(crate::sheet::classify::QUALITY_REPORT_FILE)
    }
}

/// Where the JGBF parser reads workbooks and writes its output.
#[derive(Debug, Clone)]
pub struct JgbfConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for JgbfConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("extracted_data"),
            output_dir: PathBuf::from("parsed_output"),
        }
    }
}

impl JgbfConfig {
    pub fn new(input_dir: &Path, output_dir: &Path) -> Self {
        Self {
            input_dir: input_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_folder_layout() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.strategy, Strategy::Parallel);
        assert_eq!(cfg.chunk_size, 6);
        assert!(cfg.workers >= 1 && cfg.workers <= 4);
        assert!(cfg.keep_docx);
        assert_eq!(
            cfg.merged_docx("r"),
            Path::new("extracted_data/converted_docx/r.docx")
        );
        assert_eq!(
            cfg.workbook_path("r"),
            Path::new("extracted_data/r_extracted.xlsx")
        );
        assert_eq!(PipelineConfig::for_strategy(Strategy::Selective).workers, 6);
    }
}
