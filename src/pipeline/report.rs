// src/pipeline/report.rs

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use super::Strategy;
use crate::convert::ChunkOutcome;
use crate::docx::MergeReport;
use crate::sheet::classify::TableQuality;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Pdf,
    Docx,
}

/// What happened to one input file during a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source: PathBuf,
    pub stem: String,
    pub kind: SourceKind,
    pub strategy: Option<Strategy>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u128,
    /// The merged DOCX was already present and conversion was skipped.
    pub resumed: bool,
    pub pages: Option<usize>,
    pub chunks: Vec<ChunkOutcome>,
    pub merge: Option<MergeReport>,
    pub tables_exported: usize,
    pub workbook: Option<PathBuf>,
    /// Mean content confidence over the exported tables.
    pub confidence: Option<f64>,
    pub categories_found: Vec<String>,
    pub quality: Vec<TableQuality>,
    pub error: Option<String>,
}

impl RunReport {
    pub fn new(source: &Path, stem: &str, kind: SourceKind, strategy: Option<Strategy>) -> Self {
        Self {
            source: source.to_path_buf(),
            stem: stem.to_string(),
            kind,
            strategy,
            started_at: Utc::now(),
            elapsed_ms: 0,
            resumed: false,
            pages: None,
            chunks: Vec::new(),
            merge: None,
            tables_exported: 0,
            workbook: None,
            confidence: None,
            categories_found: Vec::new(),
            quality: Vec::new(),
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn failed_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| !c.is_converted()).count()
    }
}

/// Write `report` as pretty JSON, via a temp file.
pub fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(report).context("serializing run report")?;
    fs::write(&tmp, json).with_context(|| format!("writing {:?}", tmp))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming {:?} -> {:?}", tmp, path))?;
    Ok(())
}
