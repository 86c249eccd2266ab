// src/convert/mod.rs

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    process::Command,
    time::Instant,
};
use tracing::{error, info};

use crate::chunk::{ChunkJob, PageRange};
use crate::docx::read_document;

/// Table detection knobs handed to the converter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableSettings {
    pub snap_tolerance: f64,
    pub min_border_width: f64,
    pub join_tolerance: f64,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            snap_tolerance: 1.0,
            min_border_width: 0.3,
            join_tolerance: 1.0,
        }
    }
}

/// Turns a PDF (or a page range of it) into a DOCX file.
pub trait PdfConverter: Send + Sync {
    /// Convert `range` of `pdf` (the whole document when `None`) into `out_docx`.
    fn convert(&self, pdf: &Path, out_docx: &Path, range: Option<PageRange>) -> Result<()>;
}

/// Runs an external converter program, `pdf2docx` by default.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    pub program: PathBuf,
    pub settings: TableSettings,
}

impl Default for CommandConverter {
    fn default() -> Self {
        Self::new("pdf2docx")
    }
}

impl CommandConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            settings: TableSettings::default(),
        }
    }

    /// Arguments for one invocation, without the program name.
    pub fn args(&self, pdf: &Path, out_docx: &Path, range: Option<PageRange>) -> Vec<String> {
        let mut args = vec![
            "convert".to_string(),
            pdf.display().to_string(),
            out_docx.display().to_string(),
        ];
        if let Some(r) = range {
            args.push(format!("--start={}", r.start));
            args.push(format!("--end={}", r.end));
        }
        let s = &self.settings;
        args.push(format!(
            "--table_settings={{'snap_tolerance': {:.1}, 'min_border_width': {:.1}, 'join_tolerance': {:.1}}}",
            s.snap_tolerance, s.min_border_width, s.join_tolerance
        ));
        args
    }
}

impl PdfConverter for CommandConverter {
    fn convert(&self, pdf: &Path, out_docx: &Path, range: Option<PageRange>) -> Result<()> {
        let output = Command::new(&self.program)
            .args(self.args(pdf, out_docx, range))
            .output()
            .with_context(|| format!("launching {:?}", self.program))?;
        if !output.status.success() {
            bail!(
                "{:?} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        if !out_docx.exists() {
            bail!("{:?} produced no file at {:?}", self.program, out_docx);
        }
        Ok(())
    }
}

/// Result of converting one chunk job.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkOutcome {
    pub id: String,
    pub stem: String,
    pub range: PageRange,
    pub status: ChunkStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkStatus {
    Converted { path: PathBuf, table_count: usize },
    Failed { error: String },
}

impl ChunkOutcome {
    pub fn is_converted(&self) -> bool {
        matches!(self.status, ChunkStatus::Converted { .. })
    }

    pub fn docx_path(&self) -> Option<&Path> {
        match &self.status {
            ChunkStatus::Converted { path, .. } => Some(path),
            ChunkStatus::Failed { .. } => None,
        }
    }

    pub fn table_count(&self) -> usize {
        match &self.status {
            ChunkStatus::Converted { table_count, .. } => *table_count,
            ChunkStatus::Failed { .. } => 0,
        }
    }
}

fn try_convert(converter: &dyn PdfConverter, job: &ChunkJob) -> Result<(PathBuf, usize)> {
    let out = job.docx_path();
    converter
        .convert(&job.pdf_path, &out, Some(job.range))
        .with_context(|| format!("converting pages {}-{}", job.range.start + 1, job.range.end))?;
    let tables = read_document(&out)?.table_count();
    Ok((out, tables))
}

/// Convert one job. Failures are logged and folded into the outcome.
pub fn convert_chunk(converter: &dyn PdfConverter, job: &ChunkJob) -> ChunkOutcome {
    let start = Instant::now();
    info!(
        job = %job.id,
        "converting pages {}-{}",
        job.range.start + 1,
        job.range.end
    );
    let status = match try_convert(converter, job) {
        Ok((path, table_count)) => {
            info!(
                job = %job.id,
                elapsed = ?start.elapsed(),
                "completed with {}/{} tables",
                table_count,
                job.range.expected_tables()
            );
            ChunkStatus::Converted { path, table_count }
        }
        Err(e) => {
            error!(job = %job.id, "conversion failed: {:#}", e);
            ChunkStatus::Failed {
                error: format!("{:#}", e),
            }
        }
    };
    ChunkOutcome {
        id: job.id.clone(),
        stem: job.stem.clone(),
        range: job.range,
        status,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Converters that fabricate DOCX output for pipeline tests.

    use super::*;
    use crate::docx::{write_document, Block, Table};
    use std::collections::HashSet;
    use std::time::Duration;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    pub fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,pdfgrid=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    /// Writes `TABLES_PER_PAGE` tables per page, labelled `"{stem}:p{page}:t{n}"`.
    /// Pages listed in `fail_pages` make the conversion fail; later ranges
    /// finish first so completion order differs from page order. With
    /// `subtitles`, each page opens with a heading and a subtitle paragraph.
    #[derive(Default)]
    pub struct FakeConverter {
        pub fail_pages: HashSet<usize>,
        pub stagger: bool,
        pub subtitles: bool,
    }

    impl PdfConverter for FakeConverter {
        fn convert(&self, pdf: &Path, out_docx: &Path, range: Option<PageRange>) -> Result<()> {
            let range = range.unwrap_or(PageRange {
                seq: 1,
                start: 0,
                end: 3,
            });
            if (range.start..range.end).any(|p| self.fail_pages.contains(&p)) {
                bail!("simulated failure on pages {}-{}", range.start + 1, range.end);
            }
            if self.stagger {
                std::thread::sleep(Duration::from_millis(40u64.saturating_sub(range.start as u64 * 5)));
            }
            let stem = crate::chunk::file_stem(pdf);
            let mut blocks = Vec::new();
            for page in range.start..range.end {
                if page > range.start {
                    blocks.push(Block::PageBreak);
                }
                if self.subtitles {
                    blocks.push(Block::Paragraph(format!(
                        "投資部門別取引状況 Trading by Type of Investors p{}",
                        page
                    )));
                    blocks.push(Block::Paragraph("長期国債先物 (JGB(10-year) Futures)".into()));
                }
                for t in 0..crate::chunk::TABLES_PER_PAGE {
                    blocks.push(Block::Table(Table::new(vec![
                        vec!["区分".into(), "金額".into()],
                        vec![format!("{}:p{}:t{}", stem, page, t), "1".into()],
                    ])));
                }
            }
            write_document(out_docx, &blocks)
        }
    }
}
