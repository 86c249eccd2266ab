// src/pipeline/mod.rs

use anyhow::{bail, Context, Result};
use glob::{glob, Pattern};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use tracing::{debug, error, info, instrument, warn};

use crate::chunk::{file_stem, jobs_for, split_pages, ChunkJob};
use crate::convert::{convert_chunk, ChunkOutcome, PdfConverter};
use crate::docx::{merge_chunks, read_document, Table};
use crate::pdf::{self, scan};
use crate::sheet::classify::{self, Classifier, TableQuality};
use crate::sheet::titles::{self, PageTitles, TableTitles};
use crate::sheet::{export_tables, Layout, SummaryInfo};

pub mod config;
pub mod report;

pub use config::{JgbfConfig, PipelineConfig, Strategy};
pub use report::{write_report, RunReport, SourceKind};

const SUMMARY_HEADING: &str = "PDF→DOCX→Excel Conversion Summary";

/// Convert `jobs`, on `pool` when given, and return the outcomes sorted by
/// (stem, seq) whatever order they finished in.
pub fn run_jobs(
    pool: Option<&ThreadPool>,
    converter: &dyn PdfConverter,
    jobs: &[ChunkJob],
) -> Vec<ChunkOutcome> {
    let mut outcomes: Vec<ChunkOutcome> = match pool {
        Some(pool) => pool.install(|| {
            jobs.par_iter()
                .map(|job| convert_chunk(converter, job))
                .collect()
        }),
        None => jobs.iter().map(|job| convert_chunk(converter, job)).collect(),
    };
    outcomes.sort_by(|a, b| a.stem.cmp(&b.stem).then(a.range.seq.cmp(&b.range.seq)));
    outcomes
}

/// Sorted `*.{ext}` files directly under `dir`, skipping Office lock files.
/// The folder part is escaped, so `[`, `]`, `*` and `?` in it match literally.
pub(crate) fn list_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*.{}", Pattern::escape(&dir.display().to_string()), ext);
    let mut files: Vec<PathBuf> = glob(&pattern)
        .with_context(|| format!("bad pattern {}", pattern))?
        .filter_map(Result::ok)
        .filter(|p| {
            !p.file_name()
                .map(|n| n.to_string_lossy().starts_with("~$"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

pub struct Pipeline {
    config: PipelineConfig,
    converter: Arc<dyn PdfConverter>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, converter: Arc<dyn PdfConverter>) -> Self {
        Self { config, converter }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process every PDF and DOCX in the input folder. Per-file failures are
    /// recorded on that file's report; only setup problems return `Err`.
    #[instrument(level = "info", skip(self), fields(strategy = ?self.config.strategy, input = %self.config.input_dir.display()))]
    pub fn run(&self) -> Result<Vec<RunReport>> {
        let cfg = &self.config;
        if cfg.chunk_size == 0 {
            bail!("chunk size must be at least one page");
        }
        if !cfg.input_dir.is_dir() {
            bail!("input folder {:?} does not exist", cfg.input_dir);
        }
        let pdfs = list_files(&cfg.input_dir, "pdf")?;
        let docxs = list_files(&cfg.input_dir, "docx")?;
        if pdfs.is_empty() && docxs.is_empty() {
            warn!("no PDF or DOCX files found in {:?}", cfg.input_dir);
            return Ok(Vec::new());
        }
        info!(pdfs = pdfs.len(), docx = docxs.len(), "found input files");

        fs::create_dir_all(cfg.converted_dir())
            .with_context(|| format!("creating {:?}", cfg.converted_dir()))?;
        fs::create_dir_all(cfg.scratch_dir())
            .with_context(|| format!("creating {:?}", cfg.scratch_dir()))?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(cfg.workers.max(1))
            .thread_name(|i| format!("convert-{}", i))
            .build()
            .context("building conversion pool")?;

        let mut reports = Vec::new();
        if cfg.strategy == Strategy::GlobalPool {
            reports.extend(self.run_global(&pool, &pdfs)?);
        } else {
            for pdf in &pdfs {
                let started = Instant::now();
                let mut report =
                    RunReport::new(pdf, &file_stem(pdf), SourceKind::Pdf, Some(cfg.strategy));
                let result = self.process_pdf(pdf, &pool, &mut report);
                reports.push(self.settle(report, started, result));
            }
        }

        reports.extend(self.export_docx_files(&docxs));
        self.cleanup_scratch();
        self.write_quality_report(&reports);

        let failed = reports.iter().filter(|r| !r.succeeded()).count();
        let tables: usize = reports.iter().map(|r| r.tables_exported).sum();
        info!(
            files = reports.len(),
            failed,
            tables,
            "run complete, output in {:?}",
            cfg.output_dir
        );
        Ok(reports)
    }

    /// Export the tables of every DOCX in the input folder, converting nothing.
    #[instrument(level = "info", skip(self), fields(input = %self.config.input_dir.display()))]
    pub fn run_docx(&self) -> Result<Vec<RunReport>> {
        let cfg = &self.config;
        if !cfg.input_dir.is_dir() {
            bail!("input folder {:?} does not exist", cfg.input_dir);
        }
        let docxs = list_files(&cfg.input_dir, "docx")?;
        if docxs.is_empty() {
            warn!("no DOCX files found in {:?}", cfg.input_dir);
            return Ok(Vec::new());
        }
        fs::create_dir_all(&cfg.output_dir)
            .with_context(|| format!("creating {:?}", cfg.output_dir))?;
        let reports = self.export_docx_files(&docxs);
        self.write_quality_report(&reports);
        let failed = reports.iter().filter(|r| !r.succeeded()).count();
        info!(files = reports.len(), failed, "docx export complete");
        Ok(reports)
    }

    fn export_docx_files(&self, docxs: &[PathBuf]) -> Vec<RunReport> {
        docxs
            .iter()
            .map(|docx| {
                let started = Instant::now();
                let mut report = RunReport::new(docx, &file_stem(docx), SourceKind::Docx, None);
                let result = self.process_docx(docx, &mut report);
                self.settle(report, started, result)
            })
            .collect()
    }

    /// Stamp timing, log any error and persist the JSON report.
    fn settle(&self, mut report: RunReport, started: Instant, result: Result<()>) -> RunReport {
        report.elapsed_ms = started.elapsed().as_millis();
        match result {
            Ok(()) => info!(
                file = %report.stem,
                tables = report.tables_exported,
                elapsed_ms = report.elapsed_ms as u64,
                "done"
            ),
            Err(e) => {
                error!(file = %report.stem, "processing failed: {:#}", e);
                report.error = Some(format!("{:#}", e));
            }
        }
        let path = self.config.report_path(&report.stem);
        if let Err(e) = write_report(&report, &path) {
            warn!(file = %report.stem, "could not write report: {:#}", e);
        }
        report
    }

    fn process_pdf(&self, pdf: &Path, pool: &ThreadPool, report: &mut RunReport) -> Result<()> {
        let merged = self.config.merged_docx(&report.stem);
        let mut titles = None;
        if merged.exists() {
            info!(pdf = %report.stem, "reusing {:?}, skipping conversion", merged);
            report.resumed = true;
        } else {
            titles = self.convert_pdf(pdf, &merged, pool, report)?;
        }
        self.export_merged(&merged, titles, report)
    }

    /// Produce `merged` from `pdf`. Selective conversion also returns the
    /// titles captured for each converted table.
    fn convert_pdf(
        &self,
        pdf: &Path,
        merged: &Path,
        pool: &ThreadPool,
        report: &mut RunReport,
    ) -> Result<Option<Vec<TableTitles>>> {
        let cfg = &self.config;
        match cfg.strategy {
            Strategy::Sequential => {
                report.pages = pdf::page_count(pdf).ok();
                info!(pdf = %report.stem, "converting whole document");
                self.converter
                    .convert(pdf, merged, None)
                    .with_context(|| format!("converting {:?}", pdf))?;
                Ok(None)
            }
            Strategy::Chunked | Strategy::Parallel | Strategy::GlobalPool => {
                let pages = pdf::page_count_or(pdf, cfg.page_fallback);
                report.pages = Some(pages);
                let ranges = split_pages(pages, cfg.chunk_size)?;
                info!(pdf = %report.stem, pages, chunks = ranges.len(), "split into chunks");
                let jobs = jobs_for(pdf, &ranges, &cfg.scratch_dir());
                let on_pool = (cfg.strategy != Strategy::Chunked).then_some(pool);
                let outcomes = run_jobs(on_pool, self.converter.as_ref(), &jobs);
                self.assemble(outcomes, merged, report)?;
                Ok(None)
            }
            Strategy::Selective => {
                let texts = pdf::page_texts(pdf)?;
                self.convert_selected(pdf, &texts, merged, pool, report)
                    .map(Some)
            }
        }
    }

    /// Convert only pages carrying a target subtitle, one job per page.
    fn convert_selected(
        &self,
        pdf: &Path,
        texts: &[String],
        merged: &Path,
        pool: &ThreadPool,
        report: &mut RunReport,
    ) -> Result<Vec<TableTitles>> {
        report.pages = Some(texts.len());
        let selected = scan::relevant_pages(texts);
        if selected.is_empty() {
            bail!("none of {} pages carries a target subtitle", texts.len());
        }
        info!(
            pdf = %report.stem,
            pages = ?selected.keys().map(|p| p + 1).collect::<Vec<_>>(),
            "selected {} of {} pages",
            selected.len(),
            texts.len()
        );

        let scratch = self.config.scratch_dir();
        let jobs: Vec<ChunkJob> = selected
            .keys()
            .map(|&page| ChunkJob::page(pdf, page, &scratch))
            .collect();
        let outcomes = run_jobs(Some(pool), self.converter.as_ref(), &jobs);

        let pages: Vec<PageTitles> = outcomes
            .iter()
            .filter(|o| o.is_converted())
            .map(|o| PageTitles {
                subtitle: selected.get(&o.range.start).cloned().unwrap_or_default(),
                table_titles: texts
                    .get(o.range.start)
                    .map(|t| scan::table_titles(t))
                    .unwrap_or_else(scan::default_table_titles),
                table_count: o.table_count(),
            })
            .collect();

        self.assemble(outcomes, merged, report)?;
        Ok(titles::from_pages(&pages))
    }

    /// Merge the converted chunks, in the order given, into `merged`.
    fn assemble(
        &self,
        outcomes: Vec<ChunkOutcome>,
        merged: &Path,
        report: &mut RunReport,
    ) -> Result<()> {
        let converted: Vec<PathBuf> = outcomes
            .iter()
            .filter_map(|o| o.docx_path().map(Path::to_path_buf))
            .collect();
        let expected: usize = outcomes.iter().map(|o| o.range.expected_tables()).sum();
        let found: usize = outcomes.iter().map(ChunkOutcome::table_count).sum();
        info!(
            pdf = %report.stem,
            converted = converted.len(),
            failed = outcomes.len() - converted.len(),
            "found {}/{} expected tables",
            found,
            expected
        );
        report.chunks = outcomes;

        if converted.is_empty() {
            bail!("no chunks converted");
        }
        let merge = merge_chunks(&converted, merged)?;
        if merge.outcome.is_degraded() {
            warn!(pdf = %report.stem, "merged document holds only the first chunk");
        }
        report.merge = Some(merge);
        Ok(())
    }

    fn export_merged(
        &self,
        merged: &Path,
        titles: Option<Vec<TableTitles>>,
        report: &mut RunReport,
    ) -> Result<()> {
        let cfg = &self.config;
        let doc = read_document(merged)?;
        let layout = match titles {
            Some(t) => Layout::Titled(t),
            None if cfg.strategy == Strategy::Selective => {
                Layout::Titled(titles::infer_from_document(&doc))
            }
            None if cfg.strategy == Strategy::GlobalPool => {
                Layout::StandardTitled(titles::headings_from_document(&doc))
            }
            None => Layout::Standard,
        };
        let tables: Vec<Table> = doc.tables().cloned().collect();

        let summary = SummaryInfo {
            heading: SUMMARY_HEADING.to_string(),
            source_file: source_name(&report.source),
            source_type: "PDF".to_string(),
            chunk_size: matches!(
                cfg.strategy,
                Strategy::Chunked | Strategy::Parallel | Strategy::GlobalPool
            )
            .then_some(cfg.chunk_size),
            workers: matches!(
                cfg.strategy,
                Strategy::Parallel | Strategy::GlobalPool | Strategy::Selective
            )
            .then_some(cfg.workers),
            pages_converted: (cfg.strategy == Strategy::Selective)
                .then(|| report.chunks.iter().filter(|c| c.is_converted()).count()),
            method: cfg.strategy.describe().to_string(),
        };
        self.export(&tables, &layout, &summary, report)?;

        if !cfg.keep_docx {
            match fs::remove_file(merged) {
                Ok(()) => debug!(docx = %merged.display(), "removed merged document"),
                Err(e) => warn!(docx = %merged.display(), "could not remove: {}", e),
            }
        }
        Ok(())
    }

    fn process_docx(&self, docx: &Path, report: &mut RunReport) -> Result<()> {
        info!(docx = %report.stem, "exporting tables directly");
        let doc = read_document(docx)?;
        let tables: Vec<Table> = doc.tables().cloned().collect();
        let summary = SummaryInfo {
            heading: "DOCX to Excel Extraction Summary".to_string(),
            source_file: source_name(docx),
            source_type: "DOCX".to_string(),
            method: "Direct DOCX table extraction".to_string(),
            ..Default::default()
        };
        self.export(&tables, &Layout::Standard, &summary, report)
    }

    fn export(
        &self,
        tables: &[Table],
        layout: &Layout,
        summary: &SummaryInfo,
        report: &mut RunReport,
    ) -> Result<()> {
        if tables.is_empty() {
            bail!("no tables found in {}", summary.source_file);
        }
        let out = self.config.workbook_path(&report.stem);
        report.tables_exported = export_tables(tables, layout, summary, &out)?;
        report.workbook = Some(out);

        let quality = Classifier::new()?.assess_all(tables);
        let confidence = classify::average_confidence(&quality);
        info!(file = %report.stem, confidence, "table content checked");
        report.confidence = Some(confidence);
        report.categories_found = classify::categories_found(&quality);
        report.quality = quality;
        Ok(())
    }

    /// `extraction_quality_report.txt` over every exported file of the run.
    fn write_quality_report(&self, reports: &[RunReport]) {
        let files: Vec<(&str, &[TableQuality])> = reports
            .iter()
            .filter(|r| r.workbook.is_some())
            .map(|r| (r.stem.as_str(), r.quality.as_slice()))
            .collect();
        if files.is_empty() {
            return;
        }
        let path = self.config.quality_report_path();
        if let Err(e) = classify::write_quality_report(&path, &files) {
            warn!("could not write quality report: {:#}", e);
        }
    }

    /// Every PDF's chunks go through the one pool; results are grouped back
    /// by stem before merging.
    fn run_global(&self, pool: &ThreadPool, pdfs: &[PathBuf]) -> Result<Vec<RunReport>> {
        let cfg = &self.config;
        let started = Instant::now();
        let scratch = cfg.scratch_dir();

        let mut pending = Vec::new();
        let mut jobs = Vec::new();
        for pdf in pdfs {
            let stem = file_stem(pdf);
            let mut report = RunReport::new(pdf, &stem, SourceKind::Pdf, Some(cfg.strategy));
            if cfg.merged_docx(&stem).exists() {
                info!(pdf = %stem, "reusing converted document, skipping conversion");
                report.resumed = true;
            } else {
                let pages = pdf::page_count_or(pdf, cfg.page_fallback);
                report.pages = Some(pages);
                jobs.extend(jobs_for(pdf, &split_pages(pages, cfg.chunk_size)?, &scratch));
            }
            pending.push(report);
        }

        info!(jobs = jobs.len(), pdfs = pdfs.len(), workers = cfg.workers, "submitting to shared pool");
        let mut by_stem: BTreeMap<String, Vec<ChunkOutcome>> = BTreeMap::new();
        for outcome in run_jobs(Some(pool), self.converter.as_ref(), &jobs) {
            by_stem.entry(outcome.stem.clone()).or_default().push(outcome);
        }

        let reports = pending
            .into_iter()
            .map(|mut report| {
                let outcomes = by_stem.remove(&report.stem).unwrap_or_default();
                let result = self.finish_global(outcomes, &mut report);
                self.settle(report, started, result)
            })
            .collect();
        Ok(reports)
    }

    fn finish_global(&self, outcomes: Vec<ChunkOutcome>, report: &mut RunReport) -> Result<()> {
        let merged = self.config.merged_docx(&report.stem);
        if !report.resumed {
            self.assemble(outcomes, &merged, report)?;
        }
        self.export_merged(&merged, None, report)
    }

    fn cleanup_scratch(&self) {
        let scratch = self.config.scratch_dir();
        if !scratch.exists() {
            return;
        }
        match fs::remove_dir_all(&scratch) {
            Ok(()) => debug!(dir = %scratch.display(), "removed chunk scratch folder"),
            Err(e) => warn!(dir = %scratch.display(), "could not remove scratch folder: {}", e),
        }
    }
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::testing::{init_test_logging, FakeConverter};
    use crate::docx::{write_document, Block};
    use calamine::{open_workbook_auto, Reader};
    use std::collections::HashSet;
    use tempfile::{tempdir, TempDir};

    fn workspace(pdfs: &[&str]) -> Result<(TempDir, PipelineConfig)> {
        init_test_logging();
        let dir = tempdir()?;
        let input = dir.path().join("input");
        fs::create_dir_all(&input)?;
        for name in pdfs {
            fs::write(input.join(name), b"%PDF-1.4 placeholder")?;
        }
        let cfg = PipelineConfig {
            input_dir: input,
            output_dir: dir.path().join("extracted_data"),
            chunk_size: 2,
            workers: 3,
            page_fallback: 5,
            ..PipelineConfig::default()
        };
        Ok((dir, cfg))
    }

    fn labels(path: &Path) -> Result<Vec<String>> {
        Ok(read_document(path)?
            .tables()
            .map(|t| t.rows[1][0].clone())
            .collect())
    }

    fn expected_labels(stem: &str, pages: impl Iterator<Item = usize>) -> Vec<String> {
        pages
            .flat_map(|p| (0..4).map(move |t| format!("{}:p{}:t{}", stem, p, t)))
            .collect()
    }

    #[test]
    fn parallel_run_keeps_page_order() -> Result<()> {
        let (_dir, cfg) = workspace(&["a.pdf"])?;
        let conv = FakeConverter {
            stagger: true,
            ..Default::default()
        };
        let pipeline = Pipeline::new(cfg.clone(), Arc::new(conv));
        let reports = pipeline.run()?;

        assert_eq!(reports.len(), 1);
        let r = &reports[0];
        assert!(r.succeeded(), "{:?}", r.error);
        assert_eq!(r.chunks.len(), 3);
        assert_eq!(r.tables_exported, 20);
        assert_eq!(r.merge.as_ref().map(|m| m.tables), Some(20));
        assert_eq!(labels(&cfg.merged_docx("a"))?, expected_labels("a", 0..5));
        assert!(cfg.workbook_path("a").exists());
        assert!(cfg.report_path("a").exists());
        assert!(!cfg.scratch_dir().exists());
        Ok(())
    }

    #[test]
    fn failed_chunk_is_left_out() -> Result<()> {
        let (_dir, cfg) = workspace(&["a.pdf"])?;
        let conv = FakeConverter {
            fail_pages: HashSet::from([2]),
            ..Default::default()
        };
        let reports = Pipeline::new(cfg.clone(), Arc::new(conv)).run()?;
        let r = &reports[0];
        assert!(r.succeeded());
        assert_eq!(r.failed_chunks(), 1);
        assert_eq!(r.tables_exported, 12);
        assert_eq!(
            labels(&cfg.merged_docx("a"))?,
            expected_labels("a", [0, 1, 4].into_iter())
        );
        Ok(())
    }

    #[test]
    fn one_bad_file_does_not_stop_the_run() -> Result<()> {
        let (_dir, cfg) = workspace(&["a.pdf", "b.pdf"])?;
        let cfg = PipelineConfig {
            chunk_size: 5,
            ..cfg
        };
        let conv = FakeConverter {
            fail_pages: (0..5).collect(),
            ..Default::default()
        };
        write_document(
            &cfg.input_dir.join("c.docx"),
            &[Block::Table(Table::new(vec![vec!["h".into()], vec!["v".into()]]))],
        )?;
        let reports = Pipeline::new(cfg.clone(), Arc::new(conv)).run()?;

        assert_eq!(reports.len(), 3);
        assert!(!reports[0].succeeded());
        assert_eq!(reports[0].error.as_deref(), Some("no chunks converted"));
        assert!(!reports[1].succeeded());
        assert_eq!(reports[2].kind, SourceKind::Docx);
        assert!(reports[2].succeeded());
        assert_eq!(reports[2].tables_exported, 1);
        assert!(cfg.input_dir.join("c.docx").exists());
        Ok(())
    }

    #[test]
    fn existing_merged_docx_is_reused() -> Result<()> {
        let (_dir, cfg) = workspace(&["a.pdf"])?;
        fs::create_dir_all(cfg.converted_dir())?;
        write_document(
            &cfg.merged_docx("a"),
            &[Block::Table(Table::new(vec![vec!["x".into()], vec!["earlier".into()]]))],
        )?;
        let conv = FakeConverter {
            fail_pages: (0..5).collect(),
            ..Default::default()
        };
        let reports = Pipeline::new(cfg.clone(), Arc::new(conv)).run()?;
        assert!(reports[0].resumed);
        assert!(reports[0].succeeded());
        assert!(reports[0].chunks.is_empty());
        assert_eq!(reports[0].tables_exported, 1);
        Ok(())
    }

    #[test]
    fn global_pool_groups_results_per_pdf() -> Result<()> {
        let (_dir, cfg) = workspace(&["a.pdf", "b.pdf"])?;
        let cfg = PipelineConfig {
            strategy: Strategy::GlobalPool,
            ..cfg
        };
        let conv = FakeConverter {
            stagger: true,
            subtitles: true,
            ..Default::default()
        };
        let reports = Pipeline::new(cfg.clone(), Arc::new(conv)).run()?;
        assert_eq!(reports.len(), 2);
        for (r, stem) in reports.iter().zip(["a", "b"]) {
            assert_eq!(r.stem, stem);
            assert!(r.succeeded());
            assert!(r.chunks.iter().all(|c| c.stem == stem));
            assert_eq!(labels(&cfg.merged_docx(stem))?, expected_labels(stem, 0..5));
        }

        // each sheet carries the heading printed above its own page
        let mut wb = open_workbook_auto(cfg.workbook_path("b"))?;
        let sheet = wb.worksheet_range("P3_Table2_Brokerage_Bre")?;
        let text = |row: u32| {
            sheet
                .get_value((row, 0))
                .map(|d| d.to_string())
                .unwrap_or_default()
        };
        assert_eq!(text(0), "Source: b.pdf");
        assert_eq!(
            text(6),
            "Title: 投資部門別取引状況 Trading by Type of Investors p2"
        );
        assert_eq!(text(7), "Subtitle: 長期国債先物 (JGB(10-year) Futures)");
        assert_eq!(text(10), "b:p2:t1");
        Ok(())
    }

    #[test]
    fn sequential_converts_whole_document_once() -> Result<()> {
        let (_dir, cfg) = workspace(&["a.pdf"])?;
        let cfg = PipelineConfig {
            strategy: Strategy::Sequential,
            keep_docx: false,
            ..cfg
        };
        let reports = Pipeline::new(cfg.clone(), Arc::new(FakeConverter::default())).run()?;
        let r = &reports[0];
        assert!(r.succeeded());
        assert!(r.chunks.is_empty() && r.merge.is_none());
        assert_eq!(r.tables_exported, 12);
        assert!(!cfg.merged_docx("a").exists());
        Ok(())
    }

    #[test]
    fn selected_pages_carry_their_titles() -> Result<()> {
        let (dir, cfg) = workspace(&[])?;
        let cfg = PipelineConfig {
            strategy: Strategy::Selective,
            ..cfg
        };
        fs::create_dir_all(cfg.scratch_dir())?;
        fs::create_dir_all(cfg.converted_dir())?;
        let texts: Vec<String> = vec![
            "表紙".into(),
            "JGB(10-year) Futures 長期国債先物\n総計・自己合計・委託合計\n委託内訳".into(),
            "Options on JGB(10-year) Futures".into(),
            "3-Month TONA Futures".into(),
        ];
        let pool = ThreadPoolBuilder::new().num_threads(2).build()?;
        let pdf = dir.path().join("r.pdf");
        let merged = cfg.merged_docx("r");
        let mut report = RunReport::new(&pdf, "r", SourceKind::Pdf, Some(cfg.strategy));

        let pipeline = Pipeline::new(cfg, Arc::new(FakeConverter::default()));
        let titles = pipeline.convert_selected(&pdf, &texts, &merged, &pool, &mut report)?;

        assert_eq!(report.chunks.len(), 2);
        assert_eq!(report.chunks[0].id, "r-P2");
        assert_eq!(labels(&merged)?, expected_labels("r", [1, 3].into_iter()));
        assert_eq!(titles.len(), 8);
        assert_eq!(titles[0].subtitle, "JGB(10-year) Futures 長期国債先物");
        assert_eq!(titles[1].table_title, "委託内訳 Breakdown of Brokerage");
        assert_eq!(titles[2].table_title, "Table Title 3 (Not Found)");
        assert_eq!(titles[4].subtitle, "3-Month TONA Futures");
        Ok(())
    }

    #[test]
    fn exported_tables_are_checked_against_their_position() -> Result<()> {
        let (_dir, cfg) = workspace(&[])?;
        let row = |cells: &[&str]| cells.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        let mut brokerage = vec![
            row(&["委託内訳 Breakdown of Brokerage", "", "", "", "", "", "", ""]),
            row(&["", "", "数量", "比率", "差引き", "金額", "比率", "差引き"]),
        ];
        for name in ["法人計", "個人計", "海外投資家計", "証券会社"] {
            for side in ["売り", "買い", "合計"] {
                brokerage.push(row(&[name, side, "1,000", "5.0", "▲10", "2,000", "6.0", "20"]));
            }
        }
        let blocks = vec![
            Block::Table(Table::new(vec![row(&["unrelated"])])),
            Block::Table(Table::new(brokerage)),
        ];
        write_document(&cfg.input_dir.join("d.docx"), &blocks)?;

        let reports = Pipeline::new(cfg.clone(), Arc::new(FakeConverter::default())).run_docx()?;
        let r = &reports[0];
        assert_eq!(r.quality.len(), 2);
        assert_eq!(r.quality[0].confidence, 0.0);
        assert!(r.quality[1].matches_position());
        assert_eq!(r.quality[1].rows, 12);
        assert!((r.quality[1].confidence - 1.0).abs() < 1e-9);
        assert_eq!(r.confidence, Some(0.5));
        assert_eq!(r.categories_found, vec!["法人計", "個人計", "海外投資家計", "証券会社"]);

        let text = fs::read_to_string(cfg.quality_report_path())?;
        assert!(text.contains("File: d"));
        assert!(text.contains("    Rows: 12/12"));
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(cfg.report_path("d"))?)?;
        assert_eq!(json["confidence"], 0.5);
        Ok(())
    }

    #[test]
    fn docx_only_run_skips_pdfs() -> Result<()> {
        let (_dir, cfg) = workspace(&["a.pdf"])?;
        let tables: Vec<Block> = (0..5)
            .map(|i| Block::Table(Table::new(vec![vec!["h".into()], vec![format!("v{}", i)]])))
            .collect();
        write_document(&cfg.input_dir.join("d.docx"), &tables)?;

        let reports = Pipeline::new(cfg.clone(), Arc::new(FakeConverter::default())).run_docx()?;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].stem, "d");
        assert_eq!(reports[0].tables_exported, 5);
        assert!(cfg.workbook_path("d").exists());
        assert!(!cfg.workbook_path("a").exists());
        Ok(())
    }

    #[test]
    fn missing_input_folder_is_fatal() {
        let dir = tempdir().unwrap();
        let cfg = PipelineConfig {
            input_dir: dir.path().join("nope"),
            output_dir: dir.path().join("out"),
            ..PipelineConfig::default()
        };
        assert!(Pipeline::new(cfg, Arc::new(FakeConverter::default()))
            .run()
            .is_err());
    }

    #[test]
    fn run_jobs_sorts_by_sequence() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let mut jobs = jobs_for(&dir.path().join("t.pdf"), &split_pages(4, 1)?, dir.path());
        jobs.extend(jobs_for(&dir.path().join("s.pdf"), &split_pages(8, 1)?, dir.path()));
        // submitted back to front, so input order is never the answer
        jobs.reverse();
        let pool = ThreadPoolBuilder::new().num_threads(4).build()?;
        let conv = FakeConverter {
            stagger: true,
            ..Default::default()
        };

        let expected: Vec<(String, usize)> = (1..=8)
            .map(|seq| ("s".to_string(), seq))
            .chain((1..=4).map(|seq| ("t".to_string(), seq)))
            .collect();
        for pool in [Some(&pool), None] {
            let got: Vec<(String, usize)> = run_jobs(pool, &conv, &jobs)
                .into_iter()
                .map(|o| (o.stem, o.range.seq))
                .collect();
            assert_eq!(got, expected);
        }
        Ok(())
    }

    #[test]
    fn folder_names_with_glob_characters_are_listed() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let input = dir.path().join("input[2025]");
        fs::create_dir_all(&input)?;
        fs::write(input.join("a.pdf"), b"%PDF-1.4 placeholder")?;
        fs::write(input.join("~$lock.docx"), b"")?;
        assert_eq!(list_files(&input, "pdf")?, vec![input.join("a.pdf")]);
        assert!(list_files(&input, "docx")?.is_empty());

        let cfg = PipelineConfig {
            input_dir: input,
            output_dir: dir.path().join("out"),
            chunk_size: 5,
            page_fallback: 5,
            ..PipelineConfig::default()
        };
        let reports = Pipeline::new(cfg.clone(), Arc::new(FakeConverter::default())).run()?;
        assert_eq!(reports.len(), 1);
        assert!(reports[0].succeeded(), "{:?}", reports[0].error);
        assert!(cfg.workbook_path("a").exists());
        Ok(())
    }
}
