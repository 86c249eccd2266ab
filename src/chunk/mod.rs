// src/chunk/mod.rs

use anyhow::{bail, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Tables laid out on every report page.
pub const TABLES_PER_PAGE: usize = 4;

/// A contiguous run of PDF pages converted as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PageRange {
    /// 1-based position of this range within its PDF; only used to restore order.
    pub seq: usize,
    /// First page, 0-based, inclusive.
    pub start: usize,
    /// One past the last page.
    pub end: usize,
}

impl PageRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn expected_tables(&self) -> usize {
        self.len() * TABLES_PER_PAGE
    }

    /// Single-page range used by selective conversion.
    pub fn single(page: usize) -> Self {
        Self {
            seq: page + 1,
            start: page,
            end: page + 1,
        }
    }
}

/// Tile `[0, total_pages)` with ranges of `chunk_size` pages, the last one clamped.
pub fn split_pages(total_pages: usize, chunk_size: usize) -> Result<Vec<PageRange>> {
    if chunk_size == 0 {
        bail!("chunk size must be at least one page");
    }

    let ranges = (0..total_pages)
        .step_by(chunk_size)
        .enumerate()
        .map(|(i, start)| PageRange {
            seq: i + 1,
            start,
            end: (start + chunk_size).min(total_pages),
        })
        .collect();
    Ok(ranges)
}

/// One conversion unit bound to its source PDF.
#[derive(Debug, Clone)]
pub struct ChunkJob {
    pub pdf_path: PathBuf,
    /// File stem of the PDF; groups results back per document.
    pub stem: String,
    pub range: PageRange,
    pub scratch_dir: PathBuf,
    pub id: String,
}

impl ChunkJob {
    pub fn new(pdf_path: &Path, range: PageRange, scratch_dir: &Path) -> Self {
        let stem = file_stem(pdf_path);
        Self {
            id: format!("{}-C{}", stem, range.seq),
            pdf_path: pdf_path.to_path_buf(),
            stem,
            range,
            scratch_dir: scratch_dir.to_path_buf(),
        }
    }

    /// Single-page job; ids follow the page number rather than the chunk number.
    pub fn page(pdf_path: &Path, page: usize, scratch_dir: &Path) -> Self {
        let mut job = Self::new(pdf_path, PageRange::single(page), scratch_dir);
        job.id = format!("{}-P{}", job.stem, page + 1);
        job
    }

    /// Where the converter writes this job's DOCX.
    pub fn docx_path(&self) -> PathBuf {
        self.scratch_dir
            .join(format!("{}_chunk_{}.docx", self.stem, self.range.seq))
    }
}

/// Build one job per range for `pdf_path`.
pub fn jobs_for(pdf_path: &Path, ranges: &[PageRange], scratch_dir: &Path) -> Vec<ChunkJob> {
    ranges
        .iter()
        .map(|r| ChunkJob::new(pdf_path, *r, scratch_dir))
        .collect()
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_tiles(ranges: &[PageRange], total: usize) {
        let mut cursor = 0;
        for (i, r) in ranges.iter().enumerate() {
            assert_eq!(r.seq, i + 1);
            assert_eq!(r.start, cursor, "gap or overlap before {:?}", r);
            assert!(r.end > r.start);
            cursor = r.end;
        }
        assert_eq!(cursor, total);
    }

    #[test]
    fn ranges_tile_every_page_count() {
        for total in 0..40 {
            for size in 1..12 {
                let ranges = split_pages(total, size).unwrap();
                assert_tiles(&ranges, total);
                assert!(ranges.iter().all(|r| r.len() <= size));
                assert_eq!(ranges.len(), total.div_ceil(size));
            }
        }
    }

    #[test]
    fn last_range_is_clamped() {
        let ranges = split_pages(24, 5).unwrap();
        let last = ranges.last().unwrap();
        assert_eq!((last.start, last.end), (20, 24));
        assert_eq!(last.expected_tables(), 16);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(split_pages(10, 0).is_err());
    }

    #[test]
    fn job_ids_and_paths() {
        let scratch = Path::new("/tmp/chunks");
        let ranges = split_pages(12, 6).unwrap();
        let jobs = jobs_for(Path::new("in/report_20250314.pdf"), &ranges, scratch);
        assert_eq!(jobs[1].id, "report_20250314-C2");
        assert_eq!(
            jobs[1].docx_path(),
            scratch.join("report_20250314_chunk_2.docx")
        );

        let page = ChunkJob::page(Path::new("in/r.pdf"), 4, scratch);
        assert_eq!(page.id, "r-P5");
        assert_eq!((page.range.start, page.range.end), (4, 5));
    }
}
