use anyhow::Result;
use clap::Parser;
use pdfgrid::convert::CommandConverter;
use pdfgrid::pipeline::{Pipeline, PipelineConfig, Strategy};
use std::{
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Convert report PDFs to DOCX and export every table to Excel"
)]
struct Args {
    /// Folder holding the PDF and DOCX inputs.
    #[arg(long, default_value = "input")]
    input: PathBuf,
    /// Folder for workbooks, converted documents and run reports.
    #[arg(long, default_value = "extracted_data")]
    output: PathBuf,
    #[arg(long, value_enum, default_value_t = Strategy::Parallel)]
    strategy: Strategy,
    /// Pages per chunk.
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Conversion worker threads.
    #[arg(long)]
    workers: Option<usize>,
    /// PDF to DOCX converter program.
    #[arg(long, default_value = "pdf2docx")]
    converter: PathBuf,
    /// Keep merged DOCX files after export (default).
    #[arg(long, overrides_with = "no_keep_docx")]
    keep_docx: bool,
    /// Remove merged DOCX files after export.
    #[arg(long, overrides_with = "keep_docx")]
    no_keep_docx: bool,
    /// Ask for chunk size, worker count and DOCX cleanup on stdin.
    #[arg(long)]
    interactive: bool,
}

/// Read a positive number from stdin, falling back to `default`.
fn prompt_usize(label: &str, default: usize) -> usize {
    print!("{} (default {}): ", label, default);
    let _ = io::stdout().flush();
    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() {
        return default;
    }
    match line.trim() {
        "" => default,
        answer => match answer.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                warn!("invalid answer {:?}, using {}", answer, default);
                default
            }
        },
    }
}

/// `y`/`yes` and `n`/`no` in any case; anything else keeps `default`.
fn parse_yes_no(answer: &str, default: bool) -> bool {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

fn prompt_yes_no(question: &str, default: bool) -> bool {
    print!("{} ({}): ", question, if default { "Y/n" } else { "y/N" });
    let _ = io::stdout().flush();
    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() {
        return default;
    }
    parse_yes_no(&line, default)
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) resolve configuration ────────────────────────────────────
    let args = Args::parse();
    let mut config = PipelineConfig::for_strategy(args.strategy);
    config.input_dir = args.input;
    config.output_dir = args.output;
    config.keep_docx = args.keep_docx || !args.no_keep_docx;
    if let Some(n) = args.chunk_size {
        config.chunk_size = n;
    }
    if let Some(n) = args.workers {
        config.workers = n;
    }
    if args.interactive {
        if matches!(
            config.strategy,
            Strategy::Chunked | Strategy::Parallel | Strategy::GlobalPool
        ) {
            config.chunk_size = prompt_usize("Chunk size", config.chunk_size);
        }
        if config.strategy != Strategy::Sequential && config.strategy != Strategy::Chunked {
            config.workers = prompt_usize("Max workers", config.workers);
        }
        let delete = prompt_yes_no("Delete intermediate DOCX files?", !config.keep_docx);
        config.keep_docx = !delete;
    }
    info!(
        strategy = ?config.strategy,
        chunk_size = config.chunk_size,
        workers = config.workers,
        "startup"
    );

    // ─── 3) run ──────────────────────────────────────────────────────
    let converter = Arc::new(CommandConverter::new(args.converter));
    let reports = Pipeline::new(config, converter).run()?;

    for r in &reports {
        match (&r.workbook, &r.error) {
            (Some(wb), _) => info!(file = %r.stem, tables = r.tables_exported, "→ {}", wb.display()),
            (None, Some(e)) => warn!(file = %r.stem, "failed: {}", e),
            (None, None) => {}
        }
    }
    Ok(())
}
