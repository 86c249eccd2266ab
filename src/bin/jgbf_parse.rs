use anyhow::Result;
use clap::Parser;
use pdfgrid::jgbf::JgbfParser;
use pdfgrid::pipeline::JgbfConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Normalize extracted workbooks into the JGBF_DATA time-series sheet"
)]
struct Args {
    /// Folder holding `*_extracted.xlsx` workbooks.
    #[arg(long, default_value = "extracted_data")]
    input: PathBuf,
    #[arg(long, default_value = "parsed_output")]
    output: PathBuf,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    let args = Args::parse();
    let parser = JgbfParser::new(JgbfConfig::new(&args.input, &args.output))?;
    let summary = parser.run()?;
    info!(
        files = summary.files,
        points = summary.points,
        series = summary.series,
        dates = summary.dates,
        "output saved to {}",
        summary.output.display()
    );
    Ok(())
}
