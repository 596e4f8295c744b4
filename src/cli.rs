use crate::capture::CaptureReader;
use crate::recorder::{Customization, SpecRecorder};
use crate::scanner::CaptureScanner;
use crate::serializer::{serialize_json, serialize_yaml, write_to_file};
use crate::spec_store::{Patch, SpecDocument};
use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use std::path::PathBuf;

/// openapi-from-traffic - Derive a Swagger 2.0 document from captured HTTP traffic
#[derive(Parser, Debug)]
#[command(name = "openapi-from-traffic")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Capture file (.jsonl) or directory of capture files
    #[arg(value_name = "CAPTURE_PATH")]
    pub capture_path: PathBuf,

    /// Output format (yaml or json)
    #[arg(short = 'f', long = "format", value_enum, default_value = "yaml")]
    pub output_format: OutputFormat,

    /// Output file path (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// Project metadata seeding the info object (Cargo.toml or .json)
    #[arg(long = "package-info", value_name = "PATH", default_value = "Cargo.toml")]
    pub package_info: PathBuf,

    /// Overrides the document title
    #[arg(long = "title")]
    pub title: Option<String>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

/// Validate and log already-parsed arguments
pub fn parse_args_from_parsed(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);

    if !args.capture_path.exists() {
        anyhow::bail!("Capture path does not exist: {}", args.capture_path.display());
    }

    info!("Capture path: {}", args.capture_path.display());
    info!("Output format: {:?}", args.output_format);
    match &args.output_path {
        Some(output) => info!("Output file: {}", output.display()),
        None => info!("Output: stdout"),
    }

    Ok(args)
}

/// Counters reported after a replay
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub files: usize,
    pub recorded: usize,
    pub unmatched: usize,
    pub skipped_lines: usize,
}

/// Replays every captured exchange through a fresh recorder.
pub fn replay(args: &CliArgs) -> Result<(SpecDocument, ReplaySummary)> {
    let mut builder = SpecRecorder::builder().package_info_path(&args.package_info);
    if let Some(title) = args.title.clone() {
        builder = builder.customize(Customization::Patch(Patch::new(move |mut doc| {
            doc.info.title = title.clone();
            doc
        })));
    }
    let recorder = builder.build();

    info!("Scanning for capture files...");
    let scan_result = CaptureScanner::new(args.capture_path.clone()).scan()?;
    if scan_result.capture_files.is_empty() {
        anyhow::bail!("No capture files found under {}", args.capture_path.display());
    }
    info!("Found {} capture files", scan_result.capture_files.len());

    let mut summary = ReplaySummary::default();
    for capture in CaptureReader::read_files(&scan_result.capture_files)
        .into_iter()
        .filter_map(Result::ok)
    {
        debug!(
            "Replaying {} exchanges from {}",
            capture.exchanges.len(),
            capture.path.display()
        );
        summary.files += 1;
        summary.skipped_lines += capture.skipped;
        for exchange in &capture.exchanges {
            match recorder.interceptor().observe(exchange) {
                Some(_) => summary.recorded += 1,
                None => summary.unmatched += 1,
            }
        }
    }

    if summary.recorded == 0 {
        warn!("No exchange matched a route; the document has no paths");
    }
    if let Some(e) = recorder.last_patch_error() {
        warn!("Title override failed: {}", e);
    }

    Ok((recorder.spec(), summary))
}

/// Run the main workflow
pub fn run(args: CliArgs) -> Result<()> {
    info!("Starting document generation...");
    let (document, summary) = replay(&args)?;

    info!("Serializing to {:?} format...", args.output_format);
    let content = match args.output_format {
        OutputFormat::Yaml => serialize_yaml(&document)?,
        OutputFormat::Json => serialize_json(&document)?,
    };

    if let Some(output_path) = &args.output_path {
        write_to_file(&content, output_path)?;
        info!("Wrote document to {}", output_path.display());
    } else {
        println!("{}", content);
    }

    info!("Generation complete!");
    info!("Summary:");
    info!("  - Capture files read: {}", summary.files);
    info!("  - Exchanges recorded: {}", summary.recorded);
    info!("  - Unmatched exchanges: {}", summary.unmatched);
    info!("  - Malformed lines: {}", summary.skipped_lines);
    info!("  - Paths: {}", document.paths.len());

    Ok(())
}
