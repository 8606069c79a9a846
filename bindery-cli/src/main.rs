use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use bindery_core::{convert_epub, convert_pdf, ConversionConfig, ConvertOptions, PdfToolchain};

#[derive(Parser)]
#[command(name = "bindery")]
#[command(about = "Convert a PDF or EPUB into a validated, chapterised DocBook bundle")]
struct Args {
    /// Source document (.pdf or .epub)
    input: PathBuf,

    /// Output path; the ZIP lands next to it, renamed by ISBN when found
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Publisher identifier selecting the config overlay
    #[arg(short, long)]
    publisher: Option<String>,

    /// Directory with mapping.default.json and publishers/<id>.json
    #[arg(short, long, default_value = "config")]
    config_dir: PathBuf,

    /// Run OCR on pages both extractors agree are image-only
    #[arg(long)]
    ocr_on_image_only: bool,

    /// Fail the run on any reconciliation mismatch or QA flag
    #[arg(long)]
    strict: bool,

    /// Validate the assembled document against the configured DTD
    #[arg(long)]
    validate: bool,

    /// XML catalog used to resolve the DTD offline
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Directory for the QA reports (default: next to the ZIP)
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Also dump the full QA report as JSON to stdout
    #[arg(long)]
    print_report: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    println!("📚 Bindery Document Converter");

    if !args.input.exists() {
        eprintln!("❌ Input not found: {}", args.input.display());
        std::process::exit(2);
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("zip"));

    let options = ConvertOptions {
        config_dir: args.config_dir.clone(),
        publisher: args.publisher.clone(),
        ocr_on_image_only: args.ocr_on_image_only,
        strict: args.strict,
        validate: args.validate,
        catalog: args.catalog.clone(),
        report_dir: args.report_dir.clone(),
    };

    let is_epub = args
        .input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("epub"));

    let outcome = if is_epub {
        convert_epub(&args.input, &output, &options)
    } else {
        let config = ConversionConfig::load_with_fallback(
            &options.config_dir,
            options.publisher.as_deref(),
        );
        let toolchain = PdfToolchain::standard(&config);
        convert_pdf(&args.input, &output, &toolchain, &options)
    };

    match outcome {
        Ok(outcome) => {
            print_summary(&outcome.zip_path, &outcome.report);
            if args.print_report {
                let json = serde_json::to_string_pretty(&outcome.report)
                    .context("rendering QA report")?;
                println!("{json}");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Conversion failed: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

fn print_summary(zip_path: &Path, report: &bindery_core::QaReport) {
    println!("✅ Wrote {}", zip_path.display());
    println!("📊 QA summary:");
    println!("   - Pages: {}", report.summary.total_pages);
    println!("   - Flagged pages: {}", report.flagged_pages().len());
    if !report.image_only_pages.is_empty() {
        println!("   - Image-only pages: {:?}", report.image_only_pages);
    }
    if !report.mismatches.is_empty() {
        println!("   - Extractor mismatches: {:?}", report.mismatches);
    }
}
