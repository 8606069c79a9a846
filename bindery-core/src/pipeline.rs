//! PDF conversion pipeline.
//!
//! Each conversion owns its context: configuration, a scoped temporary
//! directory, and the injected tool backends. Stages run in order —
//! extract (A ∥ B in contract, sequential in execution), normalize,
//! reconcile, optional OCR escalation, layout analysis, labeling,
//! classification, tree building, optional DTD validation, packaging, QA.

use crate::classify::{classify_blocks, BlockClassifier};
use crate::config::ConversionConfig;
use crate::docbook::build_docbook_tree;
use crate::error::{ConversionError, Result};
use crate::extractors::{
    PdfMinerTextExtractor, PdfXmlProducer, PopplerTextExtractor, PopplerXmlProducer, TextExtractor,
};
use crate::layout::{label_document, parse_pdfxml_file};
use crate::normalize::{checksum, normalize_text};
use crate::ocr::{OcrEngine, OcrMyPdfEngine};
use crate::package::{make_file_fetcher, package_docbook};
use crate::qa::{compute_metrics, write_csv, write_json, QaReport};
use crate::reconcile::reconcile;
use crate::types::PageText;
use crate::validate::validate_dtd;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Caller-facing conversion switches. The configuration tree itself comes
/// from the mapping files in `config_dir`.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub config_dir: PathBuf,
    pub publisher: Option<String>,
    /// Escalate image-only pages to the OCR engine and re-extract
    pub ocr_on_image_only: bool,
    /// Any surviving mismatch or QA flag aborts the conversion
    pub strict: bool,
    /// Run DTD validation on the assembled document before packaging
    pub validate: bool,
    pub catalog: Option<PathBuf>,
    /// Where QA reports land; next to the ZIP when unset
    pub report_dir: Option<PathBuf>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("config"),
            publisher: None,
            ocr_on_image_only: false,
            strict: false,
            validate: false,
            catalog: None,
            report_dir: None,
        }
    }
}

#[derive(Debug)]
pub struct ConversionOutcome {
    pub zip_path: PathBuf,
    pub report: QaReport,
}

/// The pluggable tool backends one PDF conversion runs against.
pub struct PdfToolchain {
    pub extractor_a: Box<dyn TextExtractor>,
    pub extractor_b: Box<dyn TextExtractor>,
    pub xml_producer: Box<dyn PdfXmlProducer>,
    pub ocr_engine: Box<dyn OcrEngine>,
    pub classifier: Option<Box<dyn BlockClassifier>>,
}

impl PdfToolchain {
    /// Standard subprocess-backed toolchain.
    pub fn standard(config: &ConversionConfig) -> Self {
        Self {
            extractor_a: Box::new(PopplerTextExtractor),
            extractor_b: Box::new(PdfMinerTextExtractor),
            xml_producer: Box::new(PopplerXmlProducer),
            ocr_engine: Box::new(OcrMyPdfEngine::new(&config.ocr.language)),
            classifier: None,
        }
    }
}

fn normalize_pages(pages: &mut [PageText], config: &ConversionConfig) {
    for page in pages.iter_mut() {
        let mut events = Vec::new();
        page.norm_text = normalize_text(&page.raw_text, &config.normalization, &mut events);
        page.checksum = checksum(&page.norm_text);
        page.events = events;
    }
}

/// Convert a PDF into the packaged DocBook deliverable.
pub fn convert_pdf(
    pdf_path: &Path,
    out_path: &Path,
    toolchain: &PdfToolchain,
    options: &ConvertOptions,
) -> Result<ConversionOutcome> {
    let start_time = Instant::now();

    if !pdf_path.exists() {
        return Err(ConversionError::InputNotFound(pdf_path.to_path_buf()));
    }
    let config =
        ConversionConfig::load_mapping(&options.config_dir, options.publisher.as_deref())?;

    println!("📄 Converting PDF: {}", pdf_path.display());
    let tmp = tempfile::TempDir::new()?;
    let mut working_pdf = pdf_path.to_path_buf();

    // Stage 1: dual extraction + normalization
    let stage_start = Instant::now();
    let mut primary = toolchain.extractor_a.extract_pages(&working_pdf)?;
    let mut secondary = toolchain.extractor_b.extract_pages(&working_pdf)?;
    normalize_pages(&mut primary, &config);
    normalize_pages(&mut secondary, &config);
    println!(
        "⏱️  Extraction ({} + {}): {:.3}s, {} pages",
        toolchain.extractor_a.name(),
        toolchain.extractor_b.name(),
        stage_start.elapsed().as_secs_f64(),
        primary.len()
    );

    // Stage 2: reconciliation, with one OCR escalation round when enabled
    let mut recon = reconcile(&primary, &secondary, &config.tolerances);
    if options.ocr_on_image_only && !recon.image_only_pages.is_empty() {
        let image_pages = recon.image_only_pages.clone();
        let ocr_out = tmp.path().join("ocr.pdf");
        working_pdf = toolchain
            .ocr_engine
            .ocr(&working_pdf, &image_pages, &ocr_out)?;

        primary = toolchain.extractor_a.extract_pages(&working_pdf)?;
        secondary = toolchain.extractor_b.extract_pages(&working_pdf)?;
        normalize_pages(&mut primary, &config);
        normalize_pages(&mut secondary, &config);
        for page in primary.iter_mut() {
            if image_pages.contains(&page.page_num) {
                page.has_ocr = true;
            }
        }
        recon = reconcile(&primary, &secondary, &config.tolerances);
        recon.image_only_pages = image_pages;
    }

    if options.strict && recon.has_mismatches() {
        return Err(ConversionError::StrictMismatch {
            pages: recon.mismatched_pages(),
        });
    }

    // Stage 3: positional stream + layout analysis
    let stage_start = Instant::now();
    let pdfxml_path = tmp.path().join("pdfxml.xml");
    toolchain.xml_producer.produce_xml(&working_pdf, &pdfxml_path)?;
    let document = parse_pdfxml_file(&pdfxml_path)?;
    if document.page_count() != primary.len() {
        println!(
            "⚠️  Page count drift: extractor reports {} pages, positional stream {}",
            primary.len(),
            document.page_count()
        );
    }
    let blocks = label_document(&document, &config);
    println!(
        "⏱️  Layout analysis: {:.3}s, {} blocks",
        stage_start.elapsed().as_secs_f64(),
        blocks.len()
    );

    // Stage 4: classifier shim + tree building
    let labeled = classify_blocks(blocks, &config.classifier, toolchain.classifier.as_deref());
    let tree = build_docbook_tree(&labeled, &config.docbook.root);

    // Stage 5: optional DTD validation of the assembled document
    if options.validate {
        let tmp_doc = tmp.path().join("full_book.xml");
        let header = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE {} SYSTEM \"{}\">\n",
            config.docbook.root, config.docbook.dtd_system
        );
        std::fs::write(&tmp_doc, format!("{header}{}", tree.serialize()?))?;
        validate_dtd(&tmp_doc, &config.docbook.dtd_system, options.catalog.as_deref())?;
    }

    // Stage 6: packaging
    let mut search_paths = vec![tmp.path().to_path_buf()];
    if let Some(parent) = pdf_path.parent() {
        search_paths.push(parent.to_path_buf());
    }
    let mut fetcher = make_file_fetcher(search_paths);
    let zip_path = package_docbook(
        &tree,
        &config.docbook.root,
        &config.docbook.dtd_system,
        out_path,
        Some(&mut fetcher),
    )?;

    // Stage 7: QA metrics
    let post_pages: Vec<PageText> = primary
        .iter()
        .map(|page| {
            let mut post = PageText::new(page.page_num, page.norm_text.clone());
            post.has_ocr = page.has_ocr;
            post
        })
        .collect();
    let mut report = compute_metrics(&primary, &post_pages);
    report.merge_reconciliation(&recon);
    report.output_path = zip_path.display().to_string();

    let report_dir = options
        .report_dir
        .clone()
        .or_else(|| zip_path.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    std::fs::create_dir_all(&report_dir)?;
    let stem = zip_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    write_csv(&report, &report_dir.join(format!("{stem}.qa.csv")))?;
    write_json(&report, &report_dir.join(format!("{stem}.qa.json")))?;

    if options.strict {
        let flagged = report.flagged_pages();
        if !flagged.is_empty() {
            return Err(ConversionError::StrictFlagged { pages: flagged });
        }
    }

    println!(
        "✅ Conversion finished in {:.3}s: {}",
        start_time.elapsed().as_secs_f64(),
        zip_path.display()
    );
    Ok(ConversionOutcome { zip_path, report })
}
