//! QA metrics and page-level reconciliation reporting.
//!
//! Per-page character, word, checksum and flag counts make the pipeline
//! trustable: the strict-mode gate rides on these rows, and the CSV/JSON
//! reports land next to the deliverable for the production line to audit.

use crate::reconcile::ReconcileReport;
use crate::types::{PageFlag, PageText};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMetric {
    pub page: u32,
    pub chars_in: usize,
    pub chars_out: usize,
    pub words_in: usize,
    pub words_out: usize,
    pub checksum_in: String,
    pub checksum_out: String,
    pub flags: Vec<PageFlag>,
    pub has_ocr: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaSummary {
    pub total_pages: usize,
    /// Every flag raised, in page order (repeats included)
    pub flags: Vec<PageFlag>,
    /// Occurrences of characters above U+007F across input and output
    pub special_chars: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaReport {
    pub generated_at: DateTime<Utc>,
    pub pages: Vec<PageMetric>,
    pub summary: QaSummary,
    /// Reconciliation mismatch pages carried over from extraction
    #[serde(default)]
    pub mismatches: Vec<u32>,
    #[serde(default)]
    pub image_only_pages: Vec<u32>,
    #[serde(default)]
    pub output_path: String,
}

impl QaReport {
    pub fn flagged_pages(&self) -> Vec<u32> {
        self.pages
            .iter()
            .filter(|p| !p.flags.is_empty())
            .map(|p| p.page)
            .collect()
    }

    /// Merge the reconciler's per-page flags into the matching rows.
    pub fn merge_reconciliation(&mut self, reconcile: &ReconcileReport) {
        for page in self.pages.iter_mut() {
            if let Some(flags) = reconcile.page_flags.get(&page.page) {
                for flag in flags {
                    if !page.flags.contains(flag) {
                        page.flags.push(*flag);
                        self.summary.flags.push(*flag);
                    }
                }
            }
        }
        self.mismatches = reconcile.mismatched_pages();
        self.image_only_pages = reconcile.image_only_pages.clone();
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn count_special_chars(text: &str, counts: &mut BTreeMap<String, usize>) {
    for ch in text.chars() {
        if ch as u32 > 127 {
            *counts.entry(ch.to_string()).or_insert(0) += 1;
        }
    }
}

/// Compute per-page metrics comparing the pre-tree pages against the pages
/// reconstructed from the final output.
pub fn compute_metrics(pre: &[PageText], post: &[PageText]) -> QaReport {
    let post_map: BTreeMap<u32, &PageText> = post.iter().map(|p| (p.page_num, p)).collect();

    let mut pages = Vec::with_capacity(pre.len());
    let mut overall_flags: Vec<PageFlag> = Vec::new();
    let mut special_chars: BTreeMap<String, usize> = BTreeMap::new();

    for page in pre {
        let target = post_map.get(&page.page_num);
        let mut flags: Vec<PageFlag> = Vec::new();

        let chars_in = page.norm_text.chars().count();
        let words_in = word_count(&page.norm_text);
        let chars_out = target.map_or(0, |t| t.norm_text.chars().count());
        let words_out = target.map_or(0, |t| word_count(&t.norm_text));

        match target {
            None => flags.push(PageFlag::MissingOutputPage),
            Some(target) => {
                if page.norm_text != target.norm_text {
                    flags.push(PageFlag::TextMismatch);
                }
                if chars_in != chars_out {
                    flags.push(PageFlag::CharCountDiff);
                }
            }
        }

        count_special_chars(&page.norm_text, &mut special_chars);
        if let Some(target) = target {
            count_special_chars(&target.norm_text, &mut special_chars);
        }

        overall_flags.extend(flags.iter().copied());
        pages.push(PageMetric {
            page: page.page_num,
            chars_in,
            chars_out,
            words_in,
            words_out,
            checksum_in: page.checksum.clone(),
            checksum_out: target.map_or(String::new(), |t| t.checksum.clone()),
            flags,
            has_ocr: target.is_some_and(|t| t.has_ocr),
        });
    }

    let flagged = pages.iter().filter(|p| !p.flags.is_empty()).count();
    println!(
        "📊 Metrics computed for {} pages; {} flagged",
        pre.len(),
        flagged
    );

    QaReport {
        generated_at: Utc::now(),
        summary: QaSummary {
            total_pages: pre.len(),
            flags: overall_flags,
            special_chars,
        },
        pages,
        mismatches: Vec::new(),
        image_only_pages: Vec::new(),
        output_path: String::new(),
    }
}

/// One CSV row per page, written next to the deliverable.
pub fn write_csv(report: &QaReport, path: &Path) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(
        file,
        "page,chars_in,chars_out,words_in,words_out,checksum_in,checksum_out,flags,has_ocr"
    )?;
    for page in &report.pages {
        let flags = page
            .flags
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(";");
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{}",
            page.page,
            page.chars_in,
            page.chars_out,
            page.words_in,
            page.words_out,
            page.checksum_in,
            page.checksum_out,
            flags,
            page.has_ocr
        )?;
    }
    Ok(())
}

pub fn write_json(report: &QaReport, path: &Path) -> crate::error::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(num: u32, text: &str) -> PageText {
        PageText::new(num, text.to_string())
    }

    #[test]
    fn test_compute_metrics_no_diff() {
        let pre = vec![page(1, "Hello world"), page(2, "Second page")];
        let post = vec![page(1, "Hello world"), page(2, "Second page")];
        let report = compute_metrics(&pre, &post);
        assert!(report.summary.flags.is_empty());
        assert!(report.pages.iter().all(|p| p.flags.is_empty()));
        assert_eq!(report.summary.total_pages, 2);
        assert_eq!(report.pages[0].checksum_in, report.pages[0].checksum_out);
    }

    #[test]
    fn test_compute_metrics_mismatch() {
        let pre = vec![page(1, "Hello"), page(2, "World")];
        let post = vec![page(1, "Hello"), page(2, "Different")];
        let report = compute_metrics(&pre, &post);
        let flagged: Vec<&PageMetric> =
            report.pages.iter().filter(|p| !p.flags.is_empty()).collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].page, 2);
        assert_eq!(flagged[0].flags[0], PageFlag::TextMismatch);
        assert_eq!(report.flagged_pages(), vec![2]);
    }

    #[test]
    fn test_compute_metrics_missing_page() {
        let pre = vec![page(1, "Hello"), page(2, "World")];
        let post = vec![page(1, "Hello")];
        let report = compute_metrics(&pre, &post);
        assert_eq!(report.pages[1].flags, vec![PageFlag::MissingOutputPage]);
        assert_eq!(report.pages[1].chars_out, 0);
        assert!(report.pages[1].checksum_out.is_empty());
    }

    #[test]
    fn test_special_chars_counted() {
        let pre = vec![page(1, "naïve café")];
        let post = vec![page(1, "naïve café")];
        let report = compute_metrics(&pre, &post);
        // Counted in both input and output
        assert_eq!(report.summary.special_chars.get("ï"), Some(&2));
        assert_eq!(report.summary.special_chars.get("é"), Some(&2));
    }

    #[test]
    fn test_merge_reconciliation_adds_flags() {
        use crate::config::ToleranceConfig;
        use crate::reconcile::reconcile;

        let pre = vec![page(1, "same"), page(3, "extractor a text here")];
        let post = pre.clone();
        let mut report = compute_metrics(&pre, &post);
        assert!(report.flagged_pages().is_empty());

        let secondary = vec![page(1, "same"), page(3, "b")];
        let recon = reconcile(&pre, &secondary, &ToleranceConfig::default());
        report.merge_reconciliation(&recon);

        assert_eq!(report.mismatches, vec![3]);
        assert_eq!(report.flagged_pages(), vec![3]);
        assert!(report.pages[1].flags.contains(&PageFlag::TextMismatch));
        assert!(report.pages[1].flags.contains(&PageFlag::CharCountDiff));
    }

    #[test]
    fn test_csv_row_per_page() {
        let dir = tempfile::tempdir().unwrap();
        let pre = vec![page(1, "a"), page(2, "b")];
        let report = compute_metrics(&pre, &pre.clone());
        let csv_path = dir.path().join("report.qa.csv");
        write_csv(&report, &csv_path).unwrap();
        let contents = std::fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("page,chars_in"));
        assert!(lines[1].starts_with("1,"));
    }
}
