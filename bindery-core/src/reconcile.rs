//! Cross-verification of the two text extractors.
//!
//! Both extractors run on every document; this module compares their
//! normalized output page by page against the configured tolerances and
//! finds the image-only pages eligible for OCR escalation.

use crate::config::ToleranceConfig;
use crate::types::{PageFlag, PageText};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Flags keyed by page number, ordered
    pub page_flags: BTreeMap<u32, Vec<PageFlag>>,
    /// Pages where both extractors produced empty normalized text
    pub image_only_pages: Vec<u32>,
}

impl ReconcileReport {
    /// Pages carrying any flag, ascending.
    pub fn mismatched_pages(&self) -> Vec<u32> {
        self.page_flags.keys().copied().collect()
    }

    pub fn has_mismatches(&self) -> bool {
        !self.page_flags.is_empty()
    }
}

/// Compare extractor A (primary) against extractor B (secondary) page by
/// page. Both inputs must already be normalized. Pages where both sides are
/// blank are image-only: the extractors agree, so they carry no flag and are
/// reported for OCR escalation instead.
pub fn reconcile(
    primary: &[PageText],
    secondary: &[PageText],
    tolerances: &ToleranceConfig,
) -> ReconcileReport {
    let secondary_map: BTreeMap<u32, &PageText> =
        secondary.iter().map(|p| (p.page_num, p)).collect();

    let mut report = ReconcileReport::default();

    for page in primary {
        let mut flags = Vec::new();
        match secondary_map.get(&page.page_num) {
            None => flags.push(PageFlag::MissingOutputPage),
            Some(other) => {
                if page.norm_text.trim().is_empty() && other.norm_text.trim().is_empty() {
                    report.image_only_pages.push(page.page_num);
                    continue;
                }
                if page.norm_text != other.norm_text {
                    flags.push(PageFlag::TextMismatch);
                }
                let char_diff = (page.norm_text.chars().count() as i64
                    - other.norm_text.chars().count() as i64)
                    .abs();
                if char_diff > i64::from(tolerances.char_diff_per_page) {
                    flags.push(PageFlag::CharCountDiff);
                }
            }
        }
        if !flags.is_empty() {
            report.page_flags.insert(page.page_num, flags);
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(num: u32, text: &str) -> PageText {
        let mut page = PageText::new(num, text.to_string());
        page.norm_text = text.to_string();
        page
    }

    #[test]
    fn test_identical_pages_produce_no_flags() {
        let a = vec![page(1, "one"), page(2, "two")];
        let b = vec![page(1, "one"), page(2, "two")];
        let report = reconcile(&a, &b, &ToleranceConfig::default());
        assert!(!report.has_mismatches());
        assert!(report.image_only_pages.is_empty());
    }

    #[test]
    fn test_char_diff_beyond_tolerance_flags_page() {
        // Pages 1-4 identical except a 20-character divergence on page 3,
        // against a tolerance of 5.
        let a = vec![
            page(1, "alpha"),
            page(2, "beta"),
            page(3, "gamma gamma gamma gamma gamma"),
            page(4, "delta"),
        ];
        let b = vec![
            page(1, "alpha"),
            page(2, "beta"),
            page(3, "gamma gam"),
            page(4, "delta"),
        ];
        let tolerances = ToleranceConfig {
            char_diff_per_page: 5,
        };
        let report = reconcile(&a, &b, &tolerances);
        assert_eq!(report.mismatched_pages(), vec![3]);
        let flags = &report.page_flags[&3];
        assert!(flags.contains(&PageFlag::TextMismatch));
        assert!(flags.contains(&PageFlag::CharCountDiff));
    }

    #[test]
    fn test_small_divergence_within_tolerance_still_mismatches_text() {
        let a = vec![page(1, "abcd")];
        let b = vec![page(1, "abce")];
        let tolerances = ToleranceConfig {
            char_diff_per_page: 5,
        };
        let report = reconcile(&a, &b, &tolerances);
        assert_eq!(report.page_flags[&1], vec![PageFlag::TextMismatch]);
    }

    #[test]
    fn test_missing_page_flagged() {
        let a = vec![page(1, "one"), page(2, "two")];
        let b = vec![page(1, "one")];
        let report = reconcile(&a, &b, &ToleranceConfig::default());
        assert_eq!(report.page_flags[&2], vec![PageFlag::MissingOutputPage]);
    }

    #[test]
    fn test_image_only_pages_carry_no_flags() {
        // Both extractors agree the page is blank: no mismatch even when the
        // blanks differ byte-wise, and the page is recorded for escalation.
        let a = vec![page(1, "text"), page(2, "   ")];
        let b = vec![page(1, "text"), page(2, "")];
        let report = reconcile(&a, &b, &ToleranceConfig::default());
        assert_eq!(report.image_only_pages, vec![2]);
        assert!(!report.has_mismatches());
    }
}
