//! Classifier shim with confidence-based abstention.
//!
//! An external classifier may refine the heuristic labels, but it can never
//! silently downgrade them: below-threshold answers abstain back to the
//! heuristic label, and a failing backend is a warning, not an error.

use crate::config::ClassifierConfig;
use crate::error::Result;
use crate::types::{Block, LabeledBlock};

/// Pluggable block classifier. Returns a `(label, confidence)` pair drawn
/// from the heuristic label vocabulary.
pub trait BlockClassifier {
    fn classify(&self, block: &Block) -> Result<(String, f32)>;

    fn name(&self) -> &str;
}

/// Apply the classifier shim to a labeled block stream.
///
/// Disabled (or no backend wired): every block echoes its heuristic label at
/// full confidence. Enabled: below-threshold results emit the configured
/// abstain label; the `"abstain"` sentinel (or an empty label) falls back to
/// the heuristic label itself.
pub fn classify_blocks(
    blocks: Vec<Block>,
    config: &ClassifierConfig,
    backend: Option<&dyn BlockClassifier>,
) -> Vec<LabeledBlock> {
    let backend = match (config.enabled, backend) {
        (true, Some(backend)) => backend,
        _ => {
            return blocks.into_iter().map(LabeledBlock::passthrough).collect();
        }
    };

    blocks
        .into_iter()
        .map(|block| {
            let heuristic = block.label().to_string();
            match backend.classify(&block) {
                Ok((label, confidence)) => {
                    let resolved = if confidence < config.threshold {
                        resolve_abstain(&config.abstain_label, &heuristic)
                    } else {
                        label
                    };
                    LabeledBlock {
                        block,
                        classifier_label: resolved,
                        classifier_confidence: confidence,
                    }
                }
                Err(e) => {
                    println!(
                        "⚠️  Classifier {} failed ({e}); keeping heuristic label",
                        backend.name()
                    );
                    LabeledBlock {
                        block,
                        classifier_label: heuristic,
                        classifier_confidence: 1.0,
                    }
                }
            }
        })
        .collect()
}

fn resolve_abstain(abstain_label: &str, heuristic: &str) -> String {
    if abstain_label.is_empty() || abstain_label == "abstain" {
        heuristic.to_string()
    } else {
        abstain_label.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversionError;
    use crate::types::{BBox, BlockKind};

    fn para(text: &str) -> Block {
        Block::new(BlockKind::Para, text.to_string(), 1, BBox::default(), 12.0)
    }

    struct FixedClassifier {
        label: &'static str,
        confidence: f32,
    }

    impl BlockClassifier for FixedClassifier {
        fn classify(&self, _block: &Block) -> Result<(String, f32)> {
            Ok((self.label.to_string(), self.confidence))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct BrokenClassifier;

    impl BlockClassifier for BrokenClassifier {
        fn classify(&self, _block: &Block) -> Result<(String, f32)> {
            Err(ConversionError::Config("backend offline".to_string()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[test]
    fn test_disabled_classifier_echoes_labels() {
        let config = ClassifierConfig::default();
        let labeled = classify_blocks(vec![para("hello")], &config, None);
        assert_eq!(labeled[0].classifier_label, "para");
        assert_eq!(labeled[0].classifier_confidence, 1.0);
    }

    #[test]
    fn test_below_threshold_abstains_to_heuristic_label() {
        let config = ClassifierConfig {
            enabled: true,
            threshold: 0.85,
            ..ClassifierConfig::default()
        };
        let backend = FixedClassifier {
            label: "section",
            confidence: 0.6,
        };
        let labeled = classify_blocks(vec![para("hello")], &config, Some(&backend));
        assert_eq!(labeled[0].classifier_label, "para");
        assert_eq!(labeled[0].classifier_confidence, 0.6);
    }

    #[test]
    fn test_confident_answer_wins() {
        let config = ClassifierConfig {
            enabled: true,
            threshold: 0.85,
            ..ClassifierConfig::default()
        };
        let backend = FixedClassifier {
            label: "section",
            confidence: 0.97,
        };
        let labeled = classify_blocks(vec![para("hello")], &config, Some(&backend));
        assert_eq!(labeled[0].classifier_label, "section");
    }

    #[test]
    fn test_custom_abstain_label_is_used() {
        let config = ClassifierConfig {
            enabled: true,
            threshold: 0.85,
            abstain_label: "para".to_string(),
            ..ClassifierConfig::default()
        };
        let backend = FixedClassifier {
            label: "chapter",
            confidence: 0.2,
        };
        let labeled = classify_blocks(vec![para("hello")], &config, Some(&backend));
        assert_eq!(labeled[0].classifier_label, "para");
    }

    #[test]
    fn test_backend_failure_recovers_to_heuristic() {
        let config = ClassifierConfig {
            enabled: true,
            ..ClassifierConfig::default()
        };
        let labeled = classify_blocks(vec![para("hello")], &config, Some(&BrokenClassifier));
        assert_eq!(labeled[0].classifier_label, "para");
        assert_eq!(labeled[0].classifier_confidence, 1.0);
    }
}
