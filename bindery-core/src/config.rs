use crate::error::{ConversionError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_dehyphenate_mode() -> String {
    "safe".to_string()
}

fn default_threshold() -> f32 {
    0.85
}

fn default_abstain_label() -> String {
    "abstain".to_string()
}

fn default_root() -> String {
    "book".to_string()
}

fn default_dtd_system() -> String {
    "dtd/v1.1/docbookx.dtd".to_string()
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

fn default_list_markers() -> Vec<String> {
    vec![
        "•".to_string(),
        "·".to_string(),
        "●".to_string(),
        "■".to_string(),
        "▪".to_string(),
        "◦".to_string(),
        "‣".to_string(),
        "–".to_string(),
        "-".to_string(),
        "*".to_string(),
    ]
}

/// Immutable per-run configuration: the default profile deep-merged with an
/// optional publisher overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    #[serde(default)]
    pub normalization: NormalizationConfig,
    #[serde(default)]
    pub tolerances: ToleranceConfig,
    #[serde(default)]
    pub pdf: PdfConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub docbook: DocbookConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            normalization: NormalizationConfig::default(),
            tolerances: ToleranceConfig::default(),
            pdf: PdfConfig::default(),
            classifier: ClassifierConfig::default(),
            docbook: DocbookConfig::default(),
            ocr: OcrConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationConfig {
    /// Collapse any run of whitespace to a single space
    #[serde(default = "default_true")]
    pub collapse_internal_whitespace: bool,
    /// "safe" joins WORD1-\nWORD2 unless both halves are fully uppercase;
    /// "off" disables the rule
    #[serde(default = "default_dehyphenate_mode")]
    pub dehyphenate_line_endings: String,
    /// Ligature characters from the extractor are kept, never decomposed
    #[serde(default = "default_true")]
    pub preserve_ligatures: bool,
    /// Echo every normalization event as it is recorded
    #[serde(default)]
    pub log_every_change: bool,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            collapse_internal_whitespace: true,
            dehyphenate_line_endings: default_dehyphenate_mode(),
            preserve_ligatures: true,
            log_every_change: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToleranceConfig {
    /// Maximum per-page character count divergence between extractors
    #[serde(default)]
    pub char_diff_per_page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfConfig {
    /// Bullet prefixes recognised as itemized list markers, in match order
    #[serde(default = "default_list_markers")]
    pub list_markers: Vec<String>,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            list_markers: default_list_markers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Confidence below this abstains to the heuristic label
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Label emitted on abstention; "abstain" (or empty) falls back to the
    /// heuristic label
    #[serde(default = "default_abstain_label")]
    pub abstain_label: String,
    /// Identifier of the external classifier backend
    #[serde(default)]
    pub backend: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_threshold(),
            abstain_label: default_abstain_label(),
            backend: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocbookConfig {
    /// Root element of the generated tree
    #[serde(default = "default_root")]
    pub root: String,
    /// SYSTEM identifier written into the DOCTYPE
    #[serde(default = "default_dtd_system")]
    pub dtd_system: String,
}

impl Default for DocbookConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            dtd_system: default_dtd_system(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ocr_language")]
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            language: default_ocr_language(),
        }
    }
}

/// Deep-merge two JSON trees: maps merge recursively, everything else in the
/// overlay replaces the base value.
pub fn merge_values(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => merge_values(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

impl ConversionConfig {
    /// Load `mapping.default.json` from the config directory and deep-merge
    /// the publisher overlay (`publishers/<id>.json`) on top when present.
    pub fn load_mapping(config_dir: &Path, publisher: Option<&str>) -> Result<Self> {
        let default_path = config_dir.join("mapping.default.json");
        if !default_path.exists() {
            return Err(ConversionError::InputNotFound(default_path));
        }
        let mut tree: Value = serde_json::from_str(&fs::read_to_string(&default_path)?)?;

        if let Some(publisher) = publisher {
            let overlay_path = config_dir
                .join("publishers")
                .join(format!("{publisher}.json"));
            if overlay_path.exists() {
                let overlay: Value = serde_json::from_str(&fs::read_to_string(&overlay_path)?)?;
                tree = merge_values(tree, overlay);
            }
        }

        serde_json::from_value(tree)
            .map_err(|e| ConversionError::Config(format!("invalid mapping: {e}")))
    }

    /// Load with fallback to compiled defaults when the config directory is
    /// not usable. Logs the reason instead of failing.
    pub fn load_with_fallback(config_dir: &Path, publisher: Option<&str>) -> Self {
        match Self::load_mapping(config_dir, publisher) {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "⚠️  Failed to load mapping from {}: {e}; using defaults",
                    config_dir.display()
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_values_deep() {
        let base = json!({
            "normalization": {"collapse_internal_whitespace": true, "preserve_ligatures": true},
            "tolerances": {"char_diff_per_page": 0}
        });
        let overlay = json!({
            "normalization": {"collapse_internal_whitespace": false},
            "tolerances": {"char_diff_per_page": 5}
        });
        let merged = merge_values(base, overlay);
        assert_eq!(merged["normalization"]["collapse_internal_whitespace"], false);
        assert_eq!(merged["normalization"]["preserve_ligatures"], true);
        assert_eq!(merged["tolerances"]["char_diff_per_page"], 5);
    }

    #[test]
    fn test_merge_values_overlay_replaces_scalars_and_arrays() {
        let base = json!({"pdf": {"list_markers": ["•", "-"]}});
        let overlay = json!({"pdf": {"list_markers": ["→"]}});
        let merged = merge_values(base, overlay);
        assert_eq!(merged["pdf"]["list_markers"], json!(["→"]));
    }

    #[test]
    fn test_load_mapping_with_publisher_overlay() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("mapping.default.json"),
            r#"{"tolerances": {"char_diff_per_page": 2}, "docbook": {"root": "book"}}"#,
        )
        .unwrap();
        std::fs::create_dir(dir.path().join("publishers")).unwrap();
        std::fs::write(
            dir.path().join("publishers/acme.json"),
            r#"{"tolerances": {"char_diff_per_page": 9}}"#,
        )
        .unwrap();

        let config = ConversionConfig::load_mapping(dir.path(), Some("acme")).unwrap();
        assert_eq!(config.tolerances.char_diff_per_page, 9);
        assert_eq!(config.docbook.root, "book");
        // Untouched sections pick up defaults
        assert!(config.normalization.collapse_internal_whitespace);
    }

    #[test]
    fn test_load_mapping_missing_default_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConversionConfig::load_mapping(dir.path(), None).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_defaults_are_sane() {
        let config = ConversionConfig::default();
        assert_eq!(config.docbook.root, "book");
        assert_eq!(config.classifier.threshold, 0.85);
        assert!(!config.classifier.enabled);
        assert!(config.pdf.list_markers.contains(&"•".to_string()));
    }
}
