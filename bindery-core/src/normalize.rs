//! Text normalization applied to every extracted page before comparison.
//!
//! Rules run in a fixed order and each records a `NormalizationEvent` when it
//! changed the string. Normalization is idempotent after one application:
//! `normalize(normalize(x)) == normalize(x)`.

use crate::config::NormalizationConfig;
use crate::types::NormalizationEvent;
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static LINE_DEHYPHEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)-\n(\w+)").unwrap());

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").into_owned()
}

/// True when the token contains at least one cased character and no
/// lowercase ones — acronyms and compound proper nouns keep their hyphen.
fn is_fully_uppercase(token: &str) -> bool {
    token.chars().any(|c| c.is_uppercase()) && !token.chars().any(|c| c.is_lowercase())
}

fn safe_dehyphenate(text: &str) -> String {
    LINE_DEHYPHEN_RE
        .replace_all(text, |caps: &Captures| {
            let first = &caps[1];
            let second = &caps[2];
            if is_fully_uppercase(first) && is_fully_uppercase(second) {
                format!("{first}-{second}")
            } else {
                format!("{first}{second}")
            }
        })
        .into_owned()
}

/// Apply the configured normalization rules in order, recording an event for
/// every rule that changed the text.
pub fn normalize_text(
    text: &str,
    config: &NormalizationConfig,
    events: &mut Vec<NormalizationEvent>,
) -> String {
    let mut result = text.to_string();

    if config.collapse_internal_whitespace {
        let collapsed = collapse_whitespace(&result);
        if collapsed != result {
            events.push(NormalizationEvent {
                rule: "collapse_internal_whitespace".to_string(),
                before: result.clone(),
                after: collapsed.clone(),
            });
            result = collapsed;
        }
    }

    if config.dehyphenate_line_endings == "safe" {
        let dehyphenated = safe_dehyphenate(&result);
        if dehyphenated != result {
            events.push(NormalizationEvent {
                rule: "dehyphenate_line_endings".to_string(),
                before: result.clone(),
                after: dehyphenated.clone(),
            });
            result = dehyphenated;
        }
    }

    // preserve_ligatures is deliberately a no-op: the extractor's ligature
    // characters pass through undecomposed.

    if config.log_every_change {
        for event in events.iter() {
            println!(
                "   ✏️  Normalization {}: {:?} -> {:?}",
                event.rule, event.before, event.after
            );
        }
    }

    result
}

/// SHA-256 of the text, lowercase hex.
pub fn checksum(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
