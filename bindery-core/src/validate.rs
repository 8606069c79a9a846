//! DTD validation through the external XML validator.
//!
//! The catalog maps the DocBook variant's public/system identifiers to local
//! files so validation works offline; it is handed to the validator through
//! the standard catalog environment variable.

use crate::error::{ConversionError, Result, Stage};
use crate::extractors::process::run_cmd;
use std::ffi::OsString;
use std::path::Path;

/// Validate an XML file against the DTD system identifier. Validator
/// failure is fatal with the tool's stderr attached.
pub fn validate_dtd(xml_path: &Path, dtd_system: &str, catalog: Option<&Path>) -> Result<()> {
    if !xml_path.exists() {
        return Err(ConversionError::InputNotFound(xml_path.to_path_buf()));
    }

    let catalog_value: OsString;
    let mut envs: Vec<(&str, &std::ffi::OsStr)> = Vec::new();
    if let Some(catalog) = catalog {
        let resolved = catalog
            .canonicalize()
            .unwrap_or_else(|_| catalog.to_path_buf());
        catalog_value = resolved.into_os_string();
        envs.push(("XML_CATALOG_FILES", catalog_value.as_os_str()));
    }

    let args = [
        "--noout".to_string(),
        "--catalogs".to_string(),
        "--valid".to_string(),
        "--dtdvalid".to_string(),
        dtd_system.to_string(),
        xml_path.display().to_string(),
    ];

    println!("🧾 Validating {} against {dtd_system}", xml_path.display());
    run_cmd("xmllint", Stage::Validation, &args, &envs).map_err(|e| match e {
        ConversionError::Subprocess { stderr, .. } => ConversionError::Validation { stderr },
        other => other,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_xml_is_input_error() {
        let err = validate_dtd(Path::new("/nonexistent/book.xml"), "book.dtd", None).unwrap_err();
        assert!(matches!(err, ConversionError::InputNotFound(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
