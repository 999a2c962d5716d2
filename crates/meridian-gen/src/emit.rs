//! File emission: write-if-different, the checksum tree and the schema
//! manifest.
//!
//! The generator never touches a file whose content would not change, so
//! build systems keyed on modification time see no spurious work.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ast::IdlFile;
use crate::fingerprint::item_fingerprint;
use crate::names::sanitize;
use crate::GenError;

/// Record of one generation run.
#[derive(Debug, Default)]
pub struct GenerationReport {
    /// Files whose content changed and were rewritten.
    pub written: Vec<PathBuf>,
    /// Files whose content was already up to date.
    pub unchanged: Vec<PathBuf>,
}

impl GenerationReport {
    /// Writes `content` to `path` only if it differs from what is on disk.
    pub fn emit(&mut self, path: &Path, content: &str) -> Result<(), GenError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GenError::Output(format!("{}: {e}", parent.display())))?;
        }

        let existing = std::fs::read_to_string(path).ok();
        if existing.as_deref() == Some(content) {
            debug!(path = %path.display(), "unchanged");
            self.unchanged.push(path.to_owned());
            return Ok(());
        }

        std::fs::write(path, content)
            .map_err(|e| GenError::Output(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "written");
        self.written.push(path.to_owned());
        Ok(())
    }
}

/// Writes the `check_sums/` tree: one file per fingerprintable type, named
/// by its sanitized qualified name and containing the stable fingerprint.
pub fn write_checksums(
    report: &mut GenerationReport,
    tree: &IdlFile,
    output_path: &Path,
    protocol_version: u64,
) -> Result<(), GenError> {
    let checksum_dir = output_path.join("check_sums");

    // Deterministic order regardless of parse order.
    let mut entries: Vec<(String, u64)> = Vec::new();
    for namespace in &tree.namespaces {
        for item in &namespace.items {
            if !item.is_local() {
                continue;
            }
            if let Some(fingerprint) = item_fingerprint(&namespace.name, item, protocol_version) {
                let qualified = if namespace.name.is_empty() {
                    item.name().to_owned()
                } else {
                    format!("{}::{}", namespace.name, item.name())
                };
                entries.push((sanitize(&qualified, "__"), fingerprint));
            }
        }
    }
    entries.sort();

    for (name, fingerprint) in &entries {
        let path = checksum_dir.join(name);
        report.emit(&path, &format!("{fingerprint:016x}\n"))?;
    }

    Ok(())
}

/// Writes the manifest of emitted schema files, one path per line, sorted.
pub fn write_manifest(
    report: &mut GenerationReport,
    output_path: &Path,
    schema_files: &[String],
) -> Result<(), GenError> {
    let mut sorted = schema_files.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut content = String::new();
    for file in &sorted {
        content.push_str(file);
        content.push('\n');
    }

    report.emit(&output_path.join("check_sums").join("manifest"), &content)
}
