//! Bottle metadata produced by `brew bottle --json`.
//!
//! The build tool writes one JSON document per bottle:
//!
//! ```json
//! {"sample-project": {"bottle": {"tags": {"arm64_ventura": {
//!     "filename": "sample-project-0.1.3.arm64_ventura.bottle.tar.gz",
//!     "local_filename": "sample-project--0.1.3.arm64_ventura.bottle.tar.gz",
//!     "sha256": "…"}}}}}
//! ```
//!
//! Only the first formula and its first tag are considered.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use miette::Diagnostic;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

static REBUILD_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bottle\.(\d+)").expect("valid regex"));

#[derive(Debug, Error, Diagnostic)]
pub enum BottleError {
    #[error("unexpected bottle JSON: {reason}")]
    #[diagnostic(
        code(relbrew::bottle::malformed_output),
        help("inspect the JSON written by `brew bottle --json` in the tap directory")
    )]
    MalformedOutput { reason: String },

    #[error("bottle file not found: {}", path.display())]
    #[diagnostic(code(relbrew::bottle::artifact_missing))]
    ArtifactMissing { path: PathBuf },
}

/// Canonical description of one built bottle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BottleRecord {
    pub version: String,
    /// File name the formula's `root_url` resolves to
    pub expected_filename: String,
    /// File name the build tool actually wrote
    pub local_filename: String,
    pub sha256: String,
    /// Full platform tag, e.g. `arm64_ventura`
    pub tag: String,
    /// OS label, e.g. `ventura`
    pub platform: String,
    /// `rebuild` counter, when the local file name carries one
    pub rebuild: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    filename: String,
    local_filename: String,
    sha256: String,
}

impl BottleRecord {
    /// Parse the build tool's JSON for `version`.
    pub fn from_json(json: &str, version: &str) -> Result<BottleRecord, BottleError> {
        let root: Value = serde_json::from_str(json).map_err(|e| malformed(e.to_string()))?;

        let formula = root
            .as_object()
            .and_then(|map| map.values().next())
            .ok_or_else(|| malformed("no formula entry"))?;
        let tags = formula
            .get("bottle")
            .and_then(|b| b.get("tags"))
            .and_then(Value::as_object)
            .ok_or_else(|| malformed("missing `bottle.tags`"))?;
        let (tag, entry) = tags
            .iter()
            .next()
            .ok_or_else(|| malformed("`bottle.tags` is empty"))?;

        let entry: TagEntry = serde_json::from_value(entry.clone())
            .map_err(|e| malformed(format!("tag `{}`: {}", tag, e)))?;

        Ok(BottleRecord {
            version: version.to_string(),
            rebuild: rebuild_from_filename(&entry.local_filename),
            expected_filename: entry.filename,
            local_filename: entry.local_filename,
            sha256: entry.sha256,
            platform: platform_label(tag),
            tag: tag.clone(),
        })
    }

    /// Where the bottle was written inside `build_dir`.
    pub fn local_path(&self, build_dir: &Path) -> PathBuf {
        build_dir.join(&self.local_filename)
    }

    /// Architecture family of the tag, the part before the first `_`.
    pub fn arch(&self) -> &str {
        arch_prefix(&self.tag)
    }
}

/// Parse bottle JSON and check the bottle itself exists in `build_dir`.
pub fn extract(json: &str, version: &str, build_dir: &Path) -> Result<BottleRecord, BottleError> {
    let record = BottleRecord::from_json(json, version)?;
    let path = record.local_path(build_dir);
    if !path.is_file() {
        return Err(BottleError::ArtifactMissing { path });
    }
    tracing::debug!(
        "bottle {} for {} (rebuild {:?})",
        record.local_filename,
        record.tag,
        record.rebuild
    );
    Ok(record)
}

/// `arm64_ventura` -> `ventura`; tags without a second segment map to themselves.
pub fn platform_label(tag: &str) -> String {
    tag.split('_')
        .nth(1)
        .filter(|s| !s.is_empty())
        .unwrap_or(tag)
        .to_string()
}

/// `arm64_ventura` -> `arm64`.
pub fn arch_prefix(tag: &str) -> &str {
    tag.split('_').next().unwrap_or(tag)
}

fn rebuild_from_filename(filename: &str) -> Option<u32> {
    REBUILD_SUFFIX
        .captures(filename)
        .and_then(|caps| caps[1].parse().ok())
}

fn malformed(reason: impl Into<String>) -> BottleError {
    BottleError::MalformedOutput {
        reason: reason.into(),
    }
}
