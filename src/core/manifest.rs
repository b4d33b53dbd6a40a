//! Cabal package manifest handling.
//!
//! Only the handful of fields a release touches are read: `name:`,
//! `version:` and the package names in `build-depends:`. Values are located
//! with anchored patterns and spliced in place, so everything else in the
//! hand-written file (comments, alignment, stanza order) survives an edit.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use miette::Diagnostic;
use regex::Regex;
use thiserror::Error;

use crate::util::fs::{read_to_string, write_if_changed};

static VERSION_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(version:\s*)[0-9.]+").expect("valid regex"));

static PACKAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9-]*").expect("valid regex"));

/// A field line such as `  hs-source-dirs: src`.
static FIELD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[A-Za-z][A-Za-z0-9-]*\s*:").expect("valid regex"));

/// Errors reading or updating a manifest.
#[derive(Debug, Error, Diagnostic)]
pub enum ManifestError {
    #[error("manifest not found: {}", path.display())]
    #[diagnostic(
        code(relbrew::manifest::not_found),
        help("run relbrew from the package root, next to its .cabal file")
    )]
    NotFound { path: PathBuf },

    #[error("`{field}:` field not found in {}", path.display())]
    #[diagnostic(code(relbrew::manifest::parse_incomplete))]
    ParseIncomplete { field: &'static str, path: PathBuf },

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// A parsed view of a `.cabal` file.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    content: String,
    name: String,
    version: String,
}

impl Manifest {
    /// Read and parse a manifest.
    ///
    /// Absent fields resolve to an empty string; see [`Manifest::check_complete`].
    pub fn read(path: &Path) -> Result<Manifest, ManifestError> {
        if !path.is_file() {
            return Err(ManifestError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = read_to_string(path)?;
        Ok(Manifest::from_content(path, content))
    }

    fn from_content(path: &Path, content: String) -> Manifest {
        let name = extract_field(&content, "name");
        let version = extract_field(&content, "version");
        tracing::debug!("parsed {}: name={:?} version={:?}", path.display(), name, version);
        Manifest {
            path: path.to_path_buf(),
            content,
            name,
            version,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Report the first required field that could not be extracted.
    pub fn check_complete(&self) -> Result<(), ManifestError> {
        for (field, value) in [("name", &self.name), ("version", &self.version)] {
            if value.is_empty() {
                return Err(ManifestError::ParseIncomplete {
                    field,
                    path: self.path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Set the version field to `new_version`.
    ///
    /// Only the first `version:` value is replaced and the whitespace after
    /// the colon is kept. The file is written only when its content changes;
    /// the record is then re-derived from what was written. Returns whether
    /// the file was written.
    pub fn update_version(&mut self, new_version: &str) -> Result<bool, ManifestError> {
        let updated = VERSION_VALUE
            .replacen(&self.content, 1, |caps: &regex::Captures<'_>| {
                format!("{}{}", &caps[1], new_version)
            })
            .into_owned();

        if updated == self.content {
            return Ok(false);
        }

        let written = write_if_changed(&self.path, &updated)?;
        *self = Manifest::from_content(&self.path, updated);
        Ok(written)
    }

    /// Package names referenced by all `build-depends:` declarations.
    pub fn dependencies(&self) -> BTreeSet<String> {
        extract_dependencies(&self.content)
    }
}

/// First value of `field:` at the start of a line, trimmed.
fn extract_field(content: &str, field: &str) -> String {
    let pattern = format!(r"(?m)^{}:\s*([^\n]+)", regex::escape(field));
    Regex::new(&pattern)
        .ok()
        .and_then(|re| re.captures(content).map(|c| c[1].trim().to_string()))
        .unwrap_or_default()
}

/// Collect package names from every `build-depends:` declaration.
///
/// A declaration runs from its keyword over any indented continuation lines
/// and stops at the next non-indented line, the next `field:` line, or the end
/// of the document. Each comma-separated entry contributes its leading
/// identifier; version constraints (`>=4.13 && <5`) are dropped.
fn extract_dependencies(content: &str) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();
    let lines: Vec<&str> = content.lines().collect();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let Some(pos) = line.find("build-depends:") else {
            i += 1;
            continue;
        };

        let mut declaration = String::from(&line[pos + "build-depends:".len()..]);
        i += 1;
        while i < lines.len() {
            let next = lines[i];
            let indented = next.starts_with(char::is_whitespace);
            if !next.trim().is_empty() && (!indented || FIELD_LINE.is_match(next)) {
                break;
            }
            declaration.push(' ');
            declaration.push_str(next);
            i += 1;
        }

        for entry in declaration.split(',') {
            let entry = entry.trim();
            if entry.starts_with("--") {
                continue;
            }
            if let Some(m) = PACKAGE_NAME.find(entry) {
                deps.insert(m.as_str().to_string());
            }
        }
    }

    deps
}
