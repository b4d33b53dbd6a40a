//! `CHANGELOG.md` maintenance.
//!
//! The document is a `# Changelog` header followed by version sections,
//! newest first:
//!
//! ```text
//! # Changelog
//!
//! ## [0.1.3] - 2024-04-01
//!
//! - Fixed the frobnicator
//! ```

use std::path::Path;
use std::sync::LazyLock;

use anyhow::Result;
use chrono::NaiveDate;
use regex::Regex;

use crate::util::fs::{read_to_string, write_string};

/// Conventional file name, relative to the project root.
pub const CHANGELOG_FILE: &str = "CHANGELOG.md";

/// Contents of a freshly created changelog.
pub const HEADER: &str = "# Changelog\n\n";

/// Body of a newly inserted section.
pub const PLACEHOLDER: &str = "- Add your changes here";

/// Version reported when no section can be found.
pub const UNKNOWN_VERSION: &str = "unknown";

static SECTION_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^##\s+\[([^\]]+)\]").expect("valid regex"));

/// The most recent section of a changelog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseNotes {
    pub version: String,
    pub notes: String,
}

impl ReleaseNotes {
    fn unknown() -> Self {
        ReleaseNotes {
            version: UNKNOWN_VERSION.to_string(),
            notes: String::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.version == UNKNOWN_VERSION
    }
}

/// Create a header-only changelog if `path` does not exist.
///
/// Returns `true` if the file was created.
pub fn ensure_exists(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    write_string(path, HEADER)?;
    tracing::debug!("created {}", path.display());
    Ok(true)
}

/// Outcome of [`insert_version`]. Both variants are success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// A new section was written
    Added,
    /// A section for the version was already there; nothing was written
    AlreadyPresent,
}

/// Add a dated section for `version` right after the header.
///
/// A changelog that already has a `## [<version>]` section is left untouched.
/// A missing file is created first, and a document without a `# ` header line
/// gets one prepended.
pub fn insert_version(path: &Path, version: &str, date: NaiveDate) -> Result<Insertion> {
    ensure_exists(path)?;
    let content = read_to_string(path)?;

    if has_version(&content, version) {
        tracing::debug!("{} already has a section for {}", path.display(), version);
        return Ok(Insertion::AlreadyPresent);
    }

    let section = format!(
        "## [{}] - {}\n\n{}\n\n",
        version,
        date.format("%Y-%m-%d"),
        PLACEHOLDER
    );
    write_string(path, &insert_section(&content, &section))?;
    Ok(Insertion::Added)
}

/// Version and trimmed body of the first section.
///
/// A missing file or a document without sections yields version
/// [`UNKNOWN_VERSION`] with empty notes.
pub fn extract_latest(path: &Path) -> Result<ReleaseNotes> {
    if !path.is_file() {
        return Ok(ReleaseNotes::unknown());
    }
    Ok(latest_section(&read_to_string(path)?))
}

/// Whether `content` already has a section for `version`.
pub fn has_version(content: &str, version: &str) -> bool {
    content.lines().any(|line| {
        SECTION_HEADING
            .captures(line)
            .is_some_and(|caps| caps[1].trim() == version)
    })
}

fn insert_section(content: &str, section: &str) -> String {
    let Some(header_start) = find_header(content) else {
        return format!("{}{}{}", HEADER, section, content);
    };

    // End of the header line, then past any blank lines after it
    let mut offset = content[header_start..]
        .find('\n')
        .map_or(content.len(), |i| header_start + i + 1);
    let mut out = String::with_capacity(content.len() + section.len() + 2);
    out.push_str(&content[..offset]);
    if offset == content.len() && !content.ends_with('\n') {
        out.push('\n');
    }

    while offset < content.len() {
        let line_end = content[offset..]
            .find('\n')
            .map_or(content.len(), |i| offset + i + 1);
        if !content[offset..line_end].trim().is_empty() {
            break;
        }
        out.push_str(&content[offset..line_end]);
        offset = line_end;
    }
    if !out.ends_with("\n\n") {
        out.push('\n');
    }

    out.push_str(section);
    out.push_str(&content[offset..]);
    out
}

/// Byte offset of the first `# ` header line.
fn find_header(content: &str) -> Option<usize> {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if line.starts_with("# ") || line.trim_end() == "#" {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

fn latest_section(content: &str) -> ReleaseNotes {
    let mut lines = content.lines();

    let version = loop {
        match lines.next() {
            Some(line) => {
                if let Some(caps) = SECTION_HEADING.captures(line) {
                    break caps[1].trim().to_string();
                }
            }
            None => return ReleaseNotes::unknown(),
        }
    };

    let body: Vec<&str> = lines.take_while(|line| !line.starts_with("## ")).collect();
    ReleaseNotes {
        version,
        notes: body.join("\n").trim().to_string(),
    }
}
