//! Homebrew formula rewriting.
//!
//! Formulae are Ruby, but only a few lines matter here and all of them have a
//! fixed shape:
//!
//! ```ruby
//!   url "https://hackage.haskell.org/package/foo-0.1.2/foo-0.1.2.tar.gz"
//!   sha256 "…"
//!
//!   bottle do
//!     root_url "https://github.com/owner/repo/releases/download/v0.1.2"
//!     rebuild 1
//!     sha256 cellar: :any, arm64_sonoma: "…"
//!   end
//! ```
//!
//! Edits are line-based and leave every other line alone.

use std::sync::LazyLock;

use miette::Diagnostic;
use regex::Regex;
use thiserror::Error;

use crate::core::bottle::{arch_prefix, BottleRecord};

static URL_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^([ \t]*url[ \t]+)"[^"]*""#).expect("valid regex"));

static SHA_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^([ \t]*sha256[ \t]+)"[^"]*""#).expect("valid regex"));

/// `sha256 cellar: :any, arm64_sonoma: "…"`; the tag is the last `key: "…"`
/// pair on the line.
static BOTTLE_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^([ \t]*)sha256[ \t]+(.*?)([A-Za-z0-9_]+):[ \t]*"[^"]*"[ \t]*$"#)
        .expect("valid regex")
});

#[derive(Debug, Error, Diagnostic)]
pub enum FormulaError {
    #[error("formula has no {missing} field")]
    #[diagnostic(
        code(relbrew::formula::missing_fields),
        help("the formula needs top-level `url \"…\"` and `sha256 \"…\"` lines")
    )]
    MissingFields { missing: String },

    #[error("formula update could not be verified: `{expected}` not found after rewrite")]
    #[diagnostic(code(relbrew::formula::verification_failed))]
    VerificationFailed { expected: String },

    #[error("`bottle do` block is never closed with `end`")]
    #[diagnostic(code(relbrew::formula::unterminated_block))]
    UnterminatedBlock,
}

/// Source tarball URL of a package version on Hackage.
pub fn hackage_tarball_url(name: &str, version: &str) -> String {
    format!(
        "https://hackage.haskell.org/package/{name}-{version}/{name}-{version}.tar.gz",
        name = name,
        version = version
    )
}

/// Download root for bottles attached to the `v<version>` GitHub release.
pub fn release_root_url(owner: &str, repo: &str, version: &str) -> String {
    format!(
        "https://github.com/{}/{}/releases/download/v{}",
        owner, repo, version
    )
}

/// Point the formula's source at `version` and pin its hash.
///
/// Both the `url` and the primary `sha256` line must already exist; only the
/// first of each is rewritten.
pub fn update_primary(
    doc: &str,
    package_name: &str,
    version: &str,
    sha256: &str,
) -> Result<String, FormulaError> {
    let missing: Vec<&str> = [("url", &*URL_FIELD), ("sha256", &*SHA_FIELD)]
        .iter()
        .filter(|(_, re)| !re.is_match(doc))
        .map(|(field, _)| *field)
        .collect();
    if !missing.is_empty() {
        return Err(FormulaError::MissingFields {
            missing: missing.join(" and "),
        });
    }

    let url = hackage_tarball_url(package_name, version);
    let updated = URL_FIELD.replacen(doc, 1, |caps: &regex::Captures<'_>| {
        format!("{}\"{}\"", &caps[1], url)
    });
    let updated = SHA_FIELD
        .replacen(&updated, 1, |caps: &regex::Captures<'_>| {
            format!("{}\"{}\"", &caps[1], sha256)
        })
        .into_owned();

    let tarball = format!("{}-{}.tar.gz", package_name, version);
    if !updated.contains(&tarball) {
        return Err(FormulaError::VerificationFailed { expected: tarball });
    }
    if !contains_pattern(&updated, &format!(r#"sha256[ \t]+"{}""#, regex::escape(sha256))) {
        return Err(FormulaError::VerificationFailed {
            expected: format!("sha256 \"{}\"", sha256),
        });
    }

    Ok(updated)
}

/// Create or refresh the `bottle do` block for `record`.
///
/// Without a block, one is added after the primary `sha256` line. An existing
/// block gets its `root_url` pointed at `root_url`, its `rebuild` line set or
/// removed to match the record, and one entry for the record's architecture:
/// the first entry whose tag shares the record's architecture prefix
/// (`arm64` for `arm64_ventura`) is rewritten and any other entries of that
/// family are dropped. Entries for other architectures are kept.
pub fn merge_bottle_block(
    doc: &str,
    record: &BottleRecord,
    root_url: &str,
) -> Result<String, FormulaError> {
    let trailing_newline = doc.ends_with('\n');
    let mut lines: Vec<String> = doc.lines().map(String::from).collect();

    match lines.iter().position(|l| l.trim() == "bottle do") {
        None => insert_block(&mut lines, record, root_url)?,
        Some(start) => {
            let end = lines[start + 1..]
                .iter()
                .position(|l| l.trim() == "end")
                .map(|i| start + 1 + i)
                .ok_or(FormulaError::UnterminatedBlock)?;
            let default_indent = format!("{}  ", indent_of(&lines[start]));
            let body: Vec<String> = lines.drain(start + 1..end).collect();
            let merged = merge_block_body(body, record, root_url, &default_indent);
            lines.splice(start + 1..start + 1, merged);
        }
    }

    let mut out = lines.join("\n");
    if trailing_newline {
        out.push('\n');
    }

    let entry = format!(
        r#"{}:[ \t]*"{}""#,
        regex::escape(&record.tag),
        regex::escape(&record.sha256)
    );
    if !contains_pattern(&out, &entry) {
        return Err(FormulaError::VerificationFailed {
            expected: format!("{}: \"{}\"", record.tag, record.sha256),
        });
    }

    Ok(out)
}

fn insert_block(
    lines: &mut Vec<String>,
    record: &BottleRecord,
    root_url: &str,
) -> Result<(), FormulaError> {
    let sha_line = lines
        .iter()
        .position(|l| SHA_FIELD.is_match(l))
        .ok_or_else(|| FormulaError::MissingFields {
            missing: "sha256".to_string(),
        })?;

    let indent = indent_of(&lines[sha_line]).to_string();
    let inner = format!("{}  ", indent);

    let mut block = vec![
        String::new(),
        format!("{}bottle do", indent),
        root_url_line(&inner, root_url),
    ];
    if let Some(rebuild) = record.rebuild.filter(|r| *r > 0) {
        block.push(rebuild_line(&inner, rebuild));
    }
    block.push(entry_line(&inner, "cellar: :any, ", record));
    block.push(format!("{}end", indent));

    let at = sha_line + 1;
    lines.splice(at..at, block);
    Ok(())
}

fn merge_block_body(
    mut body: Vec<String>,
    record: &BottleRecord,
    root_url: &str,
    default_indent: &str,
) -> Vec<String> {
    let inner = body
        .iter()
        .find(|l| !l.trim().is_empty())
        .map_or_else(|| default_indent.to_string(), |l| indent_of(l).to_string());

    // root_url
    let root_idx = match body.iter().position(|l| l.trim_start().starts_with("root_url")) {
        Some(i) => {
            body[i] = root_url_line(indent_of(&body[i]), root_url);
            i
        }
        None => {
            body.insert(0, root_url_line(&inner, root_url));
            0
        }
    };

    // rebuild
    let rebuild = record.rebuild.filter(|r| *r > 0);
    match (body.iter().position(|l| is_rebuild_line(l)), rebuild) {
        (Some(i), Some(n)) => body[i] = rebuild_line(indent_of(&body[i]), n),
        (None, Some(n)) => body.insert(root_idx + 1, rebuild_line(&inner, n)),
        (Some(i), None) => {
            body.remove(i);
        }
        (None, None) => {}
    }

    // per-platform entries
    let arch = record.arch();
    let same_arch: Vec<usize> = body
        .iter()
        .enumerate()
        .filter(|(_, l)| {
            BOTTLE_ENTRY
                .captures(l)
                .is_some_and(|caps| arch_prefix(&caps[3]) == arch)
        })
        .map(|(i, _)| i)
        .collect();

    match same_arch.split_first() {
        Some((&first, rest)) => {
            for &i in rest.iter().rev() {
                tracing::debug!("dropping superseded bottle entry: {}", body[i].trim());
                body.remove(i);
            }
            if let Some(caps) = BOTTLE_ENTRY.captures(&body[first]) {
                let rewritten = entry_line(&caps[1], &caps[2], record);
                body[first] = rewritten;
            }
        }
        None => {
            let root_idx = body
                .iter()
                .position(|l| l.trim_start().starts_with("root_url"))
                .unwrap_or(0);
            let mut at = root_idx + 1;
            if body.get(at).is_some_and(|l| is_rebuild_line(l)) {
                at += 1;
            }
            body.insert(at, entry_line(&inner, "cellar: :any, ", record));
        }
    }

    body
}

fn root_url_line(indent: &str, root_url: &str) -> String {
    format!("{}root_url \"{}\"", indent, root_url)
}

fn rebuild_line(indent: &str, rebuild: u32) -> String {
    format!("{}rebuild {}", indent, rebuild)
}

/// `prefix` is everything between `sha256 ` and the tag, e.g. `cellar: :any, `.
fn entry_line(indent: &str, prefix: &str, record: &BottleRecord) -> String {
    format!(
        "{}sha256 {}{}: \"{}\"",
        indent, prefix, record.tag, record.sha256
    )
}

fn is_rebuild_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed == "rebuild" || trimmed.starts_with("rebuild ")
}

fn indent_of(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

fn contains_pattern(doc: &str, pattern: &str) -> bool {
    Regex::new(pattern).is_ok_and(|re| re.is_match(doc))
}
