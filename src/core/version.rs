//! Version increment rules.

use std::sync::LazyLock;

use regex::Regex;

static THREE_COMPONENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("valid regex"));

/// Suggest the next version after `current`.
///
/// The first `major.minor.patch` run in the string gets its patch component
/// bumped (`1.2.3` -> `1.2.4`); anything else gets `.1` appended
/// (`abc` -> `abc.1`).
pub fn increment_version(current: &str) -> String {
    if let Some(caps) = THREE_COMPONENT.captures(current) {
        if let Some(patch) = caps[3].parse::<u64>().ok().and_then(|p| p.checked_add(1)) {
            return format!("{}.{}.{}", &caps[1], &caps[2], patch);
        }
    }
    format!("{}.1", current)
}
