//! Core data structures for relbrew.
//!
//! Pure document handling with no process or network access:
//! - Cabal manifests and version numbers
//! - Changelog sections
//! - Homebrew formulae and bottle descriptions

pub mod bottle;
pub mod changelog;
pub mod formula;
pub mod manifest;
pub mod version;

pub use bottle::BottleRecord;
pub use changelog::ReleaseNotes;
pub use manifest::Manifest;
pub use version::increment_version;
