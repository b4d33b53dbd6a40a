//! relbrew - release a Haskell package to Hackage and a Homebrew tap
//!
//! One `relbrew release` bumps the version in the `.cabal` file, opens a
//! changelog section, runs the tests, commits and tags, publishes to
//! Hackage, points the Homebrew formula at the published tarball and
//! optionally builds and uploads a bottle.

pub mod core;
pub mod ops;
pub mod util;

/// Test utilities and mocks for relbrew unit tests.
#[cfg(test)]
pub mod test_support;

pub use core::manifest::Manifest;
pub use ops::release::{ReleaseOptions, ReleasePipeline, ReleaseReport};
pub use util::context::GlobalContext;
