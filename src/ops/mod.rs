//! High-level operations.
//!
//! Everything that talks to an external tool, the network or the operator.

pub mod git;
pub mod hackage;
pub mod hash;
pub mod homebrew;
pub mod prompt;
pub mod release;

pub use hash::{HashResolver, ReqwestTransport};
pub use prompt::{Gate, NonInteractive, Prompter, TerminalPrompter};
pub use release::{ReleaseError, ReleaseOptions, ReleasePipeline, ReleaseReport, Stage, StageOutcome};
