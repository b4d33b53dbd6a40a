//! `relbrew version` command

use anyhow::Result;

pub fn execute() -> Result<()> {
    println!("relbrew {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
