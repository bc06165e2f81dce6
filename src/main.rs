//! confstack: inspect layered configuration trees
//!
//! Materializes the same channel/file/env layer stack the library
//! applies at process startup, for debugging override files and
//! environment setups.

use anyhow::Result;

fn main() -> Result<()> {
    confstack::cli::run()
}
