use anyhow::{Context, Result};
use scry_core::config::Config;
use std::path::Path;

pub fn run(repo_root: &Path, config: &Config) -> Result<()> {
    let engine = crate::open_engine(repo_root, config)?;
    let stored = engine
        .generate_summaries()
        .context("Summary generation failed")?;
    println!("Stored {stored} file summaries");
    Ok(())
}
