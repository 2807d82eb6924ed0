use anyhow::{Context, Result};
use scry_core::config::Config;
use scry_indexer::scheduler::CancellationToken;
use std::path::Path;
use std::time::Duration;

pub fn run(
    repo_root: &Path,
    config: &Config,
    chunks: bool,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let engine = crate::open_engine(repo_root, config)?;
    let token = match timeout_secs {
        Some(secs) => CancellationToken::with_timeout(Duration::from_secs(secs)),
        None => CancellationToken::new(),
    };
    let sweep = if chunks {
        engine.embed_all_chunks(&token)
    } else {
        engine.embed_all(&token)
    }
    .context("Embedding failed")?;
    super::index::print_sweep(&sweep);
    Ok(())
}
