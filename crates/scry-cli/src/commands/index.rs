use anyhow::{Context, Result};
use scry_core::config::Config;
use scry_core::types::EmbeddingSweepReport;
use std::path::Path;
use std::time::Instant;
use tracing::warn;

pub fn run(repo_root: &Path, config: &Config, incremental: bool) -> Result<()> {
    let repo_root = std::fs::canonicalize(repo_root).context("Failed to resolve project path")?;
    let engine = crate::open_engine(&repo_root, config)?;
    let started = Instant::now();

    let embedding = if incremental {
        let outcome = engine
            .index_incremental()
            .context("Incremental index failed")?;
        let report = &outcome.report;
        println!(
            "Incremental index: {} scanned, {} indexed, {} unchanged, {} deleted, {} failed",
            report.files_scanned,
            report.files_indexed,
            report.files_unchanged,
            report.files_deleted,
            report.files_failed
        );
        println!(
            "  {} changed symbols, {} removed{}",
            report.changed_symbol_ids.len(),
            report.removed_symbol_ids.len(),
            if report.fell_back_to_full {
                " (fell back to a full index)"
            } else {
                ""
            }
        );
        outcome.embedding
    } else {
        let outcome = engine.index().context("Index failed")?;
        let report = &outcome.report;
        println!(
            "Indexed {} of {} files ({} skipped, {} failed): {} symbols, {} relations, {} chunks",
            report.files_indexed,
            report.total_files_scanned,
            report.files_skipped,
            report.files_failed,
            report.total_symbols,
            report.total_relations,
            report.total_chunks
        );
        outcome.embedding
    };

    match embedding {
        Some(sweep) => print_sweep(&sweep),
        None => println!("Embedding: skipped (no embedding backend configured)"),
    }
    println!("Done in {:.1}s", started.elapsed().as_secs_f64());
    Ok(())
}

pub(crate) fn print_sweep(sweep: &EmbeddingSweepReport) {
    println!(
        "Embedding: {} vectors in {} batches",
        sweep.embedded, sweep.batches_submitted
    );
    if sweep.failed_batches > 0 {
        warn!(failed_batches = sweep.failed_batches, "some embedding batches failed");
        println!("  {} batches failed", sweep.failed_batches);
    }
    if sweep.cancelled {
        if sweep.aborted_batches > 0 {
            println!("  {} batches abandoned at cancellation", sweep.aborted_batches);
        }
        println!("  stopped early; partial progress was kept");
    }
}
