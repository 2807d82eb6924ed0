use crate::output;
use anyhow::{Context, Result};
use scry_core::config::Config;
use scry_query::SearchOptions;
use std::path::Path;
use std::time::Instant;

pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub limit: usize,
    pub language: Option<String>,
    pub path_prefix: Option<String>,
    pub dedupe_by_file: bool,
    pub json: bool,
}

pub fn run(repo_root: &Path, config: &Config, request: &SearchRequest<'_>) -> Result<()> {
    let engine = crate::open_engine(repo_root, config)?;
    let options = SearchOptions {
        limit: request.limit,
        language: request.language.clone(),
        path_prefix: request.path_prefix.clone(),
        dedupe_by_file: request.dedupe_by_file,
    };

    let start = Instant::now();
    let results = engine
        .search(request.query, &options)
        .context("Search failed")?;
    let elapsed = start.elapsed();

    if request.json {
        return output::print_json(&results);
    }
    if results.is_empty() {
        println!("No results found for \"{}\"", request.query);
        return Ok(());
    }
    print!("{}", output::results_table(&results));
    println!(
        "\n{} results in {:.1}ms",
        results.len(),
        elapsed.as_secs_f64() * 1000.0
    );
    Ok(())
}
