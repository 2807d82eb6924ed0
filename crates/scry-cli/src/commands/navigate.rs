use crate::output;
use anyhow::{Context, Result, bail};
use scry_core::config::Config;
use std::path::Path;

pub fn symbol(repo_root: &Path, config: &Config, name: &str, json: bool) -> Result<()> {
    let engine = crate::open_engine(repo_root, config)?;
    let symbols = engine.find_symbol(name).context("Symbol lookup failed")?;
    if json {
        return output::print_json(&symbols);
    }
    if symbols.is_empty() {
        println!("No symbol named \"{name}\"");
        return Ok(());
    }
    print!("{}", output::symbols_table(&symbols));
    Ok(())
}

pub fn outline(repo_root: &Path, config: &Config, path: &str, json: bool) -> Result<()> {
    let engine = crate::open_engine(repo_root, config)?;
    let symbols = engine
        .get_file_outline(path)
        .with_context(|| format!("Outline of {path} failed"))?;
    if json {
        return output::print_json(&symbols);
    }
    if symbols.is_empty() {
        println!("No symbols indexed for {path}");
        return Ok(());
    }
    print!("{}", output::symbols_table(&symbols));
    Ok(())
}

pub fn context(
    repo_root: &Path,
    config: &Config,
    symbol_id: &str,
    depth: u32,
    fanout: usize,
    json: bool,
) -> Result<()> {
    let engine = crate::open_engine(repo_root, config)?;
    let Some(ctx) = engine
        .get_function_context(symbol_id, depth, fanout)
        .context("Context lookup failed")?
    else {
        bail!("Unknown symbol id: {symbol_id}");
    };
    if json {
        return output::print_json(&ctx);
    }
    println!(
        "{} ({}) {}:{}",
        ctx.symbol.qualified_name, ctx.symbol.kind, ctx.symbol.file_path, ctx.symbol.line_start
    );
    if let Some(signature) = &ctx.symbol.signature {
        println!("  {signature}");
    }
    print!("{}", output::chain_lines("callers", &ctx.callers));
    print!("{}", output::chain_lines("callees", &ctx.callees));
    print!("{}", output::chain_lines("hierarchy", &ctx.hierarchy));
    Ok(())
}
