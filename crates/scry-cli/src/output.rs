use anyhow::Result;
use scry_core::types::{CallChainNode, SearchResult, Symbol};
use serde::Serialize;
use std::fmt::Write;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn location(path: &str, line: u32) -> String {
    if line > 0 {
        format!("{path}:{line}")
    } else {
        path.to_string()
    }
}

pub fn results_table(results: &[SearchResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<50} {:<10} {:<30} {:>8} {}",
        "PATH", "KIND", "NAME", "SCORE", "SIGNALS"
    );
    let _ = writeln!(out, "{}", "-".repeat(110));
    for result in results {
        let signals: Vec<&str> = result.match_signals.iter().map(|s| s.as_str()).collect();
        let _ = writeln!(
            out,
            "{:<50} {:<10} {:<30} {:>8.3} {}",
            location(&result.file_path, result.line_start),
            result.kind,
            result.qualified_name,
            result.effective_score(),
            signals.join(","),
        );
    }
    out
}

pub fn symbols_table(symbols: &[Symbol]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<50} {:<10} {:<30} {}", "PATH", "KIND", "NAME", "ID");
    let _ = writeln!(out, "{}", "-".repeat(110));
    for symbol in symbols {
        let _ = writeln!(
            out,
            "{:<50} {:<10} {:<30} {}",
            location(&symbol.file_path, symbol.line_start),
            symbol.kind,
            symbol.qualified_name,
            symbol.id,
        );
    }
    out
}

pub fn chain_lines(title: &str, nodes: &[CallChainNode]) -> String {
    let mut out = format!("{title} ({})\n", nodes.len());
    for node in nodes {
        let indent = "  ".repeat(node.depth.max(1) as usize);
        let _ = writeln!(
            out,
            "{indent}{} {}",
            node.qualified_name,
            location(&node.file_path, node.line)
        );
    }
    out
}
