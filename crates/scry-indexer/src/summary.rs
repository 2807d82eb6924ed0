//! File-level summaries: one synthetic document per indexed file listing its
//! declarations, so architectural queries ("where is auth wired up?") can hit
//! a file even when no single symbol matches well.

use scry_core::constants::{MAX_SUMMARY_CHARS, MAX_SUMMARY_SIGNATURES};
use scry_core::error::IndexingError;
use scry_core::types::{Symbol, SymbolKind, SummaryChunk};
use scry_state::gateway::RetrievalGateway;
use tracing::{debug, info};

/// Summaries upserted per gateway call.
pub const SUMMARY_BATCH_SIZE: usize = 50;

pub trait SummaryGenerator: Send + Sync {
    fn generate(&self, file_path: &str, language: &str, symbols: &[Symbol]) -> String;
}

/// Builds the summary purely from symbol metadata; no model calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedSummaryGenerator;

impl SummaryGenerator for RuleBasedSummaryGenerator {
    fn generate(&self, file_path: &str, language: &str, symbols: &[Symbol]) -> String {
        let header = format!("File: {file_path} ({language})");
        if symbols.is_empty() {
            return format!("{header}\nEmpty file (no symbols).");
        }

        let mut classes = Vec::new();
        let mut functions = Vec::new();
        let mut methods = Vec::new();
        let mut other = Vec::new();
        for symbol in symbols {
            match signature_priority(symbol.kind) {
                Some(0) => classes.push(symbol.name.as_str()),
                Some(1) => functions.push(symbol.name.as_str()),
                Some(_) => methods.push(symbol.name.as_str()),
                None => other.push(symbol.name.as_str()),
            }
        }

        let mut parts = vec![header];
        for (label, names) in [
            ("Classes", &classes),
            ("Functions", &functions),
            ("Methods", &methods),
            ("Other", &other),
        ] {
            if !names.is_empty() {
                parts.push(format!("{label}: {}", names.join(", ")));
            }
        }

        let signatures = key_signatures(symbols);
        if !signatures.is_empty() {
            parts.push("Key signatures:".to_string());
            parts.extend(signatures);
        }
        parts.join("\n")
    }
}

/// 0 for type-like kinds, 1 for functions, 2 for methods; others carry no signature.
fn signature_priority(kind: SymbolKind) -> Option<u8> {
    if kind.is_type_like() {
        Some(0)
    } else {
        match kind {
            SymbolKind::Function => Some(1),
            SymbolKind::Method => Some(2),
            _ => None,
        }
    }
}

fn key_signatures(symbols: &[Symbol]) -> Vec<String> {
    let mut ranked: Vec<(u8, &Symbol)> = symbols
        .iter()
        .filter_map(|symbol| signature_priority(symbol.kind).map(|p| (p, symbol)))
        .collect();
    ranked.sort_by_key(|(priority, symbol)| (*priority, symbol.line_start));

    let mut budget = MAX_SUMMARY_CHARS;
    let mut lines = Vec::new();
    for (_, symbol) in ranked.into_iter().take(MAX_SUMMARY_SIGNATURES) {
        let indent = if symbol.kind == SymbolKind::Method { "  " } else { "" };
        let mut line = format!(
            "{indent}{}",
            symbol.signature.as_deref().unwrap_or(&symbol.qualified_name)
        );
        if let Some(first) = symbol
            .doc_comment
            .as_deref()
            .and_then(|doc| doc.trim().lines().next())
            .map(str::trim)
            .filter(|first| !first.is_empty())
        {
            line.push_str(": ");
            line.push_str(first);
        }

        let len = line.chars().count();
        if len > budget {
            break;
        }
        budget = budget.saturating_sub(len + 1);
        lines.push(line);
    }
    lines
}

/// Summarize every indexed file and upsert the results in batches.
/// Returns the number of summaries the core accepted.
pub fn generate_file_summaries(
    gateway: &dyn RetrievalGateway,
    generator: &dyn SummaryGenerator,
    batch_size: usize,
) -> Result<usize, IndexingError> {
    let batch_size = batch_size.max(1);
    let files = gateway.list_indexed_files()?;
    if files.is_empty() {
        return Ok(0);
    }

    let mut pending = Vec::with_capacity(batch_size);
    let mut total = 0;
    for file in files {
        let outline = gateway.get_file_outline(&file.path)?;
        let content = generator.generate(&file.path, &file.language, &outline);
        if content.is_empty() {
            continue;
        }
        pending.push(SummaryChunk {
            file_path: file.path,
            language: file.language,
            content,
        });
        if pending.len() >= batch_size {
            total += gateway.upsert_summary_chunks(&pending)?;
            debug!(total, "summary batch upserted");
            pending.clear();
        }
    }
    if !pending.is_empty() {
        total += gateway.upsert_summary_chunks(&pending)?;
    }

    info!(summaries = total, "file summaries generated");
    Ok(total)
}
