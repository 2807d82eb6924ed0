//! In-memory stand-in for the indexing core.
//!
//! Search fuses per-signal rankings with weighted reciprocal-rank fusion, which
//! is close enough to the real core for pipeline tests, and every call is
//! recorded so tests can assert on what crossed the boundary.

use crate::gateway::{GatewayQuery, RetrievalGateway, clamp_graph_bounds};
use scry_core::constants::RRF_K;
use scry_core::error::GatewayError;
use scry_core::types::{
    CallChainNode, ChunkForEmbedding, ChunkInfo, FileInfo, FunctionContext,
    IncrementalIndexReport, IndexReport, MatchSignal, SearchResult, SignalWeights, SummaryChunk,
    Symbol,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Number of fused hits whose neighbours are pulled in by graph expansion.
const GRAPH_SEEDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Calls,
    Inherits,
}

#[derive(Debug, Clone)]
struct Edge {
    from: String,
    to: String,
    kind: EdgeKind,
}

#[derive(Default)]
struct MemoryState {
    symbols: Vec<Symbol>,
    chunks: Vec<ChunkForEmbedding>,
    edges: Vec<Edge>,
    vectors: HashMap<String, Vec<f32>>,
    summaries: BTreeMap<String, SummaryChunk>,
    scripted_results: Option<Vec<SearchResult>>,
    search_failure: Option<String>,
    index_report: Option<IndexReport>,
    incremental_reports: VecDeque<IncrementalIndexReport>,
    calls: RecordedCalls,
}

/// Everything the gateway was asked to do, in call order.
#[derive(Debug, Clone, Default)]
pub struct RecordedCalls {
    pub searches: Vec<GatewayQuery>,
    pub symbol_pages: Vec<(usize, usize)>,
    pub chunk_pages: Vec<(usize, usize)>,
    pub symbols_by_ids: Vec<Vec<String>>,
    pub add_vectors: Vec<Vec<String>>,
    pub indexed_roots: Vec<PathBuf>,
    pub outlines: Vec<String>,
    pub flushes: usize,
}

#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbols(symbols: Vec<Symbol>) -> Self {
        let gateway = Self::new();
        for symbol in symbols {
            gateway.add_symbol(symbol);
        }
        gateway
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_symbol(&self, symbol: Symbol) {
        let mut state = self.lock();
        state.symbols.retain(|existing| existing.id != symbol.id);
        state.symbols.push(symbol);
    }

    pub fn remove_symbol(&self, id: &str) {
        let mut state = self.lock();
        state.symbols.retain(|existing| existing.id != id);
        state.vectors.remove(id);
    }

    pub fn add_chunk(&self, chunk: ChunkForEmbedding) {
        self.lock().chunks.push(chunk);
    }

    pub fn add_edge(&self, from: &str, to: &str, kind: EdgeKind) {
        self.lock().edges.push(Edge {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        });
    }

    /// Bypass fusion and return these results (truncated to the pool size).
    pub fn set_search_results(&self, results: Vec<SearchResult>) {
        self.lock().scripted_results = Some(results);
    }

    pub fn set_search_failure(&self, message: Option<&str>) {
        self.lock().search_failure = message.map(ToString::to_string);
    }

    pub fn set_index_report(&self, report: IndexReport) {
        self.lock().index_report = Some(report);
    }

    /// Queue the report returned by the next `index_incremental` call.
    pub fn push_incremental_report(&self, report: IncrementalIndexReport) {
        self.lock().incremental_reports.push_back(report);
    }

    pub fn calls(&self) -> RecordedCalls {
        self.lock().calls.clone()
    }

    pub fn vector_for(&self, id: &str) -> Option<Vec<f32>> {
        self.lock().vectors.get(id).cloned()
    }

    pub fn vector_count(&self) -> usize {
        self.lock().vectors.len()
    }

    pub fn summaries(&self) -> Vec<SummaryChunk> {
        self.lock().summaries.values().cloned().collect()
    }
}

impl RetrievalGateway for MemoryGateway {
    fn search(&self, query: &GatewayQuery) -> Result<Vec<SearchResult>, GatewayError> {
        query.validate()?;
        let mut state = self.lock();
        state.calls.searches.push(query.clone());
        if let Some(message) = state.search_failure.clone() {
            return Err(GatewayError::core(message));
        }
        if let Some(scripted) = state.scripted_results.as_ref() {
            return Ok(scripted.iter().take(query.pool_size).cloned().collect());
        }
        Ok(fuse(&state, query))
    }

    fn find_symbol(&self, name: &str) -> Result<Vec<Symbol>, GatewayError> {
        let state = self.lock();
        Ok(state
            .symbols
            .iter()
            .filter(|symbol| symbol.name == name || symbol.qualified_name == name)
            .cloned()
            .collect())
    }

    fn get_file_outline(&self, path: &str) -> Result<Vec<Symbol>, GatewayError> {
        let mut state = self.lock();
        state.calls.outlines.push(path.to_string());
        let mut outline: Vec<Symbol> = state
            .symbols
            .iter()
            .filter(|symbol| symbol.file_path == path)
            .cloned()
            .collect();
        outline.sort_by_key(|symbol| symbol.line_start);
        Ok(outline)
    }

    fn get_function_context(
        &self,
        symbol_id: &str,
        max_depth: u32,
        max_fanout: usize,
    ) -> Result<Option<FunctionContext>, GatewayError> {
        let (max_depth, max_fanout) = clamp_graph_bounds(max_depth, max_fanout);
        let state = self.lock();
        let Some(symbol) = state.symbols.iter().find(|s| s.id == symbol_id).cloned() else {
            return Ok(None);
        };
        let callers = walk(&state, symbol_id, EdgeKind::Calls, true, max_depth, max_fanout);
        let callees = walk(&state, symbol_id, EdgeKind::Calls, false, max_depth, max_fanout);
        let hierarchy = walk(&state, symbol_id, EdgeKind::Inherits, false, max_depth, max_fanout);
        Ok(Some(FunctionContext {
            symbol,
            callers,
            callees,
            hierarchy,
        }))
    }

    fn index_full(&self, root: &Path, chunk_enabled: bool) -> Result<IndexReport, GatewayError> {
        let mut state = self.lock();
        state.calls.indexed_roots.push(root.to_path_buf());
        if let Some(report) = state.index_report.clone() {
            return Ok(report);
        }
        let files = distinct_files(&state.symbols).len();
        Ok(IndexReport {
            total_files_scanned: files,
            files_indexed: files,
            total_symbols: state.symbols.len(),
            total_relations: state.edges.len(),
            total_chunks: if chunk_enabled { state.chunks.len() } else { 0 },
            ..IndexReport::default()
        })
    }

    fn index_incremental(
        &self,
        root: &Path,
        _chunk_enabled: bool,
    ) -> Result<IncrementalIndexReport, GatewayError> {
        let mut state = self.lock();
        state.calls.indexed_roots.push(root.to_path_buf());
        if let Some(report) = state.incremental_reports.pop_front() {
            return Ok(report);
        }
        let files = distinct_files(&state.symbols).len();
        Ok(IncrementalIndexReport {
            files_scanned: files,
            files_unchanged: files,
            total_symbols: state.symbols.len(),
            total_relations: state.edges.len(),
            ..IncrementalIndexReport::default()
        })
    }

    fn list_symbols_for_embedding(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Symbol>, GatewayError> {
        let mut state = self.lock();
        state.calls.symbol_pages.push((offset, limit));
        Ok(state.symbols.iter().skip(offset).take(limit).cloned().collect())
    }

    fn list_chunks_for_embedding(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChunkForEmbedding>, GatewayError> {
        let mut state = self.lock();
        state.calls.chunk_pages.push((offset, limit));
        Ok(state.chunks.iter().skip(offset).take(limit).cloned().collect())
    }

    fn get_symbols_by_ids(&self, ids: &[String]) -> Result<Vec<Symbol>, GatewayError> {
        let mut state = self.lock();
        state.calls.symbols_by_ids.push(ids.to_vec());
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        Ok(state
            .symbols
            .iter()
            .filter(|symbol| wanted.contains(symbol.id.as_str()))
            .cloned()
            .collect())
    }

    fn add_vectors(&self, ids: &[String], vectors: &[Vec<f32>]) -> Result<(), GatewayError> {
        if ids.len() != vectors.len() {
            return Err(GatewayError::invalid_request(format!(
                "add_vectors: {} ids for {} vectors",
                ids.len(),
                vectors.len()
            )));
        }
        let mut state = self.lock();
        state.calls.add_vectors.push(ids.to_vec());
        for (id, vector) in ids.iter().zip(vectors) {
            state.vectors.insert(id.clone(), vector.clone());
        }
        Ok(())
    }

    fn list_indexed_files(&self) -> Result<Vec<FileInfo>, GatewayError> {
        let state = self.lock();
        Ok(distinct_files(&state.symbols)
            .into_iter()
            .map(|(path, (language, symbol_count))| FileInfo {
                path,
                language,
                symbol_count,
            })
            .collect())
    }

    fn upsert_summary_chunks(&self, chunks: &[SummaryChunk]) -> Result<usize, GatewayError> {
        let mut state = self.lock();
        for chunk in chunks {
            state
                .summaries
                .insert(chunk.file_path.clone(), chunk.clone());
        }
        Ok(chunks.len())
    }

    fn flush(&self) -> Result<(), GatewayError> {
        self.lock().calls.flushes += 1;
        Ok(())
    }
}

fn distinct_files(symbols: &[Symbol]) -> BTreeMap<String, (String, usize)> {
    let mut files: BTreeMap<String, (String, usize)> = BTreeMap::new();
    for symbol in symbols {
        files
            .entry(symbol.file_path.clone())
            .or_insert_with(|| (symbol.language.clone(), 0))
            .1 += 1;
    }
    files
}

/// Breadth-first walk over one edge kind, `reverse` following edges backwards.
fn walk(
    state: &MemoryState,
    start: &str,
    kind: EdgeKind,
    reverse: bool,
    max_depth: u32,
    max_fanout: usize,
) -> Vec<CallChainNode> {
    let mut nodes = Vec::new();
    let mut seen: HashSet<&str> = HashSet::from([start]);
    let mut frontier = vec![start];

    for depth in 1..=max_depth {
        let mut next = Vec::new();
        for current in frontier {
            let neighbours = state
                .edges
                .iter()
                .filter(|edge| edge.kind == kind)
                .filter_map(|edge| match reverse {
                    true if edge.to == current => Some(edge.from.as_str()),
                    false if edge.from == current => Some(edge.to.as_str()),
                    _ => None,
                })
                .take(max_fanout);
            for neighbour in neighbours {
                if !seen.insert(neighbour) {
                    continue;
                }
                if let Some(symbol) = state.symbols.iter().find(|s| s.id == neighbour) {
                    nodes.push(CallChainNode {
                        symbol_id: symbol.id.clone(),
                        name: symbol.name.clone(),
                        qualified_name: symbol.qualified_name.clone(),
                        file_path: symbol.file_path.clone(),
                        line: symbol.line_start,
                        depth,
                    });
                }
                next.push(neighbour);
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    nodes
}

struct Fused {
    score: f64,
    signals: Vec<MatchSignal>,
    chunk_info: Option<ChunkInfo>,
    first_seen: usize,
}

fn fuse(state: &MemoryState, query: &GatewayQuery) -> Vec<SearchResult> {
    let candidates: Vec<&Symbol> = state
        .symbols
        .iter()
        .filter(|symbol| {
            query
                .language
                .as_deref()
                .is_none_or(|language| symbol.language.eq_ignore_ascii_case(language))
        })
        .filter(|symbol| {
            query
                .path_prefix
                .as_deref()
                .is_none_or(|prefix| symbol.file_path.starts_with(prefix))
        })
        .collect();

    let mut query_tokens = tokenize(&query.text);
    if let Some(aux) = query.aux_bm25_text.as_deref() {
        query_tokens.extend(tokenize(aux));
    }

    let mut fused: HashMap<&str, Fused> = HashMap::new();

    for (rank, id) in rank_by_overlap(&candidates, &query_tokens).into_iter().enumerate() {
        add_hit(&mut fused, id, rank, &query.weights, MatchSignal::Bm25, None);
    }

    let trimmed = query.text.trim();
    let exact_ids: Vec<&str> = candidates
        .iter()
        .filter(|symbol| {
            symbol.name == trimmed
                || symbol.qualified_name == trimmed
                || query
                    .exact_match_terms
                    .iter()
                    .any(|term| symbol.name == *term || symbol.qualified_name == *term)
        })
        .map(|symbol| symbol.id.as_str())
        .collect();
    for (rank, id) in exact_ids.into_iter().enumerate() {
        add_hit(&mut fused, id, rank, &query.weights, MatchSignal::Exact, None);
    }

    if let Some(vector) = query.vector.as_deref() {
        let mut scored: Vec<(&str, f64)> = candidates
            .iter()
            .filter_map(|symbol| {
                let stored = state.vectors.get(&symbol.id)?;
                let similarity = cosine(vector, stored);
                (similarity > 0.0).then_some((symbol.id.as_str(), similarity))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (rank, (id, _)) in scored.into_iter().enumerate() {
            add_hit(&mut fused, id, rank, &query.weights, MatchSignal::Vector, None);
        }
    }

    if query.chunk_enabled {
        let mut scored: Vec<(&ChunkForEmbedding, f64)> = state
            .chunks
            .iter()
            .filter_map(|chunk| {
                let overlap = overlap_ratio(&query_tokens, &tokenize(&chunk.content));
                (overlap > 0.0).then_some((chunk, overlap))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (rank, (chunk, chunk_score)) in scored.into_iter().enumerate() {
            // Chunk hits are attributed to the first symbol of their file.
            let Some(owner) = candidates
                .iter()
                .copied()
                .find(|s| s.file_path == chunk.file_path)
            else {
                continue;
            };
            let info = ChunkInfo {
                context_path: chunk.context_path.clone(),
                chunk_score,
            };
            add_hit(
                &mut fused,
                &owner.id,
                rank,
                &query.weights,
                MatchSignal::ChunkBm25,
                Some(info),
            );
        }
    }

    let mut seeds: Vec<(&str, f64, usize)> = fused
        .iter()
        .map(|(id, hit)| (*id, hit.score, hit.first_seen))
        .collect();
    seeds.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));
    let seed_ids: HashSet<&str> = seeds.iter().take(GRAPH_SEEDS).map(|s| s.0).collect();
    let mut neighbours: Vec<&str> = Vec::new();
    for edge in state.edges.iter().filter(|edge| edge.kind == EdgeKind::Calls) {
        for (from, to) in [(&edge.from, &edge.to), (&edge.to, &edge.from)] {
            if seed_ids.contains(from.as_str())
                && !seed_ids.contains(to.as_str())
                && !neighbours.contains(&to.as_str())
                && candidates.iter().any(|s| s.id == *to)
            {
                neighbours.push(to.as_str());
            }
        }
    }
    for (rank, id) in neighbours.into_iter().enumerate() {
        add_hit(&mut fused, id, rank, &query.weights, MatchSignal::Graph, None);
    }

    let mut ranked: Vec<(&str, Fused)> = fused.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.score
            .total_cmp(&a.1.score)
            .then(a.1.first_seen.cmp(&b.1.first_seen))
    });
    ranked.truncate(query.pool_size);

    ranked
        .into_iter()
        .filter_map(|(id, hit)| {
            let symbol = candidates.iter().find(|s| s.id == id)?;
            Some(SearchResult {
                symbol_id: symbol.id.clone(),
                name: symbol.name.clone(),
                qualified_name: symbol.qualified_name.clone(),
                kind: symbol.kind,
                file_path: symbol.file_path.clone(),
                line_start: symbol.line_start,
                line_end: symbol.line_end,
                score: hit.score,
                rerank_score: None,
                match_signals: hit.signals,
                snippet: symbol.signature.clone(),
                related_symbols: Vec::new(),
                chunk_info: hit.chunk_info,
            })
        })
        .collect()
}

fn add_hit<'a>(
    fused: &mut HashMap<&'a str, Fused>,
    id: &'a str,
    rank: usize,
    weights: &SignalWeights,
    signal: MatchSignal,
    chunk: Option<ChunkInfo>,
) {
    let next = fused.len();
    let entry = fused.entry(id).or_insert(Fused {
        score: 0.0,
        signals: Vec::new(),
        chunk_info: None,
        first_seen: next,
    });
    entry.score += weights.for_signal(signal) / (RRF_K + rank as f64 + 1.0);
    if !entry.signals.contains(&signal) {
        entry.signals.push(signal);
    }
    if entry.chunk_info.is_none() {
        entry.chunk_info = chunk;
    }
}

fn rank_by_overlap<'a>(candidates: &[&'a Symbol], query_tokens: &HashSet<String>) -> Vec<&'a str> {
    let mut scored: Vec<(&str, f64)> = candidates
        .iter()
        .filter_map(|symbol| {
            let mut text = format!("{} {}", symbol.name, symbol.qualified_name);
            for extra in [&symbol.signature, &symbol.doc_comment].into_iter().flatten() {
                text.push(' ');
                text.push_str(extra);
            }
            let overlap = overlap_ratio(query_tokens, &tokenize(&text));
            (overlap > 0.0).then_some((symbol.id.as_str(), overlap))
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.into_iter().map(|(id, _)| id).collect()
}

fn overlap_ratio(query_tokens: &HashSet<String>, doc_tokens: &HashSet<String>) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let matched = query_tokens.iter().filter(|t| doc_tokens.contains(*t)).count();
    matched as f64 / query_tokens.len() as f64
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// Lowercased word pieces, splitting on case changes and non-alphanumerics.
fn tokenize(text: &str) -> HashSet<String> {
    let mut tokens = HashSet::new();
    let mut current = String::new();
    let mut push = |current: &mut String| {
        if current.chars().count() > 1 {
            tokens.insert(current.to_lowercase());
        }
        current.clear();
    };
    for ch in text.chars() {
        if ch.is_uppercase() && current.chars().last().is_some_and(char::is_lowercase) {
            push(&mut current);
        }
        if ch.is_alphanumeric() {
            current.push(ch);
        } else {
            push(&mut current);
        }
    }
    push(&mut current);
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_core::types::SymbolKind;

    fn symbol(id: &str, name: &str, kind: SymbolKind, file: &str, line: u32) -> Symbol {
        Symbol {
            id: id.to_string(),
            name: name.to_string(),
            qualified_name: format!("mod.{name}"),
            kind,
            language: "python".to_string(),
            file_path: file.to_string(),
            line_start: line,
            line_end: line + 4,
            signature: None,
            doc_comment: None,
            body_text: None,
        }
    }

    fn fixture() -> MemoryGateway {
        MemoryGateway::with_symbols(vec![
            symbol("a", "parse_html", SymbolKind::Function, "src/html.py", 1),
            symbol("b", "HtmlParser", SymbolKind::Class, "src/html.py", 10),
            symbol("c", "render_page", SymbolKind::Function, "src/render.py", 1),
            symbol("d", "MAX_SIZE", SymbolKind::Constant, "src/consts.py", 1),
        ])
    }

    #[test]
    fn keyword_hits_carry_bm25_signal() {
        let gateway = fixture();
        let results = gateway.search(&GatewayQuery::new("parse html", 10)).unwrap();
        assert_eq!(results[0].symbol_id, "a");
        assert!(results[0].match_signals.contains(&MatchSignal::Bm25));
        assert!(results.iter().all(|r| r.symbol_id != "d"));
    }

    #[test]
    fn exact_terms_add_exact_signal_and_weight() {
        let gateway = fixture();
        let mut query = GatewayQuery::new("page", 10);
        query.exact_match_terms = vec!["MAX_SIZE".to_string()];
        query.weights = SignalWeights {
            exact: 2.5,
            ..SignalWeights::default()
        };
        let results = gateway.search(&query).unwrap();
        assert_eq!(results[0].symbol_id, "d");
        assert_eq!(results[0].match_signals, vec![MatchSignal::Exact]);
    }

    #[test]
    fn graph_neighbours_are_graph_only_hits() {
        let gateway = fixture();
        gateway.add_edge("c", "a", EdgeKind::Calls);
        let results = gateway.search(&GatewayQuery::new("parse_html", 10)).unwrap();
        let render = results.iter().find(|r| r.symbol_id == "c").unwrap();
        assert_eq!(render.match_signals, vec![MatchSignal::Graph]);
        assert!(render.is_graph_only());
    }

    #[test]
    fn vector_search_uses_stored_vectors() {
        let gateway = fixture();
        gateway
            .add_vectors(
                &["c".to_string(), "b".to_string()],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .unwrap();
        let mut query = GatewayQuery::new("zzz", 10);
        query.vector = Some(vec![0.9, 0.1]);
        let results = gateway.search(&query).unwrap();
        assert_eq!(results[0].symbol_id, "c");
        assert_eq!(results[0].match_signals, vec![MatchSignal::Vector]);
    }

    #[test]
    fn each_signal_is_scaled_by_its_own_weight() {
        let gateway = fixture();
        gateway.add_edge("c", "a", EdgeKind::Calls);
        let mut query = GatewayQuery::new("parse_html", 10);
        let baseline = gateway.search(&query).unwrap();
        query.weights = SignalWeights {
            graph: query.weights.graph * 3.0,
            ..query.weights
        };
        let boosted = gateway.search(&query).unwrap();

        let score = |results: &[SearchResult], id: &str| {
            results.iter().find(|r| r.symbol_id == id).unwrap().score
        };
        assert!((score(&boosted, "c") - 3.0 * score(&baseline, "c")).abs() < 1e-9);
        assert!((score(&boosted, "a") - score(&baseline, "a")).abs() < 1e-9);
    }

    #[test]
    fn filters_and_pool_size_are_respected() {
        let gateway = fixture();
        let mut query = GatewayQuery::new("parse html render page", 1);
        query.path_prefix = Some("src/render".to_string());
        let results = gateway.search(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_path, "src/render.py");
        assert_eq!(gateway.calls().searches.len(), 1);
    }

    #[test]
    fn scripted_failure_surfaces_as_core_error() {
        let gateway = fixture();
        gateway.set_search_failure(Some("boom"));
        let err = gateway.search(&GatewayQuery::new("x", 5)).unwrap_err();
        assert!(matches!(err, GatewayError::Core(_)));
    }

    #[test]
    fn embedding_listing_pages_until_empty() {
        let gateway = fixture();
        assert_eq!(gateway.list_symbols_for_embedding(3, 0).unwrap().len(), 3);
        assert_eq!(gateway.list_symbols_for_embedding(3, 3).unwrap().len(), 1);
        assert!(gateway.list_symbols_for_embedding(3, 6).unwrap().is_empty());
    }

    #[test]
    fn function_context_walks_call_edges() {
        let gateway = fixture();
        gateway.add_edge("c", "a", EdgeKind::Calls);
        gateway.add_edge("a", "b", EdgeKind::Calls);
        let context = gateway.get_function_context("a", 3, 10).unwrap().unwrap();
        assert_eq!(context.callers.len(), 1);
        assert_eq!(context.callers[0].symbol_id, "c");
        assert_eq!(context.callees[0].symbol_id, "b");
        assert_eq!(context.callees[0].depth, 1);
        assert!(gateway.get_function_context("missing", 1, 1).unwrap().is_none());
    }

    #[test]
    fn indexed_files_group_symbols_by_path() {
        let gateway = fixture();
        let files = gateway.list_indexed_files().unwrap();
        let html = files.iter().find(|f| f.path == "src/html.py").unwrap();
        assert_eq!(html.symbol_count, 2);
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn tokenize_splits_camel_and_snake() {
        let tokens = tokenize("HtmlParser parse_html");
        for expected in ["html", "parser", "parse"] {
            assert!(tokens.contains(expected), "missing {expected}");
        }
    }
}
