use scry_core::config::EmbeddingConfig;
use scry_core::types::{IncrementalIndexReport, Symbol, SymbolKind};
use scry_indexer::embed_writer::{EmbeddingPlan, EmbeddingWriter, IncrementalEmbeddingSelector};
use scry_indexer::scheduler::CancellationToken;
use scry_state::embedding::{EmbeddingProvider, FastEmbedProvider};
use scry_state::gateway::RetrievalGateway;
use scry_state::memory_gateway::MemoryGateway;
use std::sync::Arc;
use tempfile::tempdir;

fn symbol(id: &str, file: &str) -> Symbol {
    Symbol {
        id: id.to_string(),
        name: id.to_string(),
        qualified_name: format!("pkg.{id}"),
        kind: SymbolKind::Function,
        language: "python".to_string(),
        file_path: file.to_string(),
        line_start: 1,
        line_end: 5,
        signature: Some(format!("def {id}()")),
        doc_comment: None,
        body_text: Some("return None".to_string()),
    }
}

fn offline_provider() -> Arc<dyn EmbeddingProvider> {
    Arc::new(FastEmbedProvider::from_config(&EmbeddingConfig::default(), false).unwrap())
}

#[test]
fn full_then_incremental_keeps_vectors_in_sync() {
    let workspace = tempdir().unwrap();
    let gateway = Arc::new(MemoryGateway::with_symbols(vec![
        symbol("parse_config", "src/config.py"),
        symbol("load_plugins", "src/plugins.py"),
    ]));
    let provider = offline_provider();
    let writer = EmbeddingWriter::new(gateway.clone(), provider.clone());
    let token = CancellationToken::new();

    let full = writer.embed_all(&token).unwrap();
    assert_eq!(full.embedded, 2);
    let before = gateway.vector_for("parse_config").unwrap();
    assert_eq!(before.len(), provider.dimensions());

    // One edited symbol: only it goes back to the provider.
    let mut edited = symbol("parse_config", "src/config.py");
    edited.body_text = Some("return Config.from_env()".to_string());
    gateway.add_symbol(edited);
    gateway.push_incremental_report(IncrementalIndexReport {
        files_scanned: 2,
        files_indexed: 1,
        files_unchanged: 1,
        changed_symbol_ids: vec!["parse_config".to_string()],
        ..Default::default()
    });

    let report = gateway.index_incremental(workspace.path(), false).unwrap();
    let plan = IncrementalEmbeddingSelector::select(&report);
    assert_eq!(plan, EmbeddingPlan::ChangedOnly(vec!["parse_config".to_string()]));

    let incremental = IncrementalEmbeddingSelector::execute(&plan, &writer, &token).unwrap();
    assert_eq!(incremental.embedded, 1);
    assert_ne!(gateway.vector_for("parse_config").unwrap(), before);

    let calls = gateway.calls();
    assert_eq!(calls.symbols_by_ids, vec![vec!["parse_config".to_string()]]);
    assert_eq!(calls.indexed_roots, vec![workspace.path().to_path_buf()]);
}

#[test]
fn unchanged_incremental_run_skips_embedding() {
    let workspace = tempdir().unwrap();
    let gateway = Arc::new(MemoryGateway::with_symbols(vec![symbol("main", "src/main.py")]));
    let writer = EmbeddingWriter::new(gateway.clone(), offline_provider());

    let report = gateway.index_incremental(workspace.path(), false).unwrap();
    let plan = IncrementalEmbeddingSelector::select(&report);
    assert_eq!(plan, EmbeddingPlan::Skip);

    let outcome =
        IncrementalEmbeddingSelector::execute(&plan, &writer, &CancellationToken::new()).unwrap();
    assert_eq!(outcome.embedded, 0);
    assert_eq!(gateway.vector_count(), 0);
    assert!(gateway.calls().add_vectors.is_empty());
}

#[test]
fn sweep_reads_until_empty_page_after_store_grows() {
    let gateway = Arc::new(MemoryGateway::new());
    for i in 0..150 {
        gateway.add_symbol(symbol(&format!("f{i}"), "src/big.py"));
    }
    let writer = EmbeddingWriter::new(gateway.clone(), offline_provider());
    writer.embed_symbol_batch(0, 100, &CancellationToken::new()).unwrap();

    for i in 150..260 {
        gateway.add_symbol(symbol(&format!("f{i}"), "src/big.py"));
    }
    let report = writer.embed_all(&CancellationToken::new()).unwrap();
    assert_eq!(report.embedded, 260);
    assert_eq!(gateway.vector_count(), 260);
}
