//! End-to-end scenarios for the indexing and retrieval engine, run against
//! the deterministic mock embedder (no model downloads).

use std::path::Path;
use std::time::Duration;

use semindex::catalog::{EmbeddingBackend, EmbeddingModelInfo};
use semindex::embed::mock_factory;
use semindex::indexer::IndexStatus;
use semindex::service::{CreateProjectRequest, ProjectService};
use semindex::store::{ChunkRecord, ProjectStore};
use semindex::SemIndexError;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// A Go file with three functions whose enriched chunks stay above the
/// merge threshold, plus a README with two headings.
fn seed_two_file_project(root: &Path) {
    let mut go = String::from("package main\n\nimport \"fmt\"\n\n");
    for name in ["LoadConfig", "ValidateConfig", "ApplyConfig"] {
        go.push_str(&format!("// {name} works through the configuration tree.\n"));
        go.push_str(&format!("func {name}(path string) error {{\n"));
        for i in 0..12 {
            go.push_str(&format!(
                "\tfmt.Println(\"{name} step {i}: resolving entries and applying defaults\")\n"
            ));
        }
        go.push_str("\treturn nil\n}\n\n");
    }
    write(root, "main.go", &go);

    let mut md = String::from("# Overview\n\n");
    for _ in 0..8 {
        md.push_str("This project loads configuration trees from disk and validates them against a schema before applying defaults.\n\n");
    }
    md.push_str("# Usage\n\n");
    for _ in 0..8 {
        md.push_str("Run the binary with a path to the configuration root and inspect the verbose output for validation errors.\n\n");
    }
    write(root, "README.md", &md);
}

async fn wait_for(svc: &ProjectService, project_id: &str, terminal: &[IndexStatus]) {
    for _ in 0..400 {
        if let Some(progress) = svc.get_progress(project_id) {
            if terminal.contains(&progress.status) {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("indexing did not reach a terminal state");
}

fn service(temp: &TempDir) -> ProjectService {
    ProjectService::new(&temp.path().join("data"), mock_factory()).unwrap()
}

async fn create_indexed_project(
    svc: &ProjectService,
    root: &Path,
    continuous: bool,
) -> semindex::store::Project {
    let mut project = svc
        .create_project(CreateProjectRequest {
            name: "fixture".to_string(),
            description: String::new(),
            root_path: root.to_path_buf(),
            slug: None,
            embedding_model_id: None,
            continuous_indexing: continuous,
        })
        .unwrap();

    let mut config = project.config.clone();
    config.file_extensions = vec![".go".to_string(), ".md".to_string()];
    config.chunk_size_max = 800;
    config.chunk_size_min = 100;
    config.continuous_indexing = continuous;
    project = svc.update_project_config(&project.id, config).unwrap();

    svc.start_indexing(&project.id).await.unwrap();
    let terminal = if continuous {
        vec![IndexStatus::Idle, IndexStatus::Error]
    } else {
        vec![IndexStatus::Completed, IndexStatus::Error]
    };
    wait_for(svc, &project.id, &terminal).await;
    project
}

// === S1: fresh index of a two-file project ===

#[tokio::test]
async fn test_fresh_index_two_files() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("repo");
    seed_two_file_project(&root);

    let svc = service(&temp);
    let project = create_indexed_project(&svc, &root, true).await;
    let store = svc.store_for(&project.id).unwrap();

    let stats = store.get_stats().unwrap();
    assert_eq!(stats.total_files, 2);
    assert!(
        (3..=5).contains(&stats.total_chunks),
        "expected 3..=5 chunks, got {}",
        stats.total_chunks
    );
    // 3 Go functions + 2 Markdown headings
    assert_eq!(stats.total_symbols, 5);

    assert!(!store.get_file_outline("main.go").unwrap().is_empty());
    assert!(!store.get_file_outline("README.md").unwrap().is_empty());

    let progress = svc.get_progress(&project.id).unwrap();
    assert_eq!(progress.processed_files, 2);

    svc.set_project_indexing(&project.id, false).await.unwrap();
}

// === S2: deterministic search against hand-placed vectors ===

#[test]
fn test_deterministic_search_ordering() {
    let temp = TempDir::new().unwrap();
    let store = ProjectStore::open(temp.path(), "s2").unwrap();

    let mut chunk_a = test_chunk("a.rs", 1, 2);
    chunk_a.embedding = unit_vector(8, 0);
    store.insert_chunk(&chunk_a).unwrap();

    let mut chunk_b = test_chunk("b.rs", 1, 2);
    chunk_b.embedding = unit_vector(8, 1);
    store.insert_chunk(&chunk_b).unwrap();

    let query = unit_vector(8, 0);
    let results = store.search_similar(&query, 2).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0.file_path, "a.rs");
    assert!((results[0].1 - 1.0).abs() < 1e-6);
    assert!(results[1].1.abs() < 1e-6);
}

fn unit_vector(dim: usize, hot: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[hot] = 1.0;
    v
}

fn test_chunk(path: &str, start: usize, end: usize) -> ChunkRecord {
    ChunkRecord {
        id: String::new(),
        file_path: path.to_string(),
        content: format!("{path} {start}..{end}"),
        embedding: Vec::new(),
        embedding_model_id: "manual".to_string(),
        line_start: start,
        line_end: end,
        char_start: 0,
        char_end: 0,
        language: None,
        symbol_name: None,
        symbol_kind: None,
        parent: None,
        signature: None,
        visibility: None,
        package_name: None,
        doc_string: None,
        token_count: None,
        is_collapsed: None,
        source_code: None,
    }
}

// === S4: a removed file disappears from the store ===

#[tokio::test]
async fn test_removed_file_cleanup() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("repo");
    seed_two_file_project(&root);

    let svc = service(&temp);
    let project = create_indexed_project(&svc, &root, true).await;
    let store = svc.store_for(&project.id).unwrap();
    assert_eq!(store.get_stats().unwrap().total_files, 2);
    svc.set_project_indexing(&project.id, false).await.unwrap();

    std::fs::remove_file(root.join("README.md")).unwrap();
    svc.start_indexing(&project.id).await.unwrap();
    wait_for(&svc, &project.id, &[IndexStatus::Idle, IndexStatus::Error]).await;

    assert!(store.get_file("README.md").unwrap().is_none());
    assert!(store.get_file_chunks("README.md").unwrap().is_empty());
    assert!(store.get_file_outline("README.md").unwrap().is_empty());
    assert!(store.outline_updated_at("README.md").unwrap().is_none());
    assert_eq!(store.count_file_symbols("README.md").unwrap(), 0);

    // main.go survives untouched
    assert!(store.get_file("main.go").unwrap().is_some());
    assert!(!store.get_file_chunks("main.go").unwrap().is_empty());

    svc.set_project_indexing(&project.id, false).await.unwrap();
}

// === S5: path traversal is rejected before any file access ===

#[tokio::test]
async fn test_path_traversal_rejected() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("repo");
    seed_two_file_project(&root);

    let svc = service(&temp);
    let project = create_indexed_project(&svc, &root, false).await;

    for path in ["../../etc/passwd", "../outside.go", "/etc/passwd"] {
        let err = svc.get_file_outline(&project.id, path).unwrap_err();
        assert!(
            matches!(err, SemIndexError::PathOutsideRoot(_)),
            "{path} should be rejected, got {err:?}"
        );
        let err = svc.get_file_chunks(&project.id, path).unwrap_err();
        assert!(matches!(err, SemIndexError::PathOutsideRoot(_)));
    }
}

// === S6: switching the embedding model forces a reset ===

#[tokio::test]
async fn test_model_switch_forces_reset() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("repo");
    seed_two_file_project(&root);

    let svc = service(&temp);
    let project = create_indexed_project(&svc, &root, false).await;
    let store = svc.store_for(&project.id).unwrap();

    let before = store.get_stats().unwrap();
    assert!(before.total_chunks > 0);
    assert!(before
        .chunks_by_model
        .keys()
        .all(|m| m == "minilm-l6-v2"));

    // Register a 768-dimension model and switch the project onto it
    svc.catalog()
        .upsert_embedding_model(&EmbeddingModelInfo {
            id: "jina-code-768".to_string(),
            display_name: "Jina Code".to_string(),
            backend: EmbeddingBackend::LibraryFastembed,
            dimension: 768,
            max_sequence_length: 512,
            ..Default::default()
        })
        .unwrap();
    let mut config = svc.get_project(&project.id).unwrap().config;
    config.embedding_model_id = "jina-code-768".to_string();
    svc.update_project_config(&project.id, config).unwrap();

    svc.set_project_indexing(&project.id, true).await.unwrap();
    wait_for(&svc, &project.id, &[IndexStatus::Completed, IndexStatus::Error]).await;

    let after = store.get_stats().unwrap();
    assert!(after.total_chunks > 0);
    assert!(after.chunks_by_model.keys().all(|m| m == "jina-code-768"));

    // Every new vector has the new dimension
    let query = {
        let mut v = vec![0.0f32; 768];
        v[0] = 1.0;
        v
    };
    let hits = store.search_similar(&query, 3).unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|(chunk, _)| chunk.embedding.len() == 768));

    svc.set_project_indexing(&project.id, false).await.unwrap();
}

// === Isolation: operations on project A never touch project B ===

#[tokio::test]
async fn test_project_isolation() {
    use sha2::{Digest, Sha256};

    let temp = TempDir::new().unwrap();
    let root_a = temp.path().join("repo-a");
    let root_b = temp.path().join("repo-b");
    seed_two_file_project(&root_a);
    seed_two_file_project(&root_b);

    let svc = service(&temp);
    let project_b = svc
        .create_project(CreateProjectRequest {
            name: "b".to_string(),
            description: String::new(),
            root_path: root_b,
            slug: None,
            embedding_model_id: None,
            continuous_indexing: false,
        })
        .unwrap();
    svc.start_indexing(&project_b.id).await.unwrap();
    wait_for(&svc, &project_b.id, &[IndexStatus::Completed, IndexStatus::Error]).await;

    let db_b = svc.store_for(&project_b.id).unwrap().db_path().to_path_buf();
    let fingerprint = Sha256::digest(std::fs::read(&db_b).unwrap());

    // Index project A from scratch
    let project_a = svc
        .create_project(CreateProjectRequest {
            name: "a".to_string(),
            description: String::new(),
            root_path: root_a,
            slug: None,
            embedding_model_id: None,
            continuous_indexing: false,
        })
        .unwrap();
    svc.start_indexing(&project_a.id).await.unwrap();
    wait_for(&svc, &project_a.id, &[IndexStatus::Completed, IndexStatus::Error]).await;

    let after = Sha256::digest(std::fs::read(&db_b).unwrap());
    assert_eq!(fingerprint, after, "project B's database file changed");
}
