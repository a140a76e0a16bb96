//! Project service: lifecycle, orchestration, and the query entry points.
//!
//! Owns the catalog store, the lazily-opened per-project store map, the
//! per-model embedder cache, and the indexer manager. This is the only
//! issuer of store handles; nothing below it holds back-pointers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::CatalogStore;
use crate::constants;
use crate::embed::{Embedder, EmbedderFactory};
use crate::error::{Result, SemIndexError};
use crate::events::EventEmitter;
use crate::indexer::manager::IndexerManager;
use crate::indexer::{Indexer, Progress};
use crate::outline::{OutlineBuilder, OutlineNode};
use crate::parser::ParserRegistry;
use crate::paths;
use crate::store::{ChunkRecord, Project, ProjectConfig, ProjectStore};
use crate::walker::ProjectScope;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub root_path: PathBuf,
    /// Explicit slug; derived from the name when absent.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub embedding_model_id: Option<String>,
    #[serde(default)]
    pub continuous_indexing: bool,
}

/// One search hit: a chunk (embedding zeroed) plus its similarity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    #[serde(flatten)]
    pub chunk: ChunkRecord,
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total_results: usize,
    pub query_time_ms: u64,
}

pub struct ProjectService {
    data_dir: PathBuf,
    catalog: Arc<CatalogStore>,
    registry: Arc<ParserRegistry>,
    manager: Arc<IndexerManager>,
    events: EventEmitter,
    embedder_factory: EmbedderFactory,
    /// project id -> open store; entries only leave on project deletion.
    stores: Mutex<HashMap<String, Arc<ProjectStore>>>,
    /// model id -> embedder; created under the lock, reused read-only.
    embedders: Mutex<HashMap<String, Arc<dyn Embedder>>>,
}

impl ProjectService {
    pub fn new(data_dir: &Path, embedder_factory: EmbedderFactory) -> Result<Self> {
        let config_dir = constants::config_dir(data_dir)?;
        let catalog = Arc::new(CatalogStore::open(&config_dir)?);
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            catalog,
            registry: Arc::new(ParserRegistry::with_defaults()),
            manager: Arc::new(IndexerManager::new()),
            events: EventEmitter::new(),
            embedder_factory,
            stores: Mutex::new(HashMap::new()),
            embedders: Mutex::new(HashMap::new()),
        })
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn manager(&self) -> &Arc<IndexerManager> {
        &self.manager
    }

    fn indexes_dir(&self) -> Result<PathBuf> {
        Ok(constants::indexes_dir(&self.data_dir)?)
    }

    fn db_file_for(&self, project_id: &str) -> Result<PathBuf> {
        Ok(self.indexes_dir()?.join(format!(
            "project-{}.db",
            paths::sanitize_for_filename(project_id)
        )))
    }

    /// Lazily open (and cache) the store for a project. Unknown ids fail
    /// with `ProjectNotFound`.
    pub fn store_for(&self, project_id: &str) -> Result<Arc<ProjectStore>> {
        {
            let stores = self.stores.lock().unwrap();
            if let Some(store) = stores.get(project_id) {
                return Ok(store.clone());
            }
        }
        if !self.db_file_for(project_id)?.exists() {
            return Err(SemIndexError::ProjectNotFound(project_id.to_string()));
        }
        let store = Arc::new(ProjectStore::open(&self.indexes_dir()?, project_id)?);
        self.stores
            .lock()
            .unwrap()
            .insert(project_id.to_string(), store.clone());
        Ok(store)
    }

    fn embedder_for(&self, model_id: &str) -> Result<Arc<dyn Embedder>> {
        let mut embedders = self.embedders.lock().unwrap();
        if let Some(embedder) = embedders.get(model_id) {
            return Ok(embedder.clone());
        }
        let info = self.catalog.resolve_model_or_default(model_id)?;
        let embedder = (self.embedder_factory)(&info)?;
        embedders.insert(model_id.to_string(), embedder.clone());
        Ok(embedder)
    }

    // === lifecycle ===

    pub fn create_project(&self, request: CreateProjectRequest) -> Result<Project> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(SemIndexError::InvalidQuery("project name is empty".into()));
        }
        let root = request
            .root_path
            .canonicalize()
            .map_err(|e| SemIndexError::io(request.root_path.clone(), e))?;
        if !root.is_dir() {
            return Err(SemIndexError::InvalidPath(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let base_slug = match &request.slug {
            Some(slug) => paths::generate_slug(slug),
            None => paths::generate_slug(name),
        };
        let project_id = self.unique_slug(&base_slug)?;

        let model_id = request
            .embedding_model_id
            .unwrap_or_else(|| crate::catalog::default_model().id);
        let model = self.catalog.resolve_model_or_default(&model_id)?;

        let mut config = ProjectConfig::new(root, model.id.clone());
        config.embedding_model = Some(model);
        config.continuous_indexing = request.continuous_indexing;

        let now = chrono::Utc::now().timestamp();
        let project = Project {
            id: project_id.clone(),
            name: name.to_string(),
            description: request.description,
            config,
            is_indexing: false,
            created_at: now,
            updated_at: now,
        };

        let store = Arc::new(ProjectStore::open(&self.indexes_dir()?, &project_id)?);
        store.save_project_metadata(&project)?;
        self.stores
            .lock()
            .unwrap()
            .insert(project_id.clone(), store);

        if self.catalog.selected_project()?.is_none() {
            self.catalog.set_selected_project(&project_id)?;
        }
        info!(project = %project_id, root = %project.config.root_path.display(), "✅ project created");
        Ok(project)
    }

    /// Slug uniqueness across the installation: the DB filename is the
    /// registry. Collisions get an 8-char suffix, up to 10 attempts.
    fn unique_slug(&self, base: &str) -> Result<String> {
        if !self.db_file_for(base)?.exists() {
            return Ok(base.to_string());
        }
        for _ in 0..10 {
            let suffix: String = Uuid::new_v4().simple().to_string()[..8].to_string();
            let candidate = format!("{base}-{suffix}");
            if !self.db_file_for(&candidate)?.exists() {
                return Ok(candidate);
            }
        }
        Err(SemIndexError::Other(format!(
            "could not find a free slug for '{base}'"
        )))
    }

    pub fn get_project(&self, project_id: &str) -> Result<Project> {
        self.store_for(project_id)?.load_project_metadata()
    }

    /// Every project on disk, by scanning the indexes directory.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        let dir = self.indexes_dir()?;
        for entry in std::fs::read_dir(&dir).map_err(|e| SemIndexError::io(dir.clone(), e))? {
            let Ok(entry) = entry else { continue };
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else { continue };
            let Some(id) = name
                .strip_prefix("project-")
                .and_then(|n| n.strip_suffix(".db"))
            else {
                continue;
            };
            match self.store_for(id).and_then(|s| s.load_project_metadata()) {
                Ok(project) => projects.push(project),
                Err(e) => warn!(project = %id, "unreadable project skipped: {e}"),
            }
        }
        projects.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(projects)
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        self.manager.stop(project_id).await;
        self.stores.lock().unwrap().remove(project_id);

        let db_file = self.db_file_for(project_id)?;
        if !db_file.exists() {
            return Err(SemIndexError::ProjectNotFound(project_id.to_string()));
        }
        std::fs::remove_file(&db_file).map_err(|e| SemIndexError::io(db_file.clone(), e))?;
        // WAL sidecars go with the database
        for suffix in ["-wal", "-shm"] {
            let sidecar = PathBuf::from(format!("{}{}", db_file.display(), suffix));
            let _ = std::fs::remove_file(sidecar);
        }

        if self.catalog.selected_project()?.as_deref() == Some(project_id) {
            self.catalog.clear_selected_project()?;
        }
        info!(project = %project_id, "🗑️  project deleted");
        Ok(())
    }

    pub fn update_project_config(
        &self,
        project_id: &str,
        mut config: ProjectConfig,
    ) -> Result<Project> {
        let store = self.store_for(project_id)?;
        let mut project = store.load_project_metadata()?;

        if config.root_path != project.config.root_path {
            config.root_path = config
                .root_path
                .canonicalize()
                .map_err(|e| SemIndexError::io(config.root_path.clone(), e))?;
        }
        if config.include_paths.is_empty() {
            config.include_paths = vec![".".to_string()];
        }
        // Re-snapshot the model so the DB stays self-describing
        let model = self
            .catalog
            .resolve_model_or_default(&config.embedding_model_id)?;
        config.embedding_model_id = model.id.clone();
        config.embedding_model = Some(model);

        project.config = config;
        store.save_project_metadata(&project)?;
        Ok(project)
    }

    // === indexing ===

    /// Toggle indexing. Enabling against a store that still holds chunks
    /// from a different model wipes the derived data first, so a project
    /// never mixes embedding spaces.
    pub async fn set_project_indexing(&self, project_id: &str, enabled: bool) -> Result<()> {
        let store = self.store_for(project_id)?;
        let mut project = store.load_project_metadata()?;

        if enabled {
            let stats = store.get_stats()?;
            let selected = &project.config.embedding_model_id;
            let foreign_chunks = stats
                .chunks_by_model
                .iter()
                .any(|(model, count)| model != selected && *count > 0);
            if foreign_chunks {
                info!(project = %project_id, "🔄 embedding model changed, resetting project data");
                store.reset_project_data()?;
            }
        }

        project.is_indexing = enabled;
        store.save_project_metadata(&project)?;

        if enabled {
            self.start_indexing(project_id).await
        } else {
            self.manager.stop(project_id).await;
            Ok(())
        }
    }

    pub async fn start_indexing(&self, project_id: &str) -> Result<()> {
        let store = self.store_for(project_id)?;
        let project = store.load_project_metadata()?;

        let scope = ProjectScope::new(&project.config)?;
        let files = scope.preview_files()?;
        let embedder = self.embedder_for(&project.config.embedding_model_id)?;
        let progress = self.manager.progress_handle(project_id);
        // Mark as indexing before the worker is even spawned, so observers
        // polling for a terminal state never race the startup.
        progress.write().unwrap().status = crate::indexer::IndexStatus::Indexing;

        let indexer = Arc::new(Indexer::new(
            project,
            store,
            embedder,
            self.registry.clone(),
            self.events.clone(),
            progress,
        )?);
        self.manager.start(indexer, files).await;
        Ok(())
    }

    pub async fn stop_indexing(&self, project_id: &str) -> Result<()> {
        self.manager.stop(project_id).await;
        if let Ok(store) = self.store_for(project_id) {
            if let Ok(mut project) = store.load_project_metadata() {
                project.is_indexing = false;
                store.save_project_metadata(&project)?;
            }
        }
        Ok(())
    }

    /// Full rebuild: stop, wipe derived data, start again.
    pub async fn reindex_project(&self, project_id: &str) -> Result<()> {
        self.manager.stop(project_id).await;
        self.store_for(project_id)?.reset_project_data()?;
        self.start_indexing(project_id).await
    }

    pub fn get_progress(&self, project_id: &str) -> Option<Progress> {
        self.manager.get_progress(project_id)
    }

    // === queries ===

    pub fn search(&self, project_id: &str, query: &str, k: i64) -> Result<SearchResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SemIndexError::InvalidQuery("empty query".into()));
        }
        let started = Instant::now();

        let store = self.store_for(project_id)?;
        let project = store.load_project_metadata()?;
        let embedder = self.embedder_for(&project.config.embedding_model_id)?;

        let vectors = embedder.embed(&[query.to_string()])?;
        let query_vec = vectors
            .into_iter()
            .next()
            .ok_or_else(|| SemIndexError::InvalidQuery("embedder returned nothing".into()))?;

        let hits = store.search_similar(&query_vec, k)?;
        let results: Vec<SearchResult> = hits
            .into_iter()
            .map(|(mut chunk, similarity)| {
                chunk.embedding = Vec::new();
                SearchResult { chunk, similarity }
            })
            .collect();

        Ok(SearchResponse {
            total_results: results.len(),
            results,
            query_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Resolve a user-supplied path (absolute or project-relative) to the
    /// store key, enforcing root containment.
    fn relative_key(&self, project: &Project, path: &str) -> Result<String> {
        let normalized = paths::normalize(path)?;
        let candidate = Path::new(&normalized);
        let absolute = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            project.config.root_path.join(candidate)
        };
        paths::relative_within(&project.config.root_path, &absolute)
            .ok_or_else(|| SemIndexError::PathOutsideRoot(absolute))
    }

    /// Outline for a file; parses once on demand when the store has no rows
    /// yet. Unsupported file types are an error on this surface.
    pub fn get_file_outline(&self, project_id: &str, path: &str) -> Result<Vec<OutlineNode>> {
        let store = self.store_for(project_id)?;
        let project = store.load_project_metadata()?;
        let relative = self.relative_key(&project, path)?;

        let existing = store.get_file_outline(&relative)?;
        if !existing.is_empty() {
            return Ok(existing);
        }

        let absolute = project.config.root_path.join(&relative);
        let bytes = std::fs::read(&absolute).map_err(|e| SemIndexError::io(absolute, e))?;
        let parsed = self.registry.parse(Path::new(&relative), &bytes)?;
        let tree = OutlineBuilder::build(&parsed.symbols);
        store.upsert_file_outline(&relative, &tree)?;
        store.get_file_outline(&relative)
    }

    pub fn get_file_chunks(&self, project_id: &str, path: &str) -> Result<Vec<ChunkRecord>> {
        let store = self.store_for(project_id)?;
        let project = store.load_project_metadata()?;
        let relative = self.relative_key(&project, path)?;

        let chunks = store.get_file_chunks(&relative)?;
        if chunks.is_empty() {
            return Err(SemIndexError::NotFound(format!(
                "{relative} has no chunks (not indexed yet)"
            )));
        }
        Ok(chunks)
    }

    /// Resolve a chunk id or outline-node id to a source snippet. Chunks
    /// win; outline hits synthesize the snippet from the file on disk.
    pub fn node_source(
        &self,
        project_id: &str,
        id: &str,
        collapse_body: bool,
    ) -> Result<NodeSource> {
        let store = self.store_for(project_id)?;

        if let Ok(chunk) = store.get_chunk_by_id(id) {
            let source = match (&chunk.source_code, collapse_body) {
                (Some(source), false) => source.clone(),
                _ => chunk.content.clone(),
            };
            return Ok(NodeSource {
                chunk_id: chunk.id,
                file_path: chunk.file_path,
                source,
                start_line: chunk.line_start,
                end_line: chunk.line_end,
                language: chunk.language,
                symbol_name: chunk.symbol_name,
                symbol_kind: chunk.symbol_kind,
            });
        }

        let Some((path, name, kind, start_line, end_line)) = store.get_outline_node(id)? else {
            return Err(SemIndexError::NotFound(format!("node {id}")));
        };
        let project = store.load_project_metadata()?;
        let absolute = project.config.root_path.join(&path);
        let content = std::fs::read_to_string(&absolute)
            .map_err(|e| SemIndexError::io(absolute, e))?;
        let snippet: Vec<&str> = content
            .lines()
            .skip(start_line.saturating_sub(1))
            .take(end_line.saturating_sub(start_line) + 1)
            .collect();

        Ok(NodeSource {
            chunk_id: id.to_string(),
            file_path: path,
            source: snippet.join("\n"),
            start_line,
            end_line,
            language: None,
            symbol_name: Some(name),
            symbol_kind: Some(kind),
        })
    }

    /// Graceful shutdown: stop all workers, close embedders.
    pub async fn shutdown(&self) {
        self.manager.stop_all().await;
        let embedders = self.embedders.lock().unwrap();
        for embedder in embedders.values() {
            embedder.close();
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSource {
    pub chunk_id: String,
    pub file_path: String,
    pub source: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_kind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::mock_factory;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn service(data_dir: &Path) -> ProjectService {
        ProjectService::new(data_dir, mock_factory()).unwrap()
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn make_project(svc: &ProjectService, root: &Path, name: &str) -> Project {
        svc.create_project(CreateProjectRequest {
            name: name.to_string(),
            description: String::new(),
            root_path: root.to_path_buf(),
            slug: None,
            embedding_model_id: None,
            continuous_indexing: false,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_list_projects() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("repo");
        std::fs::create_dir_all(&root).unwrap();
        let svc = service(&temp.path().join("data"));

        let project = make_project(&svc, &root, "My Repo");
        assert_eq!(project.id, "my-repo");
        assert_eq!(
            svc.catalog().selected_project().unwrap(),
            Some("my-repo".to_string())
        );

        let listed = svc.list_projects().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "My Repo");

        // Same name gets a suffixed slug
        let second = make_project(&svc, &root, "My Repo");
        assert_ne!(second.id, "my-repo");
        assert!(second.id.starts_with("my-repo-"));
        assert_eq!(svc.list_projects().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let temp = tempdir().unwrap();
        let svc = service(&temp.path().join("data"));

        let err = svc
            .create_project(CreateProjectRequest {
                name: "  ".to_string(),
                description: String::new(),
                root_path: temp.path().to_path_buf(),
                slug: None,
                embedding_model_id: None,
                continuous_indexing: false,
            })
            .unwrap_err();
        assert!(matches!(err, SemIndexError::InvalidQuery(_)));

        let err = svc
            .create_project(CreateProjectRequest {
                name: "ok".to_string(),
                description: String::new(),
                root_path: temp.path().join("does-not-exist"),
                slug: None,
                embedding_model_id: None,
                continuous_indexing: false,
            })
            .unwrap_err();
        assert!(matches!(err, SemIndexError::Io { .. }));
    }

    #[tokio::test]
    async fn test_index_and_search_round_trip() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("repo");
        write(&root, "auth.rs", "pub fn authenticate(user: &str) -> bool {\n    user == \"admin\"\n}\n");
        write(&root, "math.rs", "pub fn multiply(a: i64, b: i64) -> i64 {\n    a * b\n}\n");

        let svc = service(&temp.path().join("data"));
        let project = make_project(&svc, &root, "code");

        svc.start_indexing(&project.id).await.unwrap();
        wait_for_completion(&svc, &project.id).await;

        let response = svc.search(&project.id, "authenticate user", 5).unwrap();
        assert!(response.total_results >= 1);
        assert!(response.results.iter().all(|r| r.chunk.embedding.is_empty()));

        let err = svc.search(&project.id, "   ", 5).unwrap_err();
        assert!(matches!(err, SemIndexError::InvalidQuery(_)));

        let err = svc.search("nope", "q", 5).unwrap_err();
        assert!(matches!(err, SemIndexError::ProjectNotFound(_)));
    }

    #[tokio::test]
    async fn test_outline_on_demand() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("repo");
        write(&root, "doc.md", "# Top\n\n## Sub\n\ntext\n");

        let svc = service(&temp.path().join("data"));
        let project = make_project(&svc, &root, "docs");

        // No indexing has happened; outline parses on demand
        let outline = svc.get_file_outline(&project.id, "doc.md").unwrap();
        assert_eq!(outline.len(), 1);
        assert_eq!(outline[0].name, "Top");
        assert_eq!(outline[0].children[0].name, "Sub");

        // Traversal is rejected before any file read
        let err = svc
            .get_file_outline(&project.id, "../../etc/passwd")
            .unwrap_err();
        assert!(matches!(err, SemIndexError::PathOutsideRoot(_)));

        // Unsupported types are an error on this surface
        write(&root, "blob.xyz", "data");
        let err = svc.get_file_outline(&project.id, "blob.xyz").unwrap_err();
        assert!(matches!(err, SemIndexError::ParserUnsupported(_)));
    }

    #[tokio::test]
    async fn test_get_file_chunks_requires_index() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("repo");
        write(&root, "a.rs", "fn a() {}\n");

        let svc = service(&temp.path().join("data"));
        let project = make_project(&svc, &root, "p");

        let err = svc.get_file_chunks(&project.id, "a.rs").unwrap_err();
        assert!(matches!(err, SemIndexError::NotFound(_)));

        svc.start_indexing(&project.id).await.unwrap();
        wait_for_completion(&svc, &project.id).await;
        let chunks = svc.get_file_chunks(&project.id, "a.rs").unwrap();
        assert!(!chunks.is_empty());
    }

    #[tokio::test]
    async fn test_model_switch_resets_chunks() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("repo");
        write(&root, "a.rs", "fn a() {}\n");

        let svc = service(&temp.path().join("data"));
        let project = make_project(&svc, &root, "p");

        svc.set_project_indexing(&project.id, true).await.unwrap();
        wait_for_completion(&svc, &project.id).await;
        let store = svc.store_for(&project.id).unwrap();
        assert!(store.get_stats().unwrap().total_chunks > 0);

        // Switch the model
        let mut config = svc.get_project(&project.id).unwrap().config;
        config.embedding_model_id = "bge-small-en-v1.5".to_string();
        svc.update_project_config(&project.id, config).unwrap();

        // Enabling indexing wipes chunks from the previous model before the
        // new scan fills the store again
        svc.set_project_indexing(&project.id, true).await.unwrap();
        wait_for_completion(&svc, &project.id).await;

        let stats = store.get_stats().unwrap();
        assert!(stats.total_chunks > 0);
        assert!(stats.chunks_by_model.keys().all(|m| m == "bge-small-en-v1.5"));
    }

    #[tokio::test]
    async fn test_delete_project_removes_db_and_pointer() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("repo");
        std::fs::create_dir_all(&root).unwrap();

        let svc = service(&temp.path().join("data"));
        let project = make_project(&svc, &root, "gone");
        let db_file = svc.db_file_for(&project.id).unwrap();
        assert!(db_file.exists());

        svc.delete_project(&project.id).await.unwrap();
        assert!(!db_file.exists());
        assert_eq!(svc.catalog().selected_project().unwrap(), None);
        assert!(matches!(
            svc.get_project(&project.id),
            Err(SemIndexError::ProjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_node_source_resolution() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("repo");
        write(&root, "lib.rs", "pub fn visible() {\n    // body\n}\n");

        let svc = service(&temp.path().join("data"));
        let project = make_project(&svc, &root, "p");
        svc.start_indexing(&project.id).await.unwrap();
        wait_for_completion(&svc, &project.id).await;

        // Chunk id path
        let chunks = svc.get_file_chunks(&project.id, "lib.rs").unwrap();
        let source = svc.node_source(&project.id, &chunks[0].id, false).unwrap();
        assert_eq!(source.file_path, "lib.rs");
        assert!(source.source.contains("visible"));

        // Outline id path synthesizes from disk
        let outline = svc.get_file_outline(&project.id, "lib.rs").unwrap();
        let node_id = &outline[0].id;
        let source = svc.node_source(&project.id, node_id, false).unwrap();
        assert!(source.source.contains("pub fn visible"));
        assert_eq!(source.symbol_name.as_deref(), Some("visible"));

        // Unknown ids fail
        assert!(matches!(
            svc.node_source(&project.id, "no-such-id", false),
            Err(SemIndexError::NotFound(_))
        ));
    }

    async fn wait_for_completion(svc: &ProjectService, project_id: &str) {
        for _ in 0..200 {
            if let Some(progress) = svc.get_progress(project_id) {
                if matches!(
                    progress.status,
                    crate::indexer::IndexStatus::Completed | crate::indexer::IndexStatus::Error
                ) {
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
        panic!("indexing did not complete in time");
    }
}
