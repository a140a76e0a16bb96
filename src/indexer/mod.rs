//! Per-project incremental indexer.
//!
//! One worker per project: the initial scan fans out over a bounded
//! semaphore, file-watcher events collapse through per-path debounce
//! timers, and cancellation is cooperative — checked at every semaphore
//! boundary, before reads, and before writes. In-flight embed calls finish;
//! their results are discarded once the token fires.

pub mod manager;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chunker::Chunker;
use crate::constants;
use crate::embed::{embed_chunks, Embedder};
use crate::error::{Result, SemIndexError};
use crate::events::EventEmitter;
use crate::outline::OutlineBuilder;
use crate::parser::ParserRegistry;
use crate::paths;
use crate::store::{ChunkRecord, Project, ProjectStore, SymbolRecord};
use crate::walker::{FilePreview, ProjectScope};

/// Progress state machine: `Idle -> Indexing -> {Idle | Completed | Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Idle,
    Indexing,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub status: IndexStatus,
    pub total_files: usize,
    pub processed_files: usize,
    /// Files that actually produced writes (staleness misses).
    pub updated_files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            status: IndexStatus::Idle,
            total_files: 0,
            processed_files: 0,
            updated_files: 0,
            message: None,
        }
    }
}

pub type SharedProgress = Arc<RwLock<Progress>>;

/// Per-project indexing worker.
pub struct Indexer {
    project: Project,
    store: Arc<ProjectStore>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    registry: Arc<ParserRegistry>,
    scope: ProjectScope,
    progress: SharedProgress,
    events: EventEmitter,
    cancel: CancellationToken,
    semaphore: Arc<Semaphore>,
    debounce: Duration,
    /// At most one timer per path; stop cancels them all under the lock.
    debounce_timers: Mutex<HashMap<PathBuf, JoinHandle<()>>>,
    watcher: std::sync::Mutex<Option<RecommendedWatcher>>,
    /// Store-write counter, exposed for staleness tests.
    write_ops: AtomicU64,
}

impl Indexer {
    pub fn new(
        project: Project,
        store: Arc<ProjectStore>,
        embedder: Arc<dyn Embedder>,
        registry: Arc<ParserRegistry>,
        events: EventEmitter,
        progress: SharedProgress,
    ) -> Result<Self> {
        let chunker_config = crate::chunker::ChunkerConfig {
            max_chunk_size_tokens: project.config.chunk_size_max,
            min_chunk_size_tokens: project.config.chunk_size_min,
            collapse_threshold_tokens: project.config.chunk_size_max,
            merge_small_chunks: true,
            include_comments: true,
        };
        let scope = ProjectScope::new(&project.config)?;
        Ok(Self {
            chunker: Chunker::new(chunker_config, registry.clone()),
            registry,
            scope,
            project,
            store,
            embedder,
            progress,
            events,
            cancel: CancellationToken::new(),
            semaphore: Arc::new(Semaphore::new(constants::scan_concurrency())),
            debounce: Duration::from_millis(constants::debounce_ms()),
            debounce_timers: Mutex::new(HashMap::new()),
            watcher: std::sync::Mutex::new(None),
            write_ops: AtomicU64::new(0),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project.id
    }

    pub fn is_continuous(&self) -> bool {
        self.project.config.continuous_indexing
    }

    pub fn progress(&self) -> Progress {
        self.progress.read().unwrap().clone()
    }

    /// Store writes performed by this worker (test hook).
    pub fn write_count(&self) -> u64 {
        self.write_ops.load(Ordering::SeqCst)
    }

    fn set_status(&self, status: IndexStatus, message: Option<String>) {
        let mut progress = self.progress.write().unwrap();
        progress.status = status;
        progress.message = message;
    }

    /// Initial scan over the given previews, then watcher startup when the
    /// project wants continuous indexing.
    pub async fn run(self: Arc<Self>, files: Vec<FilePreview>) {
        {
            let mut progress = self.progress.write().unwrap();
            progress.status = IndexStatus::Indexing;
            progress.total_files = files.len();
            progress.processed_files = 0;
            progress.updated_files = 0;
            progress.message = None;
        }
        info!(
            project = %self.project.id,
            files = files.len(),
            "🔍 initial scan starting"
        );

        if let Err(e) = self.cleanup_removed(&files) {
            warn!(project = %self.project.id, "cleanup of removed files failed: {e}");
        }

        let mut tasks = tokio::task::JoinSet::new();
        for preview in files {
            let this = self.clone();
            tasks.spawn(async move {
                let permit = match this.semaphore.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return,
                };
                if constants::check_shutdown(&this.cancel) {
                    return;
                }
                match this.process_file(&preview) {
                    Ok(true) => {
                        this.write_progress(|p| p.updated_files += 1);
                        this.events
                            .file_indexed(&this.project.id, &preview.relative_path);
                    }
                    Ok(false) => {
                        debug!(path = %preview.relative_path, "unchanged, skipped");
                    }
                    Err(e) => {
                        // Per-file failures never abort the scan
                        warn!(path = %preview.relative_path, "indexing failed: {e}");
                    }
                }
                this.write_progress(|p| p.processed_files += 1);
                drop(permit);
            });
        }
        while tasks.join_next().await.is_some() {}

        if constants::check_shutdown(&self.cancel) {
            self.set_status(IndexStatus::Error, Some("cancelled".to_string()));
            return;
        }

        if self.project.config.continuous_indexing {
            match self.clone().start_watcher() {
                Ok(()) => {
                    self.set_status(IndexStatus::Idle, None);
                    info!(project = %self.project.id, "👀 scan complete, watching for changes");
                }
                Err(e) => {
                    error!(project = %self.project.id, "watcher failed to start: {e}");
                    self.set_status(IndexStatus::Error, Some(e.to_string()));
                }
            }
        } else {
            self.set_status(IndexStatus::Completed, None);
            info!(project = %self.project.id, "✅ scan complete");
        }
    }

    fn write_progress(&self, f: impl FnOnce(&mut Progress)) {
        f(&mut self.progress.write().unwrap());
    }

    /// Delete store rows for paths that left the scope AND are gone from
    /// disk. A path that merely fell out of scope but still exists is left
    /// alone.
    fn cleanup_removed(&self, files: &[FilePreview]) -> Result<()> {
        let scoped: HashSet<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        for stored in self.store.list_all_file_paths()? {
            if scoped.contains(stored.as_str()) {
                continue;
            }
            let on_disk = self.scope.root().join(&stored);
            if on_disk.exists() {
                continue;
            }
            debug!(path = %stored, "removing artifacts for deleted file");
            self.store.delete_file_and_artifacts(&stored)?;
            self.write_ops.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Index one file from its preview. Returns `Ok(false)` on a staleness
    /// hit (no side effects), `Ok(true)` after a successful write.
    fn process_file(&self, preview: &FilePreview) -> Result<bool> {
        let bytes = std::fs::read(&preview.absolute_path)
            .map_err(|e| SemIndexError::io(preview.absolute_path.clone(), e))?;
        self.index_content(&preview.relative_path, &bytes, preview.last_modified)
    }

    /// Shared core of the scan path and the watcher path.
    fn index_content(&self, relative: &str, bytes: &[u8], mtime: i64) -> Result<bool> {
        let hash = hex_sha256(bytes);

        // Staleness key: both the hash and the mtime must match. A stored
        // hash that never matches (including the literal "unknown") forces a
        // re-index.
        if let Some(existing) = self.store.get_file(relative)? {
            if existing.hash == hash && existing.last_modified == mtime {
                return Ok(false);
            }
        }

        if constants::check_shutdown(&self.cancel) {
            return Ok(false);
        }

        let source = String::from_utf8_lossy(bytes);
        let chunks = self.chunker.chunk_file(relative, &source)?;

        let batch_size = constants::embed_batch_size();
        let embedded = embed_chunks(self.embedder.as_ref(), chunks, batch_size)?;

        // An embed that raced a stop is discarded, not written
        if constants::check_shutdown(&self.cancel) {
            return Ok(false);
        }

        self.store.delete_file_chunks(relative)?;
        let chunk_count = embedded.len() as i64;
        for item in embedded {
            let chunk = &item.chunk;
            self.store.insert_chunk(&ChunkRecord {
                id: String::new(),
                file_path: relative.to_string(),
                content: chunk.content.clone(),
                embedding: item.embedding.clone(),
                embedding_model_id: self.embedder.id().to_string(),
                line_start: chunk.line_start,
                line_end: chunk.line_end,
                char_start: chunk.char_start,
                char_end: chunk.char_end,
                language: none_if_empty(&chunk.language),
                symbol_name: chunk.symbol_name.clone(),
                symbol_kind: chunk.symbol_kind.clone(),
                parent: chunk.parent.clone(),
                signature: chunk.signature.clone(),
                visibility: chunk.visibility.clone(),
                package_name: chunk.package_name.clone(),
                doc_string: chunk.doc_string.clone(),
                token_count: Some(chunk.token_count as i64),
                is_collapsed: Some(chunk.is_collapsed),
                source_code: chunk.source_code.clone(),
            })?;
        }
        self.store.insert_file(relative, &hash, mtime, chunk_count)?;
        self.write_ops.fetch_add(1, Ordering::SeqCst);

        // Continuous projects keep outlines warm during the scan as well
        if self.project.config.continuous_indexing {
            if let Err(e) = self.upsert_outline(relative, bytes) {
                debug!(path = %relative, "outline skipped: {e}");
            }
        }
        Ok(true)
    }

    /// Re-index a single file in response to a watcher event. Absolute
    /// paths outside the root are rejected.
    pub fn update_file_index(&self, absolute: &Path) -> Result<()> {
        let relative = paths::relative_within(self.scope.root(), absolute)
            .ok_or_else(|| SemIndexError::PathOutsideRoot(absolute.to_path_buf()))?;

        let metadata = std::fs::metadata(absolute)
            .map_err(|e| SemIndexError::io(absolute.to_path_buf(), e))?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let bytes = std::fs::read(absolute)
            .map_err(|e| SemIndexError::io(absolute.to_path_buf(), e))?;

        let wrote = self.index_content(&relative, &bytes, mtime)?;
        if wrote {
            self.upsert_outline(&relative, &bytes)?;
            self.events.file_indexed(&self.project.id, &relative);
        }
        Ok(())
    }

    /// Parse the file, persist its outline tree, replace its symbol rows,
    /// and rebuild the chunk-symbol join.
    fn upsert_outline(&self, relative: &str, bytes: &[u8]) -> Result<()> {
        let parsed = self.registry.parse(Path::new(relative), bytes)?;
        let tree = OutlineBuilder::build(&parsed.symbols);
        self.store.upsert_file_outline(relative, &tree)?;

        let symbols: Vec<SymbolRecord> = parsed
            .symbols
            .iter()
            .map(|s| SymbolRecord {
                id: String::new(),
                name: s.name.clone(),
                kind: s.kind.as_str().to_string(),
                line: s.start_line,
                character: 0,
            })
            .collect();
        self.store.replace_file_symbols(relative, &symbols)?;
        self.write_ops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    // === watcher + debounce ===

    /// Register every directory in scope with the OS watcher and route
    /// events through the debounce map.
    fn start_watcher(self: Arc<Self>) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Event>();

        let mut watcher = notify::recommended_watcher(
            move |result: notify::Result<notify::Event>| match result {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => warn!("watch error: {e}"),
            },
        )
        .map_err(|e| SemIndexError::Other(format!("create watcher: {e}")))?;

        for dir in self.scope.watchable_dirs() {
            if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
                debug!(dir = %dir.display(), "could not watch: {e}");
            }
        }
        *self.watcher.lock().unwrap() = Some(watcher);

        let this = self.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    maybe = rx.recv() => match maybe {
                        Some(event) => event,
                        None => break,
                    },
                    _ = this.cancel.cancelled() => break,
                };
                if !matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                ) {
                    continue;
                }
                for path in event.paths {
                    if !path.is_file() {
                        continue;
                    }
                    // Only files some parser claims; everything else would
                    // fall back to line windows on the scan anyway.
                    if !this.registry.supports(&path) || !this.scope.accepts_file(&path) {
                        continue;
                    }
                    this.clone().schedule_update(path).await;
                }
            }
            debug!(project = %this.project.id, "watch event loop stopped");
        });
        Ok(())
    }

    /// (Re)arm the debounce timer for a path: any existing timer is
    /// cancelled first, so N events inside the window collapse into one
    /// update.
    pub async fn schedule_update(self: Arc<Self>, path: PathBuf) {
        let mut timers = self.debounce_timers.lock().await;
        if let Some(previous) = timers.remove(&path) {
            previous.abort();
        }
        let this = self.clone();
        let timer_path = path.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(this.debounce) => {}
                _ = this.cancel.cancelled() => return,
            }
            if let Err(e) = this.update_file_index(&timer_path) {
                warn!(path = %timer_path.display(), "debounced update failed: {e}");
            }
            this.debounce_timers.lock().await.remove(&timer_path);
        });
        timers.insert(path, handle);
    }

    /// Number of armed debounce timers (test hook).
    pub async fn pending_debounce(&self) -> usize {
        self.debounce_timers.lock().await.len()
    }

    /// Stop the worker: cancel all timers under the lock, drop the watcher,
    /// fire the cancellation token. In-flight embeds finish and are
    /// discarded.
    pub async fn stop(&self) {
        {
            let mut timers = self.debounce_timers.lock().await;
            for (_, handle) in timers.drain() {
                handle.abort();
            }
        }
        *self.watcher.lock().unwrap() = None;
        self.cancel.cancel();
        info!(project = %self.project.id, "🛑 indexer stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

fn none_if_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EmbeddingModelInfo;
    use crate::embed::mock::MockEmbedder;
    use crate::store::ProjectConfig;
    use tempfile::tempdir;

    fn test_project(root: &Path, continuous: bool) -> Project {
        let mut config = ProjectConfig::new(root.to_path_buf(), "test-model".to_string());
        config.continuous_indexing = continuous;
        config.chunk_size_min = 1; // keep chunks one-per-symbol in tests
        config.embedding_model = Some(EmbeddingModelInfo {
            id: "test-model".to_string(),
            dimension: 8,
            ..Default::default()
        });
        Project {
            id: "proj".to_string(),
            name: "proj".to_string(),
            description: String::new(),
            config,
            is_indexing: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn build_indexer(root: &Path, store_dir: &Path, continuous: bool) -> Arc<Indexer> {
        let project = test_project(root, continuous);
        let store = Arc::new(ProjectStore::open(store_dir, &project.id).unwrap());
        store.save_project_metadata(&project).unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new("test-model", 8));
        Arc::new(
            Indexer::new(
                project,
                store,
                embedder,
                Arc::new(ParserRegistry::with_defaults()),
                EventEmitter::new(),
                Arc::new(RwLock::new(Progress::default())),
            )
            .unwrap(),
        )
    }

    fn store_of(indexer: &Arc<Indexer>) -> Arc<ProjectStore> {
        indexer.store.clone()
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_initial_scan_indexes_files() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("repo");
        write(&root, "main.go", "package main\n\nfunc a() {}\nfunc b() {}\n");
        write(&root, "README.md", "# One\n\ntext\n\n# Two\n\ntext\n");

        let indexer = build_indexer(&root, temp.path(), false);
        let scope = ProjectScope::new(&indexer.project.config).unwrap();
        let files = scope.preview_files().unwrap();
        indexer.clone().run(files).await;

        let progress = indexer.progress();
        assert_eq!(progress.status, IndexStatus::Completed);
        assert_eq!(progress.processed_files, 2);
        assert_eq!(progress.updated_files, 2);

        let store = store_of(&indexer);
        let stats = store.get_stats().unwrap();
        assert_eq!(stats.total_files, 2);
        assert!(stats.total_chunks >= 2);
    }

    #[tokio::test]
    async fn test_second_scan_is_a_noop() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("repo");
        write(&root, "lib.rs", "pub fn once() {}\n");

        let indexer = build_indexer(&root, temp.path(), false);
        let scope = ProjectScope::new(&indexer.project.config).unwrap();
        indexer.clone().run(scope.preview_files().unwrap()).await;
        let writes_after_first = indexer.write_count();
        assert!(writes_after_first > 0);

        indexer
            .clone()
            .run(scope.preview_files().unwrap())
            .await;
        assert_eq!(
            indexer.write_count(),
            writes_after_first,
            "unchanged tree must produce zero writes on the second pass"
        );
    }

    #[tokio::test]
    async fn test_update_file_index_rejects_outside_root() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("repo");
        write(&root, "a.rs", "fn a() {}\n");
        let outside = temp.path().join("outside.rs");
        std::fs::write(&outside, "fn o() {}").unwrap();

        let indexer = build_indexer(&root, temp.path(), false);
        let err = indexer.update_file_index(&outside).unwrap_err();
        assert!(matches!(err, SemIndexError::PathOutsideRoot(_)));
    }

    #[tokio::test]
    async fn test_update_writes_outline_and_symbols() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("repo");
        write(&root, "app.py", "class App:\n    def go(self):\n        pass\n");

        let indexer = build_indexer(&root, temp.path(), false);
        indexer.update_file_index(&root.join("app.py")).unwrap();

        let store = store_of(&indexer);
        let outline = store.get_file_outline("app.py").unwrap();
        assert_eq!(outline.len(), 1);
        assert_eq!(outline[0].name, "App");
        assert_eq!(outline[0].children[0].name, "go");
        assert_eq!(store.count_file_symbols("app.py").unwrap(), 2);
        assert!(store.outline_updated_at("app.py").unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_collapses_events() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("repo");
        write(&root, "hot.rs", "fn hot() {}\n");

        let indexer = build_indexer(&root, temp.path(), false);
        let path = root.join("hot.rs");

        for _ in 0..5 {
            indexer.clone().schedule_update(path.clone()).await;
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        assert_eq!(indexer.pending_debounce().await, 1);

        tokio::time::advance(Duration::from_millis(3000)).await;
        // Let the timer task run to completion
        tokio::task::yield_now().await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(indexer.pending_debounce().await, 0);
        // Exactly one update happened: one file row, one outline stamp
        let store = store_of(&indexer);
        assert_eq!(store.get_stats().unwrap().total_files, 1);
    }

    #[tokio::test]
    async fn test_stop_clears_timers_and_blocks_writes() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("repo");
        write(&root, "x.rs", "fn x() {}\n");

        let indexer = build_indexer(&root, temp.path(), false);
        indexer
            .clone()
            .schedule_update(root.join("x.rs"))
            .await;
        assert_eq!(indexer.pending_debounce().await, 1);

        indexer.stop().await;
        assert_eq!(indexer.pending_debounce().await, 0);
        assert!(indexer.is_stopped());

        // A post-stop scan performs no writes
        let scope = ProjectScope::new(&indexer.project.config).unwrap();
        indexer.clone().run(scope.preview_files().unwrap()).await;
        assert_eq!(indexer.write_count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_of_removed_files() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("repo");
        write(&root, "keep.rs", "fn keep() {}\n");
        write(&root, "gone.rs", "fn gone() {}\n");

        let indexer = build_indexer(&root, temp.path(), false);
        let scope = ProjectScope::new(&indexer.project.config).unwrap();
        indexer.clone().run(scope.preview_files().unwrap()).await;
        assert_eq!(store_of(&indexer).get_stats().unwrap().total_files, 2);

        std::fs::remove_file(root.join("gone.rs")).unwrap();

        // Fresh worker, same store: rerun detects the deletion
        let indexer2 = Arc::new(
            Indexer::new(
                indexer.project.clone(),
                store_of(&indexer),
                Arc::new(MockEmbedder::new("test-model", 8)),
                Arc::new(ParserRegistry::with_defaults()),
                EventEmitter::new(),
                Arc::new(RwLock::new(Progress::default())),
            )
            .unwrap(),
        );
        let files = ProjectScope::new(&indexer2.project.config)
            .unwrap()
            .preview_files()
            .unwrap();
        indexer2.clone().run(files).await;

        let store = store_of(&indexer2);
        assert_eq!(store.get_stats().unwrap().total_files, 1);
        assert!(store.get_file("gone.rs").unwrap().is_none());
        assert!(store.get_file("keep.rs").unwrap().is_some());
    }
}
