//! Indexer lifecycle management: one worker per project, at most.
//!
//! Registering a new worker for a project stops and replaces its
//! predecessor under the map lock; progress reads go through a concurrent
//! map and never touch that lock.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::walker::FilePreview;

use super::{Indexer, Progress, SharedProgress};

pub struct IndexerManager {
    workers: Mutex<HashMap<String, Arc<Indexer>>>,
    progress: DashMap<String, SharedProgress>,
}

impl IndexerManager {
    pub fn new() -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            progress: DashMap::new(),
        }
    }

    /// Create (or replace) the progress slot for a project. The indexer is
    /// constructed around this handle so manager reads see live state.
    pub fn progress_handle(&self, project_id: &str) -> SharedProgress {
        let handle: SharedProgress = Arc::new(std::sync::RwLock::new(Progress::default()));
        self.progress.insert(project_id.to_string(), handle.clone());
        handle
    }

    /// Register and launch a worker. Any predecessor for the same project
    /// is stopped and removed first, while the lock is held. When the run
    /// finishes (without a watcher keeping it alive) the spawner clears the
    /// slot — but only if it still points at this worker, so a concurrent
    /// replacement keeps its own registration.
    pub async fn start(self: &Arc<Self>, indexer: Arc<Indexer>, files: Vec<FilePreview>) {
        let project_id = indexer.project_id().to_string();
        {
            let mut workers = self.workers.lock().await;
            if let Some(previous) = workers.remove(&project_id) {
                info!(project = %project_id, "stopping previous indexer before replacement");
                previous.stop().await;
            }
            workers.insert(project_id.clone(), indexer.clone());
        }

        let manager = self.clone();
        let runner = indexer.clone();
        let continuous = runner.is_continuous();
        let slot_id = project_id.clone();
        tokio::spawn(async move {
            runner.clone().run(files).await;
            if continuous && !runner.is_stopped() {
                return; // the watcher keeps this worker registered
            }
            let mut workers = manager.workers.lock().await;
            if let Some(current) = workers.get(&slot_id) {
                if Arc::ptr_eq(current, &runner) {
                    workers.remove(&slot_id);
                }
            }
        });
        debug!(project = %project_id, "indexer registered");
    }

    /// Stop and remove a project's worker, if present. The slot is only
    /// cleared when it still points at the worker being stopped.
    pub async fn stop(&self, project_id: &str) {
        let worker = {
            let mut workers = self.workers.lock().await;
            workers.remove(project_id)
        };
        if let Some(worker) = worker {
            worker.stop().await;
        }
        self.progress.remove(project_id);
    }

    /// Stop everything (process shutdown).
    pub async fn stop_all(&self) {
        let drained: Vec<(String, Arc<Indexer>)> = {
            let mut workers = self.workers.lock().await;
            workers.drain().collect()
        };
        for (project_id, worker) in drained {
            debug!(project = %project_id, "stopping indexer");
            worker.stop().await;
        }
    }

    /// Lock-free progress read.
    pub fn get_progress(&self, project_id: &str) -> Option<Progress> {
        self.progress
            .get(project_id)
            .map(|handle| handle.read().unwrap().clone())
    }

    /// Whether a live (non-stopped) worker exists for the project.
    pub async fn is_running(&self, project_id: &str) -> bool {
        let workers = self.workers.lock().await;
        workers
            .get(project_id)
            .map(|w| !w.is_stopped())
            .unwrap_or(false)
    }
}

impl Default for IndexerManager {
    fn default() -> Self {
        Self::new()
    }
}
