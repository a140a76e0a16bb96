//! Central constants for semindex configuration
//!
//! All string literals for paths, filenames, and configuration knobs should be
//! defined here to avoid duplication and ensure consistency across the codebase.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Global shutdown flag, set by the CTRL-C handler.
///
/// This uses a raw `AtomicBool` instead of relying solely on `CancellationToken`
/// because parts of the indexing pipeline are synchronous (ONNX inference,
/// file hashing) and the flag must be visible from any thread without async
/// polling.
///
/// Checked between files and between embedding batches so that CTRL-C is
/// honoured within a few seconds even during heavy CPU work.
pub static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Check whether a graceful shutdown has been requested (CTRL-C).
#[inline]
pub fn is_shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Check whether a graceful shutdown has been requested via either
/// the global AtomicBool (OS signal) or a CancellationToken.
#[inline]
pub fn check_shutdown(cancel_token: &tokio_util::sync::CancellationToken) -> bool {
    is_shutdown_requested() || cancel_token.is_cancelled()
}

/// Application directory name under the platform user-data directory
pub const APP_DIR_NAME: &str = "semindex";

/// Subdirectory holding the global catalog database
pub const CONFIG_SUBDIR: &str = "config";

/// Global catalog database filename
pub const CATALOG_DB_NAME: &str = "projects.db";

/// Subdirectory holding per-project databases
pub const INDEXES_SUBDIR: &str = "indexes";

/// Subdirectory holding downloaded embedding model artifacts
pub const MODELS_SUBDIR: &str = "models";

/// Log directory name within the application data directory
pub const LOG_DIR_NAME: &str = "logs";

/// Default log file name
pub const LOG_FILE_NAME: &str = "semindex.log";

/// File watcher debounce time in milliseconds.
/// Repeated write events on one path within this window collapse into a
/// single re-index. Override with `SEMINDEX_DEBOUNCE_MS`.
pub const DEFAULT_DEBOUNCE_MS: u64 = 2000;

/// Maximum number of files processed concurrently during an initial scan.
/// Override with `SEMINDEX_SCAN_CONCURRENCY`.
pub const DEFAULT_SCAN_CONCURRENCY: usize = 10;

/// Maximum number of chunk texts sent to the embedder in one batch.
/// Override with `SEMINDEX_EMBED_BATCH`.
pub const DEFAULT_EMBED_BATCH: usize = 64;

/// Default top-k for tool-server searches
pub const DEFAULT_SEARCH_K: usize = 8;

/// Hard cap on top-k at the tool surface
pub const MAX_SEARCH_K: usize = 50;

/// Default cap on tool-server response size in bytes
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1_048_576;

/// Soft budget for a single retrieval request on the tool server
pub const RETRIEVAL_TIMEOUT_SECS: u64 = 10;

/// Interval between periodic tool-server status events
pub const STATUS_EVENT_INTERVAL_SECS: u64 = 30;

/// SQLite busy timeout applied to every connection, in milliseconds
pub const SQLITE_BUSY_TIMEOUT_MS: u64 = 5000;

/// Read the debounce window from the environment, falling back to the default.
pub fn debounce_ms() -> u64 {
    std::env::var("SEMINDEX_DEBOUNCE_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_DEBOUNCE_MS)
}

/// Read the scan concurrency bound from the environment.
pub fn scan_concurrency() -> usize {
    std::env::var("SEMINDEX_SCAN_CONCURRENCY")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or(DEFAULT_SCAN_CONCURRENCY)
}

/// Read the embedding batch size from the environment.
pub fn embed_batch_size() -> usize {
    std::env::var("SEMINDEX_EMBED_BATCH")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or(DEFAULT_EMBED_BATCH)
}

/// Get the application data directory.
///
/// Linux: `$XDG_DATA_HOME/semindex` (fallback `~/.local/share/semindex`),
/// macOS: `~/Library/Application Support/semindex`,
/// Windows: `%LOCALAPPDATA%\semindex`.
/// Override with `SEMINDEX_DATA_DIR` (used heavily by tests).
pub fn data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("SEMINDEX_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let base = dirs::data_local_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine user data directory"))?;
    Ok(base.join(APP_DIR_NAME))
}

/// Directory holding per-project database files, created on demand.
pub fn indexes_dir(data_dir: &std::path::Path) -> anyhow::Result<PathBuf> {
    let dir = data_dir.join(INDEXES_SUBDIR);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            anyhow::anyhow!("Failed to create indexes directory {}: {}", dir.display(), e)
        })?;
    }
    Ok(dir)
}

/// Directory holding the global catalog database, created on demand.
pub fn config_dir(data_dir: &std::path::Path) -> anyhow::Result<PathBuf> {
    let dir = data_dir.join(CONFIG_SUBDIR);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            anyhow::anyhow!("Failed to create config directory {}: {}", dir.display(), e)
        })?;
    }
    Ok(dir)
}

/// Directory for downloaded model artifacts (opaque to the engine).
pub fn models_dir(data_dir: &std::path::Path) -> anyhow::Result<PathBuf> {
    let dir = data_dir.join(MODELS_SUBDIR);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            anyhow::anyhow!("Failed to create models directory {}: {}", dir.display(), e)
        })?;
    }
    Ok(dir)
}

/// Directories that are always excluded from indexing, regardless of project
/// configuration. Matched against single path components.
pub const ALWAYS_EXCLUDED_DIRS: &[&str] = &[
    // Version control
    ".git",
    ".svn",
    ".hg",
    // Build artifacts
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    // Python
    "__pycache__",
    ".pytest_cache",
    ".tox",
    "venv",
    ".venv",
    // IDE
    ".idea",
    ".vscode",
    ".vs",
    // Other
    "coverage",
    ".nyc_output",
    ".cache",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_knobs_fall_back_to_defaults() {
        // Knob env vars are unset in the test environment
        assert_eq!(debounce_ms(), DEFAULT_DEBOUNCE_MS);
        assert_eq!(scan_concurrency(), DEFAULT_SCAN_CONCURRENCY);
        assert_eq!(embed_batch_size(), DEFAULT_EMBED_BATCH);
    }

    #[test]
    fn test_subdirectories_created_on_demand() {
        let temp = tempfile::tempdir().unwrap();
        let data = temp.path().join("data");

        let idx = indexes_dir(&data).unwrap();
        assert!(idx.is_dir());
        assert!(idx.ends_with(INDEXES_SUBDIR));

        let cfg = config_dir(&data).unwrap();
        assert!(cfg.is_dir());

        let models = models_dir(&data).unwrap();
        assert!(models.is_dir());
    }
}
