//! Global catalog store: application key-value config plus the embedding
//! model catalog.
//!
//! This is a single database independent of any project. Model rows are
//! treated as immutable once a project references them; new versions get new
//! ids. First open seeds the built-in model list idempotently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SemIndexError};

/// Config key holding the currently selected project id.
pub const KEY_SELECTED_PROJECT: &str = "selected_project";

/// Config key holding the ONNX runtime shared library path, when overridden.
pub const KEY_ONNX_LIBRARY_PATH: &str = "onnx_library_path";

/// Which runtime strategy serves a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingBackend {
    /// Local tokenizer + ONNX session driven by this engine.
    LocalTokenizerOnnx,
    /// Delegated entirely to the fastembed library.
    #[default]
    LibraryFastembed,
}

impl EmbeddingBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalTokenizerOnnx => "local-tokenizer-onnx",
            Self::LibraryFastembed => "library-fastembed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "local-tokenizer-onnx" => Self::LocalTokenizerOnnx,
            _ => Self::LibraryFastembed,
        }
    }
}

/// Catalog entry describing one embedding model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingModelInfo {
    pub id: String,
    pub display_name: String,
    pub backend: EmbeddingBackend,
    pub dimension: u32,
    pub max_sequence_length: u32,
    /// Remote artifact URIs (model weights, tokenizer files).
    #[serde(default)]
    pub source_uris: Vec<String>,
    /// Local artifact directory once downloaded (opaque to the engine).
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    #[serde(default)]
    pub downloaded: bool,
    #[serde(default)]
    pub multilingual: bool,
    #[serde(default)]
    pub quantized: bool,
    /// Weights filename to prefer when a download offers several.
    #[serde(default)]
    pub preferred_filename: Option<String>,
}

/// Built-in models seeded on first open.
pub fn builtin_models() -> Vec<EmbeddingModelInfo> {
    vec![
        EmbeddingModelInfo {
            id: "minilm-l6-v2".to_string(),
            display_name: "all-MiniLM-L6-v2".to_string(),
            backend: EmbeddingBackend::LibraryFastembed,
            dimension: 384,
            max_sequence_length: 256,
            source_uris: vec![
                "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2".to_string(),
            ],
            local_path: None,
            downloaded: false,
            multilingual: false,
            quantized: false,
            preferred_filename: None,
        },
        EmbeddingModelInfo {
            id: "bge-small-en-v1.5".to_string(),
            display_name: "BGE Small EN v1.5".to_string(),
            backend: EmbeddingBackend::LocalTokenizerOnnx,
            dimension: 384,
            max_sequence_length: 512,
            source_uris: vec![
                "https://huggingface.co/BAAI/bge-small-en-v1.5".to_string(),
            ],
            local_path: None,
            downloaded: false,
            multilingual: false,
            quantized: true,
            preferred_filename: Some("model_quantized.onnx".to_string()),
        },
    ]
}

/// Default model used when a project references an unknown id.
pub fn default_model() -> EmbeddingModelInfo {
    builtin_models().remove(0)
}

/// Global key-value config + embedding model catalog.
pub struct CatalogStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl CatalogStore {
    /// Open (or create) the catalog database and seed built-in models.
    pub fn open(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir)
            .map_err(|e| SemIndexError::StoreInit(format!("create {}: {e}", config_dir.display())))?;
        let db_path = config_dir.join(crate::constants::CATALOG_DB_NAME);
        let conn = Connection::open(&db_path)
            .map_err(|e| SemIndexError::StoreInit(format!("open {}: {e}", db_path.display())))?;

        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = {};",
            crate::constants::SQLITE_BUSY_TIMEOUT_MS
        ))
        .map_err(|e| SemIndexError::StoreInit(format!("pragmas: {e}")))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS app_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS embedding_models (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                backend TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                max_sequence_length INTEGER NOT NULL,
                source_uris TEXT NOT NULL,
                local_path TEXT,
                downloaded INTEGER NOT NULL DEFAULT 0,
                multilingual INTEGER NOT NULL DEFAULT 0,
                quantized INTEGER NOT NULL DEFAULT 0,
                preferred_filename TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )
        .map_err(|e| SemIndexError::StoreInit(format!("catalog schema: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };
        store.seed_builtin_models()?;
        debug!(db = %store.db_path.display(), "catalog store opened");
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Seed built-in models. Idempotent: existing rows win.
    fn seed_builtin_models(&self) -> Result<()> {
        for model in builtin_models() {
            let exists = self.get_embedding_model(&model.id)?.is_some();
            if !exists {
                self.upsert_embedding_model(&model)?;
            }
        }
        Ok(())
    }

    // === app config ===

    pub fn set_value(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO app_config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM app_config WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn delete_value(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM app_config WHERE key = ?1", params![key])?;
        Ok(())
    }

    // === model catalog ===

    pub fn upsert_embedding_model(&self, model: &EmbeddingModelInfo) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let uris = serde_json::to_string(&model.source_uris)
            .map_err(|e| SemIndexError::Other(format!("serialize model uris: {e}")))?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO embedding_models
                (id, display_name, backend, dimension, max_sequence_length, source_uris,
                 local_path, downloaded, multilingual, quantized, preferred_filename,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                backend = excluded.backend,
                dimension = excluded.dimension,
                max_sequence_length = excluded.max_sequence_length,
                source_uris = excluded.source_uris,
                local_path = excluded.local_path,
                downloaded = excluded.downloaded,
                multilingual = excluded.multilingual,
                quantized = excluded.quantized,
                preferred_filename = excluded.preferred_filename,
                updated_at = excluded.updated_at",
            params![
                model.id,
                model.display_name,
                model.backend.as_str(),
                model.dimension,
                model.max_sequence_length,
                uris,
                model.local_path.as_ref().map(|p| p.display().to_string()),
                model.downloaded as i64,
                model.multilingual as i64,
                model.quantized as i64,
                model.preferred_filename,
                now,
            ],
        )?;
        Ok(())
    }

    fn row_to_model(row: &rusqlite::Row<'_>) -> rusqlite::Result<EmbeddingModelInfo> {
        let uris_json: String = row.get(5)?;
        Ok(EmbeddingModelInfo {
            id: row.get(0)?,
            display_name: row.get(1)?,
            backend: EmbeddingBackend::parse(&row.get::<_, String>(2)?),
            dimension: row.get(3)?,
            max_sequence_length: row.get(4)?,
            source_uris: serde_json::from_str(&uris_json).unwrap_or_default(),
            local_path: row.get::<_, Option<String>>(6)?.map(PathBuf::from),
            downloaded: row.get::<_, i64>(7)? != 0,
            multilingual: row.get::<_, i64>(8)? != 0,
            quantized: row.get::<_, i64>(9)? != 0,
            preferred_filename: row.get(10)?,
        })
    }

    pub fn get_embedding_model(&self, id: &str) -> Result<Option<EmbeddingModelInfo>> {
        let conn = self.conn.lock().unwrap();
        let model = conn
            .query_row(
                "SELECT id, display_name, backend, dimension, max_sequence_length, source_uris,
                        local_path, downloaded, multilingual, quantized, preferred_filename
                 FROM embedding_models WHERE id = ?1",
                params![id],
                Self::row_to_model,
            )
            .optional()?;
        Ok(model)
    }

    pub fn list_embedding_models(&self) -> Result<Vec<EmbeddingModelInfo>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, display_name, backend, dimension, max_sequence_length, source_uris,
                    local_path, downloaded, multilingual, quantized, preferred_filename
             FROM embedding_models ORDER BY id",
        )?;
        let models = stmt
            .query_map([], Self::row_to_model)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(models)
    }

    /// Resolve a model id, falling back to the built-in default when unknown.
    pub fn resolve_model_or_default(&self, id: &str) -> Result<EmbeddingModelInfo> {
        match self.get_embedding_model(id)? {
            Some(model) => Ok(model),
            None => {
                tracing::warn!(model = %id, "unknown embedding model, using default");
                Ok(default_model())
            }
        }
    }

    /// Known-config accessors used by the service and CLI.
    pub fn selected_project(&self) -> Result<Option<String>> {
        self.get_value(KEY_SELECTED_PROJECT)
    }

    pub fn set_selected_project(&self, project_id: &str) -> Result<()> {
        self.set_value(KEY_SELECTED_PROJECT, project_id)
    }

    pub fn clear_selected_project(&self) -> Result<()> {
        self.delete_value(KEY_SELECTED_PROJECT)
    }

    /// Aggregate view for the CLI status command.
    pub fn config_snapshot(&self) -> Result<HashMap<String, String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
        let mut out = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (k, v) = row?;
            out.insert(k, v);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_open_seeds_builtin_models() {
        let temp = tempdir().unwrap();
        let catalog = CatalogStore::open(temp.path()).unwrap();

        let models = catalog.list_embedding_models().unwrap();
        assert!(models.len() >= 2);
        assert!(models.iter().any(|m| m.id == "minilm-l6-v2"));
        assert!(models.iter().any(|m| m.id == "bge-small-en-v1.5"));

        // Re-open does not duplicate or clobber
        drop(catalog);
        let catalog = CatalogStore::open(temp.path()).unwrap();
        let again = catalog.list_embedding_models().unwrap();
        assert_eq!(models.len(), again.len());
    }

    #[test]
    fn test_seed_does_not_clobber_edits() {
        let temp = tempdir().unwrap();
        let catalog = CatalogStore::open(temp.path()).unwrap();

        let mut model = catalog.get_embedding_model("minilm-l6-v2").unwrap().unwrap();
        model.downloaded = true;
        model.local_path = Some(PathBuf::from("/models/minilm"));
        catalog.upsert_embedding_model(&model).unwrap();

        drop(catalog);
        let catalog = CatalogStore::open(temp.path()).unwrap();
        let reloaded = catalog.get_embedding_model("minilm-l6-v2").unwrap().unwrap();
        assert!(reloaded.downloaded);
        assert_eq!(reloaded.local_path, Some(PathBuf::from("/models/minilm")));
    }

    #[test]
    fn test_config_key_value_round_trip() {
        let temp = tempdir().unwrap();
        let catalog = CatalogStore::open(temp.path()).unwrap();

        assert_eq!(catalog.selected_project().unwrap(), None);
        catalog.set_selected_project("my-proj").unwrap();
        assert_eq!(
            catalog.selected_project().unwrap(),
            Some("my-proj".to_string())
        );
        catalog.clear_selected_project().unwrap();
        assert_eq!(catalog.selected_project().unwrap(), None);

        catalog.set_value("custom", "v1").unwrap();
        catalog.set_value("custom", "v2").unwrap();
        assert_eq!(catalog.get_value("custom").unwrap(), Some("v2".to_string()));
    }

    #[test]
    fn test_resolve_model_falls_back_to_default() {
        let temp = tempdir().unwrap();
        let catalog = CatalogStore::open(temp.path()).unwrap();

        let model = catalog.resolve_model_or_default("no-such-model").unwrap();
        assert_eq!(model.id, default_model().id);

        let known = catalog.resolve_model_or_default("bge-small-en-v1.5").unwrap();
        assert_eq!(known.backend, EmbeddingBackend::LocalTokenizerOnnx);
        assert_eq!(known.dimension, 384);
    }
}
