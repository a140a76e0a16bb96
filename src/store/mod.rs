//! Per-project store: one SQLite database per project.
//!
//! Each project owns a single `project-<id>.db` file. The store holds the
//! only connection (WAL mode, single writer behind a mutex), runs embedded
//! migrations on open, and keeps a `path -> file pk` cache behind a
//! reader-writer lock so chunk inserts do not pay a lookup per row.
//!
//! All multi-statement sequences run inside transactions; deleting a file
//! cascades to chunks, symbols, outline nodes, and chunk-symbol links in one
//! transaction.

pub mod migrations;
pub mod vector;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::catalog::EmbeddingModelInfo;
use crate::constants::DEFAULT_MAX_RESPONSE_BYTES;
use crate::error::{Result, SemIndexError};
use crate::outline::OutlineNode;
use vector::{cosine_similarity, decode_vector, encode_vector, TopK};

/// Per-project configuration, stored as JSON inside `project_meta` so the
/// database file is self-describing when moved between machines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub root_path: PathBuf,
    #[serde(default = "default_include_paths")]
    pub include_paths: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Extension allow-list; empty means "all".
    #[serde(default)]
    pub file_extensions: Vec<String>,
    #[serde(default = "default_true")]
    pub auto_exclude_hidden: bool,
    #[serde(default)]
    pub continuous_indexing: bool,
    #[serde(default = "default_chunk_min")]
    pub chunk_size_min: usize,
    #[serde(default = "default_chunk_max")]
    pub chunk_size_max: usize,
    pub embedding_model_id: String,
    /// Snapshot of the selected model so the DB stays self-describing.
    #[serde(default)]
    pub embedding_model: Option<EmbeddingModelInfo>,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

fn default_include_paths() -> Vec<String> {
    vec![".".to_string()]
}
fn default_true() -> bool {
    true
}
fn default_chunk_min() -> usize {
    100
}
fn default_chunk_max() -> usize {
    800
}
fn default_max_response_bytes() -> usize {
    DEFAULT_MAX_RESPONSE_BYTES
}

impl ProjectConfig {
    pub fn new(root_path: PathBuf, embedding_model_id: String) -> Self {
        Self {
            root_path,
            include_paths: default_include_paths(),
            exclude_patterns: Vec::new(),
            file_extensions: Vec::new(),
            auto_exclude_hidden: true,
            continuous_indexing: false,
            chunk_size_min: default_chunk_min(),
            chunk_size_max: default_chunk_max(),
            embedding_model_id,
            embedding_model: None,
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

/// A registered project with its persisted metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub config: ProjectConfig,
    pub is_indexing: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One tracked source file.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub pk: i64,
    pub id: String,
    pub path: String,
    pub hash: String,
    pub last_modified: i64,
    pub chunk_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One retrievable chunk. `embedding` is only populated by
/// [`ProjectStore::search_similar`]; plain read paths return it empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub id: String,
    pub file_path: String,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    pub embedding_model_id: String,
    pub line_start: usize,
    pub line_end: usize,
    pub char_start: usize,
    pub char_end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_collapsed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,
}

/// One extracted symbol row (flat; the outline carries the hierarchy).
#[derive(Debug, Clone, Serialize)]
pub struct SymbolRecord {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub line: usize,
    pub character: usize,
}

/// Aggregate statistics for a project database.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub total_files: i64,
    pub total_chunks: i64,
    pub total_symbols: i64,
    pub db_size_bytes: u64,
    pub outline_updated_at: Option<i64>,
    /// Chunk count per embedding model id.
    pub chunks_by_model: HashMap<String, i64>,
}

const CHUNK_COLUMNS: &str = "c.id, f.path, c.content, c.embedding, c.embedding_model_id, \
     c.line_start, c.line_end, c.char_start, c.char_end, c.language, c.symbol_name, \
     c.symbol_kind, c.parent, c.signature, c.visibility, c.package_name, c.doc_string, \
     c.token_count, c.is_collapsed, c.source_code";

/// Store for one project database.
pub struct ProjectStore {
    project_id: String,
    db_path: PathBuf,
    conn: Mutex<Connection>,
    /// path -> file pk cache; reads are cheap, writes rare.
    file_ids: RwLock<HashMap<String, i64>>,
    /// Declared dimension of the project's selected model, used to reject
    /// mismatched vectors on write. Refreshed when metadata is saved.
    declared_dim: RwLock<Option<(String, usize)>>,
}

impl ProjectStore {
    /// Open (or create) the database for `project_id` under `project_dir`
    /// and bring the schema up to date.
    pub fn open(project_dir: &Path, project_id: &str) -> Result<Self> {
        std::fs::create_dir_all(project_dir)
            .map_err(|e| SemIndexError::StoreInit(format!("create {}: {e}", project_dir.display())))?;

        let db_path = project_dir.join(format!(
            "project-{}.db",
            crate::paths::sanitize_for_filename(project_id)
        ));
        let mut conn = Connection::open(&db_path)
            .map_err(|e| SemIndexError::StoreInit(format!("open {}: {e}", db_path.display())))?;

        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = {};",
            crate::constants::SQLITE_BUSY_TIMEOUT_MS
        ))
        .map_err(|e| SemIndexError::StoreInit(format!("pragmas: {e}")))?;

        migrations::run_migrations(&mut conn)?;

        let store = Self {
            project_id: project_id.to_string(),
            db_path,
            conn: Mutex::new(conn),
            file_ids: RwLock::new(HashMap::new()),
            declared_dim: RwLock::new(None),
        };

        // Prime the declared dimension from an existing metadata row, if any.
        if let Ok(project) = store.load_project_metadata() {
            store.remember_declared_dim(&project.config);
        }

        debug!(project = %project_id, db = %store.db_path.display(), "project store opened");
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn remember_declared_dim(&self, config: &ProjectConfig) {
        let dim = config
            .embedding_model
            .as_ref()
            .map(|m| (config.embedding_model_id.clone(), m.dimension as usize));
        *self.declared_dim.write().unwrap() = dim;
    }

    // === project metadata ===

    /// Upsert the single metadata row. `created_at` is preserved on update.
    pub fn save_project_metadata(&self, project: &Project) -> Result<()> {
        let config_json = serde_json::to_string(&project.config)
            .map_err(|e| SemIndexError::Other(format!("serialize project config: {e}")))?;
        let now = chrono::Utc::now().timestamp();

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO project_meta (id, name, description, config_json, is_indexing, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                config_json = excluded.config_json,
                is_indexing = excluded.is_indexing,
                updated_at = excluded.updated_at",
            params![
                project.id,
                project.name,
                project.description,
                config_json,
                project.is_indexing as i64,
                project.created_at,
                now,
            ],
        )?;
        drop(conn);

        self.remember_declared_dim(&project.config);
        Ok(())
    }

    /// Load the project metadata row, failing with `NotFound` when absent.
    pub fn load_project_metadata(&self) -> Result<Project> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, name, description, config_json, is_indexing, created_at, updated_at
                 FROM project_meta LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()?;

        let (id, name, description, config_json, is_indexing, created_at, updated_at) = row
            .ok_or_else(|| {
                SemIndexError::NotFound(format!("project metadata for {}", self.project_id))
            })?;

        let config: ProjectConfig = serde_json::from_str(&config_json)
            .map_err(|e| SemIndexError::Other(format!("corrupt project config: {e}")))?;

        Ok(Project {
            id,
            name,
            description: description.unwrap_or_default(),
            config,
            is_indexing: is_indexing != 0,
            created_at,
            updated_at,
        })
    }

    // === files ===

    /// Upsert a file row by path. On insert a fresh opaque id and pk are
    /// assigned; the path cache is updated either way.
    pub fn insert_file(
        &self,
        path: &str,
        hash: &str,
        last_modified: i64,
        chunk_count: i64,
    ) -> Result<FileRecord> {
        let now = chrono::Utc::now().timestamp();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO files (id, path, hash, last_modified, chunk_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(path) DO UPDATE SET
                hash = excluded.hash,
                last_modified = excluded.last_modified,
                chunk_count = excluded.chunk_count,
                updated_at = excluded.updated_at",
            params![
                Uuid::new_v4().to_string(),
                path,
                hash,
                last_modified,
                chunk_count,
                now,
            ],
        )?;
        let record = Self::query_file(&conn, path)?
            .ok_or_else(|| SemIndexError::NotFound(format!("file {path}")))?;
        drop(conn);

        self.file_ids
            .write()
            .unwrap()
            .insert(path.to_string(), record.pk);
        Ok(record)
    }

    pub fn get_file(&self, path: &str) -> Result<Option<FileRecord>> {
        let conn = self.conn.lock().unwrap();
        Self::query_file(&conn, path)
    }

    fn query_file(conn: &Connection, path: &str) -> Result<Option<FileRecord>> {
        let record = conn
            .query_row(
                "SELECT pk, id, path, hash, last_modified, chunk_count, created_at, updated_at
                 FROM files WHERE path = ?1",
                params![path],
                |row| {
                    Ok(FileRecord {
                        pk: row.get(0)?,
                        id: row.get(1)?,
                        path: row.get(2)?,
                        hash: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        last_modified: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                        chunk_count: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Resolve the pk for a path, consulting the cache first and creating a
    /// placeholder file row when the path has never been seen. The
    /// placeholder keeps chunk rows referentially consistent until the real
    /// file row lands at the end of the update.
    fn file_pk(&self, conn: &Connection, path: &str) -> Result<i64> {
        if let Some(pk) = self.file_ids.read().unwrap().get(path) {
            return Ok(*pk);
        }
        let existing: Option<i64> = conn
            .query_row("SELECT pk FROM files WHERE path = ?1", params![path], |r| {
                r.get(0)
            })
            .optional()?;
        let pk = match existing {
            Some(pk) => pk,
            None => {
                let now = chrono::Utc::now().timestamp();
                conn.execute(
                    "INSERT INTO files (id, path, hash, last_modified, chunk_count, created_at, updated_at)
                     VALUES (?1, ?2, NULL, NULL, 0, ?3, ?3)",
                    params![Uuid::new_v4().to_string(), path, now],
                )?;
                conn.last_insert_rowid()
            }
        };
        self.file_ids
            .write()
            .unwrap()
            .insert(path.to_string(), pk);
        Ok(pk)
    }

    pub fn list_all_file_paths(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT path FROM files ORDER BY path")?;
        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(paths)
    }

    // === chunks ===

    /// Insert one chunk, assigning it a fresh UUID. Uniqueness on
    /// `(file, line_start, line_end)` uses replace semantics; a vector whose
    /// length disagrees with the selected model's declared dimension is
    /// rejected.
    pub fn insert_chunk(&self, chunk: &ChunkRecord) -> Result<String> {
        if let Some((model_id, dim)) = self.declared_dim.read().unwrap().clone() {
            if chunk.embedding_model_id == model_id && chunk.embedding.len() != dim {
                return Err(SemIndexError::EmbeddingDimensionMismatch {
                    expected: dim,
                    actual: chunk.embedding.len(),
                });
            }
        }

        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();
        let blob = encode_vector(&chunk.embedding);

        let conn = self.conn.lock().unwrap();
        let file_pk = self.file_pk(&conn, &chunk.file_path)?;
        // A later chunk covering the same line range supersedes the earlier
        // one; the PK differs so this needs an explicit conflict target.
        conn.execute(
            "INSERT INTO chunks (id, file_id, content, embedding, embedding_model_id,
                                 line_start, line_end, char_start, char_end, language,
                                 symbol_name, symbol_kind, parent, signature, visibility,
                                 package_name, doc_string, token_count, is_collapsed,
                                 source_code, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19, ?20, ?21, ?21)
             ON CONFLICT(file_id, line_start, line_end) DO UPDATE SET
                id = excluded.id,
                content = excluded.content,
                embedding = excluded.embedding,
                embedding_model_id = excluded.embedding_model_id,
                char_start = excluded.char_start,
                char_end = excluded.char_end,
                language = excluded.language,
                symbol_name = excluded.symbol_name,
                symbol_kind = excluded.symbol_kind,
                parent = excluded.parent,
                signature = excluded.signature,
                visibility = excluded.visibility,
                package_name = excluded.package_name,
                doc_string = excluded.doc_string,
                token_count = excluded.token_count,
                is_collapsed = excluded.is_collapsed,
                source_code = excluded.source_code,
                updated_at = excluded.updated_at",
            params![
                id,
                file_pk,
                chunk.content,
                blob,
                chunk.embedding_model_id,
                chunk.line_start as i64,
                chunk.line_end as i64,
                chunk.char_start as i64,
                chunk.char_end as i64,
                chunk.language,
                chunk.symbol_name,
                chunk.symbol_kind,
                chunk.parent,
                chunk.signature,
                chunk.visibility,
                chunk.package_name,
                chunk.doc_string,
                chunk.token_count,
                chunk.is_collapsed.map(|b| b as i64),
                chunk.source_code,
                now,
            ],
        )?;
        Ok(id)
    }

    /// Delete all chunks for a file, returning how many went away.
    pub fn delete_file_chunks(&self, path: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let pk: Option<i64> = conn
            .query_row("SELECT pk FROM files WHERE path = ?1", params![path], |r| {
                r.get(0)
            })
            .optional()?;
        let Some(pk) = pk else { return Ok(0) };
        let deleted = conn.execute("DELETE FROM chunks WHERE file_id = ?1", params![pk])?;
        conn.execute(
            "DELETE FROM chunk_symbols WHERE chunk_id NOT IN (SELECT id FROM chunks)",
            [],
        )?;
        Ok(deleted)
    }

    fn row_to_chunk(row: &rusqlite::Row<'_>, with_embedding: bool) -> rusqlite::Result<ChunkRecord> {
        let blob: Option<Vec<u8>> = row.get(3)?;
        let embedding = if with_embedding {
            blob.as_deref()
                .map(|b| decode_vector(b).unwrap_or_default())
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        Ok(ChunkRecord {
            id: row.get(0)?,
            file_path: row.get(1)?,
            content: row.get(2)?,
            embedding,
            embedding_model_id: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            line_start: row.get::<_, i64>(5)? as usize,
            line_end: row.get::<_, i64>(6)? as usize,
            char_start: row.get::<_, i64>(7)? as usize,
            char_end: row.get::<_, i64>(8)? as usize,
            language: row.get(9)?,
            symbol_name: row.get(10)?,
            symbol_kind: row.get(11)?,
            parent: row.get(12)?,
            signature: row.get(13)?,
            visibility: row.get(14)?,
            package_name: row.get(15)?,
            doc_string: row.get(16)?,
            token_count: row.get(17)?,
            is_collapsed: row.get::<_, Option<i64>>(18)?.map(|v| v != 0),
            source_code: row.get(19)?,
        })
    }

    /// All chunks for a file ordered by start line. Embeddings are not
    /// materialized on this read path.
    pub fn get_file_chunks(&self, path: &str) -> Result<Vec<ChunkRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks c
             JOIN files f ON c.file_id = f.pk
             WHERE f.path = ?1
             ORDER BY c.line_start ASC"
        ))?;
        let chunks = stmt
            .query_map(params![path], |row| Self::row_to_chunk(row, false))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(chunks)
    }

    pub fn get_chunk_by_id(&self, id: &str) -> Result<ChunkRecord> {
        let conn = self.conn.lock().unwrap();
        let chunk = conn
            .query_row(
                &format!(
                    "SELECT {CHUNK_COLUMNS} FROM chunks c
                     JOIN files f ON c.file_id = f.pk
                     WHERE c.id = ?1"
                ),
                params![id],
                |row| Self::row_to_chunk(row, false),
            )
            .optional()?;
        chunk.ok_or_else(|| SemIndexError::NotFound(format!("chunk {id}")))
    }

    // === symbols ===

    /// Replace the symbol rows for a file and rebuild the chunk-symbol join
    /// by line containment, all in one transaction.
    pub fn replace_file_symbols(&self, path: &str, symbols: &[SymbolRecord]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut conn = self.conn.lock().unwrap();
        let file_pk = self.file_pk(&conn, path)?;

        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM chunk_symbols WHERE symbol_id IN
                (SELECT id FROM symbols WHERE file_id = ?1)",
            params![file_pk],
        )?;
        tx.execute("DELETE FROM symbols WHERE file_id = ?1", params![file_pk])?;

        {
            let mut insert = tx.prepare(
                "INSERT INTO symbols (id, file_id, name, kind, line, character, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            )?;
            let mut link = tx.prepare(
                "INSERT OR IGNORE INTO chunk_symbols (chunk_id, symbol_id)
                 SELECT c.id, ?1 FROM chunks c
                 WHERE c.file_id = ?2 AND c.line_start <= ?3 AND c.line_end >= ?3",
            )?;
            for symbol in symbols {
                let id = if symbol.id.is_empty() {
                    Uuid::new_v4().to_string()
                } else {
                    symbol.id.clone()
                };
                insert.execute(params![
                    id,
                    file_pk,
                    symbol.name,
                    symbol.kind,
                    symbol.line as i64,
                    symbol.character as i64,
                    now,
                ])?;
                link.execute(params![id, file_pk, symbol.line as i64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn count_file_symbols(&self, path: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn
            .query_row(
                "SELECT COUNT(*) FROM symbols s JOIN files f ON s.file_id = f.pk WHERE f.path = ?1",
                params![path],
                |r| r.get(0),
            )
            .optional()?
            .unwrap_or(0);
        Ok(count)
    }

    // === outline ===

    /// Regenerate the outline for a file wholesale: clear, insert the tree
    /// depth-first with deterministic sibling positions, and bump the
    /// staleness stamp — one transaction.
    pub fn upsert_file_outline(&self, path: &str, tree: &[OutlineNode]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut conn = self.conn.lock().unwrap();
        let file_pk = self.file_pk(&conn, path)?;

        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM outline_nodes WHERE file_id = ?1",
            params![file_pk],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO outline_nodes (id, file_id, parent_id, name, kind, start_line, end_line, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            fn insert_subtree(
                stmt: &mut rusqlite::Statement<'_>,
                file_pk: i64,
                parent_id: Option<&str>,
                nodes: &[OutlineNode],
            ) -> rusqlite::Result<()> {
                for (position, node) in nodes.iter().enumerate() {
                    stmt.execute(params![
                        node.id,
                        file_pk,
                        parent_id,
                        node.name,
                        node.kind,
                        node.start_line as i64,
                        node.end_line as i64,
                        position as i64,
                    ])?;
                    insert_subtree(stmt, file_pk, Some(&node.id), &node.children)?;
                }
                Ok(())
            }
            insert_subtree(&mut stmt, file_pk, None, tree)?;
        }
        tx.execute(
            "INSERT INTO outline_metadata (file_id, updated_at) VALUES (?1, ?2)
             ON CONFLICT(file_id) DO UPDATE SET updated_at = excluded.updated_at",
            params![file_pk, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Reconstruct the outline forest for a file. Returns an empty vector
    /// when the file has no outline rows.
    pub fn get_file_outline(&self, path: &str) -> Result<Vec<OutlineNode>> {
        let conn = self.conn.lock().unwrap();
        let pk: Option<i64> = conn
            .query_row("SELECT pk FROM files WHERE path = ?1", params![path], |r| {
                r.get(0)
            })
            .optional()?;
        let Some(pk) = pk else { return Ok(Vec::new()) };

        let mut stmt = conn.prepare(
            "SELECT id, parent_id, name, kind, start_line, end_line, position
             FROM outline_nodes WHERE file_id = ?1
             ORDER BY position ASC",
        )?;
        let rows: Vec<(OutlineNode, Option<String>)> = stmt
            .query_map(params![pk], |row| {
                Ok((
                    OutlineNode {
                        id: row.get(0)?,
                        name: row.get(2)?,
                        kind: row.get(3)?,
                        start_line: row.get::<_, i64>(4)? as usize,
                        end_line: row.get::<_, i64>(5)? as usize,
                        children: Vec::new(),
                    },
                    row.get::<_, Option<String>>(1)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        // Group children on parent_id, then attach recursively from the roots.
        let mut by_parent: HashMap<Option<String>, Vec<OutlineNode>> = HashMap::new();
        for (node, parent_id) in rows {
            by_parent.entry(parent_id).or_default().push(node);
        }
        fn attach(
            node: &mut OutlineNode,
            by_parent: &mut HashMap<Option<String>, Vec<OutlineNode>>,
        ) {
            if let Some(mut children) = by_parent.remove(&Some(node.id.clone())) {
                for child in &mut children {
                    attach(child, by_parent);
                }
                node.children = children;
            }
        }
        let mut roots = by_parent.remove(&None).unwrap_or_default();
        for root in &mut roots {
            attach(root, &mut by_parent);
        }
        Ok(roots)
    }

    pub fn get_outline_node(&self, id: &str) -> Result<Option<(String, String, String, usize, usize)>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT f.path, o.name, o.kind, o.start_line, o.end_line
                 FROM outline_nodes o JOIN files f ON o.file_id = f.pk
                 WHERE o.id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)? as usize,
                        row.get::<_, i64>(4)? as usize,
                    ))
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Staleness stamp of a file's outline, if one was ever written.
    pub fn outline_updated_at(&self, path: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let stamp = conn
            .query_row(
                "SELECT m.updated_at FROM outline_metadata m
                 JOIN files f ON m.file_id = f.pk WHERE f.path = ?1",
                params![path],
                |r| r.get(0),
            )
            .optional()?;
        Ok(stamp)
    }

    // === cascade deletes / reset ===

    /// Remove a file and everything derived from it in one transaction:
    /// chunk-symbol links, chunks, symbols, outline nodes, outline metadata,
    /// then the file row itself. The cache entry is invalidated.
    pub fn delete_file_and_artifacts(&self, path: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let pk: Option<i64> = conn
            .query_row("SELECT pk FROM files WHERE path = ?1", params![path], |r| {
                r.get(0)
            })
            .optional()?;
        let Some(pk) = pk else { return Ok(()) };

        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM chunk_symbols WHERE chunk_id IN (SELECT id FROM chunks WHERE file_id = ?1)",
            params![pk],
        )?;
        tx.execute(
            "DELETE FROM chunk_symbols WHERE symbol_id IN (SELECT id FROM symbols WHERE file_id = ?1)",
            params![pk],
        )?;
        tx.execute("DELETE FROM chunks WHERE file_id = ?1", params![pk])?;
        tx.execute("DELETE FROM symbols WHERE file_id = ?1", params![pk])?;
        tx.execute("DELETE FROM outline_nodes WHERE file_id = ?1", params![pk])?;
        tx.execute("DELETE FROM outline_metadata WHERE file_id = ?1", params![pk])?;
        tx.execute("DELETE FROM files WHERE pk = ?1", params![pk])?;
        tx.commit()?;
        drop(conn);

        self.file_ids.write().unwrap().remove(path);
        Ok(())
    }

    /// Truncate all derived data, preserving `project_meta`.
    pub fn reset_project_data(&self) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM chunks;
             DELETE FROM symbols;
             DELETE FROM chunk_symbols;
             DELETE FROM outline_nodes;
             DELETE FROM outline_metadata;
             DELETE FROM files;",
        )?;
        tx.commit()?;
        drop(conn);

        self.file_ids.write().unwrap().clear();
        Ok(())
    }

    // === stats ===

    pub fn get_stats(&self) -> Result<ProjectStats> {
        let conn = self.conn.lock().unwrap();
        let total_files: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))?;
        let total_chunks: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
        let total_symbols: i64 =
            conn.query_row("SELECT COUNT(*) FROM symbols", [], |r| r.get(0))?;
        let outline_updated_at: Option<i64> = conn
            .query_row("SELECT MAX(updated_at) FROM outline_metadata", [], |r| {
                r.get(0)
            })
            .optional()?
            .flatten();

        let mut chunks_by_model = HashMap::new();
        let mut stmt = conn.prepare(
            "SELECT COALESCE(embedding_model_id, ''), COUNT(*) FROM chunks GROUP BY embedding_model_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (model, count) = row?;
            chunks_by_model.insert(model, count);
        }
        drop(stmt);
        drop(conn);

        let db_size_bytes = std::fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0);

        Ok(ProjectStats {
            total_files,
            total_chunks,
            total_symbols,
            db_size_bytes,
            outline_updated_at,
            chunks_by_model,
        })
    }

    // === similarity search ===

    /// Exact top-k cosine search over every chunk vector in the project.
    ///
    /// `k <= 0` falls back to 10. Chunks with empty embeddings are skipped;
    /// blobs with a bad length are logged and skipped rather than failing
    /// the whole query.
    pub fn search_similar(
        &self,
        query_vec: &[f32],
        k: i64,
    ) -> Result<Vec<(ChunkRecord, f32)>> {
        if query_vec.is_empty() {
            return Err(SemIndexError::InvalidQuery("empty query vector".into()));
        }
        let norm: f32 = query_vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err(SemIndexError::InvalidQuery("zero-norm query vector".into()));
        }
        let k = if k <= 0 { 10 } else { k as usize };

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks c JOIN files f ON c.file_id = f.pk"
        ))?;
        let mut topk: TopK<ChunkRecord> = TopK::new(k);
        let rows = stmt.query_map([], |row| Self::row_to_chunk(row, true))?;
        for row in rows {
            let chunk = row?;
            if chunk.embedding.is_empty() {
                continue;
            }
            if let Some(score) = cosine_similarity(query_vec, &chunk.embedding) {
                topk.push(score, chunk);
            }
        }
        Ok(topk.into_sorted_vec())
    }
}
