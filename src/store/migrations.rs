//! Embedded schema migrations for per-project databases.
//!
//! Migrations are compiled in, versioned with sequential ids, and applied in
//! order inside one transaction on open. Released migrations are never
//! edited; fixes go in a new migration that rewrites non-conforming rows
//! before tightening constraints.

use rusqlite::Connection;

use crate::error::{Result, SemIndexError};

/// One schema migration. `down` is retained for tooling and review even
/// though the engine only ever applies `up`.
pub struct Migration {
    pub id: u32,
    pub name: &'static str,
    pub up: &'static str,
    #[allow(dead_code)]
    pub down: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        name: "create_core_tables",
        up: r#"
            CREATE TABLE IF NOT EXISTS files (
                pk INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL,
                path TEXT UNIQUE NOT NULL,
                hash TEXT,
                last_modified INTEGER,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                file_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB,
                embedding_model_id TEXT,
                line_start INTEGER NOT NULL,
                line_end INTEGER NOT NULL,
                char_start INTEGER NOT NULL DEFAULT 0,
                char_end INTEGER NOT NULL DEFAULT 0,
                language TEXT,
                symbol_name TEXT,
                symbol_kind TEXT,
                parent TEXT,
                signature TEXT,
                visibility TEXT,
                package_name TEXT,
                doc_string TEXT,
                token_count INTEGER,
                is_collapsed INTEGER,
                source_code TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(file_id, line_start, line_end)
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_file_id ON chunks(file_id);

            CREATE TABLE IF NOT EXISTS symbols (
                id TEXT PRIMARY KEY,
                file_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                line INTEGER NOT NULL,
                character INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_symbols_file_id ON symbols(file_id);

            CREATE TABLE IF NOT EXISTS chunk_symbols (
                chunk_id TEXT NOT NULL,
                symbol_id TEXT NOT NULL,
                PRIMARY KEY (chunk_id, symbol_id)
            );

            CREATE TABLE IF NOT EXISTS project_meta (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                config_json TEXT NOT NULL,
                is_indexing INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
        "#,
        down: r#"
            DROP TABLE IF EXISTS project_meta;
            DROP TABLE IF EXISTS chunk_symbols;
            DROP TABLE IF EXISTS symbols;
            DROP TABLE IF EXISTS chunks;
            DROP TABLE IF EXISTS files;
        "#,
    },
    Migration {
        id: 2,
        name: "create_outline_tables",
        up: r#"
            CREATE TABLE IF NOT EXISTS outline_nodes (
                id TEXT PRIMARY KEY,
                file_id INTEGER NOT NULL,
                parent_id TEXT,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                position INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_outline_file_id ON outline_nodes(file_id);

            CREATE TABLE IF NOT EXISTS outline_metadata (
                file_id INTEGER PRIMARY KEY,
                updated_at INTEGER NOT NULL
            );
        "#,
        down: r#"
            DROP TABLE IF EXISTS outline_metadata;
            DROP TABLE IF EXISTS outline_nodes;
        "#,
    },
];

/// Apply all pending migrations in order. The applied set is tracked in a
/// `schema_migrations` table so re-opening a store is idempotent.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(id), 0) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    for migration in MIGRATIONS.iter().filter(|m| m.id > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.up).map_err(|e| {
            SemIndexError::StoreInit(format!(
                "migration {:06} ({}) failed: {}",
                migration.id, migration.name, e
            ))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (id, name, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                migration.id,
                migration.name,
                chrono::Utc::now().timestamp()
            ],
        )?;
        tx.commit()?;
        tracing::debug!(
            "Applied migration {:06} ({})",
            migration.id,
            migration.name
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_sequential() {
        for (i, m) in MIGRATIONS.iter().enumerate() {
            assert_eq!(m.id as usize, i + 1, "migration ids must be sequential");
        }
    }

    #[test]
    fn test_migrations_apply_and_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };
        for expected in [
            "chunk_symbols",
            "chunks",
            "files",
            "outline_metadata",
            "outline_nodes",
            "project_meta",
            "symbols",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }

        // Second run is a no-op
        run_migrations(&mut conn).unwrap();
        let applied: u32 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(applied as usize, MIGRATIONS.len());
    }
}
