use codeprism_core::CodeprismError;
use rusqlite::Connection;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema: file index, cards, edges, docs, flows, tuning",
    sql: include_str!("migrations/001_initial.sql"),
}];

/// Run all pending migrations. Any failure is a [`CodeprismError::Migration`];
/// callers must not continue against a partially migrated store.
pub(crate) fn run_migrations(conn: &Connection) -> Result<(), CodeprismError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        );",
    )
    .map_err(|e| CodeprismError::Migration(e.to_string()))?;

    let current_version: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| CodeprismError::Migration(e.to_string()))?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }
        tracing::info!(
            "Applying migration {}: {}",
            migration.version,
            migration.description
        );
        let apply = || -> rusqlite::Result<()> {
            conn.execute_batch("BEGIN")?;
            conn.execute_batch(migration.sql)?;
            conn.execute(
                "INSERT INTO schema_version (version, description, applied_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    migration.version,
                    migration.description,
                    chrono::Utc::now().timestamp()
                ],
            )?;
            conn.execute_batch("COMMIT")
        };
        if let Err(e) = apply() {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(CodeprismError::Migration(format!(
                "migration {} ({}) failed: {}",
                migration.version, migration.description, e
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_run_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);

        for table in ["file_index", "cards", "graph_edges", "project_docs", "tuning", "flow_files"] {
            assert!(
                conn.prepare(&format!("SELECT * FROM {table} LIMIT 0")).is_ok(),
                "missing table {table}"
            );
        }
        let threshold: f64 = conn
            .query_row(
                "SELECT value FROM tuning WHERE key = 'auto_reindex_threshold'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(threshold, 10.0);
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }
}
