//! Versioned schema upgrades, tracked in `PRAGMA user_version`.

use super::schema;
use rusqlite::{Connection, types::Type};

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: [Migration; 2] = [
    Migration {
        version: 1,
        name: "report hierarchy",
        sql: schema::MIGRATION_V1_SQL,
    },
    Migration {
        version: 2,
        name: "per-report test metrics",
        sql: schema::MIGRATION_V2_SQL,
    },
];

/// The store's schema version; `0` for a fresh database.
///
/// # Errors
///
/// Fails if the pragma cannot be read or holds a negative value.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let raw: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(e)))
}

/// Bring the store up to [`LATEST_SCHEMA_VERSION`] and return the version
/// it ends at.
///
/// Each step commits on its own, so an interrupted upgrade resumes from the
/// last completed version.
///
/// # Errors
///
/// Fails if any upgrade step fails; earlier steps stay committed.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let start = current_schema_version(conn)?;
    let pending = MIGRATIONS.iter().filter(|m| m.version > start);

    let mut reached = start;
    for step in pending {
        apply(conn, step)?;
        reached = step.version;
    }
    Ok(reached)
}

fn apply(conn: &mut Connection, step: &Migration) -> rusqlite::Result<()> {
    let version = i64::from(step.version);
    let tx = conn.transaction()?;
    tx.execute_batch(step.sql)?;
    tx.execute("UPDATE store_meta SET schema_version = ?1 WHERE id = 1", [version])?;
    tx.pragma_update(None, "user_version", version)?;
    tx.commit()?;
    tracing::debug!(version = step.version, name = step.name, "schema upgraded");
    Ok(())
}
