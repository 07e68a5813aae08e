// src/db/mod.rs

//! SQLite storage for the build index

pub mod models;
pub mod schema;

use crate::error::{Error, Result};
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Open (creating if needed) the database at `path` and bring its schema
/// up to date
pub fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::InitError(format!(
                    "Failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }

    debug!("Opening build index at {}", path.display());
    let conn = Connection::open(path)?;
    configure(&conn)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Open a private in-memory database (tests, dry runs)
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_parent_and_enables_foreign_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("linux-64").join("cache-db.sqlite");

        let conn = open(&path).unwrap();
        assert!(path.exists());

        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
        assert_eq!(schema::get_schema_version(&conn).unwrap(), schema::SCHEMA_VERSION);
    }
}
