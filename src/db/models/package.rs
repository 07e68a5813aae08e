// src/db/models/package.rs

//! PackageRecord model - one built artifact listed in one channel

use crate::error::{Error, Result};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};

const COLUMNS: &str = "id, name, version, build_number, recipe_hash, filename, channel_id";

/// A (name, version, build number) listed by a channel, with the hash of
/// the recipe it was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub id: Option<i64>,
    pub name: String,
    pub version: String,
    pub build_number: i64,
    pub recipe_hash: String,
    /// Artifact file name inside the channel's platform directory
    pub filename: Option<String>,
    pub channel_id: i64,
}

impl PackageRecord {
    pub fn new(
        channel_id: i64,
        name: String,
        version: String,
        build_number: i64,
        recipe_hash: String,
    ) -> Self {
        Self {
            id: None,
            name,
            version,
            build_number,
            recipe_hash,
            filename: None,
            channel_id,
        }
    }

    /// The identity of the artifact, independent of which channel lists it
    pub fn key(&self) -> (&str, &str, i64) {
        (&self.name, &self.version, self.build_number)
    }

    /// Insert this record
    ///
    /// A second record with the same (name, version, build number) in the
    /// same channel is rejected with [`Error::ConstraintViolation`].
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        let inserted = conn.execute(
            "INSERT INTO packages (name, version, build_number, recipe_hash, filename, channel_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &self.name,
                &self.version,
                self.build_number,
                &self.recipe_hash,
                &self.filename,
                self.channel_id,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, msg))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                return Err(Error::ConstraintViolation(format!(
                    "{}-{}-{} in channel {}: {}",
                    self.name,
                    self.version,
                    self.build_number,
                    self.channel_id,
                    msg.unwrap_or_else(|| e.to_string())
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Build number of the first record whose recipe hash matches
    pub fn find_build_number(
        conn: &Connection,
        name: &str,
        version: &str,
        recipe_hash: &str,
    ) -> Result<Option<i64>> {
        let build_number = conn
            .query_row(
                "SELECT build_number FROM packages
                 WHERE name = ?1 AND version = ?2 AND recipe_hash = ?3
                 ORDER BY build_number LIMIT 1",
                params![name, version, recipe_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(build_number)
    }

    /// Highest build number of (name, version) across all channels
    pub fn max_build_number(conn: &Connection, name: &str, version: &str) -> Result<Option<i64>> {
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(build_number) FROM packages WHERE name = ?1 AND version = ?2",
            params![name, version],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    /// Any record of (name, version, build number), in whichever channel
    pub fn find_by_key(
        conn: &Connection,
        name: &str,
        version: &str,
        build_number: i64,
    ) -> Result<Option<Self>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM packages
             WHERE name = ?1 AND version = ?2 AND build_number = ?3
             ORDER BY id LIMIT 1"
        );
        let record = conn
            .query_row(&sql, params![name, version, build_number], Self::from_row)
            .optional()?;
        Ok(record)
    }

    /// All records of a channel
    pub fn list_by_channel(conn: &Connection, channel_id: i64) -> Result<Vec<Self>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM packages WHERE channel_id = ?1
             ORDER BY name, version, build_number"
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map([channel_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Every record in the index
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM packages ORDER BY channel_id, name, version, build_number"
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Delete a record by ID
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM packages WHERE id = ?1", [id])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            version: row.get(2)?,
            build_number: row.get(3)?,
            recipe_hash: row.get(4)?,
            filename: row.get(5)?,
            channel_id: row.get(6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Channel;
    use crate::db::schema;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    fn record(channel_id: i64, build_number: i64, hash: &str) -> PackageRecord {
        PackageRecord::new(
            channel_id,
            "lsst-foo".to_string(),
            "1.2.0.3".to_string(),
            build_number,
            hash.to_string(),
        )
    }

    #[test]
    fn test_insert_and_query() {
        let (_temp, conn) = create_test_db();
        let channel = Channel::find_or_create(&conn, "file:///bld/").unwrap();
        let cid = channel.id.unwrap();

        assert_eq!(PackageRecord::max_build_number(&conn, "lsst-foo", "1.2.0.3").unwrap(), None);

        let mut a = record(cid, 0, "aaa");
        a.filename = Some("lsst-foo-1.2.0.3-abc_0.tar.bz2".to_string());
        a.insert(&conn).unwrap();
        record(cid, 2, "bbb").insert(&conn).unwrap();

        assert_eq!(PackageRecord::max_build_number(&conn, "lsst-foo", "1.2.0.3").unwrap(), Some(2));
        assert_eq!(
            PackageRecord::find_build_number(&conn, "lsst-foo", "1.2.0.3", "bbb").unwrap(),
            Some(2)
        );
        assert_eq!(
            PackageRecord::find_build_number(&conn, "lsst-foo", "1.2.0.3", "ccc").unwrap(),
            None
        );

        let found = PackageRecord::find_by_key(&conn, "lsst-foo", "1.2.0.3", 0)
            .unwrap()
            .unwrap();
        assert_eq!(found.recipe_hash, "aaa");
        assert_eq!(found.filename.as_deref(), Some("lsst-foo-1.2.0.3-abc_0.tar.bz2"));
        assert_eq!(PackageRecord::list_by_channel(&conn, cid).unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_key_in_channel_rejected() {
        let (_temp, conn) = create_test_db();
        let a = Channel::find_or_create(&conn, "file:///bld/").unwrap().id.unwrap();
        let b = Channel::find_or_create(&conn, "https://example.org/c/").unwrap().id.unwrap();

        record(a, 0, "aaa").insert(&conn).unwrap();
        let err = record(a, 0, "other").insert(&conn).unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(_)));

        // Same key in another channel is a mirror, not a conflict
        record(b, 0, "aaa").insert(&conn).unwrap();
        assert_eq!(PackageRecord::list_all(&conn).unwrap().len(), 2);
    }

    #[test]
    fn test_channel_delete_cascades() {
        let (_temp, conn) = create_test_db();
        let cid = Channel::find_or_create(&conn, "file:///bld/").unwrap().id.unwrap();
        record(cid, 0, "aaa").insert(&conn).unwrap();

        Channel::delete(&conn, cid).unwrap();
        assert!(PackageRecord::list_all(&conn).unwrap().is_empty());
    }
}
