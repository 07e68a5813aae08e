// src/db/models/channel.rs

//! Channel model - package index locations known to the build index

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// URL scheme of channels that live on the local filesystem
pub const LOCAL_SCHEME: &str = "file://";

/// A channel (local directory or remote URL) whose index has been read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: Option<i64>,
    /// Channel base URL, always ending in `/`
    pub url: String,
    pub indexed_at: Option<String>,
}

impl Channel {
    pub fn new(url: String) -> Self {
        Self {
            id: None,
            url,
            indexed_at: None,
        }
    }

    /// Whether the channel is backed by the local filesystem
    pub fn is_local(&self) -> bool {
        self.url.starts_with(LOCAL_SCHEME)
    }

    /// Insert this channel into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO channels (url, indexed_at) VALUES (?1, ?2)",
            params![&self.url, &self.indexed_at],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a channel by its URL
    pub fn find_by_url(conn: &Connection, url: &str) -> Result<Option<Self>> {
        let mut stmt =
            conn.prepare("SELECT id, url, indexed_at FROM channels WHERE url = ?1")?;
        let channel = stmt.query_row([url], Self::from_row).optional()?;
        Ok(channel)
    }

    /// Find a channel by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare("SELECT id, url, indexed_at FROM channels WHERE id = ?1")?;
        let channel = stmt.query_row([id], Self::from_row).optional()?;
        Ok(channel)
    }

    /// Return the channel for `url`, creating it on first reference
    pub fn find_or_create(conn: &Connection, url: &str) -> Result<Self> {
        if let Some(existing) = Self::find_by_url(conn, url)? {
            return Ok(existing);
        }
        let mut channel = Self::new(url.to_string());
        channel.insert(conn)?;
        Ok(channel)
    }

    /// List all channels in creation order
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare("SELECT id, url, indexed_at FROM channels ORDER BY id")?;
        let channels = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(channels)
    }

    /// Record that the channel's index was just read
    pub fn touch(conn: &Connection, id: i64) -> Result<()> {
        conn.execute(
            "UPDATE channels SET indexed_at = ?1 WHERE id = ?2",
            params![chrono::Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Delete a channel and (by cascade) its package records
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM channels WHERE id = ?1", [id])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            url: row.get(1)?,
            indexed_at: row.get(2)?,
        })
    }
}
