use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use tracing::info;

use crate::export::Publisher;
use crate::parser::Record;

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id           INTEGER PRIMARY KEY,
            source       TEXT NOT NULL,
            record_count INTEGER NOT NULL DEFAULT 0,
            inserted     INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS posts (
            id         INTEGER PRIMARY KEY,
            run_id     INTEGER NOT NULL REFERENCES runs(id),
            source     TEXT NOT NULL,
            number     INTEGER NOT NULL,
            date       TEXT NOT NULL,
            title      TEXT NOT NULL,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(source, date, title)
        );
        CREATE INDEX IF NOT EXISTS idx_posts_source ON posts(source);
        CREATE INDEX IF NOT EXISTS idx_posts_run ON posts(run_id);
        ",
    )?;
    Ok(())
}

pub struct SaveStats {
    pub run_id: i64,
    pub inserted: usize,
    pub duplicates: usize,
}

/// Store one extraction run. Posts already seen for the same source
/// (same date and title) are skipped.
pub fn save_records(conn: &Connection, source: &str, records: &[Record]) -> Result<SaveStats> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO runs (source, record_count) VALUES (?1, ?2)",
        params![source, records.len() as i64],
    )?;
    let run_id = tx.last_insert_rowid();

    let mut inserted = 0usize;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO posts (run_id, source, number, date, title, content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for r in records {
            inserted += stmt.execute(params![
                run_id,
                source,
                r.number as i64,
                r.date,
                r.title,
                r.content,
            ])?;
        }
    }

    tx.execute(
        "UPDATE runs SET inserted = ?1 WHERE id = ?2",
        params![inserted as i64, run_id],
    )?;
    tx.commit()?;

    let duplicates = records.len() - inserted;
    info!(source, run_id, inserted, duplicates, "saved records");
    Ok(SaveStats {
        run_id,
        inserted,
        duplicates,
    })
}

pub struct StoredPost {
    pub source: String,
    pub number: usize,
    pub date: String,
    pub title: String,
    pub content: String,
    pub created_at: String,
}

/// Most recent posts first.
pub fn fetch_posts(conn: &Connection, source: Option<&str>, limit: usize) -> Result<Vec<StoredPost>> {
    let mut stmt = conn.prepare(
        "SELECT source, number, date, title, content, created_at
         FROM posts
         WHERE ?1 IS NULL OR source = ?1
         ORDER BY run_id DESC, number ASC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![source, limit as i64], |row| {
            Ok(StoredPost {
                source: row.get(0)?,
                number: row.get::<_, i64>(1)? as usize,
                date: row.get(2)?,
                title: row.get(3)?,
                content: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct Stats {
    pub runs: usize,
    pub posts: usize,
    pub by_source: Vec<(String, usize)>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let runs: i64 = conn.query_row("SELECT COUNT(*) FROM runs", [], |r| r.get(0))?;
    let posts: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))?;
    let mut stmt =
        conn.prepare("SELECT source, COUNT(*) FROM posts GROUP BY source ORDER BY source")?;
    let by_source = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stats {
        runs: runs as usize,
        posts: posts as usize,
        by_source,
    })
}

/// Publishes records into the SQLite store.
pub struct DbPublisher<'c> {
    conn: &'c Connection,
}

impl<'c> DbPublisher<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        DbPublisher { conn }
    }
}

impl Publisher for DbPublisher<'_> {
    fn publish(&mut self, source: &str, records: &[Record]) -> Result<usize> {
        Ok(save_records(self.conn, source, records)?.inserted)
    }
}
