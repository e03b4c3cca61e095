//! Snippet storage, keyed by model key and identifier.

use super::{Database, now_ms, parse_fields};
use crate::document::Fields;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snippet {
    pub model_key: String,
    pub id: i64,
    pub data: Fields,
    pub updated_at: i64,
}

fn parse_snippet_row(row: &Row) -> rusqlite::Result<Snippet> {
    let data: String = row.get("data")?;
    Ok(Snippet {
        model_key: row.get("model_key")?,
        id: row.get("id")?,
        data: parse_fields(&data),
        updated_at: row.get("updated_at")?,
    })
}

pub fn get_snippet(conn: &Connection, model_key: &str, id: i64) -> Result<Option<Snippet>> {
    let snippet = conn
        .query_row(
            "SELECT model_key, id, data, updated_at FROM snippets WHERE model_key = ?1 AND id = ?2",
            params![model_key, id],
            parse_snippet_row,
        )
        .optional()?;
    Ok(snippet)
}

pub fn list_snippets(conn: &Connection, model_key: &str) -> Result<Vec<Snippet>> {
    let mut stmt = conn.prepare(
        "SELECT model_key, id, data, updated_at FROM snippets WHERE model_key = ?1 ORDER BY id",
    )?;
    let snippets = stmt
        .query_map(params![model_key], parse_snippet_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(snippets)
}

/// Insert or replace the stored data of one snippet.
pub fn upsert_snippet(conn: &Connection, model_key: &str, id: i64, data: &Fields) -> Result<()> {
    conn.execute(
        "INSERT INTO snippets (model_key, id, data, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(model_key, id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        params![model_key, id, serde_json::to_string(data)?, now_ms()],
    )?;
    Ok(())
}

impl Database {
    pub fn get_snippet(&self, model_key: &str, id: i64) -> Result<Option<Snippet>> {
        self.with_conn(|conn| get_snippet(conn, model_key, id))
    }

    pub fn list_snippets(&self, model_key: &str) -> Result<Vec<Snippet>> {
        self.with_conn(|conn| list_snippets(conn, model_key))
    }

    pub fn upsert_snippet(&self, model_key: &str, id: i64, data: &Fields) -> Result<()> {
        self.with_conn(|conn| upsert_snippet(conn, model_key, id, data))
    }
}
