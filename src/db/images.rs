//! Image records. The payload lives in file storage; the row keeps its reference.

use super::{Database, now_ms, parse_fields};
use crate::document::Fields;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image {
    pub id: i64,
    pub title: String,
    /// Storage reference of the image file.
    pub file: Option<String>,
    /// Remaining metadata (dimensions, focal point, ...).
    pub data: Fields,
    pub updated_at: i64,
}

impl Image {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            title: String::new(),
            file: None,
            data: Fields::new(),
            updated_at: 0,
        }
    }
}

fn parse_image_row(row: &Row) -> rusqlite::Result<Image> {
    let data: String = row.get("data")?;
    Ok(Image {
        id: row.get("id")?,
        title: row.get("title")?,
        file: row.get("file")?,
        data: parse_fields(&data),
        updated_at: row.get("updated_at")?,
    })
}

pub fn get_image(conn: &Connection, id: i64) -> Result<Option<Image>> {
    let image = conn
        .query_row(
            "SELECT id, title, file, data, updated_at FROM images WHERE id = ?1",
            params![id],
            parse_image_row,
        )
        .optional()?;
    Ok(image)
}

pub fn list_images(conn: &Connection) -> Result<Vec<Image>> {
    let mut stmt = conn.prepare("SELECT id, title, file, data, updated_at FROM images ORDER BY id")?;
    let images = stmt
        .query_map([], parse_image_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(images)
}

pub fn upsert_image(conn: &Connection, image: &Image) -> Result<()> {
    conn.execute(
        "INSERT INTO images (id, title, file, data, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
             title = excluded.title,
             file = excluded.file,
             data = excluded.data,
             updated_at = excluded.updated_at",
        params![
            image.id,
            image.title,
            image.file,
            serde_json::to_string(&image.data)?,
            now_ms()
        ],
    )?;
    Ok(())
}

impl Database {
    pub fn get_image(&self, id: i64) -> Result<Option<Image>> {
        self.with_conn(|conn| get_image(conn, id))
    }

    pub fn list_images(&self) -> Result<Vec<Image>> {
        self.with_conn(list_images)
    }

    pub fn upsert_image(&self, image: &Image) -> Result<()> {
        self.with_conn(|conn| upsert_image(conn, image))
    }
}
