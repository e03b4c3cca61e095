//! Page tree storage and tree insertion.

use super::{Database, now_ms, parse_fields};
use crate::document::{BASE_PAGE_MODEL, Fields, PageId};
use crate::resolve::TreeIndex;
use crate::tree;
use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

/// A page stored in the destination tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub id: PageId,
    pub path: String,
    pub depth: i64,
    pub numchild: i64,
    pub app_label: String,
    pub model: String,
    pub title: String,
    pub slug: String,
    pub live: bool,
    /// Model-specific field values.
    pub fields: Fields,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Page {
    pub fn model_key(&self) -> String {
        format!(
            "{}.{}",
            self.app_label.to_lowercase(),
            self.model.to_lowercase()
        )
    }
}

/// Values for a page about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPage {
    /// Explicit identifier; `None` lets the store assign one.
    pub id: Option<PageId>,
    pub app_label: String,
    pub model: String,
    pub title: String,
    pub slug: String,
    pub live: bool,
    pub fields: Fields,
}

impl NewPage {
    pub fn new(app_label: impl Into<String>, model: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: None,
            app_label: app_label.into(),
            model: model.into(),
            title: title.into(),
            slug: String::new(),
            live: true,
            fields: Fields::new(),
        }
    }

    /// A base page with the given title.
    pub fn base(title: impl Into<String>) -> Self {
        let (app_label, model) = BASE_PAGE_MODEL.split_once('.').unwrap_or(("wagtailcore", "page"));
        Self::new(app_label, model, title)
    }

    pub fn with_id(mut self, id: PageId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = slug.into();
        self
    }
}

pub fn parse_page_row(row: &Row) -> rusqlite::Result<Page> {
    let fields_json: String = row.get("fields")?;
    Ok(Page {
        id: row.get("id")?,
        path: row.get("path")?,
        depth: row.get("depth")?,
        numchild: row.get("numchild")?,
        app_label: row.get("app_label")?,
        model: row.get("model")?,
        title: row.get("title")?,
        slug: row.get("slug")?,
        live: row.get::<_, i64>("live")? != 0,
        fields: parse_fields(&fields_json),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const PAGE_COLUMNS: &str =
    "id, path, depth, numchild, app_label, model, title, slug, live, fields, created_at, updated_at";

/// Path -> id for every page in the tree.
pub fn tree_index(conn: &Connection) -> Result<TreeIndex> {
    let mut stmt = conn.prepare("SELECT path, id FROM pages")?;
    let index = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, PageId>(1)?)))?
        .collect::<rusqlite::Result<TreeIndex>>()?;
    Ok(index)
}

pub fn get_page(conn: &Connection, id: PageId) -> Result<Option<Page>> {
    let sql = format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS);
    let page = conn
        .query_row(&sql, params![id], parse_page_row)
        .optional()?;
    Ok(page)
}

pub fn page_by_path(conn: &Connection, path: &str) -> Result<Option<Page>> {
    let sql = format!("SELECT {} FROM pages WHERE path = ?1", PAGE_COLUMNS);
    let page = conn
        .query_row(&sql, params![path], parse_page_row)
        .optional()?;
    Ok(page)
}

/// All pages in tree order.
pub fn list_pages(conn: &Connection) -> Result<Vec<Page>> {
    let sql = format!("SELECT {} FROM pages ORDER BY path", PAGE_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let pages = stmt
        .query_map([], parse_page_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(pages)
}

/// Path for the next child under `parent` (empty for a top-level page).
fn next_child_path(conn: &Connection, parent: &str) -> Result<String> {
    let depth = (tree::depth(parent) + 1) as i64;
    let last: Option<String> = conn
        .query_row(
            "SELECT path FROM pages WHERE depth = ?1 AND substr(path, 1, ?2) = ?3
             ORDER BY path DESC LIMIT 1",
            params![depth, parent.len() as i64, parent],
            |row| row.get(0),
        )
        .optional()?;

    let position = match last {
        Some(path) => tree::last_position(&path)
            .ok_or_else(|| anyhow!("Malformed tree path '{}'", path))?
            + 1,
        None => 1,
    };
    tree::child_path(parent, position)
        .ok_or_else(|| anyhow!("No free sibling position under '{}'", parent))
}

fn insert_at(conn: &Connection, path: &str, page: &NewPage) -> Result<Page> {
    let now = now_ms();
    let fields = serde_json::to_string(&page.fields)?;
    conn.execute(
        "INSERT INTO pages (id, path, depth, numchild, app_label, model, title, slug, live, fields, created_at, updated_at)
         VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            page.id,
            path,
            tree::depth(path) as i64,
            page.app_label,
            page.model,
            page.title,
            page.slug,
            page.live as i64,
            fields,
            now,
        ],
    )
    .with_context(|| match page.id {
        Some(id) => format!("Failed to insert page {} at '{}'", id, path),
        None => format!("Failed to insert page at '{}'", path),
    })?;

    let id = conn.last_insert_rowid();
    get_page(conn, id)?.ok_or_else(|| anyhow!("Page {} vanished after insert", id))
}

/// Insert a new top-level page.
pub fn create_root_page(conn: &Connection, page: &NewPage) -> Result<Page> {
    let path = next_child_path(conn, "")?;
    insert_at(conn, &path, page)
}

/// Insert `page` as the last child of `parent_id`.
pub fn add_child(conn: &Connection, parent_id: PageId, page: &NewPage) -> Result<Page> {
    let parent = get_page(conn, parent_id)?
        .ok_or_else(|| anyhow!("Parent page {} not found", parent_id))?;
    let path = next_child_path(conn, &parent.path)?;
    let child = insert_at(conn, &path, page)?;
    conn.execute(
        "UPDATE pages SET numchild = numchild + 1, updated_at = ?2 WHERE id = ?1",
        params![parent.id, now_ms()],
    )?;
    Ok(child)
}

/// Write the content columns of an existing page. Tree position and model
/// are never changed.
pub fn update_page(conn: &Connection, page: &Page) -> Result<()> {
    let fields = serde_json::to_string(&page.fields)?;
    let updated = conn.execute(
        "UPDATE pages SET title = ?2, slug = ?3, live = ?4, fields = ?5, updated_at = ?6
         WHERE id = ?1",
        params![
            page.id,
            page.title,
            page.slug,
            page.live as i64,
            fields,
            now_ms()
        ],
    )?;
    if updated == 0 {
        return Err(anyhow!("Page {} not found", page.id));
    }
    Ok(())
}

impl Database {
    pub fn tree_index(&self) -> Result<TreeIndex> {
        self.with_conn(tree_index)
    }

    pub fn get_page(&self, id: PageId) -> Result<Option<Page>> {
        self.with_conn(|conn| get_page(conn, id))
    }

    pub fn page_by_path(&self, path: &str) -> Result<Option<Page>> {
        self.with_conn(|conn| page_by_path(conn, path))
    }

    pub fn list_pages(&self) -> Result<Vec<Page>> {
        self.with_conn(list_pages)
    }

    pub fn create_root_page(&self, page: &NewPage) -> Result<Page> {
        self.with_conn(|conn| create_root_page(conn, page))
    }

    pub fn add_child(&self, parent_id: PageId, page: &NewPage) -> Result<Page> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let child = add_child(&tx, parent_id, page)?;
            tx.commit()?;
            Ok(child)
        })
    }

    pub fn update_page(&self, page: &Page) -> Result<()> {
        self.with_conn(|conn| update_page(conn, page))
    }
}
