//! Import of an interchange document into the destination store.
//!
//! Three phases, always run in this order when selected:
//! - pages: resolve identities, rewrite page references, then update matched
//!   pages and insert the rest under their parent's destination counterpart
//! - snippets: overwrite by (model key, id), merging fields
//! - images: overwrite by id, copying the payload into file storage
//!
//! Each phase runs in one transaction and each record in its own savepoint.
//! A record that cannot be persisted becomes a [`RecordFailure`] and the
//! phase carries on; a failure of the transaction itself aborts the phase.

use super::images::{self, Image};
use super::pages::{self, NewPage, Page};
use super::{Database, snippets};
use crate::document::{BASE_PAGE_MODEL, Bundle, Document, Fields, PageId, PageRecord, parse_page_id};
use crate::error::{Diagnostics, RecordFailure};
use crate::resolve::{Resolution, resolve_identities};
use crate::rewrite::blocks::decode_field;
use crate::rewrite::fields::update_all;
use crate::schema::{FieldKind, ModelRegistry, ModelSchema};
use crate::storage::FileStorage;
use crate::tree;
use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Component, Path};
use tracing::{debug, info, warn};

/// Which phases of an import to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSelection {
    pub pages: bool,
    pub snippets: bool,
    pub images: bool,
}

impl Default for ImportSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl ImportSelection {
    pub fn all() -> Self {
        Self {
            pages: true,
            snippets: true,
            images: true,
        }
    }

    /// Selection from command-line flags; no flag at all selects everything.
    pub fn from_flags(pages: bool, snippets: bool, images: bool) -> Self {
        if !pages && !snippets && !images {
            Self::all()
        } else {
            Self {
                pages,
                snippets,
                images,
            }
        }
    }
}

/// What happened to one persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
}

/// Created/updated counts of one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseCount {
    pub created: usize,
    pub updated: usize,
}

impl PhaseCount {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated
    }

    fn add(&mut self, other: PhaseCount) {
        self.created += other.created;
        self.updated += other.updated;
    }
}

/// Result of an import run (or a dry-run preview).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportResults {
    pub pages: PhaseCount,
    pub snippets: PhaseCount,
    pub images: PhaseCount,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub failures: Vec<String>,
    /// True when nothing was written.
    pub dry_run: bool,
}

impl ImportResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the results of another phase into this one.
    pub fn merge(&mut self, other: ImportResults) {
        self.pages.add(other.pages);
        self.snippets.add(other.snippets);
        self.images.add(other.images);
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
        self.failures.extend(other.failures);
        self.dry_run |= other.dry_run;
    }

    pub fn absorb(&mut self, diagnostics: Diagnostics) {
        self.warnings.extend(diagnostics.warnings);
        self.errors.extend(diagnostics.errors);
        self.failures.extend(diagnostics.failures);
    }

    /// No errors and no failures. Warnings are allowed.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.failures.is_empty()
    }

    /// Succeeded, but something deserves a look.
    pub fn has_caveats(&self) -> bool {
        self.is_success() && !self.warnings.is_empty()
    }
}

/// Identifier field of a snippet or image record.
fn record_id(record: &Fields) -> Option<i64> {
    record.get("id").and_then(parse_page_id)
}

/// Name of an image payload inside the bundle.
fn payload_name(file: &Value) -> Option<&str> {
    match file {
        Value::String(name) => Some(name.as_str()),
        Value::Object(map) => map.get("name").and_then(Value::as_str),
        _ => None,
    }
    .filter(|name| !name.is_empty())
}

/// Page content split into the stored columns.
#[derive(Debug, Default)]
struct PageContent {
    title: Option<String>,
    slug: Option<String>,
    live: Option<bool>,
    fields: Fields,
}

impl PageContent {
    /// Keep only the fields `schema` declares; block-tree values are decoded.
    fn from_record(record: &PageRecord, schema: &ModelSchema) -> Self {
        let mut content = PageContent::default();
        let mut skipped = 0usize;
        for (name, value) in &record.content {
            match name.as_str() {
                "pk" | "path" => {}
                "title" => content.title = value.as_str().map(str::to_string),
                "slug" => content.slug = value.as_str().map(str::to_string),
                "live" => {
                    content.live = value
                        .as_bool()
                        .or_else(|| value.as_i64().map(|n| n != 0));
                }
                _ if !schema.declares(name) => skipped += 1,
                _ => {
                    let value = match schema.field(name).map(|f| &f.kind) {
                        Some(FieldKind::BlockTree { .. }) => {
                            decode_field(value).unwrap_or_else(|| value.clone())
                        }
                        _ => value.clone(),
                    };
                    content.fields.insert(name.clone(), value);
                }
            }
        }
        if skipped > 0 {
            debug!(pk = ?record.pk(), skipped, "Ignored fields not declared on the target model");
        }
        content
    }

    fn apply(self, page: &mut Page) {
        if let Some(title) = self.title {
            page.title = title;
        }
        if let Some(slug) = self.slug {
            page.slug = slug;
        }
        if let Some(live) = self.live {
            page.live = live;
        }
        for (name, value) in self.fields {
            page.fields.insert(name, value);
        }
    }
}

/// Runs import phases against one destination.
pub struct Importer<'a> {
    db: &'a Database,
    registry: &'a ModelRegistry,
    storage: &'a FileStorage,
}

impl<'a> Importer<'a> {
    pub fn new(db: &'a Database, registry: &'a ModelRegistry, storage: &'a FileStorage) -> Self {
        Self {
            db,
            registry,
            storage,
        }
    }

    fn schema_for<'s>(&'s self, model_key: &str, fallback: &'s ModelSchema) -> &'s ModelSchema {
        self.registry
            .get(model_key)
            .or_else(|| self.registry.get(BASE_PAGE_MODEL))
            .unwrap_or(fallback)
    }

    /// Resolve and rewrite the document's pages without touching the store.
    ///
    /// `None` means the import root has no anchor; the failure is already
    /// recorded in `results`.
    fn prepare_pages(
        &self,
        document: &Document,
        results: &mut ImportResults,
    ) -> Result<Option<Vec<PageRecord>>> {
        let paths: Vec<&str> = document.pages.iter().filter_map(PageRecord::path).collect();
        if let Err(index) = tree::check_parent_before_child(paths.iter().copied()) {
            results.warnings.push(format!(
                "Page at path '{}' appears before its parent; it may fail to import",
                paths[index]
            ));
        }

        let index = self.db.tree_index()?;
        let Resolution {
            pages,
            id_map,
            matched,
            diagnostics,
        } = match resolve_identities(&document.pages, &index) {
            Ok(resolution) => resolution,
            Err(err) => {
                warn!(error = %err, "Page import aborted");
                results.failures.push(err.to_string());
                return Ok(None);
            }
        };
        results.absorb(diagnostics);
        debug!(
            pages = pages.len(),
            matched,
            mapped = id_map.len(),
            "Resolved page identities"
        );

        let (pages, diagnostics) = update_all(&pages, self.registry, &id_map);
        results.absorb(diagnostics);
        Ok(Some(pages))
    }

    /// Import all pages of `document`.
    pub fn import_pages(&self, document: &Document) -> Result<ImportResults> {
        let mut results = ImportResults::new();
        if document.pages.is_empty() {
            return Ok(results);
        }
        let Some(pages) = self.prepare_pages(document, &mut results)? else {
            return Ok(results);
        };

        self.db.with_conn_mut(|conn| {
            let mut tx = conn.transaction()?;
            // source path -> destination id of pages persisted in this run
            let mut placed: HashMap<String, PageId> = HashMap::new();
            let mut diagnostics = Diagnostics::new();

            for record in &pages {
                let sp = tx.savepoint()?;
                match self.persist_page(&sp, record, &placed, &mut diagnostics) {
                    Ok((outcome, id)) => {
                        sp.commit()?;
                        results.pages.record(outcome);
                        if let Some(path) = record.path() {
                            placed.insert(path.to_string(), id);
                        }
                    }
                    Err(err) => {
                        drop(sp);
                        let failure = RecordFailure::from_error(record.model_key(), record.pk(), &err);
                        warn!(%failure, "Page not imported");
                        results.failures.push(failure.to_string());
                    }
                }
            }

            tx.commit()?;
            results.absorb(diagnostics);
            Ok(())
        })?;

        info!(
            created = results.pages.created,
            updated = results.pages.updated,
            failed = results.failures.len(),
            "Imported pages"
        );
        Ok(results)
    }

    fn persist_page(
        &self,
        conn: &Connection,
        record: &PageRecord,
        placed: &HashMap<String, PageId>,
        diagnostics: &mut Diagnostics,
    ) -> Result<(Outcome, PageId)> {
        let id = record.pk().ok_or_else(|| anyhow!("record has no pk"))?;
        let path = record
            .path()
            .ok_or_else(|| anyhow!("record has no tree path"))?;
        let fallback = ModelSchema::default();

        if let Some(mut existing) = pages::get_page(conn, id)? {
            let existing_key = existing.model_key();
            let key = record.model_key();
            if existing_key != key {
                diagnostics.warn(format!(
                    "Page {}: destination page is a '{}' but the import has '{}'; keeping '{}'",
                    id, existing_key, key, existing_key
                ));
            }
            if existing.path != path {
                diagnostics.warn(format!(
                    "Page {}: identifier is already used by the destination page at '{}'; it is updated with the content from '{}'",
                    id, existing.path, path
                ));
            }
            let schema = self.schema_for(&existing_key, &fallback);
            PageContent::from_record(record, schema).apply(&mut existing);
            pages::update_page(conn, &existing)?;
            return Ok((Outcome::Updated, existing.id));
        }

        let parent_path = tree::parent_path(path)
            .ok_or_else(|| anyhow!("top-level page at '{}' has no parent to attach to", path))?;
        let parent_id = match placed.get(parent_path) {
            Some(parent_id) => *parent_id,
            None => pages::page_by_path(conn, parent_path)?
                .map(|parent| parent.id)
                .ok_or_else(|| anyhow!("parent page at '{}' is not in the destination", parent_path))?,
        };

        let key = record.model_key();
        let mut new_page = if self.registry.contains(&key) && key != BASE_PAGE_MODEL {
            NewPage::new(&record.app_label, &record.model, record.title())
        } else {
            NewPage::base(record.title())
        };
        new_page.id = Some(id);
        let content = PageContent::from_record(record, self.schema_for(&key, &fallback));
        new_page.slug = content.slug.unwrap_or_default();
        new_page.live = content.live.unwrap_or(true);
        new_page.fields = content.fields;

        let page = pages::add_child(conn, parent_id, &new_page)?;
        debug!(id = page.id, path = %page.path, source_path = path, "Inserted page");
        Ok((Outcome::Created, page.id))
    }

    /// Report what [`Importer::import_pages`] would do, without writing.
    pub fn preview_pages(&self, document: &Document) -> Result<ImportResults> {
        let mut results = ImportResults {
            dry_run: true,
            ..ImportResults::default()
        };
        if document.pages.is_empty() {
            return Ok(results);
        }
        let Some(pages) = self.prepare_pages(document, &mut results)? else {
            return Ok(results);
        };

        for record in &pages {
            let Some(id) = record.pk() else {
                results.failures.push(
                    RecordFailure::new(record.model_key(), None, "record has no pk").to_string(),
                );
                continue;
            };
            let outcome = match self.db.get_page(id)? {
                Some(_) => Outcome::Updated,
                None => Outcome::Created,
            };
            results.pages.record(outcome);
        }
        Ok(results)
    }

    /// Import all snippets of `document`.
    pub fn import_snippets(&self, document: &Document) -> Result<ImportResults> {
        let mut results = ImportResults::new();
        if document.snippets.is_empty() {
            return Ok(results);
        }

        self.db.with_conn_mut(|conn| {
            let mut tx = conn.transaction()?;
            for (key, records) in &document.snippets {
                let key = key.to_lowercase();
                if !self.registry.has_snippet(&key) {
                    warn!(model = %key, records = records.len(), "Unknown snippet model");
                    results.failures.push(format!(
                        "Unknown snippet model '{}'; {} records skipped",
                        key,
                        records.len()
                    ));
                    continue;
                }

                for record in records {
                    let id = record_id(record);
                    let sp = tx.savepoint()?;
                    match persist_snippet(&sp, &key, id, record) {
                        Ok(outcome) => {
                            sp.commit()?;
                            results.snippets.record(outcome);
                        }
                        Err(err) => {
                            drop(sp);
                            let failure = RecordFailure::from_error(key.as_str(), id, &err);
                            warn!(%failure, "Snippet not imported");
                            results.failures.push(failure.to_string());
                        }
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })?;

        info!(
            created = results.snippets.created,
            updated = results.snippets.updated,
            "Imported snippets"
        );
        Ok(results)
    }

    /// Import all images of `document`, reading payloads from `base_dir`.
    pub fn import_images(&self, document: &Document, base_dir: &Path) -> Result<ImportResults> {
        let mut results = ImportResults::new();
        if document.images.is_empty() {
            return Ok(results);
        }

        let mut stored: Vec<String> = Vec::new();
        let mut replaced: Vec<String> = Vec::new();
        let outcome = self.db.with_conn_mut(|conn| {
            let mut tx = conn.transaction()?;
            for record in &document.images {
                let id = record_id(record);
                let sp = tx.savepoint()?;
                match self.persist_image(&sp, id, record, base_dir) {
                    Ok(staged) => {
                        sp.commit()?;
                        results.images.record(staged.outcome);
                        stored.extend(staged.stored);
                        replaced.extend(staged.replaced);
                    }
                    Err(err) => {
                        drop(sp);
                        let failure = RecordFailure::from_error("image", id, &err);
                        warn!(%failure, "Image not imported");
                        results.failures.push(failure.to_string());
                    }
                }
            }
            tx.commit()?;
            Ok(())
        });

        if let Err(err) = outcome {
            for reference in &stored {
                self.discard(reference);
            }
            return Err(err);
        }
        for reference in &replaced {
            if let Err(err) = self.storage.delete(reference) {
                results
                    .warnings
                    .push(format!("Could not delete replaced image file {}: {:#}", reference, err));
            }
        }

        info!(
            created = results.images.created,
            updated = results.images.updated,
            "Imported images"
        );
        Ok(results)
    }

    fn discard(&self, reference: &str) {
        if let Err(err) = self.storage.delete(reference) {
            warn!(reference, error = %err, "Could not remove stored file");
        }
    }

    fn persist_image(
        &self,
        conn: &Connection,
        id: Option<i64>,
        record: &Fields,
        base_dir: &Path,
    ) -> Result<StagedImage> {
        let id = id.ok_or_else(|| anyhow!("record has no id"))?;
        let existing = images::get_image(conn, id)?;
        let outcome = if existing.is_some() {
            Outcome::Updated
        } else {
            Outcome::Created
        };
        let mut image = existing.unwrap_or_else(|| Image::new(id));
        let previous = image.file.clone();

        for (name, value) in record {
            match name.as_str() {
                "id" | "file" => {}
                _ if value.is_null() => {}
                "title" => {
                    if let Some(title) = value.as_str() {
                        image.title = title.to_string();
                    }
                }
                _ => {
                    image.data.insert(name.clone(), value.clone());
                }
            }
        }

        let mut stored = None;
        if let Some(name) = record.get("file").and_then(payload_name) {
            let relative = Path::new(name);
            if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
                return Err(anyhow!("unsafe image file name '{}'", name));
            }
            let source = base_dir.join(relative);
            let bytes = std::fs::read(&source)
                .with_context(|| format!("Failed to read image file {}", source.display()))?;
            let reference = self.storage.store(name, &bytes)?;
            image.file = Some(reference.clone());
            stored = Some(reference);
        }

        if let Err(err) = images::upsert_image(conn, &image) {
            if let Some(reference) = &stored {
                self.discard(reference);
            }
            return Err(err);
        }

        let replaced = match (&stored, previous) {
            (Some(_), Some(previous)) => Some(previous),
            _ => None,
        };
        Ok(StagedImage {
            outcome,
            stored,
            replaced,
        })
    }

    /// Run the selected phases (pages, snippets, images) over a bundle.
    pub fn import_bundle(&self, bundle: &Bundle, selection: ImportSelection) -> Result<ImportResults> {
        let document = bundle.document();
        let mut results = ImportResults::new();
        if selection.pages {
            results.merge(self.import_pages(document)?);
        }
        if selection.snippets {
            results.merge(self.import_snippets(document)?);
        }
        if selection.images {
            results.merge(self.import_images(document, bundle.base_dir())?);
        }
        Ok(results)
    }
}

/// A persisted image plus the file bookkeeping left for after commit.
struct StagedImage {
    outcome: Outcome,
    stored: Option<String>,
    replaced: Option<String>,
}

fn persist_snippet(conn: &Connection, model_key: &str, id: Option<i64>, record: &Fields) -> Result<Outcome> {
    let id = id.ok_or_else(|| anyhow!("record has no id"))?;
    let existing = snippets::get_snippet(conn, model_key, id)?;
    let outcome = if existing.is_some() {
        Outcome::Updated
    } else {
        Outcome::Created
    };

    let mut data = existing.map(|snippet| snippet.data).unwrap_or_default();
    for (name, value) in record {
        if name != "id" {
            data.insert(name.clone(), value.clone());
        }
    }
    snippets::upsert_snippet(conn, model_key, id, &data)?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_selection_without_flags_is_everything() {
        assert_eq!(ImportSelection::from_flags(false, false, false), ImportSelection::all());
        let only_pages = ImportSelection::from_flags(true, false, false);
        assert!(only_pages.pages);
        assert!(!only_pages.snippets);
        assert!(!only_pages.images);
    }

    #[test]
    fn test_results_merge_and_status() {
        let mut first = ImportResults::new();
        first.pages.record(Outcome::Created);
        first.warnings.push("w".to_string());
        assert!(first.is_success());
        assert!(first.has_caveats());

        let mut second = ImportResults::new();
        second.pages.record(Outcome::Updated);
        second.failures.push("f".to_string());

        first.merge(second);
        assert_eq!(first.pages.total(), 2);
        assert!(!first.is_success());
        assert!(!first.has_caveats());
    }

    #[test]
    fn test_payload_name_accepts_both_forms() {
        assert_eq!(payload_name(&json!("a.png")), Some("a.png"));
        assert_eq!(payload_name(&json!({"name": "b.png"})), Some("b.png"));
        assert_eq!(payload_name(&json!({"name": ""})), None);
        assert_eq!(payload_name(&json!(null)), None);
    }

    #[test]
    fn test_page_content_keeps_declared_fields_only() {
        let schema: ModelSchema = serde_yaml::from_str(
            "fields:\n  - name: body\n    kind: block_tree\n    block: {kind: stream, children: []}\n",
        )
        .unwrap();
        let record = PageRecord::new(
            "testapp",
            "testpage",
            json!({
                "pk": 3,
                "path": "0001",
                "title": "T",
                "live": 0,
                "seo_title": "S",
                "url_path": "/x/",
                "body": "[{\"type\": \"heading\", \"value\": \"h\"}]"
            })
            .as_object()
            .cloned()
            .unwrap(),
        );

        let content = PageContent::from_record(&record, &schema);
        assert_eq!(content.title.as_deref(), Some("T"));
        assert_eq!(content.live, Some(false));
        assert_eq!(content.fields.get("seo_title"), Some(&json!("S")));
        assert!(!content.fields.contains_key("url_path"));
        assert_eq!(
            content.fields["body"],
            json!([{"type": "heading", "value": "h"}])
        );
    }
}
