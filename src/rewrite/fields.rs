//! Field-level page reference updates.

use super::blocks::rewrite_block_field;
use super::richtext::rewrite_rich_text;
use super::{IdMap, RefContext};
use crate::document::{BASE_PAGE_MODEL, PageRecord, encode_page_id_like, parse_page_id};
use crate::error::Diagnostics;
use crate::schema::{FieldPlan, FieldPlanCache, ModelRegistry};
use serde_json::Value;
use std::collections::HashSet;

/// Remap one page foreign key value.
fn remap_page_key(
    raw: &Value,
    nullable: bool,
    ctx: &RefContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Value {
    if raw.is_null() {
        return Value::Null;
    }
    let id = parse_page_id(raw);
    if let Some(mapped) = id.and_then(|id| ctx.id_map.get(id)) {
        return encode_page_id_like(raw, mapped);
    }

    let shown = id.map_or_else(|| raw.to_string(), |id| id.to_string());
    if nullable {
        diagnostics.warn(format!(
            "{}: field '{}' references page {} which is not part of the import; cleared",
            ctx.host(),
            ctx.field,
            shown
        ));
        Value::Null
    } else {
        diagnostics.error(format!(
            "{}: required field '{}' references page {} which is not part of the import; the reference is left dangling",
            ctx.host(),
            ctx.field,
            shown
        ));
        raw.clone()
    }
}

/// Rewrite every reference-carrying field of `record` listed in `plan`.
///
/// Returns a new record; `record` itself is not modified. Fields absent from
/// the record are skipped.
pub fn update_page_references(
    record: &PageRecord,
    plan: &FieldPlan,
    id_map: &IdMap,
) -> (PageRecord, Diagnostics) {
    let mut updated = record.clone();
    let mut diagnostics = Diagnostics::new();
    if plan.is_empty() {
        return (updated, diagnostics);
    }
    let host = record.pk();

    for (name, nullable) in &plan.page_keys {
        if let Some(raw) = record.content.get(name) {
            let ctx = RefContext::new(host, name, id_map);
            let value = remap_page_key(raw, *nullable, &ctx, &mut diagnostics);
            updated.content.insert(name.clone(), value);
        }
    }

    for name in &plan.rich_text {
        if let Some(Value::String(html)) = record.content.get(name) {
            let ctx = RefContext::new(host, name, id_map);
            let value = rewrite_rich_text(html, &ctx, &mut diagnostics);
            updated.content.insert(name.clone(), Value::String(value));
        }
    }

    for (name, schema) in &plan.block_trees {
        if let Some(raw) = record.content.get(name) {
            let ctx = RefContext::new(host, name, id_map);
            let value = rewrite_block_field(raw, schema, &ctx, &mut diagnostics);
            updated.content.insert(name.clone(), value);
        }
    }

    (updated, diagnostics)
}

/// Rewrite references in every page, classifying each model once.
///
/// Records of a model the registry does not know are rewritten with the base
/// page model's plan, with one warning per unknown model.
pub fn update_all(
    pages: &[PageRecord],
    registry: &ModelRegistry,
    id_map: &IdMap,
) -> (Vec<PageRecord>, Diagnostics) {
    let mut cache = FieldPlanCache::new();
    let mut unknown: HashSet<String> = HashSet::new();
    let mut diagnostics = Diagnostics::new();
    let mut updated = Vec::with_capacity(pages.len());

    for record in pages {
        let key = record.model_key();
        let plan = match cache.plan(registry, &key) {
            Some(plan) => plan,
            None => {
                if unknown.insert(key.clone()) {
                    diagnostics.warn(format!(
                        "Unknown page model '{}'; importing with base page fields only",
                        key
                    ));
                }
                match cache.plan(registry, BASE_PAGE_MODEL) {
                    Some(plan) => plan,
                    None => {
                        updated.push(record.clone());
                        continue;
                    }
                }
            }
        };
        let (record, found) = update_page_references(record, &plan, id_map);
        diagnostics.merge(found);
        updated.push(record);
    }

    (updated, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{BlockSchema, FieldDef, FieldKind, ModelSchema, NamedBlock};
    use serde_json::json;

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::default();
        registry.register(
            "testapp.testpage",
            ModelSchema::new(vec![
                FieldDef::plain("subtitle"),
                FieldDef::new("link", FieldKind::PageForeignKey { nullable: true }),
                FieldDef::new("owner", FieldKind::PageForeignKey { nullable: false }),
                FieldDef::new("intro", FieldKind::RichText),
                FieldDef::new(
                    "body",
                    FieldKind::BlockTree {
                        block: BlockSchema::stream(vec![NamedBlock::new(
                            "link",
                            BlockSchema::PageChooser,
                        )]),
                    },
                ),
            ]),
        );
        registry
    }

    fn page(content: serde_json::Value) -> PageRecord {
        let serde_json::Value::Object(content) = content else {
            panic!("content must be an object");
        };
        PageRecord::new("testapp", "testpage", content)
    }

    fn plan() -> FieldPlan {
        FieldPlan::build(registry().get("testapp.testpage").unwrap())
    }

    #[test]
    fn test_mapped_foreign_key_is_rewritten() {
        let map: IdMap = [(2, 20), (3, 30)].into_iter().collect();
        let record = page(json!({"pk": 3, "path": "00010001", "link": 2, "owner": 2}));

        let (updated, diagnostics) = update_page_references(&record, &plan(), &map);
        assert_eq!(updated.content["link"], json!(20));
        assert_eq!(updated.content["owner"], json!(20));
        assert!(diagnostics.is_empty());
        // input untouched
        assert_eq!(record.content["link"], json!(2));
    }

    #[test]
    fn test_unmapped_nullable_key_is_cleared_with_warning() {
        let map: IdMap = [(3, 3)].into_iter().collect();
        let record = page(json!({"pk": 3, "path": "0001", "link": 99}));

        let (updated, diagnostics) = update_page_references(&record, &plan(), &map);
        assert_eq!(updated.content["link"], serde_json::Value::Null);
        assert_eq!(diagnostics.warnings.len(), 1);
        assert!(diagnostics.errors.is_empty());
        assert!(diagnostics.warnings[0].contains("'link'"));
    }

    #[test]
    fn test_unmapped_required_key_records_error_and_keeps_value() {
        let map: IdMap = [(3, 3)].into_iter().collect();
        let record = page(json!({"pk": 3, "path": "0001", "owner": 99}));

        let (updated, diagnostics) = update_page_references(&record, &plan(), &map);
        assert_eq!(updated.content["owner"], json!(99));
        assert_eq!(diagnostics.errors.len(), 1);
        assert!(diagnostics.errors[0].contains("99"));
    }

    #[test]
    fn test_null_key_is_left_alone() {
        let map = IdMap::default();
        let record = page(json!({"pk": 3, "path": "0001", "link": null, "owner": null}));

        let (updated, diagnostics) = update_page_references(&record, &plan(), &map);
        assert_eq!(updated, record);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_rich_text_and_blocks_are_dispatched() {
        let map: IdMap = [(2, 20)].into_iter().collect();
        let record = page(json!({
            "pk": 3,
            "path": "0001",
            "subtitle": "2",
            "intro": "<p><a linktype=\"page\" id=\"2\">x</a></p>",
            "body": [{"type": "link", "value": 2}]
        }));

        let (updated, diagnostics) = update_page_references(&record, &plan(), &map);
        assert!(diagnostics.is_empty());
        assert_eq!(updated.content["subtitle"], json!("2"));
        assert_eq!(
            updated.content["intro"],
            json!("<p><a linktype=\"page\" id=\"20\">x</a></p>")
        );
        assert_eq!(updated.content["body"], json!([{"type": "link", "value": 20}]));
    }

    #[test]
    fn test_update_all_falls_back_to_base_model() {
        let map: IdMap = [(2, 20)].into_iter().collect();
        let known = page(json!({"pk": 3, "path": "0001", "link": 2}));
        let mut content = serde_json::Map::new();
        content.insert("pk".to_string(), json!(4));
        content.insert("link".to_string(), json!(2));
        let unknown = PageRecord::new("other", "mystery", content);

        let (updated, diagnostics) =
            update_all(&[known, unknown.clone(), unknown], &registry(), &map);
        assert_eq!(updated.len(), 3);
        assert_eq!(updated[0].content["link"], json!(20));
        // base plan has no reference fields
        assert_eq!(updated[1].content["link"], json!(2));
        assert_eq!(diagnostics.warnings.len(), 1);
        assert!(diagnostics.warnings[0].contains("other.mystery"));
    }
}
