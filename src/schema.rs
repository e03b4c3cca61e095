//! Model schemas and the per-model field classification table.
//!
//! Each page model declares its fields with a kind tag. Before rewriting, the
//! declared fields are classified once per model into a [`FieldPlan`] listing
//! the foreign-key, rich-text and block-tree fields; plain fields are skipped.

use crate::document::BASE_PAGE_MODEL;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Fields every page model inherits from the base page model.
pub const BASE_PAGE_FIELDS: &[&str] = &[
    "title",
    "slug",
    "live",
    "seo_title",
    "search_description",
    "show_in_menus",
];

/// Schema of one block inside a block-tree field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockSchema {
    /// Text, numbers, choosers for non-page models: no page references.
    Plain,
    /// Rich-text markup.
    RichText,
    /// A page identifier.
    PageChooser,
    /// Named, schema-declared children stored as a mapping.
    Struct {
        #[serde(default)]
        children: Vec<NamedBlock>,
    },
    /// Ordered `(type, value)` pairs; the type tag selects the child schema.
    Stream {
        #[serde(default)]
        children: Vec<NamedBlock>,
    },
    /// Ordered values sharing a single child schema.
    List { child: Box<BlockSchema> },
}

/// A child block declaration: its name (or stream type tag) and schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedBlock {
    pub name: String,
    #[serde(flatten)]
    pub block: BlockSchema,
}

impl NamedBlock {
    pub fn new(name: impl Into<String>, block: BlockSchema) -> Self {
        Self {
            name: name.into(),
            block,
        }
    }
}

impl BlockSchema {
    pub fn stream(children: Vec<NamedBlock>) -> Self {
        BlockSchema::Stream { children }
    }

    pub fn structure(children: Vec<NamedBlock>) -> Self {
        BlockSchema::Struct { children }
    }

    pub fn list(child: BlockSchema) -> Self {
        BlockSchema::List {
            child: Box::new(child),
        }
    }

    /// Look up a declared child of a struct or stream block.
    pub fn child(&self, name: &str) -> Option<&BlockSchema> {
        match self {
            BlockSchema::Struct { children } | BlockSchema::Stream { children } => children
                .iter()
                .find(|c| c.name == name)
                .map(|c| &c.block),
            _ => None,
        }
    }

    /// Short kind name used in messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            BlockSchema::Plain => "plain",
            BlockSchema::RichText => "rich_text",
            BlockSchema::PageChooser => "page_chooser",
            BlockSchema::Struct { .. } => "struct",
            BlockSchema::Stream { .. } => "stream",
            BlockSchema::List { .. } => "list",
        }
    }
}

/// Kind tag of a declared model field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Plain,
    /// Foreign key to a page.
    PageForeignKey {
        #[serde(default = "default_nullable")]
        nullable: bool,
    },
    RichText,
    /// Block-tree content governed by `block`.
    BlockTree { block: BlockSchema },
}

fn default_nullable() -> bool {
    true
}

/// A declared model field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn plain(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Plain)
    }
}

/// Declared fields of one page model (excluding the inherited base fields).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl ModelSchema {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    /// Whether the model declares `name` (including base page fields).
    pub fn declares(&self, name: &str) -> bool {
        BASE_PAGE_FIELDS.contains(&name) || self.fields.iter().any(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Page and snippet models known to the destination, keyed by lower-cased
/// model key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRegistry {
    #[serde(default)]
    models: BTreeMap<String, ModelSchema>,
    #[serde(default)]
    snippets: BTreeSet<String>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        let mut models = BTreeMap::new();
        models.insert(BASE_PAGE_MODEL.to_string(), ModelSchema::default());
        Self {
            models,
            snippets: BTreeSet::new(),
        }
    }
}

impl ModelRegistry {
    /// Registry holding the base page model plus `models`.
    pub fn from_models(models: BTreeMap<String, ModelSchema>) -> Self {
        let mut registry = Self::default();
        for (key, schema) in models {
            registry.register(key, schema);
        }
        registry
    }

    pub fn register(&mut self, key: impl Into<String>, schema: ModelSchema) {
        self.models.insert(key.into().to_lowercase(), schema);
    }

    pub fn get(&self, key: &str) -> Option<&ModelSchema> {
        self.models.get(&key.to_lowercase())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.models.contains_key(&key.to_lowercase())
    }

    pub fn register_snippet(&mut self, key: impl Into<String>) {
        self.snippets.insert(key.into().to_lowercase());
    }

    pub fn has_snippet(&self, key: &str) -> bool {
        self.snippets.contains(&key.to_lowercase())
    }
}

/// Classification of one model's reference-carrying fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldPlan {
    /// Page foreign keys with their nullability.
    pub page_keys: Vec<(String, bool)>,
    pub rich_text: Vec<String>,
    /// Block-tree fields with their schemas.
    pub block_trees: Vec<(String, BlockSchema)>,
}

impl FieldPlan {
    /// Classify every declared field of `schema` exactly once.
    pub fn build(schema: &ModelSchema) -> Self {
        let mut plan = FieldPlan::default();
        for field in &schema.fields {
            match &field.kind {
                FieldKind::Plain => {}
                FieldKind::PageForeignKey { nullable } => {
                    plan.page_keys.push((field.name.clone(), *nullable));
                }
                FieldKind::RichText => plan.rich_text.push(field.name.clone()),
                // walked even without page-carrying blocks, so unknown
                // block types are still reported
                FieldKind::BlockTree { block } => {
                    plan.block_trees.push((field.name.clone(), block.clone()));
                }
            }
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.page_keys.is_empty() && self.rich_text.is_empty() && self.block_trees.is_empty()
    }
}

/// Per-run cache of field plans keyed by model key.
#[derive(Debug, Default)]
pub struct FieldPlanCache {
    plans: HashMap<String, Arc<FieldPlan>>,
}

impl FieldPlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan for `key`, building it on first use. Unknown models yield `None`.
    pub fn plan(&mut self, registry: &ModelRegistry, key: &str) -> Option<Arc<FieldPlan>> {
        if let Some(plan) = self.plans.get(key) {
            return Some(Arc::clone(plan));
        }
        let schema = registry.get(key)?;
        let plan = Arc::new(FieldPlan::build(schema));
        self.plans.insert(key.to_string(), Arc::clone(&plan));
        Some(plan)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_schema() -> BlockSchema {
        BlockSchema::stream(vec![
            NamedBlock::new("heading", BlockSchema::Plain),
            NamedBlock::new("content", BlockSchema::RichText),
            NamedBlock::new("link", BlockSchema::PageChooser),
        ])
    }

    #[test]
    fn test_model_schema_from_yaml() {
        let yaml = r#"
fields:
  - name: link
    kind: page_foreign_key
  - name: owner_page
    kind: page_foreign_key
    nullable: false
  - name: intro
    kind: rich_text
  - name: body
    kind: block_tree
    block:
      kind: stream
      children:
        - name: heading
          kind: plain
        - name: content
          kind: rich_text
        - name: link
          kind: page_chooser
        - name: card
          kind: struct
          children:
            - name: target
              kind: page_chooser
"#;
        let schema: ModelSchema = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(schema.fields.len(), 4);
        assert_eq!(
            schema.fields[0].kind,
            FieldKind::PageForeignKey { nullable: true }
        );
        assert_eq!(
            schema.fields[1].kind,
            FieldKind::PageForeignKey { nullable: false }
        );
        let FieldKind::BlockTree { block } = &schema.fields[3].kind else {
            panic!("body should be a block tree");
        };
        assert_eq!(block.child("link"), Some(&BlockSchema::PageChooser));
        assert_eq!(
            block.child("card").and_then(|c| c.child("target")),
            Some(&BlockSchema::PageChooser)
        );
    }

    #[test]
    fn test_field_plan_classifies_reference_fields() {
        let schema = ModelSchema::new(vec![
            FieldDef::plain("subtitle"),
            FieldDef::new("link", FieldKind::PageForeignKey { nullable: true }),
            FieldDef::new("intro", FieldKind::RichText),
            FieldDef::new("body", FieldKind::BlockTree { block: body_schema() }),
            FieldDef::new(
                "gallery",
                FieldKind::BlockTree {
                    block: BlockSchema::stream(vec![NamedBlock::new("image", BlockSchema::Plain)]),
                },
            ),
        ]);

        let plan = FieldPlan::build(&schema);
        assert_eq!(plan.page_keys, vec![("link".to_string(), true)]);
        assert_eq!(plan.rich_text, vec!["intro".to_string()]);
        let walked: Vec<&str> = plan.block_trees.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(walked, vec!["body", "gallery"]);
    }

    #[test]
    fn test_plan_cache_builds_once_per_model() {
        let mut registry = ModelRegistry::default();
        registry.register(
            "TestApp.TestPage",
            ModelSchema::new(vec![FieldDef::new("intro", FieldKind::RichText)]),
        );

        let mut cache = FieldPlanCache::new();
        let first = cache.plan(&registry, "testapp.testpage").unwrap();
        let second = cache.plan(&registry, "testapp.testpage").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert!(cache.plan(&registry, "missing.model").is_none());
    }

    #[test]
    fn test_declares_includes_base_fields() {
        let schema = ModelSchema::new(vec![FieldDef::plain("subtitle")]);
        assert!(schema.declares("title"));
        assert!(schema.declares("subtitle"));
        assert!(!schema.declares("unknown"));
    }

    #[test]
    fn test_registry_always_has_base_model() {
        let registry = ModelRegistry::from_models(BTreeMap::new());
        assert!(registry.contains(BASE_PAGE_MODEL));
    }

    #[test]
    fn test_snippet_keys_are_case_insensitive() {
        let mut registry = ModelRegistry::default();
        registry.register_snippet("TestApp.TestSnippet");
        assert!(registry.has_snippet("testapp.testsnippet"));
        assert!(!registry.has_snippet("testapp.other"));
    }
}
