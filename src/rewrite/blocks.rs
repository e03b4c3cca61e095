//! Page references inside block-tree content.
//!
//! A block-tree value is walked in lockstep with its [`BlockSchema`]; the
//! schema alone decides how each node is interpreted.

use super::RefContext;
use super::richtext::rewrite_rich_text;
use crate::document::{Fields, encode_page_id_like, parse_page_id};
use crate::error::Diagnostics;
use crate::schema::BlockSchema;
use serde_json::Value;

/// One node of a block tree.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockValue {
    /// A leaf, or any value whose shape did not match its schema.
    Atomic(Value),
    /// Named children in source order.
    Struct(Vec<(String, BlockValue)>),
    /// Stream items in source order.
    Stream(Vec<StreamItem>),
    List(Vec<BlockValue>),
}

/// One entry of a stream array.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Block(StreamChild),
    /// An entry that is not a `{"type": ..., "value": ...}` mapping, kept as is.
    Malformed(Value),
}

impl StreamItem {
    fn parse(item: &Value, stream: &BlockSchema) -> Self {
        match StreamChild::parse(item, stream) {
            Some(child) => StreamItem::Block(child),
            None => StreamItem::Malformed(item.clone()),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            StreamItem::Block(child) => child.to_json(),
            StreamItem::Malformed(raw) => raw.clone(),
        }
    }
}

/// One `(type, value)` pair of a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChild {
    pub block_type: String,
    pub value: BlockValue,
    /// Remaining keys of the item (e.g. `id`), kept verbatim.
    pub extra: Fields,
}

impl BlockValue {
    /// Parse `value` as governed by `schema`.
    ///
    /// Children the schema does not declare, and values whose JSON shape does
    /// not fit the schema kind, are kept as [`BlockValue::Atomic`].
    pub fn parse(value: &Value, schema: &BlockSchema) -> Self {
        match (schema, value) {
            (BlockSchema::Struct { .. }, Value::Object(map)) => BlockValue::Struct(
                map.iter()
                    .map(|(name, child)| {
                        let parsed = match schema.child(name) {
                            Some(child_schema) => BlockValue::parse(child, child_schema),
                            None => BlockValue::Atomic(child.clone()),
                        };
                        (name.clone(), parsed)
                    })
                    .collect(),
            ),
            (BlockSchema::Stream { .. }, Value::Array(items)) => BlockValue::Stream(
                items
                    .iter()
                    .map(|item| StreamItem::parse(item, schema))
                    .collect(),
            ),
            (BlockSchema::List { child }, Value::Array(items)) => {
                BlockValue::List(items.iter().map(|item| BlockValue::parse(item, child)).collect())
            }
            _ => BlockValue::Atomic(value.clone()),
        }
    }

    /// Serialize back to the JSON shape it was parsed from.
    pub fn to_json(&self) -> Value {
        match self {
            BlockValue::Atomic(value) => value.clone(),
            BlockValue::Struct(children) => Value::Object(
                children
                    .iter()
                    .map(|(name, child)| (name.clone(), child.to_json()))
                    .collect(),
            ),
            BlockValue::Stream(items) => {
                Value::Array(items.iter().map(StreamItem::to_json).collect())
            }
            BlockValue::List(items) => Value::Array(items.iter().map(BlockValue::to_json).collect()),
        }
    }
}

impl StreamChild {
    /// Parse a `{"type": ..., "value": ...}` item; `None` if it is not one.
    fn parse(item: &Value, stream: &BlockSchema) -> Option<Self> {
        let object = item.as_object()?;
        let block_type = object.get("type")?.as_str()?.to_string();
        let raw = object.get("value").cloned().unwrap_or(Value::Null);
        let value = match stream.child(&block_type) {
            Some(child_schema) => BlockValue::parse(&raw, child_schema),
            None => BlockValue::Atomic(raw),
        };
        let extra = object
            .iter()
            .filter(|(key, _)| key.as_str() != "type" && key.as_str() != "value")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Some(Self {
            block_type,
            value,
            extra,
        })
    }

    fn to_json(&self) -> Value {
        let mut object = Fields::new();
        object.insert("type".to_string(), Value::String(self.block_type.clone()));
        object.insert("value".to_string(), self.value.to_json());
        for (key, value) in &self.extra {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

fn shape_mismatch(raw: &Value, schema: &BlockSchema, ctx: &RefContext<'_>, diagnostics: &mut Diagnostics) {
    diagnostics.warn(format!(
        "{}: field '{}' holds a {} where a {} block was expected; left unchanged",
        ctx.host(),
        ctx.field,
        json_kind(raw),
        schema.kind_name()
    ));
}

fn remap_page_chooser(raw: Value, ctx: &RefContext<'_>, diagnostics: &mut Diagnostics) -> Value {
    if raw.is_null() {
        return raw;
    }
    let Some(id) = parse_page_id(&raw) else {
        shape_mismatch(&raw, &BlockSchema::PageChooser, ctx, diagnostics);
        return raw;
    };
    match ctx.id_map.get(id) {
        Some(mapped) => encode_page_id_like(&raw, mapped),
        None => {
            diagnostics.warn(format!(
                "{}: block in field '{}' references page {} which is not part of the import",
                ctx.host(),
                ctx.field,
                id
            ));
            raw
        }
    }
}

/// Remap every page reference in `value`, recursing with the same context.
pub fn rewrite_block(
    value: BlockValue,
    schema: &BlockSchema,
    ctx: &RefContext<'_>,
    diagnostics: &mut Diagnostics,
) -> BlockValue {
    match (schema, value) {
        (BlockSchema::Plain, value) => value,
        (BlockSchema::PageChooser, BlockValue::Atomic(raw)) => {
            BlockValue::Atomic(remap_page_chooser(raw, ctx, diagnostics))
        }
        (BlockSchema::RichText, BlockValue::Atomic(Value::String(html))) => BlockValue::Atomic(
            Value::String(rewrite_rich_text(&html, ctx, diagnostics)),
        ),
        (BlockSchema::Struct { .. }, BlockValue::Struct(children)) => BlockValue::Struct(
            children
                .into_iter()
                .map(|(name, child)| {
                    let child = match schema.child(&name) {
                        Some(child_schema) => rewrite_block(child, child_schema, ctx, diagnostics),
                        None => {
                            diagnostics.warn(format!(
                                "{}: unknown child block '{}' in field '{}'; left unchanged",
                                ctx.host(),
                                name,
                                ctx.field
                            ));
                            child
                        }
                    };
                    (name, child)
                })
                .collect(),
        ),
        (BlockSchema::Stream { .. }, BlockValue::Stream(items)) => BlockValue::Stream(
            items
                .into_iter()
                .enumerate()
                .map(|(position, item)| match item {
                    StreamItem::Block(mut child) => {
                        match schema.child(&child.block_type) {
                            Some(child_schema) => {
                                child.value =
                                    rewrite_block(child.value, child_schema, ctx, diagnostics);
                            }
                            None => diagnostics.warn(format!(
                                "{}: unknown block type '{}' in field '{}'; left unchanged",
                                ctx.host(),
                                child.block_type,
                                ctx.field
                            )),
                        }
                        StreamItem::Block(child)
                    }
                    StreamItem::Malformed(raw) => {
                        diagnostics.warn(format!(
                            "{}: item {} of field '{}' holds a {} where a typed block was expected; left unchanged",
                            ctx.host(),
                            position,
                            ctx.field,
                            json_kind(&raw)
                        ));
                        StreamItem::Malformed(raw)
                    }
                })
                .collect(),
        ),
        (BlockSchema::List { child }, BlockValue::List(items)) => BlockValue::List(
            items
                .into_iter()
                .map(|item| rewrite_block(item, child, ctx, diagnostics))
                .collect(),
        ),
        (_, BlockValue::Atomic(raw)) => {
            if !raw.is_null() {
                shape_mismatch(&raw, schema, ctx, diagnostics);
            }
            BlockValue::Atomic(raw)
        }
        // parse() only builds composite values for matching schema kinds
        (_, value) => value,
    }
}

/// Decode a stored block-tree field into its JSON tree.
///
/// Fields arrive either as serialized JSON text or inline; `None` means the
/// text is not valid JSON.
pub fn decode_field(raw: &Value) -> Option<Value> {
    match raw {
        Value::String(text) if text.trim().is_empty() => Some(Value::Array(Vec::new())),
        Value::String(text) => serde_json::from_str(text).ok(),
        other => Some(other.clone()),
    }
}

/// Rewrite a whole block-tree field value, keeping the form it arrived in.
///
/// Serialized text stays serialized text; when nothing changed the original
/// value is returned as-is.
pub fn rewrite_block_field(
    raw: &Value,
    schema: &BlockSchema,
    ctx: &RefContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Value {
    if raw.is_null() {
        return Value::Null;
    }
    let Some(tree) = decode_field(raw) else {
        diagnostics.warn(format!(
            "{}: could not parse block content in field '{}'; left unchanged",
            ctx.host(),
            ctx.field
        ));
        return raw.clone();
    };

    let parsed = BlockValue::parse(&tree, schema);
    let rewritten = rewrite_block(parsed, schema, ctx, diagnostics).to_json();
    if rewritten == tree {
        return raw.clone();
    }
    match raw {
        Value::String(_) => Value::String(rewritten.to_string()),
        _ => rewritten,
    }
}
