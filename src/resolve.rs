//! Page identity resolution: decides which source pages already exist in the
//! destination and builds the source -> destination [`IdMap`].

use crate::document::{PageId, PageRecord};
use crate::error::{Diagnostics, ImportError};
use crate::rewrite::IdMap;
use crate::tree;
use std::collections::HashMap;
use tracing::debug;

/// Destination tree path -> destination page id.
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    paths: HashMap<String, PageId>,
}

impl TreeIndex {
    pub fn get(&self, path: &str) -> Option<PageId> {
        self.paths.get(path).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FromIterator<(String, PageId)> for TreeIndex {
    fn from_iter<I: IntoIterator<Item = (String, PageId)>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

/// Output of [`resolve_identities`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Input records, with `pk` replaced for pages matched by path.
    pub pages: Vec<PageRecord>,
    pub id_map: IdMap,
    /// Number of records whose path already exists in the destination.
    pub matched: usize,
    pub diagnostics: Diagnostics,
}

/// Resolve every record against the destination tree.
///
/// The first record is the import root: either its own path or its parent's
/// path must exist in `index`, otherwise nothing is resolved. A record whose
/// path exists takes the destination id; every other record keeps its source
/// id. `pages` is left untouched.
pub fn resolve_identities(
    pages: &[PageRecord],
    index: &TreeIndex,
) -> Result<Resolution, ImportError> {
    let Some(root) = pages.first() else {
        return Ok(Resolution::default());
    };

    let root_path = root.path().ok_or(ImportError::MissingRootPath)?;
    let anchored = index.contains(root_path)
        || tree::parent_path(root_path).is_some_and(|parent| index.contains(parent));
    if !anchored {
        return Err(ImportError::NoAnchor {
            path: root_path.to_string(),
        });
    }

    let mut diagnostics = Diagnostics::new();
    let mut entries: HashMap<PageId, PageId> = HashMap::with_capacity(pages.len());
    let mut resolved = Vec::with_capacity(pages.len());
    let mut matched = 0;

    for record in pages {
        let Some(source) = record.pk() else {
            diagnostics.warn(format!(
                "Page at path '{}' has no pk; it is not part of the identifier map",
                record.path().unwrap_or("<none>")
            ));
            resolved.push(record.clone());
            continue;
        };

        let destination = record.path().and_then(|path| index.get(path));
        let target = destination.unwrap_or(source);
        if let Some(previous) = entries.get(&source) {
            if *previous != target {
                diagnostics.warn(format!(
                    "Page {} appears more than once in the document; keeping the first mapping to {}",
                    source, previous
                ));
            }
        } else {
            entries.insert(source, target);
        }

        match destination {
            Some(id) => {
                debug!(source, destination = id, "Matched existing page by path");
                matched += 1;
                resolved.push(record.with_pk(id));
            }
            None => resolved.push(record.clone()),
        }
    }

    Ok(Resolution {
        pages: resolved,
        id_map: entries.into_iter().collect(),
        matched,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(pk: i64, path: &str) -> PageRecord {
        let serde_json::Value::Object(content) = json!({"pk": pk, "path": path, "title": "T"})
        else {
            unreachable!()
        };
        PageRecord::new("testapp", "testpage", content)
    }

    fn index(entries: &[(&str, PageId)]) -> TreeIndex {
        entries
            .iter()
            .map(|(path, id)| (path.to_string(), *id))
            .collect()
    }

    #[test]
    fn test_exact_path_match_takes_destination_id() {
        let pages = vec![page(3, "00010001"), page(4, "000100010001")];
        let index = index(&[("0001", 1), ("00010001", 30)]);

        let resolution = resolve_identities(&pages, &index).unwrap();
        assert_eq!(resolution.id_map.get(3), Some(30));
        assert_eq!(resolution.id_map.get(4), Some(4));
        assert_eq!(resolution.pages[0].pk(), Some(30));
        assert_eq!(resolution.pages[1].pk(), Some(4));
        assert_eq!(resolution.matched, 1);
        // caller's records untouched
        assert_eq!(pages[0].pk(), Some(3));
    }

    #[test]
    fn test_parent_anchor_is_enough() {
        let pages = vec![page(3, "00010002")];
        let index = index(&[("0001", 1)]);

        let resolution = resolve_identities(&pages, &index).unwrap();
        assert_eq!(resolution.id_map.get(3), Some(3));
        assert!(resolution.diagnostics.is_empty());
    }

    #[test]
    fn test_missing_anchor_fails() {
        let pages = vec![page(3, "00220001"), page(4, "002200010001")];
        let index = index(&[("0001", 1)]);

        let err = resolve_identities(&pages, &index).unwrap_err();
        assert!(matches!(err, ImportError::NoAnchor { ref path } if path == "00220001"));
    }

    #[test]
    fn test_map_is_total_over_source_ids() {
        let pages = vec![
            page(10, "00010001"),
            page(11, "000100010001"),
            page(12, "000100010002"),
            page(13, "0001000100020001"),
        ];
        let index = index(&[("0001", 1), ("000100010002", 99)]);

        let resolution = resolve_identities(&pages, &index).unwrap();
        assert_eq!(resolution.id_map.len(), 4);
        for source in [10, 11, 12, 13] {
            assert!(resolution.id_map.contains(source));
        }
        assert_eq!(resolution.id_map.get(12), Some(99));
    }

    #[test]
    fn test_records_without_pk_are_skipped_with_warning() {
        let mut no_pk = page(0, "000100010001");
        no_pk.content.remove("pk");
        let pages = vec![page(3, "00010001"), no_pk];
        let index = index(&[("0001", 1)]);

        let resolution = resolve_identities(&pages, &index).unwrap();
        assert_eq!(resolution.id_map.len(), 1);
        assert_eq!(resolution.pages.len(), 2);
        assert_eq!(resolution.diagnostics.warnings.len(), 1);
    }

    #[test]
    fn test_empty_document_resolves_to_nothing() {
        let resolution = resolve_identities(&[], &TreeIndex::default()).unwrap();
        assert!(resolution.pages.is_empty());
        assert!(resolution.id_map.is_empty());
    }

    #[test]
    fn test_root_without_path_fails() {
        let mut root = page(3, "0001");
        root.content.remove("path");
        let err = resolve_identities(&[root], &index(&[("0001", 1)])).unwrap_err();
        assert!(matches!(err, ImportError::MissingRootPath));
    }
}
