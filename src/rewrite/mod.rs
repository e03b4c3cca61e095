//! Page reference rewriting.
//!
//! Given the source -> destination [`IdMap`], these rewriters find every page
//! reference in a page's fields and remap it:
//! - [`fields`]: plain page foreign keys, dispatching the other kinds
//! - [`richtext`]: page-link anchors inside rich-text markup
//! - [`blocks`]: page choosers anywhere inside a block tree
//!
//! Unresolvable references never abort a rewrite; they are reported through
//! [`Diagnostics`](crate::error::Diagnostics).

pub mod blocks;
pub mod fields;
pub mod richtext;

use crate::document::PageId;
use std::collections::HashMap;
use std::fmt;

/// Source page identifier -> destination page identifier.
///
/// Built once per import run and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMap {
    map: HashMap<PageId, PageId>,
}

impl IdMap {
    pub fn get(&self, source: PageId) -> Option<PageId> {
        self.map.get(&source).copied()
    }

    pub fn contains(&self, source: PageId) -> bool {
        self.map.contains_key(&source)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Entries sorted by source identifier.
    pub fn entries(&self) -> Vec<(PageId, PageId)> {
        let mut entries: Vec<_> = self.map.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_unstable();
        entries
    }
}

impl FromIterator<(PageId, PageId)> for IdMap {
    fn from_iter<I: IntoIterator<Item = (PageId, PageId)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

/// Where a reference lives: the host page, the field, and the map to apply.
#[derive(Debug, Clone, Copy)]
pub struct RefContext<'a> {
    pub page: Option<PageId>,
    pub field: &'a str,
    pub id_map: &'a IdMap,
}

impl<'a> RefContext<'a> {
    pub fn new(page: Option<PageId>, field: &'a str, id_map: &'a IdMap) -> Self {
        Self {
            page,
            field,
            id_map,
        }
    }

    /// Label of the host page for messages.
    pub fn host(&self) -> HostPage {
        HostPage(self.page)
    }
}

/// Display helper for a possibly-unknown host page.
#[derive(Debug, Clone, Copy)]
pub struct HostPage(pub Option<PageId>);

impl fmt::Display for HostPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "Page {}", id),
            None => write!(f, "Page <no pk>"),
        }
    }
}
