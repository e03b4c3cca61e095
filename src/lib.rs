//! treeport library
//!
//! Imports page trees, snippets and images exported from one installation
//! into another, rewriting page references on the way in.

pub mod cli;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod fetch;
pub mod format;
pub mod logging;
pub mod resolve;
pub mod rewrite;
pub mod schema;
pub mod storage;
pub mod tree;
