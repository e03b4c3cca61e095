//! Fetch subcommand: pull a page subtree from a running source installation.

use clap::Args;

/// Arguments for the fetch subcommand
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Base URL of the source installation, e.g. https://source.example
    #[arg(value_name = "BASE_URL")]
    pub base_url: String,

    /// Source page id at the root of the subtree to import
    #[arg(value_name = "PAGE_ID")]
    pub page_id: i64,

    /// Resolve and rewrite without modifying the database
    #[arg(long)]
    pub dry_run: bool,
}
