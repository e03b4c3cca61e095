//! treeport binary
//!
//! Imports exported page-tree content into a destination site database.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use treeport::cli::fetch::FetchArgs;
use treeport::cli::import::ImportArgs;
use treeport::cli::{Cli, Command};
use treeport::config::{Config, ConfigLoader, ConfigPaths};
use treeport::db::Database;
use treeport::db::import::{ImportResults, Importer};
use treeport::document::{Bundle, Document};
use treeport::fetch::fetch_document;
use treeport::format::{OutputFormat, format_pages, format_results};
use treeport::logging::report_results;
use treeport::storage::FileStorage;

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    // RUST_LOG, when set, replaces the level chosen by --verbose
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok());

    macro_rules! install {
        ($builder:expr) => {
            match filter {
                Some(filter) => {
                    tracing::subscriber::set_global_default($builder.with_env_filter(filter).finish())?
                }
                None => tracing::subscriber::set_global_default($builder.with_max_level(level).finish())?,
            }
        };
    }

    match cli.log.as_str() {
        "0" | "off" => {}
        "1" | "stdout" => install!(FmtSubscriber::builder().with_writer(std::io::stdout)),
        "2" | "stderr" => install!(FmtSubscriber::builder().with_writer(std::io::stderr)),
        filename => {
            // Log to file (append mode)
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)
                .with_context(|| format!("Failed to open log file {}", filename))?;
            install!(FmtSubscriber::builder().with_writer(file).with_ansi(false))
        }
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let paths = ConfigPaths::discover().with_explicit_file(cli.config.as_ref().map(PathBuf::from));
    let mut loader = ConfigLoader::load_with_paths(paths)?;
    if let Some(path) = loader.config_path() {
        info!("Using configuration from {}", path.display());
    }

    let config = loader.config_mut();
    if let Some(db_path) = &cli.database {
        config.site.db_path = db_path.into();
    }
    if let Some(media_dir) = &cli.media_dir {
        config.site.media_dir = media_dir.into();
    }
    if let Some(format) = cli.format {
        config.site.default_format = format;
    }
    Ok(loader.into_config())
}

fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.site.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }
    Database::open(&config.site.db_path)
        .with_context(|| format!("Failed to open database {}", config.site.db_path.display()))
}

fn open_bundle(path: &Path, is_archive: bool) -> Result<Bundle> {
    if path.is_dir() {
        return Bundle::from_dir(path);
    }
    if is_archive {
        return Bundle::open(path);
    }
    let document = Document::from_file(path)?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    Ok(Bundle::from_document(document, base_dir))
}

fn run_import(config: &Config, args: &ImportArgs) -> Result<ImportResults> {
    let bundle = open_bundle(&args.bundle, args.is_archive())
        .with_context(|| format!("Failed to read bundle {}", args.bundle.display()))?;
    let db = open_database(config)?;
    let registry = config.registry();
    let storage = FileStorage::new(&config.site.media_dir);
    let importer = Importer::new(&db, &registry, &storage);

    info!(
        pages = bundle.document().pages.len(),
        snippets = bundle.document().snippet_count(),
        images = bundle.document().images.len(),
        dry_run = args.dry_run,
        "Importing bundle {}",
        args.bundle.display()
    );
    if args.dry_run {
        importer.preview_pages(bundle.document())
    } else {
        importer.import_bundle(&bundle, args.selection())
    }
}

async fn run_fetch(config: &Config, args: &FetchArgs) -> Result<ImportResults> {
    let document = fetch_document(&config.fetch, &args.base_url, args.page_id)
        .await
        .with_context(|| format!("Failed to fetch page {} from {}", args.page_id, args.base_url))?;
    let db = open_database(config)?;
    let registry = config.registry();
    let storage = FileStorage::new(&config.site.media_dir);
    let importer = Importer::new(&db, &registry, &storage);

    info!(pages = document.pages.len(), "Fetched source subtree");
    if args.dry_run {
        importer.preview_pages(&document)
    } else {
        importer.import_pages(&document)
    }
}

fn finish(results: &ImportResults, format: OutputFormat) -> i32 {
    println!("{}", format_results(results, format));
    report_results(results).exit_code()
}

async fn run(cli: Cli) -> Result<i32> {
    let config = load_config(&cli)?;
    let format = config.site.default_format;

    match &cli.command {
        Command::Import(args) => {
            let results = run_import(&config, args)?;
            Ok(finish(&results, format))
        }
        Command::Fetch(args) => {
            let results = run_fetch(&config, args).await?;
            Ok(finish(&results, format))
        }
        Command::Tree => {
            let db = open_database(&config)?;
            let pages = db.list_pages()?;
            println!("{}", format_pages(&pages, format));
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = init_logging(&cli) {
        eprintln!("Error: {:#}", err);
        std::process::exit(2);
    }

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            std::process::exit(2);
        }
    }
}
