use anyhow::Result;
use clap::{Parser, Subcommand};
use navigator::render;
use navigator_core::config::{self, NavigatorConfig};
use navigator_core::counts::TagCountCache;
use navigator_core::scanner;
use navigator_core::tag_tree::{collect_all_tag_paths, TagTreeOptions};
use navigator_core::VaultDatabase;
use serde_json::json;
use std::collections::BTreeSet;
use storage::SqliteFileStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "vault-nav", about = "Tag navigator for a markdown vault")]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the vault and refresh stored note content
    Scan {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Print the tag tree with note counts
    Tags {
        /// Include patterns, added to `tags.include` from config
        #[arg(long, value_delimiter = ',')]
        include: Vec<String>,
        /// Exclude patterns, added to `tags.exclude` from config
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
        /// Output JSON tree
        #[arg(long)]
        json: bool,
    },
    /// Show the stored record for one note
    Show {
        /// Vault-relative path
        path: String,
    },
    /// Print mirror and tag statistics
    Stats {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan { json } => run_scan(&cfg, json).await,
        Commands::Tags {
            include,
            exclude,
            json,
        } => run_tags(&cfg, include, exclude, json).await,
        Commands::Show { path } => run_show(&cfg, &path).await,
        Commands::Stats { json } => run_stats(&cfg, json).await,
    }
}

async fn open_database(cfg: &NavigatorConfig) -> Result<VaultDatabase<SqliteFileStore>> {
    let tag_options = TagTreeOptions::from(&cfg.tags);
    tag_options.validate()?;
    info!("opening database {}", cfg.database.path);
    let store = SqliteFileStore::open(&cfg.database.path).await?;
    let db = VaultDatabase::open(store, tag_options).await?;
    Ok(db)
}

async fn run_scan(cfg: &NavigatorConfig, json: bool) -> Result<()> {
    let mut db = open_database(cfg).await?;
    info!("scanning vault at {}", cfg.vault.root);
    let summary = scanner::scan_vault(&mut db, &cfg.vault, &cfg.content).await?;
    let cleared = db.apply_content_settings(&cfg.content).await?;
    if json {
        let out = json!({ "scan": summary, "cleared": cleared });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "Scanned {} notes: {} updated, {} unchanged, {} removed",
            summary.discovered, summary.updated, summary.unchanged, summary.removed
        );
        if summary.failed > 0 {
            println!("{} entries could not be read; their records were kept", summary.failed);
        }
        if cleared > 0 {
            println!("Cleared disabled content from {} records", cleared);
        }
    }
    Ok(())
}

async fn run_tags(
    cfg: &NavigatorConfig,
    include: Vec<String>,
    exclude: Vec<String>,
    json: bool,
) -> Result<()> {
    let mut db = open_database(cfg).await?;
    let include: Vec<String> = cfg.tags.include.iter().cloned().chain(include).collect();
    let exclude: Vec<String> = cfg.tags.exclude.iter().cloned().chain(exclude).collect();

    let index = db.tag_index();
    let visible = render::visible_tree(index.tree(), &include, &exclude);
    info!(
        "showing {} of {} root tags",
        visible.len(),
        index.tree().len()
    );
    // Counts are keyed by path, so the filtered tree gets its own cache.
    let counts = TagCountCache::new();
    if json {
        let out = json!({
            "tags": render::summarize(&visible, &counts),
            "untagged": index.untagged(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print!("{}", render::render_text(&visible, &counts));
        println!("Untagged notes: {}", index.untagged());
    }
    Ok(())
}

async fn run_show(cfg: &NavigatorConfig, path: &str) -> Result<()> {
    let db = open_database(cfg).await?;
    match db.get_file(path) {
        Some(record) => println!("{}", serde_json::to_string_pretty(record)?),
        None => anyhow::bail!("no record for {}", path),
    }
    Ok(())
}

async fn run_stats(cfg: &NavigatorConfig, json: bool) -> Result<()> {
    let mut db = open_database(cfg).await?;
    let stats = db.get_stats();
    let index = db.tag_index();
    let tags: BTreeSet<String> = index
        .tree()
        .values()
        .flat_map(collect_all_tag_paths)
        .collect();
    if json {
        let out = json!({
            "mirror": stats,
            "tags": tags.len(),
            "untagged": index.untagged(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Files: {}", stats.file_count);
        println!("Approximate memory: {} bytes", stats.approximate_memory_bytes);
        println!("Distinct tags: {}", tags.len());
        println!("Untagged notes: {}", index.untagged());
    }
    Ok(())
}
