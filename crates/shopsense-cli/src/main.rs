//! CLI entry point for Shopsense: catalog admin, search, chat, and the HTTP server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use shopsense_core::api::{self, AppState};
use shopsense_core::{
    app_data_dir, load_config, save_config, scan_products, status, ChatEvent, ChatMessage, Config,
    NewProduct, SearchHit, SearchRequest, Storefront,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "shopsense")]
#[command(about = "Shopsense: product catalog with semantic search and a shopping assistant")]
struct Cli {
    /// Log at debug level (otherwise RUST_LOG, default info).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show backend status and counts.
    Status,
    /// Show where Shopsense stores its config, catalog and index.
    DataDir,
    /// Show or change configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Add a product to the catalog and index it.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
        /// Image file to upload.
        #[arg(long, value_name = "PATH", conflicts_with = "image_url")]
        image: Option<PathBuf>,
        /// Already-hosted image URL.
        #[arg(long)]
        image_url: Option<String>,
        /// Extra attribute, e.g. `--attr category=kitchen`. Repeatable.
        #[arg(long = "attr", value_name = "KEY=VALUE", value_parser = parse_attr)]
        attrs: Vec<(String, String)>,
    },
    /// List catalog products, newest first.
    List,
    /// Show one product with all its attributes.
    Show { id: u64 },
    /// Import every product file (markdown with YAML frontmatter) under a directory.
    Import {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Semantic search over the catalog.
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        min_score: Option<f32>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Chat with the shopping assistant (one message per line, Ctrl+D to quit).
    Chat,
    /// Serve the HTTP API.
    Serve {
        #[arg(long)]
        addr: Option<String>,
    },
}

#[derive(clap::Subcommand)]
enum ConfigAction {
    /// Print the effective config as TOML.
    Show,
    /// Set a value, e.g. `search.min_score 0.5`.
    Set { key: String, value: String },
}

fn parse_attr(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.trim().to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}

/// Numbers stay numbers so `rating=4.5` can be filtered and ranked on.
fn attr_value(raw: &str) -> serde_json::Value {
    serde_json::from_str::<serde_json::Number>(raw)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config();
    let data_dir = app_data_dir().context("could not determine app data directory")?;
    tracing::debug!(data_dir = %data_dir.display(), ollama = %config.ollama_url, "config loaded");

    match cli.command.unwrap_or(Commands::Status) {
        Commands::DataDir => println!("{}", data_dir.display()),
        Commands::Config { action } => match action {
            ConfigAction::Show => print!("{}", config.to_toml()?),
            ConfigAction::Set { key, value } => {
                config.set(&key, &value)?;
                save_config(&config)?;
                println!("{key} = {value}");
            }
        },
        Commands::Status => {
            let storefront = Storefront::open(&config, &data_dir)?;
            println!("Shopsense backend");
            println!("  core: {}", status());
            println!("  data: {}", data_dir.display());
            println!("  ollama: {} (embed: {}, chat: {})", config.ollama_url, config.embed_model, config.chat_model);
            println!("  products: {}", storefront.product_count().await);
            println!(
                "  embeddings: {} in {:?}",
                storefront.embedding_count().await,
                storefront.collection()
            );
        }
        Commands::Add {
            name,
            description,
            image,
            image_url,
            attrs,
        } => {
            let mut new = NewProduct::new(name, description);
            new.image_url = image_url;
            for (k, v) in attrs {
                new = new.with_attribute(k, attr_value(&v));
            }
            let storefront = Storefront::open(&config, &data_dir)?;
            let created = storefront.create_product(new, image.as_deref()).await?;
            println!("Created product #{}: {}", created.product.id, created.product.name);
            if let Some(warning) = created.warning {
                eprintln!("Warning: {warning}");
            }
        }
        Commands::List => {
            let storefront = Storefront::open(&config, &data_dir)?;
            let products = storefront.list_products().await;
            println!("{} product(s)", products.len());
            for p in products {
                println!("  #{:<4} {}  {}", p.id, p.name, preview(&p.description));
            }
        }
        Commands::Show { id } => {
            let storefront = Storefront::open(&config, &data_dir)?;
            let product = storefront
                .product(id)
                .await
                .with_context(|| format!("no product #{id}"))?;
            println!("#{} {}", product.id, product.name);
            println!("  created: {}", product.created_at.to_rfc3339());
            if let Some(url) = &product.image_url {
                println!("  image: {url}");
            }
            for (key, value) in &product.attributes {
                println!("  {key}: {value}");
            }
            println!();
            println!("{}", product.description);
        }
        Commands::Import { path } => {
            let files = scan_products(&path)?;
            let storefront = Storefront::open(&config, &data_dir)?;
            println!("Found {} product file(s) under {}", files.len(), path.display());
            let mut unembedded = 0;
            for file in files {
                match storefront.create_product(file.product, None).await {
                    Ok(created) => {
                        if !created.is_searchable() {
                            unembedded += 1;
                        }
                        println!("  #{:<4} {}", created.product.id, created.product.name);
                    }
                    Err(e) => eprintln!("  skipped {}: {}", file.path.display(), e),
                }
            }
            if unembedded > 0 {
                eprintln!("Warning: {unembedded} product(s) stored without embeddings");
            }
        }
        Commands::Search {
            query,
            limit,
            min_score,
            category,
        } => {
            if query.trim().is_empty() {
                bail!("search query is required");
            }
            let mut request = SearchRequest::new(query)
                .with_limit(limit.unwrap_or(config.search.limit))
                .with_min_score(min_score.unwrap_or(config.search.min_score));
            if let Some(category) = category {
                request = request.with_filter("category", category);
            }
            let storefront = Storefront::open(&config, &data_dir)?;
            let results = storefront.search(&request).await?;
            if results.is_empty() {
                println!("No matches.");
            }
            for hit in results.into_iter().map(SearchHit::from) {
                println!(
                    "  {:>4}  #{:<4} {}  {}",
                    hit.debug.relevance_percentage,
                    hit.result.id,
                    hit.result.name,
                    preview(&hit.result.description)
                );
            }
        }
        Commands::Chat => {
            let storefront = Storefront::open(&config, &data_dir)?;
            chat(&storefront, &config).await?;
        }
        Commands::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| config.server.listen_addr.clone());
            let storefront = Storefront::open(&config, &data_dir)?;
            let assistant = storefront.assistant(&config)?;
            let state = AppState {
                storefront: Arc::new(storefront),
                assistant: Arc::new(assistant),
                search_defaults: config.search.clone(),
            };
            api::serve(state, &addr).await?;
        }
    }
    Ok(())
}

async fn chat(storefront: &Storefront, config: &Config) -> anyhow::Result<()> {
    let assistant = Arc::new(storefront.assistant(config)?);
    let mut history: Vec<ChatMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Ask about products (Ctrl+D to quit).");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        history.push(ChatMessage::user(line));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                print_event(&event);
            }
        });
        let result = assistant.respond(&history, &tx).await;
        drop(tx);
        printer.await?;

        match result {
            Ok(conversation) => history = conversation,
            Err(e) => {
                eprintln!("Error: {e}");
                history.pop();
            }
        }
    }
    Ok(())
}

fn print_event(event: &ChatEvent) {
    match event {
        ChatEvent::Text { content } => println!("{content}"),
        ChatEvent::ToolCall { name, arguments } => println!("[{name} {arguments}]"),
        ChatEvent::ToolResult { name, output } => match serde_json::to_value(output) {
            Ok(serde_json::Value::Array(hits)) => println!("[{name}: {} result(s)]", hits.len()),
            Ok(other) => println!("[{name}: {other}]"),
            Err(e) => eprintln!("[{name}: unprintable output: {e}]"),
        },
        ChatEvent::Done => println!(),
    }
}

fn preview(text: &str) -> String {
    let first = text.lines().next().unwrap_or("").trim();
    if first.chars().count() > 60 {
        format!("{}...", first.chars().take(60).collect::<String>())
    } else {
        first.to_string()
    }
}
