//! Institution Catalog
//!
//! Main entry point for the catalog server and its client commands.

use clap::{Parser, Subcommand};
use institution_catalog::config::{validate_config_result, ConfigOverrides, ServerConfig};
use institution_catalog::logging::{self, LogFormat};
use institution_catalog::storage::SqliteStore;
use institution_catalog::web::{CatalogClient, CatalogServer, DEFAULT_URL};
use institution_catalog::{Catalog, NewInstitution};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// Institution catalog server and client
#[derive(Parser, Debug)]
#[command(name = "institution-catalog")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, env = "CATALOG_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server
    Serve {
        #[arg(long, env = "HOST")]
        host: Option<String>,

        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// SQLite database path, or :memory:
        #[arg(short, long, env = "DATABASE_URL")]
        database: Option<String>,

        /// How long a fetched catalog is served from cache
        #[arg(long, env = "CACHE_DURATION")]
        cache_ttl_ms: Option<u64>,

        /// Upper bound on a single store call
        #[arg(long, env = "STORE_TIMEOUT_MS")]
        store_timeout_ms: Option<u64>,

        /// Maximum request body size
        #[arg(long)]
        max_body_bytes: Option<usize>,

        /// Disable CORS headers
        #[arg(long)]
        no_cors: bool,
    },

    /// List institutions from a running server
    List {
        #[arg(short, long, env = "CATALOG_URL", default_value = DEFAULT_URL)]
        url: String,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Create an institution on a running server
    Add {
        /// Institution name
        #[arg(short, long)]
        name: String,

        /// Campus name
        #[arg(long)]
        campus: Option<String>,

        /// DANE code or NIT
        #[arg(long)]
        code: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        city: Option<String>,

        #[arg(long)]
        department: Option<String>,

        /// Photo reference (repeatable)
        #[arg(long = "photo")]
        photos: Vec<String>,

        #[arg(short, long, env = "CATALOG_URL", default_value = DEFAULT_URL)]
        url: String,
    },

    /// Show cache statistics of a running server
    Stats {
        #[arg(short, long, env = "CATALOG_URL", default_value = DEFAULT_URL)]
        url: String,
    },
}

fn main() {
    let cli = Cli::parse();

    // Server logs at info, client commands stay quiet
    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    if let Err(e) = logging::init(cli.log_format, default_level) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> institution_catalog::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            database,
            cache_ttl_ms,
            store_timeout_ms,
            max_body_bytes,
            no_cors,
        } => {
            let mut config = ServerConfig::load_or_default(cli.config.as_deref())?;
            config.apply(ConfigOverrides {
                database_url: database,
                host,
                port,
                ttl_ms: cache_ttl_ms,
                store_timeout_ms,
                max_body_bytes,
                cors: no_cors.then_some(false),
            });
            validate_config_result(&config)?;

            runtime.block_on(serve(config))
        }
        Commands::List { url, json } => runtime.block_on(list(&url, json)),
        Commands::Add {
            name,
            campus,
            code,
            email,
            city,
            department,
            photos,
            url,
        } => {
            let draft = NewInstitution {
                institution_name: Some(name),
                campus_name: campus,
                dane_code: code,
                email,
                city,
                department,
                photos,
            };
            runtime.block_on(add(&url, draft))
        }
        Commands::Stats { url } => runtime.block_on(stats(&url)),
    }
}

async fn serve(config: ServerConfig) -> institution_catalog::Result<()> {
    let store = SqliteStore::open(config.store_config())?;
    let catalog = Catalog::new(Arc::new(store), config.catalog_config());

    CatalogServer::new(catalog)
        .with_body_limit(config.max_body_bytes)
        .with_cors(config.cors)
        .run(&config.bind_addr())
        .await
}

async fn list(url: &str, json: bool) -> institution_catalog::Result<()> {
    let records = CatalogClient::new(url).list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No institutions found.");
        return Ok(());
    }

    for record in &records {
        let place = [record.city.as_deref(), record.department.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{}  {}{}{}",
            record.id,
            record.display_name(),
            record
                .campus_name
                .as_deref()
                .map(|campus| format!(" ({})", campus))
                .unwrap_or_default(),
            if place.is_empty() {
                String::new()
            } else {
                format!(" - {}", place)
            }
        );
    }
    println!();
    println!("{} institution(s)", records.len());

    Ok(())
}

async fn add(url: &str, draft: NewInstitution) -> institution_catalog::Result<()> {
    let record = CatalogClient::new(url).create(&draft).await?;
    println!("Created {} ({})", record.display_name(), record.id);
    Ok(())
}

async fn stats(url: &str) -> institution_catalog::Result<()> {
    let stats = CatalogClient::new(url).stats().await?;

    println!("Cache statistics:");
    println!("  Populated:      {}", stats.cache.populated);
    if let Some(records) = stats.cached_records {
        println!("  Cached records: {}", records);
    }
    if let (Some(age), Some(remaining)) = (stats.cache.age_ms, stats.cache.expires_in_ms) {
        println!("  Age:            {} ms (expires in {} ms)", age, remaining);
    }
    println!("  TTL:            {} ms", stats.ttl_ms);
    println!("  Hits:           {}", stats.cache.hits);
    println!("  Misses:         {}", stats.cache.misses);
    println!("  Store fetches:  {}", stats.store_fetches);
    println!("  Invalidations:  {}", stats.cache.invalidations);
    println!("  Fetch running:  {}", stats.fetch_in_flight);

    Ok(())
}
