use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use fragment_registry::cache::{CacheOptions, CacheWrapper, JsonFileStore, SystemClock};
use fragment_registry::error::{RegistryError, RegistryResult};
use fragment_registry::http::X_REQUEST_HOST;

#[derive(Parser)]
#[command(name = "registry-cli")]
#[command(about = "Management CLI for the fragment registry", long_about = None)]
struct Cli {
    #[arg(short, long, env = "REGISTRY_URL", default_value = "http://localhost:8233")]
    url: String,

    /// Admin API key or `identifier:secret`.
    #[arg(short, long, env = "REGISTRY_API_KEY", default_value = "")]
    key: String,

    /// Domain to scope config and resolve requests to.
    #[arg(short, long)]
    domain: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the public config document
    Config {
        /// Serve from this file while a fresh copy is fetched
        #[arg(long)]
        cache_file: Option<PathBuf>,

        /// Seconds a cached document counts as fresh
        #[arg(long, default_value_t = 30)]
        cache_secs: u64,
    },
    /// Show the composition plan for a URL
    Resolve { url: String },
    /// List routes
    Routes,
    /// List version records, newest first
    Versions {
        #[arg(long)]
        entity_type: Option<String>,
        #[arg(long)]
        entity_id: Option<String>,
        /// Window as `[start,end]`
        #[arg(long, default_value = "[0,24]")]
        range: String,
    },
    /// Revert a version
    Revert { id: i64 },
}

struct Client {
    http: reqwest::Client,
    base: String,
    headers: HeaderMap,
}

impl Client {
    fn new(cli: &Cli) -> Result<Self, Box<dyn std::error::Error>> {
        let mut headers = HeaderMap::new();
        if !cli.key.is_empty() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
            );
        }
        if let Some(domain) = &cli.domain {
            headers.insert(X_REQUEST_HOST, HeaderValue::from_str(domain)?);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base: cli.url.trim_end_matches('/').to_string(),
            headers,
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.base, path))
            .headers(self.headers.clone())
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.base, path))
            .headers(self.headers.clone())
    }
}

async fn fetch_json(request: reqwest::RequestBuilder) -> RegistryResult<Value> {
    let res = request
        .send()
        .await
        .map_err(|e| RegistryError::Upstream(e.to_string()))?;
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(RegistryError::Upstream(format!("status {status}: {body}")));
    }
    res.json()
        .await
        .map_err(|e| RegistryError::Upstream(e.to_string()))
}

async fn cached_config(
    client: Arc<Client>,
    path: PathBuf,
    cache_secs: u64,
) -> Result<Value, Box<dyn std::error::Error>> {
    let store = JsonFileStore::<Value>::open(&path)?;
    let cache = CacheWrapper::with_parts(
        CacheOptions::new("cli_config", cache_secs),
        move |_domain: Option<String>| {
            let client = Arc::clone(&client);
            async move { fetch_json(client.get("/api/v1/config")).await }
        },
        Arc::new(store),
        Arc::new(SystemClock),
    );

    let domain: Option<String> = None;
    let entry = cache.get(domain.clone()).await?;
    // Let a background refresh land on disk before the process exits.
    if let Some(Err(e)) = cache.settle(&domain).await {
        eprintln!("Warning: refresh failed, cached copy served: {e}");
    }
    Ok(entry.data)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Arc::new(Client::new(&cli)?);

    let json = match cli.command {
        Commands::Config {
            cache_file: Some(path),
            cache_secs,
        } => cached_config(Arc::clone(&client), path, cache_secs).await?,
        Commands::Config { cache_file: None, .. } => fetch_json(client.get("/api/v1/config")).await?,
        Commands::Resolve { url } => {
            fetch_json(client.get("/api/v1/resolve").query(&[("url", url)])).await?
        }
        Commands::Routes => fetch_json(client.get("/api/v1/route")).await?,
        Commands::Versions {
            entity_type,
            entity_id,
            range,
        } => {
            let filter = serde_json::json!({
                "entity_type": entity_type,
                "entity_id": entity_id,
            });
            let request = client
                .get("/api/v1/versioning")
                .query(&[("filter", filter.to_string()), ("range", range)]);
            fetch_json(request).await?
        }
        Commands::Revert { id } => {
            fetch_json(client.post(&format!("/api/v1/versioning/{id}/revert"))).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
