//! Admin CLI: talks directly to the KV store and the shared core
//! routines, bypassing HTTP entirely. Meant to be run from an operator's
//! shell against the same Redis instance the server uses, or against an
//! embedded store for local inspection.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use edge_sync::cache::{CacheStore, Family};
use edge_sync::config::KvConfig;
use edge_sync::erp::client::HttpErpClient;
use edge_sync::erp::ErpFetcher;
use edge_sync::kv::memory::MemoryStore;
use edge_sync::kv::redis_backend::RedisStore;
use edge_sync::kv::KvStore;
use edge_sync::refresh::run_full_refresh;
use edge_sync::stream::StreamManager;
use edge_sync::AppConfig;

#[derive(Parser)]
#[command(name = "edge-sync-admin", about = "Operator CLI for the edge-sync cache/sync bus")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a full refresh, optionally scoped to one family (informational
    /// only — `run_full_refresh` always walks every family; scoping is
    /// reported but not yet enforced at this layer).
    Refresh {
        #[arg(long)]
        family: Option<String>,
    },
    /// Tail a family's change stream from a cursor.
    Tail {
        family: String,
        #[arg(long, default_value_t = 0)]
        from: u64,
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
    /// Print the current cached hash entry for one id.
    Get { family: String, id: String },
    /// Print the resolved configuration.
    Config,
    /// Rotate the certificate fingerprint surfaced by `/api/certificate-info`.
    CertRotate {
        fingerprint: String,
    },
}

fn parse_family(raw: &str) -> anyhow::Result<Family> {
    Ok(match raw {
        "product" => Family::Product,
        "price" => Family::Price,
        "stock" => Family::Stock,
        "hero" => Family::Hero,
        "bundle" => Family::Bundle,
        "home" => Family::Home,
        "message" => Family::Message,
        other => anyhow::bail!("unknown family `{other}`"),
    })
}

async fn build_kv(config: &AppConfig) -> anyhow::Result<Arc<dyn KvStore>> {
    match &config.kv {
        KvConfig::Embedded => Ok(Arc::new(MemoryStore::new())),
        KvConfig::Redis(url) => Ok(Arc::new(RedisStore::connect(url).await?)),
    }
}

fn build_erp(config: &AppConfig) -> Arc<dyn ErpFetcher> {
    Arc::new(HttpErpClient::new(
        config.erp.base_url.clone(),
        config.erp.api_key.clone(),
        config.erp.api_secret.clone(),
        config.erp_timeout,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    let kv = build_kv(&config).await?;

    match cli.command {
        Command::Refresh { family } => {
            if let Some(family) = &family {
                parse_family(family)?;
                tracing::info!(family = %family, "refresh scope requested; running full refresh across all families");
            }
            let erp = build_erp(&config);
            let summary = run_full_refresh(kv.as_ref(), erp.as_ref(), &config).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Tail { family, from, count } => {
            let family = parse_family(&family)?;
            let streams = StreamManager::new(kv.as_ref());
            let entries = streams.read(family, from, count).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Command::Get { family, id } => {
            let family = parse_family(&family)?;
            let cache = CacheStore::new(kv.as_ref());
            match cache.read_hash(family, &id).await? {
                Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
                None => println!("no hash entry for {family}:{id}"),
            }
        }
        Command::Config => {
            let fingerprint = match kv.get(edge_sync::config::CERTIFICATE_FINGERPRINT_KEY).await? {
                Some(value) => Some(value),
                None => config.certificate_fingerprint.clone(),
            };
            println!("kv backend: {:?}", config.kv);
            println!("erp base url: {}", config.erp.base_url);
            println!("refresh schedule: {:?}", config.refresh_schedule);
            println!("refresh batch size: {}", config.refresh_batch_size);
            println!("rate limit: {} req / {:?}", config.rate_limit_requests, config.rate_limit_window);
            println!("certificate fingerprint: {:?}", fingerprint);
        }
        Command::CertRotate { fingerprint } => {
            kv.set(edge_sync::config::CERTIFICATE_FINGERPRINT_KEY, &fingerprint, None).await?;
            println!("certificate fingerprint rotated");
        }
    }

    Ok(())
}
