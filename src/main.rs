//! edge-sync server entry point: assembles the KV backend, ERP client,
//! and HTTP application from [`edge_sync::AppConfig`], then runs the axum
//! server and the weekly refresh scheduler side by side until a shutdown
//! signal arrives.

use std::net::SocketAddr;
use std::sync::Arc;

use edge_sync::api::{build, AppState};
use edge_sync::auth::otp::LoggingSender;
use edge_sync::config::KvConfig;
use edge_sync::erp::client::HttpErpClient;
use edge_sync::erp::ErpFetcher;
use edge_sync::kv::memory::MemoryStore;
use edge_sync::kv::redis_backend::RedisStore;
use edge_sync::kv::KvStore;
use edge_sync::scheduler::run_weekly_refresh_loop;
use edge_sync::AppConfig;

async fn build_kv(config: &AppConfig) -> anyhow::Result<Arc<dyn KvStore>> {
    match &config.kv {
        KvConfig::Embedded => Ok(Arc::new(MemoryStore::new())),
        KvConfig::Redis(url) => {
            let store = RedisStore::connect(url).await?;
            Ok(Arc::new(store))
        }
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

fn init_tracing(config: &AppConfig) {
    use edge_sync::config::LogFormat;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    init_tracing(&config);

    let kv = build_kv(&config).await?;
    let erp = build_erp(&config);
    let otp_sender = Arc::new(LoggingSender);

    let state = Arc::new(AppState {
        kv: kv.clone(),
        erp: erp.clone(),
        otp_sender,
        analytics: edge_sync::analytics::Recorder::new(config.analytics_enabled),
        config: config.clone(),
    });

    let app = build(state);
    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;

    let scheduler = tokio::spawn(async move {
        run_weekly_refresh_loop(kv.as_ref(), erp.as_ref(), &config).await;
    });

    tracing::info!(%addr, "edge-sync listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    scheduler.abort();
    Ok(())
}
