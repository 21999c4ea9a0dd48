mod config;
mod error;
mod handlers;
mod models;
mod profile;
mod rate_limit;
mod router;
mod storage;
mod telemetry;
mod webhook;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::profile::ProfileClient;
use crate::rate_limit::RateLimiter;
use crate::router::AppState;
use crate::storage::FileDirectory;
use crate::webhook::WebhookRelay;

#[tokio::main]
async fn main() {
    telemetry::init();

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let store = match FileDirectory::open(&config.data_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(
                error = %e,
                path = %config.data_dir.display(),
                "failed to open user directory"
            );
            std::process::exit(1);
        }
    };

    let client = reqwest::Client::builder()
        .timeout(config.upstream_timeout)
        .build()
        .expect("failed to build HTTP client");

    let state = AppState {
        store: store.clone(),
        profiles: ProfileClient::new(&config.profile_api_url, client.clone()),
        relay: WebhookRelay::new(client),
        limiter: RateLimiter::new(config.rate_limit, config.rate_window_secs),
    };

    spawn_window_sweeper(state.limiter.clone());

    if config.refresh_interval_secs > 0 {
        spawn_profile_refresh(
            store,
            state.profiles.clone(),
            Duration::from_secs(config.refresh_interval_secs),
        );
    }

    let app = router::build(state, &config);
    let addr = SocketAddr::from((config.host, config.port));

    tracing::info!(%addr, webhooks = config.webhooks.len(), "starting nexium server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind address");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server failed");
}

/// Drop expired rate-limit windows so the per-client map stays bounded.
fn spawn_window_sweeper(limiter: RateLimiter) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(limiter.window());
        loop {
            interval.tick().await;
            limiter.sweep().await;
        }
    });
}

/// Periodically refresh the cached username of every tracked ID. Failures
/// are logged and the next tick tries again; this task never takes the
/// process down.
fn spawn_profile_refresh(store: Arc<FileDirectory>, profiles: ProfileClient, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick fires immediately; skip it so startup stays quiet.
        interval.tick().await;

        loop {
            interval.tick().await;

            let ids = store.list_active().await;
            if ids.is_empty() {
                continue;
            }

            match profiles.fetch_all(&ids).await {
                Ok(fetched) => {
                    if let Err(e) = store.update_usernames(&fetched).await {
                        tracing::error!(error = %e, "failed to persist refreshed profiles");
                    } else {
                        tracing::debug!(count = fetched.len(), "refreshed cached profiles");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "profile refresh failed"),
            }
        }
    });
}
