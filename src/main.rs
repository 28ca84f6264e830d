use std::{process, sync::Arc};

use cachegate::{
    application::error::AppError,
    cache::{CacheConfig, CacheState, ConnectPolicy, StoreAdapter, StoreAdmin, spawn_key_monitor},
    config,
    infra::{
        error::InfraError,
        http::{self, ApiEnvelope, AppState},
        telemetry,
        upstream::HttpUpstream,
    },
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let store = StoreAdapter::connect(
        settings.store.url.as_deref(),
        &ConnectPolicy::from(&settings.store),
    )
    .await;

    match command {
        config::Command::Serve(_) => run_serve(settings, store).await,
        config::Command::Keys => {
            let keys = StoreAdmin::new(store).list_keys().await?;
            print_json(&ApiEnvelope::keys(keys))
        }
        config::Command::Flush => {
            let deleted = StoreAdmin::new(store).flush_all().await?;
            print_json(&ApiEnvelope::flushed(deleted))
        }
        config::Command::Info => {
            let info = StoreAdmin::new(store).server_info().await?;
            print_json(&ApiEnvelope::info(info))
        }
    }
}

async fn run_serve(settings: config::Settings, store: StoreAdapter) -> Result<(), AppError> {
    let monitor_handle = settings
        .store
        .key_monitor
        .filter(|_| store.is_available())
        .map(|every| spawn_key_monitor(store.clone(), every));

    let upstream = HttpUpstream::new(&settings.upstream)?;
    let cache = CacheState::new(CacheConfig::from(&settings.store), store);
    let state = AppState::new(cache, Arc::new(upstream));

    let result = serve_http(&settings, state).await;

    if let Some(handle) = monitor_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        addr = %settings.server.addr,
        upstream = %settings.upstream.base_url,
        "cachegate listening"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .into_future();
    let mut server = tokio::spawn(server);

    tokio::select! {
        joined = &mut server => {
            return joined
                .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
                .map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|err| AppError::from(InfraError::from(err)))?;
            info!("shutdown signal received; draining connections");
        }
    }

    let _ = shutdown_tx.send(());
    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(joined) => joined
            .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
            .map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(_) => {
            warn!(
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out"
            );
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
