use std::{future::IntoFuture, process, sync::Arc};

use clap::Parser;
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use vidfeed::{
    application::{error::AppError, feed::FeedService, videos::VideoService},
    cache::{self, CacheConfig, CacheGateway},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AppState},
        telemetry,
    },
};

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
    let cli_args = config::CliArgs::parse();
    let settings = config::load(&cli_args)
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        Some(config::Command::Migrate(_)) => run_migrate(settings).await,
        Some(config::Command::Serve(_)) | None => run_serve(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect_pool(&settings).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::migration(err.to_string())))?;
    info!(target: "vidfeed::migrate", "Migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect_pool(&settings).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::migration(err.to_string())))?;
    let repositories = Arc::new(PostgresRepositories::new(pool));

    let cache_config = CacheConfig::from(&settings.cache);
    let client = cache::connect(&cache_config).await;
    let gateway = CacheGateway::new(client, &cache_config);
    info!(
        target: "vidfeed::serve",
        backend = gateway.backend_name(),
        "Read-path cache ready"
    );

    let feed = FeedService::new(
        repositories.clone(),
        repositories.clone(),
        gateway.clone(),
        cache_config.list_policy(),
        settings.feed.limits(),
    );
    let videos = VideoService::new(
        repositories.clone(),
        repositories.clone(),
        repositories.clone(),
        gateway,
        cache_config.detail_policy(),
    );

    let state = AppState {
        feed: Arc::new(feed),
        videos: Arc::new(videos),
        health: repositories,
    };

    serve_http(&settings, state).await
}

async fn connect_pool(settings: &config::Settings) -> Result<sqlx::PgPool, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(target: "vidfeed::serve", addr = %settings.server.addr, "Listening");

    let draining = Arc::new(Notify::new());
    let signal_draining = draining.clone();
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            signal_draining.notify_one();
        },
    );

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = server.into_future() => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            draining.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target: "vidfeed::serve",
                grace_ms = grace.as_millis() as u64,
                "In-flight requests did not drain in time"
            );
        }
    }

    info!(target: "vidfeed::serve", "Shut down");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(target: "vidfeed::serve", "Shutdown signal received"),
        Err(err) => {
            // Without a signal handler the server can only stop on its own.
            warn!(target: "vidfeed::serve", error = %err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}
