use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use artisan_assist::api::{self, AppState};
use artisan_assist::config::AppConfig;
use artisan_assist::llm::create_provider;
use artisan_assist::media::{ImageStudio, StorybookGenerator, create_image_generator};
use artisan_assist::search::create_search_tool;
use artisan_assist::store::LibSqlBackend;
use artisan_assist::workflow::Orchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(&config);

    eprintln!("Artisan Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Media: {}", config.media_dir.display());
    eprintln!("   HTTP: http://0.0.0.0:{}", config.port);
    eprintln!("   Chat WS: ws://0.0.0.0:{}/ws/{{user_id}}\n", config.port);

    let llm = create_provider(&config.llm)?;
    let search = create_search_tool(&config.search);
    let images = create_image_generator(&config.image);

    if let Some(parent) = config.db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let db = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?,
    );

    let orchestrator = Arc::new(Orchestrator::new(
        llm.clone(),
        search,
        db.clone(),
        db.clone(),
        db.clone(),
    ));
    let studio = Arc::new(ImageStudio::new(
        llm.clone(),
        images.clone(),
        db.clone(),
        db.clone(),
        config.media_dir.clone(),
    ));
    let storybook = Arc::new(StorybookGenerator::new(llm.clone(), images, db));

    let state = AppState {
        orchestrator,
        studio,
        storybook,
        llm_model: llm.model_name().to_string(),
        search_enabled: config.search.api_key.is_some(),
    };

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    tracing::info!(port = config.port, "HTTP server started");
    axum::serve(listener, api::router(state)).await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "artisan-assist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}
