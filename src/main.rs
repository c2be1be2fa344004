use anyhow::Context;
use payout_engine::sinks::{AnalyticsSink, AutomationWebhookSink};
use payout_engine::{
    api, config::Config, db::init_db, Distributor, HttpExecutionClient, LifecycleEngine,
    Repository, SideEffectSink,
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    let state = match build_state(&config).await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Failed to start: {:#}", e);
            std::process::exit(1);
        }
    };

    // Create router
    let app = api::create_router(state);

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        treatment_window_secs = config.engine.treatment_window.as_secs(),
        settle_without_handle = config.engine.settle_without_handle,
        "Server listening on {}",
        addr
    );

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn build_state(config: &Config) -> anyhow::Result<api::AppState> {
    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("opening database at {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));

    let execution = HttpExecutionClient::new(
        config.execution_api_url.clone(),
        config.execution_api_key.clone(),
    )
    .context("building execution client")?;

    let mut sinks: Vec<Arc<dyn SideEffectSink>> = Vec::new();
    if let Some(url) = &config.analytics_url {
        sinks.push(Arc::new(AnalyticsSink::new(url.clone())));
    }
    if let Some(url) = &config.automation_webhook_url {
        sinks.push(Arc::new(AutomationWebhookSink::new(
            url.clone(),
            config.automation_webhook_secret.clone(),
        )));
    }
    tracing::info!(sinks = sinks.len(), "Side-effect sinks configured");

    let engine = LifecycleEngine::new(
        repo.clone(),
        Arc::new(execution),
        sinks,
        config.engine.clone(),
    );
    let distributor = Distributor::new(engine, repo.clone(), repo, config.rewards.clone());
    Ok(api::AppState::new(distributor))
}
