use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use matchpro_core::{
    create_callback_authenticator, load_config, validate_config, CallbackAuthenticator,
    CallbackRegistry, HttpResultPoller, HttpSubmissionClient, PipelineConfig, PipelineFactory,
    ResultPoller, ResultRetrieval, RetrievalStrategy, SessionLimits, SessionRegistry,
    SubmissionClient,
};
use matchpro_server::api::create_router;
use matchpro_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Longest pause between two idle-session sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("MATCHPRO_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        "Configuration loaded successfully"
    );

    // Create callback authenticator
    let callback_authenticator: Arc<dyn CallbackAuthenticator> = Arc::from(
        create_callback_authenticator(&config.callback_auth)
            .context("Failed to create callback authenticator")?,
    );
    info!("Using callback authenticator: {}", callback_authenticator.method_name());

    let request_timeout = Duration::from_secs(config.analysis.request_timeout_secs);

    // Submission client
    let submitter: Arc<dyn SubmissionClient> = Arc::new(
        HttpSubmissionClient::new(
            config.analysis.submission_url.clone(),
            config.analysis.fields.clone(),
            request_timeout,
        )
        .context("Failed to create submission client")?,
    );
    info!("Submitting documents to {}", config.analysis.submission_url);

    // Result retrieval
    let (retrieval, callbacks) = match config.analysis.strategy {
        RetrievalStrategy::Poll => {
            let template = config
                .analysis
                .result_url
                .clone()
                .context("analysis.result_url is required with the poll strategy")?;
            info!(
                "Polling results from {} every {}ms",
                template, config.analysis.poll_interval_ms
            );
            let poller: Arc<dyn ResultPoller> = Arc::new(
                HttpResultPoller::new(template, request_timeout)
                    .context("Failed to create result poller")?,
            );
            (ResultRetrieval::Poll(poller), None)
        }
        RetrievalStrategy::Callback => {
            info!("Waiting for results on /api/v1/callbacks/analysis");
            let registry = Arc::new(CallbackRegistry::new());
            (
                ResultRetrieval::Callback(Arc::clone(&registry)),
                Some(registry),
            )
        }
    };

    let pipeline_config = PipelineConfig::from(&config);
    info!(
        "Wait budget {}s, document limit {} bytes",
        pipeline_config.wait.budget.as_secs(),
        pipeline_config.max_document_bytes
    );
    let session_limits = SessionLimits::from(&config.sessions);
    info!(
        "Sessions expire after {}s idle, at most {} live",
        session_limits.idle_ttl.as_secs(),
        session_limits.max_sessions
    );
    let sessions = SessionRegistry::with_limits(
        PipelineFactory::new(pipeline_config, submitter, retrieval),
        session_limits,
    );

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        sessions,
        callbacks,
        callback_authenticator,
    ));

    // Expire idle sessions in the background
    let sweeper = tokio::spawn(sweep_idle_sessions(
        Arc::clone(&state),
        session_limits.idle_ttl.min(SWEEP_INTERVAL),
    ));

    // Create router
    let app = create_router(Arc::clone(&state));

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    sweeper.abort();
    state.sessions().shutdown().await;

    info!("Server stopped");
    Ok(())
}

/// Periodically drop sessions that have been idle past their TTL.
async fn sweep_idle_sessions(state: Arc<AppState>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let expired = state.sessions().prune_idle().await;
        if expired > 0 {
            debug!(expired, live = state.sessions().len(), "Session sweep finished");
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
