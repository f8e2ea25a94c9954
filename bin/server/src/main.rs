use parley_ai::OpenAiCompatibleProvider;
use parley_conversation::{
    ConversationStore, InMemoryConversationStore, JsonDirectoryConversationStore, SessionManager,
    TracingReporter,
};
use parley_platform_access::StaticTokenVerifier;
use parley_server::{
    AppState,
    config::{ServerConfig, StoreBackend},
    error::StartupError,
    router,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    // Load configuration from environment
    let config = ServerConfig::from_env()?;
    tracing::info!(
        provider = %config.provider.kind,
        model = %config.provider.model,
        store = ?config.conversation.store.backend,
        "Loaded configuration"
    );

    let provider = OpenAiCompatibleProvider::new(config.provider.clone())?;

    let store: Arc<dyn ConversationStore> = match config.conversation.store.backend {
        StoreBackend::Memory => Arc::new(InMemoryConversationStore::new()),
        StoreBackend::JsonDirectory => Arc::new(
            JsonDirectoryConversationStore::open(&config.conversation.store.directory).await?,
        ),
    };

    if config.auth.tokens.is_empty() {
        tracing::warn!("No bearer tokens configured; every authenticated request will be rejected");
    }
    let verifier = StaticTokenVerifier::from(config.auth.tokens.clone())
        .with_denied(config.auth.denied_subjects().map(str::to_string));

    let manager = SessionManager::new(
        store,
        Arc::new(provider),
        Arc::new(TracingReporter::new()),
        config.conversation.session_config(),
    );
    let app = router(Arc::new(AppState::new(manager, Arc::new(verifier))));

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .map_err(|e| StartupError::Bind {
            address: config.bind_address.clone(),
            reason: e.to_string(),
        })?;

    tracing::info!("listening on http://{}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(StartupError::Serve)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
