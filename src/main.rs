use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use plc_verifier::api::{create_router, AppState};
use plc_verifier::application::{DocumentService, RagService, SessionRegistry, VerifierService};
use plc_verifier::infrastructure::{
    AppConfig, InMemoryIndexBuilder, OpenAiChatModel, TextEmbedding, XmlDocumentLoader,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::load()?;
    info!(
        llm = %config.config.llm.model,
        embedding = %config.config.embedding.model,
        dispatch = ?config.config.templates.dispatch,
        "configuration loaded"
    );

    let verifier = Arc::new(build_verifier(&config)?);

    let sessions = &config.config.sessions;
    verifier.sessions().clone().spawn_sweeper(
        Duration::from_secs(sessions.idle_ttl_seconds),
        Duration::from_secs(sessions.sweep_interval_seconds),
    );

    let addr = SocketAddr::new(
        config.config.server.host.parse()?,
        config.config.server.port,
    );
    let app = create_router(AppState::new(verifier, config));

    info!("API server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "plc_verifier=debug,api=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_verifier(config: &AppConfig) -> anyhow::Result<VerifierService> {
    let settings = &config.config;

    let loader = Arc::new(XmlDocumentLoader::new(
        settings.uploads.allowed_extensions.clone(),
    ));
    let documents = DocumentService::new(loader, config.splitter()?);

    let embedding = Arc::new(TextEmbedding::from_config(&settings.embedding));
    let rag = RagService::new(embedding, Arc::new(InMemoryIndexBuilder), settings.retrieval);

    let llm = Arc::new(OpenAiChatModel::new(
        &settings.llm,
        config.credentials.api_key.clone(),
    ));

    Ok(VerifierService::new(
        Arc::new(SessionRegistry::new()),
        documents,
        rag,
        llm,
        config.prompts.clone(),
        settings.templates.dispatch,
    ))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
