use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use ui_forge::config::Config;
use ui_forge::orchestrator::Orchestrator;
use ui_forge::preview::PreviewService;
use ui_forge::routes::{router, AppState};
use ui_forge::store::{MemoryStore, ScreenshotFiles};
use ui_forge::stylesheet::TokenStylesheet;
use ui_forge::telemetry;
use ui_forge::tokens::DesignTokens;
use ui_forge::v0::{CompletionApi, V0Client};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    telemetry::init();

    let config = Config::from_env().context("invalid configuration")?;
    let tokens = Arc::new(match &config.tokens_path {
        Some(path) => DesignTokens::from_path(path)?,
        None => DesignTokens::embedded()?,
    });
    tracing::info!("🎨 Loaded design tokens v{} ({} theme)", tokens.version, tokens.theme);

    let api = config.api_key.clone().map(|key| {
        Arc::new(V0Client::new(key, config.api_base.clone())) as Arc<dyn CompletionApi>
    });
    match &api {
        Some(_) => tracing::info!("🔑 Using API key: {}", config.masked_api_key()),
        None => tracing::warn!("⚠️ V0_API_KEY is not set; generation requests will fail"),
    }

    let store = Arc::new(MemoryStore::new());
    let state = AppState {
        store: store.clone(),
        orchestrator: Arc::new(Orchestrator::new(
            store,
            api,
            tokens.clone(),
            Arc::new(TokenStylesheet::new(tokens.clone())),
        )),
        previews: Arc::new(PreviewService::new(tokens, config.isolation)),
        screenshots: Arc::new(ScreenshotFiles::new(&config.screenshot_dir)),
    };
    let app = router(state, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, isolation = %config.isolation, "🚀 Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("👋 Shutting down");
        })
        .await?;
    Ok(())
}
