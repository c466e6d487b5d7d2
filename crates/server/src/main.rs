use clap::Parser;
use server::config::{ServerArgs, ServerConfig};
use server::{create_router, state::AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server=debug,orchestrator=debug".into()),
        )
        .init();

    let args = ServerArgs::parse();
    let config = ServerConfig::read(&args.config).await.with_args(&args);

    let store = config.open_store().await?;
    let state = AppState::new(store, config.pipeline.to_pipeline_config());
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
