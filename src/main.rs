use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use workflowiq_ai::{api, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real deployments use the environment.
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!(
        "Starting {} v{} on {}",
        api::SERVICE_NAME,
        env!("CARGO_PKG_VERSION"),
        config.bind_addr()
    );

    api::serve(config).await
}
