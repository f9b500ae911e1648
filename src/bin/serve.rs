use anyhow::{Context as _, Result};
use invoice_extractor::{
    web::{self, AppState},
    Config, OpenAiClient,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    invoice_extractor::init_tracing();

    let config = Config::from_env()?;
    let client = Arc::new(OpenAiClient::new(&config));

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, web::router(AppState { client })).await?;

    Ok(())
}
