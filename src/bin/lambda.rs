use invoice_extractor::{
    web::{self, AppState},
    Config, OpenAiClient,
};
use lambda_http::{run, Error};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Error> {
    invoice_extractor::init_tracing();

    let config = Config::from_env()?;
    let client = Arc::new(OpenAiClient::new(&config));

    let app = web::router(AppState { client });

    run(app).await
}
