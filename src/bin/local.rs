use anyhow::{Context as _, Result};
use invoice_extractor::{Config, ImageInput, OpenAiClient};
use std::{env, fs};

#[tokio::main]
async fn main() -> Result<()> {
    invoice_extractor::init_tracing();

    let image_path = env::args().nth(1).context("missing image argument")?;
    let image = fs::read(&image_path).with_context(|| format!("failed to read {image_path}"))?;

    let config = Config::from_env()?;
    let client = OpenAiClient::new(&config);

    let result = invoice_extractor::extract(&client, &ImageInput::from_bytes(&image)).await?;
    println!("{result}");

    Ok(())
}
