//! `remix-studio` -- submit one audio file for remixing and save the result.
//!
//! # Environment variables
//!
//! | Variable           | Required | Default | Description                         |
//! |--------------------|----------|---------|-------------------------------------|
//! | `REMIX_INPUT`      | yes      | --      | Path of the audio file to upload    |
//! | `REMIX_PROMPT`     | yes      | --      | Free-text remix instruction         |
//! | `REMIX_OUTPUT_DIR` | no       | `.`     | Directory the result is written to  |
//!
//! Service settings (`REMIX_API_URL`, `REMIX_WS_URL`, ...) are read by
//! [`ClientConfig::from_env`].

use remix_client::ClientConfig;
use remix_studio::StudioOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "remix_studio=info,remix_session=info,remix_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env();
    let options = StudioOptions::from_env()?;

    tracing::info!(
        api_url = %config.api_url,
        input = %options.input.display(),
        "Starting remix-studio",
    );

    let saved = remix_studio::run(&config, &options).await?;
    tracing::info!(path = %saved.display(), "Remix saved");
    Ok(())
}
