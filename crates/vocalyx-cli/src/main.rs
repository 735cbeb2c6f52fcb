use anyhow::Result;
use clap::Parser;
use vocalyx_cli::VocalyxCli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    vocalyx_cli::run(VocalyxCli::parse()).await
}
