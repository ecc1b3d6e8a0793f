use clap::Parser;
use kvlink_server::{Args, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("kvlink=info".parse()?))
        .init();

    let args = Args::parse();
    let config = Config::load(&args)?;
    tracing::info!(
        "Starting kvlink on {} (store {}:{})",
        config.listen_addr(),
        config.backend.host,
        config.backend.port
    );

    kvlink_server::run(config).await
}
