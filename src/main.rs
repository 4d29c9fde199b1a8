use beacon::config::Cli;
use beacon::server::Server;
use clap::Parser;
use tracing::Level;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let cfg = cli.into_config()?;
    tracing::info!(root = %cfg.files.root.display(), "Serving files");

    let server = Server::bind(&cfg).await?;
    server.run(shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
