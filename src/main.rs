use clap::Parser;
use tracing_subscriber::EnvFilter;

use framefinder::cli::{self, Args, Command};
use framefinder::config::AppConfig;
use framefinder::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("framefinder=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Serve => server::run(config).await?,
        Command::Process { file } => cli::run_process(&config, &file).await?,
        Command::Search { query, top_k } => cli::run_search(&config, &query, top_k).await?,
        Command::Status => cli::run_status(&config).await?,
    }

    Ok(())
}
