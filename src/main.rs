use anyhow::{Context, Result, anyhow};
use clap::Parser;

use commitpress::cli_args::{Cli, Command};
use commitpress::config::Config;
use commitpress::{git, logging, server};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose);

    let config = Config::from_sources(&cli)?;
    log::debug!("Resolved config: {:?}", config.redacted());

    match cli.command {
        Some(Command::Scan { path, date }) => {
            let root = path
                .or_else(|| config.default_git_path.clone())
                .ok_or_else(|| anyhow!("no path given and DEFAULT_GITHUB_PATH is not set"))?;
            let date = date.unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
            let depth = config.git_scan_depth;

            let result = tokio::task::spawn_blocking(move || git::scan_projects(&root, &date, depth))
                .await
                .context("scan task panicked")??;

            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Some(Command::Serve { .. }) | None => server::serve(config).await,
    }
}
