use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// CLI options
#[derive(Parser, Debug, Default)]
#[command(
    name = "commitpress",
    version,
    about = "Turns a day's Git commits into a blog article with a local LLM"
)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to a TOML config file (defaults to ~/.config/commitpress.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the Ollama server (e.g. http://localhost:11434)
    #[arg(long, global = true)]
    pub ollama_url: Option<String>,

    /// Default model used when a request does not name one
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Subcommand; defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server (article streaming, Git scanning, WordPress publishing)
    Serve {
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },

    /// Scan a directory tree for Git repositories with commits on a given day
    Scan {
        /// Root directory to scan; defaults to DEFAULT_GITHUB_PATH
        path: Option<PathBuf>,

        /// Day to collect commits for (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<String>,
    },
}
