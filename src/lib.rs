pub mod article;
pub mod cli_args;
pub mod config;
pub mod error;
pub mod git;
pub mod llm;
pub mod logging;
pub mod server;
pub mod wordpress;
