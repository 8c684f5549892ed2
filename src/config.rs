use crate::cli_args::{Cli, Command};
use crate::llm::SamplingOptions;
use crate::llm::prompt_builder::ArticleStyle;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SCAN_DEPTH: usize = 3;

/// Final resolved configuration for commitpress.
///
/// Built once at startup and shared read-only by every request handler.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub ollama_base_url: String,
    /// Used when a generation request does not name a model.
    pub default_model: Option<String>,
    /// Bounds connection setup and every read from the Ollama response body.
    pub ollama_timeout_ms: u64,
    pub sampling: SamplingOptions,
    pub article: ArticleStyle,
    pub git_scan_depth: usize,
    pub default_git_path: Option<PathBuf>,
    pub wordpress: WordPressSettings,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WordPressSettings {
    pub url: Option<String>,
    pub username: Option<String>,
    pub token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ollama_base_url: DEFAULT_OLLAMA_URL.to_string(),
            default_model: None,
            ollama_timeout_ms: DEFAULT_TIMEOUT_MS,
            sampling: SamplingOptions::default(),
            article: ArticleStyle::default(),
            git_scan_depth: DEFAULT_SCAN_DEPTH,
            default_git_path: None,
            wordpress: WordPressSettings::default(),
        }
    }
}

impl Config {
    /// Build the final config from CLI flags, environment, TOML file, and defaults.
    ///
    /// Precedence:
    ///   1. CLI flags (`--model`, `--ollama-url`, `serve --host/--port`)
    ///   2. Env vars (`DEFAULT_MODEL`, `OLLAMA_BASE_URL`, `PORT`, ...)
    ///   3. TOML `~/.config/commitpress.toml` (or `--config <path>`)
    ///   4. Hardcoded defaults
    pub fn from_sources(cli: &Cli) -> Result<Self> {
        let file_cfg = match &cli.config {
            Some(path) => load_file_config(path)?,
            None => match config_path() {
                Some(path) if path.exists() => load_file_config(&path)?,
                _ => FileConfig::default(),
            },
        };

        Self::resolve(cli, file_cfg, |key| env::var(key).ok())
    }

    /// Merge the sources with an explicit environment lookup.
    pub fn resolve<E>(cli: &Cli, file: FileConfig, env: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let (host_cli, port_cli) = match &cli.command {
            Some(Command::Serve { host, port }) => (host.clone(), *port),
            _ => (None, None),
        };

        let host = host_cli
            .or_else(|| lookup("HOST"))
            .or(file.host)
            .unwrap_or(defaults.host);

        let port = match port_cli {
            Some(p) => p,
            None => parse_env(&lookup, "PORT")?
                .or(file.port)
                .unwrap_or(defaults.port),
        };

        let ollama_base_url = cli
            .ollama_url
            .clone()
            .or_else(|| lookup("OLLAMA_BASE_URL"))
            .or(file.ollama_base_url)
            .unwrap_or(defaults.ollama_base_url)
            .trim_end_matches('/')
            .to_string();

        let default_model = cli
            .model
            .clone()
            .or_else(|| lookup("DEFAULT_MODEL"))
            .or(file.default_model)
            .filter(|m| !m.trim().is_empty());

        let ollama_timeout_ms = parse_env(&lookup, "OLLAMA_TIMEOUT")?
            .or(file.ollama_timeout_ms)
            .unwrap_or(defaults.ollama_timeout_ms);
        if ollama_timeout_ms == 0 {
            return Err(anyhow!("OLLAMA_TIMEOUT must be greater than zero"));
        }

        let sampling = SamplingOptions {
            temperature: parse_env(&lookup, "OLLAMA_TEMPERATURE")?
                .or(file.temperature)
                .unwrap_or(defaults.sampling.temperature),
            top_p: parse_env(&lookup, "OLLAMA_TOP_P")?
                .or(file.top_p)
                .unwrap_or(defaults.sampling.top_p),
            top_k: parse_env(&lookup, "OLLAMA_TOP_K")?
                .or(file.top_k)
                .unwrap_or(defaults.sampling.top_k),
        };

        let article = ArticleStyle {
            prompt_prefix: lookup("PROMPT_PREFIX").or(file.prompt_prefix),
            language: lookup("ARTICLE_LANGUAGE")
                .or(file.article_language)
                .unwrap_or(defaults.article.language),
            tone: lookup("ARTICLE_TONE")
                .or(file.article_tone)
                .unwrap_or(defaults.article.tone),
        };

        let git_scan_depth = parse_env(&lookup, "GIT_SCAN_DEPTH")?
            .or(file.git_scan_depth)
            .unwrap_or(defaults.git_scan_depth);

        let default_git_path = lookup("DEFAULT_GITHUB_PATH")
            .or_else(|| lookup("GIT_PATH"))
            .map(PathBuf::from)
            .or(file.default_git_path);

        let wordpress = WordPressSettings {
            url: lookup("WORDPRESS_URL").or(file.wordpress_url),
            username: lookup("WORDPRESS_USERNAME").or(file.wordpress_username),
            token: lookup("WORDPRESS_TOKEN").or(file.wordpress_token),
        };

        Ok(Config {
            host,
            port,
            ollama_base_url,
            default_model,
            ollama_timeout_ms,
            sampling,
            article,
            git_scan_depth,
            default_git_path,
            wordpress,
        })
    }

    pub fn ollama_timeout(&self) -> Duration {
        Duration::from_millis(self.ollama_timeout_ms)
    }

    /// Config as JSON with secrets masked, for the config endpoint.
    pub fn redacted(&self) -> serde_json::Value {
        let mut shown = self.clone();
        if shown.wordpress.token.is_some() {
            shown.wordpress.token = Some("***".to_string());
        }
        serde_json::to_value(&shown).unwrap_or(serde_json::Value::Null)
    }
}

/// Optional overrides read from the TOML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ollama_base_url: Option<String>,
    pub default_model: Option<String>,
    pub ollama_timeout_ms: Option<u64>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub prompt_prefix: Option<String>,
    pub article_language: Option<String>,
    pub article_tone: Option<String>,
    pub git_scan_depth: Option<usize>,
    pub default_git_path: Option<PathBuf>,
    pub wordpress_url: Option<String>,
    pub wordpress_username: Option<String>,
    pub wordpress_token: Option<String>,
}

/// Return `~/.config/commitpress.toml`
fn config_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(home.join(".config").join("commitpress.toml"))
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    toml::from_str::<FileConfig>(&data)
        .with_context(|| format!("failed to parse config file {:?}", path))
}

fn parse_env<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("invalid value for {key} ({raw:?}): {e}")),
        None => Ok(None),
    }
}
