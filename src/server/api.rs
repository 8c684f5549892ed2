use std::path::PathBuf;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{ApiError, AppState};
use crate::article::{GenerationRequest, GitData};
use crate::error::GenerateError;
use crate::git;
use crate::llm::stream::collect_article;
use crate::wordpress::{self, PostDraft, WordPressClient};

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct TestOllamaBody {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanBody {
    github_path: Option<PathBuf>,
    selected_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TestWordPressBody {
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishBody {
    wp_url: Option<String>,
    wp_username: Option<String>,
    wp_password: Option<String>,
    article: Option<String>,
    title: Option<String>,
    status: Option<String>,
    #[serde(default)]
    categories: Vec<u64>,
    #[serde(default)]
    tags: Vec<u64>,
    post_id: Option<u64>,
    git_data: Option<GitData>,
}

/// An absent body (no JSON content type) reads as all-defaults.
fn body_or_default<T: DeserializeOwned + Default>(
    payload: Result<Json<T>, JsonRejection>,
) -> Result<T, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(rejection.into()),
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "commitpress",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn show_config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "config": state.config.redacted(),
    }))
}

/// Lists the models of the given (or configured) Ollama server.
pub async fn test_ollama(
    State(state): State<AppState>,
    payload: Result<Json<TestOllamaBody>, JsonRejection>,
) -> ApiResult {
    let body = body_or_default(payload)?;
    let url = non_blank(body.url).unwrap_or_else(|| state.config.ollama_base_url.clone());

    match state.ollama.list_models(&url).await {
        Ok(models) => {
            let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            log::info!("Ollama at {url} offers {} models", names.len());
            Ok(Json(json!({
                "success": true,
                "url": url,
                "models": names,
            })))
        }
        Err(e) => {
            log::warn!("Ollama connection test failed: {e}");
            Ok(Json(json!({
                "success": false,
                "error": e.to_string(),
            })))
        }
    }
}

pub async fn scan_git(
    State(state): State<AppState>,
    payload: Result<Json<ScanBody>, JsonRejection>,
) -> ApiResult {
    let body = body_or_default(payload)?;

    let root = body
        .github_path
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| state.config.default_git_path.clone())
        .ok_or_else(|| ApiError::bad_request("missing githubPath and no default path configured"))?;
    let date = non_blank(body.selected_date)
        .ok_or_else(|| ApiError::bad_request("missing selectedDate"))?;

    git::parse_day(&date).map_err(|e| ApiError::bad_request(format!("{e:#}")))?;
    if !root.is_dir() {
        return Err(ApiError::bad_request(format!(
            "path {} does not exist or is not a directory",
            root.display()
        )));
    }

    let depth = state.config.git_scan_depth;
    let result = tokio::task::spawn_blocking(move || git::scan_projects(&root, &date, depth))
        .await
        .map_err(anyhow::Error::from)??;

    Ok(Json(json!({
        "success": true,
        "data": result,
    })))
}

/// Non-streaming generation: same resolution as the SSE relay, one response.
pub async fn generate_article(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    let job = request.resolve(&state.config)?;
    let id = state.next_session_id();

    log::info!(
        "[session {id}] generating (non-streaming) for {} projects with {:?}",
        job.project_count,
        job.target.model()
    );

    let tokens = state
        .ollama
        .open(&job.target, &job.prompt)
        .await
        .map_err(GenerateError::from)?;
    let article = collect_article(tokens).await.map_err(GenerateError::from)?;

    log::info!("[session {id}] generated {} bytes", article.len());

    Ok(Json(json!({
        "success": true,
        "article": article,
        "metadata": {
            "projects": job.project_count,
            "totalCommits": job.commit_count,
            "date": job.date,
        },
    })))
}

pub async fn test_wordpress(
    State(state): State<AppState>,
    payload: Result<Json<TestWordPressBody>, JsonRejection>,
) -> ApiResult {
    let body = body_or_default(payload)?;
    let settings = &state.config.wordpress;

    let (Some(url), Some(username), Some(password)) = (
        non_blank(body.url).or_else(|| settings.url.clone()),
        non_blank(body.username).or_else(|| settings.username.clone()),
        non_blank(body.password).or_else(|| settings.token.clone()),
    ) else {
        return Err(ApiError::bad_request("missing WordPress url, username or password"));
    };

    let client = WordPressClient::new(&url, &username, &password)
        .map_err(|e| ApiError::bad_request(format!("{e:#}")))?;
    let user = client
        .test_connection()
        .await
        .map_err(|e| ApiError::bad_gateway(format!("{e:#}")))?;

    Ok(Json(json!({
        "success": true,
        "user": user,
    })))
}

pub async fn publish_wordpress(
    State(state): State<AppState>,
    payload: Result<Json<PublishBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let settings = &state.config.wordpress;

    let (Some(url), Some(username), Some(password), Some(article)) = (
        non_blank(body.wp_url).or_else(|| settings.url.clone()),
        non_blank(body.wp_username).or_else(|| settings.username.clone()),
        non_blank(body.wp_password).or_else(|| settings.token.clone()),
        non_blank(body.article),
    ) else {
        return Err(ApiError::bad_request("missing WordPress credentials or article"));
    };

    let date = body.git_data.as_ref().and_then(|d| d.date.as_deref());
    let draft = PostDraft {
        title: non_blank(body.title).unwrap_or_else(|| wordpress::derive_title(&article, date)),
        excerpt: Some(wordpress::default_excerpt(date)),
        status: non_blank(body.status).unwrap_or_else(|| "publish".to_string()),
        categories: body.categories,
        tags: body.tags,
        post_id: body.post_id,
        content: article,
    };

    let client = WordPressClient::new(&url, &username, &password)
        .map_err(|e| ApiError::bad_request(format!("{e:#}")))?;
    let post = client
        .publish(&draft)
        .await
        .map_err(|e| ApiError::bad_gateway(format!("{e:#}")))?;

    Ok(Json(json!({
        "success": true,
        "post": post,
    })))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("endpoint not found")
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
