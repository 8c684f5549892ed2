use anyhow::{Context, Result, anyhow};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A post to create, or to update when `post_id` is set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<u64>,
    #[serde(skip)]
    pub post_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedPost {
    pub id: u64,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub status: String,
}

/// Minimal WordPress REST client using application-password basic auth.
#[derive(Debug, Clone)]
pub struct WordPressClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
}

impl WordPressClient {
    pub fn new(url: &str, username: &str, password: &str) -> Result<Self> {
        let base_url = url.trim().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .with_context(|| format!("invalid WordPress URL {base_url:?}"))?;

        Ok(Self {
            http: Client::new(),
            base_url,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Fetch the authenticated user; proves the URL and credentials work.
    pub async fn test_connection(&self) -> Result<Value> {
        let url = format!("{}/wp-json/wp/v2/users/me", self.base_url);
        let resp = self.send(self.http.get(&url), &url).await?;

        resp.json()
            .await
            .with_context(|| format!("invalid JSON from {url}"))
    }

    pub async fn publish(&self, draft: &PostDraft) -> Result<PublishedPost> {
        let url = match draft.post_id {
            Some(id) => format!("{}/wp-json/wp/v2/posts/{id}", self.base_url),
            None => format!("{}/wp-json/wp/v2/posts", self.base_url),
        };

        log::info!("Publishing {:?} to {url}", draft.title);
        let resp = self.send(self.http.post(&url).json(draft), &url).await?;

        let post: PublishedPost = resp
            .json()
            .await
            .with_context(|| format!("invalid JSON from {url}"))?;
        log::info!("Published post {} at {}", post.id, post.link);

        Ok(post)
    }

    async fn send(&self, req: RequestBuilder, url: &str) -> Result<Response> {
        let resp = req
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .with_context(|| format!("failed to reach WordPress at {url}"))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(anyhow!(
            "WordPress returned HTTP {}: {}",
            status.as_u16(),
            wordpress_message(&body)
        ))
    }
}

/// WordPress errors look like `{"code": "...", "message": "..."}`.
fn wordpress_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Title for an article: its first `<h1>` as plain text, or a dated fallback.
pub fn derive_title(article: &str, date: Option<&str>) -> String {
    if let Some(h1) = first_h1(article) {
        let text = strip_tags(h1);
        let text = text.trim();
        if !text.is_empty() {
            return text.to_string();
        }
    }

    let date = date
        .map(str::to_string)
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
    format!("Project progress - {date}")
}

pub fn default_excerpt(date: Option<&str>) -> String {
    match date {
        Some(date) => format!("Summary of programming project progress from {date}"),
        None => "Summary of programming project progress".to_string(),
    }
}

fn first_h1(html: &str) -> Option<&str> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<h1")?;
    let content_start = open + lower[open..].find('>')? + 1;
    let content_end = content_start + lower[content_start..].find("</h1>")?;
    Some(&html[content_start..content_end])
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_comes_from_first_h1() {
        let article = r#"<H1 class="t">Big <em>day</em></H1><p>x</p><h1>Second</h1>"#;
        assert_eq!(derive_title(article, Some("2024-05-01")), "Big day");
    }

    #[test]
    fn title_falls_back_to_date() {
        assert_eq!(
            derive_title("<p>no heading</p>", Some("2024-05-01")),
            "Project progress - 2024-05-01"
        );
        assert_eq!(
            derive_title("<h1> <br> </h1>", Some("2024-05-01")),
            "Project progress - 2024-05-01"
        );
        assert!(derive_title("", None).starts_with("Project progress - "));
    }

    #[test]
    fn excerpt_mentions_date_when_known() {
        assert_eq!(
            default_excerpt(Some("2024-05-01")),
            "Summary of programming project progress from 2024-05-01"
        );
        assert_eq!(default_excerpt(None), "Summary of programming project progress");
    }

    #[test]
    fn draft_omits_empty_optionals_and_post_id() {
        let draft = PostDraft {
            title: "T".into(),
            content: "<p>c</p>".into(),
            status: "draft".into(),
            post_id: Some(7),
            ..PostDraft::default()
        };
        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json["status"], "draft");
        assert!(json.get("excerpt").is_none());
        assert!(json.get("categories").is_none());
        assert!(json.get("post_id").is_none());
    }

    #[test]
    fn error_message_prefers_wordpress_field() {
        assert_eq!(
            wordpress_message(r#"{"code":"rest_forbidden","message":"Sorry, you are not allowed."}"#),
            "Sorry, you are not allowed."
        );
        assert_eq!(wordpress_message("Bad Gateway\n"), "Bad Gateway");
    }

    #[test]
    fn rejects_invalid_url() {
        assert!(WordPressClient::new("not a url", "u", "p").is_err());
        assert!(WordPressClient::new("https://blog.example.com/", "u", "p").is_ok());
    }
}
