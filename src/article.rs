use serde::{Deserialize, Deserializer, Serialize};

use crate::config::Config;
use crate::error::GenerateError;
use crate::git::Project;
use crate::llm::UpstreamTarget;
use crate::llm::prompt_builder::build_prompt;

/// Payload of an article generation request, as sent by the browser.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default)]
    pub git_data: Option<GitData>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ollama_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub custom_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub custom_prompt: Option<String>,
}

/// The scanner output embedded in a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GitData {
    pub projects: Vec<Project>,
    pub date: Option<String>,
}

/// Everything needed to run one generation, fixed at request start.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub target: UpstreamTarget,
    pub prompt: String,
    pub project_count: usize,
    pub commit_count: usize,
    pub date: Option<String>,
}

impl GenerationRequest {
    /// Decode the URL-decoded `data` query parameter.
    pub fn from_query(data: Option<&str>) -> Result<Self, GenerateError> {
        let data = data
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| GenerateError::validation("missing 'data' query parameter"))?;

        serde_json::from_str(data)
            .map_err(|e| GenerateError::validation(format!("request data is not valid JSON: {e}")))
    }

    /// Merge the request with configured defaults.
    ///
    /// Model: request, then `default_model`; neither is a validation error.
    /// Ollama URL: request, then `ollama_base_url`.
    pub fn resolve(&self, config: &Config) -> Result<GenerationJob, GenerateError> {
        let prompt = build_prompt(self, &config.article)?;

        let model = non_blank(self.model.as_deref())
            .or_else(|| non_blank(config.default_model.as_deref()))
            .ok_or_else(|| {
                GenerateError::validation("no model selected and no default model configured")
            })?;

        let base_url =
            non_blank(self.ollama_url.as_deref()).unwrap_or(config.ollama_base_url.as_str());
        let target = UpstreamTarget::new(base_url, model)?;

        let (project_count, commit_count, date) = match &self.git_data {
            Some(data) => (
                data.projects.len(),
                data.projects.iter().map(|p| p.commits.len()).sum(),
                data.date.clone(),
            ),
            None => (0, 0, None),
        };

        Ok(GenerationJob {
            target,
            prompt,
            project_count,
            commit_count,
            date,
        })
    }
}

/// Strings pass through; any other JSON value reads as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    })
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"{
        "gitData": {"projects": [{"name": "repo1", "commits": [{"message": "fix bug"}]}]},
        "model": "llama2"
    }"#;

    #[test]
    fn example_payload_resolves() {
        let req = GenerationRequest::from_query(Some(EXAMPLE)).unwrap();
        let job = req.resolve(&Config::default()).unwrap();

        assert_eq!(job.target.model(), "llama2");
        assert_eq!(job.target.base_url(), "http://localhost:11434");
        assert_eq!(job.project_count, 1);
        assert_eq!(job.commit_count, 1);
        assert!(job.prompt.contains("repo1"));
        assert!(job.prompt.contains("fix bug"));
    }

    #[test]
    fn missing_or_blank_data_is_rejected() {
        for data in [None, Some(""), Some("   ")] {
            let err = GenerationRequest::from_query(data).unwrap_err();
            assert!(err.to_string().contains("missing 'data'"));
        }
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = GenerationRequest::from_query(Some("{oops")).unwrap_err();
        assert!(matches!(err, GenerateError::Validation(msg) if msg.contains("not valid JSON")));
    }

    #[test]
    fn model_falls_back_to_configured_default() {
        let req = GenerationRequest::from_query(Some(
            r#"{"gitData":{"projects":[{"name":"repo1"}]}}"#,
        ))
        .unwrap();

        let err = req.resolve(&Config::default()).unwrap_err();
        assert!(err.to_string().contains("no model selected"));

        let config = Config {
            default_model: Some("llama3:latest".into()),
            ..Config::default()
        };
        assert_eq!(req.resolve(&config).unwrap().target.model(), "llama3:latest");
    }

    #[test]
    fn missing_projects_win_over_missing_model() {
        let req = GenerationRequest::from_query(Some(r#"{"gitData":{"projects":[]}}"#)).unwrap();
        let err = req.resolve(&Config::default()).unwrap_err();
        assert!(err.to_string().contains("no Git data"));
    }

    #[test]
    fn request_url_overrides_config_and_is_validated() {
        let req = GenerationRequest::from_query(Some(
            r#"{"gitData":{"projects":[{"name":"r"}]},"model":"m","ollamaUrl":"http://gpu-box:11437/"}"#,
        ))
        .unwrap();
        let job = req.resolve(&Config::default()).unwrap();
        assert_eq!(job.target.base_url(), "http://gpu-box:11437");

        let bad = GenerationRequest {
            ollama_url: Some("gpu-box".into()),
            ..req
        };
        assert!(matches!(
            bad.resolve(&Config::default()),
            Err(GenerateError::Validation(_))
        ));
    }

    #[test]
    fn non_string_fields_are_ignored() {
        let req = GenerationRequest::from_query(Some(
            r#"{"gitData":{"projects":[{"name":"r"}]},"model":"m","customPrompt":{},"customTitle":null}"#,
        ))
        .unwrap();
        assert_eq!(req.custom_prompt, None);
        assert_eq!(req.custom_title, None);
        assert_eq!(req.model.as_deref(), Some("m"));
    }
}
