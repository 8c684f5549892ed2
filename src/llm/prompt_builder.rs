use serde::{Deserialize, Serialize};

use crate::article::GenerationRequest;
use crate::error::GenerateError;
use crate::git::Project;
use crate::llm::prompts;

/// Configured defaults for how articles are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleStyle {
    /// Instructional prefix; the built-in one is used when unset.
    pub prompt_prefix: Option<String>,
    pub language: String,
    pub tone: String,
}

impl Default for ArticleStyle {
    fn default() -> Self {
        ArticleStyle {
            prompt_prefix: None,
            language: "Polish".to_string(),
            tone: "professional".to_string(),
        }
    }
}

/// Render the generation prompt for one request.
///
/// Fails only when the request carries no project data.
pub fn build_prompt(request: &GenerationRequest, style: &ArticleStyle) -> Result<String, GenerateError> {
    let git_data = request
        .git_data
        .as_ref()
        .filter(|data| !data.projects.is_empty())
        .ok_or_else(|| GenerateError::validation("no Git data to analyze"))?;

    let prefix = non_blank(request.custom_prompt.as_deref())
        .or_else(|| non_blank(style.prompt_prefix.as_deref()))
        .unwrap_or(prompts::ARTICLE_PREFIX);

    let mut prompt = String::new();
    prompt.push_str(prefix);
    prompt.push_str("\n\nINSTRUCTIONS:\n");
    prompt.push_str(&format!(
        "- Write in {language}.\n- Use a {tone} but approachable tone.\n",
        language = style.language,
        tone = style.tone
    ));
    prompt.push_str(prompts::ARTICLE_RULES);

    prompt.push_str("\n\nDATA:\n");
    prompt.push_str(&format!(
        "Date: {}\n",
        git_data.date.as_deref().unwrap_or("unknown")
    ));
    if let Some(title) = non_blank(request.custom_title.as_deref()) {
        prompt.push_str(&format!("Suggested title: {title}\n"));
    }

    prompt.push_str("\nPROJECT DETAILS:\n");
    let projects: Vec<String> = git_data.projects.iter().map(render_project).collect();
    prompt.push_str(&projects.join("\n\n"));

    prompt.push_str("\n\n");
    prompt.push_str(prompts::ARTICLE_STRUCTURE);

    Ok(prompt)
}

fn render_project(project: &Project) -> String {
    let mut out = String::new();
    out.push_str(&format!("## Project: {}\n", project.name));
    out.push_str(&format!(
        "Branch: {}\n",
        project.branch.as_deref().unwrap_or("main")
    ));
    out.push_str(&format!("Commits ({}):\n", project.commits.len()));

    for commit in &project.commits {
        let stats = commit
            .stats
            .map(|s| format!(" (+{} -{} lines)", s.insertions, s.deletions))
            .unwrap_or_default();
        let files = if commit.files.is_empty() {
            "no file changes".to_string()
        } else {
            commit.files.join(", ")
        };

        out.push_str(&format!("  - {}{stats}\n", commit.message.trim()));
        out.push_str(&format!("    Files: {files}\n"));
        if !commit.author.is_empty() {
            out.push_str(&format!("    Author: {}\n", commit.author));
        }
    }

    let (insertions, deletions) = project.line_totals();
    out.push_str(&format!("Total changes: +{insertions} -{deletions} lines"));

    if let Some(remote) = &project.remote {
        out.push_str(&format!("\nRepository: {remote}"));
    }

    out
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
