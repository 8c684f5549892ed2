use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command as GitCommand;
use walkdir::WalkDir;

/// Field separator used in `git log --pretty` output; cannot occur in subjects.
const FIELD_SEP: char = '\u{1f}';

/// A commit made on the scanned day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Commit {
    /// First 8 characters of `full_hash`.
    pub hash: String,
    pub full_hash: String,
    pub message: String,
    pub author: String,
    pub email: String,
    pub date: String,
    pub files: Vec<String>,
    pub stats: Option<CommitStats>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommitStats {
    pub insertions: u64,
    pub deletions: u64,
    pub files_changed: u64,
}

/// A repository with its commits for the day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub name: String,
    pub path: Option<PathBuf>,
    pub branch: Option<String>,
    pub remote: Option<String>,
    pub commits: Vec<Commit>,
}

impl Project {
    /// Summed (insertions, deletions) over all commits.
    pub fn line_totals(&self) -> (u64, u64) {
        self.commits
            .iter()
            .filter_map(|c| c.stats)
            .fold((0, 0), |(ins, del), s| (ins + s.insertions, del + s.deletions))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub projects: Vec<Project>,
    pub date: String,
    pub scanned_repos: usize,
    pub active_projects: usize,
}

/// Run a git command inside `repo` and capture stdout as String.
pub fn git_output(repo: &Path, args: &[&str]) -> Result<String> {
    let output = GitCommand::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .with_context(|| format!("failed to run git {:?} in {:?}", args, repo))?;

    if !output.status.success() {
        return Err(anyhow!(
            "git {:?} in {:?} exited with status {:?}: {}",
            args,
            repo,
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Parse a `YYYY-MM-DD` day.
pub fn parse_day(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date {date:?}, expected YYYY-MM-DD"))
}

/// Find every repository under `root` and collect the commits made on `date`.
///
/// Only repositories with at least one commit that day are returned.
pub fn scan_projects(root: &Path, date: &str, max_depth: usize) -> Result<ScanResult> {
    let day = parse_day(date)?;
    if !root.is_dir() {
        bail!("path {:?} does not exist or is not a directory", root);
    }

    log::info!("Scanning {:?} for Git repositories", root);
    let repos = find_repositories(root, max_depth);
    log::info!("Found {} Git repositories", repos.len());

    let mut projects = Vec::new();
    for repo in &repos {
        match analyze_repository(repo, day) {
            Ok(project) if !project.commits.is_empty() => projects.push(project),
            Ok(_) => log::debug!("No commits in {:?} on {day}", repo),
            Err(e) => log::warn!("Failed to analyze {:?}: {e:#}", repo),
        }
    }

    log::info!(
        "Found {} projects with commits on {day}",
        projects.len()
    );

    Ok(ScanResult {
        date: day.to_string(),
        scanned_repos: repos.len(),
        active_projects: projects.len(),
        projects,
    })
}

/// Directories up to `max_depth` levels below `root` that contain `.git`.
/// Repositories are not descended into.
pub fn find_repositories(root: &Path, max_depth: usize) -> Vec<PathBuf> {
    let mut repos = Vec::new();
    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth + 1)
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("Skipping unreadable entry: {e}");
                continue;
            }
        };

        if !entry.file_type().is_dir() {
            continue;
        }

        if entry.path().join(".git").exists() {
            repos.push(entry.into_path());
            walker.skip_current_dir();
        }
    }

    repos.sort();
    repos
}

fn analyze_repository(repo: &Path, day: NaiveDate) -> Result<Project> {
    let name = repo
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| repo.display().to_string());
    log::debug!("Analyzing project {name}");

    let since = format!("--since={day} 00:00:00");
    let until = format!("--until={day} 23:59:59");
    let log_output = match git_output(
        repo,
        &[
            "log",
            &since,
            &until,
            "--pretty=format:%H%x1f%s%x1f%an%x1f%ad%x1f%ae",
            "--date=short",
        ],
    ) {
        Ok(out) => out,
        Err(e) => {
            // Fresh repositories without commits make `git log` fail.
            log::debug!("No readable history in {name}: {e:#}");
            String::new()
        }
    };

    let mut commits = Vec::new();
    for line in log_output.lines() {
        let Some(mut commit) = parse_log_line(line) else {
            continue;
        };

        let files = git_output(repo, &["show", "--name-only", "--pretty=format:", &commit.full_hash])?;
        commit.files = files
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();

        let shortstat = git_output(repo, &["show", "--shortstat", "--pretty=format:", &commit.full_hash])?;
        commit.stats = Some(parse_shortstat(&shortstat));

        commits.push(commit);
    }

    let branch = git_output(repo, &["branch", "--show-current"])
        .ok()
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty());

    let remote = git_output(repo, &["remote", "get-url", "origin"])
        .ok()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());

    Ok(Project {
        name,
        path: Some(repo.to_path_buf()),
        branch,
        remote,
        commits,
    })
}

/// Parse one `%H␟%s␟%an␟%ad␟%ae` line.
fn parse_log_line(line: &str) -> Option<Commit> {
    let fields: Vec<&str> = line.split(FIELD_SEP).collect();
    let [full_hash, message, author, date, email] = fields.as_slice() else {
        return None;
    };

    let full_hash = full_hash.trim();
    if full_hash.is_empty() {
        return None;
    }

    Some(Commit {
        hash: full_hash.chars().take(8).collect(),
        full_hash: full_hash.to_string(),
        message: message.trim().to_string(),
        author: author.trim().to_string(),
        email: email.trim().to_string(),
        date: date.trim().to_string(),
        files: Vec::new(),
        stats: None,
    })
}

/// Parse ` 3 files changed, 10 insertions(+), 2 deletions(-)`.
/// Either count may be missing when it is zero.
fn parse_shortstat(text: &str) -> CommitStats {
    let mut stats = CommitStats::default();

    for part in text.lines().flat_map(|l| l.split(',')) {
        let part = part.trim();
        let Some((count, rest)) = part.split_once(' ') else {
            continue;
        };
        let Ok(count) = count.parse::<u64>() else {
            continue;
        };

        if rest.starts_with("file") {
            stats.files_changed += count;
        } else if rest.starts_with("insertion") {
            stats.insertions += count;
        } else if rest.starts_with("deletion") {
            stats.deletions += count;
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;

    #[test]
    fn shortstat_with_all_counts() {
        let stats = parse_shortstat("\n 3 files changed, 10 insertions(+), 2 deletions(-)\n");
        assert_eq!(
            stats,
            CommitStats {
                insertions: 10,
                deletions: 2,
                files_changed: 3
            }
        );
    }

    #[test]
    fn shortstat_with_only_insertions() {
        let stats = parse_shortstat(" 1 file changed, 1 insertion(+)");
        assert_eq!(stats.insertions, 1);
        assert_eq!(stats.deletions, 0);
        assert_eq!(stats.files_changed, 1);
        assert_eq!(parse_shortstat(""), CommitStats::default());
    }

    #[test]
    fn log_line_keeps_pipes_in_subject() {
        let line = "0123456789abcdef\u{1f}fix: a | b\u{1f}Ada\u{1f}2024-05-01\u{1f}ada@example.com";
        let commit = parse_log_line(line).unwrap();
        assert_eq!(commit.hash, "01234567");
        assert_eq!(commit.full_hash, "0123456789abcdef");
        assert_eq!(commit.message, "fix: a | b");
        assert_eq!(commit.author, "Ada");
        assert_eq!(commit.email, "ada@example.com");
        assert_eq!(commit.date, "2024-05-01");
    }

    #[test]
    fn log_line_with_missing_fields_is_ignored() {
        assert!(parse_log_line("").is_none());
        assert!(parse_log_line("abc\u{1f}subject").is_none());
    }

    #[test]
    fn day_must_be_iso() {
        assert!(parse_day("2024-05-01").is_ok());
        assert!(parse_day("01.05.2024").is_err());
        assert!(parse_day("2024-13-01").is_err());
    }

    #[test]
    fn repositories_are_found_without_descending() {
        let root = tempfile::tempdir().unwrap();
        let p = root.path();
        fs::create_dir_all(p.join("alpha/.git")).unwrap();
        fs::create_dir_all(p.join("alpha/vendor/nested/.git")).unwrap();
        fs::create_dir_all(p.join("group/beta/.git")).unwrap();
        fs::create_dir_all(p.join("a/b/c/d/too-deep/.git")).unwrap();
        fs::create_dir_all(p.join("plain")).unwrap();

        let repos = find_repositories(p, 3);
        assert_eq!(repos, vec![p.join("alpha"), p.join("group/beta")]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let err = scan_projects(Path::new("/definitely/not/here"), "2024-05-01", 3).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn project_totals_sum_commit_stats() {
        let stats = |i, d| {
            Some(CommitStats {
                insertions: i,
                deletions: d,
                files_changed: 1,
            })
        };
        let project = Project {
            commits: vec![
                Commit { stats: stats(5, 1), ..Commit::default() },
                Commit { stats: None, ..Commit::default() },
                Commit { stats: stats(2, 3), ..Commit::default() },
            ],
            ..Project::default()
        };
        assert_eq!(project.line_totals(), (7, 4));
    }

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok_and(|o| o.status.success())
    }

    fn git(repo: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(["-c", "user.name=Ada", "-c", "user.email=ada@example.com", "-c", "commit.gpgsign=false"])
            .args(args)
            .current_dir(repo)
            .env("GIT_AUTHOR_DATE", "2024-05-01T12:00:00")
            .env("GIT_COMMITTER_DATE", "2024-05-01T12:00:00")
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    #[test]
    fn scan_collects_commits_for_the_day() {
        if !git_available() {
            return;
        }

        let root = tempfile::tempdir().unwrap();
        let repo = root.path().join("demo");
        fs::create_dir_all(&repo).unwrap();
        fs::create_dir_all(root.path().join("idle")).unwrap();

        git(&repo, &["init", "-q"]);
        fs::write(repo.join("README.md"), "hello\nworld\n").unwrap();
        git(&repo, &["add", "README.md"]);
        git(&repo, &["commit", "-q", "-m", "Add readme"]);

        let result = scan_projects(root.path(), "2024-05-01", 3).unwrap();
        assert_eq!(result.scanned_repos, 1);
        assert_eq!(result.active_projects, 1);

        let project = &result.projects[0];
        assert_eq!(project.name, "demo");
        assert_eq!(project.remote, None);
        assert_eq!(project.commits.len(), 1);

        let commit = &project.commits[0];
        assert_eq!(commit.message, "Add readme");
        assert_eq!(commit.author, "Ada");
        assert_eq!(commit.files, vec!["README.md"]);
        assert_eq!(commit.stats.unwrap().insertions, 2);

        let other_day = scan_projects(root.path(), "2024-05-02", 3).unwrap();
        assert_eq!(other_day.active_projects, 0);
        assert_eq!(other_day.scanned_repos, 1);
    }
}
