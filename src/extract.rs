use std::collections::HashSet;

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::info;

use crate::db::{ContributorRaw, IssueRaw, ProjectRaw, PullRequestRaw};
use crate::github::GithubClient;

// Field access is tolerant throughout: a missing or mistyped field becomes
// a NULL column, never an abort of the batch.

fn text(record: &Value, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(str::to_string)
}

fn num(record: &Value, key: &str) -> Option<i64> {
    record.get(key).and_then(Value::as_i64)
}

/// Fetch every repository under `username`. The raw records are returned
/// as JSON because the per-project extractors walk them for identifiers
/// and sub-resource URLs.
pub async fn fetch_repos(client: &GithubClient, username: &str) -> Vec<Value> {
    let url = client.url(&format!("/users/{username}/repos"));
    let repos = client.get_paged(&url, &[]).await;
    info!("fetched {} repositories for {username}", repos.len());
    repos
}

/// Project rows from repository records.
pub fn project_rows(repos: &[Value]) -> Vec<ProjectRaw> {
    repos
        .iter()
        .map(|r| ProjectRaw {
            project_id: num(r, "id"),
            name: text(r, "name"),
            description: text(r, "description"),
            created_at: text(r, "created_at"),
            updated_at: text(r, "updated_at"),
        })
        .collect()
}

/// Contributors across every repository, deduplicated by `github_id`.
pub async fn extract_contributors(client: &GithubClient, repos: &[Value]) -> Vec<ContributorRaw> {
    let pb = progress(repos.len() as u64, "contributors");
    let mut all = Vec::new();
    for repo in repos {
        // the API hands us the contributors URL ready-made on each repo
        if let Some(url) = repo.get("contributors_url").and_then(Value::as_str) {
            let records = client.get_paged(url, &[]).await;
            all.extend(contributor_rows(&records));
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let rows = dedup_contributors(all);
    info!("extracted {} distinct contributors", rows.len());
    rows
}

pub fn contributor_rows(records: &[Value]) -> Vec<ContributorRaw> {
    records
        .iter()
        .map(|c| ContributorRaw {
            github_id: num(c, "id"),
            login: text(c, "login"),
        })
        .collect()
}

/// First occurrence per `github_id` wins, preserving arrival order. Rows
/// without an id collapse to a single NULL-id row the same way.
pub fn dedup_contributors(rows: Vec<ContributorRaw>) -> Vec<ContributorRaw> {
    let mut seen = HashSet::new();
    rows.into_iter().filter(|r| seen.insert(r.github_id)).collect()
}

/// Issue rows across every repository, all states.
pub async fn extract_issues(
    client: &GithubClient,
    username: &str,
    repos: &[Value],
) -> Vec<IssueRaw> {
    let query = state_all();
    let pb = progress(repos.len() as u64, "issues");
    let mut rows = Vec::new();
    for repo in repos {
        let (Some(project_id), Some(name)) = (num(repo, "id"), repo.get("name").and_then(Value::as_str))
        else {
            pb.inc(1);
            continue;
        };
        let url = client.url(&format!("/repos/{username}/{name}/issues"));
        let records = client.get_paged(&url, &query).await;
        rows.extend(issue_rows(project_id, &records));
        pb.inc(1);
    }
    pb.finish_and_clear();
    info!("extracted {} issues", rows.len());
    rows
}

/// The issues endpoint also returns pull requests; real PRs carry a
/// `pull_request` sub-object and are dropped here.
pub fn issue_rows(project_id: i64, records: &[Value]) -> Vec<IssueRaw> {
    records
        .iter()
        .filter(|r| !is_pull_request(r))
        .map(|r| IssueRaw {
            project_id,
            title: text(r, "title"),
            body: text(r, "body"),
            state: text(r, "state"),
            created_at: text(r, "created_at"),
            updated_at: text(r, "updated_at"),
        })
        .collect()
}

pub fn is_pull_request(record: &Value) -> bool {
    record.get("pull_request").is_some()
}

/// Pull request rows across every repository, all states.
pub async fn extract_pull_requests(
    client: &GithubClient,
    username: &str,
    repos: &[Value],
) -> Vec<PullRequestRaw> {
    let query = state_all();
    let pb = progress(repos.len() as u64, "pull requests");
    let mut rows = Vec::new();
    for repo in repos {
        let (Some(project_id), Some(name)) = (num(repo, "id"), repo.get("name").and_then(Value::as_str))
        else {
            pb.inc(1);
            continue;
        };
        let url = client.url(&format!("/repos/{username}/{name}/pulls"));
        let records = client.get_paged(&url, &query).await;
        rows.extend(pull_request_rows(project_id, &records));
        pb.inc(1);
    }
    pb.finish_and_clear();
    info!("extracted {} pull requests", rows.len());
    rows
}

/// `contributor_id` stays NULL at this stage; the transformer resolves it
/// from `author_login` against the contributors staging table.
pub fn pull_request_rows(project_id: i64, records: &[Value]) -> Vec<PullRequestRaw> {
    records
        .iter()
        .map(|r| PullRequestRaw {
            project_id,
            contributor_id: None,
            author_login: r
                .get("user")
                .and_then(|u| u.get("login"))
                .and_then(Value::as_str)
                .map(str::to_string),
            title: text(r, "title"),
            body: text(r, "body"),
            state: text(r, "state"),
            created_at: text(r, "created_at"),
            updated_at: text(r, "updated_at"),
        })
        .collect()
}

fn state_all() -> Vec<(String, String)> {
    vec![("state".to_string(), "all".to_string())]
}

fn progress(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=> "),
    );
    pb.set_message(label.to_string());
    pb
}
