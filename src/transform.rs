//! Transformers: derive the clean-table columns from raw rows.
//!
//! Everything here is a pure function of its inputs. The transform stamp is
//! passed in rather than read from the clock, so one run stamps every row
//! identically and a fixed clock reproduces byte-identical output.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::db::{
    ContributorClean, ContributorRaw, IssueClean, IssueRaw, ProjectClean, ProjectRaw,
    PullRequestClean, PullRequestRaw,
};

/// Days without an update after which a project counts as stale.
const STALE_AFTER_DAYS: i64 = 180;

/// Flat placeholder until a real scoring model exists.
const ACTIVITY_SCORE: f64 = 1.0;

fn clean_text(s: Option<&str>) -> Option<String> {
    s.map(|v| v.trim().to_lowercase())
}

/// Whitespace-delimited token count; an absent body counts zero.
fn word_count(body: Option<&str>) -> i64 {
    body.map(|b| b.split_whitespace().count() as i64).unwrap_or(0)
}

fn parse_ts(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// `"active"` when the last update is inside the stale window. An unknown
/// or unparseable update time counts as stale.
fn activity_level(updated_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> &'static str {
    match updated_at {
        Some(ts) if now - ts < Duration::days(STALE_AFTER_DAYS) => "active",
        _ => "stale",
    }
}

fn state_is(state: Option<&str>, expected: &str) -> bool {
    state.is_some_and(|s| s.eq_ignore_ascii_case(expected))
}

pub fn transform_projects(rows: &[ProjectRaw], now: DateTime<Utc>) -> Vec<ProjectClean> {
    rows.iter()
        .map(|r| {
            let updated_at = parse_ts(r.updated_at.as_deref());
            ProjectClean {
                project_id: r.project_id,
                name: r.name.clone(),
                description: r.description.clone(),
                created_at: parse_ts(r.created_at.as_deref()),
                updated_at,
                name_clean: clean_text(r.name.as_deref()),
                activity_level: activity_level(updated_at, now).to_string(),
                transformed_at: now,
            }
        })
        .collect()
}

pub fn transform_contributors(rows: &[ContributorRaw], now: DateTime<Utc>) -> Vec<ContributorClean> {
    rows.iter()
        .map(|r| ContributorClean {
            github_id: r.github_id,
            login: r.login.clone(),
            login_clean: clean_text(r.login.as_deref()),
            activity_score: ACTIVITY_SCORE,
            transformed_at: now,
        })
        .collect()
}

pub fn transform_issues(rows: &[IssueRaw], now: DateTime<Utc>) -> Vec<IssueClean> {
    rows.iter()
        .map(|r| IssueClean {
            project_id: r.project_id,
            title: r.title.clone(),
            body: r.body.clone(),
            state: r.state.clone(),
            created_at: parse_ts(r.created_at.as_deref()),
            updated_at: parse_ts(r.updated_at.as_deref()),
            title_clean: clean_text(r.title.as_deref()),
            word_count: word_count(r.body.as_deref()),
            is_closed: state_is(r.state.as_deref(), "closed"),
            transformed_at: now,
        })
        .collect()
}

/// Clean PR rows. `contributors` is the raw contributor set the run staged;
/// the first contributor whose login equals the PR's `author_login`
/// supplies `contributor_id`, and no match leaves it NULL.
pub fn transform_pull_requests(
    rows: &[PullRequestRaw],
    contributors: &[ContributorRaw],
    now: DateTime<Utc>,
) -> Vec<PullRequestClean> {
    let mut by_login: HashMap<&str, i64> = HashMap::new();
    for c in contributors {
        if let (Some(login), Some(id)) = (c.login.as_deref(), c.github_id) {
            by_login.entry(login).or_insert(id);
        }
    }

    rows.iter()
        .map(|r| PullRequestClean {
            project_id: r.project_id,
            contributor_id: r
                .author_login
                .as_deref()
                .and_then(|login| by_login.get(login).copied()),
            author_login: r.author_login.clone(),
            title: r.title.clone(),
            body: r.body.clone(),
            state: r.state.clone(),
            created_at: parse_ts(r.created_at.as_deref()),
            updated_at: parse_ts(r.updated_at.as_deref()),
            title_clean: clean_text(r.title.as_deref()),
            is_merged: state_is(r.state.as_deref(), "merged"),
            transformed_at: now,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn project(name: Option<&str>, updated_at: Option<&str>) -> ProjectRaw {
        ProjectRaw {
            project_id: Some(1),
            name: name.map(String::from),
            description: None,
            created_at: None,
            updated_at: updated_at.map(String::from),
        }
    }

    #[test]
    fn name_clean_is_lowercased_and_trimmed() {
        let rows = transform_projects(&[project(Some("  Scikit-Learn  "), None)], fixed_now());
        assert_eq!(rows[0].name_clean.as_deref(), Some("scikit-learn"));
        assert_eq!(rows[0].name.as_deref(), Some("  Scikit-Learn  "));
    }

    #[test]
    fn activity_level_boundary_sits_at_180_days() {
        let now = fixed_now();
        let at = |days: i64| Some(now - Duration::days(days));
        assert_eq!(activity_level(at(179), now), "active");
        assert_eq!(activity_level(at(180), now), "stale");
        assert_eq!(activity_level(at(181), now), "stale");
        assert_eq!(activity_level(None, now), "stale");
    }

    #[test]
    fn unparseable_update_time_is_stale_with_null_timestamp() {
        let rows = transform_projects(&[project(None, Some("yesterday-ish"))], fixed_now());
        assert!(rows[0].updated_at.is_none());
        assert_eq!(rows[0].activity_level, "stale");
    }

    #[test]
    fn timestamps_parse_as_rfc3339_utc() {
        let raw = project(None, Some("2024-05-30T10:00:00+02:00"));
        let rows = transform_projects(&[raw], fixed_now());
        let expected = Utc.with_ymd_and_hms(2024, 5, 30, 8, 0, 0).unwrap();
        assert_eq!(rows[0].updated_at, Some(expected));
        assert_eq!(rows[0].activity_level, "active");
    }

    #[test]
    fn contributor_rows_get_flat_score_and_clean_login() {
        let raw = ContributorRaw {
            github_id: Some(42),
            login: Some("  OGrisel ".into()),
        };
        let rows = transform_contributors(&[raw], fixed_now());
        assert_eq!(rows[0].login_clean.as_deref(), Some("ogrisel"));
        assert_eq!(rows[0].activity_score, 1.0);
        assert_eq!(rows[0].transformed_at, fixed_now());
    }

    #[test]
    fn word_count_splits_on_any_whitespace() {
        assert_eq!(word_count(Some("one two\tthree\nfour")), 4);
        assert_eq!(word_count(Some("   ")), 0);
        assert_eq!(word_count(Some("")), 0);
        assert_eq!(word_count(None), 0);
    }

    #[test]
    fn issue_derivations_compose() {
        let raw = IssueRaw {
            project_id: 9,
            title: Some(" Bug Report ".into()),
            body: Some("fix the bug".into()),
            state: Some("Closed".into()),
            created_at: Some("2024-01-15T08:30:00Z".into()),
            updated_at: None,
        };
        let rows = transform_issues(&[raw], fixed_now());
        assert_eq!(rows[0].title_clean.as_deref(), Some("bug report"));
        assert_eq!(rows[0].word_count, 3);
        assert!(rows[0].is_closed);
        assert!(rows[0].created_at.is_some());
        assert!(rows[0].updated_at.is_none());
        assert_eq!(rows[0].transformed_at, fixed_now());
    }

    #[test]
    fn is_closed_matches_state_case_insensitively() {
        let issue = |state: Option<&str>| IssueRaw {
            project_id: 1,
            title: Some("T".into()),
            body: None,
            state: state.map(String::from),
            created_at: None,
            updated_at: None,
        };
        let rows = transform_issues(
            &[issue(Some("Closed")), issue(Some("open")), issue(None)],
            fixed_now(),
        );
        assert!(rows[0].is_closed);
        assert!(!rows[1].is_closed);
        assert!(!rows[2].is_closed);
    }

    #[test]
    fn pull_request_author_resolves_to_contributor_id() {
        let contributors = [
            ContributorRaw {
                github_id: Some(1),
                login: Some("amueller".into()),
            },
            ContributorRaw {
                github_id: Some(2),
                login: Some("lesteve".into()),
            },
            // duplicate login later in the table must not override the first
            ContributorRaw {
                github_id: Some(99),
                login: Some("lesteve".into()),
            },
        ];
        let pr = |login: Option<&str>| PullRequestRaw {
            project_id: 5,
            contributor_id: None,
            author_login: login.map(String::from),
            title: Some("MRG Fix".into()),
            body: None,
            state: Some("closed".into()),
            created_at: None,
            updated_at: None,
        };

        let rows = transform_pull_requests(
            &[pr(Some("lesteve")), pr(Some("stranger")), pr(None)],
            &contributors,
            fixed_now(),
        );
        assert_eq!(rows[0].contributor_id, Some(2));
        assert!(rows[1].contributor_id.is_none());
        assert!(rows[2].contributor_id.is_none());
        assert_eq!(rows[0].title_clean.as_deref(), Some("mrg fix"));
        assert!(!rows[0].is_merged);
    }

    #[test]
    fn fixed_clock_makes_transforms_reproducible() {
        let raw = [
            project(Some("Repo-A"), Some("2024-03-01T00:00:00Z")),
            project(Some("Repo-B"), None),
        ];
        let first = transform_projects(&raw, fixed_now());
        let second = transform_projects(&raw, fixed_now());
        assert_eq!(first, second);
        assert!(first.iter().all(|r| r.transformed_at == fixed_now()));
    }
}
