//! The one pipeline definition every entry point shares. A run walks the
//! four domains in a fixed order; for each, the extract stage writes the
//! staging table and the transform stage reads it back to write the clean
//! one. Nothing overlaps and one store handle serves the whole run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{self, WriteMode};
use crate::error::EtlError;
use crate::extract;
use crate::github::GithubClient;
use crate::transform;

/// Daily cadence, matching the source deployment's scheduler.
const SCHEDULE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
/// Wait before the single retry after a failed scheduled run.
const SCHEDULE_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Harvest the API into the raw tables only.
    ExtractOnly,
    /// Rebuild the clean tables from whatever the raw tables hold.
    TransformOnly,
    /// Extract, then transform, domain by domain.
    Full,
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub stage: Stage,
    pub mode: WriteMode,
}

/// Rows written during a run, per output table. Stages that did not run
/// report zero.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub projects_raw: usize,
    pub contributors_raw: usize,
    pub issues_raw: usize,
    pub pull_requests_raw: usize,
    pub projects_clean: usize,
    pub contributors_clean: usize,
    pub issues_clean: usize,
    pub pull_requests_clean: usize,
}

impl RunSummary {
    pub fn print(&self) {
        println!(
            "Raw:   {} projects, {} contributors, {} issues, {} pull requests",
            self.projects_raw, self.contributors_raw, self.issues_raw, self.pull_requests_raw
        );
        println!(
            "Clean: {} projects, {} contributors, {} issues, {} pull requests",
            self.projects_clean,
            self.contributors_clean,
            self.issues_clean,
            self.pull_requests_clean
        );
    }
}

/// Run the pipeline once. Opens the store, ensures the schema, processes
/// each domain in order and closes the pool before returning.
pub async fn run(cfg: &Config, opts: RunOptions) -> Result<RunSummary, EtlError> {
    let pool = db::connect(cfg).await?;
    let result = run_with_pool(&pool, cfg, opts).await;
    pool.close().await;
    result
}

async fn run_with_pool(
    pool: &PgPool,
    cfg: &Config,
    opts: RunOptions,
) -> Result<RunSummary, EtlError> {
    db::init_schema(pool, &cfg.tables).await?;
    let tables = &cfg.tables;
    let mut summary = RunSummary::default();
    // one stamp per run: every clean row the run writes carries the same
    // transformed_at
    let now = Utc::now();

    if opts.stage == Stage::TransformOnly {
        summary.projects_clean = transform_projects(pool, cfg, opts.mode, now).await?;
        summary.contributors_clean = transform_contributors(pool, cfg, opts.mode, now).await?;
        summary.issues_clean = transform_issues(pool, cfg, opts.mode, now).await?;
        summary.pull_requests_clean = transform_pull_requests(pool, cfg, opts.mode, now).await?;
        return Ok(summary);
    }

    let client = GithubClient::new(&cfg.github)?;
    let username = &cfg.github.username;
    let repos = extract::fetch_repos(&client, username).await;
    let transforming = opts.stage == Stage::Full;

    let projects = extract::project_rows(&repos);
    summary.projects_raw = projects.len();
    db::load_projects(pool, &tables.projects_raw, &projects, opts.mode).await?;
    if transforming {
        summary.projects_clean = transform_projects(pool, cfg, opts.mode, now).await?;
    }

    let contributors = extract::extract_contributors(&client, &repos).await;
    summary.contributors_raw = contributors.len();
    db::load_contributors(pool, &tables.contributors_raw, &contributors, opts.mode).await?;
    if transforming {
        summary.contributors_clean = transform_contributors(pool, cfg, opts.mode, now).await?;
    }

    let issues = extract::extract_issues(&client, username, &repos).await;
    summary.issues_raw = issues.len();
    db::load_issues(pool, &tables.issues_raw, &issues, opts.mode).await?;
    if transforming {
        summary.issues_clean = transform_issues(pool, cfg, opts.mode, now).await?;
    }

    let pull_requests = extract::extract_pull_requests(&client, username, &repos).await;
    summary.pull_requests_raw = pull_requests.len();
    db::load_pull_requests(pool, &tables.pull_requests_raw, &pull_requests, opts.mode).await?;
    if transforming {
        summary.pull_requests_clean = transform_pull_requests(pool, cfg, opts.mode, now).await?;
    }

    Ok(summary)
}

// Each transform stage reads the full current raw table rather than the
// rows just extracted, so transform-only runs see exactly what a full run
// sees. An empty raw table leaves the clean table untouched.

async fn transform_projects(
    pool: &PgPool,
    cfg: &Config,
    mode: WriteMode,
    now: DateTime<Utc>,
) -> Result<usize, EtlError> {
    let raw = db::fetch_projects_raw(pool, &cfg.tables.projects_raw).await?;
    if raw.is_empty() {
        info!("{} is empty, clean table untouched", cfg.tables.projects_raw);
        return Ok(0);
    }
    let clean = transform::transform_projects(&raw, now);
    db::load_projects_clean(pool, &cfg.tables.projects_clean, &clean, mode).await?;
    Ok(clean.len())
}

async fn transform_contributors(
    pool: &PgPool,
    cfg: &Config,
    mode: WriteMode,
    now: DateTime<Utc>,
) -> Result<usize, EtlError> {
    let raw = db::fetch_contributors_raw(pool, &cfg.tables.contributors_raw).await?;
    if raw.is_empty() {
        info!("{} is empty, clean table untouched", cfg.tables.contributors_raw);
        return Ok(0);
    }
    let clean = transform::transform_contributors(&raw, now);
    db::load_contributors_clean(pool, &cfg.tables.contributors_clean, &clean, mode).await?;
    Ok(clean.len())
}

async fn transform_issues(
    pool: &PgPool,
    cfg: &Config,
    mode: WriteMode,
    now: DateTime<Utc>,
) -> Result<usize, EtlError> {
    let raw = db::fetch_issues_raw(pool, &cfg.tables.issues_raw).await?;
    if raw.is_empty() {
        info!("{} is empty, clean table untouched", cfg.tables.issues_raw);
        return Ok(0);
    }
    let clean = transform::transform_issues(&raw, now);
    db::load_issues_clean(pool, &cfg.tables.issues_clean, &clean, mode).await?;
    Ok(clean.len())
}

async fn transform_pull_requests(
    pool: &PgPool,
    cfg: &Config,
    mode: WriteMode,
    now: DateTime<Utc>,
) -> Result<usize, EtlError> {
    let raw = db::fetch_pull_requests_raw(pool, &cfg.tables.pull_requests_raw).await?;
    if raw.is_empty() {
        info!("{} is empty, clean table untouched", cfg.tables.pull_requests_raw);
        return Ok(0);
    }
    // author logins resolve against the staged contributors
    let contributors = db::fetch_contributors_raw(pool, &cfg.tables.contributors_raw).await?;
    let clean = transform::transform_pull_requests(&raw, &contributors, now);
    db::load_pull_requests_clean(pool, &cfg.tables.pull_requests_clean, &clean, mode).await?;
    Ok(clean.len())
}

/// Run the pipeline on a daily cadence until the process is terminated.
/// A failed run is retried once after a short delay; a failed retry waits
/// for the next scheduled slot.
pub async fn schedule(cfg: &Config, opts: RunOptions) {
    loop {
        info!("scheduled pipeline run starting");
        match run(cfg, opts).await {
            Ok(summary) => summary.print(),
            Err(e) => {
                warn!(
                    "pipeline run failed: {e}, retrying in {}s",
                    SCHEDULE_RETRY_DELAY.as_secs()
                );
                tokio::time::sleep(SCHEDULE_RETRY_DELAY).await;
                match run(cfg, opts).await {
                    Ok(summary) => summary.print(),
                    Err(e) => warn!("retry failed: {e}, waiting for the next scheduled run"),
                }
            }
        }
        info!(
            "next run in {}h",
            SCHEDULE_INTERVAL.as_secs() / 3600
        );
        tokio::time::sleep(SCHEDULE_INTERVAL).await;
    }
}

// ── Tests ──
