mod config;
mod dashboard;
mod db;
mod error;
mod extract;
mod github;
mod pipeline;
mod transform;

use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::db::WriteMode;
use crate::pipeline::{RunOptions, Stage};

#[derive(Parser)]
#[command(name = "community_etl", version, about = "GitHub community analytics ETL")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the staging and clean tables
    Init,
    /// Harvest the GitHub API into the raw tables
    Extract {
        /// Replace table contents instead of appending
        #[arg(long)]
        replace: bool,
    },
    /// Rebuild the clean tables from the raw tables
    Transform {
        #[arg(long)]
        replace: bool,
    },
    /// Full pipeline: extract then transform, domain by domain
    Run {
        #[arg(long)]
        replace: bool,
    },
    /// Keep running the full pipeline on a daily cadence
    Schedule {
        #[arg(long)]
        replace: bool,
    },
    /// KPI overview of the clean tables
    Dashboard,
    /// Row counts for every staging and output table
    Stats,
    /// Check store connectivity
    Ping,
}

fn write_mode(replace: bool) -> WriteMode {
    if replace {
        WriteMode::Replace
    } else {
        WriteMode::Append
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let cfg = Config::from_env()?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            db::init_schema(&pool, &cfg.tables).await?;
            pool.close().await;
            println!("Schema ready: {} tables.", cfg.tables.all().len());
        }
        Commands::Extract { replace } => {
            let opts = RunOptions {
                stage: Stage::ExtractOnly,
                mode: write_mode(replace),
            };
            pipeline::run(&cfg, opts).await?.print();
        }
        Commands::Transform { replace } => {
            let opts = RunOptions {
                stage: Stage::TransformOnly,
                mode: write_mode(replace),
            };
            pipeline::run(&cfg, opts).await?.print();
        }
        Commands::Run { replace } => {
            let opts = RunOptions {
                stage: Stage::Full,
                mode: write_mode(replace),
            };
            pipeline::run(&cfg, opts).await?.print();
        }
        Commands::Schedule { replace } => {
            let opts = RunOptions {
                stage: Stage::Full,
                mode: write_mode(replace),
            };
            pipeline::schedule(&cfg, opts).await;
        }
        Commands::Dashboard => {
            let pool = db::connect(&cfg).await?;
            db::init_schema(&pool, &cfg.tables).await?;
            let data = db::fetch_dashboard(&pool, &cfg.tables).await?;
            pool.close().await;
            if data.is_empty() {
                println!("No data yet. Run 'run' first.");
                return Ok(());
            }
            dashboard::render(&data);
        }
        Commands::Stats => {
            let pool = db::connect(&cfg).await?;
            db::init_schema(&pool, &cfg.tables).await?;
            let counts = db::table_counts(&pool, &cfg.tables).await?;
            let last = db::last_transformed_at(&pool, &cfg.tables).await?;
            pool.close().await;
            for c in &counts {
                println!("{:<22} {:>10}", c.table, c.rows);
            }
            match last {
                Some(ts) => println!("\nLast transform: {}", ts.to_rfc3339()),
                None => println!("\nLast transform: never"),
            }
        }
        Commands::Ping => {
            let pool = db::connect(&cfg).await?;
            let version = db::server_version(&pool).await?;
            pool.close().await;
            println!("Connected: {version}");
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }
    Ok(())
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_formatting_picks_sensible_units() {
        assert_eq!(format_duration(Duration::from_millis(2_300)), "2.3s");
        assert_eq!(format_duration(Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_duration(Duration::from_secs(3_675)), "1h 1m 15s");
    }

    #[test]
    fn replace_flag_selects_write_mode() {
        assert_eq!(write_mode(false), WriteMode::Append);
        assert_eq!(write_mode(true), WriteMode::Replace);
    }
}
