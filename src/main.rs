use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use discourse_notifier::config;
use discourse_notifier::db;
use discourse_notifier::feed::DiscourseClient;
use discourse_notifier::mailer::SmtpMailer;
use discourse_notifier::runner;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Fetch Discourse categories and tags, store newcomers, and mail users a digest"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.db.url.clone());

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let client = DiscourseClient::from_config(&cfg.discourse)?;
    let mailer = SmtpMailer::from_config(&cfg.mail)?;

    info!("Starting Discourse digest run");
    let report = runner::run_once(&pool, &client, &mailer, Utc::now()).await?;

    if report.failed > 0 {
        warn!(
            failed = report.failed,
            "Some digests were not delivered; their users will be retried next run"
        );
    }
    info!(
        new_categories = report.new_categories,
        new_tags = report.new_tags,
        notified = report.notified,
        failed = report.failed,
        "Run complete"
    );
    Ok(())
}
