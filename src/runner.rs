//! One reconcile-and-notify cycle.
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::db::{self, Pool};
use crate::feed::FeedSource;
use crate::mailer::{render_digest, MailSink};

/// Fatal failures of a cycle. Delivery failures are not here: they are
/// per-user and the cycle keeps going.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("discourse feed unavailable: {0:#}")]
    FeedUnavailable(anyhow::Error),
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

/// Counters from a completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub new_categories: u64,
    pub new_tags: u64,
    pub notified: u64,
    pub failed: u64,
}

/// Execute one full cycle: fetch the taxonomy, persist newly-seen names,
/// then mail each user the names added since their watermark.
///
/// A user's watermark moves only after their mail was handed off, so a
/// failed delivery is retried with the same (or a larger) digest on the
/// next cycle.
#[instrument(skip_all)]
pub async fn run_once(
    pool: &Pool,
    feed: &dyn FeedSource,
    mailer: &dyn MailSink,
    now: DateTime<Utc>,
) -> Result<RunReport, RunError> {
    let snapshot = feed.fetch().await.map_err(RunError::FeedUnavailable)?;

    let stats = db::reconcile_feed(pool, &snapshot.categories, &snapshot.tags, now)
        .await
        .map_err(RunError::Storage)?;
    info!(
        new_categories = stats.new_categories,
        new_tags = stats.new_tags,
        "reconciled taxonomy"
    );

    let digests = db::pending_digests(pool).await.map_err(RunError::Storage)?;

    let mut report = RunReport {
        new_categories: stats.new_categories,
        new_tags: stats.new_tags,
        ..RunReport::default()
    };
    for entry in &digests {
        let body = render_digest(entry);
        match mailer.send(&entry.user.email, &body).await {
            Ok(()) => {
                db::advance_watermark(pool, entry.user.id, now)
                    .await
                    .map_err(RunError::Storage)?;
                report.notified += 1;
                info!(user_id = entry.user.id, "digest delivered");
            }
            Err(err) => {
                warn!(
                    ?err,
                    user_id = entry.user.id,
                    "Failed to deliver digest to {}; will retry next run", entry.user.email
                );
                report.failed += 1;
            }
        }
    }

    Ok(report)
}
