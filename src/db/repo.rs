use super::model::{Category, DigestEntry, ReconcileStats, Tag, User};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, BTreeSet};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Normalize a file-backed SQLite URL: expand a leading `~/`, create the
/// parent directory, and default to `mode=rwc` so the first run can create
/// the database file. In-memory URLs and non-SQLite schemes pass through.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = url["sqlite:".len()..].trim_start_matches("//");
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match path.strip_prefix("~/") {
        Some(tail) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), tail),
            Err(_) => path.to_string(),
        },
        None => path.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{}", path);
    match query {
        Some(q) if q.contains("mode=") => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            rebuilt.push_str("&mode=rwc");
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Record every name not seen before, stamped with the run's `now`. One
/// all-or-nothing transaction; SQLite transactions are serializable, and the
/// conflict-ignoring insert makes the statement a no-op when a concurrent run
/// stored the name first. Existing rows keep their original `created_at`.
#[instrument(skip_all)]
pub async fn reconcile_feed(
    pool: &Pool,
    categories: &BTreeSet<String>,
    tags: &BTreeSet<String>,
    now: DateTime<Utc>,
) -> Result<ReconcileStats> {
    let mut tx = pool.begin().await?;
    let mut stats = ReconcileStats::default();

    for name in categories {
        let res = sqlx::query(
            "INSERT INTO categories (name, created_at) VALUES (?, ?) ON CONFLICT(name) DO NOTHING",
        )
        .bind(name)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        stats.new_categories += res.rows_affected();
    }

    for name in tags {
        let res = sqlx::query(
            "INSERT INTO tags (name, created_at) VALUES (?, ?) ON CONFLICT(name) DO NOTHING",
        )
        .bind(name)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        stats.new_tags += res.rows_affected();
    }

    tx.commit().await?;
    Ok(stats)
}

/// Compute one digest per user with at least one category or tag created
/// after that user's watermark. Both joins read inside a single transaction
/// so concurrent reconciliation cannot produce a torn view.
#[instrument(skip_all)]
pub async fn pending_digests(pool: &Pool) -> Result<Vec<DigestEntry>> {
    let mut tx = pool.begin().await?;

    let category_rows = sqlx::query(
        "SELECT u.id, u.email, u.last_notified_at, c.name \
         FROM users u JOIN categories c \
         ON datetime(u.last_notified_at) < datetime(c.created_at)",
    )
    .fetch_all(&mut *tx)
    .await?;

    let tag_rows = sqlx::query(
        "SELECT u.id, u.email, u.last_notified_at, t.name \
         FROM users u JOIN tags t \
         ON datetime(u.last_notified_at) < datetime(t.created_at)",
    )
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    let mut entries: BTreeMap<i64, DigestEntry> = BTreeMap::new();
    for row in &category_rows {
        let name: String = row.get("name");
        digest_entry(&mut entries, row).categories.insert(name);
    }
    for row in &tag_rows {
        let name: String = row.get("name");
        digest_entry(&mut entries, row).tags.insert(name);
    }

    Ok(entries.into_values().collect())
}

fn digest_entry<'a>(
    entries: &'a mut BTreeMap<i64, DigestEntry>,
    row: &SqliteRow,
) -> &'a mut DigestEntry {
    let id: i64 = row.get("id");
    entries.entry(id).or_insert_with(|| DigestEntry {
        user: User {
            id,
            email: row.get("email"),
            last_notified_at: row.get("last_notified_at"),
        },
        categories: BTreeSet::new(),
        tags: BTreeSet::new(),
    })
}

/// Move a user's watermark up to the run's `now`. The predicate keeps the
/// watermark monotonic: an older `now` (clock regression, stale run) leaves
/// the row untouched.
#[instrument(skip_all)]
pub async fn advance_watermark(pool: &Pool, user_id: i64, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE users SET last_notified_at = ? \
         WHERE id = ? AND datetime(last_notified_at) < datetime(?)",
    )
    .bind(now)
    .bind(user_id)
    .bind(now)
    .execute(pool)
    .await
    .context("failed to advance user watermark")?;
    Ok(())
}

/// All stored categories, ordered by name.
pub async fn all_categories(pool: &Pool) -> Result<Vec<Category>> {
    let rows =
        sqlx::query_as::<_, Category>("SELECT name, created_at FROM categories ORDER BY name")
            .fetch_all(pool)
            .await?;
    Ok(rows)
}

/// All stored tags, ordered by name.
pub async fn all_tags(pool: &Pool) -> Result<Vec<Tag>> {
    let rows = sqlx::query_as::<_, Tag>("SELECT name, created_at FROM tags ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn names(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    async fn insert_user(pool: &Pool, id: i64, email: &str, last_notified_at: DateTime<Utc>) {
        sqlx::query("INSERT INTO users (id, email, last_notified_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(email)
            .bind(last_notified_at)
            .execute(pool)
            .await
            .unwrap();
    }

    async fn watermark(pool: &Pool, id: i64) -> DateTime<Utc> {
        sqlx::query_scalar("SELECT last_notified_at FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let pool = setup_pool().await;
        let categories = names(&["Announcements", "General"]);
        let tags = names(&["bug"]);

        let first = reconcile_feed(&pool, &categories, &tags, at(1_000))
            .await
            .unwrap();
        assert_eq!(first.new_categories, 2);
        assert_eq!(first.new_tags, 1);

        // Second pass over the same names inserts nothing and keeps the
        // original creation times.
        let second = reconcile_feed(&pool, &categories, &tags, at(2_000))
            .await
            .unwrap();
        assert_eq!(second.new_categories, 0);
        assert_eq!(second.new_tags, 0);

        let stored = all_categories(&pool).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|c| c.created_at == at(1_000)));

        let stored = all_tags(&pool).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].created_at, at(1_000));
    }

    #[tokio::test]
    async fn reconcile_accepts_empty_sets() {
        let pool = setup_pool().await;
        let stats = reconcile_feed(&pool, &BTreeSet::new(), &BTreeSet::new(), at(1_000))
            .await
            .unwrap();
        assert_eq!(stats, ReconcileStats::default());
        assert!(all_categories(&pool).await.unwrap().is_empty());
        assert!(all_tags(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn digest_respects_novelty_boundary() {
        let pool = setup_pool().await;
        insert_user(&pool, 1, "u@x.test", at(950)).await;

        // One category exactly at the watermark, one strictly past it.
        reconcile_feed(&pool, &names(&["AtWatermark"]), &BTreeSet::new(), at(950))
            .await
            .unwrap();
        reconcile_feed(&pool, &names(&["Fresh"]), &BTreeSet::new(), at(951))
            .await
            .unwrap();

        let digests = pending_digests(&pool).await.unwrap();
        assert_eq!(digests.len(), 1);
        assert_eq!(digests[0].user.id, 1);
        assert_eq!(digests[0].user.email, "u@x.test");
        assert_eq!(digests[0].categories, names(&["Fresh"]));
        assert!(digests[0].tags.is_empty());
    }

    #[tokio::test]
    async fn digest_merges_categories_and_tags_per_user() {
        let pool = setup_pool().await;
        insert_user(&pool, 1, "a@x.test", at(0)).await;
        insert_user(&pool, 2, "b@x.test", at(0)).await;
        insert_user(&pool, 3, "late@x.test", at(200)).await;

        reconcile_feed(&pool, &names(&["General"]), &names(&["bug", "howto"]), at(100))
            .await
            .unwrap();

        let digests = pending_digests(&pool).await.unwrap();
        assert_eq!(digests.len(), 2);
        for entry in &digests {
            assert_eq!(entry.categories, names(&["General"]));
            assert_eq!(entry.tags, names(&["bug", "howto"]));
        }
        let ids: BTreeSet<i64> = digests.iter().map(|d| d.user.id).collect();
        assert_eq!(ids, BTreeSet::from([1, 2]));
    }

    #[tokio::test]
    async fn users_without_novelty_are_omitted() {
        let pool = setup_pool().await;
        insert_user(&pool, 1, "u@x.test", at(500)).await;

        reconcile_feed(&pool, &names(&["General"]), &names(&["bug"]), at(400))
            .await
            .unwrap();

        assert!(pending_digests(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn watermark_never_regresses() {
        let pool = setup_pool().await;
        insert_user(&pool, 1, "u@x.test", at(1_000)).await;

        advance_watermark(&pool, 1, at(900)).await.unwrap();
        assert_eq!(watermark(&pool, 1).await, at(1_000));

        advance_watermark(&pool, 1, at(1_000)).await.unwrap();
        assert_eq!(watermark(&pool, 1).await, at(1_000));

        advance_watermark(&pool, 1, at(1_500)).await.unwrap();
        assert_eq!(watermark(&pool, 1).await, at(1_500));
    }

    #[test]
    fn sqlite_url_gets_create_mode() {
        assert_eq!(
            prepare_sqlite_url("sqlite://feed.db"),
            "sqlite://feed.db?mode=rwc"
        );
        assert_eq!(
            prepare_sqlite_url("sqlite://feed.db?cache=shared"),
            "sqlite://feed.db?cache=shared&mode=rwc"
        );
        assert_eq!(
            prepare_sqlite_url("sqlite://feed.db?mode=ro"),
            "sqlite://feed.db?mode=ro"
        );
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            prepare_sqlite_url("postgres://localhost/db"),
            "postgres://localhost/db"
        );
    }
}
