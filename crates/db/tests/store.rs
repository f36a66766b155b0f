use forager_db::models::content_item::{NewContentItem, PutOutcome};
use forager_db::models::job::HistoryQuery;
use forager_db::models::progress::ProgressUpdate;
use forager_db::repositories::{ContentRepo, JobRepo, ProgressRepo, StatsRepo};
use sqlx::PgPool;

fn item(source: &str, url: &str, body: &str) -> NewContentItem {
    NewContentItem {
        source: source.to_string(),
        url: url.to_string(),
        content_hash: None,
        title: Some("t".to_string()),
        body: Some(body.to_string()),
        metadata: serde_json::json!({}),
    }
}

// ---------------------------------------------------------------------------
// Content dedup
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn insert_then_duplicate(pool: PgPool) {
    let first = ContentRepo::insert(&pool, &item("ao3", "https://a/1", "hello"))
        .await
        .unwrap();
    assert!(first.inserted());

    // Same body, different URL: same hash, so it is a duplicate.
    let second = ContentRepo::insert(&pool, &item("ao3", "https://a/2", "hello"))
        .await
        .unwrap();
    assert_eq!(second, PutOutcome::Duplicate);

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM content_items")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_puts_store_exactly_one_row(pool: PgPool) {
    let mut handles = Vec::new();
    for i in 0..8 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let mut it = item("nifty", &format!("https://n/{i}"), "same payload");
            it.content_hash = Some("abc".repeat(16));
            ContentRepo::insert(&pool, &it).await.unwrap()
        }));
    }

    let mut inserted = 0;
    for handle in handles {
        if handle.await.unwrap().inserted() {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 1);

    let count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM content_items WHERE content_hash = $1")
            .bind("abc".repeat(16))
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count.0, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn exists_by_hash_and_url(pool: PgPool) {
    let outcome = ContentRepo::insert(&pool, &item("wwd", "https://w/1", "body"))
        .await
        .unwrap();
    assert!(outcome.inserted());

    let hash = forager_core::hashing::sha256_hex(b"body");
    assert!(ContentRepo::exists_by_hash(&pool, &hash).await.unwrap());
    assert!(!ContentRepo::exists_by_hash(&pool, "nope").await.unwrap());
    assert!(ContentRepo::exists_by_url(&pool, "https://w/1").await.unwrap());
    assert!(!ContentRepo::exists_by_url(&pool, "https://w/2").await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
async fn batch_insert_skips_duplicates(pool: PgPool) {
    let items = vec![
        item("ao3", "https://a/1", "one"),
        item("ao3", "https://a/2", "two"),
        item("ao3", "https://a/3", "one"), // duplicate of the first
    ];
    let inserted = ContentRepo::insert_batch(&pool, &items).await.unwrap();
    assert_eq!(inserted, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn list_filters_by_source_and_processed(pool: PgPool) {
    ContentRepo::insert(&pool, &item("ao3", "https://a/1", "one")).await.unwrap();
    let PutOutcome::Inserted(id) =
        ContentRepo::insert(&pool, &item("nifty", "https://n/1", "two"))
            .await
            .unwrap()
    else {
        panic!("expected insert");
    };
    ContentRepo::mark_processed(&pool, &[id]).await.unwrap();

    let ao3 = ContentRepo::list(
        &pool,
        &forager_db::models::content_item::ContentQuery {
            source: Some("ao3".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(ao3.len(), 1);
    assert_eq!(ao3[0].source, "ao3");

    let unprocessed = ContentRepo::list(
        &pool,
        &forager_db::models::content_item::ContentQuery {
            processed: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(unprocessed.len(), 1);
    assert_eq!(unprocessed[0].url, "https://a/1");
}

#[sqlx::test(migrations = "./migrations")]
async fn mark_processed_flips_flag(pool: PgPool) {
    let PutOutcome::Inserted(id) =
        ContentRepo::insert(&pool, &item("ao3", "https://a/1", "x"))
            .await
            .unwrap()
    else {
        panic!("expected insert");
    };

    let updated = ContentRepo::mark_processed(&pool, &[id]).await.unwrap();
    assert_eq!(updated, 1);

    let processed: (bool,) =
        sqlx::query_as("SELECT processed FROM content_items WHERE id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(processed.0);
}

// ---------------------------------------------------------------------------
// Progress cursors
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn missing_cursor_returns_zero_values(pool: PgPool) {
    let record = ProgressRepo::get(&pool, "never_ran").await.unwrap();
    assert_eq!(record.source, "never_ran");
    assert_eq!(record.last_page, 0);
    assert_eq!(record.total_items, 0);
    assert!(record.last_url.is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn partial_updates_coalesce(pool: PgPool) {
    ProgressRepo::save(
        &pool,
        "ao3",
        &ProgressUpdate {
            last_page: Some(5),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    ProgressRepo::save(
        &pool,
        "ao3",
        &ProgressUpdate {
            total_items: Some(100),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let record = ProgressRepo::get(&pool, "ao3").await.unwrap();
    assert_eq!(record.last_page, 5);
    assert_eq!(record.total_items, 100);
}

#[sqlx::test(migrations = "./migrations")]
async fn reset_clears_cursor(pool: PgPool) {
    ProgressRepo::save(
        &pool,
        "ao3",
        &ProgressUpdate {
            last_page: Some(9),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    ProgressRepo::reset(&pool, "ao3").await.unwrap();

    let record = ProgressRepo::get(&pool, "ao3").await.unwrap();
    assert_eq!(record.last_page, 0);
}

// ---------------------------------------------------------------------------
// Job ledger
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn ledger_records_success_and_failure(pool: PgPool) {
    let ok_id = JobRepo::start(&pool, "ao3").await.unwrap();
    JobRepo::complete(&pool, ok_id, 120, 4096, None).await.unwrap();

    let bad_id = JobRepo::start(&pool, "nifty").await.unwrap();
    JobRepo::complete(&pool, bad_id, 3, 100, Some("connection reset"))
        .await
        .unwrap();

    let ok = JobRepo::find_by_id(&pool, ok_id).await.unwrap().unwrap();
    assert_eq!(ok.status, "completed");
    assert_eq!(ok.items_collected, 120);
    assert!(ok.completed_at.is_some());

    let bad = JobRepo::find_by_id(&pool, bad_id).await.unwrap().unwrap();
    assert_eq!(bad.status, "failed");
    assert_eq!(bad.error.as_deref(), Some("connection reset"));
}

#[sqlx::test(migrations = "./migrations")]
async fn completed_entries_are_immutable(pool: PgPool) {
    let id = JobRepo::start(&pool, "ao3").await.unwrap();
    assert!(JobRepo::complete(&pool, id, 10, 10, None).await.unwrap());

    // Second completion attempt is rejected by the guard.
    assert!(!JobRepo::complete(&pool, id, 999, 999, Some("late error"))
        .await
        .unwrap());

    let entry = JobRepo::find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(entry.items_collected, 10);
    assert_eq!(entry.status, "completed");
    assert!(entry.error.is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn history_filters_by_name(pool: PgPool) {
    for name in ["ao3", "ao3", "nifty"] {
        let id = JobRepo::start(&pool, name).await.unwrap();
        JobRepo::complete(&pool, id, 1, 1, None).await.unwrap();
    }

    let all = JobRepo::history(&pool, &HistoryQuery::default()).await.unwrap();
    assert_eq!(all.len(), 3);

    let ao3 = JobRepo::history(
        &pool,
        &HistoryQuery {
            job_name: Some("ao3".to_string()),
            limit: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(ao3.len(), 2);
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn stats_aggregate_per_source_and_globally(pool: PgPool) {
    ContentRepo::insert(&pool, &item("ao3", "https://a/1", "aaaa")).await.unwrap();
    ContentRepo::insert(&pool, &item("ao3", "https://a/2", "bbbbbb")).await.unwrap();
    ContentRepo::insert(&pool, &item("nifty", "https://n/1", "cc")).await.unwrap();

    let ok = JobRepo::start(&pool, "ao3").await.unwrap();
    JobRepo::complete(&pool, ok, 2, 10, None).await.unwrap();
    let bad = JobRepo::start(&pool, "nifty").await.unwrap();
    JobRepo::complete(&pool, bad, 0, 0, Some("boom")).await.unwrap();

    let per_source = StatsRepo::by_source(&pool, Some("ao3")).await.unwrap();
    assert_eq!(per_source.len(), 1);
    assert_eq!(per_source[0].total_items, 2);
    assert_eq!(per_source[0].total_bytes, Some(10));

    let global = StatsRepo::global(&pool).await.unwrap();
    assert_eq!(global.total_items, 3);
    assert_eq!(global.total_sources, 2);
    assert_eq!(global.total_jobs, 2);
    assert_eq!(global.completed_jobs, 1);
    assert_eq!(global.failed_jobs, 1);
}
