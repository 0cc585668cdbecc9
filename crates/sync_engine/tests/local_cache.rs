mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use support::{FlakyStore, at, ids, sample};
use sync_engine::{KeyValueStore, LocalCache, ManualClock, SqliteStore, SyncCursorStore};
use vitalsync_core::{CacheQueryParams, DataType};

fn cache_on(store: Arc<FlakyStore>) -> (LocalCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(at(0)));
    (LocalCache::new(store, clock.clone()), clock)
}

#[tokio::test]
async fn ttl_is_measured_at_read_time() {
    let (cache, clock) = cache_on(Arc::new(FlakyStore::new()));
    cache
        .put(
            DataType::Steps,
            vec![sample("s1", DataType::Steps, 0, 1.0)],
            CacheQueryParams::default(),
        )
        .await
        .expect("put");

    clock.advance(ChronoDuration::milliseconds(2_000));
    assert!(
        cache
            .get(DataType::Steps, Duration::from_millis(1_000))
            .await
            .is_none()
    );
    let samples = cache
        .get(DataType::Steps, Duration::from_millis(10_000))
        .await
        .expect("fresh");
    assert_eq!(ids(&samples), vec!["s1"]);
}

#[tokio::test]
async fn duplicate_ids_collapse_to_last_applied() {
    let (cache, _clock) = cache_on(Arc::new(FlakyStore::new()));
    cache
        .merge(
            DataType::HeartRate,
            &[
                sample("dup", DataType::HeartRate, 0, 60.0),
                sample("dup", DataType::HeartRate, 0, 64.0),
            ],
            CacheQueryParams::default(),
        )
        .await
        .expect("merge");

    let samples = cache
        .get(DataType::HeartRate, Duration::MAX)
        .await
        .expect("entry");
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].amount, 64.0);
}

#[tokio::test]
async fn merge_refreshes_fetch_time_and_records_params() {
    let (cache, clock) = cache_on(Arc::new(FlakyStore::new()));
    cache
        .put(
            DataType::Steps,
            vec![sample("late", DataType::Steps, 600, 1.0)],
            CacheQueryParams {
                limit: Some(100),
                ..CacheQueryParams::default()
            },
        )
        .await
        .expect("put");
    clock.advance(ChronoDuration::minutes(1));
    cache
        .merge(
            DataType::Steps,
            &[sample("early", DataType::Steps, 0, 2.0)],
            CacheQueryParams {
                limit: Some(25),
                ..CacheQueryParams::default()
            },
        )
        .await
        .expect("merge");

    let entry = cache.entry(DataType::Steps).await.expect("entry");
    assert_eq!(ids(&entry.samples), vec!["early", "late"]);
    assert_eq!(entry.last_fetch_timestamp, at(60));
    assert_eq!(entry.last_query_params.limit, Some(25));

    clock.advance(ChronoDuration::minutes(1));
    cache
        .merge(DataType::Steps, &[], CacheQueryParams::default())
        .await
        .expect("empty merge");
    let unchanged = cache.entry(DataType::Steps).await.expect("entry");
    assert_eq!(unchanged, entry);
}

#[tokio::test]
async fn checked_time_extends_freshness() {
    let (cache, clock) = cache_on(Arc::new(FlakyStore::new()));
    cache
        .put(
            DataType::Steps,
            vec![sample("s1", DataType::Steps, 0, 1.0)],
            CacheQueryParams::default(),
        )
        .await
        .expect("put");
    clock.advance(ChronoDuration::minutes(10));

    let max_age = Duration::from_secs(5 * 60);
    assert!(cache.get(DataType::Steps, max_age).await.is_none());
    assert!(
        cache
            .get_checked(DataType::Steps, max_age, Some(at(200)))
            .await
            .is_none()
    );
    let samples = cache
        .get_checked(DataType::Steps, max_age, Some(at(480)))
        .await
        .expect("fresh");
    assert_eq!(ids(&samples), vec!["s1"]);
}

#[tokio::test]
async fn read_failure_is_a_miss_but_blocks_mutation() {
    let store = Arc::new(FlakyStore::new());
    let (cache, _clock) = cache_on(store.clone());
    cache
        .merge(
            DataType::Steps,
            &[sample("keep", DataType::Steps, 0, 1.0)],
            CacheQueryParams::default(),
        )
        .await
        .expect("merge");

    store.fail_reads(true);
    assert!(cache.get(DataType::Steps, Duration::MAX).await.is_none());
    assert!(
        cache
            .merge(
                DataType::Steps,
                &[sample("other", DataType::Steps, 60, 1.0)],
                CacheQueryParams::default(),
            )
            .await
            .is_err()
    );

    store.fail_reads(false);
    let samples = cache
        .get(DataType::Steps, Duration::MAX)
        .await
        .expect("entry");
    assert_eq!(ids(&samples), vec!["keep"]);
}

#[tokio::test]
async fn clear_all_leaves_cursors_in_place() {
    let store = Arc::new(FlakyStore::new());
    let (cache, clock) = cache_on(store.clone());
    let cursors = SyncCursorStore::new(store.clone(), clock);
    cursors
        .set_cursor(DataType::Steps, "A1")
        .await
        .expect("cursor");
    cache
        .merge(
            DataType::Steps,
            &[sample("s1", DataType::Steps, 0, 1.0)],
            CacheQueryParams::default(),
        )
        .await
        .expect("merge");
    cache
        .merge(
            DataType::Sleep,
            &[sample("z1", DataType::Sleep, 0, 1.0)],
            CacheQueryParams::default(),
        )
        .await
        .expect("merge");

    let stats = cache.stats().await;
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[&DataType::Sleep].count, 1);

    cache.clear(None).await.expect("clear");
    assert!(cache.stats().await.is_empty());
    assert_eq!(cursors.get_cursor(DataType::Steps).await.as_deref(), Some("A1"));
}

#[tokio::test]
async fn remove_by_ids_without_match_does_not_rewrite() {
    let store = Arc::new(FlakyStore::new());
    let (cache, _clock) = cache_on(store.clone());
    cache
        .merge(
            DataType::Steps,
            &[sample("a", DataType::Steps, 0, 1.0)],
            CacheQueryParams::default(),
        )
        .await
        .expect("merge");

    store.fail_writes_under(Some("sample_cache:"));
    let removed = cache
        .remove_by_ids(DataType::Steps, &["missing".to_string()])
        .await
        .expect("no write needed");
    assert_eq!(removed, 0);
}

#[tokio::test]
async fn cursor_and_cache_survive_restart_on_sqlite() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("vitalsync.sqlite");
    let clock = Arc::new(ManualClock::new(at(0)));
    {
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&path).expect("open"));
        SyncCursorStore::new(store.clone(), clock.clone())
            .set_cursor(DataType::Steps, "A7")
            .await
            .expect("cursor");
        LocalCache::new(store, clock.clone())
            .merge(
                DataType::Steps,
                &[sample("s1", DataType::Steps, 0, 5.0)],
                CacheQueryParams::default(),
            )
            .await
            .expect("merge");
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&path).expect("reopen"));
    let cursors = SyncCursorStore::new(store.clone(), clock.clone());
    assert_eq!(cursors.get_cursor(DataType::Steps).await.as_deref(), Some("A7"));
    assert_eq!(cursors.get_last_sync_timestamp(DataType::Steps).await, Some(at(0)));
    let samples = LocalCache::new(store, clock)
        .get(DataType::Steps, Duration::MAX)
        .await
        .expect("cached");
    assert_eq!(ids(&samples), vec!["s1"]);
}
