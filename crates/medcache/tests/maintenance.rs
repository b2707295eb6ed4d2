//! Periodic trimming on the tokio runtime.

mod common;

use std::time::Duration;

use uuid::Uuid;

use common::TestServices;
use medcache_objects::Entity;

#[tokio::test(start_paused = true)]
async fn test_maintenance_sweeps_expired_entries() {
    let t = TestServices::new();
    let key = Uuid::new_v4();
    t.services.objects().add(Entity::new(key, "Patient").into());
    t.services.adhoc().add("ward", 7u32, None);
    assert!(t.services.objects().size() > 0);

    // Expire everything on the cache clock, then let two passes run.
    t.clock.advance(Duration::from_secs(61));
    let handle = t
        .services
        .spawn_maintenance(Duration::from_secs(1))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    assert_eq!(t.services.objects().size(), 0);
    assert_eq!(t.services.adhoc().size(), 0);

    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_keeps_live_entries() {
    let t = TestServices::new();
    let key = Uuid::new_v4();
    t.services.objects().add(Entity::new(key, "Patient").into());

    let handle = t
        .services
        .spawn_maintenance(Duration::from_secs(1))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(t.services.objects().get(key).is_some());
    handle.abort();
}
