//! End-to-end collector-tick simulation (spec §8 scenario 3): two ticks
//! against a single-pane session whose preview changes each tick should
//! leave `global_rev=2` and two journal rows in insertion order.

use sentinel_store::watchtower::{PaneWrite, SessionWrite, WindowWrite};
use sentinel_store::watchtower::JournalWrite;
use sentinel_store::Database;

/// Mirrors spec §6.1 steps 1-8 for one session with one window and one pane:
/// upsert the projection rows, then bump `global_rev` once and append a
/// journal entry, persisting the new counter value the way a real collector
/// tick would.
async fn run_tick(db: &Database, revision: i64, preview: &str) {
    db.upsert_watchtower_session(&SessionWrite {
        name: "dev".into(),
        attached: 1,
        windows: 1,
        panes: 1,
        last_preview: preview.into(),
        rev: revision,
        ..Default::default()
    })
    .await
    .unwrap();

    db.upsert_watchtower_window(&WindowWrite {
        session: "dev".into(),
        window_index: 0,
        name: "main".into(),
        active: true,
        rev: revision,
        ..Default::default()
    })
    .await
    .unwrap();

    db.upsert_watchtower_pane(&PaneWrite {
        pane_id: "%1".into(),
        session: "dev".into(),
        window_index: 0,
        pane_index: 0,
        tail_preview: preview.into(),
        tail_hash: sentinel_core::digest::short_digest(preview),
        revision,
        ..Default::default()
    })
    .await
    .unwrap();

    let next_rev = db.watchtower_global_revision().await.unwrap() + 1;
    db.insert_journal(&JournalWrite {
        global_rev: next_rev,
        entity_type: "session".into(),
        session: "dev".into(),
        window_index: -1,
        change_kind: "activity".into(),
        ..Default::default()
    })
    .await
    .unwrap();
    db.set_runtime_value("global_rev", &next_rev.to_string()).await.unwrap();
}

#[tokio::test]
async fn two_ticks_leave_global_rev_at_two_with_ordered_journal_rows() {
    let db = Database::open_in_memory().await.unwrap();
    assert_eq!(db.watchtower_global_revision().await.unwrap(), 0);

    run_tick(&db, 1, "first output").await;
    run_tick(&db, 2, "second output, changed").await;

    assert_eq!(db.watchtower_global_revision().await.unwrap(), 2);

    let entries = db.list_journal_since(0, 10).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].global_rev, 1);
    assert_eq!(entries[1].global_rev, 2);
    assert!(entries[0].id < entries[1].id);

    let pane: (i64, String) =
        sqlx::query_as("SELECT revision, tail_preview FROM watchtower_panes WHERE pane_id = '%1'")
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(pane, (2, "second output, changed".to_string()));
}
