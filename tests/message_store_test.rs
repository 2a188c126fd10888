//! Message delivery integration tests
//!
//! Exercises the delivery state machine end to end through `Database`
//! transactions:
//! - Exactly-once delivery confirmation
//! - Failure reporting after recipient removal
//! - No-op syncs leave the store untouched

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::params;
use tempfile::TempDir;
use waypost::{Database, Error, MessageStatus, MessageStore, StoreError, SyncResult};

fn store() -> MessageStore {
    MessageStore::default()
}

/// Make the next message id 1001.
async fn seed_message_ids(db: &Database) {
    db.transaction(|tx| {
        tx.execute(
            "INSERT INTO sqlite_sequence (name, seq) VALUES ('messages', 1000)",
            [],
        )?;
        Ok(())
    })
    .await
    .unwrap();
}

async fn message_rows(db: &Database) -> Vec<(i64, String)> {
    db.read(|conn| {
        let mut stmt =
            conn.prepare("SELECT message_id, status FROM messages ORDER BY message_id")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })
    .await
    .unwrap()
}

// =============================================================================
// Delivery
// =============================================================================

#[tokio::test]
async fn test_delivery_scenario() {
    let db = Database::open_in_memory().unwrap();
    let store = store();
    seed_message_ids(&db).await;

    let id = db.transaction(|tx| store.send(tx, 1, 2, "hi")).await.unwrap();
    assert_eq!(id, 1001);

    let recipient = db.transaction(|tx| store.sync_inbox(tx, 2)).await.unwrap();
    assert_eq!(recipient.received.len(), 1);
    let msg = &recipient.received[0];
    assert_eq!(
        (msg.message_id, msg.from_user_id, msg.to_user_id, msg.contents.as_str()),
        (1001, 1, 2, "hi")
    );
    assert!(recipient.delivered.is_empty());
    assert!(recipient.failed.is_empty());

    let sender = db.transaction(|tx| store.sync_inbox(tx, 1)).await.unwrap();
    assert!(sender.received.is_empty());
    assert_eq!(sender.delivered, vec![1001]);
    assert!(sender.failed.is_empty());

    let again = db.transaction(|tx| store.sync_inbox(tx, 1)).await.unwrap();
    assert!(again.is_empty());
    assert!(message_rows(&db).await.is_empty());
}

#[tokio::test]
async fn test_exactly_once_with_many_messages() {
    let db = Database::open_in_memory().unwrap();
    let store = store();

    let ids: Vec<i64> = db
        .transaction(|tx| {
            (0..10)
                .map(|i| store.send(tx, 1, 2, &format!("message {i}")))
                .collect()
        })
        .await
        .unwrap();

    let recipient = db.transaction(|tx| store.sync_inbox(tx, 2)).await.unwrap();
    let received: Vec<i64> = recipient.received.iter().map(|m| m.message_id).collect();
    assert_eq!(received, ids);
    assert!(recipient
        .received
        .iter()
        .all(|m| m.status == MessageStatus::Delivered));

    let mut reported = Vec::new();
    for _ in 0..3 {
        let sync = db.transaction(|tx| store.sync_inbox(tx, 1)).await.unwrap();
        reported.extend(sync.delivered);
    }
    assert_eq!(reported, ids);
}

/// File-backed, so concurrent transactions go through SQLite's locking.
fn file_database(dir: &TempDir) -> Arc<Database> {
    let path = dir.path().join("waypost.db");
    Arc::new(Database::open(&path, Duration::from_secs(5)).unwrap())
}

async fn queue_messages(db: &Database, store: &MessageStore, count: usize) -> Vec<i64> {
    db.transaction(|tx| {
        (0..count)
            .map(|i| store.send(tx, 1, 2, &format!("message {i}")))
            .collect()
    })
    .await
    .unwrap()
}

/// Run `syncs` concurrent syncs for `user` and gather what each returned.
async fn concurrent_syncs(
    db: &Arc<Database>,
    store: &MessageStore,
    user: i64,
    syncs: usize,
) -> Vec<SyncResult> {
    let handles: Vec<_> = (0..syncs)
        .map(|_| {
            let db = db.clone();
            let store = store.clone();
            tokio::spawn(async move {
                db.transaction_with_retry(|tx| store.sync_inbox(tx, user))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_recipient_syncs_deliver_once() {
    let dir = TempDir::new().unwrap();
    let db = file_database(&dir);
    let store = store();
    let ids = queue_messages(&db, &store, 200).await;

    let results = concurrent_syncs(&db, &store, 2, 8).await;
    let received: Vec<i64> = results
        .iter()
        .flat_map(|r| r.received.iter().map(|m| m.message_id))
        .collect();

    let unique: HashSet<i64> = received.iter().copied().collect();
    assert_eq!(received.len(), ids.len());
    assert_eq!(unique, ids.iter().copied().collect::<HashSet<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sender_syncs_report_once() {
    let dir = TempDir::new().unwrap();
    let db = file_database(&dir);
    let store = store();
    let ids = queue_messages(&db, &store, 200).await;
    db.transaction(|tx| store.sync_inbox(tx, 2)).await.unwrap();

    let results = concurrent_syncs(&db, &store, 1, 8).await;
    let delivered: Vec<i64> = results.iter().flat_map(|r| r.delivered.clone()).collect();

    let unique: HashSet<i64> = delivered.iter().copied().collect();
    assert_eq!(delivered.len(), ids.len());
    assert_eq!(unique, ids.iter().copied().collect::<HashSet<_>>());
    assert!(message_rows(&db).await.is_empty());
}

#[tokio::test]
async fn test_noop_sync_writes_nothing() {
    let db = Database::open_in_memory().unwrap();
    let store = store();

    // Undelivered mail from user 5 is neither inbox nor outcome for user 5.
    db.transaction(|tx| store.send(tx, 5, 6, "pending")).await.unwrap();
    db.transaction(|tx| {
        tx.execute_batch(
            "CREATE TABLE writes (kind TEXT NOT NULL);
             CREATE TRIGGER audit_update AFTER UPDATE ON messages
             BEGIN INSERT INTO writes VALUES ('update'); END;
             CREATE TRIGGER audit_delete AFTER DELETE ON messages
             BEGIN INSERT INTO writes VALUES ('delete'); END;",
        )?;
        Ok(())
    })
    .await
    .unwrap();
    let before = message_rows(&db).await;

    let result = db.transaction(|tx| store.sync_inbox(tx, 5)).await.unwrap();
    assert!(result.is_empty());

    let writes: i64 = db
        .read(|conn| Ok(conn.query_row("SELECT count(*) FROM writes", [], |r| r.get(0))?))
        .await
        .unwrap();
    assert_eq!(writes, 0);
    assert_eq!(message_rows(&db).await, before);
}

#[tokio::test]
async fn test_sync_interrupted_is_redelivered() {
    let db = Database::open_in_memory().unwrap();
    let store = store();

    let id = db.transaction(|tx| store.send(tx, 1, 2, "hi")).await.unwrap();

    let aborted: waypost::Result<()> = db
        .transaction(|tx| {
            let result = store.sync_inbox(tx, 2)?;
            assert_eq!(result.received.len(), 1);
            Err(Error::Concurrency("connection dropped".into()))
        })
        .await;
    assert!(aborted.is_err());
    assert_eq!(message_rows(&db).await, vec![(id, "undelivered".to_string())]);

    let retried = db.transaction(|tx| store.sync_inbox(tx, 2)).await.unwrap();
    assert_eq!(retried.received[0].message_id, id);
}

#[tokio::test]
async fn test_row_count_mismatch_rolls_back() {
    let db = Database::open_in_memory().unwrap();
    let store = store();

    db.transaction(|tx| {
        store.send(tx, 1, 2, "one")?;
        store.send(tx, 1, 2, "two")
    })
    .await
    .unwrap();

    // A trigger that swallows one of the two updates simulates a lost update.
    db.transaction(|tx| {
        tx.execute_batch(
            "CREATE TRIGGER lose_update BEFORE UPDATE ON messages
             WHEN OLD.contents = 'two'
             BEGIN SELECT RAISE(IGNORE); END;",
        )?;
        Ok(())
    })
    .await
    .unwrap();

    let result = db.transaction(|tx| store.sync_inbox(tx, 2)).await;
    assert!(matches!(
        result,
        Err(Error::Store(StoreError::RowCountMismatch {
            expected: 2,
            actual: 1,
            ..
        }))
    ));

    let rows = message_rows(&db).await;
    assert!(rows.iter().all(|(_, status)| status == "undelivered"));
}

// =============================================================================
// Failure
// =============================================================================

#[tokio::test]
async fn test_recipient_removed_before_sync() {
    let db = Database::open_in_memory().unwrap();
    let store = store();

    let id = db.transaction(|tx| store.send(tx, 1, 2, "hi")).await.unwrap();
    let outcome = db.transaction(|tx| store.mark_failed(tx, 2)).await.unwrap();
    assert_eq!(outcome.failed, 1);

    let sender = db.transaction(|tx| store.sync_inbox(tx, 1)).await.unwrap();
    assert_eq!(sender.failed, vec![id]);
    assert!(sender.delivered.is_empty());
    assert!(message_rows(&db).await.is_empty());
}

#[tokio::test]
async fn test_removed_sender_messages_are_discarded() {
    let db = Database::open_in_memory().unwrap();
    let store = store();

    db.transaction(|tx| {
        store.send(tx, 2, 1, "undelivered")?;
        store.send(tx, 2, 3, "will be delivered")?;
        store.send(tx, 2, 4, "will fail")
    })
    .await
    .unwrap();
    db.transaction(|tx| store.sync_inbox(tx, 3)).await.unwrap();
    db.transaction(|tx| store.mark_failed(tx, 4)).await.unwrap();

    let statuses: Vec<String> = message_rows(&db).await.into_iter().map(|(_, s)| s).collect();
    assert_eq!(statuses, ["undelivered", "delivered", "failed"]);

    let outcome = db.transaction(|tx| store.mark_failed(tx, 2)).await.unwrap();
    assert_eq!(outcome.discarded, 3);
    assert!(message_rows(&db).await.is_empty());

    for user in [1, 3, 4] {
        let sync = db
            .transaction(|tx| store.sync_inbox(tx, user))
            .await
            .unwrap();
        assert!(sync.is_empty(), "user {user} saw {sync:?}");
    }
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_pending_messages_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("waypost.db");
    let store = store();

    let id = {
        let db = Database::open(&path, Duration::from_secs(1)).unwrap();
        db.transaction(|tx| store.send(tx, 1, 2, "persisted")).await.unwrap()
    };

    let db = Database::open(&path, Duration::from_secs(1)).unwrap();
    let sync = db.transaction(|tx| store.sync_inbox(tx, 2)).await.unwrap();
    assert_eq!(sync.received[0].message_id, id);
    assert_eq!(sync.received[0].contents, "persisted");
}

#[tokio::test]
async fn test_ids_not_reused_after_delete() {
    let db = Database::open_in_memory().unwrap();
    let store = store();

    let first = db.transaction(|tx| store.send(tx, 1, 2, "a")).await.unwrap();
    db.transaction(|tx| store.sync_inbox(tx, 2)).await.unwrap();
    db.transaction(|tx| store.sync_inbox(tx, 1)).await.unwrap();
    assert!(message_rows(&db).await.is_empty());

    let second = db.transaction(|tx| store.send(tx, 1, 2, "b")).await.unwrap();
    assert!(second > first);

    db.transaction(|tx| {
        tx.execute("DELETE FROM messages WHERE message_id = ?1", params![second])?;
        Ok(())
    })
    .await
    .unwrap();
    let third = db.transaction(|tx| store.send(tx, 1, 2, "c")).await.unwrap();
    assert!(third > second);
}
