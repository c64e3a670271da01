//! Storage Pool Decommission Tests
//! Cascading delete of a pool and its volumes, leaving task history intact

mod common;

use common::{pool_with_volumes, test_manager};
use fleetstor_api::StorageRepository;
use fleetstor_common::{Error, TaskAction, TaskState};

// ============== Cascade Tests ==============

#[tokio::test]
async fn test_decommission_removes_volumes() {
    let (manager, db) = test_manager().await;
    let pool = pool_with_volumes(&manager, &[10, 20]).await;
    let pool_id = pool.id().unwrap().to_string();

    let removed = manager.decommission(&pool_id).await.unwrap();
    assert_eq!(removed, 2);

    assert!(db.volumes_for_pool(&pool_id).await.unwrap().is_empty());
    assert!(matches!(
        db.get_pool(&pool_id).await,
        Err(Error::StoragePoolNotFound(_))
    ));
}

#[tokio::test]
async fn test_decommission_keeps_tasks() {
    let (manager, db) = test_manager().await;
    let pool = pool_with_volumes(&manager, &[10, 20]).await;
    let pool_id = pool.id().unwrap().to_string();

    let task = manager
        .record_task(&pool_id, TaskAction::Create, None)
        .await
        .unwrap();

    manager.decommission(&pool_id).await.unwrap();

    let tasks = db.tasks_for_pool(&pool_id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, task.id);
    assert_eq!(db.get_task(&task.id).await.unwrap().storage_pool_id, pool_id);

    // The in-memory record still resolves its task history
    assert_eq!(pool.tasks(db.as_ref()).await.unwrap().len(), 1);
    assert_eq!(pool.total_volume_size_gb(db.as_ref()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_decommission_leaves_other_pools() {
    let (manager, db) = test_manager().await;
    let doomed = pool_with_volumes(&manager, &[10]).await;
    let kept = pool_with_volumes(&manager, &[20, 5]).await;

    manager.decommission(doomed.id().unwrap()).await.unwrap();

    assert_eq!(kept.total_volume_size_gb(db.as_ref()).await.unwrap(), 25);
    assert_eq!(manager.list_pools().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_decommission_empty_pool() {
    let (manager, _db) = test_manager().await;
    let pool = pool_with_volumes(&manager, &[]).await;

    assert_eq!(manager.decommission(pool.id().unwrap()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_decommission_missing_pool() {
    let (manager, _db) = test_manager().await;

    assert!(matches!(
        manager.decommission("missing").await,
        Err(Error::StoragePoolNotFound(_))
    ));
}

#[tokio::test]
async fn test_decommission_twice() {
    let (manager, _db) = test_manager().await;
    let pool = pool_with_volumes(&manager, &[10]).await;
    let pool_id = pool.id().unwrap().to_string();

    manager.decommission(&pool_id).await.unwrap();
    assert!(matches!(
        manager.decommission(&pool_id).await,
        Err(Error::StoragePoolNotFound(_))
    ));
}

// ============== Atomicity Tests ==============

#[tokio::test]
async fn test_decommission_failure_rolls_back() {
    let (manager, db) = test_manager().await;
    let pool = pool_with_volumes(&manager, &[10, 20, 5]).await;
    let pool_id = pool.id().unwrap().to_string();

    // Fail the pool delete after the volume delete has already run
    sqlx::query(
        "CREATE TRIGGER block_pool_delete BEFORE DELETE ON storage_pools
         BEGIN SELECT RAISE(ABORT, 'pool is locked'); END",
    )
    .execute(db.pool())
    .await
    .unwrap();

    let err = manager.decommission(&pool_id).await.unwrap_err();
    match err {
        Error::CascadeDeletion { pool_id: failed, reason } => {
            assert_eq!(failed, pool_id);
            assert!(reason.contains("pool is locked"));
        }
        other => panic!("expected CascadeDeletion, got {:?}", other),
    }

    assert!(db.get_pool(&pool_id).await.is_ok());
    assert_eq!(db.volumes_for_pool(&pool_id).await.unwrap().len(), 3);
    assert_eq!(pool.total_volume_size_gb(db.as_ref()).await.unwrap(), 35);

    sqlx::query("DROP TRIGGER block_pool_delete")
        .execute(db.pool())
        .await
        .unwrap();
    assert_eq!(manager.decommission(&pool_id).await.unwrap(), 3);
}

#[tokio::test]
async fn test_finished_tasks_survive_decommission() {
    let (manager, db) = test_manager().await;
    let pool = pool_with_volumes(&manager, &[10]).await;
    let pool_id = pool.id().unwrap().to_string();

    let task = manager
        .record_task(&pool_id, TaskAction::Delete, None)
        .await
        .unwrap();
    manager
        .update_task_state(&task.id, TaskState::Finished, Some("done".to_string()))
        .await
        .unwrap();

    manager.decommission(&pool_id).await.unwrap();

    let stored = db.get_task(&task.id).await.unwrap();
    assert_eq!(stored.state, TaskState::Finished);
    assert_eq!(stored.message.as_deref(), Some("done"));
}
