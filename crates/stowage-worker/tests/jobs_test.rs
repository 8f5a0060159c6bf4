//! Built-in jobs executed through the worker runner.

mod helpers;

use chrono::{Duration, Utc};

use stowage_entity::job::{JobPayload, JobStatus};
use stowage_service::ReserveUploadRequest;
use stowage_service::directory::CreateDirectoryRequest;

use helpers::TestApp;

async fn run(app: &TestApp, payload: JobPayload) -> JobStatus {
    app.queue.enqueue(payload, "test").expect("enqueue");
    let job = app.queue.dequeue().await.expect("queued job");
    app.runner.run_job(job).await
}

#[tokio::test]
async fn test_sweep_job_cancels_aged_reservations() {
    let app = TestApp::new().await;
    let ctx = app.user().await;
    let reservation = app
        .services
        .uploads
        .reserve(
            &ctx,
            ReserveUploadRequest {
                parent_directory_id: ctx.root_directory_id,
                file_name: "draft.pdf".into(),
                declared_size_bytes: 100,
                content_type: None,
            },
        )
        .await
        .expect("reserve");

    let fresh = app
        .services
        .uploads
        .reserve(
            &ctx,
            ReserveUploadRequest {
                parent_directory_id: ctx.root_directory_id,
                file_name: "fresh.pdf".into(),
                declared_size_bytes: 100,
                content_type: None,
            },
        )
        .await
        .expect("reserve");

    app.store
        .tamper(|state| {
            if let Some(doc) = state.documents.get_mut(&reservation.document_id) {
                doc.created_at = doc.created_at - Duration::hours(2);
            }
        })
        .await;

    assert_eq!(run(&app, JobPayload::ReservationSweep).await, JobStatus::Completed);

    let state = app.store.snapshot().await;
    assert!(!state.documents.contains_key(&reservation.document_id));
    assert!(state.documents.contains_key(&fresh.document_id));
}

#[tokio::test]
async fn test_reconciliation_job_repairs_drift() {
    let app = TestApp::new().await;
    let ctx = app.user().await;
    app.store
        .tamper(|state| {
            if let Some(account) = state.accounts.get_mut(&ctx.user_id) {
                account.used_storage_bytes = 4_096;
            }
            if let Some(root) = state.directories.get_mut(&ctx.root_directory_id) {
                root.aggregate_size_bytes = 4_096;
            }
        })
        .await;

    let status = run(
        &app,
        JobPayload::QuotaReconciliation {
            user_id: Some(ctx.user_id),
        },
    )
    .await;
    assert_eq!(status, JobStatus::Completed);

    let state = app.store.snapshot().await;
    assert_eq!(state.accounts[&ctx.user_id].used_storage_bytes, 0);
    assert_eq!(state.directories[&ctx.root_directory_id].aggregate_size_bytes, 0);
}

#[tokio::test]
async fn test_purge_job_removes_expired_trash() {
    let app = TestApp::new().await;
    let ctx = app.user().await;
    let old = app
        .services
        .directories
        .create_directory(
            &ctx,
            CreateDirectoryRequest {
                parent_id: ctx.root_directory_id,
                name: "old".into(),
            },
        )
        .await
        .expect("create")
        .id;
    let recent = app
        .services
        .directories
        .create_directory(
            &ctx,
            CreateDirectoryRequest {
                parent_id: ctx.root_directory_id,
                name: "recent".into(),
            },
        )
        .await
        .expect("create")
        .id;
    for id in [old, recent] {
        app.services
            .directories
            .trash_directory(&ctx, id)
            .await
            .expect("trash");
    }
    app.store
        .tamper(|state| {
            if let Some(dir) = state.directories.get_mut(&old) {
                dir.trashed_at = Some(Utc::now() - Duration::days(45));
            }
        })
        .await;

    assert_eq!(run(&app, JobPayload::TrashPurge).await, JobStatus::Completed);

    let state = app.store.snapshot().await;
    assert!(!state.directories.contains_key(&old));
    assert!(state.directories.contains_key(&recent));
}

#[tokio::test]
async fn test_reconciliation_of_unknown_user_fails_without_retry() {
    let app = TestApp::new().await;
    let status = run(
        &app,
        JobPayload::QuotaReconciliation {
            user_id: Some(stowage_core::types::UserId::new()),
        },
    )
    .await;
    assert_eq!(status, JobStatus::Failed);
    assert_eq!(app.queue.stats().pending, 0);
}
