//! Scenario tests for recursive deletion, trash, and directory moves.

mod helpers;

use chrono::Utc;

use stowage_core::error::ErrorKind;
use stowage_database::MetadataStore;

#[tokio::test]
async fn test_delete_nested_subtree_releases_exact_bytes() {
    let app = helpers::TestApp::new().await;
    let ctx = app.user().await;
    let outside = app.mkdir(&ctx, ctx.root_directory_id, "outside").await;
    app.upload(&ctx, outside, "keep.bin", 11).await;

    let projects = app.mkdir(&ctx, ctx.root_directory_id, "projects").await;
    let target = app.mkdir(&ctx, projects, "2026").await;
    let a = app.mkdir(&ctx, target, "a").await;
    let b = app.mkdir(&ctx, a, "b").await;
    let c = app.mkdir(&ctx, target, "c").await;

    let mut expected = 0i64;
    for (i, dir) in [target, target, a, a, a, b, b, b, c, c].into_iter().enumerate() {
        let size = 10 * (i + 1);
        app.upload(&ctx, dir, &format!("file-{i}.bin"), size).await;
        expected += size as i64;
    }
    // A pending upload inside the subtree is removed too but releases nothing.
    app.reserve(&ctx, b, "pending.bin", 5).await;

    let root_before = app.aggregate(ctx.root_directory_id).await;
    let projects_before = app.aggregate(projects).await;
    assert_eq!(projects_before, expected);

    let report = app
        .services
        .deletion
        .delete_subtree(&ctx, target)
        .await
        .unwrap();

    assert_eq!(report.released_bytes, expected);
    assert_eq!(report.directories_removed, 4);
    assert_eq!(report.documents_removed, 11);
    assert!(report.orphaned_keys.is_empty());

    assert_eq!(app.aggregate(projects).await, projects_before - expected);
    assert_eq!(app.aggregate(ctx.root_directory_id).await, root_before - expected);
    assert_eq!(app.account(ctx.user_id).await.used_storage_bytes, 11);

    let state = app.store.snapshot().await;
    for dir in [target, a, b, c] {
        assert!(!state.directories.contains_key(&dir));
    }
    assert!(
        state
            .documents
            .values()
            .all(|d| state.directories.contains_key(&d.parent_id)),
        "no document may outlive its directory"
    );
    app.assert_consistent(ctx.user_id).await;
}

#[tokio::test]
async fn test_root_directory_cannot_be_deleted() {
    let app = helpers::TestApp::new().await;
    let ctx = app.user().await;

    let err = app
        .services
        .deletion
        .delete_subtree(&ctx, ctx.root_directory_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_failed_commit_leaves_subtree_intact() {
    let app = helpers::TestApp::new().await;
    let ctx = app.user().await;
    let dir = app.mkdir(&ctx, ctx.root_directory_id, "dir").await;
    app.upload(&ctx, dir, "a.bin", 30).await;

    app.store.fail_next_commit();
    let err = app
        .services
        .deletion
        .delete_subtree(&ctx, dir)
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    assert_eq!(app.aggregate(dir).await, 30);
    assert_eq!(app.account(ctx.user_id).await.used_storage_bytes, 30);
}

#[tokio::test]
async fn test_move_directory_shifts_aggregates() {
    let app = helpers::TestApp::new().await;
    let ctx = app.user().await;
    let left = app.mkdir(&ctx, ctx.root_directory_id, "left").await;
    let right = app.mkdir(&ctx, ctx.root_directory_id, "right").await;
    let moving = app.mkdir(&ctx, left, "moving").await;
    let nested = app.mkdir(&ctx, moving, "nested").await;
    app.upload(&ctx, nested, "a.bin", 70).await;

    let moved = app
        .services
        .directories
        .move_directory(&ctx, moving, right)
        .await
        .unwrap();

    assert_eq!(moved.parent_id, Some(right));
    assert_eq!(moved.ancestor_path, vec![ctx.root_directory_id, right]);
    let nested_node = app.store.find_directory(nested).await.unwrap().unwrap();
    assert_eq!(nested_node.ancestor_path, vec![ctx.root_directory_id, right, moving]);

    assert_eq!(app.aggregate(left).await, 0);
    assert_eq!(app.aggregate(right).await, 70);
    assert_eq!(app.aggregate(ctx.root_directory_id).await, 70);
    assert_eq!(app.account(ctx.user_id).await.used_storage_bytes, 70);
    app.assert_consistent(ctx.user_id).await;
}

#[tokio::test]
async fn test_move_into_descendant_rejected() {
    let app = helpers::TestApp::new().await;
    let ctx = app.user().await;
    let parent = app.mkdir(&ctx, ctx.root_directory_id, "parent").await;
    let child = app.mkdir(&ctx, parent, "child").await;
    let other = app.user().await;

    let directories = &app.services.directories;
    let err = directories.move_directory(&ctx, parent, child).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    let err = directories.move_directory(&ctx, parent, parent).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    let err = directories
        .move_directory(&ctx, parent, other.root_directory_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_trash_restore_and_purge() {
    let app = helpers::TestApp::new().await;
    let ctx = app.user().await;
    let dir = app.mkdir(&ctx, ctx.root_directory_id, "old").await;
    let inner = app.mkdir(&ctx, dir, "inner").await;
    app.upload(&ctx, inner, "a.bin", 25).await;
    let loose = app.upload(&ctx, ctx.root_directory_id, "loose.bin", 5).await;

    let directories = &app.services.directories;
    directories.trash_directory(&ctx, dir).await.unwrap();
    directories.trash_document(&ctx, loose).await.unwrap();

    // Trashed bytes still count.
    assert_eq!(app.account(ctx.user_id).await.used_storage_bytes, 30);
    let err = directories.restore_directory(&ctx, inner).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    directories.restore_directory(&ctx, dir).await.unwrap();
    let state = app.store.snapshot().await;
    assert!(state.directories[&inner].trashed_at.is_none());
    directories.trash_directory(&ctx, dir).await.unwrap();

    // Nothing has expired yet.
    let report = app.services.purger.purge_expired(Utc::now()).await.unwrap();
    assert_eq!(report.directories_purged + report.documents_purged, 0);

    let later = Utc::now() + chrono::Duration::days(app.config.quota.trash_retention_days + 1);
    let report = app.services.purger.purge_expired(later).await.unwrap();
    assert_eq!(report.directories_purged, 1);
    assert_eq!(report.documents_purged, 1);
    assert_eq!(report.deleted.released_bytes, 30);
    assert_eq!(report.failures, 0);

    assert_eq!(app.account(ctx.user_id).await.used_storage_bytes, 0);
    app.assert_consistent(ctx.user_id).await;
}
