//! Shared test helpers for service scenario tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;
use tokio::sync::{Mutex, oneshot};

use stowage_core::config::{
    AppConfig, BillingConfig, DatabaseConfig, LocalObjectStoreConfig, ObjectStoreConfig,
    PlanConfig, ProviderSecretConfig, QuotaConfig,
};
use stowage_core::result::AppResult;
use stowage_core::traits::storage::{
    ContentDisposition, DeleteReport, ObjectHead, ObjectStore, PresignedUrl,
};
use stowage_core::types::{DirectoryId, DocumentId, UserId};
use stowage_database::{MemoryStore, MetadataStore};
use stowage_entity::quota::QuotaAccount;
use stowage_service::directory::CreateDirectoryRequest;
use stowage_service::{RequestContext, ReserveUploadRequest, Services};
use stowage_storage::{LocalObjectStore, ObjectStoreGateway};

pub const STRIPE_SECRET: &str = "whsec_test";
pub const PADDLE_SECRET: &str = "pdl_ntfset_test";
pub const PRO_PLAN_BYTES: i64 = 500_000_000_000;

/// Services over an in-memory store and a temporary local object store.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub objects: Arc<LocalObjectStore>,
    pub services: Services,
    pub config: AppConfig,
    _root: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_object_store(|local| local as Arc<dyn ObjectStore>).await
    }

    /// Like [`TestApp::new`], but the services see `wrap(local)` as their object store.
    pub async fn with_object_store(
        wrap: impl FnOnce(Arc<LocalObjectStore>) -> Arc<dyn ObjectStore>,
    ) -> Self {
        let root = TempDir::new().expect("temp dir");
        let config = AppConfig {
            database: DatabaseConfig {
                url: "postgres://unused".into(),
                max_connections: 1,
                min_connections: 0,
                acquire_timeout_seconds: 1,
                idle_timeout_seconds: 1,
                lock_wait_timeout_seconds: 1,
                statement_timeout_seconds: 1,
            },
            object_store: ObjectStoreConfig {
                local: LocalObjectStoreConfig {
                    root_path: root.path().to_string_lossy().into_owned(),
                    public_base_url: "http://objects.test".into(),
                    signing_secret: "object-secret".into(),
                },
                ..ObjectStoreConfig::default()
            },
            upload: Default::default(),
            quota: QuotaConfig {
                default_max_storage_bytes: 1_000_000,
                ..QuotaConfig::default()
            },
            billing: BillingConfig {
                stripe: ProviderSecretConfig {
                    webhook_secret: STRIPE_SECRET.into(),
                },
                paddle: ProviderSecretConfig {
                    webhook_secret: PADDLE_SECRET.into(),
                },
                plans: vec![
                    PlanConfig {
                        id: "pro".into(),
                        storage_bytes: PRO_PLAN_BYTES,
                        stripe_price_id: Some("price_pro".into()),
                        paddle_price_id: Some("pri_pro".into()),
                    },
                    PlanConfig {
                        id: "basic".into(),
                        storage_bytes: 1_000,
                        stripe_price_id: None,
                        paddle_price_id: None,
                    },
                ],
                ..BillingConfig::default()
            },
            worker: Default::default(),
            logging: Default::default(),
        };

        let store = Arc::new(MemoryStore::new());
        let objects = Arc::new(
            LocalObjectStore::new(&config.object_store.local)
                .await
                .expect("local object store"),
        );
        let gateway = Arc::new(ObjectStoreGateway::from_config(
            wrap(objects.clone()),
            &config.object_store,
        ));
        let services = Services::build(&config, store.clone(), gateway);

        Self {
            store,
            objects,
            services,
            config,
            _root: root,
        }
    }

    /// Provision a user with the given ceiling.
    pub async fn user_with_quota(&self, max_storage_bytes: i64) -> RequestContext {
        let user_id = UserId::new();
        let provisioned = self
            .services
            .accounts
            .provision(user_id)
            .await
            .expect("provision");
        self.store
            .tamper(|state| {
                if let Some(account) = state.accounts.get_mut(&user_id) {
                    account.max_storage_bytes = max_storage_bytes;
                }
            })
            .await;
        RequestContext::new(user_id, provisioned.root.id)
    }

    pub async fn user(&self) -> RequestContext {
        self.user_with_quota(1_000_000).await
    }

    pub async fn mkdir(&self, ctx: &RequestContext, parent: DirectoryId, name: &str) -> DirectoryId {
        self.services
            .directories
            .create_directory(
                ctx,
                CreateDirectoryRequest {
                    parent_id: parent,
                    name: name.into(),
                },
            )
            .await
            .expect("create directory")
            .id
    }

    /// Reserve, upload through the signed URL, and commit.
    pub async fn upload(
        &self,
        ctx: &RequestContext,
        parent: DirectoryId,
        name: &str,
        size: usize,
    ) -> DocumentId {
        let reservation = self.reserve(ctx, parent, name, size as i64).await;
        self.objects
            .accept_upload(
                &reservation.upload_url,
                "application/octet-stream",
                Bytes::from(vec![7u8; size]),
            )
            .await
            .expect("upload bytes");
        self.services
            .uploads
            .complete_upload(ctx, reservation.document_id)
            .await
            .expect("commit");
        reservation.document_id
    }

    pub async fn reserve(
        &self,
        ctx: &RequestContext,
        parent: DirectoryId,
        name: &str,
        declared: i64,
    ) -> stowage_service::UploadReservation {
        self.services
            .uploads
            .reserve(
                ctx,
                ReserveUploadRequest {
                    parent_directory_id: parent,
                    file_name: name.into(),
                    declared_size_bytes: declared,
                    content_type: None,
                },
            )
            .await
            .expect("reserve")
    }

    pub async fn account(&self, user_id: UserId) -> QuotaAccount {
        self.store
            .find_account(user_id)
            .await
            .expect("find account")
            .expect("account exists")
    }

    pub async fn aggregate(&self, directory_id: DirectoryId) -> i64 {
        self.store
            .find_directory(directory_id)
            .await
            .expect("find directory")
            .expect("directory exists")
            .aggregate_size_bytes
    }

    /// Assert every stored aggregate matches a full recompute.
    pub async fn assert_consistent(&self, user_id: UserId) {
        let report = self
            .services
            .reconciler
            .recompute(user_id)
            .await
            .expect("reconcile");
        assert!(report.is_clean(), "counters drifted: {report:?}");
    }
}

/// Object store whose next `head_object` announces itself and then waits to
/// be released, so a test can interleave work between verify and commit.
#[derive(Debug)]
pub struct PausingObjectStore {
    inner: Arc<LocalObjectStore>,
    reached: Mutex<Option<oneshot::Sender<()>>>,
    release: Mutex<Option<oneshot::Receiver<()>>>,
}

/// Test-side handles for a [`PausingObjectStore`].
pub struct HeadPause {
    pub reached: oneshot::Receiver<()>,
    pub release: oneshot::Sender<()>,
}

impl PausingObjectStore {
    pub fn wrap(inner: Arc<LocalObjectStore>) -> (Arc<Self>, HeadPause) {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let store = Arc::new(Self {
            inner,
            reached: Mutex::new(Some(reached_tx)),
            release: Mutex::new(Some(release_rx)),
        });
        (
            store,
            HeadPause {
                reached: reached_rx,
                release: release_tx,
            },
        )
    }
}

#[async_trait]
impl ObjectStore for PausingObjectStore {
    fn provider_type(&self) -> &str {
        self.inner.provider_type()
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }

    async fn issue_upload_url(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> AppResult<PresignedUrl> {
        self.inner.issue_upload_url(key, content_type, ttl).await
    }

    async fn issue_download_url(
        &self,
        key: &str,
        filename: &str,
        disposition: ContentDisposition,
        ttl: Duration,
    ) -> AppResult<PresignedUrl> {
        self.inner
            .issue_download_url(key, filename, disposition, ttl)
            .await
    }

    async fn head_object(&self, key: &str) -> AppResult<ObjectHead> {
        let head = self.inner.head_object(key).await?;
        if let Some(reached) = self.reached.lock().await.take() {
            let _ = reached.send(());
        }
        let release = self.release.lock().await.take();
        if let Some(release) = release {
            let _ = release.await;
        }
        Ok(head)
    }

    async fn delete_objects(&self, keys: &[String]) -> AppResult<DeleteReport> {
        self.inner.delete_objects(keys).await
    }
}
