//! Shared test helpers for worker job tests.
#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use stowage_core::config::{AppConfig, DatabaseConfig, LocalObjectStoreConfig, ObjectStoreConfig};
use stowage_core::types::UserId;
use stowage_database::MemoryStore;
use stowage_service::{RequestContext, Services};
use stowage_storage::{LocalObjectStore, ObjectStoreGateway};
use stowage_worker::jobs::default_executor;
use stowage_worker::{JobQueue, WorkerRunner};

/// Services and a worker runner over an in-memory store.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub services: Services,
    pub queue: Arc<JobQueue>,
    pub runner: WorkerRunner,
    _root: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
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
            quota: Default::default(),
            billing: Default::default(),
            worker: Default::default(),
            logging: Default::default(),
        };

        let store = Arc::new(MemoryStore::new());
        let objects = LocalObjectStore::new(&config.object_store.local)
            .await
            .expect("local object store");
        let gateway = Arc::new(ObjectStoreGateway::from_config(
            Arc::new(objects),
            &config.object_store,
        ));
        let services = Services::build(&config, store.clone(), gateway);

        let queue = Arc::new(JobQueue::new(
            config.worker.queue_capacity,
            config.worker.max_attempts,
        ));
        let runner = WorkerRunner::new(
            queue.clone(),
            Arc::new(default_executor(&services)),
            &config.worker,
            "test-worker",
        );

        Self {
            store,
            services,
            queue,
            runner,
            _root: root,
        }
    }

    pub async fn user(&self) -> RequestContext {
        let user_id = UserId::new();
        let provisioned = self
            .services
            .accounts
            .provision(user_id)
            .await
            .expect("provision");
        RequestContext::new(user_id, provisioned.root.id)
    }
}
