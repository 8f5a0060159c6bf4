//! Built-in job handler implementations.

pub mod purge;
pub mod reconcile;
pub mod sweep;

use std::sync::Arc;

use stowage_service::Services;

use crate::executor::JobExecutor;

pub use purge::TrashPurgeJobHandler;
pub use reconcile::QuotaReconciliationJobHandler;
pub use sweep::ReservationSweepJobHandler;

/// Build an executor with every built-in handler registered.
pub fn default_executor(services: &Services) -> JobExecutor {
    let mut executor = JobExecutor::new();
    executor.register(Arc::new(ReservationSweepJobHandler::new(Arc::clone(
        &services.uploads,
    ))));
    executor.register(Arc::new(QuotaReconciliationJobHandler::new(Arc::clone(
        &services.reconciler,
    ))));
    executor.register(Arc::new(TrashPurgeJobHandler::new(Arc::clone(
        &services.purger,
    ))));
    executor
}
