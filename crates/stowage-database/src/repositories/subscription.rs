//! Subscription repository implementation.

use sqlx::{PgConnection, PgPool};

use stowage_core::error::{AppError, ErrorKind};
use stowage_core::result::AppResult;
use stowage_core::types::UserId;
use stowage_entity::billing::{PaymentProvider, SubscriptionRecord};

use crate::connection::lock_error;

/// Repository for subscription records.
#[derive(Debug, Clone)]
pub struct SubscriptionRepository {
    pool: PgPool,
}

impl SubscriptionRepository {
    /// Create a new subscription repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a subscription by provider identity.
    pub async fn find_by_provider_id(
        &self,
        provider: PaymentProvider,
        provider_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionRecord>> {
        sqlx::query_as::<_, SubscriptionRecord>(
            "SELECT * FROM subscriptions WHERE provider = $1 AND provider_subscription_id = $2",
        )
        .bind(provider)
        .bind(provider_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find subscription", e))
    }

    /// List a user's subscriptions, newest first.
    pub async fn find_by_user(&self, user_id: UserId) -> AppResult<Vec<SubscriptionRecord>> {
        sqlx::query_as::<_, SubscriptionRecord>(
            "SELECT * FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list subscriptions", e))
    }

    /// Find and lock a user's subscription by provider identity.
    pub async fn lock(
        conn: &mut PgConnection,
        user_id: UserId,
        provider: PaymentProvider,
        provider_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionRecord>> {
        sqlx::query_as::<_, SubscriptionRecord>(
            "SELECT * FROM subscriptions \
             WHERE provider = $1 AND provider_subscription_id = $2 AND user_id = $3 FOR UPDATE",
        )
        .bind(provider)
        .bind(provider_subscription_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| lock_error(e, "Failed to lock subscription"))
    }

    /// Insert a subscription record.
    pub async fn create(conn: &mut PgConnection, record: &SubscriptionRecord) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO subscriptions \
             (id, user_id, plan_id, provider, provider_subscription_id, status, \
              entitlement_applied, granted_bytes, failed_payment_count, last_event_at, \
              current_period_end, processed_event_ids, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.plan_id)
        .bind(record.provider)
        .bind(&record.provider_subscription_id)
        .bind(record.status)
        .bind(record.entitlement_applied)
        .bind(record.granted_bytes)
        .bind(record.failed_payment_count)
        .bind(record.last_event_at)
        .bind(record.current_period_end)
        .bind(&record.processed_event_ids)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::conflict(format!(
                    "Subscription {} {} already exists",
                    record.provider, record.provider_subscription_id
                ))
            }
            _ => AppError::with_source(ErrorKind::Database, "Failed to create subscription", e),
        })?;
        Ok(())
    }

    /// Persist every mutable field of a subscription record.
    pub async fn update(conn: &mut PgConnection, record: &SubscriptionRecord) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE subscriptions SET status = $2, entitlement_applied = $3, granted_bytes = $4, \
             failed_payment_count = $5, last_event_at = $6, current_period_end = $7, \
             processed_event_ids = $8, updated_at = $9 WHERE id = $1",
        )
        .bind(record.id)
        .bind(record.status)
        .bind(record.entitlement_applied)
        .bind(record.granted_bytes)
        .bind(record.failed_payment_count)
        .bind(record.last_event_at)
        .bind(record.current_period_end)
        .bind(&record.processed_event_ids)
        .bind(record.updated_at)
        .execute(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update subscription", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "Subscription {} not found",
                record.id
            )));
        }
        Ok(())
    }
}
