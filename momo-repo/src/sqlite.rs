//! SQLite repository adapter.
#![allow(clippy::collapsible_if)]

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::types::Json;
use std::str::FromStr;
use std::time::Duration;

use momo_types::{
    ApiKey, ApiKeyId, CompanyId, MomoRepository, MomoTransaction, MomoTransactionId,
    NewMomoTransaction, NewWebhookRecord, Notification, NotificationId, NotificationStatus,
    Provider, ProviderConfig, ReconcileOutcome, RepoError, StatusUpdate, Transition,
    WebhookFilter, WebhookId, WebhookRecord,
};

use crate::types::{
    DbApiKey, DbNotification, DbProviderConfig, DbTransaction, DbWebhook, api_key_columns,
    notification_columns, provider_config_columns, transaction_columns, webhook_columns,
};
use crate::{db_err, insert_err};

const MIGRATIONS: [&str; 4] = [
    include_str!("../migrations/0001_create_transactions.sql"),
    include_str!("../migrations/0002_create_webhooks.sql"),
    include_str!("../migrations/0003_create_api_keys.sql"),
    include_str!("../migrations/0004_create_notifications.sql"),
];

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation.
#[derive(Clone)]
pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;

        let repo = Self { pool };
        repo.create_schema().await?;
        Ok(repo)
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the database schema (idempotent).
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        for ddl in MIGRATIONS {
            sqlx::query(ddl).execute(&self.pool).await.map_err(db_err)?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl MomoRepository for SqliteRepo {
    async fn record_webhook(&self, new: NewWebhookRecord) -> Result<WebhookRecord, RepoError> {
        let record = new.into_record();

        sqlx::query(concat!(
            "INSERT INTO momo_webhooks (",
            webhook_columns!(),
            ") VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(record.id.into_uuid())
        .bind(&record.provider)
        .bind(record.company_id.map(CompanyId::into_uuid))
        .bind(&record.event_type)
        .bind(&record.payload)
        .bind(Json(&record.headers))
        .bind(&record.source_ip)
        .bind(record.status.as_ref())
        .bind(&record.error_message)
        .bind(record.retry_count)
        .bind(record.received_at)
        .bind(record.processed_at)
        .bind(record.transaction_id.map(MomoTransactionId::into_uuid))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(record)
    }

    async fn get_webhook(&self, id: WebhookId) -> Result<Option<WebhookRecord>, RepoError> {
        let row: Option<DbWebhook> = sqlx::query_as(concat!(
            "SELECT ",
            webhook_columns!(),
            " FROM momo_webhooks WHERE id = ?"
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbWebhook::into_domain).transpose()
    }

    async fn list_webhooks(&self, filter: WebhookFilter) -> Result<Vec<WebhookRecord>, RepoError> {
        let status = filter.status.map(|s| s.to_string());
        let company = filter.company_id.map(CompanyId::into_uuid);

        let rows: Vec<DbWebhook> = sqlx::query_as(concat!(
            "SELECT ",
            webhook_columns!(),
            " FROM momo_webhooks",
            " WHERE (? IS NULL OR status = ?)",
            " AND (? IS NULL OR provider = ?)",
            " AND (? IS NULL OR company_id = ?)",
            " ORDER BY received_at DESC LIMIT ?"
        ))
        .bind(&status)
        .bind(&status)
        .bind(&filter.provider)
        .bind(&filter.provider)
        .bind(company)
        .bind(company)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbWebhook::into_domain).collect()
    }

    async fn mark_webhook_processed(
        &self,
        id: WebhookId,
        transaction_id: Option<MomoTransactionId>,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE momo_webhooks
               SET status = 'processed', processed_at = ?, error_message = NULL,
                   transaction_id = COALESCE(?, transaction_id)
               WHERE id = ?"#,
        )
        .bind(Utc::now())
        .bind(transaction_id.map(MomoTransactionId::into_uuid))
        .bind(id.into_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn mark_webhook_failed(&self, id: WebhookId, error: &str) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE momo_webhooks SET status = 'failed', error_message = ? WHERE id = ?"#,
        )
        .bind(error)
        .bind(id.into_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn increment_webhook_retry(&self, id: WebhookId) -> Result<WebhookRecord, RepoError> {
        let result =
            sqlx::query(r#"UPDATE momo_webhooks SET retry_count = retry_count + 1 WHERE id = ?"#)
                .bind(id.into_uuid())
                .execute(&self.pool)
                .await
                .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        self.get_webhook(id).await?.ok_or(RepoError::NotFound)
    }

    async fn create_transaction(
        &self,
        new: NewMomoTransaction,
    ) -> Result<MomoTransaction, RepoError> {
        let tx = MomoTransaction::initiate(new)?;

        sqlx::query(concat!(
            "INSERT INTO momo_transactions (",
            transaction_columns!(),
            ") VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(tx.id.into_uuid())
        .bind(tx.company_id.into_uuid())
        .bind(tx.provider.code())
        .bind(&tx.provider_transaction_id)
        .bind(&tx.transaction_number)
        .bind(tx.amount.amount())
        .bind(tx.amount.currency().code())
        .bind(&tx.phone_number)
        .bind(tx.status.as_str())
        .bind(&tx.provider_status)
        .bind(&tx.failure_reason)
        .bind(Json(&tx.metadata))
        .bind(tx.version)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .bind(tx.completed_at)
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;

        Ok(tx)
    }

    async fn get_transaction(
        &self,
        id: MomoTransactionId,
    ) -> Result<Option<MomoTransaction>, RepoError> {
        let row: Option<DbTransaction> = sqlx::query_as(concat!(
            "SELECT ",
            transaction_columns!(),
            " FROM momo_transactions WHERE id = ?"
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbTransaction::into_domain).transpose()
    }

    async fn find_by_provider_transaction_id(
        &self,
        company_id: Option<CompanyId>,
        provider: Provider,
        provider_transaction_id: &str,
    ) -> Result<Option<MomoTransaction>, RepoError> {
        let company = company_id.map(CompanyId::into_uuid);

        let row: Option<DbTransaction> = sqlx::query_as(concat!(
            "SELECT ",
            transaction_columns!(),
            " FROM momo_transactions",
            " WHERE provider = ? AND provider_transaction_id = ?",
            " AND (? IS NULL OR company_id = ?)",
            " LIMIT 1"
        ))
        .bind(provider.code())
        .bind(provider_transaction_id)
        .bind(company)
        .bind(company)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbTransaction::into_domain).transpose()
    }

    async fn find_by_transaction_number(
        &self,
        company_id: Option<CompanyId>,
        transaction_number: &str,
    ) -> Result<Option<MomoTransaction>, RepoError> {
        let company = company_id.map(CompanyId::into_uuid);

        let row: Option<DbTransaction> = sqlx::query_as(concat!(
            "SELECT ",
            transaction_columns!(),
            " FROM momo_transactions",
            " WHERE transaction_number = ?",
            " AND (? IS NULL OR company_id = ?)",
            " ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(transaction_number)
        .bind(company)
        .bind(company)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbTransaction::into_domain).transpose()
    }

    async fn apply_status_update(
        &self,
        update: StatusUpdate,
    ) -> Result<ReconcileOutcome, RepoError> {
        let mut attempt = 0;
        loop {
            match self.try_apply_status_update(&update).await {
                Ok(outcome) => return Ok(outcome),
                Err(Attempt::Busy(e)) if attempt < BUSY_RETRIES => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %e, "database busy, retrying status update");
                    tokio::time::sleep(Duration::from_millis(10 * attempt as u64)).await;
                }
                Err(Attempt::Busy(e)) => return Err(db_err(e)),
                Err(Attempt::Failed(e)) => return Err(e),
            }
        }
    }

    async fn get_provider_config(
        &self,
        company_id: CompanyId,
        provider: Provider,
    ) -> Result<Option<ProviderConfig>, RepoError> {
        let row: Option<DbProviderConfig> = sqlx::query_as(concat!(
            "SELECT ",
            provider_config_columns!(),
            " FROM momo_provider_configs WHERE company_id = ? AND provider = ?"
        ))
        .bind(company_id.into_uuid())
        .bind(provider.code())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbProviderConfig::into_domain).transpose()
    }

    async fn upsert_provider_config(
        &self,
        config: ProviderConfig,
    ) -> Result<ProviderConfig, RepoError> {
        sqlx::query(concat!(
            "INSERT INTO momo_provider_configs (",
            provider_config_columns!(),
            ") VALUES (?, ?, ?, ?, ?, ?)",
            " ON CONFLICT (company_id, provider) DO UPDATE SET",
            " webhook_secret = excluded.webhook_secret,",
            " is_active = excluded.is_active,",
            " updated_at = excluded.updated_at"
        ))
        .bind(config.company_id.into_uuid())
        .bind(config.provider.code())
        .bind(&config.webhook_secret)
        .bind(config.is_active)
        .bind(config.created_at)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.get_provider_config(config.company_id, config.provider)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn get_pending_notifications(
        &self,
        limit: i64,
    ) -> Result<Vec<Notification>, RepoError> {
        let rows: Vec<DbNotification> = sqlx::query_as(concat!(
            "SELECT ",
            notification_columns!(),
            " FROM momo_notifications WHERE status = 'PENDING'",
            " ORDER BY created_at ASC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(DbNotification::into_domain).collect())
    }

    async fn update_notification_status(
        &self,
        id: NotificationId,
        status: NotificationStatus,
        last_error: Option<String>,
    ) -> Result<(), RepoError> {
        let delivered_at = (status == NotificationStatus::Delivered).then(Utc::now);

        sqlx::query(
            r#"UPDATE momo_notifications
               SET status = ?, last_error = ?, delivered_at = COALESCE(?, delivered_at),
                   attempts = attempts + 1
               WHERE id = ?"#,
        )
        .bind(status.as_ref())
        .bind(last_error)
        .bind(delivered_at)
        .bind(id.into_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError> {
        let row: Option<DbApiKey> = sqlx::query_as(concat!(
            "SELECT ",
            api_key_columns!(),
            " FROM api_keys WHERE key_hash = ? AND is_active = 1"
        ))
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let now = Utc::now();
        sqlx::query(r#"UPDATE api_keys SET last_used_at = ? WHERE id = ?"#)
            .bind(now)
            .bind(row.id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        let mut key = row.into_domain();
        key.last_used_at = Some(now);
        Ok(Some(key))
    }

    async fn create_api_key(&self, name: &str) -> Result<(ApiKey, String), RepoError> {
        let raw_key = crate::security::generate_api_key();
        let key = ApiKey::new(
            name.to_string(),
            crate::security::hash_api_key(&raw_key),
            None,
        );

        sqlx::query(concat!(
            "INSERT INTO api_keys (",
            api_key_columns!(),
            ") VALUES (?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(key.id.into_uuid())
        .bind(&key.name)
        .bind(&key.key_hash)
        .bind(key.company_id.map(CompanyId::into_uuid))
        .bind(key.is_active)
        .bind(key.created_at)
        .bind(key.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;

        Ok((key, raw_key))
    }

    async fn count_api_keys(&self) -> Result<i64, RepoError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(row.0)
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, RepoError> {
        let rows: Vec<DbApiKey> = sqlx::query_as(concat!(
            "SELECT ",
            api_key_columns!(),
            " FROM api_keys WHERE is_active = 1 ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(DbApiKey::into_domain).collect())
    }

    async fn delete_api_key(&self, id: ApiKeyId) -> Result<bool, RepoError> {
        let result =
            sqlx::query(r#"UPDATE api_keys SET is_active = 0 WHERE id = ? AND is_active = 1"#)
                .bind(id.into_uuid())
                .execute(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status reconciliation
// ─────────────────────────────────────────────────────────────────────────────

const BUSY_RETRIES: u32 = 5;

/// Outcome of a failed reconciliation transaction.
enum Attempt {
    /// The database was locked by a concurrent writer.
    Busy(sqlx::Error),
    Failed(RepoError),
}

impl Attempt {
    fn classify(e: sqlx::Error, map: fn(sqlx::Error) -> RepoError) -> Self {
        if is_busy(&e) {
            Attempt::Busy(e)
        } else {
            Attempt::Failed(map(e))
        }
    }

    fn db(e: sqlx::Error) -> Self {
        Self::classify(e, db_err)
    }

    fn insert(e: sqlx::Error) -> Self {
        Self::classify(e, insert_err)
    }

    fn transaction(e: sqlx::Error) -> Self {
        Self::classify(e, |e| RepoError::Transaction(e.to_string()))
    }
}

impl From<RepoError> for Attempt {
    fn from(e: RepoError) -> Self {
        Attempt::Failed(e)
    }
}

/// SQLITE_BUSY or SQLITE_LOCKED, including their extended codes.
fn is_busy(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| matches!(code & 0xff, 5 | 6))
}

impl SqliteRepo {
    /// One reconciliation transaction. Lock contention surfaces as
    /// [`Attempt::Busy`] so the caller can run it again; a rerun after the
    /// competing writer committed finds the ledger key and reports a duplicate.
    async fn try_apply_status_update(
        &self,
        update: &StatusUpdate,
    ) -> Result<ReconcileOutcome, Attempt> {
        let key = update.idempotency_key();

        let mut db_tx = self.pool.begin().await.map_err(Attempt::transaction)?;

        let seen: Option<(String,)> = sqlx::query_as(
            r#"SELECT idempotency_key FROM momo_webhook_applications WHERE idempotency_key = ?"#,
        )
        .bind(&key)
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(Attempt::db)?;

        if seen.is_some() {
            return Ok(ReconcileOutcome::Duplicate);
        }

        let row: Option<DbTransaction> = sqlx::query_as(concat!(
            "SELECT ",
            transaction_columns!(),
            " FROM momo_transactions WHERE id = ?"
        ))
        .bind(update.transaction_id.into_uuid())
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(Attempt::db)?;

        let mut tx = row.ok_or(RepoError::NotFound)?.into_domain()?;
        let from = tx.status;
        let expected_version = tx.version;
        let now = Utc::now();

        if tx.apply_update(update, now).map_err(RepoError::from)? == Transition::Unchanged {
            return Ok(ReconcileOutcome::Unchanged { status: from });
        }

        let claimed = sqlx::query(
            r#"INSERT INTO momo_webhook_applications (idempotency_key, webhook_id, transaction_id, status, applied_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (idempotency_key) DO NOTHING"#,
        )
        .bind(&key)
        .bind(update.webhook_id.into_uuid())
        .bind(tx.id.into_uuid())
        .bind(tx.status.as_str())
        .bind(now)
        .execute(&mut *db_tx)
        .await
        .map_err(Attempt::db)?;

        if claimed.rows_affected() == 0 {
            return Ok(ReconcileOutcome::Duplicate);
        }

        let result = sqlx::query(
            r#"UPDATE momo_transactions
               SET status = ?, provider_status = ?, failure_reason = ?, provider_transaction_id = ?,
                   metadata = ?, version = ?, updated_at = ?, completed_at = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(tx.status.as_str())
        .bind(&tx.provider_status)
        .bind(&tx.failure_reason)
        .bind(&tx.provider_transaction_id)
        .bind(Json(&tx.metadata))
        .bind(tx.version)
        .bind(tx.updated_at)
        .bind(tx.completed_at)
        .bind(tx.id.into_uuid())
        .bind(expected_version)
        .execute(&mut *db_tx)
        .await
        .map_err(Attempt::insert)?;

        if result.rows_affected() == 0 {
            return Err(Attempt::Failed(RepoError::Conflict(format!(
                "Transaction {} was modified concurrently",
                tx.id
            ))));
        }

        let notification = Notification::status_changed(&tx, from, update.webhook_id);
        sqlx::query(concat!(
            "INSERT INTO momo_notifications (",
            notification_columns!(),
            ") VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(notification.id.into_uuid())
        .bind(notification.transaction_id.into_uuid())
        .bind(&notification.event_type)
        .bind(Json(&notification.payload))
        .bind(notification.status.as_ref())
        .bind(notification.attempts)
        .bind(&notification.last_error)
        .bind(notification.created_at)
        .bind(notification.delivered_at)
        .execute(&mut *db_tx)
        .await
        .map_err(Attempt::db)?;

        db_tx.commit().await.map_err(Attempt::transaction)?;

        Ok(ReconcileOutcome::Applied {
            from,
            to: tx.status,
        })
    }
}
