//! PostgreSQL repository adapter.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::types::Json;

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

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Repository
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL repository with row-level locking.
#[derive(Clone)]
pub struct PostgresRepo {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    let migrations = [
        (
            include_str!("../migrations/0001_create_transactions_pg.sql"),
            "0001",
        ),
        (
            include_str!("../migrations/0002_create_webhooks_pg.sql"),
            "0002",
        ),
        (
            include_str!("../migrations/0003_create_api_keys_pg.sql"),
            "0003",
        ),
        (
            include_str!("../migrations/0004_create_notifications_pg.sql"),
            "0004",
        ),
    ];

    for (sql, name) in migrations {
        execute_migration(pool, sql, name).await?;
    }
    Ok(())
}

impl PostgresRepo {
    /// Creates a new PostgreSQL repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the database schema (for testing with existing pool).
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        run_migrations(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl MomoRepository for PostgresRepo {
    async fn record_webhook(&self, new: NewWebhookRecord) -> Result<WebhookRecord, RepoError> {
        let record = new.into_record();

        sqlx::query(concat!(
            "INSERT INTO momo_webhooks (",
            webhook_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
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
            " FROM momo_webhooks WHERE id = $1"
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbWebhook::into_domain).transpose()
    }

    async fn list_webhooks(&self, filter: WebhookFilter) -> Result<Vec<WebhookRecord>, RepoError> {
        let rows: Vec<DbWebhook> = sqlx::query_as(concat!(
            "SELECT ",
            webhook_columns!(),
            " FROM momo_webhooks",
            " WHERE ($1::TEXT IS NULL OR status = $1)",
            " AND ($2::TEXT IS NULL OR provider = $2)",
            " AND ($3::UUID IS NULL OR company_id = $3)",
            " ORDER BY received_at DESC LIMIT $4"
        ))
        .bind(filter.status.map(|s| s.to_string()))
        .bind(&filter.provider)
        .bind(filter.company_id.map(CompanyId::into_uuid))
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
               SET status = 'processed', processed_at = $1, error_message = NULL,
                   transaction_id = COALESCE($2, transaction_id)
               WHERE id = $3"#,
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
            r#"UPDATE momo_webhooks SET status = 'failed', error_message = $1 WHERE id = $2"#,
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
        let row: Option<DbWebhook> = sqlx::query_as(concat!(
            "UPDATE momo_webhooks SET retry_count = retry_count + 1 WHERE id = $1 RETURNING ",
            webhook_columns!()
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.ok_or(RepoError::NotFound)?.into_domain()
    }

    async fn create_transaction(
        &self,
        new: NewMomoTransaction,
    ) -> Result<MomoTransaction, RepoError> {
        let tx = MomoTransaction::initiate(new)?;

        sqlx::query(concat!(
            "INSERT INTO momo_transactions (",
            transaction_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
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
            " FROM momo_transactions WHERE id = $1"
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
        let row: Option<DbTransaction> = sqlx::query_as(concat!(
            "SELECT ",
            transaction_columns!(),
            " FROM momo_transactions",
            " WHERE provider = $1 AND provider_transaction_id = $2",
            " AND ($3::UUID IS NULL OR company_id = $3)",
            " LIMIT 1"
        ))
        .bind(provider.code())
        .bind(provider_transaction_id)
        .bind(company_id.map(CompanyId::into_uuid))
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
        let row: Option<DbTransaction> = sqlx::query_as(concat!(
            "SELECT ",
            transaction_columns!(),
            " FROM momo_transactions",
            " WHERE transaction_number = $1",
            " AND ($2::UUID IS NULL OR company_id = $2)",
            " ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(transaction_number)
        .bind(company_id.map(CompanyId::into_uuid))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbTransaction::into_domain).transpose()
    }

    async fn apply_status_update(
        &self,
        update: StatusUpdate,
    ) -> Result<ReconcileOutcome, RepoError> {
        let key = update.idempotency_key();

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        // Lock the row first so concurrent deliveries for one transaction queue up.
        let row: Option<DbTransaction> = sqlx::query_as(concat!(
            "SELECT ",
            transaction_columns!(),
            " FROM momo_transactions WHERE id = $1 FOR UPDATE"
        ))
        .bind(update.transaction_id.into_uuid())
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(db_err)?;

        let mut tx = row.ok_or(RepoError::NotFound)?.into_domain()?;

        let seen: Option<(String,)> = sqlx::query_as(
            r#"SELECT idempotency_key FROM momo_webhook_applications WHERE idempotency_key = $1"#,
        )
        .bind(&key)
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(db_err)?;

        if seen.is_some() {
            return Ok(ReconcileOutcome::Duplicate);
        }

        let from = tx.status;
        let expected_version = tx.version;
        let now = Utc::now();

        if tx.apply_update(&update, now)? == Transition::Unchanged {
            return Ok(ReconcileOutcome::Unchanged { status: from });
        }

        let claimed = sqlx::query(
            r#"INSERT INTO momo_webhook_applications (idempotency_key, webhook_id, transaction_id, status, applied_at)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (idempotency_key) DO NOTHING"#,
        )
        .bind(&key)
        .bind(update.webhook_id.into_uuid())
        .bind(tx.id.into_uuid())
        .bind(tx.status.as_str())
        .bind(now)
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?;

        if claimed.rows_affected() == 0 {
            return Ok(ReconcileOutcome::Duplicate);
        }

        let result = sqlx::query(
            r#"UPDATE momo_transactions
               SET status = $1, provider_status = $2, failure_reason = $3, provider_transaction_id = $4,
                   metadata = $5, version = $6, updated_at = $7, completed_at = $8
               WHERE id = $9 AND version = $10"#,
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
        .map_err(insert_err)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::Conflict(format!(
                "Transaction {} was modified concurrently",
                tx.id
            )));
        }

        let notification = Notification::status_changed(&tx, from, update.webhook_id);
        sqlx::query(concat!(
            "INSERT INTO momo_notifications (",
            notification_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
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
        .map_err(db_err)?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(ReconcileOutcome::Applied {
            from,
            to: tx.status,
        })
    }

    async fn get_provider_config(
        &self,
        company_id: CompanyId,
        provider: Provider,
    ) -> Result<Option<ProviderConfig>, RepoError> {
        let row: Option<DbProviderConfig> = sqlx::query_as(concat!(
            "SELECT ",
            provider_config_columns!(),
            " FROM momo_provider_configs WHERE company_id = $1 AND provider = $2"
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
        let row: DbProviderConfig = sqlx::query_as(concat!(
            "INSERT INTO momo_provider_configs (",
            provider_config_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6)",
            " ON CONFLICT (company_id, provider) DO UPDATE SET",
            " webhook_secret = EXCLUDED.webhook_secret,",
            " is_active = EXCLUDED.is_active,",
            " updated_at = EXCLUDED.updated_at",
            " RETURNING ",
            provider_config_columns!()
        ))
        .bind(config.company_id.into_uuid())
        .bind(config.provider.code())
        .bind(&config.webhook_secret)
        .bind(config.is_active)
        .bind(config.created_at)
        .bind(config.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.into_domain()
    }

    async fn get_pending_notifications(
        &self,
        limit: i64,
    ) -> Result<Vec<Notification>, RepoError> {
        let rows: Vec<DbNotification> = sqlx::query_as(concat!(
            "SELECT ",
            notification_columns!(),
            " FROM momo_notifications WHERE status = 'PENDING'",
            " ORDER BY created_at ASC LIMIT $1"
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
               SET status = $1, last_error = $2, delivered_at = COALESCE($3, delivered_at),
                   attempts = attempts + 1
               WHERE id = $4"#,
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
            "UPDATE api_keys SET last_used_at = $2",
            " WHERE key_hash = $1 AND is_active = TRUE",
            " RETURNING ",
            api_key_columns!()
        ))
        .bind(key_hash)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(DbApiKey::into_domain))
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
            ") VALUES ($1, $2, $3, $4, $5, $6, $7)"
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
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys WHERE is_active = TRUE")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(row.0)
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, RepoError> {
        let rows: Vec<DbApiKey> = sqlx::query_as(concat!(
            "SELECT ",
            api_key_columns!(),
            " FROM api_keys WHERE is_active = TRUE ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(DbApiKey::into_domain).collect())
    }

    async fn delete_api_key(&self, id: ApiKeyId) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"UPDATE api_keys SET is_active = FALSE WHERE id = $1 AND is_active = TRUE"#,
        )
        .bind(id.into_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }
}
