//! Webhook reconciliation service.
//!
//! Orchestrates the inbound pipeline through the repository port and the
//! provider adapters:
//!
//! record -> verify -> process -> match -> reconcile -> mark
//!
//! Contains NO HTTP logic. Handlers translate the results into responses.

use std::collections::BTreeMap;

use momo_repo::security::generate_transaction_number;
use momo_types::{
    AppError, CompanyId, CreateTransactionRequest, DomainError, MomoRepository, MomoTransaction,
    MomoTransactionId, Money, NewMomoTransaction, NewWebhookRecord, Provider, ProviderConfig,
    ProviderConfigRequest, ReconcileOutcome, RepoError, StatusUpdate, WebhookData, WebhookFilter,
    WebhookId, WebhookListQuery, WebhookRecord, WebhookStatusData, WebhookSummary,
};

use crate::providers::ProviderRegistry;

const MAX_LIST_LIMIT: i64 = 200;

/// A provider callback as it arrived over HTTP.
#[derive(Debug, Clone)]
pub struct InboundWebhook {
    /// Provider code from the URL path, unvalidated.
    pub provider: String,
    pub company_id: Option<CompanyId>,
    pub payload: String,
    /// Header names lowercased.
    pub headers: BTreeMap<String, String>,
    pub source_ip: Option<String>,
}

/// Why a stored webhook could not be reconciled.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Signature verification failed: {0}")]
    Unauthorized(&'static str),

    #[error("Processing failed: {0}")]
    Processing(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    fn internal(err: RepoError) -> Self {
        PipelineError::Internal(err.to_string())
    }
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct Reconciled {
    pub webhook_id: WebhookId,
    pub transaction_id: MomoTransactionId,
    pub outcome: ReconcileOutcome,
}

/// Why a manual retry did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("Webhook not found")]
    NotFound,

    #[error("Webhook already processed")]
    AlreadyProcessed,

    #[error("Webhook retry failed: {0}")]
    Failed(PipelineError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for RetryError {
    fn from(err: RepoError) -> Self {
        RetryError::Internal(err.to_string())
    }
}

/// Application service for the reconciliation flow.
///
/// Generic over `R: MomoRepository` - the adapter is injected at compile time.
pub struct WebhookService<R: MomoRepository> {
    repo: R,
    providers: ProviderRegistry,
    default_company: Option<CompanyId>,
}

impl<R: MomoRepository> WebhookService<R> {
    /// Creates a service with every supported provider registered.
    pub fn new(repo: R) -> Self {
        Self::with_registry(repo, ProviderRegistry::default())
    }

    pub fn with_registry(repo: R, providers: ProviderRegistry) -> Self {
        Self {
            repo,
            providers,
            default_company: None,
        }
    }

    /// Tenant used for callbacks that do not name one in the query string.
    pub fn with_default_company(mut self, company_id: Option<CompanyId>) -> Self {
        self.default_company = company_id;
        self
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Inbound pipeline
    // ─────────────────────────────────────────────────────────────────────────────

    /// Records a provider callback, then reconciles it.
    ///
    /// The audit record is written before any validation so that every
    /// callback survives, including ones for unknown providers or with bad
    /// signatures. A failure to write it is reported as `Internal`.
    #[tracing::instrument(skip(self, inbound), fields(provider = %inbound.provider))]
    pub async fn receive(&self, inbound: InboundWebhook) -> Result<Reconciled, PipelineError> {
        let company_id = inbound.company_id.or(self.default_company);
        let record = self
            .repo
            .record_webhook(NewWebhookRecord::new(
                inbound.provider,
                company_id,
                inbound.payload,
                inbound.headers,
                inbound.source_ip,
            ))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to record webhook");
                PipelineError::internal(e)
            })?;

        tracing::debug!(webhook_id = %record.id, "webhook recorded");
        self.reconcile_record(&record).await
    }

    /// Re-runs the pipeline against a stored, not yet processed webhook.
    #[tracing::instrument(skip(self), fields(webhook_id = %id))]
    pub async fn retry(&self, id: WebhookId) -> Result<(WebhookRecord, Reconciled), RetryError> {
        let record = self.repo.get_webhook(id).await?.ok_or(RetryError::NotFound)?;
        if record.is_processed() {
            return Err(RetryError::AlreadyProcessed);
        }

        let record = self.repo.increment_webhook_retry(id).await?;
        tracing::info!(retry_count = record.retry_count, "retrying webhook");

        let reconciled = self
            .reconcile_record(&record)
            .await
            .map_err(RetryError::Failed)?;

        let record = self.repo.get_webhook(id).await?.ok_or(RetryError::NotFound)?;
        Ok((record, reconciled))
    }

    /// Current state of a stored webhook and the transaction it matched.
    #[tracing::instrument(skip(self), fields(webhook_id = %id))]
    pub async fn status(&self, id: WebhookId) -> Result<WebhookStatusData, AppError> {
        let record = self
            .repo
            .get_webhook(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Webhook not found".into()))?;

        let transaction = match record.transaction_id {
            Some(tx_id) => self.repo.get_transaction(tx_id).await?,
            None => None,
        };

        Ok(WebhookStatusData {
            webhook: WebhookSummary::from(&record),
            transaction: transaction.as_ref().map(Into::into),
        })
    }

    /// Runs the pipeline for a stored record and writes the verdict back.
    async fn reconcile_record(&self, record: &WebhookRecord) -> Result<Reconciled, PipelineError> {
        let result = self.run_pipeline(record).await;

        let marked = match &result {
            Ok(reconciled) => {
                self.repo
                    .mark_webhook_processed(record.id, Some(reconciled.transaction_id))
                    .await
            }
            Err(err) => self.repo.mark_webhook_failed(record.id, &err.to_string()).await,
        };

        match (&result, marked) {
            (Ok(reconciled), Ok(())) => {
                tracing::info!(
                    webhook_id = %record.id,
                    transaction_id = %reconciled.transaction_id,
                    outcome = ?reconciled.outcome,
                    "webhook reconciled"
                );
            }
            (Err(err), Ok(())) => {
                tracing::warn!(webhook_id = %record.id, error = %err, "webhook failed");
            }
            (_, Err(e)) => {
                tracing::error!(webhook_id = %record.id, error = %e, "failed to update webhook record");
                return Err(PipelineError::internal(e));
            }
        }

        result
    }

    async fn run_pipeline(&self, record: &WebhookRecord) -> Result<Reconciled, PipelineError> {
        let provider: Provider = record
            .provider
            .parse()
            .map_err(|_| PipelineError::UnknownProvider(record.provider.clone()))?;
        let adapter = self
            .providers
            .get(provider)
            .ok_or_else(|| PipelineError::UnknownProvider(record.provider.clone()))?;

        let company_id = record
            .company_id
            .or(self.default_company)
            .ok_or(PipelineError::Unauthorized("no tenant for webhook"))?;

        let config = self
            .repo
            .get_provider_config(company_id, provider)
            .await
            .map_err(PipelineError::internal)?;
        let secret = config
            .as_ref()
            .and_then(ProviderConfig::active_secret)
            .ok_or(PipelineError::Unauthorized("provider not configured"))?;

        let signature = record
            .signature()
            .ok_or(PipelineError::Unauthorized("missing signature"))?;

        if !adapter.verify_signature(record.payload.as_bytes(), signature, secret) {
            tracing::warn!(provider = %provider, webhook_id = %record.id, "invalid webhook signature");
            return Err(PipelineError::Unauthorized("invalid signature"));
        }

        let data = adapter
            .process_webhook(record.payload.as_bytes())
            .map_err(|e| PipelineError::Processing(e.to_string()))?;

        let transaction = self.match_transaction(company_id, provider, &data).await?;

        let update = StatusUpdate {
            webhook_id: record.id,
            transaction_id: transaction.id,
            provider,
            data,
        };
        let outcome = self
            .repo
            .apply_status_update(update)
            .await
            .map_err(|e| match e {
                RepoError::Domain(err @ DomainError::InvalidTransition { .. }) => {
                    PipelineError::Processing(err.to_string())
                }
                RepoError::Conflict(msg) => PipelineError::Processing(msg),
                RepoError::NotFound => PipelineError::Processing("Transaction not found".into()),
                other => PipelineError::internal(other),
            })?;

        Ok(Reconciled {
            webhook_id: record.id,
            transaction_id: transaction.id,
            outcome,
        })
    }

    /// Provider id first, then the local transaction number.
    async fn match_transaction(
        &self,
        company_id: CompanyId,
        provider: Provider,
        data: &WebhookData,
    ) -> Result<MomoTransaction, PipelineError> {
        if let Some(tx) = self
            .repo
            .find_by_provider_transaction_id(Some(company_id), provider, &data.transaction_id)
            .await
            .map_err(PipelineError::internal)?
        {
            return Ok(tx);
        }

        let number = data.reference.as_deref().unwrap_or(&data.transaction_id);
        let found = self
            .repo
            .find_by_transaction_number(Some(company_id), number)
            .await
            .map_err(PipelineError::internal)?;

        match found {
            Some(tx) if tx.provider == provider => Ok(tx),
            Some(_) | None => Err(PipelineError::Processing("Transaction not found".into())),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Operator operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Lists stored webhooks, newest first.
    pub async fn list_webhooks(&self, query: WebhookListQuery) -> Result<Vec<WebhookRecord>, AppError> {
        let filter = WebhookFilter {
            status: query.status,
            provider: query
                .provider
                .map(|p| p.trim().to_ascii_lowercase())
                .filter(|p| !p.is_empty()),
            company_id: query.company_id,
            limit: query
                .limit
                .unwrap_or(WebhookFilter::default().limit)
                .clamp(1, MAX_LIST_LIMIT),
        };
        self.repo.list_webhooks(filter).await.map_err(Into::into)
    }

    /// Records a transaction that was initiated with a provider.
    #[tracing::instrument(skip(self, req), fields(provider = %req.provider, amount = req.amount))]
    pub async fn create_transaction(
        &self,
        req: CreateTransactionRequest,
    ) -> Result<MomoTransaction, AppError> {
        if req.amount <= 0 {
            return Err(AppError::BadRequest("Amount must be positive".into()));
        }
        let amount =
            Money::new(req.amount, req.currency).map_err(|e| AppError::BadRequest(e.to_string()))?;

        let transaction_number = req
            .transaction_number
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(generate_transaction_number);

        let tx = self
            .repo
            .create_transaction(NewMomoTransaction {
                company_id: req.company_id,
                provider: req.provider,
                amount,
                phone_number: req.phone_number,
                transaction_number,
                provider_transaction_id: req.provider_transaction_id,
            })
            .await?;

        tracing::info!(transaction_id = %tx.id, number = %tx.transaction_number, "transaction recorded");
        Ok(tx)
    }

    /// Gets a transaction by ID.
    pub async fn get_transaction(&self, id: MomoTransactionId) -> Result<MomoTransaction, AppError> {
        self.repo
            .get_transaction(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| AppError::NotFound(format!("Transaction {}", id))))
    }

    /// Stores the tenant's webhook secret for a provider.
    #[tracing::instrument(skip(self, req), fields(company_id = %req.company_id))]
    pub async fn upsert_provider_config(
        &self,
        provider_code: &str,
        req: ProviderConfigRequest,
    ) -> Result<ProviderConfig, AppError> {
        let provider: Provider = provider_code
            .parse()
            .map_err(|_| AppError::NotFound(format!("Unknown provider: {}", provider_code)))?;
        if req.webhook_secret.trim().is_empty() {
            return Err(AppError::BadRequest("Webhook secret cannot be empty".into()));
        }

        let mut config = ProviderConfig::new(req.company_id, provider, req.webhook_secret);
        config.is_active = req.is_active;

        self.repo.upsert_provider_config(config).await.map_err(Into::into)
    }
}
