//! WebhookService unit tests.

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use momo_repo::security::{sign_payload, sign_payload_base64};
    use momo_types::{
        ApiKey, ApiKeyId, AppError, CompanyId, CreateTransactionRequest, Currency, MomoRepository,
        MomoTransaction, MomoTransactionId, Money, NewMomoTransaction, NewWebhookRecord,
        Notification, NotificationId, NotificationStatus, Provider, ProviderConfig,
        ProviderConfigRequest, ReconcileOutcome, RepoError, StatusUpdate, TransactionStatus,
        Transition, WebhookFilter, WebhookId, WebhookListQuery, WebhookRecord, WebhookStatus,
    };

    use crate::{InboundWebhook, PipelineError, RetryError, WebhookService};

    const SECRET: &str = "test-secret";

    /// Simple in-memory repository for testing the service layer.
    #[derive(Default)]
    pub struct MockRepo {
        webhooks: Mutex<HashMap<WebhookId, WebhookRecord>>,
        transactions: Mutex<HashMap<MomoTransactionId, MomoTransaction>>,
        configs: Mutex<HashMap<(CompanyId, Provider), ProviderConfig>>,
        ledger: Mutex<HashSet<String>>,
        notifications: Mutex<Vec<Notification>>,
        fail_record: bool,
    }

    impl MockRepo {
        pub fn new() -> Self {
            Self::default()
        }

        fn failing_record() -> Self {
            Self {
                fail_record: true,
                ..Self::default()
            }
        }

        fn notification_count(&self) -> usize {
            self.notifications.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MomoRepository for MockRepo {
        async fn record_webhook(&self, new: NewWebhookRecord) -> Result<WebhookRecord, RepoError> {
            if self.fail_record {
                return Err(RepoError::Database("disk full".into()));
            }
            let record = new.into_record();
            self.webhooks
                .lock()
                .unwrap()
                .insert(record.id, record.clone());
            Ok(record)
        }

        async fn get_webhook(&self, id: WebhookId) -> Result<Option<WebhookRecord>, RepoError> {
            Ok(self.webhooks.lock().unwrap().get(&id).cloned())
        }

        async fn list_webhooks(
            &self,
            filter: WebhookFilter,
        ) -> Result<Vec<WebhookRecord>, RepoError> {
            let mut records: Vec<_> = self
                .webhooks
                .lock()
                .unwrap()
                .values()
                .filter(|r| filter.status.is_none_or(|s| r.status == s))
                .filter(|r| filter.provider.as_ref().is_none_or(|p| &r.provider == p))
                .filter(|r| filter.company_id.is_none_or(|c| r.company_id == Some(c)))
                .cloned()
                .collect();
            records.sort_by(|a, b| b.received_at.cmp(&a.received_at));
            records.truncate(filter.limit as usize);
            Ok(records)
        }

        async fn mark_webhook_processed(
            &self,
            id: WebhookId,
            transaction_id: Option<MomoTransactionId>,
        ) -> Result<(), RepoError> {
            let mut webhooks = self.webhooks.lock().unwrap();
            let record = webhooks.get_mut(&id).ok_or(RepoError::NotFound)?;
            record.status = WebhookStatus::Processed;
            record.error_message = None;
            record.processed_at = Some(Utc::now());
            record.transaction_id = transaction_id;
            Ok(())
        }

        async fn mark_webhook_failed(&self, id: WebhookId, error: &str) -> Result<(), RepoError> {
            let mut webhooks = self.webhooks.lock().unwrap();
            let record = webhooks.get_mut(&id).ok_or(RepoError::NotFound)?;
            record.status = WebhookStatus::Failed;
            record.error_message = Some(error.to_string());
            Ok(())
        }

        async fn increment_webhook_retry(&self, id: WebhookId) -> Result<WebhookRecord, RepoError> {
            let mut webhooks = self.webhooks.lock().unwrap();
            let record = webhooks.get_mut(&id).ok_or(RepoError::NotFound)?;
            record.retry_count += 1;
            Ok(record.clone())
        }

        async fn create_transaction(
            &self,
            new: NewMomoTransaction,
        ) -> Result<MomoTransaction, RepoError> {
            let tx = MomoTransaction::initiate(new)?;
            let mut transactions = self.transactions.lock().unwrap();
            if transactions.values().any(|t| {
                t.company_id == tx.company_id && t.transaction_number == tx.transaction_number
            }) {
                return Err(RepoError::Conflict("duplicate transaction number".into()));
            }
            transactions.insert(tx.id, tx.clone());
            Ok(tx)
        }

        async fn get_transaction(
            &self,
            id: MomoTransactionId,
        ) -> Result<Option<MomoTransaction>, RepoError> {
            Ok(self.transactions.lock().unwrap().get(&id).cloned())
        }

        async fn find_by_provider_transaction_id(
            &self,
            company_id: Option<CompanyId>,
            provider: Provider,
            provider_transaction_id: &str,
        ) -> Result<Option<MomoTransaction>, RepoError> {
            Ok(self
                .transactions
                .lock()
                .unwrap()
                .values()
                .find(|t| {
                    company_id.is_none_or(|c| t.company_id == c)
                        && t.provider == provider
                        && t.provider_transaction_id.as_deref() == Some(provider_transaction_id)
                })
                .cloned())
        }

        async fn find_by_transaction_number(
            &self,
            company_id: Option<CompanyId>,
            transaction_number: &str,
        ) -> Result<Option<MomoTransaction>, RepoError> {
            Ok(self
                .transactions
                .lock()
                .unwrap()
                .values()
                .find(|t| {
                    company_id.is_none_or(|c| t.company_id == c)
                        && t.transaction_number == transaction_number
                })
                .cloned())
        }

        async fn apply_status_update(
            &self,
            update: StatusUpdate,
        ) -> Result<ReconcileOutcome, RepoError> {
            let key = update.idempotency_key();
            let mut ledger = self.ledger.lock().unwrap();
            if ledger.contains(&key) {
                return Ok(ReconcileOutcome::Duplicate);
            }

            let mut transactions = self.transactions.lock().unwrap();
            let tx = transactions
                .get_mut(&update.transaction_id)
                .ok_or(RepoError::NotFound)?;
            let from = tx.status;
            let mut next = tx.clone();
            if next.apply_update(&update, Utc::now())? == Transition::Unchanged {
                return Ok(ReconcileOutcome::Unchanged { status: from });
            }

            ledger.insert(key);
            self.notifications
                .lock()
                .unwrap()
                .push(Notification::status_changed(&next, from, update.webhook_id));
            let to = next.status;
            *tx = next;
            Ok(ReconcileOutcome::Applied { from, to })
        }

        async fn get_provider_config(
            &self,
            company_id: CompanyId,
            provider: Provider,
        ) -> Result<Option<ProviderConfig>, RepoError> {
            Ok(self
                .configs
                .lock()
                .unwrap()
                .get(&(company_id, provider))
                .cloned())
        }

        async fn upsert_provider_config(
            &self,
            config: ProviderConfig,
        ) -> Result<ProviderConfig, RepoError> {
            self.configs
                .lock()
                .unwrap()
                .insert((config.company_id, config.provider), config.clone());
            Ok(config)
        }

        async fn get_pending_notifications(
            &self,
            limit: i64,
        ) -> Result<Vec<Notification>, RepoError> {
            Ok(self
                .notifications
                .lock()
                .unwrap()
                .iter()
                .filter(|n| n.status == NotificationStatus::Pending)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn update_notification_status(
            &self,
            id: NotificationId,
            status: NotificationStatus,
            last_error: Option<String>,
        ) -> Result<(), RepoError> {
            let mut notifications = self.notifications.lock().unwrap();
            let n = notifications
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or(RepoError::NotFound)?;
            n.status = status;
            n.last_error = last_error;
            n.attempts += 1;
            Ok(())
        }

        async fn verify_api_key_hash(&self, _key_hash: &str) -> Result<Option<ApiKey>, RepoError> {
            Ok(None)
        }

        async fn create_api_key(&self, name: &str) -> Result<(ApiKey, String), RepoError> {
            Ok((
                ApiKey::new(name.to_string(), "hash".into(), None),
                "sk_test".into(),
            ))
        }

        async fn count_api_keys(&self) -> Result<i64, RepoError> {
            Ok(0)
        }

        async fn list_api_keys(&self) -> Result<Vec<ApiKey>, RepoError> {
            Ok(vec![])
        }

        async fn delete_api_key(&self, _id: ApiKeyId) -> Result<bool, RepoError> {
            Ok(false)
        }
    }

    struct Fixture {
        service: WebhookService<MockRepo>,
        company: CompanyId,
    }

    async fn setup(provider: Provider) -> Fixture {
        let company = CompanyId::new();
        let service = WebhookService::new(MockRepo::new());
        service
            .upsert_provider_config(
                provider.code(),
                ProviderConfigRequest {
                    company_id: company,
                    webhook_secret: SECRET.into(),
                    is_active: true,
                },
            )
            .await
            .unwrap();
        Fixture { service, company }
    }

    async fn create_tx(fx: &Fixture, provider: Provider, number: &str) -> MomoTransaction {
        fx.service
            .create_transaction(CreateTransactionRequest {
                company_id: fx.company,
                provider,
                amount: 2500,
                currency: Currency::ZMW,
                phone_number: Some("260971234567".into()),
                transaction_number: Some(number.into()),
                provider_transaction_id: None,
            })
            .await
            .unwrap()
    }

    fn signed(provider: &str, company: Option<CompanyId>, payload: &str) -> InboundWebhook {
        let mut headers = BTreeMap::new();
        headers.insert(
            "x-signature".to_string(),
            sign_payload(payload.as_bytes(), SECRET),
        );
        InboundWebhook {
            provider: provider.into(),
            company_id: company,
            payload: payload.into(),
            headers,
            source_ip: Some("10.0.0.1".into()),
        }
    }

    fn only_webhook(repo: &MockRepo) -> WebhookRecord {
        let webhooks = repo.webhooks.lock().unwrap();
        assert_eq!(webhooks.len(), 1);
        webhooks.values().next().unwrap().clone()
    }

    #[tokio::test]
    async fn test_receive_applies_status() {
        let fx = setup(Provider::Mtn).await;
        let tx = create_tx(&fx, Provider::Mtn, "MOMO-1").await;

        let payload = r#"{"externalId":"MOMO-1","financialTransactionId":"FIN-1","status":"SUCCESSFUL"}"#;
        let reconciled = fx
            .service
            .receive(signed("mtn", Some(fx.company), payload))
            .await
            .unwrap();

        assert_eq!(reconciled.transaction_id, tx.id);
        assert_eq!(
            reconciled.outcome,
            ReconcileOutcome::Applied {
                from: TransactionStatus::Pending,
                to: TransactionStatus::Successful
            }
        );

        let stored = fx.service.get_transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Successful);
        assert_eq!(stored.provider_transaction_id.as_deref(), Some("FIN-1"));
        assert!(stored.completed_at.is_some());

        let record = only_webhook(fx.service.repo());
        assert_eq!(record.status, WebhookStatus::Processed);
        assert_eq!(record.transaction_id, Some(tx.id));
        assert_eq!(record.company_id, Some(fx.company));
        assert_eq!(record.source_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(fx.service.repo().notification_count(), 1);
    }

    #[tokio::test]
    async fn test_second_lookup_uses_provider_id() {
        let fx = setup(Provider::Mtn).await;
        let tx = create_tx(&fx, Provider::Mtn, "MOMO-1").await;

        let first = r#"{"externalId":"MOMO-1","financialTransactionId":"FIN-1","status":"ONGOING"}"#;
        fx.service
            .receive(signed("mtn", Some(fx.company), first))
            .await
            .unwrap();

        // No local reference this time: only the backfilled provider id matches.
        let second = r#"{"financialTransactionId":"FIN-1","status":"SUCCESSFUL"}"#;
        let reconciled = fx
            .service
            .receive(signed("mtn", Some(fx.company), second))
            .await
            .unwrap();

        assert_eq!(reconciled.transaction_id, tx.id);
        assert_eq!(
            reconciled.outcome,
            ReconcileOutcome::Applied {
                from: TransactionStatus::Processing,
                to: TransactionStatus::Successful
            }
        );
    }

    #[tokio::test]
    async fn test_replay_is_duplicate() {
        let fx = setup(Provider::Mtn).await;
        create_tx(&fx, Provider::Mtn, "MOMO-1").await;

        let payload = r#"{"externalId":"MOMO-1","status":"SUCCESSFUL","eventId":"evt-1"}"#;
        fx.service
            .receive(signed("mtn", Some(fx.company), payload))
            .await
            .unwrap();
        let replay = fx
            .service
            .receive(signed("mtn", Some(fx.company), payload))
            .await
            .unwrap();

        assert_eq!(replay.outcome, ReconcileOutcome::Duplicate);
        assert_eq!(fx.service.repo().notification_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_recorded() {
        let fx = setup(Provider::Mtn).await;

        let err = fx
            .service
            .receive(signed("mpesa", Some(fx.company), "{}"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::UnknownProvider(code) if code == "mpesa"));
        let record = only_webhook(fx.service.repo());
        assert_eq!(record.status, WebhookStatus::Failed);
        assert_eq!(record.provider, "mpesa");
    }

    #[tokio::test]
    async fn test_bad_signature_fails_closed() {
        let fx = setup(Provider::Mtn).await;
        create_tx(&fx, Provider::Mtn, "MOMO-1").await;

        let mut inbound = signed(
            "mtn",
            Some(fx.company),
            r#"{"externalId":"MOMO-1","status":"SUCCESSFUL"}"#,
        );
        inbound.payload = r#"{"externalId":"MOMO-1","status":"FAILED"}"#.into();

        let err = fx.service.receive(inbound).await.unwrap_err();
        assert!(matches!(err, PipelineError::Unauthorized(_)));

        let record = only_webhook(fx.service.repo());
        assert_eq!(record.status, WebhookStatus::Failed);
        assert_eq!(fx.service.repo().notification_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_signature_header() {
        let fx = setup(Provider::Mtn).await;
        let mut inbound = signed("mtn", Some(fx.company), r#"{"status":"SUCCESSFUL"}"#);
        inbound.headers.clear();

        let err = fx.service.receive(inbound).await.unwrap_err();
        assert!(matches!(err, PipelineError::Unauthorized("missing signature")));
    }

    #[tokio::test]
    async fn test_unconfigured_or_unknown_tenant_fails_closed() {
        let fx = setup(Provider::Mtn).await;
        let payload = r#"{"externalId":"MOMO-1","status":"SUCCESSFUL"}"#;

        let err = fx
            .service
            .receive(signed("airtel", Some(fx.company), payload))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Unauthorized("provider not configured")));

        let err = fx
            .service
            .receive(signed("mtn", None, payload))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Unauthorized("no tenant for webhook")));
    }

    #[tokio::test]
    async fn test_inactive_config_fails_closed() {
        let fx = setup(Provider::Mtn).await;
        fx.service
            .upsert_provider_config(
                "mtn",
                ProviderConfigRequest {
                    company_id: fx.company,
                    webhook_secret: SECRET.into(),
                    is_active: false,
                },
            )
            .await
            .unwrap();

        let err = fx
            .service
            .receive(signed("mtn", Some(fx.company), r#"{"externalId":"X","status":"SUCCESSFUL"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_default_company_is_used() {
        let company = CompanyId::new();
        let fx = Fixture {
            service: WebhookService::new(MockRepo::new()).with_default_company(Some(company)),
            company,
        };
        fx.service
            .upsert_provider_config(
                "mtn",
                ProviderConfigRequest {
                    company_id: company,
                    webhook_secret: SECRET.into(),
                    is_active: true,
                },
            )
            .await
            .unwrap();
        let tx = create_tx(&fx, Provider::Mtn, "MOMO-1").await;

        let reconciled = fx
            .service
            .receive(signed(
                "mtn",
                None,
                r#"{"externalId":"MOMO-1","status":"SUCCESSFUL"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(reconciled.transaction_id, tx.id);
    }

    #[tokio::test]
    async fn test_unmatched_transaction() {
        let fx = setup(Provider::Mtn).await;

        let err = fx
            .service
            .receive(signed(
                "mtn",
                Some(fx.company),
                r#"{"externalId":"MOMO-404","status":"SUCCESSFUL"}"#,
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Processing(msg) if msg == "Transaction not found"));
        let record = only_webhook(fx.service.repo());
        assert_eq!(
            record.error_message.as_deref(),
            Some("Processing failed: Transaction not found")
        );
    }

    #[tokio::test]
    async fn test_other_providers_transaction_is_not_matched() {
        let fx = setup(Provider::Mtn).await;
        create_tx(&fx, Provider::Airtel, "MOMO-1").await;

        let err = fx
            .service
            .receive(signed(
                "mtn",
                Some(fx.company),
                r#"{"externalId":"MOMO-1","status":"SUCCESSFUL"}"#,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Processing(_)));
    }

    #[tokio::test]
    async fn test_terminal_status_is_final() {
        let fx = setup(Provider::Mtn).await;
        create_tx(&fx, Provider::Mtn, "MOMO-1").await;

        fx.service
            .receive(signed(
                "mtn",
                Some(fx.company),
                r#"{"externalId":"MOMO-1","status":"SUCCESSFUL"}"#,
            ))
            .await
            .unwrap();
        let err = fx
            .service
            .receive(signed(
                "mtn",
                Some(fx.company),
                r#"{"externalId":"MOMO-1","status":"FAILED"}"#,
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Processing(_)));
        assert_eq!(fx.service.repo().notification_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let fx = setup(Provider::Mtn).await;
        let err = fx
            .service
            .receive(signed("mtn", Some(fx.company), "not json"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Processing(_)));
    }

    #[tokio::test]
    async fn test_recording_failure_is_internal() {
        let service = WebhookService::new(MockRepo::failing_record());
        let err = service
            .receive(signed("mtn", Some(CompanyId::new()), "{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Internal(_)));
    }

    #[tokio::test]
    async fn test_airtel_base64_signature() {
        let fx = setup(Provider::Airtel).await;
        let tx = create_tx(&fx, Provider::Airtel, "MOMO-7").await;

        let payload = r#"{"transaction":{"id":"MOMO-7","status_code":"TF","message":"Insufficient funds","airtel_money_id":"AM-1"}}"#;
        let mut inbound = signed("airtel", Some(fx.company), payload);
        inbound.headers.clear();
        inbound.headers.insert(
            "signature".into(),
            sign_payload_base64(payload.as_bytes(), SECRET),
        );

        fx.service.receive(inbound).await.unwrap();

        let stored = fx.service.get_transaction(tx.id).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some("Insufficient funds"));
        assert_eq!(stored.provider_transaction_id.as_deref(), Some("AM-1"));
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Retry / status
    // ─────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_retry_after_transaction_appears() {
        let fx = setup(Provider::Mtn).await;
        let payload = r#"{"externalId":"MOMO-LATE","status":"SUCCESSFUL"}"#;

        fx.service
            .receive(signed("mtn", Some(fx.company), payload))
            .await
            .unwrap_err();
        let webhook_id = only_webhook(fx.service.repo()).id;

        let tx = create_tx(&fx, Provider::Mtn, "MOMO-LATE").await;
        let (record, reconciled) = fx.service.retry(webhook_id).await.unwrap();

        assert_eq!(record.status, WebhookStatus::Processed);
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.error_message, None);
        assert_eq!(reconciled.transaction_id, tx.id);
        assert!(reconciled.outcome.is_applied());
    }

    #[tokio::test]
    async fn test_retry_rejects_processed() {
        let fx = setup(Provider::Mtn).await;
        create_tx(&fx, Provider::Mtn, "MOMO-1").await;
        let reconciled = fx
            .service
            .receive(signed(
                "mtn",
                Some(fx.company),
                r#"{"externalId":"MOMO-1","status":"SUCCESSFUL"}"#,
            ))
            .await
            .unwrap();

        let err = fx.service.retry(reconciled.webhook_id).await.unwrap_err();
        assert!(matches!(err, RetryError::AlreadyProcessed));
        assert_eq!(only_webhook(fx.service.repo()).retry_count, 0);
    }

    #[tokio::test]
    async fn test_retry_failure_counts_attempt() {
        let fx = setup(Provider::Mtn).await;
        fx.service
            .receive(signed(
                "mtn",
                Some(fx.company),
                r#"{"externalId":"MOMO-404","status":"SUCCESSFUL"}"#,
            ))
            .await
            .unwrap_err();
        let webhook_id = only_webhook(fx.service.repo()).id;

        let err = fx.service.retry(webhook_id).await.unwrap_err();
        assert!(matches!(err, RetryError::Failed(PipelineError::Processing(_))));

        let record = only_webhook(fx.service.repo());
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.status, WebhookStatus::Failed);
    }

    #[tokio::test]
    async fn test_retry_unknown_webhook() {
        let fx = setup(Provider::Mtn).await;
        let err = fx.service.retry(WebhookId::new()).await.unwrap_err();
        assert!(matches!(err, RetryError::NotFound));
    }

    #[tokio::test]
    async fn test_status_includes_transaction() {
        let fx = setup(Provider::Mtn).await;
        let tx = create_tx(&fx, Provider::Mtn, "MOMO-1").await;
        let reconciled = fx
            .service
            .receive(signed(
                "mtn",
                Some(fx.company),
                r#"{"externalId":"MOMO-1","status":"SUCCESSFUL"}"#,
            ))
            .await
            .unwrap();

        let status = fx.service.status(reconciled.webhook_id).await.unwrap();
        assert_eq!(status.webhook.status, WebhookStatus::Processed);
        let transaction = status.transaction.unwrap();
        assert_eq!(transaction.id, tx.id);
        assert_eq!(transaction.status, TransactionStatus::Successful);

        let missing = fx.service.status(WebhookId::new()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Operator operations
    // ─────────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_transaction_generates_number() {
        let fx = setup(Provider::Mtn).await;
        let tx = fx
            .service
            .create_transaction(CreateTransactionRequest {
                company_id: fx.company,
                provider: Provider::Zamtel,
                amount: 100,
                currency: Currency::ZMW,
                phone_number: None,
                transaction_number: Some("  ".into()),
                provider_transaction_id: None,
            })
            .await
            .unwrap();

        assert!(tx.transaction_number.starts_with("MOMO-"));
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.amount, Money::new(100, Currency::ZMW).unwrap());
    }

    #[tokio::test]
    async fn test_create_transaction_validation() {
        let fx = setup(Provider::Mtn).await;
        let result = fx
            .service
            .create_transaction(CreateTransactionRequest {
                company_id: fx.company,
                provider: Provider::Mtn,
                amount: 0,
                currency: Currency::ZMW,
                phone_number: None,
                transaction_number: None,
                provider_transaction_id: None,
            })
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        create_tx(&fx, Provider::Mtn, "MOMO-1").await;
        let duplicate = fx
            .service
            .create_transaction(CreateTransactionRequest {
                company_id: fx.company,
                provider: Provider::Mtn,
                amount: 10,
                currency: Currency::ZMW,
                phone_number: None,
                transaction_number: Some("MOMO-1".into()),
                provider_transaction_id: None,
            })
            .await;
        assert!(matches!(duplicate, Err(AppError::Unprocessable(_))));
    }

    #[tokio::test]
    async fn test_upsert_provider_config_validation() {
        let fx = setup(Provider::Mtn).await;
        let req = |secret: &str| ProviderConfigRequest {
            company_id: fx.company,
            webhook_secret: secret.into(),
            is_active: true,
        };

        assert!(matches!(
            fx.service.upsert_provider_config("mpesa", req("s")).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.upsert_provider_config("AIRTEL", req(" ")).await,
            Err(AppError::BadRequest(_))
        ));
        let config = fx
            .service
            .upsert_provider_config("AIRTEL", req("s"))
            .await
            .unwrap();
        assert_eq!(config.provider, Provider::Airtel);
    }

    #[tokio::test]
    async fn test_list_webhooks_filters() {
        let fx = setup(Provider::Mtn).await;
        for provider in ["mtn", "MTN", "airtel"] {
            let _ = fx
                .service
                .receive(signed(provider, Some(fx.company), "{}"))
                .await;
        }

        let all = fx
            .service
            .list_webhooks(WebhookListQuery::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let airtel = fx
            .service
            .list_webhooks(WebhookListQuery {
                provider: Some("Airtel".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(airtel.len(), 1);

        let limited = fx
            .service
            .list_webhooks(WebhookListQuery {
                status: Some(WebhookStatus::Failed),
                limit: Some(0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }
}
