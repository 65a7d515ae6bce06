//! SQLite repository integration tests.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use momo_types::{
        ApiKeyId, CompanyId, Currency, DomainError, MomoRepository, MomoTransaction, Money,
        NewMomoTransaction, NewWebhookRecord, Provider, ProviderConfig, ReconcileOutcome,
        RepoError, StatusUpdate, TransactionStatus, WebhookData, WebhookFilter, WebhookRecord,
        WebhookStatus,
    };

    use crate::SqliteRepo;

    async fn setup_repo() -> SqliteRepo {
        SqliteRepo::new("sqlite::memory:").await.unwrap()
    }

    async fn create_tx(
        repo: &SqliteRepo,
        company_id: CompanyId,
        number: &str,
        provider_id: Option<&str>,
    ) -> MomoTransaction {
        repo.create_transaction(NewMomoTransaction {
            company_id,
            provider: Provider::Mtn,
            amount: Money::new(2500, Currency::ZMW).unwrap(),
            phone_number: Some("260971234567".into()),
            transaction_number: number.into(),
            provider_transaction_id: provider_id.map(str::to_owned),
        })
        .await
        .unwrap()
    }

    async fn record(repo: &SqliteRepo, company_id: Option<CompanyId>) -> WebhookRecord {
        let mut headers = BTreeMap::new();
        headers.insert("x-signature".to_string(), "abc".to_string());
        repo.record_webhook(NewWebhookRecord::new(
            "mtn",
            company_id,
            r#"{"externalId":"MOMO-1","status":"SUCCESSFUL"}"#.into(),
            headers,
            Some("10.0.0.1".into()),
        ))
        .await
        .unwrap()
    }

    fn update(
        webhook: &WebhookRecord,
        tx: &MomoTransaction,
        status: TransactionStatus,
    ) -> StatusUpdate {
        StatusUpdate {
            webhook_id: webhook.id,
            transaction_id: tx.id,
            provider: Provider::Mtn,
            data: WebhookData {
                transaction_id: "MTN-REF-1".into(),
                reference: Some(tx.transaction_number.clone()),
                status,
                provider_status: status.as_str().to_uppercase(),
                event_id: None,
                amount: Some("25.00".into()),
                currency: Some("ZMW".into()),
                reason: None,
                financial_transaction_id: Some("FIN-1".into()),
            },
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Webhook audit log
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_record_and_get_webhook() {
        let repo = setup_repo().await;
        let company = CompanyId::new();

        let stored = record(&repo, Some(company)).await;
        let fetched = repo.get_webhook(stored.id).await.unwrap().unwrap();

        assert_eq!(fetched.status, WebhookStatus::Pending);
        assert_eq!(fetched.company_id, Some(company));
        assert_eq!(fetched.payload, stored.payload);
        assert_eq!(fetched.signature(), Some("abc"));
        assert_eq!(fetched.source_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(fetched.retry_count, 0);
    }

    #[tokio::test]
    async fn test_mark_webhook_outcomes() {
        let repo = setup_repo().await;
        let company = CompanyId::new();
        let tx = create_tx(&repo, company, "MOMO-1", None).await;
        let webhook = record(&repo, Some(company)).await;

        repo.mark_webhook_failed(webhook.id, "Signature verification failed")
            .await
            .unwrap();
        let failed = repo.get_webhook(webhook.id).await.unwrap().unwrap();
        assert_eq!(failed.status, WebhookStatus::Failed);
        assert_eq!(
            failed.error_message.as_deref(),
            Some("Signature verification failed")
        );
        assert!(failed.processed_at.is_none());

        repo.mark_webhook_processed(webhook.id, Some(tx.id))
            .await
            .unwrap();
        let processed = repo.get_webhook(webhook.id).await.unwrap().unwrap();
        assert!(processed.is_processed());
        assert!(processed.error_message.is_none());
        assert!(processed.processed_at.is_some());
        assert_eq!(processed.transaction_id, Some(tx.id));
    }

    #[tokio::test]
    async fn test_mark_unknown_webhook_is_not_found() {
        let repo = setup_repo().await;

        let result = repo
            .mark_webhook_failed(momo_types::WebhookId::new(), "nope")
            .await;

        assert!(matches!(result, Err(RepoError::NotFound)));
    }

    #[tokio::test]
    async fn test_increment_retry() {
        let repo = setup_repo().await;
        let webhook = record(&repo, None).await;

        repo.increment_webhook_retry(webhook.id).await.unwrap();
        let updated = repo.increment_webhook_retry(webhook.id).await.unwrap();

        assert_eq!(updated.retry_count, 2);
    }

    #[tokio::test]
    async fn test_list_webhooks_filters() {
        let repo = setup_repo().await;
        let company = CompanyId::new();
        let first = record(&repo, Some(company)).await;
        let _second = record(&repo, Some(company)).await;
        let _other = record(&repo, None).await;
        repo.mark_webhook_failed(first.id, "boom").await.unwrap();

        let all = repo.list_webhooks(WebhookFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let failed = repo
            .list_webhooks(WebhookFilter {
                status: Some(WebhookStatus::Failed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, first.id);

        let tenant = repo
            .list_webhooks(WebhookFilter {
                company_id: Some(company),
                provider: Some("mtn".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(tenant.len(), 2);

        let limited = repo
            .list_webhooks(WebhookFilter {
                limit: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transactions and matching
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_find_transactions_scoped_by_tenant() {
        let repo = setup_repo().await;
        let company = CompanyId::new();
        let tx = create_tx(&repo, company, "MOMO-1", Some("MTN-REF-1")).await;

        let by_provider = repo
            .find_by_provider_transaction_id(Some(company), Provider::Mtn, "MTN-REF-1")
            .await
            .unwrap();
        assert_eq!(by_provider.map(|t| t.id), Some(tx.id));

        let wrong_provider = repo
            .find_by_provider_transaction_id(Some(company), Provider::Airtel, "MTN-REF-1")
            .await
            .unwrap();
        assert!(wrong_provider.is_none());

        let other_tenant = repo
            .find_by_transaction_number(Some(CompanyId::new()), "MOMO-1")
            .await
            .unwrap();
        assert!(other_tenant.is_none());

        let any_tenant = repo
            .find_by_transaction_number(None, "MOMO-1")
            .await
            .unwrap();
        assert_eq!(any_tenant.map(|t| t.id), Some(tx.id));
    }

    #[tokio::test]
    async fn test_duplicate_transaction_number_conflicts() {
        let repo = setup_repo().await;
        let company = CompanyId::new();
        create_tx(&repo, company, "MOMO-1", None).await;

        let result = repo
            .create_transaction(NewMomoTransaction {
                company_id: company,
                provider: Provider::Mtn,
                amount: Money::new(100, Currency::ZMW).unwrap(),
                phone_number: None,
                transaction_number: "MOMO-1".into(),
                provider_transaction_id: None,
            })
            .await;

        assert!(matches!(result, Err(RepoError::Conflict(_))));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_apply_status_update_writes_everything() {
        let repo = setup_repo().await;
        let tx = create_tx(&repo, CompanyId::new(), "MOMO-1", None).await;
        let webhook = record(&repo, None).await;

        let outcome = repo
            .apply_status_update(update(&webhook, &tx, TransactionStatus::Successful))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Applied {
                from: TransactionStatus::Pending,
                to: TransactionStatus::Successful,
            }
        );

        let stored = repo.get_transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Successful);
        assert_eq!(stored.version, 1);
        assert_eq!(stored.provider_transaction_id.as_deref(), Some("MTN-REF-1"));
        assert_eq!(stored.metadata["financial_transaction_id"], "FIN-1");
        assert!(stored.completed_at.is_some());

        let outbox = repo.get_pending_notifications(10).await.unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].transaction_id, tx.id);
    }

    #[tokio::test]
    async fn test_replayed_update_has_no_effect() {
        let repo = setup_repo().await;
        let tx = create_tx(&repo, CompanyId::new(), "MOMO-1", None).await;
        let webhook = record(&repo, None).await;
        let upd = update(&webhook, &tx, TransactionStatus::Successful);

        repo.apply_status_update(upd.clone()).await.unwrap();
        let replay = repo.apply_status_update(upd).await.unwrap();

        assert_eq!(replay, ReconcileOutcome::Duplicate);
        let stored = repo.get_transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(repo.get_pending_notifications(10).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_deliveries_apply_once() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("momo.db").display());
        let repo = SqliteRepo::new(&url).await.unwrap();
        let tx = create_tx(&repo, CompanyId::new(), "MOMO-1", Some("TXN123")).await;
        let webhook = record(&repo, None).await;
        let upd = update(&webhook, &tx, TransactionStatus::Successful);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                let upd = upd.clone();
                tokio::spawn(async move { repo.apply_status_update(upd).await })
            })
            .collect();

        let mut applied = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(ReconcileOutcome::Applied { .. }) => applied += 1,
                Ok(ReconcileOutcome::Duplicate) => duplicates += 1,
                other => panic!("unexpected result: {:?}", other),
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(duplicates, 7);
        let stored = repo.get_transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Successful);
        assert_eq!(stored.version, 1);
        assert_eq!(repo.get_pending_notifications(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_new_event_in_same_status_is_unchanged() {
        let repo = setup_repo().await;
        let tx = create_tx(&repo, CompanyId::new(), "MOMO-1", None).await;
        let webhook = record(&repo, None).await;
        let mut upd = update(&webhook, &tx, TransactionStatus::Successful);
        repo.apply_status_update(upd.clone()).await.unwrap();

        upd.data.event_id = Some("evt-2".into());
        let outcome = repo.apply_status_update(upd).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Unchanged {
                status: TransactionStatus::Successful
            }
        );
        assert_eq!(repo.get_pending_notifications(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_status_is_final() {
        let repo = setup_repo().await;
        let tx = create_tx(&repo, CompanyId::new(), "MOMO-1", None).await;
        let webhook = record(&repo, None).await;
        repo.apply_status_update(update(&webhook, &tx, TransactionStatus::Failed))
            .await
            .unwrap();

        let result = repo
            .apply_status_update(update(&webhook, &tx, TransactionStatus::Successful))
            .await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::InvalidTransition { .. }))
        ));
        let stored = repo.get_transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn test_intermediate_then_terminal() {
        let repo = setup_repo().await;
        let tx = create_tx(&repo, CompanyId::new(), "MOMO-1", None).await;
        let webhook = record(&repo, None).await;

        repo.apply_status_update(update(&webhook, &tx, TransactionStatus::Processing))
            .await
            .unwrap();
        let outcome = repo
            .apply_status_update(update(&webhook, &tx, TransactionStatus::Successful))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Applied {
                from: TransactionStatus::Processing,
                to: TransactionStatus::Successful,
            }
        );
        assert_eq!(repo.get_pending_notifications(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_apply_to_missing_transaction() {
        let repo = setup_repo().await;
        let tx = create_tx(&repo, CompanyId::new(), "MOMO-1", None).await;
        let webhook = record(&repo, None).await;
        let mut upd = update(&webhook, &tx, TransactionStatus::Successful);
        upd.transaction_id = momo_types::MomoTransactionId::new();

        let result = repo.apply_status_update(upd).await;

        assert!(matches!(result, Err(RepoError::NotFound)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Provider configuration
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_upsert_provider_config() {
        let repo = setup_repo().await;
        let company = CompanyId::new();

        repo.upsert_provider_config(ProviderConfig::new(company, Provider::Airtel, "one".into()))
            .await
            .unwrap();
        let mut replacement = ProviderConfig::new(company, Provider::Airtel, "two".into());
        replacement.is_active = false;
        repo.upsert_provider_config(replacement).await.unwrap();

        let stored = repo
            .get_provider_config(company, Provider::Airtel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.webhook_secret, "two");
        assert!(!stored.is_active);

        let missing = repo
            .get_provider_config(company, Provider::Mtn)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API keys
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_api_key_lifecycle() {
        let repo = setup_repo().await;
        assert_eq!(repo.count_api_keys().await.unwrap(), 0);

        let (key, raw) = repo.create_api_key("ops").await.unwrap();
        assert_eq!(repo.count_api_keys().await.unwrap(), 1);

        let hash = crate::security::hash_api_key(&raw);
        let verified = repo.verify_api_key_hash(&hash).await.unwrap().unwrap();
        assert_eq!(verified.id, key.id);
        assert!(verified.last_used_at.is_some());

        assert!(repo.delete_api_key(key.id).await.unwrap());
        assert!(!repo.delete_api_key(key.id).await.unwrap());
        assert!(!repo.delete_api_key(ApiKeyId::new()).await.unwrap());
        assert!(repo.verify_api_key_hash(&hash).await.unwrap().is_none());
        assert!(repo.list_api_keys().await.unwrap().is_empty());
    }
}
