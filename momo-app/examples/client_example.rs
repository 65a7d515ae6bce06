//! Client example walking a payment from creation to a reconciled callback.
//!
//! Run with: cargo run -p momo-app --example client_example --no-default-features --features sqlite

use momo_client::MomoClient;
use momo_hex::{WebhookService, inbound::HttpServer};
use momo_repo::build_repo;
use momo_types::{
    CompanyId, CreateTransactionRequest, Currency, Provider, ProviderConfigRequest,
    WebhookListQuery,
};
use std::net::SocketAddr;
use tempfile::tempdir;
use tokio::net::TcpListener;

const WEBHOOK_SECRET: &str = "demo-mtn-secret";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt().with_env_filter("info").init();

    // Find an available port
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr: SocketAddr = listener.local_addr()?;
    let port = addr.port();
    drop(listener);

    // Use a temp file-backed SQLite DB
    let tmp = tempdir()?;
    let db_path = tmp.path().join("momo.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

    println!("🚀 Starting server on port {port}...");
    println!("   Database: {db_url}");

    // Build repository (handles connection and migration)
    let repo = build_repo(&db_url).await?;

    // Start server in background
    let service = WebhookService::new(repo);
    let server = HttpServer::new(service);
    let router = server.router();

    let server_listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(
            server_listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            eprintln!("server error: {e}");
        }
    });

    // Wait for server to start
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    // Create client
    let base_url = format!("http://127.0.0.1:{port}");
    let client = MomoClient::new(&base_url);

    // ─────────────────────────────────────────────────────────────────────────
    // Demo: payment reconciled by an MTN callback
    // ─────────────────────────────────────────────────────────────────────────

    // Health check
    let health = client.health().await?;
    println!("✅ Server health: {health}");

    // Operator routes need a key
    let response = client.list_webhooks(&WebhookListQuery::default()).await;
    assert!(response.is_err());
    if let Err(e) = response {
        println!("✅ Unauthorized without key: {e}");
    }

    // key
    let key = client.bootstrap("demo").await?;
    println!("✅ Server key generated: {key}");

    let client = client.with_api_key(key);

    // Tenant and provider secret
    let company = CompanyId::new();
    let config = client
        .configure_provider(
            Provider::Mtn,
            &ProviderConfigRequest {
                company_id: company,
                webhook_secret: WEBHOOK_SECRET.to_string(),
                is_active: true,
            },
        )
        .await?;
    println!(
        "✅ Configured {} for company {}",
        config.provider, config.company_id
    );

    // Payment initiated with the provider
    let tx = client
        .create_transaction(&CreateTransactionRequest {
            company_id: company,
            provider: Provider::Mtn,
            amount: 2500,
            currency: Currency::ZMW,
            phone_number: Some("260961234567".to_string()),
            transaction_number: None,
            provider_transaction_id: None,
        })
        .await?;
    println!(
        "✅ Created transaction {} (status={})",
        tx.transaction_number, tx.status
    );

    // A forged callback is rejected
    let payload = serde_json::json!({
        "externalId": tx.transaction_number,
        "financialTransactionId": "FT-DEMO-0001",
        "status": "SUCCESSFUL",
        "amount": "25.00",
        "currency": "ZMW",
    })
    .to_string();

    let forged = client
        .send_callback("mtn", Some(company), &payload, Some("wrong-secret"))
        .await?;
    println!("✅ Forged callback: {} {}", forged.status, forged.body);

    // The provider's signed callback settles it
    let callback = client
        .send_callback("mtn", Some(company), &payload, Some(WEBHOOK_SECRET))
        .await?;
    println!("✅ Signed callback: {} {}", callback.status, callback.body);

    let tx = client.get_transaction(tx.id).await?;
    println!(
        "   Transaction status: {} (provider status {:?})",
        tx.status, tx.provider_status
    );

    // Audit trail
    let webhooks = client.list_webhooks(&WebhookListQuery::default()).await?;
    println!("\n📋 Stored callbacks:");
    for webhook in &webhooks {
        println!(
            "   - {} {} [{}] {}",
            webhook.id,
            webhook.provider,
            webhook.status,
            webhook.error_message.as_deref().unwrap_or("")
        );
    }

    if let Some(processed) = webhooks.iter().find(|w| w.transaction_id == Some(tx.id)) {
        let status = client.webhook_status(processed.id).await?;
        println!(
            "\n🔎 Webhook {} linked to {:?}",
            status.webhook.id,
            status.transaction.map(|t| t.transaction_number)
        );
    }

    println!("\n🎉 Example completed successfully!");

    Ok(())
}
