//! MoMo CLI
//!
//! Command-line interface for the reconciliation API.

use anyhow::Result;
use clap::{Parser, Subcommand};

use momo_client::MomoClient;
use momo_types::{
    CompanyId, CreateTransactionRequest, Currency, MomoTransactionId, Provider,
    ProviderConfigRequest, WebhookId, WebhookListQuery, WebhookStatus,
};

#[derive(Parser)]
#[command(name = "momo")]
#[command(author, version, about = "Mobile-money reconciliation API CLI client", long_about = None)]
struct Cli {
    /// Base URL of the reconciliation API
    #[arg(long, env = "MOMO_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// API key for authentication
    #[arg(long, env = "MOMO_API_KEY")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transaction operations
    Transaction {
        #[command(subcommand)]
        action: TransactionCommands,
    },
    /// Provider configuration
    Provider {
        #[command(subcommand)]
        action: ProviderCommands,
    },
    /// Provider callback operations
    Webhook {
        #[command(subcommand)]
        action: WebhookCommands,
    },
    /// API key management
    Key {
        #[command(subcommand)]
        action: KeyCommands,
    },
    /// Bootstrap the first API key
    Bootstrap {
        /// Name for the new API key
        #[arg(long, default_value = "bootstrap-key")]
        name: String,
    },
    /// Check API health
    Health,
}

#[derive(Subcommand)]
enum TransactionCommands {
    /// Record a transaction initiated with a provider
    Create {
        #[arg(long)]
        company: String,
        /// mtn, airtel or zamtel
        #[arg(long)]
        provider: String,
        /// Amount in the smallest currency unit
        #[arg(long)]
        amount: i64,
        #[arg(long, default_value = "ZMW")]
        currency: String,
        #[arg(long)]
        phone: Option<String>,
        /// Local reference; generated when omitted
        #[arg(long)]
        number: Option<String>,
        #[arg(long)]
        provider_transaction_id: Option<String>,
    },
    /// Get transaction details
    Get {
        /// Transaction ID (UUID)
        id: String,
    },
}

#[derive(Subcommand)]
enum ProviderCommands {
    /// Store a company's webhook secret for a provider
    Configure {
        provider: String,
        #[arg(long)]
        company: String,
        #[arg(long)]
        secret: String,
        /// Store the configuration disabled
        #[arg(long)]
        inactive: bool,
    },
}

#[derive(Subcommand)]
enum WebhookCommands {
    /// List stored callbacks
    List {
        /// pending, processed or failed
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Reprocess a stored callback
    Retry {
        /// Webhook ID (UUID)
        id: String,
    },
    /// Show a stored callback and its transaction
    Status {
        /// Webhook ID (UUID)
        id: String,
    },
    /// Post a callback as a provider would
    Simulate {
        provider: String,
        /// JSON payload
        #[arg(long)]
        payload: String,
        #[arg(long)]
        company: Option<String>,
        /// Sign with this secret; unsigned when omitted
        #[arg(long, env = "MOMO_WEBHOOK_SECRET")]
        secret: Option<String>,
    },
    /// Start a local listener for status-change notifications
    Listen {
        /// Port to listen on
        #[arg(long, default_value = "4000")]
        port: u16,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Create a new API key
    Create {
        /// Name for the new key
        #[arg(long)]
        name: String,
    },
    /// List all API keys
    List,
    /// Delete (deactivate) an API key
    Delete {
        /// API key ID (UUID)
        #[arg(long)]
        id: String,
    },
}

fn parse_company(s: &str) -> Result<CompanyId> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Invalid company ID: {}", s))
}

fn parse_provider(s: &str) -> Result<Provider> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Unknown provider: {}. Supported: mtn, airtel, zamtel", s))
}

fn parse_currency(s: &str) -> Result<Currency> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Unknown currency: {}", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut client = MomoClient::new(&cli.api_url);
    if let Some(key) = cli.api_key {
        client = client.with_api_key(key);
    }

    match cli.command {
        Commands::Health => {
            let healthy = client.health().await?;
            if healthy {
                println!("✓ API is healthy");
            } else {
                println!("✗ API is not healthy");
                std::process::exit(1);
            }
        }

        Commands::Transaction { action } => match action {
            TransactionCommands::Create {
                company,
                provider,
                amount,
                currency,
                phone,
                number,
                provider_transaction_id,
            } => {
                let req = CreateTransactionRequest {
                    company_id: parse_company(&company)?,
                    provider: parse_provider(&provider)?,
                    amount,
                    currency: parse_currency(&currency)?,
                    phone_number: phone,
                    transaction_number: number,
                    provider_transaction_id,
                };
                let tx = client.create_transaction(&req).await?;
                println!("{}", serde_json::to_string_pretty(&tx)?);
            }
            TransactionCommands::Get { id } => {
                let id: MomoTransactionId = id
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Invalid transaction ID: {}", id))?;
                let tx = client.get_transaction(id).await?;
                println!("{}", serde_json::to_string_pretty(&tx)?);
            }
        },

        Commands::Provider { action } => match action {
            ProviderCommands::Configure {
                provider,
                company,
                secret,
                inactive,
            } => {
                let req = ProviderConfigRequest {
                    company_id: parse_company(&company)?,
                    webhook_secret: secret,
                    is_active: !inactive,
                };
                let config = client
                    .configure_provider(parse_provider(&provider)?, &req)
                    .await?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },

        Commands::Webhook { action } => match action {
            WebhookCommands::List {
                status,
                provider,
                company,
                limit,
            } => {
                let query = WebhookListQuery {
                    status: status
                        .as_deref()
                        .map(str::parse::<WebhookStatus>)
                        .transpose()?,
                    provider,
                    company_id: company.as_deref().map(parse_company).transpose()?,
                    limit,
                };
                let webhooks = client.list_webhooks(&query).await?;
                println!("{}", serde_json::to_string_pretty(&webhooks)?);
            }
            WebhookCommands::Retry { id } => {
                let id: WebhookId = id
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Invalid webhook ID: {}", id))?;
                let result = client.retry_webhook(id).await?;
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            WebhookCommands::Status { id } => {
                let id: WebhookId = id
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Invalid webhook ID: {}", id))?;
                let status = client.webhook_status(id).await?;
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            WebhookCommands::Simulate {
                provider,
                payload,
                company,
                secret,
            } => {
                serde_json::from_str::<serde_json::Value>(&payload)
                    .map_err(|e| anyhow::anyhow!("Payload is not valid JSON: {}", e))?;
                let company_id = company.as_deref().map(parse_company).transpose()?;
                let response = client
                    .send_callback(&provider, company_id, &payload, secret.as_deref())
                    .await?;
                println!("{} {}", response.status, response.body);
                if !response.is_success() {
                    std::process::exit(1);
                }
            }
            WebhookCommands::Listen { port } => {
                let app = axum::Router::new()
                    .route("/notifications", axum::routing::post(handle_notification));
                let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
                println!("Listening for notifications on http://{}/notifications", addr);
                let listener = tokio::net::TcpListener::bind(&addr).await?;
                axum::serve(listener, app).await?;
            }
        },

        Commands::Key { action } => match action {
            KeyCommands::Create { name } => {
                let api_key = client.create_api_key(&name).await?;
                println!("{}", api_key);
            }
            KeyCommands::List => {
                let keys = client.list_api_keys().await?;
                println!("{}", serde_json::to_string_pretty(&keys)?);
            }
            KeyCommands::Delete { id } => {
                client.delete_api_key(&id).await?;
                println!("✓ API key deleted");
            }
        },

        Commands::Bootstrap { name } => {
            let api_key = client.bootstrap(&name).await?;
            println!("{}", api_key);
        }
    }

    Ok(())
}

async fn handle_notification(
    headers: axum::http::HeaderMap,
    body: String,
) -> impl axum::response::IntoResponse {
    println!("POST /notifications HTTP/1.1");
    for (name, value) in &headers {
        println!("{}: {:?}", name, value);
    }
    println!();
    println!("{}", body);
    println!("----------------------------------------");
    axum::http::StatusCode::OK
}
