//! # MoMo Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the repository adapter
//! - Start the notification worker (when a downstream URL is configured)
//! - Create the webhook service
//! - Start the HTTP server

mod config;

use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use momo_hex::{WebhookService, inbound::HttpServer};
use momo_repo::{NotificationWorker, build_repo};

fn init_tracer(
    endpoint: &str,
) -> anyhow::Result<(sdktrace::Tracer, sdktrace::SdkTracerProvider)> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Use gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok((provider.tracer("momo-service"), provider))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize OpenTelemetry tracing only when a collector is configured
    let otel = config
        .otlp_endpoint
        .as_deref()
        .map(init_tracer)
        .transpose()?;
    let (telemetry, otel_provider) = match otel {
        Some((tracer, provider)) => (
            Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            Some(provider),
        ),
        None => (None, None),
    };

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,momo_app=debug,momo_hex=debug,momo_repo=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .init();

    tracing::info!("Starting momo server on port {}", config.port);
    match config.default_company_id {
        Some(company) => tracing::info!("Default company: {}", company),
        None => tracing::info!("No default company; callbacks must pass ?company_id="),
    }

    // Build repository (handles connection and migration)
    let repo = build_repo(&config.database_url).await?;

    // Deliver status-change notifications in the background
    match config.notification_url.clone() {
        Some(url) => {
            tracing::info!("Notification worker delivering to {}", url);
            let worker =
                NotificationWorker::new(repo.clone(), url, config.notification_secret.clone());
            tokio::spawn(worker.run());
        }
        None => tracing::info!("NOTIFICATION_URL not set; notifications stay queued"),
    }

    // Create the webhook service
    let service = WebhookService::new(repo).with_default_company(config.default_company_id);

    // Create and run the HTTP server
    let server = HttpServer::with_rate_limit(service, config.rate_limit_per_minute);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    // Ensure traces are flushed before exit
    if let Some(provider) = otel_provider {
        let _ = provider.shutdown();
    }
    Ok(())
}
