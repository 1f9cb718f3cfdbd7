use loraforge_worker::config::WorkerConfig;
use loraforge_worker::run::JobOutcome;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid worker configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        model = %config.model,
        target_total = config.batch.target_total,
        export_path = %config.export_path.display(),
        "Worker starting",
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, abandoning batch job");
            on_signal.cancel();
        }
    });

    match loraforge_worker::run(config, cancel).await {
        Ok(report) => match report.outcome {
            JobOutcome::Completed => {
                tracing::info!(accepted = report.accepted, gaps = report.gaps, "Worker finished");
            }
            JobOutcome::Failed(message) => {
                tracing::error!(accepted = report.accepted, %message, "Batch job failed");
                std::process::exit(1);
            }
            JobOutcome::Abandoned => {
                tracing::warn!("Batch job abandoned; nothing exported");
                std::process::exit(130);
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Worker failed");
            std::process::exit(1);
        }
    }
}

/// `RUST_LOG` filter with a `fmt` layer; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "loraforge_worker=info,loraforge_pipeline=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
