//! IO Soak
//!
//! Runs a soak population against a Kubernetes cluster and prints a JSON
//! report on stdout.
//!
//! # Flow
//!
//! 1. Load configuration from environment
//! 2. Build the job population
//! 3. Setup (fatal on failure)
//! 4. Run the soak phase
//! 5. Teardown, always, including after a failed setup or a shutdown signal
//!
//! Exits non-zero when setup failed or any job failed.

#![warn(clippy::pedantic)]

use io_soak::config::Config;
use io_soak::orchestrator::{Orchestrator, OrchestratorSettings};
use io_soak::platform::{KubectlPlatform, WorkloadPlatform};
use io_soak::population::Population;
use io_soak::report::SoakReport;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "io_soak=info,soak=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting IO soak");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        protocols = ?config.protocols,
        replicas = config.replicas,
        soak_jobs = config.soak_job_count(),
        disruptors = config.disruptor_count,
        duration_secs = config.duration.as_secs(),
        namespace = %config.namespace,
        "Configuration loaded successfully"
    );

    let platform: Arc<dyn WorkloadPlatform> =
        Arc::new(KubectlPlatform::new(config.kubectl.clone(), config.fio_size_mb));
    let population = Population::from_config(&config, Arc::clone(&platform));
    let mut report = SoakReport::start(&population, config.duration);

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown signal received, interrupting soak");
        signal_token.cancel();
    });

    let mut orchestrator =
        Orchestrator::new(platform, population, OrchestratorSettings::from(&config))
            .with_cancel_token(cancel_token);

    match orchestrator.setup().await {
        Ok(()) => match orchestrator.run_soak(config.duration).await {
            Ok(outcome) => report.record_outcome(outcome),
            Err(e) => {
                error!(error = %e, "Soak run failed");
                report.record_run_error(&e);
            }
        },
        Err(e) => {
            error!(error = %e, "Setup failed, skipping soak run");
            report.record_setup_error(&e);
        }
    }

    let teardown = orchestrator.teardown().await;
    if let Err(e) = &teardown {
        warn!(error = %e, "Teardown incomplete");
    }
    report.record_teardown(teardown);
    report.finish();

    println!("{}", report.to_json()?);

    if report.passed {
        info!("IO soak passed");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(failures = report.failures.len(), "IO soak failed");
        Ok(ExitCode::FAILURE)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
