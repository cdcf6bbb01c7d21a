use crate::cli::{Cli, Commands, SyncArgs, VerifyArgs};
use crate::config::{RepositoryFilter, SyncConfig};
use crate::container_runtime::DockerCli;
use crate::ecr::EcrRegistry;
use crate::ecs::EcsStatusProvider;
use crate::sync::{RegistrySync, SyncOptions, SyncSummary};
use crate::verifier::{PollOutcome, RedeploymentVerifier, VerifierConfig};
use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod container_runtime;
mod credentials;
mod deployment;
mod ecr;
mod ecs;
mod image_reference;
mod oci_registry;
mod sync;
mod verifier;

/// Exit code for errors that prevent a verification outcome, kept apart from 0/1/2.
const VERIFY_ERROR_EXIT_CODE: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    info!("Starting ecs-rollout-tools {}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Received interrupt, stopping");
                cancel.cancel();
            }
        }
    });

    match cli.command {
        Commands::VerifyRedeployment(args) => match verify_redeployment(args, cancel).await {
            Ok(outcome) => ExitCode::from(outcome.exit_code().unwrap_or(VERIFY_ERROR_EXIT_CODE)),
            Err(e) => {
                error!("Redeployment verification aborted: {:?}", e);
                ExitCode::from(VERIFY_ERROR_EXIT_CODE)
            }
        },
        Commands::SyncRegistries(args) => match sync_registries(args, cancel).await {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Registry sync failed: {:?}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn verify_redeployment(
    args: VerifyArgs,
    cancel: CancellationToken,
) -> anyhow::Result<PollOutcome> {
    let client = ecs::create_client(&args.region).await;
    let verifier = RedeploymentVerifier::new(
        EcsStatusProvider::new(client),
        VerifierConfig {
            max_iterations: args.wait_time,
            poll_interval: Duration::from_secs(args.interval),
        },
    )
    .with_cancellation(cancel);

    let verification = verifier
        .verify(&args.cluster, &args.service)
        .await
        .with_context(|| {
            format!(
                "Failed to verify redeployment of service {} in cluster {}",
                args.service, args.cluster
            )
        })?;

    info!(
        "Verification of service {} finished with {:?} after {} iterations",
        args.service, verification.outcome, verification.iterations
    );
    Ok(verification.outcome)
}

async fn sync_registries(args: SyncArgs, cancel: CancellationToken) -> anyhow::Result<SyncSummary> {
    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => SyncConfig::default(),
    };
    config.override_regions(args.source_region, args.destination_region);
    config.validate()?;

    let filter = RepositoryFilter::new(&config.repositories)?;
    let source = EcrRegistry::connect(&config.source_region).await;
    let destination = EcrRegistry::connect(&config.destination_region).await;
    let http_client = oci_registry::create_client()?;

    let sync = RegistrySync::new(
        source,
        destination,
        DockerCli::new(config.container_runtime),
        http_client,
        SyncOptions {
            tags: config.tags,
            filter,
            skip_up_to_date: config.skip_up_to_date,
            dry_run: args.dry_run,
        },
    );

    tokio::select! {
        result = sync.run() => result,
        _ = cancel.cancelled() => anyhow::bail!("Registry sync cancelled"),
    }
}
