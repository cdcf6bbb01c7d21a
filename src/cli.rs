use crate::config::DEFAULT_SOURCE_REGION;
use crate::verifier::{DEFAULT_MAX_ITERATIONS, DEFAULT_POLL_INTERVAL};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Deployment pipeline helpers for ECS services and ECR registries
#[derive(Parser, Debug)]
#[command(name = "ecs-rollout-tools")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Wait for an ECS service redeployment and report whether it succeeded
    ///
    /// Exits with 0 on success, 1 if the redeployment failed, 2 if it is still running after
    /// the wait time and 3 on any other error.
    VerifyRedeployment(VerifyArgs),

    /// Copy tagged images from the source region ECR registry into the destination region
    SyncRegistries(SyncArgs),
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// ECS cluster name
    #[arg(short, long)]
    pub cluster: String,

    /// Service that is being redeployed
    #[arg(short, long)]
    pub service: String,

    /// AWS region the service runs in
    #[arg(short, long, env = "AWS_DEFAULT_REGION", default_value = DEFAULT_SOURCE_REGION)]
    pub region: String,

    /// Number of polls before giving up
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_MAX_ITERATIONS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub wait_time: u32,

    /// Seconds to wait between polls
    #[arg(short, long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    pub interval: u64,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// YAML file with regions, tags and repository filters
    #[arg(long, env = "REGISTRY_SYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the configured source region
    #[arg(long)]
    pub source_region: Option<String>,

    /// Override the configured destination region
    #[arg(long)]
    pub destination_region: Option<String>,

    /// Log what would be copied without logging in, pulling or pushing
    #[arg(long)]
    pub dry_run: bool,
}
