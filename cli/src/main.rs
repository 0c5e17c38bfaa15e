/*!

This is the command line entry point for running a rolling node replacement against a single
cluster. Almost all configuration comes from the container environment (see `config`); the flags
here only cover what makes sense to override per-invocation.

!*/

mod config;

use anyhow::Context;
use clap::Parser;
use config::{AwsIdentity, RollerConfig};
use log::{info, warn, LevelFilter};
use roller_aws::AwsComputeBackend;
use roller_core::{backend::Notifier, Orchestrator, RunConfig};
use roller_k8s::K8sOrchestratorBackend;
use roller_model::Role;
use roller_notify::{NullNotifier, WebhookNotifier};
use std::collections::HashSet;
use std::sync::Arc;

/// Roll out of date nodes in a Kubernetes cluster, one component at a time.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides both this flag and `ROLLER_LOG_LEVEL`.
    #[clap(long = "log-level")]
    log_level: Option<LevelFilter>,

    /// Comma-separated subset of etcd,k8s-master,k8s-node to roll. Overrides `ROLLER_COMPONENTS`.
    #[clap(long = "components")]
    components: Option<String>,

    /// Build the inventory and report what each component would do, without making any mutating
    /// call.
    #[clap(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match RollerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Unable to read configuration from environment: {}", e);
            std::process::exit(1);
        }
    };

    init_logger(args.log_level.unwrap_or(config.log_level));

    if let Err(e) = run(args, config).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args, config: RollerConfig) -> anyhow::Result<()> {
    let components: HashSet<Role> = match args.components {
        Some(raw) => parse_components(&raw)?,
        None => config.components.clone(),
    };

    info!(
        "Starting rolling replacement for cluster '{}' (target fingerprint '{}'), components: {:?}",
        config.cluster, config.target_fingerprint, components
    );

    // `AWS_ACCOUNT`/`AWS_PROFILE` are read from the environment directly by `aws-config`; we only
    // read them ourselves to enforce that at least one is present and to log which was used.
    match &config.aws_identity {
        AwsIdentity::Account(account) => info!("Using AWS account '{}'", account),
        AwsIdentity::Profile(profile) => info!("Using AWS profile '{}'", profile),
    }
    let compute = Arc::new(AwsComputeBackend::from_env(Some(config.aws_region.clone())).await);

    let kubernetes_client = K8sOrchestratorBackend::from_basic_auth(
        config
            .kubernetes
            .server
            .parse()
            .context("Invalid KUBERNETES_SERVER URL")?,
        &config.kubernetes.username,
        &config.kubernetes.password,
    )
    .await
    .context("Unable to create Kubernetes client")?;
    let orchestrator_backend = Arc::new(kubernetes_client);

    let notifier: Arc<dyn Notifier> = match &config.slack_webhook {
        Some(webhook) => Arc::new(WebhookNotifier::new(webhook.clone())),
        None => {
            warn!("SLACK_WEBHOOK not set; notifications will only be logged");
            Arc::new(NullNotifier)
        }
    };

    let orchestrator = Orchestrator::new(compute, orchestrator_backend, notifier);

    let run_config = RunConfig {
        cluster: config.cluster.clone(),
        target_fingerprint: config.target_fingerprint.clone(),
        roles: components,
        termination_wait: config.termination_wait,
        dry_run: args.dry_run,
    };

    let state = orchestrator
        .run(run_config)
        .await
        .map_err(|e| anyhow::anyhow!("Rolling replacement run failed: {}", e))?;

    println!("{}", state.summary());

    if state.overall_status() != roller_model::ComponentStatus::Success {
        anyhow::bail!("one or more components failed to roll");
    }

    Ok(())
}

fn parse_components(raw: &str) -> anyhow::Result<HashSet<Role>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Role>().map_err(anyhow::Error::msg))
        .collect()
}

/// Initialize the logger at `level` when the `RUST_LOG` environment variable is not present. If
/// present, `RUST_LOG` overrides both `--log-level` and `ROLLER_LOG_LEVEL`.
fn init_logger(level: LevelFilter) {
    match std::env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            env_logger::Builder::from_default_env().init();
        }
        None => {
            env_logger::Builder::new()
                .filter(Some(env!("CARGO_CRATE_NAME")), level)
                .filter(Some("roller_core"), level)
                .init();
        }
    }
}
