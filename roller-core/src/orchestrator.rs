/*!

`Orchestrator` is the top-level driver: it builds the `Inventory` once, optionally disables the
cluster-autoscaler, fans out one task per requested role, waits for all of them, restores the
autoscaler, and reports a coherent summary.

!*/

use crate::autoscaler::{self, AutoscalerState};
use crate::backend::{ComputeBackend, Notifier, OrchestratorBackend};
use crate::inventory::build_inventory;
use crate::strategy::{
    prepare_component_run, ProvisionThenTerminate, RollingStrategy, StrategyContext,
    TerminateThenVerify,
};
use crate::verifier::VerifierTiming;
use chrono::{DateTime, Utc};
use log::{error, info};
use roller_model::{ComponentRun, ComponentStatus, Fingerprint, Inventory, RollerError, Role};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Input the core engine needs for one run. Reading these values out of the environment/CLI is
/// the caller's job (see `roller-cli`); the engine itself only ever consumes a plain value.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub cluster: String,
    pub target_fingerprint: Fingerprint,
    pub roles: HashSet<Role>,
    pub termination_wait: Duration,
    /// When true, the inventory and preflight checks still run, but no mutating backend call is
    /// ever made: every requested component that passes preflight is reported as success.
    pub dry_run: bool,
}

impl RunConfig {
    pub fn rolls_workers(&self) -> bool {
        self.roles.contains(&Role::K8sNode)
    }
}

/// The aggregate state of a run: every `ComponentRun` requested, the inventory it was computed
/// from, and the autoscaler sub-state. Overall success is a pure function of this value (see
/// `overall_status`).
#[derive(Clone, Debug)]
pub struct RollerState {
    pub started_at: DateTime<Utc>,
    pub inventory: Inventory,
    pub component_runs: Vec<ComponentRun>,
    pub autoscaler: AutoscalerState,
}

impl RollerState {
    /// Success iff every `ComponentRun` is success and the autoscaler sub-state is not failure.
    pub fn overall_status(&self) -> ComponentStatus {
        let all_components_ok = self
            .component_runs
            .iter()
            .all(|r| r.status == ComponentStatus::Success);
        let autoscaler_ok = self.autoscaler.status != ComponentStatus::Failure;
        if all_components_ok && autoscaler_ok {
            ComponentStatus::Success
        } else {
            ComponentStatus::Failure
        }
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Rolling replacement run for cluster '{}' (target fingerprint '{}'): {:?}",
            self.inventory.cluster,
            self.inventory.target_fingerprint,
            self.overall_status()
        )];
        for run in &self.component_runs {
            let detail = match &run.error {
                Some(e) => format!(" — {}", e),
                None => String::new(),
            };
            lines.push(format!(
                "  {}: {:?} ({} instance(s)){}",
                run.role,
                run.status,
                run.instances.len(),
                detail
            ));
        }
        if self.autoscaler.managed {
            let detail = match &self.autoscaler.error {
                Some(e) => format!(" — {}", e),
                None => String::new(),
            };
            lines.push(format!("  autoscaler: {:?}{}", self.autoscaler.status, detail));
        }
        lines.join("\n")
    }
}

pub struct Orchestrator {
    pub compute: Arc<dyn ComputeBackend>,
    pub orchestrator_backend: Arc<dyn OrchestratorBackend>,
    pub notifier: Arc<dyn Notifier>,
}

impl Orchestrator {
    pub fn new(
        compute: Arc<dyn ComputeBackend>,
        orchestrator_backend: Arc<dyn OrchestratorBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            compute,
            orchestrator_backend,
            notifier,
        }
    }

    pub async fn run(&self, config: RunConfig) -> Result<RollerState, String> {
        let started_at = Utc::now();

        let inventory =
            build_inventory(self.compute.as_ref(), &config.cluster, &config.target_fingerprint)
                .await
                .map_err(|e| e.to_string())?;

        let mut autoscaler = AutoscalerState::unmanaged();
        if config.rolls_workers() && !config.dry_run {
            autoscaler = autoscaler::disable(self.orchestrator_backend.as_ref()).await;
        }

        if let Err(e) = self
            .notifier
            .notify(&format!(
                "Starting rolling replacement for cluster '{}' ({} role(s) requested)",
                config.cluster,
                config.roles.len()
            ))
            .await
        {
            error!(
                "{}",
                RollerError::Notifier {
                    message: format!("Unable to send start-of-run notification: {}", e),
                }
            );
        }

        let mut tasks = Vec::new();
        let mut roles: Vec<Role> = config.roles.iter().copied().collect();
        roles.sort();
        for role in roles {
            let compute = Arc::clone(&self.compute);
            let orchestrator_backend = Arc::clone(&self.orchestrator_backend);
            let target_fingerprint = config.target_fingerprint.clone();
            let termination_wait = config.termination_wait;
            let dry_run = config.dry_run;
            let inventory = inventory.clone();

            tasks.push(tokio::spawn(async move {
                run_component(
                    compute,
                    orchestrator_backend,
                    &inventory,
                    role,
                    target_fingerprint,
                    termination_wait,
                    dry_run,
                )
                .await
            }));
        }

        let mut component_runs = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(run) => component_runs.push(run),
                Err(join_error) => {
                    error!("A component task panicked: {}", join_error);
                }
            }
        }

        if config.rolls_workers() && !config.dry_run {
            autoscaler::enable(self.orchestrator_backend.as_ref(), &mut autoscaler).await;
        }

        let state = RollerState {
            started_at,
            inventory,
            component_runs,
            autoscaler,
        };

        if let Err(e) = self.notifier.notify(&state.summary()).await {
            error!(
                "{}",
                RollerError::Notifier {
                    message: format!("Unable to send summary notification: {}", e),
                }
            );
        }

        info!("{}", state.summary());
        Ok(state)
    }
}

async fn run_component(
    compute: Arc<dyn ComputeBackend>,
    orchestrator_backend: Arc<dyn OrchestratorBackend>,
    inventory: &Inventory,
    role: Role,
    target_fingerprint: Fingerprint,
    termination_wait: Duration,
    dry_run: bool,
) -> ComponentRun {
    let mut run = match prepare_component_run(inventory, role) {
        Ok(run) => run,
        Err(e) => {
            let mut run = ComponentRun::new(role, Vec::new(), Vec::new(), Utc::now());
            run.fail(Utc::now(), e.to_string());
            return run;
        }
    };

    if dry_run {
        run.succeed(Utc::now());
        return run;
    }

    let ctx = StrategyContext {
        compute: compute.as_ref(),
        orchestrator: orchestrator_backend.as_ref(),
        role,
        target_fingerprint,
        termination_wait,
        verifier_timing: VerifierTiming::production(),
    };

    match role {
        Role::Etcd | Role::K8sMaster => TerminateThenVerify.run(&ctx, &mut run).await,
        Role::K8sNode => ProvisionThenTerminate.run(&ctx, &mut run).await,
    }

    run
}
