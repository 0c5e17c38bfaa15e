/*!

Variant B: provision-then-terminate. Used for `k8s-node` — large worker fleets where workload
continuity requires new capacity to exist before old capacity leaves.

!*/

use super::{RollingStrategy, ScopedProcessSuspension, StrategyContext};
use crate::backend::{ComputeBackend, OrchestratorBackend};
use crate::cordon::cordon_instances;
use crate::verifier::verify;
use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use roller_model::{AsgName, ComponentRun, InstanceId, RollerError, ScalingProcess};
use std::collections::HashMap;

pub struct ProvisionThenTerminate;

#[async_trait]
impl<C: ComputeBackend + ?Sized, O: OrchestratorBackend + ?Sized> RollingStrategy<C, O>
    for ProvisionThenTerminate
{
    fn initial_suspensions(&self) -> Vec<ScalingProcess> {
        vec![ScalingProcess::AzRebalance, ScalingProcess::Terminate]
    }

    async fn execute(
        &self,
        ctx: &StrategyContext<'_, C, O>,
        run: &mut ComponentRun,
        suspension: &mut ScopedProcessSuspension<'_, C>,
    ) {
        // Step 1: every ASG must already be at its desired count, or this is a preflight error.
        let mut original_desired: HashMap<AsgName, i32> = HashMap::new();
        for asg_name in &run.asgs {
            let asg = match ctx.compute.describe_asg(asg_name).await {
                Ok(asg) => asg,
                Err(e) => {
                    run.fail(
                        Utc::now(),
                        RollerError::Operational {
                            role: ctx.role.to_string(),
                            message: format!("Unable to describe ASG '{}': {}", asg_name, e),
                        }
                        .to_string(),
                    );
                    return;
                }
            };
            if asg.current_count != asg.desired_count {
                run.fail(
                    Utc::now(),
                    RollerError::Preflight {
                        role: ctx.role.to_string(),
                        message: format!(
                            "ASG '{}' has {} instances but a desired count of {}; refusing to roll \
                             until the ASG is stable",
                            asg_name, asg.current_count, asg.desired_count
                        ),
                    }
                    .to_string(),
                );
                return;
            }
            original_desired.insert(asg_name.clone(), asg.desired_count);
        }

        let total_desired: i32 = original_desired.values().sum();

        // Step 3: record the provisioning timestamp, then double every ASG's desired count.
        let provisioned_since = Utc::now();
        for (asg_name, desired) in &original_desired {
            if let Err(e) = ctx
                .compute
                .asg_set_desired_count(asg_name, desired * 2)
                .await
            {
                run.fail(
                    Utc::now(),
                    RollerError::Operational {
                        role: ctx.role.to_string(),
                        message: format!("Unable to scale ASG '{}' to {}: {}", asg_name, desired * 2, e),
                    }
                    .to_string(),
                );
                return;
            }
        }

        // Step 4: wait for `total_desired` replacements to appear and become healthy.
        let accepted = match verify(
            ctx.compute,
            run,
            ctx.role,
            &ctx.target_fingerprint,
            total_desired as usize,
            provisioned_since,
            ctx.verifier_timing,
        )
        .await
        {
            Ok(accepted) => accepted,
            Err(failure) => {
                run.fail(Utc::now(), format!("Replacement verification failed: {}", failure));
                return;
            }
        };
        info!(
            "[{}] provisioned {} replacement instance(s)",
            ctx.role,
            accepted.len()
        );

        // Step 5: cordon the original instances. Failures are logged but never abort the roll.
        let original_ids: Vec<InstanceId> = run.instances.iter().map(|i| i.id.clone()).collect();
        let cordon_failures = cordon_instances(ctx.orchestrator, &original_ids).await;
        if !cordon_failures.is_empty() {
            warn!(
                "[{}] cordon step reported {} failure(s), continuing with termination: {:?}",
                ctx.role,
                cordon_failures.len(),
                cordon_failures
            );
        }

        // Step 6: suspend Launch so nothing backfills the instances about to be terminated.
        if let Err(e) = suspension.suspend_additional(&[ScalingProcess::Launch]).await {
            run.fail(
                Utc::now(),
                RollerError::Operational {
                    role: ctx.role.to_string(),
                    message: format!("Unable to suspend Launch: {}", e),
                }
                .to_string(),
            );
            return;
        }

        // Step 7: resume Terminate so the ASG can evict instances as they terminate.
        if let Err(e) = suspension.resume_now(&[ScalingProcess::Terminate]).await {
            run.fail(
                Utc::now(),
                RollerError::Operational {
                    role: ctx.role.to_string(),
                    message: format!("Unable to resume Terminate: {}", e),
                }
                .to_string(),
            );
            return;
        }

        // Step 8: terminate the original instances sequentially, with a grace period between
        // each.
        for (i, instance) in run.instances.clone().iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(ctx.termination_wait).await;
            }
            info!("[{}] terminating original instance '{}'", ctx.role, instance.id);
            if let Err(e) = ctx.compute.terminate_instance(&instance.id).await {
                run.fail(
                    Utc::now(),
                    RollerError::Operational {
                        role: ctx.role.to_string(),
                        message: format!("Unable to terminate instance '{}': {}", instance.id, e),
                    }
                    .to_string(),
                );
                return;
            }
        }

        // Step 9: wait for every ASG to converge back to its original desired count. A timeout
        // here returns without resetting the desired count, leaving it inflated — this is a known
        // limitation carried over from the system this engine replaces (see DESIGN.md).
        for (asg_name, desired) in &original_desired {
            if !poll_for_convergence(ctx.compute, asg_name, *desired).await {
                run.fail(
                    Utc::now(),
                    format!(
                        "{} (desired count remains inflated at {})",
                        RollerError::Convergence {
                            role: ctx.role.to_string(),
                            asg: asg_name.to_string(),
                            expected: *desired,
                        },
                        desired * 2
                    ),
                );
                return;
            }
        }

        // Step 10: reset every ASG's desired count back to its original value.
        for (asg_name, desired) in &original_desired {
            if let Err(e) = ctx.compute.asg_set_desired_count(asg_name, *desired).await {
                run.fail(
                    Utc::now(),
                    RollerError::Operational {
                        role: ctx.role.to_string(),
                        message: format!("Unable to reset ASG '{}' to {}: {}", asg_name, desired, e),
                    }
                    .to_string(),
                );
                return;
            }
        }

        run.succeed(Utc::now());
    }
}

async fn poll_for_convergence<C: ComputeBackend + ?Sized>(
    compute: &C,
    asg_name: &AsgName,
    expected: i32,
) -> bool {
    use roller_model::constants::{CONVERGENCE_POLL_ATTEMPTS, CONVERGENCE_POLL_INTERVAL_SECONDS};

    for attempt in 0..CONVERGENCE_POLL_ATTEMPTS {
        match compute.asg_instance_count(asg_name).await {
            Ok(count) if count == expected => return true,
            Ok(_) | Err(_) => {
                if attempt + 1 < CONVERGENCE_POLL_ATTEMPTS {
                    tokio::time::sleep(std::time::Duration::from_secs(
                        CONVERGENCE_POLL_INTERVAL_SECONDS,
                    ))
                    .await;
                }
            }
        }
    }
    false
}
