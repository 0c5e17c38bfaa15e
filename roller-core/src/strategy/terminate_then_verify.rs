/*!

Variant A: terminate-then-verify. Used for `etcd` and `k8s-master` — ASGs too small, and with too
tight a capacity ceiling, to provision replacements ahead of terminating the originals.

!*/

use super::{RollingStrategy, ScopedProcessSuspension, StrategyContext};
use crate::backend::{ComputeBackend, OrchestratorBackend};
use crate::verifier::verify;
use async_trait::async_trait;
use chrono::Utc;
use log::info;
use roller_model::{ComponentRun, RollerError, ScalingProcess};

/// Terminate one instance at a time, in roster order, verifying its replacement before moving on
/// to the next. The first verification failure stops the component immediately.
pub struct TerminateThenVerify;

#[async_trait]
impl<C: ComputeBackend + ?Sized, O: OrchestratorBackend + ?Sized> RollingStrategy<C, O>
    for TerminateThenVerify
{
    fn initial_suspensions(&self) -> Vec<ScalingProcess> {
        vec![ScalingProcess::AzRebalance]
    }

    async fn execute(
        &self,
        ctx: &StrategyContext<'_, C, O>,
        run: &mut ComponentRun,
        _suspension: &mut ScopedProcessSuspension<'_, C>,
    ) {
        let roster = run.instances.clone();
        for instance in &roster {
            let terminated_at = Utc::now();
            info!(
                "[{}] terminating instance '{}'",
                ctx.role, instance.id
            );
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

            match verify(
                ctx.compute,
                run,
                ctx.role,
                &ctx.target_fingerprint,
                1,
                terminated_at,
                ctx.verifier_timing,
            )
            .await
            {
                Ok(_replacements) => continue,
                Err(failure) => {
                    run.fail(
                        Utc::now(),
                        format!(
                            "Replacement verification failed after terminating '{}': {}",
                            instance.id, failure
                        ),
                    );
                    return;
                }
            }
        }

        run.succeed(Utc::now());
    }
}
