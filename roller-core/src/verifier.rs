/*!

`ReplacementVerifier` waits for a strategy's replacement instances to appear and become healthy,
then decides whether to accept them, retry against the subset that failed, or give up and fail the
component.

!*/

use crate::backend::{ComputeBackend, InstanceFilter};
use chrono::{DateTime, Utc};
use log::{info, warn};
use roller_model::constants::{TAG_COMPONENT, VERIFIER_FAILURE_RATIO_THRESHOLD, VERIFIER_MAX_ATTEMPTS};
use roller_model::{ComponentRun, Fingerprint, Instance, InstanceId, RollerError, RollerResult, Role};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Timing knobs for the verifier's polling loops. Production code uses the real multi-minute
/// budgets from `roller_model::constants`; tests substitute a fast configuration so the decision
/// logic can be exercised without waiting on real clocks.
#[derive(Clone, Copy, Debug)]
pub struct VerifierTiming {
    pub discovery_attempts: u32,
    pub discovery_interval: Duration,
    pub health_attempts: u32,
    pub health_interval: Duration,
    pub termination_grace: Duration,
}

impl VerifierTiming {
    pub fn production() -> Self {
        use roller_model::constants::*;
        Self {
            discovery_attempts: VERIFIER_DISCOVERY_POLL_ATTEMPTS,
            discovery_interval: Duration::from_secs(VERIFIER_DISCOVERY_POLL_INTERVAL_SECONDS),
            health_attempts: VERIFIER_HEALTH_POLL_ATTEMPTS,
            health_interval: Duration::from_secs(VERIFIER_HEALTH_POLL_INTERVAL_SECONDS),
            termination_grace: Duration::from_secs(VERIFIER_TERMINATION_GRACE_SECONDS),
        }
    }
}

/// Wait for `expected` replacement instances, accept or retry based on the failure-ratio/attempt
/// decision table, and return the accepted set's ids on success.
///
/// `run.verifier_attempts` is read and written only here and only by the single task that owns
/// `run` — confined, per the concurrency model.
pub async fn verify<B: ComputeBackend + ?Sized>(
    backend: &B,
    run: &mut ComponentRun,
    role: Role,
    target_fingerprint: &Fingerprint,
    expected: usize,
    since: DateTime<Utc>,
    timing: VerifierTiming,
) -> RollerResult<HashSet<InstanceId>> {
    verify_inner(backend, run, role, target_fingerprint, expected, since, timing).await
}

// Boxed so the recursive retry call can be expressed as ordinary `async fn` recursion.
fn verify_inner<'a, B: ComputeBackend + ?Sized>(
    backend: &'a B,
    run: &'a mut ComponentRun,
    role: Role,
    target_fingerprint: &'a Fingerprint,
    expected: usize,
    since: DateTime<Utc>,
    timing: VerifierTiming,
) -> Pin<Box<dyn Future<Output = RollerResult<HashSet<InstanceId>>> + Send + 'a>> {
    Box::pin(async move {
        if expected == 0 {
            return Ok(HashSet::new());
        }

        let candidates = discover_candidates(
            backend,
            role,
            target_fingerprint,
            expected,
            since,
            timing,
        )
        .await;

        let (accepted, failed) = check_health(backend, &candidates, timing).await;
        let missing = expected.saturating_sub(candidates.len());
        let k = failed.len() + missing;

        info!(
            "Verifier for '{}': expected {}, observed {}, missing {}, failed health {} (k={})",
            role,
            expected,
            candidates.len(),
            missing,
            failed.len(),
            k
        );

        if k == 0 {
            return Ok(accepted.into_iter().map(|i| i.id).collect());
        }

        let ratio = k as f64 / expected as f64;
        let abort = if expected > 2 {
            ratio > VERIFIER_FAILURE_RATIO_THRESHOLD
        } else {
            k > 1
        };

        if abort {
            let message = format!(
                "{} of {} replacements failed verification ({:.0}% failure ratio exceeds the \
                 abort threshold)",
                k,
                expected,
                ratio * 100.0
            );
            warn!("Verifier aborting for '{}': {}", role, message);
            return Err(RollerError::Verification {
                role: role.to_string(),
                attempts: run.verifier_attempts,
                message,
            });
        }

        run.verifier_attempts += 1;
        if run.verifier_attempts >= VERIFIER_MAX_ATTEMPTS {
            let message = "Reached max number of attempts".to_string();
            warn!("Verifier exhausted retries for '{}': {}", role, message);
            return Err(RollerError::Verification {
                role: role.to_string(),
                attempts: run.verifier_attempts,
                message,
            });
        }

        // Terminate the failed candidates (with a grace period between each) and retry against
        // just the failed count.
        let mut failed_and_missing: Vec<InstanceId> = failed.iter().map(|i| i.id.clone()).collect();
        for id in &failed_and_missing {
            if let Err(e) = backend.terminate_instance(id).await {
                warn!("Unable to terminate failed candidate '{}': {}", id, e);
            }
            tokio::time::sleep(timing.termination_grace).await;
        }
        failed_and_missing.clear();

        let retry_since = Utc::now();
        verify_inner(backend, run, role, target_fingerprint, k, retry_since, timing).await
    })
}

async fn discover_candidates<B: ComputeBackend + ?Sized>(
    backend: &B,
    role: Role,
    target_fingerprint: &Fingerprint,
    expected: usize,
    since: DateTime<Utc>,
    timing: VerifierTiming,
) -> Vec<Instance> {
    let filters = InstanceFilter::new().with_tag(TAG_COMPONENT, role.tag_value());

    for attempt in 0..timing.discovery_attempts {
        match backend
            .describe_instances_matching_fingerprint_since(&filters, target_fingerprint, since)
            .await
        {
            Ok(found) if found.len() >= expected => return found,
            Ok(found) => {
                if attempt + 1 < timing.discovery_attempts {
                    tokio::time::sleep(timing.discovery_interval).await;
                } else {
                    return found;
                }
            }
            Err(e) => {
                warn!("Unable to describe replacement candidates for '{}': {}", role, e);
                if attempt + 1 < timing.discovery_attempts {
                    tokio::time::sleep(timing.discovery_interval).await;
                }
            }
        }
    }
    Vec::new()
}

async fn check_health<B: ComputeBackend + ?Sized>(
    backend: &B,
    candidates: &[Instance],
    timing: VerifierTiming,
) -> (Vec<Instance>, Vec<Instance>) {
    let mut accepted = Vec::new();
    let mut failed = Vec::new();

    for candidate in candidates {
        let mut ready = false;
        for attempt in 0..timing.health_attempts {
            match backend.instance_is_ready(&candidate.id).await {
                Ok(true) => {
                    ready = true;
                    break;
                }
                Ok(false) => {
                    if attempt + 1 < timing.health_attempts {
                        tokio::time::sleep(timing.health_interval).await;
                    }
                }
                Err(e) => {
                    warn!("Unable to check health of '{}': {}", candidate.id, e);
                    if attempt + 1 < timing.health_attempts {
                        tokio::time::sleep(timing.health_interval).await;
                    }
                }
            }
        }
        if ready {
            accepted.push(candidate.clone());
        } else {
            failed.push(candidate.clone());
        }
    }

    (accepted, failed)
}
