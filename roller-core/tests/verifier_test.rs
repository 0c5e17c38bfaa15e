mod support;

use chrono::Utc;
use roller_core::verifier::{verify, VerifierTiming};
use roller_model::{ComponentRun, Fingerprint, Role};
use std::time::Duration;
use support::{instance, FakeComputeBackend};

fn fast_timing() -> VerifierTiming {
    VerifierTiming {
        discovery_attempts: 3,
        discovery_interval: Duration::from_millis(20),
        health_attempts: 3,
        health_interval: Duration::from_millis(20),
        termination_grace: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn accepts_immediately_when_every_candidate_is_healthy() {
    let since = Utc::now() - chrono::Duration::seconds(10);
    let fingerprint = Fingerprint::from("v2");
    let backend = FakeComputeBackend::new()
        .with_instance(instance("i-new-1", "asg-a", Role::K8sNode, "v2", Utc::now()))
        .with_instance(instance("i-new-2", "asg-a", Role::K8sNode, "v2", Utc::now()));

    let mut run = ComponentRun::new(Role::K8sNode, Vec::new(), Vec::new(), Utc::now());
    let accepted = verify(&backend, &mut run, Role::K8sNode, &fingerprint, 2, since, fast_timing())
        .await
        .expect("verification should succeed");

    assert_eq!(accepted.len(), 2);
    assert_eq!(run.verifier_attempts, 0);
}

#[tokio::test]
async fn succeeds_once_a_candidate_appears_during_discovery_polling() {
    let since = Utc::now();
    let fingerprint = Fingerprint::from("v2");
    let backend = std::sync::Arc::new(FakeComputeBackend::new());

    let spawn_backend = backend.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        spawn_backend.push_instance(instance("i-new-1", "asg-a", Role::Etcd, "v2", Utc::now()));
    });

    let mut run = ComponentRun::new(Role::Etcd, Vec::new(), Vec::new(), Utc::now());
    let accepted = verify(backend.as_ref(), &mut run, Role::Etcd, &fingerprint, 1, since, fast_timing())
        .await
        .expect("verification should succeed once discovery finds the late candidate");

    assert_eq!(accepted.len(), 1);
}

#[tokio::test]
async fn succeeds_once_a_candidate_becomes_healthy_during_health_polling() {
    let since = Utc::now() - chrono::Duration::seconds(10);
    let fingerprint = Fingerprint::from("v2");
    let id = roller_model::InstanceId::from("i-new-1");
    let backend =
        std::sync::Arc::new(FakeComputeBackend::new().with_instance(instance(
            "i-new-1",
            "asg-a",
            Role::K8sMaster,
            "v2",
            Utc::now(),
        )));
    backend.mark_not_ready(&id);

    let spawn_backend = backend.clone();
    let spawn_id = id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        spawn_backend.mark_ready(&spawn_id);
    });

    let mut run = ComponentRun::new(Role::K8sMaster, Vec::new(), Vec::new(), Utc::now());
    let accepted = verify(
        backend.as_ref(),
        &mut run,
        Role::K8sMaster,
        &fingerprint,
        1,
        since,
        fast_timing(),
    )
    .await
    .expect("verification should succeed once the candidate becomes healthy");

    assert_eq!(accepted.into_iter().next().unwrap(), id);
}

#[tokio::test]
async fn aborts_outright_when_failure_ratio_exceeds_threshold_for_large_n() {
    let since = Utc::now();
    let fingerprint = Fingerprint::from("v2");
    // expected = 4, nothing ever appears: k = 4, ratio = 1.0 > VERIFIER_FAILURE_RATIO_THRESHOLD.
    let backend = FakeComputeBackend::new();

    let mut run = ComponentRun::new(Role::K8sNode, Vec::new(), Vec::new(), Utc::now());
    let result = verify(&backend, &mut run, Role::K8sNode, &fingerprint, 4, since, fast_timing()).await;

    assert!(result.is_err());
    assert_eq!(run.verifier_attempts, 0, "an outright abort never consumes a retry attempt");
}

#[tokio::test]
async fn aborts_for_small_n_when_more_than_one_candidate_fails() {
    let since = Utc::now();
    let fingerprint = Fingerprint::from("v2");
    // expected = 2, nothing appears: k = 2 > 1, so the small-N absolute-count rule aborts even
    // though the ratio rule (0.25) would also trigger here.
    let backend = FakeComputeBackend::new();

    let mut run = ComponentRun::new(Role::Etcd, Vec::new(), Vec::new(), Utc::now());
    let result = verify(&backend, &mut run, Role::Etcd, &fingerprint, 2, since, fast_timing()).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn retries_then_exhausts_for_small_n_when_a_single_candidate_never_appears() {
    let since = Utc::now();
    let fingerprint = Fingerprint::from("v2");
    // expected = 1, nothing ever appears: k = 1, which does not cross the small-N abort
    // threshold (k > 1), so the verifier retries until VERIFIER_MAX_ATTEMPTS is reached.
    let backend = FakeComputeBackend::new();

    let mut run = ComponentRun::new(Role::Etcd, Vec::new(), Vec::new(), Utc::now());
    let result = verify(&backend, &mut run, Role::Etcd, &fingerprint, 1, since, fast_timing()).await;

    assert!(result.is_err());
    assert_eq!(
        run.verifier_attempts,
        roller_model::constants::VERIFIER_MAX_ATTEMPTS
    );
}

#[tokio::test]
async fn expected_zero_accepts_trivially() {
    let since = Utc::now();
    let fingerprint = Fingerprint::from("v2");
    let backend = FakeComputeBackend::new();

    let mut run = ComponentRun::new(Role::Etcd, Vec::new(), Vec::new(), Utc::now());
    let accepted = verify(&backend, &mut run, Role::Etcd, &fingerprint, 0, since, fast_timing())
        .await
        .unwrap();

    assert!(accepted.is_empty());
}
