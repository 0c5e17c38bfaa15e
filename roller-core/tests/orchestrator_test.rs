mod support;

use chrono::Utc;
use roller_core::backend::Node;
use roller_core::orchestrator::{Orchestrator, RunConfig};
use roller_model::constants::{TAG_CLUSTER, TAG_HEALTHY, HEALTHY_VALUE};
use roller_model::{Asg, AsgName, ComponentStatus, Fingerprint, Role};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use support::{instance, FakeComputeBackend, FakeNotifier, FakeOrchestratorBackend};

/// `support::instance` doesn't tag the cluster or etcd health, since most tests in this crate
/// never reach `build_inventory`/`prepare_component_run`. Add what's missing for an end-to-end run.
fn tag_for_inventory(mut i: roller_model::Instance, cluster: &str) -> roller_model::Instance {
    i.tags.insert(TAG_CLUSTER.to_string(), cluster.to_string());
    i
}

fn tag_healthy(mut i: roller_model::Instance) -> roller_model::Instance {
    i.tags.insert(TAG_HEALTHY.to_string(), HEALTHY_VALUE.to_string());
    i
}

fn roles(rs: &[Role]) -> HashSet<Role> {
    rs.iter().copied().collect()
}

#[tokio::test]
async fn dry_run_reports_success_without_any_mutating_calls() {
    let future = Utc::now() + chrono::Duration::hours(1);
    let old = tag_for_inventory(
        instance("i-old-1", "asg-etcd", Role::Etcd, "v1", Utc::now()),
        "prod",
    );
    let old = tag_healthy(old);

    let compute = Arc::new(
        FakeComputeBackend::new()
            .with_instance(old.clone())
            .with_instance(tag_for_inventory(
                instance("i-new-1", "asg-etcd", Role::Etcd, "v2", future),
                "prod",
            )),
    );
    let orchestrator_backend = Arc::new(FakeOrchestratorBackend::new());
    let notifier = Arc::new(FakeNotifier::new());

    let engine = Orchestrator::new(compute.clone(), orchestrator_backend.clone(), notifier.clone());
    let config = RunConfig {
        cluster: "prod".to_string(),
        target_fingerprint: Fingerprint::from("v2"),
        roles: roles(&[Role::Etcd]),
        termination_wait: Duration::from_millis(1),
        dry_run: true,
    };

    let state = engine.run(config).await.expect("dry run should not error");

    assert_eq!(state.overall_status(), ComponentStatus::Success);
    assert_eq!(state.component_runs.len(), 1);
    assert_eq!(state.component_runs[0].status, ComponentStatus::Success);
    assert!(compute.terminated_ids().is_empty());
    assert!(orchestrator_backend.scale_calls().is_empty());
    assert!(!state.autoscaler.managed);
    assert_eq!(notifier.messages().len(), 2, "start and summary notifications");
}

#[tokio::test]
async fn rolling_workers_brackets_the_run_with_an_autoscaler_disable_and_enable() {
    let old = tag_for_inventory(
        instance("i-old-1", "asg-workers", Role::K8sNode, "v1", Utc::now()),
        "prod",
    );
    let future = Utc::now() + chrono::Duration::hours(1);
    let compute = Arc::new(
        FakeComputeBackend::new()
            .with_instance(old.clone())
            .with_instance(tag_for_inventory(
                instance("i-new-1", "asg-workers", Role::K8sNode, "v2", future),
                "prod",
            ))
            .with_asg(Asg {
                name: AsgName::from("asg-workers"),
                desired_count: 1,
                current_count: 1,
            }),
    );
    let orchestrator_backend = Arc::new(FakeOrchestratorBackend::new().with_node(Node {
        name: "node-old-1".to_string(),
        instance_id: Some(old.id.clone()),
        unschedulable: false,
    }));
    let notifier = Arc::new(FakeNotifier::new());

    let engine = Orchestrator::new(compute.clone(), orchestrator_backend.clone(), notifier.clone());
    let config = RunConfig {
        cluster: "prod".to_string(),
        target_fingerprint: Fingerprint::from("v2"),
        roles: roles(&[Role::K8sNode]),
        termination_wait: Duration::from_millis(1),
        dry_run: false,
    };

    let state = engine.run(config).await.expect("run should not error");

    assert_eq!(state.overall_status(), ComponentStatus::Success, "{}", state.summary());
    assert!(state.autoscaler.managed);
    assert!(!state.autoscaler.disabled, "the scale-back-up should have been paid off by enable");
    assert_eq!(
        orchestrator_backend.scale_calls(),
        vec![
            (
                roller_model::constants::AUTOSCALER_NAMESPACE.to_string(),
                roller_model::constants::AUTOSCALER_DEPLOYMENT.to_string(),
                roller_model::constants::AUTOSCALER_DISABLED_REPLICAS,
            ),
            (
                roller_model::constants::AUTOSCALER_NAMESPACE.to_string(),
                roller_model::constants::AUTOSCALER_DEPLOYMENT.to_string(),
                roller_model::constants::AUTOSCALER_ENABLED_REPLICAS,
            ),
        ]
    );
}

#[tokio::test]
async fn a_failed_component_does_not_block_the_others_and_is_reflected_in_the_summary() {
    // The etcd instance is missing its healthy tag, so `prepare_component_run` rejects it
    // outright; the worker role in the same run still completes normally alongside it.
    let bad_etcd = tag_for_inventory(
        instance("i-old-etcd", "asg-etcd", Role::Etcd, "v1", Utc::now()),
        "prod",
    );
    let old_worker = tag_for_inventory(
        instance("i-old-worker", "asg-workers", Role::K8sNode, "v1", Utc::now()),
        "prod",
    );
    let future = Utc::now() + chrono::Duration::hours(1);

    let compute = Arc::new(
        FakeComputeBackend::new()
            .with_instance(bad_etcd.clone())
            .with_instance(old_worker.clone())
            .with_instance(tag_for_inventory(
                instance("i-new-worker", "asg-workers", Role::K8sNode, "v2", future),
                "prod",
            ))
            .with_asg(Asg {
                name: AsgName::from("asg-workers"),
                desired_count: 1,
                current_count: 1,
            }),
    );
    let orchestrator_backend = Arc::new(FakeOrchestratorBackend::new().with_node(Node {
        name: "node-old-worker".to_string(),
        instance_id: Some(old_worker.id.clone()),
        unschedulable: false,
    }));
    let notifier = Arc::new(FakeNotifier::new());

    let engine = Orchestrator::new(compute.clone(), orchestrator_backend.clone(), notifier.clone());
    let config = RunConfig {
        cluster: "prod".to_string(),
        target_fingerprint: Fingerprint::from("v2"),
        roles: roles(&[Role::Etcd, Role::K8sNode]),
        termination_wait: Duration::from_millis(1),
        dry_run: false,
    };

    let state = engine.run(config).await.expect("run should not error even with a failed component");

    assert_eq!(state.overall_status(), ComponentStatus::Failure);
    assert_eq!(state.component_runs.len(), 2);

    let etcd_run = state
        .component_runs
        .iter()
        .find(|r| r.role == Role::Etcd)
        .unwrap();
    assert_eq!(etcd_run.status, ComponentStatus::Failure);
    assert!(etcd_run.error.as_ref().unwrap().contains("healthy"));

    let worker_run = state
        .component_runs
        .iter()
        .find(|r| r.role == Role::K8sNode)
        .unwrap();
    assert_eq!(worker_run.status, ComponentStatus::Success, "{:?}", worker_run.error);

    // The summary is still a single coherent report naming both outcomes.
    assert!(state.summary().contains("Etcd"));
    assert!(state.summary().contains("K8sNode"));
}

#[tokio::test]
async fn notifies_at_the_start_and_end_of_every_run() {
    let compute = Arc::new(FakeComputeBackend::new());
    let orchestrator_backend = Arc::new(FakeOrchestratorBackend::new());
    let notifier = Arc::new(FakeNotifier::new());

    let engine = Orchestrator::new(compute, orchestrator_backend, notifier.clone());
    let config = RunConfig {
        cluster: "prod".to_string(),
        target_fingerprint: Fingerprint::from("v2"),
        roles: roles(&[]),
        termination_wait: Duration::from_millis(1),
        dry_run: false,
    };

    engine.run(config).await.expect("an empty role set still runs cleanly");

    let messages = notifier.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].contains("Starting"));
    assert!(messages[1].contains("Rolling replacement run"));
}
