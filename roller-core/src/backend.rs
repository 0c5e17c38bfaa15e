/*!

The capability traits the engine is built against. `ComputeBackend` and `OrchestratorBackend`
stand in for the cloud provider's compute/autoscaling APIs and the Kubernetes API, respectively;
`Notifier` stands in for the outbound status channel. `roller-core` never talks to AWS or
Kubernetes directly — it only ever calls through these traits, which is what makes the strategies
and the verifier unit-testable without any live infrastructure.

Concrete implementations live in sibling crates (`roller-aws`, `roller-k8s`, `roller-notify`);
tests in this crate use hand-written or `mockall`-generated fakes.

!*/

use roller_model::{Asg, AsgName, Fingerprint, Instance, InstanceId, Role, ScalingProcess};
use std::collections::HashSet;

/// Filters describing which instances a `ComputeBackend::describe_instances` call should return.
/// All filters are ANDed together, matching the "filters; include tag equality and lifecycle
/// state" contract.
#[derive(Clone, Debug, Default)]
pub struct InstanceFilter {
    pub tag_equals: Vec<(String, String)>,
    pub running_only: bool,
}

impl InstanceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tag_equals.push((key.into(), value.into()));
        self
    }

    pub fn running_only(mut self) -> Self {
        self.running_only = true;
        self
    }
}

/// Whether to suspend or resume an Auto Scaling group's scaling processes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProcessAction {
    Suspend,
    Resume,
}

/// A plain string error carried by a failed backend call. The strategies decide how to
/// classify/wrap this (operational, preflight, convergence, ...); the backend itself only reports
/// that the call failed and why.
pub type BackendError = String;
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Describe/terminate instances, and describe/modify Auto Scaling groups. All calls can fail
/// transiently; the backend does not retry on its own — retry, where it exists, is a
/// strategy-level concern.
#[async_trait::async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Return all instances matching every filter.
    async fn describe_instances(&self, filters: &InstanceFilter) -> BackendResult<Vec<Instance>>;

    /// Return the subset of `pool` whose tag `key` equals `value`.
    fn instances_matching_tag_value<'a>(
        &self,
        key: &str,
        value: &str,
        pool: &'a [Instance],
    ) -> Vec<&'a Instance> {
        pool.iter()
            .filter(|i| i.tag(key) == Some(value))
            .collect()
    }

    /// Return the distinct values of tag `key` across `instances`.
    fn unique_tag_values(&self, key: &str, instances: &[Instance]) -> HashSet<String> {
        instances.iter().filter_map(|i| i.tag(key).map(String::from)).collect()
    }

    /// Request termination of `id`. Returns once the request is accepted, not once the instance
    /// has actually terminated.
    async fn terminate_instance(&self, id: &InstanceId) -> BackendResult<()>;

    /// The core query backing `Inventory`: instances matching `filters` whose fingerprint tag is
    /// not equal to `fingerprint`.
    async fn describe_instances_not_matching_fingerprint(
        &self,
        filters: &InstanceFilter,
        fingerprint: &Fingerprint,
    ) -> BackendResult<Vec<Instance>>;

    /// Instances matching `filters` whose fingerprint tag equals `fingerprint` and whose launch
    /// time is at or after `since`. Used by the verifier to find replacement candidates.
    async fn describe_instances_matching_fingerprint_since(
        &self,
        filters: &InstanceFilter,
        fingerprint: &Fingerprint,
        since: chrono::DateTime<chrono::Utc>,
    ) -> BackendResult<Vec<Instance>>;

    /// Whether `id` has reached a "ready" health state. Used by the verifier for per-candidate
    /// health checks.
    async fn instance_is_ready(&self, id: &InstanceId) -> BackendResult<bool>;

    async fn asg_desired_count(&self, name: &AsgName) -> BackendResult<i32>;

    async fn asg_instance_count(&self, name: &AsgName) -> BackendResult<i32>;

    async fn asg_set_desired_count(&self, name: &AsgName, desired: i32) -> BackendResult<()>;

    /// Suspend or resume the named scaling processes on an ASG. Idempotent: resuming a
    /// non-suspended process is a no-op.
    async fn asg_manage_processes(
        &self,
        name: &AsgName,
        processes: &[ScalingProcess],
        action: ProcessAction,
    ) -> BackendResult<()>;

    async fn describe_asg(&self, name: &AsgName) -> BackendResult<Asg>;
}

/// A Kubernetes scheduler node, as reported by `OrchestratorBackend::nodes_by_label`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    pub name: String,
    pub instance_id: Option<InstanceId>,
    pub unschedulable: bool,
}

/// List/patch Kubernetes nodes and scale a named deployment's replicas.
#[async_trait::async_trait]
pub trait OrchestratorBackend: Send + Sync {
    async fn nodes_by_label(&self, label_key: &str) -> BackendResult<Vec<Node>>;

    /// Write back a modified node. Returns the server-accepted result.
    async fn update_node(&self, node: &Node) -> BackendResult<Node>;

    /// Set a deployment's replica count. Returns once the API has accepted the change.
    async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> BackendResult<()>;
}

/// The outbound status-notification channel, e.g. a chat webhook.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> BackendResult<()>;
}

/// Convenience re-export so downstream crates matching on roles don't need to depend on
/// `roller-model` just for this.
pub type RoleSet = HashSet<Role>;
