use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// An opaque version identifier tagging every instance, denoting the configuration-management
/// revision it was provisioned with. Two fingerprints are equal iff the underlying strings are
/// equal; the engine never interprets the contents.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<S: Into<String>> From<S> for Fingerprint {
    fn from(s: S) -> Self {
        Self(s.into())
    }
}

/// A cloud instance id, e.g. `i-0123456789abcdef0`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl Display for InstanceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<S: Into<String>> From<S> for InstanceId {
    fn from(s: S) -> Self {
        Self(s.into())
    }
}

/// The name of an Auto Scaling group.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AsgName(pub String);

impl Display for AsgName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<S: Into<String>> From<S> for AsgName {
    fn from(s: S) -> Self {
        Self(s.into())
    }
}

/// One of the three node roles the engine knows how to roll.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Role {
    Etcd,
    K8sMaster,
    K8sNode,
}

impl Role {
    /// The value of the `ServiceComponent` tag that identifies members of this role.
    pub fn tag_value(&self) -> &'static str {
        match self {
            Role::Etcd => "etcd",
            Role::K8sMaster => "k8s-master",
            Role::K8sNode => "k8s-node",
        }
    }

    pub fn all() -> [Role; 3] {
        [Role::Etcd, Role::K8sMaster, Role::K8sNode]
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self.tag_value(), f)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "etcd" => Ok(Role::Etcd),
            "k8s-master" => Ok(Role::K8sMaster),
            "k8s-node" => Ok(Role::K8sNode),
            other => Err(format!(
                "unknown role '{}', expected one of: etcd, k8s-master, k8s-node",
                other
            )),
        }
    }
}

/// The lifecycle state a cloud instance can be observed in.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum InstanceLifecycleState {
    Pending,
    Running,
    Terminating,
    Terminated,
    Other,
}

/// The Auto Scaling group processes the engine suspends and resumes around destructive work.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ScalingProcess {
    AzRebalance,
    Launch,
    Terminate,
}

impl ScalingProcess {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalingProcess::AzRebalance => "AZRebalance",
            ScalingProcess::Launch => "Launch",
            ScalingProcess::Terminate => "Terminate",
        }
    }
}

impl Display for ScalingProcess {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self.as_str(), f)
    }
}

/// A cloud VM, as seen by `ComputeBackend`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub launch_time: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
    pub asg: Option<AsgName>,
    pub lifecycle_state: InstanceLifecycleState,
}

impl Instance {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(|s| s.as_str())
    }
}

/// A named Auto Scaling group and the counts the engine cares about.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Asg {
    pub name: AsgName,
    pub desired_count: i32,
    pub current_count: i32,
}

/// The outcome of a single component's rolling-replacement attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ComponentStatus {
    Pending,
    Success,
    Failure,
}

/// The per-role lifecycle record described in the data model: the initial roster, the ASGs
/// derived from it, timing, and the terminal outcome. A `ComponentRun` never removes instances
/// from its initial roster and transitions to success/failure exactly once.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentRun {
    pub role: Role,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: ComponentStatus,
    /// The initial roster of instances belonging to this role, fixed at construction time.
    pub instances: Vec<Instance>,
    pub asgs: Vec<AsgName>,
    pub error: Option<String>,
    /// Number of times `ReplacementVerifier` has been entered for this component.
    pub verifier_attempts: u32,
}

impl ComponentRun {
    pub fn new(role: Role, instances: Vec<Instance>, asgs: Vec<AsgName>, now: DateTime<Utc>) -> Self {
        Self {
            role,
            started_at: now,
            finished_at: None,
            status: ComponentStatus::Pending,
            instances,
            asgs,
            error: None,
            verifier_attempts: 0,
        }
    }

    pub fn succeed(&mut self, now: DateTime<Utc>) {
        self.status = ComponentStatus::Success;
        self.finished_at = Some(now);
    }

    pub fn fail(&mut self, now: DateTime<Utc>, message: impl Into<String>) {
        self.status = ComponentStatus::Failure;
        self.finished_at = Some(now);
        self.error = Some(message.into());
    }
}

/// The immutable snapshot of out-of-date instances computed once at run start. Later instance
/// discoveries (replacements found by the verifier) are never added to this snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Inventory {
    pub cluster: String,
    pub target_fingerprint: Fingerprint,
    pub instances: Vec<Instance>,
}

impl Inventory {
    pub fn new(cluster: String, target_fingerprint: Fingerprint, instances: Vec<Instance>) -> Self {
        Self {
            cluster,
            target_fingerprint,
            instances,
        }
    }

    /// The subset of the inventory whose `ServiceComponent` tag matches `role`, in the order the
    /// backend returned them (roster order, preserved throughout processing).
    pub fn instances_for_role(&self, role: Role) -> Vec<Instance> {
        self.instances
            .iter()
            .filter(|i| i.tag(crate::constants::TAG_COMPONENT) == Some(role.tag_value()))
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
