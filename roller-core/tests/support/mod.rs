/*!

Hand-written fakes for `ComputeBackend`, `OrchestratorBackend`, and `Notifier`, standing in for a
real cloud/cluster in these integration tests. State lives behind a `Mutex` rather than a
`RwLock`: nothing here is ever held across an `.await` point, so contention is never a concern.

!*/

#![allow(dead_code)]

use async_trait::async_trait;
use roller_core::backend::{
    BackendResult, ComputeBackend, InstanceFilter, Node, Notifier, OrchestratorBackend,
    ProcessAction,
};
use roller_model::constants::TAG_ASG_NAME;
use roller_model::{Asg, AsgName, Fingerprint, Instance, InstanceId, ScalingProcess};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeComputeBackend {
    instances: Mutex<Vec<Instance>>,
    asgs: Mutex<HashMap<AsgName, Asg>>,
    not_ready: Mutex<HashSet<InstanceId>>,
    terminate_failures: Mutex<HashSet<InstanceId>>,
    terminated: Mutex<Vec<InstanceId>>,
    suspended: Mutex<HashMap<AsgName, HashSet<ScalingProcess>>>,
}

impl FakeComputeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance(self, instance: Instance) -> Self {
        self.instances.lock().unwrap().push(instance);
        self
    }

    pub fn with_asg(self, asg: Asg) -> Self {
        self.asgs.lock().unwrap().insert(asg.name.clone(), asg);
        self
    }

    /// Add a new instance to the pool, as if a replacement had just launched.
    pub fn push_instance(&self, instance: Instance) {
        self.instances.lock().unwrap().push(instance);
    }

    pub fn mark_not_ready(&self, id: &InstanceId) {
        self.not_ready.lock().unwrap().insert(id.clone());
    }

    pub fn mark_ready(&self, id: &InstanceId) {
        self.not_ready.lock().unwrap().remove(id);
    }

    pub fn fail_terminate(&self, id: &InstanceId) {
        self.terminate_failures.lock().unwrap().insert(id.clone());
    }

    pub fn terminated_ids(&self) -> Vec<InstanceId> {
        self.terminated.lock().unwrap().clone()
    }

    pub fn asg_snapshot(&self, name: &AsgName) -> Option<Asg> {
        self.asgs.lock().unwrap().get(name).cloned()
    }

    pub fn suspended_processes(&self, asg: &AsgName) -> HashSet<ScalingProcess> {
        self.suspended
            .lock()
            .unwrap()
            .get(asg)
            .cloned()
            .unwrap_or_default()
    }

    fn matches_filters(instance: &Instance, filters: &InstanceFilter) -> bool {
        if filters.running_only
            && instance.lifecycle_state != roller_model::InstanceLifecycleState::Running
        {
            return false;
        }
        filters
            .tag_equals
            .iter()
            .all(|(key, value)| instance.tag(key) == Some(value.as_str()))
    }
}

#[async_trait]
impl ComputeBackend for FakeComputeBackend {
    async fn describe_instances(&self, filters: &InstanceFilter) -> BackendResult<Vec<Instance>> {
        Ok(self
            .instances
            .lock()
            .unwrap()
            .iter()
            .filter(|i| Self::matches_filters(i, filters))
            .cloned()
            .collect())
    }

    async fn terminate_instance(&self, id: &InstanceId) -> BackendResult<()> {
        if self.terminate_failures.lock().unwrap().contains(id) {
            return Err(format!("fake: terminate_instance('{}') was configured to fail", id));
        }
        self.terminated.lock().unwrap().push(id.clone());
        let asg = {
            let mut instances = self.instances.lock().unwrap();
            let instance = instances.iter_mut().find(|i| &i.id == id);
            let asg = instance.as_ref().and_then(|i| i.asg.clone());
            if let Some(instance) = instance {
                instance.lifecycle_state = roller_model::InstanceLifecycleState::Terminated;
            }
            asg
        };
        if let Some(asg) = asg {
            if let Some(asg) = self.asgs.lock().unwrap().get_mut(&asg) {
                asg.current_count = (asg.current_count - 1).max(0);
            }
        }
        Ok(())
    }

    async fn describe_instances_not_matching_fingerprint(
        &self,
        filters: &InstanceFilter,
        fingerprint: &Fingerprint,
    ) -> BackendResult<Vec<Instance>> {
        Ok(self
            .instances
            .lock()
            .unwrap()
            .iter()
            .filter(|i| Self::matches_filters(i, filters))
            .filter(|i| i.tag(roller_model::constants::TAG_FINGERPRINT) != Some(fingerprint.0.as_str()))
            .cloned()
            .collect())
    }

    async fn describe_instances_matching_fingerprint_since(
        &self,
        filters: &InstanceFilter,
        fingerprint: &Fingerprint,
        since: chrono::DateTime<chrono::Utc>,
    ) -> BackendResult<Vec<Instance>> {
        Ok(self
            .instances
            .lock()
            .unwrap()
            .iter()
            .filter(|i| Self::matches_filters(i, filters))
            .filter(|i| i.tag(roller_model::constants::TAG_FINGERPRINT) == Some(fingerprint.0.as_str()))
            .filter(|i| i.launch_time >= since)
            .cloned()
            .collect())
    }

    async fn instance_is_ready(&self, id: &InstanceId) -> BackendResult<bool> {
        Ok(!self.not_ready.lock().unwrap().contains(id))
    }

    async fn asg_desired_count(&self, name: &AsgName) -> BackendResult<i32> {
        self.asgs
            .lock()
            .unwrap()
            .get(name)
            .map(|asg| asg.desired_count)
            .ok_or_else(|| format!("fake: no such ASG '{}'", name))
    }

    async fn asg_instance_count(&self, name: &AsgName) -> BackendResult<i32> {
        self.asgs
            .lock()
            .unwrap()
            .get(name)
            .map(|asg| asg.current_count)
            .ok_or_else(|| format!("fake: no such ASG '{}'", name))
    }

    async fn asg_set_desired_count(&self, name: &AsgName, desired: i32) -> BackendResult<()> {
        let mut asgs = self.asgs.lock().unwrap();
        let asg = asgs.get_mut(name).ok_or_else(|| format!("fake: no such ASG '{}'", name))?;
        asg.desired_count = desired;
        asg.current_count = desired;
        Ok(())
    }

    async fn asg_manage_processes(
        &self,
        name: &AsgName,
        processes: &[ScalingProcess],
        action: ProcessAction,
    ) -> BackendResult<()> {
        let mut suspended = self.suspended.lock().unwrap();
        let entry = suspended.entry(name.clone()).or_default();
        match action {
            ProcessAction::Suspend => entry.extend(processes.iter().copied()),
            ProcessAction::Resume => {
                for p in processes {
                    entry.remove(p);
                }
            }
        }
        Ok(())
    }

    async fn describe_asg(&self, name: &AsgName) -> BackendResult<Asg> {
        self.asgs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| format!("fake: no such ASG '{}'", name))
    }
}

#[derive(Default)]
pub struct FakeOrchestratorBackend {
    nodes: Mutex<Vec<Node>>,
    list_failure: Mutex<bool>,
    scale_failure: Mutex<bool>,
    update_failures: Mutex<HashSet<String>>,
    scale_calls: Mutex<Vec<(String, String, i32)>>,
}

impl FakeOrchestratorBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(self, node: Node) -> Self {
        self.nodes.lock().unwrap().push(node);
        self
    }

    pub fn fail_list(&self) {
        *self.list_failure.lock().unwrap() = true;
    }

    pub fn fail_scale(&self) {
        *self.scale_failure.lock().unwrap() = true;
    }

    /// Make `update_node` fail for the named node, as if the API had rejected the patch.
    pub fn fail_update(&self, node_name: &str) {
        self.update_failures.lock().unwrap().insert(node_name.to_string());
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        self.nodes.lock().unwrap().iter().find(|n| n.name == name).cloned()
    }

    pub fn scale_calls(&self) -> Vec<(String, String, i32)> {
        self.scale_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrchestratorBackend for FakeOrchestratorBackend {
    async fn nodes_by_label(&self, _label_key: &str) -> BackendResult<Vec<Node>> {
        if *self.list_failure.lock().unwrap() {
            return Err("fake: nodes_by_label was configured to fail".to_string());
        }
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn update_node(&self, node: &Node) -> BackendResult<Node> {
        if self.update_failures.lock().unwrap().contains(&node.name) {
            return Err(format!("fake: update_node('{}') was configured to fail", node.name));
        }
        let mut nodes = self.nodes.lock().unwrap();
        let existing = nodes
            .iter_mut()
            .find(|n| n.name == node.name)
            .ok_or_else(|| format!("fake: no such node '{}'", node.name))?;
        existing.unschedulable = node.unschedulable;
        Ok(existing.clone())
    }

    async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> BackendResult<()> {
        self.scale_calls
            .lock()
            .unwrap()
            .push((namespace.to_string(), name.to_string(), replicas));
        if *self.scale_failure.lock().unwrap() {
            return Err("fake: scale_deployment was configured to fail".to_string());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, text: &str) -> BackendResult<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Build an `Instance` with the given id, asg, role, and fingerprint tags already set.
pub fn instance(
    id: &str,
    asg: &str,
    role: roller_model::Role,
    fingerprint: &str,
    launch_time: chrono::DateTime<chrono::Utc>,
) -> Instance {
    let mut tags = std::collections::BTreeMap::new();
    tags.insert(TAG_ASG_NAME.to_string(), asg.to_string());
    tags.insert(
        roller_model::constants::TAG_COMPONENT.to_string(),
        role.tag_value().to_string(),
    );
    tags.insert(
        roller_model::constants::TAG_FINGERPRINT.to_string(),
        fingerprint.to_string(),
    );
    Instance {
        id: InstanceId::from(id),
        launch_time,
        tags,
        asg: Some(AsgName::from(asg)),
        lifecycle_state: roller_model::InstanceLifecycleState::Running,
    }
}
