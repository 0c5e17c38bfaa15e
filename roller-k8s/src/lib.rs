/*!

`OrchestratorBackend` implemented against the Kubernetes API: cordoning nodes ahead of
termination, and scaling the cluster-autoscaler deployment down and back up around a worker roll.

!*/

pub mod error;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Node as K8sNode;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client};
use roller_core::backend::{BackendResult, Node, OrchestratorBackend};
use roller_model::constants::LABEL_INSTANCE_ID;
use roller_model::InstanceId;
use serde_json::json;
use snafu::ResultExt;

pub struct K8sOrchestratorBackend {
    client: Client,
}

impl K8sOrchestratorBackend {
    /// Build a client from `KUBECONFIG` or the in-cluster service account environment.
    pub async fn try_default() -> kube::Result<Self> {
        Ok(Self {
            client: Client::try_default().await?,
        })
    }

    /// Build a client against an explicit API server using HTTP basic auth, for clusters reached
    /// via `KUBERNETES_SERVER`/`KUBERNETES_USERNAME`/`KUBERNETES_PASSWORD` rather than a
    /// kubeconfig.
    pub async fn from_basic_auth(
        cluster_url: http::Uri,
        username: &str,
        password: &str,
    ) -> kube::Result<Self> {
        let mut config = kube::Config::new(cluster_url);
        config.auth_info.username = Some(username.to_string());
        config.auth_info.password = Some(password.to_string());

        Ok(Self {
            client: Client::try_from(config)?,
        })
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn nodes(&self) -> Api<K8sNode> {
        Api::all(self.client.clone())
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn to_model_node(node: K8sNode) -> Node {
    let name = node.metadata.name.unwrap_or_default();
    let instance_id = node
        .metadata
        .labels
        .unwrap_or_default()
        .get(LABEL_INSTANCE_ID)
        .cloned()
        .map(InstanceId::from);
    let unschedulable = node
        .spec
        .and_then(|spec| spec.unschedulable)
        .unwrap_or(false);

    Node {
        name,
        instance_id,
        unschedulable,
    }
}

#[async_trait]
impl OrchestratorBackend for K8sOrchestratorBackend {
    async fn nodes_by_label(&self, label_key: &str) -> BackendResult<Vec<Node>> {
        let list = self
            .nodes()
            .list(&ListParams::default().labels(label_key))
            .await
            .context(error::ListNodesSnafu {
                label_key: label_key.to_string(),
            })
            .map_err(|e| e.to_string())?;

        Ok(list.items.into_iter().map(to_model_node).collect())
    }

    async fn update_node(&self, node: &Node) -> BackendResult<Node> {
        let patch = json!({
            "spec": {
                "unschedulable": node.unschedulable,
            }
        });

        let updated = self
            .nodes()
            .patch(&node.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .context(error::PatchNodeSnafu {
                node_name: node.name.clone(),
            })
            .map_err(|e| e.to_string())?;

        Ok(to_model_node(updated))
    }

    async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> BackendResult<()> {
        let patch = json!({
            "spec": {
                "replicas": replicas,
            }
        });

        self.deployments(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .context(error::ScaleDeploymentSnafu {
                namespace: namespace.to_string(),
                name: name.to_string(),
                replicas,
            })
            .map_err(|e| e.to_string())?;

        Ok(())
    }
}
