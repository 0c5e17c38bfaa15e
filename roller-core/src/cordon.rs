/*!

Cordoning marks a scheduler node unschedulable so the Kubernetes scheduler stops placing new work
on it; no eviction of already-running pods happens here. Used by the provision-then-terminate
strategy right before old worker instances are terminated.

!*/

use crate::backend::{Node, OrchestratorBackend};
use log::warn;
use roller_model::{constants::LABEL_INSTANCE_ID, InstanceId};
use std::collections::{HashMap, HashSet};

/// Cordon every node whose `instance-id` label matches one of `instance_ids`. Returns a map of
/// node name to error message for every node that could not be cordoned; an empty map means every
/// matching node was successfully cordoned.
pub async fn cordon_instances<O: OrchestratorBackend + ?Sized>(
    orchestrator: &O,
    instance_ids: &[InstanceId],
) -> HashMap<String, String> {
    let mut failures = HashMap::new();
    let wanted: HashSet<&str> = instance_ids.iter().map(|id| id.0.as_str()).collect();

    let nodes = match orchestrator.nodes_by_label(LABEL_INSTANCE_ID).await {
        Ok(nodes) => nodes,
        Err(e) => {
            let message = format!("Unable to list nodes by label '{}': {}", LABEL_INSTANCE_ID, e);
            warn!("{}", message);
            for id in instance_ids {
                failures.insert(id.to_string(), message.clone());
            }
            return failures;
        }
    };

    for mut node in nodes {
        let matches = node
            .instance_id
            .as_ref()
            .map(|id| wanted.contains(id.0.as_str()))
            .unwrap_or(false);
        if !matches {
            continue;
        }

        node.unschedulable = true;
        match orchestrator.update_node(&node).await {
            Ok(updated) if updated.unschedulable => {}
            Ok(_) => {
                failures.insert(
                    node.name.clone(),
                    "node update accepted but node is not reflected as unschedulable".to_string(),
                );
            }
            Err(e) => {
                failures.insert(node.name.clone(), format!("update failed: {}", e));
            }
        }
    }

    failures
}
