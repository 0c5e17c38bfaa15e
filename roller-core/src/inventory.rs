/*!

Builds the run's `Inventory`: the immutable snapshot of instances that belong to the target
cluster, are currently `running`, and whose fingerprint tag does not match the target
fingerprint. An empty inventory is not an error — it simply means every component has nothing to
do.

!*/

use crate::backend::{ComputeBackend, InstanceFilter};
use log::info;
use roller_model::{constants::TAG_CLUSTER, Fingerprint, Inventory, RollerError, RollerResult};

/// Build the `Inventory` for `cluster`, relative to `target_fingerprint`. This is called exactly
/// once per run, before any `RollingStrategy` is spawned.
pub async fn build_inventory<B: ComputeBackend + ?Sized>(
    backend: &B,
    cluster: &str,
    target_fingerprint: &Fingerprint,
) -> RollerResult<Inventory> {
    let filters = InstanceFilter::new()
        .with_tag(TAG_CLUSTER, cluster)
        .running_only();

    let instances = backend
        .describe_instances_not_matching_fingerprint(&filters, target_fingerprint)
        .await
        .map_err(|e| RollerError::Inventory {
            cluster: cluster.to_string(),
            message: e,
        })?;

    info!(
        "Inventory for cluster '{}' (target fingerprint '{}'): {} instance(s) out of date",
        cluster,
        target_fingerprint,
        instances.len()
    );

    Ok(Inventory::new(
        cluster.to_string(),
        target_fingerprint.clone(),
        instances,
    ))
}
