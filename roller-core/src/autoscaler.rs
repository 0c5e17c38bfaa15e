/*!

Brackets a worker roll by scaling the cluster-autoscaler deployment to zero replicas before any
strategy runs, and restoring it afterward. A failure to disable it merely disables the feature for
this run (it is simply left alone and the roll proceeds); a failure to re-enable it is recorded and
surfaces in the final report, but neither failure is fatal to the roll itself.

The state flag is named for what it actually means rather than for the action that set it:
`disabled` is true iff the scale-to-zero call was accepted, which is also exactly when a matching
scale-back-up is owed.

!*/

use crate::backend::OrchestratorBackend;
use log::{error, info};
use roller_model::constants::{
    AUTOSCALER_DEPLOYMENT, AUTOSCALER_DISABLED_REPLICAS, AUTOSCALER_ENABLED_REPLICAS,
    AUTOSCALER_NAMESPACE,
};
use roller_model::{ComponentStatus, RollerError};

/// The autoscaler sub-state tracked on `RollerState`.
#[derive(Clone, Debug)]
pub struct AutoscalerState {
    /// Whether this run is managing the autoscaler at all (only true when workers are in scope).
    pub managed: bool,
    /// True iff the scale-to-zero call succeeded, meaning a scale-back-up is owed.
    pub disabled: bool,
    pub status: ComponentStatus,
    pub error: Option<String>,
}

impl AutoscalerState {
    pub fn unmanaged() -> Self {
        Self {
            managed: false,
            disabled: false,
            status: ComponentStatus::Success,
            error: None,
        }
    }
}

/// Scale the cluster-autoscaler deployment to zero before any worker strategy runs. A failure
/// here is logged and recorded but does not abort the roll.
pub async fn disable<O: OrchestratorBackend + ?Sized>(orchestrator: &O) -> AutoscalerState {
    info!(
        "Disabling cluster-autoscaler ('{}/{}') before rolling workers",
        AUTOSCALER_NAMESPACE, AUTOSCALER_DEPLOYMENT
    );
    match orchestrator
        .scale_deployment(
            AUTOSCALER_NAMESPACE,
            AUTOSCALER_DEPLOYMENT,
            AUTOSCALER_DISABLED_REPLICAS,
        )
        .await
    {
        Ok(()) => AutoscalerState {
            managed: true,
            disabled: true,
            status: ComponentStatus::Success,
            error: None,
        },
        Err(e) => {
            let message = RollerError::Autoscaler {
                message: format!("Unable to disable cluster-autoscaler: {}", e),
            }
            .to_string();
            error!("{}", message);
            AutoscalerState {
                managed: true,
                disabled: false,
                status: ComponentStatus::Failure,
                error: Some(message),
            }
        }
    }
}

/// Restore the cluster-autoscaler to one replica, iff `state.disabled` (i.e. we owe a
/// scale-back-up). Runs after every worker strategy has finished, regardless of their outcomes.
pub async fn enable<O: OrchestratorBackend + ?Sized>(orchestrator: &O, state: &mut AutoscalerState) {
    if !state.disabled {
        return;
    }
    info!(
        "Re-enabling cluster-autoscaler ('{}/{}') after rolling workers",
        AUTOSCALER_NAMESPACE, AUTOSCALER_DEPLOYMENT
    );
    if let Err(e) = orchestrator
        .scale_deployment(
            AUTOSCALER_NAMESPACE,
            AUTOSCALER_DEPLOYMENT,
            AUTOSCALER_ENABLED_REPLICAS,
        )
        .await
    {
        let message = RollerError::Autoscaler {
            message: format!("Unable to re-enable cluster-autoscaler: {}", e),
        }
        .to_string();
        error!("{}", message);
        state.status = ComponentStatus::Failure;
        state.error = Some(message);
    }
}
