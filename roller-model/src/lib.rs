/*!

The `roller-model` crate defines the data shared by every piece of the rolling-replacement
engine: the cloud/cluster identifiers, the per-component run record, the inventory snapshot, and
the error enum that every other crate in the workspace funnels its failures into.

None of these types do any I/O; they are plain data, passed by value between the orchestration
logic and the backend traits it is built against.

!*/

pub mod constants;
pub mod error;
mod types;

pub use error::{RollerError, RollerResult};
pub use types::{
    Asg, AsgName, ComponentRun, ComponentStatus, Fingerprint, Instance, InstanceId,
    InstanceLifecycleState, Inventory, Role, ScalingProcess,
};
