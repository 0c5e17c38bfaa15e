/*!

The rolling-replacement engine: the per-component orchestration state machine that suspends the
right autoscaling activities, drives instance creation and termination in the right order at the
right scale, verifies replacements, cordons outgoing nodes, manages the cluster-autoscaler
sidecar, and reports a coherent outcome.

This crate never talks to AWS or Kubernetes directly; it is built entirely against the
`ComputeBackend`, `OrchestratorBackend`, and `Notifier` traits in [`backend`]. Concrete
implementations live in `roller-aws`, `roller-k8s`, and `roller-notify`.

!*/

pub mod autoscaler;
pub mod backend;
pub mod cordon;
pub mod inventory;
pub mod orchestrator;
pub mod strategy;
pub mod verifier;

pub use orchestrator::{Orchestrator, RollerState, RunConfig};
