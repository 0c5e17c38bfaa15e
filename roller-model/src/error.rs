/*!

The error kinds a rolling-replacement run can produce. Every kind maps onto one of the failure
categories in the engine's design: configuration and inventory errors are fatal before any side
effect occurs, while preflight/operational/verification/convergence errors are recorded on a single
`ComponentRun` and never propagate to its siblings. Autoscaler and notifier errors are never fatal;
they are recorded in the run's sub-state or simply logged.

!*/

use snafu::Snafu;

pub type RollerResult<T> = std::result::Result<T, RollerError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RollerError {
    /// Missing or unparsable configuration input. Fatal before any side effect.
    #[snafu(display("Configuration error: {}", source))]
    Config { source: ConfigError },

    /// A cloud lookup used to build the `Inventory` failed. Fatal before any side effect.
    #[snafu(display("Unable to build inventory for cluster '{}': {}", cluster, message))]
    Inventory { cluster: String, message: String },

    /// Preflight validation failed for a component (unhealthy etcd member, ASG desired/current
    /// mismatch, missing ASG tag). No mutation has happened yet.
    #[snafu(display("Preflight check failed for component '{}': {}", role, message))]
    Preflight { role: String, message: String },

    /// A cloud or orchestrator call failed while a strategy was running.
    #[snafu(display("Operation failed for component '{}': {}", role, message))]
    Operational { role: String, message: String },

    /// Replacement instances failed health checks and the retry budget was exhausted.
    #[snafu(display(
        "Verification failed for component '{}' after {} attempt(s): {}",
        role,
        attempts,
        message
    ))]
    Verification {
        role: String,
        attempts: u32,
        message: String,
    },

    /// An ASG did not converge back to its desired instance count within the poll budget.
    #[snafu(display(
        "ASG '{}' for component '{}' did not converge to {} instances within the poll budget; \
         desired count may remain inflated",
        asg,
        role,
        expected
    ))]
    Convergence {
        role: String,
        asg: String,
        expected: i32,
    },

    /// Scaling the cluster-autoscaler deployment failed. Never fatal to the overall run.
    #[snafu(display("Autoscaler error: {}", message))]
    Autoscaler { message: String },

    /// The outbound notification webhook could not be reached or rejected the request. Never
    /// alters the run's outcome.
    #[snafu(display("Notifier error: {}", message))]
    Notifier { message: String },
}

/// Errors that can occur while reading the engine's configuration from the environment and CLI.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("Unable to read environment variable '{}': {}", key, source))]
    EnvRead {
        key: String,
        source: std::env::VarError,
    },

    #[snafu(display("Missing required configuration: provide {}", what))]
    Missing { what: String },

    #[snafu(display("Invalid value for '{}': {}", key, message))]
    Invalid { key: String, message: String },
}

impl From<ConfigError> for RollerError {
    fn from(source: ConfigError) -> Self {
        RollerError::Config { source }
    }
}
