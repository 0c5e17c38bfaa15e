/*!

Tag and label names that form the contract between the engine and the cloud/cluster it operates
on. These are referenced from `roller-core`, `roller-aws`, and `roller-k8s` alike, so they live in
one place rather than being re-typed as string literals at every call site.

!*/

/// Tag used to filter instances down to a single cluster.
pub const TAG_CLUSTER: &str = "KubernetesCluster";

/// Tag used to partition a cluster's instances into etcd/master/worker roles.
pub const TAG_COMPONENT: &str = "ServiceComponent";

/// Tag recording the Auto Scaling group an instance belongs to.
pub const TAG_ASG_NAME: &str = "aws:autoscaling:groupName";

/// Tag recording the configuration-management revision an instance was provisioned with.
pub const TAG_FINGERPRINT: &str = "aws:ec2launchtemplate:version";

/// Tag carrying the etcd liveness flag. Only meaningful for the `etcd` role.
pub const TAG_HEALTHY: &str = "healthy";

/// Value of [`TAG_HEALTHY`] indicating an etcd member is healthy.
pub const HEALTHY_VALUE: &str = "True";

/// Kubernetes node label carrying the node's cloud instance id.
pub const LABEL_INSTANCE_ID: &str = "instance-id";

/// Namespace the cluster-autoscaler deployment lives in.
pub const AUTOSCALER_NAMESPACE: &str = "kube-system";

/// Name of the cluster-autoscaler deployment.
pub const AUTOSCALER_DEPLOYMENT: &str = "cluster-autoscaler";

/// Replica count the autoscaler is scaled to while a worker roll is in progress.
pub const AUTOSCALER_DISABLED_REPLICAS: i32 = 0;

/// Replica count the autoscaler is restored to once the roll finishes.
pub const AUTOSCALER_ENABLED_REPLICAS: i32 = 1;

/// Default grace period between sequential terminations in the provision-then-terminate variant.
pub const DEFAULT_TERMINATION_WAIT_SECONDS: u64 = 180;

/// Grace period observed between sequential terminations of failed verifier candidates.
pub const VERIFIER_TERMINATION_GRACE_SECONDS: u64 = 30;

/// Number of polls performed while waiting for an ASG to converge back to its desired count.
pub const CONVERGENCE_POLL_ATTEMPTS: u32 = 30;

/// Delay between convergence polls.
pub const CONVERGENCE_POLL_INTERVAL_SECONDS: u64 = 30;

/// Failure-ratio threshold above which the verifier aborts rather than retries, for N > 2.
pub const VERIFIER_FAILURE_RATIO_THRESHOLD: f64 = 0.25;

/// Maximum number of verifier attempts per `ComponentRun` before it is considered exhausted.
pub const VERIFIER_MAX_ATTEMPTS: u32 = 2;

/// Number of polls performed while waiting for N replacement candidates to appear.
pub const VERIFIER_DISCOVERY_POLL_ATTEMPTS: u32 = 30;

/// Delay between candidate-discovery polls.
pub const VERIFIER_DISCOVERY_POLL_INTERVAL_SECONDS: u64 = 30;

/// Number of polls performed while waiting for a single candidate to become healthy.
pub const VERIFIER_HEALTH_POLL_ATTEMPTS: u32 = 30;

/// Delay between per-candidate health polls.
pub const VERIFIER_HEALTH_POLL_INTERVAL_SECONDS: u64 = 30;

/// Default roller log level when `ROLLER_LOG_LEVEL`/`RUST_LOG` are both unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";
