/*!

Reads the engine's configuration from the container environment, the way `BootstrapData::from_env`
reads a resource agent's environment: one `std::env::var` call per key, each wrapped in a
`ConfigError::EnvRead` on failure.

!*/

use log::LevelFilter;
use roller_model::error::ConfigError;
use roller_model::{Fingerprint, Role};
use snafu::{OptionExt, ResultExt};
use std::collections::HashSet;
use std::time::Duration;

const ENV_CLUSTER: &str = "CLUSTER";
const ENV_AWS_ACCOUNT: &str = "AWS_ACCOUNT";
const ENV_AWS_PROFILE: &str = "AWS_PROFILE";
const ENV_AWS_REGION: &str = "AWS_REGION";
const ENV_ANSIBLE_VERSION: &str = "ANSIBLE_VERSION";
const ENV_KUBERNETES_SERVER: &str = "KUBERNETES_SERVER";
const ENV_KUBERNETES_USERNAME: &str = "KUBERNETES_USERNAME";
const ENV_KUBERNETES_PASSWORD: &str = "KUBERNETES_PASSWORD";
const ENV_SLACK_WEBHOOK: &str = "SLACK_WEBHOOK";
const ENV_ROLLER_COMPONENTS: &str = "ROLLER_COMPONENTS";
const ENV_ROLLER_LOG_LEVEL: &str = "ROLLER_LOG_LEVEL";
const ENV_TERMINATION_WAIT_PERIOD_SECONDS: &str = "TERMINATION_WAIT_PERIOD_SECONDS";

/// AWS credentials, identified by account alias or named profile (`AWS_ACCOUNT`/`AWS_PROFILE`,
/// at least one of which is required).
#[derive(Clone, Debug)]
pub enum AwsIdentity {
    Account(String),
    Profile(String),
}

#[derive(Clone, Debug)]
pub struct KubernetesEndpoint {
    pub server: String,
    pub username: String,
    pub password: String,
}

/// Everything read from the environment, before CLI flags are layered on top in `main`.
#[derive(Clone, Debug)]
pub struct RollerConfig {
    pub cluster: String,
    pub aws_identity: AwsIdentity,
    pub aws_region: String,
    pub target_fingerprint: Fingerprint,
    pub kubernetes: KubernetesEndpoint,
    pub slack_webhook: Option<String>,
    pub components: HashSet<Role>,
    pub log_level: LevelFilter,
    pub termination_wait: Duration,
}

impl RollerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let cluster = read_var(ENV_CLUSTER)?;

        let aws_identity = match (read_var_opt(ENV_AWS_ACCOUNT)?, read_var_opt(ENV_AWS_PROFILE)?) {
            (Some(account), _) => AwsIdentity::Account(account),
            (None, Some(profile)) => AwsIdentity::Profile(profile),
            (None, None) => {
                return Err(ConfigError::Missing {
                    what: format!("one of {}/{}", ENV_AWS_ACCOUNT, ENV_AWS_PROFILE),
                })
            }
        };

        let aws_region = read_var(ENV_AWS_REGION)?;
        let target_fingerprint = Fingerprint::from(read_var(ENV_ANSIBLE_VERSION)?);

        let kubernetes = KubernetesEndpoint {
            server: read_var(ENV_KUBERNETES_SERVER)?,
            username: read_var(ENV_KUBERNETES_USERNAME)?,
            password: read_var(ENV_KUBERNETES_PASSWORD)?,
        };

        let slack_webhook = read_var_opt(ENV_SLACK_WEBHOOK)?;

        let components = match read_var_opt(ENV_ROLLER_COMPONENTS)? {
            Some(raw) => parse_components(&raw)?,
            None => Role::all().into_iter().collect(),
        };

        let log_level = match read_var_opt(ENV_ROLLER_LOG_LEVEL)? {
            Some(raw) => parse_log_verbosity(&raw)?,
            None => LevelFilter::Info,
        };

        let termination_wait = match read_var_opt(ENV_TERMINATION_WAIT_PERIOD_SECONDS)? {
            Some(raw) => {
                let seconds = raw.parse::<u64>().ok().context(roller_model::error::InvalidSnafu {
                    key: ENV_TERMINATION_WAIT_PERIOD_SECONDS,
                    message: format!("'{}' is not a non-negative integer", raw),
                })?;
                Duration::from_secs(seconds)
            }
            None => Duration::from_secs(roller_model::constants::DEFAULT_TERMINATION_WAIT_SECONDS),
        };

        Ok(Self {
            cluster,
            aws_identity,
            aws_region,
            target_fingerprint,
            kubernetes,
            slack_webhook,
            components,
            log_level,
            termination_wait,
        })
    }
}

fn read_var(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).context(roller_model::error::EnvReadSnafu { key })
}

fn read_var_opt(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(ConfigError::EnvRead {
            key: key.to_string(),
            source,
        }),
    }
}

fn parse_components(raw: &str) -> Result<HashSet<Role>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Role>().map_err(|message| ConfigError::Invalid {
                key: ENV_ROLLER_COMPONENTS.to_string(),
                message,
            })
        })
        .collect()
}

fn parse_log_verbosity(raw: &str) -> Result<LevelFilter, ConfigError> {
    match raw.parse::<u8>() {
        Ok(0) => Ok(LevelFilter::Error),
        Ok(1) => Ok(LevelFilter::Warn),
        Ok(2) => Ok(LevelFilter::Info),
        Ok(3) => Ok(LevelFilter::Debug),
        Ok(_) => Ok(LevelFilter::Trace),
        Err(_) => Err(ConfigError::Invalid {
            key: ENV_ROLLER_LOG_LEVEL.to_string(),
            message: format!("'{}' is not an integer verbosity level", raw),
        }),
    }
}

#[test]
fn parse_components_accepts_a_comma_separated_list_with_incidental_whitespace() {
    let components = parse_components(" etcd, k8s-master ,k8s-node").unwrap();
    assert_eq!(components.len(), 3);
    assert!(components.contains(&Role::Etcd));
    assert!(components.contains(&Role::K8sMaster));
    assert!(components.contains(&Role::K8sNode));
}

#[test]
fn parse_components_rejects_an_unknown_role() {
    assert!(parse_components("etcd,not-a-role").is_err());
}

#[test]
fn parse_log_verbosity_maps_the_documented_integer_scale() {
    assert_eq!(parse_log_verbosity("0").unwrap(), LevelFilter::Error);
    assert_eq!(parse_log_verbosity("2").unwrap(), LevelFilter::Info);
    assert_eq!(parse_log_verbosity("9").unwrap(), LevelFilter::Trace);
}

#[test]
fn parse_log_verbosity_rejects_non_numeric_input() {
    assert!(parse_log_verbosity("verbose").is_err());
}
