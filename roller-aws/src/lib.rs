/*!

`ComputeBackend` implemented against EC2 (instance lifecycle) and Auto Scaling (group state and
process suspension). This crate is the only place in the workspace that imports an AWS SDK.

!*/

pub mod error;

use async_trait::async_trait;
use aws_sdk_ec2::model::{Filter, InstanceStateName, InstanceStatusSummaryStatus};
use chrono::{DateTime, TimeZone, Utc};
use error::Error;
use log::debug;
use roller_core::backend::{BackendResult, ComputeBackend, InstanceFilter, ProcessAction};
use roller_model::constants::{TAG_ASG_NAME, TAG_FINGERPRINT};
use roller_model::{Asg, AsgName, Fingerprint, Instance, InstanceId, InstanceLifecycleState, ScalingProcess};
use snafu::{OptionExt, ResultExt};

/// Region used when neither `ROLLER_AWS_REGION` nor the ambient AWS config supplies one.
const DEFAULT_REGION: &str = "us-west-2";

pub struct AwsComputeBackend {
    ec2: aws_sdk_ec2::Client,
    autoscaling: aws_sdk_autoscaling::Client,
}

impl AwsComputeBackend {
    pub async fn from_env(region: Option<String>) -> Self {
        let region = region.unwrap_or_else(|| DEFAULT_REGION.to_string());
        let region_provider = aws_config::meta::region::RegionProviderChain::first_try(
            aws_sdk_ec2::Region::new(region),
        );
        let config = aws_config::from_env().region(region_provider).load().await;
        Self {
            ec2: aws_sdk_ec2::Client::new(&config),
            autoscaling: aws_sdk_autoscaling::Client::new(&config),
        }
    }

    fn filters_to_sdk(filters: &InstanceFilter) -> Vec<Filter> {
        let mut out: Vec<Filter> = filters
            .tag_equals
            .iter()
            .map(|(key, value)| {
                Filter::builder()
                    .name(format!("tag:{}", key))
                    .values(value.clone())
                    .build()
            })
            .collect();
        if filters.running_only {
            out.push(
                Filter::builder()
                    .name("instance-state-name")
                    .values("running")
                    .build(),
            );
        }
        out
    }

    async fn describe_instances_inner(&self, filters: Vec<Filter>) -> Result<Vec<Instance>, Error> {
        let response = self
            .ec2
            .describe_instances()
            .set_filters(Some(filters))
            .send()
            .await
            .context(error::DescribeInstancesSnafu)?;

        let mut instances = Vec::new();
        for reservation in response.reservations.unwrap_or_default() {
            for sdk_instance in reservation.instances.unwrap_or_default() {
                instances.push(to_model_instance(sdk_instance)?);
            }
        }
        Ok(instances)
    }

    async fn describe_asg_inner(&self, name: &AsgName) -> Result<Asg, Error> {
        let response = self
            .autoscaling
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(name.0.clone())
            .send()
            .await
            .context(error::DescribeAsgSnafu {
                asg_name: name.0.clone(),
            })?;

        let group = response
            .auto_scaling_groups
            .unwrap_or_default()
            .into_iter()
            .next()
            .context(error::AsgNotFoundSnafu {
                asg_name: name.0.clone(),
            })?;

        let current_count = group.instances.as_ref().map(|v| v.len()).unwrap_or(0) as i32;
        Ok(Asg {
            name: name.clone(),
            desired_count: group.desired_capacity.unwrap_or(0),
            current_count,
        })
    }
}

fn smithy_to_chrono(dt: &aws_smithy_types::DateTime) -> DateTime<Utc> {
    Utc.timestamp(dt.secs(), dt.subsec_nanos())
}

fn to_model_instance(sdk_instance: aws_sdk_ec2::model::Instance) -> Result<Instance, Error> {
    let instance_id = sdk_instance
        .instance_id
        .context(error::MissingFieldSnafu {
            instance_id: "<unknown>",
            field: "instance_id",
        })?;

    let raw_tags = sdk_instance.tags.unwrap_or_default();

    let tags: std::collections::BTreeMap<String, String> = raw_tags
        .iter()
        .filter_map(|tag| Some((tag.key.clone()?, tag.value.clone().unwrap_or_default())))
        .collect();

    let launch_time = sdk_instance
        .launch_time
        .as_ref()
        .map(smithy_to_chrono)
        .unwrap_or_else(Utc::now);

    let lifecycle_state = match sdk_instance.state.and_then(|s| s.name) {
        Some(InstanceStateName::Pending) => InstanceLifecycleState::Pending,
        Some(InstanceStateName::Running) => InstanceLifecycleState::Running,
        Some(InstanceStateName::ShuttingDown) => InstanceLifecycleState::Terminating,
        Some(InstanceStateName::Terminated) => InstanceLifecycleState::Terminated,
        Some(InstanceStateName::Stopping) => InstanceLifecycleState::Terminating,
        _ => InstanceLifecycleState::Other,
    };

    let asg = tags.get(TAG_ASG_NAME).cloned().map(AsgName::from);

    Ok(Instance {
        id: InstanceId::from(instance_id),
        launch_time,
        tags,
        asg,
        lifecycle_state,
    })
}

#[async_trait]
impl ComputeBackend for AwsComputeBackend {
    async fn describe_instances(&self, filters: &InstanceFilter) -> BackendResult<Vec<Instance>> {
        self.describe_instances_inner(Self::filters_to_sdk(filters))
            .await
            .map_err(|e| e.to_string())
    }

    async fn terminate_instance(&self, id: &InstanceId) -> BackendResult<()> {
        self.ec2
            .terminate_instances()
            .instance_ids(id.0.clone())
            .send()
            .await
            .context(error::TerminateInstanceSnafu {
                instance_id: id.0.clone(),
            })
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn describe_instances_not_matching_fingerprint(
        &self,
        filters: &InstanceFilter,
        fingerprint: &Fingerprint,
    ) -> BackendResult<Vec<Instance>> {
        let instances = self
            .describe_instances_inner(Self::filters_to_sdk(filters))
            .await
            .map_err(|e| e.to_string())?;
        Ok(instances
            .into_iter()
            .filter(|i| i.tag(TAG_FINGERPRINT) != Some(fingerprint.0.as_str()))
            .collect())
    }

    async fn describe_instances_matching_fingerprint_since(
        &self,
        filters: &InstanceFilter,
        fingerprint: &Fingerprint,
        since: DateTime<Utc>,
    ) -> BackendResult<Vec<Instance>> {
        let instances = self
            .describe_instances_inner(Self::filters_to_sdk(filters))
            .await
            .map_err(|e| e.to_string())?;
        Ok(instances
            .into_iter()
            .filter(|i| i.tag(TAG_FINGERPRINT) == Some(fingerprint.0.as_str()) && i.launch_time >= since)
            .collect())
    }

    async fn instance_is_ready(&self, id: &InstanceId) -> BackendResult<bool> {
        let response = self
            .ec2
            .describe_instance_status()
            .instance_ids(id.0.clone())
            .include_all_instances(true)
            .send()
            .await
            .context(error::DescribeInstanceStatusSnafu {
                instance_id: id.0.clone(),
            })
            .map_err(|e| e.to_string())?;

        let status = match response.instance_statuses.unwrap_or_default().into_iter().next() {
            Some(status) => status,
            None => return Ok(false),
        };

        let running = status.instance_state.and_then(|s| s.name) == Some(InstanceStateName::Running);
        let instance_ok = status
            .instance_status
            .and_then(|s| s.status)
            .map(|s| s == InstanceStatusSummaryStatus::Ok)
            .unwrap_or(false);
        let system_ok = status
            .system_status
            .and_then(|s| s.status)
            .map(|s| s == InstanceStatusSummaryStatus::Ok)
            .unwrap_or(false);

        Ok(running && instance_ok && system_ok)
    }

    async fn asg_desired_count(&self, name: &AsgName) -> BackendResult<i32> {
        self.describe_asg_inner(name)
            .await
            .map(|asg| asg.desired_count)
            .map_err(|e| e.to_string())
    }

    async fn asg_instance_count(&self, name: &AsgName) -> BackendResult<i32> {
        self.describe_asg_inner(name)
            .await
            .map(|asg| asg.current_count)
            .map_err(|e| e.to_string())
    }

    async fn asg_set_desired_count(&self, name: &AsgName, desired: i32) -> BackendResult<()> {
        self.autoscaling
            .set_desired_capacity()
            .auto_scaling_group_name(name.0.clone())
            .desired_capacity(desired)
            .honor_cooldown(false)
            .send()
            .await
            .context(error::SetDesiredCapacitySnafu {
                asg_name: name.0.clone(),
                desired,
            })
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn asg_manage_processes(
        &self,
        name: &AsgName,
        processes: &[ScalingProcess],
        action: ProcessAction,
    ) -> BackendResult<()> {
        let names: Vec<String> = processes.iter().map(|p| p.as_str().to_string()).collect();
        debug!("{:?} {:?} on '{}'", action, names, name);
        match action {
            ProcessAction::Suspend => {
                self.autoscaling
                    .suspend_processes()
                    .auto_scaling_group_name(name.0.clone())
                    .set_scaling_processes(Some(names))
                    .send()
                    .await
                    .context(error::SuspendProcessesSnafu {
                        asg_name: name.0.clone(),
                    })
                    .map_err(|e| e.to_string())?;
            }
            ProcessAction::Resume => {
                self.autoscaling
                    .resume_processes()
                    .auto_scaling_group_name(name.0.clone())
                    .set_scaling_processes(Some(names))
                    .send()
                    .await
                    .context(error::ResumeProcessesSnafu {
                        asg_name: name.0.clone(),
                    })
                    .map_err(|e| e.to_string())?;
            }
        }
        Ok(())
    }

    async fn describe_asg(&self, name: &AsgName) -> BackendResult<Asg> {
        self.describe_asg_inner(name).await.map_err(|e| e.to_string())
    }
}
