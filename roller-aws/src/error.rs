use aws_sdk_autoscaling::error::{
    DescribeAutoScalingGroupsError, ResumeProcessesError, SetDesiredCapacityError,
    SuspendProcessesError,
};
use aws_sdk_ec2::error::{
    DescribeInstanceStatusError, DescribeInstancesError, TerminateInstancesError,
};
use aws_sdk_ec2::types::SdkError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
#[allow(clippy::large_enum_variant)]
pub enum Error {
    #[snafu(display("Failed to describe instances: {}", source))]
    DescribeInstances {
        source: SdkError<DescribeInstancesError>,
    },

    #[snafu(display("Failed to describe instance status for '{}': {}", instance_id, source))]
    DescribeInstanceStatus {
        instance_id: String,
        source: SdkError<DescribeInstanceStatusError>,
    },

    #[snafu(display("Failed to terminate instance '{}': {}", instance_id, source))]
    TerminateInstance {
        instance_id: String,
        source: SdkError<TerminateInstancesError>,
    },

    #[snafu(display("Failed to describe auto scaling group '{}': {}", asg_name, source))]
    DescribeAsg {
        asg_name: String,
        source: SdkError<DescribeAutoScalingGroupsError>,
    },

    #[snafu(display("Auto scaling group '{}' was not found", asg_name))]
    AsgNotFound { asg_name: String },

    #[snafu(display("Failed to set desired capacity on '{}' to {}: {}", asg_name, desired, source))]
    SetDesiredCapacity {
        asg_name: String,
        desired: i32,
        source: SdkError<SetDesiredCapacityError>,
    },

    #[snafu(display("Failed to suspend processes on '{}': {}", asg_name, source))]
    SuspendProcesses {
        asg_name: String,
        source: SdkError<SuspendProcessesError>,
    },

    #[snafu(display("Failed to resume processes on '{}': {}", asg_name, source))]
    ResumeProcesses {
        asg_name: String,
        source: SdkError<ResumeProcessesError>,
    },

    #[snafu(display("Instance '{}' missing field '{}' in EC2 response", instance_id, field))]
    MissingField { instance_id: String, field: String },
}

pub type Result<T> = std::result::Result<T, Error>;
