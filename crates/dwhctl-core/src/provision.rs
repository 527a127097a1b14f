//! Standing the warehouse up: role, policy, cluster, endpoint
//!
//! Each step is attempted independently and logged. A failing step does not
//! stop the run; steps that need an earlier result are skipped instead.

use crate::backend::CloudBackend;
use crate::config::DwhConfig;
use crate::report::RunReport;
use crate::types::*;
use anyhow::{anyhow, bail, Result};
use std::time::Duration;
use tracing::{debug, info};

pub const STEP_CREATE_ROLE: &str = "create IAM role";
pub const STEP_ATTACH_POLICY: &str = "attach S3 read-only policy";
pub const STEP_GET_ROLE_ARN: &str = "get IAM role ARN";
pub const STEP_CREATE_CLUSTER: &str = "create Redshift cluster";
pub const STEP_WAIT_AVAILABLE: &str = "wait for cluster availability";
pub const STEP_DESCRIBE_CLUSTER: &str = "describe Redshift cluster";
pub const STEP_READ_ENDPOINT: &str = "read cluster endpoint";

/// How long to wait for a new cluster to become available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_polls: 40,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionOptions {
    /// Poll until the cluster is available before describing it
    pub wait: Option<WaitPolicy>,
}

/// What a provisioning run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub report: RunReport,
    pub role_arn: Option<String>,
    pub endpoint: Option<Endpoint>,
}

/// Create the role and cluster described by `config`
pub async fn provision<B>(backend: &mut B, config: &DwhConfig, options: &ProvisionOptions) -> ProvisionOutcome
where
    B: CloudBackend + ?Sized,
{
    let mut report = RunReport::new();
    let role_name = config.iam_role.name.as_str();
    let identifier = config.redshift.identifier.as_str();

    info!(role = role_name, "Creating IAM role");
    let role = RoleSpec::for_redshift(role_name);
    report.step(STEP_CREATE_ROLE, backend.create_role(&role)).await;

    info!(role = role_name, policy = S3_READ_ONLY_POLICY_ARN, "Attaching role policy");
    report
        .step(
            STEP_ATTACH_POLICY,
            backend.attach_role_policy(role_name, S3_READ_ONLY_POLICY_ARN),
        )
        .await;

    let role_arn = report
        .step(STEP_GET_ROLE_ARN, backend.get_role_arn(role_name))
        .await;
    if let Some(arn) = &role_arn {
        info!(arn = %arn, "Created IAM role ARN");
        report.annotate(arn.clone());
    }

    match &role_arn {
        Some(arn) => {
            let spec = config.cluster_spec(arn);
            info!(cluster = identifier, "Creating Redshift cluster");
            debug!(?spec, "Cluster parameters");
            report
                .step(STEP_CREATE_CLUSTER, backend.create_cluster(&spec))
                .await;
        }
        None => report.skip(STEP_CREATE_CLUSTER, "role ARN is unknown"),
    }

    if let Some(policy) = options.wait {
        report
            .step(
                STEP_WAIT_AVAILABLE,
                wait_until_available(&*backend, identifier, policy),
            )
            .await;
    }

    let description = report
        .step(STEP_DESCRIBE_CLUSTER, backend.describe_cluster(identifier))
        .await;
    let endpoint = match description {
        Some(ClusterDescription {
            endpoint: Some(endpoint),
            ..
        }) => {
            info!(endpoint = %endpoint, "Created Redshift cluster host");
            report.annotate(endpoint.to_string());
            Some(endpoint)
        }
        Some(description) => {
            // Describe worked, but there is nothing to connect to yet
            let reason = format!("cluster is {} and has no endpoint yet", description.status);
            report.skip(STEP_READ_ENDPOINT, reason);
            None
        }
        None => None,
    };

    ProvisionOutcome {
        report,
        role_arn,
        endpoint,
    }
}

/// Poll `describe_cluster` until the cluster reports `available`
pub async fn wait_until_available<B>(backend: &B, identifier: &str, policy: WaitPolicy) -> Result<ClusterDescription>
where
    B: CloudBackend + ?Sized,
{
    if policy.max_polls == 0 {
        bail!("wait policy allows no polls");
    }
    let mut last_status = String::new();
    for poll in 1..=policy.max_polls {
        let description = backend.describe_cluster(identifier).await?;
        if description.is_available() {
            info!(cluster = identifier, polls = poll, "Cluster is available");
            return Ok(description);
        }
        debug!(cluster = identifier, status = %description.status, poll, "Cluster not available yet");
        last_status = description.status;
        if poll < policy.max_polls {
            tokio::time::sleep(policy.interval).await;
        }
    }
    Err(anyhow!(
        "cluster {} still {} after {} polls",
        identifier,
        last_status,
        policy.max_polls
    ))
}
