//! Tearing the warehouse down: cluster, policy, role

use crate::backend::CloudBackend;
use crate::config::DwhConfig;
use crate::report::RunReport;
use crate::types::S3_READ_ONLY_POLICY_ARN;
use tracing::info;

pub const STEP_DELETE_CLUSTER: &str = "delete Redshift cluster";
pub const STEP_DETACH_POLICY: &str = "detach S3 read-only policy";
pub const STEP_DELETE_ROLE: &str = "delete IAM role";

/// Delete the cluster (no final snapshot), detach the policy and delete the role.
/// Every step runs even if an earlier one failed.
pub async fn teardown<B>(backend: &mut B, config: &DwhConfig) -> RunReport
where
    B: CloudBackend + ?Sized,
{
    let mut report = RunReport::new();
    let role_name = config.iam_role.name.as_str();
    let identifier = config.redshift.identifier.as_str();

    info!(cluster = identifier, "Deleting Redshift cluster");
    report
        .step(STEP_DELETE_CLUSTER, backend.delete_cluster(identifier, true))
        .await;

    info!(role = role_name, "Detaching IAM role policy");
    report
        .step(
            STEP_DETACH_POLICY,
            backend.detach_role_policy(role_name, S3_READ_ONLY_POLICY_ARN),
        )
        .await;

    info!(role = role_name, "Deleting IAM role");
    report
        .step(STEP_DELETE_ROLE, backend.delete_role(role_name))
        .await;

    report
}
