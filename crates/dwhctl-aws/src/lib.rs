//! # AWS Backend
//!
//! Real IAM + Redshift implementation for production usage, plus the
//! Postgres-protocol connection used to run SQL on the cluster.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_redshift::types::Cluster;
use dwhctl_core::*;
use tracing::debug;

pub mod postgres;

pub use postgres::PgSession;

/// Name reported by the static credentials provider
const CREDENTIALS_PROVIDER: &str = "dwhctl-config";

/// AWS backend talking to IAM and Redshift
pub struct AwsBackend {
    iam: aws_sdk_iam::Client,
    redshift: aws_sdk_redshift::Client,
    region: String,
}

impl AwsBackend {
    /// Create AWS clients for `region`.
    ///
    /// Static credentials win over the default provider chain; `endpoint`
    /// points both clients at a custom endpoint (LocalStack testing).
    pub async fn connect(
        region: String,
        credentials: Option<StaticCredentials>,
        endpoint: Option<String>,
    ) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if !region.is_empty() {
            loader = loader.region(Region::new(region.clone()));
        }

        if let Some(credentials) = credentials {
            loader = loader.credentials_provider(Credentials::new(
                credentials.access_key_id,
                credentials.secret_access_key,
                None,
                None,
                CREDENTIALS_PROVIDER,
            ));
        }

        let sdk_config = loader.load().await;

        let mut iam_config = aws_sdk_iam::config::Builder::from(&sdk_config);
        let mut redshift_config = aws_sdk_redshift::config::Builder::from(&sdk_config);
        if let Some(endpoint) = endpoint {
            iam_config = iam_config.endpoint_url(endpoint.clone());
            redshift_config = redshift_config.endpoint_url(endpoint);
        }

        let region = sdk_config
            .region()
            .map(|r| r.as_ref().to_string())
            .unwrap_or(region);
        debug!(region = %region, "AWS clients ready");

        Ok(Self {
            iam: aws_sdk_iam::Client::from_conf(iam_config.build()),
            redshift: aws_sdk_redshift::Client::from_conf(redshift_config.build()),
            region,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl CloudBackend for AwsBackend {
    async fn create_role(&mut self, role: &RoleSpec) -> Result<()> {
        let document = role.trust_policy.to_json()?;
        self.iam
            .create_role()
            .path(&role.path)
            .role_name(&role.name)
            .description(&role.description)
            .assume_role_policy_document(document)
            .send()
            .await
            .map_err(|e| iam_error("CreateRole", e))?;
        Ok(())
    }

    async fn attach_role_policy(&mut self, role_name: &str, policy_arn: &str) -> Result<()> {
        self.iam
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| iam_error("AttachRolePolicy", e))?;
        Ok(())
    }

    async fn get_role_arn(&self, role_name: &str) -> Result<String> {
        let output = self
            .iam
            .get_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| iam_error("GetRole", e))?;
        output
            .role()
            .map(|role| role.arn().to_string())
            .ok_or_else(|| {
                anyhow!(CloudError::new(
                    "GetRole",
                    format!("no role returned for {}", role_name)
                ))
            })
    }

    async fn detach_role_policy(&mut self, role_name: &str, policy_arn: &str) -> Result<()> {
        self.iam
            .detach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| iam_error("DetachRolePolicy", e))?;
        Ok(())
    }

    async fn delete_role(&mut self, role_name: &str) -> Result<()> {
        self.iam
            .delete_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| iam_error("DeleteRole", e))?;
        Ok(())
    }

    async fn create_cluster(&mut self, spec: &ClusterSpec) -> Result<()> {
        let number_of_nodes = spec
            .number_of_nodes
            .map(i32::try_from)
            .transpose()
            .map_err(|_| anyhow!(CloudError::new("CreateCluster", "NUM_NODES is out of range")))?;

        self.redshift
            .create_cluster()
            .cluster_identifier(&spec.identifier)
            .cluster_type(spec.cluster_type.as_str())
            .node_type(&spec.node_type)
            .set_number_of_nodes(number_of_nodes)
            .db_name(&spec.db_name)
            .master_username(&spec.master_username)
            .master_user_password(&spec.master_password)
            .set_iam_roles(Some(spec.iam_roles.clone()))
            .send()
            .await
            .map_err(|e| redshift_error("CreateCluster", e))?;
        Ok(())
    }

    async fn describe_cluster(&self, identifier: &str) -> Result<ClusterDescription> {
        let output = self
            .redshift
            .describe_clusters()
            .cluster_identifier(identifier)
            .send()
            .await
            .map_err(|e| redshift_error("DescribeClusters", e))?;

        let cluster = output.clusters().first().ok_or_else(|| {
            anyhow!(CloudError::new(
                "DescribeClusters",
                format!("no cluster returned for {}", identifier)
            ))
        })?;
        convert_cluster(cluster)
    }

    async fn delete_cluster(&mut self, identifier: &str, skip_final_snapshot: bool) -> Result<()> {
        self.redshift
            .delete_cluster()
            .cluster_identifier(identifier)
            .skip_final_cluster_snapshot(skip_final_snapshot)
            .send()
            .await
            .map_err(|e| redshift_error("DeleteCluster", e))?;
        Ok(())
    }
}

// Helper functions for converting between SDK types and ours

fn iam_error<E>(operation: &'static str, error: E) -> anyhow::Error
where
    E: std::error::Error,
{
    anyhow!(CloudError::new(
        operation,
        aws_sdk_iam::error::DisplayErrorContext(error).to_string()
    ))
}

fn redshift_error<E>(operation: &'static str, error: E) -> anyhow::Error
where
    E: std::error::Error,
{
    anyhow!(CloudError::new(
        operation,
        aws_sdk_redshift::error::DisplayErrorContext(error).to_string()
    ))
}

fn convert_cluster(cluster: &Cluster) -> Result<ClusterDescription> {
    let endpoint = match cluster.endpoint() {
        Some(endpoint) => match (endpoint.address(), endpoint.port()) {
            (Some(address), Some(port)) => Some(Endpoint {
                address: address.to_string(),
                port: u16::try_from(port)
                    .map_err(|_| anyhow!("cluster reported invalid port {}", port))?,
            }),
            (Some(address), None) => Some(Endpoint {
                address: address.to_string(),
                port: DEFAULT_DB_PORT,
            }),
            (None, _) => None,
        },
        None => None,
    };

    Ok(ClusterDescription {
        identifier: cluster.cluster_identifier().unwrap_or_default().to_string(),
        status: cluster.cluster_status().unwrap_or("unknown").to_string(),
        endpoint,
    })
}
