//! Core data types for warehouse provisioning

use serde::{Deserialize, Serialize};
use std::fmt;

/// Managed policy granting read-only access to S3, attached to the cluster role
pub const S3_READ_ONLY_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess";

/// Service principal allowed to assume the cluster role
pub const REDSHIFT_SERVICE_PRINCIPAL: &str = "redshift.amazonaws.com";

/// Status string the warehouse service reports once a cluster accepts connections
pub const CLUSTER_AVAILABLE: &str = "available";

/// Cluster topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterType {
    SingleNode,
    MultiNode,
}

impl ClusterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterType::SingleNode => "single-node",
            ClusterType::MultiNode => "multi-node",
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IAM trust policy document (`AssumeRolePolicyDocument`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustPolicy {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Statement")]
    pub statement: Vec<TrustStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustStatement {
    #[serde(rename = "Action")]
    pub action: String,
    #[serde(rename = "Effect")]
    pub effect: String,
    #[serde(rename = "Principal")]
    pub principal: ServicePrincipal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePrincipal {
    #[serde(rename = "Service")]
    pub service: String,
}

impl TrustPolicy {
    /// Trust policy letting a single AWS service assume the role
    pub fn for_service(service: &str) -> Self {
        Self {
            version: "2012-10-17".to_string(),
            statement: vec![TrustStatement {
                action: "sts:AssumeRole".to_string(),
                effect: "Allow".to_string(),
                principal: ServicePrincipal {
                    service: service.to_string(),
                },
            }],
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Everything needed to create the cluster's IAM role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    pub path: String,
    pub description: String,
    pub trust_policy: TrustPolicy,
}

impl RoleSpec {
    /// Role the warehouse service assumes to read from object storage
    pub fn for_redshift(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: "/".to_string(),
            description: "Redshift can call other AWS Services".to_string(),
            trust_policy: TrustPolicy::for_service(REDSHIFT_SERVICE_PRINCIPAL),
        }
    }
}

/// Parameters of a `CreateCluster` call
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub identifier: String,
    pub cluster_type: ClusterType,
    pub node_type: String,
    /// Only sent for multi-node clusters
    pub number_of_nodes: Option<u32>,
    pub db_name: String,
    pub master_username: String,
    pub master_password: String,
    pub iam_roles: Vec<String>,
}

impl fmt::Debug for ClusterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterSpec")
            .field("identifier", &self.identifier)
            .field("cluster_type", &self.cluster_type)
            .field("node_type", &self.node_type)
            .field("number_of_nodes", &self.number_of_nodes)
            .field("db_name", &self.db_name)
            .field("master_username", &self.master_username)
            .field("master_password", &"<redacted>")
            .field("iam_roles", &self.iam_roles)
            .finish()
    }
}

/// Network address of a running cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Result of `DescribeClusters` for a single identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDescription {
    pub identifier: String,
    pub status: String,
    /// Absent while the cluster is still being created
    pub endpoint: Option<Endpoint>,
}

impl ClusterDescription {
    pub fn is_available(&self) -> bool {
        self.status.eq_ignore_ascii_case(CLUSTER_AVAILABLE)
    }
}
