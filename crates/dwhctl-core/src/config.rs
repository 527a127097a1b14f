//! Warehouse configuration
//!
//! Sections and keys mirror the classic `dwh.cfg` layout (`AWS`, `IAM_ROLE`,
//! `REDSHIFT`, `CLUSTER`, `S3`), written as TOML. Values can be overridden
//! from the environment, see [`crate::env`].

use crate::error::ConfigError;
use crate::types::{ClusterSpec, ClusterType};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "dwh.toml";

/// Default Redshift port
pub const DEFAULT_DB_PORT: u16 = 5439;

/// Complete configuration consumed by every command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DwhConfig {
    #[serde(rename = "AWS", default)]
    pub aws: AwsSection,

    #[serde(rename = "IAM_ROLE", default)]
    pub iam_role: IamRoleSection,

    #[serde(rename = "REDSHIFT", default)]
    pub redshift: RedshiftSection,

    #[serde(rename = "CLUSTER", default)]
    pub cluster: ClusterSection,

    #[serde(rename = "S3", default)]
    pub s3: S3Section,
}

/// Credentials and region for the cloud APIs
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct AwsSection {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub region: String,
}

impl fmt::Debug for AwsSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSection")
            .field("key", &self.key)
            .field("secret", &redact(&self.secret))
            .field("region", &self.region)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct IamRoleSection {
    #[serde(default)]
    pub name: String,
    /// Filled in after provisioning; needed by the COPY statements
    #[serde(default)]
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct RedshiftSection {
    #[serde(rename = "TYPE", default = "default_cluster_type")]
    pub cluster_type: ClusterType,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub num_nodes: Option<u32>,
    #[serde(default)]
    pub identifier: String,
}

fn default_cluster_type() -> ClusterType {
    ClusterType::MultiNode
}

impl Default for RedshiftSection {
    fn default() -> Self {
        Self {
            cluster_type: default_cluster_type(),
            node_type: String::new(),
            num_nodes: None,
            identifier: String::new(),
        }
    }
}

/// Database created inside the cluster and how to reach it
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct ClusterSection {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub db_user: String,
    #[serde(default)]
    pub db_password: String,
    #[serde(default = "default_db_port")]
    pub db_port: u16,
}

fn default_db_port() -> u16 {
    DEFAULT_DB_PORT
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            db_name: String::new(),
            db_user: String::new(),
            db_password: String::new(),
            db_port: DEFAULT_DB_PORT,
        }
    }
}

impl fmt::Debug for ClusterSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterSection")
            .field("host", &self.host)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_password", &redact(&self.db_password))
            .field("db_port", &self.db_port)
            .finish()
    }
}

/// Source locations of the raw data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct S3Section {
    #[serde(default)]
    pub log_data: String,
    #[serde(default)]
    pub song_data: String,
    /// Either `auto` or an `s3://` JSONPaths file
    #[serde(default)]
    pub log_jsonpath: String,
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        ""
    } else {
        "<redacted>"
    }
}

impl DwhConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse warehouse config")
    }

    /// Read and parse a config file. Environment overrides are not applied.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Checks needed before talking to the role and warehouse services
    pub fn validate_provisioning(&self) -> Result<(), ConfigError> {
        require("AWS", "REGION", &self.aws.region)?;
        require("IAM_ROLE", "NAME", &self.iam_role.name)?;
        require("REDSHIFT", "IDENTIFIER", &self.redshift.identifier)?;
        require("REDSHIFT", "NODE_TYPE", &self.redshift.node_type)?;
        require("CLUSTER", "DB_NAME", &self.cluster.db_name)?;
        require("CLUSTER", "DB_USER", &self.cluster.db_user)?;
        require("CLUSTER", "DB_PASSWORD", &self.cluster.db_password)?;

        if self.redshift.cluster_type == ClusterType::MultiNode {
            match self.redshift.num_nodes {
                Some(n) if n >= 2 => {}
                Some(n) => {
                    return Err(ConfigError::Invalid {
                        section: "REDSHIFT",
                        key: "NUM_NODES",
                        reason: format!("multi-node clusters need at least 2 nodes, got {}", n),
                    })
                }
                None => {
                    return Err(ConfigError::Missing {
                        section: "REDSHIFT",
                        key: "NUM_NODES",
                    })
                }
            }
        }
        Ok(())
    }

    /// Checks needed before deleting the cluster and the role
    pub fn validate_teardown(&self) -> Result<(), ConfigError> {
        require("AWS", "REGION", &self.aws.region)?;
        require("IAM_ROLE", "NAME", &self.iam_role.name)?;
        require("REDSHIFT", "IDENTIFIER", &self.redshift.identifier)
    }

    /// Checks needed before opening a SQL connection
    pub fn validate_connection(&self) -> Result<(), ConfigError> {
        require("CLUSTER", "HOST", &self.cluster.host)?;
        require("CLUSTER", "DB_NAME", &self.cluster.db_name)?;
        require("CLUSTER", "DB_USER", &self.cluster.db_user)?;
        if self.cluster.db_port == 0 {
            return Err(ConfigError::Invalid {
                section: "CLUSTER",
                key: "DB_PORT",
                reason: "port must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Checks needed before building the COPY statements
    pub fn validate_load_sources(&self) -> Result<(), ConfigError> {
        require("IAM_ROLE", "ARN", &self.iam_role.arn)?;
        require_s3_path("LOG_DATA", &self.s3.log_data)?;
        require_s3_path("SONG_DATA", &self.s3.song_data)?;
        // blank means 'auto', the same as the COPY rendering
        let jsonpath = self.s3.log_jsonpath.trim();
        if !jsonpath.is_empty() && !jsonpath.eq_ignore_ascii_case("auto") {
            require_s3_path("LOG_JSONPATH", jsonpath)?;
        }
        Ok(())
    }

    /// Cluster creation parameters for the given role ARN
    pub fn cluster_spec(&self, iam_role_arn: &str) -> ClusterSpec {
        let number_of_nodes = match self.redshift.cluster_type {
            ClusterType::MultiNode => self.redshift.num_nodes,
            ClusterType::SingleNode => None,
        };
        ClusterSpec {
            identifier: self.redshift.identifier.clone(),
            cluster_type: self.redshift.cluster_type,
            node_type: self.redshift.node_type.clone(),
            number_of_nodes,
            db_name: self.cluster.db_name.clone(),
            master_username: self.cluster.db_user.clone(),
            master_password: self.cluster.db_password.clone(),
            iam_roles: vec![iam_role_arn.to_string()],
        }
    }
}

fn require(section: &'static str, key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing { section, key })
    } else {
        Ok(())
    }
}

fn require_s3_path(key: &'static str, value: &str) -> Result<(), ConfigError> {
    require("S3", key, value)?;
    if !value.starts_with("s3://") {
        return Err(ConfigError::Invalid {
            section: "S3",
            key,
            reason: format!("expected an s3:// path, got {:?}", value),
        });
    }
    Ok(())
}
