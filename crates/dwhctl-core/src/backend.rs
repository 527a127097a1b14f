//! Backend traits for the cloud services and the warehouse connection
//!
//! Lets every command run against the local emulator or real AWS.

use crate::types::*;
use anyhow::Result;
use async_trait::async_trait;

/// Role and warehouse service calls made by provisioning and teardown
#[async_trait]
pub trait CloudBackend: Send + Sync {
    /// Create an IAM role with the given trust policy
    async fn create_role(&mut self, role: &RoleSpec) -> Result<()>;

    /// Attach a managed policy to a role
    async fn attach_role_policy(&mut self, role_name: &str, policy_arn: &str) -> Result<()>;

    /// Look up the ARN of an existing role
    async fn get_role_arn(&self, role_name: &str) -> Result<String>;

    /// Detach a managed policy from a role
    async fn detach_role_policy(&mut self, role_name: &str, policy_arn: &str) -> Result<()>;

    /// Delete a role. Fails while policies are still attached.
    async fn delete_role(&mut self, role_name: &str) -> Result<()>;

    /// Start creating a cluster; returns before it is available
    async fn create_cluster(&mut self, spec: &ClusterSpec) -> Result<()>;

    /// Current status and endpoint of a cluster
    async fn describe_cluster(&self, identifier: &str) -> Result<ClusterDescription>;

    /// Start deleting a cluster
    async fn delete_cluster(&mut self, identifier: &str, skip_final_snapshot: bool) -> Result<()>;
}

/// An open SQL connection to the warehouse
#[async_trait]
pub trait SqlSession: Send {
    /// Run one statement, returning the number of rows affected
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Commit everything executed since the last commit
    async fn commit(&mut self) -> Result<()>;

    /// Close the connection. Uncommitted work is discarded.
    async fn close(&mut self) -> Result<()>;
}

/// Static credentials taken from the `AWS` config section
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Configuration for backend implementations
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Local emulator (no AWS required)
    Emulator {
        /// Optional file to persist state
        state_file: Option<String>,
        /// Region used when rendering emulated ARNs and endpoints
        region: String,
    },
    /// Real AWS IAM + Redshift
    Aws {
        region: String,
        /// Falls back to the default provider chain when absent
        credentials: Option<StaticCredentials>,
        /// Custom endpoint (for LocalStack testing)
        endpoint: Option<String>,
    },
}

impl BackendConfig {
    /// Build the backend config for the `AWS` section of a config file
    pub fn from_config(config: &crate::DwhConfig, emulator: bool, state_file: Option<String>) -> Self {
        if emulator {
            return BackendConfig::Emulator {
                state_file,
                region: config.aws.region.clone(),
            };
        }
        let credentials = if config.aws.key.is_empty() || config.aws.secret.is_empty() {
            None
        } else {
            Some(StaticCredentials {
                access_key_id: config.aws.key.clone(),
                secret_access_key: config.aws.secret.clone(),
            })
        };
        BackendConfig::Aws {
            region: config.aws.region.clone(),
            credentials,
            endpoint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DwhConfig;

    #[test]
    fn credentials_only_when_both_halves_present() {
        let mut config = DwhConfig::default();
        config.aws.region = "us-west-2".to_string();
        config.aws.key = "AKIA".to_string();

        match BackendConfig::from_config(&config, false, None) {
            BackendConfig::Aws { credentials, region, .. } => {
                assert!(credentials.is_none());
                assert_eq!(region, "us-west-2");
            }
            other => panic!("unexpected backend: {other:?}"),
        }

        config.aws.secret = "secret".to_string();
        match BackendConfig::from_config(&config, false, None) {
            BackendConfig::Aws { credentials, .. } => {
                let credentials = credentials.unwrap();
                assert_eq!(credentials.access_key_id, "AKIA");
                assert!(!format!("{:?}", credentials).contains("secret\""));
            }
            other => panic!("unexpected backend: {other:?}"),
        }
    }

    #[test]
    fn emulator_flag_wins() {
        let config = DwhConfig::default();
        let backend = BackendConfig::from_config(&config, true, Some("state.json".to_string()));
        assert!(matches!(
            backend,
            BackendConfig::Emulator { state_file: Some(ref f), .. } if f == "state.json"
        ));
    }
}
