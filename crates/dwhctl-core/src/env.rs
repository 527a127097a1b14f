//! Environment-variable overrides (highest priority)
//!
//! Every key can be set as `DWH_<SECTION>_<KEY>`, e.g. `DWH_CLUSTER_HOST`.
//! The `AWS` section also honours the standard `AWS_ACCESS_KEY_ID`,
//! `AWS_SECRET_ACCESS_KEY` and `AWS_REGION` variables, which lose to the
//! prefixed ones.

use crate::config::DwhConfig;
use crate::error::ConfigError;
use crate::types::ClusterType;
use std::collections::HashMap;

pub const ENV_PREFIX: &str = "DWH_";

/// Source of environment values, abstracted so tests never touch the process env
pub trait EnvSource {
    /// Get a variable WITH the `DWH_` prefix prepended to `key`
    fn get(&self, key: &str) -> Option<String>;

    /// Get a variable by its exact name
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Reads from the process environment
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed set of variables, keyed by full name
#[derive(Debug, Default, Clone)]
pub struct MapEnvSource(pub HashMap<String, String>);

impl MapEnvSource {
    pub fn new<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl EnvSource for MapEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(&format!("{}{}", ENV_PREFIX, key)).cloned()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// Apply environment overrides on top of file values
pub fn apply_env_overrides<E: EnvSource>(config: &mut DwhConfig, env: &E) -> Result<(), ConfigError> {
    // AWS standard variables first so the prefixed ones win
    if let Some(key) = get_raw_string(env, "AWS_ACCESS_KEY_ID") {
        config.aws.key = key;
    }
    if let Some(secret) = get_raw_string(env, "AWS_SECRET_ACCESS_KEY") {
        config.aws.secret = secret;
    }
    if let Some(region) = get_raw_string(env, "AWS_REGION") {
        config.aws.region = region;
    }
    override_string(env, "AWS_KEY", &mut config.aws.key);
    override_string(env, "AWS_SECRET", &mut config.aws.secret);
    override_string(env, "AWS_REGION", &mut config.aws.region);

    override_string(env, "IAM_ROLE_NAME", &mut config.iam_role.name);
    override_string(env, "IAM_ROLE_ARN", &mut config.iam_role.arn);

    if let Some(value) = get_string(env, "REDSHIFT_TYPE") {
        config.redshift.cluster_type = parse_cluster_type(&value)?;
    }
    override_string(env, "REDSHIFT_NODE_TYPE", &mut config.redshift.node_type);
    if let Some(value) = get_string(env, "REDSHIFT_NUM_NODES") {
        config.redshift.num_nodes = Some(parse_number("REDSHIFT_NUM_NODES", &value)?);
    }
    override_string(env, "REDSHIFT_IDENTIFIER", &mut config.redshift.identifier);

    override_string(env, "CLUSTER_HOST", &mut config.cluster.host);
    override_string(env, "CLUSTER_DB_NAME", &mut config.cluster.db_name);
    override_string(env, "CLUSTER_DB_USER", &mut config.cluster.db_user);
    override_string(env, "CLUSTER_DB_PASSWORD", &mut config.cluster.db_password);
    if let Some(value) = get_string(env, "CLUSTER_DB_PORT") {
        config.cluster.db_port = parse_number("CLUSTER_DB_PORT", &value)?;
    }

    override_string(env, "S3_LOG_DATA", &mut config.s3.log_data);
    override_string(env, "S3_SONG_DATA", &mut config.s3.song_data);
    override_string(env, "S3_LOG_JSONPATH", &mut config.s3.log_jsonpath);

    Ok(())
}

fn get_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn get_raw_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get_raw(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn override_string<E: EnvSource>(env: &E, key: &str, target: &mut String) {
    if let Some(value) = get_string(env, key) {
        *target = value;
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::InvalidEnv {
        name: format!("{}{}", ENV_PREFIX, key),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_cluster_type(value: &str) -> Result<ClusterType, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "multi-node" => Ok(ClusterType::MultiNode),
        "single-node" => Ok(ClusterType::SingleNode),
        _ => Err(ConfigError::InvalidEnv {
            name: format!("{}REDSHIFT_TYPE", ENV_PREFIX),
            value: value.to_string(),
            reason: "expected multi-node or single-node".to_string(),
        }),
    }
}
