//! # Warehouse Emulator
//!
//! In-memory implementation of the role service, the warehouse service and
//! the warehouse's table catalog. Runs the whole workflow without AWS,
//! for local development and tests.

use anyhow::Result;
use async_trait::async_trait;
use dwhctl_core::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

pub mod error;
pub mod statement;
pub mod storage;

pub use error::EmulatorError;
use statement::{classify, SqlCommand};
use storage::FileStorage;

pub const DEFAULT_REGION: &str = "us-west-2";
pub const EMULATED_ACCOUNT_ID: &str = "000000000000";

pub const OP_CREATE_ROLE: &str = "CreateRole";
pub const OP_ATTACH_ROLE_POLICY: &str = "AttachRolePolicy";
pub const OP_GET_ROLE: &str = "GetRole";
pub const OP_DETACH_ROLE_POLICY: &str = "DetachRolePolicy";
pub const OP_DELETE_ROLE: &str = "DeleteRole";
pub const OP_CREATE_CLUSTER: &str = "CreateCluster";
pub const OP_DESCRIBE_CLUSTERS: &str = "DescribeClusters";
pub const OP_DELETE_CLUSTER: &str = "DeleteCluster";
pub const OP_EXECUTE: &str = "Execute";
pub const OP_COMMIT: &str = "Commit";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatedRole {
    pub name: String,
    pub arn: String,
    pub path: String,
    pub description: String,
    pub trust_policy: TrustPolicy,
    pub attached_policies: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatedCluster {
    pub identifier: String,
    pub cluster_type: ClusterType,
    pub node_type: String,
    pub number_of_nodes: Option<u32>,
    pub db_name: String,
    pub master_username: String,
    pub iam_roles: Vec<String>,
    pub status: String,
    /// Describe calls left before the cluster turns available
    pub polls_until_available: u32,
    /// Committed table catalog of the cluster's database
    #[serde(default)]
    pub tables: BTreeSet<String>,
}

/// Complete state of the emulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorState {
    pub region: String,
    pub account_id: String,
    pub roles: BTreeMap<String, EmulatedRole>,
    /// Keyed by lower-cased identifier, as the warehouse service stores them
    pub clusters: BTreeMap<String, EmulatedCluster>,
}

impl EmulatorState {
    pub fn new(region: impl Into<String>) -> Self {
        let region = region.into();
        Self {
            region: if region.is_empty() {
                DEFAULT_REGION.to_string()
            } else {
                region
            },
            account_id: EMULATED_ACCOUNT_ID.to_string(),
            roles: BTreeMap::new(),
            clusters: BTreeMap::new(),
        }
    }

    fn role_arn_for(&self, path: &str, name: &str) -> String {
        format!("arn:aws:iam::{}:role{}{}", self.account_id, path, name)
    }

    fn role_mut(&mut self, name: &str) -> Result<&mut EmulatedRole, EmulatorError> {
        self.roles
            .get_mut(name)
            .ok_or_else(|| EmulatorError::NoSuchRole(name.to_string()))
    }

    pub fn create_role(&mut self, spec: &RoleSpec) -> Result<(), EmulatorError> {
        if self.roles.contains_key(&spec.name) {
            return Err(EmulatorError::RoleExists(spec.name.clone()));
        }
        let arn = self.role_arn_for(&spec.path, &spec.name);
        self.roles.insert(
            spec.name.clone(),
            EmulatedRole {
                name: spec.name.clone(),
                arn,
                path: spec.path.clone(),
                description: spec.description.clone(),
                trust_policy: spec.trust_policy.clone(),
                attached_policies: BTreeSet::new(),
            },
        );
        Ok(())
    }

    pub fn attach_role_policy(&mut self, role_name: &str, policy_arn: &str) -> Result<(), EmulatorError> {
        let role = self.role_mut(role_name)?;
        role.attached_policies.insert(policy_arn.to_string());
        Ok(())
    }

    pub fn role_arn(&self, role_name: &str) -> Result<String, EmulatorError> {
        self.roles
            .get(role_name)
            .map(|r| r.arn.clone())
            .ok_or_else(|| EmulatorError::NoSuchRole(role_name.to_string()))
    }

    pub fn detach_role_policy(&mut self, role_name: &str, policy_arn: &str) -> Result<(), EmulatorError> {
        let role = self.role_mut(role_name)?;
        if !role.attached_policies.remove(policy_arn) {
            return Err(EmulatorError::PolicyNotAttached {
                role: role_name.to_string(),
                policy: policy_arn.to_string(),
            });
        }
        Ok(())
    }

    pub fn delete_role(&mut self, role_name: &str) -> Result<(), EmulatorError> {
        let role = self.role_mut(role_name)?;
        if !role.attached_policies.is_empty() {
            return Err(EmulatorError::DeleteConflict(role_name.to_string()));
        }
        self.roles.remove(role_name);
        Ok(())
    }

    pub fn create_cluster(&mut self, spec: &ClusterSpec, ready_after_polls: u32) -> Result<(), EmulatorError> {
        let key = spec.identifier.to_ascii_lowercase();
        if key.is_empty() {
            return Err(EmulatorError::InvalidParameter(
                "ClusterIdentifier must not be empty".to_string(),
            ));
        }
        if self.clusters.contains_key(&key) {
            return Err(EmulatorError::ClusterExists(key));
        }
        match (spec.cluster_type, spec.number_of_nodes) {
            (ClusterType::MultiNode, Some(n)) if n >= 2 => {}
            (ClusterType::MultiNode, _) => {
                return Err(EmulatorError::InvalidParameter(
                    "multi-node clusters need NumberOfNodes of at least 2".to_string(),
                ))
            }
            (ClusterType::SingleNode, Some(_)) => {
                return Err(EmulatorError::InvalidParameter(
                    "NumberOfNodes is not allowed for single-node clusters".to_string(),
                ))
            }
            (ClusterType::SingleNode, None) => {}
        }
        for arn in &spec.iam_roles {
            if !self.roles.values().any(|r| &r.arn == arn) {
                return Err(EmulatorError::InvalidParameter(format!(
                    "IAM role {} is not valid",
                    arn
                )));
            }
        }

        let status = if ready_after_polls == 0 {
            CLUSTER_AVAILABLE
        } else {
            "creating"
        };
        self.clusters.insert(
            key.clone(),
            EmulatedCluster {
                identifier: key,
                cluster_type: spec.cluster_type,
                node_type: spec.node_type.clone(),
                number_of_nodes: spec.number_of_nodes,
                db_name: spec.db_name.clone(),
                master_username: spec.master_username.clone(),
                iam_roles: spec.iam_roles.clone(),
                status: status.to_string(),
                polls_until_available: ready_after_polls,
                tables: BTreeSet::new(),
            },
        );
        Ok(())
    }

    fn cluster(&self, identifier: &str) -> Result<&EmulatedCluster, EmulatorError> {
        self.clusters
            .get(&identifier.to_ascii_lowercase())
            .ok_or_else(|| EmulatorError::ClusterNotFound(identifier.to_string()))
    }

    fn cluster_mut(&mut self, identifier: &str) -> Result<&mut EmulatedCluster, EmulatorError> {
        self.clusters
            .get_mut(&identifier.to_ascii_lowercase())
            .ok_or_else(|| EmulatorError::ClusterNotFound(identifier.to_string()))
    }

    /// A cluster that accepts SQL connections
    pub fn available_cluster_mut(&mut self, identifier: &str) -> Result<&mut EmulatedCluster, EmulatorError> {
        let cluster = self.cluster_mut(identifier)?;
        if cluster.status != CLUSTER_AVAILABLE {
            return Err(EmulatorError::ClusterUnavailable {
                identifier: cluster.identifier.clone(),
                status: cluster.status.clone(),
            });
        }
        Ok(cluster)
    }

    /// Describe a cluster, advancing its creation by one poll
    pub fn describe_cluster(&mut self, identifier: &str) -> Result<ClusterDescription, EmulatorError> {
        let cluster = self.cluster_mut(identifier)?;
        if cluster.polls_until_available > 0 {
            cluster.polls_until_available -= 1;
        } else {
            cluster.status = CLUSTER_AVAILABLE.to_string();
        }
        self.peek_cluster(identifier)
    }

    /// Describe a cluster without advancing its creation
    pub fn peek_cluster(&self, identifier: &str) -> Result<ClusterDescription, EmulatorError> {
        let cluster = self.cluster(identifier)?;
        let endpoint = (cluster.status == CLUSTER_AVAILABLE).then(|| Endpoint {
            address: format!(
                "{}.emulated.{}.redshift.amazonaws.com",
                cluster.identifier, self.region
            ),
            port: DEFAULT_DB_PORT,
        });
        Ok(ClusterDescription {
            identifier: cluster.identifier.clone(),
            status: cluster.status.clone(),
            endpoint,
        })
    }

    pub fn delete_cluster(&mut self, identifier: &str, skip_final_snapshot: bool) -> Result<(), EmulatorError> {
        let key = identifier.to_ascii_lowercase();
        if !self.clusters.contains_key(&key) {
            return Err(EmulatorError::ClusterNotFound(identifier.to_string()));
        }
        if !skip_final_snapshot {
            return Err(EmulatorError::InvalidParameter(
                "FinalClusterSnapshotIdentifier is required unless SkipFinalClusterSnapshot is specified"
                    .to_string(),
            ));
        }
        self.clusters.remove(&key);
        Ok(())
    }
}

/// Everything the emulated SQL session did, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    Executed(String),
    Committed,
    Closed,
}

/// Warehouse Emulator Backend
pub struct EmulatorBackend {
    state: Mutex<EmulatorState>,
    storage: Option<FileStorage>,
    ready_after_polls: u32,
    injected: Mutex<HashMap<String, u32>>,
    /// Cluster the SQL session is connected to
    session_cluster: Option<String>,
    /// Catalog changes executed but not yet committed
    pending_tables: Option<BTreeSet<String>>,
    journal: Vec<JournalEntry>,
}

impl EmulatorBackend {
    /// Create an emulator, loading `state_file` when it exists
    pub async fn new(state_file: Option<String>, region: impl Into<String>) -> Result<Self> {
        let storage = state_file.map(FileStorage::new);
        let state = match &storage {
            Some(storage) => storage.load().await?,
            None => None,
        };
        let state = match state {
            Some(state) => {
                info!(region = %state.region, "Loaded emulator state");
                state
            }
            None => EmulatorState::new(region),
        };
        Ok(Self {
            state: Mutex::new(state),
            storage,
            ready_after_polls: 0,
            injected: Mutex::new(HashMap::new()),
            session_cluster: None,
            pending_tables: None,
            journal: Vec::new(),
        })
    }

    /// Emulator without persistence
    pub fn in_memory(region: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(EmulatorState::new(region)),
            storage: None,
            ready_after_polls: 0,
            injected: Mutex::new(HashMap::new()),
            session_cluster: None,
            pending_tables: None,
            journal: Vec::new(),
        }
    }

    /// New clusters report `creating` for this many describe calls
    pub fn with_ready_after_polls(mut self, polls: u32) -> Self {
        self.ready_after_polls = polls;
        self
    }

    /// Point the SQL session at a cluster (the `REDSHIFT.IDENTIFIER`)
    pub fn with_session_cluster(mut self, identifier: impl Into<String>) -> Self {
        self.session_cluster = Some(identifier.into());
        self
    }

    /// Make the next call of `operation` fail (e.g. [`OP_CREATE_ROLE`])
    pub fn fail_next(&self, operation: &str) {
        *self
            .injected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(operation.to_string())
            .or_insert(0) += 1;
    }

    /// Snapshot of the current (committed) state
    pub fn state(&self) -> EmulatorState {
        self.lock_state().clone()
    }

    /// Current status of a cluster; unlike `describe_cluster` this does
    /// not move cluster creation forward
    pub fn cluster_status(&self, identifier: &str) -> Result<ClusterDescription> {
        self.lock_state()
            .peek_cluster(identifier)
            .map_err(|e| cloud_error(OP_DESCRIBE_CLUSTERS, e))
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    /// Statements executed so far, in order
    pub fn executed_statements(&self) -> Vec<&str> {
        self.journal
            .iter()
            .filter_map(|e| match e {
                JournalEntry::Executed(sql) => Some(sql.as_str()),
                _ => None,
            })
            .collect()
    }

    fn lock_state(&self) -> MutexGuard<'_, EmulatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_injected(&self, operation: &'static str) -> Result<()> {
        let mut injected = self.injected.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(remaining) = injected.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(cloud_error(
                    operation,
                    EmulatorError::Injected(operation.to_string()),
                ));
            }
        }
        Ok(())
    }

    /// Apply a state change, surfacing emulator errors as service errors
    fn apply<T>(
        &self,
        operation: &'static str,
        change: impl FnOnce(&mut EmulatorState) -> Result<T, EmulatorError>,
    ) -> Result<T> {
        self.take_injected(operation)?;
        let mut state = self.lock_state();
        change(&mut state).map_err(|e| cloud_error(operation, e))
    }

    fn connected_cluster(&self) -> Result<String, EmulatorError> {
        self.session_cluster.clone().ok_or(EmulatorError::NotConnected)
    }

    async fn persist(&self) -> Result<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        let content = {
            let state = self.lock_state();
            serde_json::to_string_pretty(&*state)?
        };
        storage.save_json(content).await
    }
}

fn cloud_error(operation: &'static str, error: EmulatorError) -> anyhow::Error {
    anyhow::Error::new(CloudError::new(operation, error.to_string()))
}

#[async_trait]
impl CloudBackend for EmulatorBackend {
    async fn create_role(&mut self, role: &RoleSpec) -> Result<()> {
        self.apply(OP_CREATE_ROLE, |s| s.create_role(role))?;
        debug!(role = %role.name, "Emulated role created");
        self.persist().await
    }

    async fn attach_role_policy(&mut self, role_name: &str, policy_arn: &str) -> Result<()> {
        self.apply(OP_ATTACH_ROLE_POLICY, |s| s.attach_role_policy(role_name, policy_arn))?;
        self.persist().await
    }

    async fn get_role_arn(&self, role_name: &str) -> Result<String> {
        self.apply(OP_GET_ROLE, |s| s.role_arn(role_name))
    }

    async fn detach_role_policy(&mut self, role_name: &str, policy_arn: &str) -> Result<()> {
        self.apply(OP_DETACH_ROLE_POLICY, |s| s.detach_role_policy(role_name, policy_arn))?;
        self.persist().await
    }

    async fn delete_role(&mut self, role_name: &str) -> Result<()> {
        self.apply(OP_DELETE_ROLE, |s| s.delete_role(role_name))?;
        self.persist().await
    }

    async fn create_cluster(&mut self, spec: &ClusterSpec) -> Result<()> {
        let ready_after = self.ready_after_polls;
        self.apply(OP_CREATE_CLUSTER, |s| s.create_cluster(spec, ready_after))?;
        debug!(cluster = %spec.identifier, ready_after, "Emulated cluster created");
        self.persist().await
    }

    async fn describe_cluster(&self, identifier: &str) -> Result<ClusterDescription> {
        let description = self.apply(OP_DESCRIBE_CLUSTERS, |s| s.describe_cluster(identifier))?;
        self.persist().await?;
        Ok(description)
    }

    async fn delete_cluster(&mut self, identifier: &str, skip_final_snapshot: bool) -> Result<()> {
        self.apply(OP_DELETE_CLUSTER, |s| s.delete_cluster(identifier, skip_final_snapshot))?;
        self.persist().await
    }
}

#[async_trait]
impl SqlSession for EmulatorBackend {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.take_injected(OP_EXECUTE)?;
        let command = classify(sql)?;
        let identifier = self.connected_cluster()?;
        let committed = self
            .lock_state()
            .available_cluster_mut(&identifier)?
            .tables
            .clone();
        let catalog = self.pending_tables.get_or_insert(committed);

        match &command {
            SqlCommand::DropTable { table, if_exists } => {
                if !catalog.remove(table) && !if_exists {
                    return Err(EmulatorError::RelationMissing(table.clone()).into());
                }
            }
            SqlCommand::CreateTable { table, if_not_exists } => {
                if !catalog.insert(table.clone()) && !if_not_exists {
                    return Err(EmulatorError::RelationExists(table.clone()).into());
                }
            }
            SqlCommand::Copy { table, source } => {
                if !catalog.contains(table) {
                    return Err(EmulatorError::RelationMissing(table.clone()).into());
                }
                if !source.starts_with("s3://") {
                    return Err(EmulatorError::Syntax(format!("COPY source {} is not an s3:// path", source)).into());
                }
            }
            SqlCommand::Insert { table, sources } => {
                if let Some(missing) = std::iter::once(table)
                    .chain(sources.iter())
                    .find(|t| !catalog.contains(*t))
                {
                    return Err(EmulatorError::RelationMissing(missing.clone()).into());
                }
            }
        }

        debug!(target_table = command.target(), "Emulated statement executed");
        self.journal.push(JournalEntry::Executed(sql.trim().to_string()));
        Ok(0)
    }

    async fn commit(&mut self) -> Result<()> {
        self.take_injected(OP_COMMIT)?;
        if let Some(tables) = self.pending_tables.take() {
            let identifier = self.connected_cluster()?;
            self.lock_state().available_cluster_mut(&identifier)?.tables = tables;
        }
        self.journal.push(JournalEntry::Committed);
        self.persist().await
    }

    async fn close(&mut self) -> Result<()> {
        self.pending_tables = None;
        self.journal.push(JournalEntry::Closed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(identifier: &str, arn: &str) -> ClusterSpec {
        ClusterSpec {
            identifier: identifier.to_string(),
            cluster_type: ClusterType::MultiNode,
            node_type: "dc2.large".to_string(),
            number_of_nodes: Some(2),
            db_name: "dwh".to_string(),
            master_username: "dwhuser".to_string(),
            master_password: "Passw0rd".to_string(),
            iam_roles: vec![arn.to_string()],
        }
    }

    /// Backend whose SQL session is connected to an available `dwhCluster`
    fn connected_backend() -> EmulatorBackend {
        let backend = EmulatorBackend::in_memory("us-west-2").with_session_cluster("dwhCluster");
        {
            let mut state = backend.lock_state();
            state.create_role(&RoleSpec::for_redshift("r")).unwrap();
            let arn = state.role_arn("r").unwrap();
            state.create_cluster(&spec("dwhCluster", &arn), 0).unwrap();
        }
        backend
    }

    #[test]
    fn role_lifecycle_mirrors_the_service() {
        let mut state = EmulatorState::new("");
        let role = RoleSpec::for_redshift("dwhRole");

        state.create_role(&role).unwrap();
        assert_eq!(state.region, DEFAULT_REGION);
        assert_eq!(
            state.role_arn("dwhRole").unwrap(),
            "arn:aws:iam::000000000000:role/dwhRole"
        );
        assert_eq!(
            state.create_role(&role),
            Err(EmulatorError::RoleExists("dwhRole".to_string()))
        );

        state.attach_role_policy("dwhRole", S3_READ_ONLY_POLICY_ARN).unwrap();
        assert_eq!(
            state.delete_role("dwhRole"),
            Err(EmulatorError::DeleteConflict("dwhRole".to_string()))
        );

        state.detach_role_policy("dwhRole", S3_READ_ONLY_POLICY_ARN).unwrap();
        assert!(matches!(
            state.detach_role_policy("dwhRole", S3_READ_ONLY_POLICY_ARN),
            Err(EmulatorError::PolicyNotAttached { .. })
        ));
        state.delete_role("dwhRole").unwrap();
        assert_eq!(
            state.role_arn("dwhRole"),
            Err(EmulatorError::NoSuchRole("dwhRole".to_string()))
        );
    }

    #[test]
    fn cluster_becomes_available_after_polls() {
        let mut state = EmulatorState::new("us-east-1");
        state.create_role(&RoleSpec::for_redshift("r")).unwrap();
        let arn = state.role_arn("r").unwrap();
        state.create_cluster(&spec("DwhCluster", &arn), 2).unwrap();

        for _ in 0..2 {
            let d = state.describe_cluster("dwhcluster").unwrap();
            assert_eq!(d.status, "creating");
            assert!(d.endpoint.is_none());
        }
        let d = state.describe_cluster("DWHCLUSTER").unwrap();
        assert!(d.is_available());
        assert_eq!(
            d.endpoint.unwrap().to_string(),
            "dwhcluster.emulated.us-east-1.redshift.amazonaws.com:5439"
        );
    }

    #[test]
    fn cluster_creation_validates_parameters() {
        let mut state = EmulatorState::new("us-west-2");
        assert!(matches!(
            state.create_cluster(&spec("c", "arn:aws:iam::000000000000:role/ghost"), 0),
            Err(EmulatorError::InvalidParameter(_))
        ));

        state.create_role(&RoleSpec::for_redshift("r")).unwrap();
        let arn = state.role_arn("r").unwrap();
        let mut single = spec("c", &arn);
        single.cluster_type = ClusterType::SingleNode;
        assert!(matches!(
            state.create_cluster(&single, 0),
            Err(EmulatorError::InvalidParameter(_))
        ));

        state.create_cluster(&spec("c", &arn), 0).unwrap();
        assert_eq!(
            state.create_cluster(&spec("C", &arn), 0),
            Err(EmulatorError::ClusterExists("c".to_string()))
        );
    }

    #[test]
    fn delete_requires_skipping_the_final_snapshot() {
        let mut state = EmulatorState::new("us-west-2");
        state.create_role(&RoleSpec::for_redshift("r")).unwrap();
        let arn = state.role_arn("r").unwrap();
        state.create_cluster(&spec("c", &arn), 0).unwrap();

        assert!(matches!(
            state.delete_cluster("c", false),
            Err(EmulatorError::InvalidParameter(_))
        ));
        state.delete_cluster("c", true).unwrap();
        assert_eq!(
            state.delete_cluster("c", true),
            Err(EmulatorError::ClusterNotFound("c".to_string()))
        );
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let mut backend = EmulatorBackend::in_memory("us-west-2");
        backend.fail_next(OP_CREATE_ROLE);

        let err = backend
            .create_role(&RoleSpec::for_redshift("r"))
            .await
            .unwrap_err();
        let cloud = err.downcast_ref::<CloudError>().unwrap();
        assert_eq!(cloud.operation, OP_CREATE_ROLE);

        backend.create_role(&RoleSpec::for_redshift("r")).await.unwrap();
        assert!(backend.state().roles.contains_key("r"));
    }

    #[tokio::test]
    async fn uncommitted_tables_are_discarded_on_close() {
        let mut backend = connected_backend();
        backend.execute("CREATE TABLE IF NOT EXISTS users(id int);").await.unwrap();
        backend.commit().await.unwrap();
        backend.execute("CREATE TABLE IF NOT EXISTS songs(id int);").await.unwrap();
        backend.close().await.unwrap();

        let tables: Vec<_> = backend.state().clusters["dwhcluster"].tables.iter().cloned().collect();
        assert_eq!(tables, vec!["users".to_string()]);
        assert_eq!(
            backend.journal(),
            &[
                JournalEntry::Executed("CREATE TABLE IF NOT EXISTS users(id int);".to_string()),
                JournalEntry::Committed,
                JournalEntry::Executed("CREATE TABLE IF NOT EXISTS songs(id int);".to_string()),
                JournalEntry::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn inserts_need_their_source_tables() {
        let mut backend = connected_backend();
        backend.execute("CREATE TABLE time(start_time TIMESTAMP);").await.unwrap();
        let err = backend
            .execute(dwhctl_core::queries::TIME_INSERT)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "relation \"songplays\" does not exist");
    }

    #[tokio::test]
    async fn sql_needs_an_available_cluster() {
        let mut unconnected = EmulatorBackend::in_memory("us-west-2");
        let err = unconnected.execute("DROP TABLE IF EXISTS users;").await.unwrap_err();
        assert_eq!(err.downcast_ref::<EmulatorError>(), Some(&EmulatorError::NotConnected));

        let mut backend = EmulatorBackend::in_memory("us-west-2")
            .with_ready_after_polls(1)
            .with_session_cluster("dwhCluster");
        let err = backend.execute("DROP TABLE IF EXISTS users;").await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<EmulatorError>(),
            Some(&EmulatorError::ClusterNotFound("dwhCluster".to_string()))
        );

        backend.create_role(&RoleSpec::for_redshift("r")).await.unwrap();
        let arn = backend.get_role_arn("r").await.unwrap();
        backend.create_cluster(&spec("dwhCluster", &arn)).await.unwrap();
        let err = backend.execute("DROP TABLE IF EXISTS users;").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "InvalidClusterState: Cluster dwhcluster is creating, not available."
        );

        backend.describe_cluster("dwhCluster").await.unwrap();
        backend.describe_cluster("dwhCluster").await.unwrap();
        backend.execute("DROP TABLE IF EXISTS users;").await.unwrap();
        assert!(backend.state().clusters["dwhcluster"].tables.is_empty());
        assert_eq!(backend.executed_statements(), vec!["DROP TABLE IF EXISTS users;"]);
    }

    #[tokio::test]
    async fn deleting_a_cluster_drops_its_tables() {
        let mut backend = connected_backend();
        backend.execute("CREATE TABLE users(id int);").await.unwrap();
        backend.commit().await.unwrap();
        assert_eq!(backend.state().clusters["dwhcluster"].tables.len(), 1);

        backend.delete_cluster("dwhCluster", true).await.unwrap();
        let err = backend.execute("COPY users FROM 's3://b/k';").await.unwrap_err();
        assert!(err.to_string().starts_with("ClusterNotFound"));

        let arn = backend.get_role_arn("r").await.unwrap();
        backend.create_cluster(&spec("dwhCluster", &arn)).await.unwrap();
        assert!(backend.state().clusters["dwhcluster"].tables.is_empty());
    }

    #[test]
    fn peeking_does_not_advance_creation() {
        let backend = EmulatorBackend::in_memory("us-west-2");
        {
            let mut state = backend.lock_state();
            state.create_role(&RoleSpec::for_redshift("r")).unwrap();
            let arn = state.role_arn("r").unwrap();
            state.create_cluster(&spec("c", &arn), 2).unwrap();
        }

        for _ in 0..3 {
            assert_eq!(backend.cluster_status("c").unwrap().status, "creating");
        }
        assert_eq!(backend.state().clusters["c"].polls_until_available, 2);
    }

    #[tokio::test]
    async fn state_round_trips_through_the_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let path = path.to_string_lossy().to_string();

        let mut backend = EmulatorBackend::new(Some(path.clone()), "eu-central-1").await.unwrap();
        backend.create_role(&RoleSpec::for_redshift("r")).await.unwrap();
        backend.attach_role_policy("r", S3_READ_ONLY_POLICY_ARN).await.unwrap();

        let reloaded = EmulatorBackend::new(Some(path), "ignored").await.unwrap();
        let state = reloaded.state();
        assert_eq!(state.region, "eu-central-1");
        assert!(state.roles["r"].attached_policies.contains(S3_READ_ONLY_POLICY_ARN));
    }
}
