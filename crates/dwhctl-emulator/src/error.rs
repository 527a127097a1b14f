//! Errors raised by the emulator, worded after the service error codes

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmulatorError {
    #[error("EntityAlreadyExists: Role with name {0} already exists.")]
    RoleExists(String),

    #[error("NoSuchEntity: The role with name {0} cannot be found.")]
    NoSuchRole(String),

    #[error("NoSuchEntity: Policy {policy} was not found on role {role}.")]
    PolicyNotAttached { role: String, policy: String },

    #[error("DeleteConflict: Cannot delete role {0}, must detach all policies first.")]
    DeleteConflict(String),

    #[error("ClusterAlreadyExists: Cluster {0} already exists.")]
    ClusterExists(String),

    #[error("ClusterNotFound: Cluster {0} not found.")]
    ClusterNotFound(String),

    #[error("InvalidClusterState: Cluster {identifier} is {status}, not available.")]
    ClusterUnavailable { identifier: String, status: String },

    #[error("connection refused: the SQL session is not connected to a cluster")]
    NotConnected,

    #[error("InvalidParameterValue: {0}")]
    InvalidParameter(String),

    #[error("InjectedFailure: {0} was configured to fail")]
    Injected(String),

    #[error("relation \"{0}\" does not exist")]
    RelationMissing(String),

    #[error("relation \"{0}\" already exists")]
    RelationExists(String),

    #[error("syntax error: {0}")]
    Syntax(String),
}
