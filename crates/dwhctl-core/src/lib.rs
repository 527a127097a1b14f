//! # dwhctl core
//!
//! Configuration, SQL templates, backend traits and the orchestration of
//! the provision → tables → ETL → teardown workflow.

pub mod backend;
pub mod config;
pub mod env;
pub mod error;
pub mod etl;
pub mod provision;
pub mod queries;
pub mod report;
pub mod tables;
pub mod teardown;
pub mod types;

pub use backend::*;
pub use config::*;
pub use error::*;
pub use queries::{QuerySet, Statement, StatementKind};
pub use report::*;
pub use types::*;
