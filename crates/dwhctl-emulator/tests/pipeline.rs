//! End-to-end runs of the warehouse workflow against the emulator

use dwhctl_core::provision::{self, ProvisionOptions, WaitPolicy};
use dwhctl_core::queries::TABLES;
use dwhctl_core::teardown::{self, teardown};
use dwhctl_core::{etl, tables, DwhConfig, QuerySet, StepOutcome, S3_READ_ONLY_POLICY_ARN};
use dwhctl_emulator::*;
use std::time::Duration;

const CONFIG: &str = r#"
[AWS]
REGION = "us-west-2"

[IAM_ROLE]
NAME = "dwhRole"

[REDSHIFT]
TYPE = "multi-node"
NODE_TYPE = "dc2.large"
NUM_NODES = 4
IDENTIFIER = "dwhCluster"

[CLUSTER]
HOST = "localhost"
DB_NAME = "dwh"
DB_USER = "dwhuser"
DB_PASSWORD = "Passw0rd"

[S3]
LOG_DATA = "s3://udacity-dend/log_data"
SONG_DATA = "s3://udacity-dend/song_data"
LOG_JSONPATH = "s3://udacity-dend/log_json_path.json"
"#;

fn config() -> DwhConfig {
    DwhConfig::from_toml_str(CONFIG).unwrap()
}

fn fast_wait() -> ProvisionOptions {
    ProvisionOptions {
        wait: Some(WaitPolicy {
            interval: Duration::from_millis(1),
            max_polls: 5,
        }),
    }
}

#[tokio::test]
async fn provision_load_and_teardown() {
    let mut config = config();
    let mut backend = EmulatorBackend::in_memory("us-west-2")
        .with_ready_after_polls(2)
        .with_session_cluster("dwhCluster");

    let outcome = provision::provision(&mut backend, &config, &fast_wait()).await;
    assert!(!outcome.report.has_failures(), "{}", outcome.report);
    let arn = outcome.role_arn.clone().unwrap();
    assert_eq!(arn, "arn:aws:iam::000000000000:role/dwhRole");
    assert_eq!(
        outcome.endpoint.as_ref().unwrap().address,
        "dwhcluster.emulated.us-west-2.redshift.amazonaws.com"
    );

    let state = backend.state();
    let cluster = &state.clusters["dwhcluster"];
    assert_eq!(cluster.iam_roles, vec![arn.clone()]);
    assert_eq!(cluster.number_of_nodes, Some(4));
    assert!(state.roles["dwhRole"]
        .attached_policies
        .contains(S3_READ_ONLY_POLICY_ARN));

    config.iam_role.arn = arn;
    config.validate_load_sources().unwrap();
    let queries = QuerySet::build(&config.s3, &config.iam_role.arn);

    tables::reset_tables(&mut backend, &queries).await.unwrap();
    let summary = etl::run_etl(&mut backend, &queries).await.unwrap();
    assert_eq!(summary, etl::EtlSummary::default());

    let created: Vec<_> = backend.state().clusters["dwhcluster"].tables.iter().cloned().collect();
    let mut expected: Vec<_> = TABLES.iter().map(|t| t.to_string()).collect();
    expected.sort();
    assert_eq!(created, expected);

    // 7 drops + 7 creates + 2 copies + 5 inserts, one commit each
    assert_eq!(backend.executed_statements().len(), 21);
    let commits = backend
        .journal()
        .iter()
        .filter(|e| **e == JournalEntry::Committed)
        .count();
    assert_eq!(commits, 21);

    let report = teardown(&mut backend, &config).await;
    assert!(!report.has_failures(), "{}", report);
    let state = backend.state();
    assert!(state.clusters.is_empty());
    assert!(state.roles.is_empty());

    // the catalog went away with the cluster
    let err = etl::run_etl(&mut backend, &queries).await.unwrap_err();
    assert!(format!("{:#}", err).contains("ClusterNotFound"), "{:#}", err);
    provision::provision(&mut backend, &config, &fast_wait()).await;
    assert!(backend.state().clusters["dwhcluster"].tables.is_empty());
}

#[tokio::test]
async fn tables_need_an_available_cluster() {
    let config = config();
    let queries = QuerySet::build(&config.s3, "arn:aws:iam::000000000000:role/dwhRole");

    let mut unconnected = EmulatorBackend::in_memory("us-west-2");
    let err = tables::reset_tables(&mut unconnected, &queries).await.unwrap_err();
    assert!(format!("{:#}", err).contains("not connected"), "{:#}", err);

    let mut backend = EmulatorBackend::in_memory("us-west-2")
        .with_ready_after_polls(5)
        .with_session_cluster("dwhCluster");
    let err = tables::reset_tables(&mut backend, &queries).await.unwrap_err();
    assert!(format!("{:#}", err).contains("ClusterNotFound"), "{:#}", err);

    provision::provision(&mut backend, &config, &ProvisionOptions::default()).await;
    let err = tables::reset_tables(&mut backend, &queries).await.unwrap_err();
    assert!(format!("{:#}", err).contains("InvalidClusterState"), "{:#}", err);
    assert!(backend.executed_statements().is_empty());
}

#[tokio::test]
async fn provisioning_continues_past_failures() {
    let config = config();
    let mut backend = EmulatorBackend::in_memory("us-west-2");
    backend.fail_next(OP_ATTACH_ROLE_POLICY);

    let outcome = provision::provision(&mut backend, &config, &ProvisionOptions::default()).await;

    assert!(outcome.report.has_failures());
    assert!(matches!(
        outcome.report.outcome_of(provision::STEP_ATTACH_POLICY),
        Some(StepOutcome::Failed { .. })
    ));
    // later steps still ran
    assert!(outcome.role_arn.is_some());
    assert!(outcome.endpoint.is_some());
    assert_eq!(backend.state().clusters.len(), 1);
}

#[tokio::test]
async fn missing_role_arn_skips_cluster_creation() {
    let config = config();
    let mut backend = EmulatorBackend::in_memory("us-west-2");
    backend.fail_next(OP_CREATE_ROLE);
    backend.fail_next(OP_GET_ROLE);

    let outcome = provision::provision(&mut backend, &config, &ProvisionOptions::default()).await;

    assert_eq!(outcome.role_arn, None);
    assert!(matches!(
        outcome.report.outcome_of(provision::STEP_CREATE_CLUSTER),
        Some(StepOutcome::Skipped { .. })
    ));
    assert!(matches!(
        outcome.report.outcome_of(provision::STEP_DESCRIBE_CLUSTER),
        Some(StepOutcome::Failed { error }) if error.contains("ClusterNotFound")
    ));
    assert!(backend.state().clusters.is_empty());
}

#[tokio::test]
async fn endpoint_is_reported_missing_without_waiting() {
    let config = config();
    let mut backend = EmulatorBackend::in_memory("us-west-2").with_ready_after_polls(3);

    let outcome = provision::provision(&mut backend, &config, &ProvisionOptions::default()).await;

    assert_eq!(outcome.endpoint, None);
    assert_eq!(
        outcome.report.outcome_of(provision::STEP_READ_ENDPOINT),
        Some(&StepOutcome::Skipped {
            reason: "cluster is creating and has no endpoint yet".to_string()
        })
    );
}

#[tokio::test]
async fn wait_gives_up_after_max_polls() {
    let config = config();
    let mut backend = EmulatorBackend::in_memory("us-west-2").with_ready_after_polls(10);
    let options = ProvisionOptions {
        wait: Some(WaitPolicy {
            interval: Duration::from_millis(1),
            max_polls: 3,
        }),
    };

    let outcome = provision::provision(&mut backend, &config, &options).await;

    match outcome.report.outcome_of(provision::STEP_WAIT_AVAILABLE) {
        Some(StepOutcome::Failed { error }) => {
            assert_eq!(error, "cluster dwhCluster still creating after 3 polls")
        }
        other => panic!("unexpected wait outcome: {other:?}"),
    }
}

#[tokio::test]
async fn teardown_attempts_every_step() {
    let config = config();
    let mut backend = EmulatorBackend::in_memory("us-west-2");
    provision::provision(&mut backend, &config, &ProvisionOptions::default()).await;
    backend.fail_next(OP_DELETE_CLUSTER);

    let report = teardown(&mut backend, &config).await;

    assert!(matches!(
        report.outcome_of(teardown::STEP_DELETE_CLUSTER),
        Some(StepOutcome::Failed { .. })
    ));
    assert!(matches!(
        report.outcome_of(teardown::STEP_DELETE_ROLE),
        Some(StepOutcome::Succeeded { .. })
    ));
    let state = backend.state();
    assert_eq!(state.clusters.len(), 1);
    assert!(state.roles.is_empty());
}

#[tokio::test]
async fn teardown_of_nothing_reports_each_missing_resource() {
    let config = config();
    let mut backend = EmulatorBackend::in_memory("us-west-2");

    let report = teardown(&mut backend, &config).await;

    assert_eq!(report.failures().count(), 3);
    assert!(report.to_string().contains("NoSuchEntity"));
}

#[tokio::test]
async fn etl_before_tables_fails_on_first_copy() {
    let mut config = config();
    config.iam_role.arn = "arn:aws:iam::000000000000:role/dwhRole".to_string();
    let queries = QuerySet::build(&config.s3, &config.iam_role.arn);
    let mut backend = EmulatorBackend::in_memory("us-west-2").with_session_cluster("dwhCluster");
    provision::provision(&mut backend, &config, &ProvisionOptions::default()).await;

    let err = etl::run_etl(&mut backend, &queries).await.unwrap_err();

    assert_eq!(err.to_string(), "copy staging_events failed");
    assert_eq!(
        format!("{:#}", err),
        "copy staging_events failed: relation \"staging_events\" does not exist"
    );
    assert!(backend.executed_statements().is_empty());
}
