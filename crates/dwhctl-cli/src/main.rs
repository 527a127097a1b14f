use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dwhctl_aws::{AwsBackend, PgSession};
use dwhctl_core::env::{apply_env_overrides, StdEnvSource};
use dwhctl_core::provision::{self, ProvisionOptions, WaitPolicy};
use dwhctl_core::queries::TABLES;
use dwhctl_core::teardown::teardown;
use dwhctl_core::*;
use dwhctl_emulator::storage::StateExporter;
use dwhctl_emulator::EmulatorBackend;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// State file used by `--emulator` unless `--state-file` says otherwise
const DEFAULT_STATE_FILE: &str = "dwh-emulator.json";

#[derive(Parser, Debug)]
#[command(name = "dwhctl")]
#[command(about = "Provision a Redshift warehouse, create its tables and load them from S3")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Warehouse config file
    #[arg(short, long, global = true, env = "DWH_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Run against the local emulator instead of AWS
    #[arg(long, global = true)]
    emulator: bool,

    /// State file for the emulator
    #[arg(short, long, global = true, default_value = DEFAULT_STATE_FILE)]
    state_file: String,

    /// Custom AWS endpoint (for LocalStack testing)
    #[arg(long, global = true, env = "DWH_ENDPOINT_URL")]
    endpoint_url: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Create the IAM role and the Redshift cluster
    CreateInfra {
        /// Poll until the cluster is available
        #[arg(long)]
        wait: bool,
        /// Seconds between availability polls
        #[arg(long, default_value_t = 30)]
        poll_interval_secs: u64,
        /// Give up after this many polls
        #[arg(long, default_value_t = 40)]
        max_polls: u32,
    },
    /// Delete the Redshift cluster and the IAM role
    CleanupInfra,
    /// Drop and recreate the staging and star schema tables
    CreateTables,
    /// Load the staging tables from S3 and populate the star schema
    Etl,
    /// Show the cluster status and endpoint
    Status,
    /// Print the SQL statements
    ShowSql {
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum KindArg {
    Drop,
    Create,
    Copy,
    Insert,
}

impl From<KindArg> for StatementKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Drop => StatementKind::Drop,
            KindArg::Create => StatementKind::Create,
            KindArg::Copy => StatementKind::Copy,
            KindArg::Insert => StatementKind::Insert,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    run(Cli::parse()).await
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;

    match &cli.command {
        Commands::CreateInfra {
            wait,
            poll_interval_secs,
            max_polls,
        } => {
            let options = ProvisionOptions {
                wait: wait.then(|| WaitPolicy {
                    interval: Duration::from_secs(*poll_interval_secs),
                    max_polls: *max_polls,
                }),
            };
            create_infra(&cli, &config, &options).await
        }
        Commands::CleanupInfra => cleanup_infra(&cli, &config).await,
        Commands::CreateTables => create_tables(&cli, &config).await,
        Commands::Etl => run_etl(&cli, &config).await,
        Commands::Status => show_status(&cli, &config).await,
        Commands::ShowSql { kind } => show_sql(&cli, &config, *kind),
    }
}

fn load_config(path: &Path) -> Result<DwhConfig> {
    let mut config = DwhConfig::load(path)?;
    apply_env_overrides(&mut config, &StdEnvSource)?;
    debug!(?config, "Loaded configuration");
    Ok(config)
}

async fn cloud_backend(cli: &Cli, config: &DwhConfig) -> Result<Box<dyn CloudBackend>> {
    let backend_config = BackendConfig::from_config(config, cli.emulator, Some(cli.state_file.clone()));
    match backend_config {
        BackendConfig::Emulator { state_file, region } => {
            Ok(Box::new(EmulatorBackend::new(state_file, region).await?))
        }
        BackendConfig::Aws {
            region,
            credentials,
            endpoint,
        } => {
            let endpoint = cli.endpoint_url.clone().or(endpoint);
            Ok(Box::new(AwsBackend::connect(region, credentials, endpoint).await?))
        }
    }
}

async fn sql_session(cli: &Cli, config: &DwhConfig) -> Result<Box<dyn SqlSession>> {
    if cli.emulator {
        config.validate_teardown()?;
        let backend = EmulatorBackend::new(Some(cli.state_file.clone()), config.aws.region.clone())
            .await?
            .with_session_cluster(config.redshift.identifier.clone());
        return Ok(Box::new(backend));
    }
    config.validate_connection()?;
    Ok(Box::new(PgSession::connect(&config.cluster).await?))
}

/// Fail the command when any step did not complete
fn finish(report: &RunReport) -> Result<()> {
    if report.has_failures() {
        bail!("{} step(s) did not complete", report.failures().count());
    }
    Ok(())
}

async fn create_infra(cli: &Cli, config: &DwhConfig, options: &ProvisionOptions) -> Result<()> {
    config.validate_provisioning()?;
    let mut backend = cloud_backend(cli, config).await?;

    println!("🔧 Creating IAM role {} and cluster {}", config.iam_role.name, config.redshift.identifier);
    let outcome = provision::provision(backend.as_mut(), config, options).await;

    if cli.json {
        let output = serde_json::json!({
            "steps": outcome.report,
            "role_arn": outcome.role_arn,
            "endpoint": outcome.endpoint,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", outcome.report);
        if let Some(arn) = &outcome.role_arn {
            println!("\n💡 Set IAM_ROLE.ARN = \"{}\"", arn);
        }
        if let Some(endpoint) = &outcome.endpoint {
            println!("💡 Set CLUSTER.HOST = \"{}\"", endpoint.address);
        }
    }

    finish(&outcome.report)
}

async fn cleanup_infra(cli: &Cli, config: &DwhConfig) -> Result<()> {
    config.validate_teardown()?;
    let mut backend = cloud_backend(cli, config).await?;

    println!("🧹 Deleting cluster {} and IAM role {}", config.redshift.identifier, config.iam_role.name);
    let report = teardown(backend.as_mut(), config).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }
    finish(&report)
}

async fn create_tables(cli: &Cli, config: &DwhConfig) -> Result<()> {
    let queries = QuerySet::build(&config.s3, &config.iam_role.arn);
    let mut session = sql_session(cli, config).await?;

    let result = tables::reset_tables(session.as_mut(), &queries).await;
    let closed = session.close().await;
    result?;
    closed?;

    println!("✅ Dropped and created {} tables", TABLES.len());
    Ok(())
}

async fn run_etl(cli: &Cli, config: &DwhConfig) -> Result<()> {
    config.validate_load_sources()?;
    let queries = QuerySet::build(&config.s3, &config.iam_role.arn);
    let mut session = sql_session(cli, config).await?;

    let result = etl::run_etl(session.as_mut(), &queries).await;
    let closed = session.close().await;
    let summary = result?;
    closed?;

    if cli.json {
        let output = serde_json::json!({
            "staged_rows": summary.staged_rows,
            "inserted_rows": summary.inserted_rows,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("✅ Staged {} rows", summary.staged_rows);
        println!("✅ Inserted {} rows into the star schema", summary.inserted_rows);
    }
    Ok(())
}

async fn show_status(cli: &Cli, config: &DwhConfig) -> Result<()> {
    config.validate_teardown()?;

    let (description, summary) = if cli.emulator {
        let backend = EmulatorBackend::new(Some(cli.state_file.clone()), config.aws.region.clone()).await?;
        let description = backend.cluster_status(&config.redshift.identifier)?;
        (description, Some(StateExporter::to_summary(&backend.state())))
    } else {
        let backend = cloud_backend(cli, config).await?;
        (backend.describe_cluster(&config.redshift.identifier).await?, None)
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&description)?);
        return Ok(());
    }

    println!("📊 Cluster {}: {}", description.identifier, description.status);
    match &description.endpoint {
        Some(endpoint) => println!("• Endpoint: {}", endpoint),
        None => println!("• Endpoint: not available yet"),
    }
    if let Some(summary) = summary {
        println!("\n{}", summary);
    }
    Ok(())
}

fn show_sql(cli: &Cli, config: &DwhConfig, kind: Option<KindArg>) -> Result<()> {
    let queries = QuerySet::build(&config.s3, &config.iam_role.arn);
    let kinds: Vec<StatementKind> = match kind {
        Some(kind) => vec![kind.into()],
        None => StatementKind::ALL.to_vec(),
    };

    if cli.json {
        let statements: Vec<&Statement> = kinds
            .iter()
            .flat_map(|kind| queries.statements(*kind))
            .collect();
        println!("{}", serde_json::to_string_pretty(&statements)?);
        return Ok(());
    }

    for kind in kinds {
        let statements = queries.statements(kind);
        println!("-- {} ({} statements)", kind, statements.len());
        for statement in statements {
            println!("{}\n", statement.sql.trim());
        }
    }
    Ok(())
}
