//! Load staging tables from S3 and transform them into the star schema

use crate::backend::SqlSession;
use crate::queries::QuerySet;
use crate::tables::execute_in_order;
use anyhow::Result;
use tracing::info;

/// Row counts reported by the load and transform phases
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EtlSummary {
    pub staged_rows: u64,
    pub inserted_rows: u64,
}

/// Run the COPY statements into the staging tables
pub async fn load_staging_tables<S>(session: &mut S, queries: &QuerySet) -> Result<u64>
where
    S: SqlSession + ?Sized,
{
    info!(count = queries.copy.len(), "Loading staging tables");
    execute_in_order(session, &queries.copy).await
}

/// Run the INSERT…SELECT transforms into the fact and dimension tables
pub async fn insert_tables<S>(session: &mut S, queries: &QuerySet) -> Result<u64>
where
    S: SqlSession + ?Sized,
{
    info!(count = queries.insert.len(), "Populating star schema");
    execute_in_order(session, &queries.insert).await
}

pub async fn run_etl<S>(session: &mut S, queries: &QuerySet) -> Result<EtlSummary>
where
    S: SqlSession + ?Sized,
{
    let staged_rows = load_staging_tables(session, queries).await?;
    let inserted_rows = insert_tables(session, queries).await?;
    info!(staged_rows, inserted_rows, "ETL finished");
    Ok(EtlSummary {
        staged_rows,
        inserted_rows,
    })
}
