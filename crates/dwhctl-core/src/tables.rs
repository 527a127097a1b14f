//! Table management: drop every table, then create every table
//!
//! Each statement is committed on its own. The first failing statement
//! aborts the run.

use crate::backend::SqlSession;
use crate::queries::{QuerySet, Statement};
use anyhow::{Context, Result};
use tracing::{debug, info};

/// Execute statements in order, committing after each one.
/// Returns the total number of rows affected.
pub async fn execute_in_order<S>(session: &mut S, statements: &[Statement]) -> Result<u64>
where
    S: SqlSession + ?Sized,
{
    let mut rows = 0;
    for statement in statements {
        debug!(table = statement.table, kind = %statement.kind, sql = %statement.sql.trim(), "Executing");
        rows += session
            .execute(&statement.sql)
            .await
            .with_context(|| format!("{} {} failed", statement.kind, statement.table))?;
        session
            .commit()
            .await
            .with_context(|| format!("commit after {} {} failed", statement.kind, statement.table))?;
        info!(table = statement.table, kind = %statement.kind, "Committed");
    }
    Ok(rows)
}

pub async fn drop_tables<S>(session: &mut S, queries: &QuerySet) -> Result<()>
where
    S: SqlSession + ?Sized,
{
    info!(count = queries.drop.len(), "Dropping tables");
    execute_in_order(session, &queries.drop).await?;
    Ok(())
}

pub async fn create_tables<S>(session: &mut S, queries: &QuerySet) -> Result<()>
where
    S: SqlSession + ?Sized,
{
    info!(count = queries.create.len(), "Creating tables");
    execute_in_order(session, &queries.create).await?;
    Ok(())
}

/// Drop then recreate the staging tables and the star schema
pub async fn reset_tables<S>(session: &mut S, queries: &QuerySet) -> Result<()>
where
    S: SqlSession + ?Sized,
{
    drop_tables(session, queries).await?;
    create_tables(session, queries).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::S3Section;
    use anyhow::bail;
    use async_trait::async_trait;

    #[derive(Default)]
    struct ScriptedSession {
        log: Vec<String>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl SqlSession for ScriptedSession {
        async fn execute(&mut self, sql: &str) -> Result<u64> {
            if let Some(needle) = self.fail_on {
                if sql.contains(needle) {
                    bail!("relation does not exist");
                }
            }
            self.log.push(sql.trim().to_string());
            Ok(0)
        }

        async fn commit(&mut self) -> Result<()> {
            self.log.push("COMMIT".to_string());
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn queries() -> QuerySet {
        QuerySet::build(&S3Section::default(), "arn")
    }

    #[tokio::test]
    async fn every_statement_is_followed_by_a_commit() {
        let mut session = ScriptedSession::default();
        reset_tables(&mut session, &queries()).await.unwrap();

        assert_eq!(session.log.len(), 28);
        assert_eq!(session.log[0], "DROP TABLE IF EXISTS staging_events;");
        assert!(session.log.iter().skip(1).step_by(2).all(|s| s == "COMMIT"));
        assert!(session.log[14].starts_with("CREATE TABLE IF NOT EXISTS staging_events("));
    }

    #[tokio::test]
    async fn first_failure_stops_the_run() {
        let mut session = ScriptedSession {
            fail_on: Some("DROP TABLE IF EXISTS users;"),
            ..Default::default()
        };
        let err = reset_tables(&mut session, &queries()).await.unwrap_err();

        assert_eq!(err.to_string(), "drop users failed");
        // staging_events, staging_songs, songplays dropped and committed
        assert_eq!(session.log.len(), 6);
        assert!(!session.log.iter().any(|s| s.starts_with("CREATE")));
    }
}
