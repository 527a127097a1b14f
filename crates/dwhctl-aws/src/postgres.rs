//! Postgres-protocol session against the Redshift cluster

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use dwhctl_core::{ClusterSection, SqlSession};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tracing::{debug, warn};

/// One connection running statements inside explicit transactions.
///
/// A transaction is opened lazily by the first `execute` after a commit,
/// so each `commit` covers exactly the statements run since the last one.
pub struct PgSession {
    conn: Option<PgConnection>,
    in_transaction: bool,
}

impl PgSession {
    /// Connect using the `CLUSTER` config section
    pub async fn connect(cluster: &ClusterSection) -> Result<Self> {
        let options = connect_options(cluster);
        let conn = PgConnection::connect_with(&options).await.with_context(|| {
            format!(
                "Failed to connect to {}:{}/{}",
                cluster.host, cluster.db_port, cluster.db_name
            )
        })?;
        debug!(host = %cluster.host, db = %cluster.db_name, "Connected to warehouse");
        Ok(Self {
            conn: Some(conn),
            in_transaction: false,
        })
    }

    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| anyhow!("connection is already closed"))
    }
}

fn connect_options(cluster: &ClusterSection) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&cluster.host)
        .port(cluster.db_port)
        .database(&cluster.db_name)
        .username(&cluster.db_user)
        .password(&cluster.db_password)
}

#[async_trait]
impl SqlSession for PgSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let begin = !self.in_transaction;
        let conn = self.conn()?;
        if begin {
            sqlx::Executor::execute(&mut *conn, sqlx::raw_sql("BEGIN")).await?;
        }
        self.in_transaction = true;

        let conn = self.conn()?;
        let result = sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(sql)).await?;
        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        let conn = self.conn()?;
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql("COMMIT")).await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        if self.in_transaction {
            if let Err(e) = sqlx::Executor::execute(&mut conn, sqlx::raw_sql("ROLLBACK")).await {
                warn!(error = %e, "Rollback before close failed");
            }
            self.in_transaction = false;
        }
        conn.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_come_from_cluster_section() {
        let cluster = ClusterSection {
            host: "dwhcluster.abc.us-west-2.redshift.amazonaws.com".to_string(),
            db_name: "dwh".to_string(),
            db_user: "dwhuser".to_string(),
            db_password: "Passw0rd".to_string(),
            db_port: 5439,
        };

        let options = connect_options(&cluster);
        assert_eq!(options.get_host(), cluster.host);
        assert_eq!(options.get_port(), 5439);
        assert_eq!(options.get_database(), Some("dwh"));
        assert_eq!(options.get_username(), "dwhuser");
    }

    #[tokio::test]
    async fn closed_session_rejects_statements() {
        let mut session = PgSession {
            conn: None,
            in_transaction: false,
        };
        assert!(session.execute("SELECT 1").await.is_err());
        session.commit().await.unwrap();
        session.close().await.unwrap();
    }
}
