//! MySQL and PostgreSQL containers with a connected `sqlx` pool.

use crate::fixture::{CloseError, Fixture, Teardown};
use crate::options::{HostOption, RunOption, RunOptions, apply_host_options, apply_run_options};
use crate::pool::Pool;
use async_trait::async_trait;
use errors::{DockerTestError, FixtureError};
use sqlx::pool::PoolOptions;
use sqlx::{AssertSqlSafe, Connection, Database, Executor};
use std::time::Duration;
use testcontainers::core::ContainerPort;

pub const DEFAULT_MYSQL_IMAGE: &str = "mysql";
pub const DEFAULT_MYSQL_TAG: &str = "8.0";
pub const MYSQL_PORT: ContainerPort = ContainerPort::Tcp(3306);

pub const DEFAULT_POSTGRES_IMAGE: &str = "postgres";
pub const DEFAULT_POSTGRES_TAG: &str = "13";
pub const POSTGRES_PORT: ContainerPort = ContainerPort::Tcp(5432);

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(feature = "mysql")]
#[async_trait]
impl Teardown for sqlx::MySqlPool {
    async fn close(&self) -> Result<(), CloseError> {
        sqlx::Pool::close(self).await;
        Ok(())
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl Teardown for sqlx::PgPool {
    async fn close(&self) -> Result<(), CloseError> {
        sqlx::Pool::close(self).await;
        Ok(())
    }
}

/// Start a database container and return a connected pool.
///
/// `dsn` receives the `host:port` address of `container_port` and returns
/// the connection URL. Connecting means opening the pool and pinging one
/// connection; it is retried until the pool's budget runs out. The container
/// is removed again if no connection could be made.
pub async fn run_docker_db<DB, F>(
    pool: &Pool,
    run: RunOptions,
    container_port: ContainerPort,
    driver: &str,
    dsn: F,
    host_opts: Vec<HostOption>,
) -> Result<Fixture<sqlx::Pool<DB>>, DockerTestError>
where
    DB: Database,
    F: Fn(&str) -> String
{
    let resource = pool
        .run_with_options(driver, run, apply_host_options(host_opts))
        .await?;

    let host_port = match resource.host_port(container_port).await {
        Ok(host_port) => host_port,
        Err(e) => {
            resource.discard().await;
            return Err(e);
        }
    };
    tracing::info!("{} container is running on host port '{}'", driver, host_port);

    let url = dsn(&host_port);
    let url = url.as_str();
    match pool.retry(driver, || connect::<DB>(url)).await {
        Ok(db) => Ok(Fixture::new(db, resource)),
        Err(e) => {
            resource.discard().await;
            Err(e)
        }
    }
}

async fn connect<DB: Database>(url: &str) -> Result<sqlx::Pool<DB>, sqlx::Error> {
    let db = PoolOptions::<DB>::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(url)
        .await?;
    let mut conn = db.acquire().await?;
    conn.ping().await?;
    Ok(db)
}

/// `mysql:8.0` with `MYSQL_ROOT_PASSWORD=secret` and `MYSQL_DATABASE=test`.
pub fn mysql_defaults() -> RunOptions {
    let mut opts = RunOptions::new(DEFAULT_MYSQL_IMAGE, DEFAULT_MYSQL_TAG);
    opts.env = vec![
        "MYSQL_ROOT_PASSWORD=secret".to_string(),
        "MYSQL_DATABASE=test".to_string(),
    ];
    opts.exposed_ports = vec![MYSQL_PORT];
    opts
}

/// Connection URL for the root account, read back from the final options.
pub fn mysql_dsn(opts: &RunOptions, host_port: &str) -> String {
    format!(
        "mysql://root:{}@{}/{}",
        opts.env_value("MYSQL_ROOT_PASSWORD"),
        host_port,
        opts.env_value("MYSQL_DATABASE")
    )
}

/// `postgres:13` with `POSTGRES_PASSWORD=secret` and `POSTGRES_DB=test`.
pub fn postgres_defaults() -> RunOptions {
    let mut opts = RunOptions::new(DEFAULT_POSTGRES_IMAGE, DEFAULT_POSTGRES_TAG);
    opts.env = vec![
        "POSTGRES_PASSWORD=secret".to_string(),
        "POSTGRES_DB=test".to_string(),
    ];
    opts.exposed_ports = vec![POSTGRES_PORT];
    opts
}

pub fn postgres_dsn(opts: &RunOptions, host_port: &str) -> String {
    format!(
        "postgres://postgres:{}@{}/{}?sslmode=disable",
        opts.env_value("POSTGRES_PASSWORD"),
        host_port,
        opts.env_value("POSTGRES_DB")
    )
}

#[cfg(feature = "mysql")]
pub async fn run_mysql() -> Result<Fixture<sqlx::MySqlPool>, DockerTestError> {
    run_mysql_with_options(Vec::new(), Vec::new()).await
}

#[cfg(feature = "mysql")]
pub async fn run_mysql_with_options(
    run_opts: Vec<RunOption>,
    host_opts: Vec<HostOption>,
) -> Result<Fixture<sqlx::MySqlPool>, DockerTestError> {
    let pool = Pool::new()?;
    let opts = apply_run_options(mysql_defaults(), run_opts);
    let dsn_opts = opts.clone();

    run_docker_db::<sqlx::MySql, _>(
        &pool,
        opts,
        MYSQL_PORT,
        "mysql",
        move |host_port| mysql_dsn(&dsn_opts, host_port),
        host_opts,
    )
    .await
}

#[cfg(feature = "postgres")]
pub async fn run_postgres() -> Result<Fixture<sqlx::PgPool>, DockerTestError> {
    run_postgres_with_options(Vec::new(), Vec::new()).await
}

#[cfg(feature = "postgres")]
pub async fn run_postgres_with_options(
    run_opts: Vec<RunOption>,
    host_opts: Vec<HostOption>,
) -> Result<Fixture<sqlx::PgPool>, DockerTestError> {
    let pool = Pool::new()?;
    let opts = apply_run_options(postgres_defaults(), run_opts);
    let dsn_opts = opts.clone();

    run_docker_db::<sqlx::Postgres, _>(
        &pool,
        opts,
        POSTGRES_PORT,
        "postgres",
        move |host_port| postgres_dsn(&dsn_opts, host_port),
        host_opts,
    )
    .await
}

/// Schema and seed data applied by `prep_database`.
#[derive(Debug, Clone, Default)]
pub struct InitialDbSetup {
    /// DDL statements (tables, indexes); may hold several statements
    pub schema_sql: String,
    /// DML statements run in one transaction
    pub initial_data: Vec<String>
}

/// Apply each setup in order: schema first, then the seed statements inside
/// a single transaction that is rolled back on the first failure.
pub async fn prep_database<DB>(
    db: &sqlx::Pool<DB>,
    setups: &[InitialDbSetup],
) -> Result<(), FixtureError>
where
    DB: Database,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>
{
    for setup in setups {
        if !setup.schema_sql.is_empty() {
            sqlx::raw_sql(AssertSqlSafe(setup.schema_sql.as_str()))
                .execute(db)
                .await
                .map_err(|e| FixtureError::SchemaFailed {
                    reason: e.to_string()
                })?;
        }

        if setup.initial_data.is_empty() {
            continue;
        }

        let mut tx = db.begin().await.map_err(|e| FixtureError::TransactionFailed {
            stage: "begin".to_string(),
            reason: e.to_string()
        })?;

        for (index, stmt) in setup.initial_data.iter().enumerate() {
            let result = sqlx::raw_sql(AssertSqlSafe(stmt.as_str()))
                .execute(&mut *tx)
                .await;
            if let Err(e) = result {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!("failed to roll back seed transaction: {}", rollback);
                }
                return Err(FixtureError::StatementFailed {
                    index,
                    reason: e.to_string()
                });
            }
        }

        tx.commit()
            .await
            .map_err(|e| FixtureError::TransactionFailed {
                stage: "commit".to_string(),
                reason: e.to_string()
            })?;
    }
    Ok(())
}
