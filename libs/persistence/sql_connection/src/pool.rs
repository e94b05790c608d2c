use std::{sync::OnceLock, time::Duration};

use deadpool_postgres::{
    Manager, ManagerConfig, Object, Pool, PoolError, RecyclingMethod,
};
use tokio_postgres::NoTls;
use tracing::{info, instrument, warn};

use crate::config::{DbConnectConfig, DbOptionsConfig};

static SQL_DATABASE_POOL: OnceLock<Pool> = OnceLock::new();

/// Builds the process-wide pool and stores it for
/// [`SqlConnect::from_global`]. Called once at startup.
#[instrument(skip_all, name = "connect-pgsql")]
pub async fn connect_postgres_db<C>(config: &C) -> Result<(), anyhow::Error>
where
    C: DbConnectConfig + DbOptionsConfig,
{
    let pool = build_pool(config)?;

    if SQL_DATABASE_POOL.set(pool.clone()).is_err() {
        panic!("SQL database pool already established")
    }

    if let Some(min_conn) = config.min_conn() {
        prewarm(&pool, min_conn).await;
    }

    Ok(())
}

fn build_pool<C>(config: &C) -> Result<Pool, anyhow::Error>
where
    C: DbConnectConfig + DbOptionsConfig,
{
    info!(
        postgres.url = config.uri(),
        postgres.max_conn = ?config.max_conn(),
        postgres.min_conn = ?config.min_conn(),
        postgres.sql_logger = config.sql_logger()
    );

    let pg_config = config.uri().parse::<tokio_postgres::Config>()?;
    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );

    let mut builder = Pool::builder(manager)
        .runtime(deadpool_postgres::Runtime::Tokio1)
        .wait_timeout(Some(Duration::from_secs(2)))
        .create_timeout(Some(Duration::from_secs(5)))
        .recycle_timeout(Some(Duration::from_millis(100)));
    if let Some(max_conn) = config.max_conn() {
        builder = builder.max_size(max_conn as usize);
    }

    Ok(builder.build()?)
}

/// Establishes `count` connections up front so the first requests
/// after boot do not pay connect latency.
async fn prewarm(pool: &Pool, count: u32) {
    let warmers: Vec<_> = (0..count)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                if let Err(e) = pool.get().await {
                    warn!("pool prewarm connection failed: {e}");
                }
            })
        })
        .collect();

    for warmer in warmers {
        let _ = warmer.await;
    }

    info!(
        "pool ready: {} connections available",
        pool.status().available
    );
}

pub fn get_sql_pool() -> &'static Pool {
    SQL_DATABASE_POOL
        .get()
        .expect("SQL database pool not established")
}

pub fn try_get_sql_pool() -> Option<&'static Pool> {
    SQL_DATABASE_POOL.get()
}

/// Cloneable handle services hold instead of the raw pool
#[derive(Debug, Clone)]
pub struct SqlConnect {
    pool: Pool,
}

impl SqlConnect {
    pub fn new(pool: Pool) -> Self { Self { pool } }

    pub fn from_global() -> Self {
        Self {
            pool: get_sql_pool().clone(),
        }
    }

    pub async fn get_client(&self) -> Result<Object, PoolError> {
        self.pool.get().await
    }

    /// Pool statistics for monitoring: (available, size)
    pub fn get_pool_status(&self) -> (usize, usize) {
        let status = self.pool.status();
        (status.available, status.size)
    }
}

impl Default for SqlConnect {
    fn default() -> Self { Self::from_global() }
}
