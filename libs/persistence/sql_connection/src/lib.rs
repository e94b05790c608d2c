pub use deadpool_postgres::PoolError;
pub use tokio_postgres::Error as PgError;

pub use crate::{
    config::{DbConnectConfig, DbOptionsConfig, PostgresDbConfig},
    pool::{
        SqlConnect, connect_postgres_db, get_sql_pool, try_get_sql_pool,
    },
};

pub mod config;
mod pool;
