//! Persistence: two `sqlx::PgPool`s (master, replica) and the typed
//! queries against `auth`, `cert_info`, `cert_domain`. Reads go to the
//! replica pool, writes to the master pool.

pub mod models;
pub mod repo;

use sqlx::postgres::PgPoolOptions;

use crate::config::DbConfig;

#[derive(Clone)]
pub struct Pools {
    pub master: sqlx::PgPool,
    pub replica: sqlx::PgPool,
}

impl Pools {
    pub async fn connect(cfg: &DbConfig) -> Result<Self, sqlx::Error> {
        let master = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect(&cfg.master_dsn)
            .await?;
        let replica = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect(&cfg.replica_dsn)
            .await?;
        Ok(Self { master, replica })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.master).await
    }
}

pub use repo::Repo;
