use crate::config::PostgresConfig;
use crate::db::error::DBError;
use crate::db::operations;
use crate::db::operations::pipeline_environment::{
    get_pipeline_environment_by_space, new_pipeline_environment,
};
use crate::db::storage::Storage;
use crate::db::types::pipeline_environment::{
    ExtendedPipelineEnvironment, PipelineEnvironmentDescr, SpaceId,
};
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::{debug, info, warn};
use std::future::Future;
use tokio_postgres::NoTls;
use uuid::Uuid;

/// Postgres-backed storage.
pub struct StoragePostgres {
    pub(crate) config: PostgresConfig,
    pub(crate) pool: Pool,
}

impl StoragePostgres {
    /// Builds the connection pool.
    ///
    /// No connection is established yet, see [`StoragePostgres::connect`].
    pub fn initialize(config: &PostgresConfig) -> Result<Self, DBError> {
        if config.ignores_max_idle() {
            warn!("postgres.connection.maxidle is not supported by the pool and is ignored");
        }
        let pg_config = config.tokio_postgres_config();
        let manager_config = || ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = match config.tls_connector()? {
            Some(connector) => Manager::from_config(pg_config, connector, manager_config()),
            None => Manager::from_config(pg_config, NoTls, manager_config()),
        };
        let mut builder = Pool::builder(manager);
        if let Some(max_size) = config.max_pool_size() {
            builder = builder.max_size(max_size);
        }
        let pool = builder.build().map_err(|e| DBError::PoolBuild {
            error: e.to_string(),
        })?;
        Ok(Self {
            config: config.clone(),
            pool,
        })
    }

    /// Builds the connection pool and waits until the database accepts a
    /// connection, retrying after the configured sleep for as long as it
    /// takes.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, DBError> {
        let db = Self::initialize(config)?;
        let mut attempt: u64 = 1;
        loop {
            match db.check_connection().await {
                Ok(()) => break,
                Err(e) => {
                    warn!(
                        "Unable to connect to Postgres at {}:{} (attempt {attempt}), retrying in {:?}: {e}",
                        config.host, config.port, config.connection_retry_sleep
                    );
                    tokio::time::sleep(config.connection_retry_sleep).await;
                    attempt += 1;
                }
            }
        }
        info!(
            "Connected to Postgres at {}:{} (database '{}')",
            config.host, config.port, config.database
        );
        Ok(db)
    }

    /// Bounds the work of a transaction by the configured transaction timeout.
    async fn with_timeout<T, F>(&self, work: F) -> Result<T, DBError>
    where
        F: Future<Output = Result<T, DBError>>,
    {
        let timeout = self.config.transaction_timeout;
        match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_elapsed) => {
                debug!("Database transaction rolled back after {timeout:?}");
                Err(DBError::TransactionTimeout { timeout })
            }
        }
    }

    /// Applies the schema shipped with the service.
    #[cfg(test)]
    pub(crate) async fn install_schema(&self) -> Result<(), DBError> {
        let client = self.pool.get().await?;
        client
            .batch_execute(include_str!("../../schema/pipeline_environments.sql"))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for StoragePostgres {
    async fn check_connection(&self) -> Result<(), DBError> {
        self.with_timeout(async {
            let mut client = self.pool.get().await?;
            let txn = client.transaction().await?;
            operations::connectivity::check_connection(&txn).await?;
            txn.commit().await?;
            Ok(())
        })
        .await
    }

    async fn new_pipeline_environment(
        &self,
        new_id: Uuid,
        space_id: SpaceId,
        descr: PipelineEnvironmentDescr,
    ) -> Result<ExtendedPipelineEnvironment, DBError> {
        self.with_timeout(async {
            let mut client = self.pool.get().await?;
            let txn = client.transaction().await?;
            let pipeline_environment =
                new_pipeline_environment(&txn, new_id, space_id, &descr).await?;
            txn.commit().await?;
            Ok(pipeline_environment)
        })
        .await
    }

    async fn get_pipeline_environment_by_space(
        &self,
        space_id: SpaceId,
    ) -> Result<ExtendedPipelineEnvironment, DBError> {
        self.with_timeout(async {
            let mut client = self.pool.get().await?;
            let txn = client.transaction().await?;
            let pipeline_environment = get_pipeline_environment_by_space(&txn, space_id).await?;
            txn.commit().await?;
            Ok(pipeline_environment)
        })
        .await
    }
}

#[cfg(test)]
mod test {
    use super::StoragePostgres;
    use crate::config::ServiceConfig;
    use crate::db::error::DBError;
    use crate::db::storage::Storage;
    use crate::db::types::pipeline_environment::SpaceId;
    use actix_web::http::StatusCode;
    use actix_web::ResponseError;
    use std::net::TcpListener;
    use std::time::Duration;
    use uuid::Uuid;

    /// Transactions against a server which accepts connections but never
    /// answers the startup message are cut off after the transaction timeout.
    #[tokio::test]
    async fn transaction_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = ServiceConfig::test_config().postgres;
        config.host = "127.0.0.1".to_string();
        config.port = listener.local_addr().unwrap().port();
        config.connection_timeout = Duration::from_secs(30);
        config.transaction_timeout = Duration::from_millis(50);
        let db = StoragePostgres::initialize(&config).unwrap();

        for error in [
            db.check_connection().await.unwrap_err(),
            db.get_pipeline_environment_by_space(SpaceId(Uuid::now_v7()))
                .await
                .unwrap_err(),
        ] {
            let DBError::TransactionTimeout { timeout } = &error else {
                panic!("unexpected error: {error:?}");
            };
            assert_eq!(*timeout, Duration::from_millis(50));
            assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
        drop(listener);
    }
}
