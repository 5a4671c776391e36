use futures::future::BoxFuture;
use std::sync::Arc;

use crate::{ConnectionGuard, Driver, GatewayError, GatewayResult, Row, SqlValue};

/// Connection-scoped transaction helper over a [`Driver`].
///
/// The gateway holds no state besides its driver. Prefer
/// [`run_in_transaction`](Self::run_in_transaction) for transactional work;
/// the manual [`start_transaction`](Self::start_transaction) /
/// [`commit_transaction`](Self::commit_transaction) /
/// [`rollback_transaction`](Self::rollback_transaction) triad leaves the
/// commit-or-rollback obligation with the caller.
pub struct TransactionalQueryGateway<D: Driver> {
    driver: Arc<D>,
}

impl<D: Driver> Clone for TransactionalQueryGateway<D> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
        }
    }
}

impl<D: Driver> TransactionalQueryGateway<D> {
    /// Create a gateway delegating to `driver`.
    pub fn new(driver: Arc<D>) -> Self {
        Self { driver }
    }

    /// The driver every operation is delegated to.
    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    /// Lease a connection from the driver's pool.
    ///
    /// The caller owns the connection and must hand it back through
    /// [`Driver::release_connection`], a commit or a rollback.
    #[tracing::instrument(skip_all)]
    pub async fn get_connection(&self) -> GatewayResult<D::Connection> {
        self.driver.open_connection().await.map_err(|err| {
            tracing::warn!(error = %err, "failed to acquire connection");
            GatewayError::ConnectionAcquisition(err)
        })
    }

    /// Lease a connection wrapped in a guard that releases it on every exit path.
    pub async fn acquire(&self) -> GatewayResult<ConnectionGuard<D>> {
        let conn = self.get_connection().await?;
        Ok(ConnectionGuard::new(Arc::clone(&self.driver), conn))
    }

    /// Lease a connection and open a transaction on it.
    ///
    /// If the transaction cannot be started the connection is released
    /// before the error is returned.
    #[tracing::instrument(skip_all)]
    pub async fn start_transaction(&self) -> GatewayResult<D::Connection> {
        let guard = self.begin().await?;
        Ok(guard.into_inner())
    }

    /// Commit the transaction on `conn`, then release it.
    ///
    /// The connection is released whether or not the commit succeeds.
    #[tracing::instrument(skip_all)]
    pub async fn commit_transaction(&self, conn: D::Connection) -> GatewayResult<()> {
        self.commit(ConnectionGuard::new(Arc::clone(&self.driver), conn))
            .await
    }

    /// Roll back the transaction on `conn`, then release it.
    ///
    /// The connection is released whether or not the rollback succeeds.
    #[tracing::instrument(skip_all)]
    pub async fn rollback_transaction(&self, conn: D::Connection) -> GatewayResult<()> {
        self.rollback(ConnectionGuard::new(Arc::clone(&self.driver), conn))
            .await
    }

    /// Run a parameterized query on an existing connection.
    #[tracing::instrument(skip(self, conn, params), fields(param_count = params.len()))]
    pub async fn execute_query(
        &self,
        conn: &mut D::Connection,
        sql: &str,
        params: &[SqlValue],
    ) -> GatewayResult<Vec<Row>> {
        run_query(&*self.driver, conn, sql, params).await
    }

    /// Run a single query outside any transaction on a freshly leased
    /// connection, which is released before returning.
    #[tracing::instrument(skip(self, params), fields(param_count = params.len()))]
    pub async fn execute_single_query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> GatewayResult<Vec<Row>> {
        let mut guard = self.acquire().await?;
        let result = run_query(&*self.driver, guard.connection(), sql, params).await;
        guard.release().await;
        result
    }

    /// Run `work` inside a transaction on a single connection.
    ///
    /// The transaction is committed when `work` returns `Ok` and rolled back
    /// when it returns `Err`; the connection is released in both cases. An
    /// error from `work` is returned unchanged even if the rollback fails.
    /// Failures to begin or commit are converted into `E`.
    ///
    /// ```rust,ignore
    /// use futures::FutureExt;
    ///
    /// gateway
    ///     .run_in_transaction(|mut scope| {
    ///         async move {
    ///             scope.execute("INSERT INTO t VALUES ($1)", &[1.into()]).await?;
    ///             Ok::<_, GatewayError>(())
    ///         }
    ///         .boxed()
    ///     })
    ///     .await?;
    /// ```
    #[tracing::instrument(skip_all)]
    pub async fn run_in_transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(QueryScope<'c, D>) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: From<GatewayError> + Send,
    {
        let mut guard = self.begin().await?;
        let outcome = work(QueryScope::new(&*self.driver, guard.connection())).await;

        match outcome {
            Ok(value) => {
                self.commit(guard).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback(guard).await {
                    tracing::warn!(error = %rollback_err, "rollback after failed work also failed");
                }
                Err(err)
            }
        }
    }

    async fn begin(&self) -> GatewayResult<ConnectionGuard<D>> {
        let mut guard = self.acquire().await?;

        if let Err(err) = self.driver.begin_transaction(guard.connection()).await {
            tracing::warn!(error = %err, "failed to begin transaction");
            guard.release().await;
            return Err(GatewayError::TransactionStart(err));
        }

        tracing::debug!("transaction started");
        Ok(guard)
    }

    async fn commit(&self, mut guard: ConnectionGuard<D>) -> GatewayResult<()> {
        let result = self.driver.commit_transaction(guard.connection()).await;
        guard.release().await;

        match result {
            Ok(()) => {
                tracing::debug!("transaction committed");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to commit transaction");
                Err(GatewayError::Commit(err))
            }
        }
    }

    async fn rollback(&self, mut guard: ConnectionGuard<D>) -> GatewayResult<()> {
        let result = self.driver.rollback_transaction(guard.connection()).await;
        guard.release().await;

        match result {
            Ok(()) => {
                tracing::debug!("transaction rolled back");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to roll back transaction");
                Err(GatewayError::Rollback(err))
            }
        }
    }
}

/// The connection lent to the work of
/// [`run_in_transaction`](TransactionalQueryGateway::run_in_transaction).
pub struct QueryScope<'c, D: Driver> {
    driver: &'c D,
    conn: &'c mut D::Connection,
}

impl<'c, D: Driver> QueryScope<'c, D> {
    fn new(driver: &'c D, conn: &'c mut D::Connection) -> Self {
        Self { driver, conn }
    }

    /// Run a parameterized query inside the transaction.
    pub async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> GatewayResult<Vec<Row>> {
        run_query(self.driver, &mut *self.conn, sql, params).await
    }

    /// The raw connection, for driver-specific calls.
    pub fn connection(&mut self) -> &mut D::Connection {
        &mut *self.conn
    }
}

async fn run_query<D: Driver>(
    driver: &D,
    conn: &mut D::Connection,
    sql: &str,
    params: &[SqlValue],
) -> GatewayResult<Vec<Row>> {
    driver
        .execute_query(conn, sql, params)
        .await
        .map_err(|err| {
            tracing::debug!(error = %err, "query failed");
            GatewayError::QueryExecution(err)
        })
}
