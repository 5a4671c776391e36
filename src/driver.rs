use async_trait::async_trait;

use crate::{DriverResult, Row, SqlValue};

/// Connection, transaction and query primitives of one database engine.
///
/// The gateway never reimplements any of these; it only sequences them so
/// that every leased connection is released exactly once.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// A leased, single-owner handle to a pooled session.
    type Connection: Send + 'static;

    /// Lease a connection from the pool.
    async fn open_connection(&self) -> DriverResult<Self::Connection>;

    async fn begin_transaction(&self, conn: &mut Self::Connection) -> DriverResult<()>;

    async fn commit_transaction(&self, conn: &mut Self::Connection) -> DriverResult<()>;

    async fn rollback_transaction(&self, conn: &mut Self::Connection) -> DriverResult<()>;

    /// Return the connection to the pool.
    ///
    /// Release cannot fail from the caller's point of view; implementations
    /// log and discard any error raised while doing so.
    async fn release_connection(&self, conn: Self::Connection);

    /// Run `sql` with `params` bound positionally by the driver.
    async fn execute_query(
        &self,
        conn: &mut Self::Connection,
        sql: &str,
        params: &[SqlValue],
    ) -> DriverResult<Vec<Row>>;
}
