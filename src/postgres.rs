use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Executor as _, Postgres, Row as _, TypeInfo, ValueRef};
use std::sync::Arc;

use crate::{
    DatabaseConfig, Driver, DriverResult, GatewayError, GatewayResult, Row, SqlValue,
    TransactionalQueryGateway,
};

/// PostgreSQL implementation of [`Driver`] backed by an sqlx pool.
#[derive(Clone, Debug)]
pub struct PostgresDriver {
    pool: PgPool,
}

impl PostgresDriver {
    /// Create a driver over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a connection pool from `config`.
    #[tracing::instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> GatewayResult<Self> {
        tracing::debug!("Creating database connection pool");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(GatewayError::ConnectionAcquisition)?;

        tracing::info!(
            max_connections = config.max_connections,
            "Database connection pool created successfully"
        );

        Ok(Self::new(pool))
    }

    /// The pool leases are taken from.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl TransactionalQueryGateway<PostgresDriver> {
    /// Connect a PostgreSQL pool and wrap it in a gateway.
    pub async fn connect(config: &DatabaseConfig) -> GatewayResult<Self> {
        let driver = PostgresDriver::connect(config).await?;
        Ok(Self::new(Arc::new(driver)))
    }
}

/// A pooled PostgreSQL connection leased through [`PostgresDriver`].
pub struct PgLease {
    conn: PoolConnection<Postgres>,
    in_transaction: bool,
}

impl PgLease {
    /// Whether a `BEGIN` has been issued without a successful `COMMIT` or `ROLLBACK`.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// The underlying sqlx connection, for queries the gateway does not cover.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    type Connection = PgLease;

    async fn open_connection(&self) -> DriverResult<PgLease> {
        let conn = self.pool.acquire().await?;
        Ok(PgLease {
            conn,
            in_transaction: false,
        })
    }

    async fn begin_transaction(&self, lease: &mut PgLease) -> DriverResult<()> {
        (&mut *lease.conn).execute("BEGIN").await?;
        lease.in_transaction = true;
        Ok(())
    }

    async fn commit_transaction(&self, lease: &mut PgLease) -> DriverResult<()> {
        (&mut *lease.conn).execute("COMMIT").await?;
        lease.in_transaction = false;
        Ok(())
    }

    async fn rollback_transaction(&self, lease: &mut PgLease) -> DriverResult<()> {
        (&mut *lease.conn).execute("ROLLBACK").await?;
        lease.in_transaction = false;
        Ok(())
    }

    async fn release_connection(&self, lease: PgLease) {
        // A session with an unfinished transaction must not go back to the pool.
        if lease.in_transaction {
            tracing::warn!("closing connection released with an open transaction");
            if let Err(err) = lease.conn.close().await {
                tracing::warn!(error = %err, "failed to close connection");
            }
        } else {
            // Dropping a pool connection returns it to the pool.
            drop(lease.conn);
        }
    }

    async fn execute_query(
        &self,
        lease: &mut PgLease,
        sql: &str,
        params: &[SqlValue],
    ) -> DriverResult<Vec<Row>> {
        let query = params
            .iter()
            .fold(sqlx::query(sql), |query, value| bind_value(query, value));

        let rows = query.fetch_all(&mut *lease.conn).await?;
        rows.iter().map(decode_row).collect()
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        // Untyped NULLs go out as text; cast the placeholder for other columns.
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Bytes(v) => query.bind(v.clone()),
        SqlValue::Uuid(v) => query.bind(*v),
        SqlValue::Numeric(v) => query.bind(v.clone()),
        SqlValue::Timestamp(v) => query.bind(*v),
        SqlValue::NaiveTimestamp(v) => query.bind(*v),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::Time(v) => query.bind(*v),
        SqlValue::Json(v) => query.bind(v.clone()),
    }
}

fn decode_row(row: &PgRow) -> DriverResult<Row> {
    let mut decoded = Row::with_capacity(row.len());

    for column in row.columns() {
        let idx = column.ordinal();
        if row.try_get_raw(idx)?.is_null() {
            decoded.push(column.name(), SqlValue::Null);
            continue;
        }

        let value = match column.type_info().name() {
            "BOOL" => SqlValue::Bool(row.try_get(idx)?),
            "INT2" => SqlValue::Int(row.try_get::<i16, _>(idx)?.into()),
            "INT4" => SqlValue::Int(row.try_get::<i32, _>(idx)?.into()),
            "INT8" => SqlValue::Int(row.try_get(idx)?),
            "FLOAT4" => SqlValue::Float(row.try_get::<f32, _>(idx)?.into()),
            "FLOAT8" => SqlValue::Float(row.try_get(idx)?),
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => SqlValue::Text(row.try_get(idx)?),
            "UUID" => SqlValue::Uuid(row.try_get(idx)?),
            "BYTEA" => SqlValue::Bytes(row.try_get(idx)?),
            "NUMERIC" => SqlValue::Numeric(row.try_get(idx)?),
            "TIMESTAMPTZ" => SqlValue::Timestamp(row.try_get(idx)?),
            "TIMESTAMP" => SqlValue::NaiveTimestamp(row.try_get(idx)?),
            "DATE" => SqlValue::Date(row.try_get(idx)?),
            "TIME" => SqlValue::Time(row.try_get(idx)?),
            "JSON" | "JSONB" => SqlValue::Json(row.try_get(idx)?),
            other => {
                return Err(sqlx::Error::ColumnDecode {
                    index: column.name().to_string(),
                    source: format!("unsupported column type {other}").into(),
                })
            }
        };
        decoded.push(column.name(), value);
    }

    Ok(decoded)
}
