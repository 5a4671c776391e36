//! Transactional Query Gateway
//!
//! This crate provides connection, transaction and query helpers layered over
//! a pluggable database driver. Every leased connection is released exactly
//! once, whether the surrounding operation succeeds, fails or is cancelled.

pub mod config;
pub mod driver;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod postgres;
pub mod value;

pub use config::DatabaseConfig;
pub use driver::Driver;
pub use error::{DriverResult, GatewayError, GatewayResult};
pub use gateway::{QueryScope, TransactionalQueryGateway};
pub use guard::ConnectionGuard;
pub use postgres::{PgLease, PostgresDriver};
pub use value::{Row, SqlValue};
