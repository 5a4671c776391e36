use std::sync::Arc;

use crate::Driver;

/// ConnectionGuard owns one leased connection and guarantees its release.
///
/// Call [`release`](Self::release) on the normal path. If the guard is dropped
/// while still holding its connection (early return, panic, or the owning
/// task being cancelled), the release is scheduled on the current Tokio
/// runtime instead.
pub struct ConnectionGuard<D: Driver> {
    driver: Arc<D>,
    conn: Option<D::Connection>,
}

impl<D: Driver> ConnectionGuard<D> {
    /// Wraps an already leased connection.
    pub fn new(driver: Arc<D>, conn: D::Connection) -> Self {
        Self {
            driver,
            conn: Some(conn),
        }
    }

    /// Mutable access to the leased connection.
    pub fn connection(&mut self) -> &mut D::Connection {
        match self.conn.as_mut() {
            Some(conn) => conn,
            // Only `release`, `into_inner` and `Drop` take the connection,
            // and all of them consume the guard.
            None => unreachable!("connection guard accessed after release"),
        }
    }

    /// Returns the connection to the driver and waits for it to be released.
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.driver.release_connection(conn).await;
        }
    }

    /// Disarms the guard, handing release responsibility back to the caller.
    pub fn into_inner(mut self) -> D::Connection {
        match self.conn.take() {
            Some(conn) => conn,
            None => unreachable!("connection guard accessed after release"),
        }
    }
}

impl<D: Driver> Drop for ConnectionGuard<D> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!("connection guard dropped without release, releasing in background");
                let driver = Arc::clone(&self.driver);
                handle.spawn(async move {
                    driver.release_connection(conn).await;
                });
            }
            Err(_) => {
                tracing::error!("connection guard dropped outside a tokio runtime, connection discarded");
            }
        }
    }
}
