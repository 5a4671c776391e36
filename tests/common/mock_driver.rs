use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use transactional_query_gateway::{Driver, DriverResult, Row, SqlValue};

/// A driver call, tagged with the id of the connection it targeted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(u32),
    Begin(u32),
    Commit(u32),
    Rollback(u32),
    Release(u32),
    Query(u32, String),
}

#[derive(Default)]
struct State {
    capacity: usize,
    leased: usize,
    next_id: u32,
    // Committed contents of the single table `t`
    table: Vec<i64>,
    calls: Vec<Call>,
    fail_begin: bool,
    fail_commit: bool,
    fail_rollback: bool,
}

/// Connection handle of [`MockDriver`]. `staged` holds uncommitted inserts
/// while a transaction is open.
pub struct MockConnection {
    id: u32,
    staged: Option<Vec<i64>>,
}

/// In-memory driver with a bounded pool and a one-column table `t`.
///
/// Understands `INSERT INTO t VALUES ($1)` and `SELECT * FROM t`; any other
/// statement fails with a syntax error.
pub struct MockDriver {
    state: Mutex<State>,
}

impl MockDriver {
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                capacity,
                ..State::default()
            }),
        })
    }

    pub fn leased(&self) -> usize {
        self.state.lock().leased
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn table(&self) -> Vec<i64> {
        self.state.lock().table.clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| matches(call)).count()
    }

    pub fn fail_begin(&self) {
        self.state.lock().fail_begin = true;
    }

    pub fn fail_commit(&self) {
        self.state.lock().fail_commit = true;
    }

    pub fn fail_rollback(&self) {
        self.state.lock().fail_rollback = true;
    }
}

#[async_trait]
impl Driver for MockDriver {
    type Connection = MockConnection;

    async fn open_connection(&self) -> DriverResult<MockConnection> {
        let mut state = self.state.lock();
        if state.leased >= state.capacity {
            return Err(sqlx::Error::PoolTimedOut);
        }
        state.leased += 1;
        state.next_id += 1;
        let id = state.next_id;
        state.calls.push(Call::Open(id));
        Ok(MockConnection { id, staged: None })
    }

    async fn begin_transaction(&self, conn: &mut MockConnection) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Begin(conn.id));
        if state.fail_begin {
            return Err(sqlx::Error::Protocol("begin refused".to_string()));
        }
        conn.staged = Some(Vec::new());
        Ok(())
    }

    async fn commit_transaction(&self, conn: &mut MockConnection) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Commit(conn.id));
        if state.fail_commit {
            return Err(sqlx::Error::Protocol("commit refused".to_string()));
        }
        if let Some(staged) = conn.staged.take() {
            state.table.extend(staged);
        }
        Ok(())
    }

    async fn rollback_transaction(&self, conn: &mut MockConnection) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Rollback(conn.id));
        conn.staged = None;
        if state.fail_rollback {
            return Err(sqlx::Error::Protocol("rollback refused".to_string()));
        }
        Ok(())
    }

    async fn release_connection(&self, conn: MockConnection) {
        let mut state = self.state.lock();
        state.calls.push(Call::Release(conn.id));
        state.leased -= 1;
    }

    async fn execute_query(
        &self,
        conn: &mut MockConnection,
        sql: &str,
        params: &[SqlValue],
    ) -> DriverResult<Vec<Row>> {
        let mut state = self.state.lock();
        state.calls.push(Call::Query(conn.id, sql.to_string()));

        match sql {
            "INSERT INTO t VALUES ($1)" => {
                let value = params
                    .first()
                    .and_then(SqlValue::as_i64)
                    .ok_or_else(|| sqlx::Error::Protocol("expected one integer parameter".to_string()))?;
                match conn.staged.as_mut() {
                    Some(staged) => staged.push(value),
                    None => state.table.push(value),
                }
                Ok(Vec::new())
            }
            "SELECT * FROM t" => {
                let staged = conn.staged.iter().flatten();
                Ok(state
                    .table
                    .iter()
                    .chain(staged)
                    .map(|value| {
                        let mut row = Row::new();
                        row.push("v", *value);
                        row
                    })
                    .collect())
            }
            other => Err(sqlx::Error::Protocol(format!(
                "syntax error at or near \"{other}\""
            ))),
        }
    }
}
