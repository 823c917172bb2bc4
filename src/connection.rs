use std::ffi::{CStr, CString};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hashlink::LinkedHashMap;
use serde::ser::{Serialize, Serializer};

use crate::handle::ConnectionHandle;
use crate::native::{NativeApi, RawConnection, RawReplica};
use crate::params::{IntoParams, QueryParams};
use crate::rows::QueryResult;
use crate::statement::Statement;
use crate::transaction::{Transaction, TransactionBehavior};
use crate::{sql, Error, Result, Value, ValueType};

/// How a connection was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// A database file on disk.
    Local,
    /// The `:memory:` database.
    InMemory,
    /// A local replica kept in sync with a remote primary.
    RemoteReplica,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionMode::Local => "local",
            ConnectionMode::InMemory => "in-memory",
            ConnectionMode::RemoteReplica => "remote-replica",
        })
    }
}

/// What [`Connection::query_single`] found in the first row.
#[derive(Debug, Clone, PartialEq)]
pub enum QuerySingle {
    /// The whole row, column name to value.
    Row(LinkedHashMap<String, Value>),
    /// The only column of the row.
    Value(Value),
    /// The values of the row, in column order.
    Values(Vec<Value>),
}

/// The outcome of [`Connection::client_exec`]: the result set together with
/// the connection counters read right after it.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientResult {
    columns: Vec<String>,
    column_types: Vec<ValueType>,
    #[serde(serialize_with = "serialize_rows")]
    rows: Vec<LinkedHashMap<String, Value>>,
    rows_affected: u64,
    last_insert_rowid: i64,
}

struct AssocRow<'a>(&'a LinkedHashMap<String, Value>);

impl Serialize for AssocRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter())
    }
}

fn serialize_rows<S: Serializer>(
    rows: &[LinkedHashMap<String, Value>],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(rows.iter().map(AssocRow))
}

impl ClientResult {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_types(&self) -> &[ValueType] {
        &self.column_types
    }

    pub fn rows(&self) -> &[LinkedHashMap<String, Value>] {
        &self.rows
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.last_insert_rowid
    }

    /// The result as a JSON object with the keys `columns`, `columnTypes`,
    /// `rows`, `rowsAffected` and `lastInsertRowid`.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// `true` if `sql` has a `WHERE` keyword that is not its last token. The
/// keyword is matched as a whole word, so `WHERE(id = 1)` counts.
fn has_where_clause(sql: &str) -> bool {
    let sql = sql.trim_end_matches(|c: char| c.is_whitespace() || c == ';');
    let bytes = sql.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';

    bytes.windows(5).enumerate().any(|(start, window)| {
        let end = start + 5;
        window.eq_ignore_ascii_case(b"WHERE")
            && (start == 0 || !is_word(bytes[start - 1]))
            && end < bytes.len()
            && !is_word(bytes[end])
    })
}

/// A connection to a libSQL database, created by [`Builder`](crate::Builder).
///
/// The connection owns its native handle and releases it exactly once, on
/// [`close`](Connection::close) or when dropped. Every call blocks on the
/// native layer; a connection and its transactions are meant for one thread.
pub struct Connection {
    api: Arc<dyn NativeApi>,
    handle: ConnectionHandle,
    replica: Option<RawReplica>,
    mode: ConnectionMode,
}

impl Connection {
    pub(crate) fn new(
        api: Arc<dyn NativeApi>,
        raw: RawConnection,
        replica: Option<RawReplica>,
        mode: ConnectionMode,
    ) -> Connection {
        Connection {
            handle: ConnectionHandle::new(api.clone(), raw),
            api,
            replica,
            mode,
        }
    }

    pub(crate) fn api(&self) -> &dyn NativeApi {
        &*self.api
    }

    pub(crate) fn raw(&self) -> Result<RawConnection> {
        self.handle.get()
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_open()
    }

    /// Runs a query and decodes its rows.
    ///
    /// Positional parameters travel in the native parameter array. Named
    /// parameters are written into the SQL in place of their `:name`,
    /// `@name` or `$name` markers.
    pub fn query(&self, sql: &str, params: impl IntoParams) -> Result<QueryResult<'_>> {
        let raw = self.raw()?;
        let (sql, params) = sql::bind_call(sql, params.into_params()?)?;

        tracing::trace!("query: {:?} ({} params)", sql, params.len());
        let json = self.api.query(raw, &sql, &params).ok_or_else(|| {
            Error::NativeCallFailure("query", sql.to_string_lossy().into_owned())
        })?;
        QueryResult::with_connection(&json, self)
    }

    /// Runs a statement. Returns `Ok(false)` when the native layer reports a
    /// failure. Parameters are handled as in [`query`](Connection::query).
    pub fn exec(&self, sql: &str, params: impl IntoParams) -> Result<bool> {
        let (sql, params) = sql::bind_call(sql, params.into_params()?)?;
        self.exec_native(&sql, &params)
    }

    pub(crate) fn exec_native(&self, sql: &CStr, params: &QueryParams) -> Result<bool> {
        let raw = self.raw()?;
        tracing::trace!("exec: {:?} ({} params)", sql, params.len());
        match self.api.exec(raw, sql, params) {
            Some(_) => Ok(true),
            None => {
                tracing::warn!("native exec failed for {:?}", sql);
                Ok(false)
            }
        }
    }

    /// Runs a query expected to match one row, and returns part of its first
    /// row: the whole row with `entire_row`, otherwise the single value when
    /// the query has one column, or the row's values. `None` if nothing
    /// matched.
    ///
    /// The query must have a `WHERE` clause.
    pub fn query_single(
        &self,
        sql: &str,
        params: impl IntoParams,
        entire_row: bool,
    ) -> Result<Option<QuerySingle>> {
        if !has_where_clause(sql) {
            return Err(Error::StatementMisuse(format!(
                "query_single needs a WHERE clause: {sql}"
            )));
        }

        let result = self.query(sql, params)?;
        let first = match result.rows()?.first() {
            Some(row) => row.clone(),
            None => return Ok(None),
        };
        let single = if entire_row {
            QuerySingle::Row(result.column_names()?.into_iter().map(String::from).zip(first).collect())
        } else if first.len() == 1 {
            QuerySingle::Value(first.into_iter().next().unwrap_or(Value::Null))
        } else {
            QuerySingle::Values(first)
        };
        Ok(Some(single))
    }

    /// Runs a query and collects its rows together with the connection's
    /// change count and last insert rowid.
    pub fn client_exec(&self, sql: &str, params: impl IntoParams) -> Result<ClientResult> {
        let result = self.query(sql, params)?;
        Ok(ClientResult {
            columns: result.column_names()?.into_iter().map(String::from).collect(),
            column_types: result.column_types()?,
            rows: result.fetch_assoc()?,
            rows_affected: self.changes()?,
            last_insert_rowid: self.last_insert_rowid()?,
        })
    }

    /// Runs a script of `;`-separated statements.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let raw = self.raw()?;
        let sql = CString::new(sql)?;

        tracing::trace!("execute batch: {:?}", sql);
        match self.api.execute_batch(raw, &sql) {
            0 => Ok(()),
            status => Err(Error::NativeCallFailure(
                "execute_batch",
                format!("status {status}"),
            )),
        }
    }

    /// Pulls changes from the remote primary. Only remote replicas sync.
    pub fn sync(&self) -> Result<()> {
        self.raw()?;
        let replica = match (self.mode, self.replica) {
            (ConnectionMode::RemoteReplica, Some(replica)) => replica,
            (mode, _) => return Err(Error::UnsupportedOperation("sync", mode)),
        };

        tracing::debug!("syncing replica {:?}", replica);
        match self.api.sync(replica) {
            0 => Ok(()),
            status => Err(Error::NativeCallFailure("sync", format!("status {status}"))),
        }
    }

    /// The version string of the native library.
    pub fn version(&self) -> String {
        self.api.version()
    }

    /// Number of rows changed by the last statement.
    pub fn changes(&self) -> Result<u64> {
        Ok(self.api.affected_rows(self.raw()?))
    }

    pub fn last_insert_rowid(&self) -> Result<i64> {
        Ok(self.api.last_insert_rowid(self.raw()?))
    }

    /// Whether the connection is outside of an explicit transaction, as
    /// reported by the native layer at the time of the call.
    pub fn is_autocommit(&self) -> Result<bool> {
        Ok(self.api.is_autocommit(self.raw()?))
    }

    /// Resets the native connection state.
    pub fn reset(&self) -> Result<()> {
        self.api.reset(self.raw()?);
        Ok(())
    }

    /// Sets how long a statement waits on a locked database before failing.
    pub fn busy_timeout(&self, timeout: Duration) -> Result<()> {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.api
            .busy_timeout(self.raw()?, ms)
            .map_err(|message| Error::NativeCallFailure("busy_timeout", message))
    }

    /// Prepares a statement. Nothing is sent to the native layer until it is
    /// executed.
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>> {
        self.raw()?;
        Statement::new(self, sql)
    }

    /// Begins a deferred transaction.
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        self.transaction_with_behavior(TransactionBehavior::Deferred)
    }

    pub fn transaction_with_behavior(&self, behavior: TransactionBehavior) -> Result<Transaction<'_>> {
        Transaction::begin(self, behavior)
    }

    /// Begins a transaction from a behavior token: `DEFERRED`, `WRITE` or
    /// `READ`.
    pub fn transaction_with(&self, token: &str) -> Result<Transaction<'_>> {
        self.transaction_with_behavior(token.parse()?)
    }

    /// Releases the native connection. Any later call fails with
    /// [`Error::UseAfterClose`].
    pub fn close(&mut self) -> Result<()> {
        if !self.handle.close() {
            return Err(Error::UseAfterClose("connection"));
        }
        self.replica = None;
        Ok(())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("mode", &self.mode)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{has_where_clause, ConnectionMode, QuerySingle};
    use crate::native::mock::MockApi;
    use crate::{named_params, params, Builder, Connection, Error, FetchMode, Result, Value, ValueType};

    const USERS: &str = r#"[
        {"id": {"Integer": 1}, "name": {"Text": "A"}},
        {"id": {"Integer": 2}, "name": {"Text": "B"}}
    ]"#;

    fn checked_memory_handle(mock: &Arc<MockApi>) -> Connection {
        Builder::new_in_memory().build(mock.clone()).unwrap()
    }

    #[test]
    fn test_query_positional() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);
        mock.respond(USERS);

        let result = conn.query("SELECT * FROM users WHERE id > ? AND name <> ?", params![0, "Z"])?;
        assert_eq!(result.num_rows()?, 2);

        let call = mock.last_call();
        assert_eq!(call.sql, "SELECT * FROM users WHERE id > ? AND name <> ?");
        assert_eq!(call.params, ["0", "Z"]);
        Ok(())
    }

    #[test]
    fn test_query_named() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);

        conn.query(
            "SELECT * FROM users WHERE id = :id OR id = @id OR name = $name",
            named_params! { ":id": 1, "name": "it's" },
        )?;
        let call = mock.last_call();
        assert_eq!(
            call.sql,
            "SELECT * FROM users WHERE id = 1 OR id = 1 OR name = 'it''s'"
        );
        assert_eq!(call.params, [""]);
        Ok(())
    }

    #[test]
    fn test_query_without_params() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);
        let result = conn.query("SELECT 1", ())?;
        assert_eq!(result.num_rows()?, 0);
        assert_eq!(mock.last_call().params, [""]);
        Ok(())
    }

    #[test]
    fn test_query_native_failure() {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);
        mock.respond_null();
        assert!(matches!(
            conn.query("SELECT * FROM nope", ()),
            Err(Error::NativeCallFailure("query", _))
        ));
    }

    #[test]
    fn test_query_result_reset() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);
        mock.respond(USERS);

        let mut result = conn.query("SELECT * FROM users", ())?;
        assert_eq!(result.fetch_array(FetchMode::Num)?.len(), 2);
        result.reset()?;
        assert_eq!(mock.resets.get(), 1);
        assert!(matches!(result.num_rows(), Err(Error::UseAfterClose(_))));
        Ok(())
    }

    #[test]
    fn test_exec() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);

        assert!(conn.exec("INSERT INTO users VALUES (?, ?)", params![3, "C"])?);
        assert_eq!(mock.last_call().params, ["3", "C"]);

        mock.exec_response.set(None);
        assert!(!conn.exec("INSERT INTO nope VALUES (1)", ())?);
        Ok(())
    }

    #[test]
    fn test_query_single() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);

        mock.respond(USERS);
        let row = conn.query_single("SELECT * FROM users WHERE id = ?", [1], true)?;
        match row {
            Some(QuerySingle::Row(row)) => {
                assert_eq!(row["id"], Value::Integer(1));
                assert_eq!(row["name"], Value::from("A"));
            }
            other => panic!("unexpected {other:?}"),
        }

        mock.respond(USERS);
        assert_eq!(
            conn.query_single("SELECT * FROM users WHERE id = ?", [1], false)?,
            Some(QuerySingle::Values(vec![Value::Integer(1), Value::from("A")]))
        );

        mock.respond(r#"[{"name": {"Text": "A"}}]"#);
        assert_eq!(
            conn.query_single("select name from users where id = 1;", (), false)?,
            Some(QuerySingle::Value(Value::from("A")))
        );

        mock.respond(r#"[{"name": {"Text": "A"}}]"#);
        assert_eq!(
            conn.query_single("SELECT name FROM users WHERE(id=1)", (), false)?,
            Some(QuerySingle::Value(Value::from("A")))
        );

        mock.respond("[]");
        assert_eq!(
            conn.query_single("SELECT name FROM users WHERE id = 9", (), false)?,
            None
        );
        Ok(())
    }

    #[test]
    fn test_query_single_requires_where() {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);
        for sql in ["SELECT * FROM users", "SELECT * FROM users WHERE", "SELECT 1 WHERE ; "] {
            assert!(matches!(
                conn.query_single(sql, (), true),
                Err(Error::StatementMisuse(_))
            ));
        }
        assert!(mock.calls.borrow().is_empty());
    }

    #[test]
    fn test_has_where_clause() {
        assert!(has_where_clause("SELECT * FROM t WHERE id = 1"));
        assert!(has_where_clause("select * from t\nwhere\tid = 1;"));
        assert!(!has_where_clause("SELECT * FROM t where;;  "));
        assert!(!has_where_clause("SELECT * FROM nowhere"));
        assert!(has_where_clause("SELECT * FROM t WHERE(id=1)"));
        assert!(has_where_clause("SELECT * FROM t\nWHERE\n(id = 1)"));
        assert!(!has_where_clause("SELECT * FROM t WHERE"));
        assert!(!has_where_clause("SELECT wherever FROM t"));
    }

    #[test]
    fn test_client_exec() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);
        mock.respond(USERS);
        mock.changes.set(0);
        mock.rowid.set(2);

        let result = conn.client_exec("SELECT * FROM users", ())?;
        assert_eq!(result.columns(), ["id", "name"]);
        assert_eq!(result.column_types(), [ValueType::Integer, ValueType::Text]);
        assert_eq!(result.rows().len(), 2);
        assert_eq!(result.last_insert_rowid(), 2);
        assert_eq!(
            result.to_json()?,
            r#"{"columns":["id","name"],"columnTypes":["integer","text"],"rows":[{"id":1,"name":"A"},{"id":2,"name":"B"}],"rowsAffected":0,"lastInsertRowid":2}"#
        );
        Ok(())
    }

    #[test]
    fn test_execute_batch() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);
        conn.execute_batch("CREATE TABLE a (x); CREATE TABLE b (y);")?;
        assert_eq!(mock.last_call().op, "execute_batch");

        mock.batch_status.set(1);
        assert!(matches!(
            conn.execute_batch("BOGUS"),
            Err(Error::NativeCallFailure("execute_batch", _))
        ));
        Ok(())
    }

    #[test]
    fn test_sync_unsupported_locally() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = Builder::new_local("file:local.db").build(mock.clone())?;
        assert!(matches!(
            conn.sync(),
            Err(Error::UnsupportedOperation("sync", ConnectionMode::Local))
        ));

        let conn = checked_memory_handle(&mock);
        assert!(matches!(
            conn.sync(),
            Err(Error::UnsupportedOperation("sync", ConnectionMode::InMemory))
        ));
        assert_eq!(mock.syncs.get(), 0);
        Ok(())
    }

    #[test]
    fn test_sync_replica() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = Builder::new_remote_replica("file:replica.db", "libsql://db.example.com", "token")
            .build(mock.clone())?;
        assert_eq!(conn.mode(), ConnectionMode::RemoteReplica);
        conn.sync()?;
        assert_eq!(mock.syncs.get(), 1);

        mock.sync_status.set(-2);
        assert!(matches!(
            conn.sync(),
            Err(Error::NativeCallFailure("sync", _))
        ));
        Ok(())
    }

    #[test]
    fn test_introspection() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);
        mock.rowid.set(5);
        mock.changes.set(3);

        assert!(conn.is_autocommit()?);
        mock.autocommit.set(false);
        assert!(!conn.is_autocommit()?);
        assert_eq!(conn.last_insert_rowid()?, 5);
        assert_eq!(conn.changes()?, 3);
        assert!(conn.version().starts_with("LibSQL version"));

        conn.busy_timeout(Duration::from_millis(250))?;
        assert_eq!(*mock.busy_timeouts.borrow(), [250]);
        Ok(())
    }

    #[test]
    fn test_close() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let mut conn = checked_memory_handle(&mock);
        assert!(conn.is_connected());

        conn.close()?;
        assert!(!conn.is_connected());
        assert!(matches!(conn.close(), Err(Error::UseAfterClose(_))));
        assert!(matches!(conn.query("SELECT 1", ()), Err(Error::UseAfterClose(_))));
        assert!(matches!(conn.exec("SELECT 1", ()), Err(Error::UseAfterClose(_))));
        assert!(matches!(conn.changes(), Err(Error::UseAfterClose(_))));
        assert!(matches!(conn.prepare("SELECT 1"), Err(Error::UseAfterClose(_))));
        assert!(matches!(conn.transaction(), Err(Error::UseAfterClose(_))));
        drop(conn);

        assert_eq!(mock.closed_connections(), 1);
        assert_eq!(mock.open_connections(), 0);
        Ok(())
    }

    #[test]
    fn test_drop_closes() {
        let mock = Arc::new(MockApi::new());
        drop(checked_memory_handle(&mock));
        assert_eq!(mock.closed_connections(), 1);
    }
}
