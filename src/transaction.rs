use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use crate::handle::TransactionHandle;
use crate::params::IntoParams;
use crate::{sql, Connection, Error, Result};

/// Options for transaction behavior, as understood by the native begin call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TransactionBehavior {
    #[default]
    Deferred,
    /// Takes the write lock up front. Sent as `WRITE`.
    Immediate,
    /// Sent as `READ`.
    ReadOnly,
}

impl TransactionBehavior {
    /// The token passed to the native layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionBehavior::Deferred => "DEFERRED",
            TransactionBehavior::Immediate => "WRITE",
            TransactionBehavior::ReadOnly => "READ",
        }
    }
}

impl fmt::Display for TransactionBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a behavior token. `IMMEDIATE` is accepted as a spelling of
/// `WRITE`; case is ignored.
impl FromStr for TransactionBehavior {
    type Err = Error;

    fn from_str(token: &str) -> Result<TransactionBehavior> {
        match token.to_ascii_uppercase().as_str() {
            "DEFERRED" => Ok(TransactionBehavior::Deferred),
            "WRITE" | "IMMEDIATE" => Ok(TransactionBehavior::Immediate),
            "READ" => Ok(TransactionBehavior::ReadOnly),
            _ => Err(Error::InvalidBehavior(token.to_string())),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
        })
    }
}

/// A transaction on some connection.
///
/// Exactly one of [`commit`](Transaction::commit) and
/// [`rollback`](Transaction::rollback) goes through; both release the native
/// handle whatever the native layer answers. A transaction dropped while
/// still active is rolled back.
///
/// ```rust,no_run
/// # use libsql_bridge::{Connection, Result};
/// fn transfer(conn: &Connection) -> Result<bool> {
///     let mut tx = conn.transaction()?;
///     tx.exec("UPDATE accounts SET balance = balance - 10 WHERE id = ?", [1])?
///         .exec("UPDATE accounts SET balance = balance + 10 WHERE id = ?", [2])?;
///     tx.commit()
/// }
/// ```
pub struct Transaction<'conn> {
    conn: &'conn Connection,
    handle: TransactionHandle,
    behavior: TransactionBehavior,
    state: TransactionState,
}

impl<'conn> Transaction<'conn> {
    pub(crate) fn begin(conn: &'conn Connection, behavior: TransactionBehavior) -> Result<Transaction<'conn>> {
        let raw = conn
            .api()
            .begin_transaction(conn.raw()?, behavior)
            .ok_or_else(|| Error::NativeCallFailure("begin_transaction", behavior.to_string()))?;
        tracing::debug!("began {} transaction {:?}", behavior, raw);

        Ok(Transaction {
            conn,
            handle: TransactionHandle::new(raw),
            behavior,
            state: TransactionState::Active,
        })
    }

    pub fn behavior(&self) -> TransactionBehavior {
        self.behavior
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    fn check_active(&self) -> Result<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            state => Err(Error::TransactionClosed(state)),
        }
    }

    /// Runs a statement inside the transaction. Returns the transaction so
    /// calls can be chained.
    pub fn exec(&mut self, sql: &str, params: impl IntoParams) -> Result<&mut Transaction<'conn>> {
        self.check_active()?;
        let raw = self.handle.get()?;
        let (sql, params) = sql::bind_call(sql, params.into_params()?)?;

        tracing::trace!("transaction exec: {:?} ({} params)", sql, params.len());
        let next = self
            .conn
            .api()
            .transaction_exec(raw, &sql, &params)
            .ok_or_else(|| {
                Error::NativeCallFailure("transaction_exec", sql.to_string_lossy().into_owned())
            })?;
        self.handle.replace(next);
        Ok(self)
    }

    /// Commits. Returns `Ok(false)` when the native layer reports a failure;
    /// the transaction is finished either way.
    pub fn commit(&mut self) -> Result<bool> {
        self.finish(TransactionState::Committed)
    }

    /// Rolls back. Returns `Ok(false)` when the native layer reports a
    /// failure; the transaction is finished either way.
    pub fn rollback(&mut self) -> Result<bool> {
        self.finish(TransactionState::RolledBack)
    }

    fn finish(&mut self, state: TransactionState) -> Result<bool> {
        self.check_active()?;
        let raw = self
            .handle
            .take()
            .ok_or(Error::UseAfterClose("transaction"))?;
        self.state = state;

        let api = self.conn.api();
        let ok = match state {
            TransactionState::Committed => api.transaction_commit(raw),
            _ => api.transaction_rollback(raw),
        };
        if ok {
            tracing::debug!("transaction {:?} {}", raw, state);
        } else {
            tracing::warn!("native layer failed to finish transaction {:?} as {}", raw, state);
        }
        Ok(ok)
    }
}

impl Deref for Transaction<'_> {
    type Target = Connection;

    #[inline]
    fn deref(&self) -> &Connection {
        self.conn
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("behavior", &self.behavior)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state != TransactionState::Active {
            return;
        }
        if let Some(raw) = self.handle.take() {
            tracing::warn!("rolling back transaction {:?} dropped while active", raw);
            self.state = TransactionState::RolledBack;
            self.conn.api().transaction_rollback(raw);
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{TransactionBehavior, TransactionState};
    use crate::native::mock::MockApi;
    use crate::{params, Builder, Connection, Error, Result};

    fn checked_memory_handle(mock: &Arc<MockApi>) -> Connection {
        Builder::new_in_memory().build(mock.clone()).unwrap()
    }

    #[test]
    fn test_behavior_tokens() {
        assert_eq!("DEFERRED".parse::<TransactionBehavior>().unwrap(), TransactionBehavior::Deferred);
        assert_eq!("write".parse::<TransactionBehavior>().unwrap(), TransactionBehavior::Immediate);
        assert_eq!("IMMEDIATE".parse::<TransactionBehavior>().unwrap(), TransactionBehavior::Immediate);
        assert_eq!("READ".parse::<TransactionBehavior>().unwrap(), TransactionBehavior::ReadOnly);
        assert!(matches!(
            "EXCLUSIVE".parse::<TransactionBehavior>(),
            Err(Error::InvalidBehavior(_))
        ));
        assert_eq!(TransactionBehavior::Immediate.to_string(), "WRITE");
    }

    #[test]
    fn test_commit() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);
        {
            let mut tx = conn.transaction_with("DEFERRED")?;
            tx.exec("INSERT INTO foo VALUES(?)", [1])?
                .exec("INSERT INTO foo VALUES(?)", [2])?;
            assert!(tx.commit()?);
            assert_eq!(tx.state(), TransactionState::Committed);
            assert!(matches!(
                tx.rollback(),
                Err(Error::TransactionClosed(TransactionState::Committed))
            ));
            assert!(matches!(
                tx.exec("SELECT 1", ()),
                Err(Error::TransactionClosed(_))
            ));
        }
        assert_eq!(mock.commits(), 1);
        assert_eq!(mock.rollbacks(), 0);
        assert_eq!(mock.open_transactions(), 0);
        assert_eq!(*mock.behaviors.borrow(), [TransactionBehavior::Deferred]);

        let calls = mock.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].op, "transaction_exec");
        assert_eq!(calls[1].params, ["2"]);
        Ok(())
    }

    #[test]
    fn test_rollback() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);

        let mut tx = conn.transaction_with_behavior(TransactionBehavior::ReadOnly)?;
        tx.exec("SELECT :a", params![1])?;
        assert!(tx.rollback()?);
        assert!(matches!(
            tx.commit(),
            Err(Error::TransactionClosed(TransactionState::RolledBack))
        ));
        drop(tx);
        assert_eq!(mock.rollbacks(), 1);
        assert_eq!(mock.commits(), 0);
        Ok(())
    }

    #[test]
    fn test_drop_rolls_back() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);
        {
            let mut tx = conn.transaction()?;
            tx.exec("INSERT INTO foo VALUES(1)", ())?;
        }
        assert_eq!(mock.rollbacks(), 1);
        assert_eq!(mock.open_transactions(), 0);
        Ok(())
    }

    #[test]
    fn test_failed_commit_still_releases() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);
        mock.commit_ok.set(false);

        let mut tx = conn.transaction()?;
        assert!(!tx.commit()?);
        assert_eq!(tx.state(), TransactionState::Committed);
        drop(tx);
        assert_eq!(mock.commits(), 1);
        assert_eq!(mock.rollbacks(), 0);
        assert_eq!(mock.open_transactions(), 0);
        Ok(())
    }

    #[test]
    fn test_failed_exec_keeps_transaction() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);

        let mut tx = conn.transaction()?;
        mock.fail_transaction_exec.set(true);
        assert!(matches!(
            tx.exec("INSERT INTO nope VALUES(1)", ()),
            Err(Error::NativeCallFailure("transaction_exec", _))
        ));
        mock.fail_transaction_exec.set(false);
        tx.exec("INSERT INTO foo VALUES(1)", ())?;
        assert!(tx.commit()?);
        Ok(())
    }

    #[test]
    fn test_named_params_inlined() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);

        let mut tx = conn.transaction()?;
        tx.exec("UPDATE foo SET x = :x WHERE id = @id", [(":x", "a'b"), ("id", "1")])?;
        assert_eq!(
            mock.last_call().sql,
            "UPDATE foo SET x = 'a''b' WHERE id = '1'"
        );
        tx.commit()?;
        Ok(())
    }

    #[test]
    fn test_delegates_to_connection() -> Result<()> {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);
        mock.rowid.set(9);
        mock.changes.set(2);

        let tx = conn.transaction()?;
        mock.autocommit.set(false);
        assert!(!tx.is_autocommit()?);
        assert_eq!(tx.last_insert_rowid()?, 9);
        assert_eq!(tx.changes()?, 2);
        tx.reset()?;
        assert_eq!(mock.resets.get(), 1);
        Ok(())
    }

    #[test]
    fn test_unknown_behavior_token() {
        let mock = Arc::new(MockApi::new());
        let conn = checked_memory_handle(&mock);
        assert!(matches!(
            conn.transaction_with("EXCLUSIVE"),
            Err(Error::InvalidBehavior(_))
        ));
        assert!(mock.behaviors.borrow().is_empty());
    }
}
