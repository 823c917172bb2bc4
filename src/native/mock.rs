//! A recording fake of the native call table.
//!
//! Handles are fabricated addresses that are never dereferenced. Releasing a
//! handle twice, or using one after release, panics so ownership bugs fail
//! the test that triggers them.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::ffi::{c_void, CStr};

use super::{NativeApi, RawConnection, RawReplica, RawTransaction};
use crate::params::QueryParams;
use crate::transaction::TransactionBehavior;
use crate::AccessMode;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Call {
    pub op: &'static str,
    pub sql: String,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Connect {
    pub path: String,
    pub mode: Option<AccessMode>,
    pub encryption_key: Option<String>,
    pub url: Option<String>,
    pub token: Option<String>,
    pub sync_interval_secs: Option<usize>,
    pub read_your_writes: Option<bool>,
}

pub(crate) struct MockApi {
    next_id: Cell<usize>,
    live_connections: RefCell<HashSet<usize>>,
    live_transactions: RefCell<HashSet<usize>>,
    closed: Cell<usize>,
    committed: Cell<usize>,
    rolled_back: Cell<usize>,
    pub connects: RefCell<Vec<Connect>>,
    pub calls: RefCell<Vec<Call>>,
    pub behaviors: RefCell<Vec<TransactionBehavior>>,
    pub query_responses: RefCell<VecDeque<Option<String>>>,
    pub exec_response: Cell<Option<i64>>,
    pub fail_connect: Cell<bool>,
    pub fail_transaction_exec: Cell<bool>,
    pub commit_ok: Cell<bool>,
    pub rollback_ok: Cell<bool>,
    pub autocommit: Cell<bool>,
    pub rowid: Cell<i64>,
    pub changes: Cell<u64>,
    pub sync_status: Cell<i32>,
    pub syncs: Cell<usize>,
    pub batch_status: Cell<i32>,
    pub resets: Cell<usize>,
    pub busy_timeouts: RefCell<Vec<u64>>,
}

impl MockApi {
    pub(crate) fn new() -> MockApi {
        MockApi {
            next_id: Cell::new(1),
            live_connections: RefCell::default(),
            live_transactions: RefCell::default(),
            closed: Cell::new(0),
            committed: Cell::new(0),
            rolled_back: Cell::new(0),
            connects: RefCell::default(),
            calls: RefCell::default(),
            behaviors: RefCell::default(),
            query_responses: RefCell::default(),
            exec_response: Cell::new(Some(0)),
            fail_connect: Cell::new(false),
            fail_transaction_exec: Cell::new(false),
            commit_ok: Cell::new(true),
            rollback_ok: Cell::new(true),
            autocommit: Cell::new(true),
            rowid: Cell::new(0),
            changes: Cell::new(0),
            sync_status: Cell::new(0),
            syncs: Cell::new(0),
            batch_status: Cell::new(0),
            resets: Cell::new(0),
            busy_timeouts: RefCell::default(),
        }
    }

    /// Queues the payload returned by the next `query` call.
    pub(crate) fn respond(&self, json: &str) {
        self.query_responses
            .borrow_mut()
            .push_back(Some(json.to_string()));
    }

    pub(crate) fn respond_null(&self) {
        self.query_responses.borrow_mut().push_back(None);
    }

    pub(crate) fn closed_connections(&self) -> usize {
        self.closed.get()
    }

    pub(crate) fn open_connections(&self) -> usize {
        self.live_connections.borrow().len()
    }

    pub(crate) fn open_transactions(&self) -> usize {
        self.live_transactions.borrow().len()
    }

    pub(crate) fn commits(&self) -> usize {
        self.committed.get()
    }

    pub(crate) fn rollbacks(&self) -> usize {
        self.rolled_back.get()
    }

    pub(crate) fn last_call(&self) -> Call {
        self.calls.borrow().last().cloned().expect("no native call recorded")
    }

    fn fabricate(&self) -> *mut c_void {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        (0x1000 + id * 0x10) as *mut c_void
    }

    fn check_connection(&self, conn: RawConnection) {
        assert!(
            self.live_connections
                .borrow()
                .contains(&(conn.as_ptr() as usize)),
            "connection {conn:?} used after release"
        );
    }

    fn check_transaction(&self, tx: RawTransaction) {
        assert!(
            self.live_transactions
                .borrow()
                .contains(&(tx.as_ptr() as usize)),
            "transaction {tx:?} used after release"
        );
    }

    fn record(&self, op: &'static str, sql: &CStr, params: Option<&QueryParams>) {
        let params = params
            .map(|p| {
                p.entries()
                    .map(|e| e.to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        self.calls.borrow_mut().push(Call {
            op,
            sql: sql.to_string_lossy().into_owned(),
            params,
        });
    }

    fn new_connection(&self) -> Option<RawConnection> {
        let conn = RawConnection::from_ptr(self.fabricate())?;
        self.live_connections
            .borrow_mut()
            .insert(conn.as_ptr() as usize);
        Some(conn)
    }

    fn release_transaction(&self, tx: RawTransaction) {
        let released = self
            .live_transactions
            .borrow_mut()
            .remove(&(tx.as_ptr() as usize));
        assert!(released, "transaction {tx:?} released twice");
    }
}

impl NativeApi for MockApi {
    fn connect_local(
        &self,
        path: &CStr,
        mode: AccessMode,
        encryption_key: Option<&CStr>,
    ) -> Option<RawConnection> {
        self.connects.borrow_mut().push(Connect {
            path: path.to_string_lossy().into_owned(),
            mode: Some(mode),
            encryption_key: encryption_key.map(|k| k.to_string_lossy().into_owned()),
            url: None,
            token: None,
            sync_interval_secs: None,
            read_your_writes: None,
        });
        if self.fail_connect.get() {
            return None;
        }
        self.new_connection()
    }

    fn connect_remote_replica(
        &self,
        path: &CStr,
        url: &CStr,
        token: &CStr,
        sync_interval_secs: usize,
        read_your_writes: bool,
    ) -> Option<(RawReplica, RawConnection)> {
        self.connects.borrow_mut().push(Connect {
            path: path.to_string_lossy().into_owned(),
            mode: None,
            encryption_key: None,
            url: Some(url.to_string_lossy().into_owned()),
            token: Some(token.to_string_lossy().into_owned()),
            sync_interval_secs: Some(sync_interval_secs),
            read_your_writes: Some(read_your_writes),
        });
        if self.fail_connect.get() {
            return None;
        }
        let replica = RawReplica::from_ptr(self.fabricate())?;
        Some((replica, self.new_connection()?))
    }

    fn close(&self, conn: RawConnection) {
        let released = self
            .live_connections
            .borrow_mut()
            .remove(&(conn.as_ptr() as usize));
        assert!(released, "connection {conn:?} released twice");
        self.closed.set(self.closed.get() + 1);
    }

    fn is_autocommit(&self, conn: RawConnection) -> bool {
        self.check_connection(conn);
        self.autocommit.get()
    }

    fn last_insert_rowid(&self, conn: RawConnection) -> i64 {
        self.check_connection(conn);
        self.rowid.get()
    }

    fn affected_rows(&self, conn: RawConnection) -> u64 {
        self.check_connection(conn);
        self.changes.get()
    }

    fn sync(&self, _replica: RawReplica) -> i32 {
        self.syncs.set(self.syncs.get() + 1);
        self.sync_status.get()
    }

    fn query(&self, conn: RawConnection, sql: &CStr, params: &QueryParams) -> Option<String> {
        self.check_connection(conn);
        self.record("query", sql, Some(params));
        self.query_responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Some("[]".to_string()))
    }

    fn exec(&self, conn: RawConnection, sql: &CStr, params: &QueryParams) -> Option<i64> {
        self.check_connection(conn);
        self.record("exec", sql, Some(params));
        self.exec_response.get()
    }

    fn execute_batch(&self, conn: RawConnection, sql: &CStr) -> i32 {
        self.check_connection(conn);
        self.record("execute_batch", sql, None);
        self.batch_status.get()
    }

    fn reset(&self, conn: RawConnection) {
        self.check_connection(conn);
        self.resets.set(self.resets.get() + 1);
    }

    fn busy_timeout(&self, conn: RawConnection, ms: u64) -> Result<(), String> {
        self.check_connection(conn);
        self.busy_timeouts.borrow_mut().push(ms);
        Ok(())
    }

    fn version(&self) -> String {
        "LibSQL version : 3.45.1-3045001".to_string()
    }

    fn begin_transaction(
        &self,
        conn: RawConnection,
        behavior: TransactionBehavior,
    ) -> Option<RawTransaction> {
        self.check_connection(conn);
        self.behaviors.borrow_mut().push(behavior);
        let tx = RawTransaction::from_ptr(self.fabricate())?;
        self.live_transactions
            .borrow_mut()
            .insert(tx.as_ptr() as usize);
        Some(tx)
    }

    fn transaction_exec(
        &self,
        tx: RawTransaction,
        sql: &CStr,
        params: &QueryParams,
    ) -> Option<RawTransaction> {
        self.check_transaction(tx);
        self.record("transaction_exec", sql, Some(params));
        if self.fail_transaction_exec.get() {
            return None;
        }
        Some(tx)
    }

    fn transaction_commit(&self, tx: RawTransaction) -> bool {
        self.release_transaction(tx);
        self.committed.set(self.committed.get() + 1);
        self.commit_ok.get()
    }

    fn transaction_rollback(&self, tx: RawTransaction) -> bool {
        self.release_transaction(tx);
        self.rolled_back.set(self.rolled_back.get() + 1);
        self.rollback_ok.get()
    }
}
