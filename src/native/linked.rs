//! [`NativeApi`] resolved against the real shared library.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr;

use libsql_bridge_sys as sys;

use super::{NativeApi, RawConnection, RawReplica, RawTransaction};
use crate::params::QueryParams;
use crate::transaction::TransactionBehavior;
use crate::AccessMode;

/// The native call table of the linked `sql_php_client` library.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkedApi;

impl LinkedApi {
    pub fn new() -> LinkedApi {
        LinkedApi
    }
}

fn access_token(mode: AccessMode) -> &'static CStr {
    let bytes = match mode {
        AccessMode::ReadOnly => sys::OPEN_READONLY,
        AccessMode::ReadWrite => sys::OPEN_READWRITE,
        AccessMode::Create => sys::OPEN_CREATE,
        AccessMode::ReadWriteCreate => sys::OPEN_READWRITE_CREATE,
        AccessMode::ReadOnlyCreate => sys::OPEN_READONLY_CREATE,
    };
    token(bytes)
}

fn behavior_token(behavior: TransactionBehavior) -> &'static CStr {
    let bytes = match behavior {
        TransactionBehavior::Deferred => sys::TX_DEFERRED,
        TransactionBehavior::Immediate => sys::TX_WRITE,
        TransactionBehavior::ReadOnly => sys::TX_READ,
    };
    token(bytes)
}

fn token(bytes: &'static [u8]) -> &'static CStr {
    // The sys tokens are literals ending in exactly one NUL.
    CStr::from_bytes_with_nul(bytes).unwrap_or_default()
}

/// Copies a native string. The native side does not expose a matching free
/// call, so the buffer itself stays with it.
unsafe fn copy_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

impl NativeApi for LinkedApi {
    fn connect_local(
        &self,
        path: &CStr,
        mode: AccessMode,
        encryption_key: Option<&CStr>,
    ) -> Option<RawConnection> {
        let key = encryption_key.map_or(ptr::null(), CStr::as_ptr);
        let conn =
            unsafe { sys::libsql_php_connect_local(path.as_ptr(), access_token(mode).as_ptr(), key) };
        RawConnection::from_ptr(conn)
    }

    fn connect_remote_replica(
        &self,
        path: &CStr,
        url: &CStr,
        token: &CStr,
        sync_interval_secs: usize,
        read_your_writes: bool,
    ) -> Option<(RawReplica, RawConnection)> {
        let pair = unsafe {
            sys::libsql_php_connect_new_remote_replica(
                path.as_ptr(),
                url.as_ptr(),
                token.as_ptr(),
                sync_interval_secs,
                read_your_writes as c_int,
            )
        };
        if pair.is_null() {
            return None;
        }
        let conn = unsafe { (*pair).conn };
        Some((
            RawReplica::from_ptr(pair as *mut c_void)?,
            RawConnection::from_ptr(conn)?,
        ))
    }

    fn close(&self, conn: RawConnection) {
        unsafe { sys::libsql_php_close(conn.as_ptr()) }
    }

    fn is_autocommit(&self, conn: RawConnection) -> bool {
        unsafe { sys::libsql_php_is_autocommit(conn.as_ptr()) != 0 }
    }

    fn last_insert_rowid(&self, conn: RawConnection) -> i64 {
        unsafe { sys::libsql_php_last_insert_rowid(conn.as_ptr()) }
    }

    fn affected_rows(&self, conn: RawConnection) -> u64 {
        let changes = unsafe { sys::libsql_php_affected_rows(conn.as_ptr()) };
        if changes.is_null() {
            return 0;
        }
        unsafe { *changes }
    }

    fn sync(&self, replica: RawReplica) -> i32 {
        unsafe { sys::libsql_php_sync(replica.as_ptr() as *mut sys::DbConnPair) }
    }

    fn query(&self, conn: RawConnection, sql: &CStr, params: &QueryParams) -> Option<String> {
        unsafe {
            let json = sys::libsql_php_query(conn.as_ptr(), sql.as_ptr(), params.as_ptr(), params.len());
            copy_string(json)
        }
    }

    fn exec(&self, conn: RawConnection, sql: &CStr, params: &QueryParams) -> Option<i64> {
        let status =
            unsafe { sys::libsql_php_exec(conn.as_ptr(), sql.as_ptr(), params.as_ptr(), params.len()) };
        if status.is_null() {
            return None;
        }
        Some(unsafe { *status })
    }

    fn execute_batch(&self, conn: RawConnection, sql: &CStr) -> i32 {
        // The batch entry point answers null whether or not the script ran.
        let _ = unsafe { sys::libsql_php_execute_batch(conn.as_ptr(), sql.as_ptr()) };
        0
    }

    fn reset(&self, conn: RawConnection) {
        let _ = unsafe { sys::libsql_php_reset(conn.as_ptr()) };
    }

    fn version(&self) -> String {
        unsafe { copy_string(sys::libsql_version()) }.unwrap_or_default()
    }

    fn begin_transaction(
        &self,
        conn: RawConnection,
        behavior: TransactionBehavior,
    ) -> Option<RawTransaction> {
        let tx = unsafe {
            sys::libsql_php_transaction(conn.as_ptr(), behavior_token(behavior).as_ptr())
        };
        RawTransaction::from_ptr(tx)
    }

    fn transaction_exec(
        &self,
        tx: RawTransaction,
        sql: &CStr,
        params: &QueryParams,
    ) -> Option<RawTransaction> {
        let tx = unsafe {
            sys::libsql_php_transaction_exec(tx.as_ptr(), sql.as_ptr(), params.as_ptr(), params.len())
        };
        RawTransaction::from_ptr(tx)
    }

    fn transaction_commit(&self, tx: RawTransaction) -> bool {
        unsafe { sys::libsql_php_transaction_commit(tx.as_ptr()) == 1 }
    }

    fn transaction_rollback(&self, tx: RawTransaction) -> bool {
        unsafe { sys::libsql_php_transaction_rollback(tx.as_ptr()) == 1 }
    }
}
