#![allow(non_camel_case_types)]
//! Raw declarations of the libSQL native client call table.
//!
//! Every handle crossing this boundary is an opaque pointer owned by the
//! native library. Nothing here dereferences them; the safe layer lives in
//! `libsql-bridge`.

use std::ffi::{c_char, c_int, c_void};

/// Open-flag tokens understood by `libsql_php_connect_local`.
pub const OPEN_READONLY: &[u8] = b"LIBSQLPHP_OPEN_READONLY\0";
pub const OPEN_READWRITE: &[u8] = b"LIBSQLPHP_OPEN_READWRITE\0";
pub const OPEN_CREATE: &[u8] = b"LIBSQLPHP_OPEN_CREATE\0";
pub const OPEN_READWRITE_CREATE: &[u8] = b"LIBSQLPHP_OPEN_READWRITE_LIBSQLPHP_OPEN_CREATE\0";
pub const OPEN_READONLY_CREATE: &[u8] = b"LIBSQLPHP_OPEN_READONLY_LIBSQLPHP_OPEN_CREATE\0";

/// Transaction behavior tokens understood by `libsql_php_transaction`.
pub const TX_DEFERRED: &[u8] = b"DEFERRED\0";
pub const TX_WRITE: &[u8] = b"WRITE\0";
pub const TX_READ: &[u8] = b"READ\0";

/// A pair of pointers to a database and a connection, returned when opening
/// a remote replica. The database half is what `libsql_php_sync` needs.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct DbConnPair {
    pub db: *mut c_void,
    pub conn: *mut c_void,
}

extern "C" {
    pub fn libsql_php_connect_local(
        path: *const c_char,
        flags: *const c_char,
        encryption_key: *const c_char,
    ) -> *mut c_void;

    pub fn libsql_php_connect_new_remote_replica(
        path: *const c_char,
        url: *const c_char,
        token: *const c_char,
        sync_duration: usize,
        read_your_writes: c_int,
    ) -> *mut DbConnPair;

    pub fn libsql_php_close(client_ptr: *mut c_void);

    pub fn libsql_php_is_autocommit(client_ptr: *mut c_void) -> i64;

    pub fn libsql_php_last_insert_rowid(client_ptr: *mut c_void) -> i64;

    pub fn libsql_php_affected_rows(client_ptr: *mut c_void) -> *const u64;

    pub fn libsql_php_sync(pair: *mut DbConnPair) -> i32;

    pub fn libsql_php_query(
        client_ptr: *mut c_void,
        query: *const c_char,
        query_params: *const *const c_char,
        query_params_len: usize,
    ) -> *const c_char;

    pub fn libsql_php_exec(
        client_ptr: *mut c_void,
        query: *const c_char,
        query_params: *const *const c_char,
        query_params_len: usize,
    ) -> *const i64;

    pub fn libsql_php_execute_batch(client_ptr: *mut c_void, query: *const c_char) -> *const c_int;

    pub fn libsql_php_reset(client_ptr: *mut c_void) -> *const c_int;

    pub fn libsql_version() -> *const c_char;

    pub fn libsql_php_transaction(client_ptr: *mut c_void, behavior: *const c_char) -> *mut c_void;

    pub fn libsql_php_transaction_exec(
        trx_ptr: *mut c_void,
        query: *const c_char,
        query_params: *const *const c_char,
        query_params_len: usize,
    ) -> *mut c_void;

    pub fn libsql_php_transaction_commit(trx_ptr: *mut c_void) -> i64;

    pub fn libsql_php_transaction_rollback(trx_ptr: *mut c_void) -> i64;
}
