//! The native call table.
//!
//! Every operation of the crate ends in one of the calls below. The
//! [`NativeApi`] trait is the seam between the safe layer and whatever
//! implements the table: the real shared library through [`linked`], or a
//! test double.

use std::ffi::{c_void, CStr};
use std::ptr::NonNull;

use crate::params::QueryParams;
use crate::transaction::TransactionBehavior;
use crate::AccessMode;

#[cfg(feature = "linked")]
#[cfg_attr(docsrs, doc(cfg(feature = "linked")))]
pub mod linked;

#[cfg(test)]
pub(crate) mod mock;

macro_rules! raw_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        ///
        /// The pointer is opaque: it is never dereferenced on this side of the
        /// boundary, only handed back to native calls.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(NonNull<c_void>);

        impl $name {
            /// Wraps a pointer returned by the native layer, `None` if null.
            pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
                NonNull::new(ptr).map(Self)
            }

            pub fn as_ptr(&self) -> *mut c_void {
                self.0.as_ptr()
            }
        }
    };
}

raw_handle! {
    /// A native connection handle.
    RawConnection
}

raw_handle! {
    /// A native transaction handle.
    RawTransaction
}

raw_handle! {
    /// The native database/connection pair of a remote replica, used to sync.
    RawReplica
}

/// The native call table.
///
/// Methods returning `Option` report the native null sentinel as `None`.
/// Handles passed to [`close`], [`transaction_commit`] and
/// [`transaction_rollback`] are consumed by the native layer and must not be
/// used again; the owned wrappers of this crate guarantee that.
///
/// [`close`]: NativeApi::close
/// [`transaction_commit`]: NativeApi::transaction_commit
/// [`transaction_rollback`]: NativeApi::transaction_rollback
pub trait NativeApi {
    fn connect_local(
        &self,
        path: &CStr,
        mode: AccessMode,
        encryption_key: Option<&CStr>,
    ) -> Option<RawConnection>;

    fn connect_remote_replica(
        &self,
        path: &CStr,
        url: &CStr,
        token: &CStr,
        sync_interval_secs: usize,
        read_your_writes: bool,
    ) -> Option<(RawReplica, RawConnection)>;

    fn close(&self, conn: RawConnection);

    fn is_autocommit(&self, conn: RawConnection) -> bool;

    fn last_insert_rowid(&self, conn: RawConnection) -> i64;

    fn affected_rows(&self, conn: RawConnection) -> u64;

    /// Pulls remote frames into the replica. `0` means success.
    fn sync(&self, replica: RawReplica) -> i32;

    /// Runs a query and returns its rows as a JSON payload.
    fn query(&self, conn: RawConnection, sql: &CStr, params: &QueryParams) -> Option<String>;

    /// Runs a statement and returns the native status value.
    fn exec(&self, conn: RawConnection, sql: &CStr, params: &QueryParams) -> Option<i64>;

    /// Runs a multi-statement script. `0` means success.
    fn execute_batch(&self, conn: RawConnection, sql: &CStr) -> i32;

    fn reset(&self, conn: RawConnection);

    /// Sets the busy handler timeout. Tables without the call report it as
    /// unsupported.
    fn busy_timeout(&self, conn: RawConnection, ms: u64) -> Result<(), String> {
        let _ = (conn, ms);
        Err("busy timeout is not supported by this native table".to_string())
    }

    fn version(&self) -> String;

    fn begin_transaction(
        &self,
        conn: RawConnection,
        behavior: TransactionBehavior,
    ) -> Option<RawTransaction>;

    /// Runs a statement inside a transaction. The returned handle replaces
    /// `tx`.
    fn transaction_exec(
        &self,
        tx: RawTransaction,
        sql: &CStr,
        params: &QueryParams,
    ) -> Option<RawTransaction>;

    fn transaction_commit(&self, tx: RawTransaction) -> bool;

    fn transaction_rollback(&self, tx: RawTransaction) -> bool;
}
