//! Owned wrappers over raw native handles.
//!
//! Each wrapper holds its raw handle in an `Option` and `take`s it on
//! release, so the native release call is issued at most once whatever path
//! (explicit close, commit, rollback or drop) gets there first.

use std::sync::Arc;

use crate::native::{NativeApi, RawConnection, RawTransaction};
use crate::{Error, Result};

pub(crate) struct ConnectionHandle {
    api: Arc<dyn NativeApi>,
    raw: Option<RawConnection>,
}

impl ConnectionHandle {
    pub(crate) fn new(api: Arc<dyn NativeApi>, raw: RawConnection) -> ConnectionHandle {
        ConnectionHandle { api, raw: Some(raw) }
    }

    pub(crate) fn get(&self) -> Result<RawConnection> {
        self.raw.ok_or(Error::UseAfterClose("connection"))
    }

    pub(crate) fn is_open(&self) -> bool {
        self.raw.is_some()
    }

    /// Releases the native connection. Returns `false` if it was already
    /// released.
    pub(crate) fn close(&mut self) -> bool {
        match self.raw.take() {
            Some(raw) => {
                tracing::debug!("closing connection {:?}", raw);
                self.api.close(raw);
                true
            }
            None => false,
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// A native transaction handle. Released by commit or rollback, never by a
/// separate close call.
pub(crate) struct TransactionHandle {
    raw: Option<RawTransaction>,
}

impl TransactionHandle {
    pub(crate) fn new(raw: RawTransaction) -> TransactionHandle {
        TransactionHandle { raw: Some(raw) }
    }

    pub(crate) fn get(&self) -> Result<RawTransaction> {
        self.raw.ok_or(Error::UseAfterClose("transaction"))
    }

    /// Installs the handle returned by a successful native exec.
    pub(crate) fn replace(&mut self, raw: RawTransaction) {
        self.raw = Some(raw);
    }

    /// Hands the raw handle over for release.
    pub(crate) fn take(&mut self) -> Option<RawTransaction> {
        self.raw.take()
    }
}
