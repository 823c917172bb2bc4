use std::ffi::CString;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::native::NativeApi;
use crate::{AccessMode, Connection, ConnectionMode, Error, OpenFlags, Result};

const FILE_PREFIX: &str = "file:";
const MEMORY_PATH: &str = ":memory:";

/// A builder for [`Connection`]. Two variants exist:
///
/// - `new`/`new_local`/`new_in_memory` give a [`Local`] connection: a
///     database file, or the `:memory:` database, with no networking.
/// - `new_remote_replica` gives a [`RemoteReplica`] connection: a local file
///     kept in sync with a remote primary through [`Connection::sync`].
///
/// Nothing reaches the native layer before [`build`](Builder::build), and
/// `build` validates every option first.
pub struct Builder<T = ()> {
    inner: T,
}

impl Builder<()> {
    /// A builder for `path` as given: `:memory:` opens the in-memory
    /// database, a `file:` path a local file. Any other path fails to build
    /// with [`Error::ConnectionFailed`].
    pub fn new(path: impl Into<String>) -> Builder<Local> {
        Builder {
            inner: Local {
                path: path.into(),
                flags: OpenFlags::default(),
                encryption_key: None,
                busy_timeout: None,
            },
        }
    }

    /// Create a new local database. `:memory:` gives the same builder as
    /// [`new_in_memory`](Builder::new_in_memory).
    pub fn new_local(path: impl AsRef<Path>) -> Builder<Local> {
        let path = path.as_ref().to_string_lossy();
        if path == MEMORY_PATH {
            Builder::new_in_memory()
        } else if path.starts_with(FILE_PREFIX) {
            Builder::new(path)
        } else {
            Builder::new(format!("{FILE_PREFIX}{path}"))
        }
    }

    /// Create a new in-memory database.
    pub fn new_in_memory() -> Builder<Local> {
        Builder::new(MEMORY_PATH)
    }

    /// Create a new remote embedded replica.
    pub fn new_remote_replica(
        path: impl AsRef<Path>,
        url: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Builder<RemoteReplica> {
        Builder {
            inner: RemoteReplica {
                path: path.as_ref().to_string_lossy().into_owned(),
                url: url.into(),
                auth_token: auth_token.into(),
                sync_interval: Duration::from_secs(5),
                read_your_writes: true,
                busy_timeout: None,
            },
        }
    }
}

fn apply_busy_timeout(conn: Connection, timeout: Option<Duration>) -> Result<Connection> {
    if let Some(timeout) = timeout {
        conn.busy_timeout(timeout)?;
    }
    Ok(conn)
}

/// A local file or in-memory database.
pub struct Local {
    path: String,
    flags: OpenFlags,
    encryption_key: Option<String>,
    busy_timeout: Option<Duration>,
}

impl Builder<Local> {
    /// Set the open flags. Only the access combinations of [`AccessMode`]
    /// are accepted when building.
    pub fn flags(mut self, flags: OpenFlags) -> Builder<Local> {
        self.inner.flags = flags;
        self
    }

    /// Encrypt the database with `key`. An empty key means no encryption.
    pub fn encryption_key(mut self, key: impl Into<String>) -> Builder<Local> {
        let key = key.into();
        self.inner.encryption_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Builder<Local> {
        self.inner.busy_timeout = Some(timeout);
        self
    }

    /// Open the connection through `api`.
    pub fn build(self, api: Arc<dyn NativeApi>) -> Result<Connection> {
        let Local {
            path,
            flags,
            encryption_key,
            busy_timeout,
        } = self.inner;

        let access = AccessMode::try_from(flags)?;
        let (target, mode) = if path == MEMORY_PATH {
            (path.as_str(), ConnectionMode::InMemory)
        } else if let Some(file) = path.strip_prefix(FILE_PREFIX) {
            let mode = if file == MEMORY_PATH {
                ConnectionMode::InMemory
            } else {
                ConnectionMode::Local
            };
            (file, mode)
        } else {
            return Err(Error::ConnectionFailed(format!(
                "`{path}` is neither `{MEMORY_PATH}` nor a `{FILE_PREFIX}` path"
            )));
        };

        let target = CString::new(target)?;
        let key = encryption_key.map(CString::new).transpose()?;
        let raw = api
            .connect_local(&target, access, key.as_deref())
            .ok_or_else(|| Error::ConnectionFailed(path.clone()))?;
        tracing::debug!("opened {} connection to {}", mode, path);

        apply_busy_timeout(Connection::new(api, raw, None, mode), busy_timeout)
    }
}

/// A local replica of a remote database.
pub struct RemoteReplica {
    path: String,
    url: String,
    auth_token: String,
    sync_interval: Duration,
    read_your_writes: bool,
    busy_timeout: Option<Duration>,
}

impl Builder<RemoteReplica> {
    /// How often the native layer pulls from the primary on its own.
    /// Defaults to 5 seconds.
    pub fn sync_interval(mut self, duration: Duration) -> Builder<RemoteReplica> {
        self.inner.sync_interval = duration;
        self
    }

    /// Whether writes forwarded to the primary are visible locally before the
    /// next sync. On by default.
    pub fn read_your_writes(mut self, read_your_writes: bool) -> Builder<RemoteReplica> {
        self.inner.read_your_writes = read_your_writes;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Builder<RemoteReplica> {
        self.inner.busy_timeout = Some(timeout);
        self
    }

    /// Open the replica through `api`.
    pub fn build(self, api: Arc<dyn NativeApi>) -> Result<Connection> {
        let RemoteReplica {
            path,
            url,
            auth_token,
            sync_interval,
            read_your_writes,
            busy_timeout,
        } = self.inner;

        match (url.is_empty(), auth_token.is_empty()) {
            (false, false) => {}
            (true, true) => {
                return Err(Error::ConnectionFailed(
                    "a remote replica needs a url and an auth token".to_string(),
                ))
            }
            (true, false) => {
                return Err(Error::ConnectionFailed(
                    "auth token given without a url".to_string(),
                ))
            }
            (false, true) => {
                return Err(Error::ConnectionFailed(
                    "url given without an auth token".to_string(),
                ))
            }
        }
        if let Err(e) = url::Url::parse(&url) {
            return Err(Error::ConnectionFailed(format!("invalid url `{url}`: {e}")));
        }
        if path == MEMORY_PATH {
            return Err(Error::ConnectionFailed(
                "a remote replica needs a database file".to_string(),
            ));
        }

        let file = path.strip_prefix(FILE_PREFIX).unwrap_or(&path);
        let file = CString::new(file)?;
        let c_url = CString::new(url.as_str())?;
        let token = CString::new(auth_token)?;
        let (replica, raw) = api
            .connect_remote_replica(
                &file,
                &c_url,
                &token,
                usize::try_from(sync_interval.as_secs()).unwrap_or(usize::MAX),
                read_your_writes,
            )
            .ok_or_else(|| Error::ConnectionFailed(format!("{path} <- {url}")))?;
        tracing::debug!("opened remote replica of {} at {}", url, path);

        apply_busy_timeout(
            Connection::new(api, raw, Some(replica), ConnectionMode::RemoteReplica),
            busy_timeout,
        )
    }
}
