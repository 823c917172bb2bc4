//! Bindings over the libSQL native client call table.
//!
//! The engine itself (parsing, execution, storage, replication) lives behind a
//! fixed C ABI. This crate owns the handles that ABI hands out, encodes
//! parameters for it, decodes the JSON result sets it returns and rewrites
//! prepared statements whose binding shape the ABI cannot express.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use libsql_bridge::{params, Builder, NativeApi, Result};
//! # fn run(api: Arc<dyn NativeApi>) -> Result<()> {
//! let conn = Builder::new_local("file:app.db").build(api)?;
//! conn.exec("CREATE TABLE IF NOT EXISTS users (id INTEGER, name TEXT)", ())?;
//! conn.exec("INSERT INTO users VALUES (?, ?)", params![1, "alice"])?;
//!
//! let result = conn.query("SELECT * FROM users WHERE id = :id", [(":id", 1)])?;
//! for row in result.fetch_assoc()? {
//!     println!("{:?}", row);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! With the `linked` feature enabled, [`LinkedApi`] resolves the call table
//! against the real shared library.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod builder;
pub mod connection;
mod error;
mod handle;
pub mod native;
pub mod params;
pub mod rows;
pub mod sql;
pub mod statement;
pub mod transaction;
mod value;

pub use builder::Builder;
pub use connection::{ClientResult, Connection, ConnectionMode, QuerySingle};
pub use error::Error;
pub use native::{NativeApi, RawConnection, RawReplica, RawTransaction};
#[cfg(feature = "linked")]
pub use native::linked::LinkedApi;
pub use params::{IntoParams, Params};
pub use rows::{BothRow, ColumnKey, FetchMode, FetchedRows, QueryResult};
pub use sql::escape_string;
pub use statement::Statement;
pub use transaction::{Transaction, TransactionBehavior, TransactionState};
pub use value::{Value, ValueType};

/// Convenient alias for `Result<T, libsql_bridge::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

bitflags::bitflags! {
    /// Flags for opening a connection, mirroring the native enumeration.
    ///
    /// Only the access bits are forwarded; see [`AccessMode`] for the
    /// combinations the native layer accepts.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[repr(C)]
    pub struct OpenFlags: i32 {
        const READ_ONLY     = 0x0000_0001;
        const READ_WRITE    = 0x0000_0002;
        const CREATE        = 0x0000_0004;
        const NO_MUTEX      = 0x0000_0008;
        const FULL_MUTEX    = 0x0000_0010;
        const SHARED_CACHE  = 0x0002_0000;
        const PRIVATE_CACHE = 0x0004_0000;
    }
}

impl Default for OpenFlags {
    fn default() -> OpenFlags {
        OpenFlags::READ_WRITE | OpenFlags::CREATE
    }
}

/// The open modes the native connect call understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
    Create,
    ReadWriteCreate,
    ReadOnlyCreate,
}

impl TryFrom<OpenFlags> for AccessMode {
    type Error = Error;

    fn try_from(flags: OpenFlags) -> Result<AccessMode> {
        const RO: i32 = OpenFlags::READ_ONLY.bits();
        const RW: i32 = OpenFlags::READ_WRITE.bits();
        const CREATE: i32 = OpenFlags::CREATE.bits();

        match flags.bits() {
            RO => Ok(AccessMode::ReadOnly),
            RW => Ok(AccessMode::ReadWrite),
            CREATE => Ok(AccessMode::Create),
            bits if bits == RW | CREATE => Ok(AccessMode::ReadWriteCreate),
            bits if bits == RO | CREATE => Ok(AccessMode::ReadOnlyCreate),
            bits => Err(Error::InvalidFlags(bits)),
        }
    }
}
