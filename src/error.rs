/// Errors raised by the binding layer.
///
/// Every variant is returned synchronously to the caller of the offending
/// operation. Nothing is retried: statement failures are not assumed to be
/// transient at this layer.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("open flags `{0:#x}` are not an allowed combination")]
    InvalidFlags(i32),
    #[error("Failed to connect to database: `{0}`")]
    ConnectionFailed(String),
    #[error("{0} is not supported in {1} mode")]
    UnsupportedOperation(&'static str, crate::ConnectionMode),
    #[error("parameter `{0}` does not match the placeholder style of the statement")]
    MixedParameterStyle(String),
    #[error("statement misuse: `{0}`")]
    StatementMisuse(String),
    #[error("{0} used after it was closed")]
    UseAfterClose(&'static str),
    #[error("transaction is already {0}")]
    TransactionClosed(crate::TransactionState),
    #[error("native call `{0}` failed: {1}")]
    NativeCallFailure(&'static str, String),
    #[error("invalid transaction behavior `{0}`")]
    InvalidBehavior(String),
    #[error("invalid fetch mode `{0}`")]
    InvalidFetchMode(i32),
    #[error("invalid value type `{0}`")]
    InvalidValueType(i32),
    #[error("invalid parameter name `{0}`")]
    InvalidParameterName(String),
    #[error("nul byte in string: {0}")]
    NulError(#[from] std::ffi::NulError),
    #[error("unexpected native response: `{0}`")]
    InvalidResponse(String),
    #[error("json error: `{0}`")]
    Json(#[from] serde_json::Error),
}

impl From<std::convert::Infallible> for Error {
    fn from(_: std::convert::Infallible) -> Self {
        unreachable!()
    }
}
