use std::path::PathBuf;

use thiserror::Error;

/// Text `sqlite3_errstr(SQLITE_OK)` renders to. Seeing it on a failure path means the
/// binding read the error slot after it had already been reset.
pub const NOT_AN_ERROR: &str = "not an error";

/// Where a [`DriverError`] sits in the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The native handle could not be created.
    OpenFailure,
    /// The engine refused to toggle extension loading.
    ExtensionCapability,
    /// Extension loading was enabled but the extension itself failed to load.
    ExtensionLoad,
    /// A configured connect hook returned failure.
    Hook,
    /// Configuration, lookup, closed-connection and other failures outside the native calls.
    Other,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{source}")]
    Open {
        data_source: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{source}")]
    ExtensionCapability {
        /// `true` when enabling failed, `false` when restoring the disabled state failed.
        enabling: bool,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{source}")]
    ExtensionLoad {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{0}")]
    Hook(#[source] Box<DriverError>),

    #[error("{operation} failed but SQLite returned no diagnostic (result code {code})")]
    MissingDiagnostic {
        operation: String,
        kind: ErrorKind,
        code: i32,
    },

    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("No driver registered under {0:?}")]
    UnknownDriver(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl DriverError {
    /// Classify this error against the connection lifecycle.
    ///
    /// A hook that fails because of an extension it tried to load still reports
    /// [`ErrorKind::Hook`]; use [`DriverError::root`] to reach the cause.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::Open { .. } => ErrorKind::OpenFailure,
            DriverError::ExtensionCapability { .. } => ErrorKind::ExtensionCapability,
            DriverError::ExtensionLoad { .. } => ErrorKind::ExtensionLoad,
            DriverError::Hook(_) => ErrorKind::Hook,
            DriverError::MissingDiagnostic { kind, .. } => *kind,
            _ => ErrorKind::Other,
        }
    }

    /// Innermost error, skipping through hook wrappers.
    #[must_use]
    pub fn root(&self) -> &DriverError {
        match self {
            DriverError::Hook(inner) => inner.root(),
            other => other,
        }
    }

    /// `SQLite` extended result code, when the failure came from the engine.
    #[must_use]
    pub fn native_code(&self) -> Option<i32> {
        match self.root() {
            DriverError::Open { source, .. }
            | DriverError::ExtensionCapability { source, .. }
            | DriverError::ExtensionLoad { source, .. }
            | DriverError::SqliteError(source) => sqlite_code(source),
            DriverError::MissingDiagnostic { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(err: serde_json::Error) -> Self {
        DriverError::ConfigError(format!("invalid driver settings: {err}"))
    }
}

pub(crate) fn sqlite_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(ffi_err, _) => Some(ffi_err.extended_code),
        _ => None,
    }
}

fn is_sentinel(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.trim() == NOT_AN_ERROR,
        other => other.to_string().trim() == NOT_AN_ERROR,
    }
}

/// Turn a failed native call into a crate error, refusing to pass on a success-shaped message.
pub(crate) fn from_native(
    operation: &str,
    kind: ErrorKind,
    err: rusqlite::Error,
    wrap: impl FnOnce(rusqlite::Error) -> DriverError,
) -> DriverError {
    if is_sentinel(&err) {
        let code = sqlite_code(&err).unwrap_or(rusqlite::ffi::SQLITE_ERROR);
        tracing::warn!(operation, code, "sqlite reported a failure with no diagnostic text");
        return DriverError::MissingDiagnostic {
            operation: operation.to_string(),
            kind,
            code,
        };
    }
    wrap(err)
}
