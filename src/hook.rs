use std::fmt;

use crate::connection::SqliteConn;
use crate::error::DriverError;

/// Logic run once against every freshly opened connection, after configured extensions
/// have loaded and before the connection is handed to the caller.
///
/// Closures of the shape `Fn(&mut SqliteConn) -> Result<(), DriverError>` implement this
/// trait directly:
/// ```rust
/// use sqlite_ext_driver::prelude::*;
///
/// let config = DriverConfig::builder()
///     .connect_hook(|conn: &mut SqliteConn| conn.execute_batch("PRAGMA foreign_keys = ON;"))
///     .finish();
/// # let _ = config;
/// ```
pub trait ConnectHook: Send + Sync {
    /// Prepare `conn`; an error aborts the open and releases the handle.
    ///
    /// # Errors
    /// Whatever the hook decides is fatal for the connection.
    fn apply(&self, conn: &mut SqliteConn) -> Result<(), DriverError>;

    /// Label used in logs.
    fn name(&self) -> &str {
        "connect_hook"
    }
}

impl<F> ConnectHook for F
where
    F: Fn(&mut SqliteConn) -> Result<(), DriverError> + Send + Sync,
{
    fn apply(&self, conn: &mut SqliteConn) -> Result<(), DriverError> {
        self(conn)
    }
}

impl fmt::Debug for dyn ConnectHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectHook").field(&self.name()).finish()
    }
}

/// Emits an `info` event for every established connection.
#[derive(Debug, Clone, Default)]
pub struct TracingHook {
    label: Option<String>,
}

impl TracingHook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }
}

impl ConnectHook for TracingHook {
    fn apply(&self, conn: &mut SqliteConn) -> Result<(), DriverError> {
        tracing::info!(
            label = self.label.as_deref().unwrap_or("-"),
            data_source = conn.data_source(),
            extensions = conn.config().extensions().len(),
            "sqlite connection established"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        self.label.as_deref().unwrap_or("tracing")
    }
}
