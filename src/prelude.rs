//! Convenient imports for common functionality.

pub use crate::config::{DriverConfig, DriverConfigBuilder, DriverSettings, ExtensionSpec, JournalMode};
pub use crate::connection::SqliteConn;
pub use crate::driver::SqliteDriver;
pub use crate::error::{DriverError, ErrorKind};
pub use crate::extension::ExtensionLoadState;
pub use crate::hook::{ConnectHook, TracingHook};
pub use crate::manager::SqliteDriverManager;
pub use crate::registry::Registry;
