//! `SQLite` driver registry with scoped native extension loading.
//!
//! A [`DriverConfig`] lists the extensions to load and the hooks to run on every new
//! connection. A [`Registry`] binds configurations to names, and connections are opened by
//! name:
//!
//! ```rust
//! use sqlite_ext_driver::prelude::*;
//!
//! # fn demo() -> Result<(), DriverError> {
//! let registry = Registry::new();
//! registry.register_if_absent(
//!     "sqlite3_with_fk",
//!     DriverConfig::builder().pragma("foreign_keys", "ON").finish(),
//! );
//! let mut conn = registry.open("sqlite3_with_fk", ":memory:")?;
//! conn.ping()?;
//! conn.close()?;
//! # Ok(()) }
//! # demo().unwrap();
//! ```
//!
//! Extension loading is switched on only for the duration of a single
//! [`SqliteConn::load_extension`] call and is always switched back off before it returns.

pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod extension;
pub mod hook;
pub mod manager;
pub mod prelude;
pub mod registry;

pub use config::{DriverConfig, DriverConfigBuilder, DriverSettings, ExtensionSpec, JournalMode};
pub use connection::SqliteConn;
pub use driver::SqliteDriver;
pub use error::{DriverError, ErrorKind, NOT_AN_ERROR};
pub use extension::{ExtensionHost, ExtensionLoadState};
pub use hook::{ConnectHook, TracingHook};
pub use manager::SqliteDriverManager;
pub use registry::Registry;
