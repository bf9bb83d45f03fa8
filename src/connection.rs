use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::{DriverConfig, validate_pragma_name};
use crate::error::{DriverError, ErrorKind, from_native};
use crate::extension::{self, ExtensionLoadState};

/// One native `SQLite` handle prepared according to a [`DriverConfig`].
///
/// Owned by whoever opened it and not meant to be shared across threads. Dropping the
/// connection releases the handle; [`SqliteConn::close`] does the same and reports failures.
pub struct SqliteConn {
    conn: Option<rusqlite::Connection>,
    config: Arc<DriverConfig>,
    data_source: String,
    extension_state: ExtensionLoadState,
}

impl SqliteConn {
    /// Open `data_source` and run the configured setup: pragmas, then extensions in order,
    /// then connect hooks. Any failure releases the handle before returning.
    pub(crate) fn open(data_source: &str, config: Arc<DriverConfig>) -> Result<Self, DriverError> {
        tracing::debug!(data_source, "opening sqlite connection");
        let raw = rusqlite::Connection::open_with_flags(data_source, config.open_flags())
            .map_err(|err| {
                from_native("open", ErrorKind::OpenFailure, err, |source| {
                    DriverError::Open {
                        data_source: data_source.to_string(),
                        source,
                    }
                })
            })?;

        let mut conn = Self {
            conn: Some(raw),
            config,
            data_source: data_source.to_string(),
            extension_state: ExtensionLoadState::Disabled,
        };
        if let Err(err) = conn.initialize() {
            tracing::warn!(data_source, error = %err, "sqlite connection setup failed");
            conn.release();
            return Err(err);
        }
        Ok(conn)
    }

    fn initialize(&mut self) -> Result<(), DriverError> {
        let config = Arc::clone(&self.config);
        self.apply_pragmas(&config)?;

        for ext in config.extensions() {
            self.load_extension(ext.path(), ext.entrypoint().unwrap_or(""))?;
        }

        for hook in config.connect_hooks() {
            tracing::debug!(hook = hook.name(), "running connect hook");
            hook.apply(self)
                .map_err(|err| DriverError::Hook(Box::new(err)))?;
            self.ensure_ready_after(hook.name())?;
        }
        Ok(())
    }

    fn ensure_ready_after(&self, hook: &str) -> Result<(), DriverError> {
        let problem = if self.is_closed() {
            "closed the connection"
        } else if self.extension_loading_enabled() {
            "left extension loading enabled"
        } else {
            return Ok(());
        };
        Err(DriverError::Hook(Box::new(DriverError::ConnectionError(
            format!("connect hook {hook} {problem}"),
        ))))
    }

    fn apply_pragmas(&self, config: &DriverConfig) -> Result<(), DriverError> {
        let raw = self.raw()?;
        if let Some(timeout) = config.busy_timeout() {
            raw.busy_timeout(timeout)?;
        }
        if let Some(mode) = config.journal_mode() {
            // journal_mode returns a row, so it cannot go through execute_batch.
            let applied: String =
                raw.query_row(&format!("PRAGMA journal_mode = {}", mode.as_sql()), [], |row| {
                    row.get(0)
                })?;
            tracing::debug!(requested = mode.as_sql(), applied = %applied, "journal mode set");
        }
        for (name, value) in config.pragmas() {
            validate_pragma_name(name)?;
            if value.contains(';') {
                return Err(DriverError::ConfigError(format!(
                    "invalid value for pragma {name}: {value:?}"
                )));
            }
            raw.execute_batch(&format!("PRAGMA {name} = {value};"))?;
        }
        Ok(())
    }

    /// Load a native extension into this connection.
    ///
    /// Extension loading is switched on for this one call and switched off again before it
    /// returns, on success and on failure. An empty `entrypoint` uses the extension's default
    /// init symbol.
    ///
    /// # Errors
    /// * [`DriverError::ExtensionCapability`] if `SQLite` refuses to toggle extension loading.
    /// * [`DriverError::ExtensionLoad`] carrying `SQLite`'s own message if the load fails.
    /// * [`DriverError::ConnectionError`] if the connection is already closed.
    pub fn load_extension(
        &mut self,
        path: impl AsRef<Path>,
        entrypoint: &str,
    ) -> Result<(), DriverError> {
        let raw = self.conn.as_ref().ok_or_else(closed)?;
        let entrypoint = (!entrypoint.is_empty()).then_some(entrypoint);
        extension::load(raw, &mut self.extension_state, path.as_ref(), entrypoint)
    }

    /// Whether extension loading is currently switched on. Only ever `true` from inside a
    /// load call.
    #[must_use]
    pub fn extension_loading_enabled(&self) -> bool {
        self.extension_state.capability_enabled()
    }

    #[must_use]
    pub fn extension_state(&self) -> ExtensionLoadState {
        self.extension_state
    }

    /// Borrow the underlying `rusqlite` handle.
    ///
    /// # Errors
    /// Returns [`DriverError::ConnectionError`] if the connection has been closed.
    pub fn raw(&self) -> Result<&rusqlite::Connection, DriverError> {
        self.conn.as_ref().ok_or_else(closed)
    }

    /// # Errors
    /// Returns [`DriverError::ConnectionError`] if the connection has been closed.
    pub fn raw_mut(&mut self) -> Result<&mut rusqlite::Connection, DriverError> {
        self.conn.as_mut().ok_or_else(closed)
    }

    /// Run one or more `;`-separated statements.
    ///
    /// # Errors
    /// Propagates the `SQLite` error for the first failing statement.
    pub fn execute_batch(&self, sql: &str) -> Result<(), DriverError> {
        self.raw()?.execute_batch(sql)?;
        Ok(())
    }

    /// Round-trip a trivial query to confirm the handle is usable.
    ///
    /// # Errors
    /// Returns [`DriverError::ConnectionError`] if closed, or the `SQLite` error.
    pub fn ping(&self) -> Result<(), DriverError> {
        let one: i64 = self.raw()?.query_row("SELECT 1", [], |row| row.get(0))?;
        debug_assert_eq!(one, 1);
        Ok(())
    }

    /// Release the native handle. Closing an already closed connection is a no-op.
    ///
    /// # Errors
    /// Returns the `SQLite` error if the engine reports a problem while closing; the handle
    /// is released regardless.
    pub fn close(&mut self) -> Result<(), DriverError> {
        let Some(raw) = self.conn.take() else {
            return Ok(());
        };
        tracing::debug!(data_source = %self.data_source, "closing sqlite connection");
        raw.close().map_err(|(raw, err)| {
            tracing::warn!(error = %err, "sqlite close reported an error; dropping handle");
            drop(raw);
            DriverError::SqliteError(err)
        })
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    #[must_use]
    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    fn release(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "failed to release sqlite handle after setup error");
        }
    }
}

impl fmt::Debug for SqliteConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConn")
            .field("data_source", &self.data_source)
            .field("closed", &self.is_closed())
            .field("extension_state", &self.extension_state)
            .finish()
    }
}

fn closed() -> DriverError {
    DriverError::ConnectionError("sqlite connection already closed".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JournalMode;
    use crate::error::{ErrorKind, NOT_AN_ERROR};

    fn open_memory(config: DriverConfig) -> Result<SqliteConn, DriverError> {
        SqliteConn::open(":memory:", Arc::new(config))
    }

    #[test]
    fn close_is_idempotent() -> Result<(), DriverError> {
        let mut conn = open_memory(DriverConfig::default())?;
        conn.ping()?;
        conn.close()?;
        assert!(conn.is_closed());
        conn.close()?;
        assert!(matches!(conn.ping(), Err(DriverError::ConnectionError(_))));
        Ok(())
    }

    #[test]
    fn missing_extension_surfaces_engine_message_and_disables() -> Result<(), DriverError> {
        let mut conn = open_memory(DriverConfig::default())?;
        let err = conn.load_extension("foobar", "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExtensionLoad);
        assert_ne!(err.to_string(), NOT_AN_ERROR);
        assert!(!conn.extension_loading_enabled());

        // The SQL-level loader is gated by the same switch.
        let sql_err = conn
            .raw()?
            .query_row("SELECT load_extension('foobar')", [], |_| Ok(()))
            .unwrap_err();
        assert!(sql_err.to_string().contains("not authorized"), "{sql_err}");
        Ok(())
    }

    #[test]
    fn load_on_closed_connection_is_rejected() -> Result<(), DriverError> {
        let mut conn = open_memory(DriverConfig::default())?;
        conn.close()?;
        let err = conn.load_extension("foobar", "").unwrap_err();
        assert!(matches!(err, DriverError::ConnectionError(_)));
        Ok(())
    }

    #[test]
    fn pragmas_apply_before_hooks() -> Result<(), DriverError> {
        let config = DriverConfig::builder()
            .journal_mode(JournalMode::Memory)
            .pragma("foreign_keys", "ON")
            .connect_hook(|conn: &mut SqliteConn| -> Result<(), DriverError> {
                let fk: i64 = conn
                    .raw()?
                    .query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
                if fk == 1 {
                    Ok(())
                } else {
                    Err(DriverError::Other("foreign_keys not applied".into()))
                }
            })
            .finish();
        let conn = open_memory(config)?;
        let mode: String = conn
            .raw()?
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        assert_eq!(mode.to_lowercase(), "memory");
        Ok(())
    }

    #[test]
    fn pragma_value_with_statement_separator_is_rejected() {
        let config = DriverConfig::builder()
            .pragma("user_version", "1; DROP TABLE t")
            .finish();
        let err = open_memory(config).unwrap_err();
        assert!(matches!(err, DriverError::ConfigError(_)));
    }
}
