use std::sync::Arc;

use crate::config::DriverConfig;
use crate::connection::SqliteConn;
use crate::error::DriverError;

/// Opens [`SqliteConn`]s that share one [`DriverConfig`].
///
/// Cloning is cheap; every clone points at the same configuration.
#[derive(Debug, Clone, Default)]
pub struct SqliteDriver {
    config: Arc<DriverConfig>,
}

impl SqliteDriver {
    #[must_use]
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Open `data_source` (a path, `:memory:`, or a `file:` URI).
    ///
    /// # Errors
    /// * [`DriverError::Open`] if `SQLite` cannot create the handle.
    /// * [`DriverError::ExtensionCapability`] / [`DriverError::ExtensionLoad`] if a configured
    ///   extension fails.
    /// * [`DriverError::Hook`] if a connect hook fails.
    ///
    /// The handle is released before any of these are returned.
    pub fn open(&self, data_source: &str) -> Result<SqliteConn, DriverError> {
        SqliteConn::open(data_source, Arc::clone(&self.config))
    }

    /// Same as [`SqliteDriver::open`], run on tokio's blocking pool.
    ///
    /// # Errors
    /// As for [`SqliteDriver::open`], plus [`DriverError::ConnectionError`] if the blocking
    /// task panics or is cancelled.
    pub async fn open_async(&self, data_source: &str) -> Result<SqliteConn, DriverError> {
        let config = Arc::clone(&self.config);
        let data_source = data_source.to_owned();
        tokio::task::spawn_blocking(move || SqliteConn::open(&data_source, config))
            .await
            .map_err(|e| {
                DriverError::ConnectionError(format!("sqlite open spawn_blocking join error: {e}"))
            })?
    }
}

impl From<DriverConfig> for SqliteDriver {
    fn from(config: DriverConfig) -> Self {
        Self::new(config)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn hooks_run_once_per_open_in_order() -> Result<(), DriverError> {
        let calls = Arc::new(AtomicUsize::new(0));
        let first = Arc::clone(&calls);
        let second = Arc::clone(&calls);
        let driver = SqliteDriver::new(
            DriverConfig::builder()
                .connect_hook(move |_: &mut SqliteConn| -> Result<(), DriverError> {
                    assert_eq!(first.fetch_add(1, Ordering::SeqCst) % 2, 0);
                    Ok(())
                })
                .connect_hook(move |_: &mut SqliteConn| -> Result<(), DriverError> {
                    assert_eq!(second.fetch_add(1, Ordering::SeqCst) % 2, 1);
                    Ok(())
                })
                .finish(),
        );

        let _a = driver.open(":memory:")?;
        let _b = driver.open(":memory:")?;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        Ok(())
    }

    #[test]
    fn failing_hook_aborts_open_and_runs_no_later_hooks() {
        let later = Arc::new(AtomicUsize::new(0));
        let later_hook = Arc::clone(&later);
        let driver = SqliteDriver::new(
            DriverConfig::builder()
                .connect_hook(|_: &mut SqliteConn| -> Result<(), DriverError> {
                    Err(DriverError::Other("schema version mismatch".into()))
                })
                .connect_hook(move |_: &mut SqliteConn| -> Result<(), DriverError> {
                    later_hook.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .finish(),
        );

        let err = driver.open(":memory:").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Hook);
        assert_eq!(err.to_string(), "Other error: schema version mismatch");
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn hook_that_closes_connection_fails_open() {
        let later = Arc::new(AtomicUsize::new(0));
        let later_hook = Arc::clone(&later);
        let driver = SqliteDriver::new(
            DriverConfig::builder()
                .connect_hook(|conn: &mut SqliteConn| conn.close())
                .connect_hook(move |_: &mut SqliteConn| -> Result<(), DriverError> {
                    later_hook.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .finish(),
        );

        let err = driver.open(":memory:").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Hook);
        assert!(matches!(err.root(), DriverError::ConnectionError(_)));
        assert!(err.to_string().contains("closed the connection"), "{err}");
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn open_async_matches_blocking_open() -> Result<(), DriverError> {
        let driver = SqliteDriver::default();
        let conn = driver.open_async(":memory:").await?;
        conn.ping()?;
        assert!(!conn.extension_loading_enabled());
        Ok(())
    }
}
