use bb8::{ManageConnection, Pool};

use crate::connection::SqliteConn;
use crate::driver::SqliteDriver;
use crate::error::DriverError;

/// bb8 manager that opens every pooled connection through a [`SqliteDriver`], so configured
/// extensions and connect hooks apply to each one.
#[derive(Debug, Clone)]
pub struct SqliteDriverManager {
    driver: SqliteDriver,
    data_source: String,
}

impl SqliteDriverManager {
    #[must_use]
    pub fn new(driver: SqliteDriver, data_source: impl Into<String>) -> Self {
        Self {
            driver,
            data_source: data_source.into(),
        }
    }

    #[must_use]
    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    /// Build a pool from this manager. Connections are opened lazily on checkout.
    ///
    /// # Errors
    /// Returns the [`DriverError`] raised while bb8 establishes its minimum idle connections.
    pub async fn build_pool(self, max_size: u32) -> Result<Pool<SqliteDriverManager>, DriverError> {
        Pool::builder().max_size(max_size).build(self).await
    }
}

impl ManageConnection for SqliteDriverManager {
    type Connection = SqliteConn;
    type Error = DriverError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let driver = self.driver.clone();
        let data_source = self.data_source.clone();
        async move { driver.open_async(&data_source).await }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move { conn.ping() }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed() || conn.extension_loading_enabled()
    }
}
