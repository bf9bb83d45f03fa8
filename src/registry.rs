//! Name-to-driver table that connections are opened through.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, PoisonError, RwLock};

use crate::connection::SqliteConn;
use crate::driver::SqliteDriver;
use crate::error::DriverError;
use crate::manager::SqliteDriverManager;

/// Registered drivers, keyed by name.
///
/// Entries are never removed. Construct one registry per process (or per test, for
/// isolation) and pass it by reference to whatever needs to register or open.
#[derive(Debug, Default)]
pub struct Registry {
    drivers: RwLock<HashMap<String, SqliteDriver>>,
    unique_count: Mutex<u64>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `driver` unless something is already registered under `name`, in which
    /// case the existing binding is kept and nothing happens.
    ///
    /// Safe to call repeatedly with the same name, e.g. from tests that run more than once in
    /// a single process.
    pub fn register_if_absent(&self, name: &str, driver: impl Into<SqliteDriver>) {
        let mut drivers = self.drivers.write().unwrap_or_else(PoisonError::into_inner);
        match drivers.entry(name.to_string()) {
            Entry::Occupied(_) => {
                tracing::debug!(driver = name, "driver already registered; skipping");
            }
            Entry::Vacant(slot) => {
                tracing::info!(driver = name, "registering sqlite driver");
                slot.insert(driver.into());
            }
        }
    }

    /// Register `driver` under a freshly generated `"{prefix}_{counter:03}"` name and return it.
    ///
    /// The counter is read, advanced and the name inserted under one lock, so concurrent
    /// callers never receive the same name. Counter values whose name was already taken
    /// through [`Registry::register_if_absent`] are skipped rather than overwritten.
    pub fn register_unique(&self, prefix: &str, driver: impl Into<SqliteDriver>) -> String {
        let driver = driver.into();
        let mut count = self.unique_count.lock().unwrap_or_else(PoisonError::into_inner);
        let mut drivers = self.drivers.write().unwrap_or_else(PoisonError::into_inner);
        loop {
            let name = format!("{prefix}_{:03}", *count);
            *count += 1;
            if let Entry::Vacant(slot) = drivers.entry(name.clone()) {
                tracing::info!(driver = %name, "registering sqlite driver");
                slot.insert(driver);
                return name;
            }
        }
    }

    /// Driver registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<SqliteDriver> {
        let drivers = self.drivers.read().unwrap_or_else(PoisonError::into_inner);
        let driver = drivers.get(name).cloned();
        if driver.is_none() {
            tracing::warn!(driver = name, "driver not found in registry");
        }
        driver
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Sorted list of registered names.
    #[must_use]
    pub fn drivers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open `data_source` with the driver registered as `driver_name`.
    ///
    /// # Errors
    /// [`DriverError::UnknownDriver`] if nothing is registered under `driver_name`, otherwise
    /// whatever [`SqliteDriver::open`] returns.
    pub fn open(&self, driver_name: &str, data_source: &str) -> Result<SqliteConn, DriverError> {
        self.lookup(driver_name)?.open(data_source)
    }

    /// Async form of [`Registry::open`].
    ///
    /// # Errors
    /// As for [`Registry::open`].
    pub async fn open_async(
        &self,
        driver_name: &str,
        data_source: &str,
    ) -> Result<SqliteConn, DriverError> {
        let driver = self.lookup(driver_name)?;
        driver.open_async(data_source).await
    }

    /// A bb8 connection manager that opens `data_source` through the driver registered as
    /// `driver_name`.
    ///
    /// # Errors
    /// [`DriverError::UnknownDriver`] if nothing is registered under `driver_name`.
    pub fn manager(
        &self,
        driver_name: &str,
        data_source: &str,
    ) -> Result<SqliteDriverManager, DriverError> {
        let driver = self.lookup(driver_name)?;
        Ok(SqliteDriverManager::new(driver, data_source))
    }

    fn lookup(&self, driver_name: &str) -> Result<SqliteDriver, DriverError> {
        self.get(driver_name)
            .ok_or_else(|| DriverError::UnknownDriver(driver_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::config::DriverConfig;

    #[test]
    fn register_if_absent_keeps_first_binding() {
        let registry = Registry::new();
        let first = DriverConfig::builder().extension("first").finish();
        let second = DriverConfig::builder().extension("second").finish();

        registry.register_if_absent("sqlite3_ext", first);
        registry.register_if_absent("sqlite3_ext", second);

        assert_eq!(registry.drivers(), ["sqlite3_ext"]);
        let driver = registry.get("sqlite3_ext").expect("registered");
        assert_eq!(
            driver.config().extensions()[0].path().to_str(),
            Some("first")
        );
    }

    #[test]
    fn register_unique_pads_counter() {
        let registry = Registry::new();
        assert_eq!(registry.register_unique("drv", DriverConfig::default()), "drv_000");
        assert_eq!(registry.register_unique("drv", DriverConfig::default()), "drv_001");
        assert_eq!(registry.register_unique("other", DriverConfig::default()), "other_002");
    }

    #[test]
    fn register_unique_skips_names_taken_elsewhere() {
        let registry = Registry::new();
        let keep = DriverConfig::builder().extension("keep").finish();
        registry.register_if_absent("drv_000", keep);

        let name = registry.register_unique("drv", DriverConfig::default());
        assert_eq!(name, "drv_001");
        let kept = registry.get("drv_000").expect("registered");
        assert_eq!(kept.config().extensions().len(), 1);
    }

    #[test]
    fn register_unique_is_distinct_across_threads() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..10)
                        .map(|_| registry.register_unique("drv", DriverConfig::default()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut names = Vec::new();
        for handle in handles {
            let batch = handle.join().expect("registrar thread");
            // Each caller sees its own names in increasing counter order.
            let mut sorted = batch.clone();
            sorted.sort();
            assert_eq!(batch, sorted);
            names.extend(batch);
        }

        names.sort();
        names.dedup();
        assert_eq!(names.len(), 100);
        let expected: Vec<String> = (0..100).map(|n| format!("drv_{n:03}")).collect();
        assert_eq!(names, expected);
        assert_eq!(registry.len(), 100);
    }

    #[test]
    fn open_unknown_driver_is_an_error() {
        let registry = Registry::new();
        let err = registry.open("missing", ":memory:").unwrap_err();
        assert!(matches!(err, DriverError::UnknownDriver(name) if name == "missing"));
    }
}
