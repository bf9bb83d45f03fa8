//! Scoped access to the engine's extension-loading capability.
//!
//! `SQLite` only lets `sqlite3_load_extension` run while extension loading is switched on for
//! the connection, and while it is on any SQL text may call the `load_extension()` function.
//! [`load`] therefore holds the capability for exactly one load attempt:
//!
//! ```text
//! Disabled -> Enabling -> Enabled -> Loading -> Disabled
//! ```
//!
//! The disable step runs on every exit path, including failed loads and unwinding.

use std::path::Path;

use crate::error::{DriverError, ErrorKind, from_native};

/// Where a connection sits in the extension-loading cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExtensionLoadState {
    #[default]
    Disabled,
    Enabling,
    Enabled,
    Loading,
}

impl ExtensionLoadState {
    /// `true` whenever the engine may have extension loading switched on.
    #[must_use]
    pub fn capability_enabled(self) -> bool {
        !matches!(self, ExtensionLoadState::Disabled)
    }
}

/// The native calls the loader needs from an engine handle.
pub trait ExtensionHost {
    /// # Errors
    /// The engine refused to enable extension loading.
    fn enable_extension_loading(&self) -> rusqlite::Result<()>;

    /// # Errors
    /// The engine could not switch extension loading back off.
    fn disable_extension_loading(&self) -> rusqlite::Result<()>;

    /// # Errors
    /// The extension could not be opened or its entry point failed.
    fn load_extension(&self, path: &Path, entrypoint: Option<&str>) -> rusqlite::Result<()>;
}

#[allow(unsafe_code)]
impl ExtensionHost for rusqlite::Connection {
    fn enable_extension_loading(&self) -> rusqlite::Result<()> {
        // SAFETY: the capability is only held inside `load`, which disables it again before
        // returning; no SQL runs on this handle in between.
        unsafe { self.load_extension_enable() }
    }

    fn disable_extension_loading(&self) -> rusqlite::Result<()> {
        self.load_extension_disable()
    }

    fn load_extension(&self, path: &Path, entrypoint: Option<&str>) -> rusqlite::Result<()> {
        // SAFETY: loading native code is inherently trusted; callers choose which paths are
        // configured, and the handle is not shared across threads during the call.
        unsafe { rusqlite::Connection::load_extension(self, path, entrypoint) }
    }
}

/// Holds the capability open; switching it off is attempted on drop if [`release`] was never
/// reached.
///
/// [`release`]: CapabilityGuard::release
struct CapabilityGuard<'a, H: ExtensionHost + ?Sized> {
    host: &'a H,
    state: &'a mut ExtensionLoadState,
    released: bool,
}

impl<'a, H: ExtensionHost + ?Sized> CapabilityGuard<'a, H> {
    fn acquire(host: &'a H, state: &'a mut ExtensionLoadState) -> Result<Self, DriverError> {
        *state = ExtensionLoadState::Enabling;
        tracing::debug!("enabling sqlite extension loading");
        if let Err(err) = host.enable_extension_loading() {
            *state = ExtensionLoadState::Disabled;
            return Err(from_native(
                "enable extension loading",
                ErrorKind::ExtensionCapability,
                err,
                |source| DriverError::ExtensionCapability {
                    enabling: true,
                    source,
                },
            ));
        }
        *state = ExtensionLoadState::Enabled;
        Ok(Self {
            host,
            state,
            released: false,
        })
    }

    fn load(&mut self, path: &Path, entrypoint: Option<&str>) -> Result<(), DriverError> {
        *self.state = ExtensionLoadState::Loading;
        tracing::debug!(path = %path.display(), entrypoint, "loading sqlite extension");
        let outcome = self.host.load_extension(path, entrypoint);
        *self.state = ExtensionLoadState::Enabled;
        outcome.map_err(|err| {
            from_native("load extension", ErrorKind::ExtensionLoad, err, |source| {
                DriverError::ExtensionLoad {
                    path: path.to_path_buf(),
                    source,
                }
            })
        })
    }

    fn release(mut self) -> Result<(), DriverError> {
        self.released = true;
        self.disable()
    }

    fn disable(&mut self) -> Result<(), DriverError> {
        tracing::debug!("disabling sqlite extension loading");
        let outcome = self.host.disable_extension_loading();
        // The handle is treated as disabled even when the engine reports a failure; the
        // failure itself is surfaced to the caller.
        *self.state = ExtensionLoadState::Disabled;
        outcome.map_err(|err| {
            tracing::error!(error = %err, "failed to disable sqlite extension loading");
            from_native(
                "disable extension loading",
                ErrorKind::ExtensionCapability,
                err,
                |source| DriverError::ExtensionCapability {
                    enabling: false,
                    source,
                },
            )
        })
    }
}

impl<H: ExtensionHost + ?Sized> Drop for CapabilityGuard<'_, H> {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.disable();
        }
    }
}

/// Load one extension with the capability enabled only for the duration of the call.
///
/// The load error wins over a failure to disable the capability afterwards; a disable
/// failure is reported only when the load itself succeeded. `state` is
/// [`ExtensionLoadState::Disabled`] again when this returns, whatever the outcome.
///
/// # Errors
/// * [`DriverError::ExtensionCapability`] if the engine refuses to enable or disable
///   extension loading.
/// * [`DriverError::ExtensionLoad`] with the engine's diagnostic if the extension fails.
pub fn load<H: ExtensionHost + ?Sized>(
    host: &H,
    state: &mut ExtensionLoadState,
    path: &Path,
    entrypoint: Option<&str>,
) -> Result<(), DriverError> {
    let entrypoint = entrypoint.filter(|symbol| !symbol.is_empty());
    let mut guard = CapabilityGuard::acquire(host, state)?;
    let loaded = guard.load(path, entrypoint);
    let restored = guard.release();
    match (loaded, restored) {
        (Err(load_err), Err(restore_err)) => {
            tracing::warn!(
                error = %restore_err,
                "extension loading restore failed after a failed load; reporting the load error"
            );
            Err(load_err)
        }
        (Err(load_err), Ok(())) => Err(load_err),
        (Ok(()), restored) => restored,
    }
}
