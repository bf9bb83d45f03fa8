use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use rusqlite::OpenFlags;
use serde::{Deserialize, Serialize};

use crate::error::DriverError;
use crate::hook::ConnectHook;

/// `SQLite` journal modes settable through `PRAGMA journal_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    Wal,
    Off,
}

impl JournalMode {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Persist => "PERSIST",
            JournalMode::Memory => "MEMORY",
            JournalMode::Wal => "WAL",
            JournalMode::Off => "OFF",
        }
    }
}

/// One extension to load on connect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "ExtensionEntry")]
pub struct ExtensionSpec {
    path: PathBuf,
    entrypoint: Option<String>,
}

impl ExtensionSpec {
    /// Extension at `path`, initialised through its default entry symbol.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entrypoint: None,
        }
    }

    /// Extension at `path` with an explicit entry symbol. An empty symbol means the default.
    pub fn with_entrypoint(path: impl Into<PathBuf>, entrypoint: impl Into<String>) -> Self {
        let entrypoint = entrypoint.into();
        Self {
            path: path.into(),
            entrypoint: (!entrypoint.is_empty()).then_some(entrypoint),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn entrypoint(&self) -> Option<&str> {
        self.entrypoint.as_deref()
    }
}

impl From<&str> for ExtensionSpec {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for ExtensionSpec {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExtensionEntry {
    Path(PathBuf),
    Detailed {
        path: PathBuf,
        #[serde(default)]
        entrypoint: Option<String>,
    },
}

impl From<ExtensionEntry> for ExtensionSpec {
    fn from(entry: ExtensionEntry) -> Self {
        match entry {
            ExtensionEntry::Path(path) => ExtensionSpec::new(path),
            ExtensionEntry::Detailed { path, entrypoint } => {
                ExtensionSpec::with_entrypoint(path, entrypoint.unwrap_or_default())
            }
        }
    }
}

/// Immutable description of how connections opened through a driver are prepared.
///
/// Shared by reference across every connection the driver opens, so it is only ever read
/// after [`DriverConfigBuilder::finish`].
#[derive(Clone, Default)]
pub struct DriverConfig {
    extensions: Vec<ExtensionSpec>,
    connect_hooks: Vec<Arc<dyn ConnectHook>>,
    busy_timeout: Option<Duration>,
    journal_mode: Option<JournalMode>,
    pragmas: Vec<(String, String)>,
    read_only: bool,
}

impl DriverConfig {
    #[must_use]
    pub fn builder() -> DriverConfigBuilder {
        DriverConfigBuilder::default()
    }

    /// Extensions loaded, in order, on every open.
    #[must_use]
    pub fn extensions(&self) -> &[ExtensionSpec] {
        &self.extensions
    }

    #[must_use]
    pub fn connect_hooks(&self) -> &[Arc<dyn ConnectHook>] {
        &self.connect_hooks
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Option<Duration> {
        self.busy_timeout
    }

    #[must_use]
    pub fn journal_mode(&self) -> Option<JournalMode> {
        self.journal_mode
    }

    #[must_use]
    pub fn pragmas(&self) -> &[(String, String)] {
        &self.pragmas
    }

    #[must_use]
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn open_flags(&self) -> OpenFlags {
        let access = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        };
        access | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
    }
}

impl fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverConfig")
            .field("extensions", &self.extensions)
            .field("connect_hooks", &self.connect_hooks)
            .field("busy_timeout", &self.busy_timeout)
            .field("journal_mode", &self.journal_mode)
            .field("pragmas", &self.pragmas)
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// Fluent builder for [`DriverConfig`].
#[derive(Debug, Clone, Default)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an extension loaded with its default entry symbol.
    #[must_use]
    pub fn extension(mut self, extension: impl Into<ExtensionSpec>) -> Self {
        self.config.extensions.push(extension.into());
        self
    }

    #[must_use]
    pub fn extension_with_entrypoint(
        mut self,
        path: impl Into<PathBuf>,
        entrypoint: impl Into<String>,
    ) -> Self {
        self.config
            .extensions
            .push(ExtensionSpec::with_entrypoint(path, entrypoint));
        self
    }

    #[must_use]
    pub fn extensions<I, E>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<ExtensionSpec>,
    {
        self.config
            .extensions
            .extend(extensions.into_iter().map(Into::into));
        self
    }

    /// Append a connect hook. Hooks run in the order they were added.
    #[must_use]
    pub fn connect_hook(mut self, hook: impl ConnectHook + 'static) -> Self {
        self.config.connect_hooks.push(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn shared_connect_hook(mut self, hook: Arc<dyn ConnectHook>) -> Self {
        self.config.connect_hooks.push(hook);
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.config.busy_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.config.journal_mode = Some(mode);
        self
    }

    /// Append `PRAGMA name = value;`, run after the journal mode and before extensions load.
    #[must_use]
    pub fn pragma(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.pragmas.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    #[must_use]
    pub fn finish(self) -> DriverConfig {
        self.config
    }
}

/// Serializable mirror of the data half of [`DriverConfig`]. Hooks are code and can only be
/// attached through [`DriverConfigBuilder`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverSettings {
    pub extensions: Vec<ExtensionSpec>,
    pub busy_timeout_ms: Option<u64>,
    pub journal_mode: Option<JournalMode>,
    pub pragmas: Vec<(String, String)>,
    pub read_only: bool,
}

impl DriverSettings {
    /// Parse settings from JSON.
    ///
    /// # Errors
    /// Returns [`DriverError::ConfigError`] on malformed JSON, unknown fields or an invalid
    /// pragma name.
    pub fn from_json(json: &str) -> Result<Self, DriverError> {
        let settings: DriverSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// # Errors
    /// Returns [`DriverError::ConfigError`] when a pragma name is not a plain identifier.
    pub fn validate(&self) -> Result<(), DriverError> {
        for (name, _) in &self.pragmas {
            validate_pragma_name(name)?;
        }
        Ok(())
    }

    /// Start a builder pre-populated from these settings.
    #[must_use]
    pub fn into_builder(self) -> DriverConfigBuilder {
        let mut builder = DriverConfigBuilder::new()
            .extensions(self.extensions)
            .read_only(self.read_only);
        if let Some(ms) = self.busy_timeout_ms {
            builder = builder.busy_timeout(Duration::from_millis(ms));
        }
        if let Some(mode) = self.journal_mode {
            builder = builder.journal_mode(mode);
        }
        for (name, value) in self.pragmas {
            builder = builder.pragma(name, value);
        }
        builder
    }
}

impl Serialize for ExtensionSpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("ExtensionSpec", 2)?;
        state.serialize_field("path", &self.path)?;
        state.serialize_field("entrypoint", &self.entrypoint)?;
        state.end()
    }
}

pub(crate) fn validate_pragma_name(name: &str) -> Result<(), DriverError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(DriverError::ConfigError(format!(
            "invalid pragma name {name:?}"
        )))
    }
}
