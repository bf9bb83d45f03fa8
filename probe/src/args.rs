use clap::Parser;
use serde::Serialize;
use sqlite_ext_driver::{DriverConfig, DriverError, DriverSettings, ExtensionSpec, JournalMode};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Open a SQLite data source through an extension-loading driver and report the outcome"
)]
pub(crate) struct Args {
    /// Path, `:memory:`, or `file:` URI to open.
    #[arg(long, default_value = ":memory:")]
    pub(crate) data_source: String,
    /// Extension loaded on connect, as `PATH` or `PATH#ENTRYPOINT`. Repeatable.
    #[arg(long = "extension", value_name = "PATH[#ENTRYPOINT]")]
    pub(crate) extensions: Vec<String>,
    /// Extension loaded from inside a connect hook instead of the configured list.
    #[arg(long = "hook-extension", value_name = "PATH[#ENTRYPOINT]")]
    pub(crate) hook_extensions: Vec<String>,
    /// JSON driver settings; command-line flags are applied on top.
    #[arg(long)]
    pub(crate) settings: Option<PathBuf>,
    #[arg(long, value_enum)]
    pub(crate) journal_mode: Option<JournalMode>,
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) busy_timeout: Option<Duration>,
    #[arg(long)]
    pub(crate) read_only: bool,
    #[arg(long, default_value = "probe")]
    pub(crate) driver_prefix: String,
    #[arg(long)]
    pub(crate) log: Option<PathBuf>,
    #[arg(short, long)]
    pub(crate) verbose: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ProbeConfig {
    pub(crate) data_source: String,
    pub(crate) driver_prefix: String,
    pub(crate) settings: DriverSettings,
    pub(crate) hook_extensions: Vec<ExtensionSpec>,
    pub(crate) log: Option<PathBuf>,
    pub(crate) verbose: bool,
}

impl ProbeConfig {
    pub(crate) fn from_args(args: Args) -> Result<Self, DriverError> {
        let mut settings = match &args.settings {
            Some(path) => {
                let json = fs::read_to_string(path).map_err(|err| {
                    DriverError::ConfigError(format!("reading {}: {err}", path.display()))
                })?;
                DriverSettings::from_json(&json)?
            }
            None => DriverSettings::default(),
        };

        settings
            .extensions
            .extend(args.extensions.iter().map(String::as_str).map(parse_extension));
        if let Some(mode) = args.journal_mode {
            settings.journal_mode = Some(mode);
        }
        if let Some(timeout) = args.busy_timeout {
            settings.busy_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        }
        settings.read_only |= args.read_only;

        Ok(Self {
            data_source: args.data_source,
            driver_prefix: args.driver_prefix,
            settings,
            hook_extensions: args
                .hook_extensions
                .iter()
                .map(String::as_str)
                .map(parse_extension)
                .collect(),
            log: args.log,
            verbose: args.verbose,
        })
    }

    pub(crate) fn driver_config(&self) -> DriverConfig {
        let hook_extensions = self.hook_extensions.clone();
        let mut builder = self.settings.clone().into_builder();
        if !hook_extensions.is_empty() {
            builder = builder.connect_hook(
                move |conn: &mut sqlite_ext_driver::SqliteConn| -> Result<(), DriverError> {
                    for ext in &hook_extensions {
                        conn.load_extension(ext.path(), ext.entrypoint().unwrap_or(""))?;
                    }
                    Ok(())
                },
            );
        }
        builder.finish()
    }
}

fn parse_extension(raw: &str) -> ExtensionSpec {
    match raw.rsplit_once('#') {
        Some((path, entrypoint)) => ExtensionSpec::with_entrypoint(path, entrypoint),
        None => ExtensionSpec::new(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_flag_splits_entrypoint() {
        let plain = parse_extension("mod_spatialite");
        assert_eq!(plain.entrypoint(), None);
        let explicit = parse_extension("./vec0.so#sqlite3_vec_init");
        assert_eq!(explicit.path().to_str(), Some("./vec0.so"));
        assert_eq!(explicit.entrypoint(), Some("sqlite3_vec_init"));
        let empty = parse_extension("vec0#");
        assert_eq!(empty.entrypoint(), None);
    }

    #[test]
    fn flags_layer_over_defaults() {
        let args = Args::parse_from([
            "probe",
            "--extension",
            "foobar",
            "--journal-mode",
            "wal",
            "--busy-timeout",
            "2s",
        ]);
        let config = ProbeConfig::from_args(args).expect("config");
        assert_eq!(config.data_source, ":memory:");
        assert_eq!(config.settings.extensions, [ExtensionSpec::new("foobar")]);
        assert_eq!(config.settings.journal_mode, Some(JournalMode::Wal));
        assert_eq!(config.settings.busy_timeout_ms, Some(2000));
        assert_eq!(config.driver_config().extensions().len(), 1);
    }

    #[test]
    fn hook_extension_flags_become_one_connect_hook() {
        let args = Args::parse_from([
            "probe",
            "--hook-extension",
            "foobar",
            "--hook-extension",
            "./vec0.so#sqlite3_vec_init",
        ]);
        let config = ProbeConfig::from_args(args).expect("config");
        assert_eq!(
            config.hook_extensions,
            [
                ExtensionSpec::new("foobar"),
                ExtensionSpec::with_entrypoint("./vec0.so", "sqlite3_vec_init"),
            ]
        );
        let driver_config = config.driver_config();
        assert!(driver_config.extensions().is_empty());
        assert_eq!(driver_config.connect_hooks().len(), 1);
    }
}
