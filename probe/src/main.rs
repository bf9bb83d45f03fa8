mod args;

use std::fs::File;
use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use sqlite_ext_driver::{DriverError, Registry};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use crate::args::{Args, ProbeConfig};

#[derive(Debug, Serialize)]
struct ProbeReport {
    driver: String,
    data_source: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    native_code: Option<i32>,
}

fn main() -> ExitCode {
    let config = match ProbeConfig::from_args(Args::parse()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return ExitCode::from(2);
        }
    };
    if let Err(err) = init_logging(config.log.as_deref(), config.verbose) {
        eprintln!("failed to open log file: {err}");
        return ExitCode::FAILURE;
    }

    let config_json = serde_json::to_string_pretty(&config).unwrap_or_else(|_| "{}".to_string());
    tracing::debug!("config: {}", config_json);

    let registry = Registry::new();
    let driver = registry.register_unique(&config.driver_prefix, config.driver_config());
    let report = probe(&registry, &driver, &config.data_source);
    let ok = report.ok;
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("failed to render report: {err}"),
    }
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

/// Log lines go to stderr, plus `log_file` when given; stdout carries only the report.
fn init_logging(log_file: Option<&Path>, verbose: bool) -> io::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO });
    match log_file {
        Some(path) => {
            let file = Arc::new(File::create(path)?);
            builder
                .with_ansi(false)
                .with_writer(io::stderr.and(file))
                .init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}

fn probe(registry: &Registry, driver: &str, data_source: &str) -> ProbeReport {
    let outcome = registry
        .open(driver, data_source)
        .and_then(|mut conn| -> Result<(), DriverError> {
            conn.ping()?;
            conn.close()
        });
    match outcome {
        Ok(()) => {
            tracing::info!(driver, data_source, "connection opened");
            ProbeReport {
                driver: driver.to_string(),
                data_source: data_source.to_string(),
                ok: true,
                error: None,
                kind: None,
                native_code: None,
            }
        }
        Err(err) => {
            tracing::warn!(driver, data_source, error = %err, "connection failed");
            ProbeReport {
                driver: driver.to_string(),
                data_source: data_source.to_string(),
                ok: false,
                error: Some(err.to_string()),
                kind: Some(format!("{:?}", err.kind())),
                native_code: err.native_code(),
            }
        }
    }
}
