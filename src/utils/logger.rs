//! Logger initialisation for binaries

use log::info;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;

pub use log::LevelFilter;

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError),
}

/// Initialise the logger for this execution, writing to stdout and
/// optionally to `log_file`.
///
/// Must only be called once per process.
pub fn logger_init(min_level: LevelFilter, log_file: Option<&Path>) -> Result<(), LoggerInitError> {
    let epoch = Instant::now();
    let mut dispatch = fern::Dispatch::new()
        .format(move |out, message, record| {
            // Targets only matter when debugging.
            if record.level() > log::Level::Info {
                out.finish(format_args!(
                    "[{:10.6} {}] {}: {}",
                    epoch.elapsed().as_secs_f64(),
                    level_to_str(record.level()),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "[{:10.6} {}] {}",
                    epoch.elapsed().as_secs_f64(),
                    level_to_str(record.level()),
                    message
                ))
            }
        })
        .level(min_level)
        .chain(std::io::stdout());
    if let Some(path) = log_file {
        dispatch = dispatch.chain(fern::log_file(path).map_err(LoggerInitError::LogFileInitError)?);
    }
    dispatch.apply().map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    info!("    Log level: {:?}", min_level);
    if let Some(path) = log_file {
        info!("    Log file path: {:?}", path);
    }
    Ok(())
}

fn level_to_str(level: log::Level) -> &'static str {
    match level {
        log::Level::Trace => "TRC",
        log::Level::Debug => "DBG",
        log::Level::Info => "INF",
        log::Level::Warn => "WRN",
        log::Level::Error => "ERR",
    }
}
