use std::fs::File;
use std::path::Path;
use std::sync::OnceLock;

use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

use crate::util::env_var::GCHAT_LOG_LEVEL;

const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_FILTER: LevelFilter = LevelFilter::ERROR;

static MAX_LEVEL: OnceLock<LevelFilter> = OnceLock::new();

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Arguments to the initialize_logging function
#[derive(Debug)]
pub struct LogArgs<T: AsRef<Path>> {
    /// The log level to use. When not set, the default log level is used.
    pub log_level: Option<String>,
    /// Whether or not we log to stdout.
    pub log_to_stdout: bool,
    /// The log file path which we write logs to. When not set, we do not write to a file.
    pub log_file_path: Option<T>,
    /// Whether we should delete the log file at each launch.
    pub delete_old_log_file: bool,
}

/// The log guard maintains tracing guards which send log information to other threads.
///
/// This must be kept alive for logging to function as expected.
#[must_use]
#[derive(Debug)]
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
    _stdout_guard: Option<WorkerGuard>,
}

/// Initialize our application level logging using the given LogArgs.
///
/// # Returns
///
/// On success, this returns a guard which must be kept alive.
#[inline]
pub fn initialize_logging<T: AsRef<Path>>(args: LogArgs<T>) -> Result<LogGuard, Error> {
    let filter_layer = create_filter_layer(args.log_level.as_deref());
    MAX_LEVEL.get_or_init(|| filter_layer.max_level_hint().unwrap_or(DEFAULT_FILTER));

    // First we construct the file logging layer if a file name was provided.
    let (file_layer, _file_guard) = match args.log_file_path {
        Some(log_file_path) => {
            let log_path = log_file_path.as_ref();

            // Make the log path parent directory if it doesn't exist.
            if let Some(parent) = log_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            // We delete the old log file when requested each time the logger is initialized, otherwise we only
            // delete the file when it has grown too large.
            if args.delete_old_log_file {
                std::fs::remove_file(log_path).ok();
            } else if log_path.exists() && std::fs::metadata(log_path)?.len() > MAX_FILE_SIZE {
                std::fs::remove_file(log_path)?;
            }

            // Create the new log file or append to the existing one.
            let file = if args.delete_old_log_file {
                File::create(log_path)?
            } else {
                File::options().append(true).create(true).open(log_path)?
            };

            // On posix-like systems, we modify permissions so that only the owner has access.
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(metadata) = file.metadata() {
                    let mut permissions = metadata.permissions();
                    permissions.set_mode(0o600);
                    file.set_permissions(permissions).ok();
                }
            }

            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let file_layer = fmt::layer().with_line_number(true).with_writer(non_blocking);

            (Some(file_layer), Some(guard))
        },
        None => (None, None),
    };

    // If we log to stdout, we need to add this layer to our logger.
    let (stdout_layer, _stdout_guard) = if args.log_to_stdout {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
        let stdout_layer = fmt::layer().with_line_number(true).with_writer(non_blocking);
        (Some(stdout_layer), Some(guard))
    } else {
        (None, None)
    };

    // Finally, initialize our logging
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LogGuard {
        _file_guard,
        _stdout_guard,
    })
}

/// The most verbose level that logging was initialized with. Before initialization this is
/// derived from the environment.
pub fn get_log_level_max() -> LevelFilter {
    MAX_LEVEL.get().copied().unwrap_or_else(|| {
        create_filter_layer(None)
            .max_level_hint()
            .unwrap_or(DEFAULT_FILTER)
    })
}

/// Maps the `-v` count to a log level. Zero means "leave it to the environment".
pub fn verbosity_to_level(verbose: u8) -> Option<String> {
    match verbose {
        0 => None,
        1 => Some("info".to_owned()),
        2 => Some("debug".to_owned()),
        _ => Some("trace".to_owned()),
    }
}

/// An explicit level wins over [GCHAT_LOG_LEVEL]. Either may hold full `EnvFilter` directives.
fn create_filter_layer(level: Option<&str>) -> EnvFilter {
    let directive = Directive::from(DEFAULT_FILTER);
    let level = level.map(str::to_owned).or_else(|| std::env::var(GCHAT_LOG_LEVEL).ok());

    match level {
        Some(level) => EnvFilter::builder()
            .with_default_directive(directive)
            .parse_lossy(level),
        None => EnvFilter::default().add_directive(directive),
    }
}
