use std::fmt;
use std::io;

use cascades_port::PortError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(FAILURE, format!("{context}: {err}"))
}

pub fn port_error(context: &str, err: PortError) -> CliError {
    match err {
        PortError::Connection { .. } => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        PortError::MissingPort { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

/// Report a command-line parse failure and exit.
///
/// Help and version requests exit 0; everything else is a usage error.
pub fn usage_exit(err: clap::Error) -> ! {
    let _ = err.print();
    let code = if err.use_stderr() { USAGE } else { SUCCESS };
    std::process::exit(code)
}

/// Exit the process with the outcome of a component run.
pub fn finish(result: CliResult<i32>) -> ! {
    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
