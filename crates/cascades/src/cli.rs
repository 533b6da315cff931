//! Command-line surface shared by the component binaries.

use std::time::Duration;

use cascades_port::{Direction, Port, Shutdown};
use cascades_transport::Endpoint;
use clap::{Args, CommandFactory, Parser};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::exit::{port_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::logging::LogFormat;

/// How long a component may keep running after termination was triggered.
pub const EXIT_GRACE: Duration = Duration::from_secs(3);

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Print the component's capability manifest as JSON and exit.
    #[arg(long)]
    pub json: bool,

    /// Enable diagnostics on stderr.
    #[arg(long)]
    pub debug: bool,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

#[derive(Parser, Debug)]
#[command(
    name = "console",
    version,
    about = "Prints every IP arriving on its input port to stdout"
)]
pub struct ConsoleArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Input port endpoint (tcp://host:port or ipc://path).
    #[arg(long = "port.in", value_name = "ENDPOINT")]
    pub port_in: Option<String>,
}

#[derive(Parser, Debug)]
#[command(
    name = "template",
    version,
    about = "Renders a template, received on its tpl port, against each JSON packet"
)]
pub struct TemplateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Template (configuration) port endpoint.
    #[arg(long = "port.tpl", value_name = "ENDPOINT")]
    pub port_tpl: Option<String>,

    /// Input port endpoint.
    #[arg(long = "port.in", value_name = "ENDPOINT")]
    pub port_in: Option<String>,

    /// Output port endpoint.
    #[arg(long = "port.out", value_name = "ENDPOINT")]
    pub port_out: Option<String>,
}

/// Validate a required endpoint option.
///
/// A missing or empty value is a usage error carrying the usage text of `C`.
pub fn required_endpoint<C: CommandFactory>(value: Option<&str>, flag: &str) -> CliResult<Endpoint> {
    match value {
        None | Some("") => Err(usage_error::<C>(format!("missing required option --{flag}"))),
        Some(raw) => raw
            .parse()
            .map_err(|err| usage_error::<C>(format!("invalid --{flag}: {err}"))),
    }
}

fn usage_error<C: CommandFactory>(message: String) -> CliError {
    let usage = C::command().render_usage();
    CliError::new(USAGE, format!("{message}\n\n{usage}"))
}

/// Open a port, mapping failures to the CLI exit-code table.
pub async fn open_port(name: &str, endpoint: Endpoint, direction: Direction) -> CliResult<Port> {
    Port::open(name, endpoint, direction)
        .await
        .map_err(|err| port_error("failed to open port", err))
}

/// Exit the process if it is still alive `grace` after `shutdown` fires.
///
/// A transform blocked in synchronous I/O, such as a write to a stdout
/// nobody reads, never gets back to the loop that observes the shutdown.
/// Must be spawned on a multi-thread runtime.
pub fn exit_after_shutdown(shutdown: &Shutdown, grace: Duration) -> JoinHandle<()> {
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        let reason = shutdown.triggered().await;
        tokio::time::sleep(grace).await;
        warn!(%reason, "component did not stop in time, exiting");
        std::process::exit(SUCCESS);
    })
}

pub fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start runtime: {err}")))
}
