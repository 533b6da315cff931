use cascades::cli::{
    exit_after_shutdown, open_port, required_endpoint, runtime, ConsoleArgs, EXIT_GRACE,
};
use cascades::components::ConsoleSink;
use cascades::exit::{finish, usage_exit, CliResult, SUCCESS};
use cascades::logging::init_logging;
use cascades::manifest::ComponentManifest;
use cascades_port::{Component, Direction, Ports, Shutdown};
use cascades_transport::Endpoint;
use clap::Parser;
use tracing::debug;

fn main() {
    let args = ConsoleArgs::try_parse().unwrap_or_else(|err| usage_exit(err));
    finish(run(args))
}

fn run(args: ConsoleArgs) -> CliResult<i32> {
    if args.common.json {
        ComponentManifest::console().print()?;
        return Ok(SUCCESS);
    }

    init_logging(args.common.log_format, args.common.debug);
    let input = required_endpoint::<ConsoleArgs>(args.port_in.as_deref(), "port.in")?;

    runtime()?.block_on(serve(input))
}

async fn serve(input: Endpoint) -> CliResult<i32> {
    let shutdown = Shutdown::new();
    let _signals = shutdown.watch_signals();
    let _deadline = exit_after_shutdown(&shutdown, EXIT_GRACE);

    let ports = Ports::new(open_port("console.in", input, Direction::Input).await?);
    let component = Component::new("console", ports).with_shutdown(shutdown);

    let reason = component.run(ConsoleSink::new(std::io::stdout())).await;
    debug!(%reason, "exiting");
    Ok(SUCCESS)
}
