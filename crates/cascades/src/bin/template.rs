use cascades::cli::{
    exit_after_shutdown, open_port, required_endpoint, runtime, TemplateArgs, EXIT_GRACE,
};
use cascades::components::TemplateTransform;
use cascades::exit::{finish, port_error, usage_exit, CliResult, SUCCESS};
use cascades::logging::init_logging;
use cascades::manifest::ComponentManifest;
use cascades_port::{Component, Direction, Ports, Shutdown};
use cascades_transport::Endpoint;
use clap::Parser;
use tracing::debug;

fn main() {
    let args = TemplateArgs::try_parse().unwrap_or_else(|err| usage_exit(err));
    finish(run(args))
}

fn run(args: TemplateArgs) -> CliResult<i32> {
    if args.common.json {
        ComponentManifest::template().print()?;
        return Ok(SUCCESS);
    }

    init_logging(args.common.log_format, args.common.debug);
    let tpl = required_endpoint::<TemplateArgs>(args.port_tpl.as_deref(), "port.tpl")?;
    let input = required_endpoint::<TemplateArgs>(args.port_in.as_deref(), "port.in")?;
    let output = required_endpoint::<TemplateArgs>(args.port_out.as_deref(), "port.out")?;

    runtime()?.block_on(serve(tpl, input, output))
}

async fn serve(tpl: Endpoint, input: Endpoint, output: Endpoint) -> CliResult<i32> {
    let shutdown = Shutdown::new();
    let _signals = shutdown.watch_signals();
    let _deadline = exit_after_shutdown(&shutdown, EXIT_GRACE);

    let config = open_port("template.tpl", tpl, Direction::Input).await?;
    let input = open_port("template.in", input, Direction::Input).await?;
    let output = open_port("template.out", output, Direction::Output).await?;

    let ports = Ports::new(input).with_config(config).with_output(output);
    let component = Component::new("template", ports).with_shutdown(shutdown);

    let reason = component
        .run_configured::<TemplateTransform>()
        .await
        .map_err(|err| port_error("template", err))?;
    debug!(%reason, "exiting");
    Ok(SUCCESS)
}
