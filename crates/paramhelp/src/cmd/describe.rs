use paramhelp_core::{dispatch, ParamRegistry, ServerConfig};

use crate::cmd::DescribeArgs;
use crate::exit::{param_error, CliResult, SUCCESS};
use crate::output::{print_describe, DescribeRow, OutputFormat};

pub fn run(args: DescribeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ServerConfig::from_path(&args.config)
        .map_err(|err| param_error(&format!("failed to load {}", args.config.display()), err))?;
    let mut registry = config
        .build_registry()
        .map_err(|err| param_error("invalid server", err))?;

    let rows = describe_rows(&registry);
    let help = dispatch(&mut registry, "help").to_text();
    print_describe(&config.name, &rows, &help, format);
    Ok(SUCCESS)
}

fn describe_rows(registry: &ParamRegistry) -> Vec<DescribeRow> {
    let params = registry.params().map(|desc| DescribeRow {
        kind: "param",
        id: desc.id,
        name: desc.name.clone(),
        ty: desc.ty.to_string(),
        size: desc.size.to_string(),
        bounds: desc.bounds.to_string(),
        io: desc.io.to_string(),
        default: desc
            .default
            .as_ref()
            .map_or_else(|| "none".to_string(), |value| value.to_wire()),
        description: desc.description.clone(),
    });
    let commands = registry.commands().map(|cmd| DescribeRow {
        kind: "command",
        id: cmd.id,
        name: cmd.name.clone(),
        ty: "command".to_string(),
        size: cmd.arity.to_string(),
        bounds: "none".to_string(),
        io: "rpc".to_string(),
        default: "none".to_string(),
        description: cmd.description.clone(),
    });
    params.chain(commands).collect()
}
