use paramhelp_core::quote;
use paramhelp_peer::{LinkConfig, ParamClient};

use crate::cmd::{parse_duration, ClientArgs, GetArgs, RpcArgs, SetArgs};
use crate::exit::{peer_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{is_recognized, print_reply, OutputFormat};

pub fn run(args: RpcArgs, format: OutputFormat) -> CliResult<i32> {
    exchange(&args.client, join_tokens(&args.request), format)
}

pub fn get(args: GetArgs, format: OutputFormat) -> CliResult<i32> {
    let mut request = format!("get {}", quote(&args.key));
    if let Some(index) = args.index {
        request.push_str(&format!(" {index}"));
    }
    exchange(&args.client, request, format)
}

pub fn set(args: SetArgs, format: OutputFormat) -> CliResult<i32> {
    exchange(&args.client, set_request(&args)?, format)
}

fn set_request(args: &SetArgs) -> CliResult<String> {
    let key = quote(&args.key);
    let values = join_tokens(&args.values);
    match (args.index, args.all) {
        (Some(index), _) => Ok(format!("set one {key} {index} {values}")),
        (None, true) if args.values.len() != 1 => {
            Err(CliError::new(USAGE, "--all takes exactly one value"))
        }
        (None, true) => Ok(format!("set all {key} {values}")),
        (None, false) => Ok(format!("set {key} {values}")),
    }
}

/// Quote each argument as needed so it stays a single request token.
fn join_tokens(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|token| quote(token))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn connect(args: &ClientArgs) -> CliResult<ParamClient> {
    let config = LinkConfig {
        request_timeout: parse_duration(&args.timeout)?,
        ..LinkConfig::default()
    };
    ParamClient::connect_with_config(&args.socket, config)
        .map_err(|err| peer_error("connect failed", err))
}

fn exchange(args: &ClientArgs, request: String, format: OutputFormat) -> CliResult<i32> {
    let mut client = connect(args)?;
    let reply = client
        .request(&request)
        .map_err(|err| peer_error("request failed", err))?;
    print_reply(&request, &reply, format);
    Ok(if is_recognized(&reply) { SUCCESS } else { FAILURE })
}
