use paramhelp_peer::ParamClient;
use tracing::debug;

use crate::cmd::StreamArgs;
use crate::exit::{peer_error, CliResult, SUCCESS};

pub fn run(args: StreamArgs) -> CliResult<i32> {
    let client =
        ParamClient::connect(&args.socket).map_err(|err| peer_error("connect failed", err))?;
    let message = args.fields.join("\n");
    client
        .send_stream(&message)
        .map_err(|err| peer_error("send failed", err))?;
    debug!(fields = args.fields.len(), "stream message sent");
    Ok(SUCCESS)
}
