use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use paramhelp_frame::Channel;
use paramhelp_peer::ParamClient;

use crate::cmd::{parse_duration, running_flag, WatchArgs};
use crate::exit::{peer_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_message, OutputFormat};

const POLL: Duration = Duration::from_millis(200);

pub fn run(args: WatchArgs, format: OutputFormat) -> CliResult<i32> {
    let idle_limit = args.timeout.as_deref().map(parse_duration).transpose()?;
    let client =
        ParamClient::connect(&args.socket).map_err(|err| peer_error("connect failed", err))?;
    let channel = if args.info {
        Channel::Info
    } else {
        Channel::StreamOut
    };
    let running = running_flag()?;

    let mut printed = 0usize;
    let mut last_message = Instant::now();
    while running.load(Ordering::SeqCst) {
        let received = if args.info {
            client.recv_info(Some(POLL))
        } else {
            client.recv_stream(Some(POLL))
        }
        .map_err(|err| peer_error("receive failed", err))?;

        let Some(message) = received else {
            if idle_limit.is_some_and(|limit| last_message.elapsed() >= limit) {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("no {} message within the timeout", channel.suffix()),
                ));
            }
            continue;
        };

        last_message = Instant::now();
        print_message(channel, &message, format);
        printed += 1;
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }
    Ok(SUCCESS)
}
