use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod describe;
pub mod rpc;
pub mod serve;
pub mod stream;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Host the parameters of a JSON server description on a socket.
    Serve(ServeArgs),
    /// Send one raw RPC request and print the reply.
    Rpc(RpcArgs),
    /// Read a parameter (or one element of it).
    Get(GetArgs),
    /// Write a parameter.
    Set(SetArgs),
    /// Send one stream-input message.
    Stream(StreamArgs),
    /// Print stream-output (or info) messages as they arrive.
    Watch(WatchArgs),
    /// Show the parameters and commands of a server description offline.
    Describe(DescribeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Rpc(args) => rpc::run(args, format),
        Command::Get(args) => rpc::get(args, format),
        Command::Set(args) => rpc::set(args, format),
        Command::Stream(args) => stream::run(args),
        Command::Watch(args) => watch::run(args, format),
        Command::Describe(args) => describe::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// JSON server description.
    pub config: PathBuf,
    /// Socket path to bind.
    #[arg(long, short = 's', env = "PARAMHELP_SOCKET")]
    pub socket: PathBuf,
    /// Stream period override (e.g. 100ms, 1s).
    #[arg(long)]
    pub period: Option<String>,
    /// Serve even if some initial values are missing or rejected.
    #[arg(long)]
    pub allow_incomplete: bool,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Socket path to connect to.
    #[arg(long, short = 's', env = "PARAMHELP_SOCKET")]
    pub socket: PathBuf,
    /// How long to wait for a reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct RpcArgs {
    #[command(flatten)]
    pub client: ClientArgs,
    /// Request tokens; each argument stays one token.
    #[arg(required = true, num_args = 1..)]
    pub request: Vec<String>,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub client: ClientArgs,
    /// Parameter name or id.
    pub key: String,
    /// Element index.
    pub index: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    #[command(flatten)]
    pub client: ClientArgs,
    /// Parameter name or id.
    pub key: String,
    /// Value tokens in wire text.
    #[arg(required = true, num_args = 1.., allow_negative_numbers = true)]
    pub values: Vec<String>,
    /// Write only this element.
    #[arg(long, conflicts_with = "all")]
    pub index: Option<usize>,
    /// Write the single value to every element.
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Socket path to connect to.
    #[arg(long, short = 's', env = "PARAMHELP_SOCKET")]
    pub socket: PathBuf,
    /// One field per streaming input parameter, in order.
    #[arg(required = true, num_args = 1.., allow_negative_numbers = true)]
    pub fields: Vec<String>,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Socket path to connect to.
    #[arg(long, short = 's', env = "PARAMHELP_SOCKET")]
    pub socket: PathBuf,
    /// Watch info messages instead of stream output.
    #[arg(long)]
    pub info: bool,
    /// Exit after N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Give up after this long without a message (e.g. 10s).
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct DescribeArgs {
    /// JSON server description.
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `150ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };
    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input:?}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }
    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Flag that turns false on Ctrl-C.
pub fn running_flag() -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst)).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })?;
    Ok(running)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration(" 3 ").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("0ms").unwrap_err().code, USAGE);
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("").is_err());
    }
}
