use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use paramhelp_core::{
    ErrorKind, InitReport, ParamCell, ParamRegistry, ParamServer, ParamType, ServerConfig,
};
use paramhelp_peer::{ParamListener, ServerHub};
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, running_flag, ServeArgs};
use crate::exit::{
    param_error, peer_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS,
};
use crate::output::OutputFormat;

const ACCEPT_POLL: Duration = Duration::from_millis(50);

pub fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let config = ServerConfig::from_path(&args.config)
        .map_err(|err| param_error(&format!("failed to load {}", args.config.display()), err))?;
    let period = match &args.period {
        Some(period) => parse_duration(period)?,
        None => Duration::from_millis(config.stream_period_ms.max(1)),
    };

    let server = Arc::new(build_server(&config).map_err(|err| param_error("invalid server", err))?);
    let report = server.initialize_params(&config.initial_values);
    check_init(&report, args.allow_incomplete)?;

    let listener =
        ParamListener::bind(&args.socket).map_err(|err| peer_error("bind failed", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| peer_error("bind failed", err))?;
    let running = running_flag()?;
    let hub = ServerHub::new(Arc::clone(&server));

    let streamer = {
        let server = Arc::clone(&server);
        let running = Arc::clone(&running);
        let blocking = config.blocking_stream_read;
        thread::Builder::new()
            .name("paramhelp-stream".to_string())
            .spawn(move || stream_loop(&server, period, blocking, &running))
            .map_err(|err| CliError::new(INTERNAL, format!("stream thread failed: {err}")))?
    };

    info!(server = %server.name(), socket = ?args.socket, ?period, "serving parameters");
    while running.load(Ordering::SeqCst) && !server.is_closed() {
        match listener.poll_accept() {
            Ok(Some(stream)) => {
                hub.serve(stream)
                    .map_err(|err| peer_error("connection setup failed", err))?;
                let note = format!("{} connected", hub.connection_count());
                if let Err(err) = server.send_info_message(&note) {
                    debug!(error = %err, "info message not sent");
                }
            }
            Ok(None) => thread::sleep(ACCEPT_POLL),
            Err(err) => return Err(peer_error("accept failed", err)),
        }
    }

    info!(server = %server.name(), "shutting down");
    hub.shutdown();
    drop(hub);
    let _ = streamer.join();
    Ok(SUCCESS)
}

/// An incomplete initialization stops the server unless `allow_incomplete`.
fn check_init(report: &InitReport, allow_incomplete: bool) -> CliResult<()> {
    if report.is_complete() {
        return Ok(());
    }
    if allow_incomplete {
        warn!(
            failed = report.failed.len(),
            missing = report.missing.len(),
            "serving with incomplete initial values"
        );
        return Ok(());
    }
    let mut problems: Vec<String> = report
        .failed
        .iter()
        .map(|(name, err)| format!("{name}: {err}"))
        .collect();
    if !report.missing.is_empty() {
        problems.push(format!("missing: {}", report.missing.join(", ")));
    }
    Err(CliError::new(
        DATA_INVALID,
        format!("initialization incomplete ({})", problems.join("; ")),
    ))
}

/// Registry from `config` with every parameter linked to a fresh cell,
/// plus logging callbacks.
pub fn build_server(config: &ServerConfig) -> paramhelp_core::Result<ParamServer> {
    let mut registry = config.build_registry()?;
    link_cells(&mut registry)?;

    let ids: Vec<_> = registry.params().map(|desc| desc.id).collect();
    for id in ids {
        registry.register_param_callback(id, |desc, value| {
            debug!(name = %desc.name, value = %value, "parameter updated");
        })?;
    }
    let commands: Vec<_> = registry.commands().map(|cmd| cmd.id).collect();
    for id in commands {
        registry.register_command_callback(id, |cmd, args, _reply| {
            info!(command = %cmd.name, ?args, "command received");
        })?;
    }
    Ok(ParamServer::with_registry(config.name.clone(), registry))
}

fn link_cells(registry: &mut ParamRegistry) -> paramhelp_core::Result<()> {
    let params: Vec<_> = registry.params().map(|desc| (desc.id, desc.ty)).collect();
    for (id, ty) in params {
        match ty {
            ParamType::Int => registry.link_param(id, ParamCell::<i64>::new(Vec::new()))?,
            ParamType::Double => registry.link_param(id, ParamCell::<f64>::new(Vec::new()))?,
            ParamType::Bool => registry.link_param(id, ParamCell::<bool>::new(Vec::new()))?,
            ParamType::String => {
                registry.link_param(id, ParamCell::<String>::new(Vec::new()))?
            }
        }
    }
    Ok(())
}

/// Each cycle: apply pending stream input, then publish stream output.
/// In blocking mode a cycle waits for exactly one input message.
fn stream_loop(server: &ParamServer, period: Duration, blocking: bool, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) && !server.is_closed() {
        let started = Instant::now();
        loop {
            match server.read_stream_params(blocking) {
                Ok(_) if blocking => break,
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::NoData => break,
                Err(err) => {
                    debug!(error = %err, "stream input closed");
                    return;
                }
            }
        }
        match server.send_stream_params() {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotAttached => return,
            Err(err) => warn!(error = %err, "stream output failed"),
        }
        thread::sleep(period.saturating_sub(started.elapsed()));
    }
}
