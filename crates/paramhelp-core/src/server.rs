use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::dispatcher::dispatch;
use crate::error::{ParamError, Result};
use crate::registry::{InitReport, ParamRegistry};
use crate::reply::Reply;
use crate::stream::{apply_stream, encode_stream, StreamDirection, StreamReport};
use crate::transport::{MessageSink, MessageSource};

struct RpcChannel {
    requests: Box<dyn MessageSource>,
    replies: Box<dyn MessageSink>,
}

/// A registry shared between an RPC thread and a stream thread.
///
/// All registry access goes through [`ParamServer::lock`]; the guard releases
/// the lock when dropped. Every channel has its own lock, and a blocking
/// receive never holds the registry lock.
///
/// Parameter and command callbacks run while the registry lock is held. They
/// must not call back into the server.
pub struct ParamServer {
    name: String,
    registry: Mutex<ParamRegistry>,
    rpc: Mutex<Option<RpcChannel>>,
    stream_in: Mutex<Option<Box<dyn MessageSource>>>,
    stream_out: Mutex<Option<Box<dyn MessageSink>>>,
    info: Mutex<Option<Box<dyn MessageSink>>>,
    closed: AtomicBool,
}

impl ParamServer {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_registry(name, ParamRegistry::new())
    }

    pub fn with_registry(name: impl Into<String>, registry: ParamRegistry) -> Self {
        Self {
            name: name.into(),
            registry: Mutex::new(registry),
            rpc: Mutex::new(None),
            stream_in: Mutex::new(None),
            stream_out: Mutex::new(None),
            info: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exclusive access to the registry until the guard is dropped.
    pub fn lock(&self) -> MutexGuard<'_, ParamRegistry> {
        self.registry.lock()
    }

    pub fn attach_rpc(
        &self,
        requests: impl MessageSource + 'static,
        replies: impl MessageSink + 'static,
    ) {
        *self.rpc.lock() = Some(RpcChannel {
            requests: Box::new(requests),
            replies: Box::new(replies),
        });
    }

    pub fn attach_stream_in(&self, source: impl MessageSource + 'static) {
        *self.stream_in.lock() = Some(Box::new(source));
    }

    pub fn attach_stream_out(&self, sink: impl MessageSink + 'static) {
        *self.stream_out.lock() = Some(Box::new(sink));
    }

    pub fn attach_info(&self, sink: impl MessageSink + 'static) {
        *self.info.lock() = Some(Box::new(sink));
    }

    /// Dispatch one request under the lock and make sure the reply says
    /// something: unrecognized verbs and silent commands get a tail line.
    pub fn respond(&self, request: &str) -> Reply {
        let request = request.trim();
        let mut reply = dispatch(&mut self.lock(), request);
        if !reply.is_recognized() {
            reply.push(format!("Command {request} not recognized."));
        } else if reply.messages().is_empty() {
            reply.push(format!("Command {request} received."));
        }
        reply
    }

    /// Answer one request from the RPC channel.
    ///
    /// Returns `Ok(false)` when `blocking` is false and nothing is pending.
    pub fn handle_rpc(&self, blocking: bool) -> Result<bool> {
        let mut channel = self.rpc.lock();
        let channel = channel
            .as_mut()
            .ok_or(ParamError::NotAttached { channel: "rpc" })?;

        let Some(request) = channel.requests.recv(blocking)? else {
            return Ok(false);
        };
        let reply = self.respond(&String::from_utf8_lossy(&request));
        channel.replies.send(reply.to_text().as_bytes())?;
        Ok(true)
    }

    /// Answer requests until the RPC channel closes or the server is closed.
    pub fn serve_rpc(&self) -> Result<()> {
        info!(server = %self.name, "serving rpc requests");
        while !self.is_closed() {
            match self.handle_rpc(true) {
                Ok(_) => {}
                Err(ParamError::Io(err)) if is_disconnect(&err) => {
                    debug!(server = %self.name, "rpc channel closed");
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Take one message from the stream input and apply it.
    ///
    /// Non-blocking reads return [`ParamError::NoData`] when nothing is
    /// pending. A blocking read waits without holding the registry lock.
    pub fn read_stream_params(&self, blocking: bool) -> Result<StreamReport> {
        let message = {
            let mut source = self.stream_in.lock();
            let source = source.as_mut().ok_or(ParamError::NotAttached {
                channel: "stream input",
            })?;
            source.recv(blocking)?.ok_or(ParamError::NoData)?
        };

        let text = String::from_utf8_lossy(&message);
        Ok(apply_stream(&mut self.lock(), StreamDirection::Input, &text))
    }

    /// Publish the current streaming outputs as one message.
    pub fn send_stream_params(&self) -> Result<()> {
        let message = encode_stream(&self.lock(), StreamDirection::Output);
        let mut sink = self.stream_out.lock();
        sink.as_mut()
            .ok_or(ParamError::NotAttached {
                channel: "stream output",
            })?
            .send(message.as_bytes())?;
        Ok(())
    }

    pub fn send_info_message(&self, text: &str) -> Result<()> {
        let mut sink = self.info.lock();
        sink.as_mut()
            .ok_or(ParamError::NotAttached { channel: "info" })?
            .send(text.as_bytes())?;
        Ok(())
    }

    /// Apply startup values and log what could not be applied.
    pub fn initialize_params(&self, values: &BTreeMap<String, String>) -> InitReport {
        let report = self.lock().initialize(values);
        for (name, err) in &report.failed {
            warn!(server = %self.name, name = %name, error = %err, "initial value rejected");
        }
        if !report.missing.is_empty() {
            warn!(server = %self.name, missing = ?report.missing, "parameters not found in initial values");
        }
        if !report.unknown.is_empty() {
            debug!(server = %self.name, unknown = ?report.unknown, "initial values for unknown parameters");
        }
        info!(server = %self.name, applied = report.applied.len(), "parameters initialized");
        report
    }

    /// Stop serving and detach channels.
    ///
    /// A thread blocked in a receive keeps its channel until the other end
    /// closes; `serve_rpc` returns after the request in flight.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stream_out.lock().take();
        self.info.lock().take();
        if let Some(mut source) = self.stream_in.try_lock() {
            source.take();
        }
        if let Some(mut rpc) = self.rpc.try_lock() {
            rpc.take();
        }
        info!(server = %self.name, "parameter server closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ParamServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamServer")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::binding::ParamCell;
    use crate::command::CommandDescriptor;
    use crate::descriptor::{IoType, ParamDescriptor, ParamType};
    use crate::error::ErrorKind;
    use crate::transport::queue;
    use crate::value::ParamValue;

    fn server() -> (ParamServer, ParamCell<f64>) {
        let server = ParamServer::new("test");
        let cell = ParamCell::<f64>::new(Vec::new());
        {
            let mut reg = server.lock();
            reg.add_params([
                ParamDescriptor::new(0, "param_double", ParamType::Double).with_default(5.0),
                ParamDescriptor::new(1, "param_int", ParamType::Int)
                    .with_default(3i64)
                    .with_description("An int param"),
                ParamDescriptor::new(2, "command_in", ParamType::Double)
                    .with_io(IoType::STREAMING | IoType::INPUT),
                ParamDescriptor::new(3, "measured", ParamType::Double)
                    .with_io(IoType::STREAMING | IoType::OUTPUT)
                    .with_default(0.25),
            ])
            .unwrap();
            reg.add_command(CommandDescriptor::new(0, "reset", 0)).unwrap();
            reg.link_param(0, cell.clone()).unwrap();
            reg.link_param(1, ParamCell::new(Vec::<i64>::new())).unwrap();
            reg.link_param(2, ParamCell::new(vec![0.0])).unwrap();
            reg.link_param(3, ParamCell::new(Vec::<f64>::new())).unwrap();
        }
        (server, cell)
    }

    #[test]
    fn respond_always_says_something() {
        let (server, _) = server();
        assert_eq!(server.respond("get 0").to_text(), "5.0");
        assert_eq!(
            server.respond("jump 3").to_text(),
            "Command jump 3 not recognized."
        );
        assert_eq!(server.respond("reset\n").to_text(), "Command reset received.");
        assert_eq!(server.respond("").to_text(), "Command  not recognized.");
    }

    #[test]
    fn rpc_over_queues() {
        let (server, cell) = server();
        let server = Arc::new(server);
        let (mut requests, request_source) = queue();
        let (reply_sink, mut replies) = queue();
        server.attach_rpc(request_source, reply_sink);

        let worker = {
            let server = Arc::clone(&server);
            thread::spawn(move || server.serve_rpc())
        };

        let mut ask = |text: &str| {
            requests.send(text.as_bytes()).unwrap();
            String::from_utf8(replies.recv(true).unwrap().unwrap()).unwrap()
        };
        assert_eq!(ask("get param_double"), "5.0");
        assert_eq!(ask("set 0 7.25"), "Parameter param_double set to 7.25");
        assert!(ask("help param_int").contains("An int param"));
        assert_eq!(cell.value(), vec![7.25]);

        drop(ask);
        drop(requests);
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn handle_rpc_without_channel() {
        let (server, _) = server();
        assert_eq!(server.handle_rpc(false).unwrap_err().kind(), ErrorKind::NotAttached);

        let (_requests, source) = queue();
        let (sink, _replies) = queue();
        server.attach_rpc(source, sink);
        assert!(!server.handle_rpc(false).unwrap());
    }

    #[test]
    fn stream_input_blocking_and_not() {
        let (server, _) = server();
        assert_eq!(
            server.read_stream_params(false).unwrap_err().kind(),
            ErrorKind::NotAttached
        );

        let (mut sink, source) = queue();
        server.attach_stream_in(source);
        assert_eq!(server.read_stream_params(false).unwrap_err().kind(), ErrorKind::NoData);

        sink.send(b"1.5").unwrap();
        let report = server.read_stream_params(true).unwrap();
        assert!(report.is_clean());
        assert_eq!(server.lock().get(2).unwrap(), ParamValue::from(1.5));

        drop(sink);
        assert_eq!(server.read_stream_params(true).unwrap_err().kind(), ErrorKind::Io);
    }

    #[test]
    fn stream_output_and_info() {
        let (server, _) = server();
        assert_eq!(
            server.send_stream_params().unwrap_err().kind(),
            ErrorKind::NotAttached
        );

        let (sink, mut out) = queue();
        let (info_sink, mut info) = queue();
        server.attach_stream_out(sink);
        server.attach_info(info_sink);

        server.send_stream_params().unwrap();
        assert_eq!(out.recv(false).unwrap().as_deref(), Some(&b"0.25"[..]));
        server.send_info_message("calibrated").unwrap();
        assert_eq!(info.recv(false).unwrap().as_deref(), Some(&b"calibrated"[..]));

        server.close();
        assert!(server.is_closed());
        assert_eq!(server.send_info_message("late").unwrap_err().kind(), ErrorKind::NotAttached);
    }

    #[test]
    fn initialize_params_through_server() {
        let (server, cell) = server();
        let values = BTreeMap::from([("param_double".to_string(), "2.0".to_string())]);
        let report = server.initialize_params(&values);
        assert_eq!(report.applied, ["param_double"]);
        assert_eq!(report.missing, ["command_in"]);
        assert_eq!(cell.value(), vec![2.0]);
    }

    #[test]
    fn locked_sets_never_lose_updates() {
        let (server, cell) = server();
        let server = Arc::new(server);

        let writers: Vec<_> = [1.0, 2.0]
            .into_iter()
            .map(|v| {
                let server = Arc::clone(&server);
                thread::spawn(move || {
                    for _ in 0..500 {
                        server.lock().set(0, ParamValue::from(v)).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        let last = cell.value();
        assert!(last == vec![1.0] || last == vec![2.0], "{last:?}");
    }

    #[test]
    fn lock_makes_read_modify_write_atomic() {
        let (server, _) = server();
        let server = Arc::new(server);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let server = Arc::clone(&server);
                thread::spawn(move || {
                    for _ in 0..250 {
                        let mut reg = server.lock();
                        let ParamValue::Int(current) = reg.get(1).unwrap() else {
                            panic!("param_int should hold ints");
                        };
                        reg.set(1, ParamValue::from(current[0] + 1)).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(server.lock().get(1).unwrap(), ParamValue::from(1003i64));
    }
}
