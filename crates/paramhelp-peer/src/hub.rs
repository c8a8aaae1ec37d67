//! One [`ParamServer`] shared by many socket connections.
//!
//! Stream input from every connection is merged into a single queue, and
//! stream output and info messages are copied to every live connection.
//! Each connection gets its own RPC thread; requests from different
//! connections are serialized by the registry lock.

use std::collections::HashMap;
use std::io;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use paramhelp_core::{MessageSink, ParamServer, QueueSource};
use paramhelp_frame::Channel;
use tracing::{debug, info};

use crate::error::Result;
use crate::link::{Link, LinkConfig, LinkSink};

/// Copies each message to every registered sink, dropping sinks that fail.
#[derive(Debug, Clone, Default)]
struct Fanout {
    sinks: Arc<Mutex<Vec<(u64, LinkSink)>>>,
}

impl Fanout {
    fn add(&self, id: u64, sink: LinkSink) {
        self.sinks.lock().push((id, sink));
    }

    fn remove(&self, id: u64) {
        self.sinks.lock().retain(|(sink_id, _)| *sink_id != id);
    }

    fn len(&self) -> usize {
        self.sinks.lock().len()
    }
}

impl MessageSink for Fanout {
    fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        self.sinks.lock().retain_mut(|(id, sink)| match sink.send(payload) {
            Ok(()) => true,
            Err(err) => {
                debug!(connection = *id, channel = sink.channel().suffix(), error = %err, "dropping dead connection");
                false
            }
        });
        Ok(())
    }
}

/// Serves a shared [`ParamServer`] to any number of connections.
pub struct ServerHub {
    server: Arc<ParamServer>,
    stream_in: flume::Sender<Vec<u8>>,
    stream_out: Fanout,
    info: Fanout,
    sockets: Arc<Mutex<HashMap<u64, UnixStream>>>,
    next_id: AtomicU64,
    config: LinkConfig,
}

impl ServerHub {
    /// Attach the hub's merged stream input and fan-out sinks to `server`.
    /// Channels attached to the server earlier are replaced.
    pub fn new(server: Arc<ParamServer>) -> Self {
        Self::with_config(server, LinkConfig::default())
    }

    pub fn with_config(server: Arc<ParamServer>, config: LinkConfig) -> Self {
        let (stream_in, merged) = flume::unbounded();
        let stream_out = Fanout::default();
        let info = Fanout::default();
        server.attach_stream_in(QueueSource::from_receiver(merged));
        server.attach_stream_out(stream_out.clone());
        server.attach_info(info.clone());
        Self {
            server,
            stream_in,
            stream_out,
            info,
            sockets: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    pub fn server(&self) -> &Arc<ParamServer> {
        &self.server
    }

    /// Connections currently receiving stream output.
    pub fn connection_count(&self) -> usize {
        self.stream_out.len()
    }

    /// Take over one accepted connection and answer its RPC requests on a
    /// new thread. The thread ends when the peer disconnects, the server is
    /// closed, or [`ServerHub::shutdown`] is called.
    pub fn serve(&self, stream: UnixStream) -> Result<JoinHandle<()>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sockets.lock().insert(id, stream.try_clone()?);

        let mut link = Link::with_routes(
            stream,
            self.config.clone(),
            [(Channel::StreamIn, self.stream_in.clone())],
        )?;
        let requests = link.take_receiver(Channel::Rpc)?;
        let mut replies = link.sink(Channel::Rpc);
        self.stream_out.add(id, link.sink(Channel::StreamOut));
        self.info.add(id, link.sink(Channel::Info));

        let server = Arc::clone(&self.server);
        let stream_out = self.stream_out.clone();
        let info = self.info.clone();
        let sockets = Arc::clone(&self.sockets);
        info!(connection = id, server = %server.name(), "connection joined");

        let handle = thread::Builder::new()
            .name(format!("paramhelp-rpc-{id}"))
            .spawn(move || {
                while let Ok(request) = requests.recv() {
                    if server.is_closed() {
                        break;
                    }
                    let reply = server.respond(&String::from_utf8_lossy(&request));
                    if let Err(err) = replies.send(reply.to_text().as_bytes()) {
                        debug!(connection = id, error = %err, "reply not delivered");
                        break;
                    }
                }
                stream_out.remove(id);
                info.remove(id);
                sockets.lock().remove(&id);
                drop(link);
                info!(connection = id, "connection left");
            })?;
        Ok(handle)
    }

    /// Close the server and every connection.
    pub fn shutdown(&self) {
        self.server.close();
        for (_, socket) in self.sockets.lock().drain() {
            let _ = socket.shutdown(Shutdown::Both);
        }
    }
}

impl std::fmt::Debug for ServerHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHub")
            .field("server", &self.server.name())
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use paramhelp_core::{IoType, ParamCell, ParamDescriptor, ParamRegistry, ParamType};

    use super::*;
    use crate::client::ParamClient;

    const WAIT: Option<Duration> = Some(Duration::from_secs(2));

    fn hub() -> (ServerHub, ParamCell<i64>) {
        let mut registry = ParamRegistry::new();
        registry
            .add_param(
                ParamDescriptor::new(3, "count", ParamType::Int)
                    .with_io(IoType::default() | IoType::STREAMING)
                    .with_default(0i64),
            )
            .unwrap();
        let count = ParamCell::<i64>::new(Vec::new());
        registry.link_param(3, count.clone()).unwrap();
        let server = Arc::new(ParamServer::with_registry("hub", registry));
        (ServerHub::new(server), count)
    }

    fn client_of(hub: &ServerHub) -> (ParamClient, JoinHandle<()>) {
        let (a, b) = UnixStream::pair().unwrap();
        let handle = hub.serve(a).unwrap();
        (ParamClient::from_link(Link::new(b).unwrap()).unwrap(), handle)
    }

    fn drain_stream(hub: &ServerHub) {
        for _ in 0..100 {
            if hub.server().read_stream_params(false).is_ok() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("stream input never arrived");
    }

    #[test]
    fn clients_share_one_registry() {
        let (hub, count) = hub();
        let (mut first, _h1) = client_of(&hub);
        let (mut second, _h2) = client_of(&hub);
        assert_eq!(hub.connection_count(), 2);

        first.set_text("count", "4").unwrap();
        assert_eq!(second.get("count").unwrap(), "4");
        assert_eq!(count.value(), vec![4]);
    }

    #[test]
    fn stream_is_merged_in_and_copied_out() {
        let (hub, count) = hub();
        let (first, _h1) = client_of(&hub);
        let (second, _h2) = client_of(&hub);

        second.send_stream("9").unwrap();
        drain_stream(&hub);
        assert_eq!(count.value(), vec![9]);

        hub.server().send_stream_params().unwrap();
        assert_eq!(first.recv_stream(WAIT).unwrap().as_deref(), Some("9"));
        assert_eq!(second.recv_stream(WAIT).unwrap().as_deref(), Some("9"));

        hub.server().send_info_message("ready").unwrap();
        assert_eq!(first.recv_info(WAIT).unwrap().as_deref(), Some("ready"));
    }

    #[test]
    fn departed_connection_is_forgotten() {
        let (hub, _count) = hub();
        let (first, h1) = client_of(&hub);
        let (_second, _h2) = client_of(&hub);
        drop(first);
        h1.join().unwrap();
        assert_eq!(hub.connection_count(), 1);
        hub.server().send_stream_params().unwrap();
    }

    #[test]
    fn shutdown_ends_rpc_threads() {
        let (hub, _count) = hub();
        let (mut client, handle) = client_of(&hub);
        hub.shutdown();
        handle.join().unwrap();
        assert!(hub.server().is_closed());
        assert!(client.get("count").is_err());
    }
}
