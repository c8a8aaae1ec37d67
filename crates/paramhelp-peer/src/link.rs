//! One Unix socket carrying the four paramhelp channels.
//!
//! A background reader thread pulls frames off the socket and drops each
//! payload into the queue of its channel. Writes go straight to the socket
//! through a shared, locked [`FrameWriter`], so any number of [`LinkSink`]s
//! can send without interleaving frames.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use paramhelp_core::{MessageSink, ParamServer, QueueSource};
use paramhelp_frame::{channel_name, Channel, FrameConfig, FrameError, FrameReader, FrameWriter};
use tracing::{debug, trace, warn};

use crate::error::{PeerError, Result};

type SharedWriter = Arc<Mutex<FrameWriter<UnixStream>>>;

/// Link behavior settings.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// How long a client waits for an RPC reply. Default: 5 s.
    pub request_timeout: Duration,
    /// Payloads buffered per inbound channel; further frames are dropped
    /// until the queue drains. Default: 64.
    pub queue_capacity: usize,
    /// Payload limit and write timeout. The reader ignores `read_timeout`
    /// and blocks until the socket closes.
    pub frame: FrameConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            queue_capacity: 64,
            frame: FrameConfig::default(),
        }
    }
}

/// A connected socket, demultiplexed by channel.
pub struct Link {
    inbound: HashMap<Channel, flume::Receiver<Vec<u8>>>,
    writer: SharedWriter,
    socket: UnixStream,
    reader: Option<JoinHandle<()>>,
    config: LinkConfig,
}

impl Link {
    pub fn new(stream: UnixStream) -> Result<Self> {
        Self::with_config(stream, LinkConfig::default())
    }

    pub fn with_config(stream: UnixStream, config: LinkConfig) -> Result<Self> {
        Self::with_routes(stream, config, Vec::new())
    }

    /// Like [`Link::with_config`], but inbound payloads on the routed
    /// channels go to the given senders instead of link-owned queues.
    ///
    /// Routed channels have no receiver on the link.
    pub fn with_routes(
        stream: UnixStream,
        config: LinkConfig,
        routes: impl IntoIterator<Item = (Channel, flume::Sender<Vec<u8>>)>,
    ) -> Result<Self> {
        let mut senders: HashMap<Channel, flume::Sender<Vec<u8>>> = routes.into_iter().collect();
        let mut inbound = HashMap::new();
        for channel in Channel::ALL {
            if !senders.contains_key(&channel) {
                let (tx, rx) = flume::bounded(config.queue_capacity);
                senders.insert(channel, tx);
                inbound.insert(channel, rx);
            }
        }

        let reader = FrameReader::with_config(stream.try_clone()?, config.frame.clone());
        let socket = stream.try_clone()?;
        let writer = Arc::new(Mutex::new(FrameWriter::for_socket(
            stream,
            config.frame.clone(),
        )?));

        let reader = thread::Builder::new()
            .name("paramhelp-link".to_string())
            .spawn(move || demux(reader, senders))?;

        Ok(Self {
            inbound,
            writer,
            socket,
            reader: Some(reader),
            config,
        })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Hand out the inbound queue of `channel`. Each queue can be taken once.
    pub fn take_receiver(&mut self, channel: Channel) -> Result<flume::Receiver<Vec<u8>>> {
        self.inbound
            .remove(&channel)
            .ok_or(PeerError::ChannelTaken {
                channel: channel.suffix(),
            })
    }

    /// Inbound queue of `channel` as a core [`paramhelp_core::MessageSource`].
    pub fn take_source(&mut self, channel: Channel) -> Result<QueueSource> {
        self.take_receiver(channel).map(QueueSource::from_receiver)
    }

    /// A sender for `channel`. Sinks share the link's writer.
    pub fn sink(&self, channel: Channel) -> LinkSink {
        LinkSink {
            channel,
            writer: Arc::clone(&self.writer),
        }
    }

    pub fn send(&self, channel: Channel, payload: &[u8]) -> Result<()> {
        self.writer.lock().send(channel.id(), payload)?;
        Ok(())
    }

    /// Wire this link to every channel of `server`: RPC requests and stream
    /// input come from the link, replies, stream output and info go to it.
    ///
    /// The link must outlive the server's use of those channels.
    pub fn attach(&mut self, server: &ParamServer) -> Result<()> {
        let requests = self.take_source(Channel::Rpc)?;
        let stream_in = self.take_source(Channel::StreamIn)?;
        server.attach_rpc(requests, self.sink(Channel::Rpc));
        server.attach_stream_in(stream_in);
        server.attach_stream_out(self.sink(Channel::StreamOut));
        server.attach_info(self.sink(Channel::Info));
        debug!(server = %server.name(), "link attached to server");
        Ok(())
    }

    /// Close both directions. Pending receivers see the channel close once
    /// the reader thread exits.
    pub fn shutdown(&self) {
        if let Err(err) = self.socket.shutdown(Shutdown::Both) {
            if err.kind() != io::ErrorKind::NotConnected {
                debug!(error = %err, "link shutdown failed");
            }
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("open_receivers", &self.inbound.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn demux(mut reader: FrameReader<UnixStream>, senders: HashMap<Channel, flume::Sender<Vec<u8>>>) {
    loop {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(err) if err.is_disconnect() => {
                debug!("link closed");
                break;
            }
            Err(err) => {
                warn!(error = %err, "link reader stopped");
                break;
            }
        };

        let Some(tx) = Channel::from_id(frame.channel).and_then(|ch| senders.get(&ch)) else {
            warn!(channel = frame.channel, "dropping frame on unknown channel");
            continue;
        };
        match tx.try_send(frame.payload.to_vec()) {
            Ok(()) => {}
            Err(flume::TrySendError::Full(_)) => {
                warn!(channel = channel_name(frame.channel), "inbound queue full, frame dropped");
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                trace!(channel = channel_name(frame.channel), "no receiver, frame dropped");
            }
        }
    }
}

/// Sending end of one channel of a [`Link`].
#[derive(Clone)]
pub struct LinkSink {
    channel: Channel,
    writer: SharedWriter,
}

impl LinkSink {
    pub fn channel(&self) -> Channel {
        self.channel
    }
}

impl fmt::Debug for LinkSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkSink")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl MessageSink for LinkSink {
    fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        self.writer
            .lock()
            .send(self.channel.id(), payload)
            .map_err(frame_to_io)
    }
}

fn frame_to_io(err: FrameError) -> io::Error {
    match err {
        FrameError::Io(err) => err,
        err if err.is_disconnect() => io::Error::new(io::ErrorKind::BrokenPipe, err),
        err => io::Error::new(io::ErrorKind::InvalidData, err),
    }
}
