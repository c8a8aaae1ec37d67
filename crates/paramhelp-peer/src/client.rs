use std::path::Path;
use std::time::Duration;

use paramhelp_core::{
    apply_stream, encode_stream, quote, ErrorKind, ParamError, ParamId, ParamRegistry,
    ParamValue, StreamDirection, StreamReport,
};
use paramhelp_frame::Channel;
use tracing::{debug, trace};

use crate::connector::connect_with_config;
use crate::error::{PeerError, Result};
use crate::link::{Link, LinkConfig};

/// Client side of a paramhelp connection.
///
/// Requests are answered strictly in order, so one outstanding request at a
/// time is enough; replies that arrive after a timeout are discarded before
/// the next request goes out.
///
/// The client keeps its own [`ParamRegistry`] describing the server's
/// parameters. Parameters linked there can be pushed and pulled by id
/// ([`ParamClient::set_param`], [`ParamClient::get_param`]) and streamed in
/// the client direction ([`ParamClient::send_stream_params`],
/// [`ParamClient::read_stream_params`]). The text methods need no registry.
#[derive(Debug)]
pub struct ParamClient {
    link: Link,
    replies: flume::Receiver<Vec<u8>>,
    stream: flume::Receiver<Vec<u8>>,
    info: flume::Receiver<Vec<u8>>,
    timeout: Duration,
    registry: ParamRegistry,
}

impl ParamClient {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with_config(path, LinkConfig::default())
    }

    pub fn connect_with_config(path: impl AsRef<Path>, config: LinkConfig) -> Result<Self> {
        Self::from_link(connect_with_config(path, config)?)
    }

    pub fn from_link(mut link: Link) -> Result<Self> {
        let replies = link.take_receiver(Channel::Rpc)?;
        let stream = link.take_receiver(Channel::StreamOut)?;
        let info = link.take_receiver(Channel::Info)?;
        let timeout = link.config().request_timeout;
        Ok(Self {
            link,
            replies,
            stream,
            info,
            timeout,
            registry: ParamRegistry::new(),
        })
    }

    /// Use `registry` as the local mirror of the server's parameters.
    pub fn with_registry(mut self, registry: ParamRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &ParamRegistry {
        &self.registry
    }

    /// For registering and linking local parameters.
    pub fn registry_mut(&mut self) -> &mut ParamRegistry {
        &mut self.registry
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one RPC request and wait for the reply text.
    pub fn request(&mut self, text: &str) -> Result<String> {
        while let Ok(stale) = self.replies.try_recv() {
            debug!(bytes = stale.len(), "discarding late reply");
        }
        trace!(request = text, "rpc request");
        self.link.send(Channel::Rpc, text.as_bytes())?;
        match self.replies.recv_timeout(self.timeout) {
            Ok(reply) => Ok(String::from_utf8_lossy(&reply).into_owned()),
            Err(flume::RecvTimeoutError::Timeout) => Err(PeerError::Timeout(self.timeout)),
            Err(flume::RecvTimeoutError::Disconnected) => {
                Err(PeerError::Disconnected { channel: "rpc" })
            }
        }
    }

    pub fn get(&mut self, key: &str) -> Result<String> {
        self.request(&format!("get {}", quote(key)))
    }

    pub fn get_element(&mut self, key: &str, index: usize) -> Result<String> {
        self.request(&format!("get {} {index}", quote(key)))
    }

    pub fn set(&mut self, key: &str, value: &ParamValue) -> Result<String> {
        self.set_text(key, &value.to_wire())
    }

    /// `set` with the value already in wire text.
    pub fn set_text(&mut self, key: &str, wire: &str) -> Result<String> {
        self.request(&format!("set {} {wire}", quote(key)))
    }

    pub fn command(&mut self, name: &str, args: &[&str]) -> Result<String> {
        let mut text = quote(name);
        for arg in args {
            text.push(' ');
            text.push_str(&quote(arg));
        }
        self.request(&text)
    }

    pub fn help(&mut self, topic: Option<&str>) -> Result<String> {
        match topic {
            Some(topic) => self.request(&format!("help {}", quote(topic))),
            None => self.request("help"),
        }
    }

    /// Send the locally linked value of parameter `id` to the server.
    ///
    /// Returns the reply on success; any other reply is
    /// [`PeerError::Rejected`].
    pub fn set_param(&mut self, id: ParamId) -> Result<String> {
        let name = self.registry.descriptor(id)?.name.clone();
        let value = self.registry.get(id)?;
        let request = format!("set {} {}", quote(&name), value.to_wire());
        let reply = self.request(&request)?;
        if reply.starts_with(&format!("Parameter {name} set to ")) {
            Ok(reply)
        } else {
            Err(PeerError::Rejected { request, reply })
        }
    }

    /// Read parameter `id` from the server and store it in the local binding.
    ///
    /// The reply must parse as the parameter's type and pass the local
    /// descriptor's checks, otherwise it is [`PeerError::Rejected`] and the
    /// local value is left alone.
    pub fn get_param(&mut self, id: ParamId) -> Result<ParamValue> {
        let desc = self.registry.descriptor(id)?;
        let ty = desc.ty;
        let request = format!("get {}", quote(&desc.name));
        let reply = self.request(&request)?;

        let parsed = if reply.contains('\n') {
            None
        } else {
            ParamValue::parse(ty, &reply).ok()
        };
        let Some(value) = parsed else {
            return Err(PeerError::Rejected { request, reply });
        };
        match self.registry.set(id, value.clone()) {
            Ok(()) => Ok(value),
            Err(err) if is_violation(&err) => Err(PeerError::Rejected { request, reply }),
            Err(err) => Err(err.into()),
        }
    }

    /// Send command `id` of the local registry with its operand tokens.
    pub fn send_command(&mut self, id: ParamId, args: &[&str]) -> Result<String> {
        let name = self.registry.command(id)?.name.clone();
        self.command(&name, args)
    }

    /// Send the local `Streaming + Input` parameters as one message.
    pub fn send_stream_params(&self) -> Result<()> {
        let message = encode_stream(&self.registry, StreamDirection::Input);
        self.send_stream(&message)
    }

    /// Apply one stream-output message to the local `Streaming + Output`
    /// parameters.
    ///
    /// A non-blocking read with nothing pending is a
    /// [`ParamError::NoData`] error.
    pub fn read_stream_params(&mut self, blocking: bool) -> Result<StreamReport> {
        let payload = if blocking {
            self.stream.recv().map_err(|_| PeerError::Disconnected {
                channel: "stream output",
            })?
        } else {
            match self.stream.try_recv() {
                Ok(payload) => payload,
                Err(flume::TryRecvError::Empty) => return Err(ParamError::NoData.into()),
                Err(flume::TryRecvError::Disconnected) => {
                    return Err(PeerError::Disconnected {
                        channel: "stream output",
                    })
                }
            }
        };
        let message = String::from_utf8_lossy(&payload);
        Ok(apply_stream(
            &mut self.registry,
            StreamDirection::Output,
            &message,
        ))
    }

    /// Send one raw stream-input message.
    pub fn send_stream(&self, message: &str) -> Result<()> {
        self.link.send(Channel::StreamIn, message.as_bytes())
    }

    /// Send one stream-input message built from positional values.
    pub fn send_stream_values(&self, values: &[ParamValue]) -> Result<()> {
        let message = values
            .iter()
            .map(ParamValue::to_wire)
            .collect::<Vec<_>>()
            .join("\n");
        self.send_stream(&message)
    }

    /// Next stream-output message. `None` timeout waits forever;
    /// `Ok(None)` means the timeout passed.
    pub fn recv_stream(&self, timeout: Option<Duration>) -> Result<Option<String>> {
        recv_text(&self.stream, timeout, "stream output")
    }

    /// Next info message, same waiting rules as [`ParamClient::recv_stream`].
    pub fn recv_info(&self, timeout: Option<Duration>) -> Result<Option<String>> {
        recv_text(&self.info, timeout, "info")
    }
}

fn is_violation(err: &ParamError) -> bool {
    matches!(
        err.kind(),
        ErrorKind::SizeViolation | ErrorKind::BoundsViolation | ErrorKind::TypeViolation
    )
}

fn recv_text(
    rx: &flume::Receiver<Vec<u8>>,
    timeout: Option<Duration>,
    channel: &'static str,
) -> Result<Option<String>> {
    let payload = match timeout {
        None => rx.recv().map_err(|_| PeerError::Disconnected { channel })?,
        Some(timeout) => match rx.recv_timeout(timeout) {
            Ok(payload) => payload,
            Err(flume::RecvTimeoutError::Timeout) => return Ok(None),
            Err(flume::RecvTimeoutError::Disconnected) => {
                return Err(PeerError::Disconnected { channel })
            }
        },
    };
    Ok(Some(String::from_utf8_lossy(&payload).into_owned()))
}
