//! Byte-message channels the server talks through.
//!
//! The server does not care how bytes move between processes. It receives
//! whole messages from a [`MessageSource`] and hands whole messages to a
//! [`MessageSink`]. [`queue`] gives an in-process pair; `paramhelp-peer`
//! provides socket-backed ones.

use std::io;

/// Receiving half of one logical channel.
pub trait MessageSource: Send {
    /// Next message. With `blocking == false`, `Ok(None)` means nothing is
    /// pending. A closed channel is an error of kind `BrokenPipe`.
    fn recv(&mut self, blocking: bool) -> io::Result<Option<Vec<u8>>>;
}

/// Sending half of one logical channel.
pub trait MessageSink: Send {
    fn send(&mut self, payload: &[u8]) -> io::Result<()>;
}

impl<T: MessageSource + ?Sized> MessageSource for Box<T> {
    fn recv(&mut self, blocking: bool) -> io::Result<Option<Vec<u8>>> {
        (**self).recv(blocking)
    }
}

impl<T: MessageSink + ?Sized> MessageSink for Box<T> {
    fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        (**self).send(payload)
    }
}

/// In-process channel end that receives.
#[derive(Debug, Clone)]
pub struct QueueSource {
    rx: flume::Receiver<Vec<u8>>,
}

/// In-process channel end that sends.
#[derive(Debug, Clone)]
pub struct QueueSink {
    tx: flume::Sender<Vec<u8>>,
}

/// Unbounded in-process channel. Dropping every sink closes it.
pub fn queue() -> (QueueSink, QueueSource) {
    let (tx, rx) = flume::unbounded();
    (QueueSink { tx }, QueueSource { rx })
}

impl QueueSource {
    pub fn from_receiver(rx: flume::Receiver<Vec<u8>>) -> Self {
        Self { rx }
    }
}

impl QueueSink {
    pub fn from_sender(tx: flume::Sender<Vec<u8>>) -> Self {
        Self { tx }
    }
}

pub(crate) fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "channel closed")
}

impl MessageSource for QueueSource {
    fn recv(&mut self, blocking: bool) -> io::Result<Option<Vec<u8>>> {
        if blocking {
            return self.rx.recv().map(Some).map_err(|_| closed());
        }
        match self.rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(flume::TryRecvError::Empty) => Ok(None),
            Err(flume::TryRecvError::Disconnected) => Err(closed()),
        }
    }
}

impl MessageSink for QueueSink {
    fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        self.tx.send(payload.to_vec()).map_err(|_| closed())
    }
}
