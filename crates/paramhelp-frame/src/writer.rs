use std::io::{ErrorKind, Write};
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use bytes::BytesMut;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

/// Writes whole frames to a byte stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
            config,
        }
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.channel, &frame.payload)
    }

    /// Frame `payload` on `channel` and write it out, then flush.
    pub fn send(&mut self, channel: u16, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_frame(channel, payload, &mut self.buf)?;

        let mut written = 0;
        while written < self.buf.len() {
            match self.inner.write(&self.buf[written..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => written += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(unix)]
impl FrameWriter<UnixStream> {
    /// Wrap a socket and apply the configured write timeout to it.
    pub fn for_socket(inner: UnixStream, config: FrameConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::channel::{INFO, RPC};
    use crate::codec::decode_frame;
    use crate::reader::FrameReader;

    fn decode_all(bytes: &[u8]) -> Vec<Frame> {
        let mut wire = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = decode_frame(&mut wire, usize::MAX).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn writes_decodable_frames() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        writer.send(RPC, b"Parameter param_int set to 4").unwrap();
        writer.write_frame(&Frame::new(INFO, "ready")).unwrap();

        let frames = decode_all(writer.into_inner().get_ref());
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].text(), "Parameter param_int set to 4");
        assert_eq!(frames[1].channel, INFO);
    }

    #[test]
    fn limit_applies_on_send() {
        let cfg = FrameConfig {
            max_payload_size: 3,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::new()), cfg);
        assert!(matches!(
            writer.send(RPC, b"help").unwrap_err(),
            FrameError::PayloadTooLarge { size: 4, max: 3 }
        ));
        assert!(writer.get_ref().get_ref().is_empty());
    }

    #[test]
    fn zero_length_write_means_closed() {
        let mut writer = FrameWriter::new(Zero);
        assert!(matches!(
            writer.send(RPC, b"x").unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn interrupted_write_and_flush_retry() {
        let mut writer = FrameWriter::new(Flaky {
            write_failed: false,
            flush_failed: false,
            data: Vec::new(),
        });
        writer.send(RPC, b"get 1").unwrap();
        let frames = decode_all(&writer.into_inner().data);
        assert_eq!(frames[0].text(), "get 1");
    }

    #[test]
    #[cfg(unix)]
    fn socket_roundtrip() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut writer = FrameWriter::for_socket(left, FrameConfig::default()).unwrap();
        let mut reader = FrameReader::new(right);

        let sender = std::thread::spawn(move || {
            for i in 0..32 {
                writer.send(RPC, format!("get {i}").as_bytes()).unwrap();
            }
        });
        for i in 0..32 {
            assert_eq!(reader.read_frame().unwrap().text(), format!("get {i}"));
        }
        sender.join().unwrap();
    }

    struct Zero;

    impl Write for Zero {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct Flaky {
        write_failed: bool,
        flush_failed: bool,
        data: Vec<u8>,
    }

    impl Write for Flaky {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.write_failed {
                self.write_failed = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_failed {
                self.flush_failed = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }
}
