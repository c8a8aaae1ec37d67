//! Length-prefixed framing for the paramhelp channels.
//!
//! A paramhelp link carries four logical streams over one byte stream. Each
//! message is wrapped in an 8-byte header:
//! - 2-byte magic ("PH") so a desynchronized peer fails fast
//! - 4-byte little-endian payload length
//! - 2-byte little-endian channel ID (see [`channel`])
//!
//! Readers always hand back whole frames; partial reads stay internal.

pub mod channel;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use channel::{channel_name, Channel, INFO, RPC, STREAM_IN, STREAM_OUT};
pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
