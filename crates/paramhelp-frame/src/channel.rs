//! Channel IDs for the four logical paramhelp streams.
//!
//! Channel 0 is never sent; anything above [`INFO`] is rejected by the link
//! demultiplexer.

/// Request/reply text commands (`get`, `set`, `help`, ...).
pub const RPC: u16 = 1;

/// Periodic parameter values flowing into the server.
pub const STREAM_IN: u16 = 2;

/// Periodic parameter values flowing out of the server.
pub const STREAM_OUT: u16 = 3;

/// Sporadic human-readable status messages from the server.
pub const INFO: u16 = 4;

/// Typed view of the known channel IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Rpc,
    StreamIn,
    StreamOut,
    Info,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Rpc,
        Channel::StreamIn,
        Channel::StreamOut,
        Channel::Info,
    ];

    /// Wire ID of this channel.
    pub fn id(self) -> u16 {
        match self {
            Channel::Rpc => RPC,
            Channel::StreamIn => STREAM_IN,
            Channel::StreamOut => STREAM_OUT,
            Channel::Info => INFO,
        }
    }

    /// Map a wire ID back to a channel; `None` for unknown IDs.
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            RPC => Some(Channel::Rpc),
            STREAM_IN => Some(Channel::StreamIn),
            STREAM_OUT => Some(Channel::StreamOut),
            INFO => Some(Channel::Info),
            _ => None,
        }
    }

    /// Port-style suffix, matching the names peers use for these streams.
    pub fn suffix(self) -> &'static str {
        match self {
            Channel::Rpc => "rpc",
            Channel::StreamIn => "stream:i",
            Channel::StreamOut => "stream:o",
            Channel::Info => "info:o",
        }
    }
}

/// Human-readable name for a channel ID.
pub fn channel_name(id: u16) -> &'static str {
    match Channel::from_id(id) {
        Some(Channel::Rpc) => "RPC",
        Some(Channel::StreamIn) => "STREAM_IN",
        Some(Channel::StreamOut) => "STREAM_OUT",
        Some(Channel::Info) => "INFO",
        None => "UNKNOWN",
    }
}
