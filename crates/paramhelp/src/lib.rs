//! Typed parameter registries served over RPC and stream channels.
//!
//! A module describes its tunable parameters once, links them to its own
//! variables, and gets bounds-checked `get`/`set`/`help` over a textual RPC
//! channel plus positional stream synchronization for free.
//!
//! # Crate Structure
//!
//! - [`params`]: descriptors, values, the registry, dispatcher and server
//! - [`frame`]: length-prefixed framing with one channel per logical stream
//! - [`peer`]: Unix socket links, listener, hub and client (behind `peer`)

/// Re-export registry and server types.
pub mod params {
    pub use paramhelp_core::*;
}

/// Re-export frame types.
pub mod frame {
    pub use paramhelp_frame::*;
}

/// Re-export socket types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use paramhelp_peer::*;
}

pub use paramhelp_core::{
    dispatch, Bounds, CommandDescriptor, IoType, ParamCell, ParamDescriptor, ParamError,
    ParamRegistry, ParamServer, ParamType, ParamValue, Reply, ServerConfig, SizePolicy,
};
