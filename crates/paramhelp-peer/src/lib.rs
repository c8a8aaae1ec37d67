//! Socket side of paramhelp.
//!
//! A [`Link`] carries the rpc, stream and info channels of one connection
//! over a Unix domain socket. [`ParamListener`] and [`connect`] produce
//! links; [`ServerHub`] serves one [`paramhelp_core::ParamServer`] to many
//! links, and [`ParamClient`] is the requesting end.

#[cfg(not(unix))]
compile_error!("paramhelp-peer requires Unix domain sockets");

pub mod client;
pub mod connector;
pub mod error;
pub mod hub;
pub mod link;
pub mod listener;

pub use client::ParamClient;
pub use connector::{connect, connect_with_config};
pub use error::{PeerError, Result};
pub use hub::ServerHub;
pub use link::{Link, LinkConfig, LinkSink};
pub use listener::ParamListener;
