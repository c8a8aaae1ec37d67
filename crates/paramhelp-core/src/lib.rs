//! Typed parameter registry for module servers.
//!
//! A module declares its parameters once ([`ParamDescriptor`]), links each
//! one to storage it owns ([`ParamCell`] or any [`Storage`]), and lets the
//! registry enforce type, size and bounds on every write. The same registry
//! answers textual RPC requests ([`dispatch`]), applies and produces
//! positional stream messages ([`apply_stream`], [`encode_stream`]), and sits
//! behind a thread-safe [`ParamServer`] that talks through byte channels.

pub mod binding;
pub mod command;
pub mod config;
pub mod constraint;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod reply;
pub mod server;
pub mod stream;
pub mod transport;
pub mod value;

pub use binding::{ParamCell, Storage};
pub use command::CommandDescriptor;
pub use config::{CommandSpec, IoFlag, ParamSpec, ServerConfig, SizeSpec};
pub use descriptor::{Bounds, IoType, ParamDescriptor, ParamId, ParamType, SizePolicy};
pub use dispatcher::dispatch;
pub use error::{ErrorKind, ParamError, Result};
pub use registry::{CommandHandler, InitReport, ParamCallback, ParamRegistry};
pub use reply::{Reply, ReplyStatus};
pub use server::ParamServer;
pub use stream::{apply_stream, encode_stream, StreamDirection, StreamReport};
pub use transport::{queue, MessageSink, MessageSource, QueueSink, QueueSource};
pub use value::{format_double, quote, tokenize, Element, ParamValue};
