use crate::error::{ErrorKind, ParamError};

/// Outcome of one RPC request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyStatus {
    #[default]
    Ok,
    Failed(ErrorKind),
    /// Verb matched neither a command nor a built-in parameter verb.
    NotRecognized,
}

/// Human-readable reply lines plus a machine-checkable status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    messages: Vec<String>,
    status: ReplyStatus,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Record a failure; the error text becomes a reply line.
    pub fn fail(&mut self, err: &ParamError) {
        self.messages.push(err.to_string());
        self.status = ReplyStatus::Failed(err.kind());
    }

    pub(crate) fn not_recognized(&mut self) {
        self.status = ReplyStatus::NotRecognized;
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn status(&self) -> ReplyStatus {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    pub fn is_recognized(&self) -> bool {
        self.status != ReplyStatus::NotRecognized
    }

    /// Lines joined with `\n`; this is what goes back over the RPC channel.
    pub fn to_text(&self) -> String {
        self.messages.join("\n")
    }
}
