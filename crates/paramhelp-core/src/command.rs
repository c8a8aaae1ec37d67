use crate::descriptor::ParamId;
use crate::error::{ParamError, Result};

/// Metadata for one RPC verb provided by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub id: ParamId,
    pub name: String,
    /// Number of operands after the verb.
    pub arity: usize,
    pub description: String,
}

impl CommandDescriptor {
    pub fn new(id: ParamId, name: impl Into<String>, arity: usize) -> Self {
        Self {
            id,
            name: name.into(),
            arity,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.chars().any(char::is_whitespace) {
            return Err(ParamError::InvalidDescriptor {
                name: self.name.clone(),
                reason: "command name must be non-empty without whitespace".into(),
            });
        }
        Ok(())
    }
}
