use crate::descriptor::{Bounds, ParamId, ParamType, SizePolicy};

/// Fieldless classification of [`ParamError`], used in reply statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DuplicateId,
    DuplicateName,
    NotFound,
    Unbound,
    TypeMismatch,
    NotResizable,
    SizeViolation,
    BoundsViolation,
    TypeViolation,
    Parse,
    IndexOutOfRange,
    AccessDenied,
    Usage,
    InvalidDescriptor,
    NoData,
    NotAttached,
    Config,
    Io,
}

/// Errors produced by the parameter registry and the server around it.
#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    #[error("id {id} is already registered")]
    DuplicateId { id: ParamId },

    #[error("name {name} is already registered")]
    DuplicateName { name: String },

    #[error("{key} not found")]
    NotFound { key: String },

    #[error("Parameter {name} is not linked to any storage")]
    Unbound { name: String },

    /// Storage element type differs from the descriptor type at link time.
    #[error("Parameter {name} holds {expected} values, storage holds {found}")]
    TypeMismatch {
        name: String,
        expected: ParamType,
        found: ParamType,
    },

    #[error("Parameter {name} needs resizable storage of length {expected}, got {found}")]
    NotResizable {
        name: String,
        expected: SizePolicy,
        found: usize,
    },

    #[error("Wrong size of parameter {name} (expected {expected}, found {found})")]
    SizeViolation {
        name: String,
        expected: SizePolicy,
        found: usize,
    },

    #[error("Value {value} does not satisfy constraints {bounds} of parameter {name}")]
    BoundsViolation {
        name: String,
        value: String,
        bounds: Bounds,
    },

    /// Candidate value carries the wrong element type.
    #[error("Parameter {name} expects {expected} values, got {found}")]
    TypeViolation {
        name: String,
        expected: ParamType,
        found: ParamType,
    },

    #[error("cannot parse {token:?} as {expected}")]
    Parse { token: String, expected: &'static str },

    #[error("stream field for parameter {name} is missing")]
    MissingField { name: String },

    #[error("Index {index} is out of range for parameter {name} (size {len})")]
    IndexOutOfRange {
        name: String,
        index: usize,
        len: usize,
    },

    #[error("Parameter {name} cannot be {action}")]
    AccessDenied { name: String, action: &'static str },

    #[error("Command {name} takes {expected} arguments, found {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid descriptor {name}: {reason}")]
    InvalidDescriptor { name: String, reason: String },

    /// A batch registration stopped at `index`; nothing from the batch was kept.
    #[error("batch entry {index} rejected: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<ParamError>,
    },

    #[error("no stream message pending")]
    NoData,

    #[error("{channel} channel is not attached")]
    NotAttached { channel: &'static str },

    #[error("invalid config: {0}")]
    Config(String),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ParamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParamError::DuplicateId { .. } => ErrorKind::DuplicateId,
            ParamError::DuplicateName { .. } => ErrorKind::DuplicateName,
            ParamError::NotFound { .. } => ErrorKind::NotFound,
            ParamError::Unbound { .. } => ErrorKind::Unbound,
            ParamError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            ParamError::NotResizable { .. } => ErrorKind::NotResizable,
            ParamError::SizeViolation { .. } | ParamError::Arity { .. } => {
                ErrorKind::SizeViolation
            }
            ParamError::BoundsViolation { .. } => ErrorKind::BoundsViolation,
            ParamError::TypeViolation { .. } => ErrorKind::TypeViolation,
            ParamError::Parse { .. } | ParamError::MissingField { .. } => ErrorKind::Parse,
            ParamError::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            ParamError::AccessDenied { .. } => ErrorKind::AccessDenied,
            ParamError::Usage(_) => ErrorKind::Usage,
            ParamError::InvalidDescriptor { .. } => ErrorKind::InvalidDescriptor,
            ParamError::Batch { source, .. } => source.kind(),
            ParamError::NoData => ErrorKind::NoData,
            ParamError::NotAttached { .. } => ErrorKind::NotAttached,
            ParamError::Config(_) | ParamError::Json(_) => ErrorKind::Config,
            ParamError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn not_found(key: impl std::fmt::Display) -> Self {
        ParamError::NotFound {
            key: key.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParamError>;
