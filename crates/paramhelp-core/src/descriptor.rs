//! Parameter metadata: type, size policy, bounds and channel access.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constraint;
use crate::error::{ParamError, Result};
use crate::value::{format_double, ParamValue};

/// Integer key shared by parameters and commands (separate namespaces).
pub type ParamId = u32;

/// Element type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    Double,
    Bool,
    String,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::Int => "int",
            ParamType::Double => "double",
            ParamType::Bool => "bool",
            ParamType::String => "string",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ParamType::Int | ParamType::Double)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamType {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(ParamType::Int),
            "double" | "float" => Ok(ParamType::Double),
            "bool" | "boolean" => Ok(ParamType::Bool),
            "string" | "str" => Ok(ParamType::String),
            _ => Err(ParamError::Parse {
                token: s.to_string(),
                expected: "parameter type",
            }),
        }
    }
}

/// Rule for how many elements a parameter holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizePolicy {
    /// Exactly `n` elements; sets of another length are rejected.
    Fixed(usize),
    /// Between `min` and `max` elements (inclusive); storage is resized on set.
    Variable { min: usize, max: usize },
}

impl SizePolicy {
    /// Any length, including zero.
    pub const FREE: SizePolicy = SizePolicy::Variable {
        min: 0,
        max: usize::MAX,
    };

    pub fn accepts(&self, len: usize) -> bool {
        match *self {
            SizePolicy::Fixed(n) => len == n,
            SizePolicy::Variable { min, max } => (min..=max).contains(&len),
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, SizePolicy::Variable { .. })
    }

    /// Length storage starts with when no default value is given.
    pub fn initial_len(&self) -> usize {
        match *self {
            SizePolicy::Fixed(n) => n,
            SizePolicy::Variable { min, .. } => min,
        }
    }
}

impl Default for SizePolicy {
    fn default() -> Self {
        SizePolicy::Fixed(1)
    }
}

impl fmt::Display for SizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SizePolicy::Fixed(n) => write!(f, "{n}"),
            SizePolicy::Variable { min, max } if max == usize::MAX => write!(f, "{min}.."),
            SizePolicy::Variable { min, max } => write!(f, "{min}..{max}"),
        }
    }
}

/// Inclusive value range for numeric parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Bounds {
    #[default]
    None,
    Int {
        min: i64,
        max: i64,
    },
    Double {
        min: f64,
        max: f64,
    },
}

impl Bounds {
    pub fn is_none(&self) -> bool {
        matches!(self, Bounds::None)
    }

    /// Whether these bounds can be attached to a parameter of type `ty`.
    pub fn fits(&self, ty: ParamType) -> bool {
        match self {
            Bounds::None => true,
            Bounds::Int { .. } => ty == ParamType::Int,
            Bounds::Double { .. } => ty == ParamType::Double,
        }
    }

    fn is_ordered(&self) -> bool {
        match *self {
            Bounds::None => true,
            Bounds::Int { min, max } => min <= max,
            Bounds::Double { min, max } => min <= max,
        }
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Bounds::None => f.write_str("none"),
            Bounds::Int { min, max } => write!(f, "[{min}, {max}]"),
            Bounds::Double { min, max } => {
                write!(f, "[{}, {}]", format_double(min), format_double(max))
            }
        }
    }
}

/// Set of channels through which a parameter may be read or written.
///
/// A parameter with neither [`IoType::RPC`] nor [`IoType::STREAMING`] is a
/// configuration parameter: it is only set at startup.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoType(u8);

impl IoType {
    pub const CONFIG: IoType = IoType(0);
    pub const INPUT: IoType = IoType(1);
    pub const OUTPUT: IoType = IoType(1 << 1);
    pub const RPC: IoType = IoType(1 << 2);
    pub const STREAMING: IoType = IoType(1 << 3);

    const NAMES: [(IoType, &'static str); 4] = [
        (IoType::INPUT, "input"),
        (IoType::OUTPUT, "output"),
        (IoType::RPC, "rpc"),
        (IoType::STREAMING, "streaming"),
    ];

    pub fn contains(self, other: IoType) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_config(self) -> bool {
        self.0 & (IoType::RPC.0 | IoType::STREAMING.0) == 0
    }

    pub fn rpc_readable(self) -> bool {
        self.contains(IoType::RPC)
    }

    pub fn rpc_writable(self) -> bool {
        self.contains(IoType::RPC | IoType::INPUT)
    }

    pub fn streams_in(self) -> bool {
        self.contains(IoType::STREAMING | IoType::INPUT)
    }

    pub fn streams_out(self) -> bool {
        self.contains(IoType::STREAMING | IoType::OUTPUT)
    }

    /// Configuration and input parameters expect a value at startup.
    pub fn needs_initial_value(self) -> bool {
        self.is_config() || self.contains(IoType::INPUT)
    }
}

impl Default for IoType {
    fn default() -> Self {
        IoType::RPC | IoType::INPUT | IoType::OUTPUT
    }
}

impl BitOr for IoType {
    type Output = IoType;

    fn bitor(self, rhs: IoType) -> IoType {
        IoType(self.0 | rhs.0)
    }
}

impl fmt::Display for IoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("config");
        }
        let mut first = true;
        for (flag, name) in IoType::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for IoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IoType({self})")
    }
}

impl FromStr for IoType {
    type Err = ParamError;

    /// Parses `input|output|rpc` style lists; `config` is the empty set.
    fn from_str(s: &str) -> Result<Self> {
        let mut io = IoType::CONFIG;
        for part in s.split(['|', ',']).map(str::trim).filter(|p| !p.is_empty()) {
            let part = part.to_ascii_lowercase();
            if part == "config" {
                continue;
            }
            let flag = IoType::NAMES
                .iter()
                .find(|(_, name)| *name == part)
                .map(|(flag, _)| *flag)
                .ok_or_else(|| ParamError::Parse {
                    token: part.clone(),
                    expected: "io flag",
                })?;
            io = io | flag;
        }
        Ok(io)
    }
}

/// Immutable metadata for one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    pub id: ParamId,
    pub name: String,
    pub ty: ParamType,
    pub size: SizePolicy,
    pub bounds: Bounds,
    pub io: IoType,
    pub default: Option<ParamValue>,
    pub description: String,
}

impl ParamDescriptor {
    /// Single-element, unbounded, RPC read/write parameter with no default.
    pub fn new(id: ParamId, name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            id,
            name: name.into(),
            ty,
            size: SizePolicy::default(),
            bounds: Bounds::None,
            io: IoType::default(),
            default: None,
            description: String::new(),
        }
    }

    pub fn with_size(mut self, size: SizePolicy) -> Self {
        self.size = size;
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_io(mut self, io: IoType) -> Self {
        self.io = io;
        self
    }

    pub fn with_default(mut self, value: impl Into<ParamValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Internal consistency: name shape, bounds vs. type, size range, default.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| ParamError::InvalidDescriptor {
            name: self.name.clone(),
            reason,
        };

        if self.name.is_empty() || self.name.chars().any(char::is_whitespace) {
            return Err(invalid("name must be non-empty without whitespace".into()));
        }
        if !self.bounds.fits(self.ty) {
            return Err(invalid(format!(
                "bounds {} do not apply to {} values",
                self.bounds, self.ty
            )));
        }
        if !self.bounds.is_ordered() {
            return Err(invalid(format!("bounds {} are inverted", self.bounds)));
        }
        if let SizePolicy::Variable { min, max } = self.size {
            if min > max {
                return Err(invalid(format!("size range {min}..{max} is inverted")));
            }
        }
        if let Some(default) = &self.default {
            constraint::check(self, default)
                .map_err(|err| invalid(format!("default value rejected: {err}")))?;
        }
        Ok(())
    }
}
