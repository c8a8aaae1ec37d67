//! JSON server description: parameters, commands and startup values.
//!
//! ```json
//! {
//!   "name": "controller",
//!   "stream_period_ms": 50,
//!   "params": [
//!     { "id": 0, "name": "gain", "type": "double", "min": 0, "max": 2,
//!       "default": "1.0", "description": "Loop gain" },
//!     { "id": 1, "name": "targets", "type": "int", "size": { "min": 0, "max": 8 },
//!       "io": ["streaming", "input"] }
//!   ],
//!   "commands": [ { "id": 0, "name": "reset", "arity": 0 } ],
//!   "initial_values": { "gain": "1.5" }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::command::CommandDescriptor;
use crate::descriptor::{Bounds, IoType, ParamDescriptor, ParamId, ParamType, SizePolicy};
use crate::error::{ParamError, Result};
use crate::registry::ParamRegistry;
use crate::server::ParamServer;
use crate::value::ParamValue;

/// Top-level server description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Server name, reported by `ParamServer::name` and in logs. Default: "paramhelp".
    pub name: String,
    /// Period of the stream thread in milliseconds. Default: 100.
    pub stream_period_ms: u64,
    /// Whether the stream thread blocks waiting for input. Default: false.
    pub blocking_stream_read: bool,
    pub params: Vec<ParamSpec>,
    pub commands: Vec<CommandSpec>,
    /// Startup values as wire text, keyed by parameter name.
    pub initial_values: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "paramhelp".to_string(),
            stream_period_ms: 100,
            blocking_stream_read: false,
            params: Vec::new(),
            commands: Vec::new(),
            initial_values: BTreeMap::new(),
        }
    }
}

/// Element count in a [`ParamSpec`]: a number, or `{ "min": .., "max": .. }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    Fixed(usize),
    Variable {
        #[serde(default)]
        min: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<usize>,
    },
}

impl Default for SizeSpec {
    fn default() -> Self {
        SizeSpec::Fixed(1)
    }
}

impl From<SizeSpec> for SizePolicy {
    fn from(spec: SizeSpec) -> Self {
        match spec {
            SizeSpec::Fixed(n) => SizePolicy::Fixed(n),
            SizeSpec::Variable { min, max } => SizePolicy::Variable {
                min,
                max: max.unwrap_or(usize::MAX),
            },
        }
    }
}

/// Channel flag names accepted in `io` lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoFlag {
    Input,
    Output,
    Rpc,
    Streaming,
    Config,
}

impl IoFlag {
    fn io_type(self) -> IoType {
        match self {
            IoFlag::Input => IoType::INPUT,
            IoFlag::Output => IoType::OUTPUT,
            IoFlag::Rpc => IoType::RPC,
            IoFlag::Streaming => IoType::STREAMING,
            IoFlag::Config => IoType::CONFIG,
        }
    }
}

fn default_io() -> Vec<IoFlag> {
    vec![IoFlag::Rpc, IoFlag::Input, IoFlag::Output]
}

/// Textual form of a [`ParamDescriptor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamSpec {
    pub id: ParamId,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    #[serde(default)]
    pub size: SizeSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<serde_json::Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<serde_json::Number>,
    /// Default: rpc, input, output.
    #[serde(default = "default_io")]
    pub io: Vec<IoFlag>,
    /// Default value as wire text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl ParamSpec {
    pub fn io_type(&self) -> IoType {
        self.io
            .iter()
            .fold(IoType::CONFIG, |io, flag| io | flag.io_type())
    }

    fn bounds(&self) -> Result<Bounds> {
        let (min, max) = match (&self.min, &self.max) {
            (None, None) => return Ok(Bounds::None),
            (Some(min), Some(max)) => (min, max),
            _ => {
                return Err(ParamError::Config(format!(
                    "parameter {}: min and max must be given together",
                    self.name
                )))
            }
        };
        let not_numeric = || {
            ParamError::Config(format!(
                "parameter {}: bounds need int or double bounds, got {min}..{max}",
                self.name
            ))
        };
        match self.ty {
            ParamType::Int => Ok(Bounds::Int {
                min: min.as_i64().ok_or_else(not_numeric)?,
                max: max.as_i64().ok_or_else(not_numeric)?,
            }),
            ParamType::Double => Ok(Bounds::Double {
                min: min.as_f64().ok_or_else(not_numeric)?,
                max: max.as_f64().ok_or_else(not_numeric)?,
            }),
            ParamType::Bool | ParamType::String => Err(ParamError::Config(format!(
                "parameter {}: {} values cannot have bounds",
                self.name, self.ty
            ))),
        }
    }

    pub fn to_descriptor(&self) -> Result<ParamDescriptor> {
        let mut desc = ParamDescriptor::new(self.id, self.name.clone(), self.ty)
            .with_size(self.size.into())
            .with_bounds(self.bounds()?)
            .with_io(self.io_type())
            .with_description(self.description.clone());
        if let Some(text) = &self.default {
            desc = desc.with_default(ParamValue::parse(self.ty, text)?);
        }
        Ok(desc)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSpec {
    pub id: ParamId,
    pub name: String,
    #[serde(default)]
    pub arity: usize,
    #[serde(default)]
    pub description: String,
}

impl CommandSpec {
    pub fn to_descriptor(&self) -> CommandDescriptor {
        CommandDescriptor::new(self.id, self.name.clone(), self.arity)
            .with_description(self.description.clone())
    }
}

/// Replace each whitespace run in a config key with `_`.
pub fn normalize_key(key: &str) -> String {
    key.split_whitespace().collect::<Vec<_>>().join("_")
}

impl ServerConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let mut config: ServerConfig = serde_json::from_str(text)?;
        config.initial_values = std::mem::take(&mut config.initial_values)
            .into_iter()
            .map(|(key, value)| (normalize_key(&key), value))
            .collect();
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn descriptors(&self) -> Result<Vec<ParamDescriptor>> {
        self.params.iter().map(ParamSpec::to_descriptor).collect()
    }

    /// Registry holding every described parameter and command, unlinked.
    pub fn build_registry(&self) -> Result<ParamRegistry> {
        let mut registry = ParamRegistry::new();
        registry.add_params(self.descriptors()?)?;
        registry.add_commands(self.commands.iter().map(CommandSpec::to_descriptor))?;
        Ok(registry)
    }

    pub fn build_server(&self) -> Result<ParamServer> {
        Ok(ParamServer::with_registry(
            self.name.clone(),
            self.build_registry()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const SAMPLE: &str = r#"{
        "name": "controller",
        "stream_period_ms": 50,
        "params": [
            { "id": 0, "name": "gain", "type": "double", "min": 0, "max": 2,
              "default": "1.0", "description": "Loop gain" },
            { "id": 1, "name": "targets", "type": "int", "size": { "min": 0, "max": 8 },
              "io": ["streaming", "input"] },
            { "id": 2, "name": "label", "type": "string", "io": ["config"] }
        ],
        "commands": [ { "id": 0, "name": "reset" } ],
        "initial_values": { "gain": "1.5", "motor  label": "m1" }
    }"#;

    #[test]
    fn parses_sample() {
        let config = ServerConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.name, "controller");
        assert_eq!(config.stream_period_ms, 50);
        assert!(!config.blocking_stream_read);

        let descs = config.descriptors().unwrap();
        assert_eq!(descs[0].bounds, Bounds::Double { min: 0.0, max: 2.0 });
        assert_eq!(descs[0].default, Some(ParamValue::from(1.0)));
        assert_eq!(descs[0].io, IoType::default());
        assert_eq!(descs[1].size, SizePolicy::Variable { min: 0, max: 8 });
        assert_eq!(descs[1].io, IoType::STREAMING | IoType::INPUT);
        assert!(descs[2].io.is_config());
        assert_eq!(descs[2].size, SizePolicy::Fixed(1));
    }

    #[test]
    fn initial_value_keys_are_normalized() {
        let config = ServerConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.initial_values.get("motor_label").map(String::as_str), Some("m1"));
        assert_eq!(normalize_key("  a b\tc "), "a_b_c");
    }

    #[test]
    fn builds_registry() {
        let config = ServerConfig::from_json_str(SAMPLE).unwrap();
        let server = config.build_server().unwrap();
        assert_eq!(server.name(), "controller");
        let reg = server.lock();
        assert_eq!(reg.param_count(), 3);
        assert_eq!(reg.command_id("reset"), Some(0));
    }

    #[test]
    fn rejects_bad_configs() {
        let unknown_field = r#"{ "nmae": "typo" }"#;
        assert_eq!(
            ServerConfig::from_json_str(unknown_field).unwrap_err().kind(),
            ErrorKind::Config
        );

        let bool_bounds = r#"{ "params": [
            { "id": 0, "name": "flag", "type": "bool", "min": 0, "max": 1 } ] }"#;
        let config = ServerConfig::from_json_str(bool_bounds).unwrap();
        assert_eq!(config.descriptors().unwrap_err().kind(), ErrorKind::Config);

        let half_bounds = r#"{ "params": [
            { "id": 0, "name": "x", "type": "int", "min": 0 } ] }"#;
        let config = ServerConfig::from_json_str(half_bounds).unwrap();
        assert_eq!(config.descriptors().unwrap_err().kind(), ErrorKind::Config);

        let bad_default = r#"{ "params": [
            { "id": 0, "name": "x", "type": "int", "default": "one" } ] }"#;
        let config = ServerConfig::from_json_str(bad_default).unwrap();
        assert_eq!(config.descriptors().unwrap_err().kind(), ErrorKind::Parse);

        let duplicate = r#"{ "params": [
            { "id": 0, "name": "x", "type": "int" },
            { "id": 0, "name": "y", "type": "int" } ] }"#;
        let config = ServerConfig::from_json_str(duplicate).unwrap();
        assert_eq!(config.build_registry().unwrap_err().kind(), ErrorKind::DuplicateId);
    }
}
