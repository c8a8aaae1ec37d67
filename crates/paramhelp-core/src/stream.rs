//! Positional stream messages.
//!
//! A stream message has one `\n`-separated field per streaming parameter of
//! one direction, in registration order. Each field is the parameter's wire
//! text. A server sends its output parameters and applies messages to its
//! input parameters; a client does the reverse. Inbound fields are applied
//! one at a time; a bad field is reported and skipped, earlier fields stay
//! applied.

use std::fmt;

use tracing::warn;

use crate::descriptor::{ParamDescriptor, ParamId, ParamType};
use crate::error::ParamError;
use crate::registry::ParamRegistry;
use crate::value::ParamValue;

/// The set of streaming parameters a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamDirection {
    /// `Streaming + Input`: client to server.
    Input,
    /// `Streaming + Output`: server to client.
    Output,
}

impl StreamDirection {
    pub fn carries(self, desc: &ParamDescriptor) -> bool {
        match self {
            Self::Input => desc.io.streams_in(),
            Self::Output => desc.io.streams_out(),
        }
    }
}

impl fmt::Display for StreamDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
        })
    }
}

/// Per-field outcome of applying one inbound stream message.
#[derive(Debug, Default)]
pub struct StreamReport {
    pub applied: Vec<ParamId>,
    pub failed: Vec<(ParamId, ParamError)>,
    /// Fields beyond the last streaming parameter of the direction.
    pub extra_fields: usize,
}

impl StreamReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.extra_fields == 0
    }
}

/// Serialize every streaming parameter of `direction` into one message.
///
/// An unlinked parameter produces an empty field so positions stay stable.
pub fn encode_stream(registry: &ParamRegistry, direction: StreamDirection) -> String {
    registry
        .params()
        .filter(|desc| direction.carries(desc))
        .map(|desc| match registry.get(desc.id) {
            Ok(value) => value.to_wire(),
            Err(err) => {
                warn!(name = %desc.name, %direction, error = %err, "stream field left empty");
                String::new()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Apply one inbound message to the streaming parameters of `direction`.
pub fn apply_stream(
    registry: &mut ParamRegistry,
    direction: StreamDirection,
    message: &str,
) -> StreamReport {
    let targets: Vec<(ParamId, String, ParamType)> = registry
        .params()
        .filter(|desc| direction.carries(desc))
        .map(|desc| (desc.id, desc.name.clone(), desc.ty))
        .collect();

    let fields: Vec<&str> = if message.is_empty() && targets.is_empty() {
        Vec::new()
    } else {
        message.split('\n').collect()
    };

    let mut report = StreamReport {
        extra_fields: fields.len().saturating_sub(targets.len()),
        ..StreamReport::default()
    };

    for (position, (id, name, ty)) in targets.into_iter().enumerate() {
        let outcome = match fields.get(position) {
            Some(field) => {
                ParamValue::parse(ty, field).and_then(|value| registry.set(id, value))
            }
            None => Err(ParamError::MissingField { name: name.clone() }),
        };
        match outcome {
            Ok(()) => report.applied.push(id),
            Err(err) => {
                warn!(name = %name, position, %direction, error = %err, "stream field rejected");
                report.failed.push((id, err));
            }
        }
    }

    if report.extra_fields > 0 {
        warn!(extra = report.extra_fields, %direction, "stream message has extra fields");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::ParamCell;
    use crate::descriptor::{Bounds, IoType, ParamDescriptor, SizePolicy};
    use crate::error::ErrorKind;

    fn stream_in() -> IoType {
        IoType::STREAMING | IoType::INPUT
    }

    fn stream_out() -> IoType {
        IoType::STREAMING | IoType::OUTPUT
    }

    #[test]
    fn encodes_outputs_in_registration_order() {
        let mut reg = ParamRegistry::new();
        reg.add_params([
            ParamDescriptor::new(9, "speed", ParamType::Double)
                .with_io(stream_out())
                .with_default(1.5),
            ParamDescriptor::new(1, "setpoint", ParamType::Double).with_io(stream_in()),
            ParamDescriptor::new(4, "flags", ParamType::Bool)
                .with_size(SizePolicy::Fixed(2))
                .with_io(stream_out() | IoType::RPC)
                .with_default(vec![true, false]),
            ParamDescriptor::new(2, "unlinked", ParamType::Int).with_io(stream_out()),
        ])
        .unwrap();
        reg.link_param(9, ParamCell::new(Vec::<f64>::new())).unwrap();
        reg.link_param(4, ParamCell::new(Vec::<bool>::new())).unwrap();

        assert_eq!(encode_stream(&reg, StreamDirection::Output), "1.5\ntrue false\n");
    }

    #[test]
    fn no_outputs_is_an_empty_message() {
        let reg = ParamRegistry::new();
        assert_eq!(encode_stream(&reg, StreamDirection::Output), "");
    }

    #[test]
    fn applies_fields_independently() {
        let mut reg = ParamRegistry::new();
        reg.add_params([
            ParamDescriptor::new(0, "a", ParamType::Int).with_io(stream_in()),
            ParamDescriptor::new(1, "b", ParamType::Int)
                .with_io(stream_in())
                .with_bounds(Bounds::Int { min: 0, max: 5 }),
            ParamDescriptor::new(2, "c", ParamType::Double)
                .with_io(stream_in())
                .with_size(SizePolicy::FREE),
        ])
        .unwrap();
        let cells: Vec<ParamCell<i64>> = (0..2).map(|_| ParamCell::new(vec![0])).collect();
        reg.link_param(0, cells[0].clone()).unwrap();
        reg.link_param(1, cells[1].clone()).unwrap();
        let c = ParamCell::<f64>::new(Vec::new());
        reg.link_param(2, c.clone()).unwrap();

        let report = apply_stream(&mut reg, StreamDirection::Input, "7\n9\n0.5 1.5");
        assert_eq!(report.applied, [0, 2]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, 1);
        assert_eq!(report.failed[0].1.kind(), ErrorKind::BoundsViolation);
        assert!(!report.is_clean());

        assert_eq!(cells[0].value(), vec![7]);
        assert_eq!(cells[1].value(), vec![0]);
        assert_eq!(c.value(), vec![0.5, 1.5]);
    }

    #[test]
    fn short_and_long_messages() {
        let mut reg = ParamRegistry::new();
        reg.add_params([
            ParamDescriptor::new(0, "a", ParamType::Bool).with_io(stream_in()),
            ParamDescriptor::new(1, "b", ParamType::Bool).with_io(stream_in()),
        ])
        .unwrap();
        reg.link_param(0, ParamCell::new(vec![false])).unwrap();
        reg.link_param(1, ParamCell::new(vec![false])).unwrap();

        let report = apply_stream(&mut reg, StreamDirection::Input, "true");
        assert_eq!(report.applied, [0]);
        assert_eq!(report.failed[0].1.kind(), ErrorKind::Parse);

        let report = apply_stream(&mut reg, StreamDirection::Input, "true\nfalse\nextra");
        assert_eq!(report.applied, [0, 1]);
        assert_eq!(report.extra_fields, 1);
    }

    #[test]
    fn stream_writes_fire_callbacks() {
        let mut reg = ParamRegistry::new();
        reg.add_param(ParamDescriptor::new(0, "a", ParamType::Int).with_io(stream_in()))
            .unwrap();
        reg.link_param(0, ParamCell::new(vec![0i64])).unwrap();
        let (tx, rx) = flume::unbounded();
        reg.register_param_callback(0, move |_, value| {
            let _ = tx.send(value.clone());
        })
        .unwrap();

        assert!(apply_stream(&mut reg, StreamDirection::Input, "12").is_clean());
        assert_eq!(rx.try_recv().unwrap(), ParamValue::from(12i64));
    }

    #[test]
    fn multiline_string_keeps_field_positions() {
        let mut out = ParamRegistry::new();
        out.add_params([
            ParamDescriptor::new(0, "label", ParamType::String).with_io(stream_out()),
            ParamDescriptor::new(1, "count", ParamType::Int).with_io(stream_out()),
        ])
        .unwrap();
        out.link_param(0, ParamCell::new(vec!["a\nb".to_string()])).unwrap();
        out.link_param(1, ParamCell::new(vec![7i64])).unwrap();
        let message = encode_stream(&out, StreamDirection::Output);
        assert_eq!(message.split('\n').count(), 2);

        let mut inp = ParamRegistry::new();
        inp.add_params([
            ParamDescriptor::new(0, "label", ParamType::String).with_io(stream_in()),
            ParamDescriptor::new(1, "count", ParamType::Int).with_io(stream_in()),
        ])
        .unwrap();
        let label = ParamCell::new(vec![String::new()]);
        let count = ParamCell::new(vec![0i64]);
        inp.link_param(0, label.clone()).unwrap();
        inp.link_param(1, count.clone()).unwrap();

        let report = apply_stream(&mut inp, StreamDirection::Input, &message);
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(label.value(), vec!["a\nb".to_string()]);
        assert_eq!(count.value(), vec![7]);
    }

    #[test]
    fn client_side_directions_mirror_the_server() {
        let mut reg = ParamRegistry::new();
        reg.add_params([
            ParamDescriptor::new(0, "setpoint", ParamType::Double)
                .with_io(stream_in())
                .with_default(2.0),
            ParamDescriptor::new(1, "measured", ParamType::Double).with_io(stream_out()),
        ])
        .unwrap();
        let measured = ParamCell::new(vec![0.0f64]);
        reg.link_param(0, ParamCell::new(vec![0.0f64])).unwrap();
        reg.link_param(1, measured.clone()).unwrap();

        assert_eq!(encode_stream(&reg, StreamDirection::Input), "2.0");
        let report = apply_stream(&mut reg, StreamDirection::Output, "3.5");
        assert_eq!(report.applied, [1]);
        assert_eq!(measured.value(), vec![3.5]);
    }

    #[test]
    fn empty_message_without_inputs_is_clean() {
        let mut reg = ParamRegistry::new();
        assert!(apply_stream(&mut reg, StreamDirection::Input, "").is_clean());
    }
}
