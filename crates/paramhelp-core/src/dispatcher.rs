//! RPC request interpretation.
//!
//! A request is `<verb> [operands...]`. The verb is matched, ignoring case,
//! against host commands first and then against the built-in verbs:
//!
//! ```text
//! get <name|id> [index]
//! set <name|id> <value...>
//! set one <name|id> <index> <value>
//! set all <name|id> <value>
//! help [name|id]
//! list
//! ```
//!
//! Every request is handled on its own; replies depend only on the request
//! text and the registry contents.

use tracing::{debug, warn};

use crate::descriptor::{IoType, ParamDescriptor, ParamId};
use crate::error::{ParamError, Result};
use crate::registry::ParamRegistry;
use crate::reply::Reply;
use crate::value::{tokenize, ParamValue};

const USAGE: [(&str, &str); 6] = [
    ("get <name|id> [index]", "read a parameter, or one element of it"),
    ("set <name|id> <value...>", "write a parameter"),
    ("set one <name|id> <index> <value>", "write one element of a parameter"),
    ("set all <name|id> <value>", "write every element of a parameter"),
    ("help [name|id]", "describe everything, or one parameter or command"),
    ("list", "list parameter and command ids"),
];

/// Interpret one request against `registry` and build the reply.
///
/// Failures are reported in the reply, never returned; an unknown verb
/// yields a reply with [`ReplyStatus::NotRecognized`](crate::ReplyStatus).
pub fn dispatch(registry: &mut ParamRegistry, request: &str) -> Reply {
    let mut reply = Reply::new();

    let tokens = match tokenize(request) {
        Ok(tokens) => tokens,
        Err(err) => {
            reply.fail(&err);
            return reply;
        }
    };
    let Some((verb, operands)) = tokens.split_first() else {
        reply.not_recognized();
        return reply;
    };
    debug!(verb = %verb, operands = operands.len(), "rpc request");

    if let Some(id) = registry.command_id(verb) {
        run_command(registry, id, operands, &mut reply);
        return reply;
    }

    let outcome = match verb.to_ascii_lowercase().as_str() {
        "get" => get(registry, operands, &mut reply),
        "set" => set(registry, operands, &mut reply),
        "help" => help(registry, operands, &mut reply),
        "list" => {
            list(registry, &mut reply);
            Ok(())
        }
        _ => {
            reply.not_recognized();
            Ok(())
        }
    };

    if let Err(err) = outcome {
        warn!(request, error = %err, "rpc request failed");
        reply.fail(&err);
    }
    reply
}

fn resolve(registry: &ParamRegistry, key: &str) -> Result<ParamId> {
    registry
        .param_id(key)
        .ok_or_else(|| ParamError::NotFound {
            key: format!("Parameter {key}"),
        })
}

fn parse_index(token: &str) -> Result<usize> {
    token.parse().map_err(|_| ParamError::Parse {
        token: token.to_string(),
        expected: "index",
    })
}

fn readable(desc: &ParamDescriptor) -> Result<()> {
    if desc.io.rpc_readable() {
        Ok(())
    } else {
        Err(ParamError::AccessDenied {
            name: desc.name.clone(),
            action: "read",
        })
    }
}

fn writable(desc: &ParamDescriptor) -> Result<()> {
    if desc.io.rpc_writable() {
        Ok(())
    } else {
        Err(ParamError::AccessDenied {
            name: desc.name.clone(),
            action: "written",
        })
    }
}

fn get(registry: &ParamRegistry, operands: &[String], reply: &mut Reply) -> Result<()> {
    let (key, index) = match operands {
        [key] => (key, None),
        [key, index] => (key, Some(parse_index(index)?)),
        _ => return Err(ParamError::Usage(USAGE[0].0)),
    };
    let id = resolve(registry, key)?;
    readable(registry.descriptor(id)?)?;

    let value = match index {
        Some(index) => registry.get_element(id, index)?,
        None => registry.get(id)?,
    };
    reply.push(value.to_wire());
    Ok(())
}

fn set(registry: &mut ParamRegistry, operands: &[String], reply: &mut Reply) -> Result<()> {
    let Some((first, rest)) = operands.split_first() else {
        return Err(ParamError::Usage(USAGE[1].0));
    };

    // `one` / `all` are sub-verbs unless a parameter is literally named so.
    let sub = first.to_ascii_lowercase();
    let is_sub = (sub == "one" || sub == "all") && registry.param_id(first).is_none();

    let id = match (is_sub, sub.as_str(), rest) {
        (true, "one", [key, index, value]) => {
            let id = resolve(registry, key)?;
            let desc = registry.descriptor(id)?;
            writable(desc)?;
            let index = parse_index(index)?;
            let element = ParamValue::parse_tokens(desc.ty, std::slice::from_ref(value))?;
            registry.set_element(id, index, element)?;
            id
        }
        (true, "one", _) => return Err(ParamError::Usage(USAGE[2].0)),
        (true, _, [key, value]) => {
            let id = resolve(registry, key)?;
            let desc = registry.descriptor(id)?;
            writable(desc)?;
            let element = ParamValue::parse_tokens(desc.ty, std::slice::from_ref(value))?;
            registry.set_all(id, element)?;
            id
        }
        (true, _, _) => return Err(ParamError::Usage(USAGE[3].0)),
        (false, _, values) => {
            let id = resolve(registry, first)?;
            let desc = registry.descriptor(id)?;
            writable(desc)?;
            let value = ParamValue::parse_tokens(desc.ty, values)?;
            registry.set(id, value)?;
            id
        }
    };

    let name = &registry.descriptor(id)?.name;
    reply.push(format!("Parameter {name} set to {}", registry.get(id)?));
    Ok(())
}

fn help(registry: &ParamRegistry, operands: &[String], reply: &mut Reply) -> Result<()> {
    match operands {
        [] => {
            help_overview(registry, reply);
            Ok(())
        }
        [key] => {
            if let Some(id) = registry.param_id(key) {
                describe_param(registry.descriptor(id)?, reply);
            } else if let Some(id) = registry.command_id(key) {
                let cmd = registry.command(id)?;
                reply.push(format!("{} (command {})", cmd.name, cmd.id));
                reply.push(format!("  arity: {}", cmd.arity));
                reply.push(format!("  description: {}", cmd.description));
            } else {
                return Err(ParamError::NotFound {
                    key: key.to_string(),
                });
            }
            Ok(())
        }
        _ => Err(ParamError::Usage(USAGE[4].0)),
    }
}

fn help_overview(registry: &ParamRegistry, reply: &mut Reply) {
    reply.push("List of the module commands and descriptions:");
    for cmd in registry.commands() {
        reply.push(format!(" - {}: {}", cmd.name, cmd.description));
    }

    reply.push("List of the parameter verbs:");
    for (usage, what) in USAGE {
        reply.push(format!(" - {usage}: {what}"));
    }

    // Each parameter lands in exactly one group.
    let groups: [(&str, fn(&ParamDescriptor) -> bool); 3] = [
        ("configuration", |d| d.io.is_config()),
        ("streaming", |d| d.io.contains(IoType::STREAMING)),
        ("rpc", |d| !d.io.is_config() && !d.io.contains(IoType::STREAMING)),
    ];
    for (group, member) in groups {
        reply.push(format!("List of the {group} parameters:"));
        for desc in registry.params().filter(|d| member(d)) {
            reply.push(format!(" - {}: {}", desc.name, desc.description));
        }
    }
}

fn describe_param(desc: &ParamDescriptor, reply: &mut Reply) {
    reply.push(format!("{} (parameter {})", desc.name, desc.id));
    reply.push(format!("  type: {}", desc.ty));
    reply.push(format!("  size: {}", desc.size));
    reply.push(format!("  bounds: {}", desc.bounds));
    reply.push(format!("  io: {}", desc.io));
    match &desc.default {
        Some(value) => reply.push(format!("  default: {value}")),
        None => reply.push("  default: none"),
    }
    reply.push(format!("  description: {}", desc.description));
}

fn list(registry: &ParamRegistry, reply: &mut Reply) {
    for desc in registry.params() {
        reply.push(format!("param {} {}", desc.id, desc.name));
    }
    for cmd in registry.commands() {
        reply.push(format!("command {} {}", cmd.id, cmd.name));
    }
}

fn run_command(registry: &ParamRegistry, id: ParamId, operands: &[String], reply: &mut Reply) {
    let cmd = match registry.command(id) {
        Ok(cmd) => cmd,
        Err(err) => return reply.fail(&err),
    };
    if operands.len() != cmd.arity {
        let err = ParamError::Arity {
            name: cmd.name.clone(),
            expected: cmd.arity,
            found: operands.len(),
        };
        warn!(command = %cmd.name, error = %err, "command rejected");
        return reply.fail(&err);
    }
    if let Some(handler) = registry.command_handler(id) {
        handler(cmd, operands, reply);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::binding::ParamCell;
    use crate::command::CommandDescriptor;
    use crate::descriptor::{Bounds, ParamType, SizePolicy};
    use crate::error::ErrorKind;
    use crate::reply::ReplyStatus;

    struct Fixture {
        reg: ParamRegistry,
        double: ParamCell<f64>,
        names: ParamCell<String>,
    }

    fn fixture() -> Fixture {
        let mut reg = ParamRegistry::new();
        reg.add_params([
            ParamDescriptor::new(0, "param_double", ParamType::Double).with_default(5.0),
            ParamDescriptor::new(1, "param_int", ParamType::Int)
                .with_bounds(Bounds::Int { min: 0, max: 10 })
                .with_default(3i64)
                .with_description("An int param"),
            ParamDescriptor::new(2, "param_bool", ParamType::Bool).with_default(true),
            ParamDescriptor::new(3, "names", ParamType::String)
                .with_size(SizePolicy::Variable { min: 0, max: 3 }),
            ParamDescriptor::new(4, "status", ParamType::Int)
                .with_io(IoType::RPC | IoType::OUTPUT | IoType::STREAMING)
                .with_default(0i64)
                .with_description("Loop status"),
            ParamDescriptor::new(5, "rate", ParamType::Double)
                .with_io(IoType::CONFIG)
                .with_default(10.0)
                .with_description("Loop rate"),
            ParamDescriptor::new(6, "gains", ParamType::Int)
                .with_size(SizePolicy::Fixed(3))
                .with_default(vec![1i64, 2, 3]),
        ])
        .unwrap();

        let double = ParamCell::<f64>::new(Vec::new());
        let names = ParamCell::<String>::new(Vec::new());
        reg.link_param(0, double.clone()).unwrap();
        reg.link_param(1, ParamCell::new(Vec::<i64>::new())).unwrap();
        reg.link_param(3, names.clone()).unwrap();
        reg.link_param(4, ParamCell::new(Vec::<i64>::new())).unwrap();
        reg.link_param(5, ParamCell::new(Vec::<f64>::new())).unwrap();
        reg.link_param(6, ParamCell::new(Vec::<i64>::new())).unwrap();
        Fixture { reg, double, names }
    }

    fn text(reg: &mut ParamRegistry, request: &str) -> String {
        dispatch(reg, request).to_text()
    }

    #[test]
    fn get_set_scenario() {
        let Fixture { mut reg, double, .. } = fixture();

        assert_eq!(text(&mut reg, "get 0"), "5.0");
        let reply = dispatch(&mut reg, "set 0 7.25");
        assert!(reply.is_ok());
        assert_eq!(reply.to_text(), "Parameter param_double set to 7.25");
        assert_eq!(text(&mut reg, "get param_double"), "7.25");

        let reply = dispatch(&mut reg, "set 0 7.25 8.0");
        assert_eq!(reply.status(), ReplyStatus::Failed(ErrorKind::SizeViolation));
        assert_eq!(
            reply.to_text(),
            "Wrong size of parameter param_double (expected 1, found 2)"
        );
        assert_eq!(text(&mut reg, "get 0"), "7.25");
        assert_eq!(double.value(), vec![7.25]);
    }

    #[test]
    fn verbs_ignore_case() {
        let Fixture { mut reg, .. } = fixture();
        assert_eq!(text(&mut reg, "GET param_int"), "3");
        assert!(dispatch(&mut reg, "Set param_int 4").is_ok());
        assert_eq!(text(&mut reg, "get param_int"), "4");
    }

    #[test]
    fn help_for_one_param_includes_description() {
        let Fixture { mut reg, .. } = fixture();
        let reply = dispatch(&mut reg, "help param_int");
        assert!(reply.is_ok());
        let text = reply.to_text();
        assert!(text.contains("An int param"));
        assert!(text.contains("type: int"));
        assert!(text.contains("bounds: [0, 10]"));
        assert!(text.contains("default: 3"));
        assert_eq!(dispatch(&mut reg, "help 1").to_text(), text);
    }

    #[test]
    fn help_overview_groups_params() {
        let Fixture { mut reg, .. } = fixture();
        reg.add_command(CommandDescriptor::new(0, "reset", 0).with_description("Reset the loop"))
            .unwrap();
        let lines: Vec<String> = dispatch(&mut reg, "help").messages().to_vec();

        let pos = |needle: &str| {
            lines
                .iter()
                .position(|l| l == needle)
                .unwrap_or_else(|| panic!("missing line {needle:?} in {lines:#?}"))
        };
        assert!(pos(" - reset: Reset the loop") < pos("List of the parameter verbs:"));
        assert!(pos("List of the configuration parameters:") < pos(" - rate: Loop rate"));
        assert!(pos(" - rate: Loop rate") < pos("List of the streaming parameters:"));
        assert!(pos("List of the streaming parameters:") < pos(" - status: Loop status"));
        assert!(pos(" - status: Loop status") < pos("List of the rpc parameters:"));
        assert!(pos("List of the rpc parameters:") < pos(" - param_int: An int param"));
        assert_eq!(lines.iter().filter(|l| l.starts_with(" - status")).count(), 1);
    }

    #[test]
    fn replies_are_deterministic() {
        let Fixture { mut reg, .. } = fixture();
        for request in ["help", "list", "get gains", "set param_int 99", "bogus 1"] {
            let first = dispatch(&mut reg, request);
            let second = dispatch(&mut reg, request);
            assert_eq!(first, second, "{request}");
        }
    }

    #[test]
    fn element_verbs() {
        let Fixture { mut reg, .. } = fixture();
        assert_eq!(text(&mut reg, "get gains 1"), "2");
        assert!(dispatch(&mut reg, "set one gains 0 9").is_ok());
        assert_eq!(text(&mut reg, "get gains"), "9 2 3");
        assert_eq!(
            text(&mut reg, "set all gains 7"),
            "Parameter gains set to 7 7 7"
        );

        let reply = dispatch(&mut reg, "get gains 3");
        assert_eq!(reply.status(), ReplyStatus::Failed(ErrorKind::IndexOutOfRange));
        let reply = dispatch(&mut reg, "set one gains 1");
        assert_eq!(reply.status(), ReplyStatus::Failed(ErrorKind::Usage));
    }

    #[test]
    fn variable_strings_resize() {
        let Fixture { mut reg, names, .. } = fixture();
        assert_eq!(text(&mut reg, "get names"), "");
        assert!(dispatch(&mut reg, r#"set names left "far right""#).is_ok());
        assert_eq!(names.value(), vec!["left", "far right"]);
        assert_eq!(text(&mut reg, "get names"), r#"left "far right""#);
        assert!(dispatch(&mut reg, "set names").is_ok());
        assert!(names.value().is_empty());
    }

    #[test]
    fn failures_are_specific() {
        let Fixture { mut reg, .. } = fixture();
        let cases = [
            ("set param_int 11", ErrorKind::BoundsViolation),
            ("set param_int x", ErrorKind::Parse),
            ("get nope", ErrorKind::NotFound),
            ("get param_bool", ErrorKind::Unbound),
            ("set status 1", ErrorKind::AccessDenied),
            ("get rate", ErrorKind::AccessDenied),
            ("get", ErrorKind::Usage),
            ("set param_int \"4", ErrorKind::Parse),
        ];
        for (request, kind) in cases {
            let reply = dispatch(&mut reg, request);
            assert_eq!(reply.status(), ReplyStatus::Failed(kind), "{request}");
            assert!(!reply.messages().is_empty(), "{request}");
        }
        assert_eq!(text(&mut reg, "get status"), "0");
        assert_eq!(text(&mut reg, "get param_int"), "3");
    }

    #[test]
    fn unknown_verb_is_not_recognized() {
        let Fixture { mut reg, .. } = fixture();
        let reply = dispatch(&mut reg, "jump 3");
        assert_eq!(reply.status(), ReplyStatus::NotRecognized);
        assert!(!reply.is_recognized());
        assert_eq!(dispatch(&mut reg, "   ").status(), ReplyStatus::NotRecognized);
    }

    #[test]
    fn list_shows_ids() {
        let Fixture { mut reg, .. } = fixture();
        reg.add_command(CommandDescriptor::new(0, "reset", 0)).unwrap();
        let reply = dispatch(&mut reg, "list");
        assert_eq!(reply.messages()[0], "param 0 param_double");
        assert_eq!(reply.messages().last().map(String::as_str), Some("command 0 reset"));
    }

    #[test]
    fn commands_run_before_builtin_verbs() {
        let Fixture { mut reg, .. } = fixture();
        reg.add_commands([
            CommandDescriptor::new(0, "move", 2).with_description("Move to x y"),
            CommandDescriptor::new(1, "get", 0),
            CommandDescriptor::new(2, "silent", 0),
        ])
        .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        reg.register_command_callback(0, move |cmd, operands, reply| {
            seen.fetch_add(1, Ordering::SeqCst);
            reply.push(format!("{} to {} {}", cmd.name, operands[0], operands[1]));
        })
        .unwrap();
        reg.register_command_callback(1, |_, _, reply| reply.push("custom get"))
            .unwrap();

        assert_eq!(text(&mut reg, "MOVE 1 2"), "move to 1 2");
        assert_eq!(text(&mut reg, "get"), "custom get");

        let reply = dispatch(&mut reg, "move 1");
        assert_eq!(reply.status(), ReplyStatus::Failed(ErrorKind::SizeViolation));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let reply = dispatch(&mut reg, "silent");
        assert!(reply.is_ok());
        assert!(reply.messages().is_empty());

        assert!(text(&mut reg, "help move").contains("Move to x y"));
    }
}
