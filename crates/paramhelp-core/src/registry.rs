//! The parameter and command catalog.
//!
//! Descriptors are keyed by id; names are a secondary unique index. Commands
//! live in their own namespace, so a parameter and a command may share an id.
//! Iteration follows registration order, which is also stream field order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::binding::{Binding, Storage};
use crate::command::CommandDescriptor;
use crate::constraint;
use crate::descriptor::{ParamDescriptor, ParamId, SizePolicy};
use crate::error::{ParamError, Result};
use crate::reply::Reply;
use crate::value::{Element, ParamValue};

/// Observer fired after every successful write to a parameter.
pub type ParamCallback = Arc<dyn Fn(&ParamDescriptor, &ParamValue) + Send + Sync>;

/// Handler for a host command: descriptor, operand tokens, reply to fill.
pub type CommandHandler = Arc<dyn Fn(&CommandDescriptor, &[String], &mut Reply) + Send + Sync>;

struct ParamEntry {
    desc: ParamDescriptor,
    binding: Option<Binding>,
    callback: Option<ParamCallback>,
}

struct CommandEntry {
    desc: CommandDescriptor,
    handler: Option<CommandHandler>,
}

/// Result of applying startup values with [`ParamRegistry::initialize`].
#[derive(Debug, Default)]
pub struct InitReport {
    pub applied: Vec<String>,
    pub failed: Vec<(String, ParamError)>,
    /// Parameters that expect a startup value, have no default, and got none.
    pub missing: Vec<String>,
    /// Supplied names that match no parameter.
    pub unknown: Vec<String>,
}

impl InitReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.missing.is_empty()
    }
}

#[derive(Default)]
pub struct ParamRegistry {
    params: BTreeMap<ParamId, ParamEntry>,
    param_order: Vec<ParamId>,
    param_names: HashMap<String, ParamId>,
    commands: BTreeMap<ParamId, CommandEntry>,
    command_order: Vec<ParamId>,
    // Lower-cased; verbs match case-insensitively.
    command_names: HashMap<String, ParamId>,
}

impl ParamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_param(&mut self, desc: ParamDescriptor) -> Result<()> {
        desc.validate()?;
        if self.params.contains_key(&desc.id) {
            return Err(ParamError::DuplicateId { id: desc.id });
        }
        if self.param_names.contains_key(&desc.name) {
            return Err(ParamError::DuplicateName { name: desc.name });
        }

        debug!(id = desc.id, name = %desc.name, ty = %desc.ty, io = %desc.io, "parameter registered");
        self.param_names.insert(desc.name.clone(), desc.id);
        self.param_order.push(desc.id);
        self.params.insert(
            desc.id,
            ParamEntry {
                desc,
                binding: None,
                callback: None,
            },
        );
        Ok(())
    }

    /// Register every descriptor or none of them.
    ///
    /// On failure the error is [`ParamError::Batch`] carrying the index of the
    /// offending entry; entries added earlier in the same call are removed.
    pub fn add_params(&mut self, descs: impl IntoIterator<Item = ParamDescriptor>) -> Result<()> {
        let mut added = Vec::new();
        for (index, desc) in descs.into_iter().enumerate() {
            let id = desc.id;
            if let Err(err) = self.add_param(desc) {
                for id in added {
                    self.remove_param(id);
                }
                warn!(index, error = %err, "parameter batch rejected");
                return Err(ParamError::Batch {
                    index,
                    source: Box::new(err),
                });
            }
            added.push(id);
        }
        Ok(())
    }

    fn remove_param(&mut self, id: ParamId) {
        if let Some(entry) = self.params.remove(&id) {
            self.param_names.remove(&entry.desc.name);
            self.param_order.retain(|other| *other != id);
        }
    }

    pub fn add_command(&mut self, desc: CommandDescriptor) -> Result<()> {
        desc.validate()?;
        if self.commands.contains_key(&desc.id) {
            return Err(ParamError::DuplicateId { id: desc.id });
        }
        let key = desc.name.to_lowercase();
        if self.command_names.contains_key(&key) {
            return Err(ParamError::DuplicateName { name: desc.name });
        }

        debug!(id = desc.id, name = %desc.name, arity = desc.arity, "command registered");
        self.command_names.insert(key, desc.id);
        self.command_order.push(desc.id);
        self.commands.insert(
            desc.id,
            CommandEntry {
                desc,
                handler: None,
            },
        );
        Ok(())
    }

    /// Same all-or-nothing policy as [`ParamRegistry::add_params`].
    pub fn add_commands(
        &mut self,
        descs: impl IntoIterator<Item = CommandDescriptor>,
    ) -> Result<()> {
        let mut added = Vec::new();
        for (index, desc) in descs.into_iter().enumerate() {
            let id = desc.id;
            if let Err(err) = self.add_command(desc) {
                for id in added {
                    if let Some(entry) = self.commands.remove(&id) {
                        self.command_names.remove(&entry.desc.name.to_lowercase());
                        self.command_order.retain(|other| *other != id);
                    }
                }
                warn!(index, error = %err, "command batch rejected");
                return Err(ParamError::Batch {
                    index,
                    source: Box::new(err),
                });
            }
            added.push(id);
        }
        Ok(())
    }

    pub fn has_param(&self, id: ParamId) -> bool {
        self.params.contains_key(&id)
    }

    pub fn has_command(&self, id: ParamId) -> bool {
        self.commands.contains_key(&id)
    }

    pub fn descriptor(&self, id: ParamId) -> Result<&ParamDescriptor> {
        self.entry(id).map(|entry| &entry.desc)
    }

    pub fn command(&self, id: ParamId) -> Result<&CommandDescriptor> {
        self.commands
            .get(&id)
            .map(|entry| &entry.desc)
            .ok_or_else(|| ParamError::not_found(format!("command {id}")))
    }

    /// Resolve a request key: exact name first, then decimal id.
    pub fn param_id(&self, key: &str) -> Option<ParamId> {
        self.param_names.get(key).copied().or_else(|| {
            key.parse()
                .ok()
                .filter(|id| self.params.contains_key(id))
        })
    }

    /// Resolve a verb: case-insensitive name first, then decimal id.
    pub fn command_id(&self, key: &str) -> Option<ParamId> {
        self.command_names
            .get(&key.to_lowercase())
            .copied()
            .or_else(|| {
                key.parse()
                    .ok()
                    .filter(|id| self.commands.contains_key(id))
            })
    }

    /// Parameters in registration order.
    pub fn params(&self) -> impl Iterator<Item = &ParamDescriptor> + '_ {
        self.param_order
            .iter()
            .filter_map(|id| self.params.get(id))
            .map(|entry| &entry.desc)
    }

    /// Commands in registration order.
    pub fn commands(&self) -> impl Iterator<Item = &CommandDescriptor> + '_ {
        self.command_order
            .iter()
            .filter_map(|id| self.commands.get(id))
            .map(|entry| &entry.desc)
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn is_linked(&self, id: ParamId) -> bool {
        self.params
            .get(&id)
            .is_some_and(|entry| entry.binding.is_some())
    }

    /// Attach host storage to a registered parameter.
    ///
    /// The first link of a parameter with a default writes that default into
    /// `storage`. Linking again replaces the binding and leaves the new
    /// storage's contents alone. `Variable` parameters need resizable storage;
    /// `Fixed(n)` storage of another length is resized to `n` if it allows it.
    pub fn link_param<T, S>(&mut self, id: ParamId, storage: S) -> Result<()>
    where
        T: Element,
        S: Storage<T> + 'static,
    {
        let entry = self.entry_mut(id)?;
        let desc = &entry.desc;

        if T::TYPE != desc.ty {
            return Err(ParamError::TypeMismatch {
                name: desc.name.clone(),
                expected: desc.ty,
                found: T::TYPE,
            });
        }
        let shape_ok = match desc.size {
            SizePolicy::Variable { .. } => storage.is_resizable(),
            SizePolicy::Fixed(n) => storage.len() == n || storage.resize(n),
        };
        if !shape_ok {
            return Err(ParamError::NotResizable {
                name: desc.name.clone(),
                expected: desc.size,
                found: storage.len(),
            });
        }

        let binding = T::bind(Box::new(storage));
        let first_link = entry.binding.is_none();
        if first_link {
            match &desc.default {
                Some(default) => {
                    if !binding.write(default) {
                        return Err(ParamError::NotResizable {
                            name: desc.name.clone(),
                            expected: desc.size,
                            found: binding.len(),
                        });
                    }
                }
                None if !desc.size.accepts(binding.len()) => {
                    binding.resize(desc.size.initial_len());
                }
                None => {}
            }
        }

        debug!(id, name = %desc.name, first_link, "parameter linked");
        entry.binding = Some(binding);
        Ok(())
    }

    pub fn register_param_callback<F>(&mut self, id: ParamId, callback: F) -> Result<()>
    where
        F: Fn(&ParamDescriptor, &ParamValue) + Send + Sync + 'static,
    {
        self.entry_mut(id)?.callback = Some(Arc::new(callback));
        Ok(())
    }

    pub fn register_command_callback<F>(&mut self, id: ParamId, handler: F) -> Result<()>
    where
        F: Fn(&CommandDescriptor, &[String], &mut Reply) + Send + Sync + 'static,
    {
        let entry = self
            .commands
            .get_mut(&id)
            .ok_or_else(|| ParamError::not_found(format!("command {id}")))?;
        entry.handler = Some(Arc::new(handler));
        Ok(())
    }

    pub(crate) fn command_handler(&self, id: ParamId) -> Option<CommandHandler> {
        self.commands.get(&id).and_then(|entry| entry.handler.clone())
    }

    /// Validate `value` for parameter `id` without touching storage.
    pub fn check(&self, id: ParamId, value: &ParamValue) -> Result<()> {
        constraint::check(self.descriptor(id)?, value)
    }

    pub fn get(&self, id: ParamId) -> Result<ParamValue> {
        let entry = self.entry(id)?;
        entry
            .binding
            .as_ref()
            .map(Binding::read)
            .ok_or_else(|| ParamError::Unbound {
                name: entry.desc.name.clone(),
            })
    }

    pub fn get_element(&self, id: ParamId, index: usize) -> Result<ParamValue> {
        let value = self.get(id)?;
        value
            .element(index)
            .ok_or_else(|| self.out_of_range(id, index, value.len()))
    }

    /// Check, write and notify. A rejected value leaves storage untouched.
    pub fn set(&mut self, id: ParamId, value: ParamValue) -> Result<()> {
        let entry = self.entry(id)?;
        constraint::check(&entry.desc, &value)?;

        let binding = entry.binding.as_ref().ok_or_else(|| ParamError::Unbound {
            name: entry.desc.name.clone(),
        })?;
        if !binding.write(&value) {
            return Err(ParamError::NotResizable {
                name: entry.desc.name.clone(),
                expected: entry.desc.size,
                found: value.len(),
            });
        }

        debug!(id, name = %entry.desc.name, value = %value, "parameter set");
        if let Some(callback) = &entry.callback {
            callback(&entry.desc, &value);
        }
        Ok(())
    }

    /// Replace element `index` with the single-element `element`.
    pub fn set_element(&mut self, id: ParamId, index: usize, element: ParamValue) -> Result<()> {
        let desc = self.descriptor(id)?;
        if element.ty() != desc.ty {
            return Err(ParamError::TypeViolation {
                name: desc.name.clone(),
                expected: desc.ty,
                found: element.ty(),
            });
        }
        let current = self.get(id)?;
        let candidate = current
            .with_element(index, &element)
            .ok_or_else(|| self.out_of_range(id, index, current.len()))?;
        self.set(id, candidate)
    }

    /// Write the single-element `element` to every current element.
    pub fn set_all(&mut self, id: ParamId, element: ParamValue) -> Result<()> {
        let desc = self.descriptor(id)?;
        if element.ty() != desc.ty {
            return Err(ParamError::TypeViolation {
                name: desc.name.clone(),
                expected: desc.ty,
                found: element.ty(),
            });
        }
        let len = self.get(id)?.len();
        let candidate = element.repeated(len).ok_or_else(|| ParamError::SizeViolation {
            name: desc.name.clone(),
            expected: SizePolicy::Fixed(1),
            found: 0,
        })?;
        self.set(id, candidate)
    }

    /// Apply startup values by parameter name through the checked set path.
    pub fn initialize(&mut self, values: &BTreeMap<String, String>) -> InitReport {
        let mut report = InitReport::default();
        let plan: Vec<_> = self
            .params()
            .map(|d| {
                let needs_value = d.io.needs_initial_value() && d.default.is_none();
                (d.id, d.name.clone(), d.ty, needs_value)
            })
            .collect();

        for (id, name, ty, needs_value) in plan {
            match values.get(&name) {
                Some(text) => {
                    match ParamValue::parse(ty, text).and_then(|value| self.set(id, value)) {
                        Ok(()) => report.applied.push(name),
                        Err(err) => report.failed.push((name, err)),
                    }
                }
                None if needs_value => report.missing.push(name),
                None => {}
            }
        }

        report.unknown = values
            .keys()
            .filter(|name| !self.param_names.contains_key(*name))
            .cloned()
            .collect();
        report
    }

    /// Drop every descriptor, binding and callback.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn entry(&self, id: ParamId) -> Result<&ParamEntry> {
        self.params
            .get(&id)
            .ok_or_else(|| ParamError::not_found(format!("parameter {id}")))
    }

    fn entry_mut(&mut self, id: ParamId) -> Result<&mut ParamEntry> {
        self.params
            .get_mut(&id)
            .ok_or_else(|| ParamError::not_found(format!("parameter {id}")))
    }

    fn out_of_range(&self, id: ParamId, index: usize, len: usize) -> ParamError {
        ParamError::IndexOutOfRange {
            name: self
                .params
                .get(&id)
                .map(|entry| entry.desc.name.clone())
                .unwrap_or_default(),
            index,
            len,
        }
    }
}

impl std::fmt::Debug for ParamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamRegistry")
            .field("params", &self.param_order)
            .field("commands", &self.command_order)
            .finish()
    }
}
