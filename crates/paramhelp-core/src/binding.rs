//! Host storage that parameters are linked to.
//!
//! The registry never owns host variables. It holds a [`Storage`] handle and
//! reads or writes through it; the host keeps its own clone of the handle.
//! [`ParamCell`] is the stock handle, a shared vector behind a mutex.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::descriptor::ParamType;
use crate::value::{Element, ParamValue};

/// Element-indexed storage handle.
///
/// Methods take `&self`; implementations provide their own interior
/// mutability so the host can keep reading the same storage.
pub trait Storage<T: Clone>: Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Option<T>;

    /// Write one element. Returns `false` when `index` is out of range.
    fn set(&self, index: usize, value: T) -> bool;

    /// Change the element count. Returns `false` when the storage is fixed.
    fn resize(&self, len: usize) -> bool;

    fn is_resizable(&self) -> bool;

    /// Snapshot of every element.
    fn load(&self) -> Vec<T> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }

    /// Replace the contents, resizing first when the length differs.
    fn store(&self, values: &[T]) -> bool {
        if values.len() != self.len() && !self.resize(values.len()) {
            return false;
        }
        values
            .iter()
            .enumerate()
            .all(|(i, v)| self.set(i, v.clone()))
    }
}

/// Shared vector handle; clones point at the same elements.
pub struct ParamCell<T> {
    values: Arc<Mutex<Vec<T>>>,
    resizable: bool,
}

impl<T: Clone> ParamCell<T> {
    /// Resizable cell, suitable for any size policy.
    pub fn new(values: Vec<T>) -> Self {
        Self {
            values: Arc::new(Mutex::new(values)),
            resizable: true,
        }
    }

    /// Fixed-length cell; only links to `Fixed(values.len())` parameters.
    pub fn fixed(values: Vec<T>) -> Self {
        Self {
            values: Arc::new(Mutex::new(values)),
            resizable: false,
        }
    }

    pub fn value(&self) -> Vec<T> {
        self.values.lock().clone()
    }

    pub fn first(&self) -> Option<T> {
        self.values.lock().first().cloned()
    }

    /// Mutate elements in place from the host side. Length cannot change.
    ///
    /// Hold the server lock around this when the parameter is shared with an
    /// RPC or stream thread.
    pub fn update<R>(&self, f: impl FnOnce(&mut [T]) -> R) -> R {
        f(&mut self.values.lock())
    }
}

impl<T> Clone for ParamCell<T> {
    fn clone(&self) -> Self {
        Self {
            values: Arc::clone(&self.values),
            resizable: self.resizable,
        }
    }
}

impl<T: Clone> Default for ParamCell<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: fmt::Debug> fmt::Debug for ParamCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamCell")
            .field("values", &*self.values.lock())
            .field("resizable", &self.resizable)
            .finish()
    }
}

impl<T: Clone + Default + Send> Storage<T> for ParamCell<T> {
    fn len(&self) -> usize {
        self.values.lock().len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.values.lock().get(index).cloned()
    }

    fn set(&self, index: usize, value: T) -> bool {
        match self.values.lock().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn resize(&self, len: usize) -> bool {
        if !self.resizable {
            return false;
        }
        self.values.lock().resize(len, T::default());
        true
    }

    fn is_resizable(&self) -> bool {
        self.resizable
    }

    fn load(&self) -> Vec<T> {
        self.value()
    }

    fn store(&self, values: &[T]) -> bool {
        let mut current = self.values.lock();
        if current.len() != values.len() && !self.resizable {
            return false;
        }
        current.clear();
        current.extend_from_slice(values);
        true
    }
}

/// A live link between one descriptor and typed host storage.
pub enum Binding {
    Int(Box<dyn Storage<i64>>),
    Double(Box<dyn Storage<f64>>),
    Bool(Box<dyn Storage<bool>>),
    String(Box<dyn Storage<String>>),
}

macro_rules! each_storage {
    ($binding:expr, $storage:ident => $body:expr) => {
        match $binding {
            Binding::Int($storage) => $body,
            Binding::Double($storage) => $body,
            Binding::Bool($storage) => $body,
            Binding::String($storage) => $body,
        }
    };
}

fn read_as<T: Element>(storage: &dyn Storage<T>) -> ParamValue {
    T::into_value(storage.load())
}

fn write_as<T: Element>(storage: &dyn Storage<T>, value: &ParamValue) -> bool {
    T::slice(value).is_some_and(|values| storage.store(values))
}

impl Binding {
    pub(crate) fn ty(&self) -> ParamType {
        match self {
            Binding::Int(_) => ParamType::Int,
            Binding::Double(_) => ParamType::Double,
            Binding::Bool(_) => ParamType::Bool,
            Binding::String(_) => ParamType::String,
        }
    }

    pub(crate) fn len(&self) -> usize {
        each_storage!(self, s => s.len())
    }

    pub(crate) fn is_resizable(&self) -> bool {
        each_storage!(self, s => s.is_resizable())
    }

    pub(crate) fn resize(&self, len: usize) -> bool {
        each_storage!(self, s => s.resize(len))
    }

    pub(crate) fn read(&self) -> ParamValue {
        each_storage!(self, s => read_as(&**s))
    }

    /// Store `value`, resizing resizable storage to its length.
    ///
    /// Returns `false` on element type mismatch or a refused resize.
    pub(crate) fn write(&self, value: &ParamValue) -> bool {
        each_storage!(self, s => write_as(&**s, value))
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("ty", &self.ty())
            .field("len", &self.len())
            .field("resizable", &self.is_resizable())
            .finish()
    }
}
