//! Named collection of step functions available for registration.
//!
//! Manifests and restored export text refer to steps by name; the library
//! resolves those names to callables.

use crate::step::StepFunction;
use indexmap::IndexMap;
use std::fmt;

/// Step functions keyed by name, in insertion order.
pub struct StepLibrary<D> {
    functions: IndexMap<String, StepFunction<D>>,
}

impl<D> Default for StepLibrary<D> {
    fn default() -> Self {
        Self {
            functions: IndexMap::new(),
        }
    }
}

impl<D> StepLibrary<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function under its own name, returning the one it replaces.
    pub fn insert(&mut self, function: StepFunction<D>) -> Option<StepFunction<D>> {
        self.functions.insert(function.name().to_string(), function)
    }

    pub fn remove(&mut self, name: &str) -> Option<StepFunction<D>> {
        self.functions.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&StepFunction<D>> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepFunction<D>> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl<D> FromIterator<StepFunction<D>> for StepLibrary<D> {
    fn from_iter<I: IntoIterator<Item = StepFunction<D>>>(iter: I) -> Self {
        let mut library = Self::new();
        library.extend(iter);
        library
    }
}

impl<D> Extend<StepFunction<D>> for StepLibrary<D> {
    fn extend<I: IntoIterator<Item = StepFunction<D>>>(&mut self, iter: I) {
        for function in iter {
            self.insert(function);
        }
    }
}

impl<D> Clone for StepLibrary<D> {
    fn clone(&self) -> Self {
        Self {
            functions: self.functions.clone(),
        }
    }
}

impl<D> fmt::Debug for StepLibrary<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.functions.keys()).finish()
    }
}
