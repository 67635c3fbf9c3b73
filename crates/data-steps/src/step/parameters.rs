//! Parameter mappings passed to step callables.

use crate::error::{DataStepsError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Current parameter values of a step, keyed by parameter name.
///
/// Keys are kept sorted so overviews and exports render deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, Value>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build parameters from a JSON object.
    ///
    /// Returns `None` if `value` is not an object.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map.into_iter().collect())),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Add or overwrite every entry of `other`, leaving other keys untouched.
    pub fn merge(&mut self, other: &Parameters) {
        for (name, value) in other.iter() {
            self.0.insert(name.clone(), value.clone());
        }
    }

    /// Read a parameter and deserialize it into `T`.
    ///
    /// Intended for use inside step callables:
    ///
    /// ```rust,ignore
    /// let n: i64 = params.value("n")?;
    /// ```
    pub fn value<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let raw = self
            .0
            .get(name)
            .ok_or_else(|| DataStepsError::InvalidParameter {
                parameter: name.to_string(),
                reason: "no value supplied".to_string(),
            })?;
        serde_json::from_value(raw.clone()).map_err(|e| DataStepsError::InvalidParameter {
            parameter: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Like [`value`](Self::value), but `None` when the parameter is absent or null.
    pub fn optional<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.value(name).map(Some),
        }
    }

    /// JSON object view of the parameters.
    pub fn to_json(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<BTreeMap<String, Value>> for Parameters {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

/// Compact JSON rendering, e.g. `{"n":2}`.
impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
