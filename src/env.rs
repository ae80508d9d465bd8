use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::ContainerError;

/// Immutable snapshot of named properties used for condition evaluation and
/// property binding into beans. Loading and merging of property sources is the
/// responsibility of external collaborators; the container only consumes the
/// merged snapshot.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    properties: HashMap<String, Value>,
}

impl Environment {
    /// An environment with no properties set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder-style property insertion.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Raw property value, if present.
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Typed property extraction. This is the binding contract into beans:
    /// factories pull configuration through `FactoryArgs::property`, which
    /// lands here. Absent property is `Ok(None)`; a present property that
    /// cannot deserialize into `T` is a `TypeMismatch`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ContainerError> {
        match self.properties.get(name) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ContainerError::TypeMismatch {
                    expected: std::any::type_name::<T>().to_string(),
                    context: format!("property '{name}': {e}"),
                }),
        }
    }

    /// Typed extraction of a property that must exist.
    pub fn require<T: DeserializeOwned>(&self, name: &str) -> Result<T, ContainerError> {
        self.get(name)?.ok_or_else(|| ContainerError::TypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
            context: format!("required property '{name}' is missing"),
        })
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl FromIterator<(String, Value)> for Environment {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            properties: iter.into_iter().collect(),
        }
    }
}
