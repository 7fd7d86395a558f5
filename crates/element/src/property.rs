//! Typed runtime configuration for an Element.
//!
//! A sealed set of value kinds stands in for the reflection-typed
//! property bags common in dynamically-typed pipeline frameworks: every
//! property declares its kind up front, and `set` type-checks against it
//! instead of inspecting a runtime type tag.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Bool,
    Int,
    Float,
    String,
    Enum,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Enum(String),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Bool(_) => PropertyKind::Bool,
            PropertyValue::Int(_) => PropertyKind::Int,
            PropertyValue::Float(_) => PropertyKind::Float,
            PropertyValue::String(_) => PropertyKind::String,
            PropertyValue::Enum(_) => PropertyKind::Enum,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) | PropertyValue::Enum(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: PropertyKind,
    pub readable: bool,
    pub writable: bool,
    pub default: PropertyValue,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, default: PropertyValue) -> Self {
        Self {
            name: name.into(),
            kind: default.kind(),
            readable: true,
            writable: true,
            default,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    #[error("unknown property: {0}")]
    Unknown(String),
    #[error("property {0} is not writable")]
    NotWritable(String),
    #[error("property {0} is not readable")]
    NotReadable(String),
    #[error("property {name} expects {expected:?}, got {actual:?}")]
    TypeMismatch {
        name: String,
        expected: PropertyKind,
        actual: PropertyKind,
    },
}

struct Slot {
    descriptor: PropertyDescriptor,
    value: PropertyValue,
}

/// Per-Element registry of `{name -> {kind, readable, writable, value}}`.
#[derive(Default)]
pub struct PropertyRegistry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a property, seeding its current value with the
    /// descriptor's default. Called from the Element's constructor, not
    /// from process-wide init.
    pub fn register(&self, descriptor: PropertyDescriptor) {
        let mut slots = self.slots.lock().unwrap();
        let value = descriptor.default.clone();
        slots.insert(
            descriptor.name.clone(),
            Slot { descriptor, value },
        );
    }

    pub fn set(&self, name: &str, value: PropertyValue) -> Result<(), PropertyError> {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots
            .get_mut(name)
            .ok_or_else(|| PropertyError::Unknown(name.to_string()))?;
        if !slot.descriptor.writable {
            return Err(PropertyError::NotWritable(name.to_string()));
        }
        if slot.descriptor.kind != value.kind() {
            return Err(PropertyError::TypeMismatch {
                name: name.to_string(),
                expected: slot.descriptor.kind,
                actual: value.kind(),
            });
        }
        slot.value = value;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<PropertyValue, PropertyError> {
        let slots = self.slots.lock().unwrap();
        let slot = slots
            .get(name)
            .ok_or_else(|| PropertyError::Unknown(name.to_string()))?;
        if !slot.descriptor.readable {
            return Err(PropertyError::NotReadable(name.to_string()));
        }
        Ok(slot.value.clone())
    }

    pub fn descriptor(&self, name: &str) -> Option<PropertyDescriptor> {
        self.slots.lock().unwrap().get(name).map(|s| s.descriptor.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.slots.lock().unwrap().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_rejects_unknown_property() {
        let reg = PropertyRegistry::new();
        let err = reg.set("missing", PropertyValue::Bool(true)).unwrap_err();
        assert!(matches!(err, PropertyError::Unknown(_)));
    }

    #[test]
    fn set_rejects_wrong_type() {
        let reg = PropertyRegistry::new();
        reg.register(PropertyDescriptor::new("gain", PropertyValue::Float(1.0)));
        let err = reg.set("gain", PropertyValue::Bool(true)).unwrap_err();
        assert!(matches!(err, PropertyError::TypeMismatch { .. }));
    }

    #[test]
    fn set_rejects_non_writable() {
        let reg = PropertyRegistry::new();
        reg.register(PropertyDescriptor::new("name", PropertyValue::String("x".into())).read_only());
        let err = reg
            .set("name", PropertyValue::String("y".into()))
            .unwrap_err();
        assert!(matches!(err, PropertyError::NotWritable(_)));
    }

    #[test]
    fn get_returns_default_until_set() {
        let reg = PropertyRegistry::new();
        reg.register(PropertyDescriptor::new("threshold", PropertyValue::Float(0.5)));
        assert_eq!(reg.get("threshold").unwrap().as_float(), Some(0.5));
        reg.set("threshold", PropertyValue::Float(0.7)).unwrap();
        assert_eq!(reg.get("threshold").unwrap().as_float(), Some(0.7));
    }
}
