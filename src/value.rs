//! Type-erased values
//!
//! Properties of different types flow through the engine as `Value`s: a
//! nullable, immutable handle that still knows how to compare, hash and
//! print the value it holds.

use std::any::{type_name, Any, TypeId};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::errors::BeanError;

/// Identity of a value type
#[derive(Clone, Copy)]
pub struct ValueType {
    id: TypeId,
    name: &'static str,
}

impl ValueType {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Fully qualified type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name with module paths stripped, e.g. `Vec<String>`
    pub fn short_name(&self) -> String {
        let mut short = String::with_capacity(self.name.len());
        let mut segment = String::new();
        for ch in self.name.chars() {
            if ch.is_alphanumeric() || ch == '_' || ch == ':' {
                segment.push(ch);
            } else {
                short.push_str(segment.rsplit("::").next().unwrap_or(""));
                segment.clear();
                short.push(ch);
            }
        }
        short.push_str(segment.rsplit("::").next().unwrap_or(""));
        short
    }
}

impl PartialEq for ValueType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ValueType {}

impl Hash for ValueType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// Object-safe view of a comparable, hashable value.
///
/// Implemented for every `Debug + PartialEq + Hash + Send + Sync` type.
pub trait DynValue: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn dyn_eq(&self, other: &dyn DynValue) -> bool;
    fn dyn_hash(&self) -> u64;
    fn value_type(&self) -> ValueType;
}

impl<T> DynValue for T
where
    T: Any + fmt::Debug + PartialEq + Hash + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn DynValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }

    fn dyn_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    fn value_type(&self) -> ValueType {
        ValueType::of::<T>()
    }
}

/// A nullable, shareable value of any registered type
#[derive(Clone, Default)]
pub struct Value(Option<Arc<dyn DynValue>>);

impl Value {
    pub fn null() -> Self {
        Value(None)
    }

    pub fn of<T: DynValue>(value: T) -> Self {
        Value(Some(Arc::new(value)))
    }

    pub fn from_option<T: DynValue>(value: Option<T>) -> Self {
        value.map_or_else(Value::null, Value::of)
    }

    pub(crate) fn from_boxed(value: Box<dyn DynValue>) -> Self {
        Value(Some(Arc::from(value)))
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Type of the held value, `None` for null
    pub fn value_type(&self) -> Option<ValueType> {
        self.0.as_ref().map(|v| v.value_type())
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_ref()?.as_any().downcast_ref::<T>()
    }

    /// Borrow the held value as a trait object
    pub fn as_dyn(&self) -> Option<&dyn DynValue> {
        self.0.as_deref()
    }

    /// Clone the held value out as `T`; null maps to `None`, a value of
    /// another type is an error.
    pub fn cast<T: Any + Clone>(&self) -> Result<Option<T>, BeanError> {
        match &self.0 {
            None => Ok(None),
            Some(inner) => match inner.as_any().downcast_ref::<T>() {
                Some(value) => Ok(Some(value.clone())),
                None => Err(BeanError::TypeMismatch {
                    expected: ValueType::of::<T>().short_name(),
                    actual: inner.value_type().short_name(),
                }),
            },
        }
    }

    /// Deterministic hash of the held value; null hashes to 0
    pub fn hash_code(&self) -> u64 {
        self.0.as_ref().map_or(0, |v| v.dyn_hash())
    }

    /// True when both handles point at the same allocation
    pub fn same_instance(&self, other: &Value) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => a.dyn_eq(b.as_ref()),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code());
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => write!(f, "null"),
            Some(inner) => write!(f, "{:?}", inner),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
