//! Process-variable source seam and an in-memory store implementing it.

use crate::errors::{AdapterError, AdapterResult};
use crate::timestamp::TimeStamp;
use crate::type_tag::{ValueKind, ValueType};
use std::sync::{PoisonError, RwLock};

#[cfg(any(test, feature = "test-support"))]
use mockall::automock;

/// Descriptor of one process variable as listed by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessVariable {
    pub name: String,
    pub value_type: ValueType,
    pub is_array: bool,
    pub timestamp: TimeStamp,
}

/// The control system's process-variable manager.
///
/// Value access is fixed to 32-bit signed integers; variables of any other
/// kind, or of the other shape (scalar vs. array), answer with
/// [`AdapterError::BadCast`].
#[cfg_attr(any(test, feature = "test-support"), automock)]
pub trait ProcessVariableSource: Send + Sync {
    /// Every variable, in the source's own order.
    fn all_process_variables(&self) -> Vec<ProcessVariable>;

    /// # Errors
    /// Returns `Err` if the variable is unknown or is not an `int32` scalar.
    fn process_scalar_i32(&self, name: &str) -> AdapterResult<i32>;

    /// # Errors
    /// Returns `Err` if the variable is unknown or is not an `int32` array.
    fn process_array_i32(&self, name: &str) -> AdapterResult<Vec<i32>>;
}

/// Typed element storage for a process variable.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessValue {
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Bool(Vec<bool>),
    String(Vec<String>),
}

macro_rules! process_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for ProcessValue {
                fn from(values: Vec<$ty>) -> Self {
                    Self::$variant(values)
                }
            }

            impl From<$ty> for ProcessValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(vec![value])
                }
            }
        )*
    };
}

process_value_from!(
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    bool => Bool,
    String => String,
);

impl ProcessValue {
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Int8(_) => ValueType::Int8,
            Self::UInt8(_) => ValueType::UInt8,
            Self::Int16(_) => ValueType::Int16,
            Self::UInt16(_) => ValueType::UInt16,
            Self::Int32(_) => ValueType::Int32,
            Self::UInt32(_) => ValueType::UInt32,
            Self::Int64(_) => ValueType::Int64,
            Self::UInt64(_) => ValueType::UInt64,
            Self::Float32(_) => ValueType::Float32,
            Self::Float64(_) => ValueType::Float64,
            Self::Bool(_) => ValueType::Bool,
            Self::String(_) => ValueType::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Int8(v) => v.len(),
            Self::UInt8(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::UInt16(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::UInt32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::UInt64(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            Self::Int32(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    is_array: bool,
    timestamp: TimeStamp,
    value: ProcessValue,
}

impl Entry {
    const fn kind(&self) -> ValueKind {
        ValueKind {
            value_type: self.value.value_type(),
            is_array: self.is_array,
        }
    }
}

/// In-memory [`ProcessVariableSource`] keeping variables in insertion order.
#[derive(Debug, Default)]
pub struct PvStore {
    entries: RwLock<Vec<Entry>>,
}

impl PvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scalar variable.
    ///
    /// # Errors
    /// Returns `Err` if a variable with this name already exists.
    pub fn add_scalar(
        &self,
        name: impl Into<String>,
        value: impl Into<ProcessValue>,
        timestamp: TimeStamp,
    ) -> AdapterResult<()> {
        let value = value.into();
        if value.len() != 1 {
            return Err(AdapterError::InvalidState(format!(
                "scalar needs exactly one element, got {}",
                value.len()
            )));
        }
        self.insert(name.into(), false, value, timestamp)
    }

    /// Add an array variable.
    ///
    /// # Errors
    /// Returns `Err` if a variable with this name already exists.
    pub fn add_array(
        &self,
        name: impl Into<String>,
        values: impl Into<ProcessValue>,
        timestamp: TimeStamp,
    ) -> AdapterResult<()> {
        self.insert(name.into(), true, values.into(), timestamp)
    }

    /// Replace a variable's value and timestamp. The kind may not change.
    ///
    /// # Errors
    /// Returns `Err` if the variable is unknown or `value` is of another kind.
    pub fn update(
        &self,
        name: &str,
        value: impl Into<ProcessValue>,
        timestamp: TimeStamp,
    ) -> AdapterResult<()> {
        let value = value.into();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| AdapterError::UnknownVariable(name.to_string()))?;
        if entry.value.value_type() != value.value_type() {
            return Err(AdapterError::BadCast {
                variable: name.to_string(),
                requested: ValueKind {
                    value_type: value.value_type(),
                    is_array: entry.is_array,
                },
                actual: entry.kind(),
            });
        }
        entry.value = value;
        entry.timestamp = timestamp;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(
        &self,
        name: String,
        is_array: bool,
        value: ProcessValue,
        timestamp: TimeStamp,
    ) -> AdapterResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.iter().any(|e| e.name == name) {
            return Err(AdapterError::InvalidState(format!(
                "process variable '{name}' already exists"
            )));
        }
        entries.push(Entry {
            name,
            is_array,
            timestamp,
            value,
        });
        Ok(())
    }

    fn with_i32<R>(
        &self,
        name: &str,
        requested: ValueKind,
        f: impl FnOnce(&[i32]) -> R,
    ) -> AdapterResult<R> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| AdapterError::UnknownVariable(name.to_string()))?;
        let bad_cast = || AdapterError::BadCast {
            variable: name.to_string(),
            requested,
            actual: entry.kind(),
        };
        if entry.is_array != requested.is_array {
            return Err(bad_cast());
        }
        entry.value.as_i32().map(f).ok_or_else(bad_cast)
    }
}

impl ProcessVariableSource for PvStore {
    fn all_process_variables(&self) -> Vec<ProcessVariable> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| ProcessVariable {
                name: e.name.clone(),
                value_type: e.value.value_type(),
                is_array: e.is_array,
                timestamp: e.timestamp,
            })
            .collect()
    }

    fn process_scalar_i32(&self, name: &str) -> AdapterResult<i32> {
        self.with_i32(name, ValueKind::scalar(ValueType::Int32), |values| {
            values.first().copied()
        })?
            .ok_or_else(|| AdapterError::Internal(format!("scalar '{name}' holds no element")))
    }

    fn process_array_i32(&self, name: &str) -> AdapterResult<Vec<i32>> {
        self.with_i32(name, ValueKind::array(ValueType::Int32), <[i32]>::to_vec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> TimeStamp {
        TimeStamp::new(100, 0, 0, 0)
    }

    #[test]
    fn test_listing_keeps_insertion_order() {
        let store = PvStore::new();
        store.add_scalar("Zeta", 1i32, ts()).unwrap();
        store.add_array("Alpha", vec![1.5f32, 2.5], ts()).unwrap();
        store.add_scalar("Mid", true, ts()).unwrap();

        let vars = store.all_process_variables();
        let names: Vec<&str> = vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["Zeta", "Alpha", "Mid"]);
        assert_eq!(vars[1].value_type, ValueType::Float32);
        assert!(vars[1].is_array);
        assert!(!vars[2].is_array);
        assert_eq!(vars[2].value_type, ValueType::Bool);
    }

    #[test]
    fn test_i32_access() {
        let store = PvStore::new();
        store.add_scalar("Temp1", 42i32, ts()).unwrap();
        store.add_array("Vec1", vec![1i32, 2, 3], ts()).unwrap();

        assert_eq!(store.process_scalar_i32("Temp1").unwrap(), 42);
        assert_eq!(store.process_array_i32("Vec1").unwrap(), [1, 2, 3]);
        assert!(matches!(
            store.process_scalar_i32("Nope"),
            Err(AdapterError::UnknownVariable(n)) if n == "Nope"
        ));
    }

    #[test]
    fn test_non_i32_is_bad_cast() {
        let store = PvStore::new();
        store.add_scalar("Pressure", 1.25f64, ts()).unwrap();
        let err = store.process_scalar_i32("Pressure").unwrap_err();
        assert!(matches!(
            err,
            AdapterError::BadCast {
                requested: ValueKind {
                    value_type: ValueType::Int32,
                    is_array: false,
                },
                actual: ValueKind {
                    value_type: ValueType::Float64,
                    ..
                },
                ..
            }
        ));
    }

    #[test]
    fn test_shape_mismatch_is_bad_cast() {
        let store = PvStore::new();
        store.add_scalar("Temp1", 42i32, ts()).unwrap();
        store.add_array("Vec1", vec![1i32, 2, 3], ts()).unwrap();
        store.add_array("Single", vec![7i32], ts()).unwrap();

        let err = store.process_scalar_i32("Vec1").unwrap_err();
        assert!(matches!(
            &err,
            AdapterError::BadCast { variable, requested, actual }
                if variable == "Vec1"
                    && *requested == ValueKind::scalar(ValueType::Int32)
                    && *actual == ValueKind::array(ValueType::Int32)
        ));
        assert_eq!(
            err.to_string(),
            "Bad cast: 'Vec1' holds int32[], requested int32"
        );

        assert!(matches!(
            store.process_array_i32("Temp1"),
            Err(AdapterError::BadCast { actual, .. }) if actual == ValueKind::scalar(ValueType::Int32)
        ));
        // a one-element array is still an array
        assert!(matches!(
            store.process_scalar_i32("Single"),
            Err(AdapterError::BadCast { .. })
        ));
        assert_eq!(store.process_array_i32("Single").unwrap(), [7]);
    }

    #[test]
    fn test_duplicate_and_bad_scalar_rejected() {
        let store = PvStore::new();
        store.add_scalar("A", 1i32, ts()).unwrap();
        assert!(store.add_scalar("A", 2i32, ts()).is_err());
        assert!(store.add_scalar("B", vec![1i32, 2], ts()).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_keeps_kind() {
        let store = PvStore::new();
        store.add_scalar("A", 1i32, ts()).unwrap();
        store
            .update("A", 5i32, TimeStamp::new(200, 0, 1, 0))
            .unwrap();
        assert_eq!(store.process_scalar_i32("A").unwrap(), 5);
        assert_eq!(store.all_process_variables()[0].timestamp.seconds, 200);

        assert!(matches!(
            store.update("A", 5u8, ts()),
            Err(AdapterError::BadCast { .. })
        ));
        assert!(matches!(
            store.update("B", 5i32, ts()),
            Err(AdapterError::UnknownVariable(_))
        ));
    }
}
