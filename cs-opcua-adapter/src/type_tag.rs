//! Runtime value kinds and their OPC UA type tags.

use crate::errors::{AdapterError, AdapterResult};
use std::fmt;

/// Runtime type descriptor of a process variable.
///
/// This is the full set of kinds a control system may report. Only eight of
/// them have a [`TypeTag`]; see [`resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Bool,
    String,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::String => "string",
        };
        f.write_str(name)
    }
}

/// Element type plus shape, as named in cast errors (`int32`, `int32[]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueKind {
    pub value_type: ValueType,
    pub is_array: bool,
}

impl ValueKind {
    pub const fn scalar(value_type: ValueType) -> Self {
        Self {
            value_type,
            is_array: false,
        }
    }

    pub const fn array(value_type: ValueType) -> Self {
        Self {
            value_type,
            is_array: true,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_array {
            write!(f, "{}[]", self.value_type)
        } else {
            write!(f, "{}", self.value_type)
        }
    }
}

/// Symbolic type label attached to a mapped variable's `Type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

/// How tags are rendered into the information model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagLayout {
    /// Every tag has its own name.
    #[default]
    Standard,
    /// `uint32` is published as `"uint16_t"`, matching information models
    /// deployed by earlier adapter releases.
    Legacy,
}

impl TypeTag {
    /// All tags, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Int8,
        Self::UInt8,
        Self::Int16,
        Self::UInt16,
        Self::Int32,
        Self::UInt32,
        Self::Float32,
        Self::Float64,
    ];

    /// The C-style type name published in the `Type` field.
    ///
    /// # Examples
    /// ```
    /// use cs_opcua_adapter::TypeTag;
    ///
    /// assert_eq!(TypeTag::Int32.as_str(), "int32_t");
    /// assert_eq!(TypeTag::Float64.as_str(), "double");
    /// ```
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int8 => "int8_t",
            Self::UInt8 => "uint8_t",
            Self::Int16 => "int16_t",
            Self::UInt16 => "uint16_t",
            Self::Int32 => "int32_t",
            Self::UInt32 => "uint32_t",
            Self::Float32 => "float",
            Self::Float64 => "double",
        }
    }

    /// The type name under the given layout.
    pub const fn name_in(self, layout: TagLayout) -> &'static str {
        match (self, layout) {
            (Self::UInt32, TagLayout::Legacy) => "uint16_t",
            _ => self.as_str(),
        }
    }

    /// The value kind this tag stands for.
    pub const fn value_type(self) -> ValueType {
        match self {
            Self::Int8 => ValueType::Int8,
            Self::UInt8 => ValueType::UInt8,
            Self::Int16 => ValueType::Int16,
            Self::UInt16 => ValueType::UInt16,
            Self::Int32 => ValueType::Int32,
            Self::UInt32 => ValueType::UInt32,
            Self::Float32 => ValueType::Float32,
            Self::Float64 => ValueType::Float64,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve a runtime type descriptor to its type tag.
///
/// # Errors
/// Returns [`AdapterError::UnsupportedType`] for 64-bit integers, booleans
/// and strings.
pub fn resolve(value_type: ValueType) -> AdapterResult<TypeTag> {
    match value_type {
        ValueType::Int8 => Ok(TypeTag::Int8),
        ValueType::UInt8 => Ok(TypeTag::UInt8),
        ValueType::Int16 => Ok(TypeTag::Int16),
        ValueType::UInt16 => Ok(TypeTag::UInt16),
        ValueType::Int32 => Ok(TypeTag::Int32),
        ValueType::UInt32 => Ok(TypeTag::UInt32),
        ValueType::Float32 => Ok(TypeTag::Float32),
        ValueType::Float64 => Ok(TypeTag::Float64),
        ValueType::Int64 | ValueType::UInt64 | ValueType::Bool | ValueType::String => {
            Err(AdapterError::UnsupportedType(value_type))
        }
    }
}
