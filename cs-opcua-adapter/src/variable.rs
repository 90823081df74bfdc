//! A process variable mirrored into the address space.

use crate::address_space::{
    AddressSpace, FieldAccessor, FieldId, LocalizedText, NodeId, ObjectNodeRequest, ids,
};
use crate::errors::{AdapterError, AdapterResult};
use crate::timestamp::TimeStamp;
use crate::type_tag::{TagLayout, TypeTag};
use std::sync::{Arc, PoisonError, RwLock};

const DESCRIPTION: &str = "A process scalar";

/// Field values shared between a [`MappedVariable`] and its data sources.
///
/// Each field has its own lock, so a read racing a write on the same field
/// sees either the old or the new text, never a mix.
#[derive(Debug)]
struct VariableState {
    name: RwLock<String>,
    value_type: RwLock<String>,
    value: RwLock<String>,
}

impl VariableState {
    fn field(&self, field: FieldId) -> &RwLock<String> {
        match field {
            FieldId::Name => &self.name,
            FieldId::Type => &self.value_type,
            FieldId::Value => &self.value,
        }
    }

    fn get(&self, field: FieldId) -> String {
        self.field(field)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, field: FieldId, text: String) {
        *self
            .field(field)
            .write()
            .unwrap_or_else(PoisonError::into_inner) = text;
    }
}

/// Data source for one field of one variable.
struct FieldBinding {
    state: Arc<VariableState>,
    field: FieldId,
}

impl FieldAccessor for FieldBinding {
    fn read(&self) -> String {
        self.state.get(self.field)
    }

    fn write(&self, value: String) {
        tracing::debug!(field = %self.field, value = %value, "field written by client");
        self.state.set(self.field, value);
    }
}

/// Everything [`map_variable`] needs to know about one source variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSpec {
    pub name: String,
    pub value: String,
    pub type_tag: TypeTag,
    pub is_array: bool,
    pub timestamp: TimeStamp,
}

/// A process variable with its own object node.
///
/// The node (with its timestamp child and field bindings) lives exactly as
/// long as this value: dropping it removes them from the address space.
pub struct MappedVariable {
    key: String,
    type_tag: TypeTag,
    is_array: bool,
    timestamp: TimeStamp,
    node: NodeId,
    timestamp_node: NodeId,
    state: Arc<VariableState>,
    space: Arc<dyn AddressSpace>,
}

impl std::fmt::Debug for MappedVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedVariable")
            .field("key", &self.key)
            .field("type_tag", &self.type_tag)
            .field("is_array", &self.is_array)
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

impl MappedVariable {
    /// The source name this variable was mapped under. Unlike the `Name`
    /// field, it never changes.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub const fn type_tag(&self) -> TypeTag {
        self.type_tag
    }

    pub const fn is_array(&self) -> bool {
        self.is_array
    }

    /// Timestamp captured at mapping time.
    pub const fn timestamp(&self) -> TimeStamp {
        self.timestamp
    }

    pub const fn node_id(&self) -> NodeId {
        self.node
    }

    pub const fn timestamp_node_id(&self) -> NodeId {
        self.timestamp_node
    }

    pub fn name(&self) -> String {
        self.state.get(FieldId::Name)
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.state.set(FieldId::Name, name.into());
    }

    pub fn value_type(&self) -> String {
        self.state.get(FieldId::Type)
    }

    pub fn set_value_type(&self, value_type: impl Into<String>) {
        self.state.set(FieldId::Type, value_type.into());
    }

    pub fn value(&self) -> String {
        self.state.get(FieldId::Value)
    }

    pub fn set_value(&self, value: impl Into<String>) {
        self.state.set(FieldId::Value, value.into());
    }

    /// Accessor for `field`, identical to the one registered with the
    /// address space.
    pub fn accessor(&self, field: FieldId) -> Arc<dyn FieldAccessor> {
        Arc::new(FieldBinding {
            state: Arc::clone(&self.state),
            field,
        })
    }
}

impl Drop for MappedVariable {
    fn drop(&mut self) {
        match self.space.delete_node(&self.node) {
            Ok(()) => tracing::debug!(variable = %self.key, node = %self.node, "node removed"),
            Err(e) => {
                tracing::warn!(variable = %self.key, node = %self.node, error = %e, "failed to remove node");
            }
        }
    }
}

/// Create the object node for one variable under `base`, attach its
/// timestamp child and register the name/type/value data sources.
///
/// If any step after node creation fails the node is removed again before
/// the error is returned.
///
/// # Errors
/// Returns [`AdapterError::UnmappedBase`] if `base` is null or not in the
/// address space, or the address-space error of the failing step.
pub fn map_variable(
    space: &Arc<dyn AddressSpace>,
    base: NodeId,
    definition: VariableSpec,
    layout: TagLayout,
) -> AdapterResult<MappedVariable> {
    if base.is_null() || !space.contains(&base) {
        return Err(AdapterError::UnmappedBase(base));
    }

    let node = space.add_object_node(ObjectNodeRequest {
        parent: base,
        reference_type: ids::HAS_COMPONENT,
        browse_name: definition.name.clone(),
        display_name: LocalizedText::en(definition.name.clone()),
        description: LocalizedText::en(DESCRIPTION),
        type_definition: ids::PROCESS_SCALAR_TYPE,
    })?;

    let state = Arc::new(VariableState {
        name: RwLock::new(definition.name.clone()),
        value_type: RwLock::new(definition.type_tag.name_in(layout).to_string()),
        value: RwLock::new(definition.value),
    });

    let wired = space
        .add_timestamp_node(&node, definition.timestamp)
        .and_then(|timestamp_node| {
            for field in FieldId::ALL {
                let binding = FieldBinding {
                    state: Arc::clone(&state),
                    field,
                };
                space.register_data_source(&node, field, Arc::new(binding))?;
            }
            Ok(timestamp_node)
        });

    match wired {
        Ok(timestamp_node) => Ok(MappedVariable {
            key: definition.name,
            type_tag: definition.type_tag,
            is_array: definition.is_array,
            timestamp: definition.timestamp,
            node,
            timestamp_node,
            state,
            space: Arc::clone(space),
        }),
        Err(e) => {
            if let Err(cleanup) = space.delete_node(&node) {
                tracing::warn!(
                    variable = %definition.name,
                    node = %node,
                    error = %cleanup,
                    "failed to remove partially mapped node"
                );
            }
            Err(e)
        }
    }
}
