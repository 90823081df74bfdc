//! OPC UA address-space seam.
//!
//! [`AddressSpace`] is everything the mapping layer needs from a protocol
//! server: object and timestamp node creation, data-source registration per
//! `(node, field)`, node deletion, and the browse/read/write surface the
//! dispatch worker serves. [`MemoryAddressSpace`] is the in-process
//! implementation used by [`UaServer`](crate::UaServer).

use crate::errors::{AdapterError, AdapterResult};
use crate::timestamp::TimeStamp;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(any(test, feature = "test-support"))]
use mockall::automock;

/// Numeric OPC UA node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: u32,
}

impl NodeId {
    /// The null node id (`ns=0;i=0`).
    pub const NULL: Self = Self::numeric(0, 0);

    pub const fn numeric(namespace: u16, identifier: u32) -> Self {
        Self {
            namespace,
            identifier,
        }
    }

    pub const fn is_null(&self) -> bool {
        self.namespace == 0 && self.identifier == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns={};i={}", self.namespace, self.identifier)
    }
}

/// Well-known node ids of the adapter's information model.
pub mod ids {
    use super::NodeId;

    /// Standard `Objects` folder.
    pub const OBJECTS_FOLDER: NodeId = NodeId::numeric(0, 85);
    /// Standard `FolderType`.
    pub const FOLDER_TYPE: NodeId = NodeId::numeric(0, 61);
    /// Standard `Organizes` reference type.
    pub const ORGANIZES: NodeId = NodeId::numeric(0, 35);
    /// Standard `HasComponent` reference type.
    pub const HAS_COMPONENT: NodeId = NodeId::numeric(0, 47);

    /// Folder holding every mapped process variable.
    pub const PROCESS_VARIABLES: NodeId = NodeId::numeric(2, 5003);
    /// Object type of a mapped process variable.
    pub const PROCESS_SCALAR_TYPE: NodeId = NodeId::numeric(2, 1001);
    /// Object type of the timestamp child.
    pub const TIMESTAMP_TYPE: NodeId = NodeId::numeric(2, 1002);
}

/// Data-source backed fields of a process-variable node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    Name,
    Type,
    Value,
}

impl FieldId {
    pub const ALL: [Self; 3] = [Self::Name, Self::Type, Self::Value];

    /// Instance-declaration node of this field in the process-scalar type.
    pub const fn template_id(self) -> NodeId {
        match self {
            Self::Name => NodeId::numeric(2, 6006),
            Self::Type => NodeId::numeric(2, 6007),
            Self::Value => NodeId::numeric(2, 6009),
        }
    }

    pub const fn browse_name(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Type => "Type",
            Self::Value => "Value",
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.browse_name())
    }
}

/// Text with a locale, as shown to browsing clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedText {
    pub locale: String,
    pub text: String,
}

impl LocalizedText {
    /// `en_US` text.
    pub fn en(text: impl Into<String>) -> Self {
        Self {
            locale: "en_US".to_string(),
            text: text.into(),
        }
    }
}

/// What a node represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeClass {
    Folder,
    Object,
    /// Snapshot of a variable's timestamp at mapping time.
    TimeStamp(TimeStamp),
}

/// Parameters for [`AddressSpace::add_object_node`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectNodeRequest {
    pub parent: NodeId,
    pub reference_type: NodeId,
    pub browse_name: String,
    pub display_name: LocalizedText,
    pub description: LocalizedText,
    pub type_definition: NodeId,
}

/// Owned copy of a node's attributes, as returned by browse/describe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub reference_type: NodeId,
    pub browse_name: String,
    pub display_name: LocalizedText,
    pub description: LocalizedText,
    pub type_definition: NodeId,
    pub class: NodeClass,
    /// Fields that have a registered data source, in [`FieldId::ALL`] order.
    pub fields: Vec<FieldId>,
}

impl NodeSnapshot {
    /// The timestamp carried by a timestamp node.
    pub const fn timestamp(&self) -> Option<&TimeStamp> {
        match &self.class {
            NodeClass::TimeStamp(ts) => Some(ts),
            _ => None,
        }
    }
}

/// Read/write capability for one field, invoked on client access.
pub trait FieldAccessor: Send + Sync {
    fn read(&self) -> String;
    fn write(&self, value: String);
}

/// Node storage and data-source dispatch provided by the protocol server.
#[cfg_attr(any(test, feature = "test-support"), automock)]
pub trait AddressSpace: Send + Sync {
    fn contains(&self, node: &NodeId) -> bool;

    /// Create an object node; the returned id is server-assigned.
    ///
    /// # Errors
    /// Returns `Err` if the parent does not exist or already has a child
    /// with the same browse name.
    fn add_object_node(&self, request: ObjectNodeRequest) -> AdapterResult<NodeId>;

    /// Create a timestamp child beneath `parent`.
    ///
    /// # Errors
    /// Returns `Err` if the parent does not exist.
    fn add_timestamp_node(&self, parent: &NodeId, timestamp: TimeStamp) -> AdapterResult<NodeId>;

    /// Bind `accessor` to `field` of `node`, replacing any earlier binding.
    ///
    /// # Errors
    /// Returns `Err` if the node does not exist.
    fn register_data_source(
        &self,
        node: &NodeId,
        field: FieldId,
        accessor: Arc<dyn FieldAccessor>,
    ) -> AdapterResult<()>;

    /// Remove a node, its descendants and all their data sources.
    ///
    /// # Errors
    /// Returns `Err` if the node does not exist.
    fn delete_node(&self, node: &NodeId) -> AdapterResult<()>;

    /// # Errors
    /// Returns `Err` if the node does not exist.
    fn describe(&self, node: &NodeId) -> AdapterResult<NodeSnapshot>;

    /// Children of `node` in creation order.
    ///
    /// # Errors
    /// Returns `Err` if the node does not exist.
    fn browse(&self, node: &NodeId) -> AdapterResult<Vec<NodeSnapshot>>;

    /// # Errors
    /// Returns `Err` if the node does not exist or has no data source for
    /// `field`.
    fn read_field(&self, node: &NodeId, field: FieldId) -> AdapterResult<String>;

    /// # Errors
    /// Returns `Err` if the node does not exist or has no data source for
    /// `field`.
    fn write_field(&self, node: &NodeId, field: FieldId, value: String) -> AdapterResult<()>;
}

struct Node {
    parent: Option<NodeId>,
    reference_type: NodeId,
    browse_name: String,
    display_name: LocalizedText,
    description: LocalizedText,
    type_definition: NodeId,
    class: NodeClass,
    children: Vec<NodeId>,
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<NodeId, Node>,
    sources: HashMap<(NodeId, FieldId), Arc<dyn FieldAccessor>>,
    next_id: u32,
}

impl Inner {
    fn snapshot(&self, id: NodeId) -> AdapterResult<NodeSnapshot> {
        let node = self.nodes.get(&id).ok_or(AdapterError::NodeNotFound(id))?;
        Ok(NodeSnapshot {
            id,
            parent: node.parent,
            reference_type: node.reference_type,
            browse_name: node.browse_name.clone(),
            display_name: node.display_name.clone(),
            description: node.description.clone(),
            type_definition: node.type_definition,
            class: node.class.clone(),
            fields: FieldId::ALL
                .into_iter()
                .filter(|f| self.sources.contains_key(&(id, *f)))
                .collect(),
        })
    }

    fn insert_child(&mut self, id: NodeId, node: Node) -> AdapterResult<()> {
        let parent_id = node.parent.unwrap_or(NodeId::NULL);
        let parent = self
            .nodes
            .get(&parent_id)
            .ok_or(AdapterError::NodeNotFound(parent_id))?;
        let duplicate = parent.children.iter().any(|child| {
            self.nodes
                .get(child)
                .is_some_and(|c| c.browse_name == node.browse_name)
        });
        if duplicate {
            return Err(AdapterError::InvalidState(format!(
                "{parent_id} already has a child named '{}'",
                node.browse_name
            )));
        }
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.children.push(id);
        }
        self.nodes.insert(id, node);
        Ok(())
    }

    fn allocate(&mut self) -> NodeId {
        let id = NodeId::numeric(1, self.next_id);
        self.next_id += 1;
        id
    }
}

/// In-memory [`AddressSpace`].
///
/// Starts out with the `Objects` folder and the process-variable folder
/// ([`ids::PROCESS_VARIABLES`]) beneath it. Instance ids are allocated in
/// namespace 1 from 50000 upwards.
pub struct MemoryAddressSpace {
    inner: RwLock<Inner>,
}

impl Default for MemoryAddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAddressSpace {
    const FIRST_INSTANCE_ID: u32 = 50_000;

    pub fn new() -> Self {
        let mut inner = Inner {
            next_id: Self::FIRST_INSTANCE_ID,
            ..Inner::default()
        };
        inner.nodes.insert(
            ids::OBJECTS_FOLDER,
            Node {
                parent: None,
                reference_type: ids::ORGANIZES,
                browse_name: "Objects".to_string(),
                display_name: LocalizedText::en("Objects"),
                description: LocalizedText::en("The browse entry point"),
                type_definition: ids::FOLDER_TYPE,
                class: NodeClass::Folder,
                children: vec![ids::PROCESS_VARIABLES],
            },
        );
        inner.nodes.insert(
            ids::PROCESS_VARIABLES,
            Node {
                parent: Some(ids::OBJECTS_FOLDER),
                reference_type: ids::ORGANIZES,
                browse_name: "ProcessVariables".to_string(),
                display_name: LocalizedText::en("ProcessVariables"),
                description: LocalizedText::en("Control system process variables"),
                type_definition: ids::FOLDER_TYPE,
                class: NodeClass::Folder,
                children: Vec::new(),
            },
        );
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Total number of nodes, including the two seeded folders.
    pub fn node_count(&self) -> usize {
        self.read().nodes.len()
    }

    /// Total number of registered data sources.
    pub fn data_source_count(&self) -> usize {
        self.read().sources.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn accessor(&self, node: &NodeId, field: FieldId) -> AdapterResult<Arc<dyn FieldAccessor>> {
        let inner = self.read();
        if !inner.nodes.contains_key(node) {
            return Err(AdapterError::NodeNotFound(*node));
        }
        inner
            .sources
            .get(&(*node, field))
            .cloned()
            .ok_or(AdapterError::NoDataSource { node: *node, field })
    }
}

impl AddressSpace for MemoryAddressSpace {
    fn contains(&self, node: &NodeId) -> bool {
        self.read().nodes.contains_key(node)
    }

    fn add_object_node(&self, request: ObjectNodeRequest) -> AdapterResult<NodeId> {
        let mut inner = self.write();
        let id = inner.allocate();
        inner.insert_child(
            id,
            Node {
                parent: Some(request.parent),
                reference_type: request.reference_type,
                browse_name: request.browse_name,
                display_name: request.display_name,
                description: request.description,
                type_definition: request.type_definition,
                class: NodeClass::Object,
                children: Vec::new(),
            },
        )?;
        tracing::trace!(node = %id, parent = %request.parent, "object node added");
        Ok(id)
    }

    fn add_timestamp_node(&self, parent: &NodeId, timestamp: TimeStamp) -> AdapterResult<NodeId> {
        let mut inner = self.write();
        let id = inner.allocate();
        inner.insert_child(
            id,
            Node {
                parent: Some(*parent),
                reference_type: ids::HAS_COMPONENT,
                browse_name: "TimeStamp".to_string(),
                display_name: LocalizedText::en("TimeStamp"),
                description: LocalizedText::en("Time of the last value update"),
                type_definition: ids::TIMESTAMP_TYPE,
                class: NodeClass::TimeStamp(timestamp),
                children: Vec::new(),
            },
        )?;
        Ok(id)
    }

    fn register_data_source(
        &self,
        node: &NodeId,
        field: FieldId,
        accessor: Arc<dyn FieldAccessor>,
    ) -> AdapterResult<()> {
        let mut inner = self.write();
        if !inner.nodes.contains_key(node) {
            return Err(AdapterError::NodeNotFound(*node));
        }
        if inner.sources.insert((*node, field), accessor).is_some() {
            tracing::debug!(node = %node, field = %field, "data source replaced");
        }
        Ok(())
    }

    fn delete_node(&self, node: &NodeId) -> AdapterResult<()> {
        let mut inner = self.write();
        let root = inner
            .nodes
            .remove(node)
            .ok_or(AdapterError::NodeNotFound(*node))?;
        if let Some(parent) = root.parent.and_then(|p| inner.nodes.get_mut(&p)) {
            parent.children.retain(|c| c != node);
        }

        let mut removed = vec![*node];
        let mut pending = root.children;
        while let Some(id) = pending.pop() {
            if let Some(child) = inner.nodes.remove(&id) {
                pending.extend(child.children);
                removed.push(id);
            }
        }
        inner
            .sources
            .retain(|(owner, _), _| !removed.contains(owner));
        tracing::trace!(node = %node, removed = removed.len(), "node deleted");
        Ok(())
    }

    fn describe(&self, node: &NodeId) -> AdapterResult<NodeSnapshot> {
        self.read().snapshot(*node)
    }

    fn browse(&self, node: &NodeId) -> AdapterResult<Vec<NodeSnapshot>> {
        let inner = self.read();
        let parent = inner
            .nodes
            .get(node)
            .ok_or(AdapterError::NodeNotFound(*node))?;
        parent
            .children
            .iter()
            .map(|child| inner.snapshot(*child))
            .collect()
    }

    fn read_field(&self, node: &NodeId, field: FieldId) -> AdapterResult<String> {
        // Accessors run outside the node lock.
        let accessor = self.accessor(node, field)?;
        Ok(accessor.read())
    }

    fn write_field(&self, node: &NodeId, field: FieldId, value: String) -> AdapterResult<()> {
        let accessor = self.accessor(node, field)?;
        accessor.write(value);
        Ok(())
    }
}
