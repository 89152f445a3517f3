//! Core node types
//!
//! Key design principles:
//! 1. Use u32 for indices, shared with the event core's target ids
//! 2. Use SmallVec for child lists (most nodes have few children)
//! 3. Every node carries its own `EventTarget`; the arena never shares one

use events::{EventTarget, TargetId};
use smallvec::SmallVec;
use std::collections::HashMap;

/// Node identifier (index into arena). Doubles as the node's event target id.
pub type NodeId = TargetId;

/// Node type, numbered as `Node.nodeType`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeType {
    Element = 1,
    Text = 3,
    Document = 9,
}

impl NodeType {
    /// Whether nodes of this type may have children.
    pub fn is_container(self) -> bool {
        matches!(self, NodeType::Element | NodeType::Document)
    }
}

/// What an arena slot holds. The window is an event target but not a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Window,
    Node(NodeType),
}

/// One event target in the tree
#[derive(Debug, Clone)]
pub struct DomNode {
    pub node_id: NodeId,
    pub kind: TargetKind,

    // Navigation indices
    pub parent_id: Option<NodeId>,
    pub children_ids: SmallVec<[NodeId; 4]>,

    pub node_name: String,
    pub node_value: String,
    pub attributes: HashMap<String, String>,

    /// Listener registry handle for this node
    pub target: EventTarget,
}

impl DomNode {
    pub fn new(node_id: NodeId, kind: TargetKind, node_name: String, target: EventTarget) -> Self {
        Self {
            node_id,
            kind,
            parent_id: None,
            children_ids: SmallVec::new(),
            node_name,
            node_value: String::new(),
            attributes: HashMap::new(),
            target,
        }
    }

    pub fn node_type(&self) -> Option<NodeType> {
        match self.kind {
            TargetKind::Window => None,
            TargetKind::Node(node_type) => Some(node_type),
        }
    }

    /// Get tag name for element nodes
    pub fn tag_name(&self) -> Option<&str> {
        self.is_element().then_some(self.node_name.as_str())
    }

    pub fn is_element(&self) -> bool {
        self.kind == TargetKind::Node(NodeType::Element)
    }

    pub fn is_window(&self) -> bool {
        self.kind == TargetKind::Window
    }

    /// Whether this node may receive children.
    pub fn can_have_children(&self) -> bool {
        self.node_type().is_some_and(NodeType::is_container)
    }

    /// Get attribute value
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containers() {
        let element = DomNode::new(
            2,
            TargetKind::Node(NodeType::Element),
            "div".to_string(),
            EventTarget::new(2),
        );
        let text = DomNode::new(
            3,
            TargetKind::Node(NodeType::Text),
            "#text".to_string(),
            EventTarget::new(3),
        );
        let window = DomNode::new(0, TargetKind::Window, "#window".to_string(), EventTarget::new(0));

        assert!(element.can_have_children());
        assert_eq!(element.tag_name(), Some("div"));
        assert!(!text.can_have_children());
        assert_eq!(text.tag_name(), None);
        assert!(!window.can_have_children());
        assert!(window.is_window());
    }
}
