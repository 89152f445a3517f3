//! Arena-based DOM tree storage
//!
//! ## Memory Layout
//!
//! ```text
//! Arena: Vec<Option<DomNode>>
//!        [Window][Document][Node2][None][Node4]...
//!         ↑ 4-byte index, never reused; released slots stay None
//! ```
//!
//! Indices double as event target ids, so a path frozen by a dispatch stays
//! meaningful even if the node is re-parented or released mid-dispatch.
//!
//! The event parent of the document is the window. Every other node's
//! event parent is its tree parent.

use ahash::AHashMap;
use events::{EventTarget, ListenerObserver};
use std::rc::Rc;

use crate::error::{DomError, Result};
use crate::types::{DomNode, NodeId, NodeType, TargetKind};

pub struct DomArena {
    nodes: Vec<Option<DomNode>>,

    /// `id` attribute → element
    id_map: AHashMap<String, NodeId>,

    window_id: NodeId,
    document_id: NodeId,

    /// Handed to every new node's target
    observer: Option<Rc<dyn ListenerObserver>>,
}

impl DomArena {
    /// Arena holding a window and an empty document.
    pub fn new() -> Self {
        Self::with_observer(None)
    }

    pub fn with_observer(observer: Option<Rc<dyn ListenerObserver>>) -> Self {
        let mut arena = Self {
            nodes: Vec::with_capacity(64),
            id_map: AHashMap::new(),
            window_id: 0,
            document_id: 0,
            observer,
        };
        arena.window_id = arena.alloc(TargetKind::Window, "#window");
        arena.document_id = arena.alloc(TargetKind::Node(NodeType::Document), "#document");
        arena
    }

    fn alloc(&mut self, kind: TargetKind, name: &str) -> NodeId {
        let node_id = self.nodes.len() as NodeId;
        let target = match &self.observer {
            Some(observer) => EventTarget::with_observer(node_id, observer.clone()),
            None => EventTarget::new(node_id),
        };
        self.nodes
            .push(Some(DomNode::new(node_id, kind, name.to_string(), target)));
        node_id
    }

    pub fn window_id(&self) -> NodeId {
        self.window_id
    }

    pub fn document_id(&self) -> NodeId {
        self.document_id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(TargetKind::Node(NodeType::Element), tag)
    }

    pub fn create_text(&mut self, data: &str) -> NodeId {
        let node_id = self.alloc(TargetKind::Node(NodeType::Text), "#text");
        if let Some(Some(node)) = self.nodes.last_mut() {
            node.node_value = data.to_string();
        }
        node_id
    }

    /// Get node by ID (immutable)
    pub fn get(&self, node_id: NodeId) -> Result<&DomNode> {
        self.nodes
            .get(node_id as usize)
            .and_then(Option::as_ref)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Get node by ID (mutable)
    pub fn get_mut(&mut self, node_id: NodeId) -> Result<&mut DomNode> {
        self.nodes
            .get_mut(node_id as usize)
            .and_then(Option::as_mut)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    pub fn contains_node(&self, node_id: NodeId) -> bool {
        self.get(node_id).is_ok()
    }

    /// Live nodes, window included
    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    /// Never true: the window and document always exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomNode> {
        self.nodes.iter().flatten()
    }

    pub fn target(&self, node_id: NodeId) -> Result<EventTarget> {
        Ok(self.get(node_id)?.target.clone())
    }

    /// Tree parent
    pub fn parent(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(node_id)?.parent_id)
    }

    /// Parent on the event path: the tree parent, or the window for the document.
    pub fn event_parent(&self, node_id: NodeId) -> Option<NodeId> {
        if node_id == self.document_id {
            return Some(self.window_id);
        }
        self.get(node_id).ok()?.parent_id
    }

    pub fn children(&self, node_id: NodeId) -> Result<&[NodeId]> {
        Ok(self.get(node_id)?.children_ids.as_slice())
    }

    /// Whether `node` is `ancestor` or lies below it.
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).ok().and_then(|n| n.parent_id);
        }
        false
    }

    /// Event path from `node_id` up to the window, `node_id` first.
    pub fn event_path(&self, node_id: NodeId) -> Result<Vec<NodeId>> {
        self.get(node_id)?;
        let mut path = vec![node_id];
        let mut current = self.event_parent(node_id);
        while let Some(id) = current {
            path.push(id);
            current = self.event_parent(id);
        }
        Ok(path)
    }

    /// Append `child` to `parent`, moving it out of its current parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let parent_node = self.get(parent)?;
        let child_node = self.get(child)?;

        if !parent_node.can_have_children() {
            return Err(DomError::HierarchyRequest(format!(
                "{} ({}) cannot have children",
                parent, parent_node.node_name
            )));
        }
        if matches!(
            child_node.kind,
            TargetKind::Window | TargetKind::Node(NodeType::Document)
        ) {
            return Err(DomError::HierarchyRequest(format!(
                "{} ({}) cannot be inserted",
                child, child_node.node_name
            )));
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest(format!(
                "{} is an ancestor of {}",
                child, parent
            )));
        }

        self.detach(child)?;
        self.get_mut(parent)?.children_ids.push(child);
        self.get_mut(child)?.parent_id = Some(parent);
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.get(child)?.parent_id != Some(parent) {
            return Err(DomError::HierarchyRequest(format!(
                "{} is not a child of {}",
                child, parent
            )));
        }
        self.detach(child)
    }

    /// Unlink `node_id` from its parent, if any.
    pub fn detach(&mut self, node_id: NodeId) -> Result<()> {
        let Some(parent) = self.get_mut(node_id)?.parent_id.take() else {
            return Ok(());
        };
        let siblings = &mut self.get_mut(parent)?.children_ids;
        if let Some(index) = siblings.iter().position(|&id| id == node_id) {
            siblings.remove(index);
        }
        Ok(())
    }

    pub fn set_attribute(&mut self, node_id: NodeId, name: &str, value: &str) -> Result<()> {
        let node = self.get_mut(node_id)?;
        if !node.is_element() {
            return Err(DomError::HierarchyRequest(format!(
                "{} ({}) is not an element",
                node_id, node.node_name
            )));
        }
        let previous = node.attributes.insert(name.to_string(), value.to_string());

        if name == "id" {
            if let Some(previous) = previous {
                self.id_map.remove(&previous);
            }
            self.id_map.insert(value.to_string(), node_id);
        }
        Ok(())
    }

    pub fn remove_attribute(&mut self, node_id: NodeId, name: &str) -> Result<Option<String>> {
        let removed = self.get_mut(node_id)?.attributes.remove(name);
        if name == "id" {
            if let Some(previous) = &removed {
                self.id_map.remove(previous);
            }
        }
        Ok(removed)
    }

    /// Element carrying `id="<id>"`. Later assignments win.
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.id_map.get(id).copied()
    }

    /// Traverse a subtree depth-first (iterative, no recursion)
    pub fn traverse_df<F>(&self, start_id: NodeId, mut visit: F) -> Result<()>
    where
        F: FnMut(&DomNode) -> Result<()>,
    {
        let mut stack = vec![start_id];

        while let Some(node_id) = stack.pop() {
            let node = self.get(node_id)?;
            visit(node)?;

            // Push children in reverse order (so they're visited left-to-right)
            for &child_id in node.children_ids.iter().rev() {
                stack.push(child_id);
            }
        }

        Ok(())
    }

    /// Detach a subtree and free its slots.
    ///
    /// Ids are never reused. The released targets are handed back so the
    /// caller can drop their listeners once it holds no arena borrow. A
    /// dispatch already walking through a released node keeps its own clone
    /// of the target and finishes normally.
    pub fn release(&mut self, node_id: NodeId) -> Result<Vec<EventTarget>> {
        if node_id == self.window_id || node_id == self.document_id {
            return Err(DomError::HierarchyRequest(format!(
                "{} cannot be released",
                node_id
            )));
        }
        self.detach(node_id)?;

        let mut subtree = Vec::new();
        self.traverse_df(node_id, |node| {
            subtree.push(node.node_id);
            Ok(())
        })?;

        let mut released = Vec::with_capacity(subtree.len());
        for &id in &subtree {
            if let Some(node) = self.nodes.get_mut(id as usize).and_then(Option::take) {
                if let Some(element_id) = node.attributes.get("id") {
                    if self.id_map.get(element_id) == Some(&id) {
                        self.id_map.remove(element_id);
                    }
                }
                released.push(node.target);
            }
        }

        tracing::debug!("Released {} node(s) rooted at {}", released.len(), node_id);
        Ok(released)
    }

    /// Drop every node and listener, keeping a fresh window and document.
    pub fn clear(&mut self) {
        for node in self.nodes.iter().flatten() {
            node.target.clear_listeners();
        }
        *self = Self::with_observer(self.observer.take());
    }
}

impl Default for DomArena {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DomArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomArena")
            .field("nodes", &self.len())
            .field("window_id", &self.window_id)
            .field("document_id", &self.document_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (DomArena, NodeId, NodeId, NodeId) {
        let mut arena = DomArena::new();
        let html = arena.create_element("html");
        let body = arena.create_element("body");
        let div = arena.create_element("div");
        arena.append_child(arena.document_id(), html).unwrap();
        arena.append_child(html, body).unwrap();
        arena.append_child(body, div).unwrap();
        (arena, html, body, div)
    }

    #[test]
    fn test_event_path_reaches_window() {
        let (arena, html, body, div) = tree();
        assert_eq!(
            arena.event_path(div).unwrap(),
            vec![div, body, html, arena.document_id(), arena.window_id()]
        );
        assert_eq!(arena.parent(arena.document_id()).unwrap(), None);
    }

    #[test]
    fn test_append_moves_node() {
        let (mut arena, html, body, div) = tree();
        arena.append_child(html, div).unwrap();

        assert_eq!(arena.parent(div).unwrap(), Some(html));
        assert!(arena.children(body).unwrap().is_empty());
        assert_eq!(arena.children(html).unwrap(), &[body, div]);
    }

    #[test]
    fn test_hierarchy_errors() {
        let (mut arena, html, _body, div) = tree();
        let text = arena.create_text("hi");

        assert!(matches!(
            arena.append_child(div, html),
            Err(DomError::HierarchyRequest(_))
        ));
        assert!(matches!(
            arena.append_child(text, div),
            Err(DomError::HierarchyRequest(_))
        ));
        assert!(matches!(
            arena.append_child(div, arena.document_id()),
            Err(DomError::HierarchyRequest(_))
        ));
        assert!(matches!(
            arena.remove_child(html, div),
            Err(DomError::HierarchyRequest(_))
        ));
        assert!(matches!(arena.get(99), Err(DomError::NodeNotFound(99))));
    }

    #[test]
    fn test_id_attribute_lookup() {
        let (mut arena, _html, body, div) = tree();
        arena.set_attribute(div, "id", "main").unwrap();
        assert_eq!(arena.get_element_by_id("main"), Some(div));

        arena.set_attribute(div, "id", "content").unwrap();
        assert_eq!(arena.get_element_by_id("main"), None);
        assert_eq!(arena.get_element_by_id("content"), Some(div));

        arena.remove_attribute(div, "id").unwrap();
        assert_eq!(arena.get_element_by_id("content"), None);
        assert_eq!(arena.get(body).unwrap().attr("id"), None);
    }

    #[test]
    fn test_traverse_df() {
        let (mut arena, html, body, _div) = tree();
        let span = arena.create_element("span");
        arena.append_child(html, span).unwrap();

        let mut visited = Vec::new();
        arena
            .traverse_df(html, |node| {
                visited.push(node.node_name.clone());
                Ok(())
            })
            .unwrap();

        assert_eq!(visited, vec!["html", "body", "div", "span"]);
        assert_eq!(arena.children(body).unwrap().len(), 1);
    }

    #[test]
    fn test_release_frees_subtree() {
        let (mut arena, html, body, div) = tree();
        arena.set_attribute(div, "id", "gone").unwrap();
        let target = arena.target(div).unwrap();
        target.add_event_listener("click", Some(events::Listener::from_fn(|_, _| Ok(()))), false);

        let released = arena.release(body).unwrap();
        assert_eq!(released.len(), 2);
        assert!(!arena.contains_node(body));
        assert!(!arena.contains_node(div));
        assert!(arena.children(html).unwrap().is_empty());
        assert_eq!(arena.get_element_by_id("gone"), None);
        // Listeners survive until the caller clears them.
        assert!(target.has_any_listeners());
        released.iter().for_each(EventTarget::clear_listeners);
        assert!(!target.has_any_listeners());

        assert!(arena.release(arena.window_id()).is_err());
    }

    #[test]
    fn test_clear_resets_to_window_and_document() {
        let (mut arena, _html, _body, _div) = tree();
        arena.clear();
        assert_eq!(arena.len(), 2);
        assert_eq!(
            arena.event_path(arena.document_id()).unwrap(),
            vec![arena.document_id(), arena.window_id()]
        );
    }
}
