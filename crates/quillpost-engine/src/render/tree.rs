use std::collections::HashMap;

use slotmap::SlotMap;

use crate::model::{InlineId, SectionId};
use crate::render::output::NodeTag;

slotmap::new_key_type! {
    /// Stable handle to a render node.
    pub struct RenderId;
}

/// The model node a render node realizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelRef {
    Post,
    Section(SectionId),
    Inline(InlineId),
}

/// Per-model-node record linking the model to the output tree.
///
/// State machine: clean -> (model mutated) -> dirty -> (reconciled) -> clean,
/// or clean/dirty -> (scheduled for removal) -> removed -> destroyed.
#[derive(Debug)]
pub struct RenderNode<H> {
    pub model: ModelRef,
    pub parent: Option<RenderId>,
    pub children: Vec<RenderId>,
    pub output: Option<H>,
    /// Element tag the output node was created with; a differing model tag
    /// forces replacement rather than reuse.
    pub output_element_tag: Option<String>,
    /// Output nodes owned by this render node that have no model
    /// counterpart (markup wrapper elements, a blank section's `<br>`, a
    /// card's materialized spec). Cleared and rebuilt on re-render.
    pub owned_outputs: Vec<H>,
    pub tag: Option<NodeTag>,
    pub dirty: bool,
    pub removed: bool,
}

impl<H> RenderNode<H> {
    fn new(model: ModelRef, parent: Option<RenderId>) -> Self {
        Self {
            model,
            parent,
            children: Vec::new(),
            output: None,
            output_element_tag: None,
            owned_outputs: Vec::new(),
            tag: None,
            dirty: true,
            removed: false,
        }
    }
}

/// The reconciler's bookkeeping: a render-node arena plus the side tables
/// that map model nodes and output-node tags back to render nodes.
pub struct RenderTree<H> {
    pub(crate) nodes: SlotMap<RenderId, RenderNode<H>>,
    root: Option<RenderId>,
    by_model: HashMap<ModelRef, RenderId>,
    by_tag: HashMap<NodeTag, RenderId>,
    removal_queue: Vec<RenderId>,
}

impl<H: Copy> RenderTree<H> {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            root: None,
            by_model: HashMap::new(),
            by_tag: HashMap::new(),
            removal_queue: Vec::new(),
        }
    }

    pub fn root(&self) -> Option<RenderId> {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub(crate) fn ensure_root(&mut self) -> RenderId {
        match self.root {
            Some(root) => root,
            None => {
                let root = self.nodes.insert(RenderNode::new(ModelRef::Post, None));
                self.by_model.insert(ModelRef::Post, root);
                self.root = Some(root);
                root
            }
        }
    }

    pub fn node(&self, id: RenderId) -> &RenderNode<H> {
        self.nodes.get(id).expect("render node has been destroyed")
    }

    pub(crate) fn node_mut(&mut self, id: RenderId) -> &mut RenderNode<H> {
        self.nodes
            .get_mut(id)
            .expect("render node has been destroyed")
    }

    pub fn lookup(&self, model: ModelRef) -> Option<RenderId> {
        self.by_model.get(&model).copied()
    }

    pub(crate) fn create_node(&mut self, parent: RenderId, model: ModelRef) -> RenderId {
        let id = self.nodes.insert(RenderNode::new(model, Some(parent)));
        self.by_model.insert(model, id);
        id
    }

    // ============ Dirty tracking ============

    /// Mark the render node for a model node dirty, propagating to every
    /// ancestor. A model node that was never rendered dirties the root so
    /// the next pass picks it up while syncing children.
    pub fn mark_dirty(&mut self, model: ModelRef) {
        match self.by_model.get(&model).copied() {
            Some(id) => self.mark_dirty_node(id),
            None => {
                if let Some(root) = self.root {
                    self.mark_dirty_node(root);
                }
            }
        }
    }

    pub(crate) fn mark_dirty_node(&mut self, id: RenderId) {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = match self.nodes.get_mut(current) {
                Some(node) => node,
                None => break,
            };
            if node.dirty && current != id {
                // Ancestors above an already-dirty node are dirty too.
                break;
            }
            node.dirty = true;
            cursor = node.parent;
        }
    }

    pub fn is_dirty(&self, model: ModelRef) -> bool {
        self.lookup(model).is_some_and(|id| self.node(id).dirty)
    }

    // ============ Removal ============

    /// Schedule a model node's render node for removal. Destruction and
    /// output detachment happen at the start of the next render pass.
    pub fn schedule_removal(&mut self, model: ModelRef) {
        let Some(id) = self.by_model.get(&model).copied() else {
            return;
        };
        let parent = {
            let node = self.node_mut(id);
            if node.removed {
                return;
            }
            node.removed = true;
            node.parent
        };
        if let Some(parent) = parent {
            let parent_node = self.node_mut(parent);
            parent_node.children.retain(|c| *c != id);
            self.mark_dirty_node(parent);
        }
        self.removal_queue.push(id);
    }

    pub(crate) fn take_removal_queue(&mut self) -> Vec<RenderId> {
        std::mem::take(&mut self.removal_queue)
    }

    /// Drop a render node and its subtree from the arena and side tables,
    /// children before parents. Output detachment is the reconciler's job.
    pub(crate) fn destroy_subtree(&mut self, id: RenderId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        for child in node.children.clone() {
            self.destroy_subtree(child);
        }
        let node = self.nodes.remove(id).expect("render node disappeared");
        // A model node that moved between parents may already have a fresh
        // render node registered; only drop the mapping if it is still ours.
        if self.by_model.get(&node.model) == Some(&id) {
            self.by_model.remove(&node.model);
        }
        if let Some(tag) = node.tag {
            self.by_tag.remove(&tag);
        }
        if self.root == Some(id) {
            self.root = None;
        }
    }

    // ============ Output-tag side table ============

    pub(crate) fn register_tag(&mut self, tag: NodeTag, id: RenderId) {
        self.by_tag.insert(tag, id);
    }

    pub(crate) fn unregister_tag(&mut self, tag: NodeTag) {
        self.by_tag.remove(&tag);
    }

    pub fn resolve_tag(&self, tag: NodeTag) -> Option<RenderId> {
        self.by_tag.get(&tag).copied()
    }
}

impl<H: Copy> Default for RenderTree<H> {
    fn default() -> Self {
        Self::new()
    }
}
