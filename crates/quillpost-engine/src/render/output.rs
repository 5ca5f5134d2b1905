use uuid::Uuid;

/// Opaque identity assigned to every output node the reconciler creates.
/// Usable as a map key; the side table from tags to render nodes is how
/// external events resolve an output node back to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeTag(Uuid);

impl NodeTag {
    pub(crate) fn fresh() -> Self {
        NodeTag(Uuid::new_v4())
    }
}

/// The minimal contract the reconciler needs from an output tree.
///
/// Implementations own their nodes; the engine only holds opaque handles.
/// `assign_tag`/`tag_of` carry the per-node identity the engine mints; an
/// implementation must store the tag for the lifetime of the node.
pub trait OutputDom {
    type Handle: Copy + PartialEq + std::fmt::Debug;

    fn create_element(&mut self, tag: &str) -> Self::Handle;
    fn create_text(&mut self, text: &str) -> Self::Handle;

    fn set_text(&mut self, node: Self::Handle, text: &str);
    fn set_attribute(&mut self, node: Self::Handle, name: &str, value: &str);
    fn remove_attribute(&mut self, node: Self::Handle, name: &str);

    /// Insert `node` under `parent`, before `reference` (append when
    /// `reference` is `None`). Moving an already-inserted node detaches it
    /// from its old parent first.
    fn insert_before(
        &mut self,
        parent: Self::Handle,
        node: Self::Handle,
        reference: Option<Self::Handle>,
    );
    fn remove_child(&mut self, parent: Self::Handle, child: Self::Handle);

    fn parent(&self, node: Self::Handle) -> Option<Self::Handle>;

    fn assign_tag(&mut self, node: Self::Handle, tag: NodeTag);
    fn tag_of(&self, node: Self::Handle) -> Option<NodeTag>;
}

/// A declarative node tree returned by card/atom renderers; the reconciler
/// materializes it under the card or atom element.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSpec {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        children: Vec<NodeSpec>,
    },
    Text(String),
}

impl NodeSpec {
    pub fn element(tag: &str) -> Self {
        NodeSpec::Element {
            tag: tag.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn text(text: &str) -> Self {
        NodeSpec::Text(text.to_string())
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        if let NodeSpec::Element { attributes, .. } = &mut self {
            attributes.push((name.to_string(), value.to_string()));
        }
        self
    }

    pub fn with_child(mut self, child: NodeSpec) -> Self {
        if let NodeSpec::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }
}
