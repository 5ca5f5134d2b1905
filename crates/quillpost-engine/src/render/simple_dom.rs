use std::collections::BTreeMap;

use slotmap::SlotMap;

use crate::render::output::{NodeTag, OutputDom};

slotmap::new_key_type! {
    /// Handle to a node in a [`SimpleDom`].
    pub struct SimpleNodeId;
}

/// Tags serialized without a closing pair.
const VOID_TAGS: &[&str] = &["br", "img", "hr"];

#[derive(Debug)]
enum NodeData {
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
        children: Vec<SimpleNodeId>,
    },
    Text {
        text: String,
    },
}

#[derive(Debug)]
struct SimpleNode {
    parent: Option<SimpleNodeId>,
    identity: Option<NodeTag>,
    data: NodeData,
}

/// In-memory reference implementation of the output-tree contract, used by
/// tests and the CLI host. Serializes to HTML or plain text.
#[derive(Default)]
pub struct SimpleDom {
    nodes: SlotMap<SimpleNodeId, SimpleNode>,
}

impl SimpleDom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached container element to render a document into.
    pub fn create_root(&mut self) -> SimpleNodeId {
        self.create_element("div")
    }

    pub fn element_tag(&self, id: SimpleNodeId) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { tag, .. } => Some(tag),
            NodeData::Text { .. } => None,
        }
    }

    pub fn children(&self, id: SimpleNodeId) -> &[SimpleNodeId] {
        match &self.nodes[id].data {
            NodeData::Element { children, .. } => children,
            NodeData::Text { .. } => &[],
        }
    }

    pub fn attribute(&self, id: SimpleNodeId, name: &str) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            NodeData::Text { .. } => None,
        }
    }

    pub fn text(&self, id: SimpleNodeId) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Text { text } => Some(text),
            NodeData::Element { .. } => None,
        }
    }

    /// Serialize a subtree as HTML.
    pub fn to_html(&self, id: SimpleNodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: SimpleNodeId, out: &mut String) {
        match &self.nodes[id].data {
            NodeData::Text { text } => {
                out.push_str(&html_escape::encode_text(text));
            }
            NodeData::Element {
                tag,
                attributes,
                children,
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&html_escape::encode_double_quoted_attribute(value));
                    out.push('"');
                }
                if VOID_TAGS.contains(&tag.as_str()) {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for child in children {
                    self.write_html(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    /// Serialize a subtree as plain text, one block element per line.
    pub fn to_text(&self, id: SimpleNodeId) -> String {
        let mut lines = Vec::new();
        for child in self.children(id) {
            let mut line = String::new();
            self.write_text(*child, &mut line);
            lines.push(line);
        }
        lines.join("\n")
    }

    fn write_text(&self, id: SimpleNodeId, out: &mut String) {
        match &self.nodes[id].data {
            NodeData::Text { text } => out.push_str(text),
            NodeData::Element { children, .. } => {
                for (index, child) in children.iter().enumerate() {
                    if index > 0 && self.is_block(*child) {
                        out.push('\n');
                    }
                    self.write_text(*child, out);
                }
            }
        }
    }

    fn is_block(&self, id: SimpleNodeId) -> bool {
        match &self.nodes[id].data {
            NodeData::Element { tag, .. } => !matches!(
                tag.as_str(),
                "a" | "b" | "code" | "em" | "i" | "s" | "strong" | "sub" | "sup" | "u" | "span"
            ),
            NodeData::Text { .. } => false,
        }
    }

    fn detach(&mut self, node: SimpleNodeId) {
        if let Some(parent) = self.nodes[node].parent {
            if let NodeData::Element { children, .. } = &mut self.nodes[parent].data {
                children.retain(|c| *c != node);
            }
            self.nodes[node].parent = None;
        }
    }
}

impl OutputDom for SimpleDom {
    type Handle = SimpleNodeId;

    fn create_element(&mut self, tag: &str) -> SimpleNodeId {
        self.nodes.insert(SimpleNode {
            parent: None,
            identity: None,
            data: NodeData::Element {
                tag: tag.to_string(),
                attributes: BTreeMap::new(),
                children: Vec::new(),
            },
        })
    }

    fn create_text(&mut self, text: &str) -> SimpleNodeId {
        self.nodes.insert(SimpleNode {
            parent: None,
            identity: None,
            data: NodeData::Text {
                text: text.to_string(),
            },
        })
    }

    fn set_text(&mut self, node: SimpleNodeId, text: &str) {
        match &mut self.nodes[node].data {
            NodeData::Text { text: existing } => *existing = text.to_string(),
            NodeData::Element { .. } => panic!("set_text called on an element node"),
        }
    }

    fn set_attribute(&mut self, node: SimpleNodeId, name: &str, value: &str) {
        match &mut self.nodes[node].data {
            NodeData::Element { attributes, .. } => {
                attributes.insert(name.to_string(), value.to_string());
            }
            NodeData::Text { .. } => panic!("set_attribute called on a text node"),
        }
    }

    fn remove_attribute(&mut self, node: SimpleNodeId, name: &str) {
        if let NodeData::Element { attributes, .. } = &mut self.nodes[node].data {
            attributes.remove(name);
        }
    }

    fn insert_before(
        &mut self,
        parent: SimpleNodeId,
        node: SimpleNodeId,
        reference: Option<SimpleNodeId>,
    ) {
        self.detach(node);
        let NodeData::Element { children, .. } = &mut self.nodes[parent].data else {
            panic!("insert_before called on a text node");
        };
        let index = match reference {
            Some(reference) => children
                .iter()
                .position(|c| *c == reference)
                .expect("reference node is not a child of the given parent"),
            None => children.len(),
        };
        children.insert(index, node);
        self.nodes[node].parent = Some(parent);
    }

    fn remove_child(&mut self, parent: SimpleNodeId, child: SimpleNodeId) {
        assert_eq!(
            self.nodes[child].parent,
            Some(parent),
            "remove_child called with a non-child node"
        );
        self.detach(child);
    }

    fn parent(&self, node: SimpleNodeId) -> Option<SimpleNodeId> {
        self.nodes[node].parent
    }

    fn assign_tag(&mut self, node: SimpleNodeId, tag: NodeTag) {
        self.nodes[node].identity = Some(tag);
    }

    fn tag_of(&self, node: SimpleNodeId) -> Option<NodeTag> {
        self.nodes[node].identity
    }
}
