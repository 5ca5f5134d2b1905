use serde_json::Value;

use crate::cursor::unicode::utf16_len;
use crate::model::markup::{
    normalize_tag, Markup, VALID_LIST_SECTION_TAGS, VALID_MARKUP_SECTION_TAGS,
    VALID_SECTION_ATTRIBUTES,
};
use crate::model::post::{InlineId, Owner, SectionId};

/// A run of text plus the ordered stack of markups open across it.
///
/// The markup list is a stack, not a set: order determines nesting, and the
/// renderer/codec coalesce open/close boundaries from it.
#[derive(Debug, Clone)]
pub struct Marker {
    pub value: String,
    pub markups: Vec<Markup>,
}

impl Marker {
    pub fn new(value: impl Into<String>, markups: Vec<Markup>) -> Self {
        Self {
            value: value.into(),
            markups,
        }
    }

    /// Length in cursor units (UTF-16 code units).
    pub fn length(&self) -> usize {
        utf16_len(&self.value)
    }

    pub fn is_blank(&self) -> bool {
        self.value.is_empty()
    }
}

/// An opaque inline leaf of fixed length 1, resolved by an external atom
/// handler. Carries a markup stack like a marker but never joins with
/// neighbors and contributes no text.
#[derive(Debug, Clone)]
pub struct Atom {
    pub name: String,
    pub value: String,
    pub payload: Value,
    pub markups: Vec<Markup>,
}

impl Atom {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        payload: Value,
        markups: Vec<Markup>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            payload,
            markups,
        }
    }
}

/// An inline node: a text marker or an atom.
#[derive(Debug, Clone)]
pub enum Inline {
    Marker(Marker),
    Atom(Atom),
}

impl Inline {
    /// Length in cursor units.
    pub fn length(&self) -> usize {
        match self {
            Inline::Marker(m) => m.length(),
            Inline::Atom(_) => 1,
        }
    }

    /// Text contributed to the owning section. Atoms contribute nothing.
    pub fn text(&self) -> &str {
        match self {
            Inline::Marker(m) => &m.value,
            Inline::Atom(_) => "",
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Inline::Marker(m) => m.is_blank(),
            Inline::Atom(_) => false,
        }
    }

    pub fn markups(&self) -> &[Markup] {
        match self {
            Inline::Marker(m) => &m.markups,
            Inline::Atom(a) => &a.markups,
        }
    }

    pub fn markups_mut(&mut self) -> &mut Vec<Markup> {
        match self {
            Inline::Marker(m) => &mut m.markups,
            Inline::Atom(a) => &mut a.markups,
        }
    }

    /// Two inlines can merge iff both are text markers with pointer-identical
    /// markup stacks. Atoms never join.
    pub fn can_join(&self, other: &Inline) -> bool {
        match (self, other) {
            (Inline::Marker(a), Inline::Marker(b)) => a.markups == b.markups,
            _ => false,
        }
    }
}

/// Arena record for an inline node: the node plus its owning section.
#[derive(Debug)]
pub struct InlineNode {
    pub(crate) owner: Option<SectionId>,
    pub kind: Inline,
}

/// Display/edit state of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardMode {
    Display,
    Edit,
}

/// A text-bearing block: paragraph, heading, blockquote, aside.
#[derive(Debug)]
pub struct MarkupSection {
    pub tag: String,
    pub markers: Vec<InlineId>,
    pub attributes: Vec<(String, String)>,
}

/// A list container (ul/ol). Not directly cursor-addressable; the cursor
/// addresses its items.
#[derive(Debug)]
pub struct ListSection {
    pub tag: String,
    pub items: Vec<SectionId>,
    pub attributes: Vec<(String, String)>,
}

/// A single list item; markerable like a markup section.
#[derive(Debug)]
pub struct ListItem {
    pub markers: Vec<InlineId>,
}

/// An image leaf of fixed length 1.
#[derive(Debug)]
pub struct ImageSection {
    pub src: Option<String>,
}

/// An opaque extension leaf of fixed length 1, resolved against the card
/// registry at render time.
#[derive(Debug)]
pub struct CardSection {
    pub name: String,
    pub payload: Value,
    pub mode: CardMode,
}

/// The closed set of section variants.
#[derive(Debug)]
pub enum SectionKind {
    Markup(MarkupSection),
    List(ListSection),
    ListItem(ListItem),
    Image(ImageSection),
    Card(CardSection),
}

/// A block-level node plus its owning collection.
#[derive(Debug)]
pub struct Section {
    pub(crate) owner: Option<Owner>,
    pub kind: SectionKind,
}

impl Section {
    pub(crate) fn new(kind: SectionKind) -> Self {
        Self { owner: None, kind }
    }

    pub fn owner(&self) -> Option<Owner> {
        self.owner
    }

    /// Leaf sections are directly cursor-addressable. Only list containers
    /// are not leaves.
    pub fn is_leaf(&self) -> bool {
        !matches!(self.kind, SectionKind::List(_))
    }

    pub fn is_markerable(&self) -> bool {
        matches!(
            self.kind,
            SectionKind::Markup(_) | SectionKind::ListItem(_)
        )
    }

    pub fn is_list_item(&self) -> bool {
        matches!(self.kind, SectionKind::ListItem(_))
    }

    pub fn is_card(&self) -> bool {
        matches!(self.kind, SectionKind::Card(_))
    }

    /// The section's tag, where it has one (markup and list sections).
    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            SectionKind::Markup(s) => Some(&s.tag),
            SectionKind::List(s) => Some(&s.tag),
            _ => None,
        }
    }

    /// Ordered inline children for markerable sections.
    pub fn markers(&self) -> Option<&Vec<InlineId>> {
        match &self.kind {
            SectionKind::Markup(s) => Some(&s.markers),
            SectionKind::ListItem(s) => Some(&s.markers),
            _ => None,
        }
    }

    pub(crate) fn markers_mut(&mut self) -> Option<&mut Vec<InlineId>> {
        match &mut self.kind {
            SectionKind::Markup(s) => Some(&mut s.markers),
            SectionKind::ListItem(s) => Some(&mut s.markers),
            _ => None,
        }
    }

    /// Attribute map for attributable sections (markup and list sections).
    pub fn attributes(&self) -> Option<&Vec<(String, String)>> {
        match &self.kind {
            SectionKind::Markup(s) => Some(&s.attributes),
            SectionKind::List(s) => Some(&s.attributes),
            _ => None,
        }
    }

    /// Set a whitelisted attribute on an attributable section. Returns false
    /// for sections that carry no attributes.
    pub fn set_attribute(&mut self, name: &str, value: &str) -> bool {
        assert!(
            VALID_SECTION_ATTRIBUTES.contains(&name),
            "invalid section attribute: {name:?}"
        );
        let attrs = match &mut self.kind {
            SectionKind::Markup(s) => &mut s.attributes,
            SectionKind::List(s) => &mut s.attributes,
            _ => return false,
        };
        if let Some(entry) = attrs.iter_mut().find(|(k, _)| k == name) {
            entry.1 = value.to_string();
        } else {
            attrs.push((name.to_string(), value.to_string()));
        }
        true
    }

    pub fn remove_attribute(&mut self, name: &str) -> bool {
        let attrs = match &mut self.kind {
            SectionKind::Markup(s) => &mut s.attributes,
            SectionKind::List(s) => &mut s.attributes,
            _ => return false,
        };
        attrs.retain(|(k, _)| k != name);
        true
    }
}

impl MarkupSection {
    pub fn new(tag: &str) -> Self {
        let tag = normalize_tag(tag);
        assert!(
            VALID_MARKUP_SECTION_TAGS.contains(&tag.as_str()),
            "invalid markup section tag: {tag:?}"
        );
        Self {
            tag,
            markers: Vec::new(),
            attributes: Vec::new(),
        }
    }
}

impl ListSection {
    pub fn new(tag: &str) -> Self {
        let tag = normalize_tag(tag);
        assert!(
            VALID_LIST_SECTION_TAGS.contains(&tag.as_str()),
            "invalid list section tag: {tag:?}"
        );
        Self {
            tag,
            items: Vec::new(),
            attributes: Vec::new(),
        }
    }
}
