use serde_json::Value;
use slotmap::SlotMap;

use crate::cursor::{Position, Range};
use crate::model::markup::{Markup, MarkupInterner, DEFAULT_MARKUP_SECTION_TAG};
use crate::model::section::{
    Atom, CardMode, CardSection, ImageSection, Inline, InlineNode, ListItem, ListSection, Marker,
    MarkupSection, Section, SectionKind,
};

slotmap::new_key_type! {
    /// Stable handle to a section in a post's arena.
    pub struct SectionId;
    /// Stable handle to an inline node (marker or atom) in a post's arena.
    pub struct InlineId;
}

/// The collection a section belongs to: the post's top-level list or a list
/// section's item list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    TopLevel,
    List(SectionId),
}

/// The document root.
///
/// Owns every node: sections and inlines live in arenas addressed by stable
/// handles, top-level order lives in `order`, and markups are interned so
/// structurally identical markups are pointer-equal. All node creation flows
/// through the `create_*` builder methods, which is what keeps ownership
/// wiring and markup identity consistent.
#[derive(Debug, Default)]
pub struct Post {
    pub(crate) sections: SlotMap<SectionId, Section>,
    pub(crate) inlines: SlotMap<InlineId, InlineNode>,
    pub(crate) markups: MarkupInterner,
    pub(crate) order: Vec<SectionId>,
}

impl Post {
    pub fn new() -> Self {
        Self::default()
    }

    /// A post is blank iff it has zero sections.
    pub fn is_blank(&self) -> bool {
        self.order.is_empty()
    }

    pub fn sections(&self) -> &[SectionId] {
        &self.order
    }

    // ============ Builder: markups ============

    pub fn markup(&mut self, tag: &str) -> Markup {
        self.markups.intern(tag)
    }

    pub fn markup_with_attributes(&mut self, tag: &str, attributes: &[(&str, &str)]) -> Markup {
        self.markups.intern_with_attributes(tag, attributes)
    }

    /// Re-intern a markup (possibly from another post) into this post.
    pub fn adopt_markup(&mut self, markup: &Markup) -> Markup {
        let attrs: Vec<(&str, &str)> = markup
            .attributes()
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.markups.intern_with_attributes(markup.tag(), &attrs)
    }

    // ============ Builder: sections ============

    pub fn create_markup_section(&mut self, tag: &str) -> SectionId {
        self.sections
            .insert(Section::new(SectionKind::Markup(MarkupSection::new(tag))))
    }

    pub fn create_default_markup_section(&mut self) -> SectionId {
        self.create_markup_section(DEFAULT_MARKUP_SECTION_TAG)
    }

    pub fn create_list_section(&mut self, tag: &str) -> SectionId {
        self.sections
            .insert(Section::new(SectionKind::List(ListSection::new(tag))))
    }

    pub fn create_list_item(&mut self) -> SectionId {
        self.sections
            .insert(Section::new(SectionKind::ListItem(ListItem {
                markers: Vec::new(),
            })))
    }

    pub fn create_image_section(&mut self, src: Option<&str>) -> SectionId {
        self.sections
            .insert(Section::new(SectionKind::Image(ImageSection {
                src: src.map(str::to_string),
            })))
    }

    pub fn create_card_section(&mut self, name: &str, payload: Value) -> SectionId {
        self.sections
            .insert(Section::new(SectionKind::Card(CardSection {
                name: name.to_string(),
                payload,
                mode: CardMode::Display,
            })))
    }

    // ============ Builder: inlines ============

    pub fn create_marker(&mut self, value: &str, markups: Vec<Markup>) -> InlineId {
        self.inlines.insert(InlineNode {
            owner: None,
            kind: Inline::Marker(Marker::new(value, markups)),
        })
    }

    pub fn create_atom(
        &mut self,
        name: &str,
        value: &str,
        payload: Value,
        markups: Vec<Markup>,
    ) -> InlineId {
        self.inlines.insert(InlineNode {
            owner: None,
            kind: Inline::Atom(Atom::new(name, value, payload, markups)),
        })
    }

    /// Take ownership of a prebuilt inline node value. Its markups must
    /// come from this post's interner.
    pub fn create_inline(&mut self, inline: Inline) -> InlineId {
        self.inlines.insert(InlineNode {
            owner: None,
            kind: inline,
        })
    }

    // ============ Accessors ============

    /// Look up a section. Operating on a destroyed handle is a caller bug and
    /// fails loudly.
    pub fn section(&self, id: SectionId) -> &Section {
        self.sections.get(id).expect("section has been destroyed")
    }

    pub fn section_mut(&mut self, id: SectionId) -> &mut Section {
        self.sections
            .get_mut(id)
            .expect("section has been destroyed")
    }

    pub fn contains_section(&self, id: SectionId) -> bool {
        self.sections.contains_key(id)
    }

    pub fn inline(&self, id: InlineId) -> &Inline {
        &self
            .inlines
            .get(id)
            .expect("inline node has been destroyed")
            .kind
    }

    pub fn inline_mut(&mut self, id: InlineId) -> &mut Inline {
        &mut self
            .inlines
            .get_mut(id)
            .expect("inline node has been destroyed")
            .kind
    }

    pub fn inline_owner(&self, id: InlineId) -> Option<SectionId> {
        self.inlines
            .get(id)
            .expect("inline node has been destroyed")
            .owner
    }

    /// Length of a section in cursor units.
    pub fn section_length(&self, id: SectionId) -> usize {
        match &self.section(id).kind {
            SectionKind::Markup(s) => self.inline_run_length(&s.markers),
            SectionKind::ListItem(s) => self.inline_run_length(&s.markers),
            SectionKind::List(s) => s
                .items
                .iter()
                .map(|item| self.section_length(*item))
                .sum(),
            SectionKind::Image(_) | SectionKind::Card(_) => 1,
        }
    }

    fn inline_run_length(&self, run: &[InlineId]) -> usize {
        run.iter().map(|id| self.inline(*id).length()).sum()
    }

    /// Concatenated text of a markerable section (atoms contribute nothing).
    pub fn section_text(&self, id: SectionId) -> String {
        let mut out = String::new();
        if let Some(markers) = self.section(id).markers() {
            for iid in markers {
                out.push_str(self.inline(*iid).text());
            }
        }
        out
    }

    pub fn section_is_blank(&self, id: SectionId) -> bool {
        match &self.section(id).kind {
            SectionKind::Markup(_) | SectionKind::ListItem(_) => self.section_length(id) == 0,
            SectionKind::List(s) => s.items.is_empty(),
            SectionKind::Image(_) | SectionKind::Card(_) => false,
        }
    }

    pub fn is_markerable(&self, id: SectionId) -> bool {
        self.section(id).is_markerable()
    }

    /// Whole-document text, leaf sections joined with newlines.
    pub fn text(&self) -> String {
        let texts: Vec<String> = self
            .leaf_sections()
            .into_iter()
            .map(|id| self.section_text(id))
            .collect();
        texts.join("\n")
    }

    /// Ordered items of a list section.
    pub fn list_items(&self, list: SectionId) -> &[SectionId] {
        match &self.section(list).kind {
            SectionKind::List(l) => &l.items,
            _ => panic!("section is not a list section"),
        }
    }

    // ============ Structure: collections ============

    pub(crate) fn collection(&self, owner: Owner) -> &Vec<SectionId> {
        match owner {
            Owner::TopLevel => &self.order,
            Owner::List(list) => match &self.section(list).kind {
                SectionKind::List(l) => &l.items,
                _ => panic!("owner is not a list section"),
            },
        }
    }

    pub(crate) fn collection_mut(&mut self, owner: Owner) -> &mut Vec<SectionId> {
        match owner {
            Owner::TopLevel => &mut self.order,
            Owner::List(list) => match &mut self.section_mut(list).kind {
                SectionKind::List(l) => &mut l.items,
                _ => panic!("owner is not a list section"),
            },
        }
    }

    /// Insert an unowned section into a collection, before `before` (or at
    /// the end). Inserting a section that is already owned elsewhere is a
    /// caller bug.
    pub fn insert_section_before(
        &mut self,
        owner: Owner,
        id: SectionId,
        before: Option<SectionId>,
    ) {
        let section = self.section(id);
        assert!(
            section.owner.is_none(),
            "section is already owned; detach it before inserting elsewhere"
        );
        match owner {
            Owner::List(_) => assert!(
                section.is_list_item(),
                "only list items may be inserted into a list section"
            ),
            Owner::TopLevel => assert!(
                !section.is_list_item(),
                "list items may only be inserted into a list section"
            ),
        }

        let collection = self.collection_mut(owner);
        let index = match before {
            Some(before) => collection
                .iter()
                .position(|s| *s == before)
                .expect("`before` section is not in the target collection"),
            None => collection.len(),
        };
        collection.insert(index, id);
        self.section_mut(id).owner = Some(owner);
    }

    pub fn append_section(&mut self, owner: Owner, id: SectionId) {
        self.insert_section_before(owner, id, None);
    }

    /// Remove a section from its collection without destroying it.
    pub fn detach_section(&mut self, id: SectionId) {
        if let Some(owner) = self.section(id).owner {
            let collection = self.collection_mut(owner);
            collection.retain(|s| *s != id);
            self.section_mut(id).owner = None;
        }
    }

    /// Detach and destroy a section, including its items and inline nodes.
    pub fn remove_section(&mut self, id: SectionId) {
        self.detach_section(id);
        self.destroy_section(id);
    }

    fn destroy_section(&mut self, id: SectionId) {
        let child_items: Vec<SectionId> = match &self.section(id).kind {
            SectionKind::List(l) => l.items.clone(),
            _ => Vec::new(),
        };
        for item in child_items {
            self.destroy_section(item);
        }
        let markers: Vec<InlineId> = self.section(id).markers().cloned().unwrap_or_default();
        for iid in markers {
            self.inlines.remove(iid);
        }
        self.sections.remove(id);
    }

    // ============ Structure: inlines ============

    /// Insert an unowned inline node into a markerable section at `index`.
    pub fn insert_inline_at(&mut self, section: SectionId, index: usize, id: InlineId) {
        let node = self
            .inlines
            .get(id)
            .expect("inline node has been destroyed");
        assert!(
            node.owner.is_none(),
            "inline node is already owned; detach it before inserting elsewhere"
        );
        let markers = self
            .section_mut(section)
            .markers_mut()
            .expect("cannot insert inline nodes into a non-markerable section");
        assert!(index <= markers.len(), "inline index out of bounds");
        markers.insert(index, id);
        self.inlines[id].owner = Some(section);
    }

    pub fn append_inline(&mut self, section: SectionId, id: InlineId) {
        let index = self
            .section(section)
            .markers()
            .expect("cannot insert inline nodes into a non-markerable section")
            .len();
        self.insert_inline_at(section, index, id);
    }

    pub fn detach_inline(&mut self, id: InlineId) {
        let owner = self.inline_owner(id);
        if let Some(section) = owner {
            if let Some(markers) = self.section_mut(section).markers_mut() {
                markers.retain(|m| *m != id);
            }
            self.inlines[id].owner = None;
        }
    }

    /// Detach and destroy an inline node.
    pub fn remove_inline(&mut self, id: InlineId) {
        self.detach_inline(id);
        self.inlines.remove(id);
    }

    // ============ Navigation ============

    /// Leaf sections in document order (list items in place of their list).
    pub fn leaf_sections(&self) -> Vec<SectionId> {
        let mut leaves = Vec::new();
        for id in &self.order {
            match &self.section(*id).kind {
                SectionKind::List(l) => leaves.extend(l.items.iter().copied()),
                _ => leaves.push(*id),
            }
        }
        leaves
    }

    pub fn next_leaf_section(&self, id: SectionId) -> Option<SectionId> {
        let leaves = self.leaf_sections();
        let index = leaves.iter().position(|s| *s == id)?;
        leaves.get(index + 1).copied()
    }

    pub fn prev_leaf_section(&self, id: SectionId) -> Option<SectionId> {
        let leaves = self.leaf_sections();
        let index = leaves.iter().position(|s| *s == id)?;
        index.checked_sub(1).map(|i| leaves[i])
    }

    /// Position at the head of the document; blank for a blank post.
    pub fn head_position(&self) -> Position {
        match self.leaf_sections().first() {
            Some(first) => Position::head_of(*first),
            None => Position::Blank,
        }
    }

    /// Position at the tail of the document; blank for a blank post.
    pub fn tail_position(&self) -> Position {
        match self.leaf_sections().last() {
            Some(last) => Position::new(*last, self.section_length(*last)),
            None => Position::Blank,
        }
    }

    /// A range spanning the whole document.
    pub fn to_range(&self) -> Range {
        Range::new(self.head_position(), self.tail_position())
    }

    // ============ Cross-post adoption ============

    /// Deep-copy an inline node from another post into this one,
    /// re-interning its markups. The copy is unowned.
    pub fn adopt_inline(&mut self, other: &Post, id: InlineId) -> InlineId {
        let adopted = match other.inline(id) {
            Inline::Marker(m) => {
                let markups = m.markups.iter().map(|mk| self.adopt_markup(mk)).collect();
                Inline::Marker(Marker::new(m.value.clone(), markups))
            }
            Inline::Atom(a) => {
                let markups = a.markups.iter().map(|mk| self.adopt_markup(mk)).collect();
                Inline::Atom(Atom::new(
                    a.name.clone(),
                    a.value.clone(),
                    a.payload.clone(),
                    markups,
                ))
            }
        };
        self.inlines.insert(InlineNode {
            owner: None,
            kind: adopted,
        })
    }

    /// Deep-copy a section (and its subtree) from another post into this
    /// one. The copy is unowned.
    pub fn adopt_section(&mut self, other: &Post, id: SectionId) -> SectionId {
        match &other.section(id).kind {
            SectionKind::Markup(s) => {
                let new_id = self.create_markup_section(&s.tag);
                if let SectionKind::Markup(ns) = &mut self.section_mut(new_id).kind {
                    ns.attributes = s.attributes.clone();
                }
                for iid in &s.markers {
                    let adopted = self.adopt_inline(other, *iid);
                    self.append_inline(new_id, adopted);
                }
                new_id
            }
            SectionKind::ListItem(s) => {
                let new_id = self.create_list_item();
                for iid in &s.markers {
                    let adopted = self.adopt_inline(other, *iid);
                    self.append_inline(new_id, adopted);
                }
                new_id
            }
            SectionKind::List(s) => {
                let new_id = self.create_list_section(&s.tag);
                if let SectionKind::List(ns) = &mut self.section_mut(new_id).kind {
                    ns.attributes = s.attributes.clone();
                }
                for item in s.items.clone() {
                    let adopted = self.adopt_section(other, item);
                    self.append_section(Owner::List(new_id), adopted);
                }
                new_id
            }
            SectionKind::Image(s) => self.create_image_section(s.src.as_deref()),
            SectionKind::Card(s) => self.create_card_section(&s.name, s.payload.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_with_text(texts: &[&str]) -> (Post, Vec<SectionId>) {
        let mut post = Post::new();
        let mut ids = Vec::new();
        for text in texts {
            let section = post.create_markup_section("p");
            let marker = post.create_marker(text, vec![]);
            post.append_inline(section, marker);
            post.append_section(Owner::TopLevel, section);
            ids.push(section);
        }
        (post, ids)
    }

    // ============ Blank / length / text ============

    #[test]
    fn test_blank_post_has_no_sections() {
        let post = Post::new();
        assert!(post.is_blank());
        assert_eq!(post.head_position(), Position::Blank);
        assert_eq!(post.tail_position(), Position::Blank);
    }

    #[test]
    fn test_section_length_and_text() {
        let (post, ids) = post_with_text(&["hello"]);
        assert_eq!(post.section_length(ids[0]), 5);
        assert_eq!(post.section_text(ids[0]), "hello");
        assert!(!post.section_is_blank(ids[0]));
    }

    #[test]
    fn test_atom_contributes_length_but_no_text() {
        let mut post = Post::new();
        let section = post.create_markup_section("p");
        let marker = post.create_marker("hi", vec![]);
        let atom = post.create_atom("mention", "@tom", Value::Null, vec![]);
        post.append_inline(section, marker);
        post.append_inline(section, atom);
        post.append_section(Owner::TopLevel, section);

        assert_eq!(post.section_length(section), 3);
        assert_eq!(post.section_text(section), "hi");
    }

    #[test]
    fn test_card_and_image_have_length_one() {
        let mut post = Post::new();
        let card = post.create_card_section("embed", Value::Null);
        let image = post.create_image_section(Some("/cat.png"));
        post.append_section(Owner::TopLevel, card);
        post.append_section(Owner::TopLevel, image);

        assert_eq!(post.section_length(card), 1);
        assert_eq!(post.section_length(image), 1);
        assert!(!post.section_is_blank(card));
    }

    // ============ Ownership wiring ============

    #[test]
    #[should_panic(expected = "already owned")]
    fn test_inserting_owned_section_is_fatal() {
        let (mut post, ids) = post_with_text(&["a"]);
        post.append_section(Owner::TopLevel, ids[0]);
    }

    #[test]
    #[should_panic(expected = "only list items may be inserted into a list section")]
    fn test_inserting_paragraph_into_list_is_fatal() {
        let mut post = Post::new();
        let list = post.create_list_section("ul");
        post.append_section(Owner::TopLevel, list);
        let paragraph = post.create_markup_section("p");
        post.append_section(Owner::List(list), paragraph);
    }

    #[test]
    #[should_panic(expected = "list items may only be inserted into a list section")]
    fn test_inserting_list_item_at_top_level_is_fatal() {
        let mut post = Post::new();
        let item = post.create_list_item();
        post.append_section(Owner::TopLevel, item);
    }

    #[test]
    fn test_detach_then_reinsert_is_allowed() {
        let (mut post, ids) = post_with_text(&["a", "b"]);
        post.detach_section(ids[0]);
        assert_eq!(post.sections(), &[ids[1]]);

        post.insert_section_before(Owner::TopLevel, ids[0], None);
        assert_eq!(post.sections(), &[ids[1], ids[0]]);
    }

    #[test]
    #[should_panic(expected = "section has been destroyed")]
    fn test_using_removed_section_is_fatal() {
        let (mut post, ids) = post_with_text(&["a"]);
        post.remove_section(ids[0]);
        post.section_text(ids[0]);
    }

    #[test]
    fn test_remove_list_destroys_items_and_inlines() {
        let mut post = Post::new();
        let list = post.create_list_section("ul");
        post.append_section(Owner::TopLevel, list);
        let item = post.create_list_item();
        let marker = post.create_marker("x", vec![]);
        post.append_inline(item, marker);
        post.append_section(Owner::List(list), item);

        post.remove_section(list);
        assert!(post.is_blank());
        assert!(!post.contains_section(item));
        assert!(post.inlines.get(marker).is_none());
    }

    // ============ Navigation ============

    #[test]
    fn test_leaf_sections_flatten_lists() {
        let mut post = Post::new();
        let before = post.create_markup_section("p");
        post.append_section(Owner::TopLevel, before);
        let list = post.create_list_section("ul");
        post.append_section(Owner::TopLevel, list);
        let item1 = post.create_list_item();
        let item2 = post.create_list_item();
        post.append_section(Owner::List(list), item1);
        post.append_section(Owner::List(list), item2);

        assert_eq!(post.leaf_sections(), vec![before, item1, item2]);
        assert_eq!(post.next_leaf_section(before), Some(item1));
        assert_eq!(post.prev_leaf_section(item1), Some(before));
        assert_eq!(post.next_leaf_section(item2), None);
    }

    // ============ Adoption ============

    #[test]
    fn test_adopt_section_reinterns_markups() {
        let mut source = Post::new();
        let bold = source.markup("b");
        let section = source.create_markup_section("h2");
        let marker = source.create_marker("hi", vec![bold]);
        source.append_inline(section, marker);
        source.append_section(Owner::TopLevel, section);

        let mut target = Post::new();
        let target_bold = target.markup("b");
        let adopted = target.adopt_section(&source, section);

        assert_eq!(target.section(adopted).tag(), Some("h2"));
        assert_eq!(target.section_text(adopted), "hi");
        let markers = target.section(adopted).markers().unwrap().clone();
        assert_eq!(
            target.inline(markers[0]).markups(),
            &[target_bold],
            "adopted markups should be interned in the target post"
        );
    }
}
