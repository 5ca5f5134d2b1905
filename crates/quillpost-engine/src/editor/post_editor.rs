use crate::cursor::unicode::split_at_utf16;
use crate::cursor::{Direction, Position, Range};
use crate::model::markup::{normalize_tag, DEFAULT_MARKUP_SECTION_TAG, VALID_LIST_SECTION_TAGS};
use crate::model::{Inline, InlineId, Markup, Owner, Post, SectionId, SectionKind};
use crate::render::card::{AtomRegistry, CardRegistry};
use crate::render::reconciler::reconcile;
use crate::render::{ModelRef, OutputDom, RenderTree};

type Task<H> = Box<dyn FnOnce(&mut Post, &mut RenderTree<H>)>;

/// Owned classification of a section for `split_section`, so no model
/// borrow outlives the dispatch.
enum SplitKind {
    CardLike,
    ListItem,
    Markup {
        tag: String,
        attributes: Vec<(String, String)>,
    },
}

/// One mutation transaction against the document.
///
/// Construction captures the current range; operation calls mutate the
/// model, dirty the affected render nodes and enqueue callbacks in three
/// ordered queues; [`PostEditor::complete`] runs the queues in order
/// (before-complete, complete + reconciliation, after-complete) exactly
/// once. Completing twice is a caller bug.
///
/// Structural preconditions (wrong position kind, offsets outside a
/// section, operations on destroyed nodes) are fatal assertions, not
/// recoverable errors.
pub struct PostEditor<'a, D: OutputDom> {
    pub(crate) post: &'a mut Post,
    pub(crate) render: &'a mut RenderTree<D::Handle>,
    range_at_begin: Range,
    scheduled_range: Option<Range>,
    before_complete: Vec<Task<D::Handle>>,
    complete_queue: Vec<Task<D::Handle>>,
    after_complete: Vec<Task<D::Handle>>,
    completed: bool,
    snapshot_cancelled: bool,
    list_cleanup_scheduled: bool,
}

impl<'a, D: OutputDom> PostEditor<'a, D> {
    pub(crate) fn new(
        post: &'a mut Post,
        render: &'a mut RenderTree<D::Handle>,
        range: Range,
    ) -> Self {
        Self {
            post,
            render,
            range_at_begin: range,
            scheduled_range: None,
            before_complete: Vec::new(),
            complete_queue: Vec::new(),
            after_complete: Vec::new(),
            completed: false,
            snapshot_cancelled: false,
            list_cleanup_scheduled: false,
        }
    }

    pub fn post(&self) -> &Post {
        self.post
    }

    pub fn range_at_begin(&self) -> Range {
        self.range_at_begin
    }

    /// Intern a markup in the document being edited.
    pub fn markup(&mut self, tag: &str) -> Markup {
        self.post.markup(tag)
    }

    pub fn markup_with_attributes(&mut self, tag: &str, attributes: &[(&str, &str)]) -> Markup {
        self.post.markup_with_attributes(tag, attributes)
    }

    // ============ Scheduling ============

    pub fn schedule_before_complete(
        &mut self,
        task: impl FnOnce(&mut Post, &mut RenderTree<D::Handle>) + 'static,
    ) {
        self.before_complete.push(Box::new(task));
    }

    pub fn schedule_on_complete(
        &mut self,
        task: impl FnOnce(&mut Post, &mut RenderTree<D::Handle>) + 'static,
    ) {
        self.complete_queue.push(Box::new(task));
    }

    pub fn schedule_after_complete(
        &mut self,
        task: impl FnOnce(&mut Post, &mut RenderTree<D::Handle>) + 'static,
    ) {
        self.after_complete.push(Box::new(task));
    }

    /// Where the cursor should land once this transaction completes.
    pub fn schedule_range(&mut self, range: Range) {
        self.scheduled_range = Some(range);
    }

    /// Mark the pending undo snapshot as cancelled: this transaction's
    /// effect will not be independently undoable.
    pub fn cancel_snapshot(&mut self) {
        self.snapshot_cancelled = true;
    }

    /// Run the three queues in order, reconciling the render tree between
    /// the complete and after-complete queues. Returns the range the editor
    /// should adopt and whether the pending snapshot was cancelled.
    pub(crate) fn complete(
        mut self,
        dom: &mut D,
        root: Option<D::Handle>,
        cards: &CardRegistry,
        atoms: &AtomRegistry,
    ) -> (Range, bool) {
        assert!(!self.completed, "PostEditor has already completed");
        self.completed = true;

        while !self.before_complete.is_empty() {
            for task in std::mem::take(&mut self.before_complete) {
                task(self.post, self.render);
            }
        }
        while !self.complete_queue.is_empty() {
            for task in std::mem::take(&mut self.complete_queue) {
                task(self.post, self.render);
            }
        }
        if let Some(root_el) = root {
            reconcile(self.post, self.render, dom, root_el, cards, atoms);
        }
        while !self.after_complete.is_empty() {
            for task in std::mem::take(&mut self.after_complete) {
                task(self.post, self.render);
            }
        }

        let range = self.scheduled_range.unwrap_or(self.range_at_begin);
        let range = Range {
            head: self.sanitize_position(range.head),
            tail: self.sanitize_position(range.tail),
            direction: range.direction,
        };
        (range, self.snapshot_cancelled)
    }

    fn sanitize_position(&self, position: Position) -> Position {
        match position {
            Position::Blank => {
                if self.post.is_blank() {
                    Position::Blank
                } else {
                    self.post.head_position()
                }
            }
            Position::In { section, offset } => {
                if self.post.contains_section(section) && self.post.section(section).is_leaf() {
                    Position::new(section, offset.min(self.post.section_length(section)))
                } else {
                    self.post.head_position()
                }
            }
        }
    }

    // ============ Render bookkeeping ============

    pub(crate) fn mark_section_dirty(&mut self, section: SectionId) {
        self.render.mark_dirty(ModelRef::Section(section));
    }

    fn mark_parent_dirty(&mut self, owner: Option<Owner>) {
        match owner {
            Some(Owner::List(list)) => self.mark_section_dirty(list),
            _ => self.render.mark_dirty(ModelRef::Post),
        }
    }

    // ============ Section plumbing ============

    /// Detach and destroy a section, scheduling its render node teardown.
    pub fn remove_section(&mut self, section: SectionId) {
        let owner = self.post.section(section).owner();
        self.render.schedule_removal(ModelRef::Section(section));
        self.post.remove_section(section);
        self.mark_parent_dirty(owner);
    }

    pub(crate) fn insert_section_before_marked(
        &mut self,
        owner: Owner,
        section: SectionId,
        before: Option<SectionId>,
    ) {
        self.post.insert_section_before(owner, section, before);
        self.mark_parent_dirty(Some(owner));
    }

    /// Replace a section with another at the same place in its collection.
    pub fn replace_section(&mut self, old: SectionId, new: SectionId) {
        let owner = self
            .post
            .section(old)
            .owner()
            .expect("cannot replace a detached section");
        self.insert_section_before_marked(owner, new, Some(old));
        self.remove_section(old);
    }

    /// Swap the whole document's sections for deep copies of another
    /// post's. Used by undo/redo restoration.
    pub fn migrate_sections_from_post(&mut self, source: &Post) {
        for section in self.post.sections().to_vec() {
            self.remove_section(section);
        }
        for section in source.sections().to_vec() {
            let adopted = self.post.adopt_section(source, section);
            self.post.append_section(Owner::TopLevel, adopted);
        }
        self.render.mark_dirty(ModelRef::Post);
    }

    /// Append the default blank paragraph to an empty post; a post must
    /// never be left with zero sections by a structural edit.
    pub(crate) fn ensure_default_section(&mut self) -> Position {
        debug_assert!(self.post.is_blank());
        let section = self.post.create_default_markup_section();
        self.post.append_section(Owner::TopLevel, section);
        self.render.mark_dirty(ModelRef::Post);
        Position::head_of(section)
    }

    // ============ Marker plumbing ============

    /// Split the marker straddling `offset` (if any) so an inline boundary
    /// falls exactly there.
    pub(crate) fn split_marker_at(&mut self, section: SectionId, offset: usize) {
        let markers = self
            .post
            .section(section)
            .markers()
            .expect("cannot split markers of a non-markerable section")
            .clone();
        let mut acc = 0;
        for (index, iid) in markers.iter().enumerate() {
            let length = self.post.inline(*iid).length();
            if offset > acc && offset < acc + length {
                let Inline::Marker(marker) = self.post.inline(*iid) else {
                    // Atoms have length 1; no interior offset exists.
                    unreachable!("offset cannot fall inside an atom");
                };
                let (left, right) = split_at_utf16(&marker.value, offset - acc);
                let markups = marker.markups.clone();
                if let Inline::Marker(marker) = self.post.inline_mut(*iid) {
                    marker.value = left;
                }
                let new = self.post.create_marker(&right, markups);
                self.post.insert_inline_at(section, index + 1, new);
                self.mark_section_dirty(section);
                return;
            }
            acc += length;
        }
    }

    /// Index of the inline boundary at `offset`; the offset must fall on a
    /// boundary (split first).
    pub(crate) fn marker_boundary_index(&self, section: SectionId, offset: usize) -> usize {
        let markers = self
            .post
            .section(section)
            .markers()
            .expect("section is not markerable");
        let mut acc = 0;
        for (index, iid) in markers.iter().enumerate() {
            if acc >= offset {
                return index;
            }
            acc += self.post.inline(*iid).length();
        }
        assert!(
            acc == offset,
            "offset {offset} does not fall on an inline boundary"
        );
        markers.len()
    }

    /// Prune blank markers and merge adjacent joinable ones.
    pub(crate) fn coalesce_markers(&mut self, section: SectionId) {
        let Some(markers) = self.post.section(section).markers().cloned() else {
            return;
        };
        for iid in &markers {
            if self.post.inline(*iid).is_blank() {
                self.post.remove_inline(*iid);
            }
        }
        let mut markers = self
            .post
            .section(section)
            .markers()
            .expect("section is not markerable")
            .clone();
        let mut index = 0;
        while index + 1 < markers.len() {
            let a = markers[index];
            let b = markers[index + 1];
            if self.post.inline(a).can_join(self.post.inline(b)) {
                let Inline::Marker(tail) = self.post.inline(b) else {
                    unreachable!("atoms never join");
                };
                let text = tail.value.clone();
                if let Inline::Marker(head) = self.post.inline_mut(a) {
                    head.value.push_str(&text);
                }
                self.post.remove_inline(b);
                markers.remove(index + 1);
            } else {
                index += 1;
            }
        }
        self.mark_section_dirty(section);
    }

    /// The markups in effect at a position (those of the marker ending at
    /// or straddling the offset).
    fn markups_at(&self, section: SectionId, offset: usize) -> Vec<Markup> {
        let Some(markers) = self.post.section(section).markers() else {
            return Vec::new();
        };
        let mut acc = 0;
        for iid in markers {
            let inline = self.post.inline(*iid);
            let length = inline.length();
            if offset > acc && offset <= acc + length {
                return match inline {
                    Inline::Marker(m) => m.markups.clone(),
                    Inline::Atom(_) => Vec::new(),
                };
            }
            acc += length;
        }
        Vec::new()
    }

    // ============ deleteRange ============

    /// Delete everything inside a range. Returns the position where the
    /// cursor should land, and guarantees the post never ends up with zero
    /// sections.
    pub fn delete_range(&mut self, range: Range) -> Position {
        if range.is_blank() {
            if self.post.is_blank() {
                return self.ensure_default_section();
            }
            return self.sanitize_position(range.head);
        }
        let range = range.ordered(self.post);
        let (head, tail) = (range.head, range.tail);
        if head == tail {
            return head;
        }
        let head_sid = head.section().expect("range head is blank");
        let tail_sid = tail.section().expect("range tail is blank");

        // Deleting the whole document resets it to a single blank
        // paragraph rather than leaving an empty husk of the old sections.
        if head == self.post.head_position() && tail == self.post.tail_position() {
            for section in self.post.sections().to_vec() {
                self.remove_section(section);
            }
            let position = self.ensure_default_section();
            self.schedule_range(Range::collapsed(position));
            return position;
        }

        let mut position;
        if head_sid == tail_sid {
            let prev = self.post.prev_leaf_section(head_sid);
            let next = self.post.next_leaf_section(head_sid);
            self.cut_section(head_sid, head.offset(), tail.offset());
            if self.post.contains_section(head_sid) {
                position = Position::new(head_sid, head.offset());
            } else {
                // The whole leaf (card/image) was removed.
                position = match (prev, next) {
                    (Some(prev), _) => Position::tail_of(self.post, prev),
                    (None, Some(next)) => Position::head_of(next),
                    (None, None) => Position::Blank,
                };
            }
            self.schedule_list_cleanup();
        } else {
            let leaves = self.post.leaf_sections();
            let head_index = leaves
                .iter()
                .position(|s| *s == head_sid)
                .expect("range head does not address a live section");
            let tail_index = leaves
                .iter()
                .position(|s| *s == tail_sid)
                .expect("range tail does not address a live section");
            let middle = leaves[head_index + 1..tail_index].to_vec();

            let head_length = self.post.section_length(head_sid);
            self.cut_section(head_sid, head.offset(), head_length);
            for section in middle {
                self.remove_section(section);
            }
            self.cut_section(tail_sid, 0, tail.offset());

            let head_alive = self.post.contains_section(head_sid);
            let tail_alive = self.post.contains_section(tail_sid);
            position = match (head_alive, tail_alive) {
                (true, true) => {
                    if self.post.is_markerable(head_sid) && self.post.is_markerable(tail_sid) {
                        self.join_sections(head_sid, tail_sid);
                        Position::new(head_sid, head.offset())
                    } else if self.post.section_is_blank(head_sid) {
                        self.remove_section(head_sid);
                        Position::head_of(tail_sid)
                    } else if self.post.section_is_blank(tail_sid) {
                        self.remove_section(tail_sid);
                        Position::new(head_sid, head.offset())
                    } else {
                        Position::new(head_sid, head.offset())
                    }
                }
                (true, false) => Position::new(head_sid, head.offset()),
                (false, true) => Position::head_of(tail_sid),
                (false, false) => Position::Blank,
            };
            self.schedule_list_cleanup();
        }

        if self.post.is_blank() {
            position = self.ensure_default_section();
        }
        let position = self.sanitize_position(position);
        self.schedule_range(Range::collapsed(position));
        position
    }

    /// Remove the content of one leaf section between two offsets.
    fn cut_section(&mut self, section: SectionId, head: usize, tail: usize) {
        if head == tail {
            return;
        }
        assert!(head < tail, "cut offsets out of order");
        if self.post.is_markerable(section) {
            self.split_marker_at(section, head);
            self.split_marker_at(section, tail);
            let markers = self
                .post
                .section(section)
                .markers()
                .expect("section is not markerable")
                .clone();
            let mut acc = 0;
            let mut doomed = Vec::new();
            for iid in markers {
                let length = self.post.inline(iid).length();
                if acc >= head && acc + length <= tail && length > 0 {
                    doomed.push(iid);
                }
                acc += length;
            }
            for iid in doomed {
                self.post.remove_inline(iid);
            }
            self.coalesce_markers(section);
        } else {
            // Cards and images are atomic: covering the whole unit removes
            // the section.
            self.remove_section(section);
        }
    }

    /// Move the tail section's inlines onto the head section and drop the
    /// tail section.
    fn join_sections(&mut self, head: SectionId, tail: SectionId) {
        let tail_markers = self
            .post
            .section(tail)
            .markers()
            .expect("cannot join a non-markerable section")
            .clone();
        for iid in tail_markers {
            self.post.detach_inline(iid);
            self.post.append_inline(head, iid);
        }
        self.remove_section(tail);
        self.coalesce_markers(head);
    }

    // ============ deleteAtPosition ============

    /// Delete one unit at a position (backspace / forward-delete),
    /// surrogate-pair aware, joining sections across boundaries and
    /// removing whole cards/images at them.
    pub fn delete_at_position(&mut self, position: Position, direction: Direction) -> Position {
        let Position::In { section, offset } = position else {
            return position;
        };
        match direction {
            Direction::Backward => {
                if offset > 0 {
                    let start = position.move_units(self.post, -1);
                    return self.delete_range(Range::new(start, position));
                }
                let Some(prev) = self.post.prev_leaf_section(section) else {
                    return position;
                };
                if self.post.is_markerable(prev) && self.post.is_markerable(section) {
                    let prev_tail = Position::tail_of(self.post, prev);
                    self.delete_range(Range::new(prev_tail, position))
                } else if !self.post.is_markerable(prev) {
                    self.remove_section(prev);
                    self.schedule_list_cleanup();
                    let position = self.sanitize_position(position);
                    self.schedule_range(Range::collapsed(position));
                    position
                } else {
                    Position::tail_of(self.post, prev)
                }
            }
            Direction::Forward => {
                if offset < self.post.section_length(section) {
                    let end = position.move_units(self.post, 1);
                    return self.delete_range(Range::new(position, end));
                }
                let Some(next) = self.post.next_leaf_section(section) else {
                    return position;
                };
                if self.post.is_markerable(next) && self.post.is_markerable(section) {
                    let next_head = Position::head_of(next);
                    self.delete_range(Range::new(position, next_head));
                    Position::new(section, offset)
                } else if !self.post.is_markerable(next) {
                    self.remove_section(next);
                    self.schedule_list_cleanup();
                    let position = self.sanitize_position(position);
                    self.schedule_range(Range::collapsed(position));
                    position
                } else {
                    Position::head_of(next)
                }
            }
        }
    }

    // ============ splitSection ============

    /// Split a leaf section at a position.
    ///
    /// Cards accept only offsets 0 and 1 and get a blank paragraph inserted
    /// on that side. The trailing blank list item becomes a blank paragraph
    /// after the list instead of splitting. Other list items split their
    /// enclosing list into pre/mid/post fragments around the split item;
    /// the before-complete cleanup rejoins same-tag fragments and drops the
    /// blank ones. Markerable sections split their markers.
    pub fn split_section(
        &mut self,
        position: Position,
    ) -> (Option<SectionId>, Option<SectionId>) {
        let Position::In { section, offset } = position else {
            panic!("cannot split at a blank position");
        };
        let kind = match &self.post.section(section).kind {
            SectionKind::Card(_) | SectionKind::Image(_) => SplitKind::CardLike,
            SectionKind::ListItem(_) => SplitKind::ListItem,
            SectionKind::Markup(s) => SplitKind::Markup {
                tag: s.tag.clone(),
                attributes: s.attributes.clone(),
            },
            SectionKind::List(_) => panic!("cannot split a list section directly"),
        };
        match kind {
            SplitKind::CardLike => {
                assert!(
                    offset <= 1,
                    "cannot split a card section at offset {offset}"
                );
                let owner = self
                    .post
                    .section(section)
                    .owner()
                    .expect("cannot split a detached section");
                let blank = self.post.create_default_markup_section();
                if offset == 0 {
                    self.insert_section_before_marked(owner, blank, Some(section));
                    self.schedule_range(Range::collapsed(Position::head_of(section)));
                    (Some(blank), Some(section))
                } else {
                    let next = self.next_in_collection(section);
                    self.insert_section_before_marked(owner, blank, next);
                    self.schedule_range(Range::collapsed(Position::head_of(blank)));
                    (Some(section), Some(blank))
                }
            }
            SplitKind::ListItem => {
                let Some(Owner::List(list)) = self.post.section(section).owner() else {
                    panic!("list item has no owning list");
                };
                let is_last = self.post.collection(Owner::List(list)).last() == Some(&section);
                if is_last && self.post.section_is_blank(section) {
                    // End-of-list special case: the trailing blank item has
                    // nothing to split; it becomes a blank paragraph after
                    // the list.
                    let list_owner = self
                        .post
                        .section(list)
                        .owner()
                        .expect("list section has no owner");
                    let after_list = self.next_in_collection(list);
                    self.remove_section(section);
                    let blank = self.post.create_default_markup_section();
                    self.insert_section_before_marked(list_owner, blank, after_list);
                    self.schedule_list_cleanup();
                    self.schedule_range(Range::collapsed(Position::head_of(blank)));
                    (None, Some(blank))
                } else {
                    let (_pre_list, _mid_list, _post_list) =
                        self.split_list_at_item(list, section);
                    let (pre_item, post_item) = self.split_list_item(section, offset);
                    self.schedule_list_cleanup();
                    self.schedule_range(Range::collapsed(Position::head_of(post_item)));
                    (Some(pre_item), Some(post_item))
                }
            }
            SplitKind::Markup { tag, attributes } => {
                let owner = self
                    .post
                    .section(section)
                    .owner()
                    .expect("cannot split a detached section");
                self.split_marker_at(section, offset);
                let boundary = self.marker_boundary_index(section, offset);
                let markers = self
                    .post
                    .section(section)
                    .markers()
                    .expect("markup section has markers")
                    .clone();

                let first = self.post.create_markup_section(&tag);
                let second = self.post.create_markup_section(&tag);
                for target in [first, second] {
                    if let SectionKind::Markup(ms) = &mut self.post.section_mut(target).kind {
                        ms.attributes = attributes.clone();
                    }
                }
                for (index, iid) in markers.into_iter().enumerate() {
                    self.post.detach_inline(iid);
                    let target = if index < boundary { first } else { second };
                    self.post.append_inline(target, iid);
                }
                self.insert_section_before_marked(owner, first, Some(section));
                self.insert_section_before_marked(owner, second, Some(section));
                self.remove_section(section);
                self.coalesce_markers(first);
                self.coalesce_markers(second);
                self.schedule_range(Range::collapsed(Position::head_of(second)));
                (Some(first), Some(second))
            }
        }
    }

    pub(crate) fn next_in_collection(&self, section: SectionId) -> Option<SectionId> {
        let owner = self.post.section(section).owner()?;
        let collection = self.post.collection(owner);
        let index = collection.iter().position(|s| *s == section)?;
        collection.get(index + 1).copied()
    }

    /// Split a list into (pre, mid, post) fragments where mid is the
    /// original list reduced to just `item`. Blank fragments are left for
    /// the before-complete cleanup.
    fn split_list_at_item(
        &mut self,
        list: SectionId,
        item: SectionId,
    ) -> (SectionId, SectionId, SectionId) {
        let tag = self
            .post
            .section(list)
            .tag()
            .expect("list section has a tag")
            .to_string();
        let owner = self
            .post
            .section(list)
            .owner()
            .expect("list section has no owner");
        let items = self.post.collection(Owner::List(list)).clone();
        let index = items
            .iter()
            .position(|s| *s == item)
            .expect("item is not in the given list");

        let pre = self.post.create_list_section(&tag);
        let post_fragment = self.post.create_list_section(&tag);
        for before in &items[..index] {
            self.post.detach_section(*before);
            self.post.append_section(Owner::List(pre), *before);
        }
        for after in &items[index + 1..] {
            self.post.detach_section(*after);
            self.post.append_section(Owner::List(post_fragment), *after);
        }
        self.insert_section_before_marked(owner, pre, Some(list));
        let next = self.next_in_collection(list);
        self.insert_section_before_marked(owner, post_fragment, next);
        self.mark_section_dirty(list);
        (pre, list, post_fragment)
    }

    /// Split a list item's markers at an offset into two items in place.
    pub(crate) fn split_list_item(&mut self, item: SectionId, offset: usize) -> (SectionId, SectionId) {
        let Some(Owner::List(list)) = self.post.section(item).owner() else {
            panic!("list item has no owning list");
        };
        self.split_marker_at(item, offset);
        let boundary = self.marker_boundary_index(item, offset);
        let markers = self
            .post
            .section(item)
            .markers()
            .expect("list item has markers")
            .clone();

        let pre = self.post.create_list_item();
        let post_item = self.post.create_list_item();
        for (index, iid) in markers.into_iter().enumerate() {
            self.post.detach_inline(iid);
            let target = if index < boundary { pre } else { post_item };
            self.post.append_inline(target, iid);
        }
        self.post
            .insert_section_before(Owner::List(list), pre, Some(item));
        self.post
            .insert_section_before(Owner::List(list), post_item, Some(item));
        self.remove_section(item);
        self.coalesce_markers(pre);
        self.coalesce_markers(post_item);
        self.mark_section_dirty(list);
        (pre, post_item)
    }

    // ============ insertMarkers / insertText ============

    /// Splice inline nodes in at a markerable position. Returns the
    /// position at the end of the inserted content.
    pub fn insert_markers(&mut self, position: Position, inlines: Vec<Inline>) -> Position {
        let mut position = position;
        if position.is_blank() {
            assert!(
                self.post.is_blank(),
                "cannot insert at a blank position in a non-empty document"
            );
            position = self.ensure_default_section();
        }
        let section = position.section().expect("position is blank");
        assert!(
            self.post.is_markerable(section),
            "cannot insert markers into a non-markerable section"
        );
        let offset = position.offset();
        assert!(
            offset <= self.post.section_length(section),
            "offset outside the section"
        );

        self.split_marker_at(section, offset);
        let boundary = self.marker_boundary_index(section, offset);
        let mut total = 0;
        for (index, inline) in inlines.into_iter().enumerate() {
            total += inline.length();
            let iid = self.post.create_inline(inline);
            self.post.insert_inline_at(section, boundary + index, iid);
        }
        self.coalesce_markers(section);
        self.mark_section_dirty(section);

        let end = Position::new(section, offset + total);
        self.schedule_range(Range::collapsed(end));
        end
    }

    /// Insert plain text, inheriting the markups in effect at the position.
    pub fn insert_text(&mut self, position: Position, text: &str) -> Position {
        let markups = match position.section() {
            Some(section) => self.markups_at(section, position.offset()),
            None => Vec::new(),
        };
        self.insert_markers(
            position,
            vec![Inline::Marker(crate::model::Marker::new(text, markups))],
        )
    }

    // ============ toggleSection ============

    /// If every markerable section touched by the range already carries the
    /// target tag, reset them all to the default paragraph tag; otherwise
    /// set the target tag on all of them.
    pub fn toggle_section(&mut self, tag: &str, range: Range) -> Position {
        let tag = normalize_tag(tag);
        let mut range = range;
        if range.is_blank() {
            let position = if self.post.is_blank() {
                self.ensure_default_section()
            } else {
                self.post.head_position()
            };
            range = Range::collapsed(position);
        }
        let range = range.ordered(self.post);
        let sections = self.markerable_sections_in_range(&range);
        if sections.is_empty() {
            return self.sanitize_position(range.head);
        }

        let all_tagged = sections
            .iter()
            .all(|sid| self.effective_tag(*sid).as_deref() == Some(tag.as_str()));
        let target = if all_tagged {
            DEFAULT_MARKUP_SECTION_TAG.to_string()
        } else {
            tag
        };

        let mut first_converted = None;
        for sid in sections {
            let converted = self.set_section_tag(sid, &target);
            first_converted.get_or_insert(converted);
        }
        self.schedule_list_cleanup();

        let position = first_converted
            .map(Position::head_of)
            .unwrap_or_else(|| self.post.head_position());
        self.schedule_range(Range::collapsed(position));
        position
    }

    /// The tag governing a markerable section: its own for markup sections,
    /// the owning list's for list items.
    fn effective_tag(&self, section: SectionId) -> Option<String> {
        match &self.post.section(section).kind {
            SectionKind::Markup(s) => Some(s.tag.clone()),
            SectionKind::ListItem(_) => match self.post.section(section).owner() {
                Some(Owner::List(list)) => self.post.section(list).tag().map(str::to_string),
                _ => None,
            },
            _ => None,
        }
    }

    fn set_section_tag(&mut self, section: SectionId, target: &str) -> SectionId {
        let to_list = VALID_LIST_SECTION_TAGS.contains(&target);
        let is_markup = matches!(self.post.section(section).kind, SectionKind::Markup(_));
        let is_list_item = matches!(self.post.section(section).kind, SectionKind::ListItem(_));
        if is_markup {
            if !to_list {
                if let SectionKind::Markup(s) = &mut self.post.section_mut(section).kind {
                    if s.tag != target {
                        s.tag = target.to_string();
                    }
                }
                self.mark_section_dirty(section);
                section
            } else {
                // Markup section -> list with a single item.
                let owner = self
                    .post
                    .section(section)
                    .owner()
                    .expect("cannot convert a detached section");
                let markers = self
                    .post
                    .section(section)
                    .markers()
                    .expect("markup section has markers")
                    .clone();
                let list = self.post.create_list_section(target);
                let item = self.post.create_list_item();
                self.post.append_section(Owner::List(list), item);
                for iid in markers {
                    self.post.detach_inline(iid);
                    self.post.append_inline(item, iid);
                }
                self.insert_section_before_marked(owner, list, Some(section));
                self.remove_section(section);
                item
            }
        } else if is_list_item {
            let Some(Owner::List(list)) = self.post.section(section).owner() else {
                panic!("list item has no owning list");
            };
            if to_list {
                if self.post.section(list).tag() == Some(target) {
                    return section;
                }
                let (_pre, mid, _post) = self.split_list_at_item(list, section);
                if let SectionKind::List(l) = &mut self.post.section_mut(mid).kind {
                    l.tag = target.to_string();
                }
                self.mark_section_dirty(mid);
                section
            } else {
                // List item -> markup section: split the list at the item
                // boundary and replace only the middle fragment.
                let (_pre, mid, _post) = self.split_list_at_item(list, section);
                let markers = self
                    .post
                    .section(section)
                    .markers()
                    .expect("list item has markers")
                    .clone();
                let replacement = self.post.create_markup_section(target);
                for iid in markers {
                    self.post.detach_inline(iid);
                    self.post.append_inline(replacement, iid);
                }
                let owner = self
                    .post
                    .section(mid)
                    .owner()
                    .expect("list fragment has an owner");
                self.insert_section_before_marked(owner, replacement, Some(mid));
                self.remove_section(mid);
                replacement
            }
        } else {
            section
        }
    }

    // ============ Markup application ============

    /// Add a markup across a range. The markup lands at the open-markup
    /// stack depth shared by every covered marker rather than on top, which
    /// keeps render/serialize open-close boundaries from toggling.
    pub fn add_markup_to_range(&mut self, range: Range, markup: &Markup) {
        if range.is_blank() {
            return;
        }
        let range = range.ordered(self.post);
        if range.is_collapsed() {
            return;
        }
        self.split_range_boundaries(&range);
        let covered = self.markers_in_range(&range);
        if covered.is_empty() {
            return;
        }

        let mut depth = 0;
        'depth: loop {
            let mut candidate: Option<Markup> = None;
            for (_, iid) in &covered {
                let stack = self.post.inline(*iid).markups();
                let Some(at) = stack.get(depth) else {
                    break 'depth;
                };
                match &candidate {
                    None => candidate = Some(at.clone()),
                    Some(existing) if existing == at => {}
                    Some(_) => break 'depth,
                }
            }
            depth += 1;
        }

        for (section, iid) in covered {
            let markups = self.post.inline_mut(iid).markups_mut();
            if !markups.contains(markup) {
                let at = depth.min(markups.len());
                markups.insert(at, markup.clone());
            }
            self.mark_section_dirty(section);
        }
        self.schedule_range(range);
    }

    /// Remove a markup from every marker fully covered by the range.
    pub fn remove_markup_from_range(&mut self, range: Range, markup: &Markup) {
        if range.is_blank() {
            return;
        }
        let range = range.ordered(self.post);
        if range.is_collapsed() {
            return;
        }
        self.split_range_boundaries(&range);
        for (section, iid) in self.markers_in_range(&range) {
            self.post.inline_mut(iid).markups_mut().retain(|m| m != markup);
            self.mark_section_dirty(section);
        }
        self.schedule_range(range);
    }

    /// Remove if every covered marker has the markup, add otherwise.
    pub fn toggle_markup(&mut self, range: Range, markup: &Markup) {
        if range.is_blank() || range.is_collapsed() {
            return;
        }
        let range = range.ordered(self.post);
        self.split_range_boundaries(&range);
        let covered = self.markers_in_range(&range);
        let has_all = !covered.is_empty()
            && covered
                .iter()
                .all(|(_, iid)| self.post.inline(*iid).markups().contains(markup));
        if has_all {
            self.remove_markup_from_range(range, markup);
        } else {
            self.add_markup_to_range(range, markup);
        }
    }

    fn split_range_boundaries(&mut self, range: &Range) {
        for position in [range.head, range.tail] {
            if let Some(section) = position.section() {
                if self.post.is_markerable(section) {
                    self.split_marker_at(section, position.offset());
                }
            }
        }
    }

    /// Inline nodes fully covered by the range, per markerable section
    /// (boundary markers must be split first).
    fn markers_in_range(&self, range: &Range) -> Vec<(SectionId, InlineId)> {
        let mut covered = Vec::new();
        for section in self.markerable_sections_in_range(range) {
            let trimmed = range.trim_to(self.post, section);
            let (head, tail) = (trimmed.head.offset(), trimmed.tail.offset());
            if head == tail {
                continue;
            }
            let Some(markers) = self.post.section(section).markers() else {
                continue;
            };
            let mut acc = 0;
            for iid in markers {
                let length = self.post.inline(*iid).length();
                if acc >= head && acc + length <= tail && length > 0 {
                    covered.push((section, *iid));
                }
                acc += length;
            }
        }
        covered
    }

    /// Markerable leaf sections touched by a range, in document order.
    fn markerable_sections_in_range(&self, range: &Range) -> Vec<SectionId> {
        let (Some(head_sid), Some(tail_sid)) = (range.head.section(), range.tail.section())
        else {
            return Vec::new();
        };
        let leaves = self.post.leaf_sections();
        let head_index = leaves.iter().position(|s| *s == head_sid);
        let tail_index = leaves.iter().position(|s| *s == tail_sid);
        let (Some(head_index), Some(tail_index)) = (head_index, tail_index) else {
            return Vec::new();
        };
        leaves[head_index..=tail_index]
            .iter()
            .copied()
            .filter(|sid| self.post.is_markerable(*sid))
            .collect()
    }

    // ============ Attributes ============

    /// Set a whitelisted attribute on every attributable section touched by
    /// the range (list items delegate to their list).
    pub fn set_attribute(&mut self, range: Range, name: &str, value: &str) {
        for section in self.attributable_targets(&range) {
            self.post.section_mut(section).set_attribute(name, value);
            self.mark_section_dirty(section);
        }
    }

    pub fn remove_attribute(&mut self, range: Range, name: &str) {
        for section in self.attributable_targets(&range) {
            self.post.section_mut(section).remove_attribute(name);
            self.mark_section_dirty(section);
        }
    }

    fn attributable_targets(&self, range: &Range) -> Vec<SectionId> {
        let mut targets = Vec::new();
        for section in self.markerable_sections_in_range(range) {
            let target = match &self.post.section(section).kind {
                SectionKind::ListItem(_) => match self.post.section(section).owner() {
                    Some(Owner::List(list)) => list,
                    _ => continue,
                },
                _ => section,
            };
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets
    }

    // ============ List cleanup ============

    /// Queue the before-complete cleanup that removes blank list fragments
    /// and rejoins adjacent same-tag lists. Runs after the operation's own
    /// mutations so it never clobbers state the operation still needs.
    pub(crate) fn schedule_list_cleanup(&mut self) {
        if self.list_cleanup_scheduled {
            return;
        }
        self.list_cleanup_scheduled = true;
        self.schedule_before_complete(|post, render| {
            remove_blank_lists(post, render);
            join_adjacent_lists(post, render);
        });
    }
}

fn remove_blank_lists<H: Copy>(post: &mut Post, render: &mut RenderTree<H>) {
    let blank_lists: Vec<SectionId> = post
        .sections()
        .iter()
        .copied()
        .filter(|sid| {
            matches!(post.section(*sid).kind, SectionKind::List(_)) && post.section_is_blank(*sid)
        })
        .collect();
    for list in blank_lists {
        render.schedule_removal(ModelRef::Section(list));
        post.remove_section(list);
        render.mark_dirty(ModelRef::Post);
    }
}

fn join_adjacent_lists<H: Copy>(post: &mut Post, render: &mut RenderTree<H>) {
    let mut index = 0;
    while index + 1 < post.sections().len() {
        let first = post.sections()[index];
        let second = post.sections()[index + 1];
        let joinable = matches!(post.section(first).kind, SectionKind::List(_))
            && matches!(post.section(second).kind, SectionKind::List(_))
            && post.section(first).tag() == post.section(second).tag();
        if joinable {
            let items = post.collection(Owner::List(second)).clone();
            for item in items {
                post.detach_section(item);
                post.append_section(Owner::List(first), item);
            }
            render.schedule_removal(ModelRef::Section(second));
            post.remove_section(second);
            render.mark_dirty(ModelRef::Section(first));
            render.mark_dirty(ModelRef::Post);
        } else {
            index += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Marker;
    use crate::render::{SimpleDom, SimpleNodeId};
    use serde_json::Value;

    fn with_editor<R>(
        post: &mut Post,
        range: Range,
        f: impl FnOnce(&mut PostEditor<'_, SimpleDom>) -> R,
    ) -> (R, Range) {
        let mut render: RenderTree<SimpleNodeId> = RenderTree::new();
        let mut editor = PostEditor::new(post, &mut render, range);
        let result = f(&mut editor);
        let mut dom = SimpleDom::new();
        let (range, _) = editor.complete(&mut dom, None, &CardRegistry::new(), &AtomRegistry::new());
        (result, range)
    }

    fn paragraph(post: &mut Post, text: &str) -> SectionId {
        let section = post.create_markup_section("p");
        if !text.is_empty() {
            let marker = post.create_marker(text, vec![]);
            post.append_inline(section, marker);
        }
        post.append_section(Owner::TopLevel, section);
        section
    }

    fn list(post: &mut Post, tag: &str, items: &[&str]) -> (SectionId, Vec<SectionId>) {
        let list = post.create_list_section(tag);
        post.append_section(Owner::TopLevel, list);
        let mut ids = Vec::new();
        for text in items {
            let item = post.create_list_item();
            if !text.is_empty() {
                let marker = post.create_marker(text, vec![]);
                post.append_inline(item, marker);
            }
            post.append_section(Owner::List(list), item);
            ids.push(item);
        }
        (list, ids)
    }

    // ============ Transaction mechanics ============

    #[test]
    #[should_panic(expected = "already completed")]
    fn test_double_complete_is_fatal() {
        let mut post = Post::new();
        let mut render: RenderTree<SimpleNodeId> = RenderTree::new();
        let editor: PostEditor<'_, SimpleDom> =
            PostEditor::new(&mut post, &mut render, Range::blank());
        let mut dom = SimpleDom::new();
        let mut editor = editor;
        editor.completed = true; // simulate a prior completion
        let _ = editor.complete(&mut dom, None, &CardRegistry::new(), &AtomRegistry::new());
    }

    #[test]
    fn test_queues_run_in_order() {
        let mut post = Post::new();
        paragraph(&mut post, "x");
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let (a, b, c) = (log.clone(), log.clone(), log.clone());

        with_editor(&mut post, Range::blank(), |editor| {
            editor.schedule_after_complete(move |_, _| c.borrow_mut().push("after"));
            editor.schedule_on_complete(move |_, _| b.borrow_mut().push("complete"));
            editor.schedule_before_complete(move |_, _| a.borrow_mut().push("before"));
        });

        assert_eq!(*log.borrow(), vec!["before", "complete", "after"]);
    }

    // ============ deleteRange ============

    #[test]
    fn test_delete_range_within_section() {
        let mut post = Post::new();
        let section = paragraph(&mut post, "hello world");

        let (position, _) = with_editor(&mut post, Range::blank(), |editor| {
            editor.delete_range(Range::new(
                Position::new(section, 5),
                Position::new(section, 11),
            ))
        });

        assert_eq!(post.section_text(section), "hello");
        assert_eq!(position, Position::new(section, 5));
    }

    #[test]
    fn test_delete_range_across_sections_joins_markerables() {
        let mut post = Post::new();
        let first = paragraph(&mut post, "abc");
        let second = paragraph(&mut post, "def");

        let (position, _) = with_editor(&mut post, Range::blank(), |editor| {
            editor.delete_range(Range::new(Position::new(first, 2), Position::new(second, 1)))
        });

        assert_eq!(post.sections().len(), 1);
        assert_eq!(post.section_text(first), "abef");
        assert_eq!(position, Position::new(first, 2));
    }

    #[test]
    fn test_delete_range_removes_whole_sections_between() {
        let mut post = Post::new();
        let first = paragraph(&mut post, "abc");
        let _middle = paragraph(&mut post, "middle");
        let last = paragraph(&mut post, "xyz");

        with_editor(&mut post, Range::blank(), |editor| {
            editor.delete_range(Range::new(Position::new(first, 1), Position::new(last, 2)))
        });

        assert_eq!(post.sections().len(), 1);
        assert_eq!(post.section_text(first), "az");
    }

    #[test]
    fn test_delete_whole_post_leaves_one_blank_paragraph() {
        let mut post = Post::new();
        paragraph(&mut post, "abc");
        list(&mut post, "ul", &["x", "y"]);
        paragraph(&mut post, "tail");

        let (position, _) = with_editor(&mut post, Range::blank(), |editor| {
            let range = editor.post().to_range();
            editor.delete_range(range)
        });

        assert_eq!(post.sections().len(), 1);
        let only = post.sections()[0];
        assert_eq!(post.section(only).tag(), Some("p"));
        assert!(post.section_is_blank(only));
        assert_eq!(position, Position::head_of(only));
    }

    #[test]
    fn test_delete_range_covering_card_removes_it() {
        let mut post = Post::new();
        let before = paragraph(&mut post, "a");
        let card = post.create_card_section("embed", Value::Null);
        post.append_section(Owner::TopLevel, card);
        paragraph(&mut post, "b");

        let (position, _) = with_editor(&mut post, Range::blank(), |editor| {
            editor.delete_range(Range::new(Position::new(card, 0), Position::new(card, 1)))
        });

        assert!(!post.contains_section(card));
        assert_eq!(post.sections().len(), 2);
        assert_eq!(position, Position::new(before, 1), "cursor lands on previous tail");
    }

    #[test]
    fn test_delete_range_rejoins_adjacent_lists() {
        let mut post = Post::new();
        let (first_list, first_items) = list(&mut post, "ul", &["a", "b"]);
        let between = paragraph(&mut post, "between");
        let (_second_list, second_items) = list(&mut post, "ul", &["c", "d"]);

        with_editor(&mut post, Range::blank(), |editor| {
            editor.delete_range(Range::new(
                Position::new(between, 0),
                Position::tail_of(editor.post(), between),
            ));
            // The paragraph is blank but still present mid-transaction.
            assert!(editor.post().contains_section(between));
        });

        // Deleting the paragraph's whole text leaves a blank paragraph, so
        // lists are not yet adjacent. Now delete the blank line itself.
        with_editor(&mut post, Range::blank(), |editor| {
            editor.delete_range(Range::new(
                Position::tail_of(editor.post(), first_items[1]),
                Position::head_of(second_items[0]),
            ));
        });

        assert_eq!(post.sections().len(), 1, "lists rejoined by cleanup");
        assert_eq!(post.sections()[0], first_list);
        assert_eq!(post.collection(Owner::List(first_list)).len(), 3);
    }

    // ============ deleteAtPosition ============

    #[test]
    fn test_delete_at_position_backward() {
        let mut post = Post::new();
        let section = paragraph(&mut post, "ab");

        let (position, _) = with_editor(&mut post, Range::blank(), |editor| {
            editor.delete_at_position(Position::new(section, 2), Direction::Backward)
        });

        assert_eq!(post.section_text(section), "a");
        assert_eq!(position, Position::new(section, 1));
    }

    #[test]
    fn test_delete_at_position_backward_over_surrogate_pair() {
        let mut post = Post::new();
        let section = paragraph(&mut post, "a\u{1F600}");

        with_editor(&mut post, Range::blank(), |editor| {
            editor.delete_at_position(Position::new(section, 3), Direction::Backward)
        });

        assert_eq!(post.section_text(section), "a", "whole pair removed");
    }

    #[test]
    fn test_delete_at_section_head_joins_with_previous() {
        let mut post = Post::new();
        let first = paragraph(&mut post, "ab");
        let second = paragraph(&mut post, "cd");

        let (position, _) = with_editor(&mut post, Range::blank(), |editor| {
            editor.delete_at_position(Position::head_of(second), Direction::Backward)
        });

        assert_eq!(post.sections().len(), 1);
        assert_eq!(post.section_text(first), "abcd");
        assert_eq!(position, Position::new(first, 2));
    }

    #[test]
    fn test_delete_at_section_head_removes_previous_card() {
        let mut post = Post::new();
        let card = post.create_card_section("embed", Value::Null);
        post.append_section(Owner::TopLevel, card);
        let section = paragraph(&mut post, "text");

        with_editor(&mut post, Range::blank(), |editor| {
            editor.delete_at_position(Position::head_of(section), Direction::Backward)
        });

        assert!(!post.contains_section(card));
        assert_eq!(post.sections().len(), 1);
    }

    // ============ splitSection ============

    #[test]
    fn test_split_markup_section_in_middle() {
        let mut post = Post::new();
        let section = paragraph(&mut post, "ab");

        let ((first, second), _) = with_editor(&mut post, Range::blank(), |editor| {
            editor.split_section(Position::new(section, 1))
        });

        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(post.sections().len(), 2);
        assert_eq!(post.section(first).tag(), Some("p"));
        assert_eq!(post.section_text(first), "a");
        assert_eq!(post.section(second).tag(), Some("p"));
        assert_eq!(post.section_text(second), "b");
        assert!(!post.contains_section(section), "original is replaced");
    }

    #[test]
    fn test_split_card_at_each_edge() {
        let mut post = Post::new();
        let card = post.create_card_section("embed", Value::Null);
        post.append_section(Owner::TopLevel, card);

        let ((before, _), _) = with_editor(&mut post, Range::blank(), |editor| {
            editor.split_section(Position::new(card, 0))
        });
        let before = before.unwrap();
        assert_eq!(post.sections(), &[before, card]);
        assert!(post.section_is_blank(before));

        let ((_, after), _) = with_editor(&mut post, Range::blank(), |editor| {
            editor.split_section(Position::new(card, 1))
        });
        let after = after.unwrap();
        assert_eq!(post.sections(), &[before, card, after]);
    }

    #[test]
    #[should_panic(expected = "cannot split a card section at offset")]
    fn test_split_card_at_invalid_offset_is_fatal() {
        let mut post = Post::new();
        let card = post.create_card_section("embed", Value::Null);
        post.append_section(Owner::TopLevel, card);

        with_editor(&mut post, Range::blank(), |editor| {
            editor.split_section(Position::new(card, 2))
        });
    }

    #[test]
    fn test_split_trailing_blank_list_item_becomes_paragraph() {
        let mut post = Post::new();
        let (list_id, items) = list(&mut post, "ul", &["x", ""]);

        let ((first, second), _) = with_editor(&mut post, Range::blank(), |editor| {
            editor.split_section(Position::head_of(items[1]))
        });

        assert!(first.is_none());
        let blank = second.unwrap();
        assert_eq!(post.sections(), &[list_id, blank]);
        assert_eq!(post.section(blank).tag(), Some("p"));
        assert!(post.section_is_blank(blank));
        assert_eq!(
            post.collection(Owner::List(list_id)).len(),
            1,
            "the blank item is gone"
        );
    }

    #[test]
    fn test_split_list_item_in_middle_yields_two_items() {
        let mut post = Post::new();
        let (_, items) = list(&mut post, "ul", &["ab", "cd"]);

        let ((first, second), _) = with_editor(&mut post, Range::blank(), |editor| {
            editor.split_section(Position::new(items[0], 1))
        });

        // After cleanup the pre/mid/post fragments have rejoined into one
        // list with the item split in two.
        assert_eq!(post.sections().len(), 1);
        let list_id = post.sections()[0];
        let final_items = post.collection(Owner::List(list_id)).clone();
        assert_eq!(final_items.len(), 3);
        assert_eq!(post.section_text(final_items[0]), "a");
        assert_eq!(post.section_text(final_items[1]), "b");
        assert_eq!(post.section_text(final_items[2]), "cd");
        assert_eq!(final_items[0], first.unwrap());
        assert_eq!(final_items[1], second.unwrap());
    }

    // ============ insertMarkers / insertText ============

    #[test]
    fn test_insert_markers_into_blank_post_creates_default_section() {
        let mut post = Post::new();

        let (position, _) = with_editor(&mut post, Range::blank(), |editor| {
            editor.insert_markers(
                Position::Blank,
                vec![Inline::Marker(Marker::new("ab", vec![]))],
            )
        });

        assert_eq!(post.sections().len(), 1);
        let section = post.sections()[0];
        assert_eq!(post.section(section).tag(), Some("p"));
        assert_eq!(post.section_text(section), "ab");
        assert_eq!(position, Position::new(section, 2));
    }

    #[test]
    fn test_insert_markers_mid_marker_splits_and_coalesces() {
        let mut post = Post::new();
        let section = paragraph(&mut post, "ad");

        let (position, range) = with_editor(&mut post, Range::blank(), |editor| {
            editor.insert_markers(
                Position::new(section, 1),
                vec![Inline::Marker(Marker::new("bc", vec![]))],
            )
        });

        assert_eq!(post.section_text(section), "abcd");
        let markers = post.section(section).markers().unwrap();
        assert_eq!(markers.len(), 1, "identical markers coalesce back");
        assert_eq!(position, Position::new(section, 3));
        assert_eq!(range.head, position, "range scheduled at insertion end");
    }

    #[test]
    #[should_panic(expected = "non-markerable")]
    fn test_insert_markers_into_card_is_fatal() {
        let mut post = Post::new();
        let card = post.create_card_section("embed", Value::Null);
        post.append_section(Owner::TopLevel, card);

        with_editor(&mut post, Range::blank(), |editor| {
            editor.insert_markers(
                Position::new(card, 0),
                vec![Inline::Marker(Marker::new("x", vec![]))],
            )
        });
    }

    #[test]
    fn test_insert_text_inherits_markups_at_position() {
        let mut post = Post::new();
        let bold = post.markup("b");
        let section = post.create_markup_section("p");
        let marker = post.create_marker("bold", vec![bold.clone()]);
        post.append_inline(section, marker);
        post.append_section(Owner::TopLevel, section);

        with_editor(&mut post, Range::blank(), |editor| {
            editor.insert_text(Position::new(section, 2), "!!")
        });

        assert_eq!(post.section_text(section), "bo!!ld");
        let markers = post.section(section).markers().unwrap();
        assert_eq!(markers.len(), 1, "same-markup runs stay one marker");
        assert_eq!(post.inline(markers[0]).markups(), &[bold]);
    }

    // ============ toggleSection ============

    #[test]
    fn test_toggle_section_sets_and_resets_tag() {
        let mut post = Post::new();
        let section = paragraph(&mut post, "title");
        let range = Range::collapsed(Position::new(section, 0));

        with_editor(&mut post, Range::blank(), |editor| {
            editor.toggle_section("h2", range)
        });
        assert_eq!(post.section(section).tag(), Some("h2"));

        with_editor(&mut post, Range::blank(), |editor| {
            editor.toggle_section("h2", range)
        });
        assert_eq!(post.section(section).tag(), Some("p"), "toggling back resets to default");
    }

    #[test]
    fn test_toggle_only_list_item_to_paragraph_removes_list() {
        let mut post = Post::new();
        let (list_id, items) = list(&mut post, "ul", &["x"]);
        let range = Range::collapsed(Position::new(items[0], 0));

        with_editor(&mut post, Range::blank(), |editor| {
            editor.toggle_section("p", range)
        });

        assert_eq!(post.sections().len(), 1);
        let only = post.sections()[0];
        assert_eq!(post.section(only).tag(), Some("p"));
        assert_eq!(post.section_text(only), "x");
        assert!(!post.contains_section(list_id), "emptied list removed");
    }

    #[test]
    fn test_toggle_paragraph_to_list() {
        let mut post = Post::new();
        let section = paragraph(&mut post, "item");
        let range = Range::collapsed(Position::new(section, 0));

        with_editor(&mut post, Range::blank(), |editor| {
            editor.toggle_section("ul", range)
        });

        assert_eq!(post.sections().len(), 1);
        let list_id = post.sections()[0];
        assert_eq!(post.section(list_id).tag(), Some("ul"));
        let items = post.collection(Owner::List(list_id)).clone();
        assert_eq!(items.len(), 1);
        assert_eq!(post.section_text(items[0]), "item");
    }

    #[test]
    fn test_toggle_middle_list_item_splits_list_around_it() {
        let mut post = Post::new();
        let (_, items) = list(&mut post, "ul", &["a", "b", "c"]);
        let range = Range::collapsed(Position::new(items[1], 0));

        with_editor(&mut post, Range::blank(), |editor| {
            editor.toggle_section("p", range)
        });

        assert_eq!(post.sections().len(), 3, "list split around the converted item");
        let tags: Vec<_> = post
            .sections()
            .iter()
            .map(|s| post.section(*s).tag().unwrap().to_string())
            .collect();
        assert_eq!(tags, vec!["ul", "p", "ul"]);
        assert_eq!(post.section_text(post.sections()[1]), "b");
    }

    // ============ Markup application ============

    #[test]
    fn test_add_markup_to_range_splits_at_boundaries() {
        let mut post = Post::new();
        let bold = post.markup("b");
        let section = paragraph(&mut post, "hello");
        let range = Range::new(Position::new(section, 1), Position::new(section, 4));

        with_editor(&mut post, Range::blank(), |editor| {
            editor.add_markup_to_range(range, &bold)
        });

        let markers = post.section(section).markers().unwrap().clone();
        assert_eq!(markers.len(), 3);
        assert_eq!(post.inline(markers[0]).text(), "h");
        assert!(post.inline(markers[0]).markups().is_empty());
        assert_eq!(post.inline(markers[1]).text(), "ell");
        assert_eq!(post.inline(markers[1]).markups(), &[bold]);
        assert_eq!(post.inline(markers[2]).text(), "o");
        assert!(post.inline(markers[2]).markups().is_empty());
    }

    #[test]
    fn test_add_markup_uses_common_interior_depth() {
        // "a[b]c" where b is italic; adding bold across all three should
        // insert bold beneath the italic, not on top of it, to avoid
        // open/close churn at render time.
        let mut post = Post::new();
        let italic = post.markup("i");
        let bold = post.markup("b");
        let section = post.create_markup_section("p");
        for (text, markups) in [("a", vec![]), ("b", vec![italic.clone()]), ("c", vec![])] {
            let marker = post.create_marker(text, markups);
            post.append_inline(section, marker);
        }
        post.append_section(Owner::TopLevel, section);
        let range = Range::new(Position::new(section, 0), Position::new(section, 3));

        with_editor(&mut post, Range::blank(), |editor| {
            editor.add_markup_to_range(range, &bold)
        });

        let markers = post.section(section).markers().unwrap().clone();
        // No marker shares a full stack, so nothing coalesces; each has
        // bold at depth 0.
        for iid in &markers {
            assert_eq!(post.inline(*iid).markups()[0], bold);
        }
        let middle = post
            .inline(markers[1]).markups().to_vec();
        assert_eq!(middle, vec![bold, italic], "bold inserted below italic");
    }

    #[test]
    fn test_remove_markup_from_range() {
        let mut post = Post::new();
        let bold = post.markup("b");
        let section = post.create_markup_section("p");
        let marker = post.create_marker("bold text", vec![bold.clone()]);
        post.append_inline(section, marker);
        post.append_section(Owner::TopLevel, section);
        let range = Range::new(Position::new(section, 0), Position::new(section, 4));

        with_editor(&mut post, Range::blank(), |editor| {
            editor.remove_markup_from_range(range, &bold)
        });

        let markers = post.section(section).markers().unwrap().clone();
        assert_eq!(markers.len(), 2);
        assert!(post.inline(markers[0]).markups().is_empty());
        assert_eq!(post.inline(markers[1]).markups(), &[bold]);
    }

    #[test]
    fn test_toggle_markup_round_trip_restores_plain_markers() {
        let mut post = Post::new();
        let bold = post.markup("b");
        let section = paragraph(&mut post, "hello");
        let range = Range::new(Position::new(section, 0), Position::new(section, 5));

        with_editor(&mut post, Range::blank(), |editor| {
            editor.toggle_markup(range, &bold)
        });
        let markers = post.section(section).markers().unwrap().clone();
        assert_eq!(markers.len(), 1);
        assert_eq!(post.inline(markers[0]).markups(), &[bold.clone()]);

        with_editor(&mut post, Range::blank(), |editor| {
            editor.toggle_markup(range, &bold)
        });
        let markers = post.section(section).markers().unwrap().clone();
        assert_eq!(markers.len(), 1, "coalesced back to one plain marker");
        assert_eq!(post.section_text(section), "hello");
        assert!(post.inline(markers[0]).markups().is_empty());
    }

    // ============ Attributes ============

    #[test]
    fn test_set_attribute_on_range_targets_list_of_item() {
        let mut post = Post::new();
        let section = paragraph(&mut post, "a");
        let (list_id, items) = list(&mut post, "ul", &["x"]);
        let range = Range::new(Position::new(section, 0), Position::new(items[0], 1));

        with_editor(&mut post, Range::blank(), |editor| {
            editor.set_attribute(range, "data-text-align", "center")
        });

        assert_eq!(
            post.section(section).attributes().unwrap(),
            &vec![("data-text-align".to_string(), "center".to_string())]
        );
        assert_eq!(
            post.section(list_id).attributes().unwrap().len(),
            1,
            "list item delegates to its list"
        );
    }
}
