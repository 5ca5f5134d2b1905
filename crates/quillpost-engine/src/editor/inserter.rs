//! Insertion of a whole foreign document at a cursor position.
//!
//! A single-pass visitor walks the foreign post's sections while tracking a
//! cursor section. Markerable content merges into the cursor section only
//! until the first leaf has been inserted; afterwards content always creates
//! new sections. Non-markerable leaves force a line break at the cursor
//! unless the cursor section is already blank. List items are unwrapped or
//! rewrapped depending on whether the insertion point is itself nested, and
//! breaking out of a list splits it at the cursor with a blank paragraph
//! between the halves.

use crate::cursor::{Position, Range};
use crate::editor::post_editor::PostEditor;
use crate::model::{InlineId, Owner, Post, SectionId, SectionKind};
use crate::render::OutputDom;

struct InsertState {
    cursor: Position,
    has_inserted_first_leaf_section: bool,
    /// The list section the previous foreign list item was rewrapped into,
    /// so consecutive items land in one list.
    current_list: Option<SectionId>,
}

impl<'a, D: OutputDom> PostEditor<'a, D> {
    /// Merge a foreign document into this one at a position. Returns the
    /// position after the last inserted content.
    pub fn insert_post(&mut self, position: Position, foreign: &Post) -> Position {
        if foreign.is_blank() {
            return position;
        }
        let mut position = position;
        if position.is_blank() {
            assert!(
                self.post.is_blank(),
                "cannot insert at a blank position in a non-empty document"
            );
            position = self.ensure_default_section();
        }

        let mut state = InsertState {
            cursor: position,
            has_inserted_first_leaf_section: false,
            current_list: None,
        };
        for sid in foreign.sections().to_vec() {
            match &foreign.section(sid).kind {
                SectionKind::Markup(_) => self.insert_foreign_markerable(&mut state, foreign, sid),
                SectionKind::List(list) => {
                    let tag = list.tag.clone();
                    for item in list.items.clone() {
                        self.insert_foreign_list_item(&mut state, foreign, item, &tag);
                    }
                }
                SectionKind::Image(_) | SectionKind::Card(_) => {
                    self.insert_foreign_leaf(&mut state, foreign, sid)
                }
                SectionKind::ListItem(_) => unreachable!("list items are never top-level"),
            }
        }

        self.schedule_list_cleanup();
        self.schedule_range(Range::collapsed(state.cursor));
        state.cursor
    }

    fn insert_foreign_markerable(
        &mut self,
        state: &mut InsertState,
        foreign: &Post,
        foreign_section: SectionId,
    ) {
        state.current_list = None;
        let cursor_section = state.cursor.section().expect("cursor is blank");

        if !state.has_inserted_first_leaf_section && self.post.is_markerable(cursor_section) {
            self.merge_foreign_markerable(state, foreign, foreign_section);
            state.has_inserted_first_leaf_section = true;
            return;
        }

        if self.post.section(cursor_section).is_list_item() {
            self.break_out_of_list(state);
            // The cursor now sits on the blank paragraph between the list
            // halves; give it the foreign tag and merge into it.
            let blank = state.cursor.section().expect("cursor is blank");
            let tag = foreign
                .section(foreign_section)
                .tag()
                .expect("markup section has a tag")
                .to_string();
            if let SectionKind::Markup(section) = &mut self.post.section_mut(blank).kind {
                section.tag = tag;
            }
            self.mark_section_dirty(blank);
            self.merge_foreign_markerable(state, foreign, foreign_section);
            state.has_inserted_first_leaf_section = true;
            return;
        }

        let adopted = self.post.adopt_section(foreign, foreign_section);
        self.insert_section_at_cursor(state, adopted);
        state.cursor = Position::tail_of(self.post, adopted);
        state.has_inserted_first_leaf_section = true;
    }

    fn insert_foreign_list_item(
        &mut self,
        state: &mut InsertState,
        foreign: &Post,
        foreign_item: SectionId,
        list_tag: &str,
    ) {
        let cursor_section = state.cursor.section().expect("cursor is blank");
        let nested = self.post.section(cursor_section).is_list_item();

        if !state.has_inserted_first_leaf_section && self.post.is_markerable(cursor_section) {
            // First leaf: unwrap the item and merge its content.
            self.merge_foreign_markerable(state, foreign, foreign_item);
            state.has_inserted_first_leaf_section = true;
            return;
        }

        if nested {
            // Insert as a sibling item after the cursor item.
            let Some(Owner::List(list)) = self.post.section(cursor_section).owner() else {
                panic!("list item has no owning list");
            };
            let adopted = self.post.adopt_section(foreign, foreign_item);
            let next = self.next_in_collection(cursor_section);
            self.insert_section_before_marked(Owner::List(list), adopted, next);
            state.cursor = Position::tail_of(self.post, adopted);
            state.has_inserted_first_leaf_section = true;
            return;
        }

        // Not nested: rewrap into a list section at the cursor.
        let list = match state.current_list {
            Some(list)
                if self.post.contains_section(list)
                    && self.post.section(list).tag() == Some(list_tag) =>
            {
                list
            }
            _ => {
                let list = self.post.create_list_section(list_tag);
                self.insert_section_at_cursor(state, list);
                state.current_list = Some(list);
                list
            }
        };
        let adopted = self.post.adopt_section(foreign, foreign_item);
        self.post.append_section(Owner::List(list), adopted);
        self.mark_section_dirty(list);
        state.cursor = Position::tail_of(self.post, adopted);
        state.has_inserted_first_leaf_section = true;
    }

    fn insert_foreign_leaf(
        &mut self,
        state: &mut InsertState,
        foreign: &Post,
        foreign_section: SectionId,
    ) {
        state.current_list = None;
        let cursor_section = state.cursor.section().expect("cursor is blank");
        if self.post.section(cursor_section).is_list_item() {
            self.break_out_of_list(state);
        }

        let adopted = self.post.adopt_section(foreign, foreign_section);
        self.insert_section_at_cursor(state, adopted);
        state.cursor = Position::tail_of(self.post, adopted);
        state.has_inserted_first_leaf_section = true;
    }

    /// Splice adopted copies of a foreign markerable's inlines into the
    /// cursor section at the cursor offset.
    fn merge_foreign_markerable(
        &mut self,
        state: &mut InsertState,
        foreign: &Post,
        foreign_section: SectionId,
    ) {
        let section = state.cursor.section().expect("cursor is blank");
        let offset = state.cursor.offset();
        let foreign_markers = foreign
            .section(foreign_section)
            .markers()
            .expect("foreign section is not markerable")
            .clone();
        let adopted: Vec<InlineId> = foreign_markers
            .iter()
            .map(|iid| self.post.adopt_inline(foreign, *iid))
            .collect();
        let total: usize = adopted
            .iter()
            .map(|iid| self.post.inline(*iid).length())
            .sum();

        self.split_marker_at(section, offset);
        let boundary = self.marker_boundary_index(section, offset);
        for (index, iid) in adopted.into_iter().enumerate() {
            self.post.insert_inline_at(section, boundary + index, iid);
        }
        self.coalesce_markers(section);
        self.mark_section_dirty(section);
        state.cursor = Position::new(section, offset + total);
    }

    /// Insert a top-level section at the cursor: replacing the cursor
    /// section when it is blank, after it at its tail, before it at its
    /// head, and between the split halves anywhere in the middle.
    fn insert_section_at_cursor(&mut self, state: &mut InsertState, new_section: SectionId) {
        let cursor_section = state.cursor.section().expect("cursor is blank");
        let owner = self
            .post
            .section(cursor_section)
            .owner()
            .expect("cursor section is detached");
        assert!(
            owner == Owner::TopLevel,
            "cursor must be outside any list when inserting a top-level section"
        );

        if self.post.is_markerable(cursor_section) && self.post.section_is_blank(cursor_section) {
            self.insert_section_before_marked(owner, new_section, Some(cursor_section));
            self.remove_section(cursor_section);
            return;
        }
        if state.cursor.is_tail_of_section(self.post) {
            let next = self.next_in_collection(cursor_section);
            self.insert_section_before_marked(owner, new_section, next);
            return;
        }
        if state.cursor.is_head_of_section() {
            self.insert_section_before_marked(owner, new_section, Some(cursor_section));
            return;
        }
        let (_, second) = self.split_section(state.cursor);
        let second = second.expect("mid-section split produced no second half");
        let owner = self
            .post
            .section(second)
            .owner()
            .expect("split half is detached");
        self.insert_section_before_marked(owner, new_section, Some(second));
    }

    /// Split the list containing the cursor and put a blank paragraph
    /// between the halves, leaving the cursor on the blank paragraph. At
    /// the very head or tail of the list no split is needed.
    fn break_out_of_list(&mut self, state: &mut InsertState) {
        let item = state.cursor.section().expect("cursor is blank");
        let Some(Owner::List(list)) = self.post.section(item).owner() else {
            return;
        };
        let list_owner = self
            .post
            .section(list)
            .owner()
            .expect("list section has no owner");
        let offset = state.cursor.offset();
        let items = self.post.collection(Owner::List(list)).clone();
        let item_index = items
            .iter()
            .position(|s| *s == item)
            .expect("cursor item is not in its list");
        let at_list_head = item_index == 0 && offset == 0;
        let at_list_tail =
            item_index == items.len() - 1 && offset == self.post.section_length(item);

        let blank = self.post.create_default_markup_section();
        if at_list_head {
            self.insert_section_before_marked(list_owner, blank, Some(list));
        } else if at_list_tail {
            let next = self.next_in_collection(list);
            self.insert_section_before_marked(list_owner, blank, next);
        } else {
            // Which item starts the second half?
            let boundary = if offset == 0 {
                item
            } else if offset == self.post.section_length(item) {
                items[item_index + 1]
            } else {
                let (_, post_half) = self.split_list_item(item, offset);
                post_half
            };
            let tag = self
                .post
                .section(list)
                .tag()
                .expect("list section has a tag")
                .to_string();
            let second = self.post.create_list_section(&tag);
            let remaining = self.post.collection(Owner::List(list)).clone();
            let boundary_index = remaining
                .iter()
                .position(|s| *s == boundary)
                .expect("boundary item is not in the list");
            for moved in &remaining[boundary_index..] {
                self.post.detach_section(*moved);
                self.post.append_section(Owner::List(second), *moved);
            }
            let next = self.next_in_collection(list);
            self.insert_section_before_marked(list_owner, blank, next);
            self.insert_section_before_marked(list_owner, second, next);
            self.mark_section_dirty(list);
        }
        self.schedule_list_cleanup();
        state.cursor = Position::head_of(blank);
    }
}
