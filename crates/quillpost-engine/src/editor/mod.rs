/*!
 * # Editor shell
 *
 * The lifecycle-scoped owner of one document: the [`Editor`] holds the
 * post, the render tree, the edit history, the card/atom registries and the
 * current selection range. All mutation flows through [`Editor::run`],
 * which wraps exactly one [`PostEditor`] transaction: store the pending
 * history snapshot, apply the operations, run the deferred queues and
 * reconcile the output tree. No ambient global state anywhere; two
 * transactions can never be open at once because `run` holds the only
 * mutable borrow.
 */

pub mod inserter;
pub mod post_editor;

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde_json::Value;

use crate::codec::{self, DocumentValue};
use crate::cursor::Range;
use crate::history::{self, EditHistory, Snapshot};
use crate::model::{CardMode, Post, SectionId, SectionKind};
use crate::render::card::{AtomRegistry, CardRegistry};
use crate::render::reconciler::reconcile;
use crate::render::{
    decide_reparse, MutationRecord, OutputDom, RenderTree, ReparseDecision,
};

pub use crate::history::EditAction;
pub use post_editor::PostEditor;

/// Tunables for one editor instance.
#[derive(Debug, Clone)]
pub struct EditorOptions {
    /// Capacity of the undo/redo ring buffers.
    pub undo_depth: usize,
    /// Snapshots sharing an edit action within this window collapse into a
    /// single undo step.
    pub undo_grouping_ms: u64,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            undo_depth: 100,
            undo_grouping_ms: 5000,
        }
    }
}

/// One editing surface over one document.
pub struct Editor<D: OutputDom> {
    post: Post,
    render: RenderTree<D::Handle>,
    history: EditHistory,
    cards: CardRegistry,
    atoms: AtomRegistry,
    range: Range,
    render_root: Option<D::Handle>,
}

impl<D: OutputDom> Editor<D> {
    pub fn new(options: EditorOptions) -> Self {
        Self {
            post: Post::new(),
            render: RenderTree::new(),
            history: EditHistory::new(options.undo_depth, options.undo_grouping_ms),
            cards: CardRegistry::new(),
            atoms: AtomRegistry::new(),
            range: Range::blank(),
            render_root: None,
        }
    }

    /// Build an editor over a previously serialized document.
    pub fn from_document(value: &DocumentValue, options: EditorOptions) -> anyhow::Result<Self> {
        let post = codec::parse(value).context("failed to parse document")?;
        let mut editor = Self::new(options);
        editor.range = Range::collapsed(post.head_position());
        editor.post = post;
        Ok(editor)
    }

    pub fn post(&self) -> &Post {
        &self.post
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub fn set_range(&mut self, range: Range) {
        self.range = range;
    }

    pub fn render_tree(&self) -> &RenderTree<D::Handle> {
        &self.render
    }

    pub fn cards_mut(&mut self) -> &mut CardRegistry {
        &mut self.cards
    }

    pub fn atoms_mut(&mut self) -> &mut AtomRegistry {
        &mut self.atoms
    }

    pub fn has_rendered(&self) -> bool {
        self.render_root.is_some()
    }

    pub fn serialize(&self) -> DocumentValue {
        codec::serialize(&self.post)
    }

    // ============ Rendering ============

    /// Initial realization of the document into a host-provided root
    /// element. Subsequent syncs happen inside `run` or via `rerender`.
    pub fn render(&mut self, dom: &mut D, root: D::Handle) {
        self.render_root = Some(root);
        reconcile(&self.post, &mut self.render, dom, root, &self.cards, &self.atoms);
    }

    pub fn rerender(&mut self, dom: &mut D) {
        let root = self
            .render_root
            .expect("editor has not been rendered into an output tree");
        reconcile(&self.post, &mut self.render, dom, root, &self.cards, &self.atoms);
    }

    // ============ Transactions ============

    /// Run one untagged transaction.
    pub fn run<R>(&mut self, dom: &mut D, f: impl FnOnce(&mut PostEditor<'_, D>) -> R) -> R {
        self.run_with_action(dom, None, f)
    }

    /// Run one transaction, tagging its pre-edit snapshot so consecutive
    /// same-tag transactions group into a single undo step.
    pub fn run_with_action<R>(
        &mut self,
        dom: &mut D,
        action: Option<EditAction>,
        f: impl FnOnce(&mut PostEditor<'_, D>) -> R,
    ) -> R {
        let snapshot = self.take_snapshot(now_ms(), action);
        self.history.store_snapshot(snapshot);
        self.run_internal(dom, f)
    }

    /// The transaction machinery without history bookkeeping (used by
    /// undo/redo restoration itself).
    fn run_internal<R>(&mut self, dom: &mut D, f: impl FnOnce(&mut PostEditor<'_, D>) -> R) -> R {
        let Self {
            post,
            render,
            history,
            cards,
            atoms,
            range,
            render_root,
        } = self;
        let mut editor = PostEditor::new(post, render, *range);
        let result = f(&mut editor);
        let (new_range, cancelled) = editor.complete(dom, *render_root, cards, atoms);
        *range = new_range;
        if cancelled {
            history.cancel_pending();
        }
        result
    }

    fn take_snapshot(&self, now_ms: u64, action: Option<EditAction>) -> Snapshot {
        Snapshot {
            taken_at_ms: now_ms,
            document: codec::serialize(&self.post),
            range: history::capture_range(&self.post, &self.range),
            action,
        }
    }

    // ============ Undo / redo ============

    pub fn undo(&mut self, dom: &mut D) {
        self.undo_at(dom, now_ms());
    }

    pub fn undo_at(&mut self, dom: &mut D, now_ms: u64) {
        let current = self.take_snapshot(now_ms, None);
        let Some(snapshot) = self.history.step_backward(current) else {
            return;
        };
        self.restore_snapshot(dom, snapshot);
    }

    pub fn redo(&mut self, dom: &mut D) {
        self.redo_at(dom, now_ms());
    }

    pub fn redo_at(&mut self, dom: &mut D, now_ms: u64) {
        let current = self.take_snapshot(now_ms, None);
        let Some(snapshot) = self.history.step_forward(current) else {
            return;
        };
        self.restore_snapshot(dom, snapshot);
    }

    fn restore_snapshot(&mut self, dom: &mut D, snapshot: Snapshot) {
        let restored =
            codec::parse(&snapshot.document).expect("history snapshots always parse back");
        self.run_internal(dom, |editor| {
            editor.migrate_sections_from_post(&restored);
        });
        self.range = match snapshot.range {
            Some(captured) => history::restore_range(&self.post, &captured),
            None if self.post.is_blank() => Range::blank(),
            None => Range::collapsed(self.post.head_position()),
        };
    }

    // ============ External mutation ============

    /// Resolve a batch of external output-tree mutations into a reparse
    /// decision the host must honor before the next transaction.
    pub fn notify_external_mutation(
        &self,
        dom: &D,
        batch: &[MutationRecord<D::Handle>],
    ) -> ReparseDecision {
        decide_reparse(dom, &self.render, batch)
    }

    // ============ Cards ============

    /// Switch a card between display and edit mode. Not an undoable edit.
    pub fn set_card_mode(&mut self, dom: &mut D, section: SectionId, mode: CardMode) {
        self.run_internal(dom, |editor| {
            let SectionKind::Card(card) = &mut editor.post.section_mut(section).kind else {
                panic!("set_card_mode called on a non-card section");
            };
            card.mode = mode;
            editor.mark_section_dirty(section);
        });
    }

    /// Replace a card's payload (the registry context's save callback).
    pub fn update_card_payload(&mut self, dom: &mut D, section: SectionId, payload: Value) {
        self.run_with_action(dom, None, |editor| {
            let SectionKind::Card(card) = &mut editor.post.section_mut(section).kind else {
                panic!("update_card_payload called on a non-card section");
            };
            card.payload = payload;
            editor.mark_section_dirty(section);
        });
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
