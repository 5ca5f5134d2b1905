/*!
 * # Document Model
 *
 * The canonical tree behind the editor: a [`Post`] owning an ordered list of
 * block-level [`Section`]s, which in turn own inline [`Marker`]/[`Atom`] runs
 * carrying ordered [`Markup`] stacks.
 *
 * All nodes live in arenas owned by the `Post` and are addressed by stable
 * [`SectionId`]/[`InlineId`] handles. Every node records its owning
 * collection; inserting a node that is already owned elsewhere is a fatal
 * assertion, never a silent reparent.
 *
 * Markups are interned: structurally identical markups are pointer-equal,
 * which is what every "same markup" merge/nesting check relies on.
 */

pub mod markup;
pub mod post;
pub mod section;

pub use markup::{Markup, MarkupInterner, DEFAULT_MARKUP_SECTION_TAG};
pub use post::{InlineId, Owner, Post, SectionId};
pub use section::{
    Atom, CardMode, CardSection, ImageSection, Inline, InlineNode, ListItem, ListSection, Marker,
    MarkupSection, Section, SectionKind,
};
