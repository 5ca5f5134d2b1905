pub mod codec;
pub mod cursor;
pub mod editor;
pub mod history;
pub mod model;
pub mod render;

// Re-export key types for easier usage
pub use codec::{CodecError, DocumentValue};
pub use cursor::{Direction, Position, Range};
pub use editor::{EditAction, Editor, EditorOptions, PostEditor};
pub use history::{EditHistory, Snapshot};
pub use model::{
    Atom, CardMode, Inline, InlineId, Marker, Markup, Owner, Post, Section, SectionId,
    SectionKind,
};
pub use render::{
    AtomDescriptor, AtomRegistry, CardDescriptor, CardRegistry, MutationKind, MutationRecord,
    NodeSpec, NodeTag, OutputDom, ReparseDecision, SimpleDom, SimpleNodeId,
};
