/*!
 * # Render Tree / Reconciler
 *
 * Keeps a separately-owned output tree synchronized with the document
 * through dirty tracking. Every rendered model node gets a [`RenderNode`]
 * linking it to its output node; mutations dirty the node and its
 * ancestors, and a reconciliation pass walks only dirty nodes, tearing down
 * scheduled removals first and realizing each node kind against the
 * abstract [`OutputDom`] contract.
 *
 * Output nodes carry an opaque [`NodeTag`] identity so external events on
 * the output tree can be resolved back to the owning model node (see
 * [`decide_reparse`]).
 */

pub mod card;
pub mod mutation;
pub mod output;
pub(crate) mod reconciler;
pub mod simple_dom;
pub mod tree;

pub use card::{AtomContext, AtomDescriptor, AtomRegistry, CardContext, CardDescriptor, CardRegistry};
pub use mutation::{decide_reparse, MutationKind, MutationRecord, ReparseDecision};
pub use output::{NodeSpec, NodeTag, OutputDom};
pub use simple_dom::{SimpleDom, SimpleNodeId};
pub use tree::{ModelRef, RenderId, RenderNode, RenderTree};
