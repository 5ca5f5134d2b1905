use crate::model::SectionId;
use crate::render::output::OutputDom;
use crate::render::tree::{ModelRef, RenderTree};

/// What an external actor did to an output node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    CharacterData,
    Attributes,
}

/// One externally-observed output-tree mutation.
#[derive(Debug, Clone, Copy)]
pub struct MutationRecord<H> {
    pub target: H,
    pub kind: MutationKind,
}

/// The core's answer to a batch of external mutations: which parts of the
/// document the host must re-parse before the next transaction. Never
/// partial: either named sections or the whole document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReparseDecision {
    None,
    Sections(Vec<SectionId>),
    FullDocument,
}

/// Resolve a batch of external output-tree mutations to the owning model
/// sections by walking each target up through its output parents until a
/// tagged node is found in the side table. Anything that cannot be resolved
/// to a section escalates to a full-document reparse.
pub fn decide_reparse<D: OutputDom>(
    dom: &D,
    tree: &RenderTree<D::Handle>,
    batch: &[MutationRecord<D::Handle>],
) -> ReparseDecision {
    if batch.is_empty() {
        return ReparseDecision::None;
    }

    let mut sections: Vec<SectionId> = Vec::new();
    for record in batch {
        let mut handle = Some(record.target);
        let mut resolved = None;
        while let Some(current) = handle {
            if let Some(tag) = dom.tag_of(current) {
                if let Some(render_id) = tree.resolve_tag(tag) {
                    resolved = Some(render_id);
                    break;
                }
            }
            handle = dom.parent(current);
        }

        let Some(mut render_id) = resolved else {
            return ReparseDecision::FullDocument;
        };

        // Walk up to the nearest section render node.
        let section = loop {
            match tree.node(render_id).model {
                ModelRef::Section(sid) => break Some(sid),
                ModelRef::Post => break None,
                ModelRef::Inline(_) => match tree.node(render_id).parent {
                    Some(parent) => render_id = parent,
                    None => break None,
                },
            }
        };

        match section {
            Some(sid) => {
                if !sections.contains(&sid) {
                    sections.push(sid);
                }
            }
            // A mutation at the document root cannot be attributed.
            None => return ReparseDecision::FullDocument,
        }
    }

    ReparseDecision::Sections(sections)
}
