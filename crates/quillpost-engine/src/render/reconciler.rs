use std::collections::HashMap;

use log::trace;

use crate::model::markup::VALID_SECTION_ATTRIBUTES;
use crate::model::{Inline, Markup, Post, SectionId, SectionKind};
use crate::render::card::{AtomContext, AtomRegistry, CardContext, CardRegistry};
use crate::render::output::{NodeSpec, NodeTag, OutputDom};
use crate::render::tree::{ModelRef, RenderId, RenderTree};

/// One full reconciliation pass: tear down everything scheduled for removal
/// (children before parents), then walk dirty render nodes realizing each
/// against the output tree, marking them clean as they complete.
pub(crate) fn reconcile<D: OutputDom>(
    post: &Post,
    tree: &mut RenderTree<D::Handle>,
    dom: &mut D,
    root_el: D::Handle,
    cards: &CardRegistry,
    atoms: &AtomRegistry,
) {
    process_removals(tree, dom);

    let root = tree.ensure_root();
    if tree.node(root).output != Some(root_el) {
        let tag = NodeTag::fresh();
        dom.assign_tag(root_el, tag);
        tree.register_tag(tag, root);
        let node = tree.node_mut(root);
        node.output = Some(root_el);
        node.tag = Some(tag);
        node.dirty = true;
    }

    if tree.node(root).dirty {
        trace!("reconciling document root");
        sync_section_children(post, tree, dom, root, root_el, &post.sections().to_vec(), cards, atoms);
        tree.node_mut(root).dirty = false;
    }
}

fn process_removals<D: OutputDom>(tree: &mut RenderTree<D::Handle>, dom: &mut D) {
    for id in tree.take_removal_queue() {
        if tree.nodes.get(id).is_none() {
            continue;
        }
        trace!("destroying removed render node {id:?}");
        if let Some(out) = tree.node(id).output {
            if let Some(parent) = dom.parent(out) {
                dom.remove_child(parent, out);
            }
        }
        tree.destroy_subtree(id);
    }
}

/// Reconcile a parent render node's children against an ordered model
/// section list: reuse existing render nodes, create missing ones, destroy
/// stale ones, then attach outputs in model order.
#[allow(clippy::too_many_arguments)]
fn sync_section_children<D: OutputDom>(
    post: &Post,
    tree: &mut RenderTree<D::Handle>,
    dom: &mut D,
    parent_id: RenderId,
    parent_el: D::Handle,
    model_children: &[SectionId],
    cards: &CardRegistry,
    atoms: &AtomRegistry,
) {
    let mut existing: HashMap<ModelRef, RenderId> = tree
        .node(parent_id)
        .children
        .iter()
        .map(|c| (tree.node(*c).model, *c))
        .collect();

    let mut ordered = Vec::with_capacity(model_children.len());
    for sid in model_children {
        let model = ModelRef::Section(*sid);
        let id = existing
            .remove(&model)
            .unwrap_or_else(|| tree.create_node(parent_id, model));
        ordered.push(id);
    }

    // Anything left was removed from the model; tear it down now.
    for stale in existing.into_values() {
        if let Some(out) = tree.node(stale).output {
            if let Some(parent) = dom.parent(out) {
                dom.remove_child(parent, out);
            }
        }
        tree.destroy_subtree(stale);
    }

    tree.node_mut(parent_id).children = ordered.clone();

    for id in &ordered {
        if tree.node(*id).dirty {
            visit_section(post, tree, dom, *id, parent_el, cards, atoms);
        }
    }

    // Attach in model order, walking backwards so each node's reference
    // sibling is already in place.
    let mut reference: Option<D::Handle> = None;
    for id in ordered.iter().rev() {
        let out = tree
            .node(*id)
            .output
            .expect("rendered section has no output node");
        if dom.parent(out) != Some(parent_el) {
            dom.insert_before(parent_el, out, reference);
        }
        reference = Some(out);
    }
}

/// Realize one section against the output tree, dispatching on its kind.
fn visit_section<D: OutputDom>(
    post: &Post,
    tree: &mut RenderTree<D::Handle>,
    dom: &mut D,
    id: RenderId,
    parent_el: D::Handle,
    cards: &CardRegistry,
    atoms: &AtomRegistry,
) {
    let ModelRef::Section(sid) = tree.node(id).model else {
        panic!("visit_section called on a non-section render node");
    };
    match &post.section(sid).kind {
        SectionKind::Markup(s) => {
            let el = ensure_element(tree, dom, id, parent_el, &s.tag);
            sync_attributes(dom, el, &s.attributes);
            render_inline_children(post, tree, dom, id, el, &s.markers, atoms);
        }
        SectionKind::ListItem(s) => {
            let el = ensure_element(tree, dom, id, parent_el, "li");
            render_inline_children(post, tree, dom, id, el, &s.markers, atoms);
        }
        SectionKind::List(s) => {
            let el = ensure_element(tree, dom, id, parent_el, &s.tag);
            sync_attributes(dom, el, &s.attributes);
            let items = s.items.clone();
            sync_section_children(post, tree, dom, id, el, &items, cards, atoms);
        }
        SectionKind::Image(s) => {
            let el = ensure_element(tree, dom, id, parent_el, "img");
            match &s.src {
                Some(src) => dom.set_attribute(el, "src", src),
                None => dom.remove_attribute(el, "src"),
            }
        }
        SectionKind::Card(s) => {
            let el = ensure_element(tree, dom, id, parent_el, "div");
            dom.set_attribute(el, "data-card", &s.name);
            clear_owned_outputs(tree, dom, id, el);
            let spec = cards.resolve(&s.name).realize(&CardContext {
                payload: &s.payload,
                mode: s.mode,
            });
            let spec_root = materialize(dom, el, &spec);
            tree.node_mut(id).owned_outputs.push(spec_root);
        }
    }
    tree.node_mut(id).dirty = false;
}

/// Get the section's output element, reusing the existing one unless the
/// required tag changed, in which case it is replaced in place.
fn ensure_element<D: OutputDom>(
    tree: &mut RenderTree<D::Handle>,
    dom: &mut D,
    id: RenderId,
    parent_el: D::Handle,
    tag: &str,
) -> D::Handle {
    let (current, current_tag) = {
        let node = tree.node(id);
        (node.output, node.output_element_tag.clone())
    };
    match current {
        Some(out) if current_tag.as_deref() == Some(tag) => out,
        Some(old) => {
            trace!("replacing output element: {current_tag:?} -> {tag:?}");
            let new = dom.create_element(tag);
            tag_output(tree, dom, id, new);
            if dom.parent(old) == Some(parent_el) {
                dom.insert_before(parent_el, new, Some(old));
                dom.remove_child(parent_el, old);
            }
            let node = tree.node_mut(id);
            node.output = Some(new);
            node.output_element_tag = Some(tag.to_string());
            node.owned_outputs.clear();
            new
        }
        None => {
            let new = dom.create_element(tag);
            tag_output(tree, dom, id, new);
            let node = tree.node_mut(id);
            node.output = Some(new);
            node.output_element_tag = Some(tag.to_string());
            new
        }
    }
}

/// Mint an identity tag for an output node and register it in the side
/// table, replacing any previous registration for this render node.
fn tag_output<D: OutputDom>(
    tree: &mut RenderTree<D::Handle>,
    dom: &mut D,
    id: RenderId,
    handle: D::Handle,
) {
    if let Some(old) = tree.node(id).tag {
        tree.unregister_tag(old);
    }
    let tag = NodeTag::fresh();
    dom.assign_tag(handle, tag);
    tree.register_tag(tag, id);
    tree.node_mut(id).tag = Some(tag);
}

/// Sync the whitelisted attributes onto an element, removing stale ones.
fn sync_attributes<D: OutputDom>(dom: &mut D, el: D::Handle, attributes: &[(String, String)]) {
    for name in VALID_SECTION_ATTRIBUTES {
        match attributes.iter().find(|(k, _)| k == name) {
            Some((_, value)) => dom.set_attribute(el, name, value),
            None => dom.remove_attribute(el, name),
        }
    }
}

fn clear_owned_outputs<D: OutputDom>(
    tree: &mut RenderTree<D::Handle>,
    dom: &mut D,
    id: RenderId,
    el: D::Handle,
) {
    let owned = std::mem::take(&mut tree.node_mut(id).owned_outputs);
    for handle in owned {
        if dom.parent(handle) == Some(el) {
            dom.remove_child(el, handle);
        }
    }
}

/// Rebuild a markerable section's inline content: markers and atoms are
/// realized left to right while tracking the open-markup element stack, so
/// pointer-identical markup runs share wrapper elements and open/close
/// boundaries fall exactly where adjacent stacks diverge.
fn render_inline_children<D: OutputDom>(
    post: &Post,
    tree: &mut RenderTree<D::Handle>,
    dom: &mut D,
    section_id: RenderId,
    el: D::Handle,
    markers: &[crate::model::InlineId],
    atoms: &AtomRegistry,
) {
    // Wholesale rebuild: drop previous inline render nodes and owned
    // wrapper/placeholder outputs.
    let old_children = tree.node(section_id).children.clone();
    for child in old_children {
        if let Some(out) = tree.node(child).output {
            if let Some(parent) = dom.parent(out) {
                dom.remove_child(parent, out);
            }
        }
        tree.destroy_subtree(child);
    }
    tree.node_mut(section_id).children.clear();
    clear_owned_outputs(tree, dom, section_id, el);

    let mut open: Vec<(Markup, D::Handle)> = Vec::new();
    let mut owned: Vec<D::Handle> = Vec::new();
    let mut children: Vec<RenderId> = Vec::new();
    let mut blank = true;

    for iid in markers {
        let inline = post.inline(*iid);
        if !inline.is_blank() {
            blank = false;
        }
        let stack = inline.markups();

        let mut common = 0;
        while common < open.len() && common < stack.len() && open[common].0 == stack[common] {
            common += 1;
        }
        open.truncate(common);
        for markup in &stack[common..] {
            let wrapper_parent = open.last().map(|(_, h)| *h).unwrap_or(el);
            let wrapper = dom.create_element(markup.tag());
            for (name, value) in markup.attributes() {
                dom.set_attribute(wrapper, name, value);
            }
            dom.insert_before(wrapper_parent, wrapper, None);
            if wrapper_parent == el {
                owned.push(wrapper);
            }
            open.push((markup.clone(), wrapper));
        }

        let inline_parent = open.last().map(|(_, h)| *h).unwrap_or(el);
        let out = match inline {
            Inline::Marker(m) => {
                let text = dom.create_text(&m.value);
                dom.insert_before(inline_parent, text, None);
                text
            }
            Inline::Atom(a) => {
                let wrapper = dom.create_element("span");
                dom.set_attribute(wrapper, "data-atom", &a.name);
                dom.insert_before(inline_parent, wrapper, None);
                let spec = atoms.resolve(&a.name).realize(&AtomContext {
                    value: &a.value,
                    payload: &a.payload,
                });
                materialize(dom, wrapper, &spec);
                wrapper
            }
        };
        if inline_parent == el {
            owned.push(out);
        }

        let rid = tree.create_node(section_id, ModelRef::Inline(*iid));
        tag_output(tree, dom, rid, out);
        let node = tree.node_mut(rid);
        node.output = Some(out);
        node.dirty = false;
        children.push(rid);
    }

    if blank {
        // Keep the line visible (and targetable) when there is no content.
        let br = dom.create_element("br");
        dom.insert_before(el, br, None);
        owned.push(br);
    }

    let node = tree.node_mut(section_id);
    node.children = children;
    node.owned_outputs = owned;
}

/// Materialize a card/atom node spec under a parent, returning the root of
/// the created subtree.
fn materialize<D: OutputDom>(dom: &mut D, parent: D::Handle, spec: &NodeSpec) -> D::Handle {
    match spec {
        NodeSpec::Text(text) => {
            let node = dom.create_text(text);
            dom.insert_before(parent, node, None);
            node
        }
        NodeSpec::Element {
            tag,
            attributes,
            children,
        } => {
            let element = dom.create_element(tag);
            for (name, value) in attributes {
                dom.set_attribute(element, name, value);
            }
            dom.insert_before(parent, element, None);
            for child in children {
                materialize(dom, element, child);
            }
            element
        }
    }
}
