use std::collections::HashMap;

use serde_json::Value;

use crate::model::CardMode;
use crate::render::output::NodeSpec;

/// Context handed to a card renderer.
pub struct CardContext<'a> {
    pub payload: &'a Value,
    pub mode: CardMode,
}

/// Context handed to an atom renderer.
pub struct AtomContext<'a> {
    pub value: &'a str,
    pub payload: &'a Value,
}

type CardRenderFn = Box<dyn Fn(&CardContext<'_>) -> NodeSpec>;
type AtomRenderFn = Box<dyn Fn(&AtomContext<'_>) -> NodeSpec>;

/// A registered card: a name, a display renderer and an optional edit
/// renderer. Cards without an edit renderer stay in display mode.
pub struct CardDescriptor {
    pub name: String,
    render: CardRenderFn,
    edit: Option<CardRenderFn>,
}

impl CardDescriptor {
    pub fn new(name: &str, render: impl Fn(&CardContext<'_>) -> NodeSpec + 'static) -> Self {
        Self {
            name: name.to_string(),
            render: Box::new(render),
            edit: None,
        }
    }

    pub fn with_edit(mut self, edit: impl Fn(&CardContext<'_>) -> NodeSpec + 'static) -> Self {
        self.edit = Some(Box::new(edit));
        self
    }

    pub fn has_edit(&self) -> bool {
        self.edit.is_some()
    }

    /// Produce the node spec for the given context, honoring the card's mode.
    pub fn realize(&self, ctx: &CardContext<'_>) -> NodeSpec {
        match (&ctx.mode, &self.edit) {
            (CardMode::Edit, Some(edit)) => edit(ctx),
            _ => (self.render)(ctx),
        }
    }
}

pub struct AtomDescriptor {
    pub name: String,
    render: AtomRenderFn,
}

impl AtomDescriptor {
    pub fn new(name: &str, render: impl Fn(&AtomContext<'_>) -> NodeSpec + 'static) -> Self {
        Self {
            name: name.to_string(),
            render: Box::new(render),
        }
    }

    pub fn realize(&self, ctx: &AtomContext<'_>) -> NodeSpec {
        (self.render)(ctx)
    }
}

/// Card lookup by name. Unknown names resolve through the fallback handler;
/// a missing fallback is a configuration error surfaced at first use.
#[derive(Default)]
pub struct CardRegistry {
    cards: HashMap<String, CardDescriptor>,
    fallback: Option<CardDescriptor>,
}

impl CardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: CardDescriptor) {
        self.cards.insert(descriptor.name.clone(), descriptor);
    }

    pub fn set_fallback(&mut self, descriptor: CardDescriptor) {
        self.fallback = Some(descriptor);
    }

    pub fn resolve(&self, name: &str) -> &CardDescriptor {
        self.cards.get(name).or(self.fallback.as_ref()).unwrap_or_else(|| {
            panic!("unknown card {name:?} and no fallback card handler is registered")
        })
    }
}

#[derive(Default)]
pub struct AtomRegistry {
    atoms: HashMap<String, AtomDescriptor>,
    fallback: Option<AtomDescriptor>,
}

impl AtomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: AtomDescriptor) {
        self.atoms.insert(descriptor.name.clone(), descriptor);
    }

    pub fn set_fallback(&mut self, descriptor: AtomDescriptor) {
        self.fallback = Some(descriptor);
    }

    pub fn resolve(&self, name: &str) -> &AtomDescriptor {
        self.atoms.get(name).or(self.fallback.as_ref()).unwrap_or_else(|| {
            panic!("unknown atom {name:?} and no fallback atom handler is registered")
        })
    }
}
