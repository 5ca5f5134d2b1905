use std::collections::HashMap;
use std::sync::Arc;

/// Tag applied to markup sections created without an explicit tag, and the
/// tag sections reset to when a toggle removes their current one.
pub const DEFAULT_MARKUP_SECTION_TAG: &str = "p";

/// Inline markup tags the model accepts.
pub const VALID_MARKUP_TAGS: &[&str] = &[
    "a", "b", "code", "em", "i", "s", "strong", "sub", "sup", "u",
];

/// Attribute names a markup may carry.
pub const VALID_MARKUP_ATTRIBUTES: &[&str] = &["href", "rel"];

/// Block tags a markup section may carry.
pub const VALID_MARKUP_SECTION_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "aside",
];

/// List section tags.
pub const VALID_LIST_SECTION_TAGS: &[&str] = &["ul", "ol"];

/// Attribute names an attributable section may carry.
pub const VALID_SECTION_ATTRIBUTES: &[&str] = &["data-text-align"];

/// An immutable inline markup: a whitelisted tag plus a small attribute map.
///
/// Markups are interned by the owning post's [`MarkupInterner`], so two
/// structurally identical markups are the same allocation. Equality is
/// pointer equality, which makes "is this the same markup" checks exact and
/// cheap during marker joining and open/close coalescing.
#[derive(Clone, Debug)]
pub struct Markup(Arc<MarkupData>);

#[derive(Debug)]
pub struct MarkupData {
    tag: String,
    /// Sorted by attribute name so interning keys are canonical.
    attributes: Vec<(String, String)>,
}

impl Markup {
    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.0.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.0
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.0.tag == normalize_tag(tag)
    }
}

impl PartialEq for Markup {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Markup {}

/// Memoizes markups by (tag, sorted attributes) so structurally identical
/// markups come back reference-equal.
#[derive(Default, Debug)]
pub struct MarkupInterner {
    cache: HashMap<MarkupKey, Markup>,
}

#[derive(Hash, PartialEq, Eq, Debug)]
struct MarkupKey {
    tag: String,
    attributes: Vec<(String, String)>,
}

impl MarkupInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a markup with no attributes.
    pub fn intern(&mut self, tag: &str) -> Markup {
        self.intern_with_attributes(tag, &[])
    }

    /// Intern a markup with attributes. The tag and every attribute name
    /// must be whitelisted; anything else is a caller bug.
    pub fn intern_with_attributes(&mut self, tag: &str, attributes: &[(&str, &str)]) -> Markup {
        let tag = normalize_tag(tag);
        assert!(
            VALID_MARKUP_TAGS.contains(&tag.as_str()),
            "invalid markup tag: {tag:?}"
        );

        let mut attrs: Vec<(String, String)> = attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        attrs.sort();
        for (name, _) in &attrs {
            assert!(
                VALID_MARKUP_ATTRIBUTES.contains(&name.as_str()),
                "invalid markup attribute: {name:?}"
            );
        }

        let key = MarkupKey {
            tag: tag.clone(),
            attributes: attrs.clone(),
        };
        self.cache
            .entry(key)
            .or_insert_with(|| {
                Markup(Arc::new(MarkupData {
                    tag,
                    attributes: attrs,
                }))
            })
            .clone()
    }
}

/// Lowercase a tag name; all tag comparisons in the model go through this.
pub fn normalize_tag(tag: &str) -> String {
    tag.to_ascii_lowercase()
}
