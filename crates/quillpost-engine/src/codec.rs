//! Versioned document codec: a lossless serde representation of every model
//! construct, consumed by the edit history and by hosts for persistence.
//!
//! Markers carry (opened-markup-indexes, closed-markup-count) pairs rather
//! than full markup stacks, so the open/close nesting order survives
//! round-trips exactly. Codec errors are ordinary `Result`s, the one
//! non-fatal error family in the engine, because serialized input crosses
//! the process boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::markup::{
    VALID_LIST_SECTION_TAGS, VALID_MARKUP_ATTRIBUTES, VALID_MARKUP_SECTION_TAGS,
    VALID_MARKUP_TAGS, VALID_SECTION_ATTRIBUTES,
};
use crate::model::{Inline, Markup, Owner, Post, SectionId, SectionKind};

pub const FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Unsupported document version: {0}")]
    UnsupportedVersion(String),
    #[error("Malformed document: {0}")]
    Malformed(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level serialized document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentValue {
    pub version: String,
    #[serde(default)]
    pub markups: Vec<MarkupValue>,
    #[serde(default)]
    pub atoms: Vec<AtomValue>,
    #[serde(default)]
    pub cards: Vec<CardValue>,
    #[serde(default)]
    pub sections: Vec<SectionValue>,
}

impl DocumentValue {
    pub fn empty() -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            markups: Vec::new(),
            atoms: Vec::new(),
            cards: Vec::new(),
            sections: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupValue {
    pub tag: String,
    #[serde(default)]
    pub attributes: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomValue {
    pub name: String,
    pub value: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardValue {
    pub name: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SectionValue {
    Markup {
        tag: String,
        #[serde(default)]
        attributes: Vec<(String, String)>,
        markers: Vec<MarkerValue>,
    },
    List {
        tag: String,
        #[serde(default)]
        attributes: Vec<(String, String)>,
        items: Vec<Vec<MarkerValue>>,
    },
    Image {
        src: Option<String>,
    },
    Card {
        index: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarkerValue {
    Text {
        #[serde(default)]
        open_markups: Vec<usize>,
        #[serde(default)]
        closed_markups: usize,
        value: String,
    },
    Atom {
        #[serde(default)]
        open_markups: Vec<usize>,
        #[serde(default)]
        closed_markups: usize,
        index: usize,
    },
}

// ============ Serialize ============

#[derive(Default)]
struct Tables {
    markups: Vec<(Markup, MarkupValue)>,
    atoms: Vec<AtomValue>,
    cards: Vec<CardValue>,
}

impl Tables {
    fn markup_index(&mut self, markup: &Markup) -> usize {
        if let Some(index) = self.markups.iter().position(|(m, _)| m == markup) {
            return index;
        }
        self.markups.push((
            markup.clone(),
            MarkupValue {
                tag: markup.tag().to_string(),
                attributes: markup.attributes().to_vec(),
            },
        ));
        self.markups.len() - 1
    }
}

/// Serialize a post into the versioned document value. Total over every
/// model construct; the round trip through [`parse`] is lossless.
pub fn serialize(post: &Post) -> DocumentValue {
    let mut tables = Tables::default();
    let mut sections = Vec::new();
    for sid in post.sections() {
        sections.push(serialize_section(post, *sid, &mut tables));
    }
    DocumentValue {
        version: FORMAT_VERSION.to_string(),
        markups: tables.markups.into_iter().map(|(_, v)| v).collect(),
        atoms: tables.atoms,
        cards: tables.cards,
        sections,
    }
}

fn serialize_section(post: &Post, sid: SectionId, tables: &mut Tables) -> SectionValue {
    match &post.section(sid).kind {
        SectionKind::Markup(s) => SectionValue::Markup {
            tag: s.tag.clone(),
            attributes: s.attributes.clone(),
            markers: serialize_markers(post, &s.markers, tables),
        },
        SectionKind::List(s) => SectionValue::List {
            tag: s.tag.clone(),
            attributes: s.attributes.clone(),
            items: s
                .items
                .iter()
                .map(|item| {
                    let markers = post
                        .section(*item)
                        .markers()
                        .expect("list item is markerable");
                    serialize_markers(post, markers, tables)
                })
                .collect(),
        },
        SectionKind::ListItem(_) => unreachable!("list items are never top-level"),
        SectionKind::Image(s) => SectionValue::Image { src: s.src.clone() },
        SectionKind::Card(s) => {
            tables.cards.push(CardValue {
                name: s.name.clone(),
                payload: s.payload.clone(),
            });
            SectionValue::Card {
                index: tables.cards.len() - 1,
            }
        }
    }
}

fn serialize_markers(
    post: &Post,
    markers: &[crate::model::InlineId],
    tables: &mut Tables,
) -> Vec<MarkerValue> {
    let stacks: Vec<Vec<Markup>> = markers
        .iter()
        .map(|iid| post.inline(*iid).markups().to_vec())
        .collect();
    let mut out = Vec::with_capacity(markers.len());
    for (index, iid) in markers.iter().enumerate() {
        let empty = Vec::new();
        let prev = if index == 0 { &empty } else { &stacks[index - 1] };
        let current = &stacks[index];
        let next = stacks.get(index + 1).unwrap_or(&empty);

        let opened_from = common_prefix(prev, current);
        let open_markups: Vec<usize> = current[opened_from..]
            .iter()
            .map(|m| tables.markup_index(m))
            .collect();
        let closed_markups = current.len() - common_prefix(current, next);

        out.push(match post.inline(*iid) {
            Inline::Marker(m) => MarkerValue::Text {
                open_markups,
                closed_markups,
                value: m.value.clone(),
            },
            Inline::Atom(a) => {
                tables.atoms.push(AtomValue {
                    name: a.name.clone(),
                    value: a.value.clone(),
                    payload: a.payload.clone(),
                });
                MarkerValue::Atom {
                    open_markups,
                    closed_markups,
                    index: tables.atoms.len() - 1,
                }
            }
        });
    }
    out
}

fn common_prefix(a: &[Markup], b: &[Markup]) -> usize {
    let mut count = 0;
    while count < a.len() && count < b.len() && a[count] == b[count] {
        count += 1;
    }
    count
}

// ============ Parse ============

/// Rebuild a post from a document value.
pub fn parse(value: &DocumentValue) -> Result<Post, CodecError> {
    if value.version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(value.version.clone()));
    }

    let mut post = Post::new();

    let mut markups = Vec::with_capacity(value.markups.len());
    for mv in &value.markups {
        if !VALID_MARKUP_TAGS.contains(&mv.tag.as_str()) {
            return Err(CodecError::Malformed(format!(
                "invalid markup tag {:?}",
                mv.tag
            )));
        }
        for (name, _) in &mv.attributes {
            if !VALID_MARKUP_ATTRIBUTES.contains(&name.as_str()) {
                return Err(CodecError::Malformed(format!(
                    "invalid markup attribute {name:?}"
                )));
            }
        }
        let attrs: Vec<(&str, &str)> = mv
            .attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        markups.push(post.markup_with_attributes(&mv.tag, &attrs));
    }

    for section in &value.sections {
        match section {
            SectionValue::Markup {
                tag,
                attributes,
                markers,
            } => {
                if !VALID_MARKUP_SECTION_TAGS.contains(&tag.as_str()) {
                    return Err(CodecError::Malformed(format!(
                        "invalid markup section tag {tag:?}"
                    )));
                }
                let sid = post.create_markup_section(tag);
                apply_section_attributes(&mut post, sid, attributes)?;
                parse_markers(&mut post, sid, markers, &markups, &value.atoms)?;
                post.append_section(Owner::TopLevel, sid);
            }
            SectionValue::List {
                tag,
                attributes,
                items,
            } => {
                if !VALID_LIST_SECTION_TAGS.contains(&tag.as_str()) {
                    return Err(CodecError::Malformed(format!(
                        "invalid list section tag {tag:?}"
                    )));
                }
                let list = post.create_list_section(tag);
                apply_section_attributes(&mut post, list, attributes)?;
                post.append_section(Owner::TopLevel, list);
                for item_markers in items {
                    let item = post.create_list_item();
                    parse_markers(&mut post, item, item_markers, &markups, &value.atoms)?;
                    post.append_section(Owner::List(list), item);
                }
            }
            SectionValue::Image { src } => {
                let sid = post.create_image_section(src.as_deref());
                post.append_section(Owner::TopLevel, sid);
            }
            SectionValue::Card { index } => {
                let card = value.cards.get(*index).ok_or_else(|| {
                    CodecError::Malformed(format!("card index {index} out of range"))
                })?;
                let sid = post.create_card_section(&card.name, card.payload.clone());
                post.append_section(Owner::TopLevel, sid);
            }
        }
    }

    Ok(post)
}

fn apply_section_attributes(
    post: &mut Post,
    sid: SectionId,
    attributes: &[(String, String)],
) -> Result<(), CodecError> {
    for (name, value) in attributes {
        if !VALID_SECTION_ATTRIBUTES.contains(&name.as_str()) {
            return Err(CodecError::Malformed(format!(
                "invalid section attribute {name:?}"
            )));
        }
        post.section_mut(sid).set_attribute(name, value);
    }
    Ok(())
}

fn parse_markers(
    post: &mut Post,
    sid: SectionId,
    markers: &[MarkerValue],
    markups: &[Markup],
    atoms: &[AtomValue],
) -> Result<(), CodecError> {
    let mut stack: Vec<Markup> = Vec::new();
    for marker in markers {
        let (open_markups, closed_markups) = match marker {
            MarkerValue::Text {
                open_markups,
                closed_markups,
                ..
            }
            | MarkerValue::Atom {
                open_markups,
                closed_markups,
                ..
            } => (open_markups, *closed_markups),
        };
        for index in open_markups {
            let markup = markups.get(*index).ok_or_else(|| {
                CodecError::Malformed(format!("markup index {index} out of range"))
            })?;
            stack.push(markup.clone());
        }
        let iid = match marker {
            MarkerValue::Text { value, .. } => post.create_marker(value, stack.clone()),
            MarkerValue::Atom { index, .. } => {
                let atom = atoms.get(*index).ok_or_else(|| {
                    CodecError::Malformed(format!("atom index {index} out of range"))
                })?;
                post.create_atom(&atom.name, &atom.value, atom.payload.clone(), stack.clone())
            }
        };
        post.append_inline(sid, iid);
        if closed_markups > stack.len() {
            return Err(CodecError::Malformed(format!(
                "marker closes {closed_markups} markups but only {} are open",
                stack.len()
            )));
        }
        stack.truncate(stack.len() - closed_markups);
    }
    Ok(())
}

// ============ String convenience ============

pub fn to_json_string(value: &DocumentValue) -> Result<String, CodecError> {
    Ok(serde_json::to_string(value)?)
}

pub fn from_json_str(json: &str) -> Result<DocumentValue, CodecError> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_post() -> Post {
        let mut post = Post::new();
        let bold = post.markup("b");
        let link = post.markup_with_attributes("a", &[("href", "/x")]);

        let section = post.create_markup_section("h2");
        let plain = post.create_marker("plain ", vec![]);
        let bolded = post.create_marker("bold", vec![bold.clone()]);
        let both = post.create_marker("bold link", vec![bold, link]);
        post.append_inline(section, plain);
        post.append_inline(section, bolded);
        post.append_inline(section, both);
        post.append_section(Owner::TopLevel, section);

        let list = post.create_list_section("ul");
        post.append_section(Owner::TopLevel, list);
        let item = post.create_list_item();
        let marker = post.create_marker("item", vec![]);
        let atom = post.create_atom("mention", "@tom", json!({"id": 7}), vec![]);
        post.append_inline(item, marker);
        post.append_inline(item, atom);
        post.append_section(Owner::List(list), item);

        let card = post.create_card_section("embed", json!({"url": "https://x"}));
        post.append_section(Owner::TopLevel, card);
        let image = post.create_image_section(Some("/cat.png"));
        post.append_section(Owner::TopLevel, image);
        post
    }

    // ============ Serialize shape ============

    #[test]
    fn test_serialize_encodes_open_close_runs() {
        let post = sample_post();
        let value = serialize(&post);

        let SectionValue::Markup { markers, .. } = &value.sections[0] else {
            panic!("expected a markup section");
        };
        // "plain " opens nothing and closes nothing.
        assert_eq!(
            markers[0],
            MarkerValue::Text {
                open_markups: vec![],
                closed_markups: 0,
                value: "plain ".to_string()
            }
        );
        // "bold" opens <b> and keeps it open into the next marker.
        assert_eq!(
            markers[1],
            MarkerValue::Text {
                open_markups: vec![0],
                closed_markups: 0,
                value: "bold".to_string()
            }
        );
        // "bold link" opens <a> inside <b> and closes both at the end.
        assert_eq!(
            markers[2],
            MarkerValue::Text {
                open_markups: vec![1],
                closed_markups: 2,
                value: "bold link".to_string()
            }
        );
    }

    #[test]
    fn test_serialize_interns_markup_table() {
        let post = sample_post();
        let value = serialize(&post);

        assert_eq!(value.markups.len(), 2);
        assert_eq!(value.markups[0].tag, "b");
        assert_eq!(value.markups[1].tag, "a");
        assert_eq!(
            value.markups[1].attributes,
            vec![("href".to_string(), "/x".to_string())]
        );
    }

    // ============ Round trip ============

    #[test]
    fn test_round_trip_preserves_structure_and_text() {
        let post = sample_post();
        let value = serialize(&post);
        let restored = parse(&value).expect("parse should succeed");

        // Serializing the restored post yields the identical value.
        assert_eq!(serialize(&restored), value);
        assert_eq!(restored.text(), post.text());
        assert_eq!(restored.sections().len(), post.sections().len());
    }

    #[test]
    fn test_round_trip_through_json_string() {
        let post = sample_post();
        let value = serialize(&post);
        let json = to_json_string(&value).unwrap();
        let back = from_json_str(&json).unwrap();

        assert_eq!(back, value);
    }

    #[test]
    fn test_round_trip_restores_markup_identity() {
        let post = sample_post();
        let value = serialize(&post);
        let restored = parse(&value).unwrap();

        // The two bold markers must share the interned markup again.
        let SectionKind::Markup(section) = &restored.section(restored.sections()[0]).kind
        else {
            panic!("expected markup section");
        };
        let bold_a = &restored.inline(section.markers[1]).markups()[0];
        let bold_b = &restored.inline(section.markers[2]).markups()[0];
        assert_eq!(bold_a, bold_b, "interning must survive the round trip");
    }

    // ============ Errors ============

    #[test]
    fn test_parse_rejects_unknown_version() {
        let mut value = DocumentValue::empty();
        value.version = "9.9".to_string();

        assert!(matches!(
            parse(&value),
            Err(CodecError::UnsupportedVersion(v)) if v == "9.9"
        ));
    }

    #[test]
    fn test_parse_rejects_bad_markup_index() {
        let mut value = DocumentValue::empty();
        value.sections.push(SectionValue::Markup {
            tag: "p".to_string(),
            attributes: vec![],
            markers: vec![MarkerValue::Text {
                open_markups: vec![3],
                closed_markups: 0,
                value: "x".to_string(),
            }],
        });

        assert!(matches!(parse(&value), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_parse_rejects_overclosed_markups() {
        let mut value = DocumentValue::empty();
        value.sections.push(SectionValue::Markup {
            tag: "p".to_string(),
            attributes: vec![],
            markers: vec![MarkerValue::Text {
                open_markups: vec![],
                closed_markups: 1,
                value: "x".to_string(),
            }],
        });

        assert!(matches!(parse(&value), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_parse_rejects_invalid_section_tag() {
        let mut value = DocumentValue::empty();
        value.sections.push(SectionValue::Markup {
            tag: "marquee".to_string(),
            attributes: vec![],
            markers: vec![],
        });

        assert!(matches!(parse(&value), Err(CodecError::Malformed(_))));
    }
}
