use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

use crate::cursor::unicode::{step_backward, step_forward};
use crate::cursor::Direction;
use crate::model::{Inline, Post, SectionId};

/// A zero-width location in the document: a leaf section plus an offset in
/// cursor units, or the distinguished blank position of an empty document.
///
/// Invariant: `0 <= offset <= section.length`. Movement clamps at the
/// document edges rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Blank,
    In { section: SectionId, offset: usize },
}

/// One addressable unit of a markerable section, used for word scanning.
enum SectionUnit {
    Char(char),
    Atom,
}

impl Position {
    pub fn new(section: SectionId, offset: usize) -> Self {
        Position::In { section, offset }
    }

    pub fn head_of(section: SectionId) -> Self {
        Position::new(section, 0)
    }

    pub fn tail_of(post: &Post, section: SectionId) -> Self {
        Position::new(section, post.section_length(section))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Position::Blank)
    }

    pub fn section(&self) -> Option<SectionId> {
        match self {
            Position::Blank => None,
            Position::In { section, .. } => Some(*section),
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            Position::Blank => 0,
            Position::In { offset, .. } => *offset,
        }
    }

    pub fn is_head_of_section(&self) -> bool {
        self.offset() == 0 && !self.is_blank()
    }

    pub fn is_tail_of_section(&self, post: &Post) -> bool {
        match self {
            Position::Blank => false,
            Position::In { section, offset } => *offset == post.section_length(*section),
        }
    }

    /// Order two positions by document order. Both must address the same
    /// (live) document; blank positions only compare with blank positions.
    pub fn compare(&self, post: &Post, other: &Position) -> Ordering {
        match (self, other) {
            (Position::Blank, Position::Blank) => Ordering::Equal,
            (Position::Blank, _) | (_, Position::Blank) => {
                panic!("cannot order a blank position against a non-blank position")
            }
            (
                Position::In { section, offset },
                Position::In {
                    section: other_section,
                    offset: other_offset,
                },
            ) => {
                if section == other_section {
                    return offset.cmp(other_offset);
                }
                let leaves = post.leaf_sections();
                let a = leaves
                    .iter()
                    .position(|s| s == section)
                    .expect("position does not address a live section");
                let b = leaves
                    .iter()
                    .position(|s| s == other_section)
                    .expect("position does not address a live section");
                a.cmp(&b)
            }
        }
    }

    /// Step by whole cursor units, clamping at the document head/tail.
    /// Moving past an edge is a no-op returning the same position.
    pub fn move_units(&self, post: &Post, units: i64) -> Position {
        let mut position = *self;
        let mut remaining = units;
        while remaining > 0 {
            position = position.move_right(post);
            remaining -= 1;
        }
        while remaining < 0 {
            position = position.move_left(post);
            remaining += 1;
        }
        position
    }

    fn move_right(&self, post: &Post) -> Position {
        let Position::In { section, offset } = *self else {
            return Position::Blank;
        };
        let length = post.section_length(section);
        if offset < length {
            let step = unit_step(post, section, offset, Direction::Forward);
            return Position::new(section, offset + step);
        }
        match post.next_leaf_section(section) {
            Some(next) => Position::head_of(next),
            None => *self,
        }
    }

    fn move_left(&self, post: &Post) -> Position {
        let Position::In { section, offset } = *self else {
            return Position::Blank;
        };
        if offset > 0 {
            let step = unit_step(post, section, offset, Direction::Backward);
            return Position::new(section, offset - step);
        }
        match post.prev_leaf_section(section) {
            Some(prev) => Position::tail_of(post, prev),
            None => *self,
        }
    }

    /// Step to the next word boundary. Atoms are skipped as whole units;
    /// section boundaries are crossed by recursing into `move_units` first.
    pub fn move_word(&self, post: &Post, direction: Direction) -> Position {
        let Position::In { section, offset } = *self else {
            return Position::Blank;
        };
        match direction {
            Direction::Forward => {
                if offset == post.section_length(section) {
                    let crossed = self.move_units(post, 1);
                    if crossed == *self {
                        return *self;
                    }
                    return crossed.move_word(post, direction);
                }
                let units = section_units(post, section);
                let mut cursor = offset;
                let mut index = unit_index_at(&units, cursor);
                // Skip any non-word prefix, then consume the word (or a
                // single atom) that follows.
                while let Some((width, unit)) = units.get(index) {
                    match unit {
                        SectionUnit::Atom => {
                            cursor += width;
                            return Position::new(section, cursor);
                        }
                        SectionUnit::Char(ch) if !is_word_char(*ch) => {
                            cursor += width;
                            index += 1;
                        }
                        SectionUnit::Char(_) => break,
                    }
                }
                while let Some((width, SectionUnit::Char(ch))) = units.get(index) {
                    if !is_word_char(*ch) {
                        break;
                    }
                    cursor += width;
                    index += 1;
                }
                Position::new(section, cursor)
            }
            Direction::Backward => {
                if offset == 0 {
                    let crossed = self.move_units(post, -1);
                    if crossed == *self {
                        return *self;
                    }
                    return crossed.move_word(post, direction);
                }
                let units = section_units(post, section);
                let mut cursor = offset;
                let mut index = unit_index_at(&units, cursor);
                while index > 0 {
                    let (width, unit) = &units[index - 1];
                    match unit {
                        SectionUnit::Atom => {
                            cursor -= width;
                            return Position::new(section, cursor);
                        }
                        SectionUnit::Char(ch) if !is_word_char(*ch) => {
                            cursor -= width;
                            index -= 1;
                        }
                        SectionUnit::Char(_) => break,
                    }
                }
                while index > 0 {
                    let (width, unit) = &units[index - 1];
                    match unit {
                        SectionUnit::Char(ch) if is_word_char(*ch) => {
                            cursor -= width;
                            index -= 1;
                        }
                        _ => break,
                    }
                }
                Position::new(section, cursor)
            }
        }
    }
}

/// Width in cursor units of the step taken from `offset` within a section.
/// Whole atoms and whole supplementary-plane characters step atomically.
fn unit_step(post: &Post, section: SectionId, offset: usize, direction: Direction) -> usize {
    let markers = match post.section(section).markers() {
        Some(markers) => markers,
        // Cards and images are a single unit.
        None => return 1,
    };
    let mut acc = 0;
    for iid in markers {
        let inline = post.inline(*iid);
        let length = inline.length();
        match direction {
            Direction::Forward => {
                if offset < acc + length {
                    return match inline {
                        Inline::Marker(m) => step_forward(&m.value, offset - acc),
                        Inline::Atom(_) => 1,
                    };
                }
            }
            Direction::Backward => {
                if offset > acc && offset <= acc + length {
                    return match inline {
                        Inline::Marker(m) => step_backward(&m.value, offset - acc),
                        Inline::Atom(_) => 1,
                    };
                }
            }
        }
        acc += length;
    }
    1
}

/// Flatten a markerable section into (width, unit) pairs for word scanning.
fn section_units(post: &Post, section: SectionId) -> Vec<(usize, SectionUnit)> {
    let mut units = Vec::new();
    if let Some(markers) = post.section(section).markers() {
        for iid in markers {
            match post.inline(*iid) {
                Inline::Marker(m) => {
                    for ch in m.value.chars() {
                        units.push((ch.len_utf16(), SectionUnit::Char(ch)));
                    }
                }
                Inline::Atom(_) => units.push((1, SectionUnit::Atom)),
            }
        }
    }
    units
}

/// Index of the unit starting at `offset` in a flattened unit list.
fn unit_index_at(units: &[(usize, SectionUnit)], offset: usize) -> usize {
    let mut acc = 0;
    for (index, (width, _)) in units.iter().enumerate() {
        if acc >= offset {
            return index;
        }
        acc += width;
    }
    units.len()
}

fn is_word_char(ch: char) -> bool {
    static WORD_CHAR: OnceLock<Regex> = OnceLock::new();
    let re = WORD_CHAR.get_or_init(|| Regex::new(r"\w").expect("Invalid word regex"));
    re.is_match(ch.encode_utf8(&mut [0u8; 4]))
}
