use std::cmp::Ordering;

use crate::cursor::{Direction, Position};
use crate::model::{Post, SectionId};

/// A pair of positions with an optional direction. Collapsed iff head equals
/// tail. Ranges are value objects: they are constructed freely and own
/// nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub head: Position,
    pub tail: Position,
    pub direction: Option<Direction>,
}

impl Range {
    pub fn new(head: Position, tail: Position) -> Self {
        Self {
            head,
            tail,
            direction: None,
        }
    }

    pub fn with_direction(head: Position, tail: Position, direction: Direction) -> Self {
        Self {
            head,
            tail,
            direction: Some(direction),
        }
    }

    pub fn collapsed(position: Position) -> Self {
        Self::new(position, position)
    }

    pub fn blank() -> Self {
        Self::new(Position::Blank, Position::Blank)
    }

    pub fn is_collapsed(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_blank(&self) -> bool {
        self.head.is_blank() && self.tail.is_blank()
    }

    /// Normalize so head precedes tail in document order.
    pub fn ordered(&self, post: &Post) -> Range {
        if !self.is_blank() && self.head.compare(post, &self.tail) == Ordering::Greater {
            Range {
                head: self.tail,
                tail: self.head,
                direction: self.direction,
            }
        } else {
            *self
        }
    }

    /// Grow the non-anchored end by `units` in the range's direction. A
    /// range with no direction yet infers one from the sign of `units`.
    pub fn extend(&self, post: &Post, units: i64) -> Range {
        if units == 0 || self.is_blank() {
            return *self;
        }
        match self.direction {
            Some(Direction::Forward) => Range {
                head: self.head,
                tail: self.tail.move_units(post, units),
                direction: self.direction,
            },
            Some(Direction::Backward) => Range {
                head: self.head.move_units(post, units),
                tail: self.tail,
                direction: self.direction,
            },
            None => {
                let direction = if units > 0 {
                    Direction::Forward
                } else {
                    Direction::Backward
                };
                Range {
                    head: self.head,
                    tail: self.tail,
                    direction: Some(direction),
                }
                .extend(post, units)
            }
        }
    }

    /// Clamp this range's offsets to a single section's bounds; used when
    /// iterating per-section during multi-section operations.
    pub fn trim_to(&self, post: &Post, section: SectionId) -> Range {
        let length = post.section_length(section);
        let head_offset = if self.head.section() == Some(section) {
            self.head.offset().min(length)
        } else {
            0
        };
        let tail_offset = if self.tail.section() == Some(section) {
            self.tail.offset().min(length)
        } else {
            length
        };
        Range::new(
            Position::new(section, head_offset),
            Position::new(section, tail_offset),
        )
    }
}
