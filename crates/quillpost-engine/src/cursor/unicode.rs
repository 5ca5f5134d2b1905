//! UTF-16 code-unit math over Rust strings.
//!
//! Cursor offsets throughout the model count UTF-16 code units, so a
//! supplementary-plane character (anything outside the BMP) occupies two
//! units and must be stepped over and deleted atomically.

/// Length of a string in UTF-16 code units.
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Byte index for a UTF-16 unit offset.
///
/// An offset landing inside a surrogate pair is clamped down to the start of
/// the character; an offset past the end of the string is a caller bug.
pub fn byte_for_utf16(s: &str, units: usize) -> usize {
    let mut acc = 0;
    for (i, ch) in s.char_indices() {
        if acc == units {
            return i;
        }
        let width = ch.len_utf16();
        if acc + width > units {
            // Mid-pair: clamp to the character start.
            return i;
        }
        acc += width;
    }
    assert!(
        units == acc,
        "UTF-16 offset {units} out of bounds (length {acc})"
    );
    s.len()
}

/// UTF-16 unit offset for a byte index (must be a char boundary).
pub fn utf16_for_byte(s: &str, byte: usize) -> usize {
    utf16_len(&s[..byte])
}

/// Units consumed stepping right from a unit offset: 2 across a
/// supplementary-plane character, 1 otherwise, 0 at the end.
pub fn step_forward(s: &str, units: usize) -> usize {
    let byte = byte_for_utf16(s, units);
    s[byte..].chars().next().map_or(0, |ch| ch.len_utf16())
}

/// Units consumed stepping left from a unit offset; 0 at the start.
pub fn step_backward(s: &str, units: usize) -> usize {
    let byte = byte_for_utf16(s, units);
    s[..byte].chars().next_back().map_or(0, |ch| ch.len_utf16())
}

/// Split a string at a UTF-16 unit offset.
pub fn split_at_utf16(s: &str, units: usize) -> (String, String) {
    let byte = byte_for_utf16(s, units);
    (s[..byte].to_string(), s[byte..].to_string())
}

/// The character at a unit offset, if any.
pub fn char_at_utf16(s: &str, units: usize) -> Option<char> {
    let byte = byte_for_utf16(s, units);
    s[byte..].chars().next()
}
