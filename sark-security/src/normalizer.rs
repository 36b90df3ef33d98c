//! Unicode normalization used to defeat obfuscated prompt injection attempts.
//!
//! Attackers hide injection phrases behind fullwidth characters, zero-width
//! joiners, combining marks, or exotic space separators so a naive substring
//! match slides past them. The normalizer folds all of these back to a plain
//! ASCII-ish form; detectors run against both the raw and normalized text and
//! flag a finding as obfuscated when only the normalized form matched.

/// One of the transforms the normalizer may apply, reported back so a finding
/// can note exactly how the original text was disguised.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transform {
    /// Fullwidth ASCII (U+FF01-FF5E) folded to narrow equivalents.
    Fullwidth,
    /// Zero-width characters (U+200B-200D, U+FEFF) stripped.
    ZeroWidth,
    /// Unicode space separators collapsed to a plain space.
    Nbsp,
    /// Case folded to lowercase.
    Case,
}

impl Transform {
    /// Wire/log representation, matching the note strings other detectors expect.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Transform::Fullwidth => "fullwidth",
            Transform::ZeroWidth => "zero_width",
            Transform::Nbsp => "nbsp",
            Transform::Case => "case",
        }
    }
}

/// Result of normalizing a string: the normalized text plus which transforms changed it.
#[derive(Clone, Debug)]
pub struct Normalized {
    text: String,
    applied: Vec<Transform>,
}

impl Normalized {
    /// The normalized text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Transforms that actually altered the input (a subset of all transforms attempted).
    #[must_use]
    pub fn applied(&self) -> &[Transform] {
        &self.applied
    }

    /// Whether normalization changed anything at all.
    #[must_use]
    pub fn was_obfuscated(&self) -> bool {
        !self.applied.is_empty()
    }
}

fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}')
}

fn is_combining_mark(c: char) -> bool {
    matches!(c,
        '\u{0300}'..='\u{036F}'
        | '\u{1AB0}'..='\u{1AFF}'
        | '\u{1DC0}'..='\u{1DFF}'
        | '\u{20D0}'..='\u{20FF}'
        | '\u{FE20}'..='\u{FE2F}'
    )
}

fn is_unicode_space_separator(c: char) -> bool {
    matches!(c,
        '\u{00A0}' | '\u{1680}' | '\u{2000}'..='\u{200A}' | '\u{2028}' | '\u{2029}'
        | '\u{202F}' | '\u{205F}' | '\u{3000}'
    )
}

fn fold_fullwidth(c: char) -> char {
    match c {
        '\u{FF01}'..='\u{FF5E}' => {
            char::from_u32(c as u32 - 0xFEE0).unwrap_or(c)
        }
        _ => c,
    }
}

/// Normalizes `input`, returning the cleaned text and which transforms fired.
#[must_use]
pub fn normalize(input: &str) -> Normalized {
    let mut fullwidth_hit = false;
    let mut zero_width_hit = false;
    let mut nbsp_hit = false;

    let mut folded = String::with_capacity(input.len());
    for c in input.chars() {
        if is_zero_width(c) {
            zero_width_hit = true;
            continue;
        }
        if is_combining_mark(c) {
            zero_width_hit = true;
            continue;
        }
        let widened = fold_fullwidth(c);
        if widened != c {
            fullwidth_hit = true;
        }
        if is_unicode_space_separator(widened) {
            nbsp_hit = true;
            folded.push(' ');
            continue;
        }
        folded.push(widened);
    }

    let lowered = folded.to_lowercase();
    let case_hit = lowered != folded;

    let mut applied = Vec::new();
    if fullwidth_hit {
        applied.push(Transform::Fullwidth);
    }
    if zero_width_hit {
        applied.push(Transform::ZeroWidth);
    }
    if nbsp_hit {
        applied.push(Transform::Nbsp);
    }
    if case_hit {
        applied.push(Transform::Case);
    }

    Normalized {
        text: lowered,
        applied,
    }
}
