//! Prompt text normalization.
//!
//! Keyword matching is exact, so evasion via fullwidth forms or zero-width
//! characters has to be removed before scanning. NFKC folds fullwidth and
//! compatibility characters ('Ｈｅｌｌｏ' -> 'Hello', '①' -> '1'); the
//! explicit strip set covers the zero-width and bidi-control characters
//! commonly used to split keywords.

use unicode_normalization::UnicodeNormalization;

/// Characters removed after NFKC: zero-width space/joiners, direction marks,
/// BOM, and the bidi embedding/override block.
fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200b}'..='\u{200f}' | '\u{feff}' | '\u{202a}'..='\u{202e}' | '\u{2060}'..='\u{2064}'
    )
}

/// NFKC-normalize, strip invisible characters, and trim.
pub fn normalize_prompt(text: &str) -> String {
    text.nfkc()
        .filter(|c| !is_invisible(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fullwidth_folded() {
        assert_eq!(normalize_prompt("Ｈｅｌｌｏ"), "Hello");
    }

    #[test]
    fn test_zero_width_stripped() {
        assert_eq!(normalize_prompt("b\u{200b}o\u{200c}mb"), "bomb");
    }

    #[test]
    fn test_bidi_controls_stripped() {
        assert_eq!(normalize_prompt("a\u{202e}b\u{202c}c"), "abc");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(normalize_prompt("  plain text  "), "plain text");
    }
}
