//! Text normalization for matching Japanese names and phrases.

use unicode_normalization::UnicodeNormalization;

/// Corporate-form markers stripped before comparing names.
const CORPORATE_MARKERS: [&str; 2] = ["株式会社", "(株)"];

/// NFKC-fold, lower-case and strip whitespace.
///
/// Full-width digits and Latin letters become ASCII, so `７２０３` and `7203`
/// compare equal.
pub fn fold(text: &str) -> String {
    text.nfkc()
        .flat_map(char::to_lowercase)
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// [`fold`] and additionally drop corporate-form markers.
pub fn normalize_name(text: &str) -> String {
    let mut folded = fold(text);
    for marker in CORPORATE_MARKERS {
        folded = folded.replace(marker, "");
    }
    folded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_widths() {
        assert_eq!(fold("ＴＯＹＯＴＡ　７２０３"), "toyota7203");
        assert_eq!(fold("Ｅ０２１４４"), "e02144");
    }

    #[test]
    fn test_normalize_name_drops_corporate_form() {
        assert_eq!(normalize_name("トヨタ自動車株式会社"), "トヨタ自動車");
        assert_eq!(normalize_name("（株）ＡＢＣ"), "abc");
        assert_eq!(normalize_name("㈱ABC"), "abc");
    }
}
