//! Answer normalization: raw response → KDF input bytes

use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroizing;

/// Canonicalize a raw response.
///
/// Uppercases (full Unicode case mapping), keeps only `[0-9A-Z]`, then applies
/// NFKC. Total and idempotent; empty input gives an empty passphrase.
pub fn normalize(raw: &str) -> Zeroizing<Vec<u8>> {
    let upper = Zeroizing::new(raw.to_uppercase());
    let kept: Zeroizing<String> = Zeroizing::new(
        upper
            .chars()
            .filter(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
            .collect(),
    );
    let composed: String = kept.nfkc().collect();
    Zeroizing::new(composed.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_punctuation_ignored() {
        assert_eq!(*normalize("answer!"), *normalize("AnSwEr"));
        assert_eq!(normalize("ab-12").as_slice(), b"AB12");
        assert_eq!(normalize("  the  Eagle, has landed. ").as_slice(), b"THEEAGLEHASLANDED");
    }

    #[test]
    fn test_empty() {
        assert!(normalize("").is_empty());
        assert!(normalize("?!- ").is_empty());
    }

    #[test]
    fn test_case_mapping_expands() {
        // U+00DF uppercases to "SS"
        assert_eq!(normalize("straße").as_slice(), b"STRASSE");
    }

    #[test]
    fn test_non_ascii_letters_dropped() {
        // Filtering happens before NFKC, so accented and full-width letters
        // are removed rather than folded.
        assert_eq!(normalize("café").as_slice(), b"CAF");
        assert_eq!(normalize("\u{FF21}\u{FF22}1").as_slice(), b"1");
    }

    #[test]
    fn test_idempotent_on_expanding_case_mappings() {
        // Ligature, titlecase digraph and dotted capital I all change length
        // or form under uppercasing and NFKC.
        for raw in ["\u{FB03}x", "\u{01C5}ungla", "\u{0130}stanbul"] {
            let once = normalize(raw);
            let text = std::str::from_utf8(&once).unwrap();
            let twice = normalize(text);
            assert_eq!(twice.as_slice(), once.as_slice(), "{raw:?}");
        }
    }

    mod proptest_suite {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn idempotent(raw in any::<String>()) {
                let once = normalize(&raw);
                let text = std::str::from_utf8(&once).unwrap();
                let twice = normalize(text);
                prop_assert_eq!(twice.as_slice(), once.as_slice());
            }

            #[test]
            fn output_alphabet(raw in any::<String>()) {
                let out = normalize(&raw);
                prop_assert!(out.iter().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase()));
            }

            #[test]
            fn case_and_punctuation_insensitive(
                word in "[a-zA-Z0-9]{0,16}",
                noise in "[ !?.,:;'\"-]{0,4}",
            ) {
                let noisy = format!("{noise}{}{noise}", word.to_lowercase());
                let from_noisy = normalize(&noisy);
                let from_upper = normalize(&word.to_uppercase());
                prop_assert_eq!(from_noisy.as_slice(), from_upper.as_slice());
            }
        }
    }
}
