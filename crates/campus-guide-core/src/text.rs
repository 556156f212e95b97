//! Text normalization shared by the classifier, the alias resolver, and the
//! retriever's word-overlap scoring.

use std::collections::BTreeSet;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lowercase `text` and strip diacritics (`"Cómo llegó"` → `"como llego"`).
///
/// Decomposes to NFD and drops combining marks, so `ñ` becomes `n` as well.
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split folded text into alphanumeric words, dropping punctuation.
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

/// Distinct folded words of `text`, in sorted order.
pub fn word_set(text: &str) -> BTreeSet<String> {
    let folded = fold(text);
    words(&folded).map(str::to_string).collect()
}
