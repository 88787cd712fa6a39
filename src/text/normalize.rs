//! Text normalization shared by the filters, the known-bad store and the classifier.

use unicode_normalization::UnicodeNormalization;

/// Case-fold and clean `text` without touching lookalike letters.
///
/// NFKC, lowercase, `ё` folded to `е`, invisible characters dropped and
/// whitespace collapsed to single spaces.
pub fn fold(text: &str) -> String {
    // Lowercasing can expose new compositions, hence the second NFKC pass.
    let folded: String = text
        .chars()
        .filter(|c| !is_invisible(*c))
        .nfkc()
        .flat_map(char::to_lowercase)
        .nfkc()
        .map(|c| if c == 'ё' { 'е' } else { c })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Full normalization: [`fold`] plus Latin lookalikes mapped back to Cyrillic
/// inside words that already contain Cyrillic letters.
///
/// Pure Latin words are left alone, so "crypto" stays "crypto" while
/// "зaработок" (Latin `a`) becomes "заработок".
pub fn normalize(text: &str) -> String {
    fold(text)
        .split(' ')
        .map(|word| {
            if word.chars().any(is_cyrillic) {
                word.chars().map(|c| cyrillic_twin(c).unwrap_or(c)).collect()
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn is_cyrillic(c: char) -> bool {
    matches!(c, '\u{0400}'..='\u{04FF}')
}

/// Cyrillic letter a lowercase Latin character (or digit) is commonly swapped for.
pub(crate) fn cyrillic_twin(c: char) -> Option<char> {
    match c {
        'a' => Some('а'),
        'b' => Some('в'),
        'c' => Some('с'),
        'e' => Some('е'),
        'h' => Some('н'),
        'k' => Some('к'),
        'm' => Some('м'),
        'o' => Some('о'),
        'p' => Some('р'),
        't' => Some('т'),
        'x' => Some('х'),
        'y' => Some('у'),
        'u' => Some('и'),
        '0' => Some('о'),
        '3' => Some('з'),
        _ => None,
    }
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}' | '\u{200B}'..='\u{200F}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
    )
}
