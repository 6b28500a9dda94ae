// crates/core/src/collation.rs
//! Locale-aware ordering of attribute value labels.
//!
//! Labels are compared letter by letter on their base letters first (case and
//! diacritics removed), then on diacritics, then on case. Czech locales treat
//! `č`, `ř`, `š`, `ž` and the digraph `ch` as letters of their own.

use std::cmp::Ordering;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CollationKey {
    primary: Vec<(char, u8)>,
    secondary: Vec<u32>,
    tertiary: Vec<bool>,
}

fn is_czech(locale: &str) -> bool {
    let lang = locale.split(['_', '-', '.']).next().unwrap_or_default();
    lang.eq_ignore_ascii_case("cs")
}

/// Letters sorting as a separate letter right after their base in Czech.
fn czech_letter(c: char) -> Option<char> {
    match c {
        'č' => Some('c'),
        'ř' => Some('r'),
        'š' => Some('s'),
        'ž' => Some('z'),
        _ => None,
    }
}

fn collation_key(label: &str, locale: &str) -> CollationKey {
    let czech = is_czech(locale);
    let mut key = CollationKey {
        primary: Vec::with_capacity(label.len()),
        secondary: Vec::new(),
        tertiary: Vec::new(),
    };
    let chars: Vec<char> = label.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let lower = c.to_lowercase().next().unwrap_or(c);
        key.tertiary.push(c != lower);

        if czech {
            if lower == 'c'
                && chars
                    .get(i + 1)
                    .is_some_and(|n| n.to_lowercase().next() == Some('h'))
            {
                key.primary.push(('h', 1));
                key.secondary.push(0);
                i += 2;
                continue;
            }
            if let Some(base) = czech_letter(lower) {
                key.primary.push((base, 1));
                key.secondary.push(0);
                i += 1;
                continue;
            }
        }

        let mut decomposed = std::iter::once(lower).nfd();
        let base = decomposed.next().unwrap_or(lower);
        let marks: u32 = decomposed
            .filter(|m| is_combining_mark(*m))
            .map(|m| m as u32)
            .sum();
        key.primary.push((base, 0));
        key.secondary.push(marks);
        i += 1;
    }
    key
}

/// Compare two labels under the collation of `locale`.
pub fn compare(locale: &str, a: &str, b: &str) -> Ordering {
    collation_key(a, locale)
        .cmp(&collation_key(b, locale))
        .then_with(|| a.cmp(b))
}
