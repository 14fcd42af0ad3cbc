//! Text normalisation for keyword matching.
//!
//! Portal text mixes case and Portuguese diacritics freely ("Médico",
//! "MEDICO", "médicos"). Normalising first lets the taxonomy be written once,
//! in lowercase unaccented form.
//!
//! # Folding table
//!
//! Only this fixed set is folded; any other character is left as lowercased:
//!
//! | from | to |
//! |------|----|
//! | ã á  | a  |
//! | é    | e  |
//! | í    | i  |
//! | õ ô ó| o  |
//! | ú    | u  |
//! | ç    | c  |

use std::fmt;

/// Text that has been lowercased and accent-folded by [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedText(String);

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl AsRef<str> for NormalizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase `text` and fold the fixed diacritic set.
///
/// Input: "Contratação de MÉDICOS"
/// Output: "contratacao de medicos"
pub fn normalize(text: &str) -> NormalizedText {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars().flat_map(char::to_lowercase) {
        out.push(fold(ch));
    }
    NormalizedText(out)
}

fn fold(ch: char) -> char {
    match ch {
        'ã' | 'á' => 'a',
        'é' => 'e',
        'í' => 'i',
        'õ' | 'ô' | 'ó' => 'o',
        'ú' => 'u',
        'ç' => 'c',
        other => other,
    }
}
