//! Department-name normalization tables.
//!
//! Snapshot exports spell department names inconsistently: dropped accents,
//! stray punctuation (`BOGOTA D. C.`), or a long name cut off at a fixed
//! column width. Lookups go through a folded key (uppercase ASCII
//! alphanumerics only), so every spelling of a name shares one key.

use std::collections::HashMap;
use std::sync::LazyLock;

use super::columns::strip_accents;

/// Official department names as published by DANE.
const OFFICIAL_NAMES: &[&str] = &[
    "AMAZONAS",
    "ANTIOQUIA",
    "ARAUCA",
    "ARCHIPIÉLAGO DE SAN ANDRÉS, PROVIDENCIA Y SANTA CATALINA",
    "ATLÁNTICO",
    "BOGOTÁ, D.C.",
    "BOLÍVAR",
    "BOYACÁ",
    "CALDAS",
    "CAQUETÁ",
    "CASANARE",
    "CAUCA",
    "CESAR",
    "CHOCÓ",
    "CÓRDOBA",
    "CUNDINAMARCA",
    "GUAINÍA",
    "GUAVIARE",
    "HUILA",
    "LA GUAJIRA",
    "MAGDALENA",
    "META",
    "NARIÑO",
    "NORTE DE SANTANDER",
    "PUTUMAYO",
    "QUINDÍO",
    "RISARALDA",
    "SANTANDER",
    "SUCRE",
    "TOLIMA",
    "VALLE DEL CAUCA",
    "VAUPÉS",
    "VICHADA",
];

/// Short forms seen in exports, keyed by folded spelling.
const SHORT_FORMS: &[(&str, &str)] = &[
    ("BOGOTA", "BOGOTÁ, D.C."),
    ("BOGOTADISTRITOCAPITAL", "BOGOTÁ, D.C."),
    ("SANANDRES", "ARCHIPIÉLAGO DE SAN ANDRÉS, PROVIDENCIA Y SANTA CATALINA"),
    ("SANANDRESYPROVIDENCIA", "ARCHIPIÉLAGO DE SAN ANDRÉS, PROVIDENCIA Y SANTA CATALINA"),
    ("GUAJIRA", "LA GUAJIRA"),
    ("VALLE", "VALLE DEL CAUCA"),
    ("NSANTANDER", "NORTE DE SANTANDER"),
];

/// Names that exports truncate at a fixed width, keyed by folded prefix.
const TRUNCATED_PREFIXES: &[(&str, &str)] = &[(
    "ARCHIPIELAGODESANANDRES",
    "ARCHIPIÉLAGO DE SAN ANDRÉS, PROVIDENCIA Y SANTA CATALINA",
)];

static OFFICIAL_BY_KEY: LazyLock<HashMap<String, &'static str>> = LazyLock::new(|| {
    OFFICIAL_NAMES
        .iter()
        .map(|name| (fold_key(name), *name))
        .chain(SHORT_FORMS.iter().map(|(key, name)| (key.to_string(), *name)))
        .collect()
});

/// How a category cleans its department column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartmentRule {
    /// Leave values as published.
    Verbatim,
    /// Expand names cut off by a fixed-width export.
    ExpandTruncated,
    /// Map every known spelling onto the official accented name.
    Official,
}

impl DepartmentRule {
    /// Apply the rule to one value; unknown names are returned trimmed.
    pub fn apply(self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self {
            Self::Verbatim => trimmed.to_string(),
            Self::ExpandTruncated => expand_truncated(trimmed)
                .map_or_else(|| trimmed.to_string(), str::to_string),
            Self::Official => official_name(trimmed)
                .or_else(|| expand_truncated(trimmed))
                .map_or_else(|| trimmed.to_string(), str::to_string),
        }
    }
}

/// Uppercase ASCII alphanumerics of `s`, accents folded.
pub fn fold_key(s: &str) -> String {
    strip_accents(s)
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Official name for any known spelling.
pub fn official_name(raw: &str) -> Option<&'static str> {
    OFFICIAL_BY_KEY.get(&fold_key(raw)).copied()
}

fn expand_truncated(raw: &str) -> Option<&'static str> {
    let key = fold_key(raw);
    TRUNCATED_PREFIXES
        .iter()
        .find(|(prefix, _)| key.starts_with(prefix))
        .map(|(_, full)| *full)
}
