//! Column-name canonicalization.
//!
//! Exports of the same table disagree on casing, accents, punctuation and
//! even encoding of the header row. Every header is folded to lowercase
//! ASCII `snake_case` before any category rule looks at it.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static REPEATED_UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_{2,}").expect("static regex"));

/// Decompose to NFD and drop combining marks, so precomposed `ñ` and
/// `n` + U+0303 both fold to `n`.
pub(crate) fn strip_accents(s: &str) -> impl Iterator<Item = char> + '_ {
    s.nfd().filter(|c| !is_combining_mark(*c))
}

/// Canonical form of a raw header.
///
/// Strips a leading BOM, lowercases, transliterates accents, turns spaces,
/// `.`, `-` and any other non-alphanumeric character into `_`, collapses
/// runs of `_` and trims them from both ends. Canonical names map to
/// themselves.
pub fn canonical_column_name(raw: &str) -> String {
    let trimmed = raw.trim_start_matches('\u{feff}').trim();

    let lowered = trimmed.to_lowercase();

    let replaced: String = strip_accents(&lowered)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    REPEATED_UNDERSCORES
        .replace_all(&replaced, "_")
        .trim_matches('_')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalizes_spanish_headers() {
        assert_eq!(canonical_column_name("Año de Asignación"), "ano_de_asignacion");
        assert_eq!(canonical_column_name("No. SFV Asignados"), "no_sfv_asignados");
        assert_eq!(canonical_column_name("Valor-Asignado"), "valor_asignado");
        assert_eq!(canonical_column_name("  DEPARTAMENTO "), "departamento");
        assert_eq!(canonical_column_name("\u{feff}Código DANE"), "codigo_dane");
        assert_eq!(canonical_column_name("Fuerza  Aérea"), "fuerza_aerea");
        assert_eq!(canonical_column_name("Nº Hogares (total)"), "n_hogares_total");
    }

    #[test]
    fn test_decomposed_accents_fold_like_precomposed() {
        assert_eq!(canonical_column_name("An\u{303}o"), "ano");
        assert_eq!(canonical_column_name("A\u{301}rea Urbana"), "area_urbana");
        assert_eq!(
            canonical_column_name("An\u{303}o de Asignacio\u{301}n"),
            canonical_column_name("Año de Asignación")
        );
    }

    #[test]
    fn test_canonical_names_are_fixed_points() {
        for raw in ["a_o_de_asignaci_n", "Año de Asignación", "VIS -- Urbana", "Niño"] {
            let once = canonical_column_name(raw);
            assert_eq!(canonical_column_name(&once), once);
        }
    }
}
