//! Per-category schema profiles.
//!
//! One static profile per [`DatasetCategory`] holds everything that differs
//! between the five exports. The normalizer and the router read the profile;
//! neither branches on the category itself.

use crate::models::DatasetCategory;

use super::departments::DepartmentRule;

/// Column holding the department name in every category.
pub const DEPARTMENT_COLUMN: &str = "departamento";

/// Column holding the assigned amount in pesos in every category.
pub const VALUE_COLUMN: &str = "valor_asignado";

/// A computed total: the sum of whichever `parts` are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedTotal {
    pub column: &'static str,
    pub parts: &'static [&'static str],
}

/// Schema rules of one dataset category.
#[derive(Debug)]
pub struct CategoryProfile {
    pub category: DatasetCategory,
    /// Canonical raw header → name used downstream
    pub aliases: &'static [(&'static str, &'static str)],
    /// Columns coerced with `coerce_numeric`
    pub numeric_columns: &'static [&'static str],
    /// Column coerced with `coerce_year`
    pub year_column: &'static str,
    /// Column counting beneficiaries (households or subsidies)
    pub beneficiary_column: &'static str,
    /// Totals computed after coercion, in order
    pub derived: &'static [DerivedTotal],
    /// Cleaning applied to [`DEPARTMENT_COLUMN`]
    pub department_rule: DepartmentRule,
    /// Categorical columns offered as equality filters
    pub filter_columns: &'static [&'static str],
}

impl CategoryProfile {
    /// Final name of a canonical raw header.
    pub fn resolve_column<'a>(&self, canonical: &'a str) -> &'a str {
        self.aliases
            .iter()
            .find(|(from, _)| *from == canonical)
            .map_or(canonical, |(_, to)| *to)
    }

    pub fn is_numeric(&self, column: &str) -> bool {
        self.numeric_columns.contains(&column)
    }

    pub fn is_derived(&self, column: &str) -> bool {
        self.derived.iter().any(|d| d.column == column)
    }
}

static GENERAL: CategoryProfile = CategoryProfile {
    category: DatasetCategory::General,
    aliases: &[
        ("a_o_de_asignaci_n", "ano_de_asignacion"),
        ("ano_asignacion", "ano_de_asignacion"),
        ("estado_de_postulaci_n", "estado_de_postulacion"),
        ("numero_de_hogares", "hogares"),
        ("valor", "valor_asignado"),
    ],
    numeric_columns: &["hogares", "valor_asignado"],
    year_column: "ano_de_asignacion",
    beneficiary_column: "hogares",
    derived: &[],
    department_rule: DepartmentRule::ExpandTruncated,
    filter_columns: &["departamento", "municipio", "programa", "estado_de_postulacion"],
};

static RURAL: CategoryProfile = CategoryProfile {
    category: DatasetCategory::Rural,
    aliases: &[
        ("ano_de_asignacion", "ano"),
        ("vigencia", "ano"),
        ("numero_de_hogares", "hogares"),
        ("hogares_beneficiados", "hogares"),
        ("valor_subsidio", "valor_asignado"),
        ("valor_total", "valor_asignado"),
    ],
    numeric_columns: &["hogares", "valor_asignado"],
    year_column: "ano",
    beneficiary_column: "hogares",
    derived: &[],
    department_rule: DepartmentRule::ExpandTruncated,
    filter_columns: &["departamento", "municipio", "programa"],
};

static MILITARY: CategoryProfile = CategoryProfile {
    category: DatasetCategory::Military,
    aliases: &[
        ("ano", "vigencia"),
        ("ano_de_asignacion", "vigencia"),
        ("ejercito_nacional", "ejercito"),
        ("armada_nacional", "armada"),
        ("fuerza_aerea_colombiana", "fuerza_aerea"),
        ("policia_nacional", "policia"),
        ("valor_total", "valor_asignado"),
    ],
    numeric_columns: &["ejercito", "armada", "fuerza_aerea", "policia", "valor_asignado"],
    year_column: "vigencia",
    beneficiary_column: "total_subsidios",
    derived: &[DerivedTotal {
        column: "total_subsidios",
        parts: &["ejercito", "armada", "fuerza_aerea", "policia"],
    }],
    department_rule: DepartmentRule::Verbatim,
    filter_columns: &["departamento", "municipio"],
};

static IMPROVEMENT_PROGRAM: CategoryProfile = CategoryProfile {
    category: DatasetCategory::ImprovementProgram,
    aliases: &[
        ("n_sfv_asignados", "no_sfv_asignados"),
        ("numero_sfv_asignados", "no_sfv_asignados"),
        ("sfv_asignados", "no_sfv_asignados"),
        ("ano", "ano_asignacion"),
        ("ano_de_asignacion", "ano_asignacion"),
        ("valor", "valor_asignado"),
    ],
    numeric_columns: &["no_sfv_asignados", "valor_asignado"],
    year_column: "ano_asignacion",
    beneficiary_column: "no_sfv_asignados",
    derived: &[],
    department_rule: DepartmentRule::Official,
    filter_columns: &["departamento", "municipio", "modalidad"],
};

static USED_HOUSING: CategoryProfile = CategoryProfile {
    category: DatasetCategory::UsedHousing,
    aliases: &[
        ("vigencia", "ano"),
        ("ano_de_asignacion", "ano"),
        ("vis_urbano", "vis_urbana"),
        ("no_vis_urbano", "no_vis_urbana"),
    ],
    numeric_columns: &[
        "vis_urbana",
        "vis_rural",
        "no_vis_urbana",
        "no_vis_rural",
        "valor_asignado",
    ],
    year_column: "ano",
    beneficiary_column: "total_subsidios",
    derived: &[
        DerivedTotal {
            column: "total_vis",
            parts: &["vis_urbana", "vis_rural"],
        },
        DerivedTotal {
            column: "total_no_vis",
            parts: &["no_vis_urbana", "no_vis_rural"],
        },
        DerivedTotal {
            column: "total_subsidios",
            parts: &["total_vis", "total_no_vis"],
        },
    ],
    department_rule: DepartmentRule::Verbatim,
    filter_columns: &["departamento", "municipio", "entidad"],
};

/// Profile of a category.
pub fn profile(category: DatasetCategory) -> &'static CategoryProfile {
    match category {
        DatasetCategory::General => &GENERAL,
        DatasetCategory::Rural => &RURAL,
        DatasetCategory::Military => &MILITARY,
        DatasetCategory::ImprovementProgram => &IMPROVEMENT_PROGRAM,
        DatasetCategory::UsedHousing => &USED_HOUSING,
    }
}
