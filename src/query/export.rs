//! CSV export of a view.

use crate::models::{DatasetCategory, Result, SubsidiosError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use super::QueryView;

/// `subsidios_vivienda_<category>_<YYYYMMDD>.csv`
pub fn export_filename(category: DatasetCategory, date: &str) -> String {
    format!(
        "subsidios_vivienda_{}_{}.csv",
        category.slug().replace('-', "_"),
        date
    )
}

impl QueryView<'_> {
    /// Write the view as UTF-8 CSV: the dataset's columns in order, one line
    /// per row, missing cells empty.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        let columns = self.dataset().columns();

        csv_writer.write_record(columns)?;
        for row in self.rows() {
            csv_writer.write_record(columns.iter().map(|c| row.get(c).render()))?;
        }

        csv_writer
            .flush()
            .map_err(|e| SubsidiosError::io("flushing CSV export", e))
    }

    /// Write the view to `dir` under [`export_filename`] and return the path.
    pub fn export_to_dir(&self, dir: &Path, date: &str) -> Result<PathBuf> {
        let path = dir.join(export_filename(self.dataset().category(), date));
        let file = File::create(&path).map_err(|e| SubsidiosError::io("creating export file", e))?;

        self.write_csv(BufWriter::new(file))?;

        info!(path = %path.display(), records = self.len(), "Exported view");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Dataset, Record, Value};
    use crate::query::Filter;

    fn dataset() -> Dataset {
        let mut first = Record::new();
        first.insert("departamento", "BOGOTÁ, D.C.");
        first.insert("no_sfv_asignados", 12.0);
        first.insert("ano_asignacion", Value::Integer(2023));

        let mut second = Record::new();
        second.insert("departamento", "CESAR");
        second.insert("ano_asignacion", Value::Integer(2022));

        Dataset::new(
            DatasetCategory::ImprovementProgram,
            ["departamento", "no_sfv_asignados", "ano_asignacion"]
                .map(String::from)
                .to_vec(),
            vec![first, second],
        )
    }

    #[test]
    fn test_filename_embeds_category_and_date() {
        assert_eq!(
            export_filename(DatasetCategory::UsedHousing, "20261019"),
            "subsidios_vivienda_used_housing_20261019.csv"
        );
    }

    #[test]
    fn test_csv_quotes_and_leaves_missing_empty() {
        let dataset = dataset();
        let mut out = Vec::new();
        QueryView::new(&dataset).write_csv(&mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "departamento,no_sfv_asignados,ano_asignacion\n\
             \"BOGOTÁ, D.C.\",12,2023\n\
             CESAR,,2022\n"
        );
    }

    #[test]
    fn test_export_filtered_view_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dataset();
        let cesar = Filter::new().with_equals("departamento", "CESAR");
        let view = QueryView::new(&dataset).filter(&cesar);

        let path = view.export_to_dir(dir.path(), "20260217").unwrap();

        assert_eq!(
            path.file_name().unwrap(),
            "subsidios_vivienda_improvement_program_20260217.csv"
        );
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 2);
        assert!(written.ends_with("CESAR,,2022\n"));
    }
}
