//! Parameter template: named reference sheets (curves, rules, step ladder)

use super::{column_key, load_table, Table};
use crate::config::{FieldMapping, OperationConfig};
use crate::error::{EclError, EclResult};
use crate::rules::ValueType;
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Lower-cased alphanumerics only, used to match portfolio headers to mapping entries
pub fn normalize_field_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Set of reference tables keyed by sheet name
#[derive(Debug, Clone, Default)]
pub struct Template {
    sheets: BTreeMap<String, Table>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.csv` in a directory; the file stem is the sheet name
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> EclResult<Self> {
        Self::load_dir_with_text_columns(dir, &BTreeMap::new())
    }

    /// Load a directory, keeping the configured code columns as text
    pub fn load_dir_for<P: AsRef<Path>>(dir: P, config: &OperationConfig) -> EclResult<Self> {
        Self::load_dir_with_text_columns(dir, &config.sheet_text_columns())
    }

    /// Load a directory; `text_columns` lists, per sheet name (case-insensitive),
    /// the columns kept as text
    pub fn load_dir_with_text_columns<P: AsRef<Path>>(
        dir: P,
        text_columns: &BTreeMap<String, Vec<String>>,
    ) -> EclResult<Self> {
        let mut template = Self::new();
        let mut paths: Vec<_> = std::fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        for path in paths {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let wanted = name.trim().to_lowercase();
            let forced: &[String] = text_columns
                .iter()
                .find(|(sheet, _)| sheet.trim().to_lowercase() == wanted)
                .map(|(_, cols)| cols.as_slice())
                .unwrap_or(&[]);
            let table = load_table(&path, forced)?;
            debug!("Loaded sheet '{}' ({} rows)", name, table.n_rows());
            template.insert(name, table);
        }
        info!("Loaded template with {} sheet(s) from {}", template.sheets.len(), dir.as_ref().display());
        Ok(template)
    }

    pub fn insert(&mut self, name: impl Into<String>, table: Table) {
        self.sheets.insert(name.into(), table);
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }

    /// Look up a sheet by exact name, then case-insensitively
    pub fn sheet(&self, name: &str) -> Option<&Table> {
        self.sheets.get(name).or_else(|| {
            let wanted = name.trim().to_lowercase();
            self.sheets
                .iter()
                .find(|(k, _)| k.trim().to_lowercase() == wanted)
                .map(|(_, t)| t)
        })
    }

    pub fn require_sheet(&self, name: &str) -> EclResult<&Table> {
        self.sheet(name).ok_or_else(|| EclError::MissingSheet {
            sheet: name.to_string(),
        })
    }

    /// Check required sheets and their mandatory columns
    pub fn validate(&self, config: &OperationConfig) -> EclResult<()> {
        for name in &config.required_sheets {
            self.require_sheet(name)?;
        }
        for (name, columns) in &config.sheet_required_columns {
            if let Some(sheet) = self.sheet(name) {
                let missing = sheet.missing_columns(columns);
                if !missing.is_empty() {
                    return Err(EclError::missing_columns(name.clone(), missing));
                }
            }
        }
        Ok(())
    }

    /// Rename portfolio columns to calculator names using the field-mapping sheet
    ///
    /// Returns the number of renamed columns. Absent mapping sheet is a no-op.
    pub fn rename_portfolio_fields(&self, portfolio: &mut Table, mapping: &FieldMapping) -> usize {
        let Some(sheet) = self.sheet(&mapping.sheet) else {
            return 0;
        };
        let (Some(calc), Some(sim)) = (
            sheet.column(&mapping.calculator_column),
            sheet.column(&mapping.simulation_column),
        ) else {
            return 0;
        };

        let by_normalized: HashMap<String, String> = portfolio
            .column_names()
            .iter()
            .map(|n| (normalize_field_name(n), n.clone()))
            .collect();

        let mut renamed = 0;
        for (calc_name, sim_name) in calc.iter().zip(sim) {
            let (Some(calc_name), Some(sim_name)) = (calc_name.as_text(), sim_name.as_text()) else {
                continue;
            };
            if let Some(current) = by_normalized.get(&normalize_field_name(&sim_name)) {
                if column_key(current) != column_key(&calc_name) && portfolio.rename_column(current, &calc_name) {
                    debug!("Mapped portfolio column {} -> {}", current, column_key(&calc_name));
                    renamed += 1;
                }
            }
        }
        renamed
    }

    /// Declared value type per calculator column, from the field-mapping sheet
    pub fn value_types(&self, mapping: &FieldMapping) -> HashMap<String, ValueType> {
        let mut out = HashMap::new();
        let Some(sheet) = self.sheet(&mapping.sheet) else {
            return out;
        };
        let (Some(calc), Some(types)) = (
            sheet.column(&mapping.calculator_column),
            sheet.column(&mapping.value_type_column),
        ) else {
            return out;
        };
        for (name, vt) in calc.iter().zip(types) {
            if let (Some(name), Some(vt)) = (name.as_text(), vt.as_text().and_then(|t| ValueType::parse(&t))) {
                out.insert(column_key(&name), vt);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperationConfig;
    use crate::table::Value;

    #[test]
    fn test_normalize_field_name() {
        assert_eq!(normalize_field_name("Exposure End-Date"), "exposureenddate");
        assert_eq!(normalize_field_name("AS_OF_DATE"), "asofdate");
    }

    #[test]
    fn test_missing_sheet_is_fatal() {
        let op = OperationConfig::non_retail_performing();
        let err = Template::new().validate(&op).unwrap_err();
        assert!(matches!(err, EclError::MissingSheet { .. }));
    }

    #[test]
    fn test_sheet_lookup_case_insensitive() {
        let mut t = Template::new();
        t.insert("F2-Mapping time steps", Table::new());
        assert!(t.sheet("f2-mapping TIME steps").is_some());
        assert!(t.require_sheet("F5-Segmentation Rules").is_err());
    }

    #[test]
    fn test_load_dir_keeps_padded_codes() {
        let op = OperationConfig::non_retail_performing();
        let dir = std::env::temp_dir().join(format!("ifrs9_ecl_template_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(format!("{}.csv", op.pd.sheet)),
            "SEGMENT,RATING,SCENARIO,PD_1\n001,01,BASE,0.01\n002,02,BASE,0.02\n",
        )
        .unwrap();

        let plain = Template::load_dir(&dir).unwrap();
        assert_eq!(plain.sheet(&op.pd.sheet).unwrap().value(0, "SEGMENT"), Some(&Value::Number(1.0)));

        let typed = Template::load_dir_for(&dir, &op).unwrap();
        let pd = typed.sheet(&op.pd.sheet).unwrap();
        assert_eq!(pd.value(0, "SEGMENT"), Some(&Value::Text("001".into())));
        assert_eq!(pd.value(1, "RATING"), Some(&Value::Text("02".into())));
        assert_eq!(pd.value(0, "PD_1"), Some(&Value::Number(0.01)));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_rename_portfolio_fields() {
        let mapping = Table::from_rows(
            &["CALCULATOR_COLUMN_NAME", "SIMULATION_DATA_COLUMN_NAME", "VALUE_TYPE"],
            vec![
                vec!["EXPOSURE_END_DATE".into(), "Maturity Date".into(), "DATE".into()],
                vec!["RATING_GRADE".into(), "grade".into(), "string".into()],
            ],
        )
        .unwrap();
        let mut template = Template::new();
        template.insert("F1-Mapping fields Non Retail", mapping);

        let mut portfolio = Table::from_rows(
            &["CONTRACT_ID", "MATURITY_DATE", "GRADE"],
            vec![vec!["C1".into(), "2030-01-01".into(), Value::from("A")]],
        )
        .unwrap();

        let op = OperationConfig::non_retail_performing();
        let fm = &op.field_mapping;
        assert_eq!(template.rename_portfolio_fields(&mut portfolio, fm), 2);
        assert!(portfolio.has_column("EXPOSURE_END_DATE"));
        assert!(portfolio.has_column("RATING_GRADE"));

        let types = template.value_types(fm);
        assert_eq!(types.get("EXPOSURE_END_DATE"), Some(&ValueType::Date));
        assert_eq!(types.get("RATING_GRADE"), Some(&ValueType::String));
    }
}
