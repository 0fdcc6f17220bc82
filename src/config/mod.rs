//! Engine configuration
//!
//! One [`OperationConfig`] per (operation type, operation status) key. The
//! configuration is immutable once built and handed to the engine at
//! construction; defaults carry the Non Retail Performing (S1+S2) layout.

pub mod non_retail;

use crate::amortization::{AmortizationCategory, AmortizationType};
use crate::discount::DiscountConvention;
use crate::error::{EclError, EclResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Portfolio family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    NonRetail,
    Retail,
}

/// Credit status of the exposures in scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    /// Stage 1 and stage 2
    Performing,
    /// Stage 3
    Defaulted,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::NonRetail => write!(f, "Non Retail"),
            OperationType::Retail => write!(f, "Retail"),
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Performing => write!(f, "Performing"),
            OperationStatus::Defaulted => write!(f, "Defaulted"),
        }
    }
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match squash(s).as_str() {
            "nonretail" => Ok(OperationType::NonRetail),
            "retail" => Ok(OperationType::Retail),
            _ => Err(format!("Unknown operation type: {}", s)),
        }
    }
}

impl FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match squash(s).as_str() {
            "performing" | "s1s2" => Ok(OperationStatus::Performing),
            "defaulted" | "default" | "s3" => Ok(OperationStatus::Defaulted),
            _ => Err(format!("Unknown operation status: {}", s)),
        }
    }
}

/// Risk-parameter family a segmentation rule feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TypeModel {
    Pd,
    Lgd,
    Ccf,
}

impl TypeModel {
    pub const ALL: [TypeModel; 3] = [TypeModel::Pd, TypeModel::Lgd, TypeModel::Ccf];

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeModel::Pd => "PD",
            TypeModel::Lgd => "LGD",
            TypeModel::Ccf => "CCF",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PD" => Some(TypeModel::Pd),
            "LGD" => Some(TypeModel::Lgd),
            "CCF" => Some(TypeModel::Ccf),
            _ => None,
        }
    }
}

impl fmt::Display for TypeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Portfolio column names the calculation reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioColumns {
    pub contract_id: String,
    pub as_of_date: String,
    pub maturity_date: String,
    pub interest_rate: String,
    pub provisioning_basis: String,
    pub accounting_type: String,
    pub amortization_type: String,
}

impl Default for PortfolioColumns {
    fn default() -> Self {
        Self {
            contract_id: "CONTRACT_ID".into(),
            as_of_date: "AS_OF_DATE".into(),
            maturity_date: "EXPOSURE_END_DATE".into(),
            interest_rate: "CONTRACTUAL_CLIENT_RATE".into(),
            provisioning_basis: "PROVISIONING_BASIS".into(),
            accounting_type: "ACCOUNTING_TYPE".into(),
            amortization_type: "AMORTIZATION_TYPE".into(),
        }
    }
}

/// Field-mapping sheet layout (simulation column -> calculator column)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub sheet: String,
    pub calculator_column: String,
    pub simulation_column: String,
    pub value_type_column: String,
}

/// Step ladder sheet layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeStepsSource {
    pub sheet: String,
    pub step_column: String,
    pub months_column: String,
}

/// Where a segmentation rule writes, and which curve must define its segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentTarget {
    pub type_model: TypeModel,
    /// Portfolio column receiving the segment label
    pub target_column: String,
    /// Portfolio column copied into the target before rules run
    pub seed_column: Option<String>,
    /// Curve sheet that must define the segment for the rule to be kept
    pub curve_sheet: String,
    pub curve_segment_column: String,
    /// Set to 1 when several rules matched the row
    pub multi_match_column: String,
}

/// Rule sheet layout and targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationSource {
    pub sheet: String,
    pub segment_column: String,
    pub type_model_column: String,
    /// Drop rules whose segment is missing from the target curve sheet
    pub check_curve_existence: bool,
    pub targets: Vec<SegmentTarget>,
}

impl SegmentationSource {
    pub fn target(&self, model: TypeModel) -> Option<&SegmentTarget> {
        self.targets.iter().find(|t| t.type_model == model)
    }
}

/// Portfolio column joined to a curve column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinKey {
    pub portfolio: String,
    pub curve: String,
}

impl JoinKey {
    pub fn new(portfolio: &str, curve: &str) -> Self {
        Self {
            portfolio: portfolio.into(),
            curve: curve.into(),
        }
    }
}

/// Curve sheet for one risk parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermSource {
    pub sheet: String,
    /// Step column prefix: `PD` reads `PD_1..PD_N` (and `TIME_STEP_N`)
    pub prefix: String,
    pub scenario_column: String,
    pub join_keys: Vec<JoinKey>,
    /// Curve column carrying a single rate for all steps
    pub flat_rate_column: Option<String>,
    /// Portfolio column used when the curve gives nothing
    pub fallback_column: Option<String>,
}

/// Everything the engine needs for one operation key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationConfig {
    pub required_sheets: Vec<String>,
    pub sheet_required_columns: BTreeMap<String, Vec<String>>,
    pub required_portfolio_columns: Vec<String>,
    pub portfolio: PortfolioColumns,
    pub field_mapping: FieldMapping,
    pub time_steps: TimeStepsSource,
    pub segmentation: SegmentationSource,
    pub pd: TermSource,
    pub lgd: TermSource,
    pub ccf: TermSource,
    /// EAD profile per amortization category
    pub amortization: BTreeMap<AmortizationCategory, AmortizationType>,
    /// Discount convention per amortization category (absent = daily)
    pub discounting: BTreeMap<AmortizationCategory, DiscountConvention>,
    /// Horizon of the 1-year ECL, in months
    pub one_year_months: u32,
    /// Decimal places PD/LGD/CCF are rounded to before multiplication
    pub rounding_decimals: i32,
    /// Residual maturities are capped here (open-ended maturity sentinels)
    #[serde(default = "default_max_maturity_months")]
    pub max_maturity_months: u32,
}

pub const DEFAULT_MAX_MATURITY_MONTHS: u32 = 600;

fn default_max_maturity_months() -> u32 {
    DEFAULT_MAX_MATURITY_MONTHS
}

impl OperationConfig {
    pub fn term_sources(&self) -> [(TypeModel, &TermSource); 3] {
        [
            (TypeModel::Pd, &self.pd),
            (TypeModel::Lgd, &self.lgd),
            (TypeModel::Ccf, &self.ccf),
        ]
    }

    /// Template columns holding codes: segment labels, join keys, scenarios
    ///
    /// Loaded as text so zero-padded codes such as `001` survive.
    pub fn sheet_text_columns(&self) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut add = |sheet: &str, column: &str| {
            let columns = out.entry(sheet.to_string()).or_default();
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        };
        let seg = &self.segmentation;
        add(&seg.sheet, &seg.segment_column);
        add(&seg.sheet, &seg.type_model_column);
        for target in &seg.targets {
            add(&target.curve_sheet, &target.curve_segment_column);
        }
        for (_, source) in self.term_sources() {
            add(&source.sheet, &source.scenario_column);
            for key in &source.join_keys {
                add(&source.sheet, &key.curve);
            }
        }
        out
    }

    /// Portfolio columns holding identifiers and join codes
    pub fn portfolio_text_columns(&self) -> Vec<String> {
        let mut out = vec![self.portfolio.contract_id.clone()];
        let seg = &self.segmentation;
        let targets = seg
            .targets
            .iter()
            .flat_map(|t| std::iter::once(t.target_column.clone()).chain(t.seed_column.clone()));
        let keys = self
            .term_sources()
            .into_iter()
            .flat_map(|(_, s)| s.join_keys.iter().map(|k| k.portfolio.clone()).collect::<Vec<_>>());
        for column in targets.chain(keys) {
            if !out.contains(&column) {
                out.push(column);
            }
        }
        out
    }
}

/// Configuration entry for one operation key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEntry {
    pub operation_type: OperationType,
    pub operation_status: OperationStatus,
    pub config: OperationConfig,
}

/// All configured operation keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub operations: Vec<OperationEntry>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operations: vec![OperationEntry {
                operation_type: OperationType::NonRetail,
                operation_status: OperationStatus::Performing,
                config: OperationConfig::non_retail_performing(),
            }],
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file
    pub fn from_json_path<P: AsRef<Path>>(path: P) -> EclResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> EclResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_string(&self) -> EclResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Configuration for a key; unconfigured keys are unsupported
    pub fn get(&self, operation_type: OperationType, operation_status: OperationStatus) -> EclResult<&OperationConfig> {
        self.operations
            .iter()
            .find(|e| e.operation_type == operation_type && e.operation_status == operation_status)
            .map(|e| &e.config)
            .ok_or_else(|| EclError::UnsupportedOperation {
                operation_type: operation_type.to_string(),
                operation_status: operation_status.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_key_is_supported() {
        let config = EngineConfig::default();
        let op = config.get(OperationType::NonRetail, OperationStatus::Performing).unwrap();
        assert_eq!(op.one_year_months, 12);
        assert_eq!(op.rounding_decimals, 7);
        assert_eq!(op.pd.sheet, "F6-PD S1S2 Non Retail");
    }

    #[test]
    fn test_retail_is_unsupported() {
        let config = EngineConfig::default();
        let err = config.get(OperationType::Retail, OperationStatus::Performing).unwrap_err();
        assert!(matches!(err, EclError::UnsupportedOperation { .. }));
        let err = config.get(OperationType::NonRetail, OperationStatus::Defaulted).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported operation: Non Retail / Defaulted");
    }

    #[test]
    fn test_json_roundtrip_keeps_maps() {
        let config = EngineConfig::default();
        let json = config.to_json_string().unwrap();
        assert!(json.contains("ON_BALANCE_LINEAR"));
        let back = EngineConfig::from_json_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_operation_key_parsing() {
        assert_eq!("non-retail".parse::<OperationType>(), Ok(OperationType::NonRetail));
        assert_eq!("Non Retail".parse::<OperationType>(), Ok(OperationType::NonRetail));
        assert_eq!("S1S2".parse::<OperationStatus>(), Ok(OperationStatus::Performing));
        assert!("corporate".parse::<OperationType>().is_err());
    }

    #[test]
    fn test_code_columns_loaded_as_text() {
        let op = OperationConfig::non_retail_performing();
        let sheets = op.sheet_text_columns();
        assert_eq!(
            sheets.get(op.pd.sheet.as_str()),
            Some(&vec!["SEGMENT".to_string(), "SCENARIO".to_string(), "RATING".to_string()])
        );
        assert!(sheets[op.lgd.sheet.as_str()].contains(&"IFRS9_MODEL_CODE".to_string()));

        let portfolio = op.portfolio_text_columns();
        assert_eq!(portfolio[0], "CONTRACT_ID");
        assert!(portfolio.contains(&"CALCULATION_RATING".to_string()));
        assert!(portfolio.contains(&"PRODUCT_CODE".to_string()));
        assert_eq!(portfolio.iter().filter(|c| *c == "SEGMENT_PD").count(), 1);
    }

    #[test]
    fn test_max_maturity_defaults_when_absent() {
        let json = EngineConfig::default().to_json_string().unwrap();
        let stripped = json.replace("\"max_maturity_months\": 600", "\"max_maturity_months_unused\": 0");
        let back = EngineConfig::from_json_str(&stripped).unwrap();
        assert_eq!(back.operations[0].config.max_maturity_months, DEFAULT_MAX_MATURITY_MONTHS);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let err = EngineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, EclError::Config(_)));
    }
}
