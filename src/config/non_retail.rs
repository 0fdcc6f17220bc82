//! Non Retail Performing (S1+S2) layout

use super::{
    FieldMapping, JoinKey, OperationConfig, PortfolioColumns, SegmentTarget, SegmentationSource, TermSource,
    TimeStepsSource, TypeModel,
};
use crate::amortization::{AmortizationCategory, AmortizationType};
use crate::discount::DiscountConvention;
use std::collections::BTreeMap;

pub const MAPPING_FIELDS_SHEET: &str = "F1-Mapping fields Non Retail";
pub const TIME_STEPS_SHEET: &str = "F2-Mapping time steps";
pub const SEGMENTATION_SHEET: &str = "F5-Segmentation Rules";
pub const PD_SHEET: &str = "F6-PD S1S2 Non Retail";
pub const LGD_SHEET: &str = "F8-LGD S1S2 Non Retail";
pub const CCF_SHEET: &str = "F12-CCF Non Retail";

fn cols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn target(model: TypeModel, target_column: &str, seed: &str, curve_sheet: &str, curve_segment: &str) -> SegmentTarget {
    SegmentTarget {
        type_model: model,
        target_column: target_column.into(),
        seed_column: Some(seed.into()),
        curve_sheet: curve_sheet.into(),
        curve_segment_column: curve_segment.into(),
        multi_match_column: format!("MULTI_MATCH_{}", model.as_str()),
    }
}

impl OperationConfig {
    /// Default configuration for Non Retail performing exposures
    pub fn non_retail_performing() -> Self {
        let mut sheet_required_columns = BTreeMap::new();
        sheet_required_columns.insert(TIME_STEPS_SHEET.to_string(), cols(&["STEP", "NB_MONTHS"]));
        sheet_required_columns.insert(SEGMENTATION_SHEET.to_string(), cols(&["SEGMENT", "TYPE_MODEL"]));
        sheet_required_columns.insert(PD_SHEET.to_string(), cols(&["SEGMENT", "SCENARIO", "RATING"]));
        sheet_required_columns.insert(LGD_SHEET.to_string(), cols(&["IFRS9_MODEL_CODE", "SCENARIO"]));
        sheet_required_columns.insert(CCF_SHEET.to_string(), cols(&["IFRS9_MODEL_CODE", "SCENARIO"]));
        sheet_required_columns.insert(
            MAPPING_FIELDS_SHEET.to_string(),
            cols(&["CALCULATOR_COLUMN_NAME", "SIMULATION_DATA_COLUMN_NAME"]),
        );

        let mut amortization = BTreeMap::new();
        amortization.insert(AmortizationCategory::OffBalance, AmortizationType::OffBalance);
        amortization.insert(AmortizationCategory::OnBalanceInfine, AmortizationType::InFine);
        amortization.insert(AmortizationCategory::OnBalanceLinear, AmortizationType::Annuity);

        let mut discounting = BTreeMap::new();
        discounting.insert(AmortizationCategory::OnBalanceLinear, DiscountConvention::Quarterly);
        discounting.insert(AmortizationCategory::OnBalanceInfine, DiscountConvention::Daily);
        discounting.insert(AmortizationCategory::OffBalance, DiscountConvention::Daily);

        Self {
            required_sheets: cols(&[TIME_STEPS_SHEET, SEGMENTATION_SHEET, PD_SHEET, LGD_SHEET, CCF_SHEET]),
            sheet_required_columns,
            required_portfolio_columns: cols(&["CONTRACT_ID", "AS_OF_DATE", "EXPOSURE_END_DATE", "PROVISIONING_BASIS"]),
            portfolio: PortfolioColumns::default(),
            field_mapping: FieldMapping {
                sheet: MAPPING_FIELDS_SHEET.into(),
                calculator_column: "CALCULATOR_COLUMN_NAME".into(),
                simulation_column: "SIMULATION_DATA_COLUMN_NAME".into(),
                value_type_column: "VALUE_TYPE".into(),
            },
            time_steps: TimeStepsSource {
                sheet: TIME_STEPS_SHEET.into(),
                step_column: "STEP".into(),
                months_column: "NB_MONTHS".into(),
            },
            segmentation: SegmentationSource {
                sheet: SEGMENTATION_SHEET.into(),
                segment_column: "SEGMENT".into(),
                type_model_column: "TYPE_MODEL".into(),
                check_curve_existence: true,
                targets: vec![
                    target(TypeModel::Pd, "SEGMENT_PD", "IFRS9_PD_MODEL_AFTER_CRM", PD_SHEET, "SEGMENT"),
                    target(TypeModel::Lgd, "SEGMENT_LGD", "IFRS9_LGD_MODEL_AFTER_CRM", LGD_SHEET, "IFRS9_MODEL_CODE"),
                    target(TypeModel::Ccf, "SEGMENT_CCF", "PRODUCT_CODE", CCF_SHEET, "IFRS9_MODEL_CODE"),
                ],
            },
            pd: TermSource {
                sheet: PD_SHEET.into(),
                prefix: "PD".into(),
                scenario_column: "SCENARIO".into(),
                join_keys: vec![JoinKey::new("SEGMENT_PD", "SEGMENT"), JoinKey::new("CALCULATION_RATING", "RATING")],
                flat_rate_column: None,
                fallback_column: None,
            },
            lgd: TermSource {
                sheet: LGD_SHEET.into(),
                prefix: "LGD".into(),
                scenario_column: "SCENARIO".into(),
                join_keys: vec![JoinKey::new("SEGMENT_LGD", "IFRS9_MODEL_CODE")],
                flat_rate_column: Some("LGD_WITHOUT_TIME".into()),
                fallback_column: Some("LGD_VALUE".into()),
            },
            ccf: TermSource {
                sheet: CCF_SHEET.into(),
                prefix: "CCF".into(),
                scenario_column: "SCENARIO".into(),
                join_keys: vec![JoinKey::new("SEGMENT_CCF", "IFRS9_MODEL_CODE")],
                flat_rate_column: Some("CCF_WITHOUT_TIME".into()),
                fallback_column: Some("CCF".into()),
            },
            amortization,
            discounting,
            one_year_months: 12,
            rounding_decimals: 7,
            max_maturity_months: super::DEFAULT_MAX_MATURITY_MONTHS,
        }
    }
}
