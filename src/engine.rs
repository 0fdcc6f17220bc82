//! ECL engine: runs the full pipeline for one operation key
//!
//! portfolio → field mapping → time steps → segmentation → amortization
//! categories → discount factors → per scenario PD/LGD/CCF terms, EAD and ECL.
//! The portfolio comes back augmented; nothing is ever dropped.

use crate::amortization::{assign_categories, compute_ead, AmortizationCategory};
use crate::config::{EngineConfig, OperationConfig, OperationStatus, OperationType};
use crate::discount::compute_discount_factors;
use crate::ecl::{EclAggregator, EclTotals, ScenarioEcl};
use crate::error::{EclError, EclResult};
use crate::rules::{apply_segmentation, build_rules, curve_segments, SegmentationSummary};
use crate::scenario::{calcul_ecl_multi, MultiEcl, ScenarioWeights};
use crate::table::{StepMatrix, Table, Template};
use crate::terms::{build_terms, collect_scenarios, validate_pd_mapping, PdMappingReport};
use crate::time_steps::{apply_time_steps, StepLadder, TimeSteps};
use log::info;
use serde::Serialize;

/// Step matrices of one scenario
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioTerms {
    pub scenario: String,
    pub pd: StepMatrix,
    pub lgd: StepMatrix,
    /// Rounded CCF, as used for EAD
    pub ccf: StepMatrix,
    pub ead: StepMatrix,
    pub ecl: ScenarioEcl,
}

/// Portfolio after segmentation, before any scenario is computed
#[derive(Debug, Clone)]
struct Prepared {
    portfolio: Table,
    time_steps: TimeSteps,
    scenarios: Vec<String>,
    segmentation: Vec<SegmentationSummary>,
    renamed_fields: usize,
}

/// Output of a full run
#[derive(Debug, Clone)]
pub struct EclRun {
    pub portfolio: Table,
    pub time_steps: TimeSteps,
    pub scenarios: Vec<String>,
    pub categories: Vec<AmortizationCategory>,
    pub discount: StepMatrix,
    pub terms: Vec<ScenarioTerms>,
    pub segmentation: Vec<SegmentationSummary>,
    pub pd_reports: Vec<PdMappingReport>,
    pub multi: Option<MultiEcl>,
}

impl EclRun {
    pub fn scenario(&self, name: &str) -> Option<&ScenarioTerms> {
        let wanted = name.trim().to_uppercase();
        self.terms.iter().find(|t| t.scenario == wanted)
    }

    pub fn totals(&self) -> Vec<EclTotals> {
        self.terms.iter().map(|t| t.ecl.totals()).collect()
    }

    /// Probability-weighted ECL over every computed scenario
    pub fn apply_weights(&mut self, weights: &ScenarioWeights) -> EclResult<&MultiEcl> {
        let multi = calcul_ecl_multi(&mut self.portfolio, &self.scenarios, weights)?;
        Ok(self.multi.insert(multi))
    }

    /// Export DF_i plus PD/LGD/CCF/EAD step columns
    ///
    /// With a single scenario the columns are `{PREFIX}_{i}`; with several,
    /// `{PREFIX}_{SCENARIO}_{i}`.
    pub fn write_term_columns(&mut self) -> EclResult<()> {
        self.discount.write_columns(&mut self.portfolio, "DF")?;
        let qualify = self.terms.len() > 1;
        for t in &self.terms {
            let prefix = |p: &str| {
                if qualify {
                    format!("{}_{}", p, t.scenario)
                } else {
                    p.to_string()
                }
            };
            t.pd.write_columns(&mut self.portfolio, &prefix("PD"))?;
            t.lgd.write_columns(&mut self.portfolio, &prefix("LGD"))?;
            t.ccf.write_columns(&mut self.portfolio, &prefix("CCF"))?;
            t.ead.write_columns(&mut self.portfolio, &prefix("EAD"))?;
        }
        Ok(())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            rows: self.portfolio.n_rows(),
            scenarios: self.scenarios.clone(),
            step_months: self.time_steps.step_months.clone(),
            totals: self.totals(),
            weighted: self.multi.as_ref().map(|m| WeightedTotals {
                ecl_1y: m.total_1y(),
                ecl_lt: m.total_lt(),
            }),
            segmentation: self.segmentation.clone(),
            pd_reports: self.pd_reports.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedTotals {
    pub ecl_1y: f64,
    pub ecl_lt: f64,
}

/// Serializable digest of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub rows: usize,
    pub scenarios: Vec<String>,
    pub step_months: Vec<u32>,
    pub totals: Vec<EclTotals>,
    pub weighted: Option<WeightedTotals>,
    pub segmentation: Vec<SegmentationSummary>,
    pub pd_reports: Vec<PdMappingReport>,
}

/// Findings of a validation-only pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    pub rows: usize,
    pub renamed_fields: usize,
    pub scenarios: Vec<String>,
    pub step_months: Vec<u32>,
    pub rows_without_dates: usize,
    pub segmentation: Vec<SegmentationSummary>,
    pub pd_reports: Vec<PdMappingReport>,
}

impl CheckReport {
    pub fn is_valid(&self) -> bool {
        self.pd_reports.iter().all(PdMappingReport::is_valid)
    }
}

/// ECL engine bound to a template and one operation configuration
#[derive(Debug, Clone)]
pub struct EclEngine {
    template: Template,
    config: OperationConfig,
}

impl EclEngine {
    /// Bind a template to a configuration; the template is validated here
    pub fn new(template: Template, config: OperationConfig) -> EclResult<Self> {
        template.validate(&config)?;
        Ok(Self { template, config })
    }

    /// Pick the configuration of an operation key
    pub fn from_engine_config(
        template: Template,
        config: &EngineConfig,
        operation_type: OperationType,
        operation_status: OperationStatus,
    ) -> EclResult<Self> {
        let op = config.get(operation_type, operation_status)?;
        Self::new(template, op.clone())
    }

    pub fn config(&self) -> &OperationConfig {
        &self.config
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Portfolio must be non-empty and carry the required columns
    pub fn validate_portfolio(&self, portfolio: &Table) -> EclResult<()> {
        if portfolio.is_empty() {
            return Err(EclError::EmptyPortfolio);
        }
        let missing = portfolio.missing_columns(&self.config.required_portfolio_columns);
        if !missing.is_empty() {
            return Err(EclError::missing_columns("portfolio", missing));
        }
        Ok(())
    }

    fn prepare(&self, mut portfolio: Table) -> EclResult<Prepared> {
        let config = &self.config;
        let renamed_fields = self
            .template
            .rename_portfolio_fields(&mut portfolio, &config.field_mapping);
        if renamed_fields > 0 {
            info!("Field mapping: {} portfolio column(s) renamed", renamed_fields);
        }
        self.validate_portfolio(&portfolio)?;

        let ladder = StepLadder::from_table(self.template.require_sheet(&config.time_steps.sheet)?, &config.time_steps)?;
        let time_steps = apply_time_steps(&mut portfolio, &ladder, &config.portfolio, config.max_maturity_months)?;

        let scenarios = collect_scenarios(&self.template, config);
        info!("Scenarios: {}", scenarios.join(", "));

        let source = &config.segmentation;
        let rule_sheet = self.template.require_sheet(&source.sheet)?;
        let value_types = self.template.value_types(&config.field_mapping);
        let curves = source
            .check_curve_existence
            .then(|| curve_segments(&self.template, source));
        let rules = build_rules(rule_sheet, source, &value_types, curves.as_ref());
        let segmentation = apply_segmentation(&mut portfolio, &rules, source)?;

        Ok(Prepared {
            portfolio,
            time_steps,
            scenarios,
            segmentation,
            renamed_fields,
        })
    }

    /// Full ECL run over every scenario found in the curve sheets
    pub fn run(&self, portfolio: Table) -> EclResult<EclRun> {
        let config = &self.config;
        let columns = &config.portfolio;
        let Prepared {
            mut portfolio,
            time_steps,
            scenarios,
            segmentation,
            ..
        } = self.prepare(portfolio)?;

        let n = portfolio.n_rows();
        let width = time_steps.max_steps();
        let categories = assign_categories(&mut portfolio, columns)?;
        let rates = portfolio
            .numbers(&columns.interest_rate)
            .unwrap_or_else(|| vec![f64::NAN; n]);
        let basis = portfolio
            .numbers(&columns.provisioning_basis)
            .unwrap_or_else(|| vec![f64::NAN; n]);
        let as_of_dates = portfolio
            .dates(&columns.as_of_date)
            .unwrap_or_else(|| vec![None; n]);
        let maturity_dates = portfolio
            .dates(&columns.maturity_date)
            .unwrap_or_else(|| vec![None; n]);

        let discount = compute_discount_factors(
            &categories,
            &config.discounting,
            &rates,
            &as_of_dates,
            &maturity_dates,
            &time_steps.step_months,
        );

        let aggregator = EclAggregator::new(
            time_steps.step_months.clone(),
            config.one_year_months,
            config.rounding_decimals,
        );
        let pd_curve = self.template.require_sheet(&config.pd.sheet)?;
        let lgd_curve = self.template.require_sheet(&config.lgd.sheet)?;
        let ccf_curve = self.template.require_sheet(&config.ccf.sheet)?;

        let mut terms = Vec::with_capacity(scenarios.len());
        let mut pd_reports = Vec::with_capacity(scenarios.len());
        for scenario in &scenarios {
            let (pd_lookup, pd) = build_terms(&portfolio, pd_curve, scenario, &config.pd, width)?;
            let (_, lgd) = build_terms(&portfolio, lgd_curve, scenario, &config.lgd, width)?;
            let (_, ccf) = build_terms(&portfolio, ccf_curve, scenario, &config.ccf, width)?;
            pd_reports.push(validate_pd_mapping(scenario, &pd_lookup, &pd, &time_steps.nb_steps));

            let ccf = aggregator.round_terms(&ccf);
            let ead = compute_ead(
                &categories,
                &config.amortization,
                &basis,
                &time_steps.residual_months,
                &time_steps.nb_steps,
                &rates,
                &ccf,
                &time_steps.step_months,
            );
            let ecl = aggregator.aggregate(scenario, &ead, &pd, &lgd, &discount);
            ecl.write_columns(&mut portfolio)?;
            let totals = ecl.totals();
            info!(
                "Scenario {}: ECL 1Y={:.2} LT={:.2} ({} PD-unmapped row(s))",
                scenario,
                totals.ecl_1y,
                totals.ecl_lt,
                pd_lookup.unmatched()
            );

            terms.push(ScenarioTerms {
                scenario: scenario.clone(),
                pd: aggregator.round_terms(&pd),
                lgd: aggregator.round_terms(&lgd),
                ccf,
                ead,
                ecl,
            });
        }

        Ok(EclRun {
            portfolio,
            time_steps,
            scenarios,
            categories,
            discount,
            terms,
            segmentation,
            pd_reports,
            multi: None,
        })
    }

    /// Run with probability weights applied at the end
    pub fn run_weighted(&self, portfolio: Table, weights: &ScenarioWeights) -> EclResult<EclRun> {
        let mut run = self.run(portfolio)?;
        run.apply_weights(weights)?;
        Ok(run)
    }

    /// Validation pass: everything up to the PD mapping, no ECL
    pub fn check(&self, portfolio: Table) -> EclResult<CheckReport> {
        let prepared = self.prepare(portfolio)?;
        let width = prepared.time_steps.max_steps();
        let pd_curve = self.template.require_sheet(&self.config.pd.sheet)?;

        let mut pd_reports = Vec::with_capacity(prepared.scenarios.len());
        for scenario in &prepared.scenarios {
            let (lookup, pd) = build_terms(&prepared.portfolio, pd_curve, scenario, &self.config.pd, width)?;
            pd_reports.push(validate_pd_mapping(scenario, &lookup, &pd, &prepared.time_steps.nb_steps));
        }

        Ok(CheckReport {
            rows: prepared.portfolio.n_rows(),
            renamed_fields: prepared.renamed_fields,
            scenarios: prepared.scenarios,
            rows_without_dates: prepared
                .time_steps
                .residual_months
                .iter()
                .filter(|m| m.is_nan())
                .count(),
            step_months: prepared.time_steps.step_months,
            segmentation: prepared.segmentation,
            pd_reports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::non_retail::{
        CCF_SHEET, LGD_SHEET, MAPPING_FIELDS_SHEET, PD_SHEET, SEGMENTATION_SHEET, TIME_STEPS_SHEET,
    };
    use crate::table::Value;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn template() -> Template {
        let mut t = Template::new();
        t.insert(
            TIME_STEPS_SHEET,
            Table::from_rows(
                &["STEP", "NB_MONTHS"],
                vec![
                    vec![1.0.into(), 3.0.into()],
                    vec![2.0.into(), 6.0.into()],
                    vec![3.0.into(), 12.0.into()],
                    vec![4.0.into(), 24.0.into()],
                ],
            )
            .unwrap(),
        );
        t.insert(
            SEGMENTATION_SHEET,
            Table::from_rows(
                &["SEGMENT", "TYPE_MODEL", "SECTOR"],
                vec![
                    vec!["CORP".into(), "PD".into(), "IN: CORPORATE".into()],
                    vec!["SME".into(), "PD".into(), "IN: SME".into()],
                    vec!["LGD_A".into(), "LGD".into(), "NOT IN: NONE".into()],
                    vec!["CCF_A".into(), "CCF".into(), "NOT IN: NONE".into()],
                ],
            )
            .unwrap(),
        );
        t.insert(
            PD_SHEET,
            Table::from_rows(
                &["SEGMENT", "RATING", "SCENARIO", "PD_1", "PD_2", "PD_3"],
                vec![
                    vec!["CORP".into(), "A".into(), "BASE".into(), 0.01.into(), 0.01.into(), 0.02.into()],
                    vec!["CORP".into(), "A".into(), "ADVERSE".into(), 0.02.into(), 0.02.into(), 0.04.into()],
                    vec!["SME".into(), "A".into(), "BASE".into(), 0.03.into(), 0.03.into(), 0.03.into()],
                    vec!["SME".into(), "A".into(), "ADVERSE".into(), 0.05.into(), 0.05.into(), 0.05.into()],
                ],
            )
            .unwrap(),
        );
        t.insert(
            LGD_SHEET,
            Table::from_rows(
                &["IFRS9_MODEL_CODE", "SCENARIO", "LGD_WITHOUT_TIME"],
                vec![
                    vec!["LGD_A".into(), "BASE".into(), 0.45.into()],
                    vec!["LGD_A".into(), "ADVERSE".into(), 0.5.into()],
                ],
            )
            .unwrap(),
        );
        t.insert(
            CCF_SHEET,
            Table::from_rows(
                &["IFRS9_MODEL_CODE", "SCENARIO", "CCF_WITHOUT_TIME"],
                vec![
                    vec!["CCF_A".into(), "BASE".into(), 0.5.into()],
                    vec!["CCF_A".into(), "ADVERSE".into(), 0.75.into()],
                ],
            )
            .unwrap(),
        );
        t
    }

    fn portfolio() -> Table {
        Table::from_rows(
            &[
                "CONTRACT_ID",
                "AS_OF_DATE",
                "EXPOSURE_END_DATE",
                "PROVISIONING_BASIS",
                "SECTOR",
                "CALCULATION_RATING",
                "ACCOUNTING_TYPE",
                "AMORTIZATION_TYPE",
                "CONTRACTUAL_CLIENT_RATE",
            ],
            vec![
                vec![
                    "C1".into(),
                    date(2024, 12, 31),
                    date(2025, 10, 31),
                    1000.0.into(),
                    "CORPORATE".into(),
                    "A".into(),
                    "B".into(),
                    "IN FINE".into(),
                    0.0.into(),
                ],
                vec![
                    "C2".into(),
                    date(2024, 12, 31),
                    date(2025, 4, 30),
                    2000.0.into(),
                    "SME".into(),
                    "A".into(),
                    "H".into(),
                    Value::Null,
                    0.0.into(),
                ],
                vec![
                    "C3".into(),
                    date(2024, 12, 31),
                    date(2026, 12, 31),
                    500.0.into(),
                    "RETAIL".into(),
                    "A".into(),
                    "B".into(),
                    "IN FINE".into(),
                    0.03.into(),
                ],
            ],
        )
        .unwrap()
    }

    fn engine() -> EclEngine {
        EclEngine::new(template(), OperationConfig::non_retail_performing()).unwrap()
    }

    #[test]
    fn test_missing_sheet_rejected_at_construction() {
        let full = template();
        let mut t = Template::new();
        for name in full.sheet_names().filter(|n| *n != PD_SHEET) {
            t.insert(name, full.sheet(name).unwrap().clone());
        }
        let err = EclEngine::new(t, OperationConfig::non_retail_performing()).unwrap_err();
        assert!(matches!(err, EclError::MissingSheet { ref sheet } if sheet == PD_SHEET));
    }

    #[test]
    fn test_unsupported_operation_key() {
        let err = EclEngine::from_engine_config(
            template(),
            &EngineConfig::default(),
            OperationType::Retail,
            OperationStatus::Performing,
        )
        .unwrap_err();
        assert!(matches!(err, EclError::UnsupportedOperation { .. }));
    }

    #[test]
    fn test_portfolio_validation() {
        let e = engine();
        let empty = Table::from_rows(&["CONTRACT_ID"], vec![]).unwrap();
        assert!(matches!(e.validate_portfolio(&empty), Err(EclError::EmptyPortfolio)));
        let partial = Table::from_rows(&["CONTRACT_ID"], vec![vec!["C1".into()]]).unwrap();
        assert!(matches!(
            e.validate_portfolio(&partial),
            Err(EclError::MissingColumns { .. })
        ));
    }

    #[test]
    fn test_run_end_to_end() {
        let run = engine().run(portfolio()).unwrap();
        assert_eq!(run.scenarios, vec!["ADVERSE".to_string(), "BASE".to_string()]);
        assert_eq!(run.time_steps.nb_steps, vec![3, 2, 4]);
        assert_eq!(run.time_steps.step_months, vec![3, 6, 12, 24]);

        let segments = run.portfolio.keys("SEGMENT_PD").unwrap();
        assert_eq!(segments[0].as_deref(), Some("CORP"));
        assert_eq!(segments[1].as_deref(), Some("SME"));
        assert_eq!(segments[2], None);

        let base = run.portfolio.numbers("ECL_1Y_BASE").unwrap();
        // C1 in fine, 3 steps within one year, DF 1
        assert_relative_eq!(base[0], 1000.0 * 0.45 * (0.01 + 0.01 + 0.02), epsilon = 1e-9);
        // C2 off balance, EAD = basis x CCF, 2 steps
        assert_relative_eq!(base[1], 2000.0 * 0.5 * 0.45 * (0.03 + 0.03), epsilon = 1e-9);
        // C3 has no PD segment
        assert_eq!(base[2], 0.0);

        let adverse = run.portfolio.numbers("ECL_LT_ADVERSE").unwrap();
        assert_relative_eq!(adverse[1], 2000.0 * 0.75 * 0.5 * (0.05 + 0.05), epsilon = 1e-9);

        let pd_1y = run.portfolio.numbers("CUMULATIVE_PD_1Y_BASE").unwrap();
        assert_relative_eq!(pd_1y[0], 0.04, epsilon = 1e-12);
        let lgd_1y = run.portfolio.numbers("LGD_1Y_BASE").unwrap();
        assert_relative_eq!(lgd_1y[0], 0.45, epsilon = 1e-12);

        let base_report = run.pd_reports.iter().find(|r| r.scenario == "BASE").unwrap();
        assert_eq!(base_report.unmapped_rows, 1);
    }

    #[test]
    fn test_run_weighted() {
        let weights = ScenarioWeights::from_pairs(&[("BASE", 0.6), ("ADVERSE", 0.4)]);
        let run = engine().run_weighted(portfolio(), &weights).unwrap();
        let base = run.portfolio.numbers("ECL_LT_BASE").unwrap();
        let adverse = run.portfolio.numbers("ECL_LT_ADVERSE").unwrap();
        let multi = run.portfolio.numbers("ECL_LT_MULTI").unwrap();
        for r in 0..3 {
            assert_relative_eq!(multi[r], 0.6 * base[r] + 0.4 * adverse[r], epsilon = 1e-9);
        }
        assert!(run.summary().weighted.is_some());

        let bad = ScenarioWeights::from_pairs(&[("BASE", 1.0)]);
        assert!(matches!(
            engine().run_weighted(portfolio(), &bad),
            Err(EclError::InvalidWeights(_))
        ));
    }

    #[test]
    fn test_write_term_columns() {
        let mut run = engine().run(portfolio()).unwrap();
        run.write_term_columns().unwrap();
        assert!(run.portfolio.has_column("DF_4"));
        assert!(run.portfolio.has_column("PD_BASE_1"));
        assert!(run.portfolio.has_column("EAD_ADVERSE_4"));
    }

    #[test]
    fn test_field_mapping_renames_portfolio_columns() {
        let mut t = template();
        t.insert(
            MAPPING_FIELDS_SHEET,
            Table::from_rows(
                &["CALCULATOR_COLUMN_NAME", "SIMULATION_DATA_COLUMN_NAME"],
                vec![vec!["PROVISIONING_BASIS".into(), "Outstanding Amount".into()]],
            )
            .unwrap(),
        );
        let mut p = portfolio();
        assert!(p.rename_column("PROVISIONING_BASIS", "OUTSTANDING_AMOUNT"));
        let e = EclEngine::new(t, OperationConfig::non_retail_performing()).unwrap();
        let report = e.check(p).unwrap();
        assert_eq!(report.renamed_fields, 1);
    }

    #[test]
    fn test_check_report() {
        let report = engine().check(portfolio()).unwrap();
        assert_eq!(report.rows, 3);
        assert_eq!(report.rows_without_dates, 0);
        assert_eq!(report.pd_reports.len(), 2);
        assert!(report.is_valid());
        let pd = report
            .segmentation
            .iter()
            .find(|s| s.type_model == Some(crate::config::TypeModel::Pd))
            .unwrap();
        assert_eq!(pd.unmatched_rows, 1);
    }

    #[test]
    fn test_run_is_deterministic() {
        let a = engine().run(portfolio()).unwrap();
        let b = engine().run(portfolio()).unwrap();
        assert_eq!(a.portfolio, b.portfolio);
    }
}
