//! PD mapping diagnostics
//!
//! Reports problems with the PD term structure of a scenario without failing
//! the run; callers decide what to do with the findings.

use super::lookup::TermLookup;
use crate::table::StepMatrix;
use serde::Serialize;

/// Findings for one scenario's PD mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PdMappingReport {
    pub scenario: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub info: Vec<String>,
    pub total_rows: usize,
    pub unmapped_rows: usize,
    /// (step, rows with a missing PD at that step)
    pub missing_by_step: Vec<(usize, usize)>,
    pub negative_values: usize,
    pub values_above_one: usize,
}

impl PdMappingReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check the PD curve lookup of one scenario
///
/// `pd` is the matrix after extension, `nb_steps` the per-row step counts.
pub fn validate_pd_mapping(scenario: &str, lookup: &TermLookup, pd: &StepMatrix, nb_steps: &[usize]) -> PdMappingReport {
    let mut report = PdMappingReport {
        scenario: scenario.to_string(),
        total_rows: pd.n_rows(),
        unmapped_rows: lookup.unmatched(),
        ..Default::default()
    };

    if lookup.values.n_steps() == 0 {
        report
            .errors
            .push("no PD step column found in the curve sheet".to_string());
    }
    if report.unmapped_rows > 0 {
        report.warnings.push(format!(
            "{} of {} contract(s) have no PD curve",
            report.unmapped_rows, report.total_rows
        ));
    }

    for step in 0..pd.n_steps() {
        let mut missing = 0;
        let mut first: Option<f64> = None;
        let mut constant = true;
        for r in 0..pd.n_rows() {
            let v = pd.get(r, step);
            if v.is_nan() {
                missing += 1;
                continue;
            }
            if v < 0.0 {
                report.negative_values += 1;
            }
            if v > 1.0 {
                report.values_above_one += 1;
            }
            match first {
                None => first = Some(v),
                Some(f) if f != v => constant = false,
                _ => {}
            }
        }
        if missing > 0 {
            report.missing_by_step.push((step + 1, missing));
            report
                .warnings
                .push(format!("PD_{}: missing PD values for {} contract(s)", step + 1, missing));
        }
        if constant && first.is_some() && pd.n_rows() > 1 {
            report
                .info
                .push(format!("PD_{}: identical value for every mapped contract", step + 1));
        }
    }

    if report.negative_values > 0 {
        report
            .errors
            .push(format!("{} negative PD value(s)", report.negative_values));
    }
    if report.values_above_one > 0 {
        report
            .errors
            .push(format!("{} PD value(s) above 1", report.values_above_one));
    }

    let beyond_curve = nb_steps
        .iter()
        .filter(|&&s| s > lookup.values.n_steps())
        .count();
    if beyond_curve > 0 && lookup.values.n_steps() > 0 {
        report.info.push(format!(
            "{} contract(s) need more than the {} curve step(s); last value carried forward",
            beyond_curve,
            lookup.values.n_steps()
        ));
    }
    report.info.push(format!(
        "{} of {} contract(s) mapped",
        report.total_rows - report.unmapped_rows,
        report.total_rows
    ));
    report
}
