//! Term-structure lookup for PD, LGD and CCF curves
//!
//! Curves are joined to the portfolio per scenario, extended to the portfolio's
//! step grid, and (LGD/CCF) filled from flat rates.

mod extend;
mod lookup;
mod validation;

pub use extend::{extend_terms, fill_terms_for_lgd_ccf};
pub use lookup::{filter_scenario, get_terms, TermLookup, GENERIC_STEP_PREFIX};
pub use validation::{validate_pd_mapping, PdMappingReport};

use crate::config::{OperationConfig, TermSource};
use crate::error::EclResult;
use crate::table::{StepMatrix, Table, Template};
use std::collections::BTreeSet;

/// Sorted union of the SCENARIO values of every curve sheet (upper-cased)
pub fn collect_scenarios(template: &Template, config: &OperationConfig) -> Vec<String> {
    let mut scenarios = BTreeSet::new();
    for (_, source) in config.term_sources() {
        if let Some(keys) = template
            .sheet(&source.sheet)
            .and_then(|s| s.keys(&source.scenario_column))
        {
            scenarios.extend(keys.into_iter().flatten());
        }
    }
    scenarios.into_iter().collect()
}

/// Look up, extend and fill one parameter for one scenario
///
/// Returns the raw lookup (for diagnostics) and the `width`-step matrix.
pub fn build_terms(
    portfolio: &Table,
    curve: &Table,
    scenario: &str,
    source: &TermSource,
    width: usize,
) -> EclResult<(TermLookup, StepMatrix)> {
    let lookup = get_terms(portfolio, curve, scenario, source)?;
    let extended = extend_terms(&lookup.values, width);
    let terms = if source.flat_rate_column.is_some() || source.fallback_column.is_some() {
        let fallback = source
            .fallback_column
            .as_deref()
            .and_then(|c| portfolio.numbers(c));
        fill_terms_for_lgd_ccf(&extended, lookup.flat.as_deref(), fallback.as_deref())
    } else {
        extended
    };
    Ok((lookup, terms))
}
