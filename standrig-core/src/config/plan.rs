//! Consistency checks between an environment and the settings run on it

use tracing::warn;

use super::{EnvironmentConfig, TestSettings};
use crate::{CriterionKind, Result, StandRigError};

/// Validate that `settings` can be run on `environment`
///
/// Runs before any instrument is touched. Rejects:
/// - a settings list whose length differs from the PSU list
/// - criteria that reference a PSU index outside the PSU list
/// - criteria of an unrecognised kind
pub fn validate_plan(environment: &EnvironmentConfig, settings: &TestSettings) -> Result<()> {
    let psu_count = environment.psus.len();

    if settings.psu_settings.len() != psu_count {
        return Err(StandRigError::Config(format!(
            "{} PSU settings entries for {} configured PSUs",
            settings.psu_settings.len(),
            psu_count
        )));
    }

    for (idx, criterion) in settings.criteria.iter().enumerate() {
        if let CriterionKind::Unrecognized(ref tag) = criterion.kind {
            return Err(StandRigError::Config(format!(
                "Criterion {} has unknown type '{}'",
                idx, tag
            )));
        }

        if criterion.psu_index >= psu_count {
            return Err(StandRigError::Config(format!(
                "Criterion {} references PSU {} but only {} PSUs are configured",
                idx, criterion.psu_index, psu_count
            )));
        }
    }

    if settings.temperature_gate {
        warn!(
            "Temperature gate (max {} C) is enabled but no temperature source is configured; not enforced",
            settings.max_temperature
        );
    }

    Ok(())
}
