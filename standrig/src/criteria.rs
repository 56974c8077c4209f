//! Criterion evaluation
//!
//! Measures the quantity a criterion names and compares it against the
//! threshold. Comparisons are strict: a reading equal to the threshold never
//! satisfies a criterion, and an unrecognised inequality never holds.

use standrig_core::{Criterion, CriterionKind, Result, StandRigError};
use standrig_hardware::{InstrumentTransport, PsuController};
use tracing::debug;

use crate::report::Verdict;

/// Measure the quantity selected by `kind`
pub async fn measure<T: InstrumentTransport + ?Sized>(
    kind: &CriterionKind,
    controller: &mut PsuController<T>,
) -> Result<f64> {
    match kind {
        CriterionKind::PsuCurrent => controller.measure_current().await,
        CriterionKind::PsuVoltage => controller.measure_voltage().await,
        CriterionKind::Unrecognized(tag) => Err(StandRigError::Config(format!(
            "Unknown criterion type '{}'",
            tag
        ))),
    }
}

/// Measure once and classify the reading
pub async fn judge<T: InstrumentTransport + ?Sized>(
    criterion: &Criterion,
    controller: &mut PsuController<T>,
) -> Result<Verdict> {
    let measured = measure(&criterion.kind, controller).await?;
    let holds = criterion.inequality.holds(measured, criterion.threshold);

    debug!(
        "{}: {} {} {} -> {}",
        criterion.kind, measured, criterion.inequality, criterion.threshold, holds
    );

    Ok(if holds {
        Verdict::Pass { measured }
    } else {
        Verdict::Fail { measured }
    })
}

/// Whether the PSU currently satisfies `criterion`
pub async fn evaluate<T: InstrumentTransport + ?Sized>(
    criterion: &Criterion,
    controller: &mut PsuController<T>,
) -> Result<bool> {
    Ok(judge(criterion, controller).await?.is_pass())
}
