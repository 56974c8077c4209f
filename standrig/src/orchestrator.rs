//! Phased test driver
//!
//! A run walks strictly through `Init → Configure → Enable → Evaluate →
//! Disable → Done`, stopping for operator acknowledgement before each of
//! Configure, Enable, Evaluate and Disable. Disable always runs: whatever
//! fails between Init and Evaluate, every controller that was constructed
//! is switched off before the failure is returned.

use standrig_core::{
    is_connection_error, validate_plan, EnvironmentConfig, Result, StandRigError, TestSettings,
};
use standrig_hardware::PsuController;
use std::fmt;
use tracing::{error, info, warn};

use crate::connector::PsuConnector;
use crate::criteria;
use crate::operator::Operator;
use crate::report::{CriterionOutcome, DisableOutcome, RunEvent, TestReport, Verdict};
use crate::signals::{DeferSignals, SignalKind, SignalRouter};

/// Signals that may not interrupt the Disable phase
pub const DEFERRED_DURING_DISABLE: [SignalKind; 2] = [SignalKind::Interrupt, SignalKind::Terminate];

/// Stages of a test run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Configure,
    Enable,
    Evaluate,
    Disable,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "Init",
            Phase::Configure => "Configure",
            Phase::Enable => "Enable",
            Phase::Evaluate => "Evaluate",
            Phase::Disable => "Disable",
            Phase::Done => "Done",
        };
        f.write_str(name)
    }
}

/// One controller per configured PSU; `None` for PSUs disabled in the settings
type Slots = Vec<Option<PsuController>>;

/// Drive one complete test run
///
/// The plan is validated before any instrument is touched. On success the
/// report holds one outcome per criterion and one disable outcome per live
/// PSU. On failure the error raised during Init, Configure, Enable or
/// Evaluate is returned after the Disable phase has completed; progress,
/// including each disable attempt, has already been reported through
/// `operator`.
pub async fn run_test<C, O>(
    environment: &EnvironmentConfig,
    settings: &TestSettings,
    connector: &C,
    operator: &mut O,
    signals: &SignalRouter,
) -> Result<TestReport>
where
    C: PsuConnector + ?Sized,
    O: Operator + ?Sized,
{
    validate_plan(environment, settings)?;

    let mut slots: Slots = Vec::with_capacity(environment.psus.len());
    let mut report = TestReport::default();
    let mut phase = Phase::Init;

    let result = drive(
        environment,
        settings,
        connector,
        operator,
        &mut slots,
        &mut report,
        &mut phase,
    )
    .await;

    if let Err(e) = &result {
        error!("Run aborted during {}: {}", phase, e);
        operator.notify(&RunEvent::Aborted {
            phase,
            reason: e.to_string(),
        });
    }

    disable_all(&mut slots, operator, signals, &mut report).await;

    result?;

    info!("Run complete: {}", if report.passed() { "PASS" } else { "FAIL" });
    operator.notify(&RunEvent::PhaseStarted(Phase::Done));
    Ok(report)
}

/// Init through Evaluate, plus the gate before Disable
async fn drive<C, O>(
    environment: &EnvironmentConfig,
    settings: &TestSettings,
    connector: &C,
    operator: &mut O,
    slots: &mut Slots,
    report: &mut TestReport,
    phase: &mut Phase,
) -> Result<()>
where
    C: PsuConnector + ?Sized,
    O: Operator + ?Sized,
{
    *phase = Phase::Init;
    enter(operator, Phase::Init);
    for (index, (config, psu)) in environment
        .psus
        .iter()
        .zip(&settings.psu_settings)
        .enumerate()
    {
        if !psu.enable {
            info!("PSU {} disabled, skipping", index);
            operator.notify(&RunEvent::PsuSkipped { psu_index: index });
            slots.push(None);
            continue;
        }

        let controller = connector.connect(index, config).await?;
        operator.notify(&RunEvent::Connected {
            psu_index: index,
            endpoint: config.endpoint(),
            idn: controller.idn().to_string(),
            version: controller.version().to_string(),
        });
        slots.push(Some(controller));
    }

    gate(operator, Phase::Configure).await?;
    *phase = Phase::Configure;
    for (index, controller) in live(slots) {
        let psu = &settings.psu_settings[index];
        info!(
            "Configuring PSU {}: {} V, {} A ({})",
            index,
            psu.voltage,
            psu.current,
            psu.mode()
        );

        // Off first so the previous setpoint is never driven
        controller.turn_off().await?;
        controller.set_voltage(psu.voltage).await?;
        controller.set_current(psu.current).await?;

        operator.notify(&RunEvent::Configured {
            psu_index: index,
            mode: psu.mode(),
            voltage: psu.voltage,
            current: psu.current,
        });
    }

    gate(operator, Phase::Enable).await?;
    *phase = Phase::Enable;
    for (index, controller) in live(slots) {
        controller.turn_on().await?;
        info!("PSU {} output on", index);
        operator.notify(&RunEvent::OutputEnabled { psu_index: index });
    }

    gate(operator, Phase::Evaluate).await?;
    *phase = Phase::Evaluate;
    for (index, criterion) in settings.criteria.iter().enumerate() {
        let verdict = match slots
            .get_mut(criterion.psu_index)
            .and_then(Option::as_mut)
        {
            Some(controller) => criteria::judge(criterion, controller).await?,
            None => {
                info!(
                    "Criterion {} skipped: PSU {} is disabled",
                    index, criterion.psu_index
                );
                Verdict::Skipped
            }
        };

        let outcome = CriterionOutcome {
            index,
            criterion: criterion.clone(),
            verdict,
        };
        info!("Criterion {}: {}", index, outcome.verdict);
        operator.notify(&RunEvent::Criterion(outcome.clone()));
        report.outcomes.push(outcome);
    }

    operator.acknowledge(Phase::Disable).await
}

/// Switch every live PSU off and release it, deferring termination signals
///
/// Never fails: a PSU that cannot be switched off is logged and reported,
/// and the remaining PSUs are still attempted.
async fn disable_all<O>(
    slots: &mut Slots,
    operator: &mut O,
    signals: &SignalRouter,
    report: &mut TestReport,
) where
    O: Operator + ?Sized,
{
    let guard = DeferSignals::enter(signals, &DEFERRED_DURING_DISABLE);
    enter(operator, Phase::Disable);

    for (index, controller) in live(slots) {
        let outcome = match controller.turn_off().await {
            Ok(()) => {
                info!("PSU {} output off", index);
                DisableOutcome {
                    psu_index: index,
                    turned_off: true,
                    error: None,
                }
            }
            Err(e) => {
                if is_connection_error(&e) {
                    warn!("PSU {} unreachable while disabling: {}", index, e);
                } else {
                    warn!("PSU {} refused to turn off: {}", index, e);
                }
                DisableOutcome {
                    psu_index: index,
                    turned_off: false,
                    error: Some(e.to_string()),
                }
            }
        };

        controller.close();
        operator.notify(&RunEvent::Disabled(outcome.clone()));
        report.disabled.push(outcome);
    }

    let deferred = guard.pending();
    if !deferred.is_empty() {
        info!("Disable complete, honouring deferred {:?}", deferred);
    }
    drop(guard);
}

fn enter<O: Operator + ?Sized>(operator: &mut O, phase: Phase) {
    info!("Entering {} phase", phase);
    operator.notify(&RunEvent::PhaseStarted(phase));
}

/// Wait for the operator, then announce `next`
async fn gate<O: Operator + ?Sized>(operator: &mut O, next: Phase) -> Result<()> {
    operator.acknowledge(next).await.map_err(|e| {
        warn!("Operator did not confirm {}: {}", next, e);
        e
    })?;
    enter(operator, next);
    Ok(())
}

/// Live controllers with their PSU index
fn live(slots: &mut Slots) -> impl Iterator<Item = (usize, &mut PsuController)> {
    slots
        .iter_mut()
        .enumerate()
        .filter_map(|(index, slot)| slot.as_mut().map(|controller| (index, controller)))
}

/// Classify a run-level error for the exit summary
pub fn abort_reason(error: &StandRigError) -> &'static str {
    match error {
        StandRigError::Config(_) | StandRigError::UnsupportedInterface(_) => "configuration",
        StandRigError::Operator(_) => "operator",
        StandRigError::Parse(_) | StandRigError::Verification { .. } => "instrument response",
        e if is_connection_error(e) => "instrument link",
        _ => "internal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use standrig_core::{Criterion, Inequality, PsuConfig, PsuSettings};
    use standrig_hardware::mock::MockInstrument;
    use standrig_hardware::InstrumentTransport;

    struct MockConnector {
        instruments: Vec<MockInstrument>,
    }

    #[async_trait]
    impl PsuConnector for MockConnector {
        async fn connect(&self, index: usize, config: &PsuConfig) -> Result<PsuController> {
            let transport: Box<dyn InstrumentTransport> = self.instruments[index].transport();
            PsuController::handshake(transport, config.clone()).await
        }
    }

    #[derive(Default)]
    struct ScriptedOperator {
        events: Vec<RunEvent>,
        gates: Vec<Phase>,
        refuse: Option<Phase>,
    }

    #[async_trait]
    impl Operator for ScriptedOperator {
        fn notify(&mut self, event: &RunEvent) {
            self.events.push(event.clone());
        }

        async fn acknowledge(&mut self, next: Phase) -> Result<()> {
            self.gates.push(next);
            if self.refuse == Some(next) {
                return Err(StandRigError::Operator("declined".to_string()));
            }
            Ok(())
        }
    }

    fn single_psu_plan() -> (EnvironmentConfig, TestSettings) {
        let environment = EnvironmentConfig {
            readback_address: String::new(),
            psus: vec![PsuConfig::serial("/dev/ttyMOCK0", 115200)],
        };
        let settings = TestSettings {
            psu_settings: vec![PsuSettings::new(1.0, 0.005)],
            criteria: vec![Criterion::current(0, Inequality::Less, 0.1)],
            ..TestSettings::default()
        };
        (environment, settings)
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Init.to_string(), "Init");
        assert_eq!(Phase::Disable.to_string(), "Disable");
    }

    #[test]
    fn test_abort_reason() {
        assert_eq!(abort_reason(&StandRigError::Config(String::new())), "configuration");
        assert_eq!(abort_reason(&StandRigError::Timeout(String::new())), "instrument link");
        assert_eq!(abort_reason(&StandRigError::Parse(String::new())), "instrument response");
    }

    #[tokio::test]
    async fn test_gates_precede_each_phase() {
        let (environment, settings) = single_psu_plan();
        let instrument = MockInstrument::new();
        instrument.respond("MEAS:CURR?", "0.004");
        let connector = MockConnector {
            instruments: vec![instrument.clone()],
        };
        let mut operator = ScriptedOperator::default();

        let report = run_test(
            &environment,
            &settings,
            &connector,
            &mut operator,
            &SignalRouter::new(),
        )
        .await
        .unwrap();

        assert!(report.passed());
        assert_eq!(
            operator.gates,
            vec![Phase::Configure, Phase::Enable, Phase::Evaluate, Phase::Disable]
        );
        let phases: Vec<Phase> = operator
            .events
            .iter()
            .filter_map(|e| match e {
                RunEvent::PhaseStarted(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                Phase::Init,
                Phase::Configure,
                Phase::Enable,
                Phase::Evaluate,
                Phase::Disable,
                Phase::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_declined_gate_still_disables() {
        let (environment, settings) = single_psu_plan();
        let instrument = MockInstrument::new();
        let connector = MockConnector {
            instruments: vec![instrument.clone()],
        };
        let mut operator = ScriptedOperator {
            refuse: Some(Phase::Enable),
            ..ScriptedOperator::default()
        };

        let result = run_test(
            &environment,
            &settings,
            &connector,
            &mut operator,
            &SignalRouter::new(),
        )
        .await;

        assert!(matches!(result, Err(StandRigError::Operator(_))));
        assert_eq!(instrument.output_on(), Some(false));
        assert_eq!(instrument.close_count(), 1);
        assert!(operator.events.iter().any(|e| matches!(
            e,
            RunEvent::Aborted {
                phase: Phase::Configure,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_invalid_plan_touches_no_instrument() {
        let (environment, mut settings) = single_psu_plan();
        settings.criteria[0].psu_index = 3;
        let instrument = MockInstrument::new();
        let connector = MockConnector {
            instruments: vec![instrument.clone()],
        };
        let mut operator = ScriptedOperator::default();

        let result = run_test(
            &environment,
            &settings,
            &connector,
            &mut operator,
            &SignalRouter::new(),
        )
        .await;

        assert!(matches!(result, Err(StandRigError::Config(_))));
        assert!(instrument.commands().is_empty());
        assert!(operator.events.is_empty());
    }
}
