//! Operator console
//!
//! Phase boundaries are human checkpoints: the orchestrator reports progress
//! through an [`Operator`] and blocks until the operator acknowledges the
//! next phase. The wait has no timeout.

use async_trait::async_trait;
use colored::*;
use standrig_core::{Result, StandRigError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tracing::debug;

use crate::orchestrator::Phase;
use crate::report::{paint_verdict, RunEvent};
use crate::signals::SignalLatch;

/// Human in the loop of a test run
#[async_trait]
pub trait Operator: Send {
    /// Report progress; must not block
    fn notify(&mut self, event: &RunEvent);

    /// Block until the operator agrees to start `next`
    ///
    /// An error aborts the run; the Disable phase still follows.
    async fn acknowledge(&mut self, next: Phase) -> Result<()>;
}

/// Operator at a terminal
///
/// Progress goes to stdout, acknowledgements are read line by line from
/// `input` (stdin by default). One reader serves every gate, so confirmations
/// piped in ahead of time are consumed one per gate. A tripped
/// [`SignalLatch`] turns the pending or next acknowledgement into an abort,
/// which is how Ctrl-C at a prompt reaches the Disable phase.
pub struct ConsoleOperator<R = BufReader<Stdin>> {
    auto_confirm: bool,
    interrupts: Option<SignalLatch>,
    input: R,
}

impl ConsoleOperator {
    pub fn new(auto_confirm: bool) -> Self {
        Self::with_input(auto_confirm, BufReader::new(tokio::io::stdin()))
    }
}

impl<R> ConsoleOperator<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Operator reading acknowledgements from `input`
    pub fn with_input(auto_confirm: bool, input: R) -> Self {
        Self {
            auto_confirm,
            interrupts: None,
            input,
        }
    }

    /// Abort at the next phase gate once `latch` trips
    pub fn with_interrupts(mut self, latch: SignalLatch) -> Self {
        self.interrupts = Some(latch);
        self
    }

    fn interrupted(&self) -> Result<()> {
        match self.interrupts.as_ref().and_then(SignalLatch::received) {
            Some(kind) => Err(StandRigError::Operator(format!(
                "{} received, aborting run",
                kind
            ))),
            None => Ok(()),
        }
    }
}

/// Render a progress event as one console line
pub fn render_event(event: &RunEvent) -> String {
    match event {
        RunEvent::PhaseStarted(phase) => format!("== {} ==", phase).bold().to_string(),
        RunEvent::Connected {
            psu_index,
            endpoint,
            idn,
            version,
        } => format!(
            "PSU {} at {}: {} (version {})",
            psu_index,
            endpoint.cyan(),
            idn,
            version
        ),
        RunEvent::PsuSkipped { psu_index } => {
            format!("PSU {}: disabled in settings, skipped", psu_index)
                .dimmed()
                .to_string()
        }
        RunEvent::Configured {
            psu_index,
            mode,
            voltage,
            current,
        } => format!(
            "PSU {}: {} mode, {} V / {} A",
            psu_index,
            mode.yellow(),
            voltage,
            current
        ),
        RunEvent::OutputEnabled { psu_index } => {
            format!("PSU {}: output {}", psu_index, "ON".green())
        }
        RunEvent::Criterion(outcome) => {
            let criterion = &outcome.criterion;
            let measured = outcome
                .verdict
                .measured()
                .map(|m| format!(" (measured {} {})", m, criterion.unit()))
                .unwrap_or_default();
            format!(
                "Criterion {}: {} of PSU {} {} {} {}: {}{}",
                outcome.index,
                criterion.kind,
                criterion.psu_index,
                criterion.inequality,
                criterion.threshold,
                criterion.unit(),
                paint_verdict(&outcome.verdict),
                measured
            )
        }
        RunEvent::Disabled(outcome) => match &outcome.error {
            None => format!("PSU {}: output {}", outcome.psu_index, "OFF".green()),
            Some(error) => format!(
                "PSU {}: {} ({})",
                outcome.psu_index,
                "FAILED TO TURN OFF".red().bold(),
                error
            ),
        },
        RunEvent::Aborted { phase, reason } => format!(
            "{} during {}: {}",
            "Run aborted".red().bold(),
            phase,
            reason
        ),
    }
}

#[async_trait]
impl<R> Operator for ConsoleOperator<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn notify(&mut self, event: &RunEvent) {
        println!("{}", render_event(event));
    }

    async fn acknowledge(&mut self, next: Phase) -> Result<()> {
        self.interrupted()?;

        if self.auto_confirm {
            debug!("Auto-confirming {}", next);
            return Ok(());
        }

        println!("Press Enter to start {}...", next.to_string().bold());

        let input = &mut self.input;
        let read = async {
            let mut line = String::new();
            let read = input.read_line(&mut line).await?;
            if read == 0 {
                return Err(StandRigError::Operator(
                    "console closed while waiting for confirmation".to_string(),
                ));
            }
            Ok::<(), StandRigError>(())
        };

        match &self.interrupts {
            Some(latch) => {
                tokio::select! {
                    result = read => result,
                    kind = latch.wait() => Err(StandRigError::Operator(format!(
                        "{} received, aborting run",
                        kind
                    ))),
                }
            }
            None => read.await,
        }
    }
}
