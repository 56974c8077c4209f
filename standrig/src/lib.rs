//! StandRig test runner
//!
//! Drives a phased PSU bring-up test: connect every enabled supply, program
//! its setpoints, switch it on, evaluate the pass/fail criteria and switch
//! everything off again, with an operator checkpoint between phases.
//!
//! The binary wires these pieces to real hardware, a terminal and the
//! process signals; tests wire them to scripted instruments.

pub mod config;
pub mod connector;
pub mod criteria;
pub mod operator;
pub mod orchestrator;
pub mod report;
pub mod signals;

pub use connector::{HardwareConnector, PsuConnector};
pub use operator::{ConsoleOperator, Operator};
pub use orchestrator::{run_test, Phase};
pub use report::{CriterionOutcome, DisableOutcome, RunEvent, TestReport, Verdict};
pub use signals::{DeferSignals, SignalKind, SignalLatch, SignalRouter};
