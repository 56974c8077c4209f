//! SCPI vocabulary used by the PSU controller
//!
//! Commands are rendered without a line terminator; transports append `\n`.

use once_cell::sync::Lazy;
use regex::Regex;
use standrig_core::{Result, StandRigError};
use std::fmt;

/// First optionally-signed, optionally-fractional decimal literal
static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-+]?\d*\.?\d+").expect("numeric literal pattern is valid"));

/// Commands issued to SCPI power supplies
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScpiCommand {
    /// `*IDN?`
    Identify,
    /// `SYST:VERS?`
    SystemVersion,
    /// `INST:SEL <channel>`
    SelectChannel(u32),
    /// `VOLT <value>`
    SetVoltage(f64),
    /// `CURR <value>`
    SetCurrent(f64),
    /// `VOLT?`
    VoltageSetpoint,
    /// `CURR?`
    CurrentSetpoint,
    /// `MEAS:VOLT?`
    MeasureVoltage,
    /// `MEAS:CURR?`
    MeasureCurrent,
    /// `OUTP:STAT 0|1`
    Output(bool),
}

impl ScpiCommand {
    /// Whether the instrument answers this command
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            ScpiCommand::Identify
                | ScpiCommand::SystemVersion
                | ScpiCommand::VoltageSetpoint
                | ScpiCommand::CurrentSetpoint
                | ScpiCommand::MeasureVoltage
                | ScpiCommand::MeasureCurrent
        )
    }
}

impl fmt::Display for ScpiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScpiCommand::Identify => f.write_str("*IDN?"),
            ScpiCommand::SystemVersion => f.write_str("SYST:VERS?"),
            ScpiCommand::SelectChannel(channel) => write!(f, "INST:SEL {}", channel),
            ScpiCommand::SetVoltage(volts) => write!(f, "VOLT {}", volts),
            ScpiCommand::SetCurrent(amps) => write!(f, "CURR {}", amps),
            ScpiCommand::VoltageSetpoint => f.write_str("VOLT?"),
            ScpiCommand::CurrentSetpoint => f.write_str("CURR?"),
            ScpiCommand::MeasureVoltage => f.write_str("MEAS:VOLT?"),
            ScpiCommand::MeasureCurrent => f.write_str("MEAS:CURR?"),
            ScpiCommand::Output(on) => write!(f, "OUTP:STAT {}", u8::from(*on)),
        }
    }
}

/// Extract a decimal number from free-form instrument text
///
/// Takes the first signed-or-unsigned decimal literal in `response`.
/// Exponents are not part of the literal: `1.5E-3` yields `1.5`.
pub fn parse_float(response: &str) -> Result<f64> {
    let literal = NUMBER
        .find(response)
        .ok_or_else(|| StandRigError::Parse(format!("no number in response {:?}", response)))?;

    literal
        .as_str()
        .parse::<f64>()
        .map_err(|e| StandRigError::Parse(format!("invalid number {:?}: {}", literal.as_str(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_rendering() {
        assert_eq!(ScpiCommand::Identify.to_string(), "*IDN?");
        assert_eq!(ScpiCommand::SystemVersion.to_string(), "SYST:VERS?");
        assert_eq!(ScpiCommand::SelectChannel(2).to_string(), "INST:SEL 2");
        assert_eq!(ScpiCommand::SetVoltage(3.3).to_string(), "VOLT 3.3");
        assert_eq!(ScpiCommand::SetCurrent(0.005).to_string(), "CURR 0.005");
        assert_eq!(ScpiCommand::VoltageSetpoint.to_string(), "VOLT?");
        assert_eq!(ScpiCommand::CurrentSetpoint.to_string(), "CURR?");
        assert_eq!(ScpiCommand::MeasureVoltage.to_string(), "MEAS:VOLT?");
        assert_eq!(ScpiCommand::MeasureCurrent.to_string(), "MEAS:CURR?");
        assert_eq!(ScpiCommand::Output(true).to_string(), "OUTP:STAT 1");
        assert_eq!(ScpiCommand::Output(false).to_string(), "OUTP:STAT 0");
    }

    #[test]
    fn test_is_query() {
        assert!(ScpiCommand::Identify.is_query());
        assert!(ScpiCommand::MeasureCurrent.is_query());
        assert!(!ScpiCommand::SelectChannel(0).is_query());
        assert!(!ScpiCommand::Output(true).is_query());
        assert!(!ScpiCommand::SetVoltage(1.0).is_query());
    }

    #[test]
    fn test_parse_float_plain() {
        assert_eq!(parse_float("0.004").unwrap(), 0.004);
        assert_eq!(parse_float("12").unwrap(), 12.0);
    }

    #[test]
    fn test_parse_float_embedded() {
        assert_eq!(parse_float("VOLT 3.30\n").unwrap(), 3.30);
        assert_eq!(parse_float("+1.250 A").unwrap(), 1.25);
        // A channel label counts as the first literal
        assert_eq!(parse_float("CH2: 1.250 A").unwrap(), 2.0);
        assert_eq!(parse_float("-0.75V").unwrap(), -0.75);
        assert_eq!(parse_float(".5").unwrap(), 0.5);
    }

    #[test]
    fn test_parse_float_takes_first_literal() {
        assert_eq!(parse_float("1.5E-3").unwrap(), 1.5);
        assert_eq!(parse_float("2.0 4.0").unwrap(), 2.0);
    }

    #[test]
    fn test_parse_float_no_digits() {
        assert!(matches!(parse_float("ERR\n"), Err(StandRigError::Parse(_))));
        assert!(matches!(parse_float(""), Err(StandRigError::Parse(_))));
        assert!(matches!(parse_float("-."), Err(StandRigError::Parse(_))));
    }
}
