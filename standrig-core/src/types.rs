//! Tagged values shared by configuration, drivers and the test runner
//!
//! Every tag that arrives from a configuration file is parsed into a closed
//! enum. Values that are not recognised are kept verbatim in an
//! `Unrecognized` variant so that the component which first needs the value
//! can report a precise error instead of the loader guessing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical command channel used to reach a PSU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransportKind {
    /// Serial line (USB CDC or RS-232)
    Serial,
    /// Raw TCP socket carrying SCPI
    Ip,
    /// Tag present in configuration but not understood
    Unrecognized(String),
}

impl From<String> for TransportKind {
    fn from(tag: String) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "serial" => TransportKind::Serial,
            "ip" | "tcp" => TransportKind::Ip,
            _ => TransportKind::Unrecognized(tag),
        }
    }
}

impl From<TransportKind> for String {
    fn from(kind: TransportKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Serial => f.write_str("Serial"),
            TransportKind::Ip => f.write_str("IP"),
            TransportKind::Unrecognized(tag) => f.write_str(tag),
        }
    }
}

/// Software command interface spoken by a PSU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Interface {
    /// Standard Commands for Programmable Instruments
    Scpi,
    /// Interface named in configuration that has no driver
    Unrecognized(String),
}

impl From<String> for Interface {
    fn from(tag: String) -> Self {
        if tag.trim().eq_ignore_ascii_case("scpi") {
            Interface::Scpi
        } else {
            Interface::Unrecognized(tag)
        }
    }
}

impl From<Interface> for String {
    fn from(interface: Interface) -> Self {
        interface.to_string()
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interface::Scpi => f.write_str("SCPI"),
            Interface::Unrecognized(tag) => f.write_str(tag),
        }
    }
}

/// Quantity checked by a criterion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CriterionKind {
    /// Output current measured on the referenced PSU
    PsuCurrent,
    /// Output voltage measured on the referenced PSU
    PsuVoltage,
    /// Criterion type with no evaluator
    Unrecognized(String),
}

impl From<String> for CriterionKind {
    fn from(tag: String) -> Self {
        match tag.trim() {
            "PSUCurrent" => CriterionKind::PsuCurrent,
            "PSUVoltage" => CriterionKind::PsuVoltage,
            _ => CriterionKind::Unrecognized(tag),
        }
    }
}

impl From<CriterionKind> for String {
    fn from(kind: CriterionKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for CriterionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CriterionKind::PsuCurrent => f.write_str("PSUCurrent"),
            CriterionKind::PsuVoltage => f.write_str("PSUVoltage"),
            CriterionKind::Unrecognized(tag) => f.write_str(tag),
        }
    }
}

/// Direction of a criterion comparison
///
/// Comparisons are strict. Any direction other than `<` or `>` is kept as
/// `Other` and never holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Inequality {
    /// Measured value must be strictly below the threshold
    Less,
    /// Measured value must be strictly above the threshold
    Greater,
    /// Anything else
    Other(String),
}

impl Inequality {
    /// Whether `measured` satisfies this inequality against `threshold`
    pub fn holds(&self, measured: f64, threshold: f64) -> bool {
        match self {
            Inequality::Less => measured < threshold,
            Inequality::Greater => measured > threshold,
            Inequality::Other(_) => false,
        }
    }
}

impl From<String> for Inequality {
    fn from(tag: String) -> Self {
        match tag.trim() {
            "<" => Inequality::Less,
            ">" => Inequality::Greater,
            _ => Inequality::Other(tag),
        }
    }
}

impl From<Inequality> for String {
    fn from(ineq: Inequality) -> Self {
        ineq.to_string()
    }
}

impl fmt::Display for Inequality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inequality::Less => f.write_str("<"),
            Inequality::Greater => f.write_str(">"),
            Inequality::Other(tag) => f.write_str(tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_parsing() {
        assert_eq!(TransportKind::from("Serial".to_string()), TransportKind::Serial);
        assert_eq!(TransportKind::from("IP".to_string()), TransportKind::Ip);
        assert_eq!(TransportKind::from("ip".to_string()), TransportKind::Ip);
        assert_eq!(
            TransportKind::from("USB".to_string()),
            TransportKind::Unrecognized("USB".to_string())
        );
    }

    #[test]
    fn test_transport_kind_serde_keeps_historical_tags() {
        let kind: TransportKind = serde_json::from_str("\"IP\"").unwrap();
        assert_eq!(kind, TransportKind::Ip);
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"IP\"");

        let kind: TransportKind = serde_json::from_str("\"CAN\"").unwrap();
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"CAN\"");
    }

    #[test]
    fn test_interface_parsing() {
        assert_eq!(Interface::from("SCPI".to_string()), Interface::Scpi);
        assert_eq!(Interface::from("scpi".to_string()), Interface::Scpi);
        assert_eq!(
            Interface::from("BK".to_string()),
            Interface::Unrecognized("BK".to_string())
        );
        assert_eq!(Interface::Scpi.to_string(), "SCPI");
    }

    #[test]
    fn test_criterion_kind_parsing() {
        assert_eq!(
            CriterionKind::from("PSUCurrent".to_string()),
            CriterionKind::PsuCurrent
        );
        assert_eq!(
            CriterionKind::from("PSUVoltage".to_string()),
            CriterionKind::PsuVoltage
        );
        assert!(matches!(
            CriterionKind::from("DAQTransient".to_string()),
            CriterionKind::Unrecognized(_)
        ));
    }

    #[test]
    fn test_inequality_is_strict() {
        assert!(Inequality::Less.holds(0.004, 0.1));
        assert!(!Inequality::Less.holds(0.2, 0.1));
        assert!(Inequality::Greater.holds(0.2, 0.1));
        assert!(!Inequality::Greater.holds(0.004, 0.1));

        // Equality never satisfies a criterion
        assert!(!Inequality::Less.holds(0.1, 0.1));
        assert!(!Inequality::Greater.holds(0.1, 0.1));
    }

    #[test]
    fn test_inequality_other_never_holds() {
        let ineq = Inequality::from("<=".to_string());
        assert_eq!(ineq, Inequality::Other("<=".to_string()));
        assert!(!ineq.holds(0.0, 1.0));
        assert!(!ineq.holds(1.0, 1.0));
        assert!(!ineq.holds(2.0, 1.0));
    }
}
