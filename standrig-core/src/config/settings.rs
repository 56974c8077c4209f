//! Per-test settings: PSU operating points and pass/fail criteria

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::{CriterionKind, Inequality, Result};

fn enabled_by_default() -> bool {
    true
}

/// Desired operating point of one PSU for a test
///
/// Entry `i` applies to PSU `i` of the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsuSettings {
    /// Whether this PSU takes part in the test
    #[serde(default = "enabled_by_default")]
    pub enable: bool,

    /// Constant-current regulation (false = constant voltage)
    #[serde(rename = "constCurr", default)]
    pub const_current: bool,

    /// Voltage setpoint in CV mode, voltage limit in CC mode
    #[serde(default)]
    pub voltage: f64,

    /// Current limit in CV mode, current setpoint in CC mode
    #[serde(default)]
    pub current: f64,
}

impl Default for PsuSettings {
    fn default() -> Self {
        Self {
            enable: true,
            const_current: false,
            voltage: 0.0,
            current: 0.0,
        }
    }
}

impl PsuSettings {
    /// Enabled PSU with the given setpoints, constant-voltage mode
    pub fn new(voltage: f64, current: f64) -> Self {
        Self {
            voltage,
            current,
            ..Self::default()
        }
    }

    /// PSU left out of the test
    pub fn disabled() -> Self {
        Self {
            enable: false,
            ..Self::default()
        }
    }

    /// Short name of the regulation mode
    pub fn mode(&self) -> &'static str {
        if self.const_current {
            "CC"
        } else {
            "CV"
        }
    }
}

/// A single pass/fail check on a measured PSU quantity
///
/// The threshold is written under the key named after the measured quantity
/// (`PSUCurrent` or `PSUVoltage`), which is where older settings files keep
/// it. Reading also accepts a plain `threshold` key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Criterion {
    /// Quantity to measure
    #[serde(rename = "criterionType")]
    pub kind: CriterionKind,

    /// Index of the PSU in the environment
    #[serde(rename = "PSUidx", default)]
    pub psu_index: usize,

    /// Comparison direction
    #[serde(rename = "ineq")]
    pub inequality: Inequality,

    /// Threshold the measurement is compared against
    #[serde(alias = "PSUCurrent", alias = "PSUVoltage")]
    pub threshold: f64,
}

impl Criterion {
    /// Criterion on the output current of PSU `psu_index`
    pub fn current(psu_index: usize, inequality: Inequality, threshold: f64) -> Self {
        Self {
            kind: CriterionKind::PsuCurrent,
            psu_index,
            inequality,
            threshold,
        }
    }

    /// Criterion on the output voltage of PSU `psu_index`
    pub fn voltage(psu_index: usize, inequality: Inequality, threshold: f64) -> Self {
        Self {
            kind: CriterionKind::PsuVoltage,
            psu_index,
            inequality,
            threshold,
        }
    }

    /// Unit symbol of the measured quantity
    pub fn unit(&self) -> &'static str {
        match self.kind {
            CriterionKind::PsuCurrent => "A",
            CriterionKind::PsuVoltage => "V",
            CriterionKind::Unrecognized(_) => "",
        }
    }

    /// Settings-file key holding the threshold
    pub fn threshold_key(&self) -> &'static str {
        match self.kind {
            CriterionKind::PsuCurrent => "PSUCurrent",
            CriterionKind::PsuVoltage => "PSUVoltage",
            CriterionKind::Unrecognized(_) => "threshold",
        }
    }
}

impl Serialize for Criterion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Criterion", 4)?;
        state.serialize_field("criterionType", &self.kind)?;
        state.serialize_field("PSUidx", &self.psu_index)?;
        state.serialize_field("ineq", &self.inequality)?;
        state.serialize_field(self.threshold_key(), &self.threshold)?;
        state.end()
    }
}

/// Conditions of one test run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSettings {
    /// Require a cold-box temperature reading before starting
    #[serde(rename = "tempEnable", default)]
    pub temperature_gate: bool,

    /// Temperature (Celsius) the stand must be below when the gate is on
    #[serde(rename = "maxTemp", default)]
    pub max_temperature: f64,

    /// Operating points, positionally aligned with the environment PSUs
    #[serde(rename = "PSUSettingsList", default)]
    pub psu_settings: Vec<PsuSettings>,

    /// Criteria evaluated while the PSUs are on
    #[serde(rename = "criteriaList", default)]
    pub criteria: Vec<Criterion>,
}

impl TestSettings {
    /// Parse settings from JSON
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Serialize settings to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
