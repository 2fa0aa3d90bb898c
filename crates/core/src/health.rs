//! Health ordinal. Worse dominates: PASSING < WARNING < CRITICAL < MAINTENANCE.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// `Any` is only ever produced for endpoints whose workload health has not
/// been reconciled yet; it sorts below `Passing` so it can never win an
/// aggregation that starts from `Passing`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i8)]
pub enum Health {
    #[default]
    #[serde(rename = "HEALTH_ANY")]
    Any = -1,
    #[serde(rename = "HEALTH_PASSING")]
    Passing = 0,
    #[serde(rename = "HEALTH_WARNING")]
    Warning = 1,
    #[serde(rename = "HEALTH_CRITICAL")]
    Critical = 2,
    #[serde(rename = "HEALTH_MAINTENANCE")]
    Maintenance = 3,
}

impl Health {
    pub const fn as_str(self) -> &'static str {
        match self {
            Health::Any => "HEALTH_ANY",
            Health::Passing => "HEALTH_PASSING",
            Health::Warning => "HEALTH_WARNING",
            Health::Critical => "HEALTH_CRITICAL",
            Health::Maintenance => "HEALTH_MAINTENANCE",
        }
    }

    pub const fn ordinal(self) -> i8 {
        self as i8
    }

    /// The worse of the two values.
    pub fn worst(self, other: Health) -> Health {
        if other > self { other } else { self }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown health value {0:?}")]
pub struct UnknownHealth(pub String);

impl FromStr for Health {
    type Err = UnknownHealth;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HEALTH_ANY" => Ok(Health::Any),
            "HEALTH_PASSING" => Ok(Health::Passing),
            "HEALTH_WARNING" => Ok(Health::Warning),
            "HEALTH_CRITICAL" => Ok(Health::Critical),
            "HEALTH_MAINTENANCE" => Ok(Health::Maintenance),
            other => Err(UnknownHealth(other.to_string())),
        }
    }
}
