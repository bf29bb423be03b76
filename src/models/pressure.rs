use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Resource class reported under /proc/pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Cpu,
    Io,
    Memory,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Cpu, Resource::Io, Resource::Memory];

    /// File name of the pressure report for this resource.
    pub fn name(&self) -> &'static str {
        match self {
            Resource::Cpu    => "cpu",
            Resource::Io     => "io",
            Resource::Memory => "memory",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu"            => Ok(Resource::Cpu),
            "io"             => Ok(Resource::Io),
            "memory" | "mem" => Ok(Resource::Memory),
            other            => Err(format!("unknown resource '{}' (expected cpu, io or memory)", other)),
        }
    }
}

/// "some" = at least one task stalled; "full" = all non-idle tasks stalled at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Some,
    Full,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Some => "some",
            Scope::Full => "full",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "some" => Ok(Scope::Some),
            "full" => Ok(Scope::Full),
            other  => Err(format!("unknown scope '{}' (expected some or full)", other)),
        }
    }
}

/// A stall threshold within a rolling window. The kernel rejects
/// `threshold > window` when the trigger is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub threshold: Duration,
    pub window:    Duration,
    pub scope:     Scope,
}

impl Trigger {
    pub fn new(scope: Scope, threshold: Duration, window: Duration) -> Self {
        Self { threshold, window, scope }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}us/{}us",
            self.scope,
            self.threshold.as_micros(),
            self.window.as_micros()
        )
    }
}

/// One parsed line of a pressure report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PressureRecord {
    pub scope:  Scope,
    pub avg10:  f64,
    pub avg60:  f64,
    pub avg300: f64,
    /// Cumulative stall time in microseconds.
    pub total:  u64,
}
