//! Provisioned throughput bookkeeping shared by tables and global indexes.
//!
//! Capacity is never enforced; the numbers are only recorded and reported.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::request::ProvisionedThroughput;

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Throughput {
    pub read_capacity_units: i64,
    pub write_capacity_units: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_increase: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decrease: Option<u64>,
    #[serde(default)]
    pub decreases_today: u64,
}

impl Throughput {
    pub fn new(spec: ProvisionedThroughput) -> Result<Self> {
        validate(spec)?;
        Ok(Throughput {
            read_capacity_units: spec.read_capacity_units,
            write_capacity_units: spec.write_capacity_units,
            last_increase: None,
            last_decrease: None,
            decreases_today: 0,
        })
    }

    /// Record new capacities, stamping increase/decrease times at `now`.
    pub fn update(&mut self, spec: ProvisionedThroughput, now: u64) -> Result<()> {
        validate(spec)?;
        let pairs = [
            (self.read_capacity_units, spec.read_capacity_units),
            (self.write_capacity_units, spec.write_capacity_units),
        ];
        let increased = pairs.iter().any(|(old, new)| new > old);
        let decreased = pairs.iter().any(|(old, new)| new < old);
        if increased {
            self.last_increase = Some(now);
        }
        if decreased {
            self.last_decrease = Some(now);
            self.decreases_today += 1;
        }
        self.read_capacity_units = spec.read_capacity_units;
        self.write_capacity_units = spec.write_capacity_units;
        Ok(())
    }

    pub fn spec(&self) -> ProvisionedThroughput {
        ProvisionedThroughput {
            read_capacity_units: self.read_capacity_units,
            write_capacity_units: self.write_capacity_units,
        }
    }

    pub fn description(&self) -> Value {
        let mut desc = json!({
            "NumberOfDecreasesToday": self.decreases_today,
            "ReadCapacityUnits": self.read_capacity_units,
            "WriteCapacityUnits": self.write_capacity_units,
        });
        if let Some(t) = self.last_increase {
            desc["LastIncreaseDateTime"] = json!(t);
        }
        if let Some(t) = self.last_decrease {
            desc["LastDecreaseDateTime"] = json!(t);
        }
        desc
    }
}

fn validate(spec: ProvisionedThroughput) -> Result<()> {
    for (name, units) in [
        ("ReadCapacityUnits", spec.read_capacity_units),
        ("WriteCapacityUnits", spec.write_capacity_units),
    ] {
        if units < 1 {
            return Err(Error::validation(format!(
                "One or more parameter values were invalid: {name} must be greater than 0, got {units}"
            )));
        }
    }
    Ok(())
}
