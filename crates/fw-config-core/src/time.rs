// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Time periods.
//!
//! Every accepted spelling (`"500ms"`, `"1.5s"`, `"01:30"`, `{minutes: 2}`) is
//! normalised to whole nanoseconds. The validator that produced a period also
//! stamps the unit it is emitted in, so `update_interval` becomes milliseconds
//! and `positive_time_period_seconds` becomes seconds.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Invalid;
use crate::value::ConfigValue;

const NS_PER_US: i64 = 1_000;
const NS_PER_MS: i64 = 1_000_000;
const NS_PER_S: i64 = 1_000_000_000;
const NS_PER_MIN: i64 = 60 * NS_PER_S;
const NS_PER_H: i64 = 60 * NS_PER_MIN;
const NS_PER_D: i64 = 24 * NS_PER_H;

/// Milliseconds value the runtime scheduler treats as "never run".
pub const NEVER_MS: i64 = 4_294_967_295;

/// Unit a time period is emitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
}

impl TimeUnit {
    fn nanos(self) -> i64 {
        match self {
            TimeUnit::Nanoseconds => 1,
            TimeUnit::Microseconds => NS_PER_US,
            TimeUnit::Milliseconds => NS_PER_MS,
            TimeUnit::Seconds => NS_PER_S,
            TimeUnit::Minutes => NS_PER_MIN,
        }
    }

    fn label(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "nanoseconds",
            TimeUnit::Microseconds => "microseconds",
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
        }
    }
}

/// A validated duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimePeriod {
    nanos: i64,
    unit: TimeUnit,
}

impl TimePeriod {
    pub fn from_nanos(nanos: i64) -> Self {
        Self {
            nanos,
            unit: TimeUnit::Nanoseconds,
        }
    }

    pub fn from_millis(ms: i64) -> Self {
        Self {
            nanos: ms.saturating_mul(NS_PER_MS),
            unit: TimeUnit::Milliseconds,
        }
    }

    pub fn from_secs(s: i64) -> Self {
        Self {
            nanos: s.saturating_mul(NS_PER_S),
            unit: TimeUnit::Seconds,
        }
    }

    pub fn never() -> Self {
        Self::from_millis(NEVER_MS)
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn total_nanoseconds(&self) -> i64 {
        self.nanos
    }

    pub fn total_microseconds(&self) -> i64 {
        self.nanos / NS_PER_US
    }

    pub fn total_milliseconds(&self) -> i64 {
        self.nanos / NS_PER_MS
    }

    pub fn total_seconds(&self) -> i64 {
        self.nanos / NS_PER_S
    }

    pub fn total_minutes(&self) -> i64 {
        self.nanos / NS_PER_MIN
    }

    /// The integer handed to generated code, in this period's unit.
    pub fn emit_value(&self) -> i64 {
        self.nanos / self.unit.nanos()
    }

    /// Re-stamp the emission unit, failing when precision would be lost.
    pub fn with_unit(self, unit: TimeUnit) -> Result<Self, Invalid> {
        if self.nanos % unit.nanos() != 0 {
            return Err(Invalid::new(format!(
                "Maximum precision is {}",
                unit.label()
            )));
        }
        Ok(Self {
            nanos: self.nanos,
            unit,
        })
    }

    pub fn is_negative(&self) -> bool {
        self.nanos < 0
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos == 0 {
            return write!(f, "0s");
        }
        let units = [
            (NS_PER_D, "d"),
            (NS_PER_H, "h"),
            (NS_PER_MIN, "min"),
            (NS_PER_S, "s"),
            (NS_PER_MS, "ms"),
            (NS_PER_US, "us"),
        ];
        for (n, suffix) in units {
            if self.nanos % n == 0 {
                return write!(f, "{}{}", self.nanos / n, suffix);
            }
        }
        write!(f, "{}ns", self.nanos)
    }
}

fn unit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([-+]?[0-9]*\.?[0-9]*)\s*(\w*)$").expect("time period pattern is valid")
    })
}

fn unit_factor(unit: &str) -> Option<i64> {
    Some(match unit {
        "ns" => 1,
        "us" | "µs" => NS_PER_US,
        "ms" => NS_PER_MS,
        "s" | "sec" => NS_PER_S,
        "min" => NS_PER_MIN,
        "h" => NS_PER_H,
        "d" => NS_PER_D,
        _ => return None,
    })
}

fn scaled(amount: f64, factor: i64) -> Result<i64, Invalid> {
    let total = (amount * factor as f64).round();
    if !total.is_finite() || total.abs() > i64::MAX as f64 {
        return Err(Invalid::new("Time period is out of range"));
    }
    Ok(total as i64)
}

/// `"10s"`, `"1.5min"`, `"250 ms"`.
pub fn parse_with_unit(value: &str) -> Result<TimePeriod, Invalid> {
    let caps = unit_regex()
        .captures(value.trim())
        .ok_or_else(|| Invalid::new(format!("Expected time period with unit, got {value}")))?;
    let number = &caps[1];
    let unit = &caps[2];
    if unit.is_empty() {
        return Err(Invalid::new(format!(
            "Don't know what '{value}' means as it has no time *unit*! Did you mean '{value}s'?"
        )));
    }
    let factor = unit_factor(unit).ok_or_else(|| {
        Invalid::new(format!(
            "Unknown time unit '{unit}', valid options are ns, us, ms, s, sec, min, h, d"
        ))
    })?;
    let amount: f64 = number
        .parse()
        .map_err(|_| Invalid::new(format!("Expected time period with unit, got {value}")))?;
    Ok(TimePeriod::from_nanos(scaled(amount, factor)?))
}

/// `"HH:MM"` or `"HH:MM:SS"`.
pub fn parse_colon(value: &str) -> Result<TimePeriod, Invalid> {
    let parts: Vec<&str> = value.split(':').collect();
    let nums: Result<Vec<i64>, _> = parts.iter().map(|p| p.trim().parse::<i64>()).collect();
    let nums = nums.map_err(|_| Invalid::new(format!("Invalid time period format {value}")))?;
    let (h, m, s) = match nums.as_slice() {
        [h, m] => (*h, *m, 0),
        [h, m, s] => (*h, *m, *s),
        _ => {
            return Err(Invalid::new(
                "Expected time period in the form HH:MM or HH:MM:SS",
            ))
        }
    };
    Ok(TimePeriod::from_nanos(h * NS_PER_H + m * NS_PER_MIN + s * NS_PER_S))
}

/// `{days: 1, hours: 2, minutes: 3, seconds: 4, milliseconds: 5, microseconds: 6}`.
pub fn parse_mapping(map: &crate::ConfigMap) -> Result<TimePeriod, Invalid> {
    let mut nanos: i64 = 0;
    for (k, v) in map.iter() {
        let factor = match k {
            "days" => NS_PER_D,
            "hours" => NS_PER_H,
            "minutes" => NS_PER_MIN,
            "seconds" => NS_PER_S,
            "milliseconds" => NS_PER_MS,
            "microseconds" => NS_PER_US,
            "nanoseconds" => 1,
            other => {
                return Err(Invalid::at(
                    format!("Unknown time period key '{other}'"),
                    crate::config_path![other],
                ))
            }
        };
        let amount = v.as_f64().ok_or_else(|| {
            Invalid::at("Expected a number", crate::config_path![k])
        })?;
        nanos = nanos.saturating_add(scaled(amount, factor)?);
    }
    Ok(TimePeriod::from_nanos(nanos))
}

/// Accept any spelling of a time period.
pub fn parse_time_period(value: &ConfigValue) -> Result<TimePeriod, Invalid> {
    match value {
        ConfigValue::TimePeriod(t) => Ok(*t),
        ConfigValue::Int(i) => Err(Invalid::new(format!(
            "Don't know what '{i}' means as it has no time *unit*! Did you mean '{i}s'?"
        ))),
        ConfigValue::Float(v) => Err(Invalid::new(format!(
            "Don't know what '{v}' means as it has no time *unit*! Did you mean '{v}s'?"
        ))),
        ConfigValue::String(s) if s.contains(':') => parse_colon(s),
        ConfigValue::String(s) => parse_with_unit(s),
        ConfigValue::Mapping(m) => parse_mapping(m),
        ConfigValue::Lambda(_) => Err(Invalid::new("This option is not templatable!")),
        other => Err(Invalid::new(format!(
            "Expected time period, got {}",
            other.kind()
        ))),
    }
}
