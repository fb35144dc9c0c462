// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Physical quantities written with an SI prefix and an optional unit suffix.
//!
//! Every quantity canonicalises to a float in its base SI unit: hertz, ohms,
//! amperes, volts, metres, watts, farads, degrees Celsius, degrees and frames
//! per second.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Invalid;
use crate::value::ConfigValue;

/// A physical quantity understood by [`parse_quantity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Frequency,
    Resistance,
    Current,
    Voltage,
    Distance,
    Power,
    Capacitance,
    Temperature,
    Angle,
    Framerate,
}

impl Quantity {
    pub fn label(self) -> &'static str {
        match self {
            Quantity::Frequency => "frequency",
            Quantity::Resistance => "resistance",
            Quantity::Current => "current",
            Quantity::Voltage => "voltage",
            Quantity::Distance => "distance",
            Quantity::Power => "power",
            Quantity::Capacitance => "capacitance",
            Quantity::Temperature => "temperature",
            Quantity::Angle => "angle",
            Quantity::Framerate => "framerate",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Quantity::Frequency => "(Hz|HZ|hz)?",
            Quantity::Resistance => "(Ω|ohm|Ohm|OHM)?",
            Quantity::Current => "(a|A|amp|Amp|amps|Amps|ampere|Ampere)?",
            Quantity::Voltage => "(v|V|volt|Volts)?",
            Quantity::Distance => "(m)",
            Quantity::Power => "(W|w)?",
            Quantity::Capacitance => "(F|f)?",
            Quantity::Temperature => "(°C|° C|°|C)?",
            Quantity::Angle => "(°|deg)",
            Quantity::Framerate => "(FPS|fps|Fps|FpS|Hz)",
        }
    }

    /// Plain numbers are accepted even though the suffix is mandatory.
    fn unit_optional(self) -> bool {
        matches!(self, Quantity::Angle)
    }

    const ALL: [Quantity; 10] = [
        Quantity::Frequency,
        Quantity::Resistance,
        Quantity::Current,
        Quantity::Voltage,
        Quantity::Distance,
        Quantity::Power,
        Quantity::Capacitance,
        Quantity::Temperature,
        Quantity::Angle,
        Quantity::Framerate,
    ];
}

/// Multipliers for SI prefixes.
pub fn metric_multiplier(prefix: &str) -> Option<f64> {
    Some(match prefix {
        "E" => 1e18,
        "P" => 1e15,
        "T" => 1e12,
        "G" => 1e9,
        "M" => 1e6,
        "k" => 1e3,
        "h" => 1e2,
        "da" => 10.0,
        "d" => 1e-1,
        "c" => 1e-2,
        "m" => 1e-3,
        "µ" | "u" => 1e-6,
        "n" => 1e-9,
        "p" => 1e-12,
        "f" => 1e-15,
        "a" => 1e-18,
        "" => 1.0,
        _ => return None,
    })
}

fn patterns() -> &'static HashMap<Quantity, Regex> {
    static PATTERNS: OnceLock<HashMap<Quantity, Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        Quantity::ALL
            .iter()
            .map(|q| {
                let re = Regex::new(&format!(r"^([-+]?[0-9]*\.?[0-9]*)\s*(\w*?){}$", q.suffix()))
                    .expect("quantity patterns are valid");
                (*q, re)
            })
            .collect()
    })
}

/// Parse `"1MHz"`, `"4.7kΩ"`, `"2m"` into the canonical float.
pub fn parse_quantity(quantity: Quantity, value: &ConfigValue) -> Result<f64, Invalid> {
    if quantity.unit_optional() {
        if let Some(v) = value.as_f64() {
            return Ok(v);
        }
    }
    let text = match value {
        ConfigValue::String(s) => s.trim().to_string(),
        ConfigValue::Int(i) => i.to_string(),
        ConfigValue::Float(f) => f.to_string(),
        other => {
            return Err(Invalid::new(format!(
                "Expected {} with unit, got {}",
                quantity.label(),
                other.kind()
            )))
        }
    };
    let Some(caps) = patterns().get(&quantity).and_then(|re| re.captures(&text)) else {
        return Err(Invalid::new(format!(
            "Expected {} with unit, got {}",
            quantity.label(),
            text
        )));
    };
    let mantissa: f64 = caps[1].parse().map_err(|_| {
        Invalid::new(format!("Expected {} with unit, got {}", quantity.label(), text))
    })?;
    let prefix = caps.get(2).map_or("", |m| m.as_str());
    let multiplier = metric_multiplier(prefix).ok_or_else(|| {
        Invalid::new(format!("Invalid {} suffix {}", quantity.label(), prefix))
    })?;
    Ok(mantissa * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> ConfigValue {
        ConfigValue::from(v)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= b.abs() * 1e-9
    }

    #[test]
    fn frequency_in_hertz() {
        assert!(close(parse_quantity(Quantity::Frequency, &s("1MHz")).unwrap(), 1e6));
        assert!(close(parse_quantity(Quantity::Frequency, &s("400kHz")).unwrap(), 4e5));
        assert!(close(parse_quantity(Quantity::Frequency, &ConfigValue::Int(50)).unwrap(), 50.0));
    }

    #[test]
    fn distance_requires_metres() {
        assert!(close(parse_quantity(Quantity::Distance, &s("2m")).unwrap(), 2.0));
        assert!(close(parse_quantity(Quantity::Distance, &s("15cm")).unwrap(), 0.15));
        assert!(close(parse_quantity(Quantity::Distance, &s("5mm")).unwrap(), 0.005));
        assert!(parse_quantity(Quantity::Distance, &ConfigValue::Int(2)).is_err());
    }

    #[test]
    fn resistance_and_bad_prefix() {
        assert!(close(parse_quantity(Quantity::Resistance, &s("4.7kΩ")).unwrap(), 4700.0));
        let err = parse_quantity(Quantity::Voltage, &s("3xV")).unwrap_err();
        assert_eq!(err.message, "Invalid voltage suffix x");
    }

    #[test]
    fn angle_accepts_plain_numbers() {
        assert!(close(parse_quantity(Quantity::Angle, &ConfigValue::Float(12.5)).unwrap(), 12.5));
        assert!(close(parse_quantity(Quantity::Angle, &s("90°")).unwrap(), 90.0));
    }
}
