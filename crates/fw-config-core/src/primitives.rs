// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Atomic coercions behind the [`crate::Validator`] leaves.
//!
//! These functions are context free: they look at one value and either return
//! its canonical form or an [`Invalid`] with an empty path.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::error::Invalid;
use crate::suggest::closest_match;
use crate::value::ConfigValue;

pub fn string(value: &ConfigValue) -> Result<String, Invalid> {
    match value {
        ConfigValue::String(s) => Ok(s.clone()),
        ConfigValue::Int(i) => Ok(i.to_string()),
        ConfigValue::HexInt(i) => Ok(i.to_string()),
        ConfigValue::Float(f) => Ok(f.to_string()),
        ConfigValue::Enum { key, .. } => Ok(key.clone()),
        ConfigValue::TimePeriod(t) => Ok(t.to_string()),
        ConfigValue::Id(id) if id.name().is_some() => Ok(id.to_string()),
        ConfigValue::Bool(_) => Err(Invalid::new(
            "Auto-converted this value to boolean, please wrap the value in quotes.",
        )),
        ConfigValue::Mapping(_) | ConfigValue::Sequence(_) => {
            Err(Invalid::new("string value cannot be dictionary or list."))
        }
        ConfigValue::Null => Err(Invalid::new("string value is None")),
        other => Err(Invalid::new(format!("Expected string, got {}", other.kind()))),
    }
}

pub fn string_strict(value: &ConfigValue) -> Result<String, Invalid> {
    match value {
        ConfigValue::String(s) => Ok(s.clone()),
        other => Err(Invalid::new(format!(
            "Must be string, got {}. did you forget putting quotes around the value?",
            other.kind()
        ))),
    }
}

pub fn boolean(value: &ConfigValue) -> Result<bool, Invalid> {
    match value {
        ConfigValue::Bool(b) => Ok(*b),
        ConfigValue::String(s) => match s.to_lowercase().as_str() {
            "true" | "yes" | "on" | "enable" => Ok(true),
            "false" | "no" | "off" | "disable" => Ok(false),
            _ => Err(bool_error(value)),
        },
        _ => Err(bool_error(value)),
    }
}

fn bool_error(value: &ConfigValue) -> Invalid {
    Invalid::new(format!(
        "Expected boolean value, but cannot convert {value} to a boolean. Please use 'true' or 'false'"
    ))
}

pub fn int_(value: &ConfigValue) -> Result<i64, Invalid> {
    match value {
        ConfigValue::Int(i) | ConfigValue::HexInt(i) => Ok(*i),
        ConfigValue::Float(f) => {
            if f.fract() != 0.0 || !f.is_finite() {
                return Err(Invalid::new(format!(
                    "This option only accepts integers with no fractional part. Please remove the fractional part from {f}"
                )));
            }
            Ok(*f as i64)
        }
        ConfigValue::String(s) => {
            let t = s.trim();
            let parsed = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
                Some(hex) => i64::from_str_radix(hex, 16).ok(),
                None => t.parse::<i64>().ok(),
            };
            parsed.ok_or_else(|| {
                Invalid::new(format!(
                    "Expected integer, but cannot parse {t} as an integer"
                ))
            })
        }
        other => Err(Invalid::new(format!(
            "Expected integer, but cannot parse {other} as an integer"
        ))),
    }
}

pub fn float_(value: &ConfigValue) -> Result<f64, Invalid> {
    match value {
        ConfigValue::Float(f) => Ok(*f),
        ConfigValue::Int(i) | ConfigValue::HexInt(i) => Ok(*i as f64),
        ConfigValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| Invalid::new(format!("Invalid value '{s}' for float"))),
        other => Err(Invalid::new(format!("Expected float, got {}", other.kind()))),
    }
}

fn fmt_bound(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Bounds check shared by `int_range`, `float_range` and `Range`.
pub fn check_range<T: PartialOrd + Copy + std::fmt::Display>(
    n: T,
    min: Option<T>,
    max: Option<T>,
    min_included: bool,
    max_included: bool,
) -> Result<(), Invalid> {
    if let Some(min) = min {
        if min_included && n < min {
            return Err(Invalid::new(format!("value must be at least {min}")));
        }
        if !min_included && n <= min {
            return Err(Invalid::new(format!("value must be higher than {min}")));
        }
    }
    if let Some(max) = max {
        if max_included && n > max {
            return Err(Invalid::new(format!("value must be at most {max}")));
        }
        if !max_included && n >= max {
            return Err(Invalid::new(format!("value must be lower than {max}")));
        }
    }
    Ok(())
}

/// `"50%"`, `0.5`; `allow_negative` widens the range to -100%..100%.
pub fn percentage(value: &ConfigValue, allow_negative: bool) -> Result<f64, Invalid> {
    let (number, has_sign) = match value {
        ConfigValue::String(s) if s.trim_end().ends_with('%') => {
            let t = s.trim_end().trim_end_matches('%').trim();
            let v = t
                .parse::<f64>()
                .map_err(|_| Invalid::new(format!("Invalid percentage '{s}'")))?;
            (v / 100.0, true)
        }
        other => (float_(other)?, false),
    };
    if number > 1.0 {
        let mut msg = "Percentage must not be higher than 100%.".to_string();
        if !has_sign {
            msg.push_str(" Please put a percent sign after the number!");
        }
        return Err(Invalid::new(msg));
    }
    let floor = if allow_negative { -1.0 } else { 0.0 };
    if number < floor {
        return Err(Invalid::new(format!(
            "Percentage must not be lower than {}%.",
            fmt_bound(floor * 100.0)
        )));
    }
    Ok(number)
}

/// Case folding applied by `one_of` and `enum` before matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Folding {
    pub lower: bool,
    pub upper: bool,
    /// Replace spaces with this character.
    pub space: Option<char>,
}

impl Folding {
    fn apply(&self, s: &str) -> String {
        let mut out = match self.space {
            Some(c) => s.replace(' ', &c.to_string()),
            None => s.to_string(),
        };
        if self.lower {
            out = out.to_lowercase();
        }
        if self.upper {
            out = out.to_uppercase();
        }
        out
    }
}

fn unknown_value(shown: &str, options: &[String]) -> Invalid {
    match closest_match(shown, options.iter().map(String::as_str)) {
        Some(m) => Invalid::new(format!("Unknown value '{shown}', did you mean '{m}'?")),
        None => {
            let list: Vec<String> = options.iter().map(|o| format!("'{o}'")).collect();
            Invalid::new(format!(
                "Unknown value '{shown}', valid options are {}.",
                list.join(", ")
            ))
        }
    }
}

/// Membership check; `int` compares numerically.
pub fn one_of(
    value: &ConfigValue,
    options: &[ConfigValue],
    folding: Folding,
    int: bool,
) -> Result<ConfigValue, Invalid> {
    let candidate = if int {
        ConfigValue::Int(int_(value)?)
    } else {
        match value {
            ConfigValue::String(s) => ConfigValue::String(folding.apply(s)),
            other => other.clone(),
        }
    };
    let scalar = |v: &ConfigValue| {
        matches!(
            v,
            ConfigValue::String(_) | ConfigValue::Int(_) | ConfigValue::Float(_) | ConfigValue::Bool(_)
        )
    };
    let hit = options.iter().find(|o| {
        *o == &candidate || (scalar(*o) && scalar(&candidate) && o.to_string() == candidate.to_string())
    });
    match hit {
        Some(o) => Ok(o.clone()),
        None => {
            let names: Vec<String> = options.iter().map(|o| o.to_string()).collect();
            Err(unknown_value(&candidate.to_string(), &names))
        }
    }
}

/// Map a user-facing key onto its C++ value.
pub fn enum_(
    value: &ConfigValue,
    mapping: &[(String, String)],
    folding: Folding,
) -> Result<ConfigValue, Invalid> {
    if let ConfigValue::Enum { key, value: v } = value {
        if mapping.iter().any(|(k, mv)| k == key && mv == v) {
            return Ok(value.clone());
        }
    }
    let key = folding.apply(&string(value)?);
    match mapping.iter().find(|(k, _)| *k == key) {
        Some((k, v)) => Ok(ConfigValue::Enum {
            key: k.clone(),
            value: v.clone(),
        }),
        None => {
            let names: Vec<String> = mapping.iter().map(|(k, _)| k.clone()).collect();
            Err(unknown_value(&key, &names))
        }
    }
}

pub fn url(value: &ConfigValue) -> Result<String, Invalid> {
    let s = string_strict(value)?;
    let parsed = Url::parse(&s).map_err(|e| Invalid::new(format!("Invalid URL: {e}")))?;
    if parsed.scheme().is_empty() || parsed.host_str().is_none() {
        return Err(Invalid::new("Expected a URL scheme and host"));
    }
    Ok(s)
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("validator patterns are valid"))
}

pub fn git_ref(value: &ConfigValue) -> Result<String, Invalid> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let s = string(value)?;
    if !regex(&RE, r"^[a-zA-Z0-9_./-]+$").is_match(&s) {
        return Err(Invalid::new("Not a valid git ref"));
    }
    Ok(s)
}

pub fn version_number(value: &ConfigValue) -> Result<String, Invalid> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let s = string(value)?;
    if !regex(&RE, r"^(\d+)\.(\d+)\.(\d+)(-\w+)?$").is_match(&s) {
        return Err(Invalid::new(format!("Not a valid version number {s}")));
    }
    Ok(s)
}

pub fn mac_address(value: &ConfigValue) -> Result<String, Invalid> {
    let s = string_strict(value)?;
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 {
        return Err(Invalid::new(
            "MAC Address must consist of 6 : (colon) separated parts",
        ));
    }
    let mut out = Vec::with_capacity(6);
    for p in parts {
        let byte = u8::from_str_radix(p, 16).map_err(|_| {
            Invalid::new("MAC Address parts must be hexadecimal values from 00 to FF")
        })?;
        out.push(format!("{byte:02X}"));
    }
    Ok(out.join(":"))
}

pub fn hostname(value: &ConfigValue) -> Result<String, Invalid> {
    let s = string(value)?;
    if s.len() > 63 {
        return Err(Invalid::new("Hostnames can only be 63 characters long"));
    }
    if s.chars().any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_')) {
        return Err(Invalid::new(
            "Hostname can only have alphanumeric characters and -",
        ));
    }
    Ok(s)
}

pub fn domain_name(value: &ConfigValue) -> Result<String, Invalid> {
    let s = string_strict(value)?;
    if s.is_empty() {
        return Ok(s);
    }
    if !s.starts_with('.') {
        return Err(Invalid::new("Domainname must start with ."));
    }
    if s.starts_with("..") {
        return Err(Invalid::new("Domainname must start with single ."));
    }
    if s
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(Invalid::new(
            "Domainname can only have alphanumeric characters and _ or -",
        ));
    }
    Ok(s)
}

pub fn ssid(value: &ConfigValue) -> Result<String, Invalid> {
    let s = string_strict(value)?;
    if s.is_empty() {
        return Err(Invalid::new("SSID can't be empty."));
    }
    if s.chars().count() > 32 {
        return Err(Invalid::new("SSID can't be longer than 32 characters."));
    }
    Ok(s)
}

/// Device node names: lowercase letters, digits, `-` and `_`.
pub fn valid_name(value: &ConfigValue) -> Result<String, Invalid> {
    let s = string_strict(value)?;
    if let Some(c) = s
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_'))
    {
        return Err(Invalid::new(format!(
            "'{c}' is an invalid character for names. Valid characters are: a-z, 0-9, - and _ (lowercase, no spaces)"
        )));
    }
    Ok(s)
}

/// `"mdi:home-assistant"`.
pub fn icon(value: &ConfigValue) -> Result<String, Invalid> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let s = string(value)?;
    if !s.is_empty() && !regex(&RE, r"^[\w\-]+:[\w\-]+$").is_match(&s) {
        return Err(Invalid::new(
            "Icons must match the format \"[icon pack]:[icon]\", e.g. \"mdi:home-assistant\"",
        ));
    }
    Ok(s)
}

/// `"2700K"` or `"370 mireds"`, canonicalised to mireds.
pub fn color_temperature(value: &ConfigValue) -> Result<f64, Invalid> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let s = string(value)?;
    let caps = regex(&RE, r"^([0-9]*\.?[0-9]+)\s*(mireds|Mireds|K)$")
        .captures(s.trim())
        .ok_or_else(|| {
            Invalid::new("Color temperature must be given with a unit, either K or mireds")
        })?;
    let amount: f64 = caps[1]
        .parse()
        .map_err(|_| Invalid::new(format!("Invalid color temperature {s}")))?;
    if amount <= 0.0 {
        return Err(Invalid::new("Color temperature must be positive"));
    }
    Ok(match &caps[2] {
        "K" => 1_000_000.0 / amount,
        _ => amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> ConfigValue {
        ConfigValue::from(v)
    }

    #[test]
    fn strings_reject_structures_and_booleans() {
        assert_eq!(string(&ConfigValue::Int(5)).unwrap(), "5");
        assert!(string(&ConfigValue::Bool(true)).unwrap_err().message.contains("wrap the value in quotes"));
        assert!(string(&ConfigValue::Sequence(vec![])).is_err());
        assert!(string_strict(&ConfigValue::Int(5)).is_err());
    }

    #[test]
    fn booleans_accept_words() {
        assert!(boolean(&s("ON")).unwrap());
        assert!(!boolean(&s("disable")).unwrap());
        assert!(boolean(&s("maybe")).is_err());
    }

    #[test]
    fn ints_accept_hex_and_whole_floats() {
        assert_eq!(int_(&s("0x3C")).unwrap(), 60);
        assert_eq!(int_(&ConfigValue::Float(4.0)).unwrap(), 4);
        assert!(int_(&ConfigValue::Float(4.5)).unwrap_err().message.contains("fractional"));
    }

    #[test]
    fn range_messages() {
        assert_eq!(check_range(0.0, Some(1.0), Some(10.0), true, true).unwrap_err().message, "value must be at least 1");
        assert_eq!(check_range(11.0, Some(1.0), Some(10.0), true, true).unwrap_err().message, "value must be at most 10");
        assert_eq!(check_range(10.0, None, Some(10.0), true, false).unwrap_err().message, "value must be lower than 10");
        assert!(check_range(5.0, Some(1.0), Some(10.0), true, true).is_ok());
        assert_eq!(
            check_range(i64::MAX, None, Some(i64::MAX - 1), true, true).unwrap_err().message,
            format!("value must be at most {}", i64::MAX - 1)
        );
    }

    #[test]
    fn percentages() {
        assert_eq!(percentage(&s("50%"), false).unwrap(), 0.5);
        assert_eq!(percentage(&ConfigValue::Float(0.25), false).unwrap(), 0.25);
        let err = percentage(&ConfigValue::Int(50), false).unwrap_err();
        assert!(err.message.ends_with("Please put a percent sign after the number!"));
        assert_eq!(percentage(&s("-20%"), true).unwrap(), -0.2);
        assert!(percentage(&s("-20%"), false).is_err());
    }

    #[test]
    fn one_of_suggests_close_values() {
        let options = vec![s("rising"), s("falling"), s("any")];
        let lower = Folding { lower: true, ..Folding::default() };
        assert_eq!(one_of(&s("RISING"), &options, lower, false).unwrap(), s("rising"));
        let err = one_of(&s("fallin"), &options, lower, false).unwrap_err();
        assert_eq!(err.message, "Unknown value 'fallin', did you mean 'falling'?");
        let err = one_of(&s("zzz"), &options, lower, false).unwrap_err();
        assert_eq!(err.message, "Unknown value 'zzz', valid options are 'rising', 'falling', 'any'.");
        let ints = vec![ConfigValue::Int(8), ConfigValue::Int(16)];
        assert_eq!(one_of(&s("16"), &ints, Folding::default(), true).unwrap(), ConfigValue::Int(16));
    }

    #[test]
    fn enum_maps_to_cpp_value() {
        let mapping = vec![
            ("even".to_string(), "UART_CONFIG_PARITY_EVEN".to_string()),
            ("none".to_string(), "UART_CONFIG_PARITY_NONE".to_string()),
        ];
        let lower = Folding { lower: true, ..Folding::default() };
        let v = enum_(&s("EVEN"), &mapping, lower).unwrap();
        assert_eq!(
            v,
            ConfigValue::Enum { key: "even".into(), value: "UART_CONFIG_PARITY_EVEN".into() }
        );
        assert_eq!(enum_(&v, &mapping, lower).unwrap(), v);
    }

    #[test]
    fn domain_validators() {
        assert!(url(&s("https://github.com/esphome/esphome")).is_ok());
        assert!(url(&s("not a url")).is_err());
        assert!(git_ref(&s("v1.2.3")).is_ok());
        assert!(git_ref(&s("bad ref")).is_err());
        assert!(version_number(&s("2024.6.0")).is_ok());
        assert!(version_number(&s("2024.6")).is_err());
        assert_eq!(mac_address(&s("aa:bb:cc:dd:ee:ff")).unwrap(), "AA:BB:CC:DD:EE:FF");
        assert!(mac_address(&s("aa:bb")).is_err());
        assert!(hostname(&s("living-room")).is_ok());
        assert!(hostname(&s("living room")).is_err());
        assert!(domain_name(&s(".local")).is_ok());
        assert!(domain_name(&s("local")).is_err());
        assert!(ssid(&s(&"x".repeat(33))).is_err());
        assert!(valid_name(&s("kitchen_node-1")).is_ok());
        assert!(valid_name(&s("Kitchen")).is_err());
        assert!(icon(&s("mdi:thermometer")).is_ok());
        assert!(icon(&s("thermometer")).is_err());
    }

    #[test]
    fn color_temperature_in_mireds() {
        assert_eq!(color_temperature(&s("2000K")).unwrap(), 500.0);
        assert_eq!(color_temperature(&s("153 mireds")).unwrap(), 153.0);
        assert!(color_temperature(&ConfigValue::Int(2700)).is_err());
    }
}
