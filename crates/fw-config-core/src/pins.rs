// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! GPIO pin validation.
//!
//! A pin value is either a bare number/name or a mapping. Mappings that carry
//! an expander key (`mcp23017:`, `pcf8574:`, ...) are validated by that
//! provider; everything else is a native pin of the current target. Each
//! validated pin is recorded in the context so the final pass can reject pins
//! shared between components.

use std::fmt;
use std::sync::Arc;

use fw_codegen::{esphome_ns, known, CodegenModel, CppType, Expression};

use crate::config_path;
use crate::context::{Esp32Variant, Target, TargetPlatform, ValidationContext};
use crate::error::{ConfigError, ConfigPath, Invalid, MultipleInvalid, Result};
use crate::primitives;
use crate::schema::Schema;
use crate::validators::{ValidationResult, Validator};
use crate::value::{ConfigMap, ConfigValue};

pub const CONF_NUMBER: &str = "number";
pub const CONF_MODE: &str = "mode";
pub const CONF_INVERTED: &str = "inverted";
pub const CONF_ALLOW_OTHER_USES: &str = "allow_other_uses";
pub const CONF_IGNORE_STRAPPING_WARNING: &str = "ignore_strapping_warning";
const CONF_OTHER_USES: &str = "other_uses";

const MODE_KEYS: [&str; 5] = ["input", "output", "open_drain", "pullup", "pulldown"];

/// The electrical configuration of a pin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PinMode {
    pub input: bool,
    pub output: bool,
    pub open_drain: bool,
    pub pullup: bool,
    pub pulldown: bool,
}

impl PinMode {
    pub const INPUT: PinMode = PinMode {
        input: true,
        output: false,
        open_drain: false,
        pullup: false,
        pulldown: false,
    };
    pub const OUTPUT: PinMode = PinMode {
        input: false,
        output: true,
        open_drain: false,
        pullup: false,
        pulldown: false,
    };
    pub const INPUT_PULLUP: PinMode = PinMode {
        pullup: true,
        ..PinMode::INPUT
    };
    pub const INPUT_PULLDOWN: PinMode = PinMode {
        pulldown: true,
        ..PinMode::INPUT
    };
    pub const OUTPUT_OPEN_DRAIN: PinMode = PinMode {
        open_drain: true,
        ..PinMode::OUTPUT
    };
    pub const INPUT_OUTPUT_OPEN_DRAIN: PinMode = PinMode {
        input: true,
        ..PinMode::OUTPUT_OPEN_DRAIN
    };

    /// Expand the legacy string spellings.
    pub fn from_shorthand(s: &str) -> Option<Self> {
        Some(match s.to_uppercase().as_str() {
            "INPUT" => PinMode::INPUT,
            "OUTPUT" => PinMode::OUTPUT,
            "INPUT_PULLUP" => PinMode::INPUT_PULLUP,
            "INPUT_PULLDOWN" => PinMode::INPUT_PULLDOWN,
            "OUTPUT_OPEN_DRAIN" => PinMode::OUTPUT_OPEN_DRAIN,
            "INPUT_OUTPUT_OPEN_DRAIN" => PinMode::INPUT_OUTPUT_OPEN_DRAIN,
            _ => return None,
        })
    }

    fn flags(&self) -> [(&'static str, bool); 5] {
        [
            ("input", self.input),
            ("output", self.output),
            ("open_drain", self.open_drain),
            ("pullup", self.pullup),
            ("pulldown", self.pulldown),
        ]
    }

    pub fn to_value(&self) -> ConfigValue {
        ConfigValue::Mapping(
            self.flags()
                .into_iter()
                .map(|(k, v)| (k, ConfigValue::Bool(v)))
                .collect(),
        )
    }

    pub fn from_value(value: &ConfigValue) -> Option<Self> {
        let m = value.as_mapping()?;
        let get = |k: &str| m.get(k).and_then(ConfigValue::as_bool).unwrap_or(false);
        Some(PinMode {
            input: get("input"),
            output: get("output"),
            open_drain: get("open_drain"),
            pullup: get("pullup"),
            pulldown: get("pulldown"),
        })
    }

    /// `gpio::Flags` expression for generated code.
    pub fn flags_expression(&self) -> Expression {
        let flags: Vec<String> = self
            .flags()
            .into_iter()
            .filter(|(_, on)| *on)
            .map(|(k, _)| format!("gpio::Flags::FLAG_{}", k.to_uppercase()))
            .collect();
        if flags.is_empty() {
            Expression::raw("gpio::Flags::FLAG_NONE")
        } else {
            Expression::raw(flags.join(" | "))
        }
    }
}

/// How a caller wants its pin validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinSchema {
    pub default_mode: PinMode,
    /// Only native pins of the target are accepted.
    pub internal: bool,
}

impl PinSchema {
    pub fn new(default_mode: PinMode) -> Self {
        Self {
            default_mode,
            internal: false,
        }
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }
}

/// One validated use of a pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinUse {
    /// `esp32`, or `mcp23017:hub_name` for expander pins.
    pub owner: String,
    pub number: i64,
    pub allow_other_uses: bool,
    pub path: ConfigPath,
}

type PinBuilderFn =
    dyn Fn(&ConfigMap, &mut CodegenModel) -> fw_codegen::Result<Expression> + Send + Sync;

/// Emits the construction of a pin provided by an external component.
#[derive(Clone)]
pub struct PinBuilder(Arc<PinBuilderFn>);

impl PinBuilder {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ConfigMap, &mut CodegenModel) -> fw_codegen::Result<Expression> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn build(&self, config: &ConfigMap, model: &mut CodegenModel) -> fw_codegen::Result<Expression> {
        (self.0)(config, model)
    }
}

impl fmt::Debug for PinBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PinBuilder")
    }
}

/// A pin provider registered by a component outside the core.
#[derive(Debug, Clone)]
pub struct ExternalPinProvider {
    pub key: String,
    pub pin_type: CppType,
    /// Extends the common pin keys; may override `number`.
    pub schema: Schema,
    pub builder: PinBuilder,
}

/// Pin sources other than the target's own GPIOs.
#[derive(Debug, Clone)]
pub enum PinProvider {
    Mcp23xxx { key: &'static str, pin_count: i64 },
    Pcf8574 { key: &'static str, pin_count: i64 },
    Sn74hc595,
    External(ExternalPinProvider),
}

impl PinProvider {
    pub fn key(&self) -> &str {
        match self {
            PinProvider::Mcp23xxx { key, .. } | PinProvider::Pcf8574 { key, .. } => *key,
            PinProvider::Sn74hc595 => "sn74hc595",
            PinProvider::External(p) => &p.key,
        }
    }

    /// Class of the hub a built-in expander pin points at.
    pub fn hub_type(&self) -> Option<CppType> {
        let base = |ns: &str, class: &str| {
            esphome_ns().namespace(ns).class_(class, &[&known::component()])
        };
        match self {
            PinProvider::Mcp23xxx { key, .. } => {
                let parent = base("mcp23xxx_base", "MCP23XXXBase");
                let class = key.to_uppercase();
                Some(esphome_ns().namespace(key).class_(&class, &[&parent]))
            }
            PinProvider::Pcf8574 { .. } => Some(base("pcf8574", "PCF8574Component")),
            PinProvider::Sn74hc595 => Some(base("sn74hc595", "SN74HC595Component")),
            PinProvider::External(_) => None,
        }
    }

    pub fn pin_type(&self) -> CppType {
        let gpio = known::gpio_pin();
        match self {
            PinProvider::Mcp23xxx { .. } => esphome_ns()
                .namespace("mcp23xxx_base")
                .class_("MCP23XXXGPIOPin", &[&gpio]),
            PinProvider::Pcf8574 { .. } => esphome_ns()
                .namespace("pcf8574")
                .class_("PCF8574GPIOPin", &[&gpio]),
            PinProvider::Sn74hc595 => esphome_ns()
                .namespace("sn74hc595")
                .class_("SN74HC595GPIOPin", &[&gpio]),
            PinProvider::External(p) => p.pin_type.clone(),
        }
    }
}

/// Class of a native pin on `platform`.
pub fn native_pin_type(platform: TargetPlatform) -> CppType {
    let internal = known::internal_gpio_pin();
    let (ns, class) = match platform {
        TargetPlatform::Esp32 => ("esp32", "ESP32InternalGPIOPin"),
        TargetPlatform::Esp8266 => ("esp8266", "ESP8266GPIOPin"),
        TargetPlatform::Rp2040 => ("rp2040", "RP2040GPIOPin"),
        TargetPlatform::Libretiny => ("libretiny", "ArduinoInternalGPIOPin"),
        TargetPlatform::Nrf52 => ("zephyr", "ZephyrGPIOPin"),
        TargetPlatform::Host => ("host", "HostGPIOPin"),
    };
    esphome_ns().namespace(ns).class_(class, &[&internal])
}

/// Known pin providers, keyed by the mapping key that selects them.
#[derive(Debug, Clone)]
pub struct PinRegistry {
    providers: Vec<PinProvider>,
}

impl Default for PinRegistry {
    fn default() -> Self {
        Self {
            providers: vec![
                PinProvider::Mcp23xxx {
                    key: "mcp23017",
                    pin_count: 16,
                },
                PinProvider::Mcp23xxx {
                    key: "mcp23008",
                    pin_count: 8,
                },
                PinProvider::Pcf8574 {
                    key: "pcf8574",
                    pin_count: 8,
                },
                PinProvider::Pcf8574 {
                    key: "pcf8575",
                    pin_count: 16,
                },
                PinProvider::Sn74hc595,
            ],
        }
    }
}

impl PinRegistry {
    pub fn register_external(&mut self, provider: ExternalPinProvider) -> Result<()> {
        if self.provider(&provider.key).is_some() {
            return Err(ConfigError::DuplicatePinProvider(provider.key));
        }
        self.providers.push(PinProvider::External(provider));
        Ok(())
    }

    pub fn provider(&self, key: &str) -> Option<&PinProvider> {
        self.providers.iter().find(|p| p.key() == key)
    }

    /// The provider whose key appears in a pin mapping.
    pub fn select(&self, pin: &ConfigMap) -> Option<&PinProvider> {
        self.providers.iter().find(|p| pin.contains_key(p.key()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(PinProvider::key)
    }
}

struct Esp32Layout {
    label: &'static str,
    max: i64,
    flash: &'static [i64],
    unusable: &'static [i64],
    input_only: &'static [i64],
    strapping: &'static [i64],
    psram: &'static [i64],
}

const ESP32: Esp32Layout = Esp32Layout {
    label: "ESP32",
    max: 39,
    flash: &[6, 7, 8, 9, 10, 11],
    unusable: &[20, 24, 28, 29, 30, 31],
    input_only: &[34, 35, 36, 37, 38, 39],
    strapping: &[0, 2, 12, 15],
    psram: &[16, 17],
};
const ESP32_S2: Esp32Layout = Esp32Layout {
    label: "ESP32-S2",
    max: 46,
    flash: &[],
    unusable: &[22, 23, 24, 25],
    input_only: &[46],
    strapping: &[0, 45, 46],
    psram: &[26],
};
const ESP32_S3: Esp32Layout = Esp32Layout {
    label: "ESP32-S3",
    max: 48,
    flash: &[26, 27, 28, 29, 30, 31, 32],
    unusable: &[22, 23, 24, 25],
    input_only: &[],
    strapping: &[0, 3, 45, 46],
    psram: &[33, 34, 35, 36, 37],
};
const ESP32_C3: Esp32Layout = Esp32Layout {
    label: "ESP32-C3",
    max: 21,
    flash: &[12, 13, 14, 15, 16, 17],
    unusable: &[],
    input_only: &[],
    strapping: &[2, 8, 9],
    psram: &[],
};
const ESP32_C6: Esp32Layout = Esp32Layout {
    label: "ESP32-C6",
    max: 30,
    flash: &[24, 25, 26, 27, 28, 29, 30],
    unusable: &[],
    input_only: &[],
    strapping: &[8, 9, 15],
    psram: &[],
};
const ESP32_C2: Esp32Layout = Esp32Layout {
    label: "ESP32-C2",
    max: 20,
    flash: &[],
    unusable: &[],
    input_only: &[],
    strapping: &[8, 9],
    psram: &[],
};
const ESP32_H2: Esp32Layout = Esp32Layout {
    label: "ESP32-H2",
    max: 27,
    flash: &[15, 16, 17, 18, 19, 20, 21],
    unusable: &[],
    input_only: &[],
    strapping: &[2, 3, 8, 9, 25],
    psram: &[],
};

fn esp32_layout(variant: Option<Esp32Variant>) -> &'static Esp32Layout {
    match variant.unwrap_or(Esp32Variant::Esp32) {
        Esp32Variant::Esp32 => &ESP32,
        Esp32Variant::Esp32S2 => &ESP32_S2,
        Esp32Variant::Esp32S3 => &ESP32_S3,
        Esp32Variant::Esp32C3 => &ESP32_C3,
        Esp32Variant::Esp32C6 => &ESP32_C6,
        Esp32Variant::Esp32C2 => &ESP32_C2,
        Esp32Variant::Esp32H2 => &ESP32_H2,
    }
}

const ESP32_ALIASES: &[(&str, i64)] = &[
    ("TX", 1), ("RX", 3), ("SDA", 21), ("SCL", 22), ("SS", 5), ("MOSI", 23), ("MISO", 19),
    ("SCK", 18), ("A0", 36), ("A3", 39), ("A4", 32), ("A5", 33), ("A6", 34), ("A7", 35),
    ("A10", 4), ("A11", 0), ("A12", 2), ("A13", 15), ("A14", 13), ("A15", 12), ("A16", 14),
    ("A17", 27), ("A18", 25), ("A19", 26), ("T0", 4), ("T1", 0), ("T2", 2), ("T3", 15),
    ("T4", 13), ("T5", 12), ("T6", 14), ("T7", 27), ("T8", 33), ("T9", 32), ("DAC1", 25),
    ("DAC2", 26),
];

const ESP8266_ALIASES: &[(&str, i64)] = &[
    ("A0", 17), ("RX", 3), ("TX", 1), ("SDA", 4), ("SCL", 5), ("SS", 15), ("MOSI", 13),
    ("MISO", 12), ("SCK", 14),
];

const ESP8266_D_PINS: &[(&str, i64)] = &[
    ("D0", 16), ("D1", 5), ("D2", 4), ("D3", 0), ("D4", 2), ("D5", 14), ("D6", 12),
    ("D7", 13), ("D8", 15), ("LED", 2),
];

const ESP8266_D_BOARDS: &[&str] = &["nodemcuv2", "d1_mini", "d1_mini_pro", "d1_mini_lite"];

fn board_alias(target: &Target, name: &str) -> Option<i64> {
    let lookup = |table: &[(&str, i64)]| table.iter().find(|(k, _)| *k == name).map(|(_, v)| *v);
    match target.platform {
        TargetPlatform::Esp32 if target.variant.unwrap_or(Esp32Variant::Esp32) == Esp32Variant::Esp32 => {
            lookup(ESP32_ALIASES)
        }
        TargetPlatform::Esp8266 => lookup(ESP8266_ALIASES).or_else(|| {
            ESP8266_D_BOARDS
                .contains(&target.board.as_str())
                .then(|| lookup(ESP8266_D_PINS))
                .flatten()
        }),
        TargetPlatform::Rp2040 if target.board == "rpipico" && name == "LED" => Some(25),
        _ => None,
    }
}

/// Turn `5`, `"5"`, `"GPIO5"` or a board alias into a pin number.
pub fn resolve_pin_number(target: &Target, value: &ConfigValue) -> std::result::Result<i64, Invalid> {
    match value {
        ConfigValue::Int(n) => Ok(*n),
        ConfigValue::String(s) => {
            let name = s.trim().to_uppercase();
            if let Ok(n) = name.parse::<i64>() {
                return Ok(n);
            }
            if let Some(n) = name.strip_prefix("GPIO").and_then(|d| d.parse::<i64>().ok()) {
                return Ok(n);
            }
            board_alias(target, &name).ok_or_else(|| {
                Invalid::new(format!(
                    "Cannot resolve pin name '{s}' for board {}.",
                    target.board
                ))
            })
        }
        other => Err(Invalid::new(format!(
            "Expected a pin number or name, got {}",
            other.kind()
        ))),
    }
}

fn mode_error(message: String, key: &str) -> Invalid {
    Invalid::at(message, config_path![CONF_MODE, key])
}

fn validate_mode(
    raw: Option<&ConfigValue>,
    default: PinMode,
    ctx: &mut ValidationContext,
) -> std::result::Result<PinMode, MultipleInvalid> {
    let mode = match raw {
        None | Some(ConfigValue::Null) => default,
        Some(ConfigValue::String(s)) => {
            let mode = PinMode::from_shorthand(s).ok_or_else(|| {
                Invalid::at(
                    format!(
                        "Unknown pin mode '{s}'. Use a mapping of input, output, open_drain, pullup and pulldown"
                    ),
                    config_path![CONF_MODE],
                )
            })?;
            ctx.descend(CONF_MODE, |ctx| {
                ctx.warn(format!(
                    "Pin mode '{s}' is deprecated, please use a mapping such as 'mode: {{input: true, pullup: true}}'"
                ))
            });
            mode
        }
        Some(ConfigValue::Mapping(m)) => {
            let mut errors = Vec::new();
            for (k, v) in m.iter() {
                if !MODE_KEYS.contains(&k) {
                    errors.push(Invalid::at(
                        format!("[{k}] is an invalid option for [mode]."),
                        config_path![CONF_MODE, k],
                    ));
                } else if let Err(e) = primitives::boolean(v) {
                    errors.push(e.prepend(&config_path![CONF_MODE, k]));
                }
            }
            if !errors.is_empty() {
                return Err(MultipleInvalid::new(errors));
            }
            let flag = |k: &str| m.get(k).map(|v| primitives::boolean(v).unwrap_or(false)).unwrap_or(false);
            PinMode {
                input: flag("input"),
                output: flag("output"),
                open_drain: flag("open_drain"),
                pullup: flag("pullup"),
                pulldown: flag("pulldown"),
            }
        }
        Some(other) => {
            return Err(Invalid::at(
                format!("Expected pin mode mapping, got {}", other.kind()),
                config_path![CONF_MODE],
            )
            .into())
        }
    };
    if mode.open_drain && !mode.output {
        return Err(mode_error("Open-drain only works with output mode".into(), "open_drain").into());
    }
    Ok(mode)
}

fn number_error(message: String) -> Invalid {
    Invalid::at(message, config_path![CONF_NUMBER])
}

fn check_range(n: i64, max: i64) -> std::result::Result<(), Invalid> {
    primitives::check_range(n, Some(0), Some(max), true, true)
        .map_err(|e| e.prepend(&config_path![CONF_NUMBER]))
}

fn validate_esp32(
    layout: &Esp32Layout,
    n: i64,
    mode: PinMode,
    ctx: &mut ValidationContext,
) -> std::result::Result<(), Invalid> {
    let label = layout.label;
    if n < 0 || n > layout.max {
        return Err(number_error(format!(
            "Invalid pin number: {n} (must be 0-{})",
            layout.max
        )));
    }
    if layout.flash.contains(&n) {
        return Err(number_error(format!(
            "This pin cannot be used on {label} and is already used by the flash interface"
        )));
    }
    if layout.unusable.contains(&n) {
        return Err(number_error(format!("The pin GPIO{n} is not usable on {label}.")));
    }
    if layout.input_only.contains(&n) {
        let checks = [
            (mode.output, "output", "output pin mode"),
            (mode.open_drain, "open_drain", "open-drain pin mode"),
            (mode.pullup, "pullup", "pullups"),
            (mode.pulldown, "pulldown", "pulldowns"),
        ];
        if let Some((_, key, what)) = checks.iter().find(|(on, _, _)| *on) {
            return Err(mode_error(
                format!("GPIO{n} is input only on {label} and does not support {what}."),
                key,
            ));
        }
    }
    if layout.psram.contains(&n) {
        ctx.warn(format!(
            "GPIO{n} is used by the PSRAM interface on some {label} modules and should be avoided on those models."
        ));
    }
    Ok(())
}

fn validate_esp8266(n: i64, mode: PinMode, ctx: &mut ValidationContext) -> std::result::Result<(), Invalid> {
    if !(0..=17).contains(&n) {
        return Err(number_error(format!("ESP8266: Invalid pin number: {n}")));
    }
    if (6..=11).contains(&n) {
        ctx.warn(format!(
            "ESP8266: Pin {n} (6-11) might already be used by the flash interface. Be warned."
        ));
    }
    if n == 17 && (mode.output || mode.open_drain || mode.pullup || mode.pulldown) {
        return Err(Invalid::at(
            "GPIO17 (TOUT) is an analog-only pin on the ESP8266.",
            config_path![CONF_MODE],
        ));
    }
    if n == 16 && mode.pullup {
        return Err(mode_error(
            "GPIO16 does not support pullup pin mode. Please choose pulldown instead.".into(),
            "pullup",
        ));
    }
    if n != 16 && mode.pulldown {
        return Err(mode_error("Only GPIO16 supports pulldown pin mode.".into(), "pulldown"));
    }
    Ok(())
}

fn validate_native_number(
    target: &Target,
    n: i64,
    mode: PinMode,
    ctx: &mut ValidationContext,
) -> std::result::Result<(), Invalid> {
    let bounded = |max: i64| {
        if n < 0 || n > max {
            Err(number_error(format!("Invalid pin number: {n} (must be 0-{max})")))
        } else {
            Ok(())
        }
    };
    match target.platform {
        TargetPlatform::Esp32 => validate_esp32(esp32_layout(target.variant), n, mode, ctx),
        TargetPlatform::Esp8266 => validate_esp8266(n, mode, ctx),
        TargetPlatform::Rp2040 => bounded(29),
        TargetPlatform::Libretiny => bounded(31),
        TargetPlatform::Nrf52 => bounded(47),
        TargetPlatform::Host if n < 0 => Err(number_error("Pin number must not be negative".into())),
        TargetPlatform::Host => Ok(()),
    }
}

fn common_schema(pin_type: CppType) -> Schema {
    Schema::new()
        .generate_id(pin_type)
        .required(CONF_NUMBER, Validator::Valid)
        .optional(CONF_MODE, Validator::Valid)
        .optional_default(CONF_INVERTED, false, Validator::Boolean)
        .optional_default(CONF_ALLOW_OTHER_USES, false, Validator::Boolean)
}

fn validate_native(
    schema: &PinSchema,
    pin: ConfigMap,
    ctx: &mut ValidationContext,
) -> ValidationResult {
    let target = ctx.target().clone();
    let is_esp32 = target.platform == TargetPlatform::Esp32;
    let mut s = common_schema(native_pin_type(target.platform));
    if is_esp32 {
        s = s.optional_default(CONF_IGNORE_STRAPPING_WARNING, false, Validator::Boolean);
    }
    let validated = s.validate(&ConfigValue::Mapping(pin), ctx)?;
    let mut out = validated.as_mapping().cloned().unwrap_or_default();

    let raw_number = out.get(CONF_NUMBER).cloned().unwrap_or_default();
    let number = resolve_pin_number(&target, &raw_number).map_err(|e| e.prepend(&config_path![CONF_NUMBER]))?;
    let mode = validate_mode(out.get(CONF_MODE), schema.default_mode, ctx)?;
    validate_native_number(&target, number, mode, ctx)?;

    if is_esp32 {
        let layout = esp32_layout(target.variant);
        let ignore = out
            .get(CONF_IGNORE_STRAPPING_WARNING)
            .and_then(ConfigValue::as_bool)
            .unwrap_or(false);
        let strapping = layout.strapping.contains(&number);
        if strapping && !ignore {
            ctx.warn(format!(
                "GPIO{number} is a strapping PIN and should only be used for I/O with care.\n\
                 Attaching external pullup/down resistors to strapping pins can cause unexpected failures."
            ));
        }
        if !strapping && ignore {
            return Err(Invalid::at(
                format!("GPIO{number} is not a strapping pin"),
                config_path![CONF_IGNORE_STRAPPING_WARNING],
            )
            .into());
        }
    }

    let allow = out
        .get(CONF_ALLOW_OTHER_USES)
        .and_then(ConfigValue::as_bool)
        .unwrap_or(false);
    ctx.record_pin_use(target.platform.as_str().to_string(), number, allow);
    out.insert(CONF_NUMBER, ConfigValue::Int(number));
    out.insert(CONF_MODE, mode.to_value());
    Ok(ConfigValue::Mapping(out))
}

fn validate_expander_mode(provider: &PinProvider, mode: PinMode) -> std::result::Result<(), Invalid> {
    let key = provider.key();
    match provider {
        PinProvider::Mcp23xxx { .. } => {
            if mode.pulldown {
                return Err(mode_error(format!("Pull-down is not supported by {key}"), "pulldown"));
            }
            if mode.open_drain {
                return Err(mode_error(format!("Open-drain is not supported by {key}"), "open_drain"));
            }
            if mode.input == mode.output {
                return Err(Invalid::at("Mode must be either input or output", config_path![CONF_MODE]));
            }
            if mode.output && mode.pullup {
                return Err(mode_error("Pull-up only available with input".into(), "pullup"));
            }
        }
        PinProvider::Pcf8574 { .. } => {
            if mode.input == mode.output {
                return Err(Invalid::at("Mode must be either input or output", config_path![CONF_MODE]));
            }
            if mode.pullup || mode.pulldown || mode.open_drain {
                return Err(Invalid::at(
                    format!("{key} pins do not support pull resistors or open-drain"),
                    config_path![CONF_MODE],
                ));
            }
        }
        PinProvider::Sn74hc595 => {
            if mode.input || mode.pullup || mode.pulldown {
                return Err(Invalid::at(format!("{key} pins are output only"), config_path![CONF_MODE]));
            }
        }
        PinProvider::External(_) => {}
    }
    Ok(())
}

fn validate_provided(
    schema: &PinSchema,
    provider: &PinProvider,
    pin: ConfigMap,
    ctx: &mut ValidationContext,
) -> ValidationResult {
    let key = provider.key().to_string();
    let mut s = common_schema(provider.pin_type()).required(CONF_NUMBER, Validator::Int);
    s = match (provider, provider.hub_type()) {
        (PinProvider::External(p), _) => s.extend(p.schema.clone()),
        (_, Some(hub)) => s.required(&key, Validator::UseId(hub)),
        (_, None) => s,
    };
    let validated = s.validate(&ConfigValue::Mapping(pin), ctx)?;
    let mut out = validated.as_mapping().cloned().unwrap_or_default();

    let number = out.get(CONF_NUMBER).and_then(ConfigValue::as_i64).unwrap_or_default();
    match provider {
        PinProvider::Mcp23xxx { pin_count, .. } | PinProvider::Pcf8574 { pin_count, .. } => {
            check_range(number, pin_count - 1)?
        }
        PinProvider::Sn74hc595 => check_range(number, 2047)?,
        PinProvider::External(_) => {}
    }
    let mode = validate_mode(out.get(CONF_MODE), schema.default_mode, ctx)?;
    validate_expander_mode(provider, mode)?;

    let hub = match out.get(&key) {
        Some(ConfigValue::Id(id)) => id.name().unwrap_or(&key).to_string(),
        Some(other) => other.to_string(),
        None => key.clone(),
    };
    let allow = out
        .get(CONF_ALLOW_OTHER_USES)
        .and_then(ConfigValue::as_bool)
        .unwrap_or(false);
    ctx.record_pin_use(format!("{key}:{hub}"), number, allow);
    out.insert(CONF_MODE, mode.to_value());
    Ok(ConfigValue::Mapping(out))
}

/// Validate one pin value under `schema`.
pub fn validate_pin(schema: &PinSchema, value: &ConfigValue, ctx: &mut ValidationContext) -> ValidationResult {
    let mut pin = match value {
        ConfigValue::Int(_) | ConfigValue::String(_) => {
            [(CONF_NUMBER, value.clone())].into_iter().collect::<ConfigMap>()
        }
        ConfigValue::Mapping(m) => m.clone(),
        other => {
            return Err(Invalid::new(format!(
                "Expected a pin number or a pin mapping, got {}",
                other.kind()
            ))
            .into())
        }
    };
    if let Some(v) = pin.remove(CONF_OTHER_USES) {
        if !pin.contains_key(CONF_ALLOW_OTHER_USES) {
            pin.insert(CONF_ALLOW_OTHER_USES, v);
        }
    }

    let registry = ctx.pin_registry();
    match registry.select(&pin) {
        None => validate_native(schema, pin, ctx),
        Some(provider) if schema.internal => Err(Invalid::at(
            "This pin does not support expanders, it must be an internal GPIO pin",
            config_path![provider.key()],
        )
        .into()),
        Some(provider) => validate_provided(schema, provider, pin, ctx),
    }
}

/// Pins claimed by more than one use without `allow_other_uses`.
pub fn check_pin_uses(uses: &[PinUse]) -> Vec<Invalid> {
    let mut errors = Vec::new();
    for (i, u) in uses.iter().enumerate() {
        let shared = uses
            .iter()
            .enumerate()
            .any(|(j, o)| i != j && o.owner == u.owner && o.number == u.number);
        if shared && !u.allow_other_uses {
            errors.push(Invalid::at(
                format!("Pin {} is used in multiple places", u.number),
                u.path.clone(),
            ));
        }
    }
    errors
}
