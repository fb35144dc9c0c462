// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! I2C buses.

use fw_codegen::{known, CppType, Define, Expression, Library, Namespace};
use fw_config_core::{cv, ConfigValue, Framework, Schema, TargetPlatform, CONF_ID, CONF_NUMBER};

use crate::catalogue::Catalogue;
use crate::descriptor::{priority, Component};
use crate::emit::EmitContext;
use crate::error::Result;

pub const CONF_SDA: &str = "sda";
pub const CONF_SCL: &str = "scl";
pub const CONF_SDA_PULLUP_ENABLED: &str = "sda_pullup_enabled";
pub const CONF_SCL_PULLUP_ENABLED: &str = "scl_pullup_enabled";
pub const CONF_FREQUENCY: &str = "frequency";
pub const CONF_SCAN: &str = "scan";
pub const CONF_I2C_ID: &str = "i2c_id";

fn i2c_ns() -> Namespace {
    cv::component_ns("i2c")
}

/// The type devices reference a bus by.
pub fn i2c_bus() -> CppType {
    i2c_ns().class_("I2CBus", &[])
}

fn bus_implementation(framework: Option<Framework>) -> CppType {
    let class = match framework {
        Some(Framework::EspIdf) => "IDFI2CBus",
        _ => "ArduinoI2CBus",
    };
    i2c_ns().class_(class, &[&i2c_bus(), &known::component()])
}

pub fn config_schema() -> Schema {
    cv::component_schema()
        .generate_id(bus_implementation(None))
        .optional_default(CONF_SDA, "SDA", cv::internal_gpio_output_pin_schema())
        .optional_default(CONF_SDA_PULLUP_ENABLED, true, cv::boolean())
        .optional_default(CONF_SCL, "SCL", cv::internal_gpio_output_pin_schema())
        .optional_default(CONF_SCL_PULLUP_ENABLED, true, cv::boolean())
        .optional_default(CONF_FREQUENCY, "50kHz", cv::frequency())
        .optional_default(CONF_SCAN, true, cv::boolean())
}

fn pin_number(config: &ConfigValue, key: &str) -> i64 {
    config
        .get(key)
        .and_then(|pin| pin.get(CONF_NUMBER))
        .and_then(ConfigValue::as_i64)
        .unwrap_or_default()
}

fn to_code(config: &ConfigValue, ctx: &mut EmitContext) -> Result<()> {
    let id = config.get(CONF_ID).cloned().unwrap_or_default();
    let ty = bus_implementation(ctx.target().framework);
    let var = ctx.new_pvariable_as(&id, &ty, Vec::new())?;
    ctx.register_component(&var, config)?;

    ctx.add(var.method("set_sda_pin", vec![Expression::int(pin_number(config, CONF_SDA))]));
    ctx.add(var.method("set_scl_pin", vec![Expression::int(pin_number(config, CONF_SCL))]));
    for (key, setter) in [
        (CONF_SDA_PULLUP_ENABLED, "set_sda_pullup_enabled"),
        (CONF_SCL_PULLUP_ENABLED, "set_scl_pullup_enabled"),
        (CONF_SCAN, "set_scan"),
    ] {
        if let Some(value) = config.get(key) {
            let value = ctx.expression(value)?;
            ctx.add(var.method(setter, vec![value]));
        }
    }
    let frequency = config.get(CONF_FREQUENCY).and_then(ConfigValue::as_f64).unwrap_or(50_000.0);
    ctx.add(var.method("set_frequency", vec![Expression::int(frequency as i64)]));

    ctx.add_define(Define::new("USE_I2C"))?;
    if ctx.target().framework != Some(Framework::EspIdf) {
        ctx.add_library(Library::new("Wire", None))?;
    }
    Ok(())
}

pub fn register(catalogue: &mut Catalogue) -> fw_config_core::Result<()> {
    catalogue.register(
        Component::new("i2c")
            .with_codeowners(&["@esphome/core"])
            .with_multi_conf()
            .with_supported_platforms(&[
                TargetPlatform::Esp32,
                TargetPlatform::Esp8266,
                TargetPlatform::Rp2040,
                TargetPlatform::Libretiny,
            ])
            .with_schema(config_schema())
            .with_to_code(priority::BUS, to_code),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fw_config_core::{load_yaml_str, Target, ValidationContext, Validator};

    fn validate(platform: TargetPlatform, board: &str, src: &str) -> ConfigValue {
        let mut ctx = ValidationContext::new(Target::new(platform, board));
        Validator::from(config_schema())
            .validate(&load_yaml_str(src).unwrap(), &mut ctx)
            .unwrap()
    }

    #[test]
    fn default_pins_follow_the_board() {
        let esp32 = validate(TargetPlatform::Esp32, "esp32dev", "{}");
        assert_eq!(pin_number(&esp32, CONF_SDA), 21);
        assert_eq!(pin_number(&esp32, CONF_SCL), 22);

        let esp8266 = validate(TargetPlatform::Esp8266, "nodemcuv2", "{}");
        assert_eq!(pin_number(&esp8266, CONF_SDA), 4);
        assert_eq!(pin_number(&esp8266, CONF_SCL), 5);
    }

    #[test]
    fn frequency_is_normalised_to_hertz() {
        let out = validate(TargetPlatform::Esp32, "esp32dev", "frequency: 400kHz");
        assert_eq!(out.get(CONF_FREQUENCY).and_then(ConfigValue::as_f64), Some(400_000.0));
    }

    #[test]
    fn devices_can_reference_either_implementation() {
        assert!(bus_implementation(Some(Framework::Arduino)).inherits_from(&i2c_bus()));
        assert!(bus_implementation(Some(Framework::EspIdf)).inherits_from(&i2c_bus()));
    }
}
