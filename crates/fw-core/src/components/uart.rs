// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! UART buses.

use fw_codegen::{known, CppType, Define, Expression, Namespace};
use fw_config_core::{cv, ConfigValue, Schema, TargetPlatform, CONF_ID};

use crate::catalogue::Catalogue;
use crate::descriptor::{priority, Component};
use crate::emit::EmitContext;
use crate::error::Result;

pub const CONF_BAUD_RATE: &str = "baud_rate";
pub const CONF_TX_PIN: &str = "tx_pin";
pub const CONF_RX_PIN: &str = "rx_pin";
pub const CONF_RX_BUFFER_SIZE: &str = "rx_buffer_size";
pub const CONF_STOP_BITS: &str = "stop_bits";
pub const CONF_DATA_BITS: &str = "data_bits";
pub const CONF_PARITY: &str = "parity";

fn uart_ns() -> Namespace {
    cv::component_ns("uart")
}

/// The type other components reference a bus by.
pub fn uart_component() -> CppType {
    uart_ns().class_("UARTComponent", &[&known::component()])
}

fn platform_uart_component(platform: TargetPlatform) -> CppType {
    let class = match platform {
        TargetPlatform::Esp32 => "ESP32ArduinoUARTComponent",
        TargetPlatform::Esp8266 => "ESP8266UartComponent",
        TargetPlatform::Rp2040 => "RP2040UartComponent",
        TargetPlatform::Libretiny => "LibreTinyUARTComponent",
        TargetPlatform::Nrf52 | TargetPlatform::Host => "HostUartComponent",
    };
    uart_ns().class_(class, &[&uart_component()])
}

pub fn config_schema() -> Schema {
    cv::component_schema()
        .generate_id(uart_component())
        .required(CONF_BAUD_RATE, cv::int_range(Some(1), None))
        .optional(CONF_TX_PIN, cv::internal_gpio_output_pin_schema())
        .optional(CONF_RX_PIN, cv::internal_gpio_input_pin_schema())
        .optional_default(CONF_RX_BUFFER_SIZE, 256i64, cv::positive_int())
        .optional_default(CONF_STOP_BITS, 1i64, cv::one_of_int([1, 2]))
        .optional_default(CONF_DATA_BITS, 8i64, cv::int_range(Some(5), Some(8)))
        .optional_default(
            CONF_PARITY,
            "NONE",
            cv::enum_([
                ("NONE", "esphome::uart::UART_CONFIG_PARITY_NONE"),
                ("EVEN", "esphome::uart::UART_CONFIG_PARITY_EVEN"),
                ("ODD", "esphome::uart::UART_CONFIG_PARITY_ODD"),
            ]),
        )
        .post(cv::has_at_least_one_key(&[CONF_TX_PIN, CONF_RX_PIN]))
}

fn to_code(config: &ConfigValue, ctx: &mut EmitContext) -> Result<()> {
    let id = config.get(CONF_ID).cloned().unwrap_or_default();
    let ty = platform_uart_component(ctx.target().platform);
    let var = ctx.new_pvariable_as(&id, &ty, Vec::new())?;
    ctx.register_component(&var, config)?;

    let baud_rate = config.get(CONF_BAUD_RATE).and_then(ConfigValue::as_i64).unwrap_or_default();
    ctx.add(var.method("set_baud_rate", vec![Expression::int(baud_rate)]));
    for (key, setter) in [(CONF_TX_PIN, "set_tx_pin"), (CONF_RX_PIN, "set_rx_pin")] {
        if let Some(pin) = config.get(key) {
            let pin = ctx.gpio_pin_expression(pin)?;
            ctx.add(var.method(setter, vec![pin]));
        }
    }
    for (key, setter) in [
        (CONF_RX_BUFFER_SIZE, "set_rx_buffer_size"),
        (CONF_STOP_BITS, "set_stop_bits"),
        (CONF_DATA_BITS, "set_data_bits"),
        (CONF_PARITY, "set_parity"),
    ] {
        if let Some(value) = config.get(key) {
            let value = ctx.expression(value)?;
            ctx.add(var.method(setter, vec![value]));
        }
    }
    ctx.add_define(Define::new("USE_UART"))?;
    Ok(())
}

pub fn register(catalogue: &mut Catalogue) -> fw_config_core::Result<()> {
    catalogue.register(
        Component::new("uart")
            .with_codeowners(&["@esphome/core"])
            .with_multi_conf()
            .with_schema(config_schema())
            .with_to_code(priority::BUS, to_code),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fw_config_core::{load_yaml_str, Target, ValidationContext, Validator};

    #[test]
    fn needs_at_least_one_pin() {
        let mut ctx = ValidationContext::new(Target::new(TargetPlatform::Esp32, "esp32dev"));
        let schema = Validator::from(config_schema());
        assert!(schema.validate(&load_yaml_str("baud_rate: 9600").unwrap(), &mut ctx).is_err());
        let ok = schema
            .validate(&load_yaml_str("baud_rate: 9600\ntx_pin: GPIO17").unwrap(), &mut ctx)
            .unwrap();
        assert_eq!(ok.get(CONF_DATA_BITS), Some(&ConfigValue::Int(8)));
        assert_eq!(ctx.pin_uses().len(), 1);
    }

    #[test]
    fn implementation_type_is_a_uart_component() {
        for platform in [TargetPlatform::Esp32, TargetPlatform::Esp8266, TargetPlatform::Host] {
            assert!(platform_uart_component(platform).inherits_from(&known::component()));
        }
    }
}
