// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! MCP23017 16-pin I/O expander.
//!
//! Pins on the expander are written as `{mcp23017: <hub id>, number: N}` and
//! validated by the pin registry; this component only declares the hub.

use fw_codegen::{esphome_ns, known, CppType, Expression};
use fw_config_core::{cv, ConfigValue, Key, Schema, CONF_ID};

use super::i2c::{i2c_bus, CONF_I2C_ID};
use crate::catalogue::Catalogue;
use crate::descriptor::{priority, Component};
use crate::emit::EmitContext;
use crate::error::Result;

pub const CONF_ADDRESS: &str = "address";
pub const CONF_OPEN_DRAIN_INTERRUPT: &str = "open_drain_interrupt";

fn i2c_device() -> CppType {
    cv::component_ns("i2c").class_("I2CDevice", &[])
}

/// Must keep the class name the pin registry expects for `mcp23017:` pins.
pub fn mcp23017_type() -> CppType {
    let base = esphome_ns()
        .namespace("mcp23xxx_base")
        .class_("MCP23XXXBase", &[&known::component()]);
    cv::component_ns("mcp23017").class_("MCP23017", &[&base, &i2c_device()])
}

pub fn config_schema() -> Schema {
    cv::component_schema()
        .generate_id(mcp23017_type())
        .key(Key::generate_id_named(CONF_I2C_ID), cv::use_id(i2c_bus()))
        .optional_default(CONF_ADDRESS, ConfigValue::HexInt(0x20), cv::i2c_address())
        .optional_default(CONF_OPEN_DRAIN_INTERRUPT, false, cv::boolean())
}

fn to_code(config: &ConfigValue, ctx: &mut EmitContext) -> Result<()> {
    let id = config.get(CONF_ID).cloned().unwrap_or_default();
    let var = ctx.new_pvariable(&id, Vec::new())?;
    ctx.register_component(&var, config)?;

    let bus = config.get(CONF_I2C_ID).cloned().unwrap_or_default();
    let bus = ctx.get_variable(&bus)?;
    ctx.add(var.method("set_i2c_bus", vec![bus]));
    let address = config.get(CONF_ADDRESS).and_then(ConfigValue::as_i64).unwrap_or(0x20);
    ctx.add(var.method("set_i2c_address", vec![Expression::hex(address as u64)]));
    let open_drain = config
        .get(CONF_OPEN_DRAIN_INTERRUPT)
        .and_then(ConfigValue::as_bool)
        .unwrap_or(false);
    ctx.add(var.method("set_open_drain_ints", vec![Expression::bool(open_drain)]));
    Ok(())
}

pub fn register(catalogue: &mut Catalogue) -> fw_config_core::Result<()> {
    catalogue.register(
        Component::new("mcp23017")
            .with_codeowners(&["@jesserockz"])
            .with_dependencies(&["i2c"])
            .with_multi_conf()
            .with_schema(config_schema())
            .with_to_code(priority::IO, to_code),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fw_config_core::PinRegistry;

    #[test]
    fn hub_matches_the_pin_provider() {
        let registry = PinRegistry::default();
        let provider = registry.provider("mcp23017").unwrap();
        let hub = provider.hub_type().unwrap();
        assert!(mcp23017_type().inherits_from(&hub));
    }
}
