// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Device-side logger.

use fw_codegen::{known, CppType, Define, Expression};
use fw_config_core::{
    config_path, cv, ConfigMap, ConfigValue, CustomValidator, Invalid, MultipleInvalid, Schema, TargetPlatform,
    ValidationContext, ValidationResult, CONF_ID,
};

use crate::catalogue::Catalogue;
use crate::descriptor::{priority, Component};
use crate::emit::EmitContext;
use crate::error::Result;

pub const CONF_BAUD_RATE: &str = "baud_rate";
pub const CONF_LEVEL: &str = "level";
pub const CONF_LOGS: &str = "logs";
pub const CONF_HARDWARE_UART: &str = "hardware_uart";
pub const CONF_TX_BUFFER_SIZE: &str = "tx_buffer_size";

/// Levels in order of increasing verbosity.
pub const LOG_LEVELS: [(&str, &str); 8] = [
    ("NONE", "ESPHOME_LOG_LEVEL_NONE"),
    ("ERROR", "ESPHOME_LOG_LEVEL_ERROR"),
    ("WARN", "ESPHOME_LOG_LEVEL_WARN"),
    ("INFO", "ESPHOME_LOG_LEVEL_INFO"),
    ("CONFIG", "ESPHOME_LOG_LEVEL_CONFIG"),
    ("DEBUG", "ESPHOME_LOG_LEVEL_DEBUG"),
    ("VERBOSE", "ESPHOME_LOG_LEVEL_VERBOSE"),
    ("VERY_VERBOSE", "ESPHOME_LOG_LEVEL_VERY_VERBOSE"),
];

fn severity(level: &str) -> usize {
    LOG_LEVELS.iter().position(|(k, _)| *k == level).unwrap_or(0)
}

fn logger_type() -> CppType {
    cv::component_ns("logger").class_("Logger", &[&known::component()])
}

fn level_key(value: &ConfigValue) -> &str {
    match value {
        ConfigValue::Enum { key, .. } => key,
        _ => "",
    }
}

/// Per-tag levels may not be more verbose than the global level.
fn tag_levels_within_global(value: &ConfigValue, _ctx: &mut ValidationContext) -> ValidationResult {
    let global = value.get(CONF_LEVEL).map(level_key).unwrap_or("DEBUG");
    let Some(logs) = value.get(CONF_LOGS).and_then(ConfigValue::as_mapping) else {
        return Ok(value.clone());
    };
    let mut errors = Vec::new();
    for (tag, level) in logs.iter() {
        let level = level_key(level);
        if severity(level) > severity(global) {
            errors.push(Invalid::at(
                format!("The configured log level for {tag} ({level}) must be no more severe than the global log level {global}."),
                config_path![CONF_LOGS, tag],
            ));
        }
    }
    if errors.is_empty() {
        Ok(value.clone())
    } else {
        Err(MultipleInvalid::new(errors))
    }
}

fn tag_levels(value: &ConfigValue, ctx: &mut ValidationContext) -> ValidationResult {
    let map = value
        .as_mapping()
        .ok_or_else(|| Invalid::new(format!("expected a dictionary, got {}", value.kind())))?;
    let level = cv::enum_(LOG_LEVELS);
    let mut out = ConfigMap::new();
    for (tag, raw) in map.iter() {
        let v = ctx
            .descend(tag, |ctx| level.validate(raw, ctx))
            .map_err(|e| e.prepend(&config_path![tag]))?;
        out.insert(tag, v);
    }
    Ok(out.into())
}

pub fn config_schema() -> Schema {
    cv::component_schema()
        .generate_id(logger_type())
        .optional_default(CONF_BAUD_RATE, 115200i64, cv::positive_int())
        .optional_default(CONF_TX_BUFFER_SIZE, 512i64, cv::int_range(Some(0), Some(65535)))
        .optional_default(CONF_LEVEL, "DEBUG", cv::enum_(LOG_LEVELS))
        .optional(
            CONF_HARDWARE_UART,
            cv::one_of(["UART0", "UART0_SWAP", "UART1", "UART2", "USB_CDC", "USB_SERIAL_JTAG"]),
        )
        .optional(CONF_LOGS, CustomValidator::new("log_tags", tag_levels))
        .post(CustomValidator::new("log_tag_levels", tag_levels_within_global))
}

fn to_code(config: &ConfigValue, ctx: &mut EmitContext) -> Result<()> {
    let level = config.get(CONF_LEVEL).map(level_key).unwrap_or("DEBUG");
    let level_value = LOG_LEVELS
        .iter()
        .find(|(k, _)| *k == level)
        .map(|(_, v)| *v)
        .unwrap_or("ESPHOME_LOG_LEVEL_DEBUG");
    ctx.add_build_flag(format!("-DESPHOME_LOG_LEVEL={level_value}"));
    ctx.add_define(Define::new("USE_LOGGER"))?;

    let baud_rate = config.get(CONF_BAUD_RATE).and_then(ConfigValue::as_i64).unwrap_or(115200);
    let tx_buffer_size = config.get(CONF_TX_BUFFER_SIZE).and_then(ConfigValue::as_i64).unwrap_or(512);
    let id = config.get(CONF_ID).cloned().unwrap_or_default();
    let log = ctx.new_pvariable(&id, vec![Expression::int(baud_rate), Expression::int(tx_buffer_size)])?;
    if let Some(uart) = config.get(CONF_HARDWARE_UART).and_then(ConfigValue::as_str) {
        let selection = Expression::raw(format!("esphome::logger::UART_SELECTION_{uart}"));
        ctx.add(log.method("set_uart_selection", vec![selection]));
    }
    for (tag, tag_level) in config.get(CONF_LOGS).and_then(ConfigValue::as_mapping).into_iter().flat_map(ConfigMap::iter) {
        let value = ctx.expression(tag_level)?;
        ctx.add(log.method("set_log_level", vec![Expression::string(tag), value]));
    }
    ctx.add(log.method("pre_setup", Vec::new()));
    ctx.register_component(&log, config)?;
    Ok(())
}

pub fn register(catalogue: &mut Catalogue) -> fw_config_core::Result<()> {
    catalogue.register(
        Component::new("logger")
            .with_codeowners(&["@esphome/core"])
            .with_supported_platforms(&[
                TargetPlatform::Esp32,
                TargetPlatform::Esp8266,
                TargetPlatform::Rp2040,
                TargetPlatform::Libretiny,
                TargetPlatform::Host,
            ])
            .with_schema(config_schema())
            .with_to_code(priority::DIAGNOSTICS, to_code),
    )
}
