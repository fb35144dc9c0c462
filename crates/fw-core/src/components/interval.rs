// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `interval:` runs automations periodically.

use fw_codegen::{known, CppType, Expression};
use fw_config_core::{cv, ConfigValue, Key, Schema};

use crate::automation::{build_automation, validate_automation, TriggerArgs, CONF_TRIGGER_ID};
use crate::catalogue::Catalogue;
use crate::descriptor::{priority, Component};
use crate::emit::EmitContext;
use crate::error::Result;

pub const CONF_INTERVAL: &str = "interval";
pub const CONF_STARTUP_DELAY: &str = "startup_delay";

fn interval_trigger() -> CppType {
    cv::component_ns("interval").class_("IntervalTrigger", &[&known::trigger(), &known::polling_component()])
}

pub fn config_schema() -> fw_config_core::Validator {
    validate_automation(
        cv::component_schema()
            .key(Key::generate_id_named(CONF_TRIGGER_ID), cv::declare_id(interval_trigger()))
            .required(CONF_INTERVAL, cv::positive_time_period_milliseconds())
            .optional_default(CONF_STARTUP_DELAY, "0s", cv::positive_time_period_milliseconds()),
    )
}

fn millis(config: &ConfigValue, key: &str) -> i64 {
    config
        .get(key)
        .and_then(ConfigValue::as_time_period)
        .map(|t| t.total_milliseconds())
        .unwrap_or_default()
}

fn to_code(config: &ConfigValue, ctx: &mut EmitContext) -> Result<()> {
    for automation in config.as_sequence().unwrap_or_default() {
        let id = automation.get(CONF_TRIGGER_ID).cloned().unwrap_or_default();
        let trigger = ctx.new_pvariable(&id, Vec::new())?;
        ctx.register_component(&trigger, automation)?;
        ctx.add(trigger.method("set_update_interval", vec![Expression::int(millis(automation, CONF_INTERVAL))]));
        let delay = millis(automation, CONF_STARTUP_DELAY);
        if delay > 0 {
            ctx.add(trigger.method("set_startup_delay", vec![Expression::int(delay)]));
        }
        build_automation(&trigger, &TriggerArgs::none(), automation, ctx)?;
    }
    Ok(())
}

pub fn register(catalogue: &mut Catalogue) -> fw_config_core::Result<()> {
    catalogue.register(
        Component::new("interval")
            .with_codeowners(&["@esphome/core"])
            .with_schema(config_schema())
            .with_to_code(priority::AUTOMATION, to_code),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fw_config_core::{load_yaml_str, Target, TargetPlatform, ValidationContext};
    use std::sync::Arc;

    fn validate(src: &str) -> fw_config_core::ValidationResult {
        let catalogue = Catalogue::builtin().unwrap();
        let mut ctx = ValidationContext::new(Target::new(TargetPlatform::Esp32, "esp32dev"));
        ctx.set_registries(Arc::new(catalogue.registry_set()));
        config_schema().validate(&load_yaml_str(src).unwrap(), &mut ctx)
    }

    #[test]
    fn every_entry_becomes_an_automation() {
        let out = validate(
            r#"
- interval: 1min
  then:
    - lambda: 'ESP_LOGD("main", "tick");'
- interval: 500ms
  startup_delay: 5s
  then:
    - delay: 1s
"#,
        )
        .unwrap();
        let items = out.as_sequence().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(millis(&items[0], CONF_INTERVAL), 60_000);
        assert_eq!(millis(&items[1], CONF_STARTUP_DELAY), 5_000);
        assert!(items[1].get(CONF_TRIGGER_ID).is_some());
    }

    #[test]
    fn interval_needs_a_unit() {
        let err = validate("- interval: 5\n  then:\n    - delay: 1s\n").unwrap_err();
        assert!(err.first().unwrap().message.contains("Did you mean '5s'?"));
    }
}
