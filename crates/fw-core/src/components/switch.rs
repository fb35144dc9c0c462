// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The `switch:` domain and its `gpio` platform.

use fw_codegen::{known, CppType, Define, Expression, Namespace, Statement};
use fw_config_core::{cv, ConfigValue, Key, Schema, CONF_ID};

use crate::automation::{build_triggers, validate_automation, TriggerArgs, CONF_TRIGGER_ID};
use crate::catalogue::Catalogue;
use crate::descriptor::{priority, Component};
use crate::emit::EmitContext;
use crate::error::Result;

pub const CONF_PIN: &str = "pin";
pub const CONF_RESTORE_MODE: &str = "restore_mode";
pub const CONF_INVERTED: &str = "inverted";
pub const CONF_ON_TURN_ON: &str = "on_turn_on";
pub const CONF_ON_TURN_OFF: &str = "on_turn_off";

const RESTORE_MODES: [(&str, &str); 6] = [
    ("RESTORE_DEFAULT_OFF", "esphome::switch_::SWITCH_RESTORE_DEFAULT_OFF"),
    ("RESTORE_DEFAULT_ON", "esphome::switch_::SWITCH_RESTORE_DEFAULT_ON"),
    ("ALWAYS_OFF", "esphome::switch_::SWITCH_ALWAYS_OFF"),
    ("ALWAYS_ON", "esphome::switch_::SWITCH_ALWAYS_ON"),
    ("RESTORE_INVERTED_DEFAULT_OFF", "esphome::switch_::SWITCH_RESTORE_INVERTED_DEFAULT_OFF"),
    ("RESTORE_INVERTED_DEFAULT_ON", "esphome::switch_::SWITCH_RESTORE_INVERTED_DEFAULT_ON"),
];

fn switch_ns() -> Namespace {
    cv::component_ns("switch_")
}

pub fn switch_type() -> CppType {
    switch_ns().class_("Switch", &[])
}

fn gpio_switch_type() -> CppType {
    cv::component_ns("gpio").class_("GPIOSwitch", &[&switch_type(), &known::component()])
}

fn trigger_type(class: &str) -> CppType {
    switch_ns().class_(class, &[&known::trigger()])
}

/// Keys every switch platform accepts, on top of its own.
pub fn switch_schema(class: CppType) -> Schema {
    cv::entity_base_schema()
        .generate_id(class)
        .optional_default(CONF_RESTORE_MODE, "ALWAYS_OFF", cv::enum_(RESTORE_MODES))
        .optional(CONF_INVERTED, cv::boolean())
        .optional(
            CONF_ON_TURN_ON,
            validate_automation(
                Schema::new().key(
                    Key::generate_id_named(CONF_TRIGGER_ID),
                    cv::declare_id(trigger_type("SwitchTurnOnTrigger")),
                ),
            ),
        )
        .optional(
            CONF_ON_TURN_OFF,
            validate_automation(
                Schema::new().key(
                    Key::generate_id_named(CONF_TRIGGER_ID),
                    cv::declare_id(trigger_type("SwitchTurnOffTrigger")),
                ),
            ),
        )
}

/// Entity setup, application registration and triggers shared by all switches.
pub fn register_switch(var: &Expression, config: &ConfigValue, ctx: &mut EmitContext) -> Result<()> {
    ctx.setup_entity(var, config)?;
    ctx.add(known::app().method("register_switch", vec![var.clone()]));
    if let Some(inverted) = config.get(CONF_INVERTED).and_then(ConfigValue::as_bool) {
        ctx.add(var.method("set_inverted", vec![Expression::bool(inverted)]));
    }
    if let Some(mode) = config.get(CONF_RESTORE_MODE) {
        let mode = ctx.expression(mode)?;
        ctx.add(var.method("set_restore_mode", vec![mode]));
    }
    for key in [CONF_ON_TURN_ON, CONF_ON_TURN_OFF] {
        if let Some(automations) = config.get(key) {
            build_triggers(automations, vec![var.clone()], &TriggerArgs::none(), ctx)?;
        }
    }
    Ok(())
}

fn domain_to_code(_config: &ConfigValue, ctx: &mut EmitContext) -> Result<()> {
    ctx.add_define(Define::new("USE_SWITCH"))?;
    ctx.add_global(Statement::Raw("using namespace switch_;".to_string()));
    Ok(())
}

fn gpio_to_code(config: &ConfigValue, ctx: &mut EmitContext) -> Result<()> {
    let id = config.get(CONF_ID).cloned().unwrap_or_default();
    let var = ctx.new_pvariable(&id, Vec::new())?;
    ctx.register_component(&var, config)?;
    register_switch(&var, config, ctx)?;
    let pin = config.get(CONF_PIN).cloned().unwrap_or_default();
    let pin = ctx.gpio_pin_expression(&pin)?;
    ctx.add(var.method("set_pin", vec![pin]));
    Ok(())
}

fn register_actions(catalogue: &mut Catalogue) -> fw_config_core::Result<()> {
    let target_schema = || cv::maybe_simple_value(Schema::new().required("id", cv::use_id(switch_type())), "id");
    for (key, class) in [
        ("switch.turn_on", "TurnOnAction"),
        ("switch.turn_off", "TurnOffAction"),
        ("switch.toggle", "ToggleAction"),
    ] {
        let ty = switch_ns().class_(class, &[&known::action()]);
        catalogue
            .automations_mut()
            .register_action(key, ty.clone(), target_schema(), move |config, type_id, args, ctx| {
                let target = ctx.get_variable(config.get("id").unwrap_or(&ConfigValue::Null))?;
                ctx.new_pvariable_as(type_id, &ty.template(args.template_args()), vec![target])
            })?;
    }
    for (key, class, state) in [("switch.is_on", "SwitchCondition", true), ("switch.is_off", "SwitchCondition", false)] {
        let ty = switch_ns().class_(class, &[&known::condition()]);
        catalogue
            .automations_mut()
            .register_condition(key, ty.clone(), target_schema(), move |config, type_id, args, ctx| {
                let target = ctx.get_variable(config.get("id").unwrap_or(&ConfigValue::Null))?;
                ctx.new_pvariable_as(
                    type_id,
                    &ty.template(args.template_args()),
                    vec![target, Expression::bool(state)],
                )
            })?;
    }
    Ok(())
}

pub fn register(catalogue: &mut Catalogue) -> fw_config_core::Result<()> {
    register_actions(catalogue)?;
    catalogue.automations_mut().register_trigger(CONF_ON_TURN_ON, trigger_type("SwitchTurnOnTrigger"))?;
    catalogue.automations_mut().register_trigger(CONF_ON_TURN_OFF, trigger_type("SwitchTurnOffTrigger"))?;
    catalogue.register(
        Component::new("switch")
            .with_codeowners(&["@esphome/core"])
            .as_platform_component()
            .with_to_code(priority::CORE, domain_to_code),
    )?;
    catalogue.register(
        Component::new("switch.gpio")
            .with_schema(
                switch_schema(gpio_switch_type())
                    .extend(cv::component_schema())
                    .required(CONF_PIN, cv::gpio_output_pin_schema()),
            )
            .with_to_code(priority::COMPONENT, gpio_to_code),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fw_config_core::{load_yaml_str, Target, TargetPlatform, ValidationContext};

    fn validate(src: &str) -> fw_config_core::ValidationResult {
        let mut catalogue = Catalogue::new();
        register(&mut catalogue).unwrap();
        let schema = catalogue.platform("switch", "gpio").unwrap().config_schema().unwrap().clone();
        let mut ctx = ValidationContext::new(Target::new(TargetPlatform::Esp32, "esp32dev"));
        ctx.set_registries(std::sync::Arc::new(catalogue.registry_set()));
        schema.validate(&load_yaml_str(src).unwrap(), &mut ctx)
    }

    #[test]
    fn switch_needs_a_name_or_id() {
        let err = validate("pin: GPIO5").unwrap_err();
        assert_eq!(err.first().unwrap().message, "At least one of 'id:' or 'name:' is required!");
        assert!(validate("pin: GPIO5\nname: Relay").is_ok());
    }

    #[test]
    fn restore_mode_defaults_to_always_off() {
        let out = validate("pin: GPIO5\nid: relay").unwrap();
        match out.get(CONF_RESTORE_MODE) {
            Some(ConfigValue::Enum { key, .. }) => assert_eq!(key, "ALWAYS_OFF"),
            other => panic!("unexpected restore mode {other:?}"),
        }
    }
}
