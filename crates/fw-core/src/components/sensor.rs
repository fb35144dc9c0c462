// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The `sensor:` domain, its filter registry and the `template` platform.
//!
//! Filters are a plain registry: each item of `filters:` is a single-key
//! mapping selecting an entry, and the entry's builder lowers it to a filter
//! object handed to the sensor in `set_filters`.

use std::fmt;
use std::sync::Arc;

use fw_codegen::{esphome_ns, known, CppType, Define, Expression, Namespace};
use fw_config_core::{cv, ConfigValue, Key, Registry, RegistryEntry, Schema, CONF_ID, CONF_TYPE_ID};

use crate::automation::{build_triggers, validate_automation, TriggerArgs, CONF_TRIGGER_ID};
use crate::catalogue::Catalogue;
use crate::descriptor::{priority, Component};
use crate::emit::EmitContext;
use crate::error::{CoreError, Result};

pub const CONF_UNIT_OF_MEASUREMENT: &str = "unit_of_measurement";
pub const CONF_ACCURACY_DECIMALS: &str = "accuracy_decimals";
pub const CONF_DEVICE_CLASS: &str = "device_class";
pub const CONF_STATE_CLASS: &str = "state_class";
pub const CONF_FORCE_UPDATE: &str = "force_update";
pub const CONF_FILTERS: &str = "filters";
pub const CONF_ON_VALUE: &str = "on_value";
pub const CONF_ON_RAW_VALUE: &str = "on_raw_value";
pub const CONF_LAMBDA: &str = "lambda";

fn sensor_ns() -> Namespace {
    cv::component_ns("sensor")
}

pub fn sensor_type() -> CppType {
    sensor_ns().class_("Sensor", &[])
}

fn filter_type(class: &str) -> CppType {
    sensor_ns().class_(class, &[&sensor_ns().class_("Filter", &[])])
}

fn optional_float() -> CppType {
    esphome_ns().class_("optional", &[]).template([known::float_()])
}

fn value_args() -> TriggerArgs {
    TriggerArgs::new(&[(known::float_(), "x")])
}

/// Builds one filter: `(config, type_id, ctx)`.
pub type FilterBuilder = Arc<dyn Fn(&ConfigValue, &ConfigValue, &mut EmitContext) -> Result<Expression> + Send + Sync>;

/// The `filter` registry shared by every sensor platform.
#[derive(Clone)]
pub struct Filters(Arc<Registry<FilterBuilder>>);

impl fmt::Debug for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Filters").field(&self.0).finish()
    }
}

fn filter<F>(key: &str, class: &str, schema: impl Into<fw_config_core::Validator>, builder: F) -> RegistryEntry<FilterBuilder>
where
    F: Fn(&ConfigValue, &ConfigValue, &mut EmitContext) -> Result<Expression> + Send + Sync + 'static,
{
    RegistryEntry::new(key, schema)
        .with_type(filter_type(class))
        .with_builder(Arc::new(builder) as FilterBuilder)
}

impl Filters {
    pub fn builtin() -> fw_config_core::Result<Self> {
        let mut registry = Registry::new("filter");
        registry.register_entry(filter("multiply", "MultiplyFilter", cv::float(), |config, type_id, ctx| {
            let factor = ctx.expression(config)?;
            ctx.new_pvariable(type_id, vec![factor])
        }))?;
        registry.register_entry(filter(
            "offset",
            "OffsetFilter",
            cv::templatable(cv::float()),
            |config, type_id, ctx| {
                let offset = ctx.templatable(config, Vec::new(), Some(known::float_()))?;
                ctx.new_pvariable(type_id, vec![offset])
            },
        ))?;
        registry.register_entry(filter("lambda", "LambdaFilter", cv::returning_lambda(), |config, type_id, ctx| {
            let body = ctx.templatable(config, value_args().parameters(), Some(optional_float()))?;
            ctx.new_pvariable(type_id, vec![body])
        }))?;
        registry.register_entry(filter(
            "throttle",
            "ThrottleFilter",
            cv::positive_time_period_milliseconds(),
            |config, type_id, ctx| {
                let period = ctx.expression(config)?;
                ctx.new_pvariable(type_id, vec![period])
            },
        ))?;
        registry.register_entry(filter("delta", "DeltaFilter", cv::positive_float(), |config, type_id, ctx| {
            let delta = ctx.expression(config)?;
            ctx.new_pvariable(type_id, vec![delta])
        }))?;
        Ok(Self(Arc::new(registry)))
    }

    pub fn registry(&self) -> Arc<Registry<FilterBuilder>> {
        self.0.clone()
    }

    /// Lower a validated `filters:` list.
    pub fn build(&self, configs: &ConfigValue, ctx: &mut EmitContext) -> Result<Vec<Expression>> {
        let mut out = Vec::new();
        for config in configs.as_sequence().unwrap_or_default() {
            let map = config
                .as_mapping()
                .ok_or(CoreError::NotAnExpression(config.kind()))?;
            let (key, inner) = map
                .iter()
                .find(|(k, _)| *k != CONF_TYPE_ID)
                .ok_or(CoreError::NotAnExpression(config.kind()))?;
            let builder = self
                .0
                .get(key)
                .and_then(|e| e.builder.clone())
                .ok_or_else(|| CoreError::NotAnId(format!("filter '{key}'")))?;
            let type_id = map.get(CONF_TYPE_ID).cloned().unwrap_or_default();
            out.push(builder(inner, &type_id, ctx)?);
        }
        Ok(out)
    }
}

/// Keys every sensor platform accepts, on top of its own.
pub fn sensor_schema(class: CppType) -> Schema {
    cv::entity_base_schema()
        .generate_id(class)
        .optional(CONF_UNIT_OF_MEASUREMENT, cv::string_strict())
        .optional(CONF_ACCURACY_DECIMALS, cv::int_())
        .optional(CONF_DEVICE_CLASS, cv::string())
        .optional(
            CONF_STATE_CLASS,
            cv::enum_lower([
                ("measurement", "esphome::sensor::STATE_CLASS_MEASUREMENT"),
                ("total_increasing", "esphome::sensor::STATE_CLASS_TOTAL_INCREASING"),
                ("total", "esphome::sensor::STATE_CLASS_TOTAL"),
            ]),
        )
        .optional_default(CONF_FORCE_UPDATE, false, cv::boolean())
        .optional(CONF_FILTERS, cv::registry_list("filter"))
        .optional(
            CONF_ON_VALUE,
            validate_automation(Schema::new().key(
                Key::generate_id_named(CONF_TRIGGER_ID),
                cv::declare_id(sensor_ns().class_("SensorStateTrigger", &[&known::trigger()])),
            )),
        )
        .optional(
            CONF_ON_RAW_VALUE,
            validate_automation(Schema::new().key(
                Key::generate_id_named(CONF_TRIGGER_ID),
                cv::declare_id(sensor_ns().class_("SensorRawStateTrigger", &[&known::trigger()])),
            )),
        )
}

/// Entity setup, application registration, filters and triggers shared by
/// all sensors.
pub fn register_sensor(var: &Expression, config: &ConfigValue, filters: &Filters, ctx: &mut EmitContext) -> Result<()> {
    ctx.setup_entity(var, config)?;
    ctx.add(known::app().method("register_sensor", vec![var.clone()]));
    if let Some(unit) = config.get(CONF_UNIT_OF_MEASUREMENT).and_then(ConfigValue::as_str) {
        ctx.add(var.method("set_unit_of_measurement", vec![Expression::string(unit)]));
    }
    for (key, setter) in [
        (CONF_ACCURACY_DECIMALS, "set_accuracy_decimals"),
        (CONF_DEVICE_CLASS, "set_device_class"),
        (CONF_STATE_CLASS, "set_state_class"),
    ] {
        if let Some(value) = config.get(key) {
            let value = ctx.expression(value)?;
            ctx.add(var.method(setter, vec![value]));
        }
    }
    if config.get(CONF_FORCE_UPDATE).and_then(ConfigValue::as_bool) == Some(true) {
        ctx.add(var.method("set_force_update", vec![Expression::bool(true)]));
    }
    if let Some(configs) = config.get(CONF_FILTERS) {
        let built = filters.build(configs, ctx)?;
        ctx.add(var.method("set_filters", vec![Expression::Array(built)]));
    }
    for key in [CONF_ON_VALUE, CONF_ON_RAW_VALUE] {
        if let Some(automations) = config.get(key) {
            build_triggers(automations, vec![var.clone()], &value_args(), ctx)?;
        }
    }
    Ok(())
}

fn domain_to_code(_config: &ConfigValue, ctx: &mut EmitContext) -> Result<()> {
    ctx.add_define(Define::new("USE_SENSOR"))?;
    Ok(())
}

fn template_sensor_type() -> CppType {
    cv::component_ns("template_").class_("TemplateSensor", &[&sensor_type(), &known::polling_component()])
}

pub fn template_schema() -> Schema {
    sensor_schema(template_sensor_type())
        .extend(cv::polling_component_schema("60s"))
        .optional(CONF_LAMBDA, cv::returning_lambda())
}

fn template_to_code(config: &ConfigValue, filters: &Filters, ctx: &mut EmitContext) -> Result<()> {
    let id = config.get(CONF_ID).cloned().unwrap_or_default();
    let var = ctx.new_pvariable(&id, Vec::new())?;
    ctx.register_component(&var, config)?;
    register_sensor(&var, config, filters, ctx)?;
    if let Some(lambda) = config.get(CONF_LAMBDA) {
        let lambda = ctx.templatable(lambda, Vec::new(), Some(optional_float()))?;
        ctx.add(var.method("set_template", vec![lambda]));
    }
    Ok(())
}

fn register_actions(catalogue: &mut Catalogue) -> fw_config_core::Result<()> {
    let ty = cv::component_ns("template_").class_("TemplateSensorPublishAction", &[&known::action()]);
    catalogue.automations_mut().register_action(
        "sensor.template.publish",
        ty.clone(),
        Schema::new()
            .required("id", cv::use_id(template_sensor_type()))
            .required("state", cv::templatable(cv::float())),
        move |config, type_id, args, ctx| {
            let target = ctx.get_variable(config.get("id").unwrap_or(&ConfigValue::Null))?;
            let var = ctx.new_pvariable_as(type_id, &ty.template(args.template_args()), vec![target])?;
            let state = config.get("state").cloned().unwrap_or_default();
            let state = ctx.templatable(&state, args.parameters(), Some(known::float_()))?;
            ctx.add(var.method("set_state", vec![state]));
            Ok(var)
        },
    )
}

pub fn register(catalogue: &mut Catalogue) -> fw_config_core::Result<()> {
    let filters = Filters::builtin()?;
    catalogue.register_registry(filters.registry());
    register_actions(catalogue)?;
    catalogue.register(
        Component::new("sensor")
            .with_codeowners(&["@esphome/core"])
            .as_platform_component()
            .with_to_code(priority::CORE, domain_to_code),
    )?;
    catalogue.register(
        Component::new("sensor.template")
            .with_schema(template_schema())
            .with_to_code(priority::COMPONENT, move |config, ctx| template_to_code(config, &filters, ctx)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fw_config_core::{load_yaml_str, Target, TargetPlatform, ValidationContext, Validator};

    fn ctx() -> ValidationContext {
        let mut catalogue = Catalogue::new();
        register(&mut catalogue).unwrap();
        let mut ctx = ValidationContext::new(Target::new(TargetPlatform::Esp32, "esp32dev"));
        ctx.set_registries(Arc::new(catalogue.registry_set()));
        ctx
    }

    #[test]
    fn filters_validate_through_the_registry() {
        let mut ctx = ctx();
        let out = Validator::from(template_schema())
            .validate(
                &load_yaml_str("name: Temp\nfilters:\n  - multiply: 2\n  - offset: -1.5\n").unwrap(),
                &mut ctx,
            )
            .unwrap();
        let filters = out.get(CONF_FILTERS).and_then(ConfigValue::as_sequence).unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].get("multiply"), Some(&ConfigValue::Float(2.0)));
        assert!(filters[0].get(CONF_TYPE_ID).is_some());
    }

    #[test]
    fn unknown_filter_is_suggested() {
        let mut ctx = ctx();
        let err = Validator::from(template_schema())
            .validate(&load_yaml_str("name: Temp\nfilters:\n  - multipy: 2\n").unwrap(), &mut ctx)
            .unwrap_err();
        let message = &err.first().unwrap().message;
        assert!(message.starts_with("Unable to find filter with the name 'multipy'"), "{message}");
        assert!(message.ends_with("Did you mean 'multiply'?"), "{message}");
    }

    #[test]
    fn update_interval_defaults_to_a_minute() {
        let mut ctx = ctx();
        let out = Validator::from(template_schema())
            .validate(&load_yaml_str("id: temp").unwrap(), &mut ctx)
            .unwrap();
        let interval = out.get(cv::CONF_UPDATE_INTERVAL).and_then(ConfigValue::as_time_period).unwrap();
        assert_eq!(interval.total_milliseconds(), 60_000);
    }
}
