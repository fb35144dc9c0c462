// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Automations: triggers wired to lists of actions, optionally guarded by
//! conditions.
//!
//! Actions and conditions live in the `action` and `condition` registries so
//! that schemas can recurse through them by name. Each validated item is a
//! single-key mapping plus a `type_id` declaration for the object it builds.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use fw_codegen::{esphome_ns, known, CppType, Expression, TemplateArg};
use fw_config_core::{
    config_path, cv, ConfigError, ConfigValue, CustomValidator, Key, MultipleInvalid, PathSegment, Registry,
    RegistryEntry, Schema, SchemaRegistry, ValidationContext, ValidationResult, Validator, CONF_TYPE_ID,
};

use crate::emit::EmitContext;
use crate::error::{CoreError, Result};

pub const CONF_THEN: &str = "then";
pub const CONF_IF: &str = "if";
pub const CONF_TRIGGER_ID: &str = "trigger_id";
pub const CONF_AUTOMATION_ID: &str = "automation_id";

/// Arguments a trigger passes to its actions, as `(type, name)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerArgs(pub Vec<(CppType, String)>);

impl TriggerArgs {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(args: &[(CppType, &str)]) -> Self {
        Self(args.iter().map(|(ty, name)| (ty.clone(), name.to_string())).collect())
    }

    /// Template arguments for `Action<Ts...>`-style classes.
    pub fn template_args(&self) -> Vec<TemplateArg> {
        self.0.iter().map(|(ty, _)| TemplateArg::from(ty)).collect()
    }

    /// Lambda parameters.
    pub fn parameters(&self) -> Vec<(CppType, String)> {
        self.0.clone()
    }
}

/// Builds one action or condition: `(config, type_id, args, ctx)`.
pub type AutomationBuilder =
    Arc<dyn Fn(&ConfigValue, &ConfigValue, &TriggerArgs, &mut EmitContext) -> Result<Expression> + Send + Sync>;

/// The action, condition and trigger registries.
#[derive(Clone)]
pub struct Automations {
    actions: Arc<Registry<AutomationBuilder>>,
    conditions: Arc<Registry<AutomationBuilder>>,
    triggers: BTreeMap<String, CppType>,
}

impl fmt::Debug for Automations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Automations")
            .field("actions", &self.actions)
            .field("conditions", &self.conditions)
            .field("triggers", &self.triggers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Automations {
    fn default() -> Self {
        Self::new()
    }
}

fn entry<F>(key: &str, ty: CppType, schema: impl Into<Validator>, builder: F) -> RegistryEntry<AutomationBuilder>
where
    F: Fn(&ConfigValue, &ConfigValue, &TriggerArgs, &mut EmitContext) -> Result<Expression> + Send + Sync + 'static,
{
    RegistryEntry::new(key, schema).with_type(ty).with_builder(Arc::new(builder) as AutomationBuilder)
}

impl Automations {
    /// Empty registries.
    pub fn new() -> Self {
        Self {
            actions: Arc::new(Registry::new("action")),
            conditions: Arc::new(Registry::new("condition")),
            triggers: BTreeMap::new(),
        }
    }

    /// Registries holding the core actions and conditions.
    pub fn builtin() -> fw_config_core::Result<Self> {
        let mut a = Self::new();
        register_builtins(&mut a)?;
        Ok(a)
    }

    pub fn register_action<F>(
        &mut self,
        key: &str,
        ty: CppType,
        schema: impl Into<Validator>,
        builder: F,
    ) -> fw_config_core::Result<()>
    where
        F: Fn(&ConfigValue, &ConfigValue, &TriggerArgs, &mut EmitContext) -> Result<Expression>
            + Send
            + Sync
            + 'static,
    {
        Arc::make_mut(&mut self.actions).register_entry(entry(key, ty, schema, builder))
    }

    pub fn register_condition<F>(
        &mut self,
        key: &str,
        ty: CppType,
        schema: impl Into<Validator>,
        builder: F,
    ) -> fw_config_core::Result<()>
    where
        F: Fn(&ConfigValue, &ConfigValue, &TriggerArgs, &mut EmitContext) -> Result<Expression>
            + Send
            + Sync
            + 'static,
    {
        Arc::make_mut(&mut self.conditions).register_entry(entry(key, ty, schema, builder))
    }

    /// Record the class a named trigger (`on_boot`, `on_value`) constructs.
    pub fn register_trigger(&mut self, name: &str, ty: CppType) -> fw_config_core::Result<()> {
        if self.triggers.contains_key(name) {
            return Err(ConfigError::DuplicateRegistration {
                registry: "trigger".into(),
                key: name.into(),
            });
        }
        self.triggers.insert(name.to_string(), ty);
        Ok(())
    }

    pub fn trigger_type(&self, name: &str) -> Option<&CppType> {
        self.triggers.get(name)
    }

    pub fn action_registry(&self) -> Arc<dyn SchemaRegistry> {
        self.actions.clone()
    }

    pub fn condition_registry(&self) -> Arc<dyn SchemaRegistry> {
        self.conditions.clone()
    }

    fn build_item(
        registry: &Registry<AutomationBuilder>,
        config: &ConfigValue,
        args: &TriggerArgs,
        ctx: &mut EmitContext,
    ) -> Result<Expression> {
        let map = config
            .as_mapping()
            .ok_or(CoreError::NotAnExpression(config.kind()))?;
        let (key, inner) = map
            .iter()
            .find(|(k, _)| *k != CONF_TYPE_ID)
            .ok_or(CoreError::NotAnExpression(config.kind()))?;
        let builder = registry
            .get(key)
            .and_then(|e| e.builder.clone())
            .ok_or_else(|| CoreError::NotAnId(format!("{} '{key}'", registry.name())))?;
        let type_id = map.get(CONF_TYPE_ID).cloned().unwrap_or_default();
        builder(inner, &type_id, args, ctx)
    }

    pub fn build_action(&self, config: &ConfigValue, args: &TriggerArgs, ctx: &mut EmitContext) -> Result<Expression> {
        Self::build_item(&self.actions, config, args, ctx)
    }

    pub fn build_actions(
        &self,
        configs: &ConfigValue,
        args: &TriggerArgs,
        ctx: &mut EmitContext,
    ) -> Result<Vec<Expression>> {
        configs
            .as_sequence()
            .unwrap_or_default()
            .iter()
            .map(|c| self.build_action(c, args, ctx))
            .collect()
    }

    pub fn build_condition(
        &self,
        config: &ConfigValue,
        args: &TriggerArgs,
        ctx: &mut EmitContext,
    ) -> Result<Expression> {
        Self::build_item(&self.conditions, config, args, ctx)
    }

    pub fn build_conditions(
        &self,
        configs: &ConfigValue,
        args: &TriggerArgs,
        ctx: &mut EmitContext,
    ) -> Result<Vec<Expression>> {
        configs
            .as_sequence()
            .unwrap_or_default()
            .iter()
            .map(|c| self.build_condition(c, args, ctx))
            .collect()
    }
}

fn automation_schema() -> Schema {
    Schema::new()
        .key(Key::generate_id_named(CONF_TRIGGER_ID), cv::declare_id(known::trigger()))
        .key(Key::generate_id_named(CONF_AUTOMATION_ID), cv::declare_id(known::automation()))
        .optional(CONF_IF, cv::registry_list("condition"))
        .required(CONF_THEN, cv::registry_list("action"))
}

fn wrap_then(value: &ConfigValue) -> ConfigValue {
    [(CONF_THEN, value.clone())].into_iter().collect::<fw_config_core::ConfigMap>().into()
}

/// Errors from validating `{then: value}`, re-pointed at `value`.
fn strip_then(errors: MultipleInvalid) -> MultipleInvalid {
    let then = PathSegment::Key(CONF_THEN.to_string());
    let errors = errors
        .into_errors()
        .into_iter()
        .map(|mut e| {
            if e.path.0.first() == Some(&then) {
                e.path.0.remove(0);
            }
            e
        })
        .collect();
    MultipleInvalid::new(errors)
}

fn validate_automation_value(schema: &Schema, value: &ConfigValue, ctx: &mut ValidationContext) -> ValidationResult {
    match value {
        ConfigValue::Sequence(items) => {
            // Either a bare list of actions or a list of automations.
            let checkpoint = ctx.checkpoint();
            let as_actions = match schema.validate(&wrap_then(value), ctx) {
                Ok(v) => return Ok(ConfigValue::Sequence(vec![v])),
                Err(e) => strip_then(e),
            };
            ctx.rollback(checkpoint);

            let mut out = Vec::with_capacity(items.len());
            let mut errors: Option<MultipleInvalid> = None;
            for (i, item) in items.iter().enumerate() {
                match ctx.descend(i, |ctx| schema.validate(item, ctx)) {
                    Ok(v) => out.push(v),
                    Err(e) => {
                        let e = e.prepend(&config_path![i]);
                        match errors.as_mut() {
                            Some(all) => all.extend(e),
                            None => errors = Some(e),
                        }
                    }
                }
            }
            match errors {
                None => Ok(ConfigValue::Sequence(out)),
                Some(mut as_automations) => {
                    // An item with a stray key was meant as an action.
                    let stray_key = as_automations
                        .errors()
                        .iter()
                        .any(|e| e.path.0.len() == 2 && e.message.contains("is an invalid option"));
                    let unknown_action = as_actions
                        .errors()
                        .iter()
                        .any(|e| e.message.starts_with("Unable to find action"));
                    Err(if stray_key {
                        as_actions
                    } else if unknown_action {
                        as_automations
                    } else {
                        as_automations.extend(as_actions);
                        as_automations
                    })
                }
            }
        }
        ConfigValue::Mapping(m) if m.contains_key(CONF_THEN) => Ok(ConfigValue::Sequence(vec![schema.validate(value, ctx)?])),
        other => {
            let v = schema.validate(&wrap_then(other), ctx).map_err(strip_then)?;
            Ok(ConfigValue::Sequence(vec![v]))
        }
    }
}

/// Accepts a single action, a list of actions, a mapping with `then:` (and
/// optional `if:`) or a list of such mappings. Always yields a list of
/// automations.
pub fn validate_automation(extra: Schema) -> Validator {
    let schema = automation_schema().extend(extra);
    CustomValidator::new("automation", move |value, ctx| validate_automation_value(&schema, value, ctx)).into()
}

/// Emit one `Automation<Ts...>` fed by `trigger`.
pub fn build_automation(
    trigger: &Expression,
    args: &TriggerArgs,
    config: &ConfigValue,
    ctx: &mut EmitContext,
) -> Result<Expression> {
    let automations = ctx.automations();
    let ty = known::automation().template(args.template_args());
    let id = config.get(CONF_AUTOMATION_ID).cloned().unwrap_or_default();
    let var = ctx.new_pvariable_as(&id, &ty, vec![trigger.clone()])?;
    if let Some(conditions) = config.get(CONF_IF) {
        let conditions = automations.build_conditions(conditions, args, ctx)?;
        ctx.add(var.method("add_conditions", vec![Expression::Array(conditions)]));
    }
    let then = config.get(CONF_THEN).cloned().unwrap_or_default();
    let actions = automations.build_actions(&then, args, ctx)?;
    ctx.add(var.method("add_actions", vec![Expression::Array(actions)]));
    Ok(var)
}

/// For every automation in `configs`, construct its trigger from
/// `trigger_args` and build the automation.
pub fn build_triggers(
    configs: &ConfigValue,
    trigger_args: Vec<Expression>,
    args: &TriggerArgs,
    ctx: &mut EmitContext,
) -> Result<()> {
    for config in configs.as_sequence().unwrap_or_default() {
        let id = config.get(CONF_TRIGGER_ID).cloned().unwrap_or_default();
        let trigger = ctx.new_pvariable(&id, trigger_args.clone())?;
        build_automation(&trigger, args, config, ctx)?;
    }
    Ok(())
}

fn action_type(class: &str, component: bool) -> CppType {
    if component {
        esphome_ns().class_(class, &[&known::action(), &known::component()])
    } else {
        esphome_ns().class_(class, &[&known::action()])
    }
}

fn condition_type(class: &str) -> CppType {
    esphome_ns().class_(class, &[&known::condition()])
}

fn register_builtins(a: &mut Automations) -> fw_config_core::Result<()> {
    let delay = action_type("DelayAction", true);
    a.register_action(
        "delay",
        delay.clone(),
        cv::templatable(cv::positive_time_period_milliseconds()),
        move |config, type_id, args, ctx| {
            let var = ctx.new_pvariable_as(type_id, &delay.template(args.template_args()), Vec::new())?;
            ctx.register_component(&var, &ConfigValue::Null)?;
            let value = ctx.templatable(config, args.parameters(), Some(known::uint32()))?;
            ctx.add(var.method("set_delay", vec![value]));
            Ok(var)
        },
    )?;

    let lambda_action = action_type("LambdaAction", false);
    a.register_action("lambda", lambda_action.clone(), cv::lambda(), move |config, type_id, args, ctx| {
        let body = ctx.templatable(config, args.parameters(), Some(known::void()))?;
        ctx.new_pvariable_as(type_id, &lambda_action.template(args.template_args()), vec![body])
    })?;

    let update = action_type("UpdateComponentAction", false);
    a.register_action(
        "component.update",
        update.clone(),
        cv::maybe_simple_value(Schema::new().required("id", cv::use_id(known::polling_component())), "id"),
        move |config, type_id, args, ctx| {
            let target = ctx.get_variable(config.get("id").unwrap_or(&ConfigValue::Null))?;
            ctx.new_pvariable_as(type_id, &update.template(args.template_args()), vec![target])
        },
    )?;

    for (key, class) in [("and", "AndCondition"), ("or", "OrCondition")] {
        let ty = condition_type(class);
        a.register_condition(key, ty.clone(), cv::registry_list("condition"), move |config, type_id, args, ctx| {
            let automations = ctx.automations();
            let inner = automations.build_conditions(config, args, ctx)?;
            ctx.new_pvariable_as(type_id, &ty.template(args.template_args()), vec![Expression::Array(inner)])
        })?;
    }

    let lambda_condition = condition_type("LambdaCondition");
    a.register_condition(
        "lambda",
        lambda_condition.clone(),
        cv::returning_lambda(),
        move |config, type_id, args, ctx| {
            let body = ctx.templatable(config, args.parameters(), Some(known::bool_()))?;
            ctx.new_pvariable_as(type_id, &lambda_condition.template(args.template_args()), vec![body])
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fw_config_core::{load_yaml_str, resolve_ids, IdTable, PinRegistry, RegistrySet, Target, TargetPlatform};

    fn validation_ctx(automations: &Automations) -> ValidationContext {
        let mut ctx = ValidationContext::new(Target::new(TargetPlatform::Esp32, "esp32dev"));
        let mut set = RegistrySet::new();
        set.insert(automations.action_registry());
        set.insert(automations.condition_registry());
        ctx.set_registries(Arc::new(set));
        ctx
    }

    fn validate(src: &str) -> std::result::Result<ConfigValue, MultipleInvalid> {
        let automations = Automations::builtin().unwrap();
        let value = load_yaml_str(src).unwrap();
        validate_automation(Schema::new()).validate(&value, &mut validation_ctx(&automations))
    }

    fn then_keys(automation: &ConfigValue) -> Vec<String> {
        automation
            .get(CONF_THEN)
            .and_then(ConfigValue::as_sequence)
            .unwrap_or_default()
            .iter()
            .filter_map(|a| a.as_mapping().and_then(|m| m.keys().find(|k| *k != CONF_TYPE_ID)).map(str::to_string))
            .collect()
    }

    #[test]
    fn single_action_shorthand() {
        let out = validate("delay: 1s").unwrap();
        let list = out.as_sequence().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(then_keys(&list[0]), vec!["delay"]);
        assert!(list[0].get(CONF_TRIGGER_ID).is_some());
    }

    #[test]
    fn list_of_actions_is_one_automation() {
        let out = validate("- delay: 1s\n- lambda: !lambda 'ESP_LOGD(\"x\", \"y\");'").unwrap();
        let list = out.as_sequence().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(then_keys(&list[0]), vec!["delay", "lambda"]);
    }

    #[test]
    fn list_of_automations() {
        let out = validate("- then: [delay: 1s]\n- if: [lambda: !lambda 'return true;']\n  then: [delay: 2s]").unwrap();
        let list = out.as_sequence().unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[1].get(CONF_IF).is_some());
    }

    #[test]
    fn unknown_action_is_reported_with_suggestion() {
        let err = validate("- delya: 1s").unwrap_err();
        let first = err.first().unwrap();
        assert!(first.message.contains("Unable to find action with the name 'delya'"));
        assert!(first.message.contains("Did you mean 'delay'?"));
        assert_eq!(first.path, config_path![0usize, "delya"]);
    }

    #[test]
    fn builds_an_automation_chain() {
        let automations = Arc::new(Automations::builtin().unwrap());
        let value = load_yaml_str("then:\n  - delay: 500ms\n  - lambda: !lambda 'id(led).toggle();'").unwrap();
        let config = validate_automation(Schema::new())
            .validate(&value, &mut validation_ctx(&automations))
            .unwrap();
        let led_id = fw_config_core::Id::declaration(
            Some("led".into()),
            esphome_ns().class_("Led", &[&known::component()]),
        );
        let mut root = fw_config_core::ConfigMap::new();
        root.insert("on_boot", config);
        root.insert(
            "led",
            [("id", ConfigValue::Id(led_id.clone()))]
                .into_iter()
                .collect::<fw_config_core::ConfigMap>()
                .into(),
        );
        let mut root: ConfigValue = root.into();
        resolve_ids(&mut root).unwrap();

        let mut ctx = EmitContext::new(
            Target::new(TargetPlatform::Esp32, "esp32dev"),
            IdTable::default(),
            Arc::new(PinRegistry::default()),
            automations,
        );
        ctx.new_pvariable(&ConfigValue::Id(led_id), Vec::new()).unwrap();
        let trigger = Expression::raw("trig");
        let automation = root.get("on_boot").and_then(ConfigValue::as_sequence).unwrap()[0].clone();
        build_automation(&trigger, &TriggerArgs::none(), &automation, &mut ctx).unwrap();

        let main = ctx.model().render_main().join("\n");
        assert!(main.contains("new esphome::Automation(trig)"));
        assert!(main.contains("->set_delay(500);"));
        assert!(main.contains("led->toggle();"));
        assert!(main.contains("->add_actions({"));
    }
}
