// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The state emission jobs write into.
//!
//! An [`EmitContext`] owns the [`CodegenModel`] for one run together with the
//! resolved IDs and the pin registry, and offers the helpers descriptors use to
//! lower a validated fragment: variables bound to IDs, component registration,
//! parent wiring, pin construction, lambdas and templatable values.

use std::sync::{Arc, OnceLock};

use fw_codegen::{
    known, CodegenModel, CppType, Define, Expression, LambdaExpression, Library, OptionValue, Statement,
};
use fw_config_core::cv::{CONF_SETUP_PRIORITY, CONF_UPDATE_INTERVAL};
use fw_config_core::{
    ConfigValue, IdTable, Lambda, PinMode, PinProvider, PinRegistry, Target, CONF_ID, CONF_INVERTED, CONF_MODE,
    CONF_NUMBER,
};
use regex::{Captures, Regex};
use tracing::trace;

use crate::automation::Automations;
use crate::error::{CoreError, Result};
use crate::scheduler::Job;

/// Mutable emission state for one run.
pub struct EmitContext {
    model: CodegenModel,
    target: Target,
    ids: IdTable,
    pins: Arc<PinRegistry>,
    automations: Arc<Automations>,
    component: String,
    deferred: Vec<Job>,
}

fn id_parts(id: &ConfigValue) -> Result<(&str, &CppType)> {
    match id {
        ConfigValue::Id(id) => match (id.name(), id.type_token()) {
            (Some(name), Some(ty)) => Ok((name, ty)),
            _ => Err(CoreError::NotAnId(id.to_string())),
        },
        other => Err(CoreError::NotAnId(other.kind().to_string())),
    }
}

/// Name of a resolved ID value.
pub fn id_name(id: &ConfigValue) -> Result<&str> {
    id_parts(id).map(|(name, _)| name)
}

fn lambda_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"id\(\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\)(\.?)").expect("lambda id pattern is valid")
    })
}

impl EmitContext {
    pub fn new(target: Target, ids: IdTable, pins: Arc<PinRegistry>, automations: Arc<Automations>) -> Self {
        Self {
            model: CodegenModel::new(),
            target,
            ids,
            pins,
            automations,
            component: String::new(),
            deferred: Vec::new(),
        }
    }

    pub fn model(&self) -> &CodegenModel {
        &self.model
    }

    pub fn into_model(self) -> CodegenModel {
        self.model
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn ids(&self) -> &IdTable {
        &self.ids
    }

    pub fn automations(&self) -> Arc<Automations> {
        self.automations.clone()
    }

    /// Name of the component whose job is running.
    pub fn component(&self) -> &str {
        &self.component
    }

    pub(crate) fn set_component(&mut self, name: &str) {
        self.component = name.to_string();
    }

    pub fn add(&mut self, statement: impl Into<Statement>) {
        self.model.add(statement);
    }

    pub fn add_global(&mut self, statement: impl Into<Statement>) {
        self.model.add_global(statement);
    }

    pub fn add_define(&mut self, define: Define) -> Result<()> {
        Ok(self.model.add_define(define)?)
    }

    pub fn add_build_flag(&mut self, flag: impl Into<String>) {
        self.model.add_build_flag(flag);
    }

    pub fn add_library(&mut self, library: Library) -> Result<()> {
        Ok(self.model.add_library(library)?)
    }

    pub fn add_platformio_option(&mut self, key: &str, value: impl Into<OptionValue>) -> Result<()> {
        Ok(self.model.add_platformio_option(key, value)?)
    }

    /// Construct the object for a declared ID with `new T(args)`.
    pub fn new_pvariable(&mut self, id: &ConfigValue, args: Vec<Expression>) -> Result<Expression> {
        let (name, ty) = id_parts(id)?;
        let ty = ty.clone();
        Ok(self.model.new_pvariable(name, &ty, args)?)
    }

    /// Like [`new_pvariable`](Self::new_pvariable), with the ID's type
    /// replaced by `ty` (usually the same class with template arguments).
    pub fn new_pvariable_as(&mut self, id: &ConfigValue, ty: &CppType, args: Vec<Expression>) -> Result<Expression> {
        let name = id_name(id)?;
        Ok(self.model.new_pvariable(name, ty, args)?)
    }

    /// Bind an existing pointer expression to a declared ID.
    pub fn pvariable(&mut self, id: &ConfigValue, rhs: Expression) -> Result<Expression> {
        let (name, ty) = id_parts(id)?;
        let ty = ty.clone();
        Ok(self.model.pvariable(name, rhs, &ty)?)
    }

    pub fn progmem_array(&mut self, id: &ConfigValue, values: Vec<Expression>) -> Result<Expression> {
        let (name, ty) = id_parts(id)?;
        let ty = ty.clone();
        Ok(self.model.progmem_array(name, &ty, values)?)
    }

    /// The variable bound to a referenced ID.
    pub fn get_variable(&self, id: &ConfigValue) -> Result<Expression> {
        self.get_variable_by_name(id_name(id)?)
    }

    pub fn get_variable_by_name(&self, name: &str) -> Result<Expression> {
        Ok(self.model.get_variable(name)?.clone())
    }

    /// Register `var` with the application, applying the common component keys.
    pub fn register_component(&mut self, var: &Expression, config: &ConfigValue) -> Result<()> {
        let (name, ty) = match var {
            Expression::Variable { name, ty, .. } => (name, ty),
            other => return Err(CoreError::NotAComponent(other.to_string())),
        };
        if !ty.inherits_from(&known::component()) {
            return Err(CoreError::NotAComponent(name.clone()));
        }
        if let Some(priority) = config.get(CONF_SETUP_PRIORITY).and_then(ConfigValue::as_f64) {
            self.add(var.method("set_setup_priority", vec![Expression::float(priority)]));
        }
        if let Some(interval) = config.get(CONF_UPDATE_INTERVAL).and_then(ConfigValue::as_time_period) {
            if !ty.inherits_from(&known::polling_component()) {
                return Err(CoreError::NotAComponent(format!(
                    "{name} (update_interval needs a PollingComponent)"
                )));
            }
            self.add(var.method("set_update_interval", vec![Expression::int(interval.emit_value())]));
        }
        self.add(known::app().method("register_component", vec![var.clone()]));
        Ok(())
    }

    /// Point `var` at the object bound to `parent`.
    pub fn register_parented(&mut self, var: &Expression, parent: &ConfigValue) -> Result<()> {
        let parent = self.get_variable(parent)?;
        self.add(var.method("set_parent", vec![parent]));
        Ok(())
    }

    /// Name, visibility and category setters shared by every entity.
    pub fn setup_entity(&mut self, var: &Expression, config: &ConfigValue) -> Result<()> {
        if let Some(name) = config.get("name").and_then(ConfigValue::as_str) {
            self.add(var.method("set_name", vec![Expression::string(name)]));
        }
        if config.get("disabled_by_default").and_then(ConfigValue::as_bool) == Some(true) {
            self.add(var.method("set_disabled_by_default", vec![Expression::bool(true)]));
        }
        if config.get("internal").and_then(ConfigValue::as_bool) == Some(true) {
            self.add(var.method("set_internal", vec![Expression::bool(true)]));
        }
        if let Some(icon) = config.get("icon").and_then(ConfigValue::as_str) {
            self.add(var.method("set_icon", vec![Expression::string(icon)]));
        }
        if let Some(category) = config.get("entity_category") {
            let category = self.expression(category)?;
            self.add(var.method("set_entity_category", vec![category]));
        }
        Ok(())
    }

    /// Build the pin object described by a validated pin mapping.
    pub fn gpio_pin_expression(&mut self, pin: &ConfigValue) -> Result<Expression> {
        let map = pin
            .as_mapping()
            .ok_or(CoreError::NotAnExpression(pin.kind()))?;
        let id = map.get(CONF_ID).cloned().unwrap_or_default();
        let number = map.get(CONF_NUMBER).and_then(ConfigValue::as_i64).unwrap_or_default();
        let inverted = map.get(CONF_INVERTED).and_then(ConfigValue::as_bool).unwrap_or(false);
        let flags = map
            .get(CONF_MODE)
            .and_then(PinMode::from_value)
            .unwrap_or(PinMode::INPUT)
            .flags_expression();

        let pins = self.pins.clone();
        let var = match pins.select(map) {
            Some(PinProvider::External(provider)) => {
                trace!(provider = %provider.key, "Building external pin");
                return Ok(provider.builder.build(map, &mut self.model)?);
            }
            Some(provider) => {
                let hub = map.get(provider.key()).cloned().unwrap_or_default();
                let var = self.new_pvariable(&id, Vec::new())?;
                self.register_parented(&var, &hub)?;
                var
            }
            None => self.new_pvariable(&id, Vec::new())?,
        };
        self.add(var.method("set_pin", vec![Expression::int(number)]));
        self.add(var.method("set_inverted", vec![Expression::bool(inverted)]));
        self.add(var.method("set_flags", vec![flags]));
        Ok(var)
    }

    /// Turn user lambda source into a C++ lambda.
    ///
    /// `id(x).` becomes `x->` and a bare `id(x)` becomes `(*x)`. Every
    /// referenced ID must already have a variable.
    pub fn process_lambda(
        &self,
        lambda: &Lambda,
        parameters: Vec<(CppType, String)>,
        return_type: Option<CppType>,
    ) -> Result<Expression> {
        if let Some(missing) = lambda.requires_ids().iter().find(|id| !self.model.has_variable(id)) {
            return Err(CoreError::LambdaUndeclaredId(missing.clone()));
        }
        let body = lambda_id_regex()
            .replace_all(lambda.source(), |caps: &Captures| {
                if &caps[2] == "." {
                    format!("{}->", &caps[1])
                } else {
                    format!("(*{})", &caps[1])
                }
            })
            .into_owned();
        Ok(Expression::Lambda(LambdaExpression {
            parameters,
            capture: "=".to_string(),
            return_type,
            body,
            captures: lambda.requires_ids().to_vec(),
        }))
    }

    /// A literal, or a lambda taking `parameters` and returning `output`.
    pub fn templatable(
        &self,
        value: &ConfigValue,
        parameters: Vec<(CppType, String)>,
        output: Option<CppType>,
    ) -> Result<Expression> {
        match value {
            ConfigValue::Lambda(lambda) => self.process_lambda(lambda, parameters, output),
            other => self.expression(other),
        }
    }

    /// The C++ expression for a validated scalar, list or ID.
    pub fn expression(&self, value: &ConfigValue) -> Result<Expression> {
        Ok(match value {
            ConfigValue::Bool(b) => Expression::bool(*b),
            ConfigValue::Int(i) => Expression::int(*i),
            ConfigValue::HexInt(h) => Expression::hex(*h as u64),
            ConfigValue::Float(f) => Expression::float(*f),
            ConfigValue::String(s) => Expression::string(s.as_str()),
            ConfigValue::TimePeriod(t) => Expression::int(t.emit_value()),
            ConfigValue::Enum { value, .. } => Expression::raw(value.as_str()),
            ConfigValue::Id(_) => self.get_variable(value)?,
            ConfigValue::Lambda(lambda) => self.process_lambda(lambda, Vec::new(), None)?,
            ConfigValue::Sequence(items) => Expression::Array(
                items
                    .iter()
                    .map(|item| self.expression(item))
                    .collect::<Result<Vec<_>>>()?,
            ),
            ConfigValue::Null => Expression::raw("nullptr"),
            other => return Err(CoreError::NotAnExpression(other.kind())),
        })
    }

    /// Queue `job` to run after the current one, at `priority`, once every
    /// ID in `consumes` has a variable.
    pub fn defer<F>(&mut self, priority: f64, consumes: Vec<String>, job: F)
    where
        F: FnOnce(&mut EmitContext) -> Result<()> + 'static,
    {
        let label = format!("{} (deferred)", self.component);
        self.deferred.push(Job::new(label, priority, consumes, job));
    }

    pub(crate) fn take_deferred(&mut self) -> Vec<Job> {
        std::mem::take(&mut self.deferred)
    }
}
