// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! What the orchestrator needs to know about one component.

use std::fmt;
use std::sync::Arc;

use fw_config_core::{ConfigValue, TargetPlatform, Validator};

use crate::emit::EmitContext;
use crate::error::Result;

/// Emission priorities. Higher values run first.
pub mod priority {
    /// Target platform setup.
    pub const PLATFORM: f64 = 1000.0;
    /// Buses that other components attach to.
    pub const BUS: f64 = 1000.0;
    pub const CORE: f64 = 100.0;
    pub const DIAGNOSTICS: f64 = 90.0;
    /// Pin expanders and other hubs, after their buses.
    pub const IO: f64 = 60.0;
    pub const AUTOMATION: f64 = 30.0;
    pub const COMPONENT: f64 = 0.0;
    pub const LATE: f64 = -100.0;
    pub const WORKAROUNDS: f64 = -999.0;
    /// Build-level options that must see every component first.
    pub const FINAL: f64 = -1000.0;
}

/// A component known to the catalogue.
///
/// Names are either a top-level domain (`uart`) or, for items of a platform
/// domain, `domain.platform` (`sensor.template`).
pub trait ComponentDescriptor: Send + Sync {
    fn name(&self) -> &str;

    /// Components that must already be present in the configuration.
    fn dependencies(&self) -> &[String] {
        &[]
    }

    /// Components inserted with an empty section when absent.
    fn auto_load(&self) -> &[String] {
        &[]
    }

    fn conflicts_with(&self) -> &[String] {
        &[]
    }

    fn codeowners(&self) -> &[String] {
        &[]
    }

    /// The section is a list of independent instances.
    fn multi_conf(&self) -> bool {
        false
    }

    /// The section is a list of items, each naming a `platform`.
    fn is_platform_component(&self) -> bool {
        false
    }

    /// `None` means every target.
    fn supported_platforms(&self) -> Option<&[TargetPlatform]> {
        None
    }

    fn config_schema(&self) -> Option<&Validator> {
        None
    }

    fn final_validate_schema(&self) -> Option<&Validator> {
        None
    }

    fn to_code_priority(&self) -> f64 {
        priority::COMPONENT
    }

    fn to_code(&self, config: &ConfigValue, ctx: &mut EmitContext) -> Result<()> {
        let _ = (config, ctx);
        Ok(())
    }
}

type ToCodeFn = dyn Fn(&ConfigValue, &mut EmitContext) -> Result<()> + Send + Sync;

/// A descriptor assembled from parts.
#[derive(Clone)]
pub struct Component {
    name: String,
    dependencies: Vec<String>,
    auto_load: Vec<String>,
    conflicts_with: Vec<String>,
    codeowners: Vec<String>,
    multi_conf: bool,
    platform_component: bool,
    supported_platforms: Option<Vec<TargetPlatform>>,
    schema: Option<Validator>,
    final_validate: Option<Validator>,
    priority: f64,
    to_code: Option<Arc<ToCodeFn>>,
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            auto_load: Vec::new(),
            conflicts_with: Vec::new(),
            codeowners: Vec::new(),
            multi_conf: false,
            platform_component: false,
            supported_platforms: None,
            schema: None,
            final_validate: None,
            priority: priority::COMPONENT,
            to_code: None,
        }
    }

    pub fn with_dependencies(mut self, names: &[&str]) -> Self {
        self.dependencies = owned(names);
        self
    }

    pub fn with_auto_load(mut self, names: &[&str]) -> Self {
        self.auto_load = owned(names);
        self
    }

    pub fn with_conflicts(mut self, names: &[&str]) -> Self {
        self.conflicts_with = owned(names);
        self
    }

    pub fn with_codeowners(mut self, owners: &[&str]) -> Self {
        self.codeowners = owned(owners);
        self
    }

    pub fn with_multi_conf(mut self) -> Self {
        self.multi_conf = true;
        self
    }

    pub fn as_platform_component(mut self) -> Self {
        self.platform_component = true;
        self
    }

    pub fn with_supported_platforms(mut self, platforms: &[TargetPlatform]) -> Self {
        self.supported_platforms = Some(platforms.to_vec());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<Validator>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_final_validate(mut self, schema: impl Into<Validator>) -> Self {
        self.final_validate = Some(schema.into());
        self
    }

    pub fn with_to_code<F>(mut self, priority: f64, f: F) -> Self
    where
        F: Fn(&ConfigValue, &mut EmitContext) -> Result<()> + Send + Sync + 'static,
    {
        self.priority = priority;
        self.to_code = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("auto_load", &self.auto_load)
            .field("multi_conf", &self.multi_conf)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl ComponentDescriptor for Component {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn auto_load(&self) -> &[String] {
        &self.auto_load
    }

    fn conflicts_with(&self) -> &[String] {
        &self.conflicts_with
    }

    fn codeowners(&self) -> &[String] {
        &self.codeowners
    }

    fn multi_conf(&self) -> bool {
        self.multi_conf
    }

    fn is_platform_component(&self) -> bool {
        self.platform_component
    }

    fn supported_platforms(&self) -> Option<&[TargetPlatform]> {
        self.supported_platforms.as_deref()
    }

    fn config_schema(&self) -> Option<&Validator> {
        self.schema.as_ref()
    }

    fn final_validate_schema(&self) -> Option<&Validator> {
        self.final_validate.as_ref()
    }

    fn to_code_priority(&self) -> f64 {
        self.priority
    }

    fn to_code(&self, config: &ConfigValue, ctx: &mut EmitContext) -> Result<()> {
        match &self.to_code {
            Some(f) => f(config, ctx),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_trait_methods() {
        let c = Component::new("mcp23017")
            .with_dependencies(&["i2c"])
            .with_codeowners(&["@jesserockz"])
            .with_multi_conf()
            .with_to_code(priority::IO, |_, _| Ok(()));
        assert_eq!(c.name(), "mcp23017");
        assert_eq!(c.dependencies(), ["i2c".to_string()]);
        assert!(c.multi_conf());
        assert!(!c.is_platform_component());
        assert_eq!(c.to_code_priority(), priority::IO);
        assert!(c.supported_platforms().is_none());
    }

    #[test]
    fn defaults_have_no_schema_and_zero_priority() {
        let c = Component::new("sensor").as_platform_component();
        assert!(c.config_schema().is_none());
        assert!(c.is_platform_component());
        assert_eq!(c.to_code_priority(), priority::COMPONENT);
    }
}
