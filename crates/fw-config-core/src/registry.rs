// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Named registries of schema entries.
//!
//! A [`Registry`] is filled while descriptors are loaded and never shrinks.
//! Validators refer to registries by name through the [`RegistrySet`] carried
//! in the [`ValidationContext`], which lets an entry's schema recurse into its
//! own registry (an `and:` condition holding more conditions).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use fw_codegen::CppType;
use tracing::trace;

use crate::config_path;
use crate::context::ValidationContext;
use crate::error::{ConfigError, Invalid, Result};
use crate::suggest::closest_match;
use crate::validators::{ValidationResult, Validator};
use crate::value::{ConfigMap, ConfigValue};

/// Key under which registry items declare the ID of the object they build.
pub const CONF_TYPE_ID: &str = "type_id";

/// One registered entry; `B` is whatever the emitter needs to build it.
#[derive(Clone)]
pub struct RegistryEntry<B> {
    pub key: String,
    pub schema: Validator,
    pub type_token: Option<CppType>,
    pub builder: Option<B>,
    pub final_validator: Option<Validator>,
}

impl<B> RegistryEntry<B> {
    pub fn new(key: impl Into<String>, schema: impl Into<Validator>) -> Self {
        Self {
            key: key.into().to_lowercase(),
            schema: schema.into(),
            type_token: None,
            builder: None,
            final_validator: None,
        }
    }

    pub fn with_type(mut self, ty: CppType) -> Self {
        self.type_token = Some(ty);
        self
    }

    pub fn with_builder(mut self, builder: B) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn with_final_validator(mut self, validator: impl Into<Validator>) -> Self {
        self.final_validator = Some(validator.into());
        self
    }
}

/// An append-only, ordered registry.
#[derive(Clone)]
pub struct Registry<B = ()> {
    name: String,
    entries: Vec<RegistryEntry<B>>,
}

impl<B> Registry<B> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plain registration: a key and the schema for its value.
    pub fn register(&mut self, key: &str, schema: impl Into<Validator>) -> Result<()> {
        self.register_entry(RegistryEntry::new(key, schema))
    }

    pub fn register_entry(&mut self, entry: RegistryEntry<B>) -> Result<()> {
        if self.get(&entry.key).is_some() {
            return Err(ConfigError::DuplicateRegistration {
                registry: self.name.clone(),
                key: entry.key,
            });
        }
        trace!(registry = %self.name, key = %entry.key, "Registered entry");
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&RegistryEntry<B>> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry<B>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<B> fmt::Debug for Registry<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("keys", &self.entries.iter().map(|e| &e.key).collect::<Vec<_>>())
            .finish()
    }
}

/// The validation-side view of a registry, independent of its builder type.
pub trait SchemaRegistry: Send + Sync {
    fn registry_name(&self) -> &str;
    fn entry_schema(&self, key: &str) -> Option<&Validator>;
    fn entry_type(&self, key: &str) -> Option<&CppType>;
    fn entry_final_validator(&self, key: &str) -> Option<&Validator>;
    fn keys(&self) -> Vec<&str>;
}

impl<B: Send + Sync> SchemaRegistry for Registry<B> {
    fn registry_name(&self) -> &str {
        &self.name
    }

    fn entry_schema(&self, key: &str) -> Option<&Validator> {
        self.get(key).map(|e| &e.schema)
    }

    fn entry_type(&self, key: &str) -> Option<&CppType> {
        self.get(key).and_then(|e| e.type_token.as_ref())
    }

    fn entry_final_validator(&self, key: &str) -> Option<&Validator> {
        self.get(key).and_then(|e| e.final_validator.as_ref())
    }

    fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.key.as_str()).collect()
    }
}

/// All registries visible to validators, by name.
#[derive(Clone, Default)]
pub struct RegistrySet {
    registries: BTreeMap<String, Arc<dyn SchemaRegistry>>,
}

impl RegistrySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, registry: Arc<dyn SchemaRegistry>) {
        self.registries
            .insert(registry.registry_name().to_string(), registry);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SchemaRegistry>> {
        self.registries.get(name).cloned()
    }
}

impl fmt::Debug for RegistrySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.registries.keys()).finish()
    }
}

/// Validate a shorthand key or a single-key mapping against the named registry.
pub fn validate_registry_entry(
    name: &str,
    declare_type_id: bool,
    value: &ConfigValue,
    ctx: &mut ValidationContext,
) -> ValidationResult {
    let registry = ctx
        .registries()
        .get(name)
        .ok_or_else(|| Invalid::new(format!("Unknown registry '{name}'")))?;
    let map = match value {
        ConfigValue::String(s) => [(s.clone(), ConfigValue::Null)].into_iter().collect(),
        ConfigValue::Mapping(m) => m.clone(),
        other => {
            return Err(Invalid::new(format!(
                "{} must consist of key-value mapping! Got {other}",
                capitalize(name)
            ))
            .into())
        }
    };
    let ignored = |k: &str| declare_type_id && k == CONF_TYPE_ID;
    let keys: Vec<&str> = map.keys().filter(|k| !ignored(*k)).collect();
    let Some(key) = keys.first().copied() else {
        return Err(Invalid::new(format!("Key missing from {name}! Got {value}")).into());
    };
    let Some(schema) = registry.entry_schema(key) else {
        let mut msg = format!("Unable to find {name} with the name '{key}', is the component loaded?");
        if let Some(m) = closest_match(key, registry.keys()) {
            msg.push_str(&format!(" Did you mean '{m}'?"));
        }
        return Err(Invalid::at(msg, config_path![key]).into());
    };
    if let Some(other) = keys.get(1) {
        return Err(Invalid::new(format!(
            "Cannot have two {name}s in one item. Key '{key}' overrides '{other}'! Did you forget to indent the block inside the {key}?"
        ))
        .into());
    }

    let inner = match map.get(key) {
        Some(ConfigValue::Null) | None => ConfigValue::Mapping(ConfigMap::new()),
        Some(v) => v.clone(),
    };
    let validated = ctx
        .descend(key, |ctx| schema.validate(&inner, ctx))
        .map_err(|e| e.prepend(&config_path![key]))?;
    ctx.record_registry_use(name, key);

    let mut out = ConfigMap::new();
    out.insert(key, validated);
    if declare_type_id {
        if let Some(ty) = registry.entry_type(key) {
            let raw = map.get(CONF_TYPE_ID).cloned().unwrap_or_default();
            let id = ctx
                .descend(CONF_TYPE_ID, |ctx| Validator::DeclareId(ty.clone()).validate(&raw, ctx))
                .map_err(|e| e.prepend(&config_path![CONF_TYPE_ID]))?;
            out.insert(CONF_TYPE_ID, id);
        }
    }
    Ok(ConfigValue::Mapping(out))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Target, TargetPlatform};
    use crate::schema::Schema;

    fn ctx_with(registry: Registry) -> ValidationContext {
        let mut set = RegistrySet::new();
        set.insert(Arc::new(registry));
        let mut ctx = ValidationContext::new(Target::new(TargetPlatform::Esp32, "esp32dev"));
        ctx.set_registries(Arc::new(set));
        ctx
    }

    fn filters() -> Registry {
        let mut r = Registry::new("filter");
        r.register("multiply", Validator::Float).unwrap();
        r.register("offset", Validator::Float).unwrap();
        r.register("debounce", Schema::new().optional("delay", Validator::Int))
            .unwrap();
        r
    }

    #[test]
    fn registration_is_append_only() {
        let mut r = filters();
        let err = r.register("offset", Validator::Int).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateRegistration { .. }));
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn shorthand_and_mapping_forms() {
        let mut ctx = ctx_with(filters());
        let out = validate_registry_entry("filter", false, &"debounce".into(), &mut ctx).unwrap();
        assert_eq!(out.get("debounce"), Some(&ConfigValue::Mapping(ConfigMap::new())));
        let m: ConfigMap = [("multiply", ConfigValue::from("2"))].into_iter().collect();
        let out = validate_registry_entry("filter", false, &m.into(), &mut ctx).unwrap();
        assert_eq!(out.get("multiply"), Some(&ConfigValue::Float(2.0)));
        assert_eq!(ctx.registry_uses().len(), 2);
    }

    #[test]
    fn rejects_unknown_and_doubled_keys() {
        let mut ctx = ctx_with(filters());
        let err = validate_registry_entry("filter", false, &"ofset".into(), &mut ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to find filter with the name 'ofset', is the component loaded? Did you mean 'offset'? @ ofset"
        );
        let m: ConfigMap = [("multiply", ConfigValue::Int(2)), ("offset", ConfigValue::Int(1))]
            .into_iter()
            .collect();
        let err = validate_registry_entry("filter", false, &m.into(), &mut ctx).unwrap_err();
        assert!(err.to_string().starts_with("Cannot have two filters in one item."));
    }
}
