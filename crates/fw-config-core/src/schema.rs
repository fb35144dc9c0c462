// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Mapping schemas.
//!
//! A [`Schema`] is an ordered list of key specs with their validators, an
//! extra-keys policy and post validators. Schemas are plain data: `extend`
//! returns a new tree and equality compares the trees.

use std::collections::BTreeMap;

use fw_codegen::CppType;

use crate::config_path;
use crate::context::ValidationContext;
use crate::error::{Invalid, MultipleInvalid};
use crate::primitives;
use crate::suggest::closest_match;
use crate::validators::{ValidationResult, Validator};
use crate::value::{ConfigMap, ConfigValue};

/// Name of the key `GenerateID` declares by default.
pub const CONF_ID: &str = "id";

#[derive(Debug, Clone, PartialEq)]
pub enum KeyKind {
    Required { msg: Option<String> },
    Optional { default: Option<ConfigValue> },
    Exclusive { group: String, msg: Option<String> },
    Inclusive { group: String, msg: Option<String> },
    /// Optional, but validated with `null` when absent so an ID is always minted.
    GenerateId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    name: String,
    kind: KeyKind,
}

impl Key {
    pub fn required(name: impl Into<String>) -> Self {
        Self::new(name, KeyKind::Required { msg: None })
    }

    pub fn required_msg(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(
            name,
            KeyKind::Required {
                msg: Some(msg.into()),
            },
        )
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self::new(name, KeyKind::Optional { default: None })
    }

    pub fn optional_default(name: impl Into<String>, default: impl Into<ConfigValue>) -> Self {
        Self::new(
            name,
            KeyKind::Optional {
                default: Some(default.into()),
            },
        )
    }

    pub fn exclusive(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self::new(
            name,
            KeyKind::Exclusive {
                group: group.into(),
                msg: None,
            },
        )
    }

    pub fn inclusive(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self::new(
            name,
            KeyKind::Inclusive {
                group: group.into(),
                msg: None,
            },
        )
    }

    pub fn generate_id() -> Self {
        Self::new(CONF_ID, KeyKind::GenerateId)
    }

    pub fn generate_id_named(name: impl Into<String>) -> Self {
        Self::new(name, KeyKind::GenerateId)
    }

    /// Attach a custom message to a required, exclusive or inclusive key.
    pub fn with_msg(mut self, message: impl Into<String>) -> Self {
        match &mut self.kind {
            KeyKind::Required { msg }
            | KeyKind::Exclusive { msg, .. }
            | KeyKind::Inclusive { msg, .. } => *msg = Some(message.into()),
            KeyKind::Optional { .. } | KeyKind::GenerateId => {}
        }
        self
    }

    fn new(name: impl Into<String>, kind: KeyKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &KeyKind {
        &self.kind
    }
}

/// What to do with keys the schema does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtraKeys {
    /// Reject, suggesting the closest declared key.
    #[default]
    PreventUnknown,
    Forbid,
    Allow,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    keys: Vec<(Key, Validator)>,
    extra: ExtraKeys,
    post: Vec<Validator>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a key spec.
    pub fn key(mut self, key: Key, validator: impl Into<Validator>) -> Self {
        let validator = validator.into();
        match self.keys.iter_mut().find(|(k, _)| k.name == key.name) {
            Some(slot) => *slot = (key, validator),
            None => self.keys.push((key, validator)),
        }
        self
    }

    pub fn required(self, name: &str, validator: impl Into<Validator>) -> Self {
        self.key(Key::required(name), validator)
    }

    pub fn optional(self, name: &str, validator: impl Into<Validator>) -> Self {
        self.key(Key::optional(name), validator)
    }

    pub fn optional_default(
        self,
        name: &str,
        default: impl Into<ConfigValue>,
        validator: impl Into<Validator>,
    ) -> Self {
        self.key(Key::optional_default(name, default), validator)
    }

    pub fn exclusive(self, name: &str, group: &str, validator: impl Into<Validator>) -> Self {
        self.key(Key::exclusive(name, group), validator)
    }

    pub fn inclusive(self, name: &str, group: &str, validator: impl Into<Validator>) -> Self {
        self.key(Key::inclusive(name, group), validator)
    }

    /// `GenerateID()` declaring `ty`.
    pub fn generate_id(self, ty: CppType) -> Self {
        self.key(Key::generate_id(), Validator::DeclareId(ty))
    }

    pub fn extra(mut self, extra: ExtraKeys) -> Self {
        self.extra = extra;
        self
    }

    pub fn post(mut self, validator: impl Into<Validator>) -> Self {
        self.post.push(validator.into());
        self
    }

    /// Union of key specs, `other` winning on collision; post validators concatenate.
    pub fn extend(mut self, other: Schema) -> Self {
        for (key, validator) in other.keys {
            self = self.key(key, validator);
        }
        self.post.extend(other.post);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter().map(|(k, _)| k)
    }

    pub fn validator(&self, name: &str) -> Option<&Validator> {
        self.keys
            .iter()
            .find(|(k, _)| k.name == name)
            .map(|(_, v)| v)
    }

    pub fn extra_keys(&self) -> ExtraKeys {
        self.extra
    }

    fn unknown_key(&self, key: &str, parent: Option<&str>) -> Invalid {
        let mut msg = match parent {
            Some(p) => format!("[{key}] is an invalid option for [{p}]."),
            None => format!("[{key}] is an invalid option."),
        };
        match closest_match(key, self.keys.iter().map(|(k, _)| k.name.as_str())) {
            Some(m) => msg.push_str(&format!(" Did you mean [{m}]?")),
            None => msg.push_str(" Please check the indentation."),
        }
        Invalid::at(msg, config_path![key])
    }

    pub fn validate(&self, value: &ConfigValue, ctx: &mut ValidationContext) -> ValidationResult {
        let input = match value {
            ConfigValue::Mapping(m) => m,
            other => {
                return Err(Invalid::new(format!("expected a dictionary, got {}", other.kind())).into())
            }
        };
        let mut errors: Vec<Invalid> = Vec::new();

        for k in input.keys() {
            if self.validator(k).is_some() {
                continue;
            }
            match self.extra {
                ExtraKeys::Allow => {}
                ExtraKeys::Forbid => {
                    errors.push(Invalid::at("extra keys not allowed", config_path![k]))
                }
                ExtraKeys::PreventUnknown => errors.push(self.unknown_key(k, ctx.parent_key())),
            }
        }

        let mut validated: Vec<(&str, ConfigValue)> = Vec::new();
        let mut defaults: Vec<(&str, ConfigValue)> = Vec::new();
        for (key, validator) in &self.keys {
            let name = key.name.as_str();
            let (raw, from_default) = match (input.get(name), &key.kind) {
                (Some(raw), _) => (raw.clone(), false),
                (None, KeyKind::Required { msg }) => {
                    let msg = msg.as_deref().unwrap_or("required key not provided");
                    errors.push(Invalid::at(msg, config_path![name]));
                    continue;
                }
                (None, KeyKind::Optional { default: Some(d) }) => (d.clone(), true),
                (None, KeyKind::GenerateId) => (ConfigValue::Null, true),
                (None, _) => continue,
            };
            match ctx.descend(name, |ctx| validator.validate(&raw, ctx)) {
                Ok(v) if from_default => defaults.push((name, v)),
                Ok(v) => validated.push((name, v)),
                Err(e) => errors.extend(e.prepend(&config_path![name]).into_errors()),
            }
        }

        errors.extend(self.check_groups(input));
        if !errors.is_empty() {
            return Err(MultipleInvalid::new(errors));
        }

        let mut out = ConfigMap::new();
        for (k, raw) in input.iter() {
            if let Some(pos) = validated.iter().position(|(n, _)| *n == k) {
                let (_, v) = validated.swap_remove(pos);
                out.insert(k, v);
            } else if self.extra == ExtraKeys::Allow {
                out.insert(k, raw.clone());
            }
        }
        for (k, v) in defaults {
            out.insert(k, v);
        }

        let mut result = ConfigValue::Mapping(out);
        for post in &self.post {
            result = post.validate(&result, ctx)?;
        }
        Ok(result)
    }

    fn check_groups(&self, input: &ConfigMap) -> Vec<Invalid> {
        // group -> (present keys, missing keys, custom message)
        let mut exclusive: BTreeMap<&str, (Vec<&str>, Option<&str>)> = BTreeMap::new();
        let mut inclusive: BTreeMap<&str, (Vec<&str>, Vec<&str>, Option<&str>)> = BTreeMap::new();
        for (key, _) in &self.keys {
            let present = input.contains_key(&key.name);
            match &key.kind {
                KeyKind::Exclusive { group, msg } => {
                    let entry = exclusive.entry(group.as_str()).or_default();
                    if present {
                        entry.0.push(&key.name);
                    }
                    if entry.1.is_none() {
                        entry.1 = msg.as_deref();
                    }
                }
                KeyKind::Inclusive { group, msg } => {
                    let entry = inclusive.entry(group.as_str()).or_default();
                    if present {
                        entry.0.push(&key.name);
                    } else {
                        entry.1.push(&key.name);
                    }
                    if entry.2.is_none() {
                        entry.2 = msg.as_deref();
                    }
                }
                _ => {}
            }
        }

        let mut errors = Vec::new();
        for (group, (present, msg)) in exclusive {
            if present.len() > 1 {
                let msg = msg.map(str::to_string).unwrap_or_else(|| {
                    format!("two or more values in the same group of exclusion '{group}'")
                });
                errors.push(Invalid::at(msg, config_path![present[1]]));
            }
        }
        for (group, (present, missing, msg)) in inclusive {
            if !present.is_empty() && !missing.is_empty() {
                let msg = msg.map(str::to_string).unwrap_or_else(|| {
                    format!("some but not all values in the same group of inclusion '{group}'")
                });
                errors.push(Invalid::at(msg, config_path![missing[0]]));
            }
        }
        errors
    }
}

/// Polymorphic schema selected by a discriminator key.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedSchema {
    key: String,
    types: Vec<(String, Schema)>,
    default_type: Option<String>,
    lower: bool,
}

impl TypedSchema {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = (S, Schema)>,
        S: Into<String>,
    {
        Self {
            key: "type".to_string(),
            types: types.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            default_type: None,
            lower: true,
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn default_type(mut self, ty: impl Into<String>) -> Self {
        self.default_type = Some(ty.into());
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.lower = false;
        self
    }

    pub fn validate(&self, value: &ConfigValue, ctx: &mut ValidationContext) -> ValidationResult {
        let map = value
            .as_mapping()
            .ok_or_else(|| Invalid::new(format!("expected a dictionary, got {}", value.kind())))?;
        let key = self.key.as_str();
        let raw = match map.get(key) {
            Some(v) => primitives::string(v).map_err(|e| e.prepend(&config_path![key]))?,
            None => self
                .default_type
                .clone()
                .ok_or_else(|| Invalid::at(format!("{key} not specified!"), config_path![key]))?,
        };
        let tag = if self.lower { raw.to_lowercase() } else { raw };
        let Some((name, schema)) = self.types.iter().find(|(t, _)| *t == tag) else {
            let names: Vec<&str> = self.types.iter().map(|(t, _)| t.as_str()).collect();
            let mut msg = format!(
                "Unknown {key} '{tag}', valid options are {}.",
                names.join(", ")
            );
            if let Some(m) = closest_match(&tag, names.iter().copied()) {
                msg.push_str(&format!(" Did you mean '{m}'?"));
            }
            return Err(Invalid::at(msg, config_path![key]).into());
        };
        let mut rest = map.clone();
        rest.remove(key);
        let mut out = schema.validate(&ConfigValue::Mapping(rest), ctx)?;
        if let Some(m) = out.as_mapping_mut() {
            m.insert_first(key, ConfigValue::String(name.clone()));
        }
        Ok(out)
    }
}
