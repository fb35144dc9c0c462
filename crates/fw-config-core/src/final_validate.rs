// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The view of the whole validated configuration used by the second pass.

use std::collections::BTreeMap;

use crate::context::ValidationContext;
use crate::error::{ConfigPath, Invalid, MultipleInvalid};
use crate::ids::IdTable;
use crate::validators::{ValidationResult, Validator};
use crate::value::ConfigValue;

/// Installed in the [`ValidationContext`] only while final validators run.
#[derive(Debug, Clone, Default)]
pub struct FullConfig {
    config: ConfigValue,
    ids: IdTable,
    data: BTreeMap<String, ConfigValue>,
}

impl FullConfig {
    pub fn new(config: ConfigValue, ids: IdTable) -> Self {
        Self {
            config,
            ids,
            data: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &ConfigValue {
        &self.config
    }

    pub fn ids(&self) -> &IdTable {
        &self.ids
    }

    /// Path at which `id` was declared.
    pub fn get_path_for_id(&self, id: &str) -> Result<&ConfigPath, Invalid> {
        self.ids
            .path_for(id)
            .ok_or_else(|| Invalid::new(format!("Couldn't find ID '{id}'")))
    }

    pub fn get_config_for_path(&self, path: &ConfigPath) -> Option<&ConfigValue> {
        self.config.get_path(path)
    }

    /// Scratch state a component keeps across its final validators.
    pub fn data(&self, component: &str) -> Option<&ConfigValue> {
        self.data.get(component)
    }

    pub fn data_mut(&mut self, component: &str) -> &mut ConfigValue {
        self.data.entry(component.to_string()).or_default()
    }

    pub fn into_parts(self) -> (ConfigValue, IdTable) {
        (self.config, self.ids)
    }
}

/// Apply `inner` to the mapping that declares the referenced ID.
///
/// Failures are reported at the reference and name the declaration site.
pub fn id_declaration_match(
    inner: &Validator,
    value: &ConfigValue,
    ctx: &mut ValidationContext,
) -> ValidationResult {
    let name = match value {
        ConfigValue::Id(id) => id.name().map(str::to_string),
        ConfigValue::String(s) => Some(s.clone()),
        _ => None,
    }
    .ok_or_else(|| Invalid::new("Expected an ID reference"))?;

    let (declaration_path, fragment) = {
        let full = ctx.full_config()?;
        let id_path = full.get_path_for_id(&name)?;
        let path = id_path.parent().unwrap_or_default();
        let fragment = full.get_config_for_path(&path).cloned().unwrap_or_default();
        (path, fragment)
    };

    ctx.at_path(&declaration_path, |ctx| inner.validate(&fragment, ctx))
        .map_err(|e| {
            let errors = e
                .into_errors()
                .into_iter()
                .map(|err| {
                    let at = ConfigPath(
                        declaration_path
                            .segments()
                            .iter()
                            .chain(err.path.segments())
                            .cloned()
                            .collect(),
                    );
                    Invalid::new(format!(
                        "{} (in the declaration of '{name}' at {at})",
                        err.message
                    ))
                })
                .collect();
            MultipleInvalid::new(errors)
        })?;
    Ok(value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Target, TargetPlatform};
    use crate::ids::resolve_ids;
    use crate::schema::Schema;
    use crate::value::ConfigMap;
    use crate::config_path;
    use fw_codegen::esphome_ns;

    fn uart_config(with_tx: bool) -> ConfigValue {
        let ty = esphome_ns().namespace("uart").class_("UARTComponent", &[]);
        let mut bus = ConfigMap::new();
        bus.insert("id", ConfigValue::Id(crate::ids::Id::declaration(Some("bus".into()), ty)));
        bus.insert("baud_rate", ConfigValue::Int(9600));
        if with_tx {
            bus.insert("tx_pin", ConfigValue::Int(1));
        }
        let mut root = ConfigMap::new();
        root.insert("uart", ConfigValue::Sequence(vec![bus.into()]));
        root.into()
    }

    fn requires_tx() -> Validator {
        Validator::IdDeclarationMatch(Box::new(
            Schema::new()
                .required("tx_pin", Validator::Valid)
                .extra(crate::schema::ExtraKeys::Allow)
                .into(),
        ))
    }

    fn final_ctx(with_tx: bool) -> ValidationContext {
        let mut config = uart_config(with_tx);
        let ids = resolve_ids(&mut config).unwrap();
        let mut ctx = ValidationContext::new(Target::new(TargetPlatform::Esp32, "esp32dev"));
        ctx.begin_final_validate(FullConfig::new(config, ids));
        ctx
    }

    #[test]
    fn exposes_paths_and_fragments() {
        let ctx = final_ctx(true);
        let full = ctx.full_config().unwrap();
        let path = full.get_path_for_id("bus").unwrap();
        assert_eq!(path, &config_path!["uart", 0usize, "id"]);
        let bus = full.get_config_for_path(&path.parent().unwrap()).unwrap();
        assert_eq!(bus.get("baud_rate"), Some(&ConfigValue::Int(9600)));
    }

    #[test]
    fn declaration_match_checks_declaring_fragment() {
        let mut ctx = final_ctx(true);
        assert!(requires_tx().validate(&"bus".into(), &mut ctx).is_ok());

        let mut ctx = final_ctx(false);
        let err = requires_tx().validate(&"bus".into(), &mut ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "required key not provided (in the declaration of 'bus' at uart->0->tx_pin)"
        );
    }

    #[test]
    fn scratch_data_is_per_component() {
        let mut ctx = final_ctx(true);
        *ctx.full_config_mut().unwrap().data_mut("uart") = ConfigValue::Int(1);
        let full = ctx.end_final_validate().unwrap();
        assert_eq!(full.data("uart"), Some(&ConfigValue::Int(1)));
        assert!(full.data("i2c").is_none());
    }

    #[test]
    fn unavailable_outside_final_pass() {
        let mut ctx = ValidationContext::new(Target::new(TargetPlatform::Esp32, "esp32dev"));
        assert!(requires_tx().validate(&"bus".into(), &mut ctx).is_err());
    }
}
