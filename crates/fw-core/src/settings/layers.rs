// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Reading, checking and merging individual settings layers.
//!
//! Every layer is a `serde_json::Value` object so that merging and provenance
//! stay independent of the typed [`ToolSettings`](super::ToolSettings) view.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use jsonschema::{Draft, JSONSchema};
use serde_json::Value as J;

use super::{Provenance, Scope, ToolSettings};

pub const ENV_PREFIX: &str = "FWCFG";

/// Parse a TOML document into JSON.
pub fn parse_toml(text: &str) -> Result<J> {
    let value: toml::Value = text.parse()?;
    Ok(serde_json::to_value(value)?)
}

/// Check a layer against the schema generated from [`ToolSettings`].
pub fn validate_layer(layer: &J) -> Result<()> {
    let schema = serde_json::to_value(schemars::schema_for!(ToolSettings))?;
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft202012)
        .compile(&schema)
        .map_err(|e| anyhow!("settings schema does not compile: {e}"))?;
    if let Err(errors) = compiled.validate(layer) {
        let errors = errors
            .map(|e| match e.instance_path.to_string() {
                path if path.is_empty() => e.to_string(),
                path => format!("{path}: {e}"),
            })
            .collect::<Vec<_>>()
            .join("\n  - ");
        bail!("Settings schema validation failed:\n  - {errors}");
    }
    Ok(())
}

/// Read and check the settings file.
pub fn read_file_layer(path: &Path) -> Result<J> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading settings file {}", path.display()))?;
    let layer = parse_toml(&text).with_context(|| format!("parsing settings file {}", path.display()))?;
    validate_layer(&layer).with_context(|| format!("checking settings file {}", path.display()))?;
    Ok(layer)
}

/// `FWCFG_*` variables; `FWCFG_CHECK_PIN_USE` becomes `check-pin-use`.
///
/// `vars` replaces the process environment when given.
pub fn env_overlay(vars: Option<HashMap<String, String>>) -> Result<J> {
    let built = config::Config::builder()
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .convert_case(config::Case::Kebab)
                .try_parsing(true)
                .source(vars),
        )
        .build()?;
    let layer = serde_json::to_value(built.try_deserialize::<serde_json::Map<String, J>>()?)?;
    validate_layer(&layer).context("checking FWCFG_* environment variables")?;
    Ok(layer)
}

/// `key=value` overrides. Values that parse as JSON scalars keep their type.
pub fn flags_overlay(pairs: &[(String, String)]) -> Result<J> {
    let mut root = J::Object(Default::default());
    for (key, raw) in pairs {
        let value = match serde_json::from_str::<J>(raw) {
            Ok(v) if !v.is_object() && !v.is_array() => v,
            _ => J::String(raw.clone()),
        };
        insert_dotted(&mut root, key, value);
    }
    validate_layer(&root).context("checking --set overrides")?;
    Ok(root)
}

/// Split a `key=value` flag.
pub fn parse_flag(flag: &str) -> Result<(String, String)> {
    match flag.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => bail!("expected key=value, got '{flag}'"),
    }
}

/// Objects merge recursively; scalars and arrays from `layer` replace `base`.
pub fn merge_two_json(base: &mut J, layer: J) {
    match (base, layer) {
        (J::Object(a), J::Object(b)) => {
            for (k, v) in b {
                merge_two_json(a.entry(k).or_insert(J::Null), v);
            }
        }
        (_, J::Null) => {}
        (a, b) => *a = b,
    }
}

pub fn insert_dotted(root: &mut J, dotted: &str, value: J) {
    let mut cur = root;
    let mut parts = dotted.split('.').peekable();
    while let Some(part) = parts.next() {
        if !cur.is_object() {
            *cur = J::Object(Default::default());
        }
        let J::Object(map) = cur else {
            return;
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }
        cur = map
            .entry(part.to_string())
            .or_insert_with(|| J::Object(Default::default()));
    }
}

/// Record `scope` as the source of every leaf in `layer`.
pub fn record_provenance(layer: &J, scope: Scope, out: &mut Provenance, prefix: &str) {
    match layer {
        J::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                record_provenance(v, scope, out, &key);
            }
        }
        J::Null => {}
        _ => {
            out.insert(prefix.to_string(), scope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_objects_merge_and_scalars_replace() {
        let mut base = json!({"board": "esp32dev", "check-pin-use": true});
        merge_two_json(&mut base, json!({"board": "nodemcuv2", "log-level": null}));
        assert_eq!(base, json!({"board": "nodemcuv2", "check-pin-use": true}));
    }

    #[test]
    fn dotted_keys_create_objects() {
        let mut root = json!({});
        insert_dotted(&mut root, "a.b.c", json!(1));
        insert_dotted(&mut root, "a.d", json!("x"));
        assert_eq!(root, json!({"a": {"b": {"c": 1}, "d": "x"}}));
    }

    #[test]
    fn flag_values_keep_scalar_types() {
        let layer = flags_overlay(&[
            ("check-pin-use".into(), "false".into()),
            ("board".into(), "d1_mini".into()),
        ])
        .unwrap();
        assert_eq!(layer, json!({"check-pin-use": false, "board": "d1_mini"}));
    }

    #[test]
    fn flags_need_an_equals_sign() {
        assert_eq!(parse_flag("board=esp32dev").unwrap(), ("board".into(), "esp32dev".into()));
        assert!(parse_flag("board").is_err());
        assert!(parse_flag("=x").is_err());
    }

    #[test]
    fn environment_names_become_kebab_keys() {
        let vars = HashMap::from([
            ("FWCFG_CHECK_PIN_USE".to_string(), "false".to_string()),
            ("FWCFG_BOARD".to_string(), "esp32-s3-devkitc-1".to_string()),
            ("OTHER_BOARD".to_string(), "ignored".to_string()),
        ]);
        let layer = env_overlay(Some(vars)).unwrap();
        assert_eq!(layer, json!({"check-pin-use": false, "board": "esp32-s3-devkitc-1"}));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = validate_layer(&json!({"bord": "esp32dev"})).unwrap_err();
        assert!(err.to_string().starts_with("Settings schema validation failed"));
    }
}
