// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Settings of the tool itself, as opposed to the device configuration it
//! validates.
//!
//! Precedence order: defaults < settings file (`fwcfg.toml`) < `FWCFG_*`
//! environment < `--set key=value` flags. Each layer is checked against the
//! JSON schema of [`ToolSettings`] before merging, and the winning layer of
//! every key is kept in a [`Provenance`] map.

pub mod layers;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use fw_config_core::{Esp32Variant, Framework, Target, TargetPlatform};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as J;
use tracing::debug;

use crate::error::{CoreError, Result};

pub const DEFAULT_SETTINGS_FILE: &str = "fwcfg.toml";

/// Where a settings value came from.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    Defaults,
    File,
    Env,
    Flags,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Scope::Defaults => "defaults",
            Scope::File => "file",
            Scope::Env => "env",
            Scope::Flags => "flags",
        };
        f.write_str(s)
    }
}

/// Dotted key to the layer that supplied its final value.
pub type Provenance = BTreeMap<String, Scope>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ToolSettings {
    /// Microcontroller family to validate for.
    #[schemars(with = "String")]
    pub target_platform: TargetPlatform,
    /// ESP32 chip variant; only meaningful for `esp32`.
    #[schemars(with = "Option<String>")]
    pub variant: Option<Esp32Variant>,
    #[schemars(with = "Option<String>")]
    pub framework: Option<Framework>,
    pub board: String,
    pub build_path: PathBuf,
    /// Reject pins used by more than one component.
    pub check_pin_use: bool,
    /// Print auto-loaded sections in the validated configuration.
    pub include_auto_loaded: bool,
    pub log_level: Option<String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            target_platform: TargetPlatform::Esp32,
            variant: None,
            framework: None,
            board: "esp32dev".to_string(),
            build_path: PathBuf::from("build"),
            check_pin_use: true,
            include_auto_loaded: true,
            log_level: None,
        }
    }
}

impl ToolSettings {
    /// The build target these settings describe.
    pub fn target(&self) -> Result<Target> {
        let mut target = Target::new(self.target_platform, &self.board).with_build_path(&self.build_path);
        if let Some(variant) = self.variant {
            if self.target_platform != TargetPlatform::Esp32 {
                return Err(CoreError::Settings(format!(
                    "variant '{variant}' is only valid for the esp32 platform, not {}",
                    self.target_platform
                )));
            }
            target = target.with_variant(variant);
        }
        if let Some(framework) = self.framework {
            target = target.with_framework(framework);
        }
        Ok(target)
    }
}

/// Inputs for [`load`].
#[derive(Debug, Clone, Default)]
pub struct SettingsSources {
    /// Read when present; a missing default file is not an error.
    pub file: Option<PathBuf>,
    /// Replaces the process environment, mostly for tests.
    pub env: Option<HashMap<String, String>>,
    pub flags: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub settings: ToolSettings,
    pub json: J,
    pub provenance: Provenance,
}

/// Merge every layer and extract the typed settings.
pub fn load(sources: &SettingsSources) -> anyhow::Result<ResolvedSettings> {
    let defaults = serde_json::to_value(ToolSettings::default())?;
    let mut json = defaults.clone();
    let mut provenance = Provenance::new();
    layers::record_provenance(&defaults, Scope::Defaults, &mut provenance, "");

    let file = match &sources.file {
        Some(path) => Some(layers::read_file_layer(path)?),
        None => {
            let path = PathBuf::from(DEFAULT_SETTINGS_FILE);
            if path.exists() {
                Some(layers::read_file_layer(&path)?)
            } else {
                None
            }
        }
    };
    let env = layers::env_overlay(sources.env.clone())?;
    let flags = layers::flags_overlay(&sources.flags)?;

    for (layer, scope) in [(file, Scope::File), (Some(env), Scope::Env), (Some(flags), Scope::Flags)] {
        let Some(layer) = layer else {
            continue;
        };
        layers::record_provenance(&layer, scope, &mut provenance, "");
        layers::merge_two_json(&mut json, layer);
    }

    let settings: ToolSettings = serde_path_to_error::deserialize(json.clone())
        .map_err(|e| anyhow::anyhow!("Invalid settings at '{}': {}", e.path(), e.inner()))?;
    debug!(?settings, "Resolved tool settings");
    Ok(ResolvedSettings {
        settings,
        json,
        provenance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_target_a_classic_esp32() {
        let target = ToolSettings::default().target().unwrap();
        assert_eq!(target.platform, TargetPlatform::Esp32);
        assert_eq!(target.variant, Some(Esp32Variant::Esp32));
        assert_eq!(target.board, "esp32dev");
    }

    #[test]
    fn variant_needs_esp32() {
        let settings = ToolSettings {
            target_platform: TargetPlatform::Esp8266,
            variant: Some(Esp32Variant::Esp32S3),
            ..ToolSettings::default()
        };
        let err = settings.target().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid tool settings: variant 'esp32-s3' is only valid for the esp32 platform, not esp8266"
        );
    }

    #[test]
    fn bad_values_name_their_key() {
        let sources = SettingsSources {
            env: Some(HashMap::new()),
            flags: vec![("target-platform".into(), "esp33".into())],
            ..SettingsSources::default()
        };
        let err = load(&sources).unwrap_err();
        assert!(err.to_string().starts_with("Invalid settings at 'target-platform'"), "{err}");
    }
}
