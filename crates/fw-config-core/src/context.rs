// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! State threaded through validation.
//!
//! A [`ValidationContext`] is created once per run and passed by `&mut` to every
//! validator. It knows the build target, tracks the absolute path currently
//! being validated, collects warnings and pin uses, and (only while the
//! final-validate pass runs) exposes the [`FullConfig`] view.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigPath, Invalid, PathSegment};
use crate::final_validate::FullConfig;
use crate::pins::{PinRegistry, PinUse};
use crate::registry::RegistrySet;

/// Microcontroller families the core can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPlatform {
    Esp32,
    Esp8266,
    Rp2040,
    Libretiny,
    Nrf52,
    Host,
}

impl TargetPlatform {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetPlatform::Esp32 => "esp32",
            TargetPlatform::Esp8266 => "esp8266",
            TargetPlatform::Rp2040 => "rp2040",
            TargetPlatform::Libretiny => "libretiny",
            TargetPlatform::Nrf52 => "nrf52",
            TargetPlatform::Host => "host",
        }
    }

    pub const ALL: [TargetPlatform; 6] = [
        TargetPlatform::Esp32,
        TargetPlatform::Esp8266,
        TargetPlatform::Rp2040,
        TargetPlatform::Libretiny,
        TargetPlatform::Nrf52,
        TargetPlatform::Host,
    ];
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TargetPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        TargetPlatform::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| {
                format!(
                    "Invalid target platform: {s}. Use one of esp32, esp8266, rp2040, libretiny, nrf52, host"
                )
            })
    }
}

/// ESP32 chip variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Esp32Variant {
    #[serde(rename = "esp32")]
    Esp32,
    #[serde(rename = "esp32-s2")]
    Esp32S2,
    #[serde(rename = "esp32-s3")]
    Esp32S3,
    #[serde(rename = "esp32-c3")]
    Esp32C3,
    #[serde(rename = "esp32-c6")]
    Esp32C6,
    #[serde(rename = "esp32-c2")]
    Esp32C2,
    #[serde(rename = "esp32-h2")]
    Esp32H2,
}

impl Esp32Variant {
    pub fn as_str(self) -> &'static str {
        match self {
            Esp32Variant::Esp32 => "esp32",
            Esp32Variant::Esp32S2 => "esp32-s2",
            Esp32Variant::Esp32S3 => "esp32-s3",
            Esp32Variant::Esp32C3 => "esp32-c3",
            Esp32Variant::Esp32C6 => "esp32-c6",
            Esp32Variant::Esp32C2 => "esp32-c2",
            Esp32Variant::Esp32H2 => "esp32-h2",
        }
    }

    pub const ALL: [Esp32Variant; 7] = [
        Esp32Variant::Esp32,
        Esp32Variant::Esp32S2,
        Esp32Variant::Esp32S3,
        Esp32Variant::Esp32C3,
        Esp32Variant::Esp32C6,
        Esp32Variant::Esp32C2,
        Esp32Variant::Esp32H2,
    ];
}

impl fmt::Display for Esp32Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Esp32Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.to_lowercase().replace('_', "-");
        let norm = if norm.starts_with("esp32") && !norm.contains('-') && norm.len() > 5 {
            format!("esp32-{}", &norm[5..])
        } else {
            norm
        };
        Esp32Variant::ALL
            .into_iter()
            .find(|v| v.as_str() == norm)
            .ok_or_else(|| format!("Unknown ESP32 variant: {s}"))
    }
}

/// Software framework the firmware is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framework {
    Arduino,
    EspIdf,
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framework::Arduino => write!(f, "arduino"),
            Framework::EspIdf => write!(f, "esp-idf"),
        }
    }
}

/// The build target a configuration is validated for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub platform: TargetPlatform,
    pub variant: Option<Esp32Variant>,
    pub framework: Option<Framework>,
    pub board: String,
    pub build_path: PathBuf,
}

impl Target {
    pub fn new(platform: TargetPlatform, board: impl Into<String>) -> Self {
        let variant = (platform == TargetPlatform::Esp32).then_some(Esp32Variant::Esp32);
        Self {
            platform,
            variant,
            framework: None,
            board: board.into(),
            build_path: PathBuf::from("build"),
        }
    }

    pub fn with_variant(mut self, variant: Esp32Variant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn with_framework(mut self, framework: Framework) -> Self {
        self.framework = Some(framework);
        self
    }

    pub fn with_build_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.build_path = path.into();
        self
    }
}

/// A non-fatal finding reported alongside a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub message: String,
    pub path: ConfigPath,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} @ {}", self.message, self.path)
        }
    }
}

/// A registry entry picked during validation, kept for its final validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryUse {
    pub registry: String,
    pub key: String,
    /// Path of the mapping that selected the entry.
    pub path: ConfigPath,
}

/// Snapshot of the side-effect logs, restored when an `Any` branch fails.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    pin_uses: usize,
    warnings: usize,
    registry_uses: usize,
}

/// Mutable state for one validation run.
#[derive(Debug)]
pub struct ValidationContext {
    target: Target,
    pin_registry: Arc<PinRegistry>,
    registries: Arc<RegistrySet>,
    loaded: BTreeSet<String>,
    check_pin_use: bool,
    path: Vec<PathSegment>,
    pin_uses: Vec<PinUse>,
    registry_uses: Vec<RegistryUse>,
    warnings: Vec<Warning>,
    full_config: Option<FullConfig>,
}

impl ValidationContext {
    pub fn new(target: Target) -> Self {
        Self::with_pin_registry(target, Arc::new(PinRegistry::default()))
    }

    pub fn with_pin_registry(target: Target, pin_registry: Arc<PinRegistry>) -> Self {
        Self {
            target,
            pin_registry,
            registries: Arc::new(RegistrySet::default()),
            loaded: BTreeSet::new(),
            check_pin_use: true,
            path: Vec::new(),
            pin_uses: Vec::new(),
            registry_uses: Vec::new(),
            warnings: Vec::new(),
            full_config: None,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn pin_registry(&self) -> Arc<PinRegistry> {
        Arc::clone(&self.pin_registry)
    }

    pub fn set_registries(&mut self, registries: Arc<RegistrySet>) {
        self.registries = registries;
    }

    pub fn registries(&self) -> Arc<RegistrySet> {
        Arc::clone(&self.registries)
    }

    pub fn set_check_pin_use(&mut self, enabled: bool) {
        self.check_pin_use = enabled;
    }

    pub fn check_pin_use(&self) -> bool {
        self.check_pin_use
    }

    /// Mark integrations as part of this build.
    pub fn set_loaded<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.loaded = names.into_iter().map(Into::into).collect();
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains(name)
    }

    pub fn loaded(&self) -> &BTreeSet<String> {
        &self.loaded
    }

    /// Absolute path of the value currently being validated.
    pub fn current_path(&self) -> ConfigPath {
        ConfigPath(self.path.clone())
    }

    /// Nearest enclosing mapping key, used to name the section in messages.
    pub fn parent_key(&self) -> Option<&str> {
        self.path.iter().rev().find_map(|s| match s {
            PathSegment::Key(k) => Some(k.as_str()),
            PathSegment::Index(_) => None,
        })
    }

    /// Run `f` with `seg` pushed onto the current path.
    pub fn descend<T>(&mut self, seg: impl Into<PathSegment>, f: impl FnOnce(&mut Self) -> T) -> T {
        self.path.push(seg.into());
        let out = f(self);
        self.path.pop();
        out
    }

    /// Run `f` with the current path replaced by `path`.
    pub fn at_path<T>(&mut self, path: &ConfigPath, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.path, path.0.clone());
        let out = f(self);
        self.path = saved;
        out
    }

    /// Record a warning. It is logged once the run commits it through
    /// [`Self::take_warnings`], so warnings of rolled back branches stay silent.
    pub fn warn(&mut self, message: impl Into<String>) {
        let path = self.current_path();
        self.warnings.push(Warning {
            message: message.into(),
            path,
        });
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        let warnings = std::mem::take(&mut self.warnings);
        for w in &warnings {
            warn!(path = %w.path, "{}", w.message);
        }
        warnings
    }

    pub fn record_pin_use(&mut self, owner: String, number: i64, allow_other_uses: bool) {
        let path = self.current_path();
        self.pin_uses.push(PinUse {
            owner,
            number,
            allow_other_uses,
            path,
        });
    }

    pub fn pin_uses(&self) -> &[PinUse] {
        &self.pin_uses
    }

    pub fn record_registry_use(&mut self, registry: &str, key: &str) {
        let path = self.current_path();
        self.registry_uses.push(RegistryUse {
            registry: registry.to_string(),
            key: key.to_string(),
            path,
        });
    }

    pub fn registry_uses(&self) -> &[RegistryUse] {
        &self.registry_uses
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pin_uses: self.pin_uses.len(),
            warnings: self.warnings.len(),
            registry_uses: self.registry_uses.len(),
        }
    }

    pub fn rollback(&mut self, cp: Checkpoint) {
        self.pin_uses.truncate(cp.pin_uses);
        self.warnings.truncate(cp.warnings);
        self.registry_uses.truncate(cp.registry_uses);
    }

    /// Install the full configuration view for the final-validate pass.
    pub fn begin_final_validate(&mut self, full: FullConfig) {
        self.full_config = Some(full);
    }

    pub fn end_final_validate(&mut self) -> Option<FullConfig> {
        self.full_config.take()
    }

    pub fn full_config(&self) -> Result<&FullConfig, Invalid> {
        self.full_config
            .as_ref()
            .ok_or_else(|| Invalid::new("full_config is only available during final validation"))
    }

    pub fn full_config_mut(&mut self) -> Result<&mut FullConfig, Invalid> {
        self.full_config
            .as_mut()
            .ok_or_else(|| Invalid::new("full_config is only available during final validation"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fw_logging::test_utils::BufferWriter;

    #[test]
    fn platform_and_variant_parse() {
        assert_eq!("ESP32".parse::<TargetPlatform>().unwrap(), TargetPlatform::Esp32);
        assert!("avr".parse::<TargetPlatform>().is_err());
        assert_eq!("esp32-s3".parse::<Esp32Variant>().unwrap(), Esp32Variant::Esp32S3);
        assert_eq!("ESP32C3".parse::<Esp32Variant>().unwrap(), Esp32Variant::Esp32C3);
        assert_eq!("esp32".parse::<Esp32Variant>().unwrap(), Esp32Variant::Esp32);
    }

    #[test]
    fn descend_tracks_path() {
        let mut ctx = ValidationContext::new(Target::new(TargetPlatform::Esp32, "esp32dev"));
        ctx.descend("sensor", |ctx| {
            ctx.descend(2usize, |ctx| {
                assert_eq!(ctx.current_path().to_string(), "sensor->2");
                assert_eq!(ctx.parent_key(), Some("sensor"));
                ctx.warn("careful");
            })
        });
        assert!(ctx.current_path().is_empty());
        assert_eq!(ctx.warnings()[0].to_string(), "careful @ sensor->2");
    }

    #[test]
    fn rollback_discards_side_effects() {
        let mut ctx = ValidationContext::new(Target::new(TargetPlatform::Esp8266, "d1_mini"));
        let cp = ctx.checkpoint();
        ctx.record_pin_use("esp8266".into(), 4, false);
        ctx.warn("w");
        ctx.rollback(cp);
        assert!(ctx.pin_uses().is_empty());
        assert!(ctx.warnings().is_empty());
    }

    #[test]
    fn only_committed_warnings_are_logged() {
        let buffer = BufferWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_ansi(false)
            .finish();
        let taken = tracing::subscriber::with_default(subscriber, || {
            let mut ctx = ValidationContext::new(Target::new(TargetPlatform::Esp32, "esp32dev"));
            let cp = ctx.checkpoint();
            ctx.warn("from a discarded branch");
            ctx.rollback(cp);
            ctx.descend("uart", |ctx| ctx.warn("kept"));
            ctx.take_warnings()
        });
        assert_eq!(taken.len(), 1);
        let output = buffer.contents();
        assert!(output.contains("kept"), "{output}");
        assert!(output.contains("path=uart"), "{output}");
        assert!(!output.contains("discarded"), "{output}");
    }

    #[test]
    fn full_config_outside_final_validate_fails() {
        let ctx = ValidationContext::new(Target::new(TargetPlatform::Host, "host"));
        let err = ctx.full_config().unwrap_err();
        assert!(err.message.contains("only available during final validation"));
    }
}
