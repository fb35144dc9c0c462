// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The `esphome:` section: device identity, project metadata, extra
//! libraries and platformio options, and boot automations.

use fw_codegen::{esphome_ns, known, Define, Expression, Library, OptionValue, Statement};
use fw_config_core::cv::{self, CONF_NAME};
use fw_config_core::{
    primitives, ConfigMap, ConfigValue, CustomValidator, Invalid, Key, Schema, ValidationContext, ValidationResult,
};
use regex::Regex;
use std::sync::OnceLock;

use crate::automation::{build_automation, validate_automation, TriggerArgs, CONF_TRIGGER_ID};
use crate::catalogue::Catalogue;
use crate::descriptor::{priority, Component};
use crate::emit::EmitContext;
use crate::error::Result;
use crate::orchestrator::{CONF_PLATFORM, CORE_COMPONENT};

pub const CONF_FRIENDLY_NAME: &str = "friendly_name";
pub const CONF_AREA: &str = "area";
pub const CONF_COMMENT: &str = "comment";
pub const CONF_NAME_ADD_MAC_SUFFIX: &str = "name_add_mac_suffix";
pub const CONF_BOARD: &str = "board";
pub const CONF_LIBRARIES: &str = "libraries";
pub const CONF_PLATFORMIO_OPTIONS: &str = "platformio_options";
pub const CONF_PROJECT: &str = "project";
pub const CONF_VERSION: &str = "version";
pub const CONF_ON_BOOT: &str = "on_boot";
pub const CONF_PRIORITY: &str = "priority";

fn project_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^.]+\.[^.]+$").expect("project name pattern is valid"))
}

fn matches_target_platform(value: &ConfigValue, ctx: &mut ValidationContext) -> ValidationResult {
    let platform = primitives::string(value)?.to_lowercase();
    let target = ctx.target().platform.as_str();
    if platform != target {
        return Err(Invalid::new(format!(
            "Platform '{platform}' does not match the target platform '{target}'"
        ))
        .into());
    }
    Ok(ConfigValue::String(platform))
}

fn matches_target_board(value: &ConfigValue, ctx: &mut ValidationContext) -> ValidationResult {
    let board = primitives::string(value)?;
    if board != ctx.target().board {
        return Err(Invalid::new(format!(
            "Board '{board}' does not match the target board '{}'",
            ctx.target().board
        ))
        .into());
    }
    Ok(ConfigValue::String(board))
}

fn project_name(value: &ConfigValue, _ctx: &mut ValidationContext) -> ValidationResult {
    let name = primitives::string(value)?;
    if !project_name_regex().is_match(&name) {
        return Err(Invalid::new("Project name needs to have a namespace separated by a '.', e.g. 'acme.bedroom'").into());
    }
    Ok(ConfigValue::String(name))
}

/// A mapping of option names to a string or a list of strings.
fn platformio_options(value: &ConfigValue, _ctx: &mut ValidationContext) -> ValidationResult {
    let map = value
        .as_mapping()
        .ok_or_else(|| Invalid::new(format!("expected a dictionary, got {}", value.kind())))?;
    let mut out = ConfigMap::new();
    for (key, option) in map.iter() {
        let option = match option {
            ConfigValue::Sequence(items) => ConfigValue::Sequence(
                items
                    .iter()
                    .map(|i| primitives::string(i).map(ConfigValue::String))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| e.prepend(&fw_config_core::config_path![key]))?,
            ),
            other => ConfigValue::String(
                primitives::string(other).map_err(|e| e.prepend(&fw_config_core::config_path![key]))?,
            ),
        };
        out.insert(key, option);
    }
    Ok(out.into())
}

fn startup_trigger() -> fw_codegen::CppType {
    esphome_ns().class_("StartupTrigger", &[&known::trigger(), &known::component()])
}

pub fn config_schema() -> Schema {
    Schema::new()
        .required(CONF_NAME, cv::valid_name())
        .optional(CONF_FRIENDLY_NAME, cv::string())
        .optional(CONF_AREA, cv::string())
        .optional(CONF_COMMENT, cv::string())
        .optional_default(CONF_NAME_ADD_MAC_SUFFIX, false, cv::boolean())
        .optional(CONF_PLATFORM, CustomValidator::new("target_platform", matches_target_platform))
        .optional(CONF_BOARD, CustomValidator::new("target_board", matches_target_board))
        .optional_default(CONF_LIBRARIES, ConfigValue::Sequence(Vec::new()), cv::ensure_list(cv::string_strict()))
        .optional(CONF_PLATFORMIO_OPTIONS, CustomValidator::new("platformio_options", platformio_options))
        .optional(
            CONF_PROJECT,
            Schema::new()
                .required(CONF_NAME, CustomValidator::new("project_name", project_name))
                .required(CONF_VERSION, cv::string_strict()),
        )
        .optional(
            CONF_ON_BOOT,
            validate_automation(
                Schema::new()
                    .key(Key::generate_id_named(CONF_TRIGGER_ID), cv::declare_id(startup_trigger()))
                    .optional_default(CONF_PRIORITY, 600.0, cv::float()),
            ),
        )
}

/// `name@version`, `owner/name@version`, or a repository URL.
fn parse_library(entry: &str) -> Library {
    if entry.contains("://") {
        let name = entry
            .trim_end_matches(".git")
            .rsplit('/')
            .next()
            .unwrap_or(entry)
            .to_string();
        return Library::new(name, None).with_repository(entry);
    }
    match entry.split_once('@') {
        Some((name, version)) => Library::new(name, Some(version)),
        None => Library::new(entry, None),
    }
}

fn str_of<'c>(config: &'c ConfigValue, key: &str) -> &'c str {
    config.get(key).and_then(ConfigValue::as_str).unwrap_or_default()
}

fn to_code(config: &ConfigValue, ctx: &mut EmitContext) -> Result<()> {
    ctx.add_global(Statement::Raw("using namespace esphome;".to_string()));

    let name = str_of(config, CONF_NAME);
    let friendly_name = str_of(config, CONF_FRIENDLY_NAME);
    let mac_suffix = config.get(CONF_NAME_ADD_MAC_SUFFIX).and_then(ConfigValue::as_bool).unwrap_or(false);
    ctx.add(known::app().method(
        "pre_setup",
        vec![
            Expression::string(name),
            Expression::string(friendly_name),
            Expression::string(str_of(config, CONF_AREA)),
            Expression::string(str_of(config, CONF_COMMENT)),
            Expression::raw("__DATE__ \", \" __TIME__"),
            Expression::bool(mac_suffix),
        ],
    ));

    let platform = ctx.target().platform.as_str().to_uppercase();
    ctx.add_define(Define::new(format!("USE_{platform}")))?;
    let board = ctx.target().board.clone();
    ctx.add_define(Define::with_value("ESPHOME_BOARD", format!("\"{board}\"")))?;
    if mac_suffix {
        ctx.add_define(Define::new("USE_DEVICE_NAME_MAC_SUFFIX"))?;
    }

    if let Some(project) = config.get(CONF_PROJECT) {
        ctx.add_define(Define::with_value(
            "ESPHOME_PROJECT_NAME",
            format!("\"{}\"", str_of(project, CONF_NAME)),
        ))?;
        ctx.add_define(Define::with_value(
            "ESPHOME_PROJECT_VERSION",
            format!("\"{}\"", str_of(project, CONF_VERSION)),
        ))?;
    }

    for library in config.get(CONF_LIBRARIES).and_then(ConfigValue::as_sequence).unwrap_or_default() {
        if let Some(entry) = library.as_str() {
            ctx.add_library(parse_library(entry))?;
        }
    }

    for automation in config.get(CONF_ON_BOOT).and_then(ConfigValue::as_sequence).unwrap_or_default() {
        let priority = automation.get(CONF_PRIORITY).and_then(ConfigValue::as_f64).unwrap_or(600.0);
        let id = automation.get(CONF_TRIGGER_ID).cloned().unwrap_or_default();
        let trigger = ctx.new_pvariable(&id, vec![Expression::float(priority)])?;
        ctx.register_component(&trigger, &ConfigValue::Null)?;
        build_automation(&trigger, &TriggerArgs::none(), automation, ctx)?;
    }

    // User options go in last so they can override anything a component set.
    if let Some(options) = config.get(CONF_PLATFORMIO_OPTIONS).and_then(ConfigValue::as_mapping) {
        let options: Vec<(String, OptionValue)> = options
            .iter()
            .map(|(key, value)| {
                let value = match value.as_sequence() {
                    Some(items) => {
                        OptionValue::List(items.iter().filter_map(ConfigValue::as_str).map(str::to_string).collect())
                    }
                    None => OptionValue::Single(value.as_str().unwrap_or_default().to_string()),
                };
                (key.to_string(), value)
            })
            .collect();
        ctx.defer(priority::FINAL, Vec::new(), move |ctx| {
            for (key, value) in options {
                ctx.add_platformio_option(&key, value)?;
            }
            Ok(())
        });
    }
    Ok(())
}

pub fn register(catalogue: &mut Catalogue) -> fw_config_core::Result<()> {
    catalogue.automations_mut().register_trigger("on_boot", startup_trigger())?;
    catalogue.register(
        Component::new(CORE_COMPONENT)
            .with_codeowners(&["@esphome/core"])
            .with_schema(config_schema())
            .with_to_code(priority::CORE, to_code),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_specs() {
        assert_eq!(parse_library("ArduinoJson@6.18.5").as_lib_dep(), "ArduinoJson@6.18.5");
        assert_eq!(parse_library("bblanchon/ArduinoJson").as_lib_dep(), "bblanchon/ArduinoJson");
        assert_eq!(
            parse_library("https://github.com/esphome/Improv.git").as_lib_dep(),
            "Improv=https://github.com/esphome/Improv.git"
        );
    }

    #[test]
    fn project_names_need_a_namespace() {
        assert!(project_name_regex().is_match("acme.bedroom"));
        assert!(!project_name_regex().is_match("bedroom"));
    }
}
