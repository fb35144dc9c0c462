// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Component catalogue, validation pipeline and code emission.
//!
//! A [`Catalogue`] holds the [`ComponentDescriptor`]s known to a run. The
//! [`Orchestrator`] takes a loaded configuration through package merging,
//! component discovery, dependency ordering, per-section validation, ID
//! resolution and final validation, and then lowers every section into a
//! [`fw_codegen::CodegenModel`] through the priority [`Scheduler`].

pub mod automation;
pub mod catalogue;
pub mod components;
pub mod descriptor;
pub mod emit;
pub mod error;
pub mod orchestrator;
pub mod scheduler;
pub mod settings;

pub use automation::{build_automation, build_triggers, validate_automation, Automations, TriggerArgs};
pub use catalogue::Catalogue;
pub use descriptor::{priority, Component, ComponentDescriptor};
pub use emit::EmitContext;
pub use error::{CoreError, Result};
pub use orchestrator::{Orchestrator, PlanEntry, ValidatedConfig, CONF_PLATFORM, CORE_COMPONENT};
pub use scheduler::{Job, Scheduler};
pub use settings::{ResolvedSettings, Scope, SettingsSources, ToolSettings};
