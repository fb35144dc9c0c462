// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The validation pipeline and the emission driver.
//!
//! [`Orchestrator::validate`] expands packages, discovers the components a
//! configuration needs, orders them by dependency and validates every section
//! before resolving IDs and running the final validators. Any error aborts the
//! run with every collected [`Invalid`], grouped by top-level section.
//! [`Orchestrator::emit`] then schedules one job per validated fragment.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use fw_codegen::CodegenModel;
use fw_config_core::{
    check_pin_uses, closest_match, config_path, do_packages_pass, load_yaml_file, resolve_ids, strip_default_ids,
    ConfigMap, ConfigPath, ConfigValue, FullConfig, IdTable, Invalid, LocalCheckouts, MergeTrace, MultipleInvalid,
    PackageSource, Target, ValidationContext, Validator, Warning,
};
use tracing::{debug, info};

use crate::catalogue::Catalogue;
use crate::descriptor::ComponentDescriptor;
use crate::emit::EmitContext;
use crate::error::{CoreError, Result};
use crate::scheduler::{announced_ids, Job, Scheduler};

/// The component every configuration must carry when the catalogue knows it.
pub const CORE_COMPONENT: &str = "esphome";
pub const CONF_PLATFORM: &str = "platform";

/// One fragment to lower, and the descriptor that lowers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub component: String,
    pub path: ConfigPath,
}

/// The outcome of a successful validation run.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub config: ConfigValue,
    pub warnings: Vec<Warning>,
    pub ids: IdTable,
    pub codeowners: BTreeMap<String, Vec<String>>,
    /// Loaded components in dependency order.
    pub order: Vec<String>,
    pub auto_loaded: Vec<String>,
    pub trace: MergeTrace,
    pub plan: Vec<PlanEntry>,
}

impl ValidatedConfig {
    /// The configuration as shown to users, without generated IDs.
    pub fn printable(&self, include_auto_loaded: bool) -> ConfigValue {
        let mut out = strip_default_ids(&self.config);
        if !include_auto_loaded {
            if let ConfigValue::Mapping(map) = &mut out {
                for name in &self.auto_loaded {
                    map.remove(name);
                }
            }
        }
        out
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

type Needs<'n> = BTreeMap<&'n str, Vec<&'n str>>;

fn find_cycle<'n>(
    node: &'n str,
    needs: &Needs<'n>,
    marks: &mut BTreeMap<&'n str, Mark>,
    stack: &mut Vec<&'n str>,
) -> Option<Vec<String>> {
    match marks.get(node) {
        Some(Mark::Done) => return None,
        Some(Mark::Active) => {
            let start = stack.iter().position(|n| *n == node)?;
            let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        None => {}
    }
    marks.insert(node, Mark::Active);
    stack.push(node);
    for next in needs.get(node).into_iter().flatten() {
        if let Some(cycle) = find_cycle(*next, needs, marks, stack) {
            return Some(cycle);
        }
    }
    stack.pop();
    marks.insert(node, Mark::Done);
    None
}

fn empty_section(descriptor: &dyn ComponentDescriptor) -> ConfigValue {
    if descriptor.is_platform_component() {
        ConfigValue::Sequence(Vec::new())
    } else if descriptor.multi_conf() {
        ConfigValue::Sequence(vec![ConfigMap::new().into()])
    } else {
        ConfigMap::new().into()
    }
}

/// Bring a raw section into the shape its descriptor validates.
fn normalise_section(descriptor: &dyn ComponentDescriptor, value: ConfigValue) -> ConfigValue {
    let listed = descriptor.is_platform_component() || descriptor.multi_conf();
    match value {
        ConfigValue::Null => empty_section(descriptor),
        ConfigValue::Sequence(items) if listed => ConfigValue::Sequence(items),
        other if listed => ConfigValue::Sequence(vec![other]),
        other => other,
    }
}

fn validate_fragment(
    schema: Option<&Validator>,
    value: &ConfigValue,
    path: &ConfigPath,
    ctx: &mut ValidationContext,
) -> std::result::Result<ConfigValue, MultipleInvalid> {
    let value = if value.is_null() {
        ConfigMap::new().into()
    } else {
        value.clone()
    };
    match schema {
        None => Ok(value),
        Some(schema) => ctx
            .at_path(path, |ctx| schema.validate(&value, ctx))
            .map_err(|e| e.prepend(path)),
    }
}

struct Discovery {
    order: Vec<String>,
    auto_loaded: Vec<String>,
}

/// Runs the pipeline for one target against one catalogue.
pub struct Orchestrator<'a> {
    catalogue: &'a Catalogue,
    target: Target,
    packages: Option<&'a dyn PackageSource>,
    check_pin_use: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(catalogue: &'a Catalogue, target: Target) -> Self {
        Self {
            catalogue,
            target,
            packages: None,
            check_pin_use: true,
        }
    }

    /// Where remote packages are checked out.
    pub fn with_package_source(mut self, source: &'a dyn PackageSource) -> Self {
        self.packages = Some(source);
        self
    }

    pub fn check_pin_use(mut self, enabled: bool) -> Self {
        self.check_pin_use = enabled;
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn validate_file(&self, path: &Path) -> Result<ValidatedConfig> {
        debug!(path = %path.display(), "Loading configuration file");
        self.validate(load_yaml_file(path)?)
    }

    pub fn validate(&self, config: ConfigValue) -> Result<ValidatedConfig> {
        info!(platform = self.target.platform.as_str(), board = %self.target.board, "Reading configuration");
        let local = LocalCheckouts::new();
        let source: &dyn PackageSource = match self.packages {
            Some(source) => source,
            None => &local,
        };
        let (config, trace) = do_packages_pass(config, source)?;

        let mut top = match config {
            ConfigValue::Mapping(map) => map,
            other => {
                return Err(MultipleInvalid::from(Invalid::new(format!(
                    "Configuration must be a dictionary, got {}",
                    other.kind()
                )))
                .into())
            }
        };
        if self.catalogue.get(CORE_COMPONENT).is_some() && !top.contains_key(CORE_COMPONENT) {
            return Err(MultipleInvalid::from(Invalid::new(format!(
                "'{CORE_COMPONENT}' section missing from configuration. Please make sure your configuration has an '{CORE_COMPONENT}:' line in it."
            )))
            .into());
        }

        let discovery = self.discover(&mut top)?;
        let order = self.dependency_order(&discovery.order, &top)?;
        debug!(order = ?order, "Component order");

        info!(components = order.len(), "Validating configuration");
        let registries = Arc::new(self.catalogue.registry_set());
        let mut ctx = ValidationContext::with_pin_registry(self.target.clone(), Arc::new(self.catalogue.pins().clone()));
        ctx.set_registries(registries.clone());
        ctx.set_check_pin_use(self.check_pin_use);
        ctx.set_loaded(order.iter().cloned());

        let mut grouped: Vec<(usize, Vec<Invalid>)> = Vec::new();
        for name in order.iter().filter(|n| !n.contains('.')) {
            let Some(descriptor) = self.catalogue.get(name) else {
                continue;
            };
            let Some(raw) = top.get(name).cloned() else {
                continue;
            };
            match self.validate_section(name, descriptor.as_ref(), &raw, &mut ctx) {
                Ok(value) => {
                    top.insert(name.as_str(), value);
                }
                Err(errors) => {
                    let rank = top.keys().position(|k| k == name.as_str()).unwrap_or(usize::MAX);
                    grouped.push((rank, errors.into_errors()));
                }
            }
        }
        if !grouped.is_empty() {
            grouped.sort_by_key(|(rank, _)| *rank);
            let errors = grouped.into_iter().flat_map(|(_, errors)| errors).collect();
            return Err(CoreError::Validation(MultipleInvalid::new(errors)));
        }

        let mut config = ConfigValue::Mapping(top);
        let ids = resolve_ids(&mut config)?;
        debug!(ids = ids.len(), "Resolved IDs");

        let mut errors = if self.check_pin_use {
            check_pin_uses(ctx.pin_uses())
        } else {
            Vec::new()
        };
        let registry_uses = ctx.registry_uses().to_vec();
        let top = config.as_mapping().cloned().unwrap_or_default();
        ctx.begin_final_validate(FullConfig::new(config.clone(), ids.clone()));
        for name in &order {
            let Some(final_schema) = self.catalogue.get(name).and_then(|d| d.final_validate_schema()) else {
                continue;
            };
            for path in self.fragment_paths(name, &top) {
                errors.extend(final_validate(final_schema, &path, &mut ctx));
            }
        }
        for usage in &registry_uses {
            let Some(registry) = registries.get(&usage.registry) else {
                continue;
            };
            if let Some(final_schema) = registry.entry_final_validator(&usage.key) {
                let path = usage.path.join(usage.key.as_str());
                errors.extend(final_validate(final_schema, &path, &mut ctx));
            }
        }
        ctx.end_final_validate();
        if !errors.is_empty() {
            return Err(CoreError::Validation(MultipleInvalid::new(errors)));
        }

        let mut codeowners = BTreeMap::new();
        let mut plan = Vec::new();
        for name in &order {
            let Some(descriptor) = self.catalogue.get(name) else {
                continue;
            };
            if !descriptor.codeowners().is_empty() {
                codeowners.insert(name.clone(), descriptor.codeowners().to_vec());
            }
            for path in self.fragment_paths(name, &top) {
                plan.push(PlanEntry {
                    component: name.clone(),
                    path,
                });
            }
        }

        Ok(ValidatedConfig {
            config,
            warnings: ctx.take_warnings(),
            ids,
            codeowners,
            order,
            auto_loaded: discovery.auto_loaded,
            trace,
            plan,
        })
    }

    /// Lower a validated configuration into a codegen model.
    pub fn emit(&self, validated: &ValidatedConfig) -> Result<CodegenModel> {
        info!(jobs = validated.plan.len(), "Generating code");
        let mut ctx = EmitContext::new(
            self.target.clone(),
            validated.ids.clone(),
            Arc::new(self.catalogue.pins().clone()),
            Arc::new(self.catalogue.automations().clone()),
        );
        let mut scheduler = Scheduler::new();
        for entry in &validated.plan {
            let Some(descriptor) = self.catalogue.get(&entry.component).cloned() else {
                continue;
            };
            let fragment = validated.config.get_path(&entry.path).cloned().unwrap_or_default();
            let (_, consumes) = announced_ids(&fragment);
            let priority = descriptor.to_code_priority();
            scheduler.push(Job::new(entry.component.clone(), priority, consumes, move |ctx| {
                descriptor.to_code(&fragment, ctx)
            }));
        }
        scheduler.run(&mut ctx)?;
        Ok(ctx.into_model())
    }

    /// Validate then emit.
    pub fn compile(&self, config: ConfigValue) -> Result<(ValidatedConfig, CodegenModel)> {
        let validated = self.validate(config)?;
        let model = self.emit(&validated)?;
        Ok((validated, model))
    }

    fn discover(&self, top: &mut ConfigMap) -> Result<Discovery> {
        let mut queue: VecDeque<String> = top.keys().map(str::to_string).collect();
        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        let mut auto_loaded = Vec::new();
        let mut errors = Vec::new();

        while let Some(name) = queue.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let Some(descriptor) = self.catalogue.get(&name) else {
                let mut message = format!("Component not found: {name}.");
                if let Some(m) = closest_match(&name, self.catalogue.names()) {
                    message.push_str(&format!(" Did you mean '{m}'?"));
                }
                errors.push(Invalid::at(message, config_path![name.as_str()]));
                continue;
            };
            order.push(name.clone());
            if let Some(section) = top.get_mut(&name) {
                *section = normalise_section(descriptor.as_ref(), std::mem::take(section));
            }

            let mut loads: Vec<String> = descriptor.auto_load().to_vec();
            if descriptor.is_platform_component() {
                let items = top.get(&name).and_then(ConfigValue::as_sequence).unwrap_or_default();
                for (i, item) in items.iter().enumerate() {
                    let path = config_path![name.as_str(), i];
                    let Some(platform) = item.get(CONF_PLATFORM).and_then(ConfigValue::as_str) else {
                        errors.push(Invalid::at(
                            "'platform' is a required option",
                            path.join(CONF_PLATFORM),
                        ));
                        continue;
                    };
                    let full = format!("{name}.{platform}");
                    let Some(platform_descriptor) = self.catalogue.platform(&name, platform) else {
                        let mut message = format!("Platform not found: '{full}'");
                        if let Some(m) = closest_match(platform, self.catalogue.platforms_of(&name)) {
                            message.push_str(&format!(", did you mean '{m}'?"));
                        }
                        errors.push(Invalid::at(message, path.join(CONF_PLATFORM)));
                        continue;
                    };
                    if seen.insert(full.clone()) {
                        order.push(full);
                        loads.extend(platform_descriptor.auto_load().iter().cloned());
                    }
                }
            }

            for load in loads {
                if top.contains_key(&load) {
                    queue.push_back(load);
                    continue;
                }
                match self.catalogue.get(&load) {
                    Some(loaded) => {
                        debug!(component = %load, by = %name, "Auto-loading component");
                        top.insert(load.as_str(), empty_section(loaded.as_ref()));
                        auto_loaded.push(load.clone());
                        queue.push_back(load);
                    }
                    None => errors.push(Invalid::at(
                        format!("Component not found: {load}."),
                        config_path![name.split('.').next().unwrap_or(&name)],
                    )),
                }
            }
        }

        if !errors.is_empty() {
            return Err(CoreError::Validation(MultipleInvalid::new(errors)));
        }
        Ok(Discovery { order, auto_loaded })
    }

    /// Check cross-section constraints and sort topologically, ties broken by
    /// discovery order.
    fn dependency_order(&self, discovered: &[String], top: &ConfigMap) -> Result<Vec<String>> {
        let loaded: BTreeSet<&str> = discovered.iter().map(String::as_str).collect();
        let mut errors = Vec::new();
        let mut needs: Needs<'_> = BTreeMap::new();

        for name in discovered {
            let Some(descriptor) = self.catalogue.get(name) else {
                continue;
            };
            let section = name.split('.').next().unwrap_or(name);
            let path = config_path![section];
            for dep in descriptor.dependencies() {
                if !loaded.contains(dep.as_str()) {
                    errors.push(Invalid::at(format!("Component {name} requires component {dep}"), path.clone()));
                }
            }
            for other in descriptor.conflicts_with() {
                if loaded.contains(other.as_str()) {
                    errors.push(Invalid::at(
                        format!("Component {name} cannot be used together with component {other}"),
                        path.clone(),
                    ));
                }
            }
            if let Some(platforms) = descriptor.supported_platforms() {
                if !platforms.contains(&self.target.platform) {
                    errors.push(Invalid::at(
                        format!("Component {name} doesn't support {}.", self.target.platform.as_str()),
                        path.clone(),
                    ));
                }
            }

            let mut edges: Vec<&str> = descriptor
                .dependencies()
                .iter()
                .chain(descriptor.auto_load())
                .filter_map(|n| loaded.get(n.as_str()).copied())
                .collect();
            if section != name.as_str() {
                if let Some(domain) = loaded.get(section).copied() {
                    edges.push(domain);
                }
            }
            needs.insert(name.as_str(), edges);
        }
        if !errors.is_empty() {
            return Err(CoreError::Validation(MultipleInvalid::new(errors)));
        }

        let mut marks = BTreeMap::new();
        for name in discovered {
            let mut stack = Vec::new();
            if let Some(cycle) = find_cycle(name.as_str(), &needs, &mut marks, &mut stack) {
                let section = cycle[0].split('.').next().unwrap_or(&cycle[0]).to_string();
                return Err(MultipleInvalid::from(Invalid::at(
                    format!("Dependency cycle detected: {}", cycle.join(" -> ")),
                    config_path![section.as_str()],
                ))
                .into());
            }
        }

        let mut placed: Vec<String> = Vec::with_capacity(discovered.len());
        let mut done: BTreeSet<&str> = BTreeSet::new();
        while placed.len() < discovered.len() {
            let next = discovered.iter().find(|n| {
                !done.contains(n.as_str())
                    && needs
                        .get(n.as_str())
                        .map_or(true, |deps| deps.iter().all(|d| done.contains(d)))
            });
            let Some(next) = next else {
                break;
            };
            done.insert(next.as_str());
            placed.push(next.clone());
        }
        debug!(sections = top.len(), "Dependency order settled");
        Ok(placed)
    }

    fn validate_section(
        &self,
        name: &str,
        descriptor: &dyn ComponentDescriptor,
        raw: &ConfigValue,
        ctx: &mut ValidationContext,
    ) -> std::result::Result<ConfigValue, MultipleInvalid> {
        let section = config_path![name];
        debug!(component = %name, "Validating section");
        if !(descriptor.is_platform_component() || descriptor.multi_conf()) {
            return validate_fragment(descriptor.config_schema(), raw, &section, ctx);
        }

        let items = raw.as_sequence().unwrap_or_default();
        let mut out = Vec::with_capacity(items.len());
        let mut errors: Vec<Invalid> = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let path = section.join(i);
            if !descriptor.is_platform_component() {
                match validate_fragment(descriptor.config_schema(), item, &path, ctx) {
                    Ok(v) => out.push(v),
                    Err(e) => errors.extend(e.into_errors()),
                }
                continue;
            }

            let Some(mut map) = item.as_mapping().cloned() else {
                errors.push(Invalid::at(format!("expected a dictionary, got {}", item.kind()), path));
                continue;
            };
            let Some(platform) = map.remove(CONF_PLATFORM) else {
                continue;
            };
            let Some(platform_descriptor) = platform.as_str().and_then(|p| self.catalogue.platform(name, p)) else {
                continue;
            };
            match validate_fragment(platform_descriptor.config_schema(), &map.into(), &path, ctx) {
                Ok(ConfigValue::Mapping(mut validated)) => {
                    validated.insert_first(CONF_PLATFORM, platform);
                    out.push(validated.into());
                }
                Ok(other) => out.push(other),
                Err(e) => errors.extend(e.into_errors()),
            }
        }
        if errors.is_empty() {
            Ok(ConfigValue::Sequence(out))
        } else {
            Err(MultipleInvalid::new(errors))
        }
    }

    /// Paths of the fragments `name` validates and lowers.
    fn fragment_paths(&self, name: &str, top: &ConfigMap) -> Vec<ConfigPath> {
        if let Some((domain, platform)) = name.split_once('.') {
            let items = top.get(domain).and_then(ConfigValue::as_sequence).unwrap_or_default();
            return items
                .iter()
                .enumerate()
                .filter(|(_, item)| item.get(CONF_PLATFORM).and_then(ConfigValue::as_str) == Some(platform))
                .map(|(i, _)| config_path![domain, i])
                .collect();
        }
        match self.catalogue.get(name) {
            Some(d) if d.multi_conf() && !d.is_platform_component() => {
                let count = top.get(name).and_then(ConfigValue::as_sequence).map_or(0, <[_]>::len);
                (0..count).map(|i| config_path![name, i]).collect()
            }
            Some(_) if top.contains_key(name) => vec![config_path![name]],
            _ => Vec::new(),
        }
    }
}

fn final_validate(schema: &Validator, path: &ConfigPath, ctx: &mut ValidationContext) -> Vec<Invalid> {
    let fragment = match ctx.full_config() {
        Ok(full) => full.get_config_for_path(path).cloned(),
        Err(e) => return vec![e],
    };
    let Some(fragment) = fragment else {
        return Vec::new();
    };
    match ctx.at_path(path, |ctx| schema.validate(&fragment, ctx)) {
        Ok(_) => Vec::new(),
        Err(e) => e.prepend(path).into_errors(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{priority, Component};
    use fw_codegen::Statement;
    use fw_config_core::{cv, load_yaml_str, Schema, TargetPlatform};

    fn target() -> Target {
        Target::new(TargetPlatform::Esp32, "esp32dev")
    }

    fn comment(text: &'static str) -> impl Fn(&ConfigValue, &mut EmitContext) -> Result<()> + Send + Sync {
        move |_, ctx| {
            ctx.add(Statement::Comment(text.to_string()));
            Ok(())
        }
    }

    fn catalogue() -> Catalogue {
        let mut c = Catalogue::new();
        c.register(Component::new("a").with_auto_load(&["b"]).with_to_code(priority::COMPONENT, comment("a")))
            .unwrap();
        c.register(
            Component::new("b")
                .with_schema(Schema::new())
                .with_to_code(priority::COMPONENT, comment("b")),
        )
        .unwrap();
        c.register(
            Component::new("p")
                .with_auto_load(&["b"])
                .with_schema(Schema::new().required("x", cv::int_())),
        )
        .unwrap();
        c.register(Component::new("c").with_dependencies(&["d"])).unwrap();
        c.register(Component::new("d").with_dependencies(&["c"])).unwrap();
        c.register(Component::new("e").with_conflicts(&["b"])).unwrap();
        c.register(
            Component::new("only8266").with_supported_platforms(&[TargetPlatform::Esp8266]),
        )
        .unwrap();
        c.register(
            Component::new("n")
                .with_schema(Schema::new().optional_default("value", 3i64, cv::int_()))
                .with_multi_conf(),
        )
        .unwrap();
        c
    }

    fn run(yaml: &str) -> Result<ValidatedConfig> {
        let c = catalogue();
        Orchestrator::new(&c, target()).validate(load_yaml_str(yaml).unwrap())
    }

    #[test]
    fn auto_loaded_component_is_ordered_first() {
        let c = catalogue();
        let (validated, model) = Orchestrator::new(&c, target())
            .compile(load_yaml_str("a:\n").unwrap())
            .unwrap();
        assert_eq!(validated.auto_loaded, vec!["b".to_string()]);
        assert_eq!(validated.order, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(model.render_main(), vec!["// b", "// a"]);
        assert!(validated.printable(true).get("b").is_some());
        assert!(validated.printable(false).get("b").is_none());
    }

    #[test]
    fn unknown_component_gets_a_suggestion() {
        let err = run("nn:\n").unwrap_err();
        assert_eq!(err.to_string(), "Validation failed:\nComponent not found: nn. Did you mean 'n'? @ nn");
    }

    #[test]
    fn dependency_cycle_is_reported() {
        let err = run("c:\nd:\n").unwrap_err();
        assert_eq!(err.to_string(), "Validation failed:\nDependency cycle detected: c -> d -> c @ c");
    }

    #[test]
    fn missing_dependency_and_conflict() {
        let err = run("c:\n").unwrap_err();
        assert_eq!(err.to_string(), "Validation failed:\nComponent c requires component d @ c");
        let err = run("e:\nb:\n").unwrap_err();
        assert!(err.to_string().contains("Component e cannot be used together with component b"));
    }

    #[test]
    fn unsupported_platform_is_rejected() {
        let err = run("only8266:\n").unwrap_err();
        assert!(err.to_string().contains("Component only8266 doesn't support esp32."));
    }

    #[test]
    fn multi_conf_sections_become_lists() {
        let validated = run("n:\n  value: 5\n").unwrap();
        let items = validated.config.get("n").and_then(ConfigValue::as_sequence).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].get("value"), Some(&ConfigValue::Int(5)));
        assert_eq!(validated.plan[0].path, config_path!["n", 0usize]);
    }

    #[test]
    fn errors_are_grouped_by_section_order() {
        // b validates before p, which auto-loads it, but p comes first in the file.
        let err = run("p:\nb:\n  extra: 1\n").unwrap_err();
        let paths: Vec<String> = err.invalid().unwrap().errors().iter().map(|e| e.path.to_string()).collect();
        assert_eq!(paths, vec!["p->x".to_string(), "b->extra".to_string()]);
    }

    #[test]
    fn removed_sections_are_dropped() {
        let validated = run("b: !remove\nn:\n").unwrap();
        assert!(validated.config.get("b").is_none());
    }
}
