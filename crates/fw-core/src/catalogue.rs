// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The set of components, registries and pin providers a run can use.

use std::collections::BTreeMap;
use std::sync::Arc;

use fw_config_core::{ConfigError, ExternalPinProvider, PinRegistry, RegistrySet, SchemaRegistry};
use tracing::debug;

use crate::automation::Automations;
use crate::descriptor::ComponentDescriptor;

/// Everything descriptors have registered.
#[derive(Clone, Default)]
pub struct Catalogue {
    components: BTreeMap<String, Arc<dyn ComponentDescriptor>>,
    automations: Automations,
    pins: PinRegistry,
    registries: Vec<Arc<dyn SchemaRegistry>>,
}

impl std::fmt::Debug for Catalogue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalogue")
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .field("automations", &self.automations)
            .finish_non_exhaustive()
    }
}

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The core components, actions and conditions.
    pub fn builtin() -> fw_config_core::Result<Self> {
        let mut catalogue = Self {
            automations: Automations::builtin()?,
            ..Self::default()
        };
        crate::components::register_all(&mut catalogue)?;
        Ok(catalogue)
    }

    pub fn register(&mut self, descriptor: impl ComponentDescriptor + 'static) -> fw_config_core::Result<()> {
        let name = descriptor.name().to_string();
        if self.components.contains_key(&name) {
            return Err(ConfigError::DuplicateRegistration {
                registry: "component".into(),
                key: name,
            });
        }
        debug!(component = %name, "Registered component");
        self.components.insert(name, Arc::new(descriptor));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ComponentDescriptor>> {
        self.components.get(name)
    }

    /// The descriptor for an item of a platform domain.
    pub fn platform(&self, domain: &str, platform: &str) -> Option<&Arc<dyn ComponentDescriptor>> {
        self.components.get(&format!("{domain}.{platform}"))
    }

    /// Platforms registered for `domain`.
    pub fn platforms_of<'a>(&'a self, domain: &'a str) -> impl Iterator<Item = &'a str> {
        self.components
            .keys()
            .filter_map(move |k| k.strip_prefix(domain)?.strip_prefix('.'))
    }

    /// Top-level component names, for suggestions.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str).filter(|k| !k.contains('.'))
    }

    pub fn automations(&self) -> &Automations {
        &self.automations
    }

    pub fn automations_mut(&mut self) -> &mut Automations {
        &mut self.automations
    }

    pub fn pins(&self) -> &PinRegistry {
        &self.pins
    }

    pub fn register_pin_provider(&mut self, provider: ExternalPinProvider) -> fw_config_core::Result<()> {
        self.pins.register_external(provider)
    }

    /// Make another named registry visible to validators.
    pub fn register_registry(&mut self, registry: Arc<dyn SchemaRegistry>) {
        self.registries.push(registry);
    }

    /// All registries, by name, for the validation context.
    pub fn registry_set(&self) -> RegistrySet {
        let mut set = RegistrySet::new();
        set.insert(self.automations.action_registry());
        set.insert(self.automations.condition_registry());
        for registry in &self.registries {
            set.insert(registry.clone());
        }
        set
    }
}
