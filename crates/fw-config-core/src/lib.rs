// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration model and validation for firmware builds.
//!
//! A configuration file is loaded into a [`ConfigValue`] tree, expanded by the
//! `packages:` preprocessor and then validated section by section. Validators
//! are data ([`Validator`], [`Schema`]) interpreted against a
//! [`ValidationContext`] that knows the target, tracks pin uses and collects
//! warnings. After every section has passed, IDs are resolved into an
//! [`IdTable`] and final validators see the whole configuration through
//! [`FullConfig`].

pub mod cv;
mod context;
mod error;
mod final_validate;
mod ids;
mod loader;
mod packages;
mod pins;
pub mod primitives;
mod provenance;
mod registry;
mod schema;
mod suggest;
mod time;
mod units;
mod validators;
mod value;

pub use context::{
    Checkpoint, Esp32Variant, Framework, RegistryUse, Target, TargetPlatform, ValidationContext, Warning,
};
pub use error::{ConfigError, ConfigPath, Invalid, MultipleInvalid, PathSegment, Result};
pub use final_validate::{id_declaration_match, FullConfig};
pub use ids::{
    resolve_ids, strip_default_ids, validate_id_name, Id, IdDeclaration, IdRef, IdTable, RESERVED_IDS,
};
pub use loader::{dump, load_yaml_file, load_yaml_str, SECRETS_FILE};
pub use packages::{
    do_packages_pass, merge_config, merge_traced, remote_package, LocalCheckouts, PackageSource, RemotePackage,
    CONF_PACKAGES,
};
pub use pins::{
    check_pin_uses, native_pin_type, resolve_pin_number, validate_pin, ExternalPinProvider, PinBuilder, PinMode,
    PinProvider, PinRegistry, PinSchema, PinUse, CONF_ALLOW_OTHER_USES, CONF_IGNORE_STRAPPING_WARNING,
    CONF_INVERTED, CONF_MODE, CONF_NUMBER,
};
pub use primitives::Folding;
pub use provenance::{Collision, MergeTrace, TOP_LEVEL};
pub use registry::{validate_registry_entry, Registry, RegistryEntry, RegistrySet, SchemaRegistry, CONF_TYPE_ID};
pub use schema::{ExtraKeys, Key, KeyKind, Schema, TypedSchema, CONF_ID};
pub use suggest::closest_match;
pub use time::{parse_time_period, TimePeriod, TimeUnit};
pub use units::{parse_quantity, Quantity};
pub use validators::{CustomValidator, KeyRule, ValidationResult, Validator};
pub use value::{ConfigMap, ConfigValue, Lambda};
