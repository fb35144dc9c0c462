// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! IDs and the resolver pass.
//!
//! Validation produces [`Id`] handles: declarations from `declare_id` and
//! references from `use_id`, either of which may still be unnamed. Once every
//! section has passed its schema, [`resolve_ids`] walks the whole tree, names
//! the automatic declarations, checks uniqueness and binds every reference.
//! The resulting [`IdTable`] hands out [`IdRef`]s, which are only obtainable for
//! references that resolved.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use fw_codegen::CppType;
use tracing::debug;

use crate::error::{ConfigPath, Invalid, MultipleInvalid};
use crate::value::ConfigValue;

/// Names generated code or the runtime already uses.
pub const RESERVED_IDS: &[&str] = &[
    // C++ keywords
    "alignas", "alignof", "and", "and_eq", "asm", "auto", "bitand", "bitor", "bool", "break",
    "case", "catch", "char", "char16_t", "char32_t", "class", "compl", "concept", "const",
    "constexpr", "const_cast", "continue", "decltype", "default", "delete", "do", "double",
    "dynamic_cast", "else", "enum", "explicit", "export", "extern", "false", "float", "for",
    "friend", "goto", "if", "inline", "int", "long", "mutable", "namespace", "new", "noexcept",
    "not", "not_eq", "nullptr", "operator", "or", "or_eq", "private", "protected", "public",
    "register", "reinterpret_cast", "requires", "return", "short", "signed", "sizeof", "static",
    "static_assert", "static_cast", "struct", "switch", "template", "this", "thread_local",
    "throw", "true", "try", "typedef", "typeid", "typename", "union", "unsigned", "using",
    "virtual", "void", "volatile", "wchar_t", "while", "xor", "xor_eq",
    // runtime
    "App", "pinMode", "delay", "delayMicroseconds", "digitalRead", "digitalWrite", "INPUT",
    "OUTPUT", "uint8_t", "uint16_t", "uint32_t", "uint64_t", "int8_t", "int16_t", "int32_t",
    "int64_t", "close", "pause", "sleep", "open", "setup", "loop", "main",
];

/// A declared or referenced identifier.
///
/// Equality and hashing use the name only.
#[derive(Debug, Clone)]
pub struct Id {
    name: Option<String>,
    is_declaration: bool,
    type_token: Option<CppType>,
    is_manual: bool,
}

impl Id {
    /// A declaration; `None` means the resolver mints the name.
    pub fn declaration(name: Option<String>, type_token: CppType) -> Self {
        let is_manual = name.is_some();
        Self {
            name,
            is_declaration: true,
            type_token: Some(type_token),
            is_manual,
        }
    }

    /// A reference; `None` means "the only compatible declaration".
    pub fn reference(name: Option<String>, type_token: CppType) -> Self {
        let is_manual = name.is_some();
        Self {
            name,
            is_declaration: false,
            type_token: Some(type_token),
            is_manual,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_declaration(&self) -> bool {
        self.is_declaration
    }

    pub fn is_manual(&self) -> bool {
        self.is_manual
    }

    pub fn type_token(&self) -> Option<&CppType> {
        self.type_token.as_ref()
    }

    fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }
}

impl PartialEq for Id {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Id {}

impl Hash for Id {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name.as_deref().unwrap_or("<auto>"))
    }
}

/// Check C++ identifier rules for a user-supplied ID.
pub fn validate_id_name(value: &str) -> Result<(), Invalid> {
    let Some(first) = value.chars().next() else {
        return Err(Invalid::new("ID must not be empty"));
    };
    if first.is_ascii_digit() {
        return Err(Invalid::new("First character in ID cannot be a digit."));
    }
    if value.contains('-') {
        return Err(Invalid::new(
            "Dashes are not supported in IDs, please use underscores instead.",
        ));
    }
    if let Some(c) = value.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(Invalid::new(format!(
            "IDs must only consist of upper/lowercase characters, the underscore character and numbers. The character '{c}' cannot be used"
        )));
    }
    if RESERVED_IDS.contains(&value) {
        return Err(Invalid::new(format!(
            "ID '{value}' is reserved internally and cannot be used"
        )));
    }
    Ok(())
}

/// Base name for an automatic ID: `esphome::uart::UARTComponent` becomes `uart_uartcomponent`.
fn auto_base_name(ty: &CppType) -> String {
    let full = ty.base_name();
    let full = full.strip_prefix("esphome::").unwrap_or(full);
    full.replace("::", "_")
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

fn ensure_unique(preferred: &str, taken: &BTreeSet<String>) -> String {
    let mut candidate = preferred.to_string();
    let mut tries = 1;
    while taken.contains(&candidate) || RESERVED_IDS.contains(&candidate.as_str()) {
        tries += 1;
        candidate = format!("{preferred}_{tries}");
    }
    candidate
}

/// Where and how an ID was declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdDeclaration {
    pub name: String,
    pub type_token: CppType,
    /// Path of the `id` value itself; its parent is the declaring fragment.
    pub path: ConfigPath,
    pub is_manual: bool,
}

/// A reference the resolver has bound to a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdRef {
    name: String,
}

impl IdRef {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for IdRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Every declaration in a validated configuration.
#[derive(Debug, Clone, Default)]
pub struct IdTable {
    declarations: BTreeMap<String, IdDeclaration>,
    order: Vec<String>,
}

impl IdTable {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.declarations.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&IdDeclaration> {
        self.declarations.get(name)
    }

    pub fn path_for(&self, name: &str) -> Option<&ConfigPath> {
        self.declarations.get(name).map(|d| &d.path)
    }

    /// Declarations in the order they were registered.
    pub fn declarations(&self) -> impl Iterator<Item = &IdDeclaration> {
        self.order.iter().filter_map(|n| self.declarations.get(n))
    }

    /// Turn a validated handle into a bound reference.
    pub fn reference(&self, id: &Id) -> Result<IdRef, Invalid> {
        let name = id
            .name()
            .ok_or_else(|| Invalid::new("ID has not been resolved"))?;
        let decl = self.declarations.get(name).ok_or_else(|| missing_id(name))?;
        if !id.is_declaration() {
            if let Some(expected) = id.type_token() {
                check_inherits(name, &decl.type_token, expected)?;
            }
        }
        Ok(IdRef {
            name: name.to_string(),
        })
    }

    fn insert(&mut self, decl: IdDeclaration) {
        self.order.push(decl.name.clone());
        self.declarations.insert(decl.name.clone(), decl);
    }

    fn names(&self) -> BTreeSet<String> {
        self.declarations.keys().cloned().collect()
    }
}

fn missing_id(name: &str) -> Invalid {
    Invalid::new(format!(
        "Couldn't find ID '{name}'. Please check you have defined an ID with that name in your configuration."
    ))
}

fn check_inherits(name: &str, declared: &CppType, expected: &CppType) -> Result<(), Invalid> {
    if declared.inherits_from(expected) {
        return Ok(());
    }
    Err(Invalid::new(format!(
        "ID '{name}' of type {declared} doesn't inherit from {expected}. Please double check your ID is pointing to the correct value"
    )))
}

fn collect<'a>(
    value: &'a ConfigValue,
    path: &mut ConfigPath,
    ids: &mut Vec<(ConfigPath, &'a Id)>,
    lambdas: &mut Vec<(ConfigPath, &'a [String])>,
) {
    match value {
        ConfigValue::Id(id) => ids.push((path.clone(), id)),
        ConfigValue::Lambda(l) if !l.requires_ids().is_empty() => {
            lambdas.push((path.clone(), l.requires_ids()))
        }
        ConfigValue::Mapping(m) => {
            for (k, v) in m.iter() {
                path.0.push(k.into());
                collect(v, path, ids, lambdas);
                path.0.pop();
            }
        }
        ConfigValue::Sequence(s) => {
            for (i, v) in s.iter().enumerate() {
                path.0.push(i.into());
                collect(v, path, ids, lambdas);
                path.0.pop();
            }
        }
        _ => {}
    }
}

fn rename_at(config: &mut ConfigValue, path: &ConfigPath, name: String) {
    if let Some(ConfigValue::Id(id)) = config.get_path_mut(path) {
        id.set_name(name);
    }
}

/// Name automatic IDs, reject duplicates and bind every reference.
pub fn resolve_ids(config: &mut ConfigValue) -> Result<IdTable, MultipleInvalid> {
    let mut ids = Vec::new();
    let mut lambdas = Vec::new();
    collect(config, &mut ConfigPath::root(), &mut ids, &mut lambdas);

    let mut table = IdTable::default();
    let mut errors: Vec<Invalid> = Vec::new();

    // Manual declarations claim their names before any automatic one is minted.
    for (path, id) in ids.iter().filter(|(_, id)| id.is_declaration() && id.name().is_some()) {
        let (Some(name), Some(ty)) = (id.name(), id.type_token()) else {
            continue;
        };
        if let Some(first) = table.get(name) {
            errors.push(Invalid::at(
                format!("ID '{name}' redefined! First declared at {}", first.path),
                path.clone(),
            ));
            continue;
        }
        table.insert(IdDeclaration {
            name: name.to_string(),
            type_token: ty.clone(),
            path: path.clone(),
            is_manual: id.is_manual(),
        });
    }

    let mut renames: Vec<(ConfigPath, String)> = Vec::new();
    let mut taken = table.names();
    for (path, id) in ids.iter().filter(|(_, id)| id.is_declaration() && id.name().is_none()) {
        let Some(ty) = id.type_token() else { continue };
        let name = ensure_unique(&auto_base_name(ty), &taken);
        taken.insert(name.clone());
        debug!(id = %name, path = %path, "Minted automatic ID");
        table.insert(IdDeclaration {
            name: name.clone(),
            type_token: ty.clone(),
            path: path.clone(),
            is_manual: false,
        });
        renames.push((path.clone(), name));
    }

    for (path, id) in ids.iter().filter(|(_, id)| !id.is_declaration()) {
        let Some(expected) = id.type_token() else { continue };
        match id.name() {
            Some(name) => match table.get(name) {
                None => errors.push(missing_id(name).prepend(path)),
                Some(decl) => {
                    if let Err(e) = check_inherits(name, &decl.type_token, expected) {
                        errors.push(e.prepend(path));
                    }
                }
            },
            None => {
                let candidates: Vec<&IdDeclaration> = table
                    .declarations()
                    .filter(|d| d.type_token.inherits_from(expected))
                    .collect();
                match candidates.as_slice() {
                    [only] => renames.push((path.clone(), only.name.clone())),
                    [] => errors.push(Invalid::at(
                        format!(
                            "Couldn't find any component that can be used for '{expected}'. Are you missing a hub declaration?"
                        ),
                        path.clone(),
                    )),
                    many => {
                        let names: Vec<&str> = many.iter().map(|d| d.name.as_str()).collect();
                        errors.push(Invalid::at(
                            format!(
                                "Too many candidates found for '{expected}'. They are {}. Please set an id explicitly.",
                                names.join(", ")
                            ),
                            path.clone(),
                        ));
                    }
                }
            }
        }
    }

    for (path, required) in &lambdas {
        for name in required.iter() {
            if !table.contains(name) {
                errors.push(missing_id(name).prepend(path));
            }
        }
    }

    if !errors.is_empty() {
        return Err(MultipleInvalid::new(errors));
    }
    for (path, name) in renames {
        rename_at(config, &path, name);
    }
    Ok(table)
}

/// Copy of `value` without automatically generated IDs, for printing.
pub fn strip_default_ids(value: &ConfigValue) -> ConfigValue {
    let is_default = |v: &ConfigValue| matches!(v, ConfigValue::Id(id) if !id.is_manual());
    match value {
        ConfigValue::Mapping(m) => ConfigValue::Mapping(
            m.iter()
                .filter(|(_, v)| !is_default(v))
                .map(|(k, v)| (k, strip_default_ids(v)))
                .collect(),
        ),
        ConfigValue::Sequence(s) => ConfigValue::Sequence(
            s.iter()
                .filter(|v| !is_default(v))
                .map(strip_default_ids)
                .collect(),
        ),
        other => other.clone(),
    }
}
