// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The configuration value tree.
//!
//! Raw YAML arrives as scalars, mappings and sequences plus three sentinel
//! variants produced by YAML tags (`!lambda`, `!extend`, `!remove`). Validators
//! then replace plain scalars with canonical variants (`Id`, `TimePeriod`,
//! `Enum`, `HexInt`) so that code emission never reparses strings.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::ids::Id;
use crate::time::TimePeriod;

/// A node in the configuration tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConfigValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Mapping(ConfigMap),
    Sequence(Vec<ConfigValue>),
    /// Inline C++ evaluated on the device.
    Lambda(Lambda),
    /// A validated ID reference or declaration.
    Id(Id),
    /// `!extend name`: overlay onto the list entry with this id.
    Extend(String),
    /// `!remove [name]`: delete the matched list entry, or the key holding it.
    Remove(Option<String>),
    TimePeriod(TimePeriod),
    /// An enum option: the user-facing key and the C++ value it maps to.
    Enum { key: String, value: String },
    /// An integer rendered in hexadecimal when emitted.
    HexInt(i64),
}

impl ConfigValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Null)
    }

    /// Human name of the value kind for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigValue::Null => "null",
            ConfigValue::Bool(_) => "boolean",
            ConfigValue::Int(_) | ConfigValue::HexInt(_) => "integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::String(_) => "string",
            ConfigValue::Mapping(_) => "dictionary",
            ConfigValue::Sequence(_) => "list",
            ConfigValue::Lambda(_) => "lambda",
            ConfigValue::Id(_) => "ID",
            ConfigValue::Extend(_) => "!extend",
            ConfigValue::Remove(_) => "!remove",
            ConfigValue::TimePeriod(_) => "time period",
            ConfigValue::Enum { .. } => "enum",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            ConfigValue::Enum { key, .. } => Some(key),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) | ConfigValue::HexInt(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Int(i) | ConfigValue::HexInt(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&ConfigMap> {
        match self {
            ConfigValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut ConfigMap> {
        match self {
            ConfigValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_id(&self) -> Option<&Id> {
        match self {
            ConfigValue::Id(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_time_period(&self) -> Option<&TimePeriod> {
        match self {
            ConfigValue::TimePeriod(t) => Some(t),
            _ => None,
        }
    }

    /// Look up a key when this value is a mapping.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.as_mapping().and_then(|m| m.get(key))
    }

    /// Walk a path of keys and indices.
    pub fn get_path(&self, path: &crate::ConfigPath) -> Option<&ConfigValue> {
        use crate::PathSegment;
        let mut cur = self;
        for seg in path.segments() {
            cur = match (seg, cur) {
                (PathSegment::Key(k), ConfigValue::Mapping(m)) => m.get(k)?,
                (PathSegment::Index(i), ConfigValue::Sequence(s)) => s.get(*i)?,
                _ => return None,
            };
        }
        Some(cur)
    }

    /// Mutable variant of [`ConfigValue::get_path`].
    pub fn get_path_mut(&mut self, path: &crate::ConfigPath) -> Option<&mut ConfigValue> {
        use crate::PathSegment;
        let mut cur = self;
        for seg in path.segments() {
            cur = match (seg, cur) {
                (PathSegment::Key(k), ConfigValue::Mapping(m)) => m.get_mut(k)?,
                (PathSegment::Index(i), ConfigValue::Sequence(s)) => s.get_mut(*i)?,
                _ => return None,
            };
        }
        Some(cur)
    }

    /// The id name carried by a list entry, together with its sentinel kind.
    pub(crate) fn entry_id(&self) -> Option<EntryId<'_>> {
        match self.get("id")? {
            ConfigValue::String(s) => Some(EntryId::Plain(s)),
            ConfigValue::Id(id) => id.name().map(EntryId::Plain),
            ConfigValue::Extend(s) => Some(EntryId::Extend(s)),
            ConfigValue::Remove(Some(s)) => Some(EntryId::Remove(s)),
            _ => None,
        }
    }
}

/// How a list entry identifies itself during package merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryId<'a> {
    Plain(&'a str),
    Extend(&'a str),
    Remove(&'a str),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Null => write!(f, "null"),
            ConfigValue::Bool(b) => write!(f, "{b}"),
            ConfigValue::Int(i) => write!(f, "{i}"),
            ConfigValue::HexInt(i) => write!(f, "0x{i:02X}"),
            ConfigValue::Float(v) => write!(f, "{v}"),
            ConfigValue::String(s) => write!(f, "{s}"),
            ConfigValue::Mapping(m) => {
                let parts: Vec<String> = m.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            ConfigValue::Sequence(s) => {
                let parts: Vec<String> = s.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            ConfigValue::Lambda(l) => write!(f, "!lambda {}", l.source()),
            ConfigValue::Id(id) => write!(f, "{}", id.name().unwrap_or("<auto>")),
            ConfigValue::Extend(s) => write!(f, "!extend {s}"),
            ConfigValue::Remove(Some(s)) => write!(f, "!remove {s}"),
            ConfigValue::Remove(None) => write!(f, "!remove"),
            ConfigValue::TimePeriod(t) => write!(f, "{t}"),
            ConfigValue::Enum { key, .. } => write!(f, "{key}"),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Int(i)
    }
}

impl From<i32> for ConfigValue {
    fn from(i: i32) -> Self {
        ConfigValue::Int(i64::from(i))
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<ConfigMap> for ConfigValue {
    fn from(m: ConfigMap) -> Self {
        ConfigValue::Mapping(m)
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(v: Vec<ConfigValue>) -> Self {
        ConfigValue::Sequence(v)
    }
}

/// Insertion-ordered string-keyed mapping.
///
/// Equality ignores order, matching dictionary semantics. Configuration
/// sections are small, so lookups scan linearly.
#[derive(Debug, Clone, Default)]
pub struct ConfigMap {
    entries: Vec<(String, ConfigValue)>,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ConfigValue> {
        self.entries.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Insert or replace in place; a new key goes to the end.
    pub fn insert(&mut self, key: impl Into<String>, value: ConfigValue) -> Option<ConfigValue> {
        let key = key.into();
        match self.position(&key) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Insert at the front, replacing any existing entry.
    pub fn insert_first(&mut self, key: impl Into<String>, value: ConfigValue) {
        let key = key.into();
        self.remove(&key);
        self.entries.insert(0, (key, value));
    }

    /// Remove a key, keeping the order of the rest.
    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        let i = self.position(key)?;
        Some(self.entries.remove(i).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &ConfigValue> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut ConfigValue)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }
}

impl PartialEq for ConfigMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.entries.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl IntoIterator for ConfigMap {
    type Item = (String, ConfigValue);
    type IntoIter = std::vec::IntoIter<(String, ConfigValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>> FromIterator<(K, ConfigValue)> for ConfigMap {
    fn from_iter<T: IntoIterator<Item = (K, ConfigValue)>>(iter: T) -> Self {
        let mut map = ConfigMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// User-supplied C++ source evaluated on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lambda {
    source: String,
    requires_ids: Vec<String>,
}

fn lambda_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"id\(\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\)(\.?)").expect("lambda id pattern is valid")
    })
}

fn comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)//[^\n]*|/\*.*?\*/").expect("comment pattern is valid"))
}

impl Lambda {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let stripped = comment_regex().replace_all(&source, "");
        let mut requires_ids: Vec<String> = Vec::new();
        for cap in lambda_id_regex().captures_iter(&stripped) {
            let name = cap[1].to_string();
            if !requires_ids.contains(&name) {
                requires_ids.push(name);
            }
        }
        Self {
            source,
            requires_ids,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// IDs referenced through `id(...)`, in order of first appearance.
    pub fn requires_ids(&self) -> &[String] {
        &self.requires_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_preserves_order_and_compares_unordered() {
        let mut a = ConfigMap::new();
        a.insert("x", 1.into());
        a.insert("y", 2.into());
        a.insert("x", 3.into());
        assert_eq!(a.keys().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(a.get("x"), Some(&ConfigValue::Int(3)));

        let b: ConfigMap = [("y", ConfigValue::Int(2)), ("x", ConfigValue::Int(3))]
            .into_iter()
            .collect();
        assert_eq!(a, b);

        a.remove("x");
        assert_eq!(a.keys().collect::<Vec<_>>(), vec!["y"]);
    }

    #[test]
    fn lambda_collects_ids_outside_comments() {
        let l = Lambda::new(
            "// id(ignored)\nreturn id(temp).state + id( hum ).state + id(temp).state; /* id(nope) */",
        );
        assert_eq!(l.requires_ids(), &["temp".to_string(), "hum".to_string()]);
    }

    #[test]
    fn get_path_walks_keys_and_indices() {
        let inner: ConfigMap = [("name", ConfigValue::from("n"))].into_iter().collect();
        let root: ConfigMap = [("sensor", ConfigValue::Sequence(vec![inner.into()]))]
            .into_iter()
            .collect();
        let root = ConfigValue::Mapping(root);
        let p = crate::config_path!["sensor", 0usize, "name"];
        assert_eq!(root.get_path(&p), Some(&ConfigValue::from("n")));
        assert_eq!(root.get_path(&crate::config_path!["sensor", 1usize]), None);
    }
}
