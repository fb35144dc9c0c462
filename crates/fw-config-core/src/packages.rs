// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The `packages:` preprocessor.
//!
//! Packages are merged in declaration order into an accumulator, which is
//! then merged under the top-level configuration. Mappings merge key by key,
//! lists pair up entries by `id`, and anything else is replaced by the
//! right-hand side. `!extend` and `!remove` ids overlay or delete the entry
//! they name.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use crate::config_path;
use crate::error::{ConfigError, ConfigPath, Invalid, MultipleInvalid, Result};
use crate::loader::load_yaml_file;
use crate::primitives;
use crate::provenance::{MergeTrace, TOP_LEVEL};
use crate::time::{parse_time_period, TimePeriod};
use crate::value::{ConfigMap, ConfigValue, EntryId};

pub const CONF_PACKAGES: &str = "packages";

/// A package fetched from a git repository.
#[derive(Clone, PartialEq)]
pub struct RemotePackage {
    pub url: String,
    pub git_ref: Option<String>,
    pub files: Vec<String>,
    /// `None` means `never`.
    pub refresh: Option<TimePeriod>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for RemotePackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemotePackage")
            .field("url", &self.url)
            .field("git_ref", &self.git_ref)
            .field("files", &self.files)
            .field("refresh", &self.refresh)
            .field("username", &self.username.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Resolves remote packages to local checkout directories.
pub trait PackageSource {
    fn checkout(&self, package: &RemotePackage) -> Result<PathBuf>;
}

/// Checkouts prepared ahead of time, keyed by repository URL.
#[derive(Debug, Clone, Default)]
pub struct LocalCheckouts {
    dirs: BTreeMap<String, PathBuf>,
}

impl LocalCheckouts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, dir: impl Into<PathBuf>) {
        self.dirs.insert(url.into(), dir.into());
    }
}

impl PackageSource for LocalCheckouts {
    fn checkout(&self, package: &RemotePackage) -> Result<PathBuf> {
        self.dirs
            .get(&package.url)
            .cloned()
            .ok_or_else(|| ConfigError::MissingCheckout {
                url: package.url.clone(),
            })
    }
}

fn github_shorthand() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^github://([a-zA-Z0-9\-]+)/([a-zA-Z0-9\-._]+)/([a-zA-Z0-9\-_./]+)(?:@([a-zA-Z0-9\-_./]+))?$",
        )
        .expect("github shorthand pattern is valid")
    })
}

fn parse_shorthand(s: &str) -> std::result::Result<RemotePackage, Invalid> {
    let caps = github_shorthand()
        .captures(s)
        .ok_or_else(|| Invalid::new("Source is not a valid GitHub shorthand"))?;
    Ok(RemotePackage {
        url: format!("https://github.com/{}/{}", &caps[1], &caps[2]),
        git_ref: caps.get(4).map(|m| m.as_str().to_string()),
        files: vec![caps[3].to_string()],
        refresh: Some(TimePeriod::from_secs(86_400)),
        username: None,
        password: None,
    })
}

fn optional_string(
    m: &ConfigMap,
    key: &str,
    validate: fn(&ConfigValue) -> std::result::Result<String, Invalid>,
) -> std::result::Result<Option<String>, Invalid> {
    m.get(key)
        .map(|v| validate(v).map_err(|e| e.prepend(&config_path![key])))
        .transpose()
}

fn parse_descriptor(m: &ConfigMap) -> std::result::Result<RemotePackage, Invalid> {
    const KEYS: [&str; 6] = ["url", "ref", "files", "refresh", "username", "password"];
    if let Some(k) = m.keys().find(|k| !KEYS.contains(k)) {
        return Err(Invalid::at(
            format!("[{k}] is an invalid option for a remote package."),
            config_path![k],
        ));
    }
    let url = optional_string(m, "url", primitives::url)?
        .ok_or_else(|| Invalid::at("required key not provided", config_path!["url"]))?;
    let files = match m.get("files") {
        Some(ConfigValue::Sequence(items)) if !items.is_empty() => items
            .iter()
            .enumerate()
            .map(|(i, f)| primitives::string(f).map_err(|e| e.prepend(&config_path!["files", i])))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        Some(ConfigValue::String(s)) => vec![s.clone()],
        Some(_) => {
            return Err(Invalid::at(
                "files must be a non-empty list of file names",
                config_path!["files"],
            ))
        }
        None => return Err(Invalid::at("required key not provided", config_path!["files"])),
    };
    let refresh = match m.get("refresh") {
        None => Some(TimePeriod::from_secs(86_400)),
        Some(ConfigValue::String(s)) if s.eq_ignore_ascii_case("never") => None,
        Some(v) => Some(parse_time_period(v).map_err(|e| e.prepend(&config_path!["refresh"]))?),
    };
    Ok(RemotePackage {
        url,
        git_ref: optional_string(m, "ref", primitives::git_ref)?,
        files,
        refresh,
        username: optional_string(m, "username", primitives::string)?,
        password: optional_string(m, "password", primitives::string)?,
    })
}

/// Parse a package value that names a remote repository, if it is one.
pub fn remote_package(value: &ConfigValue) -> Option<std::result::Result<RemotePackage, Invalid>> {
    match value {
        ConfigValue::String(s) if s.starts_with("github://") => Some(parse_shorthand(s)),
        ConfigValue::Mapping(m) if m.contains_key("url") => Some(parse_descriptor(m)),
        _ => None,
    }
}

fn invalid_at(message: impl Into<String>, path: ConfigPath) -> ConfigError {
    ConfigError::Invalid(MultipleInvalid::from(Invalid::at(message, path)))
}

fn load_remote(
    package: &RemotePackage,
    source: &dyn PackageSource,
    path: &ConfigPath,
) -> Result<ConfigValue> {
    debug!(url = %package.url, git_ref = ?package.git_ref, files = ?package.files, "Loading remote package");
    let dir = source.checkout(package)?;
    let mut merged = ConfigValue::Mapping(ConfigMap::new());
    for file in &package.files {
        let fragment = load_yaml_file(&dir.join(file)).map_err(|e| {
            invalid_at(format!("Unable to load package file '{file}': {e}"), path.clone())
        })?;
        if fragment.as_mapping().is_none() {
            return Err(invalid_at(
                format!("Package file '{file}' must contain a mapping"),
                path.clone(),
            ));
        }
        merged = merge_config(merged, fragment);
    }
    Ok(merged)
}

/// Expand every `packages:` block, innermost first.
pub fn do_packages_pass(config: ConfigValue, source: &dyn PackageSource) -> Result<(ConfigValue, MergeTrace)> {
    let mut trace = MergeTrace::default();
    let merged = packages_pass(config, source, &ConfigPath::root(), &mut trace)?;
    Ok((strip_removed(merged), trace))
}

/// Drop `!remove` markers that had nothing left to remove.
fn strip_removed(value: ConfigValue) -> ConfigValue {
    match value {
        ConfigValue::Mapping(map) => ConfigValue::Mapping(
            map.into_iter()
                .filter(|(_, v)| !matches!(v, ConfigValue::Remove(None)))
                .map(|(k, v)| (k, strip_removed(v)))
                .collect(),
        ),
        ConfigValue::Sequence(items) => ConfigValue::Sequence(
            items
                .into_iter()
                .filter(|v| !matches!(v, ConfigValue::Remove(None)))
                .map(strip_removed)
                .collect(),
        ),
        other => other,
    }
}

fn packages_pass(
    config: ConfigValue,
    source: &dyn PackageSource,
    at: &ConfigPath,
    trace: &mut MergeTrace,
) -> Result<ConfigValue> {
    let ConfigValue::Mapping(mut top) = config else {
        return Ok(config);
    };
    let Some(packages) = top.remove(CONF_PACKAGES) else {
        return Ok(ConfigValue::Mapping(top));
    };
    let packages_path = at.join(CONF_PACKAGES);
    let ConfigValue::Mapping(packages) = packages else {
        return Err(invalid_at(
            format!(
                "Packages must be a key to value mapping, got {} instead",
                packages.kind()
            ),
            packages_path,
        ));
    };
    if !packages.is_empty() {
        info!(count = packages.len(), "Merging packages");
    }

    let mut acc = ConfigValue::Mapping(ConfigMap::new());
    for (name, package) in packages {
        let path = packages_path.join(name.as_str());
        let fragment = match remote_package(&package) {
            Some(remote) => {
                let remote = remote.map_err(|e| ConfigError::Invalid(MultipleInvalid::from(e.prepend(&path))))?;
                load_remote(&remote, source, &path)?
            }
            None if package.as_mapping().is_some() => package,
            None => {
                return Err(invalid_at(
                    format!("Package '{name}' must be a mapping or a remote package descriptor"),
                    path,
                ))
            }
        };
        let fragment = packages_pass(fragment, source, &path, trace)?;
        debug!(package = %name, "Merging package");
        acc = merge_traced(acc, fragment, &ConfigPath::root(), &path.to_string(), trace);
    }
    Ok(merge_traced(acc, ConfigValue::Mapping(top), &ConfigPath::root(), TOP_LEVEL, trace))
}

/// Merge `new` over `old` without recording collisions.
pub fn merge_config(old: ConfigValue, new: ConfigValue) -> ConfigValue {
    merge_traced(old, new, &ConfigPath::root(), TOP_LEVEL, &mut MergeTrace::default())
}

/// Merge `new` over `old`, recording replaced values under `layer`.
pub fn merge_traced(
    old: ConfigValue,
    new: ConfigValue,
    path: &ConfigPath,
    layer: &str,
    trace: &mut MergeTrace,
) -> ConfigValue {
    match (old, new) {
        (ConfigValue::Mapping(mut o), ConfigValue::Mapping(n)) => {
            for (k, v) in n {
                if matches!(v, ConfigValue::Remove(None)) && o.contains_key(&k) {
                    o.remove(&k);
                    continue;
                }
                match o.get_mut(&k) {
                    Some(slot) => {
                        let prev = std::mem::take(slot);
                        *slot = merge_traced(prev, v, &path.join(k.as_str()), layer, trace);
                    }
                    None => {
                        o.insert(k, v);
                    }
                }
            }
            ConfigValue::Mapping(o)
        }
        (ConfigValue::Sequence(o), ConfigValue::Sequence(n)) => {
            ConfigValue::Sequence(merge_lists(o, n, path, layer, trace))
        }
        (old, ConfigValue::Null) => old,
        (old, new) => {
            if !old.is_null() {
                trace.record(path, layer, &old, &new);
            }
            new
        }
    }
}

enum ListOp {
    Extend(usize, String),
    Remove(usize),
    Overlay(usize),
    Append,
}

fn merge_lists(
    mut res: Vec<ConfigValue>,
    new: Vec<ConfigValue>,
    path: &ConfigPath,
    layer: &str,
    trace: &mut MergeTrace,
) -> Vec<ConfigValue> {
    // Only entries that were there before this merge can be addressed.
    let old_len = res.len();
    let last_with = |res: &[ConfigValue], want: &dyn Fn(EntryId<'_>) -> bool| {
        res[..old_len]
            .iter()
            .rposition(|e| e.entry_id().is_some_and(|id| want(id)))
    };
    let mut deleted = BTreeSet::new();
    for v in new {
        let op = match v.entry_id() {
            Some(EntryId::Extend(name)) => {
                match last_with(&res, &|id| id == EntryId::Plain(name)) {
                    Some(i) => ListOp::Extend(i, name.to_string()),
                    None => ListOp::Append,
                }
            }
            Some(EntryId::Remove(name)) => {
                match last_with(&res, &|id| id == EntryId::Plain(name)) {
                    Some(i) => ListOp::Remove(i),
                    None => ListOp::Append,
                }
            }
            Some(EntryId::Plain(name)) => {
                match last_with(&res, &|id| id == EntryId::Extend(name)) {
                    Some(i) => ListOp::Overlay(i),
                    None => ListOp::Append,
                }
            }
            None => ListOp::Append,
        };
        match op {
            ListOp::Extend(i, name) => {
                let mut v = v;
                if let Some(m) = v.as_mapping_mut() {
                    m.insert("id", ConfigValue::String(name));
                }
                let prev = std::mem::take(&mut res[i]);
                res[i] = merge_traced(prev, v, &path.join(i), layer, trace);
            }
            ListOp::Remove(i) => {
                deleted.insert(i);
            }
            ListOp::Overlay(i) => {
                // An earlier overlay waited for this entry.
                let mut overlay = std::mem::take(&mut res[i]);
                if let (Some(m), Some(id)) = (overlay.as_mapping_mut(), v.get("id").cloned()) {
                    m.insert("id", id);
                }
                res[i] = merge_traced(v, overlay, &path.join(i), layer, trace);
            }
            ListOp::Append => res.push(v),
        }
    }
    res.into_iter()
        .enumerate()
        .filter(|(i, _)| !deleted.contains(i))
        .map(|(_, v)| v)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_yaml_str;
    use pretty_assertions::assert_eq;

    fn yaml(s: &str) -> ConfigValue {
        load_yaml_str(s).unwrap()
    }

    fn pass(s: &str) -> ConfigValue {
        do_packages_pass(yaml(s), &LocalCheckouts::new()).unwrap().0
    }

    #[test]
    fn config_without_packages_is_unchanged() {
        let src = "esphome: {name: x}\nwifi: {ssid: A}\n";
        assert_eq!(pass(src), yaml(src));
    }

    #[test]
    fn later_packages_win() {
        let out = pass(
            r#"
packages:
  package1: {logger: {level: DEBUG}}
  package2: {logger: {level: VERBOSE}}
"#,
        );
        assert_eq!(out, yaml("logger: {level: VERBOSE}"));
    }

    #[test]
    fn lists_without_ids_concatenate() {
        let out = pass(
            r#"
packages:
  p: {sensor: [{platform: a, name: one}]}
sensor: [{platform: b, name: two}]
"#,
        );
        assert_eq!(
            out,
            yaml("sensor: [{platform: a, name: one}, {platform: b, name: two}]")
        );
    }

    #[test]
    fn extend_inside_packages_applies_in_order() {
        let out = pass(
            r#"
packages:
  base:
    sensor:
      - {id: s1, platform: p1, name: n1}
  p2:
    sensor:
      - {id: !extend s1, domain: "2"}
  p3:
    sensor:
      - {id: !extend s1, domain: "3"}
"#,
        );
        assert_eq!(out, yaml("sensor: [{id: s1, platform: p1, name: n1, domain: '3'}]"));
    }

    #[test]
    fn nested_lists_merge_inside_extended_entries() {
        let out = pass(
            r#"
packages:
  sensors:
    sensor: [{id: s1, filters: [{multiply: 42.0}]}]
sensor:
  - {id: !extend s1, filters: [{offset: 146.0}]}
"#,
        );
        assert_eq!(
            out,
            yaml("sensor: [{id: s1, filters: [{multiply: 42.0}, {offset: 146.0}]}]")
        );
    }

    #[test]
    fn unmatched_id_sentinels_are_kept_for_validation() {
        let out = pass(
            r#"
packages:
  sensors:
    sensor: [{id: s1}]
missing_key: !remove
sensor:
  - {id: s1, name: again}
  - {id: !remove s2}
"#,
        );
        let sensors = out.get("sensor").and_then(ConfigValue::as_sequence).unwrap();
        assert_eq!(sensors.len(), 3);
        assert_eq!(sensors[2].get("id"), Some(&ConfigValue::Remove(Some("s2".into()))));
        assert_eq!(out.get("missing_key"), None);
    }

    #[test]
    fn remove_whole_section() {
        let out = pass(
            r#"
esphome: {name: x}
packages:
  network: {wifi: {ssid: A}}
wifi: !remove
"#,
        );
        assert_eq!(out, yaml("esphome: {name: x}"));
    }

    #[test]
    fn packages_must_be_a_mapping() {
        let err = do_packages_pass(yaml("packages: [a, b]"), &LocalCheckouts::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Packages must be a key to value mapping, got list instead @ packages"
        );
    }

    #[test]
    fn collisions_name_the_winning_layer() {
        let (_, trace) = do_packages_pass(
            yaml(
                r#"
packages:
  a: {logger: {level: DEBUG}}
  b: {logger: {level: INFO}}
logger: {level: WARN}
"#,
            ),
            &LocalCheckouts::new(),
        )
        .unwrap();
        let layers: Vec<&str> = trace.collisions.iter().map(|c| c.layer.as_str()).collect();
        assert_eq!(layers, ["packages->b", TOP_LEVEL]);
        assert_eq!(trace.winner_of(&config_path!["logger", "level"]), Some(TOP_LEVEL));
    }

    #[test]
    fn github_shorthand_expands() {
        let remote = remote_package(&"github://esphome/firmware/wifi/common.yaml@main".into())
            .unwrap()
            .unwrap();
        assert_eq!(remote.url, "https://github.com/esphome/firmware");
        assert_eq!(remote.files, ["wifi/common.yaml"]);
        assert_eq!(remote.git_ref.as_deref(), Some("main"));
    }

    #[test]
    fn credentials_are_redacted_in_debug_output() {
        let m: ConfigMap = [
            ("url", ConfigValue::from("https://github.com/o/r")),
            ("files", ConfigValue::Sequence(vec!["a.yaml".into()])),
            ("password", "s3cret".into()),
        ]
        .into_iter()
        .collect();
        let remote = parse_descriptor(&m).unwrap();
        assert!(!format!("{remote:?}").contains("s3cret"));
    }

    #[test]
    fn remote_packages_load_from_checkouts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("common.yaml"),
            "packages:\n  inner: {logger: {level: DEBUG}}\nwifi: {ssid: A, password: B}\n",
        )
        .unwrap();
        let mut checkouts = LocalCheckouts::new();
        checkouts.insert("https://github.com/o/r", dir.path());
        let config = yaml(
            r#"
packages:
  remote:
    url: https://github.com/o/r
    files: [common.yaml]
    refresh: never
wifi: {ssid: C}
"#,
        );
        let (out, _) = do_packages_pass(config, &checkouts).unwrap();
        assert_eq!(
            out,
            yaml("logger: {level: DEBUG}\nwifi: {ssid: C, password: B}")
        );

        let err = do_packages_pass(yaml("packages: {r: 'github://o/other/x.yaml'}"), &checkouts).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCheckout { .. }));
    }
}
