// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! YAML loading and dumping.
//!
//! Supported tags: `!lambda`, `!extend`, `!remove`, `!secret` (looked up in
//! `secrets.yaml` beside the file) and `!include` (relative to the file).

use std::path::{Path, PathBuf};

use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::Value as Y;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::value::{ConfigMap, ConfigValue, Lambda};

pub const SECRETS_FILE: &str = "secrets.yaml";

struct Loader {
    origin: String,
    base_dir: Option<PathBuf>,
}

impl Loader {
    fn unsupported(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::Unsupported {
            path: self.origin.clone(),
            message: message.into(),
        }
    }

    fn base_dir(&self, tag: &str) -> Result<&Path> {
        self.base_dir
            .as_deref()
            .ok_or_else(|| self.unsupported(format!("!{tag} needs a configuration file on disk")))
    }

    fn scalar_string(&self, tag: &str, value: Y) -> Result<String> {
        match value {
            Y::String(s) => Ok(s),
            Y::Number(n) => Ok(n.to_string()),
            other => Err(self.unsupported(format!("!{tag} expects a string, got {other:?}"))),
        }
    }

    fn convert(&self, value: Y) -> Result<ConfigValue> {
        Ok(match value {
            Y::Null => ConfigValue::Null,
            Y::Bool(b) => ConfigValue::Bool(b),
            Y::Number(n) => match n.as_i64() {
                Some(i) => ConfigValue::Int(i),
                None => ConfigValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Y::String(s) => ConfigValue::String(s),
            Y::Sequence(items) => ConfigValue::Sequence(
                items
                    .into_iter()
                    .map(|v| self.convert(v))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Y::Mapping(m) => {
                let mut out = ConfigMap::new();
                for (k, v) in m {
                    let key = match k {
                        Y::String(s) => s,
                        Y::Number(n) => n.to_string(),
                        Y::Bool(b) => b.to_string(),
                        other => return Err(self.unsupported(format!("mapping key {other:?}"))),
                    };
                    out.insert(key, self.convert(v)?);
                }
                ConfigValue::Mapping(out)
            }
            Y::Tagged(tagged) => self.convert_tagged(*tagged)?,
        })
    }

    fn convert_tagged(&self, tagged: TaggedValue) -> Result<ConfigValue> {
        let tag = tagged.tag.to_string();
        let tag = tag.trim_start_matches('!');
        match tag {
            "lambda" => Ok(ConfigValue::Lambda(Lambda::new(
                self.scalar_string(tag, tagged.value)?,
            ))),
            "extend" => Ok(ConfigValue::Extend(self.scalar_string(tag, tagged.value)?)),
            "remove" => match tagged.value {
                Y::Null => Ok(ConfigValue::Remove(None)),
                Y::String(s) if s.is_empty() => Ok(ConfigValue::Remove(None)),
                other => Ok(ConfigValue::Remove(Some(self.scalar_string(tag, other)?))),
            },
            "secret" => {
                let key = self.scalar_string(tag, tagged.value)?;
                let path = self.base_dir(tag)?.join(SECRETS_FILE);
                let secrets = load_yaml_file(&path)?;
                // The secret value is never logged.
                debug!(secret = %key, "Resolved secret");
                secrets
                    .get(&key)
                    .cloned()
                    .ok_or(ConfigError::UndefinedSecret(key))
            }
            "include" => {
                let rel = self.scalar_string(tag, tagged.value)?;
                load_yaml_file(&self.base_dir(tag)?.join(rel))
            }
            other => Err(self.unsupported(format!("unknown tag !{other}"))),
        }
    }
}

fn parse(content: &str, origin: &str) -> Result<Y> {
    serde_yaml::from_str::<Y>(content).map_err(|source| ConfigError::Yaml {
        path: origin.to_string(),
        source,
    })
}

/// Parse YAML text that has no file behind it; `!secret` and `!include` fail.
pub fn load_yaml_str(content: &str) -> Result<ConfigValue> {
    let loader = Loader {
        origin: "<string>".to_string(),
        base_dir: None,
    };
    loader.convert(parse(content, &loader.origin)?)
}

pub fn load_yaml_file(path: &Path) -> Result<ConfigValue> {
    debug!(path = %path.display(), "Loading YAML file");
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let loader = Loader {
        origin: path.display().to_string(),
        base_dir: path.parent().map(Path::to_path_buf),
    };
    loader.convert(parse(&content, &loader.origin)?)
}

fn tagged(tag: &str, value: Y) -> Y {
    Y::Tagged(Box::new(TaggedValue {
        tag: Tag::new(tag),
        value,
    }))
}

fn to_yaml(value: &ConfigValue) -> Y {
    match value {
        ConfigValue::Null => Y::Null,
        ConfigValue::Bool(b) => Y::Bool(*b),
        ConfigValue::Int(i) | ConfigValue::HexInt(i) => Y::Number((*i).into()),
        ConfigValue::Float(f) => Y::Number((*f).into()),
        ConfigValue::String(s) => Y::String(s.clone()),
        ConfigValue::Mapping(m) => Y::Mapping(
            m.iter()
                .map(|(k, v)| (Y::String(k.to_string()), to_yaml(v)))
                .collect(),
        ),
        ConfigValue::Sequence(s) => Y::Sequence(s.iter().map(to_yaml).collect()),
        ConfigValue::Lambda(l) => tagged("lambda", Y::String(l.source().to_string())),
        ConfigValue::Id(id) => id.name().map_or(Y::Null, |n| Y::String(n.to_string())),
        ConfigValue::Extend(s) => tagged("extend", Y::String(s.clone())),
        ConfigValue::Remove(s) => tagged("remove", s.clone().map_or(Y::Null, Y::String)),
        ConfigValue::TimePeriod(_) | ConfigValue::Enum { .. } => Y::String(value.to_string()),
    }
}

/// Render a configuration as YAML.
pub fn dump(value: &ConfigValue) -> Result<String> {
    serde_yaml::to_string(&to_yaml(value)).map_err(|source| ConfigError::Yaml {
        path: "<dump>".to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tags_become_sentinels() {
        let v = load_yaml_str(
            r#"
sensor:
  - id: !extend s1
    lambda: !lambda "return id(other).state;"
  - id: !remove s2
wifi: !remove
"#,
        )
        .unwrap();
        let sensors = v.get("sensor").and_then(ConfigValue::as_sequence).unwrap();
        assert_eq!(sensors[0].get("id"), Some(&ConfigValue::Extend("s1".into())));
        match sensors[0].get("lambda") {
            Some(ConfigValue::Lambda(l)) => assert_eq!(l.requires_ids(), ["other".to_string()]),
            other => panic!("expected lambda, got {other:?}"),
        }
        assert_eq!(sensors[1].get("id"), Some(&ConfigValue::Remove(Some("s2".into()))));
        assert_eq!(v.get("wifi"), Some(&ConfigValue::Remove(None)));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        assert!(matches!(
            load_yaml_str("a: 1\na: 2\n"),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn secrets_and_includes_resolve_beside_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SECRETS_FILE), "wifi_pw: hunter22\n").unwrap();
        std::fs::write(dir.path().join("net.yaml"), "ssid: home\n").unwrap();
        let main = dir.path().join("device.yaml");
        std::fs::write(&main, "wifi: !include net.yaml\npassword: !secret wifi_pw\n").unwrap();

        let v = load_yaml_file(&main).unwrap();
        assert_eq!(v.get("password"), Some(&ConfigValue::from("hunter22")));
        assert_eq!(v.get("wifi").and_then(|w| w.get("ssid")), Some(&ConfigValue::from("home")));

        std::fs::write(&main, "password: !secret nope\n").unwrap();
        assert!(matches!(load_yaml_file(&main), Err(ConfigError::UndefinedSecret(k)) if k == "nope"));
    }

    #[test]
    fn secret_without_file_context_fails() {
        assert!(matches!(
            load_yaml_str("password: !secret x\n"),
            Err(ConfigError::Unsupported { .. })
        ));
    }

    #[test]
    fn dump_keeps_tags() {
        let v = load_yaml_str("a: !lambda return 1;\nb: [1, 2]\n").unwrap();
        let text = dump(&v).unwrap();
        assert!(text.contains("!lambda"));
        assert_eq!(load_yaml_str(&text).unwrap(), v);
    }
}
