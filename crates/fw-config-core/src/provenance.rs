// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Which package supplied which value during the package merge.

use std::collections::BTreeMap;

use crate::error::ConfigPath;
use crate::value::ConfigValue;

/// Layer name for values written directly in the top-level file.
pub const TOP_LEVEL: &str = "<config>";

/// A value that replaced a different value during a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct Collision {
    pub path: ConfigPath,
    /// Layer whose value won.
    pub layer: String,
    pub previous: ConfigValue,
    pub value: ConfigValue,
}

/// Collision trace of one package pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeTrace {
    /// Maps rendered key paths to the layer that last replaced them
    pub winner: BTreeMap<String, String>,
    pub collisions: Vec<Collision>,
}

impl MergeTrace {
    pub fn record(&mut self, path: &ConfigPath, layer: &str, previous: &ConfigValue, value: &ConfigValue) {
        if previous == value {
            return;
        }
        self.winner.insert(path.to_string(), layer.to_string());
        self.collisions.push(Collision {
            path: path.clone(),
            layer: layer.to_string(),
            previous: previous.clone(),
            value: value.clone(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.collisions.is_empty()
    }

    /// Collisions at or below `prefix`.
    pub fn under<'a>(&'a self, prefix: &'a ConfigPath) -> impl Iterator<Item = &'a Collision> {
        self.collisions.iter().filter(move |c| c.path.starts_with(prefix))
    }

    pub fn winner_of(&self, path: &ConfigPath) -> Option<&str> {
        self.winner.get(&path.to_string()).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_path;

    #[test]
    fn equal_values_do_not_collide() {
        let mut t = MergeTrace::default();
        let p = config_path!["wifi", "ssid"];
        t.record(&p, "net", &"A".into(), &"A".into());
        assert!(t.is_empty());
        t.record(&p, TOP_LEVEL, &"A".into(), &"C".into());
        assert_eq!(t.winner_of(&p), Some(TOP_LEVEL));
        assert_eq!(t.under(&config_path!["wifi"]).count(), 1);
        assert_eq!(t.under(&config_path!["logger"]).count(), 0);
    }
}
