// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Validation and loading errors.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// One step in a path into the configuration tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{k}"),
            PathSegment::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(k: &str) -> Self {
        PathSegment::Key(k.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(k: String) -> Self {
        PathSegment::Key(k)
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        PathSegment::Index(i)
    }
}

/// A path such as `sensor->3->current->accuracy_decimals`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigPath(pub Vec<PathSegment>);

impl ConfigPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn join(&self, seg: impl Into<PathSegment>) -> Self {
        let mut out = self.clone();
        out.0.push(seg.into());
        out
    }

    pub fn parent(&self) -> Option<ConfigPath> {
        if self.0.is_empty() {
            return None;
        }
        Some(ConfigPath(self.0[..self.0.len() - 1].to_vec()))
    }

    /// First key of the path, which names the top-level section.
    pub fn domain(&self) -> Option<&str> {
        match self.0.first() {
            Some(PathSegment::Key(k)) => Some(k),
            _ => None,
        }
    }

    pub fn starts_with(&self, prefix: &ConfigPath) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", parts.join("->"))
    }
}

impl<S: Into<PathSegment>> FromIterator<S> for ConfigPath {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        ConfigPath(iter.into_iter().map(Into::into).collect())
    }
}

/// Build a [`ConfigPath`] from mixed keys and indices.
#[macro_export]
macro_rules! config_path {
    () => { $crate::ConfigPath::root() };
    ($($seg:expr),+ $(,)?) => {
        $crate::ConfigPath(vec![$($crate::PathSegment::from($seg)),+])
    };
}

/// A single validation failure at a path relative to the value being validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalid {
    pub message: String,
    pub path: ConfigPath,
}

impl Invalid {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: ConfigPath::root(),
        }
    }

    pub fn at(message: impl Into<String>, path: ConfigPath) -> Self {
        Self {
            message: message.into(),
            path,
        }
    }

    /// Prefix the path, as a combinator does when it descends into a child value.
    pub fn prepend(mut self, prefix: &ConfigPath) -> Self {
        let mut path = prefix.0.clone();
        path.append(&mut self.path.0);
        self.path = ConfigPath(path);
        self
    }
}

impl fmt::Display for Invalid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} @ {}", self.message, self.path)
        }
    }
}

/// One or more validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipleInvalid {
    errors: Vec<Invalid>,
}

impl MultipleInvalid {
    pub fn new(errors: Vec<Invalid>) -> Self {
        debug_assert!(!errors.is_empty());
        Self { errors }
    }

    pub fn errors(&self) -> &[Invalid] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<Invalid> {
        self.errors
    }

    /// The first error, used as the representative when fusing alternatives.
    pub fn first(&self) -> Option<&Invalid> {
        self.errors.first()
    }

    pub fn prepend(self, prefix: &ConfigPath) -> Self {
        Self {
            errors: self.errors.into_iter().map(|e| e.prepend(prefix)).collect(),
        }
    }

    pub fn extend(&mut self, other: MultipleInvalid) {
        self.errors.extend(other.errors);
    }

    /// Length of the deepest error path; the "most specific" failure wins when fusing.
    pub fn depth(&self) -> usize {
        self.errors.iter().map(|e| e.path.0.len()).max().unwrap_or(0)
    }
}

impl fmt::Display for MultipleInvalid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", lines.join("\n"))
    }
}

impl std::error::Error for Invalid {}

impl std::error::Error for MultipleInvalid {}

impl From<Invalid> for MultipleInvalid {
    fn from(e: Invalid) -> Self {
        Self { errors: vec![e] }
    }
}

/// Infrastructure failures around reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error reading file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML syntax in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Unsupported YAML construct in {path}: {message}")]
    Unsupported { path: String, message: String },

    #[error("Secret '{0}' not defined")]
    UndefinedSecret(String),

    #[error("Package source {url} has no local checkout")]
    MissingCheckout { url: String },

    #[error("Key '{key}' is already registered in the {registry} registry")]
    DuplicateRegistration { registry: String, key: String },

    #[error("Pin provider '{0}' is already registered")]
    DuplicatePinProvider(String),

    #[error(transparent)]
    Invalid(#[from] MultipleInvalid),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_renders_with_arrows() {
        let p = config_path!["sensor", 3usize, "current", "accuracy_decimals"];
        assert_eq!(p.to_string(), "sensor->3->current->accuracy_decimals");
        assert_eq!(p.domain(), Some("sensor"));
        assert_eq!(p.parent().unwrap().to_string(), "sensor->3->current");
    }

    #[test]
    fn prepend_splices_prefix() {
        let e = Invalid::at("bad", config_path!["x"]).prepend(&config_path!["a", 1usize]);
        assert_eq!(e.path, config_path!["a", 1usize, "x"]);
        assert_eq!(e.to_string(), "bad @ a->1->x");
        assert_eq!(Invalid::new("plain").to_string(), "plain");
    }

    #[test]
    fn multiple_invalid_depth() {
        let mut m = MultipleInvalid::from(Invalid::at("a", config_path!["x"]));
        m.extend(Invalid::at("b", config_path!["x", "y", "z"]).into());
        assert_eq!(m.depth(), 3);
        assert_eq!(m.errors().len(), 2);
    }
}
