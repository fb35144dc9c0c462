// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Build-level side outputs: preprocessor defines, libraries and platformio options.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A preprocessor define, optionally with a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Define {
    pub name: String,
    pub value: Option<String>,
}

impl Define {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn with_value(name: impl Into<String>, value: impl fmt::Display) -> Self {
        Self {
            name: name.into(),
            value: Some(value.to_string()),
        }
    }

    /// `-DNAME` or `-DNAME=value`
    pub fn as_build_flag(&self) -> String {
        match &self.value {
            Some(v) => format!("-D{}={}", self.name, v),
            None => format!("-D{}", self.name),
        }
    }

    /// `#define NAME` or `#define NAME value`
    pub fn as_macro(&self) -> String {
        match &self.value {
            Some(v) => format!("#define {} {}", self.name, v),
            None => format!("#define {}", self.name),
        }
    }
}

/// A library dependency of the firmware build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub name: String,
    pub version: Option<String>,
    pub repository: Option<String>,
}

impl Library {
    pub fn new(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            name: name.into(),
            version: version.map(str::to_string),
            repository: None,
        }
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    /// Library spec as understood by the build system.
    pub fn as_lib_dep(&self) -> String {
        if let Some(repo) = &self.repository {
            return format!("{}={}", self.name, repo);
        }
        match &self.version {
            Some(v) => format!("{}@{}", self.name, v),
            None => self.name.clone(),
        }
    }
}

/// Value of a platformio option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Single(String),
    List(Vec<String>),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Single(s) => write!(f, "{s}"),
            OptionValue::List(l) => write!(f, "[{}]", l.join(", ")),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Single(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_renders_flag_and_macro() {
        let d = Define::new("USE_WIFI");
        assert_eq!(d.as_build_flag(), "-DUSE_WIFI");
        assert_eq!(d.as_macro(), "#define USE_WIFI");
        let d = Define::with_value("MAX_SENSORS", 4);
        assert_eq!(d.as_build_flag(), "-DMAX_SENSORS=4");
        assert_eq!(d.as_macro(), "#define MAX_SENSORS 4");
    }

    #[test]
    fn library_lib_dep() {
        assert_eq!(Library::new("Wire", None).as_lib_dep(), "Wire");
        assert_eq!(Library::new("FastLED", Some("3.3.2")).as_lib_dep(), "FastLED@3.3.2");
        let lib = Library::new("NeoPixelBus", None).with_repository("https://example.org/neo.git");
        assert_eq!(lib.as_lib_dep(), "NeoPixelBus=https://example.org/neo.git");
    }
}
