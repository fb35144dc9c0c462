// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CodegenError>;

/// Failures raised while mutating the code generation model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    #[error("ID {0} is already registered")]
    DuplicateVariable(String),

    #[error("Variable for ID '{0}' has not been declared yet")]
    UnknownVariable(String),

    #[error(
        "Version pinning failed! Libraries {name}@{existing} and {name}@{requested} requested with conflicting versions!"
    )]
    LibraryVersionConflict {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("Define {name} was already added with value {existing}, cannot redefine it as {requested}")]
    DefineConflict {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("Conflicting values for platformio option '{key}': {existing} and {requested}")]
    PlatformioOptionConflict {
        key: String,
        existing: String,
        requested: String,
    },
}
