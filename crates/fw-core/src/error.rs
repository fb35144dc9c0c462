// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use fw_codegen::CodegenError;
use fw_config_core::{ConfigError, MultipleInvalid};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Failures of a validation or emission run.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Every collected validation error, grouped by top-level section.
    #[error("Validation failed:\n{0}")]
    Validation(MultipleInvalid),

    #[error("Emission deadlock: waiting for ID '{id}' which is never created (needed by {})", waiting.join(", "))]
    Deadlock { id: String, waiting: Vec<String> },

    #[error("Lambda references ID '{0}' which has no variable")]
    LambdaUndeclaredId(String),

    #[error("Error while generating code for {component}: {source}")]
    Emission {
        component: String,
        #[source]
        source: Box<CoreError>,
    },

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error("Variable '{0}' does not inherit from Component and cannot be registered as one")]
    NotAComponent(String),

    #[error("Expected an ID, got {0}")]
    NotAnId(String),

    #[error("Cannot express a {0} value in generated code")]
    NotAnExpression(&'static str),

    #[error("Invalid tool settings: {0}")]
    Settings(String),
}

impl CoreError {
    /// The validation errors, when this is a validation failure.
    pub fn invalid(&self) -> Option<&MultipleInvalid> {
        match self {
            CoreError::Validation(errors) => Some(errors),
            CoreError::Config(ConfigError::Invalid(errors)) => Some(errors),
            _ => None,
        }
    }
}

impl From<MultipleInvalid> for CoreError {
    fn from(errors: MultipleInvalid) -> Self {
        CoreError::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fw_config_core::{config_path, Invalid};

    #[test]
    fn validation_errors_render_one_per_line() {
        let err = CoreError::from(MultipleInvalid::new(vec![
            Invalid::at("expected an integer", config_path!["uart", 0usize, "baud_rate"]),
            Invalid::at("required key not provided", config_path!["i2c", 0usize, "sda"]),
        ]));
        assert_eq!(
            err.to_string(),
            "Validation failed:\nexpected an integer @ uart->0->baud_rate\nrequired key not provided @ i2c->0->sda"
        );
        assert_eq!(err.invalid().map(|e| e.errors().len()), Some(2));
    }

    #[test]
    fn deadlock_names_the_id_and_waiters() {
        let err = CoreError::Deadlock {
            id: "bus".into(),
            waiting: vec!["mcp23017".into(), "switch.gpio".into()],
        };
        assert_eq!(
            err.to_string(),
            "Emission deadlock: waiting for ID 'bus' which is never created (needed by mcp23017, switch.gpio)"
        );
    }
}
