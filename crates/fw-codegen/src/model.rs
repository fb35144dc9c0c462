// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The append-only code generation model.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::build_info::{Define, Library, OptionValue};
use crate::error::{CodegenError, Result};
use crate::expr::Expression;
use crate::statement::Statement;
use crate::types::CppType;

/// Everything emitted for one firmware build.
///
/// Statements keep the order in which they were added. Every named variable
/// is bound exactly once; later lookups return the bound expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodegenModel {
    main: Vec<Statement>,
    globals: Vec<Statement>,
    variables: BTreeMap<String, Expression>,
    variable_order: Vec<String>,
    defines: BTreeMap<String, Define>,
    build_flags: BTreeSet<String>,
    libraries: Vec<Library>,
    platformio_options: BTreeMap<String, OptionValue>,
}

impl CodegenModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement to the main setup section.
    pub fn add(&mut self, statement: impl Into<Statement>) {
        let statement = statement.into();
        trace!(statement = %statement, "add");
        self.main.push(statement);
    }

    /// Append a statement to the global section.
    pub fn add_global(&mut self, statement: impl Into<Statement>) {
        self.globals.push(statement.into());
    }

    fn register(&mut self, id: &str, var: Expression) -> Result<()> {
        if self.variables.contains_key(id) {
            return Err(CodegenError::DuplicateVariable(id.to_string()));
        }
        self.variables.insert(id.to_string(), var);
        self.variable_order.push(id.to_string());
        Ok(())
    }

    /// Declare a global pointer for `id` and construct it with `new T(args)`.
    pub fn new_pvariable(&mut self, id: &str, ty: &CppType, args: Vec<Expression>) -> Result<Expression> {
        let rhs = Expression::New {
            ty: ty.clone(),
            args,
        };
        self.pvariable(id, rhs, ty)
    }

    /// Bind an existing pointer-valued expression to `id`.
    pub fn pvariable(&mut self, id: &str, rhs: Expression, ty: &CppType) -> Result<Expression> {
        let var = Expression::Variable {
            name: id.to_string(),
            ty: ty.clone(),
            pointer: true,
        };
        self.register(id, var.clone())?;
        self.globals.push(Statement::Declaration {
            ty: ty.clone(),
            name: id.to_string(),
            pointer: true,
        });
        self.add(Statement::Assignment {
            name: id.to_string(),
            rhs,
        });
        Ok(var)
    }

    /// Bind a value (non-pointer) variable local to the setup section.
    pub fn variable(&mut self, id: &str, rhs: Expression, ty: &CppType) -> Result<Expression> {
        let var = Expression::Variable {
            name: id.to_string(),
            ty: ty.clone(),
            pointer: false,
        };
        self.register(id, var.clone())?;
        self.add(Statement::Definition {
            ty: ty.clone(),
            name: id.to_string(),
            rhs,
        });
        Ok(var)
    }

    /// Emit a read-only array in program memory.
    pub fn progmem_array(&mut self, id: &str, ty: &CppType, values: Vec<Expression>) -> Result<Expression> {
        let var = Expression::Variable {
            name: id.to_string(),
            ty: ty.clone(),
            pointer: false,
        };
        self.register(id, var.clone())?;
        self.globals.push(Statement::Progmem {
            ty: ty.clone(),
            name: id.to_string(),
            rhs: Expression::Array(values),
        });
        Ok(var)
    }

    pub fn get_variable(&self, id: &str) -> Result<&Expression> {
        self.variables
            .get(id)
            .ok_or_else(|| CodegenError::UnknownVariable(id.to_string()))
    }

    pub fn has_variable(&self, id: &str) -> bool {
        self.variables.contains_key(id)
    }

    /// Ids in the order their variables were bound.
    pub fn variable_ids(&self) -> &[String] {
        &self.variable_order
    }

    /// Identical defines merge; a different value for the same name fails.
    pub fn add_define(&mut self, define: Define) -> Result<()> {
        match self.defines.get(&define.name) {
            Some(existing) if existing.value == define.value => Ok(()),
            Some(existing) => Err(CodegenError::DefineConflict {
                name: define.name.clone(),
                existing: existing.value.clone().unwrap_or_default(),
                requested: define.value.unwrap_or_default(),
            }),
            None => {
                self.defines.insert(define.name.clone(), define);
                Ok(())
            }
        }
    }

    pub fn add_build_flag(&mut self, flag: impl Into<String>) {
        self.build_flags.insert(flag.into());
    }

    /// Register a library; a versionless request yields to a pinned one.
    pub fn add_library(&mut self, library: Library) -> Result<()> {
        let Some(pos) = self.libraries.iter().position(|l| l.name == library.name) else {
            self.libraries.push(library);
            return Ok(());
        };
        let existing = self.libraries[pos].clone();
        if existing.repository.is_some() || library.repository.is_some() {
            if existing.repository == library.repository || library.repository.is_none() {
                return Ok(());
            }
            if existing.repository.is_none() {
                self.libraries[pos] = library;
                return Ok(());
            }
            return Err(CodegenError::LibraryVersionConflict {
                name: library.name,
                existing: existing.repository.unwrap_or_default(),
                requested: library.repository.unwrap_or_default(),
            });
        }
        match (existing.version, library.version.clone()) {
            (None, Some(_)) => {
                self.libraries[pos] = library;
                Ok(())
            }
            (_, None) => Ok(()),
            (Some(a), Some(b)) if a == b => Ok(()),
            (Some(a), Some(b)) => Err(CodegenError::LibraryVersionConflict {
                name: library.name,
                existing: a,
                requested: b,
            }),
        }
    }

    pub fn add_platformio_option(&mut self, key: &str, value: impl Into<OptionValue>) -> Result<()> {
        let value = value.into();
        match self.platformio_options.get(key) {
            Some(existing) if *existing == value => Ok(()),
            Some(existing) => Err(CodegenError::PlatformioOptionConflict {
                key: key.to_string(),
                existing: existing.to_string(),
                requested: value.to_string(),
            }),
            None => {
                self.platformio_options.insert(key.to_string(), value);
                Ok(())
            }
        }
    }

    pub fn main_statements(&self) -> &[Statement] {
        &self.main
    }

    pub fn global_statements(&self) -> &[Statement] {
        &self.globals
    }

    /// Defines sorted by name.
    pub fn defines(&self) -> impl Iterator<Item = &Define> {
        self.defines.values()
    }

    pub fn build_flags(&self) -> &BTreeSet<String> {
        &self.build_flags
    }

    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    pub fn platformio_options(&self) -> &BTreeMap<String, OptionValue> {
        &self.platformio_options
    }

    /// The setup section rendered one statement per line.
    pub fn render_main(&self) -> Vec<String> {
        self.main.iter().map(|s| s.to_string()).collect()
    }

    pub fn render_globals(&self) -> Vec<String> {
        self.globals.iter().map(|s| s.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{esphome_ns, known};

    #[test]
    fn new_pvariable_declares_and_assigns() {
        let mut model = CodegenModel::new();
        let ty = esphome_ns().namespace("uart").class_("UARTComponent", &[&known::component()]);
        let var = model.new_pvariable("uart_bus", &ty, vec![Expression::int(9600)]).unwrap();
        model.add(var.method("set_baud_rate", vec![Expression::int(115200)]));

        assert_eq!(
            model.render_globals(),
            vec!["esphome::uart::UARTComponent *uart_bus;".to_string()]
        );
        assert_eq!(
            model.render_main(),
            vec![
                "uart_bus = new esphome::uart::UARTComponent(9600);".to_string(),
                "uart_bus->set_baud_rate(115200);".to_string(),
            ]
        );
        assert!(model.has_variable("uart_bus"));
    }

    #[test]
    fn duplicate_variable_is_rejected() {
        let mut model = CodegenModel::new();
        let ty = known::component();
        model.new_pvariable("x", &ty, vec![]).unwrap();
        let err = model.new_pvariable("x", &ty, vec![]).unwrap_err();
        assert_eq!(err, CodegenError::DuplicateVariable("x".into()));
        assert_eq!(err.to_string(), "ID x is already registered");
    }

    #[test]
    fn unknown_variable_lookup_fails() {
        let model = CodegenModel::new();
        assert!(matches!(
            model.get_variable("nope"),
            Err(CodegenError::UnknownVariable(_))
        ));
    }

    #[test]
    fn progmem_array_goes_to_globals() {
        let mut model = CodegenModel::new();
        model
            .progmem_array("table", &known::uint8(), vec![Expression::int(1), Expression::int(2)])
            .unwrap();
        assert_eq!(
            model.render_globals(),
            vec!["static const uint8_t table[] PROGMEM = {1, 2};".to_string()]
        );
    }

    #[test]
    fn defines_merge_when_identical() {
        let mut model = CodegenModel::new();
        model.add_define(Define::new("USE_API")).unwrap();
        model.add_define(Define::new("USE_API")).unwrap();
        assert_eq!(model.defines().count(), 1);
        let err = model.add_define(Define::with_value("USE_API", 2)).unwrap_err();
        assert!(matches!(err, CodegenError::DefineConflict { .. }));
    }

    #[test]
    fn library_pinning() {
        let mut model = CodegenModel::new();
        model.add_library(Library::new("FastLED", None)).unwrap();
        model.add_library(Library::new("FastLED", Some("3.3.2"))).unwrap();
        model.add_library(Library::new("FastLED", None)).unwrap();
        assert_eq!(model.libraries(), &[Library::new("FastLED", Some("3.3.2"))]);

        let err = model.add_library(Library::new("FastLED", Some("3.4.0"))).unwrap_err();
        assert!(err.to_string().starts_with("Version pinning failed!"));
    }

    #[test]
    fn platformio_option_conflict() {
        let mut model = CodegenModel::new();
        model.add_platformio_option("board_build.f_cpu", "160000000L").unwrap();
        model.add_platformio_option("board_build.f_cpu", "160000000L").unwrap();
        assert!(model.add_platformio_option("board_build.f_cpu", "80000000L").is_err());
    }
}
