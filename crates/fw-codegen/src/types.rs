// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Symbolic handles for C++ namespaces and types.
//!
//! A [`CppType`] never resolves anything against real C++ headers. It only
//! carries what the generator needs: the fully qualified name, the declared
//! base classes (for `use_id` compatibility checks), template arguments and an
//! optional pointer/reference/const modifier used in lambda signatures.

use std::fmt;

use crate::expr::Expression;

/// What kind of declaration a type handle stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Class,
    Struct,
    Enum { scoped: bool },
    Primitive,
}

/// Derived handle operators, as used in lambda parameter lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeOp {
    Ref,
    Ptr,
    Const,
}

/// A C++ type reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CppType {
    base: String,
    kind: TypeKind,
    parents: Vec<CppType>,
    template_args: Vec<String>,
    modifiers: Vec<TypeOp>,
}

impl CppType {
    fn new(base: impl Into<String>, kind: TypeKind, parents: Vec<CppType>) -> Self {
        Self {
            base: base.into(),
            kind,
            parents,
            template_args: Vec::new(),
            modifiers: Vec::new(),
        }
    }

    /// A builtin type such as `bool` or `uint32_t`.
    pub fn primitive(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Primitive, Vec::new())
    }

    /// Fully qualified name without template arguments or modifiers.
    pub fn base_name(&self) -> &str {
        &self.base
    }

    /// Unqualified class name (`UARTComponent` for `esphome::uart::UARTComponent`).
    pub fn short_name(&self) -> &str {
        self.base.rsplit("::").next().unwrap_or(&self.base)
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn parents(&self) -> &[CppType] {
        &self.parents
    }

    /// Parameterise the type, e.g. `Trigger<float>`.
    pub fn template<I, T>(&self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TemplateArg>,
    {
        let mut out = self.clone();
        out.template_args = args.into_iter().map(|a| a.into().0).collect();
        out
    }

    pub fn operator(&self, op: TypeOp) -> Self {
        let mut out = self.clone();
        out.modifiers.push(op);
        out
    }

    pub fn is_pointer(&self) -> bool {
        self.modifiers.last() == Some(&TypeOp::Ptr)
    }

    /// Whether a value of `self` can stand where `other` is expected.
    ///
    /// Template arguments and modifiers are ignored; only the class hierarchy
    /// declared through [`Namespace::class_`] is consulted.
    pub fn inherits_from(&self, other: &CppType) -> bool {
        if self.base == other.base {
            return true;
        }
        self.parents.iter().any(|p| p.inherits_from(other))
    }

    /// Access a static member or enumerator, e.g. `gpio::Flags::FLAG_INPUT`.
    pub fn member(&self, name: &str) -> Expression {
        Expression::Raw(format!("{}::{}", self.base, name))
    }
}

impl fmt::Display for CppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let consts = self.modifiers.iter().filter(|m| **m == TypeOp::Const).count();
        for _ in 0..consts {
            write!(f, "const ")?;
        }
        write!(f, "{}", self.base)?;
        if !self.template_args.is_empty() {
            write!(f, "<{}>", self.template_args.join(", "))?;
        }
        for m in &self.modifiers {
            match m {
                TypeOp::Ref => write!(f, " &")?,
                TypeOp::Ptr => write!(f, " *")?,
                TypeOp::Const => {}
            }
        }
        Ok(())
    }
}

/// One template argument, already rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateArg(String);

impl From<&CppType> for TemplateArg {
    fn from(t: &CppType) -> Self {
        TemplateArg(t.to_string())
    }
}

impl From<CppType> for TemplateArg {
    fn from(t: CppType) -> Self {
        TemplateArg(t.to_string())
    }
}

impl From<i64> for TemplateArg {
    fn from(v: i64) -> Self {
        TemplateArg(v.to_string())
    }
}

impl From<&str> for TemplateArg {
    fn from(v: &str) -> Self {
        TemplateArg(v.to_string())
    }
}

/// A C++ namespace path (`esphome::uart`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    path: String,
}

impl Namespace {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn qualify(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}::{}", self.path, name)
        }
    }

    pub fn namespace(&self, name: &str) -> Namespace {
        Namespace::new(self.qualify(name))
    }

    pub fn class_(&self, name: &str, bases: &[&CppType]) -> CppType {
        CppType::new(
            self.qualify(name),
            TypeKind::Class,
            bases.iter().map(|b| (*b).clone()).collect(),
        )
    }

    pub fn struct_(&self, name: &str) -> CppType {
        CppType::new(self.qualify(name), TypeKind::Struct, Vec::new())
    }

    pub fn enum_(&self, name: &str, scoped: bool) -> CppType {
        CppType::new(self.qualify(name), TypeKind::Enum { scoped }, Vec::new())
    }

    /// Reference a free function or variable in this namespace.
    pub fn member(&self, name: &str) -> Expression {
        Expression::Raw(self.qualify(name))
    }
}

/// The root namespace every generated symbol lives in.
pub fn esphome_ns() -> Namespace {
    Namespace::new("esphome")
}

/// The unnamed global namespace.
pub fn global_ns() -> Namespace {
    Namespace::new("")
}

/// Handles for the C++ runtime types the core itself refers to.
pub mod known {
    use super::{esphome_ns, CppType};
    use crate::expr::Expression;

    pub fn bool_() -> CppType {
        CppType::primitive("bool")
    }
    pub fn int32() -> CppType {
        CppType::primitive("int32_t")
    }
    pub fn uint8() -> CppType {
        CppType::primitive("uint8_t")
    }
    pub fn uint16() -> CppType {
        CppType::primitive("uint16_t")
    }
    pub fn uint32() -> CppType {
        CppType::primitive("uint32_t")
    }
    pub fn float_() -> CppType {
        CppType::primitive("float")
    }
    pub fn void() -> CppType {
        CppType::primitive("void")
    }
    pub fn std_string() -> CppType {
        CppType::primitive("std::string")
    }

    /// The `App` singleton.
    pub fn app() -> Expression {
        esphome_ns().member("App")
    }

    pub fn component() -> CppType {
        esphome_ns().class_("Component", &[])
    }
    pub fn polling_component() -> CppType {
        esphome_ns().class_("PollingComponent", &[&component()])
    }
    pub fn gpio_pin() -> CppType {
        esphome_ns().class_("GPIOPin", &[])
    }
    pub fn internal_gpio_pin() -> CppType {
        esphome_ns().class_("InternalGPIOPin", &[&gpio_pin()])
    }
    pub fn gpio_flags() -> CppType {
        esphome_ns().namespace("gpio").enum_("Flags", false)
    }
    pub fn action() -> CppType {
        esphome_ns().class_("Action", &[])
    }
    pub fn condition() -> CppType {
        esphome_ns().class_("Condition", &[])
    }
    pub fn trigger() -> CppType {
        esphome_ns().class_("Trigger", &[])
    }
    pub fn automation() -> CppType {
        esphome_ns().class_("Automation", &[])
    }
}
