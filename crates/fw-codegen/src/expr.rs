// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Expression nodes of the generated C++ program.

use std::fmt;

use crate::types::CppType;

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Int(i64),
    Hex(u64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "{}", cpp_string_escape(s)),
            Literal::Int(i) => {
                if *i > 4_294_967_295 {
                    write!(f, "{i}ULL")
                } else if *i > 2_147_483_647 {
                    write!(f, "{i}UL")
                } else if *i < -2_147_483_648 {
                    write!(f, "{i}LL")
                } else {
                    write!(f, "{i}")
                }
            }
            Literal::Hex(h) => write!(f, "0x{h:02X}"),
            Literal::Float(v) => {
                if v.is_nan() {
                    write!(f, "NAN")
                } else if v.is_infinite() {
                    if *v > 0.0 {
                        write!(f, "INFINITY")
                    } else {
                        write!(f, "-INFINITY")
                    }
                } else {
                    write!(f, "{v:.6}f")
                }
            }
            Literal::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Quote a string as a C++ literal, escaping anything outside printable ASCII as octal.
pub fn cpp_string_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for b in s.bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{b:03o}")),
        }
    }
    out.push('"');
    out
}

/// Member access operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Dot,
    Arrow,
    Scope,
}

impl Access {
    fn as_str(self) -> &'static str {
        match self {
            Access::Dot => ".",
            Access::Arrow => "->",
            Access::Scope => "::",
        }
    }
}

/// An inline C++ lambda built from user source.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaExpression {
    pub parameters: Vec<(CppType, String)>,
    pub capture: String,
    pub return_type: Option<CppType>,
    pub body: String,
    /// Names of variables the body refers to through `id(...)`.
    pub captures: Vec<String>,
}

impl fmt::Display for LambdaExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .parameters
            .iter()
            .map(|(t, n)| format!("{t} {n}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "[{}]({})", self.capture, params)?;
        if let Some(ret) = &self.return_type {
            write!(f, " -> {ret}")?;
        }
        write!(f, " {{\n{}\n}}", self.body)
    }
}

/// A C++ expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Raw(String),
    Literal(Literal),
    /// A bound variable created by the model.
    Variable {
        name: String,
        ty: CppType,
        pointer: bool,
    },
    Member {
        base: Box<Expression>,
        access: Access,
        name: String,
    },
    Call {
        callee: Box<Expression>,
        template_args: Vec<String>,
        args: Vec<Expression>,
    },
    /// `new T(args)`
    New { ty: CppType, args: Vec<Expression> },
    /// `T{ .field = value, ... }`
    StructInit {
        ty: CppType,
        fields: Vec<(String, Expression)>,
    },
    /// `{a, b, c}`
    Array(Vec<Expression>),
    Lambda(LambdaExpression),
    /// `&expr`
    AddressOf(Box<Expression>),
}

impl Expression {
    pub fn raw(s: impl Into<String>) -> Self {
        Expression::Raw(s.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(s.into()))
    }

    pub fn int(i: i64) -> Self {
        Expression::Literal(Literal::Int(i))
    }

    pub fn float(v: f64) -> Self {
        Expression::Literal(Literal::Float(v))
    }

    pub fn bool(b: bool) -> Self {
        Expression::Literal(Literal::Bool(b))
    }

    pub fn hex(h: u64) -> Self {
        Expression::Literal(Literal::Hex(h))
    }

    /// Call a method, using `->` on pointer variables and `.` otherwise.
    pub fn method(&self, name: &str, args: Vec<Expression>) -> Expression {
        let access = match self {
            Expression::Variable { pointer: true, .. } => Access::Arrow,
            _ => Access::Dot,
        };
        Expression::Call {
            callee: Box::new(Expression::Member {
                base: Box::new(self.clone()),
                access,
                name: name.to_string(),
            }),
            template_args: Vec::new(),
            args,
        }
    }

    pub fn call(&self, args: Vec<Expression>) -> Expression {
        Expression::Call {
            callee: Box::new(self.clone()),
            template_args: Vec::new(),
            args,
        }
    }

    pub fn call_templated(&self, template_args: Vec<String>, args: Vec<Expression>) -> Expression {
        Expression::Call {
            callee: Box::new(self.clone()),
            template_args,
            args,
        }
    }

    pub fn address_of(&self) -> Expression {
        Expression::AddressOf(Box::new(self.clone()))
    }

    /// Variable name when this is a model-bound variable.
    pub fn variable_name(&self) -> Option<&str> {
        match self {
            Expression::Variable { name, .. } => Some(name),
            _ => None,
        }
    }
}

fn join(items: &[Expression]) -> String {
    items.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Raw(s) => write!(f, "{s}"),
            Expression::Literal(l) => write!(f, "{l}"),
            Expression::Variable { name, .. } => write!(f, "{name}"),
            Expression::Member { base, access, name } => {
                write!(f, "{}{}{}", base, access.as_str(), name)
            }
            Expression::Call {
                callee,
                template_args,
                args,
            } => {
                write!(f, "{callee}")?;
                if !template_args.is_empty() {
                    write!(f, "<{}>", template_args.join(", "))?;
                }
                write!(f, "({})", join(args))
            }
            Expression::New { ty, args } => write!(f, "new {}({})", ty, join(args)),
            Expression::StructInit { ty, fields } => {
                writeln!(f, "{ty}{{")?;
                for (name, value) in fields {
                    writeln!(f, "  .{name} = {value},")?;
                }
                write!(f, "}}")
            }
            Expression::Array(items) => write!(f, "{{{}}}", join(items)),
            Expression::Lambda(l) => write!(f, "{l}"),
            Expression::AddressOf(e) => write!(f, "&{e}"),
        }
    }
}

impl From<&str> for Expression {
    fn from(s: &str) -> Self {
        Expression::string(s)
    }
}

impl From<String> for Expression {
    fn from(s: String) -> Self {
        Expression::string(s)
    }
}

impl From<i64> for Expression {
    fn from(i: i64) -> Self {
        Expression::int(i)
    }
}

impl From<f64> for Expression {
    fn from(v: f64) -> Self {
        Expression::float(v)
    }
}

impl From<bool> for Expression {
    fn from(b: bool) -> Self {
        Expression::bool(b)
    }
}

/// Build a struct initializer, skipping fields without a value.
pub fn struct_initializer<I>(ty: &CppType, fields: I) -> Expression
where
    I: IntoIterator<Item = (&'static str, Option<Expression>)>,
{
    Expression::StructInit {
        ty: ty.clone(),
        fields: fields
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{esphome_ns, known};

    #[test]
    fn int_literal_suffixes() {
        assert_eq!(Expression::int(5).to_string(), "5");
        assert_eq!(Expression::int(3_000_000_000).to_string(), "3000000000UL");
        assert_eq!(Expression::int(5_000_000_000).to_string(), "5000000000ULL");
        assert_eq!(Expression::int(-3_000_000_000).to_string(), "-3000000000LL");
    }

    #[test]
    fn float_and_string_literals() {
        assert_eq!(Expression::float(1.5).to_string(), "1.500000f");
        assert_eq!(Expression::float(f64::NAN).to_string(), "NAN");
        assert_eq!(Expression::string("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(Expression::string("°").to_string(), "\"\\302\\260\"");
        assert_eq!(Expression::hex(0x3c).to_string(), "0x3C");
    }

    #[test]
    fn method_calls_pick_access_operator() {
        let ty = esphome_ns().class_("Foo", &[]);
        let var = Expression::Variable {
            name: "foo".into(),
            ty,
            pointer: true,
        };
        let call = var.method("set_bar", vec![Expression::int(1), Expression::bool(true)]);
        assert_eq!(call.to_string(), "foo->set_bar(1, true)");

        let app = known::app();
        assert_eq!(app.method("setup", vec![]).to_string(), "esphome::App.setup()");
    }

    #[test]
    fn struct_initializer_skips_missing_fields() {
        let ty = esphome_ns().struct_("Config");
        let e = struct_initializer(
            &ty,
            [("a", Some(Expression::int(1))), ("b", None), ("c", Some(Expression::bool(false)))],
        );
        assert_eq!(e.to_string(), "esphome::Config{\n  .a = 1,\n  .c = false,\n}");
    }

    #[test]
    fn lambda_renders_signature() {
        let l = LambdaExpression {
            parameters: vec![(known::float_(), "x".into())],
            capture: "=".into(),
            return_type: Some(known::float_()),
            body: "return x * 2;".into(),
            captures: vec![],
        };
        assert_eq!(l.to_string(), "[=](float x) -> float {\nreturn x * 2;\n}");
    }
}
